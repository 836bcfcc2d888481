#![allow(missing_docs)]

pub mod context;
pub mod engine;
pub mod error;
pub mod helpers;

pub use context::EditionContext;
pub use engine::{Edition, Operation, release_notes, run_operations, update_questionnaire_data};
pub use error::EditionError;
pub use helpers::{find_in_data, remove_questiongroup, update_config_data, update_data};
