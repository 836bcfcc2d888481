#![allow(missing_docs)]

pub mod answers;
pub mod catalog;
pub mod condition;
pub mod error;
pub mod form;
pub mod merge;
pub mod question;
pub mod render;
pub mod stores;
pub mod structure;
pub mod summary;
pub mod tree;
pub mod validate;
pub mod walker;

pub use answers::{AnswerDocument, canonical_bytes, is_empty_value, record_value, records, sorted_records};
pub use catalog::{
    Catalog, CategoryEntry, Key, QuestiongroupEntry, SlotMap, Translation, TranslationId,
    TranslationStore, ValueEntry,
};
pub use condition::{
    CmpOp, ComparisonCondition, ConditionError, Literal, ValueCondition, parse_comparison,
    parse_value_condition,
};
pub use error::ConfigurationError;
pub use form::{
    FieldDescriptor, FormBuildOptions, FormDescription, GroupForm, Validators, WidgetKind,
    build_form,
};
pub use merge::{load_merged, merge_document, resolve_bases};
pub use question::{BuildContext, Choice, FieldType, Question, SummaryDirective};
pub use render::{
    NOT_AVAILABLE, RenderContext, raw_document_data, render_document, render_question, render_raw,
};
pub use stores::{
    AnswerStore, Configuration, ConfigurationStore, Directory, FileDescriptor, FileStore,
    MemoryAnswerStore, MemoryConfigurationStore, MemoryDirectory, MemoryFileStore, NullDirectory,
    NullFileStore, UserRecord,
};
pub use structure::{CatalogKind, NodeKind, ORDER_FIELD};
pub use summary::{SummaryContext, TransformerInput, lookup_transformer, project};
pub use tree::{Category, Numbered, Questiongroup, QuestionnaireStructure, Section, Subcategory};
pub use validate::validate_document;
pub use walker::{WalkScope, walk, walk_with};
