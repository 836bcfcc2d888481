use questionnaire_spec::ConfigurationError;
use thiserror::Error;

/// Errors raised while running an edition migration.
#[derive(Debug, Error)]
pub enum EditionError {
    #[error("path {path:?} does not resolve in the configuration document")]
    PathNotFound { path: Vec<String> },
    #[error("edition '{edition}' of '{code}' has no prior configuration to migrate")]
    MissingSource { code: String, edition: String },
    #[error(transparent)]
    Configuration(#[from] ConfigurationError),
    #[error("failed to render release note: {0}")]
    ReleaseNote(#[from] handlebars::RenderError),
}

impl EditionError {
    pub(crate) fn path_not_found(path: &[&str]) -> Self {
        EditionError::PathNotFound {
            path: path.iter().map(|step| (*step).to_string()).collect(),
        }
    }
}
