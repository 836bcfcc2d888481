use thiserror::Error;

use crate::structure::CatalogKind;

/// Errors raised while loading, merging, validating or interpreting a
/// questionnaire configuration.
#[derive(Debug, Error)]
pub enum ConfigurationError {
    #[error("no active configuration found for code '{code}'")]
    ConfigurationNotFound { code: String },
    #[error("base_code inheritance cycle detected: {chain:?}")]
    CycleInBase { chain: Vec<String> },
    #[error("no {kind} entry in the catalog for keyword '{keyword}'")]
    NotInCatalog { kind: CatalogKind, keyword: String },
    #[error("invalid configuration: '{field}' of {node} must be {expected}")]
    InvalidConfiguration {
        field: String,
        expected: String,
        node: String,
    },
    #[error("invalid option '{option}' for {node} '{keyword}'")]
    InvalidOption {
        option: String,
        node: String,
        keyword: String,
    },
    #[error("invalid condition '{condition}': {reason}")]
    InvalidCondition { condition: String, reason: String },
    #[error("invalid questiongroup condition '{condition}': {reason}")]
    InvalidQuestiongroupCondition { condition: String, reason: String },
    #[error("unknown field type '{field_type}' for key '{keyword}'")]
    UnknownFieldType { field_type: String, keyword: String },
    #[error("summary configuration error: {0}")]
    SummaryConfiguration(String),
}

impl ConfigurationError {
    pub(crate) fn invalid(field: &str, expected: &str, node: &str) -> Self {
        ConfigurationError::InvalidConfiguration {
            field: field.to_string(),
            expected: expected.to_string(),
            node: node.to_string(),
        }
    }

    pub(crate) fn not_in_catalog(kind: CatalogKind, keyword: &str) -> Self {
        ConfigurationError::NotInCatalog {
            kind,
            keyword: keyword.to_string(),
        }
    }
}
