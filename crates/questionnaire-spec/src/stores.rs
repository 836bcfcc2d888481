//! Boundary traits towards the hosting application: configuration rows,
//! stored answer documents, uploaded files and the user directory.
//!
//! The engine only reads and writes through these traits; in-memory
//! implementations back the test suite and small tools.

use std::collections::BTreeMap;

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::error::ConfigurationError;

/// One configuration row, the unit the loader works on.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct Configuration {
    pub code: String,
    pub edition: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub base_code: Option<String>,
    /// The configuration document. Top level is `{"sections": [...]}`.
    pub data: Map<String, Value>,
}

/// Store of configuration rows, keyed by `(code, edition)`.
pub trait ConfigurationStore {
    /// The latest active configuration for a code.
    fn latest_active(&self, code: &str) -> Option<Configuration>;

    fn by_code_edition(&self, code: &str, edition: &str) -> Option<Configuration>;

    fn save(&mut self, configuration: Configuration);

    fn require_latest(&self, code: &str) -> Result<Configuration, ConfigurationError> {
        self.latest_active(code)
            .ok_or_else(|| ConfigurationError::ConfigurationNotFound {
                code: code.to_string(),
            })
    }
}

/// In-memory configuration store. Editions are ordered by insertion;
/// the last inserted row per code is the latest active one.
#[derive(Debug, Clone, Default)]
pub struct MemoryConfigurationStore {
    rows: Vec<Configuration>,
}

impl MemoryConfigurationStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn editions(&self, code: &str) -> Vec<&str> {
        self.rows
            .iter()
            .filter(|row| row.code == code)
            .map(|row| row.edition.as_str())
            .collect()
    }
}

impl ConfigurationStore for MemoryConfigurationStore {
    fn latest_active(&self, code: &str) -> Option<Configuration> {
        self.rows.iter().rev().find(|row| row.code == code).cloned()
    }

    fn by_code_edition(&self, code: &str, edition: &str) -> Option<Configuration> {
        self.rows
            .iter()
            .find(|row| row.code == code && row.edition == edition)
            .cloned()
    }

    fn save(&mut self, configuration: Configuration) {
        if let Some(existing) = self
            .rows
            .iter_mut()
            .find(|row| row.code == configuration.code && row.edition == configuration.edition)
        {
            *existing = configuration;
        } else {
            self.rows.push(configuration);
        }
    }
}

/// Store of answer documents keyed by questionnaire id.
pub trait AnswerStore {
    fn load(&self, questionnaire_id: &str) -> Option<Map<String, Value>>;
    fn save(&mut self, questionnaire_id: &str, document: Map<String, Value>);
}

#[derive(Debug, Clone, Default)]
pub struct MemoryAnswerStore {
    documents: BTreeMap<String, Map<String, Value>>,
}

impl MemoryAnswerStore {
    pub fn new() -> Self {
        Self::default()
    }
}

impl AnswerStore for MemoryAnswerStore {
    fn load(&self, questionnaire_id: &str) -> Option<Map<String, Value>> {
        self.documents.get(questionnaire_id).cloned()
    }

    fn save(&mut self, questionnaire_id: &str, document: Map<String, Value>) {
        self.documents.insert(questionnaire_id.to_string(), document);
    }
}

/// Metadata of an uploaded file, as the render layer consumes it.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct FileDescriptor {
    pub url: String,
    pub content_type: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub preview_image: Option<String>,
    #[serde(skip_serializing_if = "Vec::is_empty", default)]
    pub interchange_list: Vec<(String, String)>,
}

/// Store of uploaded files. Missing uids yield an empty descriptor.
pub trait FileStore {
    fn get_data(&self, uid: &str) -> FileDescriptor;
}

#[derive(Debug, Clone, Default)]
pub struct MemoryFileStore {
    files: BTreeMap<String, FileDescriptor>,
}

impl MemoryFileStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, uid: &str, descriptor: FileDescriptor) {
        self.files.insert(uid.to_string(), descriptor);
    }
}

impl FileStore for MemoryFileStore {
    fn get_data(&self, uid: &str) -> FileDescriptor {
        self.files.get(uid).cloned().unwrap_or_default()
    }
}

/// File store for contexts without uploads. Always empty.
#[derive(Debug, Clone, Copy, Default)]
pub struct NullFileStore;

impl FileStore for NullFileStore {
    fn get_data(&self, _uid: &str) -> FileDescriptor {
        FileDescriptor::default()
    }
}

/// A user as the directory reports it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct UserRecord {
    pub display_name: String,
    pub email: String,
}

/// Lookup of users referenced by `user_id` questions.
pub trait Directory {
    fn user_by_id(&self, id: &str) -> Option<UserRecord>;
}

#[derive(Debug, Clone, Default)]
pub struct MemoryDirectory {
    users: BTreeMap<String, UserRecord>,
}

impl MemoryDirectory {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, id: &str, record: UserRecord) {
        self.users.insert(id.to_string(), record);
    }
}

impl Directory for MemoryDirectory {
    fn user_by_id(&self, id: &str) -> Option<UserRecord> {
        self.users.get(id).cloned()
    }
}

/// Directory for contexts without user resolution.
#[derive(Debug, Clone, Copy, Default)]
pub struct NullDirectory;

impl Directory for NullDirectory {
    fn user_by_id(&self, _id: &str) -> Option<UserRecord> {
        None
    }
}
