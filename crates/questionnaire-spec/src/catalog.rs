//! Store of reusable leaf definitions: keys, predefined values,
//! questiongroups and categories, each with an optional localized
//! translation record.

use std::collections::BTreeMap;

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::error::ConfigurationError;
use crate::structure::CatalogKind;

/// Handle to a row of the translation store.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize, JsonSchema,
)]
pub struct TranslationId(pub usize);

/// `slot → locale → text`.
pub type SlotMap = BTreeMap<String, BTreeMap<String, String>>;

/// A translation record. Data is keyed by configuration key
/// (`"<code>_<edition>"` or `"<code>"`); edition updates append new
/// configuration keys and never overwrite earlier ones.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct Translation {
    pub translation_type: String,
    pub data: BTreeMap<String, SlotMap>,
}

/// Append-only store of translation records.
#[derive(Debug, Clone, Default)]
pub struct TranslationStore {
    entries: Vec<Translation>,
    default_locale: String,
}

impl TranslationStore {
    pub fn new(default_locale: impl Into<String>) -> Self {
        TranslationStore {
            entries: Vec::new(),
            default_locale: default_locale.into(),
        }
    }

    pub fn default_locale(&self) -> &str {
        if self.default_locale.is_empty() {
            "en"
        } else {
            &self.default_locale
        }
    }

    pub fn create(
        &mut self,
        translation_type: impl Into<String>,
        data: BTreeMap<String, SlotMap>,
    ) -> TranslationId {
        self.entries.push(Translation {
            translation_type: translation_type.into(),
            data,
        });
        TranslationId(self.entries.len() - 1)
    }

    pub fn get(&self, id: TranslationId) -> Option<&Translation> {
        self.entries.get(id.0)
    }

    /// Append a slot map under one configuration key. Slots and locales
    /// under the same key merge; other configuration keys are untouched.
    pub fn append(&mut self, id: TranslationId, configuration_key: &str, slots: SlotMap) {
        let Some(entry) = self.entries.get_mut(id.0) else {
            return;
        };
        let existing = entry.data.entry(configuration_key.to_string()).or_default();
        for (slot, locales) in slots {
            existing.entry(slot).or_default().extend(locales);
        }
    }

    /// Merge a fragment spanning several configuration keys.
    pub fn merge_fragment(&mut self, id: TranslationId, fragment: BTreeMap<String, SlotMap>) {
        for (configuration_key, slots) in fragment {
            self.append(id, &configuration_key, slots);
        }
    }

    /// Resolve a translated text. Falls back from the exact configuration
    /// key to the bare code (configuration key without the edition
    /// suffix), and from the requested locale to the default locale.
    /// Returns an empty string when nothing matches.
    pub fn translate(
        &self,
        id: Option<TranslationId>,
        slot: &str,
        configuration_key: &str,
        locale: &str,
    ) -> String {
        let Some(entry) = id.and_then(|id| self.get(id)) else {
            return String::new();
        };
        let mut candidates = vec![configuration_key];
        if let Some((code, _edition)) = configuration_key.rsplit_once('_')
            && !code.is_empty()
        {
            candidates.push(code);
        }
        for key in candidates {
            let Some(slots) = entry.data.get(key) else {
                continue;
            };
            let Some(locales) = slots.get(slot) else {
                continue;
            };
            if let Some(text) = locales.get(locale) {
                return text.clone();
            }
            if let Some(text) = locales.get(self.default_locale()) {
                return text.clone();
            }
        }
        String::new()
    }
}

/// A key: the reusable definition behind a question.
#[derive(Debug, Clone, PartialEq)]
pub struct Key {
    pub keyword: String,
    pub translation: Option<TranslationId>,
    /// `{type, form_options?, view_options?, summary?}`.
    pub config: Map<String, Value>,
    /// Keywords of attached values, in attachment order.
    pub values: Vec<String>,
}

/// A predefined value, attachable to many keys.
#[derive(Debug, Clone, PartialEq)]
pub struct ValueEntry {
    pub keyword: String,
    pub translation: Option<TranslationId>,
    pub order_value: Option<i64>,
    pub config: Map<String, Value>,
}

/// A questiongroup definition. Its config carries group-level form and
/// view options merged under the configuration node's own options.
#[derive(Debug, Clone, PartialEq)]
pub struct QuestiongroupEntry {
    pub keyword: String,
    pub translation: Option<TranslationId>,
    pub config: Map<String, Value>,
}

/// A category definition, shared by sections, categories and
/// subcategories of the tree.
#[derive(Debug, Clone, PartialEq)]
pub struct CategoryEntry {
    pub keyword: String,
    pub translation: Option<TranslationId>,
}

/// The four keyword-indexed stores plus the translation store.
#[derive(Debug, Clone, Default)]
pub struct Catalog {
    keys: BTreeMap<String, Key>,
    values: BTreeMap<String, ValueEntry>,
    questiongroups: BTreeMap<String, QuestiongroupEntry>,
    categories: BTreeMap<String, CategoryEntry>,
    pub translations: TranslationStore,
}

impl Catalog {
    pub fn new() -> Self {
        Catalog {
            translations: TranslationStore::new("en"),
            ..Default::default()
        }
    }

    pub fn key(&self, keyword: &str) -> Result<&Key, ConfigurationError> {
        self.keys
            .get(keyword)
            .ok_or_else(|| ConfigurationError::not_in_catalog(CatalogKind::Key, keyword))
    }

    pub fn value(&self, keyword: &str) -> Result<&ValueEntry, ConfigurationError> {
        self.values
            .get(keyword)
            .ok_or_else(|| ConfigurationError::not_in_catalog(CatalogKind::Value, keyword))
    }

    pub fn questiongroup(&self, keyword: &str) -> Result<&QuestiongroupEntry, ConfigurationError> {
        self.questiongroups
            .get(keyword)
            .ok_or_else(|| ConfigurationError::not_in_catalog(CatalogKind::Questiongroup, keyword))
    }

    pub fn category(&self, keyword: &str) -> Result<&CategoryEntry, ConfigurationError> {
        self.categories
            .get(keyword)
            .ok_or_else(|| ConfigurationError::not_in_catalog(CatalogKind::Category, keyword))
    }

    /// Check that a keyword resolves under the given catalog kind.
    pub fn ensure(&self, kind: CatalogKind, keyword: &str) -> Result<(), ConfigurationError> {
        let found = match kind {
            CatalogKind::Key => self.keys.contains_key(keyword),
            CatalogKind::Value => self.values.contains_key(keyword),
            CatalogKind::Questiongroup => self.questiongroups.contains_key(keyword),
            CatalogKind::Category => self.categories.contains_key(keyword),
        };
        if found {
            Ok(())
        } else {
            Err(ConfigurationError::not_in_catalog(kind, keyword))
        }
    }

    /// Get-or-create a key. An existing key keeps its translation; the
    /// given config is shallow-merged over the stored one.
    pub fn create_key(
        &mut self,
        keyword: &str,
        translation: Option<TranslationId>,
        config: Map<String, Value>,
    ) -> &mut Key {
        let entry = self.keys.entry(keyword.to_string()).or_insert_with(|| Key {
            keyword: keyword.to_string(),
            translation,
            config: Map::new(),
            values: Vec::new(),
        });
        for (option, value) in config {
            entry.config.insert(option, value);
        }
        entry
    }

    pub fn create_value(
        &mut self,
        keyword: &str,
        translation: Option<TranslationId>,
        order_value: Option<i64>,
        config: Map<String, Value>,
    ) -> &mut ValueEntry {
        self.values
            .entry(keyword.to_string())
            .or_insert_with(|| ValueEntry {
                keyword: keyword.to_string(),
                translation,
                order_value,
                config,
            })
    }

    pub fn create_questiongroup(
        &mut self,
        keyword: &str,
        translation: Option<TranslationId>,
        config: Map<String, Value>,
    ) -> &mut QuestiongroupEntry {
        self.questiongroups
            .entry(keyword.to_string())
            .or_insert_with(|| QuestiongroupEntry {
                keyword: keyword.to_string(),
                translation,
                config,
            })
    }

    pub fn create_category(
        &mut self,
        keyword: &str,
        translation: Option<TranslationId>,
    ) -> &mut CategoryEntry {
        self.categories
            .entry(keyword.to_string())
            .or_insert_with(|| CategoryEntry {
                keyword: keyword.to_string(),
                translation,
            })
    }

    /// Attach values to a key, keeping attachment order and skipping
    /// keywords already attached.
    pub fn attach_values(
        &mut self,
        key_keyword: &str,
        value_keywords: &[&str],
    ) -> Result<(), ConfigurationError> {
        for keyword in value_keywords {
            if !self.values.contains_key(*keyword) {
                return Err(ConfigurationError::not_in_catalog(
                    CatalogKind::Value,
                    keyword,
                ));
            }
        }
        let key = self
            .keys
            .get_mut(key_keyword)
            .ok_or_else(|| ConfigurationError::not_in_catalog(CatalogKind::Key, key_keyword))?;
        for keyword in value_keywords {
            if !key.values.iter().any(|existing| existing == keyword) {
                key.values.push((*keyword).to_string());
            }
        }
        Ok(())
    }

    /// The value entries attached to a key, in attachment order.
    pub fn values_of(&self, key: &Key) -> Vec<&ValueEntry> {
        key.values
            .iter()
            .filter_map(|keyword| self.values.get(keyword))
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn slot_map(slot: &str, locale: &str, text: &str) -> SlotMap {
        BTreeMap::from([(
            slot.to_string(),
            BTreeMap::from([(locale.to_string(), text.to_string())]),
        )])
    }

    #[test]
    fn translate_falls_back_to_default_locale() {
        let mut store = TranslationStore::new("en");
        let id = store.create(
            "key",
            BTreeMap::from([("sample_2015".to_string(), slot_map("label", "en", "Name"))]),
        );
        assert_eq!(store.translate(Some(id), "label", "sample_2015", "es"), "Name");
        assert_eq!(store.translate(Some(id), "label", "sample_2015", "en"), "Name");
        assert_eq!(store.translate(Some(id), "helptext", "sample_2015", "en"), "");
    }

    #[test]
    fn translate_falls_back_to_bare_code() {
        let mut store = TranslationStore::new("en");
        let id = store.create(
            "key",
            BTreeMap::from([("sample".to_string(), slot_map("label", "en", "Base label"))]),
        );
        assert_eq!(
            store.translate(Some(id), "label", "sample_2018", "en"),
            "Base label"
        );
    }

    #[test]
    fn append_keeps_earlier_configuration_keys() {
        let mut store = TranslationStore::new("en");
        let id = store.create(
            "key",
            BTreeMap::from([("sample_2015".to_string(), slot_map("label", "en", "Old"))]),
        );
        store.append(id, "sample_2018", slot_map("label", "en", "New"));
        assert_eq!(store.translate(Some(id), "label", "sample_2015", "en"), "Old");
        assert_eq!(store.translate(Some(id), "label", "sample_2018", "en"), "New");
    }

    #[test]
    fn create_key_is_idempotent_and_merges_config() {
        let mut catalog = Catalog::new();
        let mut config = Map::new();
        config.insert("type".into(), Value::String("char".into()));
        catalog.create_key("key_1", None, config);

        let mut update = Map::new();
        update.insert("form_options".into(), serde_json::json!({"max_length": 50}));
        catalog.create_key("key_1", None, update);

        let key = catalog.key("key_1").unwrap();
        assert_eq!(key.config.get("type"), Some(&Value::String("char".into())));
        assert!(key.config.contains_key("form_options"));
    }

    #[test]
    fn attach_values_preserves_order_and_deduplicates() {
        let mut catalog = Catalog::new();
        catalog.create_key("key_1", None, Map::new());
        catalog.create_value("v_b", None, None, Map::new());
        catalog.create_value("v_a", None, None, Map::new());
        catalog.attach_values("key_1", &["v_b", "v_a"]).unwrap();
        catalog.attach_values("key_1", &["v_a"]).unwrap();
        assert_eq!(catalog.key("key_1").unwrap().values, vec!["v_b", "v_a"]);
    }

    #[test]
    fn missing_keyword_reports_catalog_kind() {
        let catalog = Catalog::new();
        let err = catalog.key("nope").unwrap_err();
        assert!(err.to_string().contains("key"));
        assert!(err.to_string().contains("nope"));
    }
}
