//! Catalog access handed to operations while an edition runs. Every
//! helper is get-or-create so a rerun edition leaves the catalog as it
//! found it.

use std::collections::BTreeMap;

use serde_json::{Map, Value, json};

use questionnaire_spec::catalog::{Catalog, SlotMap, TranslationId};
use questionnaire_spec::ConfigurationError;

/// Mutable view on the catalog scoped to one `(code, edition)`.
pub struct EditionContext<'a> {
    pub catalog: &'a mut Catalog,
    /// `"<code>_<edition>"`, the translation key this edition writes.
    pub configuration_key: String,
}

impl<'a> EditionContext<'a> {
    pub fn new(catalog: &'a mut Catalog, code: &str, edition: &str) -> Self {
        EditionContext {
            catalog,
            configuration_key: format!("{code}_{edition}"),
        }
    }

    /// Append a slot map under this edition's configuration key.
    pub fn update_translation(&mut self, id: TranslationId, slots: SlotMap) {
        let configuration_key = self.configuration_key.clone();
        self.catalog.translations.append(id, &configuration_key, slots);
    }

    /// Merge a fragment spanning several configuration keys.
    pub fn append_translation(&mut self, id: TranslationId, fragment: BTreeMap<String, SlotMap>) {
        self.catalog.translations.merge_fragment(id, fragment);
    }

    pub fn create_new_translation(
        &mut self,
        translation_type: &str,
        fragment: BTreeMap<String, SlotMap>,
    ) -> TranslationId {
        self.catalog.translations.create(translation_type, fragment)
    }

    /// Get-or-create a key; an existing key has `configuration` merged
    /// into its config and the values attached on top.
    pub fn create_new_question(
        &mut self,
        keyword: &str,
        translation: Option<TranslationId>,
        question_type: &str,
        values: &[&str],
        configuration: Option<Map<String, Value>>,
    ) -> Result<(), ConfigurationError> {
        let mut config = configuration.unwrap_or_default();
        config.entry("type".to_string()).or_insert(json!(question_type));
        self.catalog.create_key(keyword, translation, config);
        if !values.is_empty() {
            self.catalog.attach_values(keyword, values)?;
        }
        Ok(())
    }

    pub fn create_new_value(
        &mut self,
        keyword: &str,
        translation: Option<TranslationId>,
        order_value: Option<i64>,
        configuration: Option<Map<String, Value>>,
    ) {
        self.catalog.create_value(
            keyword,
            translation,
            order_value,
            configuration.unwrap_or_default(),
        );
    }

    /// Bulk create values with single-locale labels, translated under
    /// this edition's configuration key.
    pub fn create_new_values_list(&mut self, entries: &[(&str, &str)]) {
        for (keyword, label) in entries {
            let fragment = BTreeMap::from([(
                self.configuration_key.clone(),
                BTreeMap::from([(
                    "label".to_string(),
                    BTreeMap::from([("en".to_string(), (*label).to_string())]),
                )]),
            )]);
            let translation = self.catalog.translations.create("value", fragment);
            self.catalog
                .create_value(keyword, Some(translation), None, Map::new());
        }
    }

    pub fn create_new_questiongroup(
        &mut self,
        keyword: &str,
        translation: Option<TranslationId>,
        configuration: Option<Map<String, Value>>,
    ) {
        self.catalog
            .create_questiongroup(keyword, translation, configuration.unwrap_or_default());
    }

    pub fn create_new_category(&mut self, keyword: &str, translation: Option<TranslationId>) {
        self.catalog.create_category(keyword, translation);
    }

    /// Attach one more value to an existing key.
    pub fn add_new_value(
        &mut self,
        question_keyword: &str,
        value_keyword: &str,
        order_value: Option<i64>,
    ) -> Result<(), ConfigurationError> {
        if self.catalog.value(value_keyword).is_err() {
            self.catalog
                .create_value(value_keyword, None, order_value, Map::new());
        }
        self.catalog.attach_values(question_keyword, &[value_keyword])
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn create_new_question_is_rerunnable() {
        let mut catalog = Catalog::new();
        let mut context = EditionContext::new(&mut catalog, "sample", "2018");
        context.create_new_values_list(&[("v_1", "One"), ("v_2", "Two")]);
        context
            .create_new_question("key_new", None, "checkbox", &["v_1", "v_2"], None)
            .unwrap();
        context
            .create_new_question("key_new", None, "checkbox", &["v_1", "v_2"], None)
            .unwrap();
        let key = catalog.key("key_new").unwrap();
        assert_eq!(key.values, vec!["v_1", "v_2"]);
        assert_eq!(key.config.get("type"), Some(&json!("checkbox")));
    }

    #[test]
    fn update_translation_writes_edition_key() {
        let mut catalog = Catalog::new();
        let id = catalog.translations.create("key", BTreeMap::new());
        let mut context = EditionContext::new(&mut catalog, "sample", "2018");
        context.update_translation(
            id,
            BTreeMap::from([(
                "label".to_string(),
                BTreeMap::from([("en".to_string(), "Updated".to_string())]),
            )]),
        );
        assert_eq!(
            catalog
                .translations
                .translate(Some(id), "label", "sample_2018", "en"),
            "Updated"
        );
        assert_eq!(
            catalog
                .translations
                .translate(Some(id), "label", "sample_2015", "en"),
            ""
        );
    }
}
