//! Typed question objects: the join of a configuration question node
//! with its catalog [`Key`](crate::catalog::Key).

use std::collections::BTreeMap;

use serde_json::{Map, Value};

use crate::catalog::{Catalog, ValueEntry};
use crate::condition::{
    ComparisonCondition, ValueCondition, parse_comparison, parse_value_condition,
};
use crate::error::ConfigurationError;

/// Asset root for `image_checkbox` choice images.
pub const IMAGE_ASSET_ROOT: &str = "assets/img/";

/// The enumerated question field types.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FieldType {
    Bool,
    CbBool,
    Char,
    Checkbox,
    Date,
    File,
    Float,
    Hidden,
    Image,
    ImageCheckbox,
    Int,
    LinkId,
    LinkVideo,
    Map,
    Measure,
    Radio,
    Select,
    SelectType,
    Text,
    Todo,
    UserId,
}

impl FieldType {
    pub fn parse(field_type: &str, keyword: &str) -> Result<Self, ConfigurationError> {
        let parsed = match field_type {
            "bool" => FieldType::Bool,
            "cb_bool" => FieldType::CbBool,
            "char" => FieldType::Char,
            "checkbox" => FieldType::Checkbox,
            "date" => FieldType::Date,
            "file" => FieldType::File,
            "float" => FieldType::Float,
            "hidden" => FieldType::Hidden,
            "image" => FieldType::Image,
            "image_checkbox" => FieldType::ImageCheckbox,
            "int" => FieldType::Int,
            "link_id" => FieldType::LinkId,
            "link_video" => FieldType::LinkVideo,
            "map" => FieldType::Map,
            "measure" => FieldType::Measure,
            "radio" => FieldType::Radio,
            "select" => FieldType::Select,
            "select_type" => FieldType::SelectType,
            "text" => FieldType::Text,
            "todo" => FieldType::Todo,
            "user_id" => FieldType::UserId,
            other => {
                return Err(ConfigurationError::UnknownFieldType {
                    field_type: other.to_string(),
                    keyword: keyword.to_string(),
                });
            }
        };
        Ok(parsed)
    }

    pub fn as_str(self) -> &'static str {
        match self {
            FieldType::Bool => "bool",
            FieldType::CbBool => "cb_bool",
            FieldType::Char => "char",
            FieldType::Checkbox => "checkbox",
            FieldType::Date => "date",
            FieldType::File => "file",
            FieldType::Float => "float",
            FieldType::Hidden => "hidden",
            FieldType::Image => "image",
            FieldType::ImageCheckbox => "image_checkbox",
            FieldType::Int => "int",
            FieldType::LinkId => "link_id",
            FieldType::LinkVideo => "link_video",
            FieldType::Map => "map",
            FieldType::Measure => "measure",
            FieldType::Radio => "radio",
            FieldType::Select => "select",
            FieldType::SelectType => "select_type",
            FieldType::Text => "text",
            FieldType::Todo => "todo",
            FieldType::UserId => "user_id",
        }
    }

    /// Field types whose choices come from the Key's attached values.
    pub fn requires_catalog_values(self) -> bool {
        matches!(
            self,
            FieldType::Checkbox
                | FieldType::ImageCheckbox
                | FieldType::Measure
                | FieldType::Radio
                | FieldType::Select
                | FieldType::SelectType
        )
    }

    /// Free-text fields stored as `{locale: text}` maps.
    pub fn is_translated(self) -> bool {
        matches!(self, FieldType::Char | FieldType::Text)
    }
}

/// One selectable choice of a question.
#[derive(Debug, Clone, PartialEq)]
pub struct Choice {
    /// Stored answer value: a value keyword, a 1-based integer for
    /// `measure`, 0/1 for `bool`, or `""` for the select sentinel.
    pub key: Value,
    pub label: String,
    pub helptext: String,
}

impl Choice {
    fn new(key: Value, label: impl Into<String>) -> Self {
        Choice {
            key,
            label: label.into(),
            helptext: String::new(),
        }
    }
}

/// `summary` directive of a question: which summary types it feeds and
/// how the projected value is produced.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SummaryDirective {
    pub types: Vec<String>,
    pub default: Map<String, Value>,
    pub overrides: BTreeMap<String, Map<String, Value>>,
}

impl SummaryDirective {
    pub fn parse(raw: &Map<String, Value>) -> Self {
        let mut directive = SummaryDirective::default();
        if let Some(types) = raw.get("types").and_then(Value::as_array) {
            directive.types = types
                .iter()
                .filter_map(Value::as_str)
                .map(str::to_string)
                .collect();
        }
        for (field, value) in raw {
            if field == "types" {
                continue;
            }
            let Some(options) = value.as_object() else {
                continue;
            };
            if field == "default" {
                directive.default = options.clone();
            } else {
                directive.overrides.insert(field.clone(), options.clone());
            }
        }
        directive
    }

    /// Shallow-merge the per-type overrides onto the defaults.
    pub fn resolve(&self, summary_type: &str) -> Option<Map<String, Value>> {
        if !self.types.iter().any(|listed| listed == summary_type) {
            return None;
        }
        let mut resolved = self.default.clone();
        if let Some(overrides) = self.overrides.get(summary_type) {
            for (option, value) in overrides {
                resolved.insert(option.clone(), value.clone());
            }
        }
        Some(resolved)
    }
}

/// A fully resolved question.
#[derive(Debug, Clone, PartialEq)]
pub struct Question {
    pub keyword: String,
    pub field_type: FieldType,
    pub label: String,
    pub label_view: String,
    pub helptext: String,
    /// Surfaced from configuration but not enforced at form build time.
    pub required: bool,
    pub max_length: Option<u64>,
    pub num_rows: Option<u64>,
    pub in_list: bool,
    pub is_name: bool,
    pub filterable: bool,
    /// Whether some choice of another question activates this one.
    pub conditional: bool,
    /// Asset paths, parallel to `choices`, for `image_checkbox`.
    pub images: Vec<String>,
    pub choices: Vec<Choice>,
    /// Choice questions: selecting `value` toggles the target question.
    pub conditions: Vec<ValueCondition>,
    /// Targets this question's value enables.
    pub question_conditions: Vec<ComparisonCondition>,
    /// Sibling questiongroups this question's value reveals, matched
    /// against their declared `questiongroup_condition` names.
    pub questiongroup_conditions: Vec<ComparisonCondition>,
    /// Name of a condition this question contributes to.
    pub question_condition: Option<String>,
    /// Extra translated labels, e.g. `label_left`/`label_right`.
    pub additional_translations: BTreeMap<String, String>,
    pub summary: Option<SummaryDirective>,
    pub form_options: Map<String, Value>,
    pub view_options: Map<String, Value>,
}

/// Locale and configuration key a tree is resolved under.
#[derive(Debug, Clone)]
pub struct BuildContext<'a> {
    pub catalog: &'a Catalog,
    /// `"<code>_<edition>"`, the most specific translation key.
    pub configuration_key: String,
    pub locale: String,
}

impl<'a> BuildContext<'a> {
    pub fn new(catalog: &'a Catalog, configuration_key: &str, locale: &str) -> Self {
        BuildContext {
            catalog,
            configuration_key: configuration_key.to_string(),
            locale: locale.to_string(),
        }
    }

    fn translate(&self, id: Option<crate::catalog::TranslationId>, slot: &str) -> String {
        self.catalog
            .translations
            .translate(id, slot, &self.configuration_key, &self.locale)
    }
}

impl Question {
    /// Build a question from its configuration node by joining the node's
    /// overrides with the catalog Key's own config.
    pub fn build(
        node: &Map<String, Value>,
        context: &BuildContext<'_>,
    ) -> Result<Question, ConfigurationError> {
        let keyword = node
            .get("keyword")
            .and_then(Value::as_str)
            .ok_or_else(|| ConfigurationError::invalid("keyword", "a string", "question"))?;
        let key = context.catalog.key(keyword)?;

        let field_type_name = key
            .config
            .get("type")
            .and_then(Value::as_str)
            .unwrap_or("char");
        let field_type = FieldType::parse(field_type_name, keyword)?;

        let form_options = merged_options(&key.config, node, "form_options");
        let view_options = merged_options(&key.config, node, "view_options");

        let label = context.translate(key.translation, "label");
        let label_view = match context.translate(key.translation, "label_view") {
            view if view.is_empty() => label.clone(),
            view => view,
        };
        let helptext = context.translate(key.translation, "helptext");

        let mut additional_translations = BTreeMap::new();
        if field_type == FieldType::Measure {
            for slot in ["label_left", "label_right"] {
                let text = context.translate(key.translation, slot);
                if !text.is_empty() {
                    additional_translations.insert(slot.to_string(), text);
                }
            }
        }

        let values = context.catalog.values_of(key);
        if field_type.requires_catalog_values() && values.is_empty() {
            return Err(ConfigurationError::invalid(
                "values",
                "at least one attached value",
                keyword,
            ));
        }
        let (choices, images) = derive_choices(field_type, &label, &values, context);

        let conditions = parse_conditions(&form_options, keyword, &choices)?;
        let question_conditions = parse_comparison_conditions(&form_options, "question_conditions")?;
        let questiongroup_conditions =
            parse_comparison_conditions(&form_options, "questiongroup_conditions")?;
        let question_condition = form_options
            .get("question_condition")
            .and_then(Value::as_str)
            .map(str::to_string);

        let summary = node
            .get("summary")
            .or_else(|| key.config.get("summary"))
            .and_then(Value::as_object)
            .map(SummaryDirective::parse);

        Ok(Question {
            keyword: keyword.to_string(),
            field_type,
            label,
            label_view,
            helptext,
            // Enforcement is left to the rendering layer.
            required: form_options
                .get("required")
                .and_then(Value::as_bool)
                .unwrap_or(false),
            max_length: form_options.get("max_length").and_then(Value::as_u64),
            num_rows: form_options.get("num_rows").and_then(Value::as_u64),
            in_list: option_flag(&view_options, "in_list"),
            is_name: option_flag(&view_options, "is_name"),
            filterable: option_flag(&view_options, "filterable"),
            conditional: false,
            images,
            choices,
            conditions,
            question_conditions,
            questiongroup_conditions,
            question_condition,
            additional_translations,
            summary,
            form_options,
            view_options,
        })
    }

    /// The label of a stored choice value, when it resolves.
    pub fn choice_label(&self, value: &Value) -> Option<&str> {
        self.choices
            .iter()
            .find(|choice| &choice.key == value)
            .map(|choice| choice.label.as_str())
    }

    /// 0-based index of a stored choice value.
    pub fn choice_index(&self, value: &Value) -> Option<usize> {
        self.choices.iter().position(|choice| &choice.key == value)
    }

    pub fn helptexts(&self) -> Vec<&str> {
        self.choices
            .iter()
            .map(|choice| choice.helptext.as_str())
            .collect()
    }
}

fn option_flag(options: &Map<String, Value>, flag: &str) -> bool {
    options.get(flag).and_then(Value::as_bool).unwrap_or(false)
}

/// Shallow-merge a question node's option dict over the Key's.
fn merged_options(
    key_config: &Map<String, Value>,
    node: &Map<String, Value>,
    field: &str,
) -> Map<String, Value> {
    let mut merged = key_config
        .get(field)
        .and_then(Value::as_object)
        .cloned()
        .unwrap_or_default();
    if let Some(overrides) = node.get(field).and_then(Value::as_object) {
        for (option, value) in overrides {
            merged.insert(option.clone(), value.clone());
        }
    }
    merged
}

fn derive_choices(
    field_type: FieldType,
    label: &str,
    values: &[&ValueEntry],
    context: &BuildContext<'_>,
) -> (Vec<Choice>, Vec<String>) {
    let value_choice = |value: &ValueEntry, key: Value| {
        let mut choice = Choice::new(key, context.translate(value.translation, "label"));
        choice.helptext = context.translate(value.translation, "helptext");
        choice
    };
    match field_type {
        FieldType::Bool => (
            vec![
                Choice::new(Value::from(1), "Yes"),
                Choice::new(Value::from(0), "No"),
            ],
            Vec::new(),
        ),
        FieldType::CbBool => (vec![Choice::new(Value::from(1), label)], Vec::new()),
        FieldType::Measure => {
            let ordered = order_measure_values(values, context);
            let choices = ordered
                .iter()
                .enumerate()
                .map(|(index, value)| value_choice(value, Value::from(index as i64 + 1)))
                .collect();
            (choices, Vec::new())
        }
        FieldType::Select | FieldType::SelectType => {
            let mut choices = vec![Choice::new(Value::from(""), "-")];
            choices.extend(
                values
                    .iter()
                    .map(|value| value_choice(value, Value::from(value.keyword.clone()))),
            );
            (choices, Vec::new())
        }
        FieldType::Checkbox | FieldType::Radio => (
            values
                .iter()
                .map(|value| value_choice(value, Value::from(value.keyword.clone())))
                .collect(),
            Vec::new(),
        ),
        FieldType::ImageCheckbox => {
            let choices = values
                .iter()
                .map(|value| value_choice(value, Value::from(value.keyword.clone())))
                .collect();
            let images = values
                .iter()
                .map(|value| {
                    let image_name = value
                        .config
                        .get("image_name")
                        .and_then(Value::as_str)
                        .unwrap_or_default();
                    format!("{IMAGE_ASSET_ROOT}{image_name}")
                })
                .collect();
            (choices, images)
        }
        _ => (Vec::new(), Vec::new()),
    }
}

/// Measure choice order: with any `order_value` present, sort all values
/// by it ascending, keeping values without one last in attachment order;
/// otherwise sort by translated label.
fn order_measure_values<'v>(
    values: &[&'v ValueEntry],
    context: &BuildContext<'_>,
) -> Vec<&'v ValueEntry> {
    let mut ordered: Vec<&ValueEntry> = values.to_vec();
    if values.iter().any(|value| value.order_value.is_some()) {
        ordered.sort_by_key(|value| value.order_value.unwrap_or(i64::MAX));
    } else {
        ordered.sort_by_key(|value| context.translate(value.translation, "label"));
    }
    ordered
}

fn parse_conditions(
    form_options: &Map<String, Value>,
    keyword: &str,
    choices: &[Choice],
) -> Result<Vec<ValueCondition>, ConfigurationError> {
    let Some(raw_conditions) = form_options.get("conditions").and_then(Value::as_array) else {
        return Ok(Vec::new());
    };
    let mut conditions = Vec::with_capacity(raw_conditions.len());
    for raw in raw_conditions {
        let Some(condition) = raw.as_str() else {
            return Err(ConfigurationError::invalid("conditions", "strings", keyword));
        };
        let parsed =
            parse_value_condition(condition).map_err(|reason| ConfigurationError::InvalidCondition {
                condition: condition.to_string(),
                reason: reason.to_string(),
            })?;
        let value_known = choices
            .iter()
            .any(|choice| choice.key == Value::from(parsed.value.clone()));
        if !value_known {
            return Err(ConfigurationError::InvalidCondition {
                condition: condition.to_string(),
                reason: format!("value '{}' is not a choice of '{keyword}'", parsed.value),
            });
        }
        conditions.push(parsed);
    }
    Ok(conditions)
}

fn parse_comparison_conditions(
    form_options: &Map<String, Value>,
    field: &str,
) -> Result<Vec<ComparisonCondition>, ConfigurationError> {
    let Some(raw_conditions) = form_options.get(field).and_then(Value::as_array) else {
        return Ok(Vec::new());
    };
    let mut conditions = Vec::with_capacity(raw_conditions.len());
    for raw in raw_conditions {
        let Some(condition) = raw.as_str() else {
            return Err(ConfigurationError::invalid(field, "strings", "question"));
        };
        let parsed = parse_comparison(condition)
            .map_err(|reason| comparison_error(field, condition, reason.to_string()))?;
        conditions.push(parsed);
    }
    Ok(conditions)
}

fn comparison_error(field: &str, condition: &str, reason: String) -> ConfigurationError {
    if field == "questiongroup_conditions" {
        ConfigurationError::InvalidQuestiongroupCondition {
            condition: condition.to_string(),
            reason,
        }
    } else {
        ConfigurationError::InvalidCondition {
            condition: condition.to_string(),
            reason,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalog::SlotMap;
    use serde_json::json;
    use std::collections::BTreeMap;

    fn label_slots(label: &str) -> BTreeMap<String, SlotMap> {
        BTreeMap::from([(
            "sample_2015".to_string(),
            BTreeMap::from([(
                "label".to_string(),
                BTreeMap::from([("en".to_string(), label.to_string())]),
            )]),
        )])
    }

    fn catalog_with_measure(order_values: &[Option<i64>]) -> Catalog {
        let mut catalog = Catalog::new();
        let key_translation = catalog.translations.create("key", label_slots("Degradation"));
        let mut config = Map::new();
        config.insert("type".into(), json!("measure"));
        catalog.create_key("key_m", Some(key_translation), config);
        for (index, order_value) in order_values.iter().enumerate() {
            let label = format!("Value {index}");
            let translation = catalog.translations.create("value", label_slots(&label));
            let keyword = format!("v_{index}");
            catalog.create_value(&keyword, Some(translation), *order_value, Map::new());
        }
        let keywords: Vec<String> = (0..order_values.len()).map(|i| format!("v_{i}")).collect();
        let refs: Vec<&str> = keywords.iter().map(String::as_str).collect();
        catalog.attach_values("key_m", &refs).unwrap();
        catalog
    }

    fn build(catalog: &Catalog, node: Value) -> Result<Question, ConfigurationError> {
        let context = BuildContext::new(catalog, "sample_2015", "en");
        Question::build(node.as_object().unwrap(), &context)
    }

    #[test]
    fn measure_choices_use_one_based_keys() {
        let catalog = catalog_with_measure(&[None, None, None]);
        let question = build(&catalog, json!({"keyword": "key_m"})).unwrap();
        let keys: Vec<&Value> = question.choices.iter().map(|choice| &choice.key).collect();
        assert_eq!(keys, vec![&json!(1), &json!(2), &json!(3)]);
    }

    #[test]
    fn measure_order_value_sorts_with_nulls_last() {
        let catalog = catalog_with_measure(&[None, Some(1), Some(2)]);
        let question = build(&catalog, json!({"keyword": "key_m"})).unwrap();
        let labels: Vec<&str> = question
            .choices
            .iter()
            .map(|choice| choice.label.as_str())
            .collect();
        assert_eq!(labels, vec!["Value 1", "Value 2", "Value 0"]);
    }

    #[test]
    fn bool_choices_are_fixed() {
        let mut catalog = Catalog::new();
        let mut config = Map::new();
        config.insert("type".into(), json!("bool"));
        catalog.create_key("key_b", None, config);
        let question = build(&catalog, json!({"keyword": "key_b"})).unwrap();
        assert_eq!(question.choices[0].key, json!(1));
        assert_eq!(question.choices[0].label, "Yes");
        assert_eq!(question.choices[1].key, json!(0));
        assert_eq!(question.choices[1].label, "No");
    }

    #[test]
    fn select_prepends_sentinel() {
        let mut catalog = Catalog::new();
        let mut config = Map::new();
        config.insert("type".into(), json!("select"));
        catalog.create_key("key_s", None, config);
        catalog.create_value("v_1", None, None, Map::new());
        catalog.attach_values("key_s", &["v_1"]).unwrap();
        let question = build(&catalog, json!({"keyword": "key_s"})).unwrap();
        assert_eq!(question.choices[0].key, json!(""));
        assert_eq!(question.choices[0].label, "-");
        assert_eq!(question.choices[1].key, json!("v_1"));
    }

    #[test]
    fn image_checkbox_derives_asset_paths() {
        let mut catalog = Catalog::new();
        let mut config = Map::new();
        config.insert("type".into(), json!("image_checkbox"));
        catalog.create_key("key_i", None, config);
        let mut value_config = Map::new();
        value_config.insert("image_name".into(), json!("cropland.png"));
        catalog.create_value("v_crop", None, None, value_config);
        catalog.attach_values("key_i", &["v_crop"]).unwrap();
        let question = build(&catalog, json!({"keyword": "key_i"})).unwrap();
        assert_eq!(question.images, vec!["assets/img/cropland.png"]);
    }

    #[test]
    fn node_options_override_key_options() {
        let mut catalog = Catalog::new();
        let mut config = Map::new();
        config.insert("type".into(), json!("char"));
        config.insert("form_options".into(), json!({"max_length": 50}));
        catalog.create_key("key_c", None, config);
        let question = build(
            &catalog,
            json!({"keyword": "key_c", "form_options": {"max_length": 500}}),
        )
        .unwrap();
        assert_eq!(question.max_length, Some(500));
    }

    #[test]
    fn choiceless_measure_is_rejected() {
        let mut catalog = Catalog::new();
        let mut config = Map::new();
        config.insert("type".into(), json!("measure"));
        catalog.create_key("key_m", None, config);
        assert!(build(&catalog, json!({"keyword": "key_m"})).is_err());
    }

    #[test]
    fn condition_value_must_be_a_choice() {
        let mut catalog = Catalog::new();
        let mut config = Map::new();
        config.insert("type".into(), json!("image_checkbox"));
        catalog.create_key("key_i", None, config);
        catalog.create_value("v_known", None, None, Map::new());
        catalog.attach_values("key_i", &["v_known"]).unwrap();
        let result = build(
            &catalog,
            json!({
                "keyword": "key_i",
                "form_options": {"conditions": ["v_unknown|True|key_sub"]},
            }),
        );
        assert!(matches!(
            result,
            Err(ConfigurationError::InvalidCondition { .. })
        ));
    }

    #[test]
    fn questiongroup_conditions_are_parsed_onto_the_question() {
        let mut catalog = Catalog::new();
        let mut config = Map::new();
        config.insert("type".into(), json!("image_checkbox"));
        catalog.create_key("key_i", None, config);
        catalog.create_value("v_known", None, None, Map::new());
        catalog.attach_values("key_i", &["v_known"]).unwrap();
        let question = build(
            &catalog,
            json!({
                "keyword": "key_i",
                "form_options": {"questiongroup_conditions": ["=='v_known'|gated_group"]},
            }),
        )
        .unwrap();
        assert_eq!(question.questiongroup_conditions.len(), 1);
        assert_eq!(question.questiongroup_conditions[0].target, "gated_group");

        let result = build(
            &catalog,
            json!({
                "keyword": "key_i",
                "form_options": {"questiongroup_conditions": ["nonsense"]},
            }),
        );
        assert!(matches!(
            result,
            Err(ConfigurationError::InvalidQuestiongroupCondition { .. })
        ));
    }

    #[test]
    fn summary_directive_merges_type_overrides() {
        let directive = SummaryDirective::parse(
            json!({
                "types": ["full"],
                "default": {"field_name": "title", "max_length": 100},
                "full": {"max_length": 300},
            })
            .as_object()
            .unwrap(),
        );
        let resolved = directive.resolve("full").unwrap();
        assert_eq!(resolved.get("field_name"), Some(&json!("title")));
        assert_eq!(resolved.get("max_length"), Some(&json!(300)));
        assert!(directive.resolve("other").is_none());
    }
}
