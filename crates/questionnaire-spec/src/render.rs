//! Rendering of stored answers into display-ready view models.
//!
//! Every question renders to a dict keyed by a template name the
//! presentation layer resolves. Missing or empty answers render as the
//! "n.a." sentinel; schema-level inconsistencies surface as errors
//! earlier, at tree build time.

use regex::Regex;
use serde_json::{Map, Value, json};

use crate::answers::{AnswerDocument, record_value};
use crate::question::{FieldType, Question};
use crate::stores::{Directory, FileStore};
use crate::tree::{Questiongroup, QuestionnaireStructure};
use crate::walker::walk_with;

/// Sentinel emitted for missing answer data.
pub const NOT_AVAILABLE: &str = "n.a.";

/// Collaborators and options of one render pass.
pub struct RenderContext<'a> {
    pub files: &'a dyn FileStore,
    pub directory: &'a dyn Directory,
    pub locale: String,
    /// Include the stored keyword next to each choice label.
    pub with_raw_values: bool,
}

impl<'a> RenderContext<'a> {
    pub fn new(files: &'a dyn FileStore, directory: &'a dyn Directory, locale: &str) -> Self {
        RenderContext {
            files,
            directory,
            locale: locale.to_string(),
            with_raw_values: false,
        }
    }
}

/// Render a whole answer document against the tree. Each question maps
/// to a list of render models, one per record of its group.
pub fn render_document(
    structure: &QuestionnaireStructure,
    document: &AnswerDocument,
    context: &RenderContext<'_>,
) -> Map<String, Value> {
    walk_with(structure, document, |question, scope, records| {
        let rendered: Vec<Value> = records
            .iter()
            .map(|record| render_question(question, scope.questiongroup, record, context))
            .collect();
        Value::Array(rendered)
    })
}

/// Flat extraction of a document: per answered question a `<keyword>`
/// entry with the raw values and a `label_<keyword>` entry with the
/// question label, as list and export views consume it.
pub fn raw_document_data(
    structure: &QuestionnaireStructure,
    document: &AnswerDocument,
) -> Map<String, Value> {
    let mut data = Map::new();
    walk_with(structure, document, |question, _scope, records| {
        let values: Vec<Value> = records
            .iter()
            .filter_map(|record| record_value(record, &question.keyword).cloned())
            .collect();
        if !values.is_empty() {
            data.insert(
                format!("label_{}", question.keyword),
                Value::String(question.label_view.clone()),
            );
            data.insert(question.keyword.clone(), Value::Array(values));
        }
        Value::Null
    });
    data
}

/// Render one question's value out of one record.
pub fn render_question(
    question: &Question,
    group: &Questiongroup,
    record: &Value,
    context: &RenderContext<'_>,
) -> Value {
    let raw_template = question
        .view_options
        .get("template")
        .and_then(Value::as_str)
        == Some("raw");
    render_with_mode(question, group, record, context, raw_template)
}

/// Render without a template wrapper, as the summary projector does.
pub fn render_raw(
    question: &Question,
    group: &Questiongroup,
    record: &Value,
    context: &RenderContext<'_>,
) -> Value {
    render_with_mode(question, group, record, context, true)
}

fn render_with_mode(
    question: &Question,
    group: &Questiongroup,
    record: &Value,
    context: &RenderContext<'_>,
    raw_template: bool,
) -> Value {
    let Some(value) = record_value(record, &question.keyword) else {
        if raw_template {
            return Value::Object(Map::new());
        }
        return Value::String(NOT_AVAILABLE.to_string());
    };

    if raw_template {
        return json!({"key": question.label_view, "value": value});
    }

    match question.field_type {
        FieldType::Char
        | FieldType::Text
        | FieldType::Todo
        | FieldType::Date
        | FieldType::Int
        | FieldType::Map => json!({
            "template": "textarea",
            "key": question.label_view,
            "value": localized_text(value, &context.locale),
        }),
        FieldType::Float => json!({
            "template": "textarea",
            "key": question.label_view,
            "value": value,
            "decimals": question
                .form_options
                .get("field_options")
                .and_then(|options| options.get("decimals"))
                .cloned()
                .unwrap_or(Value::Null),
        }),
        FieldType::Bool | FieldType::Select | FieldType::SelectType => json!({
            "template": "textarea",
            "key": question.label_view,
            "value": question.choice_label(value).unwrap_or(NOT_AVAILABLE),
        }),
        FieldType::Measure => {
            render_measure(question, value, measure_other_label(question, group, record, context))
        }
        FieldType::Checkbox | FieldType::CbBool | FieldType::Radio => {
            render_checkbox(question, value, context)
        }
        FieldType::ImageCheckbox => render_image_checkbox(question, group, record, value, context),
        FieldType::LinkVideo => json!({
            "template": "link_video",
            "key": question.label_view,
            "value": value,
            "embed_url": value.as_str().and_then(video_embed_url),
        }),
        FieldType::Image | FieldType::File => render_file(question, value, context),
        FieldType::UserId => render_user(question, value, context),
        FieldType::LinkId => Value::Null,
        FieldType::Hidden => value.clone(),
    }
}

/// Embeddable player URL for a pasted video link.
fn video_embed_url(link: &str) -> Option<String> {
    if let Ok(regex) = Regex::new(r"(?:youtube\.com/watch\?v=|youtu\.be/)([A-Za-z0-9_-]{6,})")
        && let Some(captures) = regex.captures(link)
    {
        return Some(format!("https://www.youtube.com/embed/{}", &captures[1]));
    }
    if let Ok(regex) = Regex::new(r"vimeo\.com/(\d+)")
        && let Some(captures) = regex.captures(link)
    {
        return Some(format!("https://player.vimeo.com/video/{}", &captures[1]));
    }
    None
}

/// `{locale: text}` maps resolve to the requested locale, falling back
/// to any present text.
fn localized_text(value: &Value, locale: &str) -> Value {
    let Some(translations) = value.as_object() else {
        return value.clone();
    };
    if let Some(text) = translations.get(locale) {
        return text.clone();
    }
    translations
        .values()
        .next()
        .cloned()
        .unwrap_or(Value::Null)
}

/// Implicit scale level of a choice: its position projected onto a
/// five-step bar.
fn measure_level(index: usize, choice_count: usize) -> i64 {
    if choice_count == 0 {
        return 0;
    }
    (index as f64 / choice_count as f64 * 5.0).round() as i64
}

/// Groups marked `extra: measure_other` label the measure with the
/// record's free-text answer instead of the key label.
fn measure_other_label(
    question: &Question,
    group: &Questiongroup,
    record: &Value,
    context: &RenderContext<'_>,
) -> Option<String> {
    if group.view_options.get("extra").and_then(Value::as_str) != Some("measure_other") {
        return None;
    }
    let text_question = group.questions.iter().find(|other| {
        other.keyword != question.keyword && other.field_type.is_translated()
    })?;
    let value = record_value(record, &text_question.keyword)?;
    match localized_text(value, &context.locale) {
        Value::String(text) => Some(text),
        _ => None,
    }
}

fn render_measure(question: &Question, value: &Value, key_override: Option<String>) -> Value {
    let Some(index) = question.choice_index(value) else {
        return Value::String(NOT_AVAILABLE.to_string());
    };
    let mut model = Map::new();
    model.insert("template".into(), json!("measure_bar"));
    model.insert(
        "key".into(),
        json!(key_override.as_deref().unwrap_or(&question.label_view)),
    );
    model.insert("level".into(), json!(measure_level(index, question.choices.len())));
    model.insert("value".into(), json!(question.choices[index].label));
    if stacked_layout(question) {
        let all_values: Vec<Value> = question
            .choices
            .iter()
            .enumerate()
            .map(|(choice_index, choice)| {
                json!({
                    "value": choice.label,
                    "level": measure_level(choice_index, question.choices.len()),
                    "selected": choice_index == index,
                })
            })
            .collect();
        model.insert("all_values".into(), Value::Array(all_values));
    }
    Value::Object(model)
}

fn stacked_layout(question: &Question) -> bool {
    let layout = |options: &Map<String, Value>| {
        options.get("layout").and_then(Value::as_str) == Some("stacked")
    };
    layout(&question.form_options) || layout(&question.view_options)
}

fn render_checkbox(question: &Question, value: &Value, context: &RenderContext<'_>) -> Value {
    let selected: Vec<&Value> = match value {
        Value::Array(items) => items.iter().collect(),
        scalar => vec![scalar],
    };
    let values: Vec<Value> = selected
        .iter()
        .filter(|item| !crate::answers::is_empty_value(item))
        .filter_map(|item| {
            let label = question.choice_label(item)?;
            if context.with_raw_values {
                Some(json!({"label": label, "raw": item}))
            } else {
                Some(json!(label))
            }
        })
        .collect();
    if values.is_empty() {
        return Value::String(NOT_AVAILABLE.to_string());
    }
    json!({
        "template": "checkbox",
        "key": question.label_view,
        "values": values,
    })
}

fn render_image_checkbox(
    question: &Question,
    group: &Questiongroup,
    record: &Value,
    value: &Value,
    context: &RenderContext<'_>,
) -> Value {
    let selected: Vec<&Value> = match value {
        Value::Array(items) => items.iter().collect(),
        scalar => vec![scalar],
    };
    let values: Vec<Value> = selected
        .iter()
        .filter_map(|item| {
            let index = question.choice_index(item)?;
            let mut entry = Map::new();
            entry.insert("label".into(), json!(question.choices[index].label));
            entry.insert(
                "image".into(),
                json!(question.images.get(index).cloned().unwrap_or_default()),
            );
            // A condition keyed on this choice points at a sub-question
            // whose answer renders next to the image.
            if let Some(keyword) = item.as_str()
                && let Some(condition) = question
                    .conditions
                    .iter()
                    .find(|condition| condition.value == keyword && condition.active)
                && let Some(sub_question) = group.question(&condition.target)
            {
                entry.insert(
                    "additional".into(),
                    render_question(sub_question, group, record, context),
                );
            }
            Some(Value::Object(entry))
        })
        .collect();
    if values.is_empty() {
        return Value::String(NOT_AVAILABLE.to_string());
    }
    json!({
        "template": "image_checkbox",
        "key": question.label_view,
        "values": values,
    })
}

fn render_file(question: &Question, value: &Value, context: &RenderContext<'_>) -> Value {
    let uids: Vec<&str> = match value {
        Value::Array(items) => items.iter().filter_map(Value::as_str).collect(),
        Value::String(uid) => vec![uid.as_str()],
        _ => Vec::new(),
    };
    let values: Vec<Value> = uids
        .iter()
        .map(|uid| {
            let descriptor = context.files.get_data(uid);
            json!({
                "url": descriptor.url,
                "content_type": descriptor.content_type,
                "preview_image": descriptor.preview_image,
            })
        })
        .collect();
    json!({
        "template": "file",
        "key": question.label_view,
        "values": values,
    })
}

fn render_user(question: &Question, value: &Value, context: &RenderContext<'_>) -> Value {
    let id = match value {
        Value::String(id) => id.clone(),
        Value::Number(id) => id.to_string(),
        _ => return Value::String(NOT_AVAILABLE.to_string()),
    };
    match context.directory.user_by_id(&id) {
        Some(user) => json!({
            "template": "user_display",
            "key": question.label_view,
            "value": user.display_name,
        }),
        None => json!({
            "template": "user_display",
            "key": question.label_view,
            "value": id,
            "unknown_user": true,
        }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalog::{Catalog, SlotMap};
    use crate::stores::{MemoryDirectory, NullDirectory, NullFileStore, UserRecord};
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

    fn structure() -> QuestionnaireStructure {
        let mut catalog = Catalog::new();
        catalog.create_category("s", None);
        catalog.create_category("c", None);
        catalog.create_category("sc", None);
        catalog.create_questiongroup("qg", None, Map::new());

        let mut char_config = Map::new();
        char_config.insert("type".into(), json!("char"));
        catalog.create_key("q_text", None, char_config.clone());
        catalog.create_key("q_sub", None, char_config);

        let mut measure_config = Map::new();
        measure_config.insert("type".into(), json!("measure"));
        catalog.create_key("q_measure", None, measure_config);
        for index in 0..4 {
            let translation = catalog
                .translations
                .create("value", label_slots(&format!("Level {index}")));
            catalog.create_value(
                &format!("m_{index}"),
                Some(translation),
                Some(index as i64),
                Map::new(),
            );
        }
        catalog
            .attach_values("q_measure", &["m_0", "m_1", "m_2", "m_3"])
            .unwrap();

        let mut img_config = Map::new();
        img_config.insert("type".into(), json!("image_checkbox"));
        catalog.create_key("q_img", None, img_config);
        let translation = catalog.translations.create("value", label_slots("Cropland"));
        let mut value_config = Map::new();
        value_config.insert("image_name".into(), json!("cropland.png"));
        catalog.create_value("v_crop", Some(translation), None, value_config);
        catalog.attach_values("q_img", &["v_crop"]).unwrap();

        let mut user_config = Map::new();
        user_config.insert("type".into(), json!("user_id"));
        catalog.create_key("q_user", None, user_config);

        let document = json!({
            "sections": [{
                "keyword": "s",
                "categories": [{
                    "keyword": "c",
                    "subcategories": [{
                        "keyword": "sc",
                        "questiongroups": [{
                            "keyword": "qg",
                            "questions": [
                                {"keyword": "q_text"},
                                {"keyword": "q_measure"},
                                {
                                    "keyword": "q_img",
                                    "form_options": {"conditions": ["v_crop|True|q_sub"]},
                                },
                                {"keyword": "q_sub"},
                                {"keyword": "q_user"},
                            ],
                        }],
                    }],
                }],
            }],
        })
        .as_object()
        .cloned()
        .unwrap_or_default();
        QuestionnaireStructure::build(&document, &catalog, "sample_2015", "en").unwrap()
    }

    fn context<'a>() -> RenderContext<'a> {
        RenderContext::new(&NullFileStore, &NullDirectory, "en")
    }

    fn render_one(structure: &QuestionnaireStructure, keyword: &str, record: Value) -> Value {
        let (group, question) = structure.question(keyword).unwrap();
        render_question(question, group, &record, &context())
    }

    #[test]
    fn missing_value_renders_not_available() {
        let structure = structure();
        let rendered = render_one(&structure, "q_text", json!({}));
        assert_eq!(rendered, json!(NOT_AVAILABLE));
    }

    #[test]
    fn third_of_four_measure_choices_is_level_three() {
        let structure = structure();
        let rendered = render_one(&structure, "q_measure", json!({"q_measure": 3}));
        assert_eq!(rendered["template"], json!("measure_bar"));
        assert_eq!(rendered["level"], json!(3));
        assert_eq!(rendered["value"], json!("Level 2"));
    }

    #[test]
    fn image_checkbox_renders_conditional_sub_question() {
        let structure = structure();
        let rendered = render_one(
            &structure,
            "q_img",
            json!({"q_img": ["v_crop"], "q_sub": {"en": "hello"}}),
        );
        let entry = &rendered["values"][0];
        assert_eq!(entry["label"], json!("Cropland"));
        assert_eq!(entry["image"], json!("assets/img/cropland.png"));
        assert_eq!(entry["additional"]["value"], json!("hello"));
    }

    #[test]
    fn translated_text_resolves_locale() {
        let structure = structure();
        let rendered = render_one(
            &structure,
            "q_text",
            json!({"q_text": {"en": "english", "fr": "french"}}),
        );
        assert_eq!(rendered["value"], json!("english"));
    }

    #[test]
    fn unknown_user_is_flagged() {
        let structure = structure();
        let rendered = render_one(&structure, "q_user", json!({"q_user": "17"}));
        assert_eq!(rendered["unknown_user"], json!(true));

        let mut directory = MemoryDirectory::new();
        directory.insert(
            "17",
            UserRecord {
                display_name: "A. Farmer".to_string(),
                email: "farmer@example.org".to_string(),
            },
        );
        let context = RenderContext::new(&NullFileStore, &directory, "en");
        let (group, question) = structure.question("q_user").unwrap();
        let rendered = render_question(question, group, &json!({"q_user": "17"}), &context);
        assert_eq!(rendered["value"], json!("A. Farmer"));
        assert_eq!(rendered.get("unknown_user"), None);
    }

    #[test]
    fn video_links_resolve_to_embed_urls() {
        assert_eq!(
            video_embed_url("https://www.youtube.com/watch?v=dQw4w9WgXcQ").as_deref(),
            Some("https://www.youtube.com/embed/dQw4w9WgXcQ")
        );
        assert_eq!(
            video_embed_url("https://vimeo.com/123456").as_deref(),
            Some("https://player.vimeo.com/video/123456")
        );
        assert_eq!(video_embed_url("https://example.org/clip"), None);
    }

    #[test]
    fn measure_other_takes_key_from_text_answer() {
        let mut structure = structure();
        structure.sections[0].categories[0].subcategories[0].questiongroups[0]
            .view_options
            .insert("extra".into(), json!("measure_other"));
        let rendered = render_one(
            &structure,
            "q_measure",
            json!({"q_measure": 1, "q_text": {"en": "Soil erosion"}}),
        );
        assert_eq!(rendered["key"], json!("Soil erosion"));
    }

    #[test]
    fn raw_data_pairs_values_with_labels() {
        let structure = structure();
        let answers = json!({"qg": [{"q_text": {"en": "terrace"}, "q_user": "17"}]})
            .as_object()
            .cloned()
            .unwrap_or_default();
        let data = raw_document_data(&structure, &answers);
        assert_eq!(data["q_text"], json!([{"en": "terrace"}]));
        assert!(data.contains_key("label_q_text"));
        assert!(!data.contains_key("q_measure"));
    }

    #[test]
    fn raw_template_skips_render_model() {
        let mut structure = structure();
        {
            let section = &mut structure.sections[0];
            let group = &mut section.categories[0].subcategories[0].questiongroups[0];
            let question = group
                .questions
                .iter_mut()
                .find(|question| question.keyword == "q_text")
                .unwrap();
            question
                .view_options
                .insert("template".into(), json!("raw"));
        }
        let rendered = render_one(&structure, "q_text", json!({"q_text": "plain"}));
        assert_eq!(rendered, json!({"key": "", "value": "plain"}));
    }
}
