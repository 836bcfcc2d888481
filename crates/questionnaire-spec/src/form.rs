//! Language-neutral form scaffolding built from the typed tree.
//!
//! The output is pure data; an external layer turns it into HTML or
//! JSON forms. No I/O happens here, linked-questionnaire initial data
//! comes in through [`FormBuildOptions`].

use std::collections::BTreeMap;

use serde_json::{Map, Value, json};
use time::OffsetDateTime;

use crate::answers::{AnswerDocument, records, sorted_records};
use crate::question::{FieldType, Question};
use crate::structure::ORDER_FIELD;
use crate::tree::{Numbered, Questiongroup, QuestionnaireStructure};
use crate::walker::walk_with;

/// Widget an external renderer should use for a field.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WidgetKind {
    Checkbox,
    Date,
    File,
    Hidden,
    ImageCheckbox,
    MeasureBar,
    MeasureBarStacked,
    Number,
    RadioSelect,
    Select,
    Text,
    Textarea,
}

/// Client-side validation hints attached to a field.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Validators {
    pub required: bool,
    pub max_length: Option<u64>,
    pub min: Option<i64>,
    pub max: Option<i64>,
}

/// One form field of one repetition of a questiongroup.
#[derive(Debug, Clone, PartialEq)]
pub struct FieldDescriptor {
    /// `<group>-<repetition>-<question>`, unique within the form.
    pub field_id: String,
    pub field_type: FieldType,
    pub label: String,
    pub helptext: String,
    pub widget_kind: WidgetKind,
    pub readonly: bool,
    /// Widget metadata such as `data-question-conditions`.
    pub attrs: Map<String, Value>,
    pub choices: Vec<(Value, String)>,
    pub validators: Validators,
    pub initial: Option<Value>,
}

/// All repetitions of one questiongroup.
#[derive(Debug, Clone)]
pub struct GroupForm {
    pub keyword: String,
    pub label: String,
    pub numbered: Numbered,
    pub min_num: usize,
    pub max_num: usize,
    pub repetitions: Vec<Vec<FieldDescriptor>>,
}

/// The form description for a whole tree, groups in declaration order.
#[derive(Debug, Clone, Default)]
pub struct FormDescription {
    pub groups: Vec<GroupForm>,
}

impl FormDescription {
    pub fn group(&self, keyword: &str) -> Option<&GroupForm> {
        self.groups.iter().find(|group| group.keyword == keyword)
    }
}

/// Options of one form build.
#[derive(Debug, Clone)]
pub struct FormBuildOptions {
    /// Year substituted for `"max": "now"` bounds on numeric fields.
    pub now_year: i64,
    /// Whether surfaced `required` flags become validators.
    pub enforce_required: bool,
    /// Ids of linked questionnaires per configuration code, used as
    /// initial data for groups declaring `link`.
    pub linked: BTreeMap<String, Vec<Value>>,
    /// Locale whose stored text fills the editable original field of
    /// translated questions; any other stored locale fills the
    /// read-only translation field.
    pub locale: String,
}

impl Default for FormBuildOptions {
    fn default() -> Self {
        FormBuildOptions {
            now_year: OffsetDateTime::now_utc().year() as i64,
            enforce_required: false,
            linked: BTreeMap::new(),
            locale: "en".to_string(),
        }
    }
}

/// Build the form description for a tree and optional initial answers.
pub fn build_form(
    structure: &QuestionnaireStructure,
    initial: Option<&AnswerDocument>,
    options: &FormBuildOptions,
) -> FormDescription {
    let empty = Map::new();
    let document = initial.unwrap_or(&empty);
    let mut description = FormDescription::default();
    let mut seen: Vec<String> = Vec::new();

    // The walker visits per question; collect group forms once each.
    walk_with(structure, document, |_question, scope, _records| {
        let group = scope.questiongroup;
        if !seen.iter().any(|keyword| *keyword == group.keyword) {
            seen.push(group.keyword.clone());
            description
                .groups
                .push(build_group_form(group, document, options));
        }
        Value::Null
    });
    description
}

fn build_group_form(
    group: &Questiongroup,
    document: &AnswerDocument,
    options: &FormBuildOptions,
) -> GroupForm {
    let linked_initial: Vec<Value> = group
        .link
        .as_ref()
        .and_then(|code| options.linked.get(code))
        .map(|ids| {
            ids.iter()
                .map(|id| json!({"link_id": id}))
                .collect()
        })
        .unwrap_or_default();

    let stored = records(document, &group.keyword);
    let initial_records: Vec<Value> = if !linked_initial.is_empty() {
        linked_initial
    } else if group.numbered == Numbered::None {
        stored.to_vec()
    } else {
        sorted_records(stored)
    };

    let count = if initial_records.is_empty() {
        group.max_num.max(group.min_num)
    } else {
        initial_records.len()
    };

    let mut repetitions = Vec::with_capacity(count);
    for index in 0..count {
        let record = initial_records.get(index);
        let mut fields = Vec::new();
        for question in &group.questions {
            build_fields(group, question, index, record, options, &mut fields);
        }
        if group.numbered != Numbered::None {
            fields.push(FieldDescriptor {
                field_id: field_id(group, index, ORDER_FIELD),
                field_type: FieldType::Hidden,
                label: String::new(),
                helptext: String::new(),
                widget_kind: WidgetKind::Hidden,
                readonly: false,
                attrs: Map::new(),
                choices: Vec::new(),
                validators: Validators::default(),
                initial: Some(json!(index as i64 + 1)),
            });
        }
        repetitions.push(fields);
    }

    GroupForm {
        keyword: group.keyword.clone(),
        label: group.label.clone(),
        numbered: group.numbered,
        min_num: group.min_num,
        max_num: group.max_num,
        repetitions,
    }
}

fn field_id(group: &Questiongroup, index: usize, keyword: &str) -> String {
    format!("{}-{}-{}", group.keyword, index, keyword)
}

fn build_fields(
    group: &Questiongroup,
    question: &Question,
    index: usize,
    record: Option<&Value>,
    options: &FormBuildOptions,
    fields: &mut Vec<FieldDescriptor>,
) {
    let initial = record
        .and_then(|record| record.as_object())
        .and_then(|fields| fields.get(&question.keyword))
        .cloned();

    if question.field_type.is_translated() {
        // Translated free text spans three fields: the editable
        // original, a read-only translation and the hidden prior value.
        let (original, translation) = split_translated(initial.as_ref(), &options.locale);
        fields.push(translated_field(
            group, question, index, "original", original.clone(), false, options,
        ));
        fields.push(translated_field(
            group, question, index, "translation", translation, true, options,
        ));
        fields.push(translated_field(
            group, question, index, "old", original, true, options,
        ));
        return;
    }

    fields.push(FieldDescriptor {
        field_id: field_id(group, index, &question.keyword),
        field_type: question.field_type,
        label: field_label(question),
        helptext: question.helptext.clone(),
        widget_kind: widget_kind(question),
        readonly: question.field_type == FieldType::Todo,
        attrs: condition_attrs(group, question),
        choices: question
            .choices
            .iter()
            .map(|choice| (choice.key.clone(), choice.label.clone()))
            .collect(),
        validators: validators(question, options),
        initial,
    });
}

fn split_translated(initial: Option<&Value>, locale: &str) -> (Option<Value>, Option<Value>) {
    let Some(translations) = initial.and_then(Value::as_object) else {
        return (initial.cloned(), None);
    };
    let original_locale = if translations.contains_key(locale) {
        Some(locale)
    } else {
        // No text in the requested locale; fall back to the first
        // stored one.
        translations.keys().next().map(String::as_str)
    };
    let original = original_locale
        .and_then(|code| translations.get(code))
        .cloned();
    let translation = translations
        .iter()
        .find(|(code, _)| Some(code.as_str()) != original_locale)
        .map(|(_, text)| text.clone());
    (original, translation)
}

fn translated_field(
    group: &Questiongroup,
    question: &Question,
    index: usize,
    prefix: &str,
    initial: Option<Value>,
    readonly: bool,
    options: &FormBuildOptions,
) -> FieldDescriptor {
    let widget = if prefix == "old" {
        WidgetKind::Hidden
    } else if question.field_type == FieldType::Text {
        WidgetKind::Textarea
    } else {
        WidgetKind::Text
    };
    FieldDescriptor {
        field_id: field_id(group, index, &format!("{prefix}_{}", question.keyword)),
        field_type: question.field_type,
        label: field_label(question),
        helptext: question.helptext.clone(),
        widget_kind: widget,
        readonly,
        attrs: condition_attrs(group, question),
        choices: Vec::new(),
        validators: validators(question, options),
        initial,
    }
}

fn field_label(question: &Question) -> String {
    if question.field_type == FieldType::CbBool {
        // The key label doubles as the single choice's label.
        String::new()
    } else {
        question.label.clone()
    }
}

fn widget_kind(question: &Question) -> WidgetKind {
    match question.field_type {
        FieldType::Bool | FieldType::Radio => WidgetKind::RadioSelect,
        FieldType::CbBool | FieldType::Checkbox => WidgetKind::Checkbox,
        FieldType::Char | FieldType::LinkVideo | FieldType::UserId => WidgetKind::Text,
        FieldType::Date => WidgetKind::Date,
        FieldType::File | FieldType::Image => WidgetKind::File,
        FieldType::Float | FieldType::Int => WidgetKind::Number,
        FieldType::Hidden | FieldType::LinkId | FieldType::Map => WidgetKind::Hidden,
        FieldType::ImageCheckbox => WidgetKind::ImageCheckbox,
        FieldType::Measure => {
            if question.form_options.get("layout").and_then(Value::as_str) == Some("stacked") {
                WidgetKind::MeasureBarStacked
            } else {
                WidgetKind::MeasureBar
            }
        }
        FieldType::Select | FieldType::SelectType => WidgetKind::Select,
        FieldType::Text | FieldType::Todo => WidgetKind::Textarea,
    }
}

/// Conditions are not evaluated at build time; they ride along as
/// widget metadata for the rendering layer.
fn condition_attrs(group: &Questiongroup, question: &Question) -> Map<String, Value> {
    let mut attrs = Map::new();
    if !question.conditions.is_empty() {
        let raw: Vec<&str> = question
            .conditions
            .iter()
            .map(|condition| condition.raw.as_str())
            .collect();
        attrs.insert("data-conditions".into(), json!(raw));
    }
    if !question.question_conditions.is_empty() {
        let raw: Vec<&str> = question
            .question_conditions
            .iter()
            .map(|condition| condition.raw.as_str())
            .collect();
        attrs.insert("data-question-conditions".into(), json!(raw));
    }
    if !question.questiongroup_conditions.is_empty() {
        let raw: Vec<&str> = question
            .questiongroup_conditions
            .iter()
            .map(|condition| condition.raw.as_str())
            .collect();
        attrs.insert("data-questiongroup-conditions".into(), json!(raw));
    }
    if let Some(name) = &question.question_condition {
        attrs.insert("data-question-condition".into(), json!(name));
    }
    if let Some(name) = &group.questiongroup_condition {
        attrs.insert("data-questiongroup-condition".into(), json!(name));
    }
    attrs
}

fn validators(question: &Question, options: &FormBuildOptions) -> Validators {
    let bound = |field: &str| {
        let raw = question.form_options.get(field)?;
        if raw.as_str() == Some("now") {
            Some(options.now_year)
        } else {
            raw.as_i64()
        }
    };
    Validators {
        required: question.required && options.enforce_required,
        max_length: question.max_length,
        min: bound("min"),
        max: bound("max"),
    }
}
