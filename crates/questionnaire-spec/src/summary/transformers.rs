//! Built-in `get_value` transformers of the summary projector.
//!
//! Each transformer is a pure function of the question, its answer
//! slice and the surrounding subtree. Configurations select one by name
//! through `summary.<type>.get_value.name`.

use serde_json::{Map, Value, json};

use crate::answers::{AnswerDocument, record_value, records};
use crate::question::{FieldType, Question};
use crate::render::render_raw;
use crate::tree::{Questiongroup, QuestionnaireStructure, Subcategory};
use crate::walker::WalkScope;

use super::SummaryContext;

/// Everything a transformer may look at.
pub struct TransformerInput<'a> {
    pub structure: &'a QuestionnaireStructure,
    pub document: &'a AnswerDocument,
    pub question: &'a Question,
    pub scope: &'a WalkScope<'a, 'a>,
    pub records: &'a [Value],
    pub context: &'a SummaryContext<'a>,
    pub kwargs: &'a Map<String, Value>,
}

pub type Transformer = for<'a> fn(&TransformerInput<'a>) -> Value;

/// Resolve a transformer by its configured name.
pub fn lookup_transformer(name: &str) -> Option<Transformer> {
    let transformer: Transformer = match name {
        "get_map_values" => get_map_values,
        "get_full_range_values" => get_full_range_values,
        "get_picto_and_nested_values" => get_picto_and_nested_values,
        "get_table" => get_table,
        "get_qg_values_with_label_scale" => get_qg_values_with_label_scale,
        "get_human_env_access" => get_human_env_access,
        "get_tech_costbenefit" => get_tech_costbenefit,
        "get_impact" => get_impact,
        "get_climate_change" => get_climate_change,
        "get_aims_enabling" => get_aims_enabling,
        "get_stakeholders_roles" => get_stakeholders_roles,
        "get_involvement" => get_involvement,
        "get_highlight_element" => get_highlight_element,
        "get_highlight_element_with_text" => get_highlight_element_with_text,
        "get_financing_subsidies" => get_financing_subsidies,
        "get_impacts_motivation" => get_impacts_motivation,
        "get_impacts" => get_impacts,
        _ => return None,
    };
    Some(transformer)
}

/// Stored answer values of a choice question, normalized to a list.
fn selected_values<'v>(question: &Question, record: &'v Value) -> Vec<&'v Value> {
    match record_value(record, &question.keyword) {
        Some(Value::Array(items)) => items.iter().collect(),
        Some(scalar) => vec![scalar],
        None => Vec::new(),
    }
}

fn first_record(input: &TransformerInput<'_>) -> Value {
    input.records.first().cloned().unwrap_or(Value::Null)
}

/// Implicit scale level of a stored measure value.
fn level_of(question: &Question, record: &Value) -> Option<i64> {
    let value = record_value(record, &question.keyword)?;
    let index = question.choice_index(value)?;
    Some((index as f64 / question.choices.len() as f64 * 5.0).round() as i64)
}

fn label_of(question: &Question, record: &Value) -> Option<String> {
    let value = record_value(record, &question.keyword)?;
    question.choice_label(value).map(str::to_string)
}

fn text_of(question: &Question, record: &Value, locale: &str) -> Option<String> {
    let value = record_value(record, &question.keyword)?;
    match value {
        Value::String(text) => Some(text.clone()),
        Value::Object(translations) => translations
            .get(locale)
            .or_else(|| translations.values().next())
            .and_then(Value::as_str)
            .map(str::to_string),
        other => Some(other.to_string()),
    }
}

/// First question of a group matching a predicate.
fn find_question<'g>(
    group: &'g Questiongroup,
    predicate: impl Fn(&Question) -> bool,
) -> Option<&'g Question> {
    group.questions.iter().find(|question| predicate(question))
}

/// Sibling groups gated by one of this question's
/// `questiongroup_conditions` targets.
fn gated_siblings<'a>(input: &TransformerInput<'a>) -> Vec<&'a Questiongroup> {
    let record = first_record(input);
    let mut gated = Vec::new();
    for condition in &input.question.questiongroup_conditions {
        let active = record_value(&record, &input.question.keyword)
            .is_some_and(|value| condition.evaluate(value));
        if !active {
            continue;
        }
        for group in input.scope.sibling_groups() {
            if group.questiongroup_condition.as_deref() == Some(condition.target.as_str()) {
                gated.push(group);
            }
        }
    }
    gated
}

/// `{img_url, coordinates}` from the questionnaire's geometry.
fn get_map_values(input: &TransformerInput<'_>) -> Value {
    let coordinates = input
        .context
        .geometry
        .as_ref()
        .map(collect_coordinates)
        .unwrap_or_default();
    json!({
        "img_url": input.kwargs.get("img_url").cloned().unwrap_or(json!("")),
        "coordinates": coordinates,
    })
}

fn collect_coordinates(geometry: &Value) -> Vec<Value> {
    let mut points = Vec::new();
    match geometry.get("type").and_then(Value::as_str) {
        Some("Point") => {
            if let Some(coordinates) = geometry.get("coordinates") {
                points.push(coordinates.clone());
            }
        }
        Some("GeometryCollection") => {
            if let Some(geometries) = geometry.get("geometries").and_then(Value::as_array) {
                for nested in geometries {
                    points.extend(collect_coordinates(nested));
                }
            }
        }
        Some("FeatureCollection") => {
            if let Some(features) = geometry.get("features").and_then(Value::as_array) {
                for feature in features {
                    if let Some(nested) = feature.get("geometry") {
                        points.extend(collect_coordinates(nested));
                    }
                }
            }
        }
        _ => {}
    }
    points
}

/// Every choice of the key, marked with whether it is selected.
fn get_full_range_values(input: &TransformerInput<'_>) -> Value {
    let record = first_record(input);
    let is_radio = input
        .kwargs
        .get("is_radio")
        .and_then(Value::as_bool)
        .unwrap_or(false);
    let selected = selected_values(input.question, &record);
    let values: Vec<Value> = input
        .question
        .choices
        .iter()
        .map(|choice| {
            let highlighted = if is_radio {
                selected.first().is_some_and(|value| **value == choice.key)
            } else {
                selected.iter().any(|value| **value == choice.key)
            };
            json!({"text": choice.label, "highlighted": highlighted})
        })
        .collect();
    Value::Array(values)
}

/// Selected pictograms joined with the labelled answers of the nested
/// groups their selection activates.
fn get_picto_and_nested_values(input: &TransformerInput<'_>) -> Value {
    let record = first_record(input);
    let locale = &input.context.render.locale;
    let values: Vec<Value> = selected_values(input.question, &record)
        .into_iter()
        .filter_map(|value| {
            let index = input.question.choice_index(value)?;
            let mut nested = Vec::new();
            for group in gated_siblings(input) {
                for group_record in records(input.document, &group.keyword) {
                    for sub_question in &group.questions {
                        if let Some(text) = text_of(sub_question, group_record, locale) {
                            nested.push(json!(format!("{}: {text}", sub_question.label)));
                        }
                    }
                }
            }
            Some(json!({
                "text": input.question.choices[index].label,
                "image": input.question.images.get(index).cloned().unwrap_or_default(),
                "nested": nested,
            }))
        })
        .collect();
    Value::Array(values)
}

/// Tabular projection driven by `table_grouping` on the subcategory:
/// a list of questiongroup keyword lists, one partial table each.
/// Groups with a keyword ending in `_total` feed the total row.
fn get_table(input: &TransformerInput<'_>) -> Value {
    let subcategory: &Subcategory = input.scope.subcategory();
    let grouping = subcategory
        .view_options
        .get("table_grouping")
        .and_then(Value::as_array)
        .cloned()
        .unwrap_or_default();

    let mut head: Vec<Value> = Vec::new();
    let mut partials = Vec::new();
    let mut total = Value::Null;

    for group_list in &grouping {
        let keywords: Vec<&str> = group_list
            .as_array()
            .map(|list| list.iter().filter_map(Value::as_str).collect())
            .unwrap_or_default();
        for keyword in keywords {
            let Some(group) = input
                .scope
                .sibling_groups()
                .iter()
                .find(|group| group.keyword == keyword)
            else {
                continue;
            };
            if head.is_empty() {
                head = group
                    .questions
                    .iter()
                    .map(|question| json!(question.label))
                    .collect();
            }
            let items: Vec<Value> = records(input.document, &group.keyword)
                .iter()
                .map(|record| {
                    let cells: Vec<Value> = group
                        .questions
                        .iter()
                        .map(|question| {
                            render_raw(question, group, record, &input.context.render)
                        })
                        .collect();
                    Value::Array(cells)
                })
                .collect();
            if keyword.ends_with("_total") {
                total = items
                    .first()
                    .and_then(|row| row.as_array())
                    .and_then(|cells| cells.first())
                    .cloned()
                    .unwrap_or(Value::Null);
            } else {
                partials.push(json!({"head": group.label, "items": items}));
            }
        }
    }
    json!({"head": head, "partials": partials, "total": total})
}

/// One scale bar per sibling questiongroup carrying an answered
/// measure question.
fn get_qg_values_with_label_scale(input: &TransformerInput<'_>) -> Value {
    let values: Vec<Value> = input
        .scope
        .sibling_groups()
        .iter()
        .filter_map(|group| {
            let question = find_question(group, |question| {
                question.field_type == FieldType::Measure
            })?;
            let record = records(input.document, &group.keyword).first()?.clone();
            Some(json!({
                "label": group.label,
                "value": label_of(question, &record),
                "level": level_of(question, &record),
            }))
        })
        .collect();
    Value::Array(values)
}

/// Access rows: per sibling group, its measure answer against the
/// group label.
fn get_human_env_access(input: &TransformerInput<'_>) -> Value {
    get_qg_values_with_label_scale(input)
}

/// Cost/benefit pairing: one `{label, level}` per measure question of
/// the own group's first record.
fn get_tech_costbenefit(input: &TransformerInput<'_>) -> Value {
    let record = first_record(input);
    let values: Vec<Value> = input
        .scope
        .questiongroup
        .questions
        .iter()
        .filter(|question| question.field_type == FieldType::Measure)
        .filter_map(|question| {
            Some(json!({
                "label": question.label,
                "value": label_of(question, &record)?,
                "level": level_of(question, &record)?,
            }))
        })
        .collect();
    Value::Array(values)
}

/// Impact rows over the groups this question's conditions activate:
/// label, scale level and the free-text comment of each.
fn get_impact(input: &TransformerInput<'_>) -> Value {
    let locale = &input.context.render.locale;
    let values: Vec<Value> = gated_siblings(input)
        .into_iter()
        .flat_map(|group| {
            records(input.document, &group.keyword)
                .iter()
                .filter_map(|record| {
                    let measure = find_question(group, |question| {
                        question.field_type == FieldType::Measure
                    })?;
                    let comment = find_question(group, |question| {
                        question.field_type.is_translated()
                    })
                    .and_then(|question| text_of(question, record, locale));
                    Some(json!({
                        "label": group.label,
                        "value": label_of(measure, record),
                        "level": level_of(measure, record)?,
                        "comment": comment,
                    }))
                })
                .collect::<Vec<Value>>()
        })
        .collect();
    Value::Array(values)
}

/// Exposure/sensitivity matrix: one block per nested subcategory, one
/// scale row per answered group inside it.
fn get_climate_change(input: &TransformerInput<'_>) -> Value {
    let blocks: Vec<Value> = input
        .scope
        .subcategory()
        .subcategories
        .iter()
        .map(|nested| {
            let items: Vec<Value> = nested
                .questiongroups
                .iter()
                .filter_map(|group| {
                    let measure = find_question(group, |question| {
                        question.field_type == FieldType::Measure
                    })?;
                    let record = records(input.document, &group.keyword).first()?.clone();
                    Some(json!({
                        "label": group.label,
                        "value": label_of(measure, &record),
                        "level": level_of(measure, &record),
                    }))
                })
                .collect();
            json!({"label": nested.label, "items": items})
        })
        .collect();
    Value::Array(blocks)
}

/// Free-text aims collected across all records of the own group.
fn get_aims_enabling(input: &TransformerInput<'_>) -> Value {
    let locale = &input.context.render.locale;
    let values: Vec<Value> = input
        .records
        .iter()
        .filter_map(|record| text_of(input.question, record, locale))
        .map(Value::String)
        .collect();
    Value::Array(values)
}

/// Stakeholder rows: the choice labels of this question next to the
/// free-text role of the same record.
fn get_stakeholders_roles(input: &TransformerInput<'_>) -> Value {
    let locale = &input.context.render.locale;
    let role_question = role_question(input);
    let values: Vec<Value> = input
        .records
        .iter()
        .filter_map(|record| {
            let stakeholders: Vec<Value> = selected_values(input.question, record)
                .into_iter()
                .filter_map(|value| input.question.choice_label(value))
                .map(|label| json!(label))
                .collect();
            if stakeholders.is_empty() {
                return None;
            }
            let role = role_question
                .and_then(|question| text_of(question, record, locale));
            Some(json!({"stakeholders": stakeholders, "role": role}))
        })
        .collect();
    Value::Array(values)
}

fn role_question<'a>(input: &TransformerInput<'a>) -> Option<&'a Question> {
    let configured = input.kwargs.get("role_question").and_then(Value::as_str);
    input
        .scope
        .questiongroup
        .questions
        .iter()
        .find(|question| match configured {
            Some(keyword) => question.keyword == keyword,
            None => question.field_type.is_translated(),
        })
}

/// Involvement rows: selected phase label plus the record's comment.
fn get_involvement(input: &TransformerInput<'_>) -> Value {
    let locale = &input.context.render.locale;
    let comment_question = find_question(input.scope.questiongroup, |question| {
        question.field_type.is_translated()
    });
    let values: Vec<Value> = input
        .records
        .iter()
        .filter_map(|record| {
            let label = label_of(input.question, record)?;
            let comment =
                comment_question.and_then(|question| text_of(question, record, locale));
            Some(json!({"label": label, "comment": comment}))
        })
        .collect();
    Value::Array(values)
}

/// A single highlight flag from a bool answer.
fn get_highlight_element(input: &TransformerInput<'_>) -> Value {
    let record = first_record(input);
    let highlighted = record_value(&record, &input.question.keyword)
        .is_some_and(|value| value == &json!(1) || value == &json!(true));
    json!({"highlighted": highlighted})
}

/// Highlight flag plus the answer of a companion text question, named
/// by `kwargs.text_question` or defaulting to the first translated
/// sibling.
fn get_highlight_element_with_text(input: &TransformerInput<'_>) -> Value {
    let record = first_record(input);
    let locale = &input.context.render.locale;
    let mut value = get_highlight_element(input);
    let text = role_question(input)
        .and_then(|question| text_of(question, &record, locale));
    if let Some(fields) = value.as_object_mut() {
        fields.insert("text".into(), text.map(Value::String).unwrap_or(Value::Null));
    }
    value
}

/// Selected subsidy items joined with their conditional comment
/// sub-answers.
fn get_financing_subsidies(input: &TransformerInput<'_>) -> Value {
    let record = first_record(input);
    let values: Vec<Value> = selected_values(input.question, &record)
        .into_iter()
        .filter_map(|value| {
            let label = input.question.choice_label(value)?;
            let comment = value
                .as_str()
                .and_then(|keyword| {
                    input
                        .question
                        .conditions
                        .iter()
                        .find(|condition| condition.value == keyword && condition.active)
                })
                .and_then(|condition| {
                    input.scope.questiongroup.question(&condition.target)
                })
                .and_then(|sub_question| {
                    text_of(sub_question, &record, &input.context.render.locale)
                });
            Some(json!({"label": label, "comment": comment}))
        })
        .collect();
    Value::Array(values)
}

/// Labels of all selected motivation choices.
fn get_impacts_motivation(input: &TransformerInput<'_>) -> Value {
    let record = first_record(input);
    let values: Vec<Value> = selected_values(input.question, &record)
        .into_iter()
        .filter_map(|value| input.question.choice_label(value))
        .map(|label| json!(label))
        .collect();
    Value::Array(values)
}

/// Impact rows over this question's own records: scale level next to
/// the record's comment text.
fn get_impacts(input: &TransformerInput<'_>) -> Value {
    let locale = &input.context.render.locale;
    let comment_question = find_question(input.scope.questiongroup, |question| {
        question.field_type.is_translated()
    });
    let values: Vec<Value> = input
        .records
        .iter()
        .filter_map(|record| {
            let level = level_of(input.question, record)?;
            let comment =
                comment_question.and_then(|question| text_of(question, record, locale));
            Some(json!({
                "label": label_of(input.question, record),
                "level": level,
                "comment": comment,
            }))
        })
        .collect();
    Value::Array(values)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalog::{Catalog, SlotMap};
    use crate::render::RenderContext;
    use crate::stores::{NullDirectory, NullFileStore};
    use crate::tree::QuestionnaireStructure;
    use crate::walker::walk_with;
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

        let mut radio_config = Map::new();
        radio_config.insert("type".into(), json!("radio"));
        catalog.create_key("q_choice", None, radio_config);
        for keyword in ["v_low", "v_high"] {
            let translation = catalog.translations.create("value", label_slots(keyword));
            catalog.create_value(keyword, Some(translation), None, Map::new());
        }
        catalog.attach_values("q_choice", &["v_low", "v_high"]).unwrap();

        let mut char_config = Map::new();
        char_config.insert("type".into(), json!("char"));
        catalog.create_key("q_role", None, char_config);

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
                                {"keyword": "q_choice"},
                                {"keyword": "q_role"},
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

    fn gated_structure() -> QuestionnaireStructure {
        let mut catalog = Catalog::new();
        catalog.create_category("s", None);
        catalog.create_category("c", None);
        catalog.create_category("sc", None);
        for group in ["qg_picto", "qg_gated", "qg_other"] {
            catalog.create_questiongroup(group, None, Map::new());
        }

        let mut picto_config = Map::new();
        picto_config.insert("type".into(), json!("image_checkbox"));
        catalog.create_key("q_picto", None, picto_config);
        let translation = catalog.translations.create("value", label_slots("v_a"));
        let mut value_config = Map::new();
        value_config.insert("image_name".into(), json!("flag.png"));
        catalog.create_value("v_a", Some(translation), None, value_config);
        catalog.attach_values("q_picto", &["v_a"]).unwrap();

        let mut char_config = Map::new();
        char_config.insert("type".into(), json!("char"));
        catalog.create_key("q_inside", None, char_config.clone());
        catalog.create_key("q_outside", None, char_config);

        let document = json!({
            "sections": [{
                "keyword": "s",
                "categories": [{
                    "keyword": "c",
                    "subcategories": [{
                        "keyword": "sc",
                        "questiongroups": [
                            {
                                "keyword": "qg_picto",
                                "questions": [{
                                    "keyword": "q_picto",
                                    "form_options": {
                                        "questiongroup_conditions": ["=='v_a'|gated"],
                                    },
                                }],
                            },
                            {
                                "keyword": "qg_gated",
                                "form_options": {"questiongroup_condition": "gated"},
                                "questions": [{"keyword": "q_inside"}],
                            },
                            {
                                "keyword": "qg_other",
                                "questions": [{"keyword": "q_outside"}],
                            },
                        ],
                    }],
                }],
            }],
        })
        .as_object()
        .cloned()
        .unwrap_or_default();
        QuestionnaireStructure::build(&document, &catalog, "sample_2015", "en").unwrap()
    }

    fn run_transformer(
        structure: &QuestionnaireStructure,
        document: &AnswerDocument,
        keyword: &str,
        transformer: Transformer,
        kwargs: Map<String, Value>,
    ) -> Value {
        let context = SummaryContext::new(RenderContext::new(&NullFileStore, &NullDirectory, "en"));
        let mut result = Value::Null;
        walk_with(structure, document, |question, scope, records| {
            if question.keyword == keyword {
                result = transformer(&TransformerInput {
                    structure,
                    document,
                    question,
                    scope,
                    records,
                    context: &context,
                    kwargs: &kwargs,
                });
            }
            Value::Null
        });
        result
    }

    #[test]
    fn full_range_marks_selected_choice() {
        let structure = structure();
        let answers = json!({"qg": [{"q_choice": "v_high"}]})
            .as_object()
            .cloned()
            .unwrap_or_default();
        let mut kwargs = Map::new();
        kwargs.insert("is_radio".into(), json!(true));
        let result =
            run_transformer(&structure, &answers, "q_choice", get_full_range_values, kwargs);
        assert_eq!(
            result,
            json!([
                {"text": "v_low", "highlighted": false},
                {"text": "v_high", "highlighted": true},
            ])
        );
    }

    #[test]
    fn stakeholders_pair_choices_with_role_text() {
        let structure = structure();
        let answers = json!({
            "qg": [{"q_choice": "v_low", "q_role": {"en": "advisor"}}],
        })
        .as_object()
        .cloned()
        .unwrap_or_default();
        let result = run_transformer(
            &structure,
            &answers,
            "q_choice",
            get_stakeholders_roles,
            Map::new(),
        );
        assert_eq!(
            result,
            json!([{"stakeholders": ["v_low"], "role": "advisor"}])
        );
    }

    #[test]
    fn highlight_element_reads_bool_values() {
        let structure = structure();
        let answers = json!({"qg": [{"q_choice": 1}]})
            .as_object()
            .cloned()
            .unwrap_or_default();
        let result = run_transformer(
            &structure,
            &answers,
            "q_choice",
            get_highlight_element,
            Map::new(),
        );
        assert_eq!(result, json!({"highlighted": true}));
    }

    #[test]
    fn picto_nested_values_join_only_gated_siblings() {
        let structure = gated_structure();
        let answers = json!({
            "qg_picto": [{"q_picto": ["v_a"]}],
            "qg_gated": [{"q_inside": {"en": "inside"}}],
            "qg_other": [{"q_outside": {"en": "outside"}}],
        })
        .as_object()
        .cloned()
        .unwrap_or_default();
        let result = run_transformer(
            &structure,
            &answers,
            "q_picto",
            get_picto_and_nested_values,
            Map::new(),
        );
        assert_eq!(
            result,
            json!([{
                "text": "v_a",
                "image": "assets/img/flag.png",
                "nested": [": inside"],
            }])
        );
    }

    #[test]
    fn unselected_picto_gates_no_siblings() {
        let structure = gated_structure();
        let answers = json!({
            "qg_picto": [{"q_picto": []}],
            "qg_gated": [{"q_inside": {"en": "inside"}}],
        })
        .as_object()
        .cloned()
        .unwrap_or_default();
        let result = run_transformer(
            &structure,
            &answers,
            "q_picto",
            get_picto_and_nested_values,
            Map::new(),
        );
        assert_eq!(result, json!([]));
    }

    #[test]
    fn map_values_collect_geometry_points() {
        let geometry = json!({
            "type": "FeatureCollection",
            "features": [
                {"geometry": {"type": "Point", "coordinates": [7.4, 46.9]}},
                {"geometry": {"type": "Point", "coordinates": [8.5, 47.3]}},
            ],
        });
        assert_eq!(
            collect_coordinates(&geometry),
            vec![json!([7.4, 46.9]), json!([8.5, 47.3])]
        );
    }

    #[test]
    fn unknown_transformer_name_is_none() {
        assert!(lookup_transformer("get_everything").is_none());
        assert!(lookup_transformer("get_table").is_some());
    }
}
