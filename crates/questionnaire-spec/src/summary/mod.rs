//! Projection of an answer document onto named summary slots.
//!
//! Questions opt in through their `summary` directive; the projector
//! walks the tree and fills a flat `{field_name → value}` map. The
//! first write to a slot wins, later writes only log a diagnostic.

mod transformers;

pub use transformers::{TransformerInput, lookup_transformer};

use serde_json::{Map, Value};
use tracing::warn;

use crate::answers::AnswerDocument;
use crate::error::ConfigurationError;
use crate::question::Question;
use crate::render::{RenderContext, render_raw};
use crate::tree::QuestionnaireStructure;
use crate::walker::{WalkScope, walk_with};

/// Collaborators of one projection pass.
pub struct SummaryContext<'a> {
    pub render: RenderContext<'a>,
    /// GeoJSON geometry of the questionnaire, for `get_map_values`.
    pub geometry: Option<Value>,
}

impl<'a> SummaryContext<'a> {
    pub fn new(render: RenderContext<'a>) -> Self {
        SummaryContext {
            render,
            geometry: None,
        }
    }
}

/// Project an answer document for one summary type.
pub fn project(
    structure: &QuestionnaireStructure,
    document: &AnswerDocument,
    summary_type: &str,
    context: &SummaryContext<'_>,
) -> Result<Map<String, Value>, ConfigurationError> {
    let mut slots = Map::new();
    let mut first_error: Option<ConfigurationError> = None;

    walk_with(structure, document, |question, scope, records| {
        if first_error.is_some() {
            return Value::Null;
        }
        if let Err(error) = project_question(
            structure,
            document,
            summary_type,
            context,
            question,
            scope,
            records,
            &mut slots,
        ) {
            first_error = Some(error);
        }
        Value::Null
    });

    match first_error {
        Some(error) => Err(error),
        None => Ok(slots),
    }
}

#[allow(clippy::too_many_arguments)]
fn project_question(
    structure: &QuestionnaireStructure,
    document: &AnswerDocument,
    summary_type: &str,
    context: &SummaryContext<'_>,
    question: &Question,
    scope: &WalkScope<'_, '_>,
    records: &[Value],
    slots: &mut Map<String, Value>,
) -> Result<(), ConfigurationError> {
    let Some(directive) = &question.summary else {
        return Ok(());
    };
    let Some(resolved) = directive.resolve(summary_type) else {
        return Ok(());
    };

    let field_name = resolve_field_name(&resolved, scope, question)?;
    let value = match resolved.get("get_value") {
        None => default_value(question, scope, records, context),
        Some(get_value) => {
            let (name, kwargs) = parse_get_value(get_value, question)?;
            let transformer = lookup_transformer(&name).ok_or_else(|| {
                ConfigurationError::SummaryConfiguration(format!(
                    "unknown get_value '{name}' on question '{}'",
                    question.keyword
                ))
            })?;
            transformer(&TransformerInput {
                structure,
                document,
                question,
                scope,
                records,
                context,
                kwargs: &kwargs,
            })
        }
    };

    if slots.contains_key(&field_name) {
        warn!(
            field_name = %field_name,
            question = %question.keyword,
            "summary slot already filled, dropping later write"
        );
        return Ok(());
    }
    slots.insert(field_name, value);
    Ok(())
}

/// `field_name` is either a plain string or a mapping keyed by
/// `"<questiongroup>.<question>"` that must match the question at hand.
fn resolve_field_name(
    resolved: &Map<String, Value>,
    scope: &WalkScope<'_, '_>,
    question: &Question,
) -> Result<String, ConfigurationError> {
    match resolved.get("field_name") {
        Some(Value::String(name)) => Ok(name.clone()),
        Some(Value::Object(by_path)) => {
            let path = format!("{}.{}", scope.questiongroup.keyword, question.keyword);
            by_path
                .get(&path)
                .and_then(Value::as_str)
                .map(str::to_string)
                .ok_or_else(|| {
                    ConfigurationError::SummaryConfiguration(format!(
                        "no field_name entry for '{path}'"
                    ))
                })
        }
        _ => Err(ConfigurationError::SummaryConfiguration(format!(
            "missing field_name on question '{}'",
            question.keyword
        ))),
    }
}

fn parse_get_value(
    get_value: &Value,
    question: &Question,
) -> Result<(String, Map<String, Value>), ConfigurationError> {
    let fields = get_value.as_object().ok_or_else(|| {
        ConfigurationError::SummaryConfiguration(format!(
            "get_value of question '{}' must be a dict",
            question.keyword
        ))
    })?;
    let name = fields
        .get("name")
        .and_then(Value::as_str)
        .ok_or_else(|| {
            ConfigurationError::SummaryConfiguration(format!(
                "get_value of question '{}' has no name",
                question.keyword
            ))
        })?;
    let kwargs = fields
        .get("kwargs")
        .and_then(Value::as_object)
        .cloned()
        .unwrap_or_default();
    Ok((name.to_string(), kwargs))
}

/// Without `get_value`, project the raw render model: one dict for
/// single-record groups, a list otherwise.
fn default_value(
    question: &Question,
    scope: &WalkScope<'_, '_>,
    records: &[Value],
    context: &SummaryContext<'_>,
) -> Value {
    let mut rendered: Vec<Value> = records
        .iter()
        .map(|record| render_raw(question, scope.questiongroup, record, &context.render))
        .collect();
    match rendered.len() {
        0 => Value::Null,
        1 => rendered.remove(0),
        _ => Value::Array(rendered),
    }
}
