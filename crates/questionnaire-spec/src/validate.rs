//! Eager validation of a merged configuration document.
//!
//! Runs before the typed tree is built. The first violation aborts the
//! whole walk; configuration bugs are never deferred.

use std::collections::BTreeSet;

use serde_json::{Map, Value};

use crate::catalog::Catalog;
use crate::condition::{parse_comparison, parse_value_condition};
use crate::error::ConfigurationError;
use crate::question::FieldType;
use crate::structure::{NodeKind, ROOT_OPTIONS};

/// Condition names and keywords collected on the first pass, used to
/// check target closure on the second.
#[derive(Debug, Default)]
struct ConditionIndex {
    question_keywords: BTreeSet<String>,
    /// `question_condition` names questions contribute to.
    question_condition_names: BTreeSet<String>,
    /// `questiongroup_condition` names groups are gated by.
    questiongroup_condition_names: BTreeSet<String>,
    /// `(condition string, target)` pairs awaiting resolution.
    value_condition_targets: Vec<(String, String)>,
    question_condition_targets: Vec<(String, String)>,
    questiongroup_condition_targets: Vec<(String, String)>,
}

/// Validate a merged configuration document against the catalog.
pub fn validate_document(
    document: &Map<String, Value>,
    catalog: &Catalog,
) -> Result<(), ConfigurationError> {
    for option in document.keys() {
        if !ROOT_OPTIONS.contains(&option.as_str()) {
            return Err(ConfigurationError::InvalidOption {
                option: option.clone(),
                node: "root".to_string(),
                keyword: "-".to_string(),
            });
        }
    }
    let sections = document
        .get("sections")
        .and_then(Value::as_array)
        .ok_or_else(|| ConfigurationError::invalid("sections", "a list of sections", "root"))?;

    let mut index = ConditionIndex::default();
    for section in sections {
        validate_node(section, NodeKind::Section, catalog, &mut index)?;
    }
    check_condition_closure(&index)
}

fn validate_node(
    node: &Value,
    kind: NodeKind,
    catalog: &Catalog,
    index: &mut ConditionIndex,
) -> Result<(), ConfigurationError> {
    let fields = node
        .as_object()
        .ok_or_else(|| ConfigurationError::invalid(kind.name(), "a dict", kind.name()))?;
    let keyword = fields
        .get("keyword")
        .and_then(Value::as_str)
        .ok_or_else(|| ConfigurationError::invalid("keyword", "a string", kind.name()))?;

    for option in fields.keys() {
        if !kind.valid_options().contains(&option.as_str()) {
            return Err(ConfigurationError::InvalidOption {
                option: option.clone(),
                node: kind.name().to_string(),
                keyword: keyword.to_string(),
            });
        }
    }
    catalog.ensure(kind.catalog_kind(), keyword)?;

    match kind {
        NodeKind::Questiongroup => validate_questiongroup(fields, keyword, index)?,
        NodeKind::Question => validate_question(fields, keyword, catalog, index)?,
        _ => {}
    }

    for (field, child_kind) in kind.children_fields() {
        let Some(children) = fields.get(*field) else {
            continue;
        };
        let children = children.as_array().ok_or_else(|| {
            ConfigurationError::invalid(field, "a list of dicts", keyword)
        })?;
        for child in children {
            validate_node(child, *child_kind, catalog, index)?;
        }
    }
    Ok(())
}

fn validate_questiongroup(
    fields: &Map<String, Value>,
    keyword: &str,
    index: &mut ConditionIndex,
) -> Result<(), ConfigurationError> {
    let form_options = fields
        .get("form_options")
        .and_then(Value::as_object)
        .cloned()
        .unwrap_or_default();

    let min_num = form_options.get("min_num").and_then(Value::as_u64).unwrap_or(1);
    let max_num = form_options
        .get("max_num")
        .and_then(Value::as_u64)
        .unwrap_or(min_num.max(1));
    if min_num < 1 {
        return Err(ConfigurationError::invalid("min_num", "at least 1", keyword));
    }
    if max_num < min_num {
        return Err(ConfigurationError::invalid(
            "max_num",
            "at least min_num",
            keyword,
        ));
    }

    if let Some(name) = form_options.get("questiongroup_condition").and_then(Value::as_str) {
        index.questiongroup_condition_names.insert(name.to_string());
    }
    Ok(())
}

fn validate_question(
    fields: &Map<String, Value>,
    keyword: &str,
    catalog: &Catalog,
    index: &mut ConditionIndex,
) -> Result<(), ConfigurationError> {
    index.question_keywords.insert(keyword.to_string());

    let key = catalog.key(keyword)?;
    let field_type_name = key
        .config
        .get("type")
        .and_then(Value::as_str)
        .unwrap_or("char");
    let field_type = FieldType::parse(field_type_name, keyword)?;
    if field_type.requires_catalog_values() && key.values.is_empty() {
        return Err(ConfigurationError::invalid(
            "values",
            "at least one attached value",
            keyword,
        ));
    }

    let mut form_options = key
        .config
        .get("form_options")
        .and_then(Value::as_object)
        .cloned()
        .unwrap_or_default();
    if let Some(overrides) = fields.get("form_options").and_then(Value::as_object) {
        for (option, value) in overrides {
            form_options.insert(option.clone(), value.clone());
        }
    }

    if let Some(name) = form_options.get("question_condition").and_then(Value::as_str) {
        index.question_condition_names.insert(name.to_string());
    }

    for condition in condition_strings(&form_options, "conditions", keyword)? {
        let parsed =
            parse_value_condition(&condition).map_err(|reason| ConfigurationError::InvalidCondition {
                condition: condition.clone(),
                reason: reason.to_string(),
            })?;
        let value_known = key.values.iter().any(|value| *value == parsed.value);
        if !value_known {
            return Err(ConfigurationError::InvalidCondition {
                condition: condition.clone(),
                reason: format!("value '{}' is not a value of key '{keyword}'", parsed.value),
            });
        }
        index
            .value_condition_targets
            .push((condition, parsed.target));
    }

    for condition in condition_strings(&form_options, "question_conditions", keyword)? {
        let parsed =
            parse_comparison(&condition).map_err(|reason| ConfigurationError::InvalidCondition {
                condition: condition.clone(),
                reason: reason.to_string(),
            })?;
        index
            .question_condition_targets
            .push((condition, parsed.target));
    }

    for condition in condition_strings(&form_options, "questiongroup_conditions", keyword)? {
        let parsed = parse_comparison(&condition).map_err(|reason| {
            ConfigurationError::InvalidQuestiongroupCondition {
                condition: condition.clone(),
                reason: reason.to_string(),
            }
        })?;
        index
            .questiongroup_condition_targets
            .push((condition, parsed.target));
    }
    Ok(())
}

fn condition_strings(
    form_options: &Map<String, Value>,
    field: &str,
    keyword: &str,
) -> Result<Vec<String>, ConfigurationError> {
    let Some(raw) = form_options.get(field) else {
        return Ok(Vec::new());
    };
    let raw = raw
        .as_array()
        .ok_or_else(|| ConfigurationError::invalid(field, "a list of strings", keyword))?;
    raw.iter()
        .map(|condition| {
            condition
                .as_str()
                .map(str::to_string)
                .ok_or_else(|| ConfigurationError::invalid(field, "a list of strings", keyword))
        })
        .collect()
}

fn check_condition_closure(index: &ConditionIndex) -> Result<(), ConfigurationError> {
    for (condition, target) in &index.value_condition_targets {
        if !index.question_keywords.contains(target) {
            return Err(ConfigurationError::InvalidCondition {
                condition: condition.clone(),
                reason: format!("target question '{target}' does not exist in the tree"),
            });
        }
    }
    for (condition, target) in &index.question_condition_targets {
        if !index.question_condition_names.contains(target) {
            return Err(ConfigurationError::InvalidCondition {
                condition: condition.clone(),
                reason: format!("no question declares question_condition '{target}'"),
            });
        }
    }
    for (condition, target) in &index.questiongroup_condition_targets {
        if !index.questiongroup_condition_names.contains(target) {
            return Err(ConfigurationError::InvalidQuestiongroupCondition {
                condition: condition.clone(),
                reason: format!("no questiongroup declares questiongroup_condition '{target}'"),
            });
        }
    }
    Ok(())
}
