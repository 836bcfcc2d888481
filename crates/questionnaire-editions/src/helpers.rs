//! Pure document helpers of the migration DSL. All of them copy on
//! write; the input document is never mutated in place.

use serde_json::{Map, Value};

use questionnaire_spec::AnswerDocument;

use crate::error::EditionError;

/// Children list fields by tree depth, as `find_in_data` walks them.
const CHILDREN_FIELDS: &[&str] = &[
    "sections",
    "categories",
    "subcategories",
    "questiongroups",
    "questions",
];

/// Walk a keyword path (section, category, subcategory, questiongroup,
/// question, or any prefix of that) down the document and return the
/// node there.
pub fn find_in_data<'a>(
    path: &[&str],
    data: &'a Map<String, Value>,
) -> Result<&'a Map<String, Value>, EditionError> {
    let mut node = data;
    for (depth, keyword) in path.iter().enumerate() {
        let field = CHILDREN_FIELDS
            .get(depth)
            .ok_or_else(|| EditionError::path_not_found(path))?;
        node = node
            .get(*field)
            .and_then(Value::as_array)
            .and_then(|children| {
                children.iter().find_map(|child| {
                    let child = child.as_object()?;
                    (child.get("keyword")?.as_str() == Some(*keyword)).then_some(child)
                })
            })
            .ok_or_else(|| EditionError::path_not_found(path))?;
    }
    Ok(node)
}

/// Copy of the document with the node at `path` replaced by `updated`.
pub fn update_config_data(
    path: &[&str],
    updated: Map<String, Value>,
    data: &Map<String, Value>,
) -> Result<Map<String, Value>, EditionError> {
    // Resolve first so a bad path fails before any copying.
    find_in_data(path, data)?;
    let mut copy = data.clone();
    let mut node: &mut Map<String, Value> = &mut copy;
    for (depth, keyword) in path.iter().enumerate() {
        let field = CHILDREN_FIELDS
            .get(depth)
            .ok_or_else(|| EditionError::path_not_found(path))?;
        let children = node
            .get_mut(*field)
            .and_then(Value::as_array_mut)
            .ok_or_else(|| EditionError::path_not_found(path))?;
        let child = children
            .iter_mut()
            .find(|child| {
                child
                    .as_object()
                    .and_then(|fields| fields.get("keyword"))
                    .and_then(Value::as_str)
                    == Some(*keyword)
            })
            .ok_or_else(|| EditionError::path_not_found(path))?;
        if depth + 1 == path.len() {
            *child = Value::Object(updated);
            return Ok(copy);
        }
        node = match child.as_object_mut() {
            Some(fields) => fields,
            None => return Err(EditionError::path_not_found(path)),
        };
    }
    Err(EditionError::path_not_found(path))
}

/// Set (or with `None`, delete) one question's value in every record of
/// a questiongroup.
pub fn update_data(
    questiongroup: &str,
    question: &str,
    new_value: Option<&Value>,
    data: &AnswerDocument,
) -> AnswerDocument {
    let mut copy = data.clone();
    if let Some(records) = copy.get_mut(questiongroup).and_then(Value::as_array_mut) {
        for record in records {
            let Some(fields) = record.as_object_mut() else {
                continue;
            };
            match new_value {
                Some(value) => {
                    fields.insert(question.to_string(), value.clone());
                }
                None => {
                    fields.remove(question);
                }
            }
        }
    }
    copy
}

/// Drop a whole questiongroup from an answer document.
pub fn remove_questiongroup(questiongroup: &str, data: &AnswerDocument) -> AnswerDocument {
    let mut copy = data.clone();
    copy.remove(questiongroup);
    copy
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn document() -> Map<String, Value> {
        json!({
            "sections": [{
                "keyword": "s",
                "categories": [{
                    "keyword": "c",
                    "subcategories": [{
                        "keyword": "sc",
                        "questiongroups": [{
                            "keyword": "qg_2",
                            "questions": [{"keyword": "key_2"}, {"keyword": "key_3"}],
                        }],
                    }],
                }],
            }],
        })
        .as_object()
        .cloned()
        .unwrap_or_default()
    }

    #[test]
    fn find_in_data_resolves_full_paths() {
        let data = document();
        let node = find_in_data(&["s", "c", "sc", "qg_2", "key_3"], &data).unwrap();
        assert_eq!(node.get("keyword"), Some(&json!("key_3")));
        let group = find_in_data(&["s", "c", "sc", "qg_2"], &data).unwrap();
        assert_eq!(group["questions"].as_array().map(Vec::len), Some(2));
    }

    #[test]
    fn find_in_data_reports_missing_steps() {
        let data = document();
        let err = find_in_data(&["s", "c", "sc", "qg_missing"], &data).unwrap_err();
        assert!(matches!(err, EditionError::PathNotFound { .. }));
    }

    #[test]
    fn update_config_data_replaces_one_node() {
        let data = document();
        let mut group = find_in_data(&["s", "c", "sc", "qg_2"], &data).unwrap().clone();
        group.insert("questions".into(), json!([{"keyword": "key_3"}]));
        let updated = update_config_data(&["s", "c", "sc", "qg_2"], group, &data).unwrap();
        let questions = find_in_data(&["s", "c", "sc", "qg_2"], &updated).unwrap()["questions"]
            .as_array()
            .cloned()
            .unwrap_or_default();
        assert_eq!(questions, vec![json!({"keyword": "key_3"})]);
        // Source untouched.
        assert_eq!(
            find_in_data(&["s", "c", "sc", "qg_2"], &data).unwrap()["questions"]
                .as_array()
                .map(Vec::len),
            Some(2)
        );
    }

    #[test]
    fn update_data_deletes_values_across_records() {
        let answers = json!({
            "qg_2": [
                {"key_2": "x", "key_3": "y"},
                {"key_2": "z"},
            ],
        })
        .as_object()
        .cloned()
        .unwrap_or_default();
        let updated = update_data("qg_2", "key_2", None, &answers);
        assert_eq!(
            Value::Object(updated),
            json!({"qg_2": [{"key_3": "y"}, {}]})
        );
    }

    #[test]
    fn remove_questiongroup_drops_all_records() {
        let answers = json!({"qg_2": [{"key_2": "x"}], "qg_3": [{"key_4": "y"}]})
            .as_object()
            .cloned()
            .unwrap_or_default();
        let updated = remove_questiongroup("qg_2", &answers);
        assert_eq!(Value::Object(updated), json!({"qg_3": [{"key_4": "y"}]}));
        assert_eq!(answers.len(), 2);
    }

    #[test]
    fn update_data_sets_values_across_records() {
        let answers = json!({"qg_2": [{}, {}]})
            .as_object()
            .cloned()
            .unwrap_or_default();
        let updated = update_data("qg_2", "key_new", Some(&json!(1)), &answers);
        assert_eq!(
            Value::Object(updated),
            json!({"qg_2": [{"key_new": 1}, {"key_new": 1}]})
        );
    }
}
