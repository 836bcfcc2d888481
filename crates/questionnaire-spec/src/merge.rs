//! Loading of configuration documents and `base_code` inheritance.
//!
//! The merge is a pure function over two documents. Children are
//! identified by `keyword` only; base children come first, specific-only
//! children are appended in their own order.

use serde_json::{Map, Value};
use tracing::debug;

use crate::error::ConfigurationError;
use crate::stores::{Configuration, ConfigurationStore};
use crate::structure::NodeKind;

/// Load the latest active configuration for a code and resolve its
/// `base_code` chain, deep-merging every level.
pub fn load_merged(
    store: &dyn ConfigurationStore,
    code: &str,
) -> Result<Map<String, Value>, ConfigurationError> {
    let mut chain = Vec::new();
    load_merged_inner(store, code, &mut chain)
}

/// Same as [`load_merged`] but starting from a row already in hand, for
/// callers that resolved `(code, edition)` themselves.
pub fn resolve_bases(
    store: &dyn ConfigurationStore,
    configuration: &Configuration,
) -> Result<Map<String, Value>, ConfigurationError> {
    let mut chain = vec![configuration.code.clone()];
    let Some(base_code) = &configuration.base_code else {
        return Ok(configuration.data.clone());
    };
    let base = load_merged_inner(store, base_code, &mut chain)?;
    Ok(merge_document(&base, &configuration.data))
}

fn load_merged_inner(
    store: &dyn ConfigurationStore,
    code: &str,
    chain: &mut Vec<String>,
) -> Result<Map<String, Value>, ConfigurationError> {
    if chain.iter().any(|visited| visited == code) {
        chain.push(code.to_string());
        return Err(ConfigurationError::CycleInBase {
            chain: chain.clone(),
        });
    }
    chain.push(code.to_string());

    let configuration = store.require_latest(code)?;
    debug!(code, edition = %configuration.edition, "loaded configuration");

    let Some(base_code) = &configuration.base_code else {
        return Ok(configuration.data.clone());
    };
    let base = load_merged_inner(store, base_code, chain)?;
    Ok(merge_document(&base, &configuration.data))
}

/// Deep-merge two configuration documents. The specific document's
/// attributes win; children lists merge by `keyword` with base order
/// preserved and specific-only children appended.
pub fn merge_document(
    base: &Map<String, Value>,
    specific: &Map<String, Value>,
) -> Map<String, Value> {
    let mut merged = Map::new();
    merged.insert(
        "sections".to_string(),
        merge_children(
            NodeKind::Section,
            children_of(base, "sections"),
            children_of(specific, "sections"),
        ),
    );
    for (attr, value) in base.iter().chain(specific.iter()) {
        if attr != "sections" {
            merged.insert(attr.clone(), value.clone());
        }
    }
    merged
}

fn children_of<'a>(node: &'a Map<String, Value>, field: &str) -> &'a [Value] {
    node.get(field).and_then(Value::as_array).map_or(&[], Vec::as_slice)
}

fn keyword_of(node: &Value) -> Option<&str> {
    node.as_object()?.get("keyword")?.as_str()
}

fn merge_children(kind: NodeKind, base: &[Value], specific: &[Value]) -> Value {
    let mut merged: Vec<Value> = Vec::with_capacity(base.len() + specific.len());
    for base_child in base {
        let matching = keyword_of(base_child).and_then(|keyword| {
            specific
                .iter()
                .find(|child| keyword_of(child) == Some(keyword))
        });
        match (base_child.as_object(), matching.and_then(Value::as_object)) {
            (Some(base_obj), Some(specific_obj)) => {
                merged.push(Value::Object(merge_node(kind, base_obj, specific_obj)));
            }
            _ => merged.push(base_child.clone()),
        }
    }
    for specific_child in specific {
        let already_merged = keyword_of(specific_child)
            .is_some_and(|keyword| base.iter().any(|child| keyword_of(child) == Some(keyword)));
        if !already_merged {
            merged.push(specific_child.clone());
        }
    }
    Value::Array(merged)
}

fn merge_node(
    kind: NodeKind,
    base: &Map<String, Value>,
    specific: &Map<String, Value>,
) -> Map<String, Value> {
    let mut merged = Map::new();
    let children_fields = kind.children_fields();
    for (field, child_kind) in children_fields {
        if base.contains_key(*field) || specific.contains_key(*field) {
            merged.insert(
                (*field).to_string(),
                merge_children(*child_kind, children_of(base, field), children_of(specific, field)),
            );
        }
    }
    for (attr, value) in base {
        if !children_fields.iter().any(|(field, _)| field == attr) {
            merged.insert(attr.clone(), value.clone());
        }
    }
    for (attr, value) in specific {
        if children_fields.iter().any(|(field, _)| field == attr) {
            continue;
        }
        // Question option dicts merge shallowly instead of replacing.
        if kind == NodeKind::Question
            && (attr == "form_options" || attr == "view_options")
            && let (Some(base_options), Some(specific_options)) =
                (merged.get(attr).and_then(Value::as_object), value.as_object())
        {
            let mut options = base_options.clone();
            for (option, option_value) in specific_options {
                options.insert(option.clone(), option_value.clone());
            }
            merged.insert(attr.clone(), Value::Object(options));
            continue;
        }
        merged.insert(attr.clone(), value.clone());
    }
    merged
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn document(questions: Value) -> Map<String, Value> {
        json!({
            "sections": [{
                "keyword": "s",
                "categories": [{
                    "keyword": "c",
                    "subcategories": [{
                        "keyword": "sc",
                        "questiongroups": [{
                            "keyword": "qg",
                            "questions": questions,
                        }],
                    }],
                }],
            }],
        })
        .as_object()
        .cloned()
        .unwrap_or_default()
    }

    fn questions_of(document: &Map<String, Value>) -> Vec<String> {
        let mut keywords = Vec::new();
        let mut node = Value::Object(document.clone());
        for field in ["sections", "categories", "subcategories", "questiongroups"] {
            node = node[field][0].clone();
        }
        if let Some(questions) = node["questions"].as_array() {
            for question in questions {
                if let Some(keyword) = question["keyword"].as_str() {
                    keywords.push(keyword.to_string());
                }
            }
        }
        keywords
    }

    #[test]
    fn specific_only_questions_are_appended() {
        let base = document(json!([{"keyword": "q1"}]));
        let specific = document(json!([{"keyword": "q2"}]));
        let merged = merge_document(&base, &specific);
        assert_eq!(questions_of(&merged), vec!["q1", "q2"]);
    }

    #[test]
    fn merge_is_idempotent() {
        let base = document(json!([{"keyword": "q1"}, {"keyword": "q2"}]));
        assert_eq!(merge_document(&base, &base), base);
    }

    #[test]
    fn merge_with_empty_is_identity() {
        let base = document(json!([{"keyword": "q1"}]));
        let empty = json!({"sections": []}).as_object().cloned().unwrap_or_default();
        assert_eq!(merge_document(&base, &empty), base);
        assert_eq!(merge_document(&empty, &base), base);
    }

    #[test]
    fn question_options_merge_shallowly() {
        let base = document(json!([{
            "keyword": "q1",
            "form_options": {"max_length": 50, "num_rows": 3},
        }]));
        let specific = document(json!([{
            "keyword": "q1",
            "form_options": {"max_length": 500},
        }]));
        let merged = merge_document(&base, &specific);
        let mut node = Value::Object(merged);
        for field in ["sections", "categories", "subcategories", "questiongroups", "questions"] {
            node = node[field][0].clone();
        }
        assert_eq!(node["form_options"]["max_length"], json!(500));
        assert_eq!(node["form_options"]["num_rows"], json!(3));
    }

    #[test]
    fn container_attributes_overwrite() {
        let mut base = document(json!([]));
        let mut specific = document(json!([]));
        base["sections"][0]["view_options"] = json!({"template": "old"});
        specific["sections"][0]["view_options"] = json!({"template": "new"});
        let merged = merge_document(&base, &specific);
        assert_eq!(merged["sections"][0]["view_options"]["template"], json!("new"));
    }

    mod loading {
        use super::*;
        use crate::stores::{Configuration, MemoryConfigurationStore};

        fn row(code: &str, base_code: Option<&str>, data: Map<String, Value>) -> Configuration {
            Configuration {
                code: code.to_string(),
                edition: "2015".to_string(),
                base_code: base_code.map(str::to_string),
                data,
            }
        }

        #[test]
        fn load_merged_resolves_base_chain() {
            let mut store = MemoryConfigurationStore::new();
            store.save(row("parent", None, document(json!([{"keyword": "q1"}]))));
            store.save(row(
                "child",
                Some("parent"),
                document(json!([{"keyword": "q2"}])),
            ));
            let merged = load_merged(&store, "child").unwrap();
            assert_eq!(questions_of(&merged), vec!["q1", "q2"]);
        }

        #[test]
        fn load_merged_detects_cycles() {
            let mut store = MemoryConfigurationStore::new();
            store.save(row("a", Some("b"), document(json!([]))));
            store.save(row("b", Some("a"), document(json!([]))));
            let err = load_merged(&store, "a").unwrap_err();
            assert!(matches!(err, ConfigurationError::CycleInBase { .. }));
        }

        #[test]
        fn load_merged_reports_missing_code() {
            let store = MemoryConfigurationStore::new();
            let err = load_merged(&store, "ghost").unwrap_err();
            assert!(matches!(err, ConfigurationError::ConfigurationNotFound { .. }));
        }
    }
}
