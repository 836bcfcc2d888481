//! Depth-first traversal aligning the typed tree with an answer
//! document. Form builder, renderer and summary projector all walk the
//! tree through here so visit order is defined in one place.

use serde_json::{Map, Value};
use tracing::warn;

use crate::answers::{AnswerDocument, count_within, record_value, records, sorted_records};
use crate::question::Question;
use crate::tree::{Category, Numbered, Questiongroup, QuestionnaireStructure, Section, Subcategory};

/// Ancestors of the question currently visited. The `'t` lifetime is
/// the tree's, `'p` the in-progress traversal path's.
#[derive(Debug, Clone, Copy)]
pub struct WalkScope<'t, 'p> {
    pub section: &'t Section,
    pub category: &'t Category,
    /// Outermost first; the last entry owns the questiongroup.
    pub subcategory_path: &'p [&'t Subcategory],
    pub questiongroup: &'t Questiongroup,
}

impl<'t> WalkScope<'t, '_> {
    pub fn subcategory(&self) -> &'t Subcategory {
        self.subcategory_path[self.subcategory_path.len() - 1]
    }

    /// Sibling questiongroups of the current one, in declaration order.
    pub fn sibling_groups(&self) -> &'t [Questiongroup] {
        &self.subcategory().questiongroups
    }
}

/// Walk the tree, calling `visit` once per question with the records of
/// its group. Returns a nested map mirroring the tree:
/// `{keyword: {label, children}}` for containers and
/// `{keyword: {label, value}}` for questions.
pub fn walk_with<F>(
    structure: &QuestionnaireStructure,
    document: &AnswerDocument,
    mut visit: F,
) -> Map<String, Value>
where
    F: FnMut(&Question, &WalkScope<'_, '_>, &[Value]) -> Value,
{
    let mut output = Map::new();
    for section in &structure.sections {
        let mut section_children = Map::new();
        for category in &section.categories {
            let mut category_children = Map::new();
            for subcategory in &category.subcategories {
                let mut path = vec![subcategory];
                category_children.insert(
                    subcategory.keyword.clone(),
                    walk_subcategory(section, category, &mut path, document, &mut visit),
                );
            }
            section_children.insert(
                category.keyword.clone(),
                container_entry(&category.label, category_children),
            );
        }
        output.insert(
            section.keyword.clone(),
            container_entry(&section.label, section_children),
        );
    }
    output
}

/// Walk with the default value hook: one raw answer value per record.
pub fn walk(structure: &QuestionnaireStructure, document: &AnswerDocument) -> Map<String, Value> {
    walk_with(structure, document, |question, _scope, records| {
        let values: Vec<Value> = records
            .iter()
            .map(|record| {
                record_value(record, &question.keyword)
                    .cloned()
                    .unwrap_or(Value::Null)
            })
            .collect();
        Value::Array(values)
    })
}

fn container_entry(label: &str, children: Map<String, Value>) -> Value {
    let mut entry = Map::new();
    entry.insert("label".to_string(), Value::String(label.to_string()));
    entry.insert("children".to_string(), Value::Object(children));
    Value::Object(entry)
}

fn walk_subcategory<'a, F>(
    section: &'a Section,
    category: &'a Category,
    path: &mut Vec<&'a Subcategory>,
    document: &AnswerDocument,
    visit: &mut F,
) -> Value
where
    F: FnMut(&Question, &WalkScope<'_, '_>, &[Value]) -> Value,
{
    let subcategory = path[path.len() - 1];
    let mut children = Map::new();
    for nested in &subcategory.subcategories {
        path.push(nested);
        children.insert(
            nested.keyword.clone(),
            walk_subcategory(section, category, path, document, visit),
        );
        path.pop();
    }
    for group in &subcategory.questiongroups {
        let scope = WalkScope {
            section,
            category,
            subcategory_path: path,
            questiongroup: group,
        };
        let group_records = records(document, &group.keyword);
        if !count_within(group_records, group.min_num, group.max_num) {
            warn!(
                group = %group.keyword,
                count = group_records.len(),
                min_num = group.min_num,
                max_num = group.max_num,
                "answer record count outside group bounds"
            );
        }
        let ordered;
        let group_records: &[Value] = if group.numbered == Numbered::None {
            group_records
        } else {
            ordered = sorted_records(group_records);
            &ordered
        };
        let mut group_children = Map::new();
        for question in &group.questions {
            let mut entry = Map::new();
            entry.insert("label".to_string(), Value::String(question.label.clone()));
            entry.insert(
                "value".to_string(),
                visit(question, &scope, group_records),
            );
            group_children.insert(question.keyword.clone(), Value::Object(entry));
        }
        children.insert(group.keyword.clone(), container_entry(&group.label, group_children));
    }
    container_entry(&subcategory.label, children)
}
