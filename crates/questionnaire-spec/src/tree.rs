//! The typed questionnaire tree, built from a validated merged document
//! by joining every node with its catalog entry.

use serde_json::{Map, Value};

use crate::answers::{AnswerDocument, record_value, records};
use crate::catalog::Catalog;
use crate::error::ConfigurationError;
use crate::question::{BuildContext, Question};
use crate::validate::validate_document;

/// Numbering mode of a repeating questiongroup.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Numbered {
    #[default]
    None,
    Inline,
    Prefix,
}

impl Numbered {
    fn parse(raw: Option<&str>) -> Self {
        match raw {
            Some("inline") => Numbered::Inline,
            Some("prefix") => Numbered::Prefix,
            _ => Numbered::None,
        }
    }
}

#[derive(Debug, Clone)]
pub struct Section {
    pub keyword: String,
    pub label: String,
    pub view_options: Map<String, Value>,
    pub categories: Vec<Category>,
}

#[derive(Debug, Clone)]
pub struct Category {
    pub keyword: String,
    pub label: String,
    pub form_options: Map<String, Value>,
    pub view_options: Map<String, Value>,
    pub subcategories: Vec<Subcategory>,
}

#[derive(Debug, Clone)]
pub struct Subcategory {
    pub keyword: String,
    pub label: String,
    pub form_options: Map<String, Value>,
    pub view_options: Map<String, Value>,
    pub subcategories: Vec<Subcategory>,
    pub questiongroups: Vec<Questiongroup>,
}

#[derive(Debug, Clone)]
pub struct Questiongroup {
    pub keyword: String,
    pub label: String,
    pub min_num: usize,
    pub max_num: usize,
    pub numbered: Numbered,
    /// Name of the condition gating this group's visibility.
    pub questiongroup_condition: Option<String>,
    /// Configuration code of an externally linked questionnaire.
    pub link: Option<String>,
    pub form_options: Map<String, Value>,
    pub view_options: Map<String, Value>,
    pub questions: Vec<Question>,
}

impl Questiongroup {
    pub fn question(&self, keyword: &str) -> Option<&Question> {
        self.questions.iter().find(|question| question.keyword == keyword)
    }
}

/// The whole tree for one `(code, edition, locale)`.
#[derive(Debug, Clone)]
pub struct QuestionnaireStructure {
    pub configuration_key: String,
    pub locale: String,
    pub sections: Vec<Section>,
}

impl QuestionnaireStructure {
    /// Validate a merged document and build the typed tree from it.
    pub fn build(
        document: &Map<String, Value>,
        catalog: &Catalog,
        configuration_key: &str,
        locale: &str,
    ) -> Result<Self, ConfigurationError> {
        validate_document(document, catalog)?;
        let context = BuildContext::new(catalog, configuration_key, locale);

        let mut sections = Vec::new();
        if let Some(raw_sections) = document.get("sections").and_then(Value::as_array) {
            for raw in raw_sections {
                sections.push(build_section(raw, &context)?);
            }
        }
        let mut structure = QuestionnaireStructure {
            configuration_key: configuration_key.to_string(),
            locale: locale.to_string(),
            sections,
        };
        structure.mark_conditional_questions();
        Ok(structure)
    }

    /// Flattened questiongroups, declaration order.
    pub fn questiongroups(&self) -> Vec<&Questiongroup> {
        let mut groups = Vec::new();
        for section in &self.sections {
            for category in &section.categories {
                for subcategory in &category.subcategories {
                    collect_groups(subcategory, &mut groups);
                }
            }
        }
        groups
    }

    pub fn questiongroup(&self, keyword: &str) -> Option<&Questiongroup> {
        self.questiongroups()
            .into_iter()
            .find(|group| group.keyword == keyword)
    }

    /// First occurrence of a question by keyword, with its group.
    pub fn question(&self, keyword: &str) -> Option<(&Questiongroup, &Question)> {
        self.questiongroups().into_iter().find_map(|group| {
            group.question(keyword).map(|question| (group, question))
        })
    }

    /// `(questiongroup, question)` keyword pairs flagged `is_name`, used
    /// to pick a questionnaire's display name out of its answers.
    pub fn name_keywords(&self) -> Vec<(String, String)> {
        self.flagged(|question| question.is_name)
    }

    /// Questions flagged for list representations.
    pub fn list_keywords(&self) -> Vec<(String, String)> {
        self.flagged(|question| question.in_list)
    }

    /// Questions usable as search filters.
    pub fn filter_keywords(&self) -> Vec<(String, String)> {
        self.flagged(|question| question.filterable)
    }

    /// One row per document with the values of all `in_list` questions,
    /// choice values resolved to their labels.
    pub fn list_data(&self, documents: &[AnswerDocument]) -> Vec<Map<String, Value>> {
        let lookups: Vec<(&Questiongroup, &Question)> = self
            .questiongroups()
            .into_iter()
            .flat_map(|group| {
                group
                    .questions
                    .iter()
                    .filter(|question| question.in_list)
                    .map(move |question| (group, question))
            })
            .collect();
        documents
            .iter()
            .map(|document| {
                let mut row = Map::new();
                for (group, question) in &lookups {
                    let Some(value) = records(document, &group.keyword)
                        .first()
                        .and_then(|record| record_value(record, &question.keyword))
                    else {
                        continue;
                    };
                    let resolved = match question.choice_label(value) {
                        Some(label) => Value::String(label.to_string()),
                        None => value.clone(),
                    };
                    row.insert(question.keyword.clone(), resolved);
                }
                row
            })
            .collect()
    }

    /// Filterable questions grouped by the category containing them,
    /// as `(questiongroup, question)` keyword pairs.
    pub fn filter_configuration(&self) -> Vec<(String, Vec<(String, String)>)> {
        let mut grouped = Vec::new();
        for section in &self.sections {
            for category in &section.categories {
                let mut groups = Vec::new();
                for subcategory in &category.subcategories {
                    collect_groups(subcategory, &mut groups);
                }
                let mut pairs = Vec::new();
                for group in groups {
                    for question in &group.questions {
                        if question.filterable {
                            pairs.push((group.keyword.clone(), question.keyword.clone()));
                        }
                    }
                }
                if !pairs.is_empty() {
                    grouped.push((category.keyword.clone(), pairs));
                }
            }
        }
        grouped
    }

    fn flagged(&self, predicate: impl Fn(&Question) -> bool) -> Vec<(String, String)> {
        let mut pairs = Vec::new();
        for group in self.questiongroups() {
            for question in &group.questions {
                if predicate(question) {
                    pairs.push((group.keyword.clone(), question.keyword.clone()));
                }
            }
        }
        pairs
    }

    /// Flag questions that are the target of some choice condition, so
    /// the form layer shows them only next to their triggering choice.
    fn mark_conditional_questions(&mut self) {
        let mut targets = Vec::new();
        for group in self.questiongroups() {
            for question in &group.questions {
                for condition in &question.conditions {
                    targets.push(condition.target.clone());
                }
            }
        }
        for section in &mut self.sections {
            for category in &mut section.categories {
                for subcategory in &mut category.subcategories {
                    mark_conditional(subcategory, &targets);
                }
            }
        }
    }
}

fn collect_groups<'a>(subcategory: &'a Subcategory, groups: &mut Vec<&'a Questiongroup>) {
    for nested in &subcategory.subcategories {
        collect_groups(nested, groups);
    }
    for group in &subcategory.questiongroups {
        groups.push(group);
    }
}

fn mark_conditional(subcategory: &mut Subcategory, targets: &[String]) {
    for nested in &mut subcategory.subcategories {
        mark_conditional(nested, targets);
    }
    for group in &mut subcategory.questiongroups {
        for question in &mut group.questions {
            if targets.iter().any(|target| *target == question.keyword) {
                question.conditional = true;
            }
        }
    }
}

fn options_of(node: &Map<String, Value>, field: &str) -> Map<String, Value> {
    node.get(field)
        .and_then(Value::as_object)
        .cloned()
        .unwrap_or_default()
}

fn keyword_of(node: &Map<String, Value>, kind: &str) -> Result<String, ConfigurationError> {
    node.get("keyword")
        .and_then(Value::as_str)
        .map(str::to_string)
        .ok_or_else(|| ConfigurationError::invalid("keyword", "a string", kind))
}

fn node_object<'a>(raw: &'a Value, kind: &str) -> Result<&'a Map<String, Value>, ConfigurationError> {
    raw.as_object()
        .ok_or_else(|| ConfigurationError::invalid(kind, "a dict", kind))
}

fn category_label(
    keyword: &str,
    context: &BuildContext<'_>,
) -> Result<String, ConfigurationError> {
    let entry = context.catalog.category(keyword)?;
    Ok(context
        .catalog
        .translations
        .translate(entry.translation, "label", &context.configuration_key, &context.locale))
}

fn build_section(raw: &Value, context: &BuildContext<'_>) -> Result<Section, ConfigurationError> {
    let node = node_object(raw, "section")?;
    let keyword = keyword_of(node, "section")?;
    let mut categories = Vec::new();
    if let Some(children) = node.get("categories").and_then(Value::as_array) {
        for child in children {
            categories.push(build_category(child, context)?);
        }
    }
    Ok(Section {
        label: category_label(&keyword, context)?,
        keyword,
        view_options: options_of(node, "view_options"),
        categories,
    })
}

fn build_category(raw: &Value, context: &BuildContext<'_>) -> Result<Category, ConfigurationError> {
    let node = node_object(raw, "category")?;
    let keyword = keyword_of(node, "category")?;
    let mut subcategories = Vec::new();
    if let Some(children) = node.get("subcategories").and_then(Value::as_array) {
        for child in children {
            subcategories.push(build_subcategory(child, context)?);
        }
    }
    Ok(Category {
        label: category_label(&keyword, context)?,
        keyword,
        form_options: options_of(node, "form_options"),
        view_options: options_of(node, "view_options"),
        subcategories,
    })
}

fn build_subcategory(
    raw: &Value,
    context: &BuildContext<'_>,
) -> Result<Subcategory, ConfigurationError> {
    let node = node_object(raw, "subcategory")?;
    let keyword = keyword_of(node, "subcategory")?;
    let mut subcategories = Vec::new();
    if let Some(children) = node.get("subcategories").and_then(Value::as_array) {
        for child in children {
            subcategories.push(build_subcategory(child, context)?);
        }
    }
    let mut questiongroups = Vec::new();
    if let Some(children) = node.get("questiongroups").and_then(Value::as_array) {
        for child in children {
            questiongroups.push(build_questiongroup(child, context)?);
        }
    }
    Ok(Subcategory {
        label: category_label(&keyword, context)?,
        keyword,
        form_options: options_of(node, "form_options"),
        view_options: options_of(node, "view_options"),
        subcategories,
        questiongroups,
    })
}

fn build_questiongroup(
    raw: &Value,
    context: &BuildContext<'_>,
) -> Result<Questiongroup, ConfigurationError> {
    let node = node_object(raw, "questiongroup")?;
    let keyword = keyword_of(node, "questiongroup")?;
    let entry = context.catalog.questiongroup(&keyword)?;

    // Group options from the catalog entry sit under the node's own.
    let mut form_options = entry
        .config
        .get("form_options")
        .and_then(Value::as_object)
        .cloned()
        .unwrap_or_default();
    for (option, value) in options_of(node, "form_options") {
        form_options.insert(option, value);
    }
    let mut view_options = entry
        .config
        .get("view_options")
        .and_then(Value::as_object)
        .cloned()
        .unwrap_or_default();
    for (option, value) in options_of(node, "view_options") {
        view_options.insert(option, value);
    }

    let min_num = form_options
        .get("min_num")
        .and_then(Value::as_u64)
        .unwrap_or(1) as usize;
    let max_num = form_options
        .get("max_num")
        .and_then(Value::as_u64)
        .unwrap_or(min_num as u64) as usize;

    let mut questions = Vec::new();
    if let Some(children) = node.get("questions").and_then(Value::as_array) {
        for child in children {
            let question_node = node_object(child, "question")?;
            questions.push(Question::build(question_node, context)?);
        }
    }

    Ok(Questiongroup {
        label: context.catalog.translations.translate(
            entry.translation,
            "label",
            &context.configuration_key,
            &context.locale,
        ),
        keyword,
        min_num,
        max_num,
        numbered: Numbered::parse(form_options.get("numbered").and_then(Value::as_str)),
        questiongroup_condition: form_options
            .get("questiongroup_condition")
            .and_then(Value::as_str)
            .map(str::to_string),
        link: form_options
            .get("link")
            .and_then(Value::as_str)
            .map(str::to_string),
        form_options,
        view_options,
        questions,
    })
}
