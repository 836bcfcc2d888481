//! The edition engine: ordered operation lists that rewrite a
//! configuration document (and optionally stored answer documents) from
//! one edition to the next.

use handlebars::Handlebars;
use serde_json::{Map, Value};
use tracing::info;

use questionnaire_spec::answers::AnswerDocument;
use questionnaire_spec::catalog::Catalog;
use questionnaire_spec::stores::{Configuration, ConfigurationStore};
use questionnaire_spec::validate::validate_document;

use crate::context::EditionContext;
use crate::error::EditionError;

type ConfigTransform = Box<
    dyn Fn(Map<String, Value>, &mut EditionContext<'_>) -> Result<Map<String, Value>, EditionError>
        + Send
        + Sync,
>;
type AnswerTransform = Box<dyn Fn(AnswerDocument) -> AnswerDocument + Send + Sync>;

/// One migration step. The configuration transform is mandatory; the
/// answer transform accompanies it whenever the step invalidates stored
/// data.
pub struct Operation {
    pub release_note: String,
    pub template_name: Option<String>,
    transform_configuration: ConfigTransform,
    transform_questionnaire: Option<AnswerTransform>,
}

impl Operation {
    pub fn new<F>(release_note: impl Into<String>, transform_configuration: F) -> Self
    where
        F: Fn(Map<String, Value>, &mut EditionContext<'_>) -> Result<Map<String, Value>, EditionError>
            + Send
            + Sync
            + 'static,
    {
        Operation {
            release_note: release_note.into(),
            template_name: None,
            transform_configuration: Box::new(transform_configuration),
            transform_questionnaire: None,
        }
    }

    pub fn with_questionnaire_transform<F>(mut self, transform: F) -> Self
    where
        F: Fn(AnswerDocument) -> AnswerDocument + Send + Sync + 'static,
    {
        self.transform_questionnaire = Some(Box::new(transform));
        self
    }

    pub fn with_template(mut self, template_name: impl Into<String>) -> Self {
        self.template_name = Some(template_name.into());
        self
    }

    pub fn transforms_questionnaire(&self) -> bool {
        self.transform_questionnaire.is_some()
    }
}

/// One edition of a configuration code: its identity plus the ordered
/// operations taking the prior edition there.
pub trait Edition {
    fn code(&self) -> &str;
    fn edition(&self) -> &str;
    fn operations(&self) -> Vec<Operation>;
}

/// Run an edition: fold its configuration transforms over the latest
/// prior document, validate the result and persist it get-or-create
/// under `(code, edition)`.
pub fn run_operations(
    edition: &dyn Edition,
    store: &mut dyn ConfigurationStore,
    catalog: &mut Catalog,
) -> Result<Configuration, EditionError> {
    let code = edition.code();
    let name = edition.edition();

    // Rerunning a persisted edition is a no-op.
    if let Some(existing) = store.by_code_edition(code, name) {
        info!(code, edition = name, "edition already applied");
        return Ok(existing);
    }

    let source = store
        .latest_active(code)
        .ok_or_else(|| EditionError::MissingSource {
            code: code.to_string(),
            edition: name.to_string(),
        })?;

    let mut context = EditionContext::new(catalog, code, name);
    let mut data = source.data;
    for operation in edition.operations() {
        info!(code, edition = name, note = %operation.release_note, "applying operation");
        data = (operation.transform_configuration)(data, &mut context)?;
    }
    validate_document(&data, catalog)?;

    let configuration = Configuration {
        code: code.to_string(),
        edition: name.to_string(),
        base_code: source.base_code,
        data,
    };
    store.save(configuration.clone());
    Ok(configuration)
}

/// Fold the edition's answer transforms over a stored answer document.
pub fn update_questionnaire_data(
    edition: &dyn Edition,
    document: AnswerDocument,
) -> AnswerDocument {
    edition
        .operations()
        .iter()
        .fold(document, |data, operation| {
            match &operation.transform_questionnaire {
                Some(transform) => transform(data),
                None => data,
            }
        })
}

/// Render the edition's release notes, one per operation. Notes are
/// handlebars templates over the given context; operations carrying a
/// `template_name` render that registered template instead.
pub fn release_notes(
    edition: &dyn Edition,
    registry: &Handlebars<'_>,
    context: &Value,
) -> Result<Vec<String>, EditionError> {
    let mut notes = Vec::new();
    for operation in edition.operations() {
        let note = match &operation.template_name {
            Some(template_name) if registry.has_template(template_name) => {
                registry.render(template_name, context)?
            }
            _ => registry.render_template(&operation.release_note, context)?,
        };
        notes.push(note);
    }
    Ok(notes)
}
