//! User-defined functions and stored procedures.
use bigquery_model_rs::RoutineReference;
use bigquery_model_rs::routine::{
    Argument, DeterminismLevel, Routine as RoutineBody, RoutineLanguage, RoutineType,
    StandardSqlDataType,
};
use serde_json::Value;
use time::OffsetDateTime;

use crate::Client;
use crate::list::ListItem;
use crate::path::{ResourcePath, ResourceType};
use crate::resource::{
    Fidelity, Insertable, ReadableResource, ResourceBuilder, ResourceKind, ResourceState, Updater,
    accessors, attributes,
};
use crate::service::DeleteOptions;

#[derive(Debug, Clone, Copy)]
pub enum RoutineKind {}

attributes! {
    pub enum RoutineAttr {
        RoutineType => "routineType",
        Language => "language",
        Arguments => "arguments",
        ReturnType => "returnType",
        ImportedLibraries => "importedLibraries",
        Definition => "definitionBody",
        Description => "description",
        DeterminismLevel => "determinismLevel",
    }
}

impl ResourceKind for RoutineKind {
    type Reference = RoutineReference;
    type Body = RoutineBody;
    type Attr = RoutineAttr;

    const NAME: &'static str = "routine";

    fn path(reference: &RoutineReference) -> ResourcePath {
        ResourcePath::Routine(reference.clone())
    }

    fn reference_of(body: &RoutineBody) -> Option<&RoutineReference> {
        body.routine_reference.as_ref()
    }

    fn etag_of(body: &RoutineBody) -> Option<&str> {
        body.etag.as_deref()
    }
}

impl Insertable for RoutineKind {
    const TYPE: ResourceType = ResourceType::Routine;

    fn parent(reference: &RoutineReference) -> ResourcePath {
        ResourcePath::Dataset(reference.to_dataset_reference())
    }

    fn new_body(reference: RoutineReference) -> RoutineBody {
        RoutineBody::new(reference)
    }
}

/// Batched changes to a routine, used by `create_routine` and
/// [`Routine::update`].
#[derive(Debug, Clone)]
pub struct RoutineUpdater {
    inner: Updater<RoutineKind>,
}

impl RoutineUpdater {
    pub fn routine_ref(&self) -> &RoutineReference {
        self.inner.reference()
    }

    pub fn body(&self) -> &RoutineBody {
        self.inner.body()
    }

    pub fn set_routine_type(&mut self, ty: RoutineType) {
        self.inner
            .set(RoutineAttr::RoutineType, |body| body.routine_type = Some(ty));
    }

    pub fn set_language(&mut self, language: RoutineLanguage) {
        self.inner
            .set(RoutineAttr::Language, |body| body.language = Some(language));
    }

    pub fn set_arguments(&mut self, arguments: Vec<Argument>) {
        self.inner
            .set(RoutineAttr::Arguments, |body| body.arguments = Some(arguments));
    }

    pub fn set_return_type(&mut self, return_type: StandardSqlDataType) {
        self.inner
            .set(RoutineAttr::ReturnType, |body| body.return_type = Some(return_type));
    }

    /// Storage URIs of JavaScript libraries a JavaScript function may use.
    pub fn set_imported_libraries<I>(&mut self, libraries: I)
    where
        I: IntoIterator,
        I::Item: Into<String>,
    {
        let libraries = libraries.into_iter().map(Into::into).collect();
        self.inner.set(RoutineAttr::ImportedLibraries, |body| {
            body.imported_libraries = Some(libraries)
        });
    }

    pub fn set_definition(&mut self, definition: impl Into<Box<str>>) {
        let definition = definition.into();
        self.inner
            .set(RoutineAttr::Definition, |body| body.definition_body = Some(definition));
    }

    pub fn set_description(&mut self, description: impl Into<Box<str>>) {
        let description = description.into();
        self.inner
            .set(RoutineAttr::Description, |body| body.description = Some(description));
    }

    pub fn set_determinism_level(&mut self, level: DeterminismLevel) {
        self.inner.set(RoutineAttr::DeterminismLevel, |body| {
            body.determinism_level = Some(level)
        });
    }

    pub fn has_changes(&self) -> bool {
        self.inner.has_changes()
    }
}

impl ResourceBuilder for RoutineUpdater {
    type Kind = RoutineKind;

    fn has_changes(&self) -> bool {
        self.inner.has_changes()
    }

    fn into_updater(self) -> Updater<RoutineKind> {
        self.inner
    }
}

/// A routine handle. Type, language and timestamps are served by list
/// responses; the definition and arguments need the full body.
#[derive(Debug)]
pub struct Routine {
    state: ResourceState<RoutineKind>,
}

impl ReadableResource for Routine {
    type Kind = RoutineKind;

    fn state(&self) -> &ResourceState<RoutineKind> {
        &self.state
    }

    fn state_mut(&mut self) -> &mut ResourceState<RoutineKind> {
        &mut self.state
    }
}

impl ListItem for Routine {
    const TYPE: ResourceType = ResourceType::Routine;

    fn from_partial(client: Client, value: Value) -> crate::Result<Self> {
        ResourceState::from_json(client, value, Fidelity::Partial).map(|state| Self { state })
    }
}

impl Routine {
    pub(crate) fn new_reference(client: Client, reference: RoutineReference) -> crate::Result<Self> {
        ResourceState::new_reference(client, reference).map(|state| Self { state })
    }

    pub(crate) async fn create<F>(
        client: Client,
        reference: RoutineReference,
        configure: F,
    ) -> crate::Result<Self>
    where
        F: FnOnce(&mut RoutineUpdater),
    {
        let mut updater = RoutineUpdater {
            inner: Updater::for_insert(reference)?,
        };
        configure(&mut updater);

        ResourceState::insert(client, updater.into_updater())
            .await
            .map(|state| Self { state })
    }

    pub fn routine_ref(&self) -> &RoutineReference {
        self.state.reference()
    }

    pub fn routine_id(&self) -> &str {
        &self.routine_ref().routine_id
    }

    pub fn dataset_id(&self) -> &str {
        &self.routine_ref().dataset_id
    }

    pub fn project_id(&self) -> &str {
        &self.routine_ref().project_id
    }

    pub fn body(&self) -> Option<&RoutineBody> {
        self.state.body()
    }

    accessors! { ensure_resource;
        etag -> Option<&str> = |body| body.etag.as_deref();
        routine_type -> Option<RoutineType> = |body| body.routine_type;
        language -> Option<RoutineLanguage> = |body| body.language;
        created_at -> Option<OffsetDateTime> = |body| body.creation_time;
        modified_at -> Option<OffsetDateTime> = |body| body.last_modified_time;
        is_procedure -> bool = |body| body.routine_type == Some(RoutineType::Procedure);
        is_scalar_function -> bool = |body| body.routine_type == Some(RoutineType::ScalarFunction);
        is_table_function -> bool = |body| body.routine_type == Some(RoutineType::TableValuedFunction);
        is_sql -> bool = |body| body.language == Some(RoutineLanguage::Sql);
        is_javascript -> bool = |body| body.language == Some(RoutineLanguage::Javascript);
    }

    accessors! { ensure_full;
        arguments -> &[Argument] = |body| body.arguments.as_deref().unwrap_or_default();
        return_type -> Option<&StandardSqlDataType> = |body| body.return_type.as_ref();
        imported_libraries -> &[String] = |body| body.imported_libraries.as_deref().unwrap_or_default();
        /// The SQL or JavaScript source of the routine.
        definition -> Option<&str> = |body| body.definition_body.as_deref();
        description -> Option<&str> = |body| body.description.as_deref();
        determinism_level -> Option<DeterminismLevel> = |body| body.determinism_level;
        is_deterministic -> bool = |body| body.determinism_level == Some(DeterminismLevel::Deterministic);
    }

    pub async fn set_definition(&mut self, definition: &str) -> crate::Result<()> {
        let definition = Box::<str>::from(definition);
        self.state
            .set(RoutineAttr::Definition, |body| body.definition_body = Some(definition))
            .await
    }

    pub async fn set_description(&mut self, description: Option<&str>) -> crate::Result<()> {
        let description = description.map(Box::from);
        self.state
            .set(RoutineAttr::Description, |body| body.description = description)
            .await
    }

    pub async fn set_arguments(&mut self, arguments: Vec<Argument>) -> crate::Result<()> {
        self.state
            .set(RoutineAttr::Arguments, |body| body.arguments = Some(arguments))
            .await
    }

    pub async fn set_return_type(&mut self, return_type: Option<StandardSqlDataType>) -> crate::Result<()> {
        self.state
            .set(RoutineAttr::ReturnType, |body| body.return_type = return_type)
            .await
    }

    pub async fn set_determinism_level(&mut self, level: Option<DeterminismLevel>) -> crate::Result<()> {
        self.state
            .set(RoutineAttr::DeterminismLevel, |body| body.determinism_level = level)
            .await
    }

    /// Applies every change made in `configure` with a single patch. Returns
    /// false, without a request, when nothing changed.
    pub async fn update<F>(&mut self, configure: F) -> crate::Result<bool>
    where
        F: FnOnce(&mut RoutineUpdater),
    {
        let body = self.state.ensure_full().await?.clone();
        let mut updater = RoutineUpdater {
            inner: Updater::from_body(body)?,
        };
        configure(&mut updater);

        self.state.apply(updater.into_updater()).await
    }

    pub async fn delete(&mut self) -> crate::Result<()> {
        self.state.delete(DeleteOptions::default()).await
    }
}
