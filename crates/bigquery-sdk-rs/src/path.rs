//! Serialized resource identities, as they appear in REST routes.
use std::fmt;

use bigquery_model_rs::{
    DatasetReference, JobReference, ModelReference, RoutineReference, TableReference,
};

/// The address of a single resource.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum ResourcePath {
    Project(Box<str>),
    Dataset(DatasetReference),
    Table(TableReference),
    Routine(RoutineReference),
    Model(ModelReference),
    Job(JobReference),
}

/// A child collection of a [`ResourcePath`], used for list and insert calls.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ResourceType {
    Dataset,
    Table,
    Routine,
    Model,
    Job,
}

impl ResourceType {
    /// The route segment of the collection, which is also the key holding
    /// the items of a list response.
    pub const fn collection(self) -> &'static str {
        match self {
            Self::Dataset => "datasets",
            Self::Table => "tables",
            Self::Routine => "routines",
            Self::Model => "models",
            Self::Job => "jobs",
        }
    }

    /// The key of the body's own reference (`tableReference`, ...).
    pub const fn reference_key(self) -> &'static str {
        match self {
            Self::Dataset => "datasetReference",
            Self::Table => "tableReference",
            Self::Routine => "routineReference",
            Self::Model => "modelReference",
            Self::Job => "jobReference",
        }
    }

    /// The key of the id inside that reference.
    pub const fn id_key(self) -> &'static str {
        match self {
            Self::Dataset => "datasetId",
            Self::Table => "tableId",
            Self::Routine => "routineId",
            Self::Model => "modelId",
            Self::Job => "jobId",
        }
    }
}

impl ResourcePath {
    pub fn project_id(&self) -> &str {
        match self {
            Self::Project(project_id) => project_id,
            Self::Dataset(dataset) => &dataset.project_id,
            Self::Table(table) => &table.project_id,
            Self::Routine(routine) => &routine.project_id,
            Self::Model(model) => &model.project_id,
            Self::Job(job) => &job.project_id,
        }
    }

    /// Route segments below the API root, i.e `["projects", "p", "datasets", "d"]`.
    pub fn segments(&self) -> Vec<&str> {
        let mut segments = vec!["projects", self.project_id()];

        match self {
            Self::Project(_) => (),
            Self::Dataset(dataset) => segments.extend(["datasets", &*dataset.dataset_id]),
            Self::Table(table) => segments.extend([
                "datasets",
                &*table.dataset_id,
                "tables",
                &*table.table_id,
            ]),
            Self::Routine(routine) => segments.extend([
                "datasets",
                &*routine.dataset_id,
                "routines",
                &*routine.routine_id,
            ]),
            Self::Model(model) => segments.extend([
                "datasets",
                &*model.dataset_id,
                "models",
                &*model.model_id,
            ]),
            Self::Job(job) => segments.extend(["jobs", &*job.job_id]),
        }

        segments
    }

    /// Every id making up this path, paired with its field name.
    fn ids(&self) -> Vec<(&'static str, &str)> {
        let mut ids = vec![("project_id", self.project_id())];

        match self {
            Self::Project(_) => (),
            Self::Dataset(dataset) => ids.push(("dataset_id", &*dataset.dataset_id)),
            Self::Table(table) => {
                ids.extend([("dataset_id", &*table.dataset_id), ("table_id", &*table.table_id)])
            }
            Self::Routine(routine) => ids.extend([
                ("dataset_id", &*routine.dataset_id),
                ("routine_id", &*routine.routine_id),
            ]),
            Self::Model(model) => {
                ids.extend([("dataset_id", &*model.dataset_id), ("model_id", &*model.model_id)])
            }
            Self::Job(job) => ids.push(("job_id", &*job.job_id)),
        }

        ids
    }

    /// Rejects a path with an empty id, which would otherwise address the
    /// parent collection.
    pub fn validate(&self) -> crate::Result<()> {
        match self.ids().into_iter().find(|(_, id)| id.is_empty()) {
            Some((field, _)) => Err(crate::Error::invalid_argument(format!(
                "{field} is required, got an empty string"
            ))),
            None => Ok(()),
        }
    }

    /// Jobs are regional, and need their location passed as a query parameter.
    pub fn location(&self) -> Option<&str> {
        match self {
            Self::Job(job) => job.location.as_deref(),
            _ => None,
        }
    }

    /// The path of a child in the collection `ty` below this one.
    pub fn child(&self, ty: ResourceType, id: &str) -> Option<ResourcePath> {
        let project_id = self.project_id();
        match (self, ty) {
            (Self::Project(_), ResourceType::Dataset) => Some(Self::Dataset(
                DatasetReference::new(project_id, id),
            )),
            (Self::Project(_), ResourceType::Job) => Some(Self::Job(JobReference {
                project_id: project_id.into(),
                job_id: id.into(),
                location: None,
            })),
            (Self::Dataset(dataset), ResourceType::Table) => Some(Self::Table(dataset.table(id))),
            (Self::Dataset(dataset), ResourceType::Routine) => {
                Some(Self::Routine(dataset.routine(id)))
            }
            (Self::Dataset(dataset), ResourceType::Model) => Some(Self::Model(dataset.model(id))),
            _ => None,
        }
    }
}

impl fmt::Display for ResourcePath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut first = true;
        for segment in self.segments() {
            if !first {
                f.write_str("/")?;
            }
            first = false;
            f.write_str(segment)?;
        }

        Ok(())
    }
}

impl From<DatasetReference> for ResourcePath {
    fn from(value: DatasetReference) -> Self {
        Self::Dataset(value)
    }
}

impl From<TableReference> for ResourcePath {
    fn from(value: TableReference) -> Self {
        Self::Table(value)
    }
}

impl From<RoutineReference> for ResourcePath {
    fn from(value: RoutineReference) -> Self {
        Self::Routine(value)
    }
}

impl From<ModelReference> for ResourcePath {
    fn from(value: ModelReference) -> Self {
        Self::Model(value)
    }
}

impl From<JobReference> for ResourcePath {
    fn from(value: JobReference) -> Self {
        Self::Job(value)
    }
}
