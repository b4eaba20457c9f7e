//! Wire model for the BigQuery v2 REST API.
//!
//! Every body here mirrors the JSON the service sends and accepts: camelCase
//! keys, int64 values encoded as strings, timestamps as epoch milliseconds.
//! Optional fields are skipped when `None`, so a default-constructed body
//! serializes to `{}`.
use std::fmt;

pub mod dataset;
pub mod job;
pub mod model;
pub mod query;
pub mod routine;
pub mod table;
pub mod table_data;
pub mod util;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, serde::Deserialize, serde::Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DatasetReference<S = Box<str>> {
    pub project_id: S,
    pub dataset_id: S,
}

impl DatasetReference {
    pub fn new(project_id: impl Into<Box<str>>, dataset_id: impl Into<Box<str>>) -> Self {
        Self {
            project_id: project_id.into(),
            dataset_id: dataset_id.into(),
        }
    }

    pub fn table(&self, table_id: impl Into<Box<str>>) -> TableReference {
        TableReference {
            project_id: self.project_id.clone(),
            dataset_id: self.dataset_id.clone(),
            table_id: table_id.into(),
        }
    }

    pub fn routine(&self, routine_id: impl Into<Box<str>>) -> RoutineReference {
        RoutineReference {
            project_id: self.project_id.clone(),
            dataset_id: self.dataset_id.clone(),
            routine_id: routine_id.into(),
        }
    }

    pub fn model(&self, model_id: impl Into<Box<str>>) -> ModelReference {
        ModelReference {
            project_id: self.project_id.clone(),
            dataset_id: self.dataset_id.clone(),
            model_id: model_id.into(),
        }
    }
}

impl<S> DatasetReference<S> {
    #[inline]
    pub fn as_deref(&self) -> DatasetReference<&S::Target>
    where
        S: std::ops::Deref,
    {
        DatasetReference {
            project_id: self.project_id.deref(),
            dataset_id: self.dataset_id.deref(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, serde::Deserialize, serde::Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TableReference<S = Box<str>> {
    pub project_id: S,
    pub dataset_id: S,
    pub table_id: S,
}

impl<S> TableReference<S> {
    #[inline]
    pub fn as_deref(&self) -> TableReference<&S::Target>
    where
        S: std::ops::Deref,
    {
        TableReference {
            project_id: self.project_id.deref(),
            dataset_id: self.dataset_id.deref(),
            table_id: self.table_id.deref(),
        }
    }

    #[inline]
    pub const fn dataset_reference(&self) -> DatasetReference<&S> {
        DatasetReference {
            project_id: &self.project_id,
            dataset_id: &self.dataset_id,
        }
    }
}

impl TableReference {
    pub fn new(
        project_id: impl Into<Box<str>>,
        dataset_id: impl Into<Box<str>>,
        table_id: impl Into<Box<str>>,
    ) -> Self {
        Self {
            project_id: project_id.into(),
            dataset_id: dataset_id.into(),
            table_id: table_id.into(),
        }
    }

    pub fn to_dataset_reference(&self) -> DatasetReference {
        DatasetReference {
            project_id: self.project_id.clone(),
            dataset_id: self.dataset_id.clone(),
        }
    }

    /// The fully qualified, backtick-quoted name usable in a standard SQL query.
    pub fn query_id(&self) -> String {
        format!("`{}.{}.{}`", self.project_id, self.dataset_id, self.table_id)
    }

    /// Parses `table`, `dataset.table`, `project.dataset.table` or the legacy
    /// `project:dataset.table` form. Missing components come from `default`.
    pub fn parse(s: &str, default: &DatasetReference) -> Result<Self, ParseReferenceError> {
        let (project_id, rest) = match s.split_once(':') {
            Some((project, rest)) => (Some(project), rest),
            None => (None, s),
        };

        let mut parts = rest.split('.').collect::<Vec<_>>();
        if parts.iter().any(|part| part.is_empty()) || parts.len() > 3 {
            return Err(ParseReferenceError(s.into()));
        }

        let table_id = parts.pop().ok_or_else(|| ParseReferenceError(s.into()))?;
        let dataset_id = parts.pop();

        let project_id = match (project_id, parts.pop()) {
            (Some(_), Some(_)) => return Err(ParseReferenceError(s.into())),
            (Some(project), None) | (None, Some(project)) => project,
            (None, None) => &*default.project_id,
        };

        Ok(Self::new(
            project_id,
            dataset_id.unwrap_or(&*default.dataset_id),
            table_id,
        ))
    }
}

impl<S: fmt::Display> fmt::Display for TableReference<S> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}.{}", self.project_id, self.dataset_id, self.table_id)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("'{0}' is not a valid table reference")]
pub struct ParseReferenceError(pub Box<str>);

#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, serde::Deserialize, serde::Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RoutineReference<S = Box<str>> {
    pub project_id: S,
    pub dataset_id: S,
    pub routine_id: S,
}

impl<S> RoutineReference<S> {
    #[inline]
    pub const fn dataset_reference(&self) -> DatasetReference<&S> {
        DatasetReference {
            project_id: &self.project_id,
            dataset_id: &self.dataset_id,
        }
    }
}

impl RoutineReference {
    pub fn to_dataset_reference(&self) -> DatasetReference {
        DatasetReference {
            project_id: self.project_id.clone(),
            dataset_id: self.dataset_id.clone(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, serde::Deserialize, serde::Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ModelReference<S = Box<str>> {
    pub project_id: S,
    pub dataset_id: S,
    pub model_id: S,
}

impl<S> ModelReference<S> {
    #[inline]
    pub const fn dataset_reference(&self) -> DatasetReference<&S> {
        DatasetReference {
            project_id: &self.project_id,
            dataset_id: &self.dataset_id,
        }
    }
}

impl ModelReference {
    pub fn to_dataset_reference(&self) -> DatasetReference {
        DatasetReference {
            project_id: self.project_id.clone(),
            dataset_id: self.dataset_id.clone(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Hash, serde::Deserialize, serde::Serialize)]
#[serde(rename_all = "camelCase")]
pub struct JobReference<S = Box<str>> {
    pub project_id: S,
    pub job_id: S,
    /// The geographic location of the job. See details at
    /// https://cloud.google.com/bigquery/docs/locations#specifying_your_location.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub location: Option<S>,
}

impl JobReference {
    pub fn new(project_id: impl Into<Box<str>>, job_id: impl Into<Box<str>>) -> Self {
        Self {
            project_id: project_id.into(),
            job_id: job_id.into(),
            location: None,
        }
    }

    pub fn with_location(mut self, location: impl Into<Box<str>>) -> Self {
        self.location = Some(location.into());
        self
    }
}

#[derive(Debug, Clone, PartialEq, serde::Deserialize, serde::Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ErrorProto<S = Box<str>> {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reason: Option<S>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub location: Option<S>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub debug_info: Option<S>,
    pub message: S,
}

impl ErrorProto {
    pub fn new(message: impl Into<Box<str>>) -> Self {
        Self {
            reason: None,
            location: None,
            debug_info: None,
            message: message.into(),
        }
    }

    pub fn with_reason(mut self, reason: impl Into<Box<str>>) -> Self {
        self.reason = Some(reason.into());
        self
    }
}

impl<S: fmt::Display> fmt::Display for ErrorProto<S> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.reason {
            Some(ref reason) => write!(f, "{}: {reason}", self.message),
            None => write!(f, "{}", self.message),
        }
    }
}

impl std::error::Error for ErrorProto {}

impl<S: AsRef<str>> ErrorProto<S> {
    fn reason_is(&self, expected: &str) -> bool {
        self.reason
            .as_ref()
            .is_some_and(|reason| reason.as_ref() == expected)
    }

    pub fn is_not_found(&self) -> bool {
        self.reason_is("notFound")
    }

    pub fn is_duplicate(&self) -> bool {
        self.reason_is("duplicate")
    }

    pub fn is_condition_not_met(&self) -> bool {
        self.reason_is("conditionNotMet")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn default_dataset() -> DatasetReference {
        DatasetReference::new("proj", "main")
    }

    #[test]
    fn test_parse_table_reference() {
        let default = default_dataset();

        assert_eq!(
            TableReference::parse("events", &default).unwrap(),
            TableReference::new("proj", "main", "events")
        );
        assert_eq!(
            TableReference::parse("other.events", &default).unwrap(),
            TableReference::new("proj", "other", "events")
        );
        assert_eq!(
            TableReference::parse("p2.other.events", &default).unwrap(),
            TableReference::new("p2", "other", "events")
        );
        assert_eq!(
            TableReference::parse("p2:other.events", &default).unwrap(),
            TableReference::new("p2", "other", "events")
        );

        assert!(TableReference::parse("a..b", &default).is_err());
        assert!(TableReference::parse("a.b.c.d", &default).is_err());
        assert!(TableReference::parse("p:a.b.c", &default).is_err());
    }

    #[test]
    fn test_table_reference_display() {
        let table = TableReference::new("proj", "main", "events");
        assert_eq!(table.to_string(), "proj:main.events");
        assert_eq!(table.query_id(), "`proj.main.events`");
    }

    #[test]
    fn test_error_proto_reasons() {
        let err = ErrorProto::new("Not found: Table proj:main.events").with_reason("notFound");
        assert!(err.is_not_found());
        assert!(!err.is_duplicate());
        assert_eq!(
            err.to_string(),
            "Not found: Table proj:main.events: notFound"
        );
    }
}
