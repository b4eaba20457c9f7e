use std::borrow::Cow;
use std::fmt;

use bigquery_model_rs::ErrorProto;

#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error(transparent)]
    Auth(#[from] gcp_auth::Error),
    #[error(transparent)]
    Reqwest(#[from] reqwest::Error),
    #[error(transparent)]
    Json(#[from] serde_json::Error),
    #[error(transparent)]
    InvalidHeaderValue(#[from] http::header::InvalidHeaderValue),
    #[error(transparent)]
    InvalidUrl(#[from] url::ParseError),
    /// The resource (or its parent) does not exist.
    #[error("not found: {0}")]
    NotFound(ApiError),
    /// The ETag sent with a patch no longer matches the server's copy.
    #[error("precondition failed: {0}")]
    PreconditionFailed(ApiError),
    #[error("already exists: {0}")]
    AlreadyExists(ApiError),
    #[error(transparent)]
    Api(ApiError),
    #[error("job '{job_id}' failed: {main}")]
    JobFailed {
        job_id: Box<str>,
        main: ErrorProto,
        misc: Vec<ErrorProto>,
    },
    #[error("timed out waiting for job '{0}' to complete")]
    JobTimeout(Box<str>),
    #[error("invalid argument: {0}")]
    InvalidArgument(Cow<'static, str>),
    #[error("{resource} is missing required field '{field}'")]
    MissingField {
        resource: &'static str,
        field: &'static str,
    },
}

impl Error {
    pub(crate) fn missing_field<T: ?Sized>(field: &'static str) -> Self {
        let resource = std::any::type_name::<T>();
        let resource = resource.rsplit("::").next().unwrap_or(resource);
        Self::MissingField { resource, field }
    }

    pub(crate) fn invalid_argument(message: impl Into<Cow<'static, str>>) -> Self {
        Self::InvalidArgument(message.into())
    }

    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::NotFound(_))
    }

    pub fn is_precondition_failed(&self) -> bool {
        matches!(self, Self::PreconditionFailed(_))
    }

    pub fn is_already_exists(&self) -> bool {
        matches!(self, Self::AlreadyExists(_))
    }

    /// The error details returned by the service, if this error came from it.
    pub fn api_error(&self) -> Option<&ApiError> {
        match self {
            Self::NotFound(err)
            | Self::PreconditionFailed(err)
            | Self::AlreadyExists(err)
            | Self::Api(err) => Some(err),
            _ => None,
        }
    }
}

/// A non-2xx response from the service.
#[derive(Debug, Clone, PartialEq)]
pub struct ApiError {
    pub status: u16,
    pub main: ErrorProto,
    pub misc: Vec<ErrorProto>,
}

impl ApiError {
    pub fn new(status: u16, main: ErrorProto) -> Self {
        Self {
            status,
            main,
            misc: Vec::new(),
        }
    }

    /// Builds an [`ApiError`] from the `errors` array of an error response.
    /// The first entry becomes `main`.
    pub fn from_protos(status: u16, message: &str, mut protos: Vec<ErrorProto>) -> Self {
        if protos.is_empty() {
            return Self::new(status, ErrorProto::new(message));
        }

        let main = protos.remove(0);
        Self {
            status,
            main,
            misc: protos,
        }
    }

    /// Sorts this error into the variant callers branch on. The status code
    /// decides first, the reason of the main proto is the fallback for
    /// endpoints that report e.g. a missing table as a 400.
    pub fn classify(self) -> Error {
        match self.status {
            404 => Error::NotFound(self),
            409 => Error::AlreadyExists(self),
            412 => Error::PreconditionFailed(self),
            _ if self.main.is_not_found() => Error::NotFound(self),
            _ if self.main.is_duplicate() => Error::AlreadyExists(self),
            _ if self.main.is_condition_not_met() => Error::PreconditionFailed(self),
            _ => Error::Api(self),
        }
    }
}

impl fmt::Display for ApiError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "({}) {}", self.status, self.main)?;

        for proto in self.misc.iter() {
            write!(f, "; {proto}")?;
        }

        Ok(())
    }
}

impl std::error::Error for ApiError {}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_classify_by_status() {
        let err = ApiError::new(404, ErrorProto::new("Not found: Table p:d.t")).classify();
        assert!(err.is_not_found());

        let err = ApiError::new(412, ErrorProto::new("Precondition check failed.")).classify();
        assert!(err.is_precondition_failed());

        let err = ApiError::new(409, ErrorProto::new("Already Exists: Table p:d.t")).classify();
        assert!(err.is_already_exists());

        let err = ApiError::new(500, ErrorProto::new("backend error")).classify();
        assert!(matches!(err, Error::Api(ApiError { status: 500, .. })));
    }

    #[test]
    fn test_classify_by_reason() {
        let proto = ErrorProto::new("Not found: Dataset p:d").with_reason("notFound");
        assert!(ApiError::new(400, proto).classify().is_not_found());

        let proto = ErrorProto::new("stale").with_reason("conditionNotMet");
        assert!(ApiError::new(400, proto).classify().is_precondition_failed());
    }

    #[test]
    fn test_missing_field_names_type() {
        let err = Error::missing_field::<bigquery_model_rs::table::Table>("tableReference");
        assert_eq!(
            err.to_string(),
            "Table is missing required field 'tableReference'"
        );
    }
}
