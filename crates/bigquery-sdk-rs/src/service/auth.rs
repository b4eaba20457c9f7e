use std::fmt;
use std::sync::Arc;

use http::header::HeaderValue;

use crate::config::BIGQUERY_SCOPE;

/// Supplies the `Authorization` header for each request.
#[async_trait::async_trait]
pub trait TokenSource: Send + Sync {
    async fn header(&self) -> crate::Result<HeaderValue>;
}

/// Tokens from the ambient Google credentials (service account, metadata
/// server, gcloud), via [`gcp_auth`].
#[derive(Clone)]
pub struct GcpAuth {
    provider: Arc<dyn gcp_auth::TokenProvider>,
}

impl GcpAuth {
    pub fn new(provider: Arc<dyn gcp_auth::TokenProvider>) -> Self {
        Self { provider }
    }

    pub async fn from_environment() -> crate::Result<Self> {
        let provider = gcp_auth::provider().await?;
        Ok(Self { provider })
    }

    pub async fn project_id(&self) -> crate::Result<Arc<str>> {
        self.provider.project_id().await.map_err(crate::Error::from)
    }
}

impl fmt::Debug for GcpAuth {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("GcpAuth").finish_non_exhaustive()
    }
}

#[async_trait::async_trait]
impl TokenSource for GcpAuth {
    async fn header(&self) -> crate::Result<HeaderValue> {
        let token = self.provider.token(&[BIGQUERY_SCOPE]).await?;
        build_header(token.as_str())
    }
}

/// A fixed token, for emulators and tests.
#[derive(Clone)]
pub struct StaticToken {
    header: HeaderValue,
}

impl StaticToken {
    pub fn new(token: &str) -> crate::Result<Self> {
        build_header(token).map(|header| Self { header })
    }
}

impl fmt::Debug for StaticToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("StaticToken").finish_non_exhaustive()
    }
}

#[async_trait::async_trait]
impl TokenSource for StaticToken {
    async fn header(&self) -> crate::Result<HeaderValue> {
        Ok(self.header.clone())
    }
}

fn build_header(token: &str) -> crate::Result<HeaderValue> {
    const BEARER_PREFIX: &str = "Bearer ";

    let mut header = HeaderValue::try_from(format!("{BEARER_PREFIX}{token}"))?;
    header.set_sensitive(true);
    Ok(header)
}
