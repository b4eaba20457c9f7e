use std::fmt;
use std::sync::Arc;

use bigquery_model_rs::query::GetQueryResultsResponse;
use bigquery_model_rs::table_data::{
    TableDataInsertAllRequest, TableDataInsertAllResponse, TableDataList,
};
use bigquery_model_rs::{ErrorProto, JobReference, TableReference};
use reqwest::{Method, RequestBuilder, Response};
use serde_json::Value;
use url::Url;

use super::{DeleteOptions, GcpAuth, ListResponse, PageRequest, Service, TokenSource};
use crate::config::ClientConfig;
use crate::error::ApiError;
use crate::path::{ResourcePath, ResourceType};
use crate::resource::PatchBody;

/// [`Service`] over the BigQuery v2 JSON API.
#[derive(Clone)]
pub struct RestService {
    client: reqwest::Client,
    auth: Arc<dyn TokenSource>,
    base_url: Url,
    project_id: Box<str>,
}

impl fmt::Debug for RestService {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RestService")
            .field("base_url", &self.base_url.as_str())
            .field("project_id", &self.project_id)
            .finish_non_exhaustive()
    }
}

impl RestService {
    pub fn new(
        project_id: impl Into<Box<str>>,
        auth: Arc<dyn TokenSource>,
        config: &ClientConfig,
    ) -> crate::Result<Self> {
        let mut builder = reqwest::Client::builder().user_agent(&*config.user_agent);
        if let Some(timeout) = config.timeout {
            builder = builder.timeout(timeout);
        }

        let base_url = Url::parse(&config.base_url)?;
        if base_url.cannot_be_a_base() {
            return Err(crate::Error::invalid_argument(format!(
                "'{base_url}' cannot be used as a base url"
            )));
        }

        Ok(Self {
            client: builder.build()?,
            auth,
            base_url,
            project_id: project_id.into(),
        })
    }

    /// Authenticates with the ambient Google credentials, using the project
    /// they belong to.
    pub async fn from_environment(config: &ClientConfig) -> crate::Result<Self> {
        let auth = GcpAuth::from_environment().await?;
        let project_id = auth.project_id().await?;
        Self::new(&*project_id, Arc::new(auth), config)
    }

    pub(crate) fn make_url<'a, P>(&self, path: P) -> Url
    where
        P: IntoIterator<Item = &'a str>,
    {
        let mut new_url = self.base_url.clone();

        // checked in 'new', a base url always has path segments.
        if let Ok(mut segments) = new_url.path_segments_mut() {
            segments.pop_if_empty().extend(path);
        }

        new_url
    }

    fn resource_url(&self, path: &ResourcePath, suffix: &[&str]) -> Url {
        let mut url = self.make_url(path.segments().into_iter().chain(suffix.iter().copied()));

        if let Some(location) = path.location() {
            url.query_pairs_mut().append_pair("location", location);
        }

        url
    }

    async fn request(&self, method: Method, url: Url) -> crate::Result<RequestBuilder> {
        let header = self.auth.header().await?;

        debug!(message = "sending request", %method, %url);

        Ok(self
            .client
            .request(method, url)
            .header(http::header::AUTHORIZATION, header))
    }

    async fn send(builder: RequestBuilder) -> crate::Result<Response> {
        let resp = builder.send().await?;

        if !resp.status().is_success() {
            Err(handle_error(resp).await)
        } else {
            Ok(resp)
        }
    }
}

fn append_page(url: &mut Url, page: &PageRequest) {
    if page.page_token.is_none() && page.max_results.is_none() {
        return;
    }

    let mut pairs = url.query_pairs_mut();
    if let Some(ref token) = page.page_token {
        pairs.append_pair("pageToken", token);
    }

    if let Some(max) = page.max_results {
        pairs.append_pair("maxResults", &max.to_string());
    }
}

#[async_trait::async_trait]
impl Service for RestService {
    fn project_id(&self) -> &str {
        &self.project_id
    }

    async fn get_resource(&self, path: &ResourcePath) -> crate::Result<Value> {
        let url = self.resource_url(path, &[]);
        let resp = Self::send(self.request(Method::GET, url).await?).await?;
        deserialize_json(resp).await
    }

    async fn list_resources(
        &self,
        parent: &ResourcePath,
        ty: ResourceType,
        page: PageRequest,
    ) -> crate::Result<ListResponse> {
        let mut url = self.resource_url(parent, &[ty.collection()]);
        append_page(&mut url, &page);

        let resp = Self::send(self.request(Method::GET, url).await?).await?;
        let body: Value = deserialize_json(resp).await?;
        Ok(ListResponse::from_body(ty, body))
    }

    async fn insert_resource(
        &self,
        parent: &ResourcePath,
        ty: ResourceType,
        body: Value,
    ) -> crate::Result<Value> {
        let url = self.resource_url(parent, &[ty.collection()]);
        let builder = self.request(Method::POST, url).await?.json(&body);
        deserialize_json(Self::send(builder).await?).await
    }

    async fn patch_resource(&self, path: &ResourcePath, patch: PatchBody) -> crate::Result<Value> {
        let url = self.resource_url(path, &[]);
        let mut builder = self.request(Method::PATCH, url).await?;

        if let Some(ref etag) = patch.etag {
            builder = builder.header(http::header::IF_MATCH, &**etag);
        }

        let builder = builder.json(&patch.to_value());
        deserialize_json(Self::send(builder).await?).await
    }

    async fn delete_resource(
        &self,
        path: &ResourcePath,
        options: DeleteOptions,
    ) -> crate::Result<()> {
        let mut url = self.resource_url(path, &[]);
        if options.delete_contents {
            url.query_pairs_mut().append_pair("deleteContents", "true");
        }

        Self::send(self.request(Method::DELETE, url).await?).await?;
        Ok(())
    }

    async fn insert_table_data(
        &self,
        table: &TableReference,
        request: TableDataInsertAllRequest,
    ) -> crate::Result<TableDataInsertAllResponse> {
        let path = ResourcePath::Table(table.clone());
        let url = self.resource_url(&path, &["insertAll"]);

        let builder = self.request(Method::POST, url).await?.json(&request);
        deserialize_json(Self::send(builder).await?).await
    }

    async fn list_table_data(
        &self,
        table: &TableReference,
        page: PageRequest,
    ) -> crate::Result<TableDataList> {
        let path = ResourcePath::Table(table.clone());
        let mut url = self.resource_url(&path, &["data"]);
        append_page(&mut url, &page);

        let resp = Self::send(self.request(Method::GET, url).await?).await?;
        deserialize_json(resp).await
    }

    async fn get_query_results(
        &self,
        job: &JobReference,
        page: PageRequest,
    ) -> crate::Result<GetQueryResultsResponse> {
        let mut url = self.make_url(["projects", &*job.project_id, "queries", &*job.job_id]);
        if let Some(ref location) = job.location {
            url.query_pairs_mut().append_pair("location", location);
        }
        append_page(&mut url, &page);

        let resp = Self::send(self.request(Method::GET, url).await?).await?;
        deserialize_json(resp).await
    }

    async fn cancel_job(&self, job: &JobReference) -> crate::Result<Value> {
        #[derive(serde::Deserialize)]
        struct CancelResponse {
            job: Value,
        }

        let path = ResourcePath::Job(job.clone());
        let url = self.resource_url(&path, &["cancel"]);

        let builder = self
            .request(Method::POST, url)
            .await?
            .json(&serde_json::json!({}));

        let CancelResponse { job } = deserialize_json(Self::send(builder).await?).await?;
        Ok(job)
    }
}

pub(crate) async fn handle_error(response: Response) -> crate::Error {
    let status = response.status().as_u16();
    let text = match response.text().await {
        Ok(text) => text,
        Err(error) => return error.into(),
    };

    match parse_error_body(status, &text) {
        Ok(Some(error)) => return error.classify(),
        // this is if the response is text based and not json
        Ok(None) => (),
        Err(error) => warn!(
            message = "failed to deserialize error json, falling back to raw text",
            ?error
        ),
    }

    ApiError::new(status, ErrorProto::new(text)).classify()
}

/// Understands the standard `{"error": {"message", "errors": [..]}}`
/// envelope, a bare `{"errors": [..]}` object, a bare array of protos, and a
/// single proto.
fn parse_error_body(status: u16, text: &str) -> Result<Option<ApiError>, serde_json::Error> {
    #[derive(serde::Deserialize)]
    struct Errors {
        #[serde(default)]
        message: Option<String>,
        #[serde(default)]
        errors: Vec<ErrorProto>,
    }

    let text = text.trim_start();

    if text.starts_with('[') {
        let errors: Vec<ErrorProto> = serde_json::from_str(text)?;
        return Ok(Some(ApiError::from_protos(
            status,
            "no error information given",
            errors,
        )));
    }

    if !text.starts_with('{') {
        return Ok(None);
    }

    let mut value: Value = serde_json::from_str(text)?;

    let errors_value = if value.get("error").is_some() {
        value["error"].take()
    } else if value.get("errors").is_some() {
        value
    } else {
        let proto: ErrorProto = serde_json::from_value(value)?;
        return Ok(Some(ApiError::new(status, proto)));
    };

    let Errors { message, errors } = serde_json::from_value(errors_value)?;
    let message = message.as_deref().unwrap_or("no error information given");
    Ok(Some(ApiError::from_protos(status, message, errors)))
}

pub(crate) async fn deserialize_json<T>(response: Response) -> crate::Result<T>
where
    T: serde::de::DeserializeOwned,
{
    let bytes = response.bytes().await?;
    serde_json::from_slice(&bytes).map_err(crate::Error::from)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_google_error_envelope() {
        let body = r#"{
            "error": {
                "code": 404,
                "message": "Not found: Table p:d.t",
                "errors": [{
                    "message": "Not found: Table p:d.t",
                    "domain": "global",
                    "reason": "notFound"
                }],
                "status": "NOT_FOUND"
            }
        }"#;

        let err = parse_error_body(404, body).unwrap().unwrap();
        assert_eq!(err.status, 404);
        assert!(err.main.is_not_found());
        assert!(err.classify().is_not_found());
    }

    #[test]
    fn test_parse_bare_array_and_text() {
        let body = r#"[{"reason": "duplicate", "message": "Already Exists"}, {"message": "extra"}]"#;
        let err = parse_error_body(409, body).unwrap().unwrap();
        assert_eq!(err.misc.len(), 1);
        assert!(err.classify().is_already_exists());

        assert!(parse_error_body(502, "Bad Gateway").unwrap().is_none());
    }
}
