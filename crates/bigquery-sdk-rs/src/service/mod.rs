//! The RPC boundary every resource talks through.
//!
//! Bodies cross the boundary as raw JSON. Typing them, and deciding what
//! fidelity they represent, is up to the caller.
use std::fmt;

use bigquery_model_rs::query::GetQueryResultsResponse;
use bigquery_model_rs::table_data::{
    TableDataInsertAllRequest, TableDataInsertAllResponse, TableDataList,
};
use bigquery_model_rs::{JobReference, TableReference};
use serde_json::Value;

use crate::path::{ResourcePath, ResourceType};
use crate::resource::PatchBody;

mod auth;
mod rest;

#[cfg(any(test, feature = "mock"))]
pub mod mock;

pub use auth::{GcpAuth, StaticToken, TokenSource};
pub use rest::RestService;

#[async_trait::async_trait]
pub trait Service: fmt::Debug + Send + Sync {
    /// The project new jobs and datasets are created in.
    fn project_id(&self) -> &str;

    /// Fetches the complete body of a resource.
    async fn get_resource(&self, path: &ResourcePath) -> crate::Result<Value>;

    /// Lists the children of `parent`. Items are partial bodies.
    async fn list_resources(
        &self,
        parent: &ResourcePath,
        ty: ResourceType,
        page: PageRequest,
    ) -> crate::Result<ListResponse>;

    /// Creates a child of `parent`, returning the complete body.
    async fn insert_resource(
        &self,
        parent: &ResourcePath,
        ty: ResourceType,
        body: Value,
    ) -> crate::Result<Value>;

    /// Applies a partial update. The patch ETag, when set, is a precondition.
    async fn patch_resource(&self, path: &ResourcePath, patch: PatchBody) -> crate::Result<Value>;

    async fn delete_resource(&self, path: &ResourcePath, options: DeleteOptions)
    -> crate::Result<()>;

    async fn insert_table_data(
        &self,
        table: &TableReference,
        request: TableDataInsertAllRequest,
    ) -> crate::Result<TableDataInsertAllResponse>;

    async fn list_table_data(
        &self,
        table: &TableReference,
        page: PageRequest,
    ) -> crate::Result<TableDataList>;

    async fn get_query_results(
        &self,
        job: &JobReference,
        page: PageRequest,
    ) -> crate::Result<GetQueryResultsResponse>;

    /// Requests cancellation, returning the job body as of the request.
    async fn cancel_job(&self, job: &JobReference) -> crate::Result<Value>;
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PageRequest {
    pub page_token: Option<Box<str>>,
    pub max_results: Option<u32>,
}

impl PageRequest {
    pub fn max(max_results: u32) -> Self {
        Self {
            page_token: None,
            max_results: Some(max_results),
        }
    }

    pub fn with_token(mut self, page_token: impl Into<Box<str>>) -> Self {
        self.page_token = Some(page_token.into());
        self
    }
}

/// One page of a list call, before the items are typed.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ListResponse {
    pub items: Vec<Value>,
    pub next_page_token: Option<Box<str>>,
}

impl ListResponse {
    /// Pulls the items and page token out of a list response body, i.e
    /// `{"tables": [...], "nextPageToken": "..."}`.
    pub fn from_body(ty: ResourceType, mut body: Value) -> Self {
        let items = match body.get_mut(ty.collection()).map(Value::take) {
            Some(Value::Array(items)) => items,
            _ => Vec::new(),
        };

        let next_page_token = body
            .get("nextPageToken")
            .and_then(Value::as_str)
            .filter(|token| !token.is_empty())
            .map(Box::from);

        Self {
            items,
            next_page_token,
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DeleteOptions {
    /// Delete a dataset along with all of its tables.
    pub delete_contents: bool,
}
