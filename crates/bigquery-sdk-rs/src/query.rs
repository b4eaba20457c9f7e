use bigquery_model_rs::JobReference;
use bigquery_model_rs::query::GetQueryResultsResponse;
use bigquery_model_rs::table::{TableFieldSchema, TableSchema};
use futures::{Stream, TryStreamExt, stream};
use serde_json::{Map, Value};

use crate::Client;
use crate::job::{self, Job, QueryOptions};
use crate::service::PageRequest;
use crate::table::decode_rows;

/// Starts a query job under `project_id`.
pub(crate) async fn query_job(
    client: &Client,
    project_id: &str,
    sql: &str,
    options: &QueryOptions,
) -> crate::Result<Job> {
    let configuration = options.to_configuration(sql);
    job::submit(client, project_id, configuration, &options.job).await
}

/// Runs a query to completion and reads the first page of its results.
pub(crate) async fn query(
    client: &Client,
    project_id: &str,
    sql: &str,
    options: &QueryOptions,
) -> crate::Result<QueryData> {
    let job = query_job(client, project_id, sql, options).await?.finish().await?;

    let page = PageRequest {
        page_token: None,
        max_results: options.max_results,
    };

    job.query_results(page).await
}

/// One page of query results, decoded against the result schema.
#[derive(Debug, Clone)]
pub struct QueryData {
    client: Client,
    job: JobReference,
    schema: TableSchema,
    rows: Vec<Map<String, Value>>,
    max_results: Option<u32>,
    response: GetQueryResultsResponse,
}

impl QueryData {
    pub(crate) async fn fetch(
        client: Client,
        job: JobReference,
        page: PageRequest,
    ) -> crate::Result<Self> {
        debug!(message = "fetching query results", job_id = &*job.job_id, page_token = ?page.page_token);

        let max_results = page.max_results;
        let mut response = client.service().get_query_results(&job, page).await?;

        let schema = response.schema.take().unwrap_or_default();
        let rows = decode_rows(&schema.fields, &response.rows)?;
        response.rows.clear();

        Ok(Self {
            client,
            job,
            schema,
            rows,
            max_results,
            response,
        })
    }

    pub fn job_ref(&self) -> &JobReference {
        &self.job
    }

    pub fn rows(&self) -> &[Map<String, Value>] {
        &self.rows
    }

    pub fn into_rows(self) -> Vec<Map<String, Value>> {
        self.rows
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    pub fn schema(&self) -> &TableSchema {
        &self.schema
    }

    pub fn fields(&self) -> &[TableFieldSchema] {
        &self.schema.fields
    }

    pub fn headers(&self) -> impl Iterator<Item = &str> + '_ {
        self.schema.fields.iter().map(|field| &*field.name)
    }

    /// Total rows in the result set, across every page.
    pub fn total(&self) -> Option<u64> {
        self.response.total_rows
    }

    pub fn token(&self) -> Option<&str> {
        self.response.page_token.as_deref()
    }

    pub fn is_complete(&self) -> bool {
        self.response.job_complete
    }

    pub fn cache_hit(&self) -> bool {
        self.response.cache_hit.unwrap_or(false)
    }

    pub fn bytes_processed(&self) -> Option<u64> {
        self.response.total_bytes_processed
    }

    /// Rows touched by a DML statement.
    pub fn num_dml_affected_rows(&self) -> Option<u64> {
        self.response.num_dml_affected_rows
    }

    pub async fn next(&self) -> crate::Result<Option<QueryData>> {
        let Some(token) = self.token() else {
            return Ok(None);
        };

        let page = PageRequest {
            page_token: Some(token.into()),
            max_results: self.max_results,
        };

        Self::fetch(self.client.clone(), self.job.clone(), page)
            .await
            .map(Some)
    }

    /// Every row of this page and the ones after it.
    pub fn all(self) -> impl Stream<Item = crate::Result<Map<String, Value>>> + Send {
        stream::try_unfold(Some(self), |data| async move {
            let Some(data) = data else {
                return Ok(None);
            };

            let next = data.next().await?;
            let rows = stream::iter(data.rows.into_iter().map(Ok));
            Ok::<_, crate::Error>(Some((rows, next)))
        })
        .try_flatten()
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use bigquery_model_rs::table_data::Row;
    use serde_json::json;

    use super::*;
    use crate::ClientConfig;
    use crate::service::mock::MockService;

    fn row(name: &str, n: i64) -> Row {
        serde_json::from_value(json!({ "f": [{ "v": name }, { "v": n.to_string() }] })).unwrap()
    }

    #[tokio::test]
    async fn test_results_are_paged_and_decoded() -> crate::Result<()> {
        let mock = Arc::new(MockService::new("p"));
        let schema: TableSchema = serde_json::from_value(json!({
            "fields": [
                { "name": "name", "type": "STRING" },
                { "name": "n", "type": "INTEGER" }
            ]
        }))?;

        mock.set_query_results("q", GetQueryResultsResponse {
            schema: Some(schema),
            total_rows: Some(3),
            rows: vec![row("a", 1), row("b", 2), row("c", 3)],
            job_complete: true,
            ..Default::default()
        });

        let client = Client::new(mock.clone(), ClientConfig::default());
        let data = QueryData::fetch(client, JobReference::new("p", "q"), PageRequest::max(2)).await?;

        assert!(data.is_complete());
        assert_eq!(data.len(), 2);
        assert_eq!(data.total(), Some(3));
        assert_eq!(data.headers().collect::<Vec<_>>(), ["name", "n"]);
        assert_eq!(data.rows()[1]["n"], 2);

        let rows = data.all().try_collect::<Vec<_>>().await?;
        assert_eq!(
            rows.iter().map(|row| row["name"].clone()).collect::<Vec<_>>(),
            [json!("a"), json!("b"), json!("c")]
        );
        Ok(())
    }
}
