//! The entry point: a project, and the datasets and jobs under it.
use std::sync::Arc;

use bigquery_model_rs::{DatasetReference, JobReference};

use crate::dataset::{Dataset, DatasetUpdater};
use crate::job::{Job, QueryOptions};
use crate::list::Page;
use crate::path::ResourcePath;
use crate::query::{self, QueryData};
use crate::resource::lookup;
use crate::service::{PageRequest, RestService, Service};
use crate::{Client, ClientConfig};

/// Access to the datasets and jobs of the service's project.
///
/// ```no_run
/// # async fn demo() -> bigquery_sdk_rs::Result<()> {
/// use bigquery_sdk_rs::{ClientConfig, Project};
///
/// let project = Project::connect(ClientConfig::default()).await?;
/// if let Some(dataset) = project.dataset("analytics").await? {
///     let mut table = dataset.table_reference("events")?;
///     println!("{:?}", table.rows_count().await?);
/// }
/// # Ok(())
/// # }
/// ```
#[derive(Debug, Clone)]
pub struct Project {
    client: Client,
}

impl Project {
    pub fn new(service: Arc<dyn Service>, config: ClientConfig) -> Self {
        Self {
            client: Client::new(service, config),
        }
    }

    /// Connects over REST with the ambient Google credentials.
    pub async fn connect(config: ClientConfig) -> crate::Result<Self> {
        let service = RestService::from_environment(&config).await?;
        info!(message = "connected", project_id = service.project_id());
        Ok(Self::new(Arc::new(service), config))
    }

    pub fn client(&self) -> &Client {
        &self.client
    }

    pub fn project_id(&self) -> &str {
        self.client.project_id()
    }

    fn path(&self) -> ResourcePath {
        ResourcePath::Project(self.project_id().into())
    }

    /// Fetches a dataset, or `None` if it doesn't exist.
    pub async fn dataset(&self, dataset_id: &str) -> crate::Result<Option<Dataset>> {
        lookup(self.dataset_reference(dataset_id)?).await
    }

    /// A handle on a dataset without checking that it exists. Fails, without
    /// a request, if `dataset_id` is empty.
    pub fn dataset_reference(&self, dataset_id: &str) -> crate::Result<Dataset> {
        let reference = DatasetReference::new(self.project_id(), dataset_id);
        Dataset::new_reference(self.client.clone(), reference)
    }

    /// Creates a dataset with a single insert once `configure` returns.
    pub async fn create_dataset<F>(&self, dataset_id: &str, configure: F) -> crate::Result<Dataset>
    where
        F: FnOnce(&mut DatasetUpdater),
    {
        let reference = DatasetReference::new(self.project_id(), dataset_id);
        Dataset::create(self.client.clone(), reference, configure).await
    }

    pub async fn datasets(&self, page: PageRequest) -> crate::Result<Page<Dataset>> {
        Page::fetch(&self.client, self.path(), page).await
    }

    /// Fetches a job, or `None` if it doesn't exist. Jobs outside the US and
    /// EU multi-regions need their `location`.
    pub async fn job(&self, job_id: &str, location: Option<&str>) -> crate::Result<Option<Job>> {
        let mut reference = JobReference::new(self.project_id(), job_id);
        reference.location = location.map(Box::from);

        lookup(Job::new_reference(self.client.clone(), reference)?).await
    }

    pub async fn jobs(&self, page: PageRequest) -> crate::Result<Page<Job>> {
        Page::fetch(&self.client, self.path(), page).await
    }

    pub async fn query_job(&self, sql: &str, options: QueryOptions) -> crate::Result<Job> {
        query::query_job(&self.client, self.project_id(), sql, &options).await
    }

    /// Runs a query and waits for the first page of results. A failed query
    /// is returned as [`Error::JobFailed`](crate::Error::JobFailed).
    pub async fn query(&self, sql: &str, options: QueryOptions) -> crate::Result<QueryData> {
        query::query(&self.client, self.project_id(), sql, &options).await
    }
}

#[cfg(test)]
mod tests {
    use bigquery_model_rs::job::JobState;
    use bigquery_model_rs::query::GetQueryResultsResponse;
    use bigquery_model_rs::table::TableSchema;
    use serde_json::json;

    use super::*;
    use crate::job::JobOptions;
    use crate::resource::ReadableResource;
    use crate::service::mock::{CallKind, MockService};
    use crate::Error;

    fn project() -> (Arc<MockService>, Project) {
        let mock = Arc::new(MockService::new("p"));
        let project = Project::new(mock.clone(), ClientConfig::default());
        (mock, project)
    }

    #[tokio::test]
    async fn test_dataset_lifecycle() -> crate::Result<()> {
        let (mock, project) = project();
        assert!(project.dataset("analytics").await?.is_none());

        let created = project
            .create_dataset("analytics", |d| {
                d.set_name("Analytics");
                d.set_location("EU");
                d.labels().insert("team".into(), "data".into());
            })
            .await?;
        assert!(created.is_full());

        let inserted = mock.last_body(CallKind::Insert).unwrap();
        assert_eq!(inserted["location"], "EU");
        assert_eq!(inserted["labels"], json!({ "team": "data" }));

        let mut found = project.dataset("analytics").await?.expect("dataset exists");
        assert_eq!(found.name().await?, Some("Analytics"));

        let changed = found
            .update(|d| {
                d.set_description("events and sessions");
                d.labels().insert("env".into(), "prod".into());
            })
            .await?;
        assert!(changed);

        let patch = mock.last_body(CallKind::Patch).unwrap();
        assert_eq!(patch["labels"], json!({ "team": "data", "env": "prod" }));
        assert_eq!(patch["description"], "events and sessions");

        let page = project.datasets(PageRequest::default()).await?;
        assert_eq!(page.len(), 1);
        assert!(page.items()[0].is_partial());
        Ok(())
    }

    #[tokio::test]
    async fn test_empty_ids_fail_without_rpc() {
        let (mock, project) = project();

        let err = project.dataset_reference("").unwrap_err();
        assert!(matches!(err, Error::InvalidArgument(_)));

        let err = project.dataset("").await.unwrap_err();
        assert!(matches!(err, Error::InvalidArgument(_)));

        let err = project.create_dataset("", |_| {}).await.unwrap_err();
        assert!(matches!(err, Error::InvalidArgument(_)));

        let err = project.job("", None).await.unwrap_err();
        assert!(matches!(err, Error::InvalidArgument(_)));

        let options = QueryOptions::builder()
            .job(JobOptions::builder().job_id("").build())
            .build();
        let err = project.query_job("SELECT 1", options).await.unwrap_err();
        assert!(matches!(err, Error::InvalidArgument(_)));

        assert!(mock.calls().is_empty());
    }

    #[tokio::test]
    async fn test_job_lookup() -> crate::Result<()> {
        let (mock, project) = project();
        assert!(project.job("nope", None).await?.is_none());

        let options = QueryOptions::builder()
            .job(JobOptions::builder().job_id("q1").build())
            .build();
        project.query_job("SELECT 1", options).await?;

        let mut job = project.job("q1", None).await?.expect("job exists");
        assert!(job.is_done().await?);

        mock.fail_next(CallKind::Get, MockService::api_error(403, "access denied"));
        assert!(matches!(project.job("q1", None).await, Err(Error::Api(_))));

        let page = project.jobs(PageRequest::default()).await?;
        assert_eq!(page.len(), 1);
        Ok(())
    }

    #[tokio::test]
    async fn test_query_waits_and_reads_results() -> crate::Result<()> {
        let (mock, _) = project();
        mock.push_job_states("q", [JobState::Running, JobState::Done]);

        let schema: TableSchema =
            serde_json::from_value(json!({ "fields": [{ "name": "n", "type": "INTEGER" }] }))?;
        mock.set_query_results("q", GetQueryResultsResponse {
            schema: Some(schema),
            total_rows: Some(1),
            rows: vec![serde_json::from_value(json!({ "f": [{ "v": "42" }] }))?],
            job_complete: true,
            ..Default::default()
        });

        let config = ClientConfig::builder()
            .job_poll(crate::config::JobPollPolicy {
                initial_delay: std::time::Duration::from_millis(1),
                ..Default::default()
            })
            .build();
        let project = Project::new(mock.clone(), config);

        let options = QueryOptions::builder()
            .job(JobOptions::builder().job_id("q").build())
            .build();
        let data = project.query("SELECT 42 AS n", options).await?;

        assert_eq!(data.rows()[0]["n"], 42);
        assert_eq!(mock.count(CallKind::GetQueryResults), 1);
        Ok(())
    }

    #[tokio::test]
    async fn test_query_errors_propagate() -> crate::Result<()> {
        let (mock, project) = project();
        mock.put(
            JobReference::new("p", "bad"),
            json!({
                "jobReference": { "projectId": "p", "jobId": "bad" },
                "configuration": { "query": { "query": "SELEC 1" } },
                "status": {
                    "state": "DONE",
                    "errorResult": { "reason": "invalidQuery", "message": "Syntax error" }
                }
            }),
        );

        let mut job = project.job("bad", None).await?.expect("job exists");
        assert!(job.is_failed().await?);
        assert!(matches!(job.ensure_success().await, Err(Error::JobFailed { .. })));

        let options = QueryOptions::builder()
            .job(JobOptions::builder().job_id("bad2").build())
            .build();
        mock.fail_next(CallKind::Insert, MockService::api_error(400, "Syntax error"));
        let err = project.query("SELEC 1", options).await.unwrap_err();
        assert!(matches!(err, Error::Api(ref api) if api.status == 400));
        assert_eq!(mock.count(CallKind::GetQueryResults), 0);
        Ok(())
    }
}
