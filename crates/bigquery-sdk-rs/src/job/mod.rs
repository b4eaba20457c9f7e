//! Jobs: query, load, copy and extract operations that run server side.
use bigquery_model_rs::job::{self as model, JobConfiguration, JobState, JobStatus, JobType};
use bigquery_model_rs::{ErrorProto, JobReference};
use serde_json::Value;

use crate::config::JobPollPolicy;
use crate::list::ListItem;
use crate::path::{ResourcePath, ResourceType};
use crate::query::QueryData;
use crate::resource::{Fidelity, ReadableResource, ResourceKind, ResourceState, attributes};
use crate::service::PageRequest;
use crate::{Client, Error};

mod config;

pub use config::{CopyOptions, ExtractOptions, JobOptions, LoadOptions, QueryOptions};

#[derive(Debug, Clone, Copy)]
pub enum JobKind {}

attributes! {
    /// Jobs can't be patched once inserted.
    pub enum JobAttr {}
}

impl ResourceKind for JobKind {
    type Reference = JobReference;
    type Body = model::Job;
    type Attr = JobAttr;

    const NAME: &'static str = "job";

    fn path(reference: &JobReference) -> ResourcePath {
        ResourcePath::Job(reference.clone())
    }

    fn reference_of(body: &model::Job) -> Option<&JobReference> {
        body.job_reference.as_ref()
    }

    fn etag_of(body: &model::Job) -> Option<&str> {
        body.etag.as_deref()
    }
}

/// Inserts a job described by `configuration` under `project_id`.
pub(crate) async fn submit(
    client: &Client,
    project_id: &str,
    configuration: JobConfiguration,
    options: &JobOptions,
) -> crate::Result<Job> {
    let reference = options.job_reference(project_id);
    ResourcePath::Job(reference.clone()).validate()?;

    let mut body = configuration.into_job();
    body.job_reference = Some(reference);

    let job_type = body.configuration.job_type;
    debug!(message = "submitting job", ?job_type, job_id = ?body.job_reference.as_ref().map(|r| &r.job_id));

    let value = client
        .service()
        .insert_resource(
            &ResourcePath::Project(project_id.into()),
            ResourceType::Job,
            serde_json::to_value(&body)?,
        )
        .await?;

    Job::from_json(client.clone(), value, Fidelity::Full)
}

/// A job handle. A freshly submitted job is full, listed jobs are partial.
#[derive(Debug)]
pub struct Job {
    state: ResourceState<JobKind>,
}

impl ReadableResource for Job {
    type Kind = JobKind;

    fn state(&self) -> &ResourceState<JobKind> {
        &self.state
    }

    fn state_mut(&mut self) -> &mut ResourceState<JobKind> {
        &mut self.state
    }
}

impl ListItem for Job {
    const TYPE: ResourceType = ResourceType::Job;

    fn from_partial(client: Client, value: Value) -> crate::Result<Self> {
        Self::from_json(client, value, Fidelity::Partial)
    }
}

impl Job {
    pub(crate) fn new_reference(client: Client, reference: JobReference) -> crate::Result<Self> {
        ResourceState::new_reference(client, reference).map(|state| Self { state })
    }

    pub(crate) fn from_json(client: Client, value: Value, fidelity: Fidelity) -> crate::Result<Self> {
        ResourceState::from_json(client, value, fidelity).map(|state| Self { state })
    }

    pub fn job_ref(&self) -> &JobReference {
        self.state.reference()
    }

    pub fn job_id(&self) -> &str {
        &self.job_ref().job_id
    }

    pub fn project_id(&self) -> &str {
        &self.job_ref().project_id
    }

    pub fn location(&self) -> Option<&str> {
        self.job_ref().location.as_deref()
    }

    /// Whatever body is held, without fetching.
    pub fn body(&self) -> Option<&model::Job> {
        self.state.body()
    }

    pub async fn status(&mut self) -> crate::Result<Option<&JobStatus>> {
        let body = self.state.ensure_resource().await?;
        Ok(body.status.as_ref())
    }

    /// The state as of the last fetch. Use [`reload`](ReadableResource::reload)
    /// to refresh it.
    pub async fn job_state(&mut self) -> crate::Result<Option<JobState>> {
        let body = self.state.ensure_resource().await?;
        Ok(body.state())
    }

    pub async fn is_pending(&mut self) -> crate::Result<bool> {
        Ok(self.job_state().await? == Some(JobState::Pending))
    }

    pub async fn is_running(&mut self) -> crate::Result<bool> {
        Ok(self.job_state().await? == Some(JobState::Running))
    }

    pub async fn is_done(&mut self) -> crate::Result<bool> {
        Ok(self.job_state().await? == Some(JobState::Done))
    }

    pub async fn is_failed(&mut self) -> crate::Result<bool> {
        let status = self.status().await?;
        Ok(status.is_some_and(JobStatus::is_failed))
    }

    /// The error that caused the job to fail, if any.
    pub async fn error(&mut self) -> crate::Result<Option<&ErrorProto>> {
        let status = self.status().await?;
        Ok(status.and_then(|status| status.error_result.as_ref()))
    }

    /// Every error encountered while running, including non-fatal ones.
    pub async fn errors(&mut self) -> crate::Result<&[ErrorProto]> {
        let status = self.status().await?;
        Ok(status.map(|status| status.errors.as_slice()).unwrap_or_default())
    }

    pub async fn configuration(&mut self) -> crate::Result<&JobConfiguration> {
        let body = self.state.ensure_resource().await?;
        Ok(&body.configuration)
    }

    pub async fn job_type(&mut self) -> crate::Result<JobType> {
        let configuration = self.configuration().await?;
        Ok(configuration.kind.job_type())
    }

    pub async fn user_email(&mut self) -> crate::Result<Option<&str>> {
        let body = self.state.ensure_full().await?;
        Ok(body.user_email.as_deref())
    }

    pub async fn statistics(&mut self) -> crate::Result<Option<&Value>> {
        let body = self.state.ensure_full().await?;
        Ok(body.statistics.as_ref())
    }

    /// Requests cancellation. The job may still finish before it takes effect.
    pub async fn cancel(&mut self) -> crate::Result<()> {
        debug!(message = "cancelling job", job_id = self.job_id());

        let value = self.state.client().service().cancel_job(self.job_ref()).await?;
        self.state.replace_json(value)?;
        Ok(())
    }

    /// Polls until the job is done, with the client's [`JobPollPolicy`].
    pub async fn wait_until_done(&mut self) -> crate::Result<()> {
        let policy = self.state.client().config().job_poll;
        self.wait_until_done_with(policy).await
    }

    /// Polls until the job is done, reloading with exponential backoff.
    /// Returns [`Error::JobTimeout`] once `policy.timeout` would be exceeded.
    pub async fn wait_until_done_with(&mut self, policy: JobPollPolicy) -> crate::Result<()> {
        let start = tokio::time::Instant::now();
        let mut attempt = 0;

        loop {
            if self.is_done().await? {
                return Ok(());
            }

            let delay = policy.delay(attempt);
            if let Some(timeout) = policy.timeout {
                if start.elapsed() + delay > timeout {
                    return Err(Error::JobTimeout(self.job_id().into()));
                }
            }

            debug!(message = "waiting on job", job_id = self.job_id(), attempt, ?delay);
            tokio::time::sleep(delay).await;

            self.state.reload().await?;
            attempt += 1;
        }
    }

    /// Fails with [`Error::JobFailed`] if the job reports an error result.
    pub async fn ensure_success(&mut self) -> crate::Result<()> {
        let job_id = self.job_id().to_owned();
        let Some(status) = self.status().await? else {
            return Ok(());
        };

        match status.error_result {
            Some(ref main) if status.state == JobState::Done => Err(Error::JobFailed {
                job_id: job_id.into_boxed_str(),
                main: main.clone(),
                misc: status.errors.clone(),
            }),
            _ => Ok(()),
        }
    }

    /// Waits for the job and converts a failed state into an error.
    pub(crate) async fn finish(mut self) -> crate::Result<Self> {
        self.wait_until_done().await?;
        self.ensure_success().await?;
        Ok(self)
    }

    /// Results of a finished query job.
    pub async fn query_results(&self, page: PageRequest) -> crate::Result<QueryData> {
        QueryData::fetch(self.state.client().clone(), self.job_ref().clone(), page).await
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;
    use std::time::Duration;

    use bigquery_model_rs::job::JobConfigurationKind;
    use serde_json::json;

    use super::*;
    use crate::ClientConfig;
    use crate::service::mock::{CallKind, MockService};

    fn client(mock: &Arc<MockService>) -> Client {
        Client::new(mock.clone(), ClientConfig::default())
    }

    fn fast_poll() -> JobPollPolicy {
        JobPollPolicy {
            initial_delay: Duration::from_millis(10),
            multiplier: 2.0,
            max_delay: Duration::from_millis(40),
            timeout: None,
        }
    }

    #[tokio::test]
    async fn test_submit_and_wait() -> crate::Result<()> {
        let mock = Arc::new(MockService::new("p"));
        let client = client(&mock);

        let options = JobOptions::builder().job_id("j1").build();
        mock.push_job_states("j1", [JobState::Pending, JobState::Running, JobState::Done]);

        let config = QueryOptions::default().to_configuration("SELECT 1");
        let mut job = submit(&client, "p", config, &options).await?;

        assert!(job.is_full());
        assert!(job.is_pending().await?);
        assert_eq!(job.job_type().await?, JobType::Query);

        let inserted = mock.last_body(CallKind::Insert).unwrap();
        assert_eq!(inserted["jobReference"]["jobId"], "j1");
        assert_eq!(inserted["configuration"]["query"]["query"], "SELECT 1");

        job.wait_until_done_with(fast_poll()).await?;
        assert!(job.is_done().await?);
        assert!(!job.is_failed().await?);
        assert_eq!(mock.count(CallKind::Get), 2);
        Ok(())
    }

    #[tokio::test(start_paused = true)]
    async fn test_wait_times_out() -> crate::Result<()> {
        let mock = Arc::new(MockService::new("p"));
        let client = client(&mock);
        mock.push_job_states("slow", [JobState::Running]);

        let options = JobOptions::builder().job_id("slow").build();
        let config = QueryOptions::default().to_configuration("SELECT 1");
        let mut job = submit(&client, "p", config, &options).await?;

        let policy = JobPollPolicy {
            timeout: Some(Duration::from_millis(100)),
            ..fast_poll()
        };

        let err = job.wait_until_done_with(policy).await.unwrap_err();
        assert!(matches!(err, Error::JobTimeout(ref id) if &**id == "slow"));
        Ok(())
    }

    #[tokio::test]
    async fn test_failed_job_is_reported() -> crate::Result<()> {
        let mock = Arc::new(MockService::new("p"));
        let reference = JobReference::new("p", "broken");
        mock.put(
            reference.clone(),
            json!({
                "jobReference": { "projectId": "p", "jobId": "broken" },
                "configuration": { "query": { "query": "SELEC 1" } },
                "status": {
                    "state": "DONE",
                    "errorResult": { "reason": "invalidQuery", "message": "Syntax error" },
                    "errors": [{ "reason": "invalidQuery", "message": "Syntax error" }]
                }
            }),
        );

        let mut job = Job::new_reference(client(&mock), reference)?;
        assert!(job.is_failed().await?);
        assert_eq!(job.error().await?.unwrap().reason.as_deref(), Some("invalidQuery"));
        assert_eq!(job.errors().await?.len(), 1);

        let err = job.ensure_success().await.unwrap_err();
        assert!(matches!(err, Error::JobFailed { ref main, .. } if &*main.message == "Syntax error"));
        Ok(())
    }

    #[tokio::test]
    async fn test_cancel_replaces_body() -> crate::Result<()> {
        let mock = Arc::new(MockService::new("p"));
        mock.push_job_states("j", [JobState::Running]);

        let options = JobOptions::builder().job_id("j").build();
        let config = QueryOptions::default().to_configuration("SELECT 1");
        let mut job = submit(&client(&mock), "p", config, &options).await?;
        assert!(job.is_running().await?);

        job.cancel().await?;
        assert_eq!(mock.count(CallKind::CancelJob), 1);
        assert!(job.is_done().await?);
        assert!(matches!(
            job.configuration().await?.kind,
            JobConfigurationKind::Query(_)
        ));
        Ok(())
    }
}
