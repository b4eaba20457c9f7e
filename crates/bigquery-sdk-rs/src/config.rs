//! Client configuration. Nothing is read from the environment or from files;
//! callers build a [`ClientConfig`] themselves.
use std::time::Duration;

use rand::Rng;
use typed_builder::TypedBuilder;

/// The Base URL for the BigQuery v2 REST API.
pub const DEFAULT_BASE_URL: &str = "https://bigquery.googleapis.com/bigquery/v2";

pub const DEFAULT_USER_AGENT: &str = "bigquery-sdk-rs";

pub const BIGQUERY_SCOPE: &str = "https://www.googleapis.com/auth/bigquery";

#[derive(Debug, Clone, TypedBuilder)]
pub struct ClientConfig {
    #[builder(default = DEFAULT_BASE_URL.into(), setter(into))]
    pub base_url: Box<str>,
    #[builder(default = DEFAULT_USER_AGENT.into(), setter(into))]
    pub user_agent: Box<str>,
    /// Per-request timeout, applied by the REST transport.
    #[builder(default, setter(strip_option))]
    pub timeout: Option<Duration>,
    #[builder(default)]
    pub autocreate: AutocreatePolicy,
    #[builder(default)]
    pub job_poll: JobPollPolicy,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self::builder().build()
    }
}

/// Delays used when a streaming insert finds its table missing and creates
/// it on the fly. A new table takes a while to become visible to the
/// streaming path, so the insert is retried only after `propagation_delay`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AutocreatePolicy {
    /// Upper bound of the random delay before attempting the create. The
    /// delay is drawn uniformly from whole seconds in `1..=max`.
    pub max_initial_backoff: Duration,
    pub propagation_delay: Duration,
}

impl Default for AutocreatePolicy {
    fn default() -> Self {
        Self {
            max_initial_backoff: Duration::from_secs(60),
            propagation_delay: Duration::from_secs(60),
        }
    }
}

impl AutocreatePolicy {
    /// No waiting at all. Useful against emulators and in tests.
    pub const fn immediate() -> Self {
        Self {
            max_initial_backoff: Duration::ZERO,
            propagation_delay: Duration::ZERO,
        }
    }

    pub fn initial_backoff(&self) -> Duration {
        let max_secs = self.max_initial_backoff.as_secs();
        if max_secs < 1 {
            return self.max_initial_backoff;
        }

        Duration::from_secs(rand::rng().random_range(1..=max_secs))
    }
}

/// Exponential backoff used while waiting on a job to reach `DONE`.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct JobPollPolicy {
    pub initial_delay: Duration,
    pub multiplier: f64,
    pub max_delay: Duration,
    /// Give up (with [`Error::JobTimeout`]) after this long. `None` waits forever.
    ///
    /// [`Error::JobTimeout`]: crate::Error::JobTimeout
    pub timeout: Option<Duration>,
}

impl Default for JobPollPolicy {
    fn default() -> Self {
        Self {
            initial_delay: Duration::from_secs(1),
            multiplier: 1.5,
            max_delay: Duration::from_secs(60),
            timeout: None,
        }
    }
}

impl JobPollPolicy {
    /// The delay before poll number `attempt` (zero based).
    pub fn delay(&self, attempt: u32) -> Duration {
        let factor = self.multiplier.max(1.0).powi(attempt.min(i32::MAX as u32) as i32);
        let delay = self.initial_delay.as_secs_f64() * factor;

        if !delay.is_finite() || delay >= self.max_delay.as_secs_f64() {
            self.max_delay
        } else {
            Duration::from_secs_f64(delay)
        }
    }
}
