use std::collections::HashMap;

use crate::table::TableSchema;
use crate::{DatasetReference, ErrorProto, JobReference, ModelReference, TableReference, util};

#[derive(Debug, Clone, PartialEq, serde::Deserialize, serde::Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Job {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub kind: Option<Box<str>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub etag: Option<Box<str>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub id: Option<Box<str>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub self_link: Option<Box<str>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub user_email: Option<Box<str>>,
    pub configuration: JobConfiguration,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub job_reference: Option<JobReference>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub statistics: Option<serde_json::Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub status: Option<JobStatus>,
}

impl<Config> From<Config> for Job
where
    JobConfiguration: From<Config>,
{
    #[inline]
    fn from(value: Config) -> Self {
        JobConfiguration::from(value).into_job()
    }
}

impl Job {
    pub fn state(&self) -> Option<JobState> {
        self.status.as_ref().map(|status| status.state)
    }
}

#[derive(Debug, Clone, PartialEq, serde::Deserialize, serde::Serialize)]
#[serde(rename_all = "camelCase")]
pub struct JobStatus {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error_result: Option<ErrorProto>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub errors: Vec<ErrorProto>,
    pub state: JobState,
}

impl JobStatus {
    pub fn len(&self) -> usize {
        self.error_result.is_some() as usize + self.errors.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn first_error(&self) -> Option<&ErrorProto> {
        self.error_result.as_ref().or_else(|| self.errors.first())
    }

    /// A job has failed once it is done and reports an error result.
    pub fn is_failed(&self) -> bool {
        self.state == JobState::Done && self.error_result.is_some()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Deserialize, serde::Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum JobState {
    Pending,
    Running,
    Done,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Deserialize, serde::Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum JobType {
    Query,
    Load,
    Extract,
    Copy,
    #[serde(other)]
    Unknown,
}

#[derive(Debug, Clone, PartialEq, serde::Deserialize, serde::Serialize)]
#[serde(rename_all = "camelCase")]
pub struct JobConfiguration {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub job_type: Option<JobType>,
    #[serde(default, skip_serializing_if = "util::is_false")]
    pub dry_run: bool,
    #[serde(
        default,
        rename = "jobTimeoutMs",
        with = "util::int64::optional",
        skip_serializing_if = "Option::is_none"
    )]
    pub job_timeout_ms: Option<i64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub labels: Option<HashMap<String, String>>,
    #[serde(flatten)]
    pub kind: JobConfigurationKind,
}

impl JobConfiguration {
    /// Converts [self] into a [Job], with empty values for the fields in [Job]
    pub fn into_job(self) -> Job {
        Job {
            kind: None,
            etag: None,
            id: None,
            self_link: None,
            user_email: None,
            job_reference: None,
            statistics: None,
            status: None,
            configuration: self,
        }
    }
}

impl<Kind> From<Kind> for JobConfiguration
where
    JobConfigurationKind: From<Kind>,
{
    #[inline]
    fn from(value: Kind) -> Self {
        let kind = JobConfigurationKind::from(value);

        JobConfiguration {
            job_type: Some(kind.job_type()),
            dry_run: false,
            job_timeout_ms: None,
            labels: None,
            kind,
        }
    }
}

#[derive(Debug, Clone, PartialEq, serde::Deserialize, serde::Serialize)]
#[serde(rename_all = "camelCase")]
pub enum JobConfigurationKind {
    Query(JobConfigurationQuery),
    Load(JobConfigurationLoad),
    Copy(JobConfigurationTableCopy),
    Extract(JobConfigurationExtract),
}

impl JobConfigurationKind {
    pub fn job_type(&self) -> JobType {
        match self {
            Self::Copy(_) => JobType::Copy,
            Self::Extract(_) => JobType::Extract,
            Self::Load(_) => JobType::Load,
            Self::Query(_) => JobType::Query,
        }
    }
}

macro_rules! impl_from_job_config_kinds {
    ($($name:ident -> $variant:ident),* $(,)?) => {
        $(
            impl From<$name> for JobConfigurationKind {
                #[inline]
                fn from(value: $name) -> Self {
                    Self::$variant(value)
                }
            }
        )*
    };
}

impl_from_job_config_kinds! {
    JobConfigurationQuery -> Query,
    JobConfigurationLoad -> Load,
    JobConfigurationTableCopy -> Copy,
    JobConfigurationExtract -> Extract,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Deserialize, serde::Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum CreateDisposition {
    CreateIfNeeded,
    CreateNever,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Deserialize, serde::Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum WriteDisposition {
    WriteTruncate,
    WriteAppend,
    WriteEmpty,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Deserialize, serde::Serialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Priority {
    Interactive,
    Batch,
}

#[derive(Debug, Clone, Default, PartialEq, serde::Deserialize, serde::Serialize)]
#[serde(rename_all = "camelCase")]
pub struct JobConfigurationQuery {
    pub query: Box<str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub destination_table: Option<TableReference>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub default_dataset: Option<DatasetReference>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub use_legacy_sql: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub use_query_cache: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub priority: Option<Priority>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub create_disposition: Option<CreateDisposition>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub write_disposition: Option<WriteDisposition>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub allow_large_results: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub flatten_results: Option<bool>,
    #[serde(
        default,
        skip_serializing_if = "Option::is_none",
        with = "util::int64::optional"
    )]
    pub maximum_bytes_billed: Option<i64>,
}

#[derive(Debug, Clone, PartialEq, serde::Deserialize, serde::Serialize)]
#[serde(rename_all = "camelCase")]
pub struct JobConfigurationTableCopy {
    pub source_tables: Vec<TableReference>,
    pub destination_table: TableReference,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub create_disposition: Option<CreateDisposition>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub write_disposition: Option<WriteDisposition>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Deserialize, serde::Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum DataFormat {
    Csv,
    NewlineDelimitedJson,
    Avro,
    Parquet,
    Orc,
    DatastoreBackup,
    MlTfSavedModel,
    MlXgboostBooster,
}

impl DataFormat {
    /// Guesses the format from a storage URI's extension.
    pub fn from_uri(uri: &str) -> Option<Self> {
        let (_, ext) = uri.rsplit_once('.')?;
        match ext.to_ascii_lowercase().as_str() {
            "csv" => Some(Self::Csv),
            "json" | "ndjson" | "jsonl" => Some(Self::NewlineDelimitedJson),
            "avro" => Some(Self::Avro),
            "parquet" => Some(Self::Parquet),
            "orc" => Some(Self::Orc),
            "backup_info" => Some(Self::DatastoreBackup),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Deserialize, serde::Serialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Compression {
    Gzip,
    Deflate,
    Snappy,
    None,
}

#[derive(Debug, Clone, Default, PartialEq, serde::Deserialize, serde::Serialize)]
#[serde(rename_all = "camelCase")]
pub struct JobConfigurationExtract {
    pub destination_uris: Vec<Box<str>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub source_table: Option<TableReference>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub source_model: Option<ModelReference>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub destination_format: Option<DataFormat>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub compression: Option<Compression>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub field_delimiter: Option<Box<str>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub print_header: Option<bool>,
}

#[derive(Debug, Clone, PartialEq, serde::Deserialize, serde::Serialize)]
#[serde(rename_all = "camelCase")]
pub struct JobConfigurationLoad {
    pub source_uris: Vec<Box<str>>,
    pub destination_table: TableReference,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub schema: Option<TableSchema>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub source_format: Option<DataFormat>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub create_disposition: Option<CreateDisposition>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub write_disposition: Option<WriteDisposition>,
    #[serde(
        default,
        skip_serializing_if = "Option::is_none",
        with = "util::int64::optional"
    )]
    pub skip_leading_rows: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub field_delimiter: Option<Box<str>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub autodetect: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub ignore_unknown_values: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub max_bad_records: Option<i64>,
}

impl JobConfigurationLoad {
    pub fn new(source_uris: Vec<Box<str>>, destination_table: TableReference) -> Self {
        Self {
            source_uris,
            destination_table,
            schema: None,
            source_format: None,
            create_disposition: None,
            write_disposition: None,
            skip_leading_rows: None,
            field_delimiter: None,
            autodetect: None,
            ignore_unknown_values: None,
            max_bad_records: None,
        }
    }
}
