use std::collections::HashMap;
use std::time::Duration;

use bigquery_model_rs::job::{
    Compression, CreateDisposition, DataFormat, JobConfiguration, JobConfigurationExtract,
    JobConfigurationLoad, JobConfigurationQuery, JobConfigurationTableCopy, Priority,
    WriteDisposition,
};
use bigquery_model_rs::table::TableSchema;
use bigquery_model_rs::{DatasetReference, JobReference, TableReference};
use typed_builder::TypedBuilder;

const DEFAULT_JOB_PREFIX: &str = "job_";

/// Settings shared by every kind of job.
#[derive(Debug, Clone, Default, PartialEq, TypedBuilder)]
pub struct JobOptions {
    /// Used as-is when set, otherwise an id is generated from `prefix`.
    #[builder(default, setter(strip_option, into))]
    pub job_id: Option<Box<str>>,
    #[builder(default, setter(strip_option, into))]
    pub prefix: Option<Box<str>>,
    #[builder(default, setter(strip_option, into))]
    pub location: Option<Box<str>>,
    #[builder(default, setter(strip_option))]
    pub labels: Option<HashMap<String, String>>,
    #[builder(default)]
    pub dry_run: bool,
    #[builder(default, setter(strip_option))]
    pub job_timeout: Option<Duration>,
}

impl JobOptions {
    pub(crate) fn job_reference(&self, project_id: &str) -> JobReference {
        let job_id = match self.job_id {
            Some(ref job_id) => job_id.clone(),
            None => {
                let prefix = self.prefix.as_deref().unwrap_or(DEFAULT_JOB_PREFIX);
                format!("{prefix}{}", uuid::Uuid::new_v4().simple()).into_boxed_str()
            }
        };

        JobReference {
            project_id: project_id.into(),
            job_id,
            location: self.location.clone(),
        }
    }

    pub(crate) fn configure(&self, mut configuration: JobConfiguration) -> JobConfiguration {
        configuration.dry_run = self.dry_run;
        configuration.labels = self.labels.clone();
        configuration.job_timeout_ms = self.job_timeout.map(|timeout| timeout.as_millis() as i64);
        configuration
    }
}

#[derive(Debug, Clone, Default, PartialEq, TypedBuilder)]
pub struct QueryOptions {
    #[builder(default)]
    pub job: JobOptions,
    #[builder(default, setter(strip_option))]
    pub destination: Option<TableReference>,
    /// Dataset used to resolve unqualified table names in the query.
    #[builder(default, setter(strip_option))]
    pub default_dataset: Option<DatasetReference>,
    #[builder(default)]
    pub legacy_sql: bool,
    #[builder(default, setter(strip_option))]
    pub use_cache: Option<bool>,
    #[builder(default, setter(strip_option))]
    pub priority: Option<Priority>,
    #[builder(default, setter(strip_option))]
    pub create: Option<CreateDisposition>,
    #[builder(default, setter(strip_option))]
    pub write: Option<WriteDisposition>,
    #[builder(default, setter(strip_option))]
    pub large_results: Option<bool>,
    #[builder(default, setter(strip_option))]
    pub flatten: Option<bool>,
    #[builder(default, setter(strip_option))]
    pub maximum_bytes_billed: Option<i64>,
    /// Page size used when reading the results of a waited-on query.
    #[builder(default, setter(strip_option))]
    pub max_results: Option<u32>,
}

impl QueryOptions {
    pub(crate) fn to_configuration(&self, sql: &str) -> JobConfiguration {
        let query = JobConfigurationQuery {
            query: sql.into(),
            destination_table: self.destination.clone(),
            default_dataset: self.default_dataset.clone(),
            use_legacy_sql: Some(self.legacy_sql),
            use_query_cache: self.use_cache,
            priority: self.priority,
            create_disposition: self.create,
            write_disposition: self.write,
            allow_large_results: self.large_results,
            flatten_results: self.flatten,
            maximum_bytes_billed: self.maximum_bytes_billed,
        };

        self.job.configure(JobConfiguration::from(query))
    }
}

#[derive(Debug, Clone, Default, PartialEq, TypedBuilder)]
pub struct LoadOptions {
    #[builder(default)]
    pub job: JobOptions,
    /// Guessed from the extension of the first URI when unset.
    #[builder(default, setter(strip_option))]
    pub format: Option<DataFormat>,
    #[builder(default, setter(strip_option))]
    pub schema: Option<TableSchema>,
    #[builder(default, setter(strip_option))]
    pub create: Option<CreateDisposition>,
    #[builder(default, setter(strip_option))]
    pub write: Option<WriteDisposition>,
    #[builder(default, setter(strip_option))]
    pub skip_leading_rows: Option<u64>,
    #[builder(default, setter(strip_option, into))]
    pub delimiter: Option<Box<str>>,
    #[builder(default, setter(strip_option))]
    pub autodetect: Option<bool>,
    #[builder(default, setter(strip_option))]
    pub ignore_unknown: Option<bool>,
    #[builder(default, setter(strip_option))]
    pub max_bad_records: Option<i64>,
}

impl LoadOptions {
    pub(crate) fn to_configuration(
        &self,
        source_uris: Vec<Box<str>>,
        destination: TableReference,
    ) -> JobConfiguration {
        let source_format = self
            .format
            .or_else(|| source_uris.first().and_then(|uri| DataFormat::from_uri(uri)));

        let mut load = JobConfigurationLoad::new(source_uris, destination);
        load.schema = self.schema.clone();
        load.source_format = source_format;
        load.create_disposition = self.create;
        load.write_disposition = self.write;
        load.skip_leading_rows = self.skip_leading_rows;
        load.field_delimiter = self.delimiter.clone();
        load.autodetect = self.autodetect;
        load.ignore_unknown_values = self.ignore_unknown;
        load.max_bad_records = self.max_bad_records;

        self.job.configure(JobConfiguration::from(load))
    }
}

#[derive(Debug, Clone, Default, PartialEq, TypedBuilder)]
pub struct CopyOptions {
    #[builder(default)]
    pub job: JobOptions,
    #[builder(default, setter(strip_option))]
    pub create: Option<CreateDisposition>,
    #[builder(default, setter(strip_option))]
    pub write: Option<WriteDisposition>,
}

impl CopyOptions {
    pub(crate) fn to_configuration(
        &self,
        source: TableReference,
        destination: TableReference,
    ) -> JobConfiguration {
        let copy = JobConfigurationTableCopy {
            source_tables: vec![source],
            destination_table: destination,
            create_disposition: self.create,
            write_disposition: self.write,
        };

        self.job.configure(JobConfiguration::from(copy))
    }
}

#[derive(Debug, Clone, Default, PartialEq, TypedBuilder)]
pub struct ExtractOptions {
    #[builder(default)]
    pub job: JobOptions,
    /// Guessed from the extension of the first URI when unset.
    #[builder(default, setter(strip_option))]
    pub format: Option<DataFormat>,
    #[builder(default, setter(strip_option))]
    pub compression: Option<Compression>,
    #[builder(default, setter(strip_option, into))]
    pub delimiter: Option<Box<str>>,
    #[builder(default, setter(strip_option))]
    pub header: Option<bool>,
}

impl ExtractOptions {
    pub(crate) fn to_configuration(
        &self,
        source: TableReference,
        destination_uris: Vec<Box<str>>,
    ) -> JobConfiguration {
        let destination_format = self.format.or_else(|| {
            destination_uris
                .first()
                .and_then(|uri| DataFormat::from_uri(uri))
        });

        let extract = JobConfigurationExtract {
            destination_uris,
            source_table: Some(source),
            source_model: None,
            destination_format,
            compression: self.compression,
            field_delimiter: self.delimiter.clone(),
            print_header: self.header,
        };

        self.job.configure(JobConfiguration::from(extract))
    }
}

#[cfg(test)]
mod tests {
    use bigquery_model_rs::job::{JobConfigurationKind, JobType};

    use super::*;

    #[test]
    fn test_job_reference_generation() {
        let generated = JobOptions::default().job_reference("p");
        assert!(generated.job_id.starts_with("job_"));
        assert_eq!(generated.job_id.len(), "job_".len() + 32);
        assert_ne!(generated.job_id, JobOptions::default().job_reference("p").job_id);

        let prefixed = JobOptions::builder().prefix("daily_").location("EU").build();
        let reference = prefixed.job_reference("p");
        assert!(reference.job_id.starts_with("daily_"));
        assert_eq!(reference.location.as_deref(), Some("EU"));

        let explicit = JobOptions::builder().job_id("my-job").prefix("ignored_").build();
        assert_eq!(&*explicit.job_reference("p").job_id, "my-job");
    }

    #[test]
    fn test_query_configuration() {
        let options = QueryOptions::builder()
            .default_dataset(DatasetReference::new("p", "d"))
            .priority(Priority::Batch)
            .job(JobOptions::builder().dry_run(true).build())
            .build();

        let config = options.to_configuration("SELECT 1");
        assert!(config.dry_run);
        assert_eq!(config.job_type, Some(JobType::Query));

        let JobConfigurationKind::Query(query) = config.kind else {
            panic!("expected a query configuration");
        };

        assert_eq!(&*query.query, "SELECT 1");
        assert_eq!(query.use_legacy_sql, Some(false));
        assert_eq!(query.default_dataset, Some(DatasetReference::new("p", "d")));
        assert_eq!(query.priority, Some(Priority::Batch));
    }

    #[test]
    fn test_formats_are_guessed_from_uris() {
        let config = LoadOptions::default().to_configuration(
            vec!["gs://bucket/rows.json".into()],
            TableReference::new("p", "d", "t"),
        );
        let JobConfigurationKind::Load(load) = config.kind else {
            panic!("expected a load configuration");
        };
        assert_eq!(load.source_format, Some(DataFormat::NewlineDelimitedJson));

        let config = ExtractOptions::builder()
            .format(DataFormat::Avro)
            .build()
            .to_configuration(TableReference::new("p", "d", "t"), vec!["gs://b/x.csv".into()]);
        let JobConfigurationKind::Extract(extract) = config.kind else {
            panic!("expected an extract configuration");
        };
        assert_eq!(extract.destination_format, Some(DataFormat::Avro));
    }
}
