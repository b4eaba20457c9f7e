//! Tables and views.
use std::collections::HashMap;

use bigquery_model_rs::table::{
    Clustering, Table as TableBody, TableFieldSchema, TableSchema, TableType, TimePartitioning,
};
use bigquery_model_rs::{DatasetReference, TableReference};
use serde_json::Value;
use time::OffsetDateTime;

use crate::{Client, Error};
use crate::job::{self, CopyOptions, ExtractOptions, Job, LoadOptions};
use crate::list::ListItem;
use crate::path::{ResourcePath, ResourceType};
use crate::resource::{
    Fidelity, Insertable, ReadableResource, ResourceBuilder, ResourceKind, ResourceState, Updater,
    accessors, attributes,
};
use crate::service::{DeleteOptions, PageRequest};

mod data;
mod insert;
mod schema;
mod updater;

pub use data::Data;
pub(crate) use data::decode_rows;
pub use insert::{InsertError, InsertIds, InsertResponse, InsertRowOptions};
pub(crate) use insert::build_request;
pub use schema::{FieldBuilder, SchemaBuilder};
pub use updater::TableUpdater;

#[derive(Debug, Clone, Copy)]
pub enum TableKind {}

attributes! {
    pub enum TableAttr {
        FriendlyName => "friendlyName",
        Description => "description",
        Labels => "labels",
        ExpirationTime => "expirationTime",
        Schema => "schema",
        TimePartitioning => "timePartitioning",
        RangePartitioning => "rangePartitioning",
        Clustering => "clustering",
        RequirePartitionFilter => "requirePartitionFilter",
        View => "view",
    }
}

impl ResourceKind for TableKind {
    type Reference = TableReference;
    type Body = TableBody;
    type Attr = TableAttr;

    const NAME: &'static str = "table";

    fn path(reference: &TableReference) -> ResourcePath {
        ResourcePath::Table(reference.clone())
    }

    fn reference_of(body: &TableBody) -> Option<&TableReference> {
        body.table_reference.as_ref()
    }

    fn etag_of(body: &TableBody) -> Option<&str> {
        body.etag.as_deref()
    }
}

impl Insertable for TableKind {
    const TYPE: ResourceType = ResourceType::Table;

    fn parent(reference: &TableReference) -> ResourcePath {
        ResourcePath::Dataset(reference.to_dataset_reference())
    }

    fn new_body(reference: TableReference) -> TableBody {
        TableBody::new(reference)
    }
}

/// Anything naming a table: a reference, a handle, or a string in one of the
/// forms [`TableReference::parse`] accepts.
pub trait IntoTableRef {
    /// Resolves the name, filling missing components from `default`.
    fn into_table_ref(self, default: &DatasetReference) -> crate::Result<TableReference>;
}

impl IntoTableRef for TableReference {
    fn into_table_ref(self, _: &DatasetReference) -> crate::Result<TableReference> {
        Ok(self)
    }
}

impl IntoTableRef for &TableReference {
    fn into_table_ref(self, _: &DatasetReference) -> crate::Result<TableReference> {
        Ok(self.clone())
    }
}

impl IntoTableRef for &Table {
    fn into_table_ref(self, _: &DatasetReference) -> crate::Result<TableReference> {
        Ok(self.table_ref().clone())
    }
}

impl IntoTableRef for &str {
    fn into_table_ref(self, default: &DatasetReference) -> crate::Result<TableReference> {
        TableReference::parse(self, default).map_err(|err| Error::invalid_argument(err.to_string()))
    }
}

/// A table (or view) handle.
///
/// Accessors fetch lazily. Ones served by list responses (name, labels,
/// type, partitioning, creation and expiration times) are answered from a
/// partial body, everything else upgrades to the full body first.
#[derive(Debug)]
pub struct Table {
    state: ResourceState<TableKind>,
}

impl ReadableResource for Table {
    type Kind = TableKind;

    fn state(&self) -> &ResourceState<TableKind> {
        &self.state
    }

    fn state_mut(&mut self) -> &mut ResourceState<TableKind> {
        &mut self.state
    }
}

impl ListItem for Table {
    const TYPE: ResourceType = ResourceType::Table;

    fn from_partial(client: Client, value: Value) -> crate::Result<Self> {
        ResourceState::from_json(client, value, Fidelity::Partial).map(|state| Self { state })
    }
}

impl Table {
    pub(crate) fn new_reference(client: Client, reference: TableReference) -> crate::Result<Self> {
        ResourceState::new_reference(client, reference).map(|state| Self { state })
    }

    pub(crate) async fn create<F>(
        client: Client,
        reference: TableReference,
        configure: F,
    ) -> crate::Result<Self>
    where
        F: FnOnce(&mut TableUpdater),
    {
        let mut updater = TableUpdater::new(Updater::for_insert(reference)?);
        configure(&mut updater);

        ResourceState::insert(client, updater.into_updater())
            .await
            .map(|state| Self { state })
    }

    pub fn table_ref(&self) -> &TableReference {
        self.state.reference()
    }

    pub fn table_id(&self) -> &str {
        &self.table_ref().table_id
    }

    pub fn dataset_id(&self) -> &str {
        &self.table_ref().dataset_id
    }

    pub fn project_id(&self) -> &str {
        &self.table_ref().project_id
    }

    pub fn dataset_ref(&self) -> DatasetReference {
        self.table_ref().to_dataset_reference()
    }

    /// The backtick-quoted name for use in standard SQL.
    pub fn query_id(&self) -> String {
        self.table_ref().query_id()
    }

    /// Whatever body is held, without fetching.
    pub fn body(&self) -> Option<&TableBody> {
        self.state.body()
    }

    accessors! { ensure_resource;
        /// The `project:dataset.table` id assigned by the service.
        id -> Option<&str> = |body| body.id.as_deref();
        name -> Option<&str> = |body| body.friendly_name.as_deref();
        labels -> Option<&HashMap<String, String>> = |body| body.labels.as_ref();
        created_at -> Option<OffsetDateTime> = |body| body.creation_time;
        expires_at -> Option<OffsetDateTime> = |body| body.expiration_time;
        table_type -> Option<TableType> = |body| body.ty;
        is_table -> bool = |body| body.ty == Some(TableType::Table);
        is_view -> bool = |body| body.ty == Some(TableType::View);
        is_external -> bool = |body| body.ty == Some(TableType::External);
        time_partitioning -> Option<&TimePartitioning> = |body| body.time_partitioning.as_ref();
        clustering -> Option<&Clustering> = |body| body.clustering.as_ref();
    }

    accessors! { ensure_full;
        etag -> Option<&str> = |body| body.etag.as_deref();
        api_url -> Option<&str> = |body| body.self_link.as_deref();
        description -> Option<&str> = |body| body.description.as_deref();
        bytes_count -> Option<u64> = |body| body.num_bytes;
        rows_count -> Option<u64> = |body| body.num_rows;
        modified_at -> Option<OffsetDateTime> = |body| body.last_modified_time;
        location -> Option<&str> = |body| body.location.as_deref();
        require_partition_filter -> bool = |body| body.require_partition_filter.unwrap_or(false);
        schema -> Option<&TableSchema> = |body| body.schema.as_ref();
        fields -> &[TableFieldSchema] = |body| {
            body.schema.as_ref().map_or(&[][..], |schema| schema.fields.as_slice())
        };
        /// The SQL of a view, `None` for other table types.
        view_query -> Option<&str> = |body| body.view.as_ref().map(|view| &*view.query);
        view_legacy_sql -> Option<bool> = |body| body.view.as_ref().and_then(|view| view.use_legacy_sql);
    }

    pub async fn headers(&mut self) -> crate::Result<Vec<&str>> {
        let fields = self.fields().await?;
        Ok(fields.iter().map(|field| &*field.name).collect())
    }

    pub async fn set_name(&mut self, name: Option<&str>) -> crate::Result<()> {
        let name = name.map(Box::from);
        self.state
            .set(TableAttr::FriendlyName, |body| body.friendly_name = name)
            .await
    }

    pub async fn set_description(&mut self, description: Option<&str>) -> crate::Result<()> {
        let description = description.map(Box::from);
        self.state
            .set(TableAttr::Description, |body| body.description = description)
            .await
    }

    pub async fn set_labels(&mut self, labels: HashMap<String, String>) -> crate::Result<()> {
        self.state
            .set(TableAttr::Labels, |body| body.labels = Some(labels))
            .await
    }

    pub async fn set_expires_at(&mut self, expires_at: Option<OffsetDateTime>) -> crate::Result<()> {
        self.state
            .set(TableAttr::ExpirationTime, |body| body.expiration_time = expires_at)
            .await
    }

    pub async fn set_schema(&mut self, schema: TableSchema) -> crate::Result<()> {
        self.state
            .set(TableAttr::Schema, |body| body.schema = Some(schema))
            .await
    }

    pub async fn set_time_partitioning(
        &mut self,
        partitioning: Option<TimePartitioning>,
    ) -> crate::Result<()> {
        self.state
            .set(TableAttr::TimePartitioning, |body| {
                body.time_partitioning = partitioning
            })
            .await
    }

    pub async fn set_clustering(&mut self, fields: Vec<Box<str>>) -> crate::Result<()> {
        let clustering = (!fields.is_empty()).then_some(Clustering { fields });
        self.state
            .set(TableAttr::Clustering, |body| body.clustering = clustering)
            .await
    }

    pub async fn set_view_query(&mut self, query: &str) -> crate::Result<()> {
        let query = Box::<str>::from(query);
        self.state
            .set(TableAttr::View, |body| match body.view {
                Some(ref mut view) => view.query = query,
                None => {
                    body.view = Some(bigquery_model_rs::table::ViewDefinition {
                        query,
                        use_legacy_sql: Some(false),
                    })
                }
            })
            .await
    }

    /// Applies every change made in `configure` with a single patch. Returns
    /// false, without a request, when nothing changed.
    pub async fn update<F>(&mut self, configure: F) -> crate::Result<bool>
    where
        F: FnOnce(&mut TableUpdater),
    {
        let body = self.state.ensure_full().await?.clone();
        let mut updater = TableUpdater::new(Updater::from_body(body)?);
        configure(&mut updater);

        self.state.apply(updater.into_updater()).await
    }

    pub async fn delete(&mut self) -> crate::Result<()> {
        self.state.delete(DeleteOptions::default()).await
    }

    /// Reads a page of rows. The schema comes from the full body.
    pub async fn data(&mut self, page: PageRequest) -> crate::Result<Data> {
        let schema = self.state.ensure_full().await?.schema.clone().unwrap_or_default();
        let client = self.state.client().clone();
        let reference = self.table_ref().clone();

        debug!(message = "listing table data", table = %reference, page_token = ?page.page_token);

        let max_results = page.max_results;
        let list = client.service().list_table_data(&reference, page).await?;
        Data::from_list(client, reference, schema, list, max_results)
    }

    /// Streams rows into the table.
    pub async fn insert<R>(&self, rows: R, options: InsertRowOptions) -> crate::Result<InsertResponse>
    where
        R: IntoIterator,
        R::Item: serde::Serialize,
    {
        let request = build_request(rows, &options)?;
        debug!(message = "streaming rows", table = %self.table_ref(), rows = request.rows.len());

        let response = self
            .state
            .client()
            .service()
            .insert_table_data(self.table_ref(), request.clone())
            .await?;

        Ok(InsertResponse::new(request, response))
    }

    /// Starts a job copying this table into `destination`. Unqualified names
    /// resolve against this table's dataset.
    pub async fn copy_job(
        &self,
        destination: impl IntoTableRef,
        options: CopyOptions,
    ) -> crate::Result<Job> {
        let destination = destination.into_table_ref(&self.dataset_ref())?;
        ResourcePath::Table(destination.clone()).validate()?;

        let configuration = options.to_configuration(self.table_ref().clone(), destination);
        job::submit(self.state.client(), self.project_id(), configuration, &options.job).await
    }

    /// Copies this table into `destination`, waiting for the job to finish.
    pub async fn copy(&self, destination: impl IntoTableRef, options: CopyOptions) -> crate::Result<Job> {
        self.copy_job(destination, options).await?.finish().await
    }

    /// Starts a job exporting this table to storage URIs.
    pub async fn extract_job<I>(&self, uris: I, options: ExtractOptions) -> crate::Result<Job>
    where
        I: IntoIterator,
        I::Item: Into<Box<str>>,
    {
        let uris = uris.into_iter().map(Into::into).collect::<Vec<_>>();
        let configuration = options.to_configuration(self.table_ref().clone(), uris);
        job::submit(self.state.client(), self.project_id(), configuration, &options.job).await
    }

    pub async fn extract<I>(&self, uris: I, options: ExtractOptions) -> crate::Result<Job>
    where
        I: IntoIterator,
        I::Item: Into<Box<str>>,
    {
        self.extract_job(uris, options).await?.finish().await
    }

    /// Starts a job loading storage URIs into this table.
    pub async fn load_job<I>(&self, uris: I, options: LoadOptions) -> crate::Result<Job>
    where
        I: IntoIterator,
        I::Item: Into<Box<str>>,
    {
        let uris = uris.into_iter().map(Into::into).collect::<Vec<_>>();
        let configuration = options.to_configuration(uris, self.table_ref().clone());
        job::submit(self.state.client(), self.project_id(), configuration, &options.job).await
    }

    pub async fn load<I>(&self, uris: I, options: LoadOptions) -> crate::Result<Job>
    where
        I: IntoIterator,
        I::Item: Into<Box<str>>,
    {
        self.load_job(uris, options).await?.finish().await
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use bigquery_model_rs::job::JobState;
    use bigquery_model_rs::table_data::InsertErrors;
    use bigquery_model_rs::ErrorProto;
    use serde_json::json;

    use super::*;
    use crate::service::mock::{CallKind, MockService};
    use crate::{ClientConfig, Error};

    fn setup() -> (Arc<MockService>, Client, TableReference) {
        let mock = Arc::new(MockService::new("p"));
        let reference = TableReference::new("p", "d", "t");
        mock.put(
            reference.clone(),
            json!({
                "tableReference": { "projectId": "p", "datasetId": "d", "tableId": "t" },
                "type": "TABLE",
                "friendlyName": "Events",
                "description": "all events",
                "numRows": "2",
                "schema": {
                    "fields": [
                        { "name": "name", "type": "STRING" },
                        { "name": "n", "type": "INTEGER" }
                    ]
                }
            }),
        );

        let client = Client::new(mock.clone(), ClientConfig::default());
        (mock, client, reference)
    }

    #[tokio::test]
    async fn test_reference_reads_fetch_once() -> crate::Result<()> {
        let (mock, client, reference) = setup();
        let mut table = Table::new_reference(client, reference)?;

        assert!(table.is_reference());
        assert_eq!(table.table_id(), "t");
        assert_eq!(mock.calls().len(), 0);

        assert_eq!(table.name().await?, Some("Events"));
        assert_eq!(mock.count(CallKind::Get), 1);

        assert_eq!(table.description().await?, Some("all events"));
        assert_eq!(table.rows_count().await?, Some(2));
        assert!(table.is_table().await?);
        assert_eq!(table.headers().await?, ["name", "n"]);
        assert_eq!(mock.count(CallKind::Get), 1);
        Ok(())
    }

    #[tokio::test]
    async fn test_live_setter_round_trips_server_response() -> crate::Result<()> {
        let (mock, client, reference) = setup();
        let mut table = Table::new_reference(client, reference)?;
        table.reload().await?;
        mock.clear_calls();

        mock.on_patch(|body| {
            if let Some(description) = body["description"].as_str() {
                body["description"] = json!(format!("{description}!"));
            }
        });

        table.set_description(Some("x")).await?;

        assert_eq!(mock.count(CallKind::Get), 0);
        assert_eq!(mock.count(CallKind::Patch), 1);
        assert_eq!(
            mock.last_body(CallKind::Patch),
            Some(json!({ "description": "x", "etag": "e1" }))
        );
        assert_eq!(table.description().await?, Some("x!"));
        assert_eq!(mock.count(CallKind::Get), 0);
        Ok(())
    }

    #[tokio::test]
    async fn test_stale_etag_is_not_retried() -> crate::Result<()> {
        let (mock, client, reference) = setup();
        let mut first = Table::new_reference(client.clone(), reference.clone())?;
        let mut second = Table::new_reference(client, reference)?;
        first.reload().await?;
        second.reload().await?;
        assert_eq!(second.etag().await?, Some("e1"));

        first.set_name(Some("x")).await?;
        assert_eq!(first.etag().await?, Some("e2"));

        let err = second.set_description(Some("y")).await.unwrap_err();
        assert!(err.is_precondition_failed());
        assert_eq!(mock.count(CallKind::Patch), 2);

        // unconfirmed change stays local until reloaded
        assert_eq!(second.description().await?, Some("y"));
        second.reload().await?;
        assert_eq!(second.description().await?, Some("all events"));
        assert_eq!(second.name().await?, Some("x"));
        Ok(())
    }

    #[tokio::test]
    async fn test_update_batches_into_one_patch() -> crate::Result<()> {
        let (mock, client, reference) = setup();
        let mut table = Table::new_reference(client, reference)?;

        let changed = table
            .update(|t| {
                t.set_name("A");
                t.set_description("B");
                t.set_name("C");
                t.schema().integer("extra");
            })
            .await?;

        assert!(changed);
        assert_eq!(mock.count(CallKind::Patch), 1);

        let patch = mock.last_body(CallKind::Patch).unwrap();
        assert_eq!(patch["friendlyName"], "C");
        assert_eq!(patch["description"], "B");
        assert_eq!(patch["schema"]["fields"].as_array().map(Vec::len), Some(3));
        assert_eq!(patch["etag"], "e1");

        assert!(!table.update(|_| {}).await?);

        let read_only = table
            .update(|t| {
                assert!(t.labels().get("env").is_none());
            })
            .await?;
        assert!(!read_only);
        assert_eq!(mock.count(CallKind::Patch), 1);
        Ok(())
    }

    #[tokio::test]
    async fn test_data_and_insert() -> crate::Result<()> {
        let (mock, client, reference) = setup();
        let table = Table::new_reference(client, reference.clone())?;

        let rows = [json!({ "name": "a", "n": 1 }), json!({ "name": "b", "n": "x" })];
        mock.push_insert_errors(vec![InsertErrors {
            index: 1,
            errors: vec![ErrorProto::new("bad int").with_reason("invalid")],
        }]);

        let response = table.insert(rows, InsertRowOptions::default()).await?;
        assert!(!response.success());
        assert_eq!(response.insert_count(), 1);
        assert_eq!(mock.rows(&reference).len(), 1);

        let mut table = table;
        let data = table.data(PageRequest::default()).await?;
        assert_eq!(data.total(), Some(1));
        assert_eq!(data.rows()[0]["n"], 1);
        assert_eq!(data.rows()[0]["name"], "a");

        let err = table
            .insert(Vec::<Value>::new(), InsertRowOptions::default())
            .await
            .unwrap_err();
        assert!(matches!(err, Error::InvalidArgument(_)));
        assert_eq!(mock.count(CallKind::InsertTableData), 1);
        Ok(())
    }

    #[tokio::test]
    async fn test_copy_fails_with_job_error() -> crate::Result<()> {
        let (mock, client, reference) = setup();
        let table = Table::new_reference(client, reference)?;
        let destination = TableReference::new("p", "d", "copy");

        let job = table.copy_job("copy", CopyOptions::default()).await?;
        let inserted = mock.last_body(CallKind::Insert).unwrap();
        assert_eq!(
            inserted["configuration"]["copy"]["destinationTable"]["tableId"],
            "copy"
        );
        assert!(job.is_full());

        let err = table
            .copy_job(TableReference::new("p", "d", ""), CopyOptions::default())
            .await
            .unwrap_err();
        assert!(matches!(err, Error::InvalidArgument(_)));
        assert_eq!(mock.count(CallKind::Insert), 1);

        mock.fail_next(CallKind::Insert, MockService::api_error(400, "bad copy"));
        let err = table.copy(&destination, CopyOptions::default()).await.unwrap_err();
        assert!(matches!(err, Error::Api(_)));

        let options = CopyOptions::builder()
            .job(crate::job::JobOptions::builder().job_id("c2").build())
            .build();
        mock.push_job_states("c2", [JobState::Done]);
        let finished = table
            .copy(TableReference::new("p", "d", "copy2"), options)
            .await?;
        assert_eq!(finished.job_id(), "c2");
        Ok(())
    }
}
