//! Datasets, and everything created or looked up through them.
use std::collections::HashMap;

use bigquery_model_rs::dataset::{AccessEntry, Dataset as DatasetBody};
use bigquery_model_rs::{DatasetReference, TableReference};
use serde_json::Value;
use time::OffsetDateTime;

use crate::Client;
use crate::job::{self, Job, LoadOptions, QueryOptions};
use crate::list::{ListItem, Page};
use crate::model::Model;
use crate::path::{ResourcePath, ResourceType};
use crate::query::{self, QueryData};
use crate::resource::{
    Fidelity, Insertable, ReadableResource, ResourceBuilder, ResourceKind, ResourceState,
    SubResource, Updater, accessors, attributes, lookup,
};
use crate::routine::{Routine, RoutineUpdater};
use crate::service::{DeleteOptions, PageRequest};
use crate::table::{InsertResponse, InsertRowOptions, Table, TableUpdater, build_request};

mod access;
mod insert;
mod updater;

pub use access::{Access, Role, Scope, special_group};
pub use updater::DatasetUpdater;

#[derive(Debug, Clone, Copy)]
pub enum DatasetKind {}

attributes! {
    pub enum DatasetAttr {
        FriendlyName => "friendlyName",
        Description => "description",
        DefaultTableExpirationMs => "defaultTableExpirationMs",
        Labels => "labels",
        Access => "access",
    }
}

impl ResourceKind for DatasetKind {
    type Reference = DatasetReference;
    type Body = DatasetBody;
    type Attr = DatasetAttr;

    const NAME: &'static str = "dataset";

    fn path(reference: &DatasetReference) -> ResourcePath {
        ResourcePath::Dataset(reference.clone())
    }

    fn reference_of(body: &DatasetBody) -> Option<&DatasetReference> {
        body.dataset_reference.as_ref()
    }

    fn etag_of(body: &DatasetBody) -> Option<&str> {
        body.etag.as_deref()
    }
}

impl Insertable for DatasetKind {
    const TYPE: ResourceType = ResourceType::Dataset;

    fn parent(reference: &DatasetReference) -> ResourcePath {
        ResourcePath::Project(reference.project_id.clone())
    }

    fn new_body(reference: DatasetReference) -> DatasetBody {
        DatasetBody::new(reference)
    }
}

/// A dataset handle. Name, labels and location are served by list
/// responses; every other accessor loads the full body first.
#[derive(Debug)]
pub struct Dataset {
    state: ResourceState<DatasetKind>,
}

impl ReadableResource for Dataset {
    type Kind = DatasetKind;

    fn state(&self) -> &ResourceState<DatasetKind> {
        &self.state
    }

    fn state_mut(&mut self) -> &mut ResourceState<DatasetKind> {
        &mut self.state
    }
}

impl ListItem for Dataset {
    const TYPE: ResourceType = ResourceType::Dataset;

    fn from_partial(client: Client, value: Value) -> crate::Result<Self> {
        ResourceState::from_json(client, value, Fidelity::Partial).map(|state| Self { state })
    }
}

impl Dataset {
    pub(crate) fn new_reference(client: Client, reference: DatasetReference) -> crate::Result<Self> {
        ResourceState::new_reference(client, reference).map(|state| Self { state })
    }

    pub(crate) async fn create<F>(
        client: Client,
        reference: DatasetReference,
        configure: F,
    ) -> crate::Result<Self>
    where
        F: FnOnce(&mut DatasetUpdater),
    {
        let mut updater = DatasetUpdater::new(Updater::for_insert(reference)?);
        configure(&mut updater);

        ResourceState::insert(client, updater.into_updater())
            .await
            .map(|state| Self { state })
    }

    fn client(&self) -> &Client {
        self.state.client()
    }

    pub fn dataset_ref(&self) -> &DatasetReference {
        self.state.reference()
    }

    pub fn dataset_id(&self) -> &str {
        &self.dataset_ref().dataset_id
    }

    pub fn project_id(&self) -> &str {
        &self.dataset_ref().project_id
    }

    /// Whatever body is held, without fetching.
    pub fn body(&self) -> Option<&DatasetBody> {
        self.state.body()
    }

    accessors! { ensure_resource;
        id -> Option<&str> = |body| body.id.as_deref();
        name -> Option<&str> = |body| body.friendly_name.as_deref();
        labels -> Option<&HashMap<String, String>> = |body| body.labels.as_ref();
        location -> Option<&str> = |body| body.location.as_deref();
    }

    accessors! { ensure_full;
        etag -> Option<&str> = |body| body.etag.as_deref();
        api_url -> Option<&str> = |body| body.self_link.as_deref();
        description -> Option<&str> = |body| body.description.as_deref();
        /// Milliseconds until new tables expire.
        default_expiration -> Option<i64> = |body| body.default_table_expiration_ms;
        created_at -> Option<OffsetDateTime> = |body| body.creation_time;
        modified_at -> Option<OffsetDateTime> = |body| body.last_modified_time;
        access -> &[AccessEntry] = |body| body.access.as_deref().unwrap_or_default();
    }

    pub async fn set_name(&mut self, name: Option<&str>) -> crate::Result<()> {
        let name = name.map(Box::from);
        self.state
            .set(DatasetAttr::FriendlyName, |body| body.friendly_name = name)
            .await
    }

    pub async fn set_description(&mut self, description: Option<&str>) -> crate::Result<()> {
        let description = description.map(Box::from);
        self.state
            .set(DatasetAttr::Description, |body| body.description = description)
            .await
    }

    pub async fn set_default_expiration(&mut self, expiration_ms: Option<i64>) -> crate::Result<()> {
        self.state
            .set(DatasetAttr::DefaultTableExpirationMs, |body| {
                body.default_table_expiration_ms = expiration_ms
            })
            .await
    }

    pub async fn set_labels(&mut self, labels: HashMap<String, String>) -> crate::Result<()> {
        self.state
            .set(DatasetAttr::Labels, |body| body.labels = Some(labels))
            .await
    }

    /// Edits the access rules, sending one patch if they changed.
    pub async fn update_access<F>(&mut self, configure: F) -> crate::Result<bool>
    where
        F: FnOnce(&mut Access),
    {
        let rules = self.state.ensure_full().await?.access.clone();
        let mut access = Access::new(self.dataset_ref().clone(), rules.unwrap_or_default());
        configure(&mut access);

        if !access.changed() {
            return Ok(false);
        }

        let rules = access.into_rules();
        self.state
            .set(DatasetAttr::Access, |body| body.access = Some(rules))
            .await?;
        Ok(true)
    }

    /// Applies every change made in `configure` with a single patch. Returns
    /// false, without a request, when nothing changed.
    pub async fn update<F>(&mut self, configure: F) -> crate::Result<bool>
    where
        F: FnOnce(&mut DatasetUpdater),
    {
        let body = self.state.ensure_full().await?.clone();
        let mut updater = DatasetUpdater::new(Updater::from_body(body)?);
        configure(&mut updater);

        self.state.apply(updater.into_updater()).await
    }

    /// Deletes the dataset. Unless `force`, the service refuses to delete a
    /// dataset that still holds tables.
    pub async fn delete(&mut self, force: bool) -> crate::Result<()> {
        self.state
            .delete(DeleteOptions {
                delete_contents: force,
            })
            .await
    }

    /// Creates a table with a single insert once `configure` returns.
    pub async fn create_table<F>(&self, table_id: &str, configure: F) -> crate::Result<Table>
    where
        F: FnOnce(&mut TableUpdater),
    {
        let reference = self.dataset_ref().table(table_id);
        Table::create(self.client().clone(), reference, configure).await
    }

    /// Creates a view over a standard SQL query.
    pub async fn create_view(&self, table_id: &str, query: &str) -> crate::Result<Table> {
        self.create_table(table_id, |view| view.set_view_query(query, false))
            .await
    }

    /// Fetches a table, or `None` if it doesn't exist.
    pub async fn table(&self, table_id: &str) -> crate::Result<Option<Table>> {
        lookup(self.table_reference(table_id)?).await
    }

    /// A handle on a table without checking that it exists. Fails, without a
    /// request, if `table_id` is empty.
    pub fn table_reference(&self, table_id: &str) -> crate::Result<Table> {
        Table::new_reference(self.client().clone(), self.dataset_ref().table(table_id))
    }

    pub async fn tables(&self, page: PageRequest) -> crate::Result<Page<Table>> {
        Page::fetch(self.client(), self.path(), page).await
    }

    pub async fn create_routine<F>(&self, routine_id: &str, configure: F) -> crate::Result<Routine>
    where
        F: FnOnce(&mut RoutineUpdater),
    {
        let reference = self.dataset_ref().routine(routine_id);
        Routine::create(self.client().clone(), reference, configure).await
    }

    /// Fetches a routine, or `None` if it doesn't exist.
    pub async fn routine(&self, routine_id: &str) -> crate::Result<Option<Routine>> {
        lookup(self.routine_reference(routine_id)?).await
    }

    pub fn routine_reference(&self, routine_id: &str) -> crate::Result<Routine> {
        Routine::new_reference(self.client().clone(), self.dataset_ref().routine(routine_id))
    }

    pub async fn routines(&self, page: PageRequest) -> crate::Result<Page<Routine>> {
        Page::fetch(self.client(), self.path(), page).await
    }

    /// Fetches a model, or `None` if it doesn't exist.
    pub async fn model(&self, model_id: &str) -> crate::Result<Option<Model>> {
        lookup(self.model_reference(model_id)?).await
    }

    pub fn model_reference(&self, model_id: &str) -> crate::Result<Model> {
        Model::new_reference(self.client().clone(), self.dataset_ref().model(model_id))
    }

    pub async fn models(&self, page: PageRequest) -> crate::Result<Page<Model>> {
        Page::fetch(self.client(), self.path(), page).await
    }

    fn path(&self) -> ResourcePath {
        ResourcePath::Dataset(self.dataset_ref().clone())
    }

    fn child_table(&self, table_id: &str) -> crate::Result<TableReference> {
        let table = self.dataset_ref().table(table_id);
        ResourcePath::Table(table.clone()).validate()?;
        Ok(table)
    }

    /// Starts a query job. Unqualified table names in `sql` resolve against
    /// this dataset unless `options` names another default dataset.
    pub async fn query_job(&self, sql: &str, mut options: QueryOptions) -> crate::Result<Job> {
        options
            .default_dataset
            .get_or_insert_with(|| self.dataset_ref().clone());

        query::query_job(self.client(), self.project_id(), sql, &options).await
    }

    /// Runs a query and waits for the first page of results.
    pub async fn query(&self, sql: &str, mut options: QueryOptions) -> crate::Result<QueryData> {
        options
            .default_dataset
            .get_or_insert_with(|| self.dataset_ref().clone());

        query::query(self.client(), self.project_id(), sql, &options).await
    }

    /// Starts a job loading storage URIs into a table of this dataset.
    pub async fn load_job<I>(&self, table_id: &str, uris: I, options: LoadOptions) -> crate::Result<Job>
    where
        I: IntoIterator,
        I::Item: Into<Box<str>>,
    {
        let uris = uris.into_iter().map(Into::into).collect::<Vec<_>>();
        let destination = self.child_table(table_id)?;
        let configuration = options.to_configuration(uris, destination);
        job::submit(self.client(), self.project_id(), configuration, &options.job).await
    }

    pub async fn load<I>(&self, table_id: &str, uris: I, options: LoadOptions) -> crate::Result<Job>
    where
        I: IntoIterator,
        I::Item: Into<Box<str>>,
    {
        self.load_job(table_id, uris, options).await?.finish().await
    }

    /// Streams rows into a table of this dataset.
    pub async fn insert<R>(
        &self,
        table_id: &str,
        rows: R,
        options: InsertRowOptions,
    ) -> crate::Result<InsertResponse>
    where
        R: IntoIterator,
        R::Item: serde::Serialize,
    {
        let table = self.child_table(table_id)?;
        let request = build_request(rows, &options)?;
        debug!(message = "streaming rows", %table, rows = request.rows.len());

        let response = self
            .client()
            .service()
            .insert_table_data(&table, request.clone())
            .await?;

        Ok(InsertResponse::new(request, response))
    }

    /// Like [`insert`](Self::insert), but creates the table with `configure`
    /// if it doesn't exist yet, then retries once.
    pub async fn insert_autocreate<R, F>(
        &self,
        table_id: &str,
        rows: R,
        options: InsertRowOptions,
        configure: F,
    ) -> crate::Result<InsertResponse>
    where
        R: IntoIterator,
        R::Item: serde::Serialize,
        F: FnOnce(&mut TableUpdater),
    {
        let table = self.child_table(table_id)?;
        let request = build_request(rows, &options)?;
        debug!(message = "streaming rows", %table, rows = request.rows.len(), autocreate = true);

        let response =
            insert::insert_autocreate(self.client(), &table, request.clone(), configure).await?;

        Ok(InsertResponse::new(request, response))
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use bigquery_model_rs::TableReference;
    use bigquery_model_rs::job::JobConfigurationKind;
    use serde_json::json;

    use super::*;
    use crate::config::AutocreatePolicy;
    use crate::service::mock::{CallKind, MockService};
    use crate::{ClientConfig, Error};

    fn setup() -> (Arc<MockService>, Dataset) {
        let mock = Arc::new(MockService::new("p"));
        let reference = DatasetReference::new("p", "d");
        mock.put(
            reference.clone(),
            json!({
                "datasetReference": { "projectId": "p", "datasetId": "d" },
                "friendlyName": "Main",
                "location": "US",
                "access": [{ "role": "OWNER", "specialGroup": "projectOwners" }]
            }),
        );

        let config = ClientConfig::builder()
            .autocreate(AutocreatePolicy::immediate())
            .build();
        let client = Client::new(mock.clone(), config);
        (mock, Dataset::new_reference(client, reference).unwrap())
    }

    #[tokio::test]
    async fn test_create_table_sends_one_insert() -> crate::Result<()> {
        let (mock, dataset) = setup();

        let mut table = dataset
            .create_table("t", |t| {
                t.set_name("A");
                t.set_description("B");
                t.schema().string("name").required();
            })
            .await?;

        assert_eq!(mock.calls().len(), 1);
        assert_eq!(mock.count(CallKind::Insert), 1);

        let inserted = mock.last_body(CallKind::Insert).unwrap();
        assert_eq!(inserted["friendlyName"], "A");
        assert_eq!(inserted["description"], "B");
        assert_eq!(inserted["tableReference"]["tableId"], "t");

        assert!(table.is_full());
        assert_eq!(table.name().await?, Some("A"));
        assert_eq!(mock.calls().len(), 1);
        Ok(())
    }

    #[tokio::test]
    async fn test_soft_lookups() -> crate::Result<()> {
        let (mock, dataset) = setup();
        dataset.create_view("v", "SELECT 1").await?;

        let mut view = dataset.table("v").await?.expect("view exists");
        assert!(view.is_full());
        assert_eq!(view.view_query().await?, Some("SELECT 1"));

        assert!(dataset.table("missing").await?.is_none());
        assert!(dataset.routine("missing").await?.is_none());
        assert!(dataset.model("missing").await?.is_none());

        mock.fail_next(CallKind::Get, MockService::api_error(500, "backend error"));
        let err = dataset.table("v").await.unwrap_err();
        assert!(matches!(err, Error::Api(_)));

        let calls = mock.count(CallKind::Get);
        let reference = dataset.table_reference("anything")?;
        assert!(reference.is_reference());
        assert_eq!(mock.count(CallKind::Get), calls);
        Ok(())
    }

    #[tokio::test]
    async fn test_empty_child_ids_fail_without_rpc() -> crate::Result<()> {
        let (mock, dataset) = setup();
        let is_invalid = |err: Error| matches!(err, Error::InvalidArgument(_));

        assert!(is_invalid(dataset.table_reference("").unwrap_err()));
        assert!(is_invalid(dataset.routine_reference("").unwrap_err()));
        assert!(is_invalid(dataset.model_reference("").unwrap_err()));
        assert!(is_invalid(dataset.table("").await.unwrap_err()));

        let created = dataset.create_table("", |t| t.set_name("A")).await;
        assert!(is_invalid(created.unwrap_err()));

        let routine = dataset.create_routine("", |r| r.set_definition("1")).await;
        assert!(is_invalid(routine.unwrap_err()));

        let inserted = dataset
            .insert("", [json!({ "a": 1 })], InsertRowOptions::default())
            .await;
        assert!(is_invalid(inserted.unwrap_err()));

        assert!(mock.calls().is_empty());
        Ok(())
    }

    #[tokio::test]
    async fn test_listing_tables_gives_partial_handles() -> crate::Result<()> {
        let (mock, dataset) = setup();
        for id in ["a", "b", "c"] {
            dataset
                .create_table(id, |t| {
                    t.set_description("not listed");
                })
                .await?;
        }

        let page = dataset.tables(PageRequest::max(2)).await?;
        assert_eq!(page.len(), 2);
        assert!(page.has_next());
        assert!(page.items().iter().all(|table| table.is_partial()));

        let next = page.next().await?.expect("second page");
        let mut last = next.into_items().remove(0);
        assert_eq!(last.table_id(), "c");

        let gets = mock.count(CallKind::Get);
        assert_eq!(last.description().await?, Some("not listed"));
        assert_eq!(mock.count(CallKind::Get), gets + 1);
        Ok(())
    }

    #[tokio::test]
    async fn test_update_access() -> crate::Result<()> {
        let (mock, mut dataset) = setup();

        let changed = dataset
            .update_access(|access| {
                access.add_reader_special("all");
                access.add_writer_user("a@example.com");
            })
            .await?;
        assert!(changed);

        let patch = mock.last_body(CallKind::Patch).unwrap();
        assert_eq!(patch["access"].as_array().map(Vec::len), Some(3));
        assert_eq!(patch["etag"], "e1");
        assert_eq!(dataset.access().await?.len(), 3);

        let unchanged = dataset
            .update_access(|access| access.add_writer_user("a@example.com"))
            .await?;
        assert!(!unchanged);
        assert_eq!(mock.count(CallKind::Patch), 1);
        Ok(())
    }

    #[tokio::test]
    async fn test_delete_requires_force_with_tables() -> crate::Result<()> {
        let (mock, mut dataset) = setup();
        dataset.create_table("t", |_| {}).await?;

        let err = dataset.delete(false).await.unwrap_err();
        assert!(matches!(err, Error::Api(ref api) if api.status == 400));

        dataset.delete(true).await?;
        assert!(mock.stored(TableReference::new("p", "d", "t")).is_none());
        assert!(!dataset.exists(false).await?);
        Ok(())
    }

    #[tokio::test]
    async fn test_insert_creates_missing_table_once() -> crate::Result<()> {
        let (mock, dataset) = setup();
        let rows = [json!({ "name": "a" }), json!({ "name": "b" })];

        let response = dataset
            .insert_autocreate("events", rows, InsertRowOptions::default(), |t| {
                t.schema().string("name");
            })
            .await?;

        assert!(response.success());
        assert_eq!(response.insert_count(), 2);
        assert_eq!(mock.count(CallKind::InsertTableData), 2);
        assert_eq!(mock.count(CallKind::Insert), 1);

        let created = mock.last_body(CallKind::Insert).unwrap();
        assert_eq!(created["schema"]["fields"][0]["name"], "name");
        assert_eq!(mock.rows(&TableReference::new("p", "d", "events")).len(), 2);

        // both attempts carried the same insert ids
        let calls = mock.calls();
        let mut attempts = calls
            .iter()
            .filter(|call| call.kind == CallKind::InsertTableData)
            .map(|call| call.body.clone().unwrap()["rows"].clone());
        assert_eq!(attempts.next(), attempts.next());
        Ok(())
    }

    #[tokio::test]
    async fn test_insert_autocreate_tolerates_concurrent_create() -> crate::Result<()> {
        let (mock, dataset) = setup();
        dataset.create_table("events", |_| {}).await?;

        mock.fail_next(CallKind::InsertTableData, MockService::not_found("Table p:d.events"));
        let response = dataset
            .insert_autocreate("events", [json!({ "n": 1 })], InsertRowOptions::default(), |_| {})
            .await?;

        assert!(response.success());
        assert_eq!(mock.count(CallKind::Insert), 2);
        assert_eq!(mock.count(CallKind::InsertTableData), 2);
        Ok(())
    }

    #[tokio::test]
    async fn test_insert_without_autocreate_propagates_not_found() {
        let (mock, dataset) = setup();
        let err = dataset
            .insert("missing", [json!({ "n": 1 })], InsertRowOptions::default())
            .await
            .unwrap_err();

        assert!(err.is_not_found());
        assert_eq!(mock.count(CallKind::Insert), 0);
    }

    #[tokio::test]
    async fn test_query_defaults_to_this_dataset() -> crate::Result<()> {
        let (mock, dataset) = setup();
        let job = dataset.query_job("SELECT * FROM t", QueryOptions::default()).await?;
        assert!(job.is_full());

        let inserted = mock.last_body(CallKind::Insert).unwrap();
        assert_eq!(
            inserted["configuration"]["query"]["defaultDataset"],
            json!({ "projectId": "p", "datasetId": "d" })
        );

        let mut job = job;
        assert!(matches!(
            job.configuration().await?.kind,
            JobConfigurationKind::Query(_)
        ));
        Ok(())
    }
}
