//! An in-memory [`Service`], for tests.
//!
//! Resources are stored as raw JSON keyed by their route. Every call is
//! recorded. ETags are emulated: stored bodies start at `e1`, each patch
//! bumps the counter, and a patch carrying a stale ETag fails with
//! [`Error::PreconditionFailed`](crate::Error::PreconditionFailed).
use std::collections::{BTreeMap, HashMap, VecDeque};
use std::fmt;

use bigquery_model_rs::job::JobState;
use bigquery_model_rs::query::GetQueryResultsResponse;
use bigquery_model_rs::table::{FieldMode, FieldType, TableFieldSchema, TableSchema};
use bigquery_model_rs::table_data::{
    Cell, InsertErrors, Row, TableDataInsertAllRequest, TableDataInsertAllResponse,
    TableDataList,
};
use bigquery_model_rs::{ErrorProto, JobReference, TableReference};
use parking_lot::Mutex;
use serde_json::{Map, Value, json};

use super::{DeleteOptions, ListResponse, PageRequest, Service};
use crate::error::ApiError;
use crate::path::{ResourcePath, ResourceType};
use crate::resource::PatchBody;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CallKind {
    Get,
    List,
    Insert,
    Patch,
    Delete,
    InsertTableData,
    ListTableData,
    GetQueryResults,
    CancelJob,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Call {
    pub kind: CallKind,
    pub path: String,
    pub body: Option<Value>,
}

type Transform = Box<dyn Fn(&mut Value) + Send + Sync>;

#[derive(Default)]
struct MockState {
    resources: BTreeMap<String, Value>,
    calls: Vec<Call>,
    faults: Vec<(CallKind, crate::Error)>,
    patch_transform: Option<Transform>,
    job_states: HashMap<String, VecDeque<JobState>>,
    query_results: HashMap<String, GetQueryResultsResponse>,
    insert_errors: VecDeque<Vec<InsertErrors>>,
    rows: BTreeMap<String, Vec<Map<String, Value>>>,
    job_counter: u64,
}

pub struct MockService {
    project_id: Box<str>,
    state: Mutex<MockState>,
}

impl fmt::Debug for MockService {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MockService")
            .field("project_id", &self.project_id)
            .finish_non_exhaustive()
    }
}

impl MockService {
    pub fn new(project_id: impl Into<Box<str>>) -> Self {
        Self {
            project_id: project_id.into(),
            state: Mutex::new(MockState::default()),
        }
    }

    /// Stores `body` at `path`, giving it the ETag `e1` unless it has one.
    pub fn put(&self, path: impl Into<ResourcePath>, mut body: Value) {
        if body.get("etag").is_none() {
            body["etag"] = json!("e1");
        }

        let key = path.into().to_string();
        self.state.lock().resources.insert(key, body);
    }

    /// The stored body at `path`, if any.
    pub fn stored(&self, path: impl Into<ResourcePath>) -> Option<Value> {
        let key = path.into().to_string();
        self.state.lock().resources.get(&key).cloned()
    }

    pub fn calls(&self) -> Vec<Call> {
        self.state.lock().calls.clone()
    }

    pub fn count(&self, kind: CallKind) -> usize {
        self.state
            .lock()
            .calls
            .iter()
            .filter(|call| call.kind == kind)
            .count()
    }

    /// The request body of the latest call of `kind`.
    pub fn last_body(&self, kind: CallKind) -> Option<Value> {
        self.state
            .lock()
            .calls
            .iter()
            .rev()
            .find(|call| call.kind == kind)
            .and_then(|call| call.body.clone())
    }

    pub fn clear_calls(&self) {
        self.state.lock().calls.clear();
    }

    /// The next call of `kind` fails with `error` instead of running.
    pub fn fail_next(&self, kind: CallKind, error: crate::Error) {
        self.state.lock().faults.push((kind, error));
    }

    /// Runs `transform` over every patched body before it is stored and
    /// returned, like server-side normalization would.
    pub fn on_patch<F>(&self, transform: F)
    where
        F: Fn(&mut Value) + Send + Sync + 'static,
    {
        self.state.lock().patch_transform = Some(Box::new(transform));
    }

    /// States reported for a job, one per insert or get, the last one sticking.
    pub fn push_job_states<I>(&self, job_id: &str, states: I)
    where
        I: IntoIterator<Item = JobState>,
    {
        self.state
            .lock()
            .job_states
            .entry(job_id.to_owned())
            .or_default()
            .extend(states);
    }

    pub fn set_query_results(&self, job_id: &str, results: GetQueryResultsResponse) {
        self.state
            .lock()
            .query_results
            .insert(job_id.to_owned(), results);
    }

    /// Per-row errors returned by the next streaming insert.
    pub fn push_insert_errors(&self, errors: Vec<InsertErrors>) {
        self.state.lock().insert_errors.push_back(errors);
    }

    /// Rows streamed into `table` so far.
    pub fn rows(&self, table: &TableReference) -> Vec<Map<String, Value>> {
        let key = ResourcePath::Table(table.clone()).to_string();
        self.state.lock().rows.get(&key).cloned().unwrap_or_default()
    }

    pub fn not_found(what: &str) -> crate::Error {
        ApiError::new(
            404,
            ErrorProto::new(format!("Not found: {what}")).with_reason("notFound"),
        )
        .classify()
    }

    pub fn already_exists(what: &str) -> crate::Error {
        ApiError::new(
            409,
            ErrorProto::new(format!("Already Exists: {what}")).with_reason("duplicate"),
        )
        .classify()
    }

    pub fn api_error(status: u16, message: &str) -> crate::Error {
        ApiError::new(status, ErrorProto::new(message)).classify()
    }

    fn precondition_failed() -> crate::Error {
        ApiError::new(
            412,
            ErrorProto::new("Precondition check failed.").with_reason("conditionNotMet"),
        )
        .classify()
    }

    /// Records the call, then fails it if a fault is queued for `kind`.
    fn record(
        &self,
        state: &mut MockState,
        kind: CallKind,
        path: String,
        body: Option<Value>,
    ) -> crate::Result<()> {
        state.calls.push(Call { kind, path, body });

        match state.faults.iter().position(|(fault, _)| *fault == kind) {
            Some(index) => Err(state.faults.remove(index).1),
            None => Ok(()),
        }
    }
}

fn bump_etag(body: &mut Value) {
    let next = body
        .get("etag")
        .and_then(Value::as_str)
        .and_then(|etag| etag.strip_prefix('e'))
        .and_then(|n| n.parse::<u64>().ok())
        .map_or(2, |n| n + 1);

    body["etag"] = json!(format!("e{next}"));
}

fn set_job_state(job: &mut Value, state: JobState) {
    job["status"] = json!({ "state": state });
}

/// The subset of fields a list call returns for each resource type.
fn partial_fields(ty: ResourceType) -> &'static [&'static str] {
    match ty {
        ResourceType::Dataset => &[
            "kind",
            "id",
            "datasetReference",
            "friendlyName",
            "labels",
            "location",
        ],
        ResourceType::Table => &[
            "kind",
            "id",
            "tableReference",
            "friendlyName",
            "type",
            "labels",
            "creationTime",
            "expirationTime",
            "timePartitioning",
            "rangePartitioning",
            "clustering",
        ],
        ResourceType::Routine => &[
            "etag",
            "routineReference",
            "routineType",
            "language",
            "creationTime",
            "lastModifiedTime",
        ],
        ResourceType::Model => &[
            "etag",
            "modelReference",
            "modelType",
            "labels",
            "creationTime",
            "lastModifiedTime",
        ],
        ResourceType::Job => &[
            "kind",
            "id",
            "jobReference",
            "state",
            "status",
            "statistics",
            "configuration",
            "userEmail",
        ],
    }
}

fn project(body: &Value, fields: &[&str]) -> Value {
    let mut projected = Map::new();
    for field in fields {
        if let Some(value) = body.get(*field) {
            projected.insert((*field).to_owned(), value.clone());
        }
    }

    Value::Object(projected)
}

fn paginate<T: Clone>(items: &[T], page: &PageRequest) -> (Vec<T>, Option<Box<str>>) {
    let start = page
        .page_token
        .as_deref()
        .and_then(|token| token.parse::<usize>().ok())
        .unwrap_or(0)
        .min(items.len());

    let end = match page.max_results {
        Some(max) => (start + max as usize).min(items.len()),
        None => items.len(),
    };

    let next = (end < items.len()).then(|| end.to_string().into_boxed_str());
    (items[start..end].to_vec(), next)
}

/// Encodes a JSON row in the `{"f": [{"v": ..}]}` form, following `fields`.
fn encode_row(fields: &[TableFieldSchema], row: &Map<String, Value>) -> Row {
    let f = fields
        .iter()
        .map(|field| Cell {
            v: encode_value(field, row.get(&*field.name).unwrap_or(&Value::Null)),
        })
        .collect();

    Row { f }
}

fn encode_value(field: &TableFieldSchema, value: &Value) -> Value {
    if field.mode == FieldMode::Repeated {
        let items = value.as_array().map(Vec::as_slice).unwrap_or_default();
        let scalar = TableFieldSchema {
            mode: FieldMode::Nullable,
            ..field.clone()
        };

        return Value::Array(
            items
                .iter()
                .map(|item| json!({ "v": encode_value(&scalar, item) }))
                .collect(),
        );
    }

    match (field.ty, value) {
        (_, Value::Null) => Value::Null,
        (FieldType::Record, Value::Object(map)) => {
            serde_json::to_value(encode_row(&field.fields, map)).unwrap_or(Value::Null)
        }
        (_, Value::String(s)) => Value::String(s.clone()),
        (_, other) => Value::String(other.to_string()),
    }
}

#[async_trait::async_trait]
impl Service for MockService {
    fn project_id(&self) -> &str {
        &self.project_id
    }

    async fn get_resource(&self, path: &ResourcePath) -> crate::Result<Value> {
        let key = path.to_string();
        let mut state = self.state.lock();
        self.record(&mut state, CallKind::Get, key.clone(), None)?;

        let next_state = match path {
            ResourcePath::Job(job) => state
                .job_states
                .get_mut(&*job.job_id)
                .and_then(|states| match states.len() {
                    0 => None,
                    1 => states.front().copied(),
                    _ => states.pop_front(),
                }),
            _ => None,
        };

        let body = state
            .resources
            .get_mut(&key)
            .ok_or_else(|| Self::not_found(&key))?;

        if let Some(job_state) = next_state {
            set_job_state(body, job_state);
        }

        Ok(body.clone())
    }

    async fn list_resources(
        &self,
        parent: &ResourcePath,
        ty: ResourceType,
        page: PageRequest,
    ) -> crate::Result<ListResponse> {
        let prefix = format!("{parent}/{}/", ty.collection());
        let mut state = self.state.lock();
        self.record(&mut state, CallKind::List, prefix.clone(), None)?;

        let children = state
            .resources
            .iter()
            .filter(|(key, _)| {
                key.strip_prefix(&prefix)
                    .is_some_and(|rest| !rest.contains('/'))
            })
            .map(|(_, body)| project(body, partial_fields(ty)))
            .collect::<Vec<_>>();

        let (items, next_page_token) = paginate(&children, &page);
        Ok(ListResponse {
            items,
            next_page_token,
        })
    }

    async fn insert_resource(
        &self,
        parent: &ResourcePath,
        ty: ResourceType,
        mut body: Value,
    ) -> crate::Result<Value> {
        let mut state = self.state.lock();
        self.record(
            &mut state,
            CallKind::Insert,
            format!("{parent}/{}", ty.collection()),
            Some(body.clone()),
        )?;

        if ty == ResourceType::Job && body.get("jobReference").is_none() {
            state.job_counter += 1;
            body["jobReference"] = json!({
                "projectId": parent.project_id(),
                "jobId": format!("job_{}", state.job_counter),
            });
        }

        let id = body
            .get(ty.reference_key())
            .and_then(|reference| reference.get(ty.id_key()))
            .and_then(Value::as_str)
            .map(str::to_owned)
            .ok_or_else(|| Self::api_error(400, "missing resource reference"))?;

        let key = parent
            .child(ty, &id)
            .ok_or_else(|| Self::api_error(400, "invalid parent"))?
            .to_string();

        if state.resources.contains_key(&key) {
            return Err(Self::already_exists(&key));
        }

        body["etag"] = json!("e1");

        if ty == ResourceType::Job {
            let job_state = match state.job_states.get_mut(&id) {
                Some(states) if states.len() > 1 => states.pop_front(),
                Some(states) => states.front().copied(),
                None => None,
            };
            set_job_state(&mut body, job_state.unwrap_or(JobState::Done));
        }

        state.resources.insert(key, body.clone());
        Ok(body)
    }

    async fn patch_resource(&self, path: &ResourcePath, patch: PatchBody) -> crate::Result<Value> {
        let key = path.to_string();
        let mut guard = self.state.lock();
        let state = &mut *guard;
        self.record(state, CallKind::Patch, key.clone(), Some(patch.to_value()))?;

        let stored = state
            .resources
            .get_mut(&key)
            .ok_or_else(|| Self::not_found(&key))?;

        if let Some(ref etag) = patch.etag {
            if stored.get("etag").and_then(Value::as_str) != Some(&**etag) {
                return Err(Self::precondition_failed());
            }
        }

        if let Value::Object(map) = stored {
            for (field, value) in patch.fields {
                if value.is_null() {
                    map.remove(&field);
                } else {
                    map.insert(field, value);
                }
            }
        }

        bump_etag(stored);

        if let Some(ref transform) = state.patch_transform {
            transform(stored);
        }

        Ok(stored.clone())
    }

    async fn delete_resource(
        &self,
        path: &ResourcePath,
        options: DeleteOptions,
    ) -> crate::Result<()> {
        let key = path.to_string();
        let mut state = self.state.lock();
        self.record(&mut state, CallKind::Delete, key.clone(), None)?;

        if !state.resources.contains_key(&key) {
            return Err(Self::not_found(&key));
        }

        let prefix = format!("{key}/");
        let has_children = state.resources.keys().any(|k| k.starts_with(&prefix));
        if has_children && !options.delete_contents {
            return Err(ApiError::new(
                400,
                ErrorProto::new(format!("{key} is still in use")).with_reason("resourceInUse"),
            )
            .classify());
        }

        state
            .resources
            .retain(|k, _| k != &key && !k.starts_with(&prefix));
        Ok(())
    }

    async fn insert_table_data(
        &self,
        table: &TableReference,
        request: TableDataInsertAllRequest,
    ) -> crate::Result<TableDataInsertAllResponse> {
        let key = ResourcePath::Table(table.clone()).to_string();
        let mut state = self.state.lock();
        let body = serde_json::to_value(&request)?;
        self.record(&mut state, CallKind::InsertTableData, key.clone(), Some(body))?;

        if !state.resources.contains_key(&key) {
            return Err(Self::not_found(&format!("Table {table}")));
        }

        let insert_errors = state.insert_errors.pop_front().unwrap_or_default();
        let rows = state.rows.entry(key).or_default();
        for (index, row) in request.rows.into_iter().enumerate() {
            if !insert_errors.iter().any(|err| err.index == index) {
                rows.push(row.json);
            }
        }

        Ok(TableDataInsertAllResponse {
            kind: Some("bigquery#tableDataInsertAllResponse".into()),
            insert_errors,
        })
    }

    async fn list_table_data(
        &self,
        table: &TableReference,
        page: PageRequest,
    ) -> crate::Result<TableDataList> {
        let key = ResourcePath::Table(table.clone()).to_string();
        let mut state = self.state.lock();
        self.record(&mut state, CallKind::ListTableData, key.clone(), None)?;

        let stored = state
            .resources
            .get(&key)
            .ok_or_else(|| Self::not_found(&key))?;

        let schema: TableSchema = stored
            .get("schema")
            .cloned()
            .map(serde_json::from_value)
            .transpose()?
            .unwrap_or_default();

        let all_rows = state.rows.get(&key).cloned().unwrap_or_default();
        let (rows, page_token) = paginate(&all_rows, &page);

        Ok(TableDataList {
            etag: None,
            total_rows: Some(all_rows.len() as u64),
            page_token,
            rows: rows
                .iter()
                .map(|row| encode_row(&schema.fields, row))
                .collect(),
        })
    }

    async fn get_query_results(
        &self,
        job: &JobReference,
        page: PageRequest,
    ) -> crate::Result<GetQueryResultsResponse> {
        let key = ResourcePath::Job(job.clone()).to_string();
        let mut state = self.state.lock();
        self.record(&mut state, CallKind::GetQueryResults, key.clone(), None)?;

        let mut results = state
            .query_results
            .get(&*job.job_id)
            .cloned()
            .ok_or_else(|| Self::not_found(&key))?;

        let (rows, page_token) = paginate(&results.rows, &page);
        results.rows = rows;
        results.page_token = page_token;
        Ok(results)
    }

    async fn cancel_job(&self, job: &JobReference) -> crate::Result<Value> {
        let key = ResourcePath::Job(job.clone()).to_string();
        let mut state = self.state.lock();
        self.record(&mut state, CallKind::CancelJob, key.clone(), None)?;

        let stored = state
            .resources
            .get_mut(&key)
            .ok_or_else(|| Self::not_found(&key))?;

        set_job_state(stored, JobState::Done);
        Ok(stored.clone())
    }
}
