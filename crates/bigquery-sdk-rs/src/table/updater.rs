use std::collections::HashMap;

use bigquery_model_rs::TableReference;
use bigquery_model_rs::table::{
    Clustering, RangePartition, RangePartitioning, Table as TableBody, TimePartitioning,
    TimePartitioningType, ViewDefinition,
};
use time::OffsetDateTime;

use super::{SchemaBuilder, TableAttr, TableKind};
use crate::resource::{ResourceBuilder, SubResource, Tracked, Updater};

/// Batched changes to a table, used by `create_table`, `create_view` and
/// [`Table::update`](super::Table::update). Nothing is sent until the
/// surrounding call returns.
#[derive(Debug, Clone)]
pub struct TableUpdater {
    inner: Updater<TableKind>,
    schema: Option<SchemaBuilder>,
    labels: Option<Tracked<HashMap<String, String>>>,
}

impl TableUpdater {
    pub(crate) fn new(inner: Updater<TableKind>) -> Self {
        Self {
            inner,
            schema: None,
            labels: None,
        }
    }

    pub fn table_ref(&self) -> &TableReference {
        self.inner.reference()
    }

    pub fn table_id(&self) -> &str {
        &self.table_ref().table_id
    }

    /// The body as it will be sent, minus unmerged schema and label changes.
    pub fn body(&self) -> &TableBody {
        self.inner.body()
    }

    pub fn set_name(&mut self, name: impl Into<Box<str>>) {
        let name = name.into();
        self.inner
            .set(TableAttr::FriendlyName, |body| body.friendly_name = Some(name));
    }

    pub fn set_description(&mut self, description: impl Into<Box<str>>) {
        let description = description.into();
        self.inner
            .set(TableAttr::Description, |body| body.description = Some(description));
    }

    pub fn set_expires_at(&mut self, expires_at: Option<OffsetDateTime>) {
        self.inner
            .set(TableAttr::ExpirationTime, |body| body.expiration_time = expires_at);
    }

    /// Replaces every label. See [`labels`](Self::labels) for in-place edits.
    pub fn set_labels(&mut self, labels: HashMap<String, String>) {
        self.labels = None;
        self.inner
            .set(TableAttr::Labels, |body| body.labels = Some(labels));
    }

    /// Labels for in-place editing, sent only if they end up different.
    pub fn labels(&mut self) -> &mut HashMap<String, String> {
        let current = &self.inner.body().labels;
        self.labels
            .get_or_insert_with(|| Tracked::new(current.clone().unwrap_or_default()))
            .get_mut()
    }

    /// The schema, seeded from the current one, for in-place editing.
    pub fn schema(&mut self) -> &mut SchemaBuilder {
        let current = &self.inner.body().schema;
        self.schema.get_or_insert_with(|| {
            SchemaBuilder::from_schema(current.clone().unwrap_or_default())
        })
    }

    pub fn set_time_partitioning(
        &mut self,
        ty: TimePartitioningType,
        field: Option<&str>,
        expiration_ms: Option<i64>,
    ) {
        let partitioning = TimePartitioning {
            ty,
            expiration_ms,
            field: field.map(Box::from),
        };

        self.inner.set(TableAttr::TimePartitioning, |body| {
            body.time_partitioning = Some(partitioning)
        });
    }

    pub fn set_range_partitioning(&mut self, field: &str, start: i64, end: i64, interval: i64) {
        let partitioning = RangePartitioning {
            field: field.into(),
            range: RangePartition {
                start,
                end,
                interval,
            },
        };

        self.inner.set(TableAttr::RangePartitioning, |body| {
            body.range_partitioning = Some(partitioning)
        });
    }

    /// Up to four fields. An empty list removes clustering.
    pub fn set_clustering<I>(&mut self, fields: I)
    where
        I: IntoIterator,
        I::Item: Into<Box<str>>,
    {
        let fields = fields.into_iter().map(Into::into).collect::<Vec<_>>();
        let clustering = (!fields.is_empty()).then_some(Clustering { fields });

        self.inner
            .set(TableAttr::Clustering, |body| body.clustering = clustering);
    }

    pub fn set_require_partition_filter(&mut self, required: bool) {
        self.inner.set(TableAttr::RequirePartitionFilter, |body| {
            body.require_partition_filter = Some(required)
        });
    }

    /// Turns the table into a view over `query`, in standard SQL unless
    /// `legacy_sql`.
    pub fn set_view_query(&mut self, query: impl Into<Box<str>>, legacy_sql: bool) {
        let view = ViewDefinition {
            query: query.into(),
            use_legacy_sql: Some(legacy_sql),
        };

        self.inner.set(TableAttr::View, |body| body.view = Some(view));
    }

    pub fn has_changes(&self) -> bool {
        self.inner.has_changes()
            || self.schema.as_ref().is_some_and(SubResource::changed)
            || self.labels.as_ref().is_some_and(SubResource::changed)
    }
}

impl ResourceBuilder for TableUpdater {
    type Kind = TableKind;

    fn has_changes(&self) -> bool {
        TableUpdater::has_changes(self)
    }

    fn into_updater(self) -> Updater<TableKind> {
        let Self {
            mut inner,
            schema,
            labels,
        } = self;

        if let Some(schema) = schema.filter(SubResource::changed) {
            inner.set(TableAttr::Schema, |body| body.schema = Some(schema.into_schema()));
        }

        if let Some(labels) = labels.filter(SubResource::changed) {
            inner.set(TableAttr::Labels, |body| body.labels = Some(labels.into_inner()));
        }

        inner
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    fn updater() -> TableUpdater {
        TableUpdater::new(Updater::for_insert(TableReference::new("p", "d", "t")).unwrap())
    }

    #[test]
    fn test_sub_objects_merge_only_when_changed() -> crate::Result<()> {
        let mut table = updater();
        assert!(!table.has_changes());

        // reading through the shared view does not count
        assert!(table.schema().is_empty());
        assert!(table.labels().get("env").is_none());
        assert!(!table.has_changes());

        table.schema().string("name").required();
        table.labels().insert("env".into(), "prod".into());
        assert!(table.has_changes());

        let updater = table.into_updater();
        let patch = updater.to_patch_body()?;
        assert_eq!(
            patch.to_value(),
            json!({
                "schema": { "fields": [{ "name": "name", "type": "STRING", "mode": "REQUIRED" }] },
                "labels": { "env": "prod" }
            })
        );
        Ok(())
    }

    #[test]
    fn test_view_and_partitioning() -> crate::Result<()> {
        let mut table = updater();
        table.set_view_query("SELECT 1", false);
        table.set_time_partitioning(TimePartitioningType::Day, Some("ts"), None);
        table.set_clustering(["a", "b"]);

        let body = table.into_updater().to_insert_body()?;
        assert_eq!(body["view"], json!({ "query": "SELECT 1", "useLegacySql": false }));
        assert_eq!(body["timePartitioning"], json!({ "type": "DAY", "field": "ts" }));
        assert_eq!(body["clustering"], json!({ "fields": ["a", "b"] }));
        Ok(())
    }
}
