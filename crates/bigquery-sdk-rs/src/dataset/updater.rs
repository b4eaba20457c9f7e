use std::collections::HashMap;

use bigquery_model_rs::DatasetReference;
use bigquery_model_rs::dataset::Dataset as DatasetBody;

use super::{Access, DatasetAttr, DatasetKind};
use crate::resource::{ResourceBuilder, SubResource, Tracked, Updater};

/// Batched changes to a dataset, used by `create_dataset` and
/// [`Dataset::update`](super::Dataset::update).
#[derive(Debug, Clone)]
pub struct DatasetUpdater {
    inner: Updater<DatasetKind>,
    access: Option<Access>,
    labels: Option<Tracked<HashMap<String, String>>>,
}

impl DatasetUpdater {
    pub(crate) fn new(inner: Updater<DatasetKind>) -> Self {
        Self {
            inner,
            access: None,
            labels: None,
        }
    }

    pub fn dataset_ref(&self) -> &DatasetReference {
        self.inner.reference()
    }

    pub fn dataset_id(&self) -> &str {
        &self.dataset_ref().dataset_id
    }

    pub fn body(&self) -> &DatasetBody {
        self.inner.body()
    }

    pub fn set_name(&mut self, name: impl Into<Box<str>>) {
        let name = name.into();
        self.inner
            .set(DatasetAttr::FriendlyName, |body| body.friendly_name = Some(name));
    }

    pub fn set_description(&mut self, description: impl Into<Box<str>>) {
        let description = description.into();
        self.inner
            .set(DatasetAttr::Description, |body| body.description = Some(description));
    }

    /// Milliseconds until new tables expire. `None` keeps them forever.
    pub fn set_default_expiration(&mut self, expiration_ms: Option<i64>) {
        self.inner.set(DatasetAttr::DefaultTableExpirationMs, |body| {
            body.default_table_expiration_ms = expiration_ms
        });
    }

    /// Where the dataset's data lives. The location of an existing dataset
    /// can't change, so this is only sent on creation.
    pub fn set_location(&mut self, location: impl Into<Box<str>>) {
        self.inner.body_mut().location = Some(location.into());
    }

    pub fn set_labels(&mut self, labels: HashMap<String, String>) {
        self.labels = None;
        self.inner
            .set(DatasetAttr::Labels, |body| body.labels = Some(labels));
    }

    /// Labels for in-place editing, sent only if they end up different.
    pub fn labels(&mut self) -> &mut HashMap<String, String> {
        let current = &self.inner.body().labels;
        self.labels
            .get_or_insert_with(|| Tracked::new(current.clone().unwrap_or_default()))
            .get_mut()
    }

    /// The access rules, seeded from the current ones.
    pub fn access(&mut self) -> &mut Access {
        let body = self.inner.body();
        let reference = self.inner.reference();
        self.access.get_or_insert_with(|| {
            Access::new(reference.clone(), body.access.clone().unwrap_or_default())
        })
    }

    pub fn has_changes(&self) -> bool {
        self.inner.has_changes()
            || self.access.as_ref().is_some_and(SubResource::changed)
            || self.labels.as_ref().is_some_and(SubResource::changed)
    }
}

impl ResourceBuilder for DatasetUpdater {
    type Kind = DatasetKind;

    fn has_changes(&self) -> bool {
        DatasetUpdater::has_changes(self)
    }

    fn into_updater(self) -> Updater<DatasetKind> {
        let Self {
            mut inner,
            access,
            labels,
        } = self;

        if let Some(access) = access.filter(SubResource::changed) {
            inner.set(DatasetAttr::Access, |body| body.access = Some(access.into_rules()));
        }

        if let Some(labels) = labels.filter(SubResource::changed) {
            inner.set(DatasetAttr::Labels, |body| body.labels = Some(labels.into_inner()));
        }

        inner
    }
}
