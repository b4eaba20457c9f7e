//! Trained ML models. Models are created by `CREATE MODEL` queries, so there
//! is no insert here, only reads, metadata patches and deletion.
use std::collections::HashMap;

use bigquery_model_rs::ModelReference;
use bigquery_model_rs::model::Model as ModelBody;
use serde_json::Value;
use time::OffsetDateTime;

use crate::Client;
use crate::list::ListItem;
use crate::path::{ResourcePath, ResourceType};
use crate::resource::{
    Fidelity, ReadableResource, ResourceKind, ResourceState, accessors, attributes,
};
use crate::service::DeleteOptions;

#[derive(Debug, Clone, Copy)]
pub enum ModelKind {}

attributes! {
    pub enum ModelAttr {
        FriendlyName => "friendlyName",
        Description => "description",
        Labels => "labels",
        ExpirationTime => "expirationTime",
    }
}

impl ResourceKind for ModelKind {
    type Reference = ModelReference;
    type Body = ModelBody;
    type Attr = ModelAttr;

    const NAME: &'static str = "model";

    fn path(reference: &ModelReference) -> ResourcePath {
        ResourcePath::Model(reference.clone())
    }

    fn reference_of(body: &ModelBody) -> Option<&ModelReference> {
        body.model_reference.as_ref()
    }

    fn etag_of(body: &ModelBody) -> Option<&str> {
        body.etag.as_deref()
    }
}

#[derive(Debug)]
pub struct Model {
    state: ResourceState<ModelKind>,
}

impl ReadableResource for Model {
    type Kind = ModelKind;

    fn state(&self) -> &ResourceState<ModelKind> {
        &self.state
    }

    fn state_mut(&mut self) -> &mut ResourceState<ModelKind> {
        &mut self.state
    }
}

impl ListItem for Model {
    const TYPE: ResourceType = ResourceType::Model;

    fn from_partial(client: Client, value: Value) -> crate::Result<Self> {
        ResourceState::from_json(client, value, Fidelity::Partial).map(|state| Self { state })
    }
}

impl Model {
    pub(crate) fn new_reference(client: Client, reference: ModelReference) -> crate::Result<Self> {
        ResourceState::new_reference(client, reference).map(|state| Self { state })
    }

    pub fn model_ref(&self) -> &ModelReference {
        self.state.reference()
    }

    pub fn model_id(&self) -> &str {
        &self.model_ref().model_id
    }

    pub fn dataset_id(&self) -> &str {
        &self.model_ref().dataset_id
    }

    pub fn project_id(&self) -> &str {
        &self.model_ref().project_id
    }

    pub fn body(&self) -> Option<&ModelBody> {
        self.state.body()
    }

    accessors! { ensure_resource;
        etag -> Option<&str> = |body| body.etag.as_deref();
        /// i.e `LINEAR_REGRESSION` or `KMEANS`.
        model_type -> Option<&str> = |body| body.model_type.as_deref();
        labels -> Option<&HashMap<String, String>> = |body| body.labels.as_ref();
        created_at -> Option<OffsetDateTime> = |body| body.creation_time;
        modified_at -> Option<OffsetDateTime> = |body| body.last_modified_time;
    }

    accessors! { ensure_full;
        name -> Option<&str> = |body| body.friendly_name.as_deref();
        description -> Option<&str> = |body| body.description.as_deref();
        location -> Option<&str> = |body| body.location.as_deref();
        expires_at -> Option<OffsetDateTime> = |body| body.expiration_time;
        training_runs -> &[Value] = |body| body.training_runs.as_deref().unwrap_or_default();
        feature_columns -> &[Value] = |body| body.feature_columns.as_deref().unwrap_or_default();
    }

    pub async fn set_name(&mut self, name: Option<&str>) -> crate::Result<()> {
        let name = name.map(Box::from);
        self.state
            .set(ModelAttr::FriendlyName, |body| body.friendly_name = name)
            .await
    }

    pub async fn set_description(&mut self, description: Option<&str>) -> crate::Result<()> {
        let description = description.map(Box::from);
        self.state
            .set(ModelAttr::Description, |body| body.description = description)
            .await
    }

    pub async fn set_labels(&mut self, labels: HashMap<String, String>) -> crate::Result<()> {
        self.state
            .set(ModelAttr::Labels, |body| body.labels = Some(labels))
            .await
    }

    pub async fn set_expires_at(&mut self, expires_at: Option<OffsetDateTime>) -> crate::Result<()> {
        self.state
            .set(ModelAttr::ExpirationTime, |body| body.expiration_time = expires_at)
            .await
    }

    pub async fn delete(&mut self) -> crate::Result<()> {
        self.state.delete(DeleteOptions::default()).await
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use bigquery_model_rs::DatasetReference;
    use serde_json::json;

    use super::*;
    use crate::ClientConfig;
    use crate::list::Page;
    use crate::service::PageRequest;
    use crate::service::mock::{CallKind, MockService};

    #[tokio::test]
    async fn test_listed_model_upgrades_for_full_fields() -> crate::Result<()> {
        let mock = Arc::new(MockService::new("p"));
        let dataset = DatasetReference::new("p", "d");
        mock.put(
            dataset.model("churn"),
            json!({
                "modelReference": { "projectId": "p", "datasetId": "d", "modelId": "churn" },
                "modelType": "LOGISTIC_REGRESSION",
                "friendlyName": "Churn",
                "location": "US",
                "trainingRuns": [{ "startTime": "2024-01-01T00:00:00Z" }]
            }),
        );

        let client = Client::new(mock.clone(), ClientConfig::default());
        let page: Page<Model> =
            Page::fetch(&client, ResourcePath::Dataset(dataset), PageRequest::default()).await?;
        let mut model = page.into_items().remove(0);

        assert!(model.is_partial());
        assert_eq!(model.model_type().await?, Some("LOGISTIC_REGRESSION"));
        assert_eq!(mock.count(CallKind::Get), 0);

        assert_eq!(model.name().await?, Some("Churn"));
        assert_eq!(model.training_runs().await?.len(), 1);
        assert_eq!(mock.count(CallKind::Get), 1);

        model.set_description(Some("weekly churn")).await?;
        assert_eq!(
            mock.last_body(CallKind::Patch),
            Some(json!({ "description": "weekly churn", "etag": "e1" }))
        );
        assert_eq!(model.etag().await?, Some("e2"));
        Ok(())
    }
}
