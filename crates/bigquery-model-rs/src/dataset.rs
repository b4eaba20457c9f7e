use std::collections::HashMap;

use time::OffsetDateTime;

use crate::{DatasetReference, RoutineReference, TableReference, util};

#[derive(Debug, Clone, Default, PartialEq, serde::Deserialize, serde::Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Dataset {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub kind: Option<Box<str>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub etag: Option<Box<str>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub id: Option<Box<str>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub self_link: Option<Box<str>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub dataset_reference: Option<DatasetReference>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub friendly_name: Option<Box<str>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<Box<str>>,
    #[serde(
        default,
        skip_serializing_if = "Option::is_none",
        with = "util::int64::optional"
    )]
    pub default_table_expiration_ms: Option<i64>,
    #[serde(
        default,
        skip_serializing_if = "Option::is_none",
        with = "util::int64::optional"
    )]
    pub default_partition_expiration_ms: Option<i64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub labels: Option<HashMap<String, String>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub access: Option<Vec<AccessEntry>>,
    #[serde(
        default,
        skip_serializing_if = "Option::is_none",
        with = "util::timestamp_ms::optional"
    )]
    pub creation_time: Option<OffsetDateTime>,
    #[serde(
        default,
        skip_serializing_if = "Option::is_none",
        with = "util::timestamp_ms::optional"
    )]
    pub last_modified_time: Option<OffsetDateTime>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub location: Option<Box<str>>,
}

impl Dataset {
    pub fn new(dataset_reference: DatasetReference) -> Self {
        Self {
            dataset_reference: Some(dataset_reference),
            ..Default::default()
        }
    }
}

/// A single rule in a dataset's access control list.
///
/// Exactly one of the grantee fields is expected to be set. `role` is absent
/// for authorized views, routines and datasets.
#[derive(Debug, Clone, Default, PartialEq, Eq, serde::Deserialize, serde::Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AccessEntry {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub role: Option<Box<str>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub user_by_email: Option<Box<str>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub group_by_email: Option<Box<str>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub domain: Option<Box<str>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub special_group: Option<Box<str>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub iam_member: Option<Box<str>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub view: Option<TableReference>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub routine: Option<RoutineReference>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub dataset: Option<DatasetAccessEntry>,
}

#[derive(Debug, Clone, PartialEq, Eq, serde::Deserialize, serde::Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DatasetAccessEntry {
    pub dataset: DatasetReference,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub target_types: Vec<Box<str>>,
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    #[test]
    fn test_dataset_deserialize() {
        let dataset: Dataset = serde_json::from_value(json!({
            "kind": "bigquery#dataset",
            "etag": "etag123",
            "id": "proj:main",
            "datasetReference": { "projectId": "proj", "datasetId": "main" },
            "friendlyName": "Main",
            "defaultTableExpirationMs": "3600000",
            "labels": { "env": "prod" },
            "access": [
                { "role": "OWNER", "specialGroup": "projectOwners" },
                { "view": { "projectId": "proj", "datasetId": "main", "tableId": "v" } }
            ],
            "creationTime": "1718236800457",
            "location": "US"
        }))
        .unwrap();

        assert_eq!(dataset.default_table_expiration_ms, Some(3_600_000));
        assert_eq!(dataset.access.as_ref().map(Vec::len), Some(2));
        assert_eq!(
            dataset.dataset_reference,
            Some(DatasetReference::new("proj", "main"))
        );
        assert_eq!(dataset.labels.unwrap()["env"], "prod");
    }

    #[test]
    fn test_empty_dataset_serializes_to_empty_object() {
        assert_eq!(serde_json::to_value(Dataset::default()).unwrap(), json!({}));
    }
}
