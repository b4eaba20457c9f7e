//! Drives the REST transport against a local mock of the BigQuery v2 API.
use std::sync::Arc;

use bigquery_sdk_rs::service::{PageRequest, RestService, StaticToken};
use bigquery_sdk_rs::{ClientConfig, Error, Project, ReadableResource};
use serde_json::json;
use wiremock::matchers::{bearer_token, body_json, header, method, path, query_param};
use wiremock::{Mock, MockServer, ResponseTemplate};

const TABLE_PATH: &str = "/projects/p/datasets/d/tables/t";

async fn project(server: &MockServer) -> Project {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();

    let config = ClientConfig::builder().base_url(server.uri()).build();
    let auth = StaticToken::new("test-token").unwrap();
    let service = RestService::new("p", Arc::new(auth), &config).unwrap();
    Project::new(Arc::new(service), config)
}

fn table_body(etag: &str, description: &str) -> serde_json::Value {
    json!({
        "kind": "bigquery#table",
        "id": "p:d.t",
        "etag": etag,
        "tableReference": { "projectId": "p", "datasetId": "d", "tableId": "t" },
        "type": "TABLE",
        "description": description,
        "numRows": "12"
    })
}

#[tokio::test]
async fn test_patch_sends_etag_precondition() -> bigquery_sdk_rs::Result<()> {
    let server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path(TABLE_PATH))
        .and(bearer_token("test-token"))
        .respond_with(ResponseTemplate::new(200).set_body_json(table_body("abc", "old")))
        .expect(1)
        .mount(&server)
        .await;

    Mock::given(method("PATCH"))
        .and(path(TABLE_PATH))
        .and(header("if-match", "abc"))
        .and(body_json(json!({ "description": "new", "etag": "abc" })))
        .respond_with(ResponseTemplate::new(200).set_body_json(table_body("def", "new")))
        .expect(1)
        .mount(&server)
        .await;

    let project = project(&server).await;
    let mut table = project.dataset_reference("d")?.table_reference("t")?;
    assert!(table.is_reference());

    table.set_description(Some("new")).await?;

    assert_eq!(table.description().await?, Some("new"));
    assert_eq!(table.etag().await?, Some("def"));
    assert_eq!(table.rows_count().await?, Some(12));
    Ok(())
}

#[tokio::test]
async fn test_stale_etag_is_precondition_failed() -> bigquery_sdk_rs::Result<()> {
    let server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path(TABLE_PATH))
        .respond_with(ResponseTemplate::new(200).set_body_json(table_body("abc", "old")))
        .mount(&server)
        .await;

    Mock::given(method("PATCH"))
        .and(path(TABLE_PATH))
        .respond_with(ResponseTemplate::new(412).set_body_json(json!({
            "error": {
                "code": 412,
                "message": "Precondition check failed.",
                "errors": [{ "message": "Precondition check failed.", "reason": "conditionNotMet" }],
                "status": "FAILED_PRECONDITION"
            }
        })))
        .expect(1)
        .mount(&server)
        .await;

    let project = project(&server).await;
    let mut table = project.dataset_reference("d")?.table_reference("t")?;

    let err = table.set_description(Some("new")).await.unwrap_err();
    assert!(err.is_precondition_failed(), "{err}");
    Ok(())
}

#[tokio::test]
async fn test_missing_dataset_lookup_is_none() -> bigquery_sdk_rs::Result<()> {
    let server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/projects/p/datasets/gone"))
        .respond_with(ResponseTemplate::new(404).set_body_json(json!({
            "error": {
                "code": 404,
                "message": "Not found: Dataset p:gone",
                "errors": [{ "message": "Not found: Dataset p:gone", "reason": "notFound" }]
            }
        })))
        .mount(&server)
        .await;

    Mock::given(method("GET"))
        .and(path("/projects/p/datasets/denied"))
        .respond_with(ResponseTemplate::new(403).set_body_string("Forbidden"))
        .mount(&server)
        .await;

    let project = project(&server).await;
    assert!(project.dataset("gone").await?.is_none());

    match project.dataset("denied").await {
        Err(Error::Api(api)) => assert_eq!(api.status, 403),
        other => panic!("expected an api error, got {other:?}"),
    }
    Ok(())
}

#[tokio::test]
async fn test_dataset_pages_follow_token() -> bigquery_sdk_rs::Result<()> {
    let server = MockServer::start().await;

    let dataset = |id: &str| {
        json!({
            "kind": "bigquery#dataset",
            "id": format!("p:{id}"),
            "datasetReference": { "projectId": "p", "datasetId": id },
            "location": "US"
        })
    };

    Mock::given(method("GET"))
        .and(path("/projects/p/datasets"))
        .and(query_param("pageToken", "next"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "datasets": [dataset("c")]
        })))
        .mount(&server)
        .await;

    Mock::given(method("GET"))
        .and(path("/projects/p/datasets"))
        .and(query_param("maxResults", "2"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "datasets": [dataset("a"), dataset("b")],
            "nextPageToken": "next"
        })))
        .mount(&server)
        .await;

    let project = project(&server).await;
    let first = project.datasets(PageRequest::max(2)).await?;
    assert_eq!(first.len(), 2);
    assert_eq!(first.token(), Some("next"));
    assert!(first.items().iter().all(|dataset| dataset.is_partial()));

    let second = first.next().await?.expect("a second page");
    assert_eq!(second.items()[0].dataset_id(), "c");
    assert!(!second.has_next());
    Ok(())
}
