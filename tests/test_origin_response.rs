// Integration tests for the origin-response stage

use async_trait::async_trait;
use exodus_edge::{
    BackendConnector, CloudFrontEvent, EdgeConfig, EdgeMetrics, EdgeService, OriginResponseHandler,
    Request, Response, TableBackend,
};
use prometheus::Registry;
use serde_json::json;
use std::sync::Arc;

const OBJECT_URI: &str = "/be7f3007df3e51fb48fff57da9c01c52e6b8e60eceacab7aaf0e05b57578493a";
const OBJECT_SUM: &str = "vn8wB98+UftI//V9qcAcUua45g7OrKt6rw4FtXV4STo=";

/// The response stage never queries tables
struct NoTables;

#[async_trait]
impl BackendConnector for NoTables {
    async fn connect(&self, region: &str) -> anyhow::Result<Arc<dyn TableBackend>> {
        anyhow::bail!("unexpected connection to {}", region)
    }
}

fn handler() -> OriginResponseHandler {
    let mut config = EdgeConfig::default();
    config.lambda_version = "fake version".to_string();
    OriginResponseHandler::new(Arc::new(config))
}

fn storage_response() -> Response {
    serde_json::from_value(json!({
        "status": "200",
        "statusDescription": "OK",
        "headers": {
            "content-type": [{"key": "Content-Type", "value": "text/xml"}],
            "x-amz-meta-foo": [{"key": "X-Amz-Meta-Foo", "value": "bar"}],
            "x-amz-version-id": [{"key": "X-Amz-Version-Id", "value": "v1"}],
            "x-amz-server-side-encryption": [{"key": "X-Amz-Server-Side-Encryption", "value": "AES256"}],
            "etag": [{"key": "ETag", "value": "\"abc\""}]
        }
    }))
    .unwrap()
}

#[test]
fn test_cache_control_for_original_uri() {
    let request = Request::new(OBJECT_URI).with_header(
        "exodus-original-uri",
        "/content/dist/rhel/server/7/7Server/x86_64/os/repodata/repomd.xml",
    );

    let response = handler().handle(&request, storage_response());

    assert_eq!(
        serde_json::to_value(response.headers.get("cache-control").unwrap()).unwrap(),
        json!([{"key": "Cache-Control", "value": "max-age=600"}])
    );
}

#[test]
fn test_no_cache_control_without_original_uri() {
    let response = handler().handle(&Request::new(OBJECT_URI), storage_response());
    assert!(!response.headers.contains("cache-control"));

    let request = Request::new(OBJECT_URI).with_header("exodus-original-uri", "/some/file.rpm");
    let response = handler().handle(&request, storage_response());
    assert!(!response.headers.contains("cache-control"));
}

#[test]
fn test_storage_headers_stripped() {
    let response = handler().handle(&Request::new(OBJECT_URI), storage_response());

    let names: Vec<_> = response.headers.names().collect();
    assert_eq!(names, vec!["content-type", "etag"]);
    assert_eq!(response.status.as_deref(), Some("200"));
}

#[test]
fn test_digest_headers() {
    let request = Request::new(OBJECT_URI)
        .with_header("want-digest", "id-sha-256")
        .with_header("want-repr-digest", "sha-256=1");

    let response = handler().handle(&request, storage_response());

    assert_eq!(
        serde_json::to_value(response.headers.get("digest").unwrap()).unwrap(),
        json!([{"key": "Digest", "value": format!("id-sha-256={}", OBJECT_SUM)}])
    );
    assert_eq!(
        response.headers.first_value("repr-digest"),
        Some(format!("sha-256=:{}:", OBJECT_SUM).as_str())
    );
}

#[test]
fn test_version_stamp() {
    let request = Request::new(OBJECT_URI).with_header("x-exodus-query", "true");
    let response = handler().handle(&request, storage_response());
    assert_eq!(response.headers.first_value("x-exodus-version"), Some("fake version"));

    let response = handler().handle(&Request::new(OBJECT_URI), storage_response());
    assert!(!response.headers.contains("x-exodus-version"));
}

#[tokio::test]
async fn test_dispatch_origin_response_event() {
    let metrics = EdgeMetrics::with_registry(&Registry::new()).unwrap();
    let service = EdgeService::new(EdgeConfig::default(), Arc::new(NoTables), metrics);

    let event = CloudFrontEvent::from_json(
        &json!({
            "Records": [{"cf": {
                "request": {
                    "uri": OBJECT_URI,
                    "headers": {
                        "want-digest": [{"key": "Want-Digest", "value": "id-sha-256"}],
                        "exodus-original-uri": [{"key": "exodus-original-uri", "value": "/some/repo/PULP_MANIFEST"}]
                    }
                },
                "response": {"status": "200", "statusDescription": "OK", "headers": {}}
            }}]
        })
        .to_string(),
    )
    .unwrap();

    let output = service.dispatch(event).await.unwrap();

    assert_eq!(
        output,
        json!({
            "status": "200",
            "statusDescription": "OK",
            "headers": {
                "cache-control": [{"key": "Cache-Control", "value": "max-age=600"}],
                "digest": [{"key": "Digest", "value": format!("id-sha-256={}", OBJECT_SUM)}]
            }
        })
    );
}

#[tokio::test]
async fn test_empty_response_event() {
    let metrics = EdgeMetrics::with_registry(&Registry::new()).unwrap();
    let service = EdgeService::new(EdgeConfig::default(), Arc::new(NoTables), metrics);

    let event = CloudFrontEvent::origin_response(Request::new(OBJECT_URI), Response::default());
    let output = service.dispatch(event).await.unwrap();

    assert_eq!(output, json!({}));
}
