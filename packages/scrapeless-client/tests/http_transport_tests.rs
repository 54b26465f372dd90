use scrapeless_client::storage::{DatasetStore, DatasetStorage, PaginationParams};
use scrapeless_client::{ApiKey, ApiRequest, HttpTransport, ScrapelessError, Transport};
use serde_json::{json, Value};
use wiremock::matchers::{body_json, header, method, path, query_param};
use wiremock::{Mock, MockServer, ResponseTemplate};

fn transport(server: &MockServer) -> HttpTransport {
    HttpTransport::new(ApiKey::new("secret-key"), server.uri(), None, "test").unwrap()
}

#[tokio::test]
async fn test_sends_api_key_header() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/ping"))
        .and(header("X-API-Key", "secret-key"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"ok": true})))
        .expect(1)
        .mount(&server)
        .await;

    let reply = transport(&server).execute(ApiRequest::get("/ping")).await.unwrap();
    assert_eq!(reply.status, 200);
    assert_eq!(reply.body, json!({"ok": true}));
}

#[tokio::test]
async fn test_error_body_is_shaped_with_trace_id() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/api/v1/crawler/crawl"))
        .respond_with(
            ResponseTemplate::new(500).set_body_json(json!({"msg": "boom", "traceId": "t-1"})),
        )
        .mount(&server)
        .await;

    let err = transport(&server)
        .execute(ApiRequest::post("/api/v1/crawler/crawl").with_json_value(json!({"url": "x"})))
        .await
        .unwrap_err();
    match err {
        ScrapelessError::Api {
            status,
            message,
            trace_id,
        } => {
            assert_eq!(status, 500);
            assert_eq!(trace_id.as_deref(), Some("t-1"));
            assert!(message.starts_with("Request POST "));
            assert!(message.ends_with("boom (TraceID: t-1)"));
        }
        other => panic!("unexpected error: {other:?}"),
    }
}

#[tokio::test]
async fn test_business_code_overrides_status() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/limited"))
        .respond_with(ResponseTemplate::new(400).set_body_json(json!({"error": "slow down", "code": 429})))
        .mount(&server)
        .await;

    let err = transport(&server)
        .execute(ApiRequest::get("/limited"))
        .await
        .unwrap_err();
    assert_eq!(err.status_code(), 429);
}

#[tokio::test]
async fn test_non_json_body_is_kept_as_text() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/page"))
        .respond_with(ResponseTemplate::new(200).set_body_string("<html>hi</html>"))
        .mount(&server)
        .await;

    let reply = transport(&server).execute(ApiRequest::get("/page")).await.unwrap();
    assert_eq!(reply.body, Value::String("<html>hi</html>".into()));
}

#[tokio::test]
async fn test_dataset_items_over_http() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/api/v1/dataset/d1/items"))
        .and(query_param("page", "2"))
        .and(query_param("pageSize", "50"))
        .and(query_param("desc", "1"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "data": {"items": [{"title": "a"}], "total": 51, "totalPage": 2, "page": 2, "pageSize": 50}
        })))
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path("/api/v1/dataset/d1/items"))
        .and(body_json(json!({"items": [{"title": "b"}]})))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"data": {"success": true}})))
        .expect(1)
        .mount(&server)
        .await;

    let datasets = DatasetStorage::new(transport(&server).shared());
    let page = datasets
        .get_items("d1", &PaginationParams::new(2, 50).descending(true))
        .await
        .unwrap();
    assert_eq!(page.items, vec![json!({"title": "a"})]);
    assert_eq!(page.total, 51);

    let added = datasets.add_items("d1", &[json!({"title": "b"})]).await.unwrap();
    assert!(added.success);
}
