use axum::extract::State;
use axum::http::{HeaderMap, Method, StatusCode, Uri};
use axum::response::{IntoResponse, Response};
use axum::{Json, Router};
use hub_analytics::storage::bucket::{
    Bucket, BucketApi, BucketApiError, BucketProvisioner, Organization,
};
use hub_analytics::storage::influx_http::InfluxHttpClient;
use hub_analytics::storage::write_bridge::{LineSink, SinkError};
use serde_json::{json, Value};
use std::collections::HashMap;
use std::sync::{Arc, Mutex};

#[derive(Debug, Clone)]
struct Seen {
    method: Method,
    path: String,
    query: HashMap<String, String>,
    authorization: Option<String>,
    content_type: Option<String>,
    body: String,
}

/// Stand-in for the InfluxDB v2 HTTP API that records every request.
#[derive(Clone, Default)]
struct FakeInflux {
    seen: Arc<Mutex<Vec<Seen>>>,
    bucket_exists: bool,
    orgs_failure: Option<StatusCode>,
    write_failure: Option<StatusCode>,
}

impl FakeInflux {
    fn requests(&self) -> Vec<Seen> {
        self.seen.lock().unwrap().clone()
    }
}

fn header(headers: &HeaderMap, name: &str) -> Option<String> {
    headers.get(name).and_then(|v| v.to_str().ok()).map(str::to_string)
}

async fn handle(
    State(fake): State<FakeInflux>,
    method: Method,
    uri: Uri,
    headers: HeaderMap,
    body: String,
) -> Response {
    let query: HashMap<String, String> = uri
        .query()
        .map(|q| {
            reqwest::Url::parse(&format!("http://fake/?{}", q))
                .unwrap()
                .query_pairs()
                .into_owned()
                .collect()
        })
        .unwrap_or_default();
    fake.seen.lock().unwrap().push(Seen {
        method: method.clone(),
        path: uri.path().to_string(),
        query,
        authorization: header(&headers, "authorization"),
        content_type: header(&headers, "content-type"),
        body: body.clone(),
    });

    match (method, uri.path()) {
        (Method::GET, "/api/v2/buckets") if fake.bucket_exists => Json(json!({
            "buckets": [{ "id": "b-1", "name": "analytics", "orgID": "org-1", "type": "user" }]
        }))
        .into_response(),
        (Method::GET, "/api/v2/buckets") => {
            (StatusCode::NOT_FOUND, Json(json!({ "message": "bucket not found" }))).into_response()
        }
        (Method::GET, "/api/v2/orgs") => match fake.orgs_failure {
            Some(status) => (status, "org service unavailable").into_response(),
            None => Json(json!({ "orgs": [{ "id": "org-1", "name": "hub" }] })).into_response(),
        },
        (Method::POST, "/api/v2/buckets") => {
            let request: Value = serde_json::from_str(&body).unwrap();
            let created = json!({ "id": "b-new", "name": request["name"], "orgID": request["orgID"] });
            (StatusCode::CREATED, Json(created)).into_response()
        }
        (Method::POST, "/api/v2/write") => match fake.write_failure {
            Some(status) => (status, "partial write: field type conflict").into_response(),
            None => StatusCode::NO_CONTENT.into_response(),
        },
        _ => StatusCode::NOT_FOUND.into_response(),
    }
}

async fn serve(fake: FakeInflux) -> InfluxHttpClient {
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let app = Router::new().fallback(handle).with_state(fake);
    tokio::spawn(async move { axum::serve(listener, app).await.unwrap() });
    InfluxHttpClient::new(&format!("http://{}/", addr), "secret")
}

#[tokio::test]
async fn test_write_posts_line_protocol() {
    let fake = FakeInflux::default();
    let sink = serve(fake.clone()).await.line_sink("hub", "analytics");

    sink.write_lines("visits,organization_id=o1 n=1u 1".to_string()).await.unwrap();

    let requests = fake.requests();
    assert_eq!(requests.len(), 1);
    let write = &requests[0];
    assert_eq!(write.method, Method::POST);
    assert_eq!(write.path, "/api/v2/write");
    assert_eq!(write.query.get("org").map(String::as_str), Some("hub"));
    assert_eq!(write.query.get("bucket").map(String::as_str), Some("analytics"));
    assert_eq!(write.query.get("precision").map(String::as_str), Some("ns"));
    assert_eq!(write.authorization.as_deref(), Some("Token secret"));
    assert_eq!(write.content_type.as_deref(), Some("text/plain; charset=utf-8"));
    assert_eq!(write.body, "visits,organization_id=o1 n=1u 1");
}

#[tokio::test]
async fn test_rejected_write_keeps_status_and_body() {
    let fake = FakeInflux { write_failure: Some(StatusCode::BAD_REQUEST), ..Default::default() };
    let sink = serve(fake).await.line_sink("hub", "analytics");

    let err = sink.write_lines("bad".to_string()).await.unwrap_err();
    assert_eq!(
        err,
        SinkError::Rejected { status: 400, body: "partial write: field type conflict".into() }
    );
}

#[tokio::test]
async fn test_find_bucket_queries_by_name() {
    let fake = FakeInflux { bucket_exists: true, ..Default::default() };
    let client = serve(fake.clone()).await;

    let bucket = client.find_bucket_by_name("analytics").await.unwrap();
    assert_eq!(
        bucket,
        Bucket { id: "b-1".into(), name: "analytics".into(), org_id: "org-1".into() }
    );

    let requests = fake.requests();
    assert_eq!(requests[0].method, Method::GET);
    assert_eq!(requests[0].path, "/api/v2/buckets");
    assert_eq!(requests[0].query.get("name").map(String::as_str), Some("analytics"));
    assert_eq!(requests[0].authorization.as_deref(), Some("Token secret"));
}

#[tokio::test]
async fn test_missing_bucket_is_not_found() {
    let client = serve(FakeInflux::default()).await;

    let err = client.find_bucket_by_name("analytics").await.unwrap_err();
    assert!(matches!(err, BucketApiError::NotFound(_)));
}

#[tokio::test]
async fn test_org_lookup_error_keeps_status() {
    let fake =
        FakeInflux { orgs_failure: Some(StatusCode::INTERNAL_SERVER_ERROR), ..Default::default() };
    let client = serve(fake.clone()).await;

    let err = client.find_organization_by_name("hub").await.unwrap_err();
    assert_eq!(
        err,
        BucketApiError::Status { status: 500, body: "org service unavailable".into() }
    );

    let requests = fake.requests();
    assert_eq!(requests[0].path, "/api/v2/orgs");
    assert_eq!(requests[0].query.get("org").map(String::as_str), Some("hub"));
}

#[tokio::test]
async fn test_provisioner_creates_bucket_after_404_lookup() {
    let fake = FakeInflux::default();
    let provisioner = BucketProvisioner::new(serve(fake.clone()).await);

    let bucket = provisioner.ensure("hub", "analytics").await.unwrap();
    assert_eq!(
        bucket,
        Bucket { id: "b-new".into(), name: "analytics".into(), org_id: "org-1".into() }
    );

    let requests = fake.requests();
    let calls: Vec<(Method, &str)> =
        requests.iter().map(|r| (r.method.clone(), r.path.as_str())).collect();
    assert_eq!(
        calls,
        vec![
            (Method::GET, "/api/v2/buckets"),
            (Method::GET, "/api/v2/orgs"),
            (Method::POST, "/api/v2/buckets"),
        ]
    );

    let created: Value = serde_json::from_str(&requests[2].body).unwrap();
    assert_eq!(created["orgID"], "org-1");
    assert_eq!(created["name"], "analytics");
    assert!(requests.iter().all(|r| r.authorization.as_deref() == Some("Token secret")));

    // Memoized: no further requests.
    provisioner.ensure("hub", "analytics").await.unwrap();
    assert_eq!(fake.requests().len(), 3);
}

#[tokio::test]
async fn test_organization_shape_matches_api() {
    let client = serve(FakeInflux::default()).await;
    let org = client.find_organization_by_name("hub").await.unwrap();
    assert_eq!(org, Organization { id: "org-1".into(), name: "hub".into() });
}
