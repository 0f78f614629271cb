//! InfluxDB v2 HTTP API client for bucket management and line protocol writes.

use crate::storage::bucket::{Bucket, BucketApi, BucketApiError, Organization};
use crate::storage::write_bridge::{LineSink, SinkError};
use async_trait::async_trait;
use reqwest::header::{AUTHORIZATION, CONTENT_TYPE};
use reqwest::{Client, RequestBuilder, Response, StatusCode};
use serde::Deserialize;
use serde_json::json;

#[derive(Debug, Deserialize)]
struct BucketList {
    #[serde(default)]
    buckets: Vec<Bucket>,
}

#[derive(Debug, Deserialize)]
struct OrganizationList {
    #[serde(default)]
    orgs: Vec<Organization>,
}

/// Shared HTTP client for one InfluxDB instance.
#[derive(Clone)]
pub struct InfluxHttpClient {
    http: Client,
    base_url: String,
    token: String,
}

impl InfluxHttpClient {
    pub fn new(base_url: &str, token: &str) -> Self {
        Self::with_client(Client::new(), base_url, token)
    }

    pub fn with_client(http: Client, base_url: &str, token: &str) -> Self {
        Self {
            http,
            base_url: base_url.trim_end_matches('/').to_string(),
            token: token.to_string(),
        }
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    /// A [`LineSink`] writing into `bucket` of `org`.
    pub fn line_sink(&self, org: &str, bucket: &str) -> InfluxLineSink {
        InfluxLineSink { client: self.clone(), org: org.to_string(), bucket: bucket.to_string() }
    }

    fn authorized(&self, request: RequestBuilder) -> RequestBuilder {
        request.header(AUTHORIZATION, format!("Token {}", self.token))
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }
}

async fn expect_success(response: Response) -> Result<Response, BucketApiError> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }
    let body = response.text().await.unwrap_or_default();
    if status == StatusCode::NOT_FOUND {
        return Err(BucketApiError::NotFound(body));
    }
    Err(BucketApiError::Status { status: status.as_u16(), body })
}

fn request_error(e: reqwest::Error) -> BucketApiError {
    BucketApiError::Request(e.to_string())
}

#[async_trait]
impl BucketApi for InfluxHttpClient {
    async fn find_bucket_by_name(&self, name: &str) -> Result<Bucket, BucketApiError> {
        let response = self
            .authorized(self.http.get(self.url("/api/v2/buckets")))
            .query(&[("name", name)])
            .send()
            .await
            .map_err(request_error)?;

        let list: BucketList =
            expect_success(response).await?.json().await.map_err(request_error)?;
        list.buckets
            .into_iter()
            .find(|bucket| bucket.name == name)
            .ok_or_else(|| BucketApiError::NotFound(format!("bucket '{}' not found", name)))
    }

    async fn find_organization_by_name(
        &self,
        name: &str,
    ) -> Result<Organization, BucketApiError> {
        let response = self
            .authorized(self.http.get(self.url("/api/v2/orgs")))
            .query(&[("org", name)])
            .send()
            .await
            .map_err(request_error)?;

        let list: OrganizationList =
            expect_success(response).await?.json().await.map_err(request_error)?;
        list.orgs
            .into_iter()
            .find(|org| org.name == name)
            .ok_or_else(|| BucketApiError::NotFound(format!("organization '{}' not found", name)))
    }

    async fn create_bucket(
        &self,
        org: &Organization,
        name: &str,
    ) -> Result<Bucket, BucketApiError> {
        let body = json!({ "orgID": org.id, "name": name, "retentionRules": [] });
        let response = self
            .authorized(self.http.post(self.url("/api/v2/buckets")))
            .json(&body)
            .send()
            .await
            .map_err(request_error)?;

        expect_success(response).await?.json().await.map_err(request_error)
    }
}

/// Writes line protocol batches to `/api/v2/write`.
#[derive(Clone)]
pub struct InfluxLineSink {
    client: InfluxHttpClient,
    org: String,
    bucket: String,
}

#[async_trait]
impl LineSink for InfluxLineSink {
    async fn write_lines(&self, body: String) -> Result<(), SinkError> {
        let response = self
            .client
            .authorized(self.client.http.post(self.client.url("/api/v2/write")))
            .query(&[("org", self.org.as_str()), ("bucket", self.bucket.as_str()), ("precision", "ns")])
            .header(CONTENT_TYPE, "text/plain; charset=utf-8")
            .body(body)
            .send()
            .await
            .map_err(|e| SinkError::Transport(e.to_string()))?;

        let status = response.status();
        if status.is_success() {
            return Ok(());
        }
        let body = response.text().await.unwrap_or_default();
        Err(SinkError::Rejected { status: status.as_u16(), body })
    }
}
