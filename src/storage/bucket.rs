//! Bucket provisioning.
//!
//! The store rejects writes to a bucket that does not exist, so the bucket is
//! resolved or created once during bootstrap, before the write path is handed
//! to concurrent producers.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet};
use thiserror::Error;
use tokio::sync::Mutex;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Bucket {
    pub id: String,
    pub name: String,
    #[serde(rename = "orgID")]
    pub org_id: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Organization {
    pub id: String,
    pub name: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum BucketApiError {
    #[error("not found: {0}")]
    NotFound(String),
    #[error("request failed: {0}")]
    Request(String),
    #[error("unexpected response ({status}): {body}")]
    Status { status: u16, body: String },
}

/// Bucket and organization management endpoints of the store.
#[async_trait]
pub trait BucketApi: Send + Sync {
    async fn find_bucket_by_name(&self, name: &str) -> Result<Bucket, BucketApiError>;

    async fn find_organization_by_name(&self, name: &str)
        -> Result<Organization, BucketApiError>;

    async fn create_bucket(&self, org: &Organization, name: &str)
        -> Result<Bucket, BucketApiError>;
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ProvisionError {
    #[error("Error finding organization '{org}': {source}")]
    Organization {
        org: String,
        #[source]
        source: BucketApiError,
    },
    #[error("Error creating bucket '{bucket}': {source}")]
    Create {
        bucket: String,
        #[source]
        source: BucketApiError,
    },
    #[error("Bucket '{bucket}' is still missing after a failed creation attempt")]
    CreationAlreadyAttempted { bucket: String },
}

type BucketKey = (String, String);

#[derive(Default)]
struct Provisioned {
    buckets: HashMap<BucketKey, Bucket>,
    attempted: HashSet<BucketKey>,
}

/// Resolves a bucket by name, creating it under the organization if needed.
pub struct BucketProvisioner<A> {
    api: A,
    state: Mutex<Provisioned>,
}

impl<A: BucketApi> BucketProvisioner<A> {
    pub fn new(api: A) -> Self {
        Self { api, state: Mutex::new(Provisioned::default()) }
    }

    pub fn api(&self) -> &A {
        &self.api
    }

    /// Ensure `bucket_name` exists under `org`.
    ///
    /// A failed lookup is logged and treated as absence. Organization
    /// resolution and creation failures are fatal. Calls are serialized and
    /// memoized, so at most one creation is attempted per (org, bucket).
    pub async fn ensure(&self, org: &str, bucket_name: &str) -> Result<Bucket, ProvisionError> {
        let mut state = self.state.lock().await;
        let key = (org.to_string(), bucket_name.to_string());

        if let Some(bucket) = state.buckets.get(&key) {
            return Ok(bucket.clone());
        }

        let bucket = match self.api.find_bucket_by_name(bucket_name).await {
            Ok(bucket) => bucket,
            Err(e) => {
                tracing::warn!(bucket = %bucket_name, "Couldn't find bucket: {}", e);

                if !state.attempted.insert(key.clone()) {
                    return Err(ProvisionError::CreationAlreadyAttempted {
                        bucket: bucket_name.to_string(),
                    });
                }

                let organization = self.api.find_organization_by_name(org).await.map_err(
                    |source| ProvisionError::Organization { org: org.to_string(), source },
                )?;

                let bucket = self.api.create_bucket(&organization, bucket_name).await.map_err(
                    |source| ProvisionError::Create { bucket: bucket_name.to_string(), source },
                )?;

                tracing::info!(bucket = %bucket.name, id = %bucket.id, org = %organization.name, "Created bucket");
                bucket
            }
        };

        state.buckets.insert(key, bucket.clone());
        Ok(bucket)
    }
}
