//! Core data structures for the analytics ingestion pipeline
//!
//! `Datapoint` and its payloads are the protobuf messages upstream services
//! publish to the stream. They are declared by hand with `prost` derives so the
//! crate does not need a protoc build step. `Point` is the record handed to the
//! time-series store.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};

/// Tag carrying the owning organization of every point.
pub const ORGANIZATION_TAG: &str = "organization_id";
/// Tag carrying the owning project of every point.
pub const PROJECT_TAG: &str = "project_id";

/// Series name for mint events.
pub const MINT_SERIES: &str = "mints";
/// Tag holding the collection a mint belongs to.
pub const MINT_COLLECTION_TAG: &str = "collection";
/// Field holding the user who minted.
pub const MINT_USER_KEY: &str = "user";

/// One analytics event as published on the stream.
#[derive(Clone, PartialEq, ::prost::Message)]
pub struct Datapoint {
    #[prost(message, optional, tag = "1")]
    pub ts: Option<::prost_types::Timestamp>,
    #[prost(string, tag = "2")]
    pub organization_id: String,
    #[prost(string, tag = "3")]
    pub project_id: String,
    #[prost(oneof = "datapoint::Payload", tags = "4, 5")]
    pub payload: Option<datapoint::Payload>,
}

/// Nested types for [`Datapoint`].
pub mod datapoint {
    /// Exactly one representation is populated per message.
    #[derive(Clone, PartialEq, ::prost::Oneof)]
    pub enum Payload {
        #[prost(message, tag = "4")]
        Mint(super::MintDatapoint),
        #[prost(message, tag = "5")]
        Series(super::SeriesDatapoint),
    }
}

/// A token mint within a collection.
#[derive(Clone, PartialEq, ::prost::Message)]
pub struct MintDatapoint {
    #[prost(string, tag = "1")]
    pub collection_id: String,
    #[prost(string, tag = "2")]
    pub user_id: String,
}

/// A generic series record with caller-chosen tags and fields.
#[derive(Clone, PartialEq, ::prost::Message)]
pub struct SeriesDatapoint {
    #[prost(string, tag = "1")]
    pub series: String,
    #[prost(map = "string, string", tag = "2")]
    pub tags: HashMap<String, String>,
    #[prost(map = "string, message", tag = "3")]
    pub fields: HashMap<String, Value>,
}

/// Tagged value union carried in [`SeriesDatapoint::fields`].
#[derive(Clone, PartialEq, ::prost::Message)]
pub struct Value {
    #[prost(oneof = "value::Kind", tags = "1, 2, 3, 4")]
    pub kind: Option<value::Kind>,
}

/// Nested types for [`Value`].
pub mod value {
    #[derive(Clone, PartialEq, ::prost::Oneof)]
    pub enum Kind {
        #[prost(uint64, tag = "1")]
        Uint(u64),
        #[prost(sint64, tag = "2")]
        Int(i64),
        #[prost(string, tag = "3")]
        Str(String),
        #[prost(enumeration = "super::NullValue", tag = "4")]
        Null(i32),
    }
}

/// Singleton marker for an explicit null, mirroring `google.protobuf.NullValue`.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, ::prost::Enumeration)]
#[repr(i32)]
pub enum NullValue {
    NullValue = 0,
}

/// Scalar accepted in a point's field set.
///
/// The codec and the line protocol encoder match on it exhaustively.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum FieldValue {
    UInt(u64),
    Int(i64),
    Str(String),
    Null,
}

impl From<u64> for FieldValue {
    fn from(value: u64) -> Self {
        FieldValue::UInt(value)
    }
}

impl From<i64> for FieldValue {
    fn from(value: i64) -> Self {
        FieldValue::Int(value)
    }
}

impl From<&str> for FieldValue {
    fn from(value: &str) -> Self {
        FieldValue::Str(value.to_string())
    }
}

impl From<String> for FieldValue {
    fn from(value: String) -> Self {
        FieldValue::Str(value)
    }
}

/// Time-series record derived from a [`Datapoint`], ready for storage.
#[derive(Debug, Clone, PartialEq)]
pub struct Point {
    pub series: String,
    pub tags: BTreeMap<String, String>,
    pub fields: BTreeMap<String, FieldValue>,
    pub time: DateTime<Utc>,
}

impl Point {
    pub fn new(series: &str, time: DateTime<Utc>) -> Self {
        Self { series: series.to_string(), tags: BTreeMap::new(), fields: BTreeMap::new(), time }
    }

    pub fn tag(mut self, key: &str, value: &str) -> Self {
        self.tags.insert(key.to_string(), value.to_string());
        self
    }

    pub fn field(mut self, key: &str, value: impl Into<FieldValue>) -> Self {
        self.fields.insert(key.to_string(), value.into());
        self
    }
}

pub mod encoding;
pub mod transform;
pub use encoding::*;
pub use transform::transform;
