//! Flight SQL transport.
//!
//! [`FlightSqlTransport`] is the seam between the tenant-aware query layer and
//! the wire. Implementations hold no tenant state: every call receives the
//! [`TenantHeaders`] to attach, so one connection serves every tenant.

use arrow_array::RecordBatch;
use arrow_flight::decode::FlightRecordBatchStream;
use arrow_flight::encode::FlightDataEncoderBuilder;
use arrow_flight::error::FlightError;
use arrow_flight::flight_service_client::FlightServiceClient;
use arrow_flight::sql::{
    ActionClosePreparedStatementRequest, ActionCreatePreparedStatementRequest,
    ActionCreatePreparedStatementResult, Any, CommandPreparedStatementQuery, ProstMessageExt,
};
use arrow_flight::{Action, FlightData, FlightDescriptor, FlightInfo, IpcMessage, Ticket};
use arrow_schema::{ArrowError, Schema};
use async_trait::async_trait;
use bytes::Bytes;
use futures_util::stream::{self, BoxStream};
use futures_util::{StreamExt, TryStreamExt};
use prost::Message;
use std::fmt;
use std::time::Duration;
use thiserror::Error;
use tonic::metadata::{AsciiMetadataValue, MetadataMap};
use tonic::transport::{Channel, ClientTlsConfig, Endpoint};
use tonic::{Code, Request, Status};

pub const AUTHORIZATION_HEADER: &str = "authorization";
pub const BUCKET_HEADER: &str = "bucket-name";

const CREATE_PREPARED_STATEMENT: &str = "CreatePreparedStatement";
const CLOSE_PREPARED_STATEMENT: &str = "ClosePreparedStatement";

/// Lazy, single-pass sequence of result batches for one ticket.
pub type RecordStream = BoxStream<'static, Result<RecordBatch, QueryError>>;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum QueryError {
    #[error("deadline exceeded")]
    DeadlineExceeded,
    #[error("unauthorized: {0}")]
    Unauthorized(String),
    #[error("invalid query: {0}")]
    InvalidQuery(String),
    #[error("statement has {expected} parameters but none were bound")]
    UnboundParameters { expected: usize },
    #[error("statement expects {expected} parameters, binding has {actual}")]
    ParameterMismatch { expected: usize, actual: usize },
    #[error("invalid tenant credentials: {0}")]
    InvalidCredentials(String),
    #[error("not found: {0}")]
    NotFound(String),
    #[error("transport error: {0}")]
    Transport(String),
    #[error("protocol error: {0}")]
    Protocol(String),
}

impl QueryError {
    /// Whether the same call may succeed if issued again.
    ///
    /// Deadline expiry is not retryable: the caller's budget is spent.
    pub fn is_retryable(&self) -> bool {
        matches!(self, QueryError::Transport(_))
    }
}

impl From<Status> for QueryError {
    fn from(status: Status) -> Self {
        let message = status.message().to_string();
        match status.code() {
            Code::DeadlineExceeded => QueryError::DeadlineExceeded,
            Code::Unauthenticated | Code::PermissionDenied => QueryError::Unauthorized(message),
            Code::InvalidArgument => QueryError::InvalidQuery(message),
            Code::NotFound => QueryError::NotFound(message),
            _ => QueryError::Transport(status.to_string()),
        }
    }
}

impl From<FlightError> for QueryError {
    fn from(error: FlightError) -> Self {
        match error {
            FlightError::Tonic(status) => QueryError::from(Status::clone(&status)),
            other => QueryError::Protocol(other.to_string()),
        }
    }
}

impl From<ArrowError> for QueryError {
    fn from(error: ArrowError) -> Self {
        QueryError::Protocol(error.to_string())
    }
}

impl From<prost::DecodeError> for QueryError {
    fn from(error: prost::DecodeError) -> Self {
        QueryError::Protocol(error.to_string())
    }
}

/// Per-tenant request metadata: a bearer credential and a bucket name.
///
/// Cannot be built without both, so a request can never leave with only half
/// of a tenant's identity attached.
#[derive(Clone)]
pub struct TenantHeaders {
    authorization: AsciiMetadataValue,
    bucket: AsciiMetadataValue,
    bucket_name: String,
}

impl TenantHeaders {
    pub fn new(bearer: &str, bucket: &str) -> Result<Self, QueryError> {
        if bearer.is_empty() {
            return Err(QueryError::InvalidCredentials("bearer token is empty".to_string()));
        }
        if bucket.is_empty() {
            return Err(QueryError::InvalidCredentials("bucket name is empty".to_string()));
        }

        let authorization = format!("Bearer {}", bearer).parse::<AsciiMetadataValue>().map_err(
            |_| QueryError::InvalidCredentials("bearer token is not valid header text".to_string()),
        )?;
        let bucket_value = bucket.parse::<AsciiMetadataValue>().map_err(|_| {
            QueryError::InvalidCredentials(format!("bucket name '{}' is not valid header text", bucket))
        })?;

        Ok(Self { authorization, bucket: bucket_value, bucket_name: bucket.to_string() })
    }

    pub fn bucket(&self) -> &str {
        &self.bucket_name
    }

    /// Attach both headers to an outgoing request, replacing existing values.
    pub fn apply<T>(&self, request: &mut Request<T>) {
        let metadata = request.metadata_mut();
        metadata.insert(AUTHORIZATION_HEADER, self.authorization.clone());
        metadata.insert(BUCKET_HEADER, self.bucket.clone());
    }

    /// The headers as they appear on the wire.
    pub fn metadata(&self) -> MetadataMap {
        let mut request = Request::new(());
        self.apply(&mut request);
        request.into_parts().0
    }
}

impl fmt::Debug for TenantHeaders {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TenantHeaders")
            .field("authorization", &"Bearer <redacted>")
            .field("bucket", &self.bucket_name)
            .finish()
    }
}

/// Call options fixed for the lifetime of a prepared statement.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CallOptions {
    pub timeout: Option<Duration>,
}

impl CallOptions {
    pub fn with_timeout(timeout: Duration) -> Self {
        Self { timeout: Some(timeout) }
    }

    /// Propagate the deadline to the server as `grpc-timeout`.
    pub fn apply<T>(&self, request: &mut Request<T>) {
        if let Some(timeout) = self.timeout {
            request.set_timeout(timeout);
        }
    }
}

/// Server-side prepared statement handle as returned by the transport.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PreparedHandle {
    pub handle: Bytes,
    /// Number of placeholders, when the server reported a parameter schema.
    pub parameter_count: Option<usize>,
}

#[async_trait]
pub trait FlightSqlTransport: Send + Sync {
    async fn create_prepared_statement(
        &self,
        headers: &TenantHeaders,
        options: &CallOptions,
        query: &str,
    ) -> Result<PreparedHandle, QueryError>;

    async fn bind_parameters(
        &self,
        headers: &TenantHeaders,
        options: &CallOptions,
        handle: &Bytes,
        parameters: RecordBatch,
    ) -> Result<(), QueryError>;

    async fn get_flight_info(
        &self,
        headers: &TenantHeaders,
        options: &CallOptions,
        handle: &Bytes,
    ) -> Result<FlightInfo, QueryError>;

    async fn close_prepared_statement(
        &self,
        headers: &TenantHeaders,
        options: &CallOptions,
        handle: Bytes,
    ) -> Result<(), QueryError>;

    async fn do_get(
        &self,
        headers: &TenantHeaders,
        options: &CallOptions,
        ticket: Ticket,
    ) -> Result<RecordStream, QueryError>;
}

/// gRPC Flight SQL transport over a single shared channel.
#[derive(Clone)]
pub struct GrpcFlightSql {
    client: FlightServiceClient<Channel>,
}

impl GrpcFlightSql {
    pub fn new(channel: Channel) -> Self {
        Self { client: FlightServiceClient::new(channel) }
    }

    /// Connect to the Flight SQL endpoint on the host of the store URL.
    ///
    /// `https` URLs use TLS with the platform's root certificates.
    pub async fn connect(url: &str) -> Result<Self, QueryError> {
        let parsed = reqwest::Url::parse(url)
            .map_err(|e| QueryError::Transport(format!("invalid store URL '{}': {}", url, e)))?;
        let host = parsed
            .host_str()
            .ok_or_else(|| QueryError::Transport(format!("store URL '{}' has no host", url)))?;
        let tls = parsed.scheme() == "https";
        let port = parsed.port_or_known_default().unwrap_or(if tls { 443 } else { 80 });
        let scheme = if tls { "https" } else { "http" };

        let mut endpoint = Endpoint::from_shared(format!("{}://{}:{}", scheme, host, port))
            .map_err(|e| QueryError::Transport(e.to_string()))?;
        if tls {
            endpoint = endpoint
                .tls_config(ClientTlsConfig::new().with_native_roots())
                .map_err(|e| QueryError::Transport(e.to_string()))?;
        }

        let channel = endpoint.connect().await.map_err(|e| QueryError::Transport(e.to_string()))?;
        tracing::info!(host = %host, port, tls, "Connected Flight SQL client");
        Ok(Self::new(channel))
    }

    // Clones share the underlying channel.
    fn client(&self) -> FlightServiceClient<Channel> {
        self.client.clone()
    }

    fn request<T>(headers: &TenantHeaders, options: &CallOptions, message: T) -> Request<T> {
        let mut request = Request::new(message);
        headers.apply(&mut request);
        options.apply(&mut request);
        request
    }

    async fn do_action(
        &self,
        headers: &TenantHeaders,
        options: &CallOptions,
        kind: &str,
        body: Any,
    ) -> Result<Vec<Bytes>, QueryError> {
        let action = Action { r#type: kind.to_string(), body: body.encode_to_vec().into() };
        let mut results =
            self.client().do_action(Self::request(headers, options, action)).await?.into_inner();

        let mut bodies = Vec::new();
        while let Some(result) = results.message().await? {
            bodies.push(result.body);
        }
        Ok(bodies)
    }
}

fn parameter_count(schema: &Bytes) -> Result<Option<usize>, QueryError> {
    if schema.is_empty() {
        return Ok(None);
    }
    let schema = Schema::try_from(IpcMessage(schema.clone()))?;
    Ok(Some(schema.fields().len()))
}

fn statement_descriptor(handle: &Bytes) -> FlightDescriptor {
    let command = CommandPreparedStatementQuery { prepared_statement_handle: handle.clone() };
    FlightDescriptor::new_cmd(command.as_any().encode_to_vec())
}

#[async_trait]
impl FlightSqlTransport for GrpcFlightSql {
    async fn create_prepared_statement(
        &self,
        headers: &TenantHeaders,
        options: &CallOptions,
        query: &str,
    ) -> Result<PreparedHandle, QueryError> {
        let request =
            ActionCreatePreparedStatementRequest { query: query.to_string(), ..Default::default() };
        let bodies =
            self.do_action(headers, options, CREATE_PREPARED_STATEMENT, request.as_any()).await?;

        let body = bodies.into_iter().next().ok_or_else(|| {
            QueryError::Protocol("empty CreatePreparedStatement response".to_string())
        })?;
        let prepared: ActionCreatePreparedStatementResult =
            Any::decode(body)?.unpack()?.ok_or_else(|| {
                QueryError::Protocol("unexpected CreatePreparedStatement result type".to_string())
            })?;

        Ok(PreparedHandle {
            parameter_count: parameter_count(&prepared.parameter_schema)?,
            handle: prepared.prepared_statement_handle,
        })
    }

    async fn bind_parameters(
        &self,
        headers: &TenantHeaders,
        options: &CallOptions,
        handle: &Bytes,
        parameters: RecordBatch,
    ) -> Result<(), QueryError> {
        let flight_data: Vec<FlightData> = FlightDataEncoderBuilder::new()
            .with_flight_descriptor(Some(statement_descriptor(handle)))
            .build(stream::iter(vec![Ok::<_, FlightError>(parameters)]))
            .try_collect()
            .await?;

        let request = Self::request(headers, options, stream::iter(flight_data));
        let mut results = self.client().do_put(request).await?.into_inner();
        while results.message().await?.is_some() {}
        Ok(())
    }

    async fn get_flight_info(
        &self,
        headers: &TenantHeaders,
        options: &CallOptions,
        handle: &Bytes,
    ) -> Result<FlightInfo, QueryError> {
        let request = Self::request(headers, options, statement_descriptor(handle));
        Ok(self.client().get_flight_info(request).await?.into_inner())
    }

    async fn close_prepared_statement(
        &self,
        headers: &TenantHeaders,
        options: &CallOptions,
        handle: Bytes,
    ) -> Result<(), QueryError> {
        let request = ActionClosePreparedStatementRequest { prepared_statement_handle: handle };
        self.do_action(headers, options, CLOSE_PREPARED_STATEMENT, request.as_any()).await?;
        Ok(())
    }

    async fn do_get(
        &self,
        headers: &TenantHeaders,
        options: &CallOptions,
        ticket: Ticket,
    ) -> Result<RecordStream, QueryError> {
        let data = self.client().do_get(Self::request(headers, options, ticket)).await?.into_inner();
        let batches = FlightRecordBatchStream::new_from_flight_data(data.map_err(FlightError::from));
        Ok(batches.map_err(QueryError::from).boxed())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_tenant_headers_on_the_wire() {
        let headers = TenantHeaders::new("secret", "analytics").unwrap();
        let metadata = headers.metadata();
        assert_eq!(metadata.get(AUTHORIZATION_HEADER).unwrap().to_str().unwrap(), "Bearer secret");
        assert_eq!(metadata.get(BUCKET_HEADER).unwrap().to_str().unwrap(), "analytics");
    }

    #[test]
    fn test_tenant_headers_require_both_parts() {
        assert!(matches!(TenantHeaders::new("", "b"), Err(QueryError::InvalidCredentials(_))));
        assert!(matches!(TenantHeaders::new("t", ""), Err(QueryError::InvalidCredentials(_))));
        assert!(matches!(TenantHeaders::new("t", "bad\nbucket"), Err(QueryError::InvalidCredentials(_))));
    }

    #[test]
    fn test_debug_redacts_token() {
        let headers = TenantHeaders::new("secret", "analytics").unwrap();
        let rendered = format!("{:?}", headers);
        assert!(!rendered.contains("secret"));
        assert!(rendered.contains("analytics"));
    }

    #[test]
    fn test_status_mapping() {
        assert_eq!(QueryError::from(Status::deadline_exceeded("slow")), QueryError::DeadlineExceeded);
        assert!(matches!(
            QueryError::from(Status::unauthenticated("no")),
            QueryError::Unauthorized(_)
        ));
        assert!(matches!(
            QueryError::from(Status::invalid_argument("bad sql")),
            QueryError::InvalidQuery(_)
        ));
        assert!(QueryError::from(Status::unavailable("down")).is_retryable());
        assert!(!QueryError::DeadlineExceeded.is_retryable());
    }

    #[test]
    fn test_empty_parameter_schema_is_unknown() {
        assert_eq!(parameter_count(&Bytes::new()).unwrap(), None);
    }
}
