//! Tenant-scoped query contexts and prepared statements.

use crate::querying::flight_sql::{
    CallOptions, FlightSqlTransport, QueryError, RecordStream, TenantHeaders,
};
use arrow_array::RecordBatch;
use arrow_flight::{FlightInfo, Ticket};
use bytes::Bytes;
use futures_util::TryStreamExt;
use std::future::Future;
use std::sync::Arc;

async fn with_deadline<T, F>(options: &CallOptions, call: F) -> Result<T, QueryError>
where
    F: Future<Output = Result<T, QueryError>>,
{
    match options.timeout {
        Some(timeout) => tokio::time::timeout(timeout, call)
            .await
            .map_err(|_| QueryError::DeadlineExceeded)?,
        None => call.await,
    }
}

/// Hands out [`QueryContext`]s that share one transport.
#[derive(Clone)]
pub struct QueryClient {
    transport: Arc<dyn FlightSqlTransport>,
    headers: TenantHeaders,
}

impl QueryClient {
    /// Fails when the bearer or bucket is empty or not valid header text.
    pub fn new(
        transport: Arc<dyn FlightSqlTransport>,
        bearer: &str,
        bucket: &str,
    ) -> Result<Self, QueryError> {
        Ok(Self { transport, headers: TenantHeaders::new(bearer, bucket)? })
    }

    /// Context for one (organization, project) session.
    pub fn project(&self, organization_id: &str, project_id: &str) -> QueryContext {
        QueryContext::new(
            Arc::clone(&self.transport),
            organization_id,
            project_id,
            self.headers.clone(),
        )
    }
}

/// Per-tenant query handle.
///
/// Every call made through the context, or through statements prepared from
/// it, carries the context's [`TenantHeaders`]. The transport itself holds no
/// tenant state.
#[derive(Clone)]
pub struct QueryContext {
    transport: Arc<dyn FlightSqlTransport>,
    organization_id: String,
    project_id: String,
    headers: TenantHeaders,
}

impl std::fmt::Debug for QueryContext {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("QueryContext")
            .field("organization_id", &self.organization_id)
            .field("project_id", &self.project_id)
            .field("headers", &self.headers)
            .finish()
    }
}

impl QueryContext {
    pub fn new(
        transport: Arc<dyn FlightSqlTransport>,
        organization_id: &str,
        project_id: &str,
        headers: TenantHeaders,
    ) -> Self {
        Self {
            transport,
            organization_id: organization_id.to_string(),
            project_id: project_id.to_string(),
            headers,
        }
    }

    pub fn organization_id(&self) -> &str {
        &self.organization_id
    }

    pub fn project_id(&self) -> &str {
        &self.project_id
    }

    pub fn headers(&self) -> &TenantHeaders {
        &self.headers
    }

    /// Prepare `query` on the server. The statement keeps `options` for every
    /// call it makes, including the final close.
    pub async fn prepare(
        &self,
        query: &str,
        options: CallOptions,
    ) -> Result<PreparedStatement, QueryError> {
        let prepared = with_deadline(
            &options,
            self.transport.create_prepared_statement(&self.headers, &options, query),
        )
        .await?;

        tracing::debug!(
            organization_id = %self.organization_id,
            project_id = %self.project_id,
            parameters = ?prepared.parameter_count,
            "Prepared statement"
        );

        Ok(PreparedStatement {
            transport: Arc::clone(&self.transport),
            headers: self.headers.clone(),
            options,
            handle: Some(prepared.handle),
            parameter_count: prepared.parameter_count,
            pending: None,
            bound: false,
        })
    }

    /// Redeem a ticket. The stream is single-pass.
    pub async fn fetch(&self, ticket: Ticket) -> Result<RecordStream, QueryError> {
        self.fetch_with(ticket, &CallOptions::default()).await
    }

    pub async fn fetch_with(
        &self,
        ticket: Ticket,
        options: &CallOptions,
    ) -> Result<RecordStream, QueryError> {
        with_deadline(options, self.transport.do_get(&self.headers, options, ticket)).await
    }

    /// Prepare, bind, execute and close in one go.
    ///
    /// Close is attempted even when binding or execution fails; a failed
    /// close is logged and does not mask the execution result.
    pub async fn run(
        &self,
        query: &str,
        parameters: Option<RecordBatch>,
        options: CallOptions,
    ) -> Result<FlightInfo, QueryError> {
        let mut statement = self.prepare(query, options).await?;

        let executed = match parameters {
            Some(parameters) => statement.set_parameters(parameters),
            None => Ok(()),
        };
        let executed = match executed {
            Ok(()) => statement.execute().await,
            Err(e) => Err(e),
        };

        if let Err(e) = statement.close().await {
            tracing::warn!(organization_id = %self.organization_id, "Failed to close prepared statement: {}", e);
        }
        executed
    }

    /// Redeem every endpoint ticket of `info` and collect all batches.
    pub async fn collect(
        &self,
        info: &FlightInfo,
        options: &CallOptions,
    ) -> Result<Vec<RecordBatch>, QueryError> {
        let mut batches = Vec::new();
        for endpoint in &info.endpoint {
            let Some(ticket) = endpoint.ticket.clone() else {
                continue;
            };
            let stream = self.fetch_with(ticket, options).await?;
            let mut endpoint_batches: Vec<RecordBatch> =
                with_deadline(options, stream.try_collect()).await?;
            batches.append(&mut endpoint_batches);
        }
        Ok(batches)
    }
}

/// A server-side prepared statement.
///
/// Must be released with [`PreparedStatement::close`]. A statement dropped
/// without closing is released in the background, with a warning.
pub struct PreparedStatement {
    transport: Arc<dyn FlightSqlTransport>,
    headers: TenantHeaders,
    options: CallOptions,
    handle: Option<Bytes>,
    parameter_count: Option<usize>,
    pending: Option<RecordBatch>,
    bound: bool,
}

impl PreparedStatement {
    /// Placeholder count reported by the server, if it reported one.
    pub fn parameter_count(&self) -> Option<usize> {
        self.parameter_count
    }

    pub fn options(&self) -> &CallOptions {
        &self.options
    }

    /// Attach a one-row parameter batch, one column per placeholder.
    ///
    /// The batch is sent with the next [`execute`](Self::execute).
    pub fn set_parameters(&mut self, parameters: RecordBatch) -> Result<(), QueryError> {
        if let Some(expected) = self.parameter_count {
            if parameters.num_columns() != expected {
                return Err(QueryError::ParameterMismatch {
                    expected,
                    actual: parameters.num_columns(),
                });
            }
        }
        self.pending = Some(parameters);
        Ok(())
    }

    /// Bind pending parameters and return the result endpoints.
    pub async fn execute(&mut self) -> Result<FlightInfo, QueryError> {
        let handle = self.handle.clone().ok_or_else(|| {
            QueryError::Protocol("prepared statement is already closed".to_string())
        })?;

        match self.pending.take() {
            Some(parameters) => {
                with_deadline(
                    &self.options,
                    self.transport.bind_parameters(&self.headers, &self.options, &handle, parameters),
                )
                .await?;
                self.bound = true;
            }
            None => match self.parameter_count {
                Some(expected) if expected > 0 && !self.bound => {
                    return Err(QueryError::UnboundParameters { expected });
                }
                _ => {}
            },
        }

        with_deadline(
            &self.options,
            self.transport.get_flight_info(&self.headers, &self.options, &handle),
        )
        .await
    }

    /// Release the server-side handle.
    pub async fn close(mut self) -> Result<(), QueryError> {
        let Some(handle) = self.handle.take() else {
            return Ok(());
        };
        with_deadline(
            &self.options,
            self.transport.close_prepared_statement(&self.headers, &self.options, handle),
        )
        .await
    }
}

impl Drop for PreparedStatement {
    fn drop(&mut self) {
        let Some(handle) = self.handle.take() else {
            return;
        };

        let Ok(runtime) = tokio::runtime::Handle::try_current() else {
            tracing::warn!(bucket = %self.headers.bucket(), "Prepared statement dropped outside a runtime, handle leaked");
            return;
        };

        tracing::warn!(bucket = %self.headers.bucket(), "Prepared statement dropped without close");
        let transport = Arc::clone(&self.transport);
        let headers = self.headers.clone();
        let options = self.options.clone();
        runtime.spawn(async move {
            if let Err(e) = transport.close_prepared_statement(&headers, &options, handle).await {
                tracing::warn!("Failed to release dropped prepared statement: {}", e);
            }
        });
    }
}
