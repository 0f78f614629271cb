//! Tenant-scoped query path over Arrow Flight SQL

pub mod flight_sql;
pub mod query_context;

pub use flight_sql::{
    CallOptions, FlightSqlTransport, GrpcFlightSql, PreparedHandle, QueryError, RecordStream,
    TenantHeaders, AUTHORIZATION_HEADER, BUCKET_HEADER,
};
pub use query_context::{PreparedStatement, QueryClient, QueryContext};
