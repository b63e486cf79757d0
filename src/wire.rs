use std::fmt::Debug;
use std::ops::Range;
use std::sync::Arc;
use std::time::Instant;

use async_trait::async_trait;
use futures::stream;
use futures::Sink;
use pgwire::api::auth::cleartext::CleartextPasswordAuthStartupHandler;
use pgwire::api::auth::{DefaultServerParameterProvider, StartupHandler};
use pgwire::api::copy::CopyHandler;
use pgwire::api::portal::{Format, Portal};
use pgwire::api::query::{ExtendedQueryHandler, SimpleQueryHandler};
use pgwire::api::results::{
    DataRowEncoder, DescribePortalResponse, DescribeStatementResponse, FieldInfo,
    QueryResponse, Response, Tag,
};
use pgwire::api::stmt::{QueryParser, StoredStatement};
use pgwire::api::store::PortalStore;
use pgwire::api::{ClientInfo, ClientPortalStore, NoopHandler, PgWireServerHandlers, Type};
use pgwire::error::{ErrorInfo, PgWireError, PgWireResult};
use pgwire::messages::PgWireBackendMessage;
use tokio::net::TcpStream;
use tracing::debug;

use crate::auth::SharedPasswordSource;
use crate::engine::{Engine, EngineError};
use crate::model::*;
use crate::observability;
use crate::sql::{self, Command};

pub struct LedgerHandler {
    engine: Arc<Engine>,
    query_parser: Arc<LedgerQueryParser>,
}

impl LedgerHandler {
    pub fn new(engine: Arc<Engine>) -> Self {
        Self {
            engine,
            query_parser: Arc::new(LedgerQueryParser),
        }
    }

    /// Run one command with per-query metrics. Rows are encoded per
    /// `format`, the result formats the client asked for.
    async fn run(
        &self,
        session_caller: &str,
        cmd: Command,
        format: &Format,
    ) -> PgWireResult<Vec<Response>> {
        let label = observability::command_label(&cmd);
        debug!(caller = session_caller, command = label, "executing {cmd:?}");

        let start = Instant::now();
        let result = self.execute_command(session_caller, cmd, format).await;
        let status = if result.is_ok() { "ok" } else { "error" };
        metrics::counter!(observability::QUERIES_TOTAL, "command" => label, "status" => status)
            .increment(1);
        metrics::histogram!(observability::QUERY_DURATION_SECONDS, "command" => label)
            .record(start.elapsed().as_secs_f64());
        result
    }

    async fn execute_command(
        &self,
        session_caller: &str,
        cmd: Command,
        format: &Format,
    ) -> PgWireResult<Vec<Response>> {
        let engine = &self.engine;
        match cmd {
            Command::SelectTrip { id } => {
                let trip = engine.get_trip(&id).await.map_err(engine_err)?;
                Ok(vec![self.trip_rows(vec![trip], format)])
            }
            Command::SelectTrips { filter } => {
                let trips = if filter.is_empty() {
                    engine.list_available().await
                } else {
                    engine.search(&filter).await
                };
                Ok(vec![self.trip_rows(trips, format)])
            }
            Command::InsertBooking { caller, trip_id } => {
                let caller = caller.as_deref().unwrap_or(session_caller);
                book_one(engine, caller, &trip_id).await?;
                Ok(vec![Response::Execution(Tag::new("INSERT").with_rows(1))])
            }
            Command::BatchInsertBookings { bookings } => {
                // Each row is its own atomic booking; rows before a failure stay booked.
                let count = bookings.len();
                for (caller, trip_id) in bookings {
                    let caller = caller.as_deref().unwrap_or(session_caller);
                    book_one(engine, caller, &trip_id).await?;
                }
                Ok(vec![Response::Execution(Tag::new("INSERT").with_rows(count))])
            }
            Command::DeleteBooking { caller, trip_id } => {
                let caller = caller.as_deref().unwrap_or(session_caller);
                match engine.cancel(caller, &trip_id).await {
                    Ok(remaining) => {
                        metrics::counter!(observability::SEATS_CANCELLED_TOTAL).increment(1);
                        tracing::info!(caller, trip_id = %trip_id, remaining = remaining.count, "cancelled");
                    }
                    Err(e) => return Err(rejected(e)),
                }
                Ok(vec![Response::Execution(Tag::new("DELETE").with_rows(1))])
            }
            Command::SelectBookings { caller } => {
                let caller = caller.as_deref().unwrap_or(session_caller);
                let holdings = engine.holdings_of(caller).await;
                Ok(vec![self.holding_rows(caller, holdings, format)])
            }
        }
    }

    fn trip_rows(&self, trips: Vec<Trip>, format: &Format) -> Response {
        let schema = Arc::new(trips_schema(format));
        let rows: Vec<PgWireResult<_>> = trips
            .into_iter()
            .map(|trip| {
                let mut encoder = DataRowEncoder::new(schema.clone());
                encoder.encode_field(&trip.id)?;
                encoder.encode_field(&trip.origin)?;
                encoder.encode_field(&trip.destination)?;
                encoder.encode_field(&trip.date)?;
                encoder.encode_field(&trip.departure)?;
                encoder.encode_field(&trip.arrival)?;
                encoder.encode_field(&i64::from(trip.capacity))?;
                encoder.encode_field(&i64::from(trip.available))?;
                Ok(encoder.take_row())
            })
            .collect();
        Response::Query(QueryResponse::new(schema, stream::iter(rows)))
    }

    fn holding_rows(&self, caller: &str, holdings: Vec<Holding>, format: &Format) -> Response {
        let schema = Arc::new(bookings_schema(format));
        let caller = caller.to_string();
        let rows: Vec<PgWireResult<_>> = holdings
            .into_iter()
            .map(|h| {
                let mut encoder = DataRowEncoder::new(schema.clone());
                encoder.encode_field(&caller)?;
                encoder.encode_field(&h.trip_id)?;
                encoder.encode_field(&i64::from(h.count))?;
                Ok(encoder.take_row())
            })
            .collect();
        Response::Query(QueryResponse::new(schema, stream::iter(rows)))
    }
}

async fn book_one(engine: &Engine, caller: &str, trip_id: &str) -> PgWireResult<()> {
    match engine.book(caller, trip_id).await {
        Ok(holding) => {
            metrics::counter!(observability::SEATS_BOOKED_TOTAL).increment(1);
            tracing::info!(caller, trip_id = %trip_id, held = holding.count, "booked");
            Ok(())
        }
        Err(e) => Err(rejected(e)),
    }
}

fn rejected(e: EngineError) -> PgWireError {
    debug!("rejected: {e}");
    metrics::counter!(observability::BOOKING_REJECTIONS_TOTAL, "reason" => e.kind()).increment(1);
    engine_err(e)
}

fn trips_schema(format: &Format) -> Vec<FieldInfo> {
    columns(
        &[
            ("id", Type::VARCHAR),
            ("origin", Type::VARCHAR),
            ("destination", Type::VARCHAR),
            ("date", Type::VARCHAR),
            ("departure", Type::VARCHAR),
            ("arrival", Type::VARCHAR),
            ("capacity", Type::INT8),
            ("available", Type::INT8),
        ],
        format,
    )
}

fn bookings_schema(format: &Format) -> Vec<FieldInfo> {
    columns(
        &[
            ("caller_id", Type::VARCHAR),
            ("trip_id", Type::VARCHAR),
            ("count", Type::INT8),
        ],
        format,
    )
}

fn columns(cols: &[(&str, Type)], format: &Format) -> Vec<FieldInfo> {
    cols.iter()
        .enumerate()
        .map(|(i, (name, ty))| {
            FieldInfo::new((*name).into(), None, None, ty.clone(), format.format_for(i))
        })
        .collect()
}

/// Result columns of a prepared statement, for Describe messages.
/// Placeholders are filled with a dummy value so the statement parses the
/// same way it will at execution.
fn result_schema(sql: &str, format: &Format) -> Vec<FieldInfo> {
    let dummies = vec![Some("?".to_string()); count_params(sql)];
    match sql::parse_sql(&substitute(sql, &dummies)) {
        Ok(Command::SelectTrip { .. } | Command::SelectTrips { .. }) => trips_schema(format),
        Ok(Command::SelectBookings { .. }) => bookings_schema(format),
        _ => vec![],
    }
}

/// The startup `user` is the session's caller; fall back to the shared
/// default identity when the client sent none.
fn session_caller<C: ClientInfo>(client: &C) -> String {
    client
        .metadata()
        .get("user")
        .filter(|u| !u.is_empty())
        .cloned()
        .unwrap_or_else(|| DEFAULT_CALLER.to_string())
}

#[async_trait]
impl SimpleQueryHandler for LedgerHandler {
    async fn do_query<C>(
        &self,
        client: &mut C,
        query: &str,
    ) -> PgWireResult<Vec<Response>>
    where
        C: ClientInfo + ClientPortalStore + Sink<PgWireBackendMessage> + Unpin + Send + Sync,
        C::Error: Debug,
        PgWireError: From<C::Error>,
    {
        let caller = session_caller(client);
        let cmd = sql::parse_sql(query).map_err(sql_err)?;
        self.run(&caller, cmd, &Format::UnifiedText).await
    }
}

// ── Extended Query Protocol ──────────────────────────────────────

#[derive(Debug)]
pub struct LedgerQueryParser;

#[async_trait]
impl QueryParser for LedgerQueryParser {
    type Statement = String;

    async fn parse_sql<C>(
        &self,
        _client: &C,
        sql: &str,
        _types: &[Option<Type>],
    ) -> PgWireResult<String>
    where
        C: ClientInfo + Unpin + Send + Sync,
    {
        Ok(sql.to_string())
    }

    fn get_parameter_types(&self, stmt: &String) -> PgWireResult<Vec<Type>> {
        Ok(vec![Type::VARCHAR; count_params(stmt)])
    }

    fn get_result_schema(
        &self,
        stmt: &String,
        column_format: Option<&Format>,
    ) -> PgWireResult<Vec<FieldInfo>> {
        let text = Format::UnifiedText;
        Ok(result_schema(stmt, column_format.unwrap_or(&text)))
    }
}

#[async_trait]
impl ExtendedQueryHandler for LedgerHandler {
    type Statement = String;
    type QueryParser = LedgerQueryParser;

    fn query_parser(&self) -> Arc<Self::QueryParser> {
        self.query_parser.clone()
    }

    async fn do_query<C>(
        &self,
        client: &mut C,
        portal: &Portal<Self::Statement>,
        _max_rows: usize,
    ) -> PgWireResult<Response>
    where
        C: ClientInfo + ClientPortalStore + Sink<PgWireBackendMessage> + Unpin + Send + Sync,
        C::PortalStore: PortalStore<Statement = Self::Statement>,
        C::Error: Debug,
        PgWireError: From<C::Error>,
    {
        let caller = session_caller(client);
        let sql = substitute_params(portal);
        let cmd = sql::parse_sql(&sql).map_err(sql_err)?;
        let mut responses = self
            .run(&caller, cmd, &portal.result_column_format)
            .await?;
        Ok(responses.remove(0))
    }

    async fn do_describe_statement<C>(
        &self,
        _client: &mut C,
        target: &StoredStatement<Self::Statement>,
    ) -> PgWireResult<DescribeStatementResponse>
    where
        C: ClientInfo + ClientPortalStore + Sink<PgWireBackendMessage> + Unpin + Send + Sync,
        C::PortalStore: PortalStore<Statement = Self::Statement>,
        C::Error: Debug,
        PgWireError: From<C::Error>,
    {
        let param_types = vec![Type::VARCHAR; count_params(&target.statement)];
        Ok(DescribeStatementResponse::new(
            param_types,
            result_schema(&target.statement, &Format::UnifiedText),
        ))
    }

    async fn do_describe_portal<C>(
        &self,
        _client: &mut C,
        target: &Portal<Self::Statement>,
    ) -> PgWireResult<DescribePortalResponse>
    where
        C: ClientInfo + ClientPortalStore + Sink<PgWireBackendMessage> + Unpin + Send + Sync,
        C::PortalStore: PortalStore<Statement = Self::Statement>,
        C::Error: Debug,
        PgWireError: From<C::Error>,
    {
        Ok(DescribePortalResponse::new(result_schema(
            &target.statement.statement,
            &target.result_column_format,
        )))
    }
}

/// `$N` placeholders outside quoted literals, as (byte range, N).
fn placeholders(sql: &str) -> Vec<(Range<usize>, usize)> {
    let bytes = sql.as_bytes();
    let mut found = Vec::new();
    let mut in_literal = false;
    let mut i = 0;
    while i < bytes.len() {
        match bytes[i] {
            // A doubled '' closes and reopens, which leaves us inside.
            b'\'' => {
                in_literal = !in_literal;
                i += 1;
            }
            b'$' if !in_literal => {
                let start = i;
                i += 1;
                while i < bytes.len() && bytes[i].is_ascii_digit() {
                    i += 1;
                }
                if let Ok(n) = sql[start + 1..i].parse::<usize>() {
                    found.push((start..i, n));
                }
            }
            _ => i += 1,
        }
    }
    found
}

/// Highest $N placeholder in the SQL string.
fn count_params(sql: &str) -> usize {
    placeholders(sql).into_iter().map(|(_, n)| n).max().unwrap_or(0)
}

/// Substitute $1, $2, ... placeholders with bound parameter values (text format).
fn substitute_params(portal: &Portal<String>) -> String {
    let params: Vec<Option<String>> = portal
        .parameters
        .iter()
        .map(|p| p.as_ref().map(|bytes| String::from_utf8_lossy(bytes).into_owned()))
        .collect();
    substitute(&portal.statement.statement, &params)
}

/// Single left-to-right pass: bound values are never rescanned, and text
/// inside quoted literals is copied as is.
fn substitute(sql: &str, params: &[Option<String>]) -> String {
    let mut out = String::with_capacity(sql.len());
    let mut last = 0;
    for (range, n) in placeholders(sql) {
        out.push_str(&sql[last..range.start]);
        match n.checked_sub(1).and_then(|i| params.get(i)) {
            Some(Some(text)) => {
                out.push('\'');
                out.push_str(&text.replace('\'', "''"));
                out.push('\'');
            }
            Some(None) => out.push_str("NULL"),
            None => out.push_str(&sql[range.clone()]),
        }
        last = range.end;
    }
    out.push_str(&sql[last..]);
    out
}

// ── Factory ──────────────────────────────────────────────────────

pub struct LedgerFactory {
    handler: Arc<LedgerHandler>,
    auth_handler: Arc<
        CleartextPasswordAuthStartupHandler<SharedPasswordSource, DefaultServerParameterProvider>,
    >,
    noop: Arc<NoopHandler>,
}

impl LedgerFactory {
    pub fn new(engine: Arc<Engine>, password: String) -> Self {
        let auth_source = SharedPasswordSource::new(password);
        let param_provider = DefaultServerParameterProvider::default();
        Self {
            handler: Arc::new(LedgerHandler::new(engine)),
            auth_handler: Arc::new(CleartextPasswordAuthStartupHandler::new(
                auth_source,
                param_provider,
            )),
            noop: Arc::new(NoopHandler),
        }
    }
}

impl PgWireServerHandlers for LedgerFactory {
    fn simple_query_handler(&self) -> Arc<impl SimpleQueryHandler> {
        self.handler.clone()
    }

    fn extended_query_handler(&self) -> Arc<impl ExtendedQueryHandler> {
        self.handler.clone()
    }

    fn startup_handler(&self) -> Arc<impl StartupHandler> {
        self.auth_handler.clone()
    }

    fn copy_handler(&self) -> Arc<impl CopyHandler> {
        self.noop.clone()
    }
}

/// Serve one client connection until it disconnects.
pub async fn process_connection(
    socket: TcpStream,
    engine: Arc<Engine>,
    password: String,
) -> std::io::Result<()> {
    let factory = Arc::new(LedgerFactory::new(engine, password));
    pgwire::tokio::process_socket(socket, None, factory).await
}

/// SQLSTATE per engine failure: missing trip is `no_data_found`, every
/// seat-count refusal is a raised exception.
fn sqlstate(e: &EngineError) -> &'static str {
    match e {
        EngineError::NotFound(_) => "P0002",
        EngineError::NoCapacity(_) | EngineError::NoHolding { .. } | EngineError::OverRelease(_) => {
            "P0001"
        }
    }
}

fn engine_err(e: EngineError) -> PgWireError {
    PgWireError::UserError(Box::new(ErrorInfo::new(
        "ERROR".into(),
        sqlstate(&e).into(),
        e.to_string(),
    )))
}

fn sql_err(e: crate::sql::SqlError) -> PgWireError {
    PgWireError::UserError(Box::new(ErrorInfo::new(
        "ERROR".into(),
        "42601".into(),
        e.to_string(),
    )))
}
