use sqlparser::ast::{self, Expr, FromTable, ObjectNamePart, SetExpr, Statement, TableFactor, TableObject, Value, ValueWithSpan};
use sqlparser::dialect::PostgreSqlDialect;
use sqlparser::parser::Parser;

use crate::model::TripFilter;

/// Parsed command from SQL input.
///
/// `caller` is `None` when the statement names no caller; the session
/// decides who that is.
#[derive(Debug, PartialEq)]
pub enum Command {
    SelectTrip {
        id: String,
    },
    /// An empty filter lists every bookable trip.
    SelectTrips {
        filter: TripFilter,
    },
    InsertBooking {
        caller: Option<String>,
        trip_id: String,
    },
    BatchInsertBookings {
        bookings: Vec<(Option<String>, String)>, // (caller, trip_id)
    },
    DeleteBooking {
        caller: Option<String>,
        trip_id: String,
    },
    SelectBookings {
        caller: Option<String>,
    },
}

pub fn parse_sql(sql: &str) -> Result<Command, SqlError> {
    let dialect = PostgreSqlDialect {};
    let stmts = Parser::parse_sql(&dialect, sql).map_err(|e| SqlError::Parse(e.to_string()))?;
    let stmt = match stmts.as_slice() {
        [] => return Err(SqlError::Empty),
        [stmt] => stmt,
        _ => {
            return Err(SqlError::Unsupported(format!(
                "{} statements in one query, send them one at a time",
                stmts.len()
            )));
        }
    };

    match stmt {
        Statement::Insert(insert) => parse_insert(insert),
        Statement::Delete(delete) => parse_delete(delete),
        Statement::Query(query) => parse_select(query),
        other => Err(SqlError::Unsupported(format!("{other}"))),
    }
}

fn parse_insert(insert: &ast::Insert) -> Result<Command, SqlError> {
    let table = insert_table_name(insert)?;
    if table != "bookings" {
        return Err(SqlError::UnknownTable(table));
    }

    let columns: Vec<String> = insert
        .columns
        .iter()
        .map(|c| c.value.to_lowercase())
        .collect();
    let rows = extract_all_insert_rows(insert)?;

    let mut bookings = Vec::with_capacity(rows.len());
    for (i, row) in rows.iter().enumerate() {
        let booking = booking_row(&columns, row)
            .map_err(|e| if rows.len() > 1 { SqlError::Parse(format!("row {i}: {e}")) } else { e })?;
        bookings.push(booking);
    }

    if bookings.len() == 1 {
        let (caller, trip_id) = bookings.remove(0);
        Ok(Command::InsertBooking { caller, trip_id })
    } else {
        Ok(Command::BatchInsertBookings { bookings })
    }
}

/// Without a column list a row is `(trip_id)` or `(caller_id, trip_id)`.
fn booking_row(columns: &[String], row: &[Expr]) -> Result<(Option<String>, String), SqlError> {
    if columns.is_empty() {
        return match row {
            [trip] => Ok((None, parse_identifier(trip, "trip_id")?)),
            [caller, trip] => Ok((
                Some(parse_identifier(caller, "caller_id")?),
                parse_identifier(trip, "trip_id")?,
            )),
            _ => Err(SqlError::WrongArity("bookings", 2, row.len())),
        };
    }

    if columns.len() != row.len() {
        return Err(SqlError::WrongArity("bookings", columns.len(), row.len()));
    }
    let (mut caller, mut trip_id) = (None, None);
    for (col, expr) in columns.iter().zip(row) {
        match col.as_str() {
            "caller_id" => caller = Some(parse_identifier(expr, "caller_id")?),
            "trip_id" => trip_id = Some(parse_identifier(expr, "trip_id")?),
            other => return Err(SqlError::UnknownColumn(other.to_string())),
        }
    }
    Ok((caller, trip_id.ok_or(SqlError::MissingFilter("trip_id"))?))
}

fn parse_delete(delete: &ast::Delete) -> Result<Command, SqlError> {
    let table = delete_table_name(delete)?;
    if table != "bookings" {
        return Err(SqlError::UnknownTable(table));
    }

    let filters = where_equalities(&delete.selection)?;
    let (mut caller, mut trip_id) = (None, None);
    for (col, expr) in &filters {
        match col.as_str() {
            "caller_id" => caller = Some(parse_identifier(expr, "caller_id")?),
            "trip_id" => trip_id = Some(parse_identifier(expr, "trip_id")?),
            other => return Err(SqlError::UnknownColumn(other.to_string())),
        }
    }

    Ok(Command::DeleteBooking {
        caller,
        trip_id: trip_id.ok_or(SqlError::MissingFilter("trip_id"))?,
    })
}

fn parse_select(query: &ast::Query) -> Result<Command, SqlError> {
    let select = match query.body.as_ref() {
        SetExpr::Select(s) => s,
        _ => return Err(SqlError::Unsupported("non-SELECT query".into())),
    };

    if select.from.is_empty() {
        return Err(SqlError::Parse("SELECT without FROM".into()));
    }
    let table = table_factor_name(&select.from[0].relation)?;
    let filters = where_equalities(&select.selection)?;

    match table.as_str() {
        "trips" => {
            let mut id = None;
            let mut filter = TripFilter::default();
            for (col, expr) in &filters {
                match col.as_str() {
                    "id" => id = Some(parse_identifier(expr, "id")?),
                    "origin" => filter.origin = parse_optional_text(expr)?,
                    "destination" => filter.destination = parse_optional_text(expr)?,
                    "date" => filter.date = parse_optional_text(expr)?,
                    other => return Err(SqlError::UnknownColumn(other.to_string())),
                }
            }
            match id {
                Some(id) if filter.is_empty() => Ok(Command::SelectTrip { id }),
                Some(_) => Err(SqlError::Unsupported(
                    "id cannot be combined with other trip filters".into(),
                )),
                None => Ok(Command::SelectTrips { filter }),
            }
        }
        "bookings" => {
            let mut caller = None;
            for (col, expr) in &filters {
                match col.as_str() {
                    "caller_id" => caller = Some(parse_identifier(expr, "caller_id")?),
                    other => return Err(SqlError::UnknownColumn(other.to_string())),
                }
            }
            Ok(Command::SelectBookings { caller })
        }
        _ => Err(SqlError::UnknownTable(table)),
    }
}

/// Flatten a WHERE clause made only of `col = value` terms joined by AND.
fn where_equalities(selection: &Option<Expr>) -> Result<Vec<(String, Expr)>, SqlError> {
    let mut out = Vec::new();
    if let Some(expr) = selection {
        collect_equalities(expr, &mut out)?;
    }
    Ok(out)
}

fn collect_equalities(expr: &Expr, out: &mut Vec<(String, Expr)>) -> Result<(), SqlError> {
    match expr {
        Expr::Nested(inner) => collect_equalities(inner, out),
        Expr::BinaryOp { left, op, right } => match op {
            ast::BinaryOperator::And => {
                collect_equalities(left, out)?;
                collect_equalities(right, out)
            }
            ast::BinaryOperator::Eq => {
                let col = expr_column_name(left)
                    .ok_or_else(|| SqlError::Unsupported(format!("expected column, got {left}")))?;
                out.push((col, right.as_ref().clone()));
                Ok(())
            }
            other => Err(SqlError::Unsupported(format!("operator {other}"))),
        },
        other => Err(SqlError::Unsupported(format!("WHERE {other}"))),
    }
}

// ── Helpers ───────────────────────────────────────────────────

fn object_name_last(name: &ast::ObjectName) -> Option<String> {
    name.0.last().and_then(|part| match part {
        ObjectNamePart::Identifier(ident) => Some(ident.value.to_lowercase()),
        _ => None,
    })
}

fn insert_table_name(insert: &ast::Insert) -> Result<String, SqlError> {
    match &insert.table {
        TableObject::TableName(name) => {
            object_name_last(name).ok_or_else(|| SqlError::Parse("empty table name".into()))
        }
        _ => Err(SqlError::Parse("unsupported table object in INSERT".into())),
    }
}

fn delete_table_name(delete: &ast::Delete) -> Result<String, SqlError> {
    let tables_with_joins = match &delete.from {
        FromTable::WithFromKeyword(t) | FromTable::WithoutKeyword(t) => t,
    };
    if let Some(first) = tables_with_joins.first() {
        table_factor_name(&first.relation)
    } else {
        Err(SqlError::Parse("DELETE without table".into()))
    }
}

fn table_factor_name(tf: &TableFactor) -> Result<String, SqlError> {
    match tf {
        TableFactor::Table { name, .. } => {
            object_name_last(name).ok_or_else(|| SqlError::Parse("empty table name".into()))
        }
        _ => Err(SqlError::Parse("complex table expression".into())),
    }
}

fn extract_all_insert_rows(insert: &ast::Insert) -> Result<Vec<Vec<Expr>>, SqlError> {
    let body = insert
        .source
        .as_ref()
        .ok_or(SqlError::Parse("no VALUES".into()))?;
    match body.body.as_ref() {
        SetExpr::Values(values) => {
            if values.rows.is_empty() {
                return Err(SqlError::Parse("empty VALUES".into()));
            }
            Ok(values.rows.clone())
        }
        _ => Err(SqlError::Parse("expected VALUES".into())),
    }
}

fn expr_column_name(expr: &Expr) -> Option<String> {
    match expr {
        Expr::Identifier(ident) => Some(ident.value.to_lowercase()),
        Expr::CompoundIdentifier(parts) => parts.last().map(|i| i.value.to_lowercase()),
        _ => None,
    }
}

fn extract_value(expr: &Expr) -> Option<&Value> {
    match expr {
        Expr::Value(ValueWithSpan { value, .. }) => Some(value),
        _ => None,
    }
}

fn parse_text(expr: &Expr) -> Result<String, SqlError> {
    match extract_value(expr) {
        Some(Value::SingleQuotedString(s)) => Ok(s.clone()),
        Some(value) => Err(SqlError::Parse(format!("expected string, got {value:?}"))),
        None => Err(SqlError::Parse(format!("expected value, got {expr:?}"))),
    }
}

/// Ids must be non-empty; the engine never sees an empty key.
fn parse_identifier(expr: &Expr, column: &'static str) -> Result<String, SqlError> {
    let s = parse_text(expr)?;
    if s.is_empty() {
        return Err(SqlError::EmptyIdentifier(column));
    }
    Ok(s)
}

/// An empty filter string means "no filter".
fn parse_optional_text(expr: &Expr) -> Result<Option<String>, SqlError> {
    let s = parse_text(expr)?;
    Ok(if s.is_empty() { None } else { Some(s) })
}

// ── Errors ────────────────────────────────────────────────────

#[derive(Debug, PartialEq)]
pub enum SqlError {
    Parse(String),
    Empty,
    Unsupported(String),
    UnknownTable(String),
    UnknownColumn(String),
    WrongArity(&'static str, usize, usize),
    MissingFilter(&'static str),
    EmptyIdentifier(&'static str),
}

impl std::fmt::Display for SqlError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SqlError::Parse(s) => write!(f, "parse error: {s}"),
            SqlError::Empty => write!(f, "empty query"),
            SqlError::Unsupported(s) => write!(f, "unsupported: {s}"),
            SqlError::UnknownTable(t) => write!(f, "unknown table: {t}"),
            SqlError::UnknownColumn(c) => write!(f, "unknown column: {c}"),
            SqlError::WrongArity(t, expected, got) => {
                write!(f, "{t}: expected {expected} values, got {got}")
            }
            SqlError::MissingFilter(col) => write!(f, "missing filter: {col}"),
            SqlError::EmptyIdentifier(col) => write!(f, "{col} must not be empty"),
        }
    }
}

impl std::error::Error for SqlError {}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_select_trip_by_id() {
        let cmd = parse_sql("SELECT * FROM trips WHERE id = 'G100'").unwrap();
        assert_eq!(cmd, Command::SelectTrip { id: "G100".into() });
    }

    #[test]
    fn parse_list_available() {
        let cmd = parse_sql("SELECT * FROM trips").unwrap();
        assert_eq!(cmd, Command::SelectTrips { filter: TripFilter::default() });
    }

    #[test]
    fn parse_search_all_filters() {
        let sql = r#"SELECT * FROM trips WHERE origin = 'beijing' AND destination = 'Shanghai' AND "date" = '2025-06-01'"#;
        match parse_sql(sql).unwrap() {
            Command::SelectTrips { filter } => {
                assert_eq!(filter.origin.as_deref(), Some("beijing"));
                assert_eq!(filter.destination.as_deref(), Some("Shanghai"));
                assert_eq!(filter.date.as_deref(), Some("2025-06-01"));
            }
            cmd => panic!("expected SelectTrips, got {cmd:?}"),
        }
    }

    #[test]
    fn parse_search_nested_and_partial() {
        let sql = "SELECT * FROM trips WHERE (destination = 'Shenzhen')";
        match parse_sql(sql).unwrap() {
            Command::SelectTrips { filter } => {
                assert_eq!(filter.origin, None);
                assert_eq!(filter.destination.as_deref(), Some("Shenzhen"));
            }
            cmd => panic!("expected SelectTrips, got {cmd:?}"),
        }
    }

    #[test]
    fn empty_search_value_means_no_filter() {
        let sql = "SELECT * FROM trips WHERE origin = '' AND destination = 'Shanghai'";
        match parse_sql(sql).unwrap() {
            Command::SelectTrips { filter } => {
                assert_eq!(filter.origin, None);
                assert_eq!(filter.destination.as_deref(), Some("Shanghai"));
            }
            cmd => panic!("expected SelectTrips, got {cmd:?}"),
        }
    }

    #[test]
    fn id_with_other_filters_rejected() {
        let sql = "SELECT * FROM trips WHERE id = 'G100' AND origin = 'Beijing'";
        assert!(matches!(parse_sql(sql), Err(SqlError::Unsupported(_))));
    }

    #[test]
    fn non_equality_rejected() {
        let sql = "SELECT * FROM trips WHERE origin <> 'Beijing'";
        assert!(matches!(parse_sql(sql), Err(SqlError::Unsupported(_))));
        let sql = "SELECT * FROM trips WHERE origin = 'Beijing' OR origin = 'Shanghai'";
        assert!(matches!(parse_sql(sql), Err(SqlError::Unsupported(_))));
    }

    #[test]
    fn multiple_statements_rejected() {
        let sql = "INSERT INTO bookings (trip_id) VALUES ('G100'); DELETE FROM bookings WHERE trip_id = 'D200'";
        assert!(matches!(parse_sql(sql), Err(SqlError::Unsupported(_))));
        // A trailing semicolon is still one statement.
        assert_eq!(
            parse_sql("SELECT * FROM trips WHERE id = 'G100';").unwrap(),
            Command::SelectTrip { id: "G100".into() }
        );
    }

    #[test]
    fn parse_insert_booking_session_caller() {
        let cmd = parse_sql("INSERT INTO bookings (trip_id) VALUES ('G100')").unwrap();
        assert_eq!(cmd, Command::InsertBooking { caller: None, trip_id: "G100".into() });
    }

    #[test]
    fn parse_insert_booking_named_columns_any_order() {
        let cmd =
            parse_sql("INSERT INTO bookings (trip_id, caller_id) VALUES ('G100', 'u1')").unwrap();
        assert_eq!(
            cmd,
            Command::InsertBooking { caller: Some("u1".into()), trip_id: "G100".into() }
        );
    }

    #[test]
    fn parse_insert_booking_positional() {
        let cmd = parse_sql("INSERT INTO bookings VALUES ('u1', 'G100')").unwrap();
        assert_eq!(
            cmd,
            Command::InsertBooking { caller: Some("u1".into()), trip_id: "G100".into() }
        );
        let cmd = parse_sql("INSERT INTO bookings VALUES ('G100')").unwrap();
        assert_eq!(cmd, Command::InsertBooking { caller: None, trip_id: "G100".into() });
    }

    #[test]
    fn parse_batch_insert_bookings() {
        let sql = "INSERT INTO bookings (trip_id) VALUES ('G100'), ('G100'), ('D200')";
        match parse_sql(sql).unwrap() {
            Command::BatchInsertBookings { bookings } => {
                let trips: Vec<_> = bookings.iter().map(|(_, t)| t.as_str()).collect();
                assert_eq!(trips, vec!["G100", "G100", "D200"]);
                assert!(bookings.iter().all(|(c, _)| c.is_none()));
            }
            cmd => panic!("expected BatchInsertBookings, got {cmd:?}"),
        }
    }

    #[test]
    fn insert_without_trip_rejected() {
        let sql = "INSERT INTO bookings (caller_id) VALUES ('u1')";
        assert_eq!(parse_sql(sql), Err(SqlError::MissingFilter("trip_id")));
    }

    #[test]
    fn insert_empty_ids_rejected() {
        let sql = "INSERT INTO bookings (trip_id) VALUES ('')";
        assert_eq!(parse_sql(sql), Err(SqlError::EmptyIdentifier("trip_id")));
        let sql = "INSERT INTO bookings (caller_id, trip_id) VALUES ('', 'G100')";
        assert_eq!(parse_sql(sql), Err(SqlError::EmptyIdentifier("caller_id")));
    }

    #[test]
    fn insert_into_trips_rejected() {
        let sql = "INSERT INTO trips (id) VALUES ('G999')";
        assert_eq!(parse_sql(sql), Err(SqlError::UnknownTable("trips".into())));
    }

    #[test]
    fn parse_delete_booking() {
        let cmd = parse_sql("DELETE FROM bookings WHERE trip_id = 'G100'").unwrap();
        assert_eq!(cmd, Command::DeleteBooking { caller: None, trip_id: "G100".into() });

        let cmd =
            parse_sql("DELETE FROM bookings WHERE caller_id = 'u1' AND trip_id = 'G100'").unwrap();
        assert_eq!(
            cmd,
            Command::DeleteBooking { caller: Some("u1".into()), trip_id: "G100".into() }
        );
    }

    #[test]
    fn delete_requires_trip() {
        let sql = "DELETE FROM bookings WHERE caller_id = 'u1'";
        assert_eq!(parse_sql(sql), Err(SqlError::MissingFilter("trip_id")));
    }

    #[test]
    fn parse_select_bookings() {
        assert_eq!(
            parse_sql("SELECT * FROM bookings").unwrap(),
            Command::SelectBookings { caller: None }
        );
        assert_eq!(
            parse_sql("SELECT trip_id, count FROM bookings WHERE caller_id = 'u1'").unwrap(),
            Command::SelectBookings { caller: Some("u1".into()) }
        );
    }

    #[test]
    fn unknown_column_rejected() {
        let sql = "SELECT * FROM trips WHERE price = '10'";
        assert_eq!(parse_sql(sql), Err(SqlError::UnknownColumn("price".into())));
    }

    #[test]
    fn parse_unknown_table_errors() {
        assert!(matches!(
            parse_sql("SELECT * FROM seats"),
            Err(SqlError::UnknownTable(_))
        ));
    }

    #[test]
    fn parse_empty_errors() {
        assert!(matches!(parse_sql(""), Err(SqlError::Empty)));
    }
}
