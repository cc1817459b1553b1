//! Named-column row decoding.

use chrono::{DateTime, NaiveDateTime, Utc};
use pgvector::Vector;
use rust_decimal::prelude::ToPrimitive;
use rust_decimal::Decimal;
use serde_json::Value;
use simquery_core::{Metadata, RoutineSchema, SimQueryError};
use sqlx::postgres::{PgRow, Postgres};
use sqlx::{Column, Decode, Row, Type, TypeInfo};

/// Check the columns of a result set against `schema`. All rows of one
/// result share their columns, so the first row stands for the set.
pub(crate) fn check_rows(schema: &RoutineSchema, rows: &[PgRow]) -> Result<(), SimQueryError> {
    match rows.first() {
        Some(row) => check_row(schema, row),
        None => Ok(()),
    }
}

pub(crate) fn check_row(schema: &RoutineSchema, row: &PgRow) -> Result<(), SimQueryError> {
    let names: Vec<&str> = row.columns().iter().map(|c| c.name()).collect();
    schema.check(&names)
}

pub(crate) fn get<'r, T>(
    row: &'r PgRow,
    schema: &RoutineSchema,
    column: &str,
) -> Result<T, SimQueryError>
where
    T: Decode<'r, Postgres> + Type<Postgres>,
{
    row.try_get(column)
        .map_err(|e| SimQueryError::Decode(format!("{}.{column}: {e}", schema.routine)))
}

/// A numeric column read as `f64`. Routines usually return `double
/// precision`, but aggregates over integer or `NUMERIC` columns come back
/// as `NUMERIC`, and `ts_rank` returns `real`; all of these are accepted.
pub(crate) fn get_score(
    row: &PgRow,
    schema: &RoutineSchema,
    column: &str,
) -> Result<f64, SimQueryError> {
    get_optional_score(row, schema, column)?.ok_or_else(|| null_error(schema, column))
}

pub(crate) fn get_optional_score(
    row: &PgRow,
    schema: &RoutineSchema,
    column: &str,
) -> Result<Option<f64>, SimQueryError> {
    match column_type(row, schema, column)?.as_str() {
        "FLOAT8" => get::<Option<f64>>(row, schema, column),
        "FLOAT4" => Ok(get::<Option<f32>>(row, schema, column)?.map(f64::from)),
        "NUMERIC" => get::<Option<Decimal>>(row, schema, column)?
            .map(|value| decimal_to_f64(schema, column, value))
            .transpose(),
        "INT8" | "INT4" | "INT2" => {
            Ok(get_optional_count(row, schema, column)?.map(|v| v as f64))
        }
        other => Err(type_error(schema, column, other, "a number")),
    }
}

/// A count column. `COUNT(*)` is `bigint`, narrower integers are widened.
pub(crate) fn get_count(
    row: &PgRow,
    schema: &RoutineSchema,
    column: &str,
) -> Result<i64, SimQueryError> {
    get_optional_count(row, schema, column)?.ok_or_else(|| null_error(schema, column))
}

fn get_optional_count(
    row: &PgRow,
    schema: &RoutineSchema,
    column: &str,
) -> Result<Option<i64>, SimQueryError> {
    match column_type(row, schema, column)?.as_str() {
        "INT8" => get::<Option<i64>>(row, schema, column),
        "INT4" => Ok(get::<Option<i32>>(row, schema, column)?.map(i64::from)),
        "INT2" => Ok(get::<Option<i16>>(row, schema, column)?.map(i64::from)),
        other => Err(type_error(schema, column, other, "an integer")),
    }
}

/// A timestamp column. `timestamp without time zone` is read as UTC.
pub(crate) fn get_timestamp(
    row: &PgRow,
    schema: &RoutineSchema,
    column: &str,
) -> Result<DateTime<Utc>, SimQueryError> {
    get_optional_timestamp(row, schema, column)?.ok_or_else(|| null_error(schema, column))
}

pub(crate) fn get_optional_timestamp(
    row: &PgRow,
    schema: &RoutineSchema,
    column: &str,
) -> Result<Option<DateTime<Utc>>, SimQueryError> {
    match column_type(row, schema, column)?.as_str() {
        "TIMESTAMPTZ" => get::<Option<DateTime<Utc>>>(row, schema, column),
        "TIMESTAMP" => Ok(get::<Option<NaiveDateTime>>(row, schema, column)?
            .map(|naive| naive.and_utc())),
        other => Err(type_error(schema, column, other, "a timestamp")),
    }
}

fn column_type(
    row: &PgRow,
    schema: &RoutineSchema,
    column: &str,
) -> Result<String, SimQueryError> {
    row.try_column(column)
        .map(|c| c.type_info().name().to_string())
        .map_err(|e| SimQueryError::Decode(format!("{}.{column}: {e}", schema.routine)))
}

pub(crate) fn decimal_to_f64(
    schema: &RoutineSchema,
    column: &str,
    value: Decimal,
) -> Result<f64, SimQueryError> {
    value.to_f64().ok_or_else(|| {
        SimQueryError::Decode(format!(
            "{}.{column}: NUMERIC {value} does not fit in f64",
            schema.routine
        ))
    })
}

fn null_error(schema: &RoutineSchema, column: &str) -> SimQueryError {
    SimQueryError::Decode(format!("{}.{column}: unexpected NULL", schema.routine))
}

pub(crate) fn type_error(
    schema: &RoutineSchema,
    column: &str,
    sql_type: &str,
    wanted: &str,
) -> SimQueryError {
    SimQueryError::Decode(format!(
        "{}.{column}: SQL type {sql_type} cannot be read as {wanted}",
        schema.routine
    ))
}

/// A text column that may be NULL; NULL reads as an empty string.
pub(crate) fn get_text(
    row: &PgRow,
    schema: &RoutineSchema,
    column: &str,
) -> Result<String, SimQueryError> {
    Ok(get::<Option<String>>(row, schema, column)?.unwrap_or_default())
}

/// A JSONB column. NULL or a non-object value reads as an empty map.
pub(crate) fn get_metadata(
    row: &PgRow,
    schema: &RoutineSchema,
    column: &str,
) -> Result<Metadata, SimQueryError> {
    let value: Option<Value> = get(row, schema, column)?;
    Ok(match value {
        Some(Value::Object(map)) => map.into_iter().collect(),
        _ => Metadata::new(),
    })
}

pub(crate) fn get_embedding(
    row: &PgRow,
    schema: &RoutineSchema,
    column: &str,
) -> Result<Vec<f32>, SimQueryError> {
    let vector: Option<Vector> = get(row, schema, column)?;
    Ok(vector.map(|v| v.to_vec()).unwrap_or_default())
}
