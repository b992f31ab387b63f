//! `PostgreSQL` type resolution and cell decoding.
//!
//! Every column is read either through a native `FromSql` decoder or cast to
//! text in the SELECT list. Text-cast values stay text; numeric strings are
//! still usable in arithmetic through [`Value::as_f64`].

use chrono::{DateTime, NaiveDate, NaiveDateTime, Utc};
use clinicmart_types::Value;
use tokio_postgres::Row;

/// How a column's cells are decoded.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Decoder {
    Int16,
    Int32,
    Int64,
    Float32,
    Float64,
    Bool,
    Text,
    Date,
    Timestamp,
    TimestampTz,
}

/// Column metadata discovered from `information_schema.columns`.
#[derive(Debug, Clone)]
pub(crate) struct Column {
    pub(crate) name: String,
    pub(crate) decoder: Decoder,
    pub(crate) needs_cast: bool,
}

impl Column {
    pub(crate) fn new(name: &str, pg_type: &str) -> Self {
        let (decoder, needs_cast) = resolve(pg_type);
        Self {
            name: name.to_string(),
            decoder,
            needs_cast,
        }
    }
}

/// Resolve a `PostgreSQL` type name to its decoder and text-cast requirement.
pub(crate) fn resolve(pg_type: &str) -> (Decoder, bool) {
    match pg_type {
        "smallint" | "int2" | "smallserial" => (Decoder::Int16, false),
        "integer" | "int4" | "serial" => (Decoder::Int32, false),
        "bigint" | "int8" | "bigserial" => (Decoder::Int64, false),
        "real" | "float4" => (Decoder::Float32, false),
        "double precision" | "float8" => (Decoder::Float64, false),
        "boolean" | "bool" => (Decoder::Bool, false),
        "text" | "varchar" | "character varying" | "char" | "character" | "bpchar" | "name" => {
            (Decoder::Text, false)
        }
        "date" => (Decoder::Date, false),
        "timestamp" | "timestamp without time zone" => (Decoder::Timestamp, false),
        "timestamp with time zone" | "timestamptz" => (Decoder::TimestampTz, false),
        // numeric, uuid, json, arrays, intervals and anything custom
        _ => (Decoder::Text, true),
    }
}

/// Decode one cell. Errors surface as `Err` so the caller can null the cell
/// and degrade the fetch instead of dropping the row.
pub(crate) fn decode_cell(
    row: &Row,
    idx: usize,
    decoder: Decoder,
) -> Result<Value, tokio_postgres::Error> {
    let value = match decoder {
        Decoder::Int16 => row.try_get::<_, Option<i16>>(idx)?.map(i64::from).into(),
        Decoder::Int32 => row.try_get::<_, Option<i32>>(idx)?.map(i64::from).into(),
        Decoder::Int64 => row.try_get::<_, Option<i64>>(idx)?.into(),
        Decoder::Float32 => row.try_get::<_, Option<f32>>(idx)?.map(f64::from).into(),
        Decoder::Float64 => row.try_get::<_, Option<f64>>(idx)?.into(),
        Decoder::Bool => row.try_get::<_, Option<bool>>(idx)?.into(),
        Decoder::Text => row.try_get::<_, Option<String>>(idx)?.into(),
        Decoder::Date => row
            .try_get::<_, Option<NaiveDate>>(idx)?
            .map_or(Value::Null, Value::Date),
        Decoder::Timestamp => row
            .try_get::<_, Option<NaiveDateTime>>(idx)?
            .map_or(Value::Null, Value::Timestamp),
        Decoder::TimestampTz => row
            .try_get::<_, Option<DateTime<Utc>>>(idx)?
            .map_or(Value::Null, |ts| Value::Timestamp(ts.naive_utc())),
    };
    Ok(value)
}
