//! PostgreSQL row decoding.
//!
//! Type conversion uses a two-phase approach:
//! 1. `TypeCategory` classifies column types into logical categories
//! 2. Category decoders handle the actual value extraction

use serde_json::Value as JsonValue;
use sqlx::postgres::types::PgInterval;
use sqlx::postgres::{PgRow, PgTypeInfo, PgTypeKind, PgValueFormat, PgValueRef};
use sqlx::types::ipnetwork::IpNetwork;
use sqlx::{Column, Decode, Row, Type, TypeInfo, ValueRef};
use std::fmt::Write;

// =============================================================================
// Type Classification
// =============================================================================

/// Logical category for database column types.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TypeCategory {
    Integer,
    /// 64-bit integers, which may exceed the exact range of a JS number.
    BigInteger,
    Float,
    Decimal,
    Boolean,
    Binary,
    Json,
    Uuid,
    Timestamp,
    TimestampTz,
    Date,
    Time,
    Interval,
    /// Host address with an optional netmask.
    Inet,
    /// Network address; always printed with its prefix length.
    Cidr,
    Array,
    Unknown,
}

/// Classify a PostgreSQL type name into a logical category.
pub fn categorize_type(type_name: &str) -> TypeCategory {
    if type_name.ends_with("[]") {
        return TypeCategory::Array;
    }
    match type_name.to_lowercase().as_str() {
        "numeric" | "decimal" => TypeCategory::Decimal,
        "int8" | "bigint" | "bigserial" => TypeCategory::BigInteger,
        "int2" | "int4" | "smallint" | "integer" | "int" | "serial" | "smallserial" | "oid" => {
            TypeCategory::Integer
        }
        "bool" | "boolean" => TypeCategory::Boolean,
        "float4" | "float8" | "real" | "double precision" => TypeCategory::Float,
        "json" | "jsonb" => TypeCategory::Json,
        "uuid" => TypeCategory::Uuid,
        "bytea" => TypeCategory::Binary,
        "timestamp" => TypeCategory::Timestamp,
        "timestamptz" => TypeCategory::TimestampTz,
        "date" => TypeCategory::Date,
        "time" => TypeCategory::Time,
        "interval" => TypeCategory::Interval,
        "inet" => TypeCategory::Inet,
        "cidr" => TypeCategory::Cidr,
        _ => TypeCategory::Unknown,
    }
}

// =============================================================================
// Decimal Type Support
// =============================================================================

/// Wrapper type for raw NUMERIC values as strings.
/// This preserves the exact database representation. Binary-format values
/// (results of parameterized queries) go through `rust_decimal` and keep
/// their scale.
#[derive(Debug)]
pub struct RawDecimal(pub String);

impl Type<sqlx::Postgres> for RawDecimal {
    fn type_info() -> PgTypeInfo {
        <String as Type<sqlx::Postgres>>::type_info()
    }

    fn compatible(ty: &PgTypeInfo) -> bool {
        let name = ty.name().to_lowercase();
        name.contains("numeric") || name.contains("decimal")
    }
}

impl<'r> Decode<'r, sqlx::Postgres> for RawDecimal {
    fn decode(value: PgValueRef<'r>) -> Result<Self, sqlx::error::BoxDynError> {
        if value.format() == PgValueFormat::Binary {
            let decimal = <sqlx::types::Decimal as Decode<sqlx::Postgres>>::decode(value)?;
            return Ok(RawDecimal(decimal.to_string()));
        }
        let s = <&str as Decode<sqlx::Postgres>>::decode(value)?;
        Ok(RawDecimal(s.to_string()))
    }
}

/// Encode binary data as base64 text.
pub fn encode_binary_value(bytes: &[u8]) -> JsonValue {
    use base64::{Engine as _, engine::general_purpose::STANDARD};

    JsonValue::String(STANDARD.encode(bytes))
}

/// Render an interval the way PostgreSQL's default `IntervalStyle` does,
/// e.g. `1 year 2 mons 3 days 04:05:06.789`.
pub fn format_interval(months: i32, days: i32, microseconds: i64) -> String {
    let mut out = String::new();
    let mut is_zero = true;
    let mut is_before = false;

    let mut push_part = |out: &mut String, value: i64, unit: &str| {
        if value == 0 {
            return;
        }
        let _ = write!(
            out,
            "{}{}{} {}{}",
            if is_zero { "" } else { " " },
            if is_before && value > 0 { "+" } else { "" },
            value,
            unit,
            if value != 1 { "s" } else { "" },
        );
        is_before = value < 0;
        is_zero = false;
    };
    push_part(&mut out, i64::from(months / 12), "year");
    push_part(&mut out, i64::from(months % 12), "mon");
    push_part(&mut out, i64::from(days), "day");

    if is_zero || microseconds != 0 {
        let total = microseconds.unsigned_abs();
        let sign = if microseconds < 0 {
            "-"
        } else if is_before {
            "+"
        } else {
            ""
        };
        let _ = write!(
            out,
            "{}{}{:02}:{:02}:{:02}",
            if is_zero { "" } else { " " },
            sign,
            total / 3_600_000_000,
            total / 60_000_000 % 60,
            total / 1_000_000 % 60,
        );
        let fraction = total % 1_000_000;
        if fraction != 0 {
            let digits = format!("{fraction:06}");
            out.push('.');
            out.push_str(digits.trim_end_matches('0'));
        }
    }
    out
}

/// Render an address the way PostgreSQL prints `inet` and `cidr`: `inet`
/// drops the prefix length of a single host.
pub fn format_network(network: IpNetwork, always_prefix: bool) -> String {
    let host_prefix = if network.is_ipv4() { 32 } else { 128 };
    if !always_prefix && network.prefix() == host_prefix {
        network.ip().to_string()
    } else {
        network.to_string()
    }
}

// =============================================================================
// Row Decoding
// =============================================================================

/// Options controlling how column values are rendered.
#[derive(Debug, Clone, Copy, Default)]
pub struct DecodeOptions {
    /// Render `int8` as a JSON number instead of a string.
    pub wide_integers: bool,
}

/// Convert a row into a JSON map keyed by column name.
pub fn row_to_json(row: &PgRow, options: DecodeOptions) -> serde_json::Map<String, JsonValue> {
    row.columns()
        .iter()
        .enumerate()
        .map(|(idx, col)| {
            let category = categorize_type(col.type_info().name());
            let value = decode_column(row, idx, category, options);
            (col.name().to_string(), value)
        })
        .collect()
}

fn decode_column(row: &PgRow, idx: usize, category: TypeCategory, options: DecodeOptions) -> JsonValue {
    match category {
        TypeCategory::Decimal => decode_decimal(row, idx),
        TypeCategory::Integer => decode_integer(row, idx),
        TypeCategory::BigInteger => decode_big_integer(row, idx, options.wide_integers),
        TypeCategory::Boolean => decode_boolean(row, idx),
        TypeCategory::Float => decode_float(row, idx),
        TypeCategory::Binary => decode_binary_col(row, idx),
        TypeCategory::Json => decode_json(row, idx),
        TypeCategory::Uuid => decode_uuid(row, idx),
        TypeCategory::Timestamp => decode_as_string::<chrono::NaiveDateTime>(row, idx),
        TypeCategory::TimestampTz => decode_timestamptz(row, idx),
        TypeCategory::Date => decode_as_string::<chrono::NaiveDate>(row, idx),
        TypeCategory::Time => decode_as_string::<chrono::NaiveTime>(row, idx),
        TypeCategory::Interval => decode_interval(row, idx),
        TypeCategory::Inet => decode_network(row, idx, false),
        TypeCategory::Cidr => decode_network(row, idx, true),
        TypeCategory::Array => decode_array(row, idx, options),
        TypeCategory::Unknown => decode_text(row, idx),
    }
}

fn decode_decimal(row: &PgRow, idx: usize) -> JsonValue {
    match row.try_get::<Option<RawDecimal>, _>(idx) {
        Ok(Some(v)) => JsonValue::String(v.0),
        Ok(None) => JsonValue::Null,
        Err(e) => {
            tracing::error!("Failed to decode NUMERIC: {:?}", e);
            JsonValue::Null
        }
    }
}

fn decode_integer(row: &PgRow, idx: usize) -> JsonValue {
    if let Ok(Some(v)) = row.try_get::<Option<i16>, _>(idx) {
        return JsonValue::Number(v.into());
    }
    if let Ok(Some(v)) = row.try_get::<Option<i32>, _>(idx) {
        return JsonValue::Number(v.into());
    }
    if let Ok(Some(v)) = row.try_get::<Option<sqlx::postgres::types::Oid>, _>(idx) {
        return JsonValue::Number(v.0.into());
    }
    JsonValue::Null
}

fn decode_big_integer(row: &PgRow, idx: usize, wide_integers: bool) -> JsonValue {
    match row.try_get::<Option<i64>, _>(idx) {
        Ok(Some(v)) if wide_integers => JsonValue::Number(v.into()),
        Ok(Some(v)) => JsonValue::String(v.to_string()),
        _ => JsonValue::Null,
    }
}

fn decode_boolean(row: &PgRow, idx: usize) -> JsonValue {
    row.try_get::<Option<bool>, _>(idx)
        .ok()
        .flatten()
        .map(JsonValue::Bool)
        .unwrap_or(JsonValue::Null)
}

fn decode_float(row: &PgRow, idx: usize) -> JsonValue {
    if let Ok(Some(v)) = row.try_get::<Option<f64>, _>(idx) {
        return serde_json::Number::from_f64(v)
            .map(JsonValue::Number)
            .unwrap_or_else(|| JsonValue::String(v.to_string()));
    }
    if let Ok(Some(v)) = row.try_get::<Option<f32>, _>(idx) {
        return serde_json::Number::from_f64(v as f64)
            .map(JsonValue::Number)
            .unwrap_or_else(|| JsonValue::String(v.to_string()));
    }
    JsonValue::Null
}

fn decode_binary_col(row: &PgRow, idx: usize) -> JsonValue {
    row.try_get::<Option<Vec<u8>>, _>(idx)
        .ok()
        .flatten()
        .map(|v| encode_binary_value(&v))
        .unwrap_or(JsonValue::Null)
}

fn decode_json(row: &PgRow, idx: usize) -> JsonValue {
    row.try_get::<Option<JsonValue>, _>(idx)
        .ok()
        .flatten()
        .unwrap_or(JsonValue::Null)
}

fn decode_uuid(row: &PgRow, idx: usize) -> JsonValue {
    row.try_get::<Option<uuid::Uuid>, _>(idx)
        .ok()
        .flatten()
        .map(|v| JsonValue::String(v.to_string()))
        .unwrap_or(JsonValue::Null)
}

fn decode_timestamptz(row: &PgRow, idx: usize) -> JsonValue {
    row.try_get::<Option<chrono::DateTime<chrono::Utc>>, _>(idx)
        .ok()
        .flatten()
        .map(|v| JsonValue::String(v.to_rfc3339()))
        .unwrap_or(JsonValue::Null)
}

fn decode_interval(row: &PgRow, idx: usize) -> JsonValue {
    row.try_get::<Option<PgInterval>, _>(idx)
        .ok()
        .flatten()
        .map(|v| JsonValue::String(format_interval(v.months, v.days, v.microseconds)))
        .unwrap_or(JsonValue::Null)
}

fn decode_network(row: &PgRow, idx: usize, always_prefix: bool) -> JsonValue {
    row.try_get::<Option<IpNetwork>, _>(idx)
        .ok()
        .flatten()
        .map(|v| JsonValue::String(format_network(v, always_prefix)))
        .unwrap_or(JsonValue::Null)
}

fn decode_as_string<T>(row: &PgRow, idx: usize) -> JsonValue
where
    T: for<'r> Decode<'r, sqlx::Postgres> + Type<sqlx::Postgres> + ToString,
{
    row.try_get::<Option<T>, _>(idx)
        .ok()
        .flatten()
        .map(|v| JsonValue::String(v.to_string()))
        .unwrap_or(JsonValue::Null)
}

fn decode_array(row: &PgRow, idx: usize, options: DecodeOptions) -> JsonValue {
    fn to_array<T>(values: Vec<Option<T>>, f: impl Fn(T) -> JsonValue) -> JsonValue {
        JsonValue::Array(
            values
                .into_iter()
                .map(|v| v.map(&f).unwrap_or(JsonValue::Null))
                .collect(),
        )
    }

    if let Ok(Some(v)) = row.try_get::<Option<Vec<Option<String>>>, _>(idx) {
        return to_array(v, JsonValue::String);
    }
    if let Ok(Some(v)) = row.try_get::<Option<Vec<Option<i32>>>, _>(idx) {
        return to_array(v, |n| JsonValue::Number(n.into()));
    }
    if let Ok(Some(v)) = row.try_get::<Option<Vec<Option<i64>>>, _>(idx) {
        return if options.wide_integers {
            to_array(v, |n| JsonValue::Number(n.into()))
        } else {
            to_array(v, |n| JsonValue::String(n.to_string()))
        };
    }
    if let Ok(Some(v)) = row.try_get::<Option<Vec<Option<bool>>>, _>(idx) {
        return to_array(v, JsonValue::Bool);
    }
    if let Ok(Some(v)) = row.try_get::<Option<Vec<Option<f64>>>, _>(idx) {
        return to_array(v, |n| {
            serde_json::Number::from_f64(n)
                .map(JsonValue::Number)
                .unwrap_or_else(|| JsonValue::String(n.to_string()))
        });
    }
    JsonValue::Null
}

fn decode_text(row: &PgRow, idx: usize) -> JsonValue {
    if let Ok(v) = row.try_get::<Option<String>, _>(idx) {
        return v.map(JsonValue::String).unwrap_or(JsonValue::Null);
    }

    let value = match row.try_get_raw(idx) {
        Ok(value) => value,
        Err(e) => {
            tracing::error!("Failed to read column {}: {:?}", idx, e);
            return JsonValue::Null;
        }
    };
    if value.is_null() {
        return JsonValue::Null;
    }
    if !is_textual(&value) {
        tracing::error!(
            column = idx,
            type_name = %value.type_info().name(),
            "No decoder for binary value; returning null"
        );
        return JsonValue::Null;
    }
    match value.as_str() {
        Ok(text) => JsonValue::String(text.to_string()),
        Err(e) => {
            tracing::error!("Failed to read column {} as text: {:?}", idx, e);
            JsonValue::Null
        }
    }
}

/// Whether the raw bytes of `value` are its text form: any text-format
/// value, plus enum labels and text domains in binary format.
fn is_textual(value: &PgValueRef<'_>) -> bool {
    if value.format() == PgValueFormat::Text {
        return true;
    }
    match value.type_info().kind() {
        PgTypeKind::Enum(_) => true,
        PgTypeKind::Domain(base) => <String as Type<sqlx::Postgres>>::compatible(base),
        _ => false,
    }
}
