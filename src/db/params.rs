//! Parameter binding utilities for PostgreSQL queries.
//!
//! sqlx sends every bind value in binary format, tagged with the type it was
//! encoded as. PostgreSQL then reads the bytes with that type's binary input
//! routine, so a value must be encoded as the type the server inferred for its
//! placeholder: a `QueryParam::String` bound as `text` cannot land in an
//! `integer` or `timestamptz` column.
//!
//! [`coerce`] encodes each value for the inferred type. Types with a simple
//! binary form are encoded here; everything else comes back as
//! [`Coercion::Cast`], carrying the value's text form for the server to
//! convert.

use crate::models::QueryParam;
use sqlx::encode::{Encode, IsNull};
use sqlx::error::BoxDynError;
use sqlx::postgres::types::Oid;
use sqlx::postgres::{PgArgumentBuffer, PgArguments, PgTypeInfo};
use sqlx::{Postgres, Type};
use std::fmt::Write;

/// Placeholder type left for the server to infer.
pub(crate) const UNSPECIFIED: Oid = Oid(0);

pub(crate) mod oid {
    use super::Oid;

    pub const BOOL: Oid = Oid(16);
    pub const BYTEA: Oid = Oid(17);
    pub const NAME: Oid = Oid(19);
    pub const INT8: Oid = Oid(20);
    pub const INT2: Oid = Oid(21);
    pub const INT4: Oid = Oid(23);
    pub const TEXT: Oid = Oid(25);
    pub const JSON: Oid = Oid(114);
    pub const FLOAT4: Oid = Oid(700);
    pub const FLOAT8: Oid = Oid(701);
    pub const UNKNOWN: Oid = Oid(705);
    pub const BPCHAR: Oid = Oid(1042);
    pub const VARCHAR: Oid = Oid(1043);
    pub const JSONB: Oid = Oid(3802);
}

const JSONB_VERSION: u8 = 1;

/// A bind value already encoded in the binary form of `oid`.
#[derive(Debug, Clone, PartialEq)]
pub(crate) struct PgParam {
    oid: Oid,
    value: Option<Vec<u8>>,
}

impl PgParam {
    pub(crate) fn new(oid: Oid, bytes: Vec<u8>) -> Self {
        Self {
            oid,
            value: Some(bytes),
        }
    }

    pub(crate) fn null(oid: Oid) -> Self {
        Self { oid, value: None }
    }

    #[cfg(test)]
    pub(crate) fn oid(&self) -> Oid {
        self.oid
    }

    #[cfg(test)]
    pub(crate) fn bytes(&self) -> Option<&[u8]> {
        self.value.as_deref()
    }
}

impl Type<Postgres> for PgParam {
    fn type_info() -> PgTypeInfo {
        PgTypeInfo::with_oid(UNSPECIFIED)
    }
}

impl Encode<'_, Postgres> for PgParam {
    fn encode_by_ref(&self, buf: &mut PgArgumentBuffer) -> Result<IsNull, BoxDynError> {
        match &self.value {
            Some(bytes) => {
                buf.extend_from_slice(bytes);
                Ok(IsNull::No)
            }
            None => Ok(IsNull::Yes),
        }
    }

    fn produces(&self) -> Option<PgTypeInfo> {
        Some(PgTypeInfo::with_oid(self.oid))
    }
}

/// How a parameter reaches the server.
#[derive(Debug, Clone, PartialEq)]
pub(crate) enum Coercion {
    /// Encoded for the target type.
    Ready(PgParam),
    /// The server must convert `text` to the type `oid`.
    Cast { oid: Oid, text: String },
}

fn is_textual(target: Oid) -> bool {
    matches!(
        target,
        oid::TEXT | oid::VARCHAR | oid::BPCHAR | oid::NAME | oid::UNKNOWN
    )
}

/// Encode `param` for a placeholder the server typed as `target`.
///
/// With no inferred type the value keeps its natural type: `bool`, `int8`,
/// `float8`, `text`, `bytea` or `jsonb`.
pub(crate) fn coerce(param: &QueryParam, target: Oid) -> Coercion {
    use QueryParam as P;

    if target == UNSPECIFIED {
        return Coercion::Ready(natural(param));
    }

    let ready = |bytes: Vec<u8>| Coercion::Ready(PgParam::new(target, bytes));
    match (param, target) {
        (P::Null, _) => Coercion::Ready(PgParam::null(target)),
        (P::Bool(v), oid::BOOL) => ready(vec![u8::from(*v)]),
        (P::Int(v), oid::INT8) => ready(v.to_be_bytes().to_vec()),
        (P::Int(v), oid::INT4) if i32::try_from(*v).is_ok() => {
            ready((*v as i32).to_be_bytes().to_vec())
        }
        (P::Int(v), oid::INT2) if i16::try_from(*v).is_ok() => {
            ready((*v as i16).to_be_bytes().to_vec())
        }
        (P::Int(v), oid::FLOAT8) => ready((*v as f64).to_be_bytes().to_vec()),
        (P::Int(v), oid::FLOAT4) => ready((*v as f32).to_be_bytes().to_vec()),
        (P::Float(v), oid::FLOAT8) => ready(v.to_be_bytes().to_vec()),
        (P::Float(v), oid::FLOAT4) => ready((*v as f32).to_be_bytes().to_vec()),
        (P::Bytes(v), oid::BYTEA) => ready(v.clone()),
        (_, oid::JSON) => ready(json_text(param).into_bytes()),
        (_, oid::JSONB) => {
            let mut bytes = vec![JSONB_VERSION];
            bytes.extend_from_slice(json_text(param).as_bytes());
            ready(bytes)
        }
        (_, target) if is_textual(target) => ready(text_form(param).into_bytes()),
        (_, target) => Coercion::Cast {
            oid: target,
            text: text_form(param),
        },
    }
}

fn natural(param: &QueryParam) -> PgParam {
    match param {
        QueryParam::Null => PgParam::null(UNSPECIFIED),
        QueryParam::Bool(v) => PgParam::new(oid::BOOL, vec![u8::from(*v)]),
        QueryParam::Int(v) => PgParam::new(oid::INT8, v.to_be_bytes().to_vec()),
        QueryParam::Float(v) => PgParam::new(oid::FLOAT8, v.to_be_bytes().to_vec()),
        QueryParam::String(v) => PgParam::new(oid::TEXT, v.clone().into_bytes()),
        QueryParam::Bytes(v) => PgParam::new(oid::BYTEA, v.clone()),
        QueryParam::Json(v) => {
            let mut bytes = vec![JSONB_VERSION];
            bytes.extend_from_slice(v.to_string().as_bytes());
            PgParam::new(oid::JSONB, bytes)
        }
    }
}

/// JSON documents go in verbatim. Strings are taken as JSON text, like a
/// string literal would be.
fn json_text(param: &QueryParam) -> String {
    match param {
        QueryParam::Json(v) => v.to_string(),
        other => text_form(other),
    }
}

/// The PostgreSQL input syntax of a value.
pub(crate) fn text_form(param: &QueryParam) -> String {
    match param {
        QueryParam::Null => String::new(),
        QueryParam::Bool(v) => v.to_string(),
        QueryParam::Int(v) => v.to_string(),
        QueryParam::Float(v) if v.is_nan() => "NaN".to_string(),
        QueryParam::Float(v) if v.is_infinite() => {
            let text = if v.is_sign_positive() { "Infinity" } else { "-Infinity" };
            text.to_string()
        }
        QueryParam::Float(v) => v.to_string(),
        QueryParam::String(v) => v.clone(),
        QueryParam::Bytes(v) => {
            let mut hex = String::with_capacity(2 + v.len() * 2);
            hex.push_str("\\x");
            for byte in v {
                let _ = write!(hex, "{byte:02x}");
            }
            hex
        }
        QueryParam::Json(v) => v.to_string(),
    }
}

/// Bind every encoded parameter, in order.
pub(crate) fn bind_all(
    sql: &str,
    params: Vec<PgParam>,
    persistent: bool,
) -> sqlx::query::Query<'_, Postgres, PgArguments> {
    params
        .into_iter()
        .fold(sqlx::query(sql).persistent(persistent), |query, param| {
            query.bind(param)
        })
}
