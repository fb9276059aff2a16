// PostgreSQL parameter binding and row decoding.
//
// Parameters are converted by the type the server inferred for the
// placeholder, so a JSON string can bind to a DATE column and an integer to
// NUMERIC without casts in the generated SQL.

use bytes::{BufMut, BytesMut};
use chrono::{DateTime, NaiveDate, NaiveDateTime, Utc};
use serde_json::{json, Map, Value};
use std::error::Error;
use tokio_postgres::types::{to_sql_checked, FromSql, IsNull, ToSql, Type};
use tokio_postgres::Row;

use crate::models::SqlValue;
use crate::services::database::adapter::{date_json, datetime_json, float_json};

type BoxError = Box<dyn Error + Sync + Send>;

impl ToSql for SqlValue {
    fn to_sql(&self, ty: &Type, out: &mut BytesMut) -> Result<IsNull, BoxError> {
        match self {
            SqlValue::Null => Ok(IsNull::Yes),
            SqlValue::Bool(b) => match *ty {
                Type::BOOL => b.to_sql(ty, out),
                _ => int_to_sql(i64::from(*b), ty, out),
            },
            SqlValue::Int(i) => int_to_sql(*i, ty, out),
            SqlValue::Float(f) => float_to_sql(*f, ty, out),
            SqlValue::Text(s) => text_to_sql(s, ty, out),
        }
    }

    fn accepts(_ty: &Type) -> bool {
        true
    }

    to_sql_checked!();
}

fn is_text(ty: &Type) -> bool {
    matches!(
        *ty,
        Type::TEXT | Type::VARCHAR | Type::BPCHAR | Type::NAME | Type::UNKNOWN
    )
}

fn int_to_sql(value: i64, ty: &Type, out: &mut BytesMut) -> Result<IsNull, BoxError> {
    match *ty {
        Type::INT2 => i16::try_from(value)?.to_sql(ty, out),
        Type::INT4 => i32::try_from(value)?.to_sql(ty, out),
        Type::INT8 => value.to_sql(ty, out),
        Type::FLOAT4 => (value as f32).to_sql(ty, out),
        Type::FLOAT8 => (value as f64).to_sql(ty, out),
        Type::NUMERIC => encode_numeric(&value.to_string(), out),
        Type::BOOL => (value != 0).to_sql(ty, out),
        _ if is_text(ty) => value.to_string().as_str().to_sql(ty, out),
        _ => Err(format!("cannot bind integer to {}", ty.name()).into()),
    }
}

fn float_to_sql(value: f64, ty: &Type, out: &mut BytesMut) -> Result<IsNull, BoxError> {
    match *ty {
        Type::FLOAT4 => (value as f32).to_sql(ty, out),
        Type::FLOAT8 => value.to_sql(ty, out),
        Type::NUMERIC => {
            if !value.is_finite() {
                return Err("cannot bind non-finite float to numeric".into());
            }
            encode_numeric(&value.to_string(), out)
        }
        Type::INT2 | Type::INT4 | Type::INT8 if value.fract() == 0.0 => {
            int_to_sql(value as i64, ty, out)
        }
        _ if is_text(ty) => value.to_string().as_str().to_sql(ty, out),
        _ => Err(format!("cannot bind float to {}", ty.name()).into()),
    }
}

fn text_to_sql(value: &str, ty: &Type, out: &mut BytesMut) -> Result<IsNull, BoxError> {
    let trimmed = value.trim();
    match *ty {
        Type::INT2 | Type::INT4 | Type::INT8 => int_to_sql(trimmed.parse::<i64>()?, ty, out),
        Type::FLOAT4 | Type::FLOAT8 => float_to_sql(trimmed.parse::<f64>()?, ty, out),
        Type::NUMERIC => encode_numeric(trimmed, out),
        Type::BOOL => matches!(trimmed.to_ascii_lowercase().as_str(), "1" | "true" | "t" | "yes")
            .to_sql(ty, out),
        Type::TIMESTAMP => parse_timestamp(trimmed)
            .ok_or_else(|| format!("invalid timestamp: {}", value))?
            .to_sql(ty, out),
        Type::TIMESTAMPTZ => parse_timestamp(trimmed)
            .ok_or_else(|| format!("invalid timestamp: {}", value))?
            .and_utc()
            .to_sql(ty, out),
        Type::DATE => parse_timestamp(trimmed)
            .ok_or_else(|| format!("invalid date: {}", value))?
            .date()
            .to_sql(ty, out),
        _ => value.to_sql(ty, out),
    }
}

/// Accepts ISO-8601 with or without offset, a space separator, or a bare date.
pub fn parse_timestamp(value: &str) -> Option<NaiveDateTime> {
    if let Ok(dt) = DateTime::parse_from_rfc3339(value) {
        return Some(dt.with_timezone(&Utc).naive_utc());
    }
    for format in ["%Y-%m-%dT%H:%M:%S%.f", "%Y-%m-%d %H:%M:%S%.f", "%Y-%m-%dT%H:%M", "%Y-%m-%d %H:%M"] {
        if let Ok(dt) = NaiveDateTime::parse_from_str(value, format) {
            return Some(dt);
        }
    }
    NaiveDate::parse_from_str(value.get(..10)?, "%Y-%m-%d")
        .ok()
        .and_then(|d| d.and_hms_opt(0, 0, 0))
}

const NUMERIC_POS: u16 = 0x0000;
const NUMERIC_NEG: u16 = 0x4000;
const NUMERIC_NAN: u16 = 0xC000;

/// Writes a decimal string in PostgreSQL's binary NUMERIC format
/// (base-10000 digit groups with a weight and display scale).
fn encode_numeric(value: &str, out: &mut BytesMut) -> Result<IsNull, BoxError> {
    let (negative, body) = match value.strip_prefix('-') {
        Some(rest) => (true, rest),
        None => (false, value.strip_prefix('+').unwrap_or(value)),
    };
    let (int_part, frac_part) = body.split_once('.').unwrap_or((body, ""));
    if int_part.is_empty() && frac_part.is_empty()
        || !int_part.chars().chain(frac_part.chars()).all(|c| c.is_ascii_digit())
    {
        return Err(format!("invalid numeric: {}", value).into());
    }

    let int_part = int_part.trim_start_matches('0');
    let dscale = frac_part.len() as u16;

    let int_pad = (4 - int_part.len() % 4) % 4;
    let frac_pad = (4 - frac_part.len() % 4) % 4;
    let digits_str = format!(
        "{}{}{}{}",
        "0".repeat(int_pad),
        int_part,
        frac_part,
        "0".repeat(frac_pad)
    );

    let mut groups: Vec<i16> = digits_str
        .as_bytes()
        .chunks(4)
        .map(|chunk| {
            chunk
                .iter()
                .fold(0i16, |acc, d| acc * 10 + i16::from(d - b'0'))
        })
        .collect();
    let mut weight = ((int_part.len() + int_pad) / 4) as i16 - 1;

    while groups.first() == Some(&0) {
        groups.remove(0);
        weight -= 1;
    }
    while groups.last() == Some(&0) {
        groups.pop();
    }

    let sign = if groups.is_empty() {
        weight = 0;
        NUMERIC_POS
    } else if negative {
        NUMERIC_NEG
    } else {
        NUMERIC_POS
    };

    out.put_i16(groups.len() as i16);
    out.put_i16(weight);
    out.put_u16(sign);
    out.put_u16(dscale);
    for group in groups {
        out.put_i16(group);
    }
    Ok(IsNull::No)
}

/// NUMERIC decoded into the nearest `f64`, rounded at its display scale.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PgNumeric(pub f64);

impl<'a> FromSql<'a> for PgNumeric {
    fn from_sql(_ty: &Type, raw: &'a [u8]) -> Result<Self, BoxError> {
        if raw.len() < 8 {
            return Err("numeric value too short".into());
        }
        let read_u16 = |at: usize| u16::from_be_bytes([raw[at], raw[at + 1]]);
        let ndigits = read_u16(0) as usize;
        let weight = read_u16(2) as i16 as i32;
        let sign = read_u16(4);
        let dscale = read_u16(6).min(15) as i32;

        if sign == NUMERIC_NAN {
            return Ok(PgNumeric(f64::NAN));
        }
        if raw.len() < 8 + ndigits * 2 {
            return Err("numeric value truncated".into());
        }

        let mut value = 0f64;
        for i in 0..ndigits {
            let digit = f64::from(read_u16(8 + i * 2));
            value += digit * 10000f64.powi(weight - i as i32);
        }
        let scale = 10f64.powi(dscale);
        value = (value * scale).round() / scale;

        Ok(PgNumeric(if sign == NUMERIC_NEG { -value } else { value }))
    }

    fn accepts(ty: &Type) -> bool {
        *ty == Type::NUMERIC
    }
}

fn cell<'a, T, F>(row: &'a Row, idx: usize, render: F) -> Option<Value>
where
    T: FromSql<'a>,
    F: FnOnce(T) -> Value,
{
    match row.try_get::<_, Option<T>>(idx) {
        Ok(Some(v)) => Some(render(v)),
        Ok(None) => Some(Value::Null),
        Err(_) => None,
    }
}

fn column_value(row: &Row, idx: usize, ty: &Type) -> Value {
    let value = match *ty {
        Type::INT2 => cell(row, idx, |v: i16| json!(v)),
        Type::INT4 => cell(row, idx, |v: i32| json!(v)),
        Type::INT8 => cell(row, idx, |v: i64| json!(v)),
        Type::OID => cell(row, idx, |v: u32| json!(v)),
        Type::FLOAT4 => cell(row, idx, |v: f32| float_json(f64::from(v))),
        Type::FLOAT8 => cell(row, idx, float_json),
        Type::NUMERIC => cell(row, idx, |v: PgNumeric| float_json(v.0)),
        Type::BOOL => cell(row, idx, |v: bool| json!(v)),
        Type::TIMESTAMP => cell(row, idx, datetime_json),
        Type::TIMESTAMPTZ => cell(row, idx, |v: DateTime<Utc>| datetime_json(v.naive_utc())),
        Type::DATE => cell(row, idx, date_json),
        _ => cell(row, idx, |v: String| json!(v)),
    };
    value.unwrap_or_else(|| json!(format!("<{}>", ty.name())))
}

pub fn row_to_json(row: &Row) -> Value {
    let mut object = Map::new();
    for (idx, column) in row.columns().iter().enumerate() {
        object.insert(column.name().to_string(), column_value(row, idx, column.type_()));
    }
    Value::Object(object)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn numeric_round_trip(value: &str) -> f64 {
        let mut buf = BytesMut::new();
        encode_numeric(value, &mut buf).unwrap();
        PgNumeric::from_sql(&Type::NUMERIC, &buf).unwrap().0
    }

    #[test]
    fn test_numeric_encoding() {
        assert_eq!(numeric_round_trip("1.99"), 1.99);
        assert_eq!(numeric_round_trip("-25.5"), -25.5);
        assert_eq!(numeric_round_trip("12345678.0001"), 12345678.0001);
        assert_eq!(numeric_round_trip("0.0099"), 0.0099);
        assert_eq!(numeric_round_trip("0"), 0.0);
        assert_eq!(numeric_round_trip("10000"), 10000.0);
    }

    #[test]
    fn test_numeric_layout() {
        let mut buf = BytesMut::new();
        encode_numeric("1.99", &mut buf).unwrap();
        // ndigits=2, weight=0, sign=+, dscale=2, digits [1, 9900]
        assert_eq!(&buf[..], &[0, 2, 0, 0, 0, 0, 0, 2, 0, 1, 0x26, 0xAC]);
    }

    #[test]
    fn test_numeric_rejects_garbage() {
        let mut buf = BytesMut::new();
        assert!(encode_numeric("12a", &mut buf).is_err());
        assert!(encode_numeric("", &mut buf).is_err());
    }

    #[test]
    fn test_parse_timestamp_formats() {
        let expected = NaiveDate::from_ymd_opt(2024, 3, 1)
            .unwrap()
            .and_hms_opt(10, 30, 0)
            .unwrap();
        assert_eq!(parse_timestamp("2024-03-01T10:30:00"), Some(expected));
        assert_eq!(parse_timestamp("2024-03-01 10:30:00"), Some(expected));
        assert_eq!(parse_timestamp("2024-03-01T10:30:00.000Z"), Some(expected));
        assert_eq!(
            parse_timestamp("2024-03-01"),
            NaiveDate::from_ymd_opt(2024, 3, 1).unwrap().and_hms_opt(0, 0, 0)
        );
        assert_eq!(parse_timestamp("yesterday"), None);
    }

    #[test]
    fn test_bind_by_target_type() {
        let mut buf = BytesMut::new();
        SqlValue::Text("42".into()).to_sql(&Type::INT4, &mut buf).unwrap();
        assert_eq!(&buf[..], &42i32.to_be_bytes());

        let mut buf = BytesMut::new();
        assert!(SqlValue::Int(70000).to_sql(&Type::INT2, &mut buf).is_err());

        let mut buf = BytesMut::new();
        let null = SqlValue::Null.to_sql(&Type::TEXT, &mut buf).unwrap();
        assert!(matches!(null, IsNull::Yes));
    }
}
