//! Schema node → random `serde_json::Value` generator
//!
//! Produces one value satisfying the node's constraints: enums, booleans,
//! numbers within (exclusive) bounds, dates, pattern-driven strings with
//! `byte` / `binary` encodings, and arrays of generated items. Object and
//! `allOf` schemas are not generated.

use apiplan_core::schema::{Constraints, PrimitiveType, SchemaError, SchemaGraph, SchemaId, SchemaKind};
use apiplan_core::{ErrorKind, Parameter};
use base64::Engine as _;
use chrono::{Duration, SecondsFormat, Utc};
use rand::Rng;
use serde_json::{Value, json};

use crate::regexgen::{self, PatternError, PatternGenerator};

/// Offset applied to exclusive numeric bounds.
const EPSILON: f64 = 0.01;

/// Generated dates fall within this many days before now.
const DATE_WINDOW_DAYS: i64 = 30;

/// Attempts at a declared pattern before giving up on length bounds.
const PATTERN_ATTEMPTS: usize = 16;

/// Maximum array length (prevents OOM on absurd minItems values).
const MAX_ITEMS: u64 = 1_000;

/// Maximum string length for the fallback generator.
const MAX_STRING_LEN: u64 = 10_000;

/// Generate a value for a declared operation parameter.
///
/// Default strings are prefixed with the parameter name.
///
/// # Errors
///
/// See [`generate`].
pub fn generate_parameter(
    graph: &SchemaGraph,
    param: &Parameter,
    rng: &mut impl Rng,
) -> Result<Value, GenerateError> {
    generate(graph, param.schema, &format!("{}-", param.name), rng)
}

/// Generate a random value satisfying schema node `id`.
///
/// `prefix` seeds strings that have no declared pattern.
///
/// # Errors
///
/// Fails for object and composite schemas, conflicting numeric bounds,
/// unsupported string formats, invalid or unsatisfiable patterns, untyped
/// schemas, and unresolved references.
pub fn generate(
    graph: &SchemaGraph,
    id: SchemaId,
    prefix: &str,
    rng: &mut impl Rng,
) -> Result<Value, GenerateError> {
    let id = graph.dereference(id)?;
    let node = graph.node(id);
    let c = node.constraints();

    match node.kind() {
        SchemaKind::Object { .. } => {
            return Err(GenerateError::NotImplemented("object".to_string()));
        }
        SchemaKind::Composite { .. } => {
            return Err(GenerateError::NotImplemented("allOf".to_string()));
        }
        _ => {}
    }

    if !c.enumeration.is_empty() {
        return Ok(c.enumeration[rng.gen_range(0..c.enumeration.len())].clone());
    }

    match node.kind() {
        SchemaKind::Array { item } => gen_array(graph, *item, c, prefix, rng),
        SchemaKind::Primitive { ty: Some(ty), format } => match ty {
            PrimitiveType::Boolean => Ok(Value::Bool(rng.gen_bool(0.5))),
            PrimitiveType::Integer => gen_integer(c, rng),
            PrimitiveType::Number => Ok(json!(gen_number(c, rng)?)),
            PrimitiveType::String => gen_string(c, format.as_deref(), prefix, rng).map(Value::String),
        },
        _ => Err(GenerateError::Untyped),
    }
}

/// Declared bounds after the exclusive adjustment.
///
/// Both bounds present with `min >= max` is a conflict, as is an exclusive
/// pair that leaves nothing between them.
fn declared_bounds(c: &Constraints) -> Result<(Option<f64>, Option<f64>), GenerateError> {
    let lo = c
        .minimum
        .map(|m| if c.exclusive_minimum { m + EPSILON } else { m });
    let hi = c
        .maximum
        .map(|m| if c.exclusive_maximum { m - EPSILON } else { m });

    match (c.minimum, c.maximum, lo, hi) {
        (Some(min), Some(max), Some(lo), Some(hi)) if min >= max || lo > hi => {
            Err(GenerateError::ConflictingBounds { min: lo, max: hi })
        }
        _ => Ok((lo, hi)),
    }
}

/// Fill in a missing bound: zero, unless that leaves nothing to draw from.
fn synthesize(lo: Option<f64>, hi: Option<f64>) -> (f64, f64) {
    match (lo, hi) {
        (Some(lo), Some(hi)) => (lo, hi),
        (Some(lo), None) if lo >= 0.0 => (lo, lo + lo.abs()),
        (Some(lo), None) => (lo, 0.0),
        (None, Some(hi)) if hi <= 0.0 => (hi - hi.abs(), hi),
        (None, Some(hi)) => (0.0, hi),
        (None, None) => (-1.0, 1.0),
    }
}

/// Effective `[min, max]` range for numeric generation.
fn number_range(c: &Constraints) -> Result<(f64, f64), GenerateError> {
    let (lo, hi) = declared_bounds(c)?;
    Ok(synthesize(lo, hi))
}

/// Effective `[min, max]` integer range: `[ceil(min), floor(max)]`, with
/// exclusive bounds stepping past the endpoint itself.
fn integer_range(c: &Constraints) -> Result<(i64, i64), GenerateError> {
    declared_bounds(c)?;
    let lo = c
        .minimum
        .map(|m| if c.exclusive_minimum { m.floor() + 1.0 } else { m.ceil() });
    let hi = c
        .maximum
        .map(|m| if c.exclusive_maximum { m.ceil() - 1.0 } else { m.floor() });
    let (lo, hi) = synthesize(lo, hi);
    if lo > hi {
        return Err(GenerateError::ConflictingBounds { min: lo, max: hi });
    }
    #[allow(clippy::cast_possible_truncation)]
    let range = (lo as i64, hi as i64);
    Ok(range)
}

fn gen_number(c: &Constraints, rng: &mut impl Rng) -> Result<f64, GenerateError> {
    let (lo, hi) = number_range(c)?;
    if hi <= lo {
        return Ok(lo);
    }
    Ok(lo + rng.r#gen::<f64>() * (hi - lo))
}

fn gen_integer(c: &Constraints, rng: &mut impl Rng) -> Result<Value, GenerateError> {
    let (lo, hi) = integer_range(c)?;
    Ok(Value::from(rng.gen_range(lo..=hi)))
}

fn gen_string(
    c: &Constraints,
    format: Option<&str>,
    prefix: &str,
    rng: &mut impl Rng,
) -> Result<String, GenerateError> {
    match format {
        Some("date-time") => return Ok(random_instant(rng).to_rfc3339_opts(SecondsFormat::Secs, true)),
        Some("date") => return Ok(random_instant(rng).format("%Y-%m-%d").to_string()),
        _ => {}
    }

    let raw = match &c.pattern {
        Some(pattern) => pattern_string(pattern, c, rng)?,
        None => default_string(prefix, c, rng),
    };

    match format {
        None | Some("password") => Ok(raw),
        Some("byte") => Ok(base64::engine::general_purpose::STANDARD.encode(raw)),
        Some("binary") => Ok(hex::encode(raw)),
        Some(other) => Err(GenerateError::UnsupportedFormat(other.to_string())),
    }
}

fn random_instant(rng: &mut impl Rng) -> chrono::DateTime<Utc> {
    let window_ms = DATE_WINDOW_DAYS * 24 * 60 * 60 * 1000;
    Utc::now() - Duration::milliseconds(rng.gen_range(1..=window_ms))
}

fn fits_length(s: &str, c: &Constraints) -> bool {
    let len = s.chars().count() as u64;
    c.min_length.is_none_or(|min| len >= min) && c.max_length.is_none_or(|max| len <= max)
}

fn pattern_string(pattern: &str, c: &Constraints, rng: &mut impl Rng) -> Result<String, GenerateError> {
    let limit = u32::try_from(pattern.len() * 2).unwrap_or(u32::MAX);
    let invalid = |e: PatternError| GenerateError::InvalidPattern {
        pattern: pattern.to_string(),
        message: e.to_string(),
    };
    let generator = PatternGenerator::new(pattern, limit).map_err(invalid)?;
    for _ in 0..PATTERN_ATTEMPTS {
        let s = generator.generate(rng).map_err(invalid)?;
        if fits_length(&s, c) {
            return Ok(s);
        }
    }
    Err(GenerateError::Unsatisfiable(pattern.to_string()))
}

fn default_string(prefix: &str, c: &Constraints, rng: &mut impl Rng) -> String {
    let pattern = format!("{}[0-9]+", regex_syntax::escape(prefix));
    let limit = u32::try_from(prefix.len() + 5).unwrap_or(u32::MAX);
    if let Ok(s) = regexgen::generate(&pattern, limit, rng) {
        if fits_length(&s, c) {
            return s;
        }
    }
    let min = c.min_length.unwrap_or(1).min(MAX_STRING_LEN);
    let max = c.max_length.unwrap_or(min.max(8)).min(MAX_STRING_LEN).max(min);
    #[allow(clippy::cast_possible_truncation)]
    let len = rng.gen_range(min..=max) as usize;
    random_alnum(rng, len)
}

fn gen_array(
    graph: &SchemaGraph,
    item: SchemaId,
    c: &Constraints,
    prefix: &str,
    rng: &mut impl Rng,
) -> Result<Value, GenerateError> {
    let min = c.min_items.unwrap_or(0);
    let max = c.max_items.unwrap_or(min);
    // An explicit `maxItems: 0` only admits the empty array, so it wins over
    // the single-item fallback for degenerate ranges.
    let count = if c.max_items == Some(0) {
        0
    } else if min == max && min != 0 {
        min
    } else if max > min {
        rng.gen_range(min..=max)
    } else {
        1
    }
    .min(MAX_ITEMS);

    let item_prefix = format!("{prefix}-");
    (0..count)
        .map(|_| generate(graph, item, &item_prefix, rng))
        .collect::<Result<Vec<_>, _>>()
        .map(Value::Array)
}

fn random_alnum(rng: &mut impl Rng, len: usize) -> String {
    const CHARS: &[u8] = b"abcdefghijklmnopqrstuvwxyzABCDEFGHIJKLMNOPQRSTUVWXYZ0123456789";
    (0..len)
        .map(|_| CHARS[rng.gen_range(0..CHARS.len())] as char)
        .collect()
}

#[derive(Debug, thiserror::Error)]
pub enum GenerateError {
    #[error("generating {0} values is not implemented")]
    NotImplemented(String),
    #[error("specified min value {min} is bigger than max {max}")]
    ConflictingBounds { min: f64, max: f64 },
    #[error("invalid format string: {0}")]
    UnsupportedFormat(String),
    #[error("invalid pattern {pattern}: {message}")]
    InvalidPattern { pattern: String, message: String },
    #[error("no string matching {0} satisfies the length bounds")]
    Unsatisfiable(String),
    #[error("schema doesn't have a type")]
    Untyped,
    #[error(transparent)]
    Schema(#[from] SchemaError),
}

impl GenerateError {
    #[must_use]
    pub const fn kind(&self) -> ErrorKind {
        match self {
            Self::Schema(e) => e.kind(),
            _ => ErrorKind::Invalid,
        }
    }
}
