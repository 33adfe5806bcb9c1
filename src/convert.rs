//! Value coercion engine
//!
//! One conversion routine serves literal attribute assignment, style
//! defaults and runtime binding pushes. Priority order:
//!
//! 1. target kind Any — no-op
//! 2. already assignable — no-op
//! 3. string → primitive — parse
//! 4. primitive → primitive — numeric coercion
//! 5. user-registered implicit conversion
//! 6. enum target — case-insensitive parse, multi-flag `,`/`|`
//! 7. ConversionError
//!
//! Null inputs convert to the target kind's zero value: string reads
//! never produce null, unset value-kinds read as zero.

use serde_json::Value;

use crate::error::AmlError;
use crate::registry::{TypeRegistry, ValueKind};

/// Kind tag of a dynamic value, for conversion keys and diagnostics
pub fn value_tag(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "bool",
        Value::Number(n) if n.is_f64() => "float",
        Value::Number(_) => "int",
        Value::String(_) => "str",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}

fn assignable(value: &Value, kind: &ValueKind) -> bool {
    match kind {
        ValueKind::Any => true,
        ValueKind::Bool => value.is_boolean(),
        ValueKind::Int => value.is_i64() || value.is_u64(),
        ValueKind::Float => value.is_f64(),
        ValueKind::Str => value.is_string(),
        // enum values always go through the variant parse
        ValueKind::Enum(_) => false,
    }
}

fn parse_str(text: &str, kind: &ValueKind) -> Option<Value> {
    let trimmed = text.trim();
    match kind {
        ValueKind::Bool => match trimmed.to_ascii_lowercase().as_str() {
            "true" => Some(Value::Bool(true)),
            "false" => Some(Value::Bool(false)),
            _ => None,
        },
        ValueKind::Int => trimmed.parse::<i64>().ok().map(Value::from),
        ValueKind::Float => trimmed.parse::<f64>().ok().map(Value::from),
        ValueKind::Str => Some(Value::String(text.to_string())),
        ValueKind::Any | ValueKind::Enum(_) => None,
    }
}

fn numeric_coerce(value: &Value, kind: &ValueKind) -> Option<Value> {
    match kind {
        ValueKind::Int => {
            if let Some(f) = value.as_f64() {
                return Some(Value::from(f as i64));
            }
            if let Some(b) = value.as_bool() {
                return Some(Value::from(if b { 1i64 } else { 0i64 }));
            }
            None
        }
        ValueKind::Float => value.as_i64().map(|i| Value::from(i as f64)),
        ValueKind::Bool => value.as_i64().map(|i| Value::Bool(i != 0)),
        ValueKind::Str => match value {
            Value::Bool(b) => Some(Value::String(b.to_string())),
            Value::Number(n) => Some(Value::String(n.to_string())),
            _ => None,
        },
        ValueKind::Any | ValueKind::Enum(_) => None,
    }
}

/// Convert `value` to the declared `kind`
pub fn convert(value: &Value, kind: &ValueKind, registry: &TypeRegistry) -> Result<Value, AmlError> {
    // (1) object target: no-op
    if matches!(kind, ValueKind::Any) {
        return Ok(value.clone());
    }

    // null reads fall back to the kind's zero value
    if value.is_null() {
        return Ok(kind.zero());
    }

    // (2) assignable: no-op
    if assignable(value, kind) {
        return Ok(value.clone());
    }

    // (3) string → primitive
    if let Value::String(text) = value {
        if let Some(parsed) = parse_str(text, kind) {
            return Ok(parsed);
        }
        // a failed primitive parse of a string literal is a literal
        // error unless the user or enum paths below apply
        if let Some(f) = registry.find_conversion(value_tag(value), kind.tag()) {
            if let Some(converted) = f(value) {
                return Ok(converted);
            }
        }
        if let ValueKind::Enum(desc) = kind {
            return desc.parse(text).map(Value::String);
        }
        return Err(AmlError::BadLiteral {
            literal: text.clone(),
            target: kind.tag().to_string(),
        });
    }

    // (4) primitive → primitive numeric coercion
    if let Some(coerced) = numeric_coerce(value, kind) {
        return Ok(coerced);
    }

    // (5) user-registered implicit conversion
    if let Some(f) = registry.find_conversion(value_tag(value), kind.tag()) {
        if let Some(converted) = f(value) {
            return Ok(converted);
        }
    }

    // (6) handled above for strings; non-string enum input has no path
    Err(AmlError::NoConversion {
        value: format!("{value} ({})", value_tag(value)),
        target: kind.tag().to_string(),
    })
}

/// Convert an attribute literal (always text in markup)
pub fn convert_literal(
    text: &str,
    kind: &ValueKind,
    registry: &TypeRegistry,
) -> Result<Value, AmlError> {
    convert(&Value::String(text.to_string()), kind, registry)
}
