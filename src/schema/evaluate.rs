//! Evaluates documents against rendered `$jsonSchema` validators.
//!
//! Covers the keywords the managed validators use: `bsonType`, `required`,
//! `properties`, `minLength`, `maxLength`, `pattern`, `enum`, `minItems`,
//! `maxItems`, `items`, `minimum` and `maximum`. Keywords only apply to
//! values of the matching type, as on the server.

use mongodb::bson::{Bson, Document};
use regex::Regex;

use super::BsonType;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Violation {
    /// Dotted path of the offending value, empty for the document itself
    pub path: String,
    pub reason: String,
}

impl std::fmt::Display for Violation {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        if self.path.is_empty() {
            write!(f, "{}", self.reason)
        } else {
            write!(f, "{}: {}", self.path, self.reason)
        }
    }
}

/// Returns every violation of `validator` by `document`; empty means accepted.
///
/// `validator` may be the full `{ "$jsonSchema": ... }` option or the bare schema.
pub fn evaluate(validator: &Document, document: &Document) -> Vec<Violation> {
    let schema = validator.get_document("$jsonSchema").unwrap_or(validator);
    let mut violations = Vec::new();
    check_value(
        "",
        schema,
        &Bson::Document(document.clone()),
        &mut violations,
    );
    violations
}

fn check_value(path: &str, schema: &Document, value: &Bson, out: &mut Vec<Violation>) {
    let mut push = |reason: String| {
        out.push(Violation {
            path: path.to_string(),
            reason,
        })
    };

    if let Some(expected) = schema.get("bsonType") {
        if !type_matches(expected, value) {
            push(format!(
                "expected bsonType {}, found {}",
                expected_types(expected),
                type_name(value)
            ));
            return;
        }
    }

    if let Ok(allowed) = schema.get_array("enum") {
        if !allowed.contains(value) {
            push(format!("{} is not one of {:?}", value, allowed));
        }
    }

    match value {
        Bson::String(s) => {
            let length = s.chars().count() as i64;
            if let Some(min) = number(schema, "minLength") {
                if (length as f64) < min {
                    push(format!("length {} is shorter than {}", length, min));
                }
            }
            if let Some(max) = number(schema, "maxLength") {
                if (length as f64) > max {
                    push(format!("length {} is longer than {}", length, max));
                }
            }
            if let Ok(pattern) = schema.get_str("pattern") {
                match Regex::new(pattern) {
                    Ok(re) if re.is_match(s) => {}
                    Ok(_) => push(format!("does not match pattern {}", pattern)),
                    Err(e) => push(format!("invalid pattern {}: {}", pattern, e)),
                }
            }
        }
        Bson::Array(items) => {
            let count = items.len() as f64;
            if let Some(min) = number(schema, "minItems") {
                if count < min {
                    push(format!("has {} items, fewer than {}", items.len(), min));
                }
            }
            if let Some(max) = number(schema, "maxItems") {
                if count > max {
                    push(format!("has {} items, more than {}", items.len(), max));
                }
            }
            if let Ok(item_schema) = schema.get_document("items") {
                for (i, item) in items.iter().enumerate() {
                    check_value(&join(path, &i.to_string()), item_schema, item, out);
                }
            }
        }
        Bson::Document(doc) => {
            if let Ok(required) = schema.get_array("required") {
                for field in required.iter().filter_map(Bson::as_str) {
                    if !doc.contains_key(field) {
                        out.push(Violation {
                            path: join(path, field),
                            reason: "required field is missing".to_string(),
                        });
                    }
                }
            }
            if let Ok(properties) = schema.get_document("properties") {
                for (field, rule) in properties {
                    let (Some(child), Bson::Document(rule)) = (doc.get(field), rule) else {
                        continue;
                    };
                    check_value(&join(path, field), rule, child, out);
                }
            }
        }
        _ => {}
    }

    if let Some(actual) = as_f64(value) {
        if let Some(min) = number(schema, "minimum") {
            if actual < min {
                out.push(Violation {
                    path: path.to_string(),
                    reason: format!("{} is below the minimum {}", value, min),
                });
            }
        }
        if let Some(max) = number(schema, "maximum") {
            if actual > max {
                out.push(Violation {
                    path: path.to_string(),
                    reason: format!("{} is above the maximum {}", value, max),
                });
            }
        }
    }
}

fn type_matches(expected: &Bson, value: &Bson) -> bool {
    let matches_alias = |alias: &str| {
        BsonType::from_alias(alias)
            .map(|t| t.matches(value))
            .unwrap_or(false)
    };
    match expected {
        Bson::String(alias) => matches_alias(alias),
        Bson::Array(aliases) => aliases.iter().filter_map(Bson::as_str).any(matches_alias),
        _ => false,
    }
}

fn expected_types(expected: &Bson) -> String {
    match expected {
        Bson::String(alias) => alias.clone(),
        Bson::Array(aliases) => aliases
            .iter()
            .filter_map(Bson::as_str)
            .collect::<Vec<_>>()
            .join(" | "),
        other => other.to_string(),
    }
}

fn type_name(value: &Bson) -> &'static str {
    match value {
        Bson::Document(_) => "object",
        Bson::String(_) => "string",
        Bson::Boolean(_) => "bool",
        Bson::Array(_) => "array",
        Bson::ObjectId(_) => "objectId",
        Bson::Int32(_) => "int",
        Bson::Int64(_) => "long",
        Bson::Double(_) => "double",
        Bson::DateTime(_) => "date",
        Bson::Null => "null",
        _ => "other",
    }
}

fn as_f64(value: &Bson) -> Option<f64> {
    match value {
        Bson::Int32(v) => Some(*v as f64),
        Bson::Int64(v) => Some(*v as f64),
        Bson::Double(v) => Some(*v),
        _ => None,
    }
}

fn number(schema: &Document, key: &str) -> Option<f64> {
    schema.get(key).and_then(as_f64)
}

fn join(path: &str, field: &str) -> String {
    if path.is_empty() {
        field.to_string()
    } else {
        format!("{}.{}", path, field)
    }
}
