//! Declarative collection validators and index plan.
//!
//! Everything here is plain data: it can be checked and evaluated against
//! sample documents without a server, then rendered into the documents
//! MongoDB expects (`$jsonSchema` validators and `IndexModel`s).

pub mod collections;
pub mod evaluate;
pub mod indexes;
pub mod samples;

use mongodb::bson::{doc, Bson, Document};
use regex::Regex;

use crate::utils::ProvisionError;

pub use collections::*;
pub use evaluate::*;
pub use indexes::*;
pub use samples::*;

/// `bsonType` aliases used by the validators
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BsonType {
    Object,
    String,
    Bool,
    Array,
    ObjectId,
    Int,
    Long,
    Double,
    Date,
}

impl BsonType {
    pub fn as_str(&self) -> &'static str {
        match self {
            BsonType::Object => "object",
            BsonType::String => "string",
            BsonType::Bool => "bool",
            BsonType::Array => "array",
            BsonType::ObjectId => "objectId",
            BsonType::Int => "int",
            BsonType::Long => "long",
            BsonType::Double => "double",
            BsonType::Date => "date",
        }
    }

    pub fn from_alias(alias: &str) -> Option<Self> {
        match alias {
            "object" => Some(BsonType::Object),
            "string" => Some(BsonType::String),
            "bool" => Some(BsonType::Bool),
            "array" => Some(BsonType::Array),
            "objectId" => Some(BsonType::ObjectId),
            "int" => Some(BsonType::Int),
            "long" => Some(BsonType::Long),
            "double" => Some(BsonType::Double),
            "date" => Some(BsonType::Date),
            _ => None,
        }
    }

    /// Strict type match, as the server does it: a double never satisfies `int`.
    pub fn matches(&self, value: &Bson) -> bool {
        matches!(
            (self, value),
            (BsonType::Object, Bson::Document(_))
                | (BsonType::String, Bson::String(_))
                | (BsonType::Bool, Bson::Boolean(_))
                | (BsonType::Array, Bson::Array(_))
                | (BsonType::ObjectId, Bson::ObjectId(_))
                | (BsonType::Int, Bson::Int32(_))
                | (BsonType::Long, Bson::Int64(_))
                | (BsonType::Double, Bson::Double(_))
                | (BsonType::Date, Bson::DateTime(_))
        )
    }

    pub fn is_numeric(&self) -> bool {
        matches!(self, BsonType::Int | BsonType::Long | BsonType::Double)
    }
}

/// Constraints on a single top-level field
#[derive(Debug, Clone, PartialEq)]
pub struct FieldRule {
    pub bson_type: BsonType,
    pub min_length: Option<u32>,
    pub max_length: Option<u32>,
    pub pattern: Option<&'static str>,
    pub enum_values: Option<Vec<String>>,
    pub min_items: Option<u32>,
    pub items: Option<BsonType>,
    pub minimum: Option<i64>,
    pub maximum: Option<i64>,
    pub description: String,
}

impl FieldRule {
    pub fn of(bson_type: BsonType, description: impl Into<String>) -> Self {
        Self {
            bson_type,
            min_length: None,
            max_length: None,
            pattern: None,
            enum_values: None,
            min_items: None,
            items: None,
            minimum: None,
            maximum: None,
            description: description.into(),
        }
    }

    pub fn string(description: impl Into<String>) -> Self {
        Self::of(BsonType::String, description)
    }

    pub fn boolean(description: impl Into<String>) -> Self {
        Self::of(BsonType::Bool, description)
    }

    pub fn object_id(description: impl Into<String>) -> Self {
        Self::of(BsonType::ObjectId, description)
    }

    pub fn date(description: impl Into<String>) -> Self {
        Self::of(BsonType::Date, description)
    }

    pub fn int(description: impl Into<String>) -> Self {
        Self::of(BsonType::Int, description)
    }

    pub fn array_of(items: BsonType, description: impl Into<String>) -> Self {
        let mut rule = Self::of(BsonType::Array, description);
        rule.items = Some(items);
        rule
    }

    pub fn min_length(mut self, min: u32) -> Self {
        self.min_length = Some(min);
        self
    }

    pub fn max_length(mut self, max: u32) -> Self {
        self.max_length = Some(max);
        self
    }

    pub fn pattern(mut self, pattern: &'static str) -> Self {
        self.pattern = Some(pattern);
        self
    }

    pub fn one_of<I, S>(mut self, values: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.enum_values = Some(values.into_iter().map(Into::into).collect());
        self
    }

    pub fn min_items(mut self, min: u32) -> Self {
        self.min_items = Some(min);
        self
    }

    pub fn range(mut self, minimum: i64, maximum: i64) -> Self {
        self.minimum = Some(minimum);
        self.maximum = Some(maximum);
        self
    }

    /// Renders the rule as a `$jsonSchema` property document.
    pub fn to_document(&self) -> Document {
        let mut rule = doc! { "bsonType": self.bson_type.as_str() };

        if let Some(min) = self.min_length {
            rule.insert("minLength", min as i64);
        }
        if let Some(max) = self.max_length {
            rule.insert("maxLength", max as i64);
        }
        if let Some(pattern) = self.pattern {
            rule.insert("pattern", pattern);
        }
        if let Some(values) = &self.enum_values {
            rule.insert("enum", values.clone());
        }
        if let Some(min) = self.min_items {
            rule.insert("minItems", min as i64);
        }
        if let Some(items) = self.items {
            rule.insert("items", doc! { "bsonType": items.as_str() });
        }
        if let Some(minimum) = self.minimum {
            rule.insert("minimum", minimum);
        }
        if let Some(maximum) = self.maximum {
            rule.insert("maximum", maximum);
        }
        rule.insert("description", self.description.as_str());

        rule
    }

    fn check(&self, collection: &str, field: &str) -> Result<(), ProvisionError> {
        let fail = |message: String| Err(ProvisionError::schema(collection, message));
        let is_string = self.bson_type == BsonType::String;

        if (self.min_length.is_some() || self.max_length.is_some() || self.pattern.is_some())
            && !is_string
        {
            return fail(format!("{field}: string constraints on a non-string field"));
        }
        if let (Some(min), Some(max)) = (self.min_length, self.max_length) {
            if min > max {
                return fail(format!("{field}: minLength {min} exceeds maxLength {max}"));
            }
        }
        if let Some(pattern) = self.pattern {
            if let Err(e) = Regex::new(pattern) {
                return fail(format!("{field}: invalid pattern: {e}"));
            }
        }
        if let Some(values) = &self.enum_values {
            if values.is_empty() {
                return fail(format!("{field}: enum must list at least one value"));
            }
        }
        if (self.min_items.is_some() || self.items.is_some()) && self.bson_type != BsonType::Array
        {
            return fail(format!("{field}: array constraints on a non-array field"));
        }
        if (self.minimum.is_some() || self.maximum.is_some()) && !self.bson_type.is_numeric() {
            return fail(format!("{field}: numeric bounds on a non-numeric field"));
        }
        if let (Some(min), Some(max)) = (self.minimum, self.maximum) {
            if min > max {
                return fail(format!("{field}: minimum {min} exceeds maximum {max}"));
            }
        }

        Ok(())
    }
}

/// Validator for one collection: required fields plus per-field rules.
/// Fields not listed are allowed and unchecked.
#[derive(Debug, Clone, PartialEq)]
pub struct CollectionSchema {
    pub name: &'static str,
    pub required: Vec<&'static str>,
    pub properties: Vec<(&'static str, FieldRule)>,
}

impl CollectionSchema {
    pub fn new(name: &'static str) -> Self {
        Self {
            name,
            required: Vec::new(),
            properties: Vec::new(),
        }
    }

    /// Adds a field that every document must carry.
    pub fn required(mut self, field: &'static str, rule: FieldRule) -> Self {
        self.required.push(field);
        self.properties.push((field, rule));
        self
    }

    pub fn optional(mut self, field: &'static str, rule: FieldRule) -> Self {
        self.properties.push((field, rule));
        self
    }

    pub fn property(&self, field: &str) -> Option<&FieldRule> {
        self.properties
            .iter()
            .find(|(name, _)| *name == field)
            .map(|(_, rule)| rule)
    }

    /// The `validator` option for `create`/`collMod`.
    pub fn to_validator(&self) -> Document {
        let mut properties = Document::new();
        for (field, rule) in &self.properties {
            properties.insert(*field, rule.to_document());
        }

        doc! {
            "$jsonSchema": {
                "bsonType": "object",
                "required": self.required.clone(),
                "properties": properties,
            }
        }
    }

    /// Rejects definitions the server would refuse or that contradict themselves.
    pub fn check(&self) -> Result<(), ProvisionError> {
        for field in &self.required {
            if self.property(field).is_none() {
                return Err(ProvisionError::schema(
                    self.name,
                    format!("required field '{field}' has no rule"),
                ));
            }
        }

        let mut seen = Vec::with_capacity(self.properties.len());
        for (field, rule) in &self.properties {
            if seen.contains(field) {
                return Err(ProvisionError::schema(
                    self.name,
                    format!("field '{field}' declared twice"),
                ));
            }
            seen.push(*field);
            rule.check(self.name, field)?;
        }

        Ok(())
    }
}
