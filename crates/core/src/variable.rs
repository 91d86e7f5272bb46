// SPDX-License-Identifier: MIT

//! Process variables: a tagged sum type with a typed accessor API (§9 design
//! notes explicitly reject an untyped bag of values).

use crate::error::InvalidVariableError;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// The allowed variable type tags (§3 data model).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum VariableType {
    Integer,
    Float,
    Boolean,
    String,
    Json,
    Date,
}

crate::simple_display! {
    VariableType {
        Integer => "integer",
        Float => "float",
        Boolean => "boolean",
        String => "string",
        Json => "json",
        Date => "date",
    }
}

/// A typed variable value. The type tag and the payload variant always
/// agree — there is no representable state where they disagree.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", content = "value", rename_all = "lowercase")]
pub enum VariableValue {
    Integer(i64),
    Float(f64),
    Boolean(bool),
    String(String),
    Json(serde_json::Value),
    Date(DateTime<Utc>),
}

impl VariableValue {
    pub fn type_tag(&self) -> VariableType {
        match self {
            VariableValue::Integer(_) => VariableType::Integer,
            VariableValue::Float(_) => VariableType::Float,
            VariableValue::Boolean(_) => VariableType::Boolean,
            VariableValue::String(_) => VariableType::String,
            VariableValue::Json(_) => VariableType::Json,
            VariableValue::Date(_) => VariableType::Date,
        }
    }

    /// Decode an (untyped tag, raw JSON value) pair from the wire/API
    /// boundary into a `VariableValue`, validating the tag against the
    /// allowed set and the value against the tag (§4.2 `create_instance`).
    pub fn from_tagged(
        type_tag: &str,
        value: serde_json::Value,
    ) -> Result<Self, InvalidVariableError> {
        match type_tag {
            "integer" => value
                .as_i64()
                .map(VariableValue::Integer)
                .ok_or_else(|| InvalidVariableError::TypeMismatch {
                    type_tag: type_tag.to_string(),
                    value: value.clone(),
                }),
            "float" => value
                .as_f64()
                .map(VariableValue::Float)
                .ok_or_else(|| InvalidVariableError::TypeMismatch {
                    type_tag: type_tag.to_string(),
                    value: value.clone(),
                }),
            "boolean" => value
                .as_bool()
                .map(VariableValue::Boolean)
                .ok_or_else(|| InvalidVariableError::TypeMismatch {
                    type_tag: type_tag.to_string(),
                    value: value.clone(),
                }),
            "string" => value
                .as_str()
                .map(|s| VariableValue::String(s.to_string()))
                .ok_or_else(|| InvalidVariableError::TypeMismatch {
                    type_tag: type_tag.to_string(),
                    value: value.clone(),
                }),
            "json" => Ok(VariableValue::Json(value)),
            "date" => value
                .as_str()
                .and_then(|s| DateTime::parse_from_rfc3339(s).ok())
                .map(|dt| VariableValue::Date(dt.with_timezone(&Utc)))
                .ok_or_else(|| InvalidVariableError::TypeMismatch {
                    type_tag: type_tag.to_string(),
                    value: value.clone(),
                }),
            other => Err(InvalidVariableError::UnknownType(other.to_string())),
        }
    }

    /// Decode back into a native JSON value for API responses
    /// (`get_instance_variables`, §4.2).
    pub fn to_native_json(&self) -> serde_json::Value {
        match self {
            VariableValue::Integer(v) => serde_json::json!(v),
            VariableValue::Float(v) => serde_json::json!(v),
            VariableValue::Boolean(v) => serde_json::json!(v),
            VariableValue::String(v) => serde_json::json!(v),
            VariableValue::Json(v) => v.clone(),
            VariableValue::Date(v) => serde_json::json!(v.to_rfc3339()),
        }
    }
}

/// A parsed `{name: {type, value}}` map from the `create_instance` request
/// body, prior to type validation.
pub type RawVariables = HashMap<String, RawVariable>;

#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct RawVariable {
    #[serde(rename = "type")]
    pub type_tag: String,
    pub value: serde_json::Value,
}

/// Validate and decode a full `create_instance` variable map (§4.2).
pub fn decode_variables(
    raw: RawVariables,
) -> Result<HashMap<String, VariableValue>, InvalidVariableError> {
    raw.into_iter()
        .map(|(name, rv)| {
            VariableValue::from_tagged(&rv.type_tag, rv.value).map(|v| (name, v))
        })
        .collect()
}
