use crate::blueprint::{Action, ROOT_ID, Subrequest};
use crate::error::{Result, SubrequestsError};
use percent_encoding::percent_decode_str;
use serde_json::Value;
use std::collections::BTreeMap;
use uuid::Uuid;

/// Turns the raw blueprint input into normalized subrequests.
///
/// The parser only validates and fills defaults; dependency ordering is the
/// sequencer's job.
pub struct BlueprintParser;

impl BlueprintParser {
    pub fn new() -> Self {
        Self
    }

    pub fn parse_str(&self, input: &str) -> Result<Vec<Subrequest>> {
        let data: Value = serde_json::from_str(input)
            .map_err(|e| SubrequestsError::MalformedBlueprint(e.to_string()))?;
        self.parse(data)
    }

    /// Parses a decoded blueprint. The top level must be an ordered list,
    /// a keyed map is rejected.
    pub fn parse(&self, data: Value) -> Result<Vec<Subrequest>> {
        #[cfg(feature = "schema-validation")]
        validate_input(&data);

        let items = match data {
            Value::Array(items) => items,
            other => {
                return Err(SubrequestsError::MalformedBlueprint(format!(
                    "expected an array, got {}",
                    type_name(&other)
                )));
            }
        };
        items.into_iter().map(|item| self.fill_defaults(item)).collect()
    }

    /// Normalizes one raw record into a `Subrequest`.
    fn fill_defaults(&self, item: Value) -> Result<Subrequest> {
        let mut item = match item {
            Value::Object(item) => item,
            other => {
                return Err(SubrequestsError::MalformedBlueprint(format!(
                    "subrequest must be an object, got {}",
                    type_name(&other)
                )));
            }
        };

        let request_id = match item.remove("requestId") {
            Some(Value::String(id)) if !id.is_empty() => id,
            _ => Uuid::new_v4().to_string(),
        };

        let uri = match item.remove("uri") {
            Some(Value::String(uri)) if !uri.is_empty() => decode_token_delimiters(uri),
            _ => {
                return Err(SubrequestsError::MalformedBlueprint(format!(
                    "subrequest {request_id} is missing the uri"
                )));
            }
        };

        let action = match item.remove("action") {
            None | Some(Value::Null) => Action::default(),
            Some(value) => serde_json::from_value(value.clone()).map_err(|_| {
                SubrequestsError::MalformedBlueprint(format!("unknown action {value}"))
            })?,
        };

        // The body travels as a JSON-encoded string and is stored decoded.
        let body = match item.remove("body") {
            None | Some(Value::Null) => None,
            Some(Value::String(raw)) if raw.is_empty() => None,
            Some(Value::String(raw)) => Some(serde_json::from_str(&raw).map_err(|e| {
                SubrequestsError::MalformedBlueprint(format!(
                    "body of {request_id} is not valid JSON: {e}"
                ))
            })?),
            // Some consumers send the body already decoded.
            Some(value) => Some(value),
        };

        let headers = match item.remove("headers") {
            None | Some(Value::Null) => BTreeMap::new(),
            Some(Value::Object(map)) => {
                let mut headers = BTreeMap::new();
                for (name, value) in map {
                    let Value::String(value) = value else {
                        return Err(SubrequestsError::MalformedBlueprint(format!(
                            "header {name} of {request_id} must be a string"
                        )));
                    };
                    headers.insert(name, value);
                }
                headers
            }
            Some(other) => {
                return Err(SubrequestsError::MalformedBlueprint(format!(
                    "headers of {request_id} must be an object, got {}",
                    type_name(&other)
                )));
            }
        };

        let wait_for = match item.remove("waitFor") {
            None | Some(Value::Null) => vec![ROOT_ID.to_string()],
            Some(Value::Array(ids)) if ids.is_empty() => vec![ROOT_ID.to_string()],
            Some(Value::Array(ids)) => ids
                .into_iter()
                .map(|id| match id {
                    Value::String(id) => Ok(id),
                    other => Err(SubrequestsError::MalformedBlueprint(format!(
                        "waitFor of {request_id} must contain strings, got {}",
                        type_name(&other)
                    ))),
                })
                .collect::<Result<Vec<_>>>()?,
            Some(other) => {
                return Err(SubrequestsError::MalformedBlueprint(format!(
                    "waitFor of {request_id} must be an array, got {}",
                    type_name(&other)
                )));
            }
        };

        Ok(Subrequest {
            request_id,
            uri,
            action,
            body,
            headers,
            wait_for,
            resolved: false,
        })
    }
}

impl Default for BlueprintParser {
    fn default() -> Self {
        Self::new()
    }
}

/// Percent-decodes URIs carrying encoded token delimiters so that the token
/// scanner, which looks for literal `{{`/`}}`, can find them.
fn decode_token_delimiters(uri: String) -> String {
    if uri.contains("%7B%7B") && uri.contains("%7D%7D") {
        match percent_decode_str(&uri).decode_utf8() {
            Ok(decoded) => decoded.into_owned(),
            Err(_) => uri,
        }
    } else {
        uri
    }
}

fn type_name(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "a boolean",
        Value::Number(_) => "a number",
        Value::String(_) => "a string",
        Value::Array(_) => "an array",
        Value::Object(_) => "an object",
    }
}

/// Advisory check of the raw input against the blueprint schema. Violations
/// are logged, never fatal.
#[cfg(feature = "schema-validation")]
fn validate_input(data: &Value) {
    let schema = match serde_json::from_str(include_str!("../../schema.json")) {
        Ok(schema) => schema,
        Err(e) => {
            tracing::debug!(error = %e, "Blueprint schema is not valid JSON");
            return;
        }
    };
    let validator = match jsonschema::validator_for(&schema) {
        Ok(validator) => validator,
        Err(e) => {
            tracing::debug!(error = %e, "Unable to compile the blueprint schema");
            return;
        }
    };
    let errors: Vec<String> = validator.iter_errors(data).map(|e| e.to_string()).collect();
    if !errors.is_empty() {
        tracing::debug!(data = %data, "Blueprint failed validation");
        tracing::debug!(errors = ?errors, "Validation errors");
    }
}
