//! Tool, resource and prompt definitions, plus schema-driven argument
//! validation performed at the dispatch boundary.
//!
//! A [`Tool`] pairs a wire-visible [`ToolSpec`] (name, description, JSON
//! schema) with a [`ToolHandler`]. Handlers receive the validated argument
//! object as one `serde_json::Value`; defaults declared in the schema are
//! filled in before the handler runs.

use std::future::Future;
use std::sync::Arc;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::error::WireError;

/// Implementation behind a registered tool.
///
/// # Interaction
///
/// Invoked by `ToolServer` on `tools/call` after the arguments passed
/// schema validation. Errors become `-32603` responses unless the handler
/// deliberately returns another wire code.
#[async_trait]
pub trait ToolHandler: Send + Sync {
    async fn call(&self, args: Value) -> Result<Value, WireError>;
}

struct FnHandler<F> {
    f: F,
}

#[async_trait]
impl<F, Fut> ToolHandler for FnHandler<F>
where
    F: Fn(Value) -> Fut + Send + Sync,
    Fut: Future<Output = Result<Value, WireError>> + Send,
{
    async fn call(&self, args: Value) -> Result<Value, WireError> {
        (self.f)(args).await
    }
}

/// Wraps an async closure as a [`ToolHandler`].
pub fn handler_fn<F, Fut>(f: F) -> Arc<dyn ToolHandler>
where
    F: Fn(Value) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Result<Value, WireError>> + Send + 'static,
{
    Arc::new(FnHandler { f })
}

/// Wire-visible tool description, aligned with the `tools/list` result.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ToolSpec {
    pub name: String,
    pub description: String,
    #[serde(rename = "inputSchema")]
    pub input_schema: Value,
}

/// A named, schema-typed operation exported by a server.
#[derive(Clone)]
pub struct Tool {
    pub name: String,
    pub description: String,
    pub input_schema: Value,
    handler: Arc<dyn ToolHandler>,
}

impl Tool {
    pub fn new(
        name: impl Into<String>,
        description: impl Into<String>,
        input_schema: Value,
        handler: Arc<dyn ToolHandler>,
    ) -> Self {
        Self {
            name: name.into(),
            description: description.into(),
            input_schema,
            handler,
        }
    }

    pub fn spec(&self) -> ToolSpec {
        ToolSpec {
            name: self.name.clone(),
            description: self.description.clone(),
            input_schema: self.input_schema.clone(),
        }
    }

    /// Validates `args` against the input schema (filling declared
    /// defaults), then runs the handler.
    pub async fn invoke(&self, args: Value) -> Result<Value, WireError> {
        let args = validate_args(&self.input_schema, args)?;
        self.handler.call(args).await
    }
}

impl std::fmt::Debug for Tool {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Tool")
            .field("name", &self.name)
            .field("description", &self.description)
            .finish()
    }
}

/// Named addressable content object; contents fetched on demand via
/// `resources/read`.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Resource {
    pub uri: String,
    pub name: String,
    pub description: String,
    #[serde(rename = "mimeType", skip_serializing_if = "Option::is_none")]
    pub mime_type: Option<String>,
    #[serde(skip)]
    pub text: Option<String>,
}

/// Named prompt template served via `prompts/get`.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Prompt {
    pub name: String,
    pub description: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub arguments: Option<Value>,
    #[serde(skip)]
    pub template: Option<String>,
}

/// Validates an argument object against a JSON-schema fragment.
///
/// Checks: args must be an object; every `required` name present; property
/// types match (`string`, `integer`, `number`, `boolean`, `object`,
/// `array`); `enum` membership. Declared `default`s are filled into the
/// returned object for absent properties. O(properties).
pub fn validate_args(schema: &Value, args: Value) -> Result<Value, WireError> {
    let mut map = match args {
        Value::Object(m) => m,
        Value::Null => Map::new(),
        other => {
            return Err(WireError::invalid_params(format!(
                "arguments must be an object, got {}",
                type_name(&other)
            )))
        }
    };

    let props = schema.get("properties").and_then(Value::as_object);

    if let Some(required) = schema.get("required").and_then(Value::as_array) {
        for name in required.iter().filter_map(Value::as_str) {
            if !map.contains_key(name) {
                return Err(WireError::invalid_params(format!(
                    "missing required argument: {}",
                    name
                )));
            }
        }
    }

    if let Some(props) = props {
        for (name, prop) in props {
            match map.get(name) {
                Some(value) => {
                    if let Some(expected) = prop.get("type").and_then(Value::as_str) {
                        if !type_matches(expected, value) {
                            return Err(WireError::invalid_params(format!(
                                "argument {} must be {}, got {}",
                                name,
                                expected,
                                type_name(value)
                            )));
                        }
                    }
                    if let Some(allowed) = prop.get("enum").and_then(Value::as_array) {
                        if !allowed.contains(value) {
                            return Err(WireError::invalid_params(format!(
                                "argument {} is not one of the allowed values",
                                name
                            )));
                        }
                    }
                }
                None => {
                    if let Some(default) = prop.get("default") {
                        map.insert(name.clone(), default.clone());
                    }
                }
            }
        }
    }

    Ok(Value::Object(map))
}

fn type_matches(expected: &str, value: &Value) -> bool {
    match expected {
        "string" => value.is_string(),
        "integer" => value.is_i64() || value.is_u64(),
        "number" => value.is_number(),
        "boolean" => value.is_boolean(),
        "object" => value.is_object(),
        "array" => value.is_array(),
        _ => true,
    }
}

fn type_name(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}

/// Extracts the text of the first content item of a `tools/call` result.
pub fn first_text(result: &Value) -> Option<&str> {
    result
        .get("content")?
        .as_array()?
        .first()?
        .get("text")?
        .as_str()
}
