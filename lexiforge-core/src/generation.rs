use schemars::JsonSchema;
use serde::{de::DeserializeOwned, Deserialize, Serialize};
use serde_json::Value;

use crate::{LexiforgeError, UsageStats};

#[derive(Clone, Debug, Deserialize, Serialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    System,
    User,
    Assistant,
}

#[derive(Clone, Debug, Deserialize, Serialize, PartialEq, Eq)]
pub struct Message {
    pub role: Role,
    pub content: String,
}

impl Message {
    pub fn system(content: impl Into<String>) -> Self {
        Self {
            role: Role::System,
            content: content.into(),
        }
    }

    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: Role::User,
            content: content.into(),
        }
    }
}

/// JSON schema a structured response has to satisfy.
#[derive(Clone, Debug, Deserialize, Serialize, PartialEq)]
pub struct OutputSchema {
    pub name: String,
    pub schema: Value,
}

impl OutputSchema {
    pub fn new(name: impl Into<String>, schema: Value) -> Self {
        Self {
            name: name.into(),
            schema,
        }
    }

    pub fn for_type<T: JsonSchema>(name: impl Into<String>) -> Self {
        let root = schemars::schema_for!(T);
        Self {
            name: name.into(),
            schema: serde_json::to_value(root).unwrap_or(Value::Null),
        }
    }

    /// Shallow structural check: root type, required keys, and the declared
    /// type of each top-level property. Nested schemas are not walked.
    pub fn validate(&self, payload: &Value) -> Result<(), LexiforgeError> {
        let fail = |reason: String| Err(LexiforgeError::validation(reason, payload.to_string()));

        if let Some(expected) = self.schema.get("type") {
            if !type_matches(expected, payload) {
                return fail(format!(
                    "schema '{}' expects type {expected}, got {}",
                    self.name,
                    json_type_name(payload)
                ));
            }
        }

        let Some(object) = payload.as_object() else {
            return Ok(());
        };

        if let Some(required) = self.schema.get("required").and_then(Value::as_array) {
            for key in required.iter().filter_map(Value::as_str) {
                match object.get(key) {
                    None | Some(Value::Null) => {
                        return fail(format!(
                            "schema '{}' requires field '{key}'",
                            self.name
                        ))
                    }
                    Some(_) => {}
                }
            }
        }

        if let Some(properties) = self.schema.get("properties").and_then(Value::as_object) {
            for (key, property) in properties {
                let (Some(value), Some(expected)) = (object.get(key), property.get("type")) else {
                    continue;
                };
                if !type_matches(expected, value) {
                    return fail(format!(
                        "field '{key}' expects type {expected}, got {}",
                        json_type_name(value)
                    ));
                }
            }
        }

        Ok(())
    }
}

fn type_matches(expected: &Value, value: &Value) -> bool {
    match expected {
        Value::String(name) => single_type_matches(name, value),
        Value::Array(names) => names
            .iter()
            .filter_map(Value::as_str)
            .any(|name| single_type_matches(name, value)),
        _ => true,
    }
}

fn single_type_matches(name: &str, value: &Value) -> bool {
    match name {
        "object" => value.is_object(),
        "array" => value.is_array(),
        "string" => value.is_string(),
        "boolean" => value.is_boolean(),
        "null" => value.is_null(),
        "number" => value.is_number(),
        "integer" => value.is_i64() || value.is_u64(),
        _ => true,
    }
}

fn json_type_name(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}

/// A single structured-generation request. Fields are fixed once built.
#[derive(Clone, Debug, PartialEq)]
pub struct GenerationRequest {
    prompt: String,
    system_prompt: Option<String>,
    schema: OutputSchema,
    temperature: Option<f32>,
    max_tokens: Option<u32>,
    model: Option<String>,
}

impl GenerationRequest {
    pub fn new(prompt: impl Into<String>, schema: OutputSchema) -> Self {
        Self {
            prompt: prompt.into(),
            system_prompt: None,
            schema,
            temperature: None,
            max_tokens: None,
            model: None,
        }
    }

    pub fn with_system_prompt(mut self, system_prompt: impl Into<String>) -> Self {
        self.system_prompt = Some(system_prompt.into());
        self
    }

    pub fn with_temperature(mut self, temperature: f32) -> Self {
        self.temperature = Some(temperature);
        self
    }

    pub fn with_max_tokens(mut self, max_tokens: u32) -> Self {
        self.max_tokens = Some(max_tokens);
        self
    }

    /// Overrides the client's default model for this request only.
    pub fn with_model(mut self, model: impl Into<String>) -> Self {
        self.model = Some(model.into());
        self
    }

    pub fn prompt(&self) -> &str {
        &self.prompt
    }

    pub fn system_prompt(&self) -> Option<&str> {
        self.system_prompt.as_deref()
    }

    pub fn schema(&self) -> &OutputSchema {
        &self.schema
    }

    pub fn temperature(&self) -> Option<f32> {
        self.temperature
    }

    pub fn max_tokens(&self) -> Option<u32> {
        self.max_tokens
    }

    pub fn model(&self) -> Option<&str> {
        self.model.as_deref()
    }

    pub fn messages(&self) -> Vec<Message> {
        let mut messages = Vec::with_capacity(2);
        if let Some(system) = &self.system_prompt {
            messages.push(Message::system(system.clone()));
        }
        messages.push(Message::user(self.prompt.clone()));
        messages
    }
}

#[derive(Clone, Debug, Serialize, PartialEq)]
pub struct GenerationResponse {
    pub payload: Value,
    pub usage: UsageStats,
    pub model: String,
    pub provider: String,
    pub attempts: u32,
}

impl GenerationResponse {
    pub fn parse<T: DeserializeOwned>(&self) -> Result<T, LexiforgeError> {
        serde_json::from_value(self.payload.clone())
            .map_err(|err| LexiforgeError::validation(err.to_string(), self.payload.to_string()))
    }
}
