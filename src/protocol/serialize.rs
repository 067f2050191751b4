//! Conversion of capability results into wire content.
//!
//! The registry treats this as a black box: handlers return a JSON value
//! and the serializer decides what the client sees.

use serde_json::Value;

use super::{Content, PromptMessage, ResourceContents};
use crate::{Error, Result};

/// Turns raw capability results into protocol content.
pub trait ResultSerializer: Send + Sync + 'static {
    /// Content for a tool call result.
    ///
    /// # Errors
    ///
    /// Returns an error if the value cannot be represented.
    fn tool_content(&self, value: Value) -> Result<Vec<Content>>;

    /// Contents for a resource read.
    ///
    /// # Errors
    ///
    /// Returns an error if the value cannot be represented.
    fn resource_contents(
        &self,
        uri: &str,
        mime_type: Option<&str>,
        value: Value,
    ) -> Result<ResourceContents>;

    /// Messages for a rendered prompt.
    ///
    /// # Errors
    ///
    /// Returns an error if the value is neither text nor a message list.
    fn prompt_messages(&self, value: Value) -> Result<Vec<PromptMessage>>;
}

/// Default serializer: strings become text, typed content objects pass
/// through, everything else is rendered as compact JSON text.
#[derive(Debug, Default, Clone, Copy)]
pub struct JsonResultSerializer;

impl JsonResultSerializer {
    fn render(value: &Value) -> Result<String> {
        match value {
            Value::String(s) => Ok(s.clone()),
            other => Ok(serde_json::to_string(other)?),
        }
    }

    /// `value` as content, only when it has exactly a content shape
    fn as_content(value: &Value) -> Option<Content> {
        if !value.get("type").is_some_and(Value::is_string) {
            return None;
        }
        let content: Content = serde_json::from_value(value.clone()).ok()?;
        let exact = serde_json::to_value(&content).is_ok_and(|v| v == *value);
        exact.then_some(content)
    }
}

impl ResultSerializer for JsonResultSerializer {
    fn tool_content(&self, value: Value) -> Result<Vec<Content>> {
        match value {
            Value::Null => Ok(Vec::new()),
            Value::Array(items)
                if !items.is_empty() && items.iter().all(|i| Self::as_content(i).is_some()) =>
            {
                Ok(items.iter().filter_map(Self::as_content).collect())
            }
            other => match Self::as_content(&other) {
                Some(content) => Ok(vec![content]),
                None => Ok(vec![Content::text(Self::render(&other)?)]),
            },
        }
    }

    fn resource_contents(
        &self,
        uri: &str,
        mime_type: Option<&str>,
        value: Value,
    ) -> Result<ResourceContents> {
        if let Some(Content::Image { data, mime_type }) = Self::as_content(&value) {
            return Ok(ResourceContents::Blob {
                uri: uri.to_string(),
                mime_type: Some(mime_type),
                blob: data,
            });
        }
        Ok(ResourceContents::Text {
            uri: uri.to_string(),
            mime_type: mime_type.map(str::to_string),
            text: Self::render(&value)?,
        })
    }

    fn prompt_messages(&self, value: Value) -> Result<Vec<PromptMessage>> {
        match value {
            Value::String(text) => Ok(vec![PromptMessage {
                role: "user".to_string(),
                content: Content::text(text),
            }]),
            Value::Array(_) => serde_json::from_value(value)
                .map_err(|e| Error::Handler(format!("Prompt returned invalid messages: {e}"))),
            other => Err(Error::Handler(format!(
                "Prompt must return text or a message list, got {other}"
            ))),
        }
    }
}
