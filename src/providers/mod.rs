/*!
 * Provider implementations for different translation backends.
 *
 * This module contains client implementations for various LLM providers:
 * - Ollama: Local LLM server
 * - Anthropic: Anthropic API integration
 * - Mock: scripted in-process backend for tests and dry runs
 *
 * HTTP providers share one wire format: the user message is a JSON array of
 * `{"id", "text"}` objects and the model must answer with an array of the
 * same shape.
 */

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::fmt::Debug;
use std::time::Duration;

use crate::errors::ProviderError;

/// One unit as sent to and returned from a backend
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BatchItem {
    /// Unit id, echoed back by the backend
    pub id: u64,
    /// Source text on the way out, translated text on the way back
    pub text: String,
}

impl BatchItem {
    /// Create a new batch item
    pub fn new(id: u64, text: impl Into<String>) -> Self {
        Self { id, text: text.into() }
    }
}

/// Common trait for all translation backends
///
/// Implementations are interchangeable behind `Arc<dyn Provider>`.
#[async_trait]
pub trait Provider: Send + Sync + Debug {
    /// Short provider name for logs
    fn name(&self) -> &str;

    /// Translate a batch of units in one request
    ///
    /// # Arguments
    /// * `units` - Units to translate, ids unique within the batch
    /// * `system_prompt` - Fully rendered instructions and passive context
    ///
    /// # Returns
    /// * `Result<Vec<BatchItem>, ProviderError>` - The translated units as answered by the
    ///   backend. No shape validation happens here.
    async fn send_batch(
        &self,
        units: &[BatchItem],
        system_prompt: &str,
    ) -> Result<Vec<BatchItem>, ProviderError>;

    /// Check that the configured credentials are accepted
    async fn validate_key(&self) -> Result<bool, ProviderError>;

    /// List the models the backend offers
    async fn list_models(&self) -> Result<Vec<String>, ProviderError>;
}

/// Serialize units into the user message
pub fn encode_items(units: &[BatchItem]) -> Result<String, ProviderError> {
    serde_json::to_string(units)
        .map_err(|e| ProviderError::ParseError(format!("Failed to encode batch: {}", e)))
}

/// Extract the JSON array from a model reply
///
/// Everything before the first `[` and after the last `]` is ignored, so code
/// fences and chatter around the payload are tolerated.
pub fn decode_items(reply: &str) -> Result<Vec<BatchItem>, ProviderError> {
    let start = reply.find('[');
    let end = reply.rfind(']');

    let payload = match (start, end) {
        (Some(start), Some(end)) if start < end => &reply[start..=end],
        _ => {
            return Err(ProviderError::ParseError(format!(
                "No JSON array in reply: {}",
                preview(reply)
            )));
        }
    };

    serde_json::from_str::<Vec<BatchItem>>(payload).map_err(|e| {
        ProviderError::ParseError(format!("Invalid batch reply ({}): {}", e, preview(reply)))
    })
}

/// Map a non-success HTTP status onto the provider error taxonomy
pub(crate) fn status_error(status: u16, body: String) -> ProviderError {
    match status {
        401 | 403 => ProviderError::AuthenticationError(body),
        429 => ProviderError::RateLimitExceeded(body),
        _ => ProviderError::ApiError {
            status_code: status,
            message: body,
        },
    }
}

/// Map a reqwest transport error onto the provider error taxonomy
pub(crate) fn request_error(error: reqwest::Error, timeout: Duration) -> ProviderError {
    if error.is_timeout() {
        ProviderError::Timeout(timeout)
    } else if error.is_connect() {
        ProviderError::ConnectionError(error.to_string())
    } else {
        ProviderError::RequestFailed(error.to_string())
    }
}

fn preview(text: &str) -> String {
    let mut out: String = text.chars().take(200).collect();
    if text.chars().count() > 200 {
        out.push_str("...");
    }
    out
}

pub mod anthropic;
pub mod mock;
pub mod ollama;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_decodeItems_withCodeFence_shouldExtractArray() {
        let reply = "Here you go:\n```json\n[{\"id\": 1, \"text\": \"Bonjour\"}, {\"id\": 2, \"text\": \"Salut\"}]\n```";
        let items = decode_items(reply).unwrap();

        assert_eq!(items, vec![BatchItem::new(1, "Bonjour"), BatchItem::new(2, "Salut")]);
    }

    #[test]
    fn test_decodeItems_withoutArray_shouldBeParseError() {
        let err = decode_items("I cannot translate that.").unwrap_err();
        assert!(matches!(err, ProviderError::ParseError(_)));
    }

    #[test]
    fn test_decodeItems_withWrongShape_shouldBeParseError() {
        let err = decode_items("[{\"line\": 1}]").unwrap_err();
        assert!(matches!(err, ProviderError::ParseError(_)));
    }

    #[test]
    fn test_encodeItems_shouldProduceIdTextObjects() {
        let encoded = encode_items(&[BatchItem::new(7, "Hi \"there\"")]).unwrap();
        assert_eq!(encoded, r#"[{"id":7,"text":"Hi \"there\""}]"#);
    }

    #[test]
    fn test_statusError_shouldClassifyCommonStatuses() {
        assert!(matches!(status_error(401, String::new()), ProviderError::AuthenticationError(_)));
        assert!(matches!(status_error(429, String::new()), ProviderError::RateLimitExceeded(_)));
        assert!(matches!(
            status_error(502, String::new()),
            ProviderError::ApiError { status_code: 502, .. }
        ));
    }
}
