/*!
 * Mock provider implementations for testing.
 *
 * This module provides a scripted backend that simulates different behaviors:
 * - `MockProvider::working()` - Always succeeds with translated text
 * - `MockProvider::failing()` - Always fails with a server error
 * - `MockProvider::fail_above(n)` - Fails for batches larger than `n` units
 * - `MockProvider::drop_last()` - Answers with one unit missing
 * - `MockProvider::auth_failing()` - Rejects the credentials
 * - `MockProvider::failing_after(n)` - Succeeds `n` times, then always fails
 *
 * Every attempt is recorded so tests can assert on call counts, request sizes
 * and rendered prompts.
 */

use async_trait::async_trait;
use parking_lot::Mutex;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

use crate::errors::ProviderError;
use crate::providers::{BatchItem, Provider};

/// Behavior mode for the mock provider
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum MockBehavior {
    /// Always succeeds with a proper translation
    Working,
    /// Always fails with a server error
    Failing,
    /// Fails whenever the batch holds more than `max_units` units
    FailAbove { max_units: usize },
    /// Succeeds but omits the last unit
    DropLast,
    /// Succeeds with units in reverse order
    Reversed,
    /// Always fails with an authentication error
    AuthFailing,
    /// Succeeds `successes` times, then always fails
    FailingAfter { successes: usize },
    /// Simulates slow response (for timeout testing)
    Slow { delay_ms: u64 },
}

/// Mock provider for testing translation behavior
#[derive(Debug, Clone)]
pub struct MockProvider {
    /// Behavior mode
    behavior: MockBehavior,
    /// Every attempt, successful or not
    call_count: Arc<AtomicUsize>,
    /// Attempts that returned `Ok`
    success_count: Arc<AtomicUsize>,
    /// Unit ids of every attempt, in call order
    requests: Arc<Mutex<Vec<Vec<u64>>>>,
    /// System prompt of every attempt, in call order
    prompts: Arc<Mutex<Vec<String>>>,
    /// Custom translation function (optional)
    translator: Option<fn(&str) -> String>,
}

impl MockProvider {
    /// Create a new mock provider with the specified behavior
    pub fn new(behavior: MockBehavior) -> Self {
        Self {
            behavior,
            call_count: Arc::new(AtomicUsize::new(0)),
            success_count: Arc::new(AtomicUsize::new(0)),
            requests: Arc::new(Mutex::new(Vec::new())),
            prompts: Arc::new(Mutex::new(Vec::new())),
            translator: None,
        }
    }

    /// Create a working mock provider that always succeeds
    pub fn working() -> Self {
        Self::new(MockBehavior::Working)
    }

    /// Create a failing mock provider that always errors
    pub fn failing() -> Self {
        Self::new(MockBehavior::Failing)
    }

    /// Create a mock that rejects batches larger than `max_units`
    pub fn fail_above(max_units: usize) -> Self {
        Self::new(MockBehavior::FailAbove { max_units })
    }

    /// Create a mock that drops the last unit of every answer
    pub fn drop_last() -> Self {
        Self::new(MockBehavior::DropLast)
    }

    /// Create a mock that answers in reverse order
    pub fn reversed() -> Self {
        Self::new(MockBehavior::Reversed)
    }

    /// Create a mock with invalid credentials
    pub fn auth_failing() -> Self {
        Self::new(MockBehavior::AuthFailing)
    }

    /// Create a mock that breaks down after `successes` good answers
    pub fn failing_after(successes: usize) -> Self {
        Self::new(MockBehavior::FailingAfter { successes })
    }

    /// Create a mock that sleeps before answering
    pub fn slow(delay_ms: u64) -> Self {
        Self::new(MockBehavior::Slow { delay_ms })
    }

    /// Set a custom translation function
    pub fn with_translator(mut self, translator: fn(&str) -> String) -> Self {
        self.translator = Some(translator);
        self
    }

    /// The default translation the mock produces for `text`
    pub fn translate_text(text: &str) -> String {
        format!("[TRANSLATED] {}", text)
    }

    /// Number of attempts made so far
    pub fn call_count(&self) -> usize {
        self.call_count.load(Ordering::SeqCst)
    }

    /// Number of attempts that returned `Ok`
    pub fn success_count(&self) -> usize {
        self.success_count.load(Ordering::SeqCst)
    }

    /// Unit ids of every attempt, in call order
    pub fn requests(&self) -> Vec<Vec<u64>> {
        self.requests.lock().clone()
    }

    /// Batch sizes of every attempt, in call order
    pub fn request_sizes(&self) -> Vec<usize> {
        self.requests.lock().iter().map(Vec::len).collect()
    }

    /// System prompts of every attempt, in call order
    pub fn prompts(&self) -> Vec<String> {
        self.prompts.lock().clone()
    }

    fn translate_all(&self, units: &[BatchItem]) -> Vec<BatchItem> {
        let translate = self.translator.unwrap_or(Self::translate_text);
        units
            .iter()
            .map(|unit| BatchItem::new(unit.id, translate(&unit.text)))
            .collect()
    }

    fn respond(&self, count: usize, units: &[BatchItem]) -> Result<Vec<BatchItem>, ProviderError> {
        match self.behavior {
            MockBehavior::Working | MockBehavior::Slow { .. } => Ok(self.translate_all(units)),

            MockBehavior::Failing => Err(ProviderError::ApiError {
                message: "Simulated provider failure".to_string(),
                status_code: 500,
            }),

            MockBehavior::FailAbove { max_units } => {
                if units.len() > max_units {
                    Err(ProviderError::ApiError {
                        message: format!("Simulated overload for {} units", units.len()),
                        status_code: 503,
                    })
                } else {
                    Ok(self.translate_all(units))
                }
            }

            MockBehavior::DropLast => {
                let mut translated = self.translate_all(units);
                translated.pop();
                Ok(translated)
            }

            MockBehavior::Reversed => {
                let mut translated = self.translate_all(units);
                translated.reverse();
                Ok(translated)
            }

            MockBehavior::AuthFailing => Err(ProviderError::AuthenticationError(
                "Simulated invalid API key".to_string(),
            )),

            MockBehavior::FailingAfter { successes } => {
                if count < successes {
                    Ok(self.translate_all(units))
                } else {
                    Err(ProviderError::ConnectionError(format!(
                        "Simulated outage (request #{})",
                        count + 1
                    )))
                }
            }
        }
    }
}

#[async_trait]
impl Provider for MockProvider {
    fn name(&self) -> &str {
        "mock"
    }

    async fn send_batch(
        &self,
        units: &[BatchItem],
        system_prompt: &str,
    ) -> Result<Vec<BatchItem>, ProviderError> {
        let count = self.call_count.fetch_add(1, Ordering::SeqCst);
        self.requests.lock().push(units.iter().map(|u| u.id).collect());
        self.prompts.lock().push(system_prompt.to_string());

        if let MockBehavior::Slow { delay_ms } = self.behavior {
            tokio::time::sleep(tokio::time::Duration::from_millis(delay_ms)).await;
        }

        let result = self.respond(count, units);
        if result.is_ok() {
            self.success_count.fetch_add(1, Ordering::SeqCst);
        }
        result
    }

    async fn validate_key(&self) -> Result<bool, ProviderError> {
        Ok(self.behavior != MockBehavior::AuthFailing)
    }

    async fn list_models(&self) -> Result<Vec<String>, ProviderError> {
        Ok(vec!["mock-model".to_string()])
    }
}
