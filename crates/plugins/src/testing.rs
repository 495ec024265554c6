//! Canned handlers for tests.

use crate::handler::{ActionHandler, HandlerParams};
use async_trait::async_trait;
use stagehand_core::HandlerResult;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

/// Returns the same result every time and counts calls.
pub struct StaticHandler {
    result: HandlerResult,
    calls: AtomicUsize,
}

impl StaticHandler {
    /// Always return `result`.
    pub fn new(result: HandlerResult) -> Self {
        Self {
            result,
            calls: AtomicUsize::new(0),
        }
    }

    /// Always return an empty `ready` result.
    pub fn ready() -> Self {
        Self::new(HandlerResult::ready())
    }

    /// How many times the handler ran.
    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl ActionHandler for StaticHandler {
    async fn handle(&self, _params: HandlerParams<'_>) -> anyhow::Result<HandlerResult> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        Ok(self.result.clone())
    }
}

/// Always fails with the given message.
pub struct FailingHandler {
    message: String,
}

impl FailingHandler {
    /// Fail with `message`.
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
        }
    }
}

#[async_trait]
impl ActionHandler for FailingHandler {
    async fn handle(&self, _params: HandlerParams<'_>) -> anyhow::Result<HandlerResult> {
        anyhow::bail!("{}", self.message)
    }
}

/// Sleeps before returning a `ready` result.
pub struct SlowHandler {
    duration: Duration,
}

impl SlowHandler {
    /// Sleep for `duration`.
    pub fn new(duration: Duration) -> Self {
        Self { duration }
    }
}

#[async_trait]
impl ActionHandler for SlowHandler {
    async fn handle(&self, _params: HandlerParams<'_>) -> anyhow::Result<HandlerResult> {
        tokio::time::sleep(self.duration).await;
        Ok(HandlerResult::ready())
    }
}
