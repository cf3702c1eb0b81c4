//! Payload handler registry
//!
//! Descriptors persist only a string key; the key resolves to a
//! [`TaskHandler`] registered once at startup. The registry is immutable once
//! it is handed to the scheduler.

use async_trait::async_trait;
use serde_json::{Map, Value};
use std::collections::HashMap;
use std::future::Future;
use std::sync::Arc;

use super::types::{Payload, Result, SchedulerError};

/// Arguments handed to a handler at fire time
#[derive(Debug, Clone)]
pub struct HandlerInput {
    /// Descriptor being fired
    pub task_id: String,
    /// Positional arguments from the payload
    pub args: Vec<Value>,
    /// Keyword arguments from the payload
    pub details: Map<String, Value>,
}

impl HandlerInput {
    /// Build the input for one firing of `payload`
    pub fn new(task_id: impl Into<String>, payload: &Payload) -> Self {
        Self {
            task_id: task_id.into(),
            args: payload.args.clone(),
            details: payload.details.clone(),
        }
    }

    /// Keyword argument as an unsigned integer
    pub fn detail_u64(&self, key: &str) -> Option<u64> {
        self.details.get(key).and_then(Value::as_u64)
    }
}

/// Work executed when a job fires
///
/// The returned value is stored under `details.result` of the execution
/// record; an error becomes a failed record.
#[async_trait]
pub trait TaskHandler: Send + Sync {
    /// Run the payload
    async fn call(&self, input: HandlerInput) -> anyhow::Result<Value>;
}

struct AsyncFnHandler<F>(F);

#[async_trait]
impl<F, Fut> TaskHandler for AsyncFnHandler<F>
where
    F: Fn(HandlerInput) -> Fut + Send + Sync,
    Fut: Future<Output = anyhow::Result<Value>> + Send + 'static,
{
    async fn call(&self, input: HandlerInput) -> anyhow::Result<Value> {
        (self.0)(input).await
    }
}

struct BlockingFnHandler<F>(Arc<F>);

#[async_trait]
impl<F> TaskHandler for BlockingFnHandler<F>
where
    F: Fn(HandlerInput) -> anyhow::Result<Value> + Send + Sync + 'static,
{
    async fn call(&self, input: HandlerInput) -> anyhow::Result<Value> {
        let f = Arc::clone(&self.0);
        tokio::task::spawn_blocking(move || f(input)).await?
    }
}

/// Maps stable payload keys to handlers
#[derive(Default, Clone)]
pub struct HandlerRegistry {
    handlers: HashMap<String, Arc<dyn TaskHandler>>,
}

impl HandlerRegistry {
    /// Create an empty registry
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a handler object under `key`, replacing any previous one
    pub fn register(&mut self, key: impl Into<String>, handler: Arc<dyn TaskHandler>) -> &mut Self {
        self.handlers.insert(key.into(), handler);
        self
    }

    /// Register an async closure
    pub fn register_fn<F, Fut>(&mut self, key: impl Into<String>, f: F) -> &mut Self
    where
        F: Fn(HandlerInput) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = anyhow::Result<Value>> + Send + 'static,
    {
        self.register(key, Arc::new(AsyncFnHandler(f)))
    }

    /// Register a synchronous closure, run on the blocking pool
    pub fn register_blocking<F>(&mut self, key: impl Into<String>, f: F) -> &mut Self
    where
        F: Fn(HandlerInput) -> anyhow::Result<Value> + Send + Sync + 'static,
    {
        self.register(key, Arc::new(BlockingFnHandler(Arc::new(f))))
    }

    /// Resolve a payload key
    pub fn resolve(&self, key: &str) -> Result<Arc<dyn TaskHandler>> {
        self.handlers
            .get(key)
            .cloned()
            .ok_or_else(|| SchedulerError::UnknownHandler(key.to_string()))
    }

    /// Whether `key` is registered
    pub fn contains(&self, key: &str) -> bool {
        self.handlers.contains_key(key)
    }

    /// Registered keys, sorted
    pub fn keys(&self) -> Vec<String> {
        let mut keys: Vec<String> = self.handlers.keys().cloned().collect();
        keys.sort();
        keys
    }
}

impl std::fmt::Debug for HandlerRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HandlerRegistry")
            .field("keys", &self.keys())
            .finish()
    }
}
