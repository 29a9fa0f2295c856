//! Method registry and dispatch
//!
//! Handlers are registered once with concrete parameter and result types and
//! stored behind a uniform JSON-in/JSON-out trait object. Dispatch runs
//! exactly one handler per request on its own task, so panics and timeouts
//! are contained and reported as internal errors.

use std::{collections::HashMap, future::Future, marker::PhantomData, sync::Arc, time::Duration};

use async_trait::async_trait;
use serde::{de::DeserializeOwned, Serialize};
use serde_json::{json, Value};
use thiserror::Error;
use tokio::task::AbortHandle;
use tracing::error;

use crate::errors::{HandlerError, RpcError};

/// A registered RPC method operating on raw JSON params.
#[async_trait]
pub trait MethodHandler: Send + Sync {
    async fn call(&self, params: Option<Value>) -> Result<Value, HandlerError>;
}

struct AsyncFnHandler<F, P, R> {
    handler: F,
    _types: PhantomData<fn(P) -> R>,
}

#[async_trait]
impl<F, Fut, P, R, E> MethodHandler for AsyncFnHandler<F, P, R>
where
    F: Fn(P) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Result<R, E>> + Send + 'static,
    P: DeserializeOwned + Send + 'static,
    R: Serialize + Send + 'static,
    E: Into<HandlerError> + Send + 'static,
{
    async fn call(&self, params: Option<Value>) -> Result<Value, HandlerError> {
        let params = decode_params::<P>(params)?;
        let result = (self.handler)(params).await.map_err(Into::into)?;
        encode_result(result)
    }
}

struct SyncFnHandler<F, P, R> {
    handler: F,
    _types: PhantomData<fn(P) -> R>,
}

#[async_trait]
impl<F, P, R, E> MethodHandler for SyncFnHandler<F, P, R>
where
    F: Fn(P) -> Result<R, E> + Send + Sync + 'static,
    P: DeserializeOwned + Send + 'static,
    R: Serialize + Send + 'static,
    E: Into<HandlerError> + Send + 'static,
{
    async fn call(&self, params: Option<Value>) -> Result<Value, HandlerError> {
        let params = decode_params::<P>(params)?;
        let result = (self.handler)(params).map_err(Into::into)?;
        encode_result(result)
    }
}

fn decode_params<P: DeserializeOwned>(params: Option<Value>) -> Result<P, HandlerError> {
    serde_json::from_value(params.unwrap_or(Value::Null))
        .map_err(|err| RpcError::invalid_params(err.to_string()).into())
}

fn encode_result<R: Serialize>(result: R) -> Result<Value, HandlerError> {
    serde_json::to_value(result).map_err(HandlerError::fault)
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum RegistryError {
    #[error("method name must not be empty")]
    EmptyMethodName,
    #[error("method {0:?} registered more than once")]
    DuplicateMethod(String),
}

#[derive(Default)]
pub struct MethodRegistryBuilder {
    entries: Vec<(String, Arc<dyn MethodHandler>)>,
}

impl MethodRegistryBuilder {
    /// Registers an async handler taking typed params.
    pub fn method<F, Fut, P, R, E>(self, name: impl Into<String>, handler: F) -> Self
    where
        F: Fn(P) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<R, E>> + Send + 'static,
        P: DeserializeOwned + Send + 'static,
        R: Serialize + Send + 'static,
        E: Into<HandlerError> + Send + 'static,
    {
        self.handler(
            name,
            AsyncFnHandler {
                handler,
                _types: PhantomData,
            },
        )
    }

    /// Registers a handler that produces its result directly.
    pub fn sync_method<F, P, R, E>(self, name: impl Into<String>, handler: F) -> Self
    where
        F: Fn(P) -> Result<R, E> + Send + Sync + 'static,
        P: DeserializeOwned + Send + 'static,
        R: Serialize + Send + 'static,
        E: Into<HandlerError> + Send + 'static,
    {
        self.handler(
            name,
            SyncFnHandler {
                handler,
                _types: PhantomData,
            },
        )
    }

    pub fn handler(
        mut self,
        name: impl Into<String>,
        handler: impl MethodHandler + 'static,
    ) -> Self {
        let handler: Arc<dyn MethodHandler> = Arc::new(handler);
        self.entries.push((name.into(), handler));
        self
    }

    pub fn build(self) -> Result<MethodRegistry, RegistryError> {
        let mut handlers = HashMap::with_capacity(self.entries.len());
        for (name, handler) in self.entries {
            if name.is_empty() {
                return Err(RegistryError::EmptyMethodName);
            }
            if handlers.contains_key(&name) {
                return Err(RegistryError::DuplicateMethod(name));
            }
            handlers.insert(name, handler);
        }
        Ok(MethodRegistry { handlers })
    }
}

/// Immutable method name to handler table. Lookups are exact and
/// case-sensitive.
#[derive(Default)]
pub struct MethodRegistry {
    handlers: HashMap<String, Arc<dyn MethodHandler>>,
}

impl MethodRegistry {
    pub fn builder() -> MethodRegistryBuilder {
        MethodRegistryBuilder::default()
    }

    pub fn methods(&self) -> impl Iterator<Item = &str> {
        self.handlers.keys().map(String::as_str)
    }

    /// Invokes the handler for `method` once and normalizes its outcome.
    pub async fn dispatch(
        &self,
        method: &str,
        params: Option<Value>,
        timeout: Option<Duration>,
    ) -> Result<Value, RpcError> {
        let Some(handler) = self.handlers.get(method).cloned() else {
            return Err(RpcError::method_not_found());
        };

        let mut task = tokio::spawn(async move { handler.call(params).await });
        // Dropping this future (e.g. the client went away) must not leave the
        // handler running past its deadline.
        let _guard = AbortOnDrop(task.abort_handle());

        let joined = match timeout {
            Some(limit) => match tokio::time::timeout(limit, &mut task).await {
                Ok(joined) => joined,
                Err(_) => {
                    let timeout_ms = u64::try_from(limit.as_millis()).unwrap_or(u64::MAX);
                    error!(method, timeout_ms, "handler timed out");
                    return Err(RpcError::internal("Handler timed out")
                        .with_data(json!({ "timeout_ms": timeout_ms })));
                }
            },
            None => (&mut task).await,
        };

        match joined {
            Ok(outcome) => outcome.map_err(|err| {
                if let HandlerError::Fault(fault) = &err {
                    error!(method, error = %fault, "handler failed");
                }
                err.into_rpc_error()
            }),
            Err(join_err) => {
                let message = panic_message(join_err);
                error!(method, error = %message, "handler panicked");
                Err(RpcError::internal(message))
            }
        }
    }
}

struct AbortOnDrop(AbortHandle);

impl Drop for AbortOnDrop {
    fn drop(&mut self) {
        self.0.abort();
    }
}

fn panic_message(err: tokio::task::JoinError) -> String {
    match err.try_into_panic() {
        Ok(payload) => payload
            .downcast_ref::<&str>()
            .map(|message| message.to_string())
            .or_else(|| payload.downcast_ref::<String>().cloned())
            .unwrap_or_else(|| "handler panicked".to_string()),
        Err(_) => "handler cancelled".to_string(),
    }
}
