//! Command registry mapping `(scope, action)` to local handlers.
//!
//! Populated once at process startup by the embedding process, then read
//! concurrently by the dispatcher. Handlers are boxed async closures; a
//! handler returning `Ok(Some(value))` is automatically answered with that
//! value as the response output.

use std::collections::HashMap;
use std::sync::Arc;

use futures_util::future::BoxFuture;
use serde_json::Value;
use thiserror::Error;

use swarmlink_types::envelope::{Envelope, Scope};

use crate::outbox::SendError;

use super::context::ResponseContext;

/// Errors a command handler can surface. The dispatcher logs them with
/// `(scope, action)` context and answers the requester with
/// `output: {"error": ...}` when the request carried a `command_id`.
#[derive(Debug, Error)]
pub enum CommandError {
    #[error("invalid arguments: {0}")]
    InvalidArgs(#[from] serde_json::Error),

    #[error("{0}")]
    Failed(String),

    #[error(transparent)]
    Send(#[from] SendError),
}

impl CommandError {
    /// Shorthand for a free-form handler failure.
    pub fn failed(msg: impl Into<String>) -> Self {
        CommandError::Failed(msg.into())
    }
}

/// Result of one handler invocation. `Some(value)` is auto-responded with
/// `output = value`; `None` means the handler responded (or chose not to)
/// itself.
pub type CommandResult = Result<Option<Value>, CommandError>;

pub(crate) type HandlerRef =
    Arc<dyn Fn(Envelope, ResponseContext) -> BoxFuture<'static, CommandResult> + Send + Sync>;

/// Registry of locally handled actions.
#[derive(Default)]
pub struct CommandRegistry {
    handlers: HashMap<(Scope, String), HandlerRef>,
}

impl CommandRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a handler for `(scope, action)`, replacing any previous one.
    pub fn register<F, Fut>(&mut self, scope: Scope, action: impl Into<String>, handler: F)
    where
        F: Fn(Envelope, ResponseContext) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = CommandResult> + Send + 'static,
    {
        self.handlers.insert(
            (scope, action.into()),
            Arc::new(move |envelope, ctx| Box::pin(handler(envelope, ctx))),
        );
    }

    pub(crate) fn get(&self, scope: &Scope, action: &str) -> Option<HandlerRef> {
        self.handlers
            .get(&(scope.clone(), action.to_string()))
            .cloned()
    }

    pub fn len(&self) -> usize {
        self.handlers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.handlers.is_empty()
    }
}

impl std::fmt::Debug for CommandRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CommandRegistry")
            .field("actions", &self.handlers.keys().collect::<Vec<_>>())
            .finish()
    }
}
