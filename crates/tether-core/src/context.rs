//! Request-scoped context.
//!
//! A [`Context`] travels with every [`Request`](crate::Request). It carries a
//! cancellation signal, an optional deadline, an optional [`ErrorHandler`] and a
//! small typed value map. Contexts are immutable: every `with_*` method returns
//! a derived copy, so a context wrapper can hand a replaced context to the
//! rest of the pipeline without affecting the one it was given.
//!
//! ```rust,ignore
//! let (ctx, cancel) = request.context().with_timeout(Duration::from_secs(5));
//! let ctx = ctx.with_value(RequestId(42));
//! ```

use std::any::{Any, TypeId};
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use tokio::time::Instant;
use tokio_util::sync::CancellationToken;

use crate::response::ErrorHandler;

/// Callback run when a request finishes, releasing whatever a context wrapper acquired.
pub type Teardown = Box<dyn FnOnce() + Send>;

type ValueMap = HashMap<TypeId, Arc<dyn Any + Send + Sync>>;

/// Request-scoped values and signals.
#[derive(Clone, Default)]
pub struct Context {
    token: CancellationToken,
    deadline: Option<Instant>,
    error_handler: Option<ErrorHandler>,
    values: Arc<ValueMap>,
}

impl Context {
    /// Creates an empty root context.
    pub fn new() -> Self {
        Self::default()
    }

    /// Derives a context that is cancelled when the returned teardown runs or
    /// when this context is cancelled.
    pub fn with_cancel(&self) -> (Self, Teardown) {
        let child = self.token.child_token();
        let handle = child.clone();
        let ctx = Self {
            token: child,
            ..self.clone()
        };
        (ctx, Box::new(move || handle.cancel()))
    }

    /// Derives a context with a deadline `timeout` from now.
    ///
    /// An existing earlier deadline is kept.
    pub fn with_timeout(&self, timeout: Duration) -> (Self, Teardown) {
        let (mut ctx, cancel) = self.with_cancel();
        let deadline = Instant::now() + timeout;
        ctx.deadline = Some(match self.deadline {
            Some(existing) if existing < deadline => existing,
            _ => deadline,
        });
        (ctx, cancel)
    }

    /// Returns the deadline, if one is set.
    pub fn deadline(&self) -> Option<Instant> {
        self.deadline
    }

    /// Returns `true` once the context was cancelled or its deadline passed.
    pub fn is_done(&self) -> bool {
        self.token.is_cancelled() || self.deadline.is_some_and(|d| Instant::now() >= d)
    }

    /// Resolves once the context is cancelled or its deadline passes.
    pub async fn done(&self) {
        match self.deadline {
            Some(deadline) => {
                tokio::select! {
                    _ = self.token.cancelled() => {}
                    _ = tokio::time::sleep_until(deadline) => {}
                }
            }
            None => self.token.cancelled().await,
        }
    }

    /// Returns the error handler bound to this context.
    pub fn error_handler(&self) -> Option<&ErrorHandler> {
        self.error_handler.as_ref()
    }

    /// Derives a context in which status responses render through `handler`.
    pub fn with_error_handler(&self, handler: ErrorHandler) -> Self {
        Self {
            error_handler: Some(handler),
            ..self.clone()
        }
    }

    /// Derives a context with no error handler.
    pub fn without_error_handler(&self) -> Self {
        Self {
            error_handler: None,
            ..self.clone()
        }
    }

    /// Derives a context carrying `value`, replacing any value of the same type.
    pub fn with_value<T: Send + Sync + 'static>(&self, value: T) -> Self {
        let mut values = ValueMap::clone(&self.values);
        values.insert(TypeId::of::<T>(), Arc::new(value));
        Self {
            values: Arc::new(values),
            ..self.clone()
        }
    }

    /// Looks up a value by type.
    pub fn value<T: Send + Sync + 'static>(&self) -> Option<&T> {
        self.values
            .get(&TypeId::of::<T>())
            .and_then(|v| v.downcast_ref::<T>())
    }
}

impl fmt::Debug for Context {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Context")
            .field("cancelled", &self.token.is_cancelled())
            .field("deadline", &self.deadline)
            .field("error_handler", &self.error_handler.is_some())
            .field("values", &self.values.len())
            .finish()
    }
}
