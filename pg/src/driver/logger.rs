//! Statement logging hook.

/// Receives the rendered text of every statement a connection dispatches.
///
/// Implementations must not block; a logger cannot fail a statement.
pub trait Logger: Send + Sync {
    fn debug(&self, message: &str);
}

/// Forwards to `tracing` at debug level under the `quarry::sql` target.
#[derive(Debug, Clone, Copy, Default)]
pub struct TracingLogger;

impl Logger for TracingLogger {
    fn debug(&self, message: &str) {
        tracing::debug!(target: "quarry::sql", "{}", message);
    }
}

impl<F> Logger for F
where
    F: Fn(&str) + Send + Sync,
{
    fn debug(&self, message: &str) {
        self(message)
    }
}
