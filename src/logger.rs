//! Injectable logger handle.
//!
//! tern logs through [`tracing`]. A [`Logger`] decides *which* subscriber
//! receives those events: the process-wide one, a specific
//! [`Dispatch`], or nobody.

use tracing::Dispatch;

/// Where the server and the built-in middleware send their log events.
///
/// The default logs to whatever subscriber is active for the current thread,
/// which is a no-op when the application installed none.
#[derive(Clone, Debug, Default)]
pub struct Logger {
    dispatch: Option<Dispatch>,
}

impl Logger {
    /// Sends events to the ambient subscriber.
    pub fn ambient() -> Self {
        Self::default()
    }

    /// Drops every event.
    pub fn noop() -> Self {
        Self { dispatch: Some(Dispatch::none()) }
    }

    /// Runs `f` with this logger as the default subscriber.
    ///
    /// Wrap the `tracing` macro calls, not `.await` points: the scope is
    /// thread-local.
    pub fn scope<R>(&self, f: impl FnOnce() -> R) -> R {
        match &self.dispatch {
            Some(dispatch) => tracing::dispatcher::with_default(dispatch, f),
            None => f(),
        }
    }
}

impl From<Dispatch> for Logger {
    fn from(dispatch: Dispatch) -> Self {
        Self { dispatch: Some(dispatch) }
    }
}
