//! Where the engine's own diagnostics go.
//!
//! Every component receives a [`Reporter`] instead of reaching for a
//! process-wide logger. A reporter built from a [`Dispatch`] routes events to
//! that subscriber only; the default reporter uses whatever subscriber is
//! current on the calling thread.

use tracing::Dispatch;

#[derive(Debug, Clone, Default)]
pub struct Reporter {
    dispatch: Option<Dispatch>,
}

impl Reporter {
    /// Route diagnostics to `dispatch`.
    pub fn new(dispatch: Dispatch) -> Self {
        Self {
            dispatch: Some(dispatch),
        }
    }

    /// Run `f` with this reporter's subscriber as the default.
    pub fn in_scope<T>(&self, f: impl FnOnce() -> T) -> T {
        match &self.dispatch {
            Some(dispatch) => tracing::dispatcher::with_default(dispatch, f),
            None => f(),
        }
    }
}
