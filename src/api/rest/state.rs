use crate::agent::dispatcher::Dispatcher;
use crate::agent::paths::PathGuard;

/// Read-only application state shared across requests.
pub struct AppState {
    pub dispatcher: Dispatcher,
    pub guard: PathGuard,
}
