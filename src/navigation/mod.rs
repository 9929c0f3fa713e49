//! Navigation boundary.
//!
//! The session core only ever sends the user to one of two fixed entry
//! points; how that happens is up to the host.

use parking_lot::Mutex;

/// Unauthenticated entry point.
pub const LOGIN_ROUTE: &str = "/login";
/// Authenticated landing page.
pub const DASHBOARD_ROUTE: &str = "/dashboard";

/// Something that can move the user to a route.
pub trait Navigator: Send + Sync {
    fn navigate(&self, route: &str);
}

/// Ignores navigation requests.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoopNavigator;

impl Navigator for NoopNavigator {
    fn navigate(&self, _route: &str) {}
}

/// Records every route it is sent to.
#[derive(Debug, Default)]
pub struct HistoryNavigator {
    visited: Mutex<Vec<String>>,
}

impl HistoryNavigator {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn current(&self) -> Option<String> {
        self.visited.lock().last().cloned()
    }

    pub fn visited(&self) -> Vec<String> {
        self.visited.lock().clone()
    }
}

impl Navigator for HistoryNavigator {
    fn navigate(&self, route: &str) {
        tracing::debug!(route, "navigating");
        self.visited.lock().push(route.to_string());
    }
}
