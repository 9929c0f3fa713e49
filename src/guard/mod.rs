//! Route guards.
//!
//! Guards only decide; [`GuardDecision::apply`] hands a redirect to a
//! [`Navigator`].

use crate::auth::AuthStore;
use crate::navigation::{Navigator, DASHBOARD_ROUTE, LOGIN_ROUTE};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GuardDecision {
    Proceed,
    Redirect(&'static str),
}

impl GuardDecision {
    pub fn allows(self) -> bool {
        matches!(self, GuardDecision::Proceed)
    }

    /// Navigate on a redirect and report whether the route may activate.
    pub fn apply(self, navigator: &dyn Navigator) -> bool {
        match self {
            GuardDecision::Proceed => true,
            GuardDecision::Redirect(route) => {
                navigator.navigate(route);
                false
            }
        }
    }
}

/// Admit only a usable session, refreshing an expired token first.
pub async fn auth_guard(session: &AuthStore) -> GuardDecision {
    if session.refresh_session().await {
        GuardDecision::Proceed
    } else {
        GuardDecision::Redirect(LOGIN_ROUTE)
    }
}

/// Keep signed-in users away from the login page.
pub fn login_guard(session: &AuthStore) -> GuardDecision {
    if session.is_authenticated() && session.has_valid_token() {
        GuardDecision::Redirect(DASHBOARD_ROUTE)
    } else {
        GuardDecision::Proceed
    }
}
