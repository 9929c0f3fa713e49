use crate::store::StoreState;
use crate::ui::Theme;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserPreferences {
    pub theme: Theme,
    pub language: String,
    pub notifications: bool,
}

/// The signed-in user, as read from the access token.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct User {
    pub username: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub email: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub preferences: Option<UserPreferences>,
}

impl User {
    pub fn new(username: impl Into<String>) -> Self {
        Self {
            username: username.into(),
            email: None,
            preferences: None,
        }
    }
}

/// Fields to overwrite on the current user; `None` leaves a field alone.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct UserUpdate {
    pub username: Option<String>,
    pub email: Option<String>,
    pub preferences: Option<UserPreferences>,
}

impl UserUpdate {
    pub(crate) fn apply(self, user: &mut User) {
        if let Some(username) = self.username {
            user.username = username;
        }
        if let Some(email) = self.email {
            user.email = Some(email);
        }
        if let Some(preferences) = self.preferences {
            user.preferences = Some(preferences);
        }
    }
}

/// Session state held by the auth store.
///
/// `is_authenticated` implies `current_user` is set; a held access token
/// says nothing about its validity until its expiry is checked.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AuthState {
    pub is_authenticated: bool,
    pub current_user: Option<User>,
    pub access_token: Option<String>,
    pub refresh_token: Option<String>,
    pub is_loading: bool,
    pub error: Option<String>,
}

impl StoreState for AuthState {
    fn loading_mut(&mut self) -> Option<&mut bool> {
        Some(&mut self.is_loading)
    }

    fn error_mut(&mut self) -> Option<&mut Option<String>> {
        Some(&mut self.error)
    }
}

impl AuthState {
    /// Clear credentials and user, keeping nothing from the old session.
    pub(crate) fn sign_out(&mut self) {
        self.is_authenticated = false;
        self.current_user = None;
        self.access_token = None;
        self.refresh_token = None;
        self.is_loading = false;
        self.error = None;
    }
}

/// Body of the login request.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Credentials {
    pub username: String,
    pub password: String,
}

impl Credentials {
    pub fn new(username: impl Into<String>, password: impl Into<String>) -> Self {
        Self {
            username: username.into(),
            password: password.into(),
        }
    }
}

/// Tokens returned by the login and refresh endpoints.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TokenPair {
    pub access: String,
    pub refresh: String,
}
