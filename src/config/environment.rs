use crate::error::ConfigError;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;

/// Deployment settings consumed by the stores and the request pipeline.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Environment {
    pub production: bool,
    pub api_url: String,
    pub api_endpoints: ApiEndpoints,
    pub app: AppInfo,
    pub features: Features,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ApiEndpoints {
    pub auth: AuthEndpoints,
}

/// Paths relative to `api_url`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AuthEndpoints {
    pub login: String,
    pub refresh: String,
    pub logout: String,
}

impl Default for AuthEndpoints {
    fn default() -> Self {
        Self {
            login: "/api/token/".into(),
            refresh: "/api/token/refresh/".into(),
            logout: "/api/auth/logout/".into(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AppInfo {
    pub name: String,
    pub version: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Features {
    pub dev_tools: bool,
    pub persistence: bool,
    pub logging: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Feature {
    DevTools,
    Persistence,
    Logging,
}

impl Environment {
    fn preset(production: bool, api_url: &str, name: &str, features: Features) -> Self {
        Self {
            production,
            api_url: api_url.into(),
            api_endpoints: ApiEndpoints {
                auth: AuthEndpoints::default(),
            },
            app: AppInfo {
                name: name.into(),
                version: "1.0.0".into(),
            },
            features,
        }
    }

    pub fn development() -> Self {
        Self::preset(
            false,
            "http://localhost:8000",
            "Angular Boilerplate",
            Features {
                dev_tools: true,
                persistence: true,
                logging: true,
            },
        )
    }

    pub fn staging() -> Self {
        Self::preset(
            false,
            "https://staging-api.your-domain.com",
            "Angular Boilerplate (Staging)",
            Features {
                dev_tools: true,
                persistence: true,
                logging: true,
            },
        )
    }

    pub fn production() -> Self {
        Self::preset(
            true,
            "https://your-api-domain.com",
            "Angular Boilerplate",
            Features {
                dev_tools: false,
                persistence: true,
                logging: false,
            },
        )
    }

    pub fn from_toml_str(raw: &str) -> Result<Self, ConfigError> {
        Ok(toml::from_str(raw)?)
    }

    pub fn from_path(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let raw = fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_toml_str(&raw)
    }

    /// Absolute URL of an endpoint path.
    pub fn api_url(&self, endpoint: &str) -> String {
        format!("{}{}", self.api_url.trim_end_matches('/'), endpoint)
    }

    pub fn login_url(&self) -> String {
        self.api_url(&self.api_endpoints.auth.login)
    }

    pub fn refresh_url(&self) -> String {
        self.api_url(&self.api_endpoints.auth.refresh)
    }

    pub fn is_feature_enabled(&self, feature: Feature) -> bool {
        match feature {
            Feature::DevTools => self.features.dev_tools,
            Feature::Persistence => self.features.persistence,
            Feature::Logging => self.features.logging,
        }
    }
}

impl Default for Environment {
    fn default() -> Self {
        Self::development()
    }
}
