//! Environment configuration.

mod environment;

pub use environment::{ApiEndpoints, AppInfo, AuthEndpoints, Environment, Feature, Features};
