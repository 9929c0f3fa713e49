//! Request pipeline.
//!
//! A [`Handler`] sends a request and returns the response; the
//! [`AuthInterceptor`] sits in front of one and couples it to the session.

mod client;
mod interceptor;

pub use client::{Handler, HttpRequest, HttpResponse, ReqwestHandler};
pub use interceptor::{AuthInterceptor, Intercepted};
