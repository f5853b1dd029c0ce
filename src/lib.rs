//! Request router for serverless functions: matches triggers, caches
//! function backends and proxies requests through a retrying transport.

pub mod handlers;
pub mod routing;
