// Storefront BFF Library

pub mod auth;
pub mod client;
pub mod config;
pub mod core;
pub mod error;
pub mod pipeline;
pub mod proxy;
pub mod routes;
pub mod validate;

// Re-export commonly used types
pub use crate::config::{ProxyConfig, ServerConfig, TimeoutTier, UpstreamConfig};
pub use crate::error::{ConfigError, ErrorBody, ProxyError, ReasonCode};
pub use crate::core::{
    dispatcher::{
        OutboundRequestConfig, ReqwestTransport, RequestDispatcher, UpstreamResponse,
        UpstreamTransport,
    },
    request::InboundRequest,
    response::ProxyResponse,
    route::{RouteSet, RouteSpec},
    server::ProxyServer,
};
pub use crate::proxy::{ProxyHandler, ProxyServices};
