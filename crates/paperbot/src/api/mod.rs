//! HTTP API module.
//!
//! Provides the gateway routes and the upstream proxy behind them.

mod error;
pub mod handlers;
pub mod proxy;
mod routes;
mod state;

pub use error::{ApiError, ApiResult, ErrorResponse, ProxyError};
pub use routes::{create_app, create_router};
pub use state::{AppState, ProxySettings};
