//! HTTP and SSE proxy to the research backend.
//!
//! Every gateway route forwards to the same path under the upstream `/api`
//! prefix. The route table decides the relay mode per path.

pub mod builder;
mod forward;
mod sse;
mod table;

pub use forward::{forward_binary, forward_json, relay_buffered};
pub use sse::{forward_stream, is_event_stream};
pub use table::{ParamRule, ROUTES, RelayMode, RouteMethod, RouteSpec};
