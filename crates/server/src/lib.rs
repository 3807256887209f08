//! Voice Gateway Server
//!
//! HTTP surface and the per-call bridge. One task per call owns both
//! sockets; webhooks coordinate with it through the call store.

pub mod http;
pub mod media;
pub mod state;
pub mod webhooks;

pub use http::create_router;
pub use state::AppState;
