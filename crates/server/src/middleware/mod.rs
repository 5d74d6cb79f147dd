//! HTTP middleware stack.
//!
//! # Middleware Order (bottom to top in Router)
//!
//! 1. Sentry layer (capture errors)
//! 2. `TraceLayer` (request tracing)
//! 3. Request ID (add unique ID to each request)
//! 4. Session layer (tower-sessions with `PostgreSQL` store)
//! 5. API key guard on the EMR-facing routes
//! 6. Auth extractors in the handlers

pub mod api_key;
pub mod auth;
pub mod request_id;
pub mod session;

pub use api_key::require_api_key;
pub use auth::{RequireAdmin, RequireAuth, clear_current_user, set_current_user};
pub use request_id::request_id_middleware;
pub use session::{create_session_layer, session_layer};
