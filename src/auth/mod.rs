//! Accounts, bearer-token sessions, and session notifications.

pub mod model;
pub mod provider;
pub mod routes;
pub mod ws;

pub use model::{Identity, Session, SessionEvent, SessionNotice};
pub use provider::{AuthProvider, LocalAuth};
pub use routes::{auth_routes, resolve_session};
pub use ws::session_ws_routes;
