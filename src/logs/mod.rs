//! Daily shutdown logs: one reflection record per user per day.

pub mod model;
pub mod routes;
pub mod service;

pub use model::{DailyLog, LogAction, LogData, LogPatch, LogSummary};
pub use routes::log_routes;
pub use service::LogService;
