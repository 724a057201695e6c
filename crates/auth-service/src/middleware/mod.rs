pub mod auth;
pub mod authorization;
pub mod http_metrics;

pub use auth::{authenticate, AuthContext, GateMode, GateState};
pub use authorization::enforce_policy;
pub use http_metrics::http_metrics_middleware;
