pub mod auth_handler;
pub mod fallback;
pub mod health;
pub mod jwks_handler;
pub mod metrics;

pub use auth_handler::{handle_login, handle_me, handle_register, handle_validate};
pub use fallback::{error_page, not_found};
pub use health::{health_check, readiness_check};
pub use jwks_handler::handle_get_jwks;
pub use metrics::metrics_handler;
