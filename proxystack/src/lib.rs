//! ProxyStack - S3-compatible proxy front end
//!
//! Serves S3 clients by translating their requests into subrequests against
//! an internal versioned object API, all inside one handler chain.

pub mod config;
pub mod router;

pub use config::Config;
pub use router::{create_router, AppState};

/// Build the full application for `config`
pub fn build_app(config: &Config) -> axum::Router {
    create_router(AppState::new(config))
}
