pub mod api;
pub mod auth;
pub mod cli;
pub mod config;
pub mod db;
pub mod engine;
pub mod error;
pub mod notifications;
pub mod validation;

pub use db::DbPool;
pub use error::{Error, Result};

use config::Config;
use std::sync::Arc;

use crate::api::rate_limit::RateLimiter;
use crate::auth::AuthService;
use crate::engine::PrayerService;
use crate::notifications::Mailer;

pub struct AppState {
    pub config: Config,
    pub db: DbPool,
    pub rate_limiter: Arc<RateLimiter>,
    pub mailer: Mailer,
}

impl AppState {
    pub fn new(config: Config, db: DbPool) -> Self {
        let rate_limiter = Arc::new(RateLimiter::new(config.rate_limit.clone()));
        let mailer = Mailer::new(config.email.clone());
        Self {
            config,
            db,
            rate_limiter,
            mailer,
        }
    }

    pub fn auth(&self) -> AuthService {
        AuthService::new(self.db.clone(), &self.config.auth)
    }

    pub fn prayers(&self) -> PrayerService {
        PrayerService::new(self.db.clone(), self.config.prayers.clone())
    }
}
