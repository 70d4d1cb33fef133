//! Prayer moderation engine, bulk import, reporting and background upkeep.

mod cleanup;
mod import;
mod moderation;
mod reports;

pub use cleanup::*;
pub use import::*;
pub use moderation::Review;
pub use reports::*;

use crate::config::PrayerConfig;
use crate::DbPool;

/// Entry point for everything that reads or changes prayer requests
#[derive(Clone)]
pub struct PrayerService {
    db: DbPool,
    config: PrayerConfig,
}

impl PrayerService {
    pub fn new(db: DbPool, config: PrayerConfig) -> Self {
        Self { db, config }
    }

    pub fn config(&self) -> &PrayerConfig {
        &self.config
    }
}
