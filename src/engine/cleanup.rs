//! Session and reset-token cleanup
//!
//! Expired sessions and spent reset tokens are already ignored at read time;
//! this task only keeps the tables from growing. It runs in the background on
//! an interval and can also be triggered once from the CLI.

use crate::auth::AuthService;
use crate::config::MaintenanceConfig;
use chrono::Utc;
use tokio::time::{interval, Duration};

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct CleanupStats {
    pub sessions_removed: u64,
    pub reset_tokens_removed: u64,
}

/// Purges expired auth state
pub struct AuthCleanup {
    auth: AuthService,
}

impl AuthCleanup {
    pub fn new(auth: AuthService) -> Self {
        Self { auth }
    }

    /// Run a single cleanup cycle
    pub async fn run_cleanup(&self) -> crate::Result<CleanupStats> {
        let now = Utc::now();
        let stats = CleanupStats {
            sessions_removed: self.auth.cleanup_expired_sessions(now).await?,
            reset_tokens_removed: self.auth.cleanup_expired_reset_tokens(now).await?,
        };

        tracing::debug!(
            sessions = stats.sessions_removed,
            reset_tokens = stats.reset_tokens_removed,
            "Cleanup cycle completed"
        );
        Ok(stats)
    }
}

pub fn spawn_cleanup_task(auth: AuthService, config: &MaintenanceConfig) {
    if config.cleanup_interval_secs == 0 {
        tracing::info!("Session cleanup is disabled");
        return;
    }

    let interval_secs = config.cleanup_interval_secs;
    tracing::info!(interval_secs, "Starting session cleanup task");

    let cleanup = AuthCleanup::new(auth);

    tokio::spawn(async move {
        let mut tick = interval(Duration::from_secs(interval_secs));
        tick.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);

        loop {
            tick.tick().await;
            if let Err(e) = cleanup.run_cleanup().await {
                tracing::error!(error = %e, "Cleanup cycle failed");
            }
        }
    });
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::auth::test_support::{service, user_with_role};
    use crate::db::Role;
    use chrono::Duration as ChronoDuration;

    #[tokio::test]
    async fn test_cleanup_removes_only_expired_state() {
        let db = crate::db::connect_memory().await.unwrap();
        let auth = service(&db);
        let alice = user_with_role(&db, "alice", Role::Member).await;
        let now = Utc::now();

        auth.create_session(alice.id, now - ChronoDuration::hours(48))
            .await
            .unwrap();
        let live = auth.create_session(alice.id, now).await.unwrap();
        auth.request_password_reset("alice", now - ChronoDuration::hours(3))
            .await
            .unwrap();

        let cleanup = AuthCleanup::new(auth.clone());
        let stats = cleanup.run_cleanup().await.unwrap();
        assert_eq!(
            stats,
            CleanupStats {
                sessions_removed: 1,
                reset_tokens_removed: 1,
            }
        );

        assert_eq!(cleanup.run_cleanup().await.unwrap(), CleanupStats::default());
        assert!(auth.get_user_by_session(&live, now).await.unwrap().is_some());
    }
}
