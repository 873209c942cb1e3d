//! Idle-session expiry.

use crate::session::SessionRegistry;
use crate::sse::SseBroadcaster;
use chrono::{DateTime, Utc};
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio::time::{Instant, MissedTickBehavior};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

pub const DEFAULT_SESSION_TIMEOUT: Duration = Duration::from_secs(60 * 60);
pub const DEFAULT_CLEANUP_INTERVAL: Duration = Duration::from_secs(60);

/// Periodically removes sessions idle for longer than `session_timeout` and
/// closes their SSE connections.
pub struct CleanupScheduler {
    registry: Arc<SessionRegistry>,
    broadcaster: Arc<SseBroadcaster>,
    session_timeout: Duration,
    interval: Duration,
}

impl CleanupScheduler {
    pub fn new(
        registry: Arc<SessionRegistry>,
        broadcaster: Arc<SseBroadcaster>,
        session_timeout: Duration,
        interval: Duration,
    ) -> Self {
        Self {
            registry,
            broadcaster,
            session_timeout,
            interval,
        }
    }

    /// Run one sweep against the current time.
    pub fn sweep(&self) -> usize {
        self.sweep_at(Utc::now())
    }

    /// Run one sweep as if the time were `now`. Returns the number of
    /// sessions removed.
    pub fn sweep_at(&self, now: DateTime<Utc>) -> usize {
        let timeout_ms = i64::try_from(self.session_timeout.as_millis()).unwrap_or(i64::MAX);
        let mut expired = 0;

        for session in self.registry.all() {
            if session.idle_millis(now) <= timeout_ms {
                continue;
            }
            // Re-checked under the entry lock: a touch since the snapshot keeps
            // the session. Removal marks it closed before its streams end.
            if let Some(session) = self.registry.remove_if_idle(&session.id, now, timeout_ms) {
                let closed = self.broadcaster.close_session(&session);
                info!(
                    session_id = %session.id,
                    idle_ms = session.idle_millis(now),
                    connections_closed = closed,
                    "Expired idle session"
                );
                expired += 1;
            }
        }

        if expired > 0 {
            debug!(expired = expired, remaining = self.registry.count(), "Session sweep finished");
        }
        expired
    }

    /// Start the sweep loop. The first sweep runs one interval after
    /// spawning; the loop exits when `shutdown` is cancelled.
    pub fn spawn(self, shutdown: CancellationToken) -> JoinHandle<()> {
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval_at(Instant::now() + self.interval, self.interval);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

            loop {
                tokio::select! {
                    _ = shutdown.cancelled() => {
                        debug!("Session cleanup stopped");
                        break;
                    }
                    _ = ticker.tick() => {
                        self.sweep();
                    }
                }
            }
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn scheduler(
        timeout: Duration,
        interval: Duration,
    ) -> (Arc<SessionRegistry>, Arc<SseBroadcaster>, CleanupScheduler) {
        let registry = Arc::new(SessionRegistry::new());
        let broadcaster = Arc::new(SseBroadcaster::new(Arc::clone(&registry)));
        let scheduler = CleanupScheduler::new(
            Arc::clone(&registry),
            Arc::clone(&broadcaster),
            timeout,
            interval,
        );
        (registry, broadcaster, scheduler)
    }

    #[tokio::test]
    async fn sweep_removes_only_idle_sessions() {
        let (registry, _, scheduler) =
            scheduler(Duration::from_secs(3600), DEFAULT_CLEANUP_INTERVAL);
        let idle = registry.get_or_create(None);
        let later = idle.last_activity() + chrono::Duration::seconds(3601);

        assert_eq!(scheduler.sweep_at(idle.last_activity()), 0);
        assert_eq!(registry.count(), 1);

        assert_eq!(scheduler.sweep_at(later), 1);
        assert_eq!(registry.count(), 0);
        assert!(idle.is_closed());
    }

    #[tokio::test]
    async fn exactly_at_timeout_is_kept() {
        let (registry, _, scheduler) =
            scheduler(Duration::from_secs(60), DEFAULT_CLEANUP_INTERVAL);
        let session = registry.get_or_create(None);
        let boundary = session.last_activity() + chrono::Duration::seconds(60);
        assert_eq!(scheduler.sweep_at(boundary), 0);
        assert!(registry.get(&session.id).is_some());
    }

    #[tokio::test]
    async fn session_touched_before_removal_is_kept() {
        let (registry, _, scheduler) =
            scheduler(Duration::from_millis(50), DEFAULT_CLEANUP_INTERVAL);
        let session = registry.get_or_create(None);

        tokio::time::sleep(Duration::from_millis(80)).await;
        registry.touch(&session.id);

        // Against the live activity the session is fresh again.
        assert_eq!(scheduler.sweep(), 0);
        assert!(!session.is_closed());
        assert!(registry.get(&session.id).is_some());
    }

    #[tokio::test]
    async fn sweep_closes_connections_of_expired_session() {
        let (registry, broadcaster, scheduler) =
            scheduler(Duration::from_millis(50), DEFAULT_CLEANUP_INTERVAL);
        let expired = registry.get_or_create(None);
        let mut sub = broadcaster.subscribe(&expired);
        assert_eq!(sub.recv().await.unwrap().event_type, "connection");

        tokio::time::sleep(Duration::from_millis(120)).await;
        let kept = registry.get_or_create(None);
        let _kept_sub = broadcaster.subscribe(&kept);

        assert_eq!(scheduler.sweep(), 1);
        assert_eq!(expired.connection_count(), 0);
        assert!(sub.recv().await.is_none());
        assert_eq!(kept.connection_count(), 1);
        assert!(registry.get(&kept.id).is_some());
    }

    #[tokio::test]
    async fn spawned_loop_sweeps_until_cancelled() {
        let (registry, _, scheduler) =
            scheduler(Duration::from_millis(10), Duration::from_millis(20));
        let shutdown = CancellationToken::new();
        let handle = scheduler.spawn(shutdown.clone());

        registry.get_or_create(None);
        let deadline = tokio::time::Instant::now() + Duration::from_secs(2);
        while registry.count() > 0 && tokio::time::Instant::now() < deadline {
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        assert_eq!(registry.count(), 0);

        shutdown.cancel();
        handle.await.unwrap();
    }
}
