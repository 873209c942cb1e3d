//! Session registry.
//!
//! A session ties one JSON-RPC request stream to zero or more SSE push
//! connections. Clients identify their session with the `X-Session-ID`
//! header (or the `session` query parameter on the SSE endpoints).
//!
//! ## Lifecycle
//!
//! 1. **Created lazily**: the first request without an id, or with an id the
//!    registry does not know, allocates a fresh session (UUID v4).
//! 2. **Touched**: every request that resolves the session bumps
//!    `last_activity`. The timestamp never moves backwards.
//! 3. **Expired**: the cleanup sweep removes sessions idle for longer than the
//!    configured timeout and force-closes their SSE connections. There is no
//!    explicit logout.
//!
//! All state is in memory and lost on restart.

use crate::sse::Subscriber;
use chrono::{DateTime, SubsecRound, TimeZone, Utc};
use dashmap::DashMap;
use std::sync::{
    Arc,
    atomic::{AtomicBool, AtomicI64, Ordering},
};
use tracing::{debug, info};
use uuid::Uuid;

/// Identifier of a single SSE connection within a session.
pub type ConnectionId = Uuid;

/// One logical client.
pub struct Session {
    /// Unique session identifier
    pub id: String,
    /// When the session was created
    created: DateTime<Utc>,
    /// Unix milliseconds of the last request that referenced this session
    last_activity_ms: AtomicI64,
    /// Open SSE connections subscribed to this session
    pub(crate) connections: DashMap<ConnectionId, Subscriber>,
    /// Set once the session has been removed from the registry
    closed: AtomicBool,
}

impl Session {
    fn new(id: String) -> Self {
        // Activity is tracked in whole milliseconds; keep `created` on the same grid.
        let now = Utc::now().trunc_subsecs(3);
        Self {
            id,
            created: now,
            last_activity_ms: AtomicI64::new(now.timestamp_millis()),
            connections: DashMap::new(),
            closed: AtomicBool::new(false),
        }
    }

    pub fn created(&self) -> DateTime<Utc> {
        self.created
    }

    pub fn last_activity(&self) -> DateTime<Utc> {
        let ms = self.last_activity_ms.load(Ordering::SeqCst);
        Utc.timestamp_millis_opt(ms)
            .single()
            .unwrap_or(self.created)
    }

    /// Bump `last_activity` to now. Concurrent touches never move it backwards.
    pub fn touch(&self) {
        self.last_activity_ms
            .fetch_max(Utc::now().timestamp_millis(), Ordering::SeqCst);
    }

    /// Milliseconds between the last activity and `now` (negative if `now` is
    /// earlier than the last activity).
    pub fn idle_millis(&self, now: DateTime<Utc>) -> i64 {
        now.timestamp_millis() - self.last_activity_ms.load(Ordering::SeqCst)
    }

    pub fn connection_count(&self) -> usize {
        self.connections.len()
    }

    /// True once the registry has dropped this session.
    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }
}

impl std::fmt::Debug for Session {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Session")
            .field("id", &self.id)
            .field("created", &self.created)
            .field("last_activity", &self.last_activity())
            .field("connections", &self.connections.len())
            .field("closed", &self.is_closed())
            .finish()
    }
}

/// Concurrent store of live sessions, keyed by id.
#[derive(Default)]
pub struct SessionRegistry {
    sessions: DashMap<String, Arc<Session>>,
}

impl SessionRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Resolve `session_id` to a live session, refreshing its activity, or
    /// allocate a new session when the id is absent or unknown.
    pub fn get_or_create(&self, session_id: Option<&str>) -> Arc<Session> {
        if let Some(id) = session_id {
            // Clone out of the map guard before doing anything else with it.
            let existing = self.sessions.get(id).map(|s| Arc::clone(s.value()));
            if let Some(session) = existing {
                session.touch();
                debug!(session_id = %session.id, "Resolved existing session");
                return session;
            }
            debug!(requested = %id, "Unknown session id, creating a new session");
        }
        self.create()
    }

    fn create(&self) -> Arc<Session> {
        let session = Arc::new(Session::new(Uuid::new_v4().to_string()));
        self.sessions
            .insert(session.id.clone(), Arc::clone(&session));
        info!(session_id = %session.id, "Created session");
        session
    }

    pub fn get(&self, session_id: &str) -> Option<Arc<Session>> {
        self.sessions.get(session_id).map(|s| Arc::clone(s.value()))
    }

    /// Update `last_activity`; unknown ids are ignored.
    pub fn touch(&self, session_id: &str) {
        if let Some(session) = self.get(session_id) {
            session.touch();
        }
    }

    /// Remove a session and mark it closed. The caller owns closing its
    /// connections.
    pub fn remove(&self, session_id: &str) -> Option<Arc<Session>> {
        let (_, session) = self.sessions.remove(session_id)?;
        session.closed.store(true, Ordering::SeqCst);
        debug!(session_id = %session_id, "Removed session");
        Some(session)
    }

    /// Remove a session only if it has been idle for longer than
    /// `timeout_ms` at `now`. The idle check runs under the map's entry lock,
    /// so a request that touches the session first keeps it alive.
    pub fn remove_if_idle(
        &self,
        session_id: &str,
        now: DateTime<Utc>,
        timeout_ms: i64,
    ) -> Option<Arc<Session>> {
        let (_, session) = self
            .sessions
            .remove_if(session_id, |_, s| s.idle_millis(now) > timeout_ms)?;
        session.closed.store(true, Ordering::SeqCst);
        debug!(session_id = %session_id, "Removed idle session");
        Some(session)
    }

    /// Snapshot of every live session.
    pub fn all(&self) -> Vec<Arc<Session>> {
        self.sessions
            .iter()
            .map(|entry| Arc::clone(entry.value()))
            .collect()
    }

    pub fn count(&self) -> usize {
        self.sessions.len()
    }
}
