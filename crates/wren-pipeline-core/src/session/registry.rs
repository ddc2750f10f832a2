//! Session registry with LRU eviction.
//!
//! Maps a chat host session to the Wren-UI thread it talks to, plus the last
//! question and executed SQL used by chart requests. Entries are bounded by
//! count and evicted when idle; an evicted session simply starts a new thread.

use std::num::NonZeroUsize;
use std::sync::{Mutex, MutexGuard, PoisonError};
use std::time::{Duration, Instant};

use lru::LruCache;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::{debug, info};

use crate::error::{Error, Result};

pub const UNKNOWN_SESSION: &str = "unknown-chat";

/// Chat host conversation identity.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct SessionId(String);

impl SessionId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Resolve the session from a request body's `metadata`, trying
    /// `chat_id`, `session_id` and `thread_id` in that order.
    pub fn from_body(body: &Value) -> Self {
        let metadata = body.get("metadata");
        ["chat_id", "session_id", "thread_id"]
            .iter()
            .find_map(|key| {
                metadata
                    .and_then(|m| m.get(*key))
                    .and_then(Value::as_str)
                    .filter(|s| !s.is_empty())
            })
            .map_or_else(|| Self::new(UNKNOWN_SESSION), Self::new)
    }
}

impl std::fmt::Display for SessionId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for SessionId {
    fn from(value: &str) -> Self {
        Self::new(value)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionRegistryConfig {
    /// Maximum number of sessions kept in memory.
    pub max_sessions: usize,
    /// Duration after which an idle session may be evicted.
    pub idle_timeout: Duration,
}

impl Default for SessionRegistryConfig {
    fn default() -> Self {
        Self {
            max_sessions: 1024,
            idle_timeout: Duration::from_secs(24 * 60 * 60),
        }
    }
}

impl SessionRegistryConfig {
    pub fn with_max_sessions(mut self, max: usize) -> Self {
        self.max_sessions = max;
        self
    }

    pub fn with_idle_timeout(mut self, timeout: Duration) -> Self {
        self.idle_timeout = timeout;
        self
    }
}

#[derive(Debug, Clone)]
pub struct SessionEntry {
    pub thread_id: Option<String>,
    pub last_sql: Option<String>,
    pub last_question: Option<String>,
    pub last_activity: Instant,
}

impl SessionEntry {
    fn new() -> Self {
        Self {
            thread_id: None,
            last_sql: None,
            last_question: None,
            last_activity: Instant::now(),
        }
    }

    fn touch(&mut self) {
        self.last_activity = Instant::now();
    }

    fn is_idle(&self, timeout: Duration) -> bool {
        self.last_activity.elapsed() > timeout
    }
}

/// Read-only copy of a session's state.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SessionSnapshot {
    pub thread_id: Option<String>,
    pub last_sql: Option<String>,
    pub last_question: Option<String>,
}

/// Fields a finished turn writes back. `None` leaves the stored value alone.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TurnRecord {
    pub question: Option<String>,
    pub sql: Option<String>,
}

pub struct SessionRegistry {
    sessions: Mutex<LruCache<SessionId, SessionEntry>>,
    config: SessionRegistryConfig,
}

impl SessionRegistry {
    pub fn new(config: SessionRegistryConfig) -> Result<Self> {
        let capacity = NonZeroUsize::new(config.max_sessions).ok_or_else(|| {
            Error::Configuration("max_sessions must be > 0".to_string())
        })?;

        Ok(Self {
            sessions: Mutex::new(LruCache::new(capacity)),
            config,
        })
    }

    fn lock(&self) -> MutexGuard<'_, LruCache<SessionId, SessionEntry>> {
        self.sessions.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Thread id known for the session, if any.
    pub fn get(&self, session_id: &SessionId) -> Option<String> {
        let mut sessions = self.lock();
        let entry = sessions.get_mut(session_id)?;
        entry.touch();
        entry.thread_id.clone()
    }

    /// Store the thread id for a session. The first thread id wins; a
    /// different later value is ignored. Returns whether the value was stored.
    pub fn set(&self, session_id: &SessionId, thread_id: &str) -> bool {
        let mut sessions = self.lock();
        let entry = sessions.get_or_insert_mut(session_id.clone(), SessionEntry::new);
        entry.touch();

        match &entry.thread_id {
            Some(existing) if existing == thread_id => false,
            Some(existing) => {
                debug!(
                    target: "wren::session",
                    session_id = %session_id,
                    existing = %existing,
                    ignored = %thread_id,
                    "Thread id already set, keeping the first one"
                );
                false
            }
            None => {
                entry.thread_id = Some(thread_id.to_string());
                info!(
                    target: "wren::session",
                    session_id = %session_id,
                    thread_id = %thread_id,
                    "Stored thread id"
                );
                true
            }
        }
    }

    pub fn record_turn(&self, session_id: &SessionId, record: TurnRecord) {
        let mut sessions = self.lock();
        let entry = sessions.get_or_insert_mut(session_id.clone(), SessionEntry::new);
        entry.touch();
        if let Some(question) = record.question {
            entry.last_question = Some(question);
        }
        if let Some(sql) = record.sql {
            entry.last_sql = Some(sql);
        }
    }

    pub fn snapshot(&self, session_id: &SessionId) -> Option<SessionSnapshot> {
        let mut sessions = self.lock();
        let entry = sessions.get_mut(session_id)?;
        entry.touch();
        Some(SessionSnapshot {
            thread_id: entry.thread_id.clone(),
            last_sql: entry.last_sql.clone(),
            last_question: entry.last_question.clone(),
        })
    }

    /// Evict sessions that have been idle longer than the configured timeout.
    ///
    /// Returns the number of sessions evicted.
    pub fn evict_idle(&self) -> usize {
        let timeout = self.config.idle_timeout;
        let mut sessions = self.lock();
        let to_evict: Vec<SessionId> = sessions
            .iter()
            .filter(|(_, entry)| entry.is_idle(timeout))
            .map(|(id, _)| id.clone())
            .collect();

        for session_id in &to_evict {
            sessions.pop(session_id);
            debug!(target: "wren::session", session_id = %session_id, "Evicted idle session");
        }

        to_evict.len()
    }

    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.lock().is_empty()
    }

    pub fn contains(&self, session_id: &SessionId) -> bool {
        self.lock().contains(session_id)
    }
}
