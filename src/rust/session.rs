//! Per-browser interaction state.
//!
//! A session is created on the first request without a known `session_id`
//! cookie and lives in memory until it has been idle for longer than the
//! store's TTL. An expired session is gone for good; the next request from
//! that browser starts a fresh Idle one.

use std::collections::HashMap;
use std::sync::{Arc, Mutex as StdMutex, MutexGuard};
use std::time::{Duration, SystemTime};

use serde::{Deserialize, Serialize};
use tokio::sync::Mutex;
use tokio::task::JoinHandle;
use tokio::time::{Instant, MissedTickBehavior};
use uuid::Uuid;

use crate::classifier::Prediction;

pub type SessionId = Uuid;

/// Text pre-filled in the input box of a fresh session.
pub const DEFAULT_INPUT: &str = "I love this!";

/// Idle time after which a session is dropped.
pub const DEFAULT_SESSION_TTL: Duration = Duration::from_secs(30 * 60);

/// The user's verdict on a prediction.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FeedbackChoice {
    Yes,
    No,
}

impl FeedbackChoice {
    pub fn is_correct(&self) -> bool {
        matches!(self, FeedbackChoice::Yes)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum FeedbackState {
    #[default]
    Unset,
    Yes,
    No,
}

impl From<FeedbackChoice> for FeedbackState {
    fn from(choice: FeedbackChoice) -> Self {
        match choice {
            FeedbackChoice::Yes => FeedbackState::Yes,
            FeedbackChoice::No => FeedbackState::No,
        }
    }
}

/// One accepted feedback event.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AccuracyEntry {
    pub timestamp: SystemTime,
    /// 1 when the user confirmed the prediction, 0 otherwise
    pub correct: u8,
}

/// Where a session is in the analyze/feedback cycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InteractionState {
    Idle,
    AwaitingFeedback,
    FeedbackGiven,
}

/// Everything one browser session remembers between requests.
#[derive(Debug, Clone, Serialize)]
pub struct SessionState {
    pub prediction: Option<Prediction>,
    pub feedback: FeedbackState,
    pub accuracy_history: Vec<AccuracyEntry>,
    pub yes_count: u64,
    pub no_count: u64,
    /// Message of the last failed classification, cleared by the next success
    pub last_error: Option<String>,
    /// Text shown in the input box
    pub input_text: String,
}

impl Default for SessionState {
    fn default() -> Self {
        Self {
            prediction: None,
            feedback: FeedbackState::Unset,
            accuracy_history: Vec::new(),
            yes_count: 0,
            no_count: 0,
            last_error: None,
            input_text: DEFAULT_INPUT.to_string(),
        }
    }
}

impl SessionState {
    pub fn phase(&self) -> InteractionState {
        match (&self.prediction, self.feedback) {
            (None, _) => InteractionState::Idle,
            (Some(_), FeedbackState::Unset) => InteractionState::AwaitingFeedback,
            (Some(_), _) => InteractionState::FeedbackGiven,
        }
    }
}

#[derive(Debug)]
struct Entry {
    state: Arc<Mutex<SessionState>>,
    last_seen: Instant,
}

/// In-memory map of live sessions. Nothing survives a process restart.
///
/// Each session sits behind its own async mutex, so events of one session are
/// applied strictly in order while different sessions proceed independently.
#[derive(Debug)]
pub struct SessionStore {
    sessions: StdMutex<HashMap<SessionId, Entry>>,
    ttl: Duration,
}

impl Default for SessionStore {
    fn default() -> Self {
        Self::with_ttl(DEFAULT_SESSION_TTL)
    }
}

impl SessionStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_ttl(ttl: Duration) -> Self {
        Self {
            sessions: StdMutex::new(HashMap::new()),
            ttl,
        }
    }

    pub fn ttl(&self) -> Duration {
        self.ttl
    }

    fn lock(&self) -> MutexGuard<'_, HashMap<SessionId, Entry>> {
        self.sessions
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Returns the live session for `id`, otherwise starts a new Idle one.
    ///
    /// A hit refreshes the session's idle timer. An id whose session has
    /// expired is treated like an unknown one. The boolean is `true` when a
    /// session was created.
    pub fn get_or_create(&self, id: Option<SessionId>) -> (SessionId, Arc<Mutex<SessionState>>, bool) {
        let now = Instant::now();
        let mut sessions = self.lock();

        if let Some(id) = id {
            if let Some(entry) = sessions.get_mut(&id) {
                if now.duration_since(entry.last_seen) <= self.ttl {
                    entry.last_seen = now;
                    return (id, Arc::clone(&entry.state), false);
                }
            }
            if sessions.remove(&id).is_some() {
                log::info!("Session {} expired", id);
            }
        }

        let id = Uuid::new_v4();
        let state = Arc::new(Mutex::new(SessionState::default()));
        sessions.insert(
            id,
            Entry {
                state: Arc::clone(&state),
                last_seen: now,
            },
        );
        log::info!("Started session {} ({} active)", id, sessions.len());
        (id, state, true)
    }

    /// Drops every session idle for longer than the TTL. Returns how many went.
    pub fn evict_expired(&self) -> usize {
        let now = Instant::now();
        let mut sessions = self.lock();
        let before = sessions.len();
        sessions.retain(|_, entry| now.duration_since(entry.last_seen) <= self.ttl);
        before - sessions.len()
    }

    /// Runs [`SessionStore::evict_expired`] every `period` until the store is dropped.
    pub fn spawn_sweeper(store: &Arc<Self>, period: Duration) -> JoinHandle<()> {
        let store = Arc::downgrade(store);
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(period);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
            loop {
                ticker.tick().await;
                let Some(store) = store.upgrade() else {
                    break;
                };
                let evicted = store.evict_expired();
                if evicted > 0 {
                    log::info!("Evicted {} idle sessions ({} active)", evicted, store.len());
                }
            }
        })
    }

    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
