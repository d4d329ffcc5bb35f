//! Registry of users currently inside the conversational intake script.
//!
//! The script itself (prompting for a ticket description and so on) lives
//! outside this service; the registry only tracks who is mid-conversation
//! and at which stage, so `/status` can report the active queue.

use chrono::{DateTime, Utc};
use dashmap::DashMap;
use serde::Serialize;
use tracing::debug;

/// One user mid-way through the intake conversation.
#[derive(Debug, Clone, Serialize)]
pub struct IntakeUser {
    pub user_id: String,
    pub stage: String,
    pub started_at: DateTime<Utc>,
    pub last_activity: DateTime<Utc>,
}

/// Concurrent map of active intake conversations, keyed by user id.
#[derive(Debug, Default)]
pub struct IntakeRegistry {
    users: DashMap<String, IntakeUser>,
}

impl IntakeRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Start (or restart) a conversation for a user at the given stage.
    pub fn begin(&self, user_id: &str, stage: &str) {
        debug!(user_id, stage, "intake conversation started");
        let now = Utc::now();
        self.users.insert(
            user_id.to_string(),
            IntakeUser {
                user_id: user_id.to_string(),
                stage: stage.to_string(),
                started_at: now,
                last_activity: now,
            },
        );
    }

    /// Move an active conversation to a new stage. Unknown users are
    /// ignored; the script may have been cleaned up concurrently.
    pub fn advance(&self, user_id: &str, stage: &str) {
        if let Some(mut user) = self.users.get_mut(user_id) {
            user.stage = stage.to_string();
            user.last_activity = Utc::now();
        }
    }

    /// Remove a user whose conversation finished or was abandoned.
    pub fn complete(&self, user_id: &str) -> bool {
        let removed = self.users.remove(user_id).is_some();
        if removed {
            debug!(user_id, "intake conversation completed");
        }
        removed
    }

    pub fn active_count(&self) -> usize {
        self.users.len()
    }

    /// Snapshot of all active conversations, for the status endpoint.
    pub fn snapshot(&self) -> Vec<IntakeUser> {
        let mut users: Vec<_> = self.users.iter().map(|e| e.value().clone()).collect();
        users.sort_by(|a, b| a.started_at.cmp(&b.started_at));
        users
    }
}
