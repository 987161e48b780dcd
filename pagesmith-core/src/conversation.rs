//! Conversation Log
//!
//! Turns are addressed by their position in the log. Snapshots in the
//! [`ArtifactStore`] are keyed by *exchange index*: the ordinal of a user turn
//! among all user turns, so the first request is exchange 0 no matter how many
//! assistant or system turns surround it.

use serde::{Deserialize, Serialize};
use std::time::SystemTime;
use tracing::{debug, info};
use uuid::Uuid;

use crate::artifact::{ArtifactStore, Restored};
use crate::attachment::Attachment;
use crate::error::{PagesmithError, Result};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    User,
    Assistant,
    System,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Turn {
    pub id: Uuid,
    pub role: Role,
    pub content: String,
    pub attachments: Vec<Attachment>,
    pub is_pending: bool,
    pub created_at: SystemTime,
}

impl Turn {
    fn with_role(role: Role, content: impl Into<String>) -> Self {
        Self {
            id: Uuid::new_v4(),
            role,
            content: content.into(),
            attachments: Vec::new(),
            is_pending: false,
            created_at: SystemTime::now(),
        }
    }

    pub fn user(content: impl Into<String>, attachments: Vec<Attachment>) -> Self {
        Self {
            attachments,
            ..Self::with_role(Role::User, content)
        }
    }

    pub fn assistant(content: impl Into<String>) -> Self {
        Self::with_role(Role::Assistant, content)
    }

    pub fn system(content: impl Into<String>) -> Self {
        Self::with_role(Role::System, content)
    }

    fn pending() -> Self {
        Self {
            is_pending: true,
            ..Self::with_role(Role::Assistant, "")
        }
    }
}

/// Result of [`ConversationLog::delete_turn`]
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Deletion {
    pub removed: usize,
    /// Exchange the Document was rolled back to before
    pub exchange: Option<usize>,
    /// `None` when a system turn was deleted and nothing was rolled back
    pub restored: Option<Restored>,
}

/// Result of [`ConversationLog::edit_turn`]
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Resubmission {
    /// Position of the edited user turn
    pub position: usize,
    /// Exchange index the regenerated snapshot must be recorded under
    pub exchange_index: usize,
    /// Position of the new pending assistant turn
    pub pending_position: usize,
    pub restored: Restored,
}

#[derive(Debug, Clone, Default)]
pub struct ConversationLog {
    turns: Vec<Turn>,
}

impl ConversationLog {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn turns(&self) -> &[Turn] {
        &self.turns
    }

    pub fn get(&self, position: usize) -> Option<&Turn> {
        self.turns.get(position)
    }

    pub fn len(&self) -> usize {
        self.turns.len()
    }

    pub fn is_empty(&self) -> bool {
        self.turns.is_empty()
    }

    /// Append a turn. A user turn is immediately followed by a pending
    /// assistant placeholder. Returns the position of the appended turn.
    pub fn append_turn(&mut self, turn: Turn) -> usize {
        let position = self.turns.len();
        let is_user = turn.role == Role::User;
        self.turns.push(turn);
        if is_user {
            self.turns.push(Turn::pending());
        }
        debug!("Appended turn at {} (user: {})", position, is_user);
        position
    }

    /// Settle the most recent pending assistant turn, or append a new
    /// assistant turn when none is pending. Returns its position.
    pub fn resolve_pending_turn(&mut self, content: impl Into<String>) -> usize {
        let content = content.into();
        match self.pending_index() {
            Some(position) => {
                let turn = &mut self.turns[position];
                turn.content = content;
                turn.is_pending = false;
                position
            }
            None => {
                self.turns.push(Turn::assistant(content));
                self.turns.len() - 1
            }
        }
    }

    pub fn pending_index(&self) -> Option<usize> {
        self.turns
            .iter()
            .rposition(|t| t.is_pending && t.role == Role::Assistant)
    }

    /// Number of user turns strictly before `position`
    pub fn exchange_index(&self, position: usize) -> usize {
        self.turns
            .iter()
            .take(position)
            .filter(|t| t.role == Role::User)
            .count()
    }

    /// Exchange a turn belongs to; `None` for system turns
    fn owning_exchange(&self, position: usize) -> Option<usize> {
        match self.turns.get(position)?.role {
            Role::User => Some(self.exchange_index(position)),
            Role::Assistant => Some(self.exchange_index(position).saturating_sub(1)),
            Role::System => None,
        }
    }

    fn check_position(&self, position: usize) -> Result<()> {
        if position < self.turns.len() {
            Ok(())
        } else {
            Err(PagesmithError::conversation(format!(
                "no turn at position {} (log has {})",
                position,
                self.turns.len()
            )))
        }
    }

    fn followed_by_assistant(&self, position: usize) -> bool {
        self.turns
            .get(position + 1)
            .map(|t| t.role == Role::Assistant)
            .unwrap_or(false)
    }

    /// Remove a turn, cascading to the assistant reply of a user turn, and
    /// roll the Document back to before the affected exchange.
    pub fn delete_turn(&mut self, position: usize, store: &mut ArtifactStore) -> Result<Deletion> {
        self.check_position(position)?;
        let exchange = self.owning_exchange(position);

        let mut removed = 1;
        if self.turns[position].role == Role::User && self.followed_by_assistant(position) {
            self.turns.remove(position + 1);
            removed += 1;
        }
        self.turns.remove(position);

        let restored = exchange.map(|e| store.restore_as_of(e));
        info!(
            "Deleted {} turn(s) at position {} (exchange {:?})",
            removed, position, exchange
        );
        Ok(Deletion {
            removed,
            exchange,
            restored,
        })
    }

    /// Replace a user turn in place, drop its reply, roll back, and queue a
    /// pending assistant turn for the regeneration.
    pub fn edit_turn(
        &mut self,
        position: usize,
        content: impl Into<String>,
        attachments: Vec<Attachment>,
        store: &mut ArtifactStore,
    ) -> Result<Resubmission> {
        self.check_position(position)?;
        if self.turns[position].role != Role::User {
            return Err(PagesmithError::conversation(format!(
                "turn at position {} is not a user turn",
                position
            )));
        }

        if self.followed_by_assistant(position) {
            self.turns.remove(position + 1);
        }

        let turn = &mut self.turns[position];
        turn.content = content.into();
        turn.attachments = attachments;
        turn.created_at = SystemTime::now();

        let exchange_index = self.exchange_index(position);
        let restored = store.restore_as_of(exchange_index);

        let pending_position = position + 1;
        self.turns.insert(pending_position, Turn::pending());

        info!("Edited turn {} (exchange {})", position, exchange_index);
        Ok(Resubmission {
            position,
            exchange_index,
            pending_position,
            restored,
        })
    }

    /// The last `limit` settled user/assistant turns, oldest first
    pub fn context_window(&self, limit: usize) -> Vec<&Turn> {
        self.context_before(self.turns.len(), limit)
    }

    /// Like [`context_window`](Self::context_window) but only looking at
    /// turns before `position`
    pub fn context_before(&self, position: usize, limit: usize) -> Vec<&Turn> {
        let settled: Vec<&Turn> = self
            .turns
            .iter()
            .take(position)
            .filter(|t| !t.is_pending && t.role != Role::System)
            .collect();
        let skip = settled.len().saturating_sub(limit);
        settled.into_iter().skip(skip).collect()
    }
}
