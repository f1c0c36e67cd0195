use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Mutex, PoisonError};

#[derive(Debug, Clone, PartialEq, Eq)]
struct Exchange {
    user: String,
    assistant: String,
}

#[derive(Debug, Default)]
struct Conversation {
    exchanges: VecDeque<Exchange>,
    last_used: u64,
}

#[derive(Debug, Default)]
struct Sessions {
    conversations: HashMap<String, Conversation>,
    clock: u64,
}

impl Sessions {
    /// Fetch or start a conversation, marking it most recently used. Starting
    /// one past `max_sessions` evicts the least recently used.
    fn touch(&mut self, session_id: &str, max_sessions: usize) -> &mut Conversation {
        self.clock += 1;
        if !self.conversations.contains_key(session_id) {
            while self.conversations.len() >= max_sessions {
                let Some(oldest) = self
                    .conversations
                    .iter()
                    .min_by_key(|(_, c)| c.last_used)
                    .map(|(id, _)| id.clone())
                else {
                    break;
                };
                self.conversations.remove(&oldest);
                tracing::debug!(session = %oldest, "evicted idle conversation");
            }
        }
        let conversation = self
            .conversations
            .entry(session_id.to_owned())
            .or_default();
        conversation.last_used = self.clock;
        conversation
    }
}

/// In-memory conversation history, bounded to the last `max_history`
/// exchanges per conversation and `max_sessions` conversations.
#[derive(Debug)]
pub struct SessionStore {
    max_history: usize,
    max_sessions: usize,
    next_id: AtomicU64,
    sessions: Mutex<Sessions>,
}

impl SessionStore {
    #[must_use]
    pub fn new(max_history: usize, max_sessions: usize) -> Self {
        Self {
            max_history,
            max_sessions: max_sessions.max(1),
            next_id: AtomicU64::new(1),
            sessions: Mutex::new(Sessions::default()),
        }
    }

    /// Allocate a fresh `session_<n>` id.
    pub fn create_session(&self) -> String {
        let n = self.next_id.fetch_add(1, Ordering::Relaxed);
        let id = format!("session_{n}");
        self.sessions
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .touch(&id, self.max_sessions);
        id
    }

    /// Record one exchange; unknown ids start a new conversation.
    pub fn add_exchange(&self, session_id: &str, user: &str, assistant: &str) {
        let mut sessions = self.sessions.lock().unwrap_or_else(PoisonError::into_inner);
        let history = &mut sessions.touch(session_id, self.max_sessions).exchanges;
        history.push_back(Exchange {
            user: user.to_owned(),
            assistant: assistant.to_owned(),
        });
        while history.len() > self.max_history {
            history.pop_front();
        }
    }

    /// History rendered as `User: …` / `Assistant: …` lines, oldest first.
    #[must_use]
    pub fn history(&self, session_id: &str) -> Option<String> {
        let sessions = self.sessions.lock().unwrap_or_else(PoisonError::into_inner);
        let history = &sessions.conversations.get(session_id)?.exchanges;
        if history.is_empty() {
            return None;
        }
        let lines: Vec<String> = history
            .iter()
            .map(|e| format!("User: {}\nAssistant: {}", e.user, e.assistant))
            .collect();
        Some(lines.join("\n"))
    }

    pub fn clear(&self, session_id: &str) {
        self.sessions
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .conversations
            .remove(session_id);
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.sessions
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .conversations
            .len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
