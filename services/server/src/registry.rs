//! Session Registry
//!
//! The only state shared between connections. It issues session identities,
//! guaranteeing that none is handed out twice while the process runs, and
//! holds the memory of closed conversations so a client that reconnects with
//! its uid picks up where it left off.

use companion_core::memory::ConversationMemory;
use std::collections::{HashMap, HashSet};
use tokio::sync::Mutex;
use tracing::{debug, info};
use uuid::Uuid;

/// Parked memories kept when no capacity is configured.
pub const DEFAULT_PARKED_CAPACITY: usize = 1024;

/// Memory left behind by a closed connection.
struct ParkedSession {
    character: String,
    memory: Box<dyn ConversationMemory>,
    /// Park order, used to evict the oldest entry first.
    seq: u64,
}

#[derive(Default)]
struct Inner {
    issued: HashSet<String>,
    parked: HashMap<String, ParkedSession>,
    next_seq: u64,
}

/// Process-wide store of session identities. Construct one at startup and
/// share it through the application state.
pub struct SessionRegistry {
    inner: Mutex<Inner>,
    parked_capacity: usize,
}

impl Default for SessionRegistry {
    fn default() -> Self {
        Self::with_parked_capacity(DEFAULT_PARKED_CAPACITY)
    }
}

impl SessionRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// A registry that keeps at most `capacity` parked memories. Parking
    /// beyond that evicts the memory parked longest ago; zero disables parking.
    pub fn with_parked_capacity(capacity: usize) -> Self {
        Self {
            inner: Mutex::new(Inner::default()),
            parked_capacity: capacity,
        }
    }

    /// Issues a new session id that has never been issued or claimed before.
    ///
    /// Candidate generation and insertion happen under one lock, so
    /// concurrent callers can never receive the same id.
    pub async fn issue_session_id(&self) -> String {
        self.issue_with(|| Uuid::new_v4().to_string()).await
    }

    async fn issue_with(&self, mut candidate: impl FnMut() -> String) -> String {
        let mut inner = self.inner.lock().await;
        loop {
            let id = candidate();
            if inner.issued.insert(id.clone()) {
                info!(session_id = %id, "Issued session id");
                return id;
            }
            debug!(session_id = %id, "Candidate session id already issued, retrying");
        }
    }

    /// Records a client-supplied id so it is never issued to anyone else.
    pub async fn claim(&self, id: &str) {
        let mut inner = self.inner.lock().await;
        if inner.issued.insert(id.to_string()) {
            debug!(session_id = %id, "Claimed client-supplied session id");
        }
    }

    pub async fn is_issued(&self, id: &str) -> bool {
        self.inner.lock().await.issued.contains(id)
    }

    /// Stores the memory of a closed conversation under its session id,
    /// replacing anything parked there before.
    pub async fn park(&self, id: &str, character: &str, memory: Box<dyn ConversationMemory>) {
        if self.parked_capacity == 0 {
            return;
        }
        let mut inner = self.inner.lock().await;
        let seq = inner.next_seq;
        inner.next_seq += 1;
        inner.parked.insert(
            id.to_string(),
            ParkedSession {
                character: character.to_string(),
                memory,
                seq,
            },
        );
        debug!(session_id = %id, %character, "Parked conversation memory");

        while inner.parked.len() > self.parked_capacity {
            let Some(oldest) = inner
                .parked
                .iter()
                .min_by_key(|(_, parked)| parked.seq)
                .map(|(key, _)| key.clone())
            else {
                break;
            };
            inner.parked.remove(&oldest);
            info!(session_id = %oldest, "Evicted parked conversation memory");
        }
    }

    pub async fn parked_len(&self) -> usize {
        self.inner.lock().await.parked.len()
    }

    /// Takes the parked memory for `id` if it belongs to `character`.
    ///
    /// Memory parked for a different character stays parked.
    pub async fn resume(&self, id: &str, character: &str) -> Option<Box<dyn ConversationMemory>> {
        let mut inner = self.inner.lock().await;
        if inner.parked.get(id)?.character != character {
            return None;
        }
        let parked = inner.parked.remove(id)?;
        info!(session_id = %id, %character, "Resumed conversation memory");
        Some(parked.memory)
    }
}
