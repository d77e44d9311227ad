// 🗂️ Scratch Store - state held between upload and finalize
//
// An upload that needs manual name matching parks its assembled report here
// under a random token. Finalize takes it back out (removing it); entries
// that are never finalized expire after the configured TTL.
//
// Single writer. The server wraps the store in `Arc<Mutex<_>>`.

use crate::error::{FundingError, Result};
use chrono::{DateTime, Duration, Utc};
use std::collections::HashMap;
use tracing::debug;
use uuid::Uuid;

pub trait ScratchStore<T> {
    /// Park a value and return the token that retrieves it
    fn put(&mut self, value: T, now: DateTime<Utc>) -> Uuid;

    /// Remove and return a live entry
    fn take(&mut self, token: &Uuid, now: DateTime<Utc>) -> Result<T>;

    /// Drop every expired entry; returns how many were removed
    fn purge_expired(&mut self, now: DateTime<Utc>) -> usize;
}

#[derive(Debug)]
struct ScratchEntry<T> {
    value: T,
    expires_at: DateTime<Utc>,
}

#[derive(Debug)]
pub struct InMemoryScratchStore<T> {
    entries: HashMap<Uuid, ScratchEntry<T>>,
    ttl: Duration,
}

impl<T> InMemoryScratchStore<T> {
    pub fn new(ttl: Duration) -> Self {
        InMemoryScratchStore {
            entries: HashMap::new(),
            ttl,
        }
    }

    pub fn ttl(&self) -> Duration {
        self.ttl
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl<T> ScratchStore<T> for InMemoryScratchStore<T> {
    fn put(&mut self, value: T, now: DateTime<Utc>) -> Uuid {
        self.purge_expired(now);

        let token = Uuid::new_v4();
        self.entries.insert(
            token,
            ScratchEntry {
                value,
                expires_at: now + self.ttl,
            },
        );
        debug!(%token, "scratch state stored");
        token
    }

    fn take(&mut self, token: &Uuid, now: DateTime<Utc>) -> Result<T> {
        match self.entries.remove(token) {
            Some(entry) if entry.expires_at > now => Ok(entry.value),
            _ => Err(FundingError::SessionNotFound(token.to_string())),
        }
    }

    fn purge_expired(&mut self, now: DateTime<Utc>) -> usize {
        let before = self.entries.len();
        self.entries.retain(|_, entry| entry.expires_at > now);
        before - self.entries.len()
    }
}
