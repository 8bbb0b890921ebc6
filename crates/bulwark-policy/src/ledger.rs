//! Persistent record of used token ids.
//!
//! Backed by a Sled tree so single-use holds across concurrent executors
//! sharing one engine and across process restarts.
//!
//! | Tree | Key | Value |
//! |------|-----|-------|
//! | `used_tokens` | token id | expiry, big-endian unix millis |
//!
//! Insertion is a compare-and-swap against an absent key: exactly one
//! caller can ever mark a given id. Durable ledgers flush each successful
//! mark before reporting it, so a consumed token stays consumed after a
//! crash.

use std::path::Path;

use chrono::{DateTime, Utc};
use tracing::debug;

use crate::error::Result;

const USED_TREE: &str = "used_tokens";

/// Used-token ledger.
#[derive(Clone)]
pub struct TokenLedger {
    db: sled::Db,
    used: sled::Tree,
    durable: bool,
}

impl std::fmt::Debug for TokenLedger {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TokenLedger")
            .field("entries", &self.used.len())
            .finish()
    }
}

impl TokenLedger {
    /// Opens or creates a durable ledger at `path`.
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self> {
        let db = sled::open(path)?;
        let used = db.open_tree(USED_TREE)?;
        Ok(Self {
            db,
            used,
            durable: true,
        })
    }

    /// In-memory ledger, lost on drop.
    pub fn temporary() -> Result<Self> {
        let db = sled::Config::new().temporary(true).open()?;
        let used = db.open_tree(USED_TREE)?;
        Ok(Self {
            db,
            used,
            durable: false,
        })
    }

    /// Records `token_id` as used.
    ///
    /// Returns `true` for the first call with a given id and `false` for
    /// every later one. On a durable ledger `true` is only returned once
    /// the mark is on disk.
    pub fn mark_used(&self, token_id: &str, expires_at: DateTime<Utc>) -> Result<bool> {
        let value = expires_at.timestamp_millis().to_be_bytes();
        let swapped = self
            .used
            .compare_and_swap(token_id.as_bytes(), None as Option<&[u8]>, Some(&value[..]))?;
        let first = swapped.is_ok();
        if first && self.durable {
            self.db.flush()?;
        }
        debug!(token_id = %token_id, first, "token ledger mark");
        Ok(first)
    }

    pub fn is_used(&self, token_id: &str) -> Result<bool> {
        Ok(self.used.contains_key(token_id.as_bytes())?)
    }

    /// Drops entries whose token expired before `now`. Expired tokens fail
    /// verification on their own, so forgetting them is safe.
    pub fn purge_expired(&self, now: DateTime<Utc>) -> Result<usize> {
        let cutoff = now.timestamp_millis();
        let mut purged = 0;
        for entry in self.used.iter() {
            let (key, value) = entry?;
            let expired = <[u8; 8]>::try_from(value.as_ref())
                .map(i64::from_be_bytes)
                .map_or(true, |expires| expires < cutoff);
            if expired {
                self.used.remove(key)?;
                purged += 1;
            }
        }
        if purged > 0 {
            debug!(purged, "purged expired token ids");
        }
        Ok(purged)
    }

    /// Whether marks survive a restart.
    pub fn is_durable(&self) -> bool {
        self.durable
    }

    pub fn len(&self) -> usize {
        self.used.len()
    }

    pub fn is_empty(&self) -> bool {
        self.used.is_empty()
    }

    /// Flushes pending writes to disk.
    pub fn flush(&self) -> Result<()> {
        self.db.flush()?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;
    use std::sync::Arc;
    use std::thread;

    #[test]
    fn test_mark_is_single_fire() {
        let ledger = TokenLedger::temporary().unwrap();
        let expiry = Utc::now() + Duration::seconds(60);
        assert!(!ledger.is_used("t-1").unwrap());
        assert!(ledger.mark_used("t-1", expiry).unwrap());
        assert!(!ledger.mark_used("t-1", expiry).unwrap());
        assert!(ledger.is_used("t-1").unwrap());
        assert_eq!(ledger.len(), 1);
    }

    #[test]
    fn test_concurrent_marks_admit_one() {
        let ledger = Arc::new(TokenLedger::temporary().unwrap());
        let expiry = Utc::now() + Duration::seconds(60);
        let handles: Vec<_> = (0..16)
            .map(|_| {
                let ledger = ledger.clone();
                thread::spawn(move || ledger.mark_used("shared", expiry).unwrap())
            })
            .collect();
        let wins = handles
            .into_iter()
            .map(|h| h.join().unwrap())
            .filter(|won| *won)
            .count();
        assert_eq!(wins, 1);
    }

    #[test]
    fn test_purge_expired() {
        let ledger = TokenLedger::temporary().unwrap();
        let now = Utc::now();
        ledger.mark_used("old", now - Duration::seconds(5)).unwrap();
        ledger.mark_used("live", now + Duration::seconds(60)).unwrap();

        assert_eq!(ledger.purge_expired(now).unwrap(), 1);
        assert!(!ledger.is_used("old").unwrap());
        assert!(ledger.is_used("live").unwrap());
    }

    #[test]
    fn test_survives_reopen() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("ledger");
        {
            let ledger = TokenLedger::open(&path).unwrap();
            ledger.mark_used("t-9", Utc::now() + Duration::seconds(60)).unwrap();
            ledger.flush().unwrap();
        }
        let ledger = TokenLedger::open(&path).unwrap();
        assert!(ledger.is_used("t-9").unwrap());
    }

    #[test]
    fn test_mark_is_on_disk_before_it_is_reported() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("ledger");
        {
            let ledger = TokenLedger::open(&path).unwrap();
            assert!(ledger.is_durable());
            assert!(ledger.mark_used("t-10", Utc::now() + Duration::seconds(60)).unwrap());
        }
        let ledger = TokenLedger::open(&path).unwrap();
        assert!(ledger.is_used("t-10").unwrap());
        assert!(!ledger.mark_used("t-10", Utc::now() + Duration::seconds(60)).unwrap());
        assert!(!TokenLedger::temporary().unwrap().is_durable());
    }
}
