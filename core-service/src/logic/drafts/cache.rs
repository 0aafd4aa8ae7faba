//! Local Persistence Cache
//!
//! Durable side channel keyed by (session, field), independent of the network.
//! Every edit is mirrored with `synced: false`; a confirmed save flips the flag.
//! On load an unexpired entry that is unsynced or very recent beats the server
//! copy, so edits made just before a reload survive it.

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use std::borrow::Cow;
use std::sync::Arc;

use super::store::{KvStore, StoreError};
use super::types::DraftContent;
use crate::logic::clock::Clock;
use crate::logic::config::CacheConfig;

/// Stored value: `{textA, textB, timestamp, version, synced}`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CachedDraft {
    pub text_a: String,
    pub text_b: String,
    /// Milliseconds since epoch of the write
    pub timestamp: i64,
    pub version: u64,
    pub synced: bool,
}

impl CachedDraft {
    pub fn content(&self) -> DraftContent {
        DraftContent::new(self.text_a.clone(), self.text_b.clone())
    }

    pub fn written_at(&self) -> Option<DateTime<Utc>> {
        DateTime::from_timestamp_millis(self.timestamp)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HydrationSource {
    Local,
    Server,
    Empty,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Hydration {
    pub content: DraftContent,
    pub source: HydrationSource,
    /// Cache entry that won, if any
    pub cached: Option<CachedDraft>,
}

#[derive(Clone)]
pub struct LocalPersistenceCache {
    store: Arc<dyn KvStore>,
    clock: Arc<dyn Clock>,
    prefix: String,
    ttl: Duration,
    recent: Duration,
}

fn escape_session(session: &str) -> Cow<'_, str> {
    if session.contains(|c: char| c == '_' || c == '%') {
        Cow::Owned(session.replace('%', "%25").replace('_', "%5F"))
    } else {
        Cow::Borrowed(session)
    }
}

impl LocalPersistenceCache {
    pub fn new(store: Arc<dyn KvStore>, clock: Arc<dyn Clock>, config: &CacheConfig) -> Self {
        Self {
            store,
            clock,
            prefix: config.key_prefix.clone(),
            ttl: Duration::hours(config.ttl_hours),
            recent: Duration::seconds(config.recent_secs),
        }
    }

    pub fn key(&self, session: &str, field_id: &str) -> String {
        format!("{}{}", self.session_prefix(session), field_id)
    }

    /// The first `_` after the prefix ends the session segment, so a token
    /// carrying `_` is escaped; plain tokens are written as-is
    fn session_prefix(&self, session: &str) -> String {
        format!("{}{}_", self.prefix, escape_session(session))
    }

    fn is_expired(&self, entry: &CachedDraft, now: DateTime<Utc>) -> bool {
        now.timestamp_millis() - entry.timestamp > self.ttl.num_milliseconds()
    }

    /// Read a key, purging expired or unreadable entries
    fn read_key(&self, key: &str) -> Result<Option<CachedDraft>, StoreError> {
        let Some(raw) = self.store.get(key)? else {
            return Ok(None);
        };

        let entry: CachedDraft = match serde_json::from_str(&raw) {
            Ok(entry) => entry,
            Err(e) => {
                log::warn!("Discarding unreadable cache entry {}: {}", key, e);
                self.store.delete(key)?;
                return Ok(None);
            }
        };

        if self.is_expired(&entry, self.clock.now()) {
            log::debug!("Purging expired cache entry {}", key);
            self.store.delete(key)?;
            return Ok(None);
        }

        Ok(Some(entry))
    }

    fn write_key(&self, key: &str, entry: &CachedDraft) -> Result<(), StoreError> {
        let raw = serde_json::to_string(entry)?;
        self.store.set(key, &raw)
    }

    /// Mirror an edit as unsynced, stamped now
    pub fn store(&self, session: &str, field_id: &str, content: &DraftContent, version: u64) -> Result<bool, StoreError> {
        self.store_at(session, field_id, content, version, self.clock.now())
    }

    /// Last-writer-wins: an older write never replaces a newer one.
    /// Returns whether the write was applied.
    pub fn store_at(
        &self,
        session: &str,
        field_id: &str,
        content: &DraftContent,
        version: u64,
        at: DateTime<Utc>,
    ) -> Result<bool, StoreError> {
        let key = self.key(session, field_id);
        let timestamp = at.timestamp_millis();

        if let Some(existing) = self.read_key(&key)? {
            if existing.timestamp > timestamp {
                log::debug!("Stale cache write for {} ignored", key);
                return Ok(false);
            }
        }

        self.write_key(
            &key,
            &CachedDraft {
                text_a: content.text_a.clone(),
                text_b: content.text_b.clone(),
                timestamp,
                version,
                synced: false,
            },
        )?;
        Ok(true)
    }

    pub fn load(&self, session: &str, field_id: &str) -> Result<Option<CachedDraft>, StoreError> {
        self.read_key(&self.key(session, field_id))
    }

    /// Flip to synced, but only if the cached text is what the server confirmed
    pub fn mark_synced(
        &self,
        session: &str,
        field_id: &str,
        confirmed: &DraftContent,
        version: u64,
    ) -> Result<bool, StoreError> {
        let key = self.key(session, field_id);
        let Some(mut entry) = self.read_key(&key)? else {
            return Ok(false);
        };

        if entry.content() != *confirmed {
            return Ok(false);
        }

        entry.synced = true;
        entry.version = entry.version.max(version);
        self.write_key(&key, &entry)?;
        Ok(true)
    }

    pub fn remove(&self, session: &str, field_id: &str) -> Result<(), StoreError> {
        self.store.delete(&self.key(session, field_id))
    }

    /// Every live entry of a session as (field_id, entry)
    pub fn entries(&self, session: &str) -> Result<Vec<(String, CachedDraft)>, StoreError> {
        let prefix = self.session_prefix(session);
        let mut out = Vec::new();
        for key in self.store.keys_with_prefix(&prefix)? {
            if let Some(entry) = self.read_key(&key)? {
                out.push((key[prefix.len()..].to_string(), entry));
            }
        }
        Ok(out)
    }

    /// Bulk recovery sweep
    pub fn unsynced(&self, session: &str) -> Result<Vec<(String, CachedDraft)>, StoreError> {
        Ok(self
            .entries(session)?
            .into_iter()
            .filter(|(_, entry)| !entry.synced)
            .collect())
    }

    /// Post-recovery bookkeeping; returns how many entries flipped
    pub fn mark_all_synced(&self, session: &str) -> Result<usize, StoreError> {
        let prefix = self.session_prefix(session);
        let mut flipped = 0;
        for (field_id, mut entry) in self.unsynced(session)? {
            entry.synced = true;
            self.write_key(&format!("{}{}", prefix, field_id), &entry)?;
            flipped += 1;
        }
        Ok(flipped)
    }

    /// Sweep expired entries across every session
    pub fn purge_expired(&self) -> Result<usize, StoreError> {
        let mut purged = 0;
        for key in self.store.keys_with_prefix(&self.prefix)? {
            let present = self.store.get(&key)?.is_some();
            if present && self.read_key(&key)?.is_none() {
                purged += 1;
            }
        }
        if purged > 0 {
            log::info!("Purged {} expired draft cache entries", purged);
        }
        Ok(purged)
    }

    /// Pick the hydration source for a field
    pub fn resolve(
        &self,
        session: &str,
        field_id: &str,
        server: Option<&DraftContent>,
    ) -> Result<Hydration, StoreError> {
        let cached = self.load(session, field_id)?;
        let now = self.clock.now();

        if let Some(entry) = cached {
            let recent = now.timestamp_millis() - entry.timestamp < self.recent.num_milliseconds();
            if !entry.synced || recent || server.is_none() {
                return Ok(Hydration {
                    content: entry.content(),
                    source: HydrationSource::Local,
                    cached: Some(entry),
                });
            }
        }

        Ok(match server {
            Some(content) => Hydration {
                content: content.clone(),
                source: HydrationSource::Server,
                cached: None,
            },
            None => Hydration {
                content: DraftContent::default(),
                source: HydrationSource::Empty,
                cached: None,
            },
        })
    }
}
