//! Two-level sharded index of every commit object-id in the repository.
//!
//! See SPEC_FULL.md §3.3/§4.2. Built once from packed storage, refreshed
//! on access from loose objects only once `expiry` has passed. A single
//! `parking_lot::Mutex` guards both the shard map and the refresh bookkeeping,
//! so a refresh is serialized: a second caller arriving mid-refresh blocks on
//! the same lock and, once it acquires it, observes the now-fresh expiry and
//! returns without scanning again.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use std::time::{Duration, Instant};

use gix::ObjectId;
use parking_lot::Mutex;

use crate::error::VfmResult;
use crate::repo::GitSource;

/// Hard ceiling on how long a stale index is trusted before the next
/// accessor is forced to pay for a loose-object rescan.
const MAX_REFRESH_INTERVAL: Duration = Duration::from_secs(60);

/// How many multiples of the last scan's own duration to wait before the
/// next one — cheap scans get rescanned often, expensive ones back off.
const REFRESH_BACKOFF_FACTOR: u32 = 20;

type ShardMap = HashMap<String, HashMap<String, HashSet<String>>>;

struct State {
    shards: ShardMap,
    initialized: bool,
    expiry: Instant,
}

pub struct CommitIndex {
    repo: Arc<dyn GitSource>,
    state: Mutex<State>,
}

impl CommitIndex {
    pub fn new(repo: Arc<dyn GitSource>) -> Self {
        Self {
            repo,
            state: Mutex::new(State {
                shards: HashMap::new(),
                initialized: false,
                expiry: Instant::now(),
            }),
        }
    }

    /// Populate the index from packed storage. Runs exactly once per
    /// process; subsequent calls are a no-op lock-and-check.
    pub fn ensure_initialized(&self) -> VfmResult<()> {
        let mut state = self.state.lock();
        if state.initialized {
            return Ok(());
        }
        let start = Instant::now();
        let commits = self.repo.iter_packed_commits()?;
        for id in &commits {
            insert(&mut state.shards, id);
        }
        state.initialized = true;
        state.expiry = start + refresh_backoff(start.elapsed());
        tracing::info!(count = commits.len(), "commit index built from packed storage");
        Ok(())
    }

    /// Rescan loose objects if the last scan's expiry has passed. Additive:
    /// entries already present are never removed (GC'd commits stay visible
    /// until the process restarts — a documented limitation, see spec §3.3).
    pub fn refresh_if_stale(&self) -> VfmResult<()> {
        self.ensure_initialized()?;
        let mut state = self.state.lock();
        if Instant::now() < state.expiry {
            return Ok(());
        }

        let start = Instant::now();
        let loose_ids = match self.repo.iter_loose_object_ids() {
            Ok(ids) => ids,
            Err(err) => {
                // Open Question (b): downgrade rather than abort.
                tracing::warn!(error = %err, "loose object scan failed; keeping last-known commit index");
                state.expiry = start + refresh_backoff(start.elapsed());
                return Ok(());
            }
        };

        let mut inserted = 0usize;
        for id in &loose_ids {
            if let Ok(commit) = self.repo.get_commit(id) {
                insert(&mut state.shards, &commit.id);
                inserted += 1;
            }
        }
        state.expiry = Instant::now() + refresh_backoff(start.elapsed());
        tracing::debug!(scanned = loose_ids.len(), commits = inserted, "commit index refreshed from loose objects");
        Ok(())
    }

    /// Distinct 2-hex shard prefixes present.
    pub fn shards1(&self) -> VfmResult<HashSet<String>> {
        self.refresh_if_stale()?;
        let state = self.state.lock();
        Ok(state.shards.keys().cloned().collect())
    }

    /// Distinct 4-hex shard prefixes within a 2-hex prefix.
    pub fn shards2(&self, prefix1: &str) -> VfmResult<HashSet<String>> {
        self.refresh_if_stale()?;
        let state = self.state.lock();
        Ok(state
            .shards
            .get(prefix1)
            .map(|shard2| shard2.keys().cloned().collect())
            .unwrap_or_default())
    }

    /// Full commit ids within a 4-hex prefix.
    pub fn ids(&self, prefix2: &str) -> VfmResult<HashSet<String>> {
        self.refresh_if_stale()?;
        if prefix2.len() < 2 {
            return Ok(HashSet::new());
        }
        let state = self.state.lock();
        Ok(state
            .shards
            .get(&prefix2[..2])
            .and_then(|shard2| shard2.get(prefix2))
            .cloned()
            .unwrap_or_default())
    }

    pub fn contains(&self, full_id: &str) -> VfmResult<bool> {
        self.refresh_if_stale()?;
        if full_id.len() < 4 {
            return Ok(false);
        }
        let state = self.state.lock();
        Ok(state
            .shards
            .get(&full_id[..2])
            .and_then(|shard2| shard2.get(&full_id[..4]))
            .map(|ids| ids.contains(full_id))
            .unwrap_or(false))
    }
}

fn insert(shards: &mut ShardMap, id: &ObjectId) {
    let hex = id.to_string();
    let prefix1 = hex[..2].to_string();
    let prefix2 = hex[..4].to_string();
    shards
        .entry(prefix1)
        .or_default()
        .entry(prefix2)
        .or_default()
        .insert(hex);
}

fn refresh_backoff(elapsed: Duration) -> Duration {
    elapsed
        .saturating_mul(REFRESH_BACKOFF_FACTOR)
        .min(MAX_REFRESH_INTERVAL)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn oid(hex: &str) -> ObjectId {
        ObjectId::from_hex(hex.as_bytes()).unwrap()
    }

    #[test]
    fn insert_and_query_shards() {
        let mut shards = ShardMap::new();
        insert(&mut shards, &oid("da39a3ee5e6b4b0d3255bfef95601890afd80709"));
        insert(&mut shards, &oid("da39cafe5e6b4b0d3255bfef95601890afd80709"));
        insert(&mut shards, &oid("0123456789abcdef0123456789abcdef01234567"));

        assert_eq!(shards.len(), 2);
        assert_eq!(shards["da"].len(), 2);
        assert!(shards["da"]["da39"].contains("da39a3ee5e6b4b0d3255bfef95601890afd80709"));
        assert!(shards["da"]["da39"].contains("da39cafe5e6b4b0d3255bfef95601890afd80709"));
    }

    #[test]
    fn refresh_backoff_clamps_to_sixty_seconds() {
        assert_eq!(
            refresh_backoff(Duration::from_secs(10)),
            Duration::from_secs(60)
        );
        assert_eq!(
            refresh_backoff(Duration::from_millis(100)),
            Duration::from_secs(2)
        );
    }
}
