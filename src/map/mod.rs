//! The key/value store: two [`HashTable`]s plus a migration cursor,
//! implementing progressive (incremental) rehashing.
//!
//! Every live key lives in exactly one of `current` or `legacy`. When
//! `legacy` is empty, `current` alone serves all operations. Once a rehash
//! is triggered, `legacy` holds the old table and `current` a fresh, larger
//! one; each subsequent operation moves at most [`MIGRATION_WORK`] entries
//! from `legacy` into `current`, bounding worst-case per-operation latency.
//! The next rehash cannot begin until the current one finishes, because the
//! trigger is gated on `legacy` being empty.

mod table;

pub use table::{fnv1a, HashEntry, HashTable};

/// Initial (and minimum) bucket count for a freshly created table.
pub const START_BUCKETS: usize = 8;

/// Average entries per bucket that triggers a rehash.
pub const MAX_LOAD_FACTOR: usize = 8;

/// Entries migrated per triggering operation.
pub const MIGRATION_WORK: usize = 128;

/// Upper bound on bucket count a table is allowed to grow to. Doubling past
/// this is skipped; operations continue against the existing table.
const MAX_BUCKETS: usize = 1 << 31;

/// The process-wide key/value map.
#[derive(Debug)]
pub struct Map {
    current: HashTable,
    legacy: HashTable,
    migration_cursor: usize,
}

impl Default for Map {
    fn default() -> Self {
        Self::new()
    }
}

impl Map {
    pub fn new() -> Self {
        Map {
            current: HashTable::with_buckets(START_BUCKETS),
            legacy: HashTable::with_buckets(START_BUCKETS),
            migration_cursor: 0,
        }
    }

    /// Inserts or overwrites `key` with `value`. An existing entry is found
    /// by checking `legacy` (if a rehash is in progress) before `current` --
    /// the same order [`Map::get`] uses -- so an in-flight key is updated in
    /// place rather than shadowed by a duplicate insert into `current`. A
    /// genuinely new key always lands in `current`, the table migrations are
    /// draining into.
    pub fn put(&mut self, key: &[u8], value: &[u8]) {
        let hash = fnv1a(key);

        if !self.legacy.is_empty() {
            if let Some(slot) = self.legacy.get_mut(key, hash) {
                *slot = value.to_vec();
                self.migrate_step();
                return;
            }
        }

        if let Some(slot) = self.current.get_mut(key, hash) {
            *slot = value.to_vec();
        } else {
            self.current.insert_new(key.to_vec(), value.to_vec(), hash);
            if self.legacy.is_empty()
                && self.current.len() >= self.current.bucket_count() * MAX_LOAD_FACTOR
            {
                self.trigger_rehash();
            }
        }

        self.migrate_step();
    }

    /// Looks up `key`. Consults `legacy` first (if non-empty); on a miss
    /// there, runs one migration step (so lookups make progress too) before
    /// consulting `current`.
    pub fn get(&mut self, key: &[u8]) -> Option<&[u8]> {
        let hash = fnv1a(key);

        if !self.legacy.is_empty() {
            if let Some(value) = self.legacy.get(key, hash) {
                return Some(value);
            }
        }

        self.migrate_step();
        self.current.get(key, hash)
    }

    /// Removes `key`, if present, from either table. `current` is checked
    /// first since it's the common case once a rehash has progressed, but
    /// `legacy` is also checked -- required so a key inserted just before a
    /// rehash started, and not yet migrated, can still be removed in the
    /// same operation that would otherwise miss it.
    pub fn remove(&mut self, key: &[u8]) -> Option<(Vec<u8>, Vec<u8>)> {
        let hash = fnv1a(key);

        let removed = self.current.remove(key, hash).or_else(|| {
            if self.legacy.is_empty() {
                None
            } else {
                self.legacy.remove(key, hash)
            }
        });

        self.migrate_step();
        removed
    }

    /// Total number of live entries across both tables.
    pub fn size(&self) -> usize {
        self.current.len() + self.legacy.len()
    }

    /// Iterates every (key, value) pair exactly once, `legacy` first then
    /// `current`. The map must not be mutated while an iterator is alive.
    pub fn iter(&self) -> impl Iterator<Item = (&[u8], &[u8])> {
        self.legacy.iter().chain(self.current.iter())
    }

    /// Whether a rehash is currently in progress.
    pub fn is_rehashing(&self) -> bool {
        !self.legacy.is_empty()
    }

    /// `current`'s live entries divided by its bucket count. Observability
    /// only; doesn't affect any operation's behavior.
    pub fn load_factor(&self) -> f64 {
        self.current.len() as f64 / self.current.bucket_count() as f64
    }

    fn trigger_rehash(&mut self) {
        let Some(new_bucket_count) = self.current.bucket_count().checked_mul(2) else {
            log::warn!("rehash skipped: bucket count would overflow");
            return;
        };
        if new_bucket_count > MAX_BUCKETS {
            log::warn!(
                "rehash skipped: {} buckets would exceed the {} limit",
                new_bucket_count,
                MAX_BUCKETS
            );
            return;
        }

        let old_current = std::mem::replace(&mut self.current, HashTable::with_buckets(new_bucket_count));
        log::debug!(
            "rehash started: {} -> {} buckets ({} live entries)",
            old_current.bucket_count(),
            new_bucket_count,
            old_current.len()
        );
        self.legacy = old_current;
        self.migration_cursor = 0;
    }

    fn migrate_step(&mut self) {
        if self.legacy.is_empty() {
            return;
        }

        for _ in 0..MIGRATION_WORK {
            match self.legacy.take_one_from_cursor(&mut self.migration_cursor) {
                Some(entry) => self.current.insert_entry(entry),
                None => break,
            }
        }

        if self.legacy.is_empty() {
            log::debug!(
                "rehash completed: current now has {} buckets",
                self.current.bucket_count()
            );
            self.legacy = HashTable::with_buckets(START_BUCKETS);
            self.migration_cursor = 0;
        }
    }
}
