//! Live allocation registry.
//!
//! Maps each currently-live address to the id of the allocation it denotes,
//! and keeps the last known size of every live id so `realloc` deltas can be
//! computed. Ids are handed out densely from zero and never reused.

use std::collections::{HashMap, HashSet};
use std::fmt;

use serde::{Deserialize, Serialize};

/// Stable identifier substituted for a raw address.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct AllocationId(pub u64);

impl fmt::Display for AllocationId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Result of moving an entry during `realloc`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Relocation {
    pub id: AllocationId,
    /// Size recorded for `id` before this realloc (0 if unknown).
    pub prior_size: u64,
    /// Live id previously registered under the new address, now unreachable.
    pub displaced: Option<AllocationId>,
}

/// Address → allocation id table with a parallel id → size table.
#[derive(Debug, Default)]
pub struct AllocationRegistry {
    live: HashMap<String, AllocationId>,
    sizes: HashMap<AllocationId, u64>,
    /// Addresses whose last event was a free, used to tell a double free
    /// apart from a free of something never seen.
    recently_freed: HashSet<String>,
    next_id: u64,
}

impl AllocationRegistry {
    /// Create an empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a fresh allocation at `address`.
    ///
    /// Returns the new id and, if `address` was still live, the id that was
    /// silently displaced.
    pub fn register(&mut self, address: &str, size: u64) -> (AllocationId, Option<AllocationId>) {
        let id = AllocationId(self.next_id);
        self.next_id += 1;

        let displaced = self.live.insert(address.to_owned(), id);
        if let Some(stale) = displaced {
            self.sizes.remove(&stale);
        }
        self.sizes.insert(id, size);
        self.recently_freed.remove(address);
        (id, displaced)
    }

    /// Id currently registered under `address`.
    #[must_use]
    pub fn lookup(&self, address: &str) -> Option<AllocationId> {
        self.live.get(address).copied()
    }

    /// Drop the entry for `address`, returning its id and last known size.
    pub fn release(&mut self, address: &str) -> Option<(AllocationId, u64)> {
        let id = self.live.remove(address)?;
        let size = self.sizes.remove(&id).unwrap_or(0);
        self.recently_freed.insert(address.to_owned());
        Some((id, size))
    }

    /// Move the allocation at `old_address` to `new_address` with a new size.
    ///
    /// Returns `None` (and changes nothing) when `old_address` is not live.
    pub fn relocate(
        &mut self,
        old_address: &str,
        new_address: &str,
        new_size: u64,
    ) -> Option<Relocation> {
        let id = self.lookup(old_address)?;
        let prior_size = self.sizes.insert(id, new_size).unwrap_or(0);

        let mut displaced = None;
        if new_address != old_address {
            self.live.remove(old_address);
            displaced = self.live.insert(new_address.to_owned(), id);
            if let Some(stale) = displaced {
                self.sizes.remove(&stale);
            }
            self.recently_freed.remove(new_address);
        }

        Some(Relocation {
            id,
            prior_size,
            displaced,
        })
    }

    /// Last known size of a live id; freed or unknown ids read as zero.
    #[must_use]
    pub fn size_of(&self, id: AllocationId) -> u64 {
        self.sizes.get(&id).copied().unwrap_or(0)
    }

    /// Whether the last event seen for `address` was a free.
    #[must_use]
    pub fn was_freed(&self, address: &str) -> bool {
        self.recently_freed.contains(address)
    }

    /// Number of outstanding allocations.
    #[must_use]
    pub fn live_count(&self) -> usize {
        self.live.len()
    }

    /// Number of ids handed out so far.
    #[must_use]
    pub fn ids_issued(&self) -> u64 {
        self.next_id
    }
}
