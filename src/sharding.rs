//! Record-to-shard routing.
//!
//! A record lives in exactly one of `groups × slots_per_group` partitions. The owner is
//! recomputed from the id on every access: CRC-32 (IEEE, zlib-compatible) over the
//! little-endian bytes of the id, reduced modulo the total partition count, then split
//! into a group index and a slot index.
//!
//! The mapping depends on the layout. Changing either dimension moves almost every
//! record to a different partition and nothing here migrates existing rows, so a
//! layout must stay fixed for the lifetime of the data it routes.

use crate::error::{Result, SyncError};
use crate::model::{record_range, RecordId, ShardCoordinate};

/// Partition topology: `groups` databases, each holding `slots_per_group` tables.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ShardLayout {
    groups: u32,
    slots_per_group: u32,
}

impl ShardLayout {
    /// Validate and build a layout.
    ///
    /// Both dimensions must be non-zero and their product must fit in a `u32`.
    pub fn new(groups: u32, slots_per_group: u32) -> Result<Self> {
        if groups == 0 || slots_per_group == 0 {
            return Err(SyncError::Layout(format!(
                "groups and slots_per_group must be non-zero (got {groups}x{slots_per_group})"
            )));
        }
        if groups.checked_mul(slots_per_group).is_none() {
            return Err(SyncError::Layout(format!(
                "{groups}x{slots_per_group} partitions overflow the shard index"
            )));
        }
        Ok(Self {
            groups,
            slots_per_group,
        })
    }

    pub fn groups(&self) -> u32 {
        self.groups
    }

    pub fn slots_per_group(&self) -> u32 {
        self.slots_per_group
    }

    pub fn total_shards(&self) -> u32 {
        self.groups * self.slots_per_group
    }

    /// Owner of `id` under this layout. See [`route`].
    pub fn route(&self, id: RecordId) -> ShardCoordinate {
        route(id, self)
    }

    /// Every partition, group-major.
    pub fn coordinates(&self) -> impl Iterator<Item = ShardCoordinate> + '_ {
        (0..self.groups).flat_map(move |group| {
            (0..self.slots_per_group).map(move |slot| ShardCoordinate::new(group, slot))
        })
    }
}

impl ShardCoordinate {
    /// Position of this coordinate in group-major order, `0..layout.total_shards()`.
    pub fn flat_index(&self, layout: &ShardLayout) -> u32 {
        self.group * layout.slots_per_group + self.slot
    }
}

/// CRC-32 of the id's little-endian byte representation.
pub fn record_hash(id: RecordId) -> u32 {
    crc32fast::hash(&id.to_le_bytes())
}

/// Compute which partition owns `id`.
///
/// Total over every `i64`: the result always satisfies `group < layout.groups()` and
/// `slot < layout.slots_per_group()`. Identical inputs give identical outputs across
/// processes and platforms because the byte order fed to the hash is fixed.
pub fn route(id: RecordId, layout: &ShardLayout) -> ShardCoordinate {
    let shard_index = record_hash(id) % layout.total_shards();
    ShardCoordinate {
        group: shard_index / layout.slots_per_group,
        slot: shard_index % layout.slots_per_group,
    }
}

/// Per-shard record counts for the sequential range `start..start + count`,
/// indexed by [`ShardCoordinate::flat_index`]. The range is cut short at `i64::MAX`.
pub fn shard_histogram(layout: &ShardLayout, start: RecordId, count: u64) -> Vec<u64> {
    let mut counts = vec![0u64; layout.total_shards() as usize];
    for id in record_range(start, count) {
        let coordinate = route(id, layout);
        counts[coordinate.flat_index(layout) as usize] += 1;
    }
    counts
}
