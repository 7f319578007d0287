//! Fixed lane packed slab storage.
//!
//! A slab hands out slots, each slot being one lane of one pack. Packs store every
//! attribute as a SIMD value, so batch algorithms can stride over the packs without
//! per-object branching. Destroyed slots leave holes that are reused first; once enough
//! holes accumulate, the slab compacts itself and reports a [`Rebase`].

use std::collections::TryReserveError;

use assert2::debug_assert;
use bon::bon;
use index_vec::IndexVec;
use itertools::Itertools as _;
use thiserror::Error;

use crate::geometry::LANES;

index_vec::define_index_type! {
    pub struct SlotIdx = u32;
}

index_vec::define_index_type! {
    pub struct PackIdx = u32;
}

impl SlotIdx {
    pub fn pack(self) -> PackIdx {
        PackIdx::from_usize(self.index() / LANES)
    }

    pub fn lane(self) -> usize {
        self.index() % LANES
    }
}

/// Pack of `LANES` slots, one SoA value per attribute.
pub trait LanePack: Default {
    /// Scalar content of a single slot.
    type Lane;

    fn read_lane(&self, lane: usize) -> Self::Lane;
    fn write_lane(&mut self, lane: usize, value: Self::Lane);

    /// Resets the lane so that batch algorithms never report it.
    fn clear_lane(&mut self, lane: usize);

    fn take_lane(&mut self, lane: usize) -> Self::Lane {
        let value = self.read_lane(lane);
        self.clear_lane(lane);
        value
    }
}

#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub struct SlotMove {
    pub from: SlotIdx,
    pub to: SlotIdx,
}

/// Relocation of a slab's storage. Every handle into the slab must be repointed
/// before it is used again.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Rebase {
    pub generation: u32,
    /// Sorted by `from`
    pub moved: Vec<SlotMove>,
}

impl Rebase {
    /// New location of a slot that was live before the rebase.
    pub fn relocate(&self, slot: SlotIdx) -> SlotIdx {
        self.moved
            .binary_search_by_key(&slot, |m| m.from)
            .map_or(slot, |i| self.moved[i].to)
    }
}

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum SlabError {
    #[error("Handle generation {handle} does not match slab generation {slab}")]
    StaleHandle { handle: u32, slab: u32 },

    #[error("Slot {0:?} does not hold a live element")]
    SlotNotLive(SlotIdx),

    #[error("Failed to grow slab storage: {0}")]
    AllocationFailed(#[from] TryReserveError),
}

#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub struct SlabConfig {
    /// Slots added on each growth, rounded up to a multiple of `LANES`.
    pub growth_increment: usize,
    /// Number of holes that triggers compaction.
    pub cleanup_threshold: usize,
}

#[bon]
impl SlabConfig {
    #[builder]
    pub fn new(
        #[builder(default = 100)] growth_increment: usize,
        #[builder(default = 100)] cleanup_threshold: usize,
    ) -> Self {
        SlabConfig {
            growth_increment: growth_increment.max(1).next_multiple_of(LANES),
            cleanup_threshold: cleanup_threshold.max(1),
        }
    }
}

impl Default for SlabConfig {
    fn default() -> Self {
        SlabConfig::builder().build()
    }
}

#[derive(Debug)]
pub struct ArraySlab<P> {
    packs: IndexVec<PackIdx, P>,
    live: Vec<bool>,
    holes: Vec<SlotIdx>,
    /// Slots at or above this index were never handed out since the last compaction.
    used_end: usize,
    generation: u32,
    config: SlabConfig,
}

impl<P: LanePack> ArraySlab<P> {
    pub fn new(config: SlabConfig) -> Result<Self, SlabError> {
        let mut slab = ArraySlab {
            packs: IndexVec::new(),
            live: Vec::new(),
            holes: Vec::new(),
            used_end: 0,
            generation: 0,
            config,
        };
        slab.grow()?;
        Ok(slab)
    }

    pub fn capacity(&self) -> usize {
        self.live.len()
    }

    pub fn live_count(&self) -> usize {
        self.used_end - self.holes.len()
    }

    /// Number of slots in use, holes included.
    pub fn used_slots(&self) -> usize {
        self.used_end
    }

    pub fn generation(&self) -> u32 {
        self.generation
    }

    /// Packs covering all used slots. Lanes past the used end and holes are cleared.
    pub fn used_packs(&self) -> &[P] {
        &self.packs.raw[..self.used_end.div_ceil(LANES)]
    }

    pub fn used_packs_mut(&mut self) -> &mut [P] {
        let count = self.used_end.div_ceil(LANES);
        &mut self.packs.raw[..count]
    }

    pub fn is_live(&self, slot: SlotIdx) -> bool {
        self.live.get(slot.index()).copied().unwrap_or(false)
    }

    pub fn live_slots(&self) -> impl Iterator<Item = SlotIdx> + '_ {
        (0..self.used_end)
            .map(SlotIdx::from_usize)
            .filter(|slot| self.live[slot.index()])
    }

    pub fn check(&self, slot: SlotIdx, generation: u32) -> Result<(), SlabError> {
        if generation != self.generation {
            Err(SlabError::StaleHandle {
                handle: generation,
                slab: self.generation,
            })
        } else if !self.is_live(slot) {
            Err(SlabError::SlotNotLive(slot))
        } else {
            Ok(())
        }
    }

    pub fn pack(&self, slot: SlotIdx) -> &P {
        &self.packs[slot.pack()]
    }

    pub fn pack_mut(&mut self, slot: SlotIdx) -> &mut P {
        &mut self.packs[slot.pack()]
    }

    pub fn read(&self, slot: SlotIdx) -> P::Lane {
        self.pack(slot).read_lane(slot.lane())
    }

    pub fn write(&mut self, slot: SlotIdx, value: P::Lane) {
        self.pack_mut(slot).write_lane(slot.lane(), value)
    }

    /// Hands out a slot, reusing the lowest hole first.
    /// Returns the rebase caused by growing the storage, if any.
    pub fn allocate(&mut self) -> Result<(SlotIdx, Option<Rebase>), SlabError> {
        if let Some(position) = self.holes.iter().position_min() {
            let slot = self.holes.swap_remove(position);
            self.live[slot.index()] = true;
            return Ok((slot, None));
        }

        let rebase = if self.used_end == self.capacity() {
            self.grow()?;
            Some(self.bump_generation(Vec::new()))
        } else {
            None
        };

        let slot = SlotIdx::from_usize(self.used_end);
        self.used_end += 1;
        self.live[slot.index()] = true;
        Ok((slot, rebase))
    }

    /// Releases a live slot. Returns the rebase caused by compaction, if any.
    pub fn free(&mut self, slot: SlotIdx) -> Result<Option<Rebase>, SlabError> {
        if !self.is_live(slot) {
            return Err(SlabError::SlotNotLive(slot));
        }

        self.pack_mut(slot).clear_lane(slot.lane());
        self.live[slot.index()] = false;

        if slot.index() + 1 == self.used_end {
            self.trim_used_end();
        } else {
            self.holes.push(slot);
        }

        if self.holes.len() >= self.config.cleanup_threshold {
            Ok(Some(self.compact()))
        } else {
            Ok(None)
        }
    }

    fn grow(&mut self) -> Result<(), SlabError> {
        let slots = self.config.growth_increment;
        let packs = slots / LANES;

        self.packs.raw.try_reserve_exact(packs)?;
        self.live.try_reserve_exact(slots)?;
        self.packs
            .raw
            .resize_with(self.packs.len() + packs, P::default);
        self.live.resize(self.live.len() + slots, false);

        log::debug!("Slab grown to {} slots", self.capacity());
        Ok(())
    }

    fn trim_used_end(&mut self) {
        while self.used_end > 0 && !self.live[self.used_end - 1] {
            self.used_end -= 1;
        }
        let used_end = self.used_end;
        self.holes.retain(|slot| slot.index() < used_end);
    }

    /// Moves tail slots into holes until the used slots are dense.
    fn compact(&mut self) -> Rebase {
        let holes = std::mem::take(&mut self.holes).into_iter().sorted_unstable();
        let mut moved = Vec::new();

        for hole in holes {
            self.trim_used_end();
            if hole.index() >= self.used_end {
                break;
            }

            let from = SlotIdx::from_usize(self.used_end - 1);
            debug_assert!(self.live[from.index()]);

            let value = self.pack_mut(from).take_lane(from.lane());
            self.pack_mut(hole).write_lane(hole.lane(), value);
            self.live[from.index()] = false;
            self.live[hole.index()] = true;
            self.used_end -= 1;

            moved.push(SlotMove { from, to: hole });
        }
        self.holes.clear();
        self.trim_used_end();

        moved.sort_unstable_by_key(|m| m.from);
        log::debug!(
            "Slab compacted, {} slots moved, {} live",
            moved.len(),
            self.live_count()
        );
        self.bump_generation(moved)
    }

    fn bump_generation(&mut self, moved: Vec<SlotMove>) -> Rebase {
        self.generation = self.generation.wrapping_add(1);
        Rebase {
            generation: self.generation,
            moved,
        }
    }
}
