//! Fixed-block slot pool for the RT path
//!
//! All storage is allocated once in [`BlockPool::new`]. After that, `alloc` and
//! `free` only flip bits in the availability mask: no allocation, no syscall,
//! no lock. Callers provide their own synchronization (the bridge keeps the
//! pool behind the same lock as the scheduling heap).
//!
//! Slots are addressed by [`SlotId`], an index into the backing array, so the
//! handle-to-slot mapping and its inverse are plain array indexing.

use std::fmt;

/// Slots tracked per mask word
const WORD_BITS: usize = 32;

/// Handle to an allocated slot
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct SlotId(u32);

impl SlotId {
    pub fn index(self) -> usize {
        self.0 as usize
    }
}

/// Error type for pool construction
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum PoolError {
    #[error("Pool capacity must be non-zero")]
    ZeroCapacity,

    #[error("Pool slot size must be non-zero")]
    ZeroSlotSize,

    #[error("Failed to allocate backing storage for {0} slots")]
    AllocFailed(usize),
}

/// Fixed-capacity slot allocator
///
/// Capacity is rounded up to a multiple of 32 and the slot size (the size of
/// `T`) is rounded up to the next power of two. A set bit in the mask means the
/// slot is free.
pub struct BlockPool<T> {
    slots: Box<[T]>,
    mask: Box<[u32]>,
    slot_size: usize,
}

impl<T: Default> BlockPool<T> {
    /// Create a pool with at least `capacity` slots, all free
    pub fn new(capacity: usize) -> Result<Self, PoolError> {
        if capacity == 0 {
            return Err(PoolError::ZeroCapacity);
        }
        let item_size = std::mem::size_of::<T>();
        if item_size == 0 {
            return Err(PoolError::ZeroSlotSize);
        }

        let capacity = capacity
            .checked_add(WORD_BITS - 1)
            .map(|c| c & !(WORD_BITS - 1))
            .ok_or(PoolError::AllocFailed(capacity))?;
        // Every slot index has to fit in a SlotId
        if capacity as u64 > u64::from(u32::MAX) + 1 {
            return Err(PoolError::AllocFailed(capacity));
        }

        let mut slots = Vec::new();
        slots
            .try_reserve_exact(capacity)
            .map_err(|_| PoolError::AllocFailed(capacity))?;
        slots.resize_with(capacity, T::default);

        let mut mask = Vec::new();
        mask.try_reserve_exact(capacity / WORD_BITS)
            .map_err(|_| PoolError::AllocFailed(capacity))?;
        mask.resize(capacity / WORD_BITS, u32::MAX);

        Ok(Self {
            slots: slots.into_boxed_slice(),
            mask: mask.into_boxed_slice(),
            slot_size: item_size.next_power_of_two(),
        })
    }
}

impl<T> BlockPool<T> {
    /// Claim the lowest-index free slot
    ///
    /// Returns `None` when every slot is in use.
    pub fn alloc(&mut self) -> Option<SlotId> {
        for (word_idx, word) in self.mask.iter_mut().enumerate() {
            if *word != 0 {
                let bit = word.trailing_zeros();
                *word &= !(1u32 << bit);
                return Some(SlotId((word_idx * WORD_BITS) as u32 + bit));
            }
        }
        None
    }

    /// Return a slot to the pool
    ///
    /// The slot must have come from `alloc` on this pool and must not already
    /// be free. Neither is checked in release builds.
    pub fn free(&mut self, slot: SlotId) {
        let idx = slot.index();
        let word = idx / WORD_BITS;
        let bit = 1u32 << (idx % WORD_BITS);
        debug_assert!(self.mask[word] & bit == 0, "double free of slot {}", idx);
        self.mask[word] |= bit;
    }

    pub fn get(&self, slot: SlotId) -> &T {
        &self.slots[slot.index()]
    }

    pub fn get_mut(&mut self, slot: SlotId) -> &mut T {
        &mut self.slots[slot.index()]
    }

    /// Total slots (after rounding)
    pub fn capacity(&self) -> usize {
        self.slots.len()
    }

    /// Slot size in bytes, rounded up to a power of two
    pub fn slot_size(&self) -> usize {
        self.slot_size
    }

    /// Number of free slots
    pub fn available(&self) -> usize {
        self.mask.iter().map(|w| w.count_ones() as usize).sum()
    }
}

impl<T> fmt::Debug for BlockPool<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        struct Mask<'a>(&'a [u32]);
        impl fmt::Debug for Mask<'_> {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.debug_list()
                    .entries(self.0.iter().map(|w| format!("{:#010x}", w)))
                    .finish()
            }
        }

        f.debug_struct("BlockPool")
            .field("words", &self.mask.len())
            .field("mask", &Mask(&self.mask))
            .field("slot_size", &self.slot_size)
            .field("available", &self.available())
            .finish()
    }
}
