//! A hash table core using split-metadata open addressing with 16-way SIMD
//! probing.
//!
//! [`FlatTable<V>`] stores values of type `V` and provides fast insertion,
//! lookup, and removal operations. This is a fairly low-level structure that
//! requires you to provide both the hash value and an equality predicate for
//! each operation. Prefer using the [`FlatSet<T, S>`] wrapper for a
//! convenient set interface unless you are implementing your own set
//! structure.
//!
//! ## Design
//!
//! The table is a single contiguous allocation carved into two parallel
//! arrays over `capacity` slots: a metadata byte array followed by the value
//! storage array. `capacity` is always a power of two and at least 16, so
//! the metadata array divides evenly into 16-byte groups that can be loaded
//! with one aligned SSE2 instruction.
//!
//! Each metadata byte encodes one of three slot states. `0x00` marks a slot
//! that has never held a value, `0x01` marks a tombstone left behind by a
//! removal, and any byte with the high bit set marks an occupied slot whose
//! low 7 bits are a fingerprint of the value's hash. Keeping the occupied
//! marker in the sign bit means a single `movemask` over a group yields the
//! occupancy bitmap with no comparison at all, which is the hot operation
//! both when scanning for a free slot during insertion and when iterators
//! skip runs of empty slots.
//!
//! A value's hash is split in two: the low 7 bits become the fingerprint and
//! the remaining bits select the home group. Lookups broadcast the expected
//! occupied byte into a vector, compare it against a whole group of metadata
//! at once, and only touch value storage for the (rare) fingerprint matches.
//! One compare rules out 15 of 16 candidates, so for large value types the
//! probe loop's working set is one cache line of metadata per 16 slots. An
//! empty byte anywhere in a probed group terminates an unsuccessful lookup,
//! because insertion never places a value past an empty slot on its probe
//! sequence.
//!
//! Removal tombstones the slot instead of shifting survivors. Tombstones
//! cost probe length just like live values, so the rehash trigger counts
//! every slot that is not empty (`tombstones` below tracks occupied plus
//! tombstoned slots). When that count passes 7/10 of capacity, the table
//! rehashes: it doubles if live values alone fill more than 4/10 of the
//! slots, and otherwise rebuilds at the same capacity, which scrubs the
//! tombstones. Capacity never shrinks.
//!
//! Hashes provided by the caller are perturbed with a per-block seed derived
//! from the allocation address before they are split. This keeps trivially
//! adversarial inputs (an identity hash over small integers, say) from
//! producing the same fingerprint/group pattern in every table.
//!
//! ## Safety Invariants
//!
//! The implementation relies on the following key invariants:
//!
//! 1. **Bounds**: group bases produced by `home_group`/`next_group` are
//!    multiples of 16 below `capacity`, so a 16-byte group load never
//!    crosses the end of the metadata array. The metadata array starts at
//!    the allocation base, which is 16-byte aligned by layout construction.
//! 2. **Initialization**: a slot's value storage is initialized if and only
//!    if its metadata byte has the high bit set. Every transition of a
//!    metadata byte into or out of the occupied range is paired with the
//!    matching write, read-out, or drop of the value.
//! 3. **Probe reachability**: a live value is always reachable from its home
//!    group without crossing an empty byte. Removal writes a tombstone
//!    (never an empty), and insertion claims the first non-occupied slot on
//!    the probe sequence, so the bridge of non-empty bytes between a
//!    value's home group and its slot is never broken.
//! 4. **Termination**: the non-empty slot count is kept at or below 7/10 of
//!    capacity on exit from every public operation, so both lookup probes
//!    (which stop at an empty byte) and insertion probes (which stop at a
//!    non-occupied slot) terminate before wrapping.
//!
//! [`FlatSet<T, S>`]: crate::set::FlatSet

use alloc::alloc::handle_alloc_error;
use core::alloc::Layout;
#[cfg(all(
    target_arch = "x86",
    target_feature = "sse2",
    not(feature = "scalar-probe")
))]
use core::arch::x86::*;
#[cfg(all(
    target_arch = "x86_64",
    target_feature = "sse2",
    not(feature = "scalar-probe")
))]
use core::arch::x86_64::*;
use core::fmt::Debug;
use core::iter::FusedIterator;
use core::marker::PhantomData;
use core::mem::MaybeUninit;
use core::ptr::NonNull;

use cfg_if::cfg_if;

/// Slot has never held a value.
const EMPTY: u8 = 0x00;

/// Slot held a value that was removed. Unlike `EMPTY`, a tombstone does not
/// terminate a probe sequence.
const TOMBSTONE: u8 = 0x01;

/// High bit of an occupied metadata byte. The low 7 bits hold the hash
/// fingerprint, so the sign bit alone distinguishes occupied slots and a
/// plain `movemask` over a group yields the occupancy bitmap.
const OCCUPIED: u8 = 0x80;

/// Number of metadata bytes probed per step. Matches the SSE2 register width
/// and the alignment of the metadata region.
const GROUP_WIDTH: usize = 16;

const FULL_GROUP: u16 = 0xFFFF;

/// Smallest capacity ever allocated. One group.
const MIN_CAPACITY: usize = 16;

/// Compile-time constant mixed into the per-block hash seed.
const SEED_MIX: u64 = 0x9E37_79B9_7F4A_7C15;

const MAX_LOAD: f64 = 0.7;
const GROWTH_DENSITY: f64 = 0.4;

/// Largest non-empty slot count tolerated at a given capacity before an
/// insert rehashes.
#[inline(always)]
fn load_limit(capacity: usize) -> usize {
    (capacity as f64 * MAX_LOAD) as usize
}

/// Largest live count at which a rehash merely scrubs tombstones instead of
/// doubling.
#[inline(always)]
fn density_limit(capacity: usize) -> usize {
    (capacity as f64 * GROWTH_DENSITY) as usize
}

/// Metadata byte for an occupied slot holding a value with this (mixed)
/// hash: the sign bit plus the low 7 hash bits.
#[inline(always)]
fn occupied_tag(mixed: u64) -> u8 {
    OCCUPIED | (mixed & 0x7f) as u8
}

fn normalize_capacity(requested: usize) -> usize {
    requested
        .checked_next_power_of_two()
        .expect("capacity overflow")
        .max(MIN_CAPACITY)
}

cfg_if! {
    if #[cfg(all(
        any(target_arch = "x86", target_arch = "x86_64"),
        target_feature = "sse2",
        not(feature = "scalar-probe")
    ))] {
        /// Bitmap of lanes in the group at `base` whose metadata byte equals
        /// `byte`.
        ///
        /// # Safety
        ///
        /// `meta` must point to a metadata array that is 16-byte aligned and
        /// extends at least `base + 16` bytes, with `base` a multiple of 16.
        #[inline(always)]
        unsafe fn group_match(meta: *const u8, base: usize, byte: u8) -> u16 {
            // SAFETY: Caller guarantees `meta + base` is a 16-byte aligned
            // in-bounds group, making the aligned load safe.
            unsafe {
                let data = _mm_load_si128(meta.add(base) as *const __m128i);
                let cmp = _mm_cmpeq_epi8(data, _mm_set1_epi8(byte as i8));
                _mm_movemask_epi8(cmp) as u16
            }
        }

        /// Bitmap of occupied lanes in the group at `base`.
        ///
        /// # Safety
        ///
        /// Same contract as [`group_match`]. Relies on `OCCUPIED` being the
        /// sign bit, so the movemask needs no comparison.
        #[inline(always)]
        unsafe fn group_occupied(meta: *const u8, base: usize) -> u16 {
            // SAFETY: Caller guarantees `meta + base` is a 16-byte aligned
            // in-bounds group, making the aligned load safe.
            unsafe {
                let data = _mm_load_si128(meta.add(base) as *const __m128i);
                _mm_movemask_epi8(data) as u16
            }
        }
    } else {
        /// Portable fallback for [`group_match`]: bitmap of lanes in the
        /// group at `base` whose metadata byte equals `byte`.
        ///
        /// # Safety
        ///
        /// `meta` must point to a metadata array extending at least
        /// `base + 16` bytes.
        #[inline(always)]
        unsafe fn group_match(meta: *const u8, base: usize, byte: u8) -> u16 {
            let mut bits = 0u16;
            for lane in 0..GROUP_WIDTH {
                // SAFETY: Caller guarantees `base + 16` is within the array.
                if unsafe { *meta.add(base + lane) } == byte {
                    bits |= 1 << lane;
                }
            }
            bits
        }

        /// Portable fallback for [`group_occupied`].
        ///
        /// # Safety
        ///
        /// Same contract as [`group_match`].
        #[inline(always)]
        unsafe fn group_occupied(meta: *const u8, base: usize) -> u16 {
            let mut bits = 0u16;
            for lane in 0..GROUP_WIDTH {
                // SAFETY: Caller guarantees `base + 16` is within the array.
                if unsafe { *meta.add(base + lane) } & OCCUPIED != 0 {
                    bits |= 1 << lane;
                }
            }
            bits
        }
    }
}

/// The allocator failed to provide memory for a storage block.
///
/// Returned by the `try_` entry points. The table that reported it is left
/// exactly as it was before the failing call.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AllocError {
    layout: Layout,
}

impl AllocError {
    /// The layout of the allocation that failed.
    pub fn layout(&self) -> Layout {
        self.layout
    }
}

impl core::fmt::Display for AllocError {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        write!(
            f,
            "failed to allocate {} bytes for a table storage block",
            self.layout.size()
        )
    }
}

impl core::error::Error for AllocError {}

/// Error returned by [`FlatTable::try_insert_unique`] when the table needed
/// to grow and the allocator failed.
///
/// Carries the value back to the caller; the table is unchanged.
pub struct TryInsertError<V> {
    /// The value that could not be inserted.
    pub value: V,
    /// The underlying allocation failure.
    pub error: AllocError,
}

impl<V> Debug for TryInsertError<V> {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("TryInsertError")
            .field("error", &self.error)
            .finish_non_exhaustive()
    }
}

impl<V> core::fmt::Display for TryInsertError<V> {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        core::fmt::Display::fmt(&self.error, f)
    }
}

impl<V> core::error::Error for TryInsertError<V> {
    fn source(&self) -> Option<&(dyn core::error::Error + 'static)> {
        Some(&self.error)
    }
}

/// One owned allocation holding the metadata array followed by the value
/// array.
///
/// The block knows nothing about probing or load accounting; it owns the
/// memory, destroys whatever the metadata marks as occupied when dropped,
/// and hands out raw views of the two arrays. It is deliberately neither
/// clonable nor copyable; blocks only ever change hands via swaps of the
/// containing table.
struct RawBlock<V> {
    ptr: NonNull<u8>,
    capacity: usize,
    data_offset: usize,
    /// Hash perturbation for this block, derived from the allocation address
    /// at construction (or inherited wholesale by a clone, which copies the
    /// metadata verbatim and therefore must keep the geometry it encodes).
    seed: u64,
    _phantom: PhantomData<V>,
}

impl<V> RawBlock<V> {
    /// Combined layout for `capacity` slots, and the byte offset of the
    /// value array within it.
    ///
    /// The metadata region is given 16-byte alignment so that group loads
    /// can use the aligned SSE2 load; `Layout::extend` then pads the value
    /// region for `V`'s own alignment (no padding in practice unless
    /// `align_of::<V>() > 16`, since `capacity` is a multiple of 16).
    fn layout(capacity: usize) -> (Layout, usize) {
        let meta =
            Layout::from_size_align(capacity, GROUP_WIDTH).expect("allocation size overflow");
        let values = Layout::array::<V>(capacity).expect("allocation size overflow");
        let (layout, data_offset) = meta.extend(values).expect("allocation size overflow");
        (layout, data_offset)
    }

    /// Allocates a block with every slot empty and the value array
    /// uninitialized.
    fn new(capacity: usize) -> Result<Self, AllocError> {
        debug_assert!(capacity.is_power_of_two() && capacity >= MIN_CAPACITY);
        let (layout, data_offset) = Self::layout(capacity);

        // SAFETY: The layout has non-zero size (at least MIN_CAPACITY
        // metadata bytes). Null results are surfaced as AllocError; the
        // metadata prefix is zeroed so every slot starts empty.
        let ptr = unsafe {
            let raw = alloc::alloc::alloc(layout);
            let Some(ptr) = NonNull::new(raw) else {
                return Err(AllocError { layout });
            };
            core::ptr::write_bytes(ptr.as_ptr(), EMPTY, capacity);
            ptr
        };

        Ok(Self {
            ptr,
            capacity,
            data_offset,
            seed: (ptr.as_ptr() as usize >> 12) as u64 ^ SEED_MIX,
            _phantom: PhantomData,
        })
    }

    fn meta(&self) -> NonNull<[u8]> {
        NonNull::slice_from_raw_parts(self.ptr, self.capacity)
    }

    fn values(&self) -> NonNull<[MaybeUninit<V>]> {
        // SAFETY: `data_offset` was produced by `Self::layout` for this
        // allocation, so the resulting pointer is in bounds and aligned for
        // `V`, with room for `capacity` elements.
        unsafe {
            NonNull::slice_from_raw_parts(self.ptr.add(self.data_offset).cast(), self.capacity)
        }
    }

    fn value_start(&self) -> NonNull<MaybeUninit<V>> {
        // SAFETY: Same as `values`.
        unsafe { self.ptr.add(self.data_offset).cast() }
    }

    #[inline(always)]
    fn mix(&self, hash: u64) -> u64 {
        hash ^ self.seed
    }

    /// Group base where probing for this (mixed) hash starts: the hash's
    /// index portion reduced modulo capacity, rounded down to a group
    /// boundary.
    #[inline(always)]
    fn home_group(&self, mixed: u64) -> usize {
        ((mixed >> 7) as usize & (self.capacity - 1)) & !(GROUP_WIDTH - 1)
    }

    #[inline(always)]
    fn next_group(&self, group: usize) -> usize {
        (group + GROUP_WIDTH) & (self.capacity - 1)
    }

    /// Lowest occupied slot at or after `slot`, if any.
    fn first_occupied_from(&self, slot: usize) -> Option<usize> {
        let mut slot = slot;
        while slot < self.capacity {
            let base = slot & !(GROUP_WIDTH - 1);
            // SAFETY: `base` is a group-aligned index below `capacity`, and
            // the metadata region is 16-byte aligned.
            let mut mask = unsafe { group_occupied(self.ptr.as_ptr(), base) };
            mask &= FULL_GROUP << (slot - base);
            if mask != 0 {
                return Some(base + mask.trailing_zeros() as usize);
            }
            slot = base + GROUP_WIDTH;
        }
        None
    }
}

impl<V> Drop for RawBlock<V> {
    fn drop(&mut self) {
        // SAFETY: Occupied metadata guarantees an initialized value, and the
        // allocation was created with exactly `Self::layout(self.capacity)`.
        unsafe {
            if core::mem::needs_drop::<V>() {
                for slot in 0..self.capacity {
                    if *self.meta().as_ref().get_unchecked(slot) & OCCUPIED != 0 {
                        self.values()
                            .as_mut()
                            .get_unchecked_mut(slot)
                            .assume_init_drop();
                    }
                }
            }

            let (layout, _) = Self::layout(self.capacity);
            alloc::alloc::dealloc(self.ptr.as_ptr(), layout);
        }
    }
}

/// A hash table core using split-metadata open addressing with 16-way SIMD
/// probing.
///
/// `FlatTable<V>` stores values of type `V` and provides fast insertion,
/// lookup, and removal operations. Unlike standard hash maps, this
/// implementation requires you to provide the hash value and an equality
/// predicate for each operation.
///
/// ## Performance Characteristics
///
/// - **Memory**: 1 byte per slot overhead, plus the size of `V`.
/// - Lookups touch value memory only on 7-bit fingerprint matches, so the
///   table stays fast even when `V` is large.
pub struct FlatTable<V> {
    block: RawBlock<V>,
    /// Count of occupied slots.
    len: usize,
    /// Count of slots that are not empty, i.e. occupied plus tombstoned.
    /// This is what drives load decisions; see the module docs.
    tombstones: usize,
}

impl<V> FlatTable<V> {
    /// Creates a table with at least the requested capacity.
    ///
    /// The effective capacity is the next power of two, and never below 16.
    /// Aborts on allocation failure; see [`try_with_capacity`] for the
    /// fallible variant.
    ///
    /// [`try_with_capacity`]: FlatTable::try_with_capacity
    pub fn with_capacity(capacity: usize) -> Self {
        match Self::try_with_capacity(capacity) {
            Ok(table) => table,
            Err(err) => handle_alloc_error(err.layout()),
        }
    }

    /// Fallible variant of [`with_capacity`].
    ///
    /// [`with_capacity`]: FlatTable::with_capacity
    pub fn try_with_capacity(capacity: usize) -> Result<Self, AllocError> {
        Ok(Self {
            block: RawBlock::new(normalize_capacity(capacity))?,
            len: 0,
            tombstones: 0,
        })
    }

    /// Creates a table with the minimum capacity.
    pub fn new() -> Self {
        Self::with_capacity(0)
    }

    /// Returns the number of values in the table.
    pub fn len(&self) -> usize {
        self.len
    }

    /// Returns `true` if the table contains no values.
    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// Returns the current slot capacity. Always a power of two, at least
    /// 16, and non-decreasing over the table's lifetime.
    pub fn capacity(&self) -> usize {
        self.block.capacity
    }

    /// Fraction of slots that are occupied or tombstoned.
    ///
    /// This is the quantity the rehash trigger watches, not the live
    /// density: tombstones lengthen probe sequences just like live values.
    pub fn load(&self) -> f64 {
        self.tombstones as f64 / self.block.capacity as f64
    }

    /// Finds a value in the table by hash and equality predicate.
    ///
    /// Returns a reference to the value if found, or `None` if no matching
    /// value exists.
    ///
    /// # Arguments
    ///
    /// * `hash` - The hash value to search for
    /// * `eq` - A predicate function that returns `true` for the desired
    ///   value
    #[inline]
    pub fn find(&self, hash: u64, eq: impl Fn(&V) -> bool) -> Option<&V> {
        if self.len == 0 {
            return None;
        }

        let slot = self.probe_find(self.block.mix(hash), eq)?;
        // SAFETY: `probe_find` only returns occupied slots, which hold
        // initialized values.
        Some(unsafe {
            self.block
                .values()
                .as_ref()
                .get_unchecked(slot)
                .assume_init_ref()
        })
    }

    /// Finds a value in the table by hash and equality predicate, returning
    /// a mutable reference.
    ///
    /// The caller must not modify the value in a way that changes its hash
    /// or its equality class; doing so strands the value in a slot where
    /// lookups can no longer reach it.
    #[inline]
    pub fn find_mut(&mut self, hash: u64, eq: impl Fn(&V) -> bool) -> Option<&mut V> {
        if self.len == 0 {
            return None;
        }

        let slot = self.probe_find(self.block.mix(hash), eq)?;
        // SAFETY: `probe_find` only returns occupied slots, which hold
        // initialized values.
        Some(unsafe {
            self.block
                .values()
                .as_mut()
                .get_unchecked_mut(slot)
                .assume_init_mut()
        })
    }

    /// Inserts a value known to be absent from the table.
    ///
    /// This skips the duplicate check entirely: callers must have already
    /// established, via [`find`], that no equal value is present. Inserting
    /// an actual duplicate leaves both copies in the table and which one
    /// lookups see is unspecified.
    ///
    /// `rehash` must return the same hash for a value that the caller's
    /// hashing produced for it originally; it is consulted when the insert
    /// pushes the table over its load limit and the values must be
    /// relocated.
    ///
    /// Aborts on allocation failure; see [`try_insert_unique`].
    ///
    /// [`find`]: FlatTable::find
    /// [`try_insert_unique`]: FlatTable::try_insert_unique
    #[inline]
    pub fn insert_unique(&mut self, hash: u64, value: V, rehash: impl Fn(&V) -> u64) {
        if let Err(err) = self.try_insert_unique(hash, value, rehash) {
            handle_alloc_error(err.error.layout());
        }
    }

    /// Fallible variant of [`insert_unique`].
    ///
    /// On allocation failure the error carries `value` back and the table
    /// is unchanged.
    ///
    /// [`insert_unique`]: FlatTable::insert_unique
    pub fn try_insert_unique(
        &mut self,
        hash: u64,
        value: V,
        rehash: impl Fn(&V) -> u64,
    ) -> Result<(), TryInsertError<V>> {
        // Rehash before placement so the non-empty count stays at or below
        // the load limit even after this insert claims a fresh slot.
        if self.tombstones >= load_limit(self.block.capacity) {
            if let Err(error) = self.grow_rehash(&rehash) {
                return Err(TryInsertError { value, error });
            }
        }

        self.place_new(hash, value);
        Ok(())
    }

    /// Removes and returns a value from the table.
    ///
    /// The value is identified by its hash and an equality predicate. The
    /// slot it occupied becomes a tombstone: it no longer counts as live but
    /// keeps counting against the load limit until the next rehash scrubs
    /// it.
    ///
    /// # Arguments
    ///
    /// * `hash` - The hash value of the entry to remove
    /// * `eq` - A predicate function that returns `true` for the value to
    ///   remove
    pub fn remove(&mut self, hash: u64, eq: impl Fn(&V) -> bool) -> Option<V> {
        if self.len == 0 {
            return None;
        }

        let slot = self.probe_find(self.block.mix(hash), eq)?;
        self.len -= 1;
        // SAFETY: `probe_find` only returns occupied slots. The tombstone
        // takes ownership away from the block before the value is read out,
        // so the block's drop cannot free it a second time. `tombstones` is
        // deliberately not decremented.
        unsafe {
            *self.block.meta().as_mut().get_unchecked_mut(slot) = TOMBSTONE;
            Some(
                self.block
                    .values()
                    .as_ref()
                    .get_unchecked(slot)
                    .assume_init_read(),
            )
        }
    }

    /// Ensures `additional` more unique inserts cannot trigger a rehash.
    ///
    /// Grows (never shrinks) and scrubs tombstones if the current block
    /// lacks the headroom. Aborts on allocation failure; see
    /// [`try_reserve`].
    ///
    /// [`try_reserve`]: FlatTable::try_reserve
    pub fn reserve(&mut self, additional: usize, rehash: impl Fn(&V) -> u64) {
        if let Err(err) = self.try_reserve(additional, rehash) {
            handle_alloc_error(err.layout());
        }
    }

    /// Fallible variant of [`reserve`]. The table is unchanged on error.
    ///
    /// [`reserve`]: FlatTable::reserve
    pub fn try_reserve(
        &mut self,
        additional: usize,
        rehash: impl Fn(&V) -> u64,
    ) -> Result<(), AllocError> {
        if self.tombstones.saturating_add(additional) <= load_limit(self.block.capacity) {
            return Ok(());
        }

        // A rehash scrubs tombstones, so only live values count against the
        // new block's headroom.
        let required = self.len.saturating_add(additional);
        let mut new_capacity = self.block.capacity;
        while load_limit(new_capacity) < required {
            new_capacity = new_capacity.checked_mul(2).expect("capacity overflow");
        }

        self.rehash_to(new_capacity, &rehash)
    }

    /// Removes all values from the table.
    ///
    /// Capacity is preserved; every slot is reset to empty, so the load
    /// accounting starts over as well.
    pub fn clear(&mut self) {
        // SAFETY: Occupied metadata guarantees an initialized value; after
        // the drops, resetting the metadata relinquishes the block's claim
        // on all of them at once.
        unsafe {
            if core::mem::needs_drop::<V>() && self.len > 0 {
                for slot in 0..self.block.capacity {
                    if *self.block.meta().as_ref().get_unchecked(slot) & OCCUPIED != 0 {
                        self.block
                            .values()
                            .as_mut()
                            .get_unchecked_mut(slot)
                            .assume_init_drop();
                    }
                }
            }

            core::ptr::write_bytes(self.block.ptr.as_ptr(), EMPTY, self.block.capacity);
        }

        self.len = 0;
        self.tombstones = 0;
    }

    /// Exchanges the entire contents of two tables, storage blocks included.
    pub fn swap(&mut self, other: &mut Self) {
        core::mem::swap(self, other);
    }

    /// Returns an iterator over all values in the table.
    ///
    /// The iterator yields `&V` references in slot order, which is arbitrary
    /// with respect to insertion order and changes across rehashes.
    pub fn iter(&self) -> Iter<'_, V> {
        Iter {
            raw: RawIter::new(self),
            _marker: PhantomData,
        }
    }

    /// Returns an iterator yielding mutable references to all values.
    ///
    /// As with [`find_mut`], values must not be modified in a way that
    /// changes their hash or equality class.
    ///
    /// [`find_mut`]: FlatTable::find_mut
    pub fn iter_mut(&mut self) -> IterMut<'_, V> {
        IterMut {
            raw: RawIter::new(self),
            _marker: PhantomData,
        }
    }

    /// Returns an iterator that removes and yields all values from the
    /// table.
    ///
    /// Dropping the iterator removes any values not yet yielded. If the
    /// iterator is leaked instead, the unyielded values simply stay in the
    /// table; nothing is unsafe, but the tombstones accumulated by the
    /// yielded values keep counting against the load limit.
    pub fn drain(&mut self) -> Drain<'_, V> {
        Drain {
            slot: 0,
            table: self,
        }
    }

    /// Walk the probe sequence for `mixed`, checking fingerprint matches
    /// against `eq`. Returns the matching occupied slot, or `None` once an
    /// empty slot proves the value absent.
    #[inline]
    fn probe_find(&self, mixed: u64, eq: impl Fn(&V) -> bool) -> Option<usize> {
        let tag = occupied_tag(mixed);
        let home = self.block.home_group(mixed);
        let mut group = home;

        loop {
            // SAFETY: `home_group`/`next_group` produce group-aligned bases
            // below capacity, and the metadata region is 16-byte aligned.
            let mut candidates = unsafe { group_match(self.block.ptr.as_ptr(), group, tag) };
            while candidates != 0 {
                let lane = candidates.trailing_zeros() as usize;
                candidates ^= 1 << lane;

                let slot = group + lane;
                // SAFETY: A fingerprint match implies the occupied bit, so
                // the slot holds an initialized value.
                let candidate =
                    unsafe { self.block.values().as_ref().get_unchecked(slot).assume_init_ref() };
                if eq(candidate) {
                    return Some(slot);
                }
            }

            // An empty byte in the group proves the value was never placed
            // past this point of its probe sequence.
            // SAFETY: Same bounds argument as the match above.
            if unsafe { group_match(self.block.ptr.as_ptr(), group, EMPTY) } != 0 {
                return None;
            }

            group = self.block.next_group(group);
            if group == home {
                unreachable!("probe sequence wrapped around a table with no empty slot");
            }
        }
    }

    /// First non-occupied slot on the probe sequence for `mixed`. Reuses
    /// tombstones; an empty slot is claimed only if no tombstone precedes
    /// it.
    #[inline]
    fn probe_insert_slot(&self, mixed: u64) -> usize {
        let home = self.block.home_group(mixed);
        let mut group = home;

        loop {
            // SAFETY: `home_group`/`next_group` produce group-aligned bases
            // below capacity, and the metadata region is 16-byte aligned.
            let occupied = unsafe { group_occupied(self.block.ptr.as_ptr(), group) };
            if occupied != FULL_GROUP {
                let lane = (!occupied).trailing_zeros() as usize;
                return group + lane;
            }

            group = self.block.next_group(group);
            if group == home {
                unreachable!("probe sequence wrapped around a table with no free slot");
            }
        }
    }

    /// Claim a slot for a value known to be absent and write it in. The
    /// caller has already ensured the load limit holds.
    fn place_new(&mut self, hash: u64, value: V) {
        let mixed = self.block.mix(hash);
        let slot = self.probe_insert_slot(mixed);

        // SAFETY: `probe_insert_slot` returns an in-bounds slot whose
        // metadata is empty or tombstoned, so no live value is overwritten.
        // The metadata write and the value write happen together, keeping
        // the occupied-implies-initialized invariant.
        unsafe {
            if *self.block.meta().as_ref().get_unchecked(slot) == EMPTY {
                // Reused tombstones already count against the load limit;
                // only a never-occupied slot is new to the accounting.
                self.tombstones += 1;
            }
            *self.block.meta().as_mut().get_unchecked_mut(slot) = occupied_tag(mixed);
            self.block
                .values()
                .as_mut()
                .get_unchecked_mut(slot)
                .write(value);
        }

        self.len += 1;
    }

    #[cold]
    fn grow_rehash(&mut self, rehash: &dyn Fn(&V) -> u64) -> Result<(), AllocError> {
        // Tombstone-heavy but live-light tables are rebuilt at the same
        // capacity, which scrubs the tombstones; only real density doubles.
        let new_capacity = if self.len > density_limit(self.block.capacity) {
            self.block.capacity.checked_mul(2).expect("capacity overflow")
        } else {
            self.block.capacity
        };

        self.rehash_to(new_capacity, rehash)
    }

    /// Relocate every live value into a fresh block of `new_capacity` slots
    /// and swap it in. On allocation failure the table is untouched.
    fn rehash_to(
        &mut self,
        new_capacity: usize,
        rehash: &dyn Fn(&V) -> u64,
    ) -> Result<(), AllocError> {
        let mut fresh = FlatTable {
            block: RawBlock::new(new_capacity)?,
            len: 0,
            tombstones: 0,
        };

        // SAFETY: This block transfers ownership of every live value from
        // the old block to the fresh one.
        // - An occupied metadata byte guarantees the slot is initialized,
        //   making `assume_init_read` safe.
        // - The old slot is tombstoned immediately after the read, before
        //   any code that can unwind runs, so the old block never drops a
        //   moved-out value even if `rehash` panics mid-relocation.
        // - `place_new` cannot collide or run out of room: the fresh block
        //   is empty and sized so that all live values fit under the load
        //   limit.
        unsafe {
            for slot in 0..self.block.capacity {
                if *self.block.meta().as_ref().get_unchecked(slot) & OCCUPIED == 0 {
                    continue;
                }

                let value = self
                    .block
                    .values()
                    .as_ref()
                    .get_unchecked(slot)
                    .assume_init_read();
                *self.block.meta().as_mut().get_unchecked_mut(slot) = TOMBSTONE;

                let hash = rehash(&value);
                fresh.place_new(hash, value);
            }
        }

        debug_assert_eq!(fresh.len, self.len);
        core::mem::swap(self, &mut fresh);
        Ok(())
    }
}

impl<V> Default for FlatTable<V> {
    fn default() -> Self {
        Self::new()
    }
}

impl<V> Debug for FlatTable<V> {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        use alloc::format;
        use alloc::string::String;
        use alloc::string::ToString;
        use alloc::vec::Vec;

        // SAFETY: The metadata array is always fully initialized.
        let meta = unsafe { self.block.meta().as_ref() };
        let groups = meta
            .chunks(GROUP_WIDTH)
            .map(|group| {
                group
                    .iter()
                    .map(|&state| {
                        if state == EMPTY {
                            "..".to_string()
                        } else if state == TOMBSTONE {
                            "xx".to_string()
                        } else {
                            format!("{:02x}", state & !OCCUPIED)
                        }
                    })
                    .collect::<Vec<String>>()
                    .join(" ")
            })
            .collect::<Vec<String>>();

        f.debug_struct("FlatTable")
            .field("metadata", &groups)
            .field("len", &self.len)
            .field("tombstones", &self.tombstones)
            .field("capacity", &self.block.capacity)
            .finish()
    }
}

impl<V> Clone for FlatTable<V>
where
    V: Clone,
{
    fn clone(&self) -> Self {
        let mut block = match RawBlock::new(self.block.capacity) {
            Ok(block) => block,
            Err(err) => handle_alloc_error(err.layout()),
        };
        // The metadata is copied verbatim, and the fingerprints and slot
        // positions it encodes were produced under the source's seed.
        block.seed = self.block.seed;

        let mut clone = FlatTable {
            block,
            len: 0,
            tombstones: 0,
        };

        // SAFETY: Slots are copied state-by-state at identical indices in an
        // identically sized block. The metadata byte is written only after
        // the cloned value, so a panicking `V::clone` leaves the partial
        // clone consistent: every slot it claims as occupied is initialized.
        // Tombstones are carried over too; dropping them would break the
        // probe-reachability of values placed beyond them.
        unsafe {
            for slot in 0..self.block.capacity {
                let state = *self.block.meta().as_ref().get_unchecked(slot);
                if state == EMPTY {
                    continue;
                }

                if state & OCCUPIED != 0 {
                    let value = self
                        .block
                        .values()
                        .as_ref()
                        .get_unchecked(slot)
                        .assume_init_ref()
                        .clone();
                    clone
                        .block
                        .values()
                        .as_mut()
                        .get_unchecked_mut(slot)
                        .write(value);
                    clone.len += 1;
                }

                *clone.block.meta().as_mut().get_unchecked_mut(slot) = state;
                clone.tombstones += 1;
            }
        }

        debug_assert_eq!(clone.len, self.len);
        clone
    }
}

/// Shared cursor over the occupied slots of a table, parameterized only in
/// how the wrappers hand out the slot pointer (`&V`, `&mut V`).
///
/// Holds the front offset and the one-past-the-end back offset of the
/// unvisited window, plus the count of occupied slots left inside it; the
/// count is what bounds the scans, so forward and backward traversal can
/// meet in the middle without revisiting a slot.
struct RawIter<V> {
    meta: NonNull<u8>,
    values: NonNull<MaybeUninit<V>>,
    front: usize,
    back: usize,
    remaining: usize,
}

impl<V> RawIter<V> {
    fn new(table: &FlatTable<V>) -> Self {
        Self {
            meta: table.block.ptr,
            values: table.block.value_start(),
            front: 0,
            back: table.block.capacity,
            remaining: table.len,
        }
    }

    /// Advance to the next occupied slot, scanning a group of metadata at a
    /// time.
    fn next(&mut self) -> Option<NonNull<V>> {
        if self.remaining == 0 {
            return None;
        }

        let mut slot = self.front;
        loop {
            debug_assert!(slot < self.back);
            let base = slot & !(GROUP_WIDTH - 1);
            // SAFETY: `base` is a group-aligned index below the table's
            // capacity (the unvisited window still holds occupied slots),
            // and the metadata region is 16-byte aligned.
            let mut mask = unsafe { group_occupied(self.meta.as_ptr(), base) };
            mask &= FULL_GROUP << (slot - base);

            if mask != 0 {
                let found = base + mask.trailing_zeros() as usize;
                debug_assert!(found < self.back);
                self.front = found + 1;
                self.remaining -= 1;
                // SAFETY: `found` is an in-bounds occupied slot, so the value
                // is initialized.
                let value = unsafe { NonNull::new_unchecked(self.values.as_ptr().add(found)) };
                return Some(value.cast());
            }

            slot = base + GROUP_WIDTH;
        }
    }

    /// Retreat to the nearest occupied slot before the back offset.
    fn next_back(&mut self) -> Option<NonNull<V>> {
        if self.remaining == 0 {
            return None;
        }

        let mut slot = self.back;
        loop {
            debug_assert!(slot > self.front);
            let base = (slot - 1) & !(GROUP_WIDTH - 1);
            // SAFETY: Same bounds argument as `next`.
            let mut mask = unsafe { group_occupied(self.meta.as_ptr(), base) };
            let lanes = slot - base;
            if lanes < GROUP_WIDTH {
                mask &= (1u16 << lanes) - 1;
            }

            if mask != 0 {
                let found = base + (GROUP_WIDTH - 1 - mask.leading_zeros() as usize);
                debug_assert!(found >= self.front);
                self.back = found;
                self.remaining -= 1;
                // SAFETY: `found` is an in-bounds occupied slot, so the value
                // is initialized.
                let value = unsafe { NonNull::new_unchecked(self.values.as_ptr().add(found)) };
                return Some(value.cast());
            }

            slot = base;
        }
    }
}

/// An iterator over the values in a [`FlatTable`].
///
/// This struct is created by the [`iter`] method on [`FlatTable`]. It yields
/// `&V` references in slot order.
///
/// [`iter`]: FlatTable::iter
pub struct Iter<'a, V> {
    raw: RawIter<V>,
    _marker: PhantomData<&'a V>,
}

impl<'a, V> Iterator for Iter<'a, V> {
    type Item = &'a V;

    fn next(&mut self) -> Option<Self::Item> {
        // SAFETY: The cursor only yields occupied slots of a table borrowed
        // for 'a.
        self.raw.next().map(|ptr| unsafe { &*ptr.as_ptr() })
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        (self.raw.remaining, Some(self.raw.remaining))
    }
}

impl<V> DoubleEndedIterator for Iter<'_, V> {
    fn next_back(&mut self) -> Option<Self::Item> {
        // SAFETY: Same as `next`.
        self.raw.next_back().map(|ptr| unsafe { &*ptr.as_ptr() })
    }
}

impl<V> ExactSizeIterator for Iter<'_, V> {}
impl<V> FusedIterator for Iter<'_, V> {}

/// A mutable iterator over the values in a [`FlatTable`].
///
/// This struct is created by the [`iter_mut`] method on [`FlatTable`]. It
/// yields `&mut V` references in slot order.
///
/// [`iter_mut`]: FlatTable::iter_mut
pub struct IterMut<'a, V> {
    raw: RawIter<V>,
    _marker: PhantomData<&'a mut V>,
}

impl<'a, V> Iterator for IterMut<'a, V> {
    type Item = &'a mut V;

    fn next(&mut self) -> Option<Self::Item> {
        // SAFETY: The cursor only yields occupied slots of a table borrowed
        // mutably for 'a, and never yields the same slot twice.
        self.raw.next().map(|mut ptr| unsafe { ptr.as_mut() })
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        (self.raw.remaining, Some(self.raw.remaining))
    }
}

impl<V> DoubleEndedIterator for IterMut<'_, V> {
    fn next_back(&mut self) -> Option<Self::Item> {
        // SAFETY: Same as `next`.
        self.raw.next_back().map(|mut ptr| unsafe { ptr.as_mut() })
    }
}

impl<V> ExactSizeIterator for IterMut<'_, V> {}
impl<V> FusedIterator for IterMut<'_, V> {}

/// A draining iterator over the values in a [`FlatTable`].
///
/// This struct is created by the [`drain`] method on [`FlatTable`]. It
/// yields owned `V` values and empties the table as it goes; dropping it
/// removes the remainder.
///
/// [`drain`]: FlatTable::drain
pub struct Drain<'a, V> {
    table: &'a mut FlatTable<V>,
    slot: usize,
}

impl<V> Iterator for Drain<'_, V> {
    type Item = V;

    fn next(&mut self) -> Option<Self::Item> {
        let Some(slot) = self.table.block.first_occupied_from(self.slot) else {
            self.slot = self.table.block.capacity;
            return None;
        };

        self.slot = slot + 1;
        self.table.len -= 1;
        // SAFETY: `first_occupied_from` only returns occupied slots. The
        // tombstone takes ownership away from the block before the value is
        // read out.
        unsafe {
            *self.table.block.meta().as_mut().get_unchecked_mut(slot) = TOMBSTONE;
            Some(
                self.table
                    .block
                    .values()
                    .as_ref()
                    .get_unchecked(slot)
                    .assume_init_read(),
            )
        }
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        (self.table.len, Some(self.table.len))
    }
}

impl<V> ExactSizeIterator for Drain<'_, V> {}
impl<V> FusedIterator for Drain<'_, V> {}

impl<V> Drop for Drain<'_, V> {
    fn drop(&mut self) {
        for _ in &mut *self {}

        // Every slot is now empty or tombstoned; reset the metadata so the
        // drained table starts over with clean load accounting.
        debug_assert_eq!(self.table.len, 0);
        // SAFETY: No slot is occupied any more, so wiping the metadata
        // cannot orphan a live value.
        unsafe {
            let capacity = self.table.block.capacity;
            core::ptr::write_bytes(self.table.block.ptr.as_ptr(), EMPTY, capacity);
        }
        self.table.tombstones = 0;
    }
}
