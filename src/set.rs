use core::fmt::Debug;
use core::hash::BuildHasher;
use core::hash::Hash;

use crate::flat_table::FlatTable;
use crate::flat_table::TryInsertError;

/// A hash set implemented on top of the SIMD-probed [`FlatTable`].
///
/// `FlatSet<T, S>` stores values of type `T` where `T` implements `Hash +
/// Eq` and uses a configurable hasher builder `S` to hash values. The
/// underlying storage keeps one metadata byte per slot alongside the value
/// array, so membership probes stay cache-friendly even for large `T`.
///
/// # Performance Characteristics
///
/// - **Memory**: 1 byte per slot overhead, plus the size of `T`.
/// - Removal never shrinks the set; capacity is monotonically
///   non-decreasing.
#[derive(Clone)]
pub struct FlatSet<T, S> {
    table: FlatTable<T>,
    hash_builder: S,
}

impl<T, S> Debug for FlatSet<T, S>
where
    T: Debug + Hash + Eq,
    S: BuildHasher,
{
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_set().entries(self.iter()).finish()
    }
}

impl<T, S> FlatSet<T, S>
where
    T: Hash + Eq,
    S: BuildHasher,
{
    /// Creates a new set with the given hasher builder.
    ///
    /// # Examples
    ///
    /// ```rust
    /// # use core::hash::BuildHasher;
    /// # use siphasher::sip::SipHasher;
    /// #
    /// # use flat_set::FlatSet;
    /// #
    /// # struct SimpleHasher;
    /// # impl BuildHasher for SimpleHasher {
    /// #     type Hasher = SipHasher;
    /// #
    /// #     fn build_hasher(&self) -> Self::Hasher {
    /// #         SipHasher::new()
    /// #     }
    /// # }
    ///
    /// let set: FlatSet<i32, _> = FlatSet::with_hasher(SimpleHasher);
    /// assert!(set.is_empty());
    /// ```
    pub fn with_hasher(hash_builder: S) -> Self {
        Self::with_capacity_and_hasher(0, hash_builder)
    }

    /// Creates a new set with the specified capacity and hasher builder.
    ///
    /// The effective capacity is rounded up to a power of two and is never
    /// below 16.
    ///
    /// # Examples
    ///
    /// ```rust
    /// # use core::hash::BuildHasher;
    /// # use siphasher::sip::SipHasher;
    /// #
    /// # use flat_set::FlatSet;
    /// #
    /// # struct SimpleHasher;
    /// # impl BuildHasher for SimpleHasher {
    /// #     type Hasher = SipHasher;
    /// #
    /// #     fn build_hasher(&self) -> Self::Hasher {
    /// #         SipHasher::new()
    /// #     }
    /// # }
    ///
    /// let set: FlatSet<i32, _> = FlatSet::with_capacity_and_hasher(100, SimpleHasher);
    /// assert!(set.capacity() >= 100);
    /// ```
    pub fn with_capacity_and_hasher(capacity: usize, hash_builder: S) -> Self {
        Self {
            table: FlatTable::with_capacity(capacity),
            hash_builder,
        }
    }

    /// Returns the number of values in the set.
    pub fn len(&self) -> usize {
        self.table.len()
    }

    /// Returns `true` if the set contains no values.
    pub fn is_empty(&self) -> bool {
        self.table.is_empty()
    }

    /// Returns the current slot capacity of the set.
    ///
    /// Capacity only ever grows; removing values leaves tombstones behind
    /// rather than compacting the storage.
    pub fn capacity(&self) -> usize {
        self.table.capacity()
    }

    /// Fraction of slots that have ever held a value, as a value in
    /// `[0.0, 1.0]`.
    ///
    /// Because tombstones count, this can be well above `len() /
    /// capacity()` after heavy removal; it is the quantity that decides
    /// when an insert triggers a rehash.
    ///
    /// # Examples
    ///
    /// ```rust
    /// # use core::hash::BuildHasher;
    /// # use siphasher::sip::SipHasher;
    /// #
    /// # use flat_set::FlatSet;
    /// #
    /// # struct SimpleHasher;
    /// # impl BuildHasher for SimpleHasher {
    /// #     type Hasher = SipHasher;
    /// #
    /// #     fn build_hasher(&self) -> Self::Hasher {
    /// #         SipHasher::new()
    /// #     }
    /// # }
    ///
    /// let mut set = FlatSet::with_hasher(SimpleHasher);
    /// assert_eq!(set.load(), 0.0);
    /// set.insert(1);
    /// assert!(set.load() > 0.0);
    /// ```
    pub fn load(&self) -> f64 {
        self.table.load()
    }

    /// Removes all values from the set, keeping the allocated capacity.
    pub fn clear(&mut self) {
        self.table.clear();
    }

    /// Reserves capacity so that at least `additional` more inserts cannot
    /// trigger a rehash.
    pub fn reserve(&mut self, additional: usize) {
        self.table
            .reserve(additional, |v| self.hash_builder.hash_one(v));
    }

    /// Adds a value to the set.
    ///
    /// Returns whether the value was newly inserted. That is:
    ///
    /// - If the set did not previously contain this value, `true` is
    ///   returned.
    /// - If the set already contained this value, `false` is returned and
    ///   the stored value is left untouched.
    ///
    /// # Examples
    ///
    /// ```rust
    /// # use core::hash::BuildHasher;
    /// # use siphasher::sip::SipHasher;
    /// #
    /// # use flat_set::FlatSet;
    /// #
    /// # struct SimpleHasher;
    /// # impl BuildHasher for SimpleHasher {
    /// #     type Hasher = SipHasher;
    /// #
    /// #     fn build_hasher(&self) -> Self::Hasher {
    /// #         SipHasher::new()
    /// #     }
    /// # }
    ///
    /// let mut set = FlatSet::with_hasher(SimpleHasher);
    /// assert_eq!(set.insert(37), true);
    /// assert_eq!(set.insert(37), false);
    /// assert_eq!(set.len(), 1);
    /// ```
    pub fn insert(&mut self, value: T) -> bool {
        let hash = self.hash_builder.hash_one(&value);
        if self.table.find(hash, |v| v == &value).is_some() {
            return false;
        }

        self.table
            .insert_unique(hash, value, |v| self.hash_builder.hash_one(v));
        true
    }

    /// Fallible variant of [`insert`]: surfaces allocation failure instead
    /// of aborting.
    ///
    /// On error the set is unchanged and the error carries `value` back to
    /// the caller.
    ///
    /// [`insert`]: FlatSet::insert
    pub fn try_insert(&mut self, value: T) -> Result<bool, TryInsertError<T>> {
        let hash = self.hash_builder.hash_one(&value);
        if self.table.find(hash, |v| v == &value).is_some() {
            return Ok(false);
        }

        self.table
            .try_insert_unique(hash, value, |v| self.hash_builder.hash_one(v))?;
        Ok(true)
    }

    /// Returns `true` if the set contains a value.
    ///
    /// # Examples
    ///
    /// ```rust
    /// # use core::hash::BuildHasher;
    /// # use siphasher::sip::SipHasher;
    /// #
    /// # use flat_set::FlatSet;
    /// #
    /// # struct SimpleHasher;
    /// # impl BuildHasher for SimpleHasher {
    /// #     type Hasher = SipHasher;
    /// #
    /// #     fn build_hasher(&self) -> Self::Hasher {
    /// #         SipHasher::new()
    /// #     }
    /// # }
    ///
    /// let mut set = FlatSet::with_hasher(SimpleHasher);
    /// set.insert(1);
    /// assert!(set.contains(&1));
    /// assert!(!set.contains(&2));
    /// ```
    pub fn contains(&self, value: &T) -> bool {
        let hash = self.hash_builder.hash_one(value);
        self.table.find(hash, |v| v == value).is_some()
    }

    /// Removes a value from the set. Returns whether the value was present
    /// in the set.
    ///
    /// # Examples
    ///
    /// ```rust
    /// # use core::hash::BuildHasher;
    /// # use siphasher::sip::SipHasher;
    /// #
    /// # use flat_set::FlatSet;
    /// #
    /// # struct SimpleHasher;
    /// # impl BuildHasher for SimpleHasher {
    /// #     type Hasher = SipHasher;
    /// #
    /// #     fn build_hasher(&self) -> Self::Hasher {
    /// #         SipHasher::new()
    /// #     }
    /// # }
    ///
    /// let mut set = FlatSet::with_hasher(SimpleHasher);
    /// set.insert(1);
    /// assert_eq!(set.remove(&1), true);
    /// assert_eq!(set.remove(&1), false);
    /// ```
    pub fn remove(&mut self, value: &T) -> bool {
        let hash = self.hash_builder.hash_one(value);
        self.table.remove(hash, |v| v == value).is_some()
    }

    /// Removes and returns the value in the set, if any, that is equal to
    /// the given one.
    pub fn take(&mut self, value: &T) -> Option<T> {
        let hash = self.hash_builder.hash_one(value);
        self.table.remove(hash, |v| v == value)
    }

    /// Returns a reference to the value in the set, if any, that is equal
    /// to the given value.
    ///
    /// # Examples
    ///
    /// ```rust
    /// # use core::hash::BuildHasher;
    /// # use siphasher::sip::SipHasher;
    /// #
    /// # use flat_set::FlatSet;
    /// #
    /// # struct SimpleHasher;
    /// # impl BuildHasher for SimpleHasher {
    /// #     type Hasher = SipHasher;
    /// #
    /// #     fn build_hasher(&self) -> Self::Hasher {
    /// #         SipHasher::new()
    /// #     }
    /// # }
    ///
    /// let mut set = FlatSet::with_hasher(SimpleHasher);
    /// set.insert(1);
    /// assert_eq!(set.get(&1), Some(&1));
    /// assert_eq!(set.get(&2), None);
    /// ```
    pub fn get(&self, value: &T) -> Option<&T> {
        let hash = self.hash_builder.hash_one(value);
        self.table.find(hash, |v| v == value)
    }

    /// Exchanges the entire contents of two sets, hasher builders included.
    pub fn swap(&mut self, other: &mut Self) {
        core::mem::swap(self, other);
    }

    /// Returns an iterator over the values of the set.
    ///
    /// Values are yielded in storage order, which is arbitrary with respect
    /// to insertion order and changes whenever an insert grows the set.
    ///
    /// # Examples
    ///
    /// ```rust
    /// # use core::hash::BuildHasher;
    /// # use siphasher::sip::SipHasher;
    /// #
    /// # use flat_set::FlatSet;
    /// #
    /// # struct SimpleHasher;
    /// # impl BuildHasher for SimpleHasher {
    /// #     type Hasher = SipHasher;
    /// #
    /// #     fn build_hasher(&self) -> Self::Hasher {
    /// #         SipHasher::new()
    /// #     }
    /// # }
    ///
    /// let mut set = FlatSet::with_hasher(SimpleHasher);
    /// set.insert(1);
    /// set.insert(2);
    ///
    /// for value in set.iter() {
    ///     println!("Value: {}", value);
    /// }
    /// ```
    pub fn iter(&self) -> Iter<'_, T> {
        Iter {
            inner: self.table.iter(),
        }
    }

    /// Returns an iterator that removes and yields all values from the set.
    ///
    /// After the iterator is dropped, the set is empty and its load
    /// accounting is reset; the allocated capacity is kept.
    ///
    /// # Examples
    ///
    /// ```rust
    /// # use core::hash::BuildHasher;
    /// # use siphasher::sip::SipHasher;
    /// #
    /// # use flat_set::FlatSet;
    /// #
    /// # struct SimpleHasher;
    /// # impl BuildHasher for SimpleHasher {
    /// #     type Hasher = SipHasher;
    /// #
    /// #     fn build_hasher(&self) -> Self::Hasher {
    /// #         SipHasher::new()
    /// #     }
    /// # }
    ///
    /// let mut set = FlatSet::with_hasher(SimpleHasher);
    /// set.insert(1);
    /// set.insert(2);
    ///
    /// let values: Vec<_> = set.drain().collect();
    /// assert!(set.is_empty());
    /// assert_eq!(values.len(), 2);
    /// ```
    pub fn drain(&mut self) -> Drain<'_, T> {
        Drain {
            inner: self.table.drain(),
        }
    }
}

impl<T, S> FlatSet<T, S>
where
    T: Hash + Eq,
    S: BuildHasher + Default,
{
    /// Creates a new set using the default hasher builder.
    ///
    /// # Examples
    ///
    /// ```rust
    /// # use core::hash::BuildHasher;
    /// # use siphasher::sip::SipHasher;
    /// #
    /// # use flat_set::FlatSet;
    /// #
    /// # #[derive(Default)]
    /// # struct SimpleHasher;
    /// # impl BuildHasher for SimpleHasher {
    /// #     type Hasher = SipHasher;
    /// #
    /// #     fn build_hasher(&self) -> Self::Hasher {
    /// #         SipHasher::new()
    /// #     }
    /// # }
    ///
    /// let set: FlatSet<i32, SimpleHasher> = FlatSet::new();
    /// assert!(set.is_empty());
    /// ```
    pub fn new() -> Self {
        Self::with_hasher(S::default())
    }

    /// Creates a new set with the specified capacity using the default
    /// hasher builder.
    pub fn with_capacity(capacity: usize) -> Self {
        Self::with_capacity_and_hasher(capacity, S::default())
    }
}

impl<T, S> Default for FlatSet<T, S>
where
    T: Hash + Eq,
    S: BuildHasher + Default,
{
    fn default() -> Self {
        Self::new()
    }
}

impl<T, S> Extend<T> for FlatSet<T, S>
where
    T: Hash + Eq,
    S: BuildHasher,
{
    fn extend<I: IntoIterator<Item = T>>(&mut self, iter: I) {
        for value in iter {
            self.insert(value);
        }
    }
}

impl<T, S> FromIterator<T> for FlatSet<T, S>
where
    T: Hash + Eq,
    S: BuildHasher + Default,
{
    fn from_iter<I: IntoIterator<Item = T>>(iter: I) -> Self {
        let mut set = Self::new();
        set.extend(iter);
        set
    }
}

/// An iterator over the values of a [`FlatSet`].
pub struct Iter<'a, T> {
    inner: crate::flat_table::Iter<'a, T>,
}

impl<'a, T> Iterator for Iter<'a, T> {
    type Item = &'a T;

    fn next(&mut self) -> Option<Self::Item> {
        self.inner.next()
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        self.inner.size_hint()
    }
}

impl<T> DoubleEndedIterator for Iter<'_, T> {
    fn next_back(&mut self) -> Option<Self::Item> {
        self.inner.next_back()
    }
}

impl<T> ExactSizeIterator for Iter<'_, T> {}

/// A draining iterator over the values of a [`FlatSet`].
pub struct Drain<'a, T> {
    inner: crate::flat_table::Drain<'a, T>,
}

impl<T> Iterator for Drain<'_, T> {
    type Item = T;

    fn next(&mut self) -> Option<Self::Item> {
        self.inner.next()
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        self.inner.size_hint()
    }
}

impl<T> ExactSizeIterator for Drain<'_, T> {}

impl<'a, T, S> IntoIterator for &'a FlatSet<T, S>
where
    T: Hash + Eq,
    S: BuildHasher,
{
    type IntoIter = Iter<'a, T>;
    type Item = &'a T;

    fn into_iter(self) -> Self::IntoIter {
        self.iter()
    }
}

#[cfg(test)]
mod tests {
    use alloc::string::ToString;
    use alloc::vec;
    use alloc::vec::Vec;
    use core::hash::BuildHasher;

    use rand::Rng;
    use rand::SeedableRng;
    use rand::TryRngCore;
    use rand::rngs::OsRng;
    use rand::rngs::StdRng;
    use siphasher::sip::SipHasher;

    use super::*;

    #[derive(Clone)]
    struct SipHashBuilder {
        k0: u64,
        k1: u64,
    }

    impl BuildHasher for SipHashBuilder {
        type Hasher = SipHasher;

        fn build_hasher(&self) -> Self::Hasher {
            SipHasher::new_with_keys(self.k0, self.k1)
        }
    }

    impl Default for SipHashBuilder {
        fn default() -> Self {
            Self {
                k0: OsRng.try_next_u64().unwrap_or(0),
                k1: OsRng.try_next_u64().unwrap_or(0),
            }
        }
    }

    #[test]
    fn test_new_and_with_hasher() {
        let set: FlatSet<i32, SipHashBuilder> = FlatSet::new();
        assert!(set.is_empty());
        assert_eq!(set.len(), 0);
        assert_eq!(set.load(), 0.0);

        let set2 = FlatSet::<i32, _>::with_hasher(SipHashBuilder::default());
        assert!(set2.is_empty());
        assert_eq!(set2.len(), 0);
    }

    #[test]
    fn test_with_capacity() {
        let set: FlatSet<i32, SipHashBuilder> = FlatSet::with_capacity(100);
        assert!(set.capacity() >= 100);
        assert!(set.is_empty());

        let set2 = FlatSet::<i32, _>::with_capacity_and_hasher(17, SipHashBuilder::default());
        assert_eq!(set2.capacity(), 32);
    }

    #[test]
    fn test_single_value_lifecycle() {
        let mut set = FlatSet::with_hasher(SipHashBuilder::default());
        assert!(set.iter().next().is_none());
        assert!(!set.contains(&1));

        set.insert(1);
        assert_eq!(set.len(), 1);
        assert!(set.load() > 0.0);

        let mut iter = set.iter();
        assert_eq!(iter.next(), Some(&1));
        assert_eq!(iter.next(), None);
        assert_eq!(set.get(&1), Some(&1));

        set.remove(&1);
        assert_eq!(set.len(), 0);
        assert_eq!(set.get(&1), None);
        assert!(set.iter().next().is_none());
    }

    #[test]
    fn test_insert_and_contains() {
        let mut set = FlatSet::with_hasher(SipHashBuilder::default());

        assert!(set.insert(1));
        assert_eq!(set.len(), 1);
        assert!(!set.is_empty());
        assert!(set.load() > 0.0);
        assert!(set.contains(&1));

        assert!(!set.insert(1));
        assert_eq!(set.len(), 1);
        assert!(set.contains(&1));

        assert!(set.insert(2));
        assert_eq!(set.len(), 2);
        assert!(set.contains(&1));
        assert!(set.contains(&2));
        assert!(!set.contains(&3));
    }

    #[test]
    fn test_remove() {
        let mut set = FlatSet::with_hasher(SipHashBuilder::default());
        set.insert(1);
        set.insert(2);
        set.insert(3);

        assert!(set.remove(&2));
        assert_eq!(set.len(), 2);
        assert!(set.contains(&1));
        assert!(!set.contains(&2));
        assert!(set.contains(&3));

        assert!(!set.remove(&2));
        assert!(!set.remove(&4));
        assert_eq!(set.len(), 2);
    }

    #[test]
    fn test_take() {
        let mut set = FlatSet::with_hasher(SipHashBuilder::default());
        set.insert(1);
        set.insert(2);

        assert_eq!(set.take(&1), Some(1));
        assert_eq!(set.len(), 1);
        assert!(!set.contains(&1));
        assert!(set.contains(&2));

        assert_eq!(set.take(&1), None);
        assert_eq!(set.take(&3), None);
    }

    #[test]
    fn test_get() {
        let mut set = FlatSet::with_hasher(SipHashBuilder::default());
        set.insert(42);

        assert_eq!(set.get(&42), Some(&42));
        assert_eq!(set.get(&1), None);
    }

    #[test]
    fn test_clear() {
        let mut set = FlatSet::with_hasher(SipHashBuilder::default());
        set.insert(1);
        set.insert(2);
        set.insert(3);

        set.clear();
        assert_eq!(set.len(), 0);
        assert_eq!(set.load(), 0.0);
        assert!(!set.contains(&1));
        assert!(!set.contains(&2));
        assert!(!set.contains(&3));
    }

    #[test]
    fn test_reserve() {
        let mut set = FlatSet::<i32, _>::with_hasher(SipHashBuilder::default());
        set.reserve(1000);
        let capacity = set.capacity();

        for i in 0..1000 {
            set.insert(i);
        }
        assert_eq!(set.capacity(), capacity);
    }

    #[test]
    fn test_iter() {
        let mut set = FlatSet::with_hasher(SipHashBuilder::default());
        set.insert(1);
        set.insert(2);
        set.insert(3);

        let values: Vec<i32> = set.iter().copied().collect();
        assert_eq!(values.len(), 3);
        assert!(values.contains(&1));
        assert!(values.contains(&2));
        assert!(values.contains(&3));

        let reversed: Vec<i32> = set.iter().rev().copied().collect();
        assert_eq!(values.iter().rev().copied().collect::<Vec<_>>(), reversed);
    }

    #[test]
    fn test_into_iterator() {
        let mut set = FlatSet::with_hasher(SipHashBuilder::default());
        set.insert(1);
        set.insert(2);
        set.insert(3);

        let values: Vec<i32> = (&set).into_iter().copied().collect();
        assert_eq!(values.len(), 3);
    }

    #[test]
    fn test_drain() {
        let mut set = FlatSet::with_hasher(SipHashBuilder::default());
        set.insert(1);
        set.insert(2);
        set.insert(3);

        let drained: Vec<i32> = set.drain().collect();
        assert_eq!(drained.len(), 3);
        assert!(set.is_empty());
        assert_eq!(set.load(), 0.0);

        assert!(drained.contains(&1));
        assert!(drained.contains(&2));
        assert!(drained.contains(&3));
    }

    #[test]
    fn test_swap() {
        let mut a = FlatSet::with_hasher(SipHashBuilder::default());
        let mut b = FlatSet::with_hasher(SipHashBuilder::default());
        a.insert(1);
        b.insert(2);
        b.insert(3);

        a.swap(&mut b);
        assert_eq!(a.len(), 2);
        assert_eq!(b.len(), 1);
        assert!(a.contains(&2));
        assert!(b.contains(&1));
    }

    #[test]
    fn test_from_iterator_and_extend() {
        let mut set: FlatSet<i32, SipHashBuilder> = (0..10).collect();
        assert_eq!(set.len(), 10);

        set.extend(vec![5, 6, 20, 21]);
        assert_eq!(set.len(), 12);
        assert!(set.contains(&20));
        assert!(set.contains(&21));
    }

    #[test]
    fn test_clone() {
        let mut set = FlatSet::with_hasher(SipHashBuilder::default());
        for i in 0..100 {
            set.insert(i);
        }
        for i in 0..50 {
            set.remove(&i);
        }

        let clone = set.clone();
        assert_eq!(clone.len(), 50);
        for i in 50..100 {
            assert!(clone.contains(&i));
        }
        for i in 0..50 {
            assert!(!clone.contains(&i));
        }
    }

    #[test]
    fn test_multiple_insertions() {
        let mut set = FlatSet::with_hasher(SipHashBuilder::default());

        for i in 0..100 {
            assert!(set.insert(i));
        }
        assert_eq!(set.len(), 100);

        for i in 0..100 {
            assert!(set.contains(&i));
        }

        for i in 0..100 {
            assert!(!set.insert(i));
        }
        assert_eq!(set.len(), 100);
    }

    #[test]
    fn test_growth_and_membership() {
        let mut set = FlatSet::with_hasher(SipHashBuilder::default());
        let initial_capacity = set.capacity();

        for i in 0..1000 {
            assert!(set.insert(i));
        }

        assert!(set.capacity() > initial_capacity);
        assert_eq!(set.len(), 1000);
        for i in 0..1000 {
            assert!(set.contains(&i));
        }

        for i in (0..1000).step_by(2) {
            assert!(set.remove(&i));
        }
        assert_eq!(set.len(), 500);

        for i in (1..1000).step_by(2) {
            assert!(set.contains(&i));
        }
        for i in (0..1000).step_by(2) {
            assert!(!set.contains(&i));
        }
    }

    #[test]
    fn test_tombstone_reuse_counts() {
        let n = 100;
        let mut set = FlatSet::with_hasher(SipHashBuilder::default());

        for i in 0..n {
            set.insert(i);
        }
        for i in 0..n / 2 {
            set.remove(&i);
        }
        for i in n..2 * n {
            set.insert(i);
        }

        assert_eq!(set.len(), n as usize + n as usize / 2);
        for i in n / 2..2 * n {
            assert!(set.contains(&i));
        }
        for i in 0..n / 2 {
            assert!(!set.contains(&i));
        }
    }

    #[test]
    fn test_string_values() {
        let mut set = FlatSet::with_hasher(SipHashBuilder::default());

        assert!(set.insert("hello".to_string()));
        assert!(set.insert("world".to_string()));
        assert!(set.insert("rust".to_string()));

        assert!(set.contains(&"hello".to_string()));
        assert!(set.contains(&"world".to_string()));
        assert!(!set.contains(&"missing".to_string()));

        assert_eq!(set.len(), 3);
        assert!(!set.insert("hello".to_string()));
        assert_eq!(set.len(), 3);
    }

    #[test]
    fn test_complex_values() {
        let mut set = FlatSet::with_hasher(SipHashBuilder::default());

        let vec1 = vec![1, 2, 3];
        let vec2 = vec![4, 5, 6];
        let vec3 = vec![1, 2, 3];

        assert!(set.insert(vec1.clone()));
        assert!(set.insert(vec2.clone()));
        assert!(!set.insert(vec3));

        assert_eq!(set.len(), 2);
        assert!(set.contains(&vec1));
        assert!(set.contains(&vec2));
    }

    #[test]
    fn test_large_values() {
        let mut set = FlatSet::with_hasher(SipHashBuilder::default());

        for i in 0..100 {
            let large = [i as u8; 512];
            assert!(set.insert(large));
            assert!(set.contains(&large));
        }
        assert_eq!(set.len(), 100);
    }

    #[test]
    fn test_insert_remove_cycle() {
        let mut set = FlatSet::with_hasher(SipHashBuilder::default());

        for _ in 0..10 {
            for i in 0..50 {
                assert!(set.insert(i));
            }
            assert_eq!(set.len(), 50);

            for i in 0..50 {
                assert!(set.remove(&i));
            }
            assert_eq!(set.len(), 0);
            assert!(set.is_empty());
        }
    }

    #[test]
    fn test_default_trait() {
        let set: FlatSet<i32, SipHashBuilder> = FlatSet::default();
        assert!(set.is_empty());
    }

    #[test]
    fn test_debug() {
        let mut set = FlatSet::with_hasher(SipHashBuilder::default());
        set.insert(7);
        let rendered = alloc::format!("{:?}", set);
        assert_eq!(rendered, "{7}");
    }

    #[test]
    fn fuzz_against_reference() {
        let seed = OsRng.try_next_u64().unwrap();
        let mut rng = StdRng::seed_from_u64(seed);

        let mut set = FlatSet::with_hasher(SipHashBuilder::default());
        let mut reference = hashbrown::HashSet::new();

        for _ in 0..1000 {
            let value: u32 = rng.random();
            assert_eq!(
                set.contains(&value),
                reference.contains(&value),
                "seed {seed}"
            );

            set.insert(value);
            reference.insert(value);
            assert_eq!(set.len(), reference.len(), "seed {seed}");
        }

        for value in &reference {
            assert!(set.contains(value), "seed {seed}");
        }
        for value in &set {
            assert!(reference.contains(value), "seed {seed}");
        }

        // Drain the reference down, erasing from both sides; membership must
        // drop immediately.
        let snapshot: Vec<u32> = reference.iter().copied().collect();
        for value in snapshot {
            assert!(set.remove(&value), "seed {seed}");
            reference.remove(&value);

            assert!(!set.contains(&value), "seed {seed}");
            assert_eq!(set.len(), reference.len(), "seed {seed}");
        }

        assert!(set.is_empty());
    }
}
