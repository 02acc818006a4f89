//! Fixed-capacity connection slot table.
//!
//! The table is an ordered vector of optional entries whose length is the
//! maximum number of connections. Closed connections leave gaps which later
//! admissions fill front to back. The table never grows on its own; only
//! [`ConnectionPool::set_maximum`] changes its length.

use crate::error::PoolError;

#[derive(Debug, Clone)]
pub struct ConnectionPool<T> {
    slots: Vec<Option<T>>,
}

impl<T> ConnectionPool<T> {
    pub fn new(maximum: usize) -> Self {
        let mut slots = Vec::with_capacity(maximum);
        slots.resize_with(maximum, || None);
        Self { slots }
    }

    /// Stores `connection` in the first empty slot and returns its index.
    pub fn add_connection(&mut self, connection: T) -> Result<usize, PoolError> {
        let Some((index, slot)) = self.slots.iter_mut().enumerate().find(|(_, slot)| slot.is_none()) else {
            return Err(PoolError::capacity_exceeded(self.slots.len()));
        };
        *slot = Some(connection);
        Ok(index)
    }

    pub fn get(&self, index: usize) -> Option<&T> {
        self.slots.get(index).and_then(Option::as_ref)
    }

    /// Empties the slot at `index`, returning what it held.
    pub fn remove(&mut self, index: usize) -> Option<T> {
        self.slots.get_mut(index).and_then(Option::take)
    }

    /// Empties the first slot whose entry matches `predicate`.
    pub fn remove_where<P>(&mut self, mut predicate: P) -> Option<T>
    where
        P: FnMut(&T) -> bool,
    {
        self.slots.iter_mut().find(|slot| slot.as_ref().is_some_and(&mut predicate)).and_then(Option::take)
    }

    /// Resizes the table to `maximum` slots.
    ///
    /// Occupied slots are first moved ahead of the empty ones, keeping their
    /// relative order, so shrinking drops gaps before connections. Occupied
    /// entries that still do not fit are returned; the caller has to close them.
    #[must_use = "evicted connections must be closed"]
    pub fn set_maximum(&mut self, maximum: usize) -> Vec<T> {
        // stable, so active entries keep their order
        self.slots.sort_by_key(Option::is_none);

        let evicted = if maximum < self.slots.len() {
            self.slots.drain(maximum..).flatten().collect()
        } else {
            Vec::new()
        };
        self.slots.resize_with(maximum, || None);
        evicted
    }

    pub fn active_connection_count(&self) -> usize {
        self.slots.iter().filter(|slot| slot.is_some()).count()
    }

    pub fn maximum_connection_count(&self) -> usize {
        self.slots.len()
    }

    pub fn is_full(&self) -> bool {
        self.slots.iter().all(Option::is_some)
    }

    /// Occupied slots with their indices.
    pub fn iter(&self) -> impl Iterator<Item = (usize, &T)> {
        self.slots.iter().enumerate().filter_map(|(index, slot)| slot.as_ref().map(|connection| (index, connection)))
    }

    /// Takes every entry out, leaving the table empty at the same maximum.
    pub fn drain(&mut self) -> Vec<T> {
        self.slots.iter_mut().filter_map(Option::take).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn shrinking_keeps_active_entries_first() {
        let mut pool = ConnectionPool::new(5);
        for name in ["a", "b", "c", "d", "e"] {
            pool.add_connection(name).unwrap();
        }
        pool.remove(1);
        pool.remove(3);
        assert_eq!(pool.active_connection_count(), 3);

        let evicted = pool.set_maximum(3);

        assert!(evicted.is_empty());
        assert_eq!(pool.maximum_connection_count(), 3);
        assert_eq!(pool.active_connection_count(), 3);
        assert_eq!(pool.iter().map(|(_, name)| *name).collect::<Vec<_>>(), ["a", "c", "e"]);
    }

    #[test]
    fn shrinking_below_active_count_evicts_the_tail() {
        let mut pool = ConnectionPool::new(4);
        for id in 0..4 {
            pool.add_connection(id).unwrap();
        }
        pool.remove(0);

        let evicted = pool.set_maximum(2);

        assert_eq!(evicted, [3]);
        assert_eq!(pool.iter().map(|(_, id)| *id).collect::<Vec<_>>(), [1, 2]);
    }

    #[test]
    fn full_pool_rejects_without_growing() {
        let mut pool = ConnectionPool::new(2);
        assert_eq!(pool.add_connection('a'), Ok(0));
        assert_eq!(pool.add_connection('b'), Ok(1));
        assert!(pool.is_full());

        assert_eq!(pool.add_connection('c'), Err(PoolError::CapacityExceeded { maximum: 2 }));
        assert_eq!(pool.maximum_connection_count(), 2);
        assert_eq!(pool.active_connection_count(), 2);
    }

    #[test]
    fn zero_capacity_rejects_everything() {
        let mut pool = ConnectionPool::new(0);
        assert!(pool.is_full());
        assert_eq!(pool.add_connection(()), Err(PoolError::capacity_exceeded(0)));
    }

    #[test]
    fn gaps_are_filled_front_to_back() {
        let mut pool = ConnectionPool::new(3);
        for id in 0..3 {
            pool.add_connection(id).unwrap();
        }
        assert_eq!(pool.remove_where(|id| *id == 1), Some(1));
        assert_eq!(pool.remove_where(|id| *id == 1), None);

        assert_eq!(pool.add_connection(7), Ok(1));
        assert_eq!(pool.get(1), Some(&7));
    }

    #[test]
    fn growing_adds_empty_slots() {
        let mut pool = ConnectionPool::new(1);
        pool.add_connection("a").unwrap();

        assert!(pool.set_maximum(3).is_empty());
        assert_eq!(pool.add_connection("b"), Ok(1));
        assert_eq!(pool.drain(), ["a", "b"]);
        assert_eq!(pool.active_connection_count(), 0);
        assert_eq!(pool.maximum_connection_count(), 3);
    }
}
