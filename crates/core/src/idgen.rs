//! Monotonic id generation

use std::marker::PhantomData;
use std::sync::atomic::{AtomicU64, Ordering};

/// Thread-safe generator of never-reused ids.
pub struct IdGenerator<T: From<u64>> {
    next_id: AtomicU64,
    phantom: PhantomData<fn() -> T>,
}

impl<T: From<u64>> IdGenerator<T> {
    pub const fn new() -> Self {
        Self::starting_at(1)
    }

    /// Create a generator whose first id is `first`
    pub const fn starting_at(first: u64) -> Self {
        Self {
            next_id: AtomicU64::new(first),
            phantom: PhantomData,
        }
    }

    /// Get the next available id
    pub fn next_id(&self) -> T {
        T::from(self.next_id.fetch_add(1, Ordering::Relaxed))
    }

    /// Number of ids handed out so far
    pub fn issued(&self) -> u64 {
        self.next_id.load(Ordering::Relaxed).saturating_sub(1)
    }
}

impl<T: From<u64>> Default for IdGenerator<T> {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::SyntaxId;

    #[test]
    fn test_id_generation() {
        let gen = IdGenerator::<SyntaxId>::new();
        let id1 = gen.next_id();
        let id2 = gen.next_id();
        assert_ne!(id1, id2);
        assert!(id1 < id2);
        assert_eq!(gen.issued(), 2);
    }

    #[test]
    fn test_ids_unique_across_threads() {
        let gen = std::sync::Arc::new(IdGenerator::<SyntaxId>::new());
        let handles: Vec<_> = (0..4)
            .map(|_| {
                let gen = gen.clone();
                std::thread::spawn(move || (0..100).map(|_| gen.next_id()).collect::<Vec<_>>())
            })
            .collect();

        let mut all: Vec<SyntaxId> = handles.into_iter().flat_map(|h| h.join().unwrap()).collect();
        all.sort();
        all.dedup();
        assert_eq!(all.len(), 400);
    }
}
