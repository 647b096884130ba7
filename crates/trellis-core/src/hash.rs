use core::hash::Hash;
use std::hash::Hasher;

#[cfg(feature = "std-hash")]
pub mod default {
    pub use std::collections::hash_map::DefaultHasher;

    #[inline]
    pub fn new() -> DefaultHasher {
        DefaultHasher::new()
    }
}

#[cfg(not(feature = "std-hash"))]
pub mod default {
    pub use ahash::AHasher as DefaultHasher;

    #[inline]
    pub fn new() -> DefaultHasher {
        DefaultHasher::default()
    }
}

/// Hashes a single value with whichever default hasher is active.
#[inline]
pub fn hash_one<T: Hash + ?Sized>(v: &T) -> u64 {
    let mut h = default::new();
    v.hash(&mut h);
    h.finish()
}

/// Short, class-name safe token derived from `seed`.
///
/// Used for scoped-style classes, which must be stable for a given
/// component definition across instances.
pub fn scope_token(seed: &str) -> String {
    format!("t-{:08x}", hash_one(seed) as u32)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn scope_token_is_stable_per_seed() {
        assert_eq!(scope_token("todo-list"), scope_token("todo-list"));
        assert_ne!(scope_token("todo-list"), scope_token("todo-item"));
        assert!(scope_token("x").starts_with("t-"));
    }
}
