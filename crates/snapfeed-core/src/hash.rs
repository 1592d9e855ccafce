//! Fast hash map and hash set type aliases.
//!
//! Every per-source and per-subscriber table in snapfeed is keyed by short
//! strings or integer ids. The Fx hash from `rustc-hash` is a good fit for
//! those keys; none of the tables are exposed to untrusted input that would
//! call for denial-of-service resistance.
//!
//! # Examples
//!
//! ```
//! use snapfeed_core::{FxHashMap, fx_hash_map};
//!
//! let mut leaves: FxHashMap<String, u64> = fx_hash_map();
//! leaves.insert("daq-main".to_owned(), 1_700_000_000);
//! assert_eq!(leaves.len(), 1);
//! ```

/// A [`HashMap`](std::collections::HashMap) using the Fx hash algorithm.
pub type FxHashMap<K, V> = rustc_hash::FxHashMap<K, V>;

/// A [`HashSet`](std::collections::HashSet) using the Fx hash algorithm.
pub type FxHashSet<V> = rustc_hash::FxHashSet<V>;

/// Creates a new empty [`FxHashMap`].
#[inline]
#[must_use]
pub fn fx_hash_map<K, V>() -> FxHashMap<K, V> {
    FxHashMap::default()
}

/// Creates a new empty [`FxHashSet`].
#[inline]
#[must_use]
pub fn fx_hash_set<V>() -> FxHashSet<V> {
    FxHashSet::default()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fx_hash_map_operations() {
        let mut map: FxHashMap<&str, u64> = fx_hash_map();
        map.insert("alpha", 1);
        map.insert("beta", 2);
        assert_eq!(map.get("alpha"), Some(&1));
        assert_eq!(map.get("gamma"), None);
    }

    #[test]
    fn test_fx_hash_set_operations() {
        let mut set: FxHashSet<u64> = fx_hash_set();
        assert!(set.insert(7));
        assert!(!set.insert(7));
        assert!(set.contains(&7));
    }
}
