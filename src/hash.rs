// Every key hashed through these maps is minted by this crate (prop,
// observer and action ids), so flooding resistance is not a concern and
// a fixed seed keeps iteration independent of process state.

use std::hash::BuildHasher;

use foldhash::fast::FixedState;

const ID_SEED: u64 = 0x2d35_8dcc_aa6c_78a5;

/// Hash state for the id-keyed bookkeeping maps.
#[derive(Clone, Copy, Debug, Default)]
pub struct IdHashBuilder;

impl BuildHasher for IdHashBuilder {
    type Hasher = <FixedState as BuildHasher>::Hasher;

    #[inline]
    fn build_hasher(&self) -> Self::Hasher {
        FixedState::with_seed(ID_SEED).build_hasher()
    }
}

/// Map keyed by crate ids. Iterates in insertion order, which is what error
/// maps and pending actions are reported in.
pub type IdIndexMap<K, V> = indexmap::IndexMap<K, V, IdHashBuilder>;

/// Set of crate ids, iterated in insertion order.
pub type IdIndexSet<K> = indexmap::IndexSet<K, IdHashBuilder>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn shift_remove_keeps_remaining_order() {
        let mut map: IdIndexMap<u64, &str> = IdIndexMap::default();
        for (key, name) in [(30, "c"), (10, "a"), (20, "b"), (40, "d")] {
            map.insert(key, name);
        }

        map.shift_remove(&10);
        map.insert(10, "a");

        let names: Vec<_> = map.values().copied().collect();
        assert_eq!(names, vec!["c", "b", "d", "a"]);
    }

    #[test]
    fn reinserted_set_member_keeps_its_slot() {
        let mut set: IdIndexSet<u64> = IdIndexSet::default();
        set.extend([5, 1, 3]);

        assert!(!set.insert(1));
        assert_eq!(set.iter().copied().collect::<Vec<_>>(), vec![5, 1, 3]);
        assert_eq!(set.get_index_of(&3), Some(2));
    }
}
