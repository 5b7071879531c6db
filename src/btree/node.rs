use crate::datastore::EntryRef;

/// Maximum number of keys in a leaf node
pub const LEAF_SLOTS: usize = 16;

/// Maximum number of children of an internal node
pub const INTERNAL_SLOTS: usize = 16;

/// Immutable tree node. Internal keys hold the largest key of each child.
#[derive(Debug)]
pub enum BTreeNode<K, V> {
    Leaf { keys: Box<[K]>, values: Box<[V]> },
    Internal { keys: Box<[K]>, children: Box<[EntryRef]> },
}

impl<K: Copy, V> BTreeNode<K, V> {
    pub fn leaf(keys: Vec<K>, values: Vec<V>) -> Self {
        debug_assert_eq!(keys.len(), values.len());
        debug_assert!(!keys.is_empty() && keys.len() <= LEAF_SLOTS);
        Self::Leaf {
            keys: keys.into_boxed_slice(),
            values: values.into_boxed_slice(),
        }
    }

    pub fn internal(keys: Vec<K>, children: Vec<EntryRef>) -> Self {
        debug_assert_eq!(keys.len(), children.len());
        debug_assert!(!keys.is_empty() && keys.len() <= INTERNAL_SLOTS);
        Self::Internal {
            keys: keys.into_boxed_slice(),
            children: children.into_boxed_slice(),
        }
    }

    #[inline]
    pub fn keys(&self) -> &[K] {
        match self {
            Self::Leaf { keys, .. } | Self::Internal { keys, .. } => keys,
        }
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.keys().len()
    }

    #[inline]
    pub fn is_leaf(&self) -> bool {
        matches!(self, Self::Leaf { .. })
    }

    /// Largest key below this node
    #[inline]
    pub fn max_key(&self) -> K {
        match self.keys().last() {
            Some(&key) => key,
            None => unreachable!("empty tree node"),
        }
    }

    pub fn values(&self) -> &[V] {
        match self {
            Self::Leaf { values, .. } => values,
            Self::Internal { .. } => panic!("values() on internal node"),
        }
    }

    pub fn children(&self) -> &[EntryRef] {
        match self {
            Self::Internal { children, .. } => children,
            Self::Leaf { .. } => panic!("children() on leaf node"),
        }
    }

    /// Index of the first key at or after `from` that is not less than the
    /// target, where `cmp` orders a stored key against the target
    #[inline]
    pub fn lower_bound_from(
        &self,
        from: usize,
        cmp: &impl Fn(&K) -> std::cmp::Ordering,
    ) -> Option<usize> {
        let keys = self.keys();
        if from >= keys.len() {
            return None;
        }
        let pos = from + keys[from..].partition_point(|k| cmp(k).is_lt());
        (pos < keys.len()).then_some(pos)
    }
}
