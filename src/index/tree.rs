use std::cmp::Ordering;
use std::fmt;

/// Comparator used by [`Tree::new`]
pub type DefaultComparator<K> = fn(&K, &K) -> Ordering;

type Link<K, V> = Option<Box<Node<K, V>>>;

struct Node<K, V> {
    key: K,
    value: V,
    left: Link<K, V>,
    right: Link<K, V>,
}

/// Unbalanced binary search tree.
///
/// Ordering and equality both come from the comparator bound at creation.
/// Inserts never rebalance, so keys arriving in sorted order degrade the tree
/// into a list with O(n) depth. Callers that cannot control insertion order
/// should shuffle it first.
///
/// The tree holds whatever `V` it is given and never inspects it. Storing
/// handles or references keeps the payload's lifetime with the caller.
pub struct Tree<K, V, C = DefaultComparator<K>> {
    root: Link<K, V>,
    cmp: C,
    len: usize,
}

/// Returned by [`Tree::insert`] when the key is already present.
///
/// Hands the rejected key and value back to the caller.
#[derive(Debug)]
pub struct DuplicateKey<K, V> {
    pub key: K,
    pub value: V,
}

impl<K: fmt::Debug, V> fmt::Display for DuplicateKey<K, V> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "key {:?} is already present", self.key)
    }
}

impl<K: fmt::Debug, V: fmt::Debug> std::error::Error for DuplicateKey<K, V> {}

impl<K: Ord, V> Tree<K, V> {
    /// Create an empty tree ordered by `K`'s `Ord` implementation.
    pub fn new() -> Self {
        Self::with_comparator(<K as Ord>::cmp)
    }
}

impl<K: Ord, V> Default for Tree<K, V> {
    fn default() -> Self {
        Self::new()
    }
}

impl<K, V, C> Tree<K, V, C>
where
    C: Fn(&K, &K) -> Ordering,
{
    /// Create an empty tree ordered by `cmp`.
    pub fn with_comparator(cmp: C) -> Self {
        Self {
            root: None,
            cmp,
            len: 0,
        }
    }

    /// Insert a new key.
    ///
    /// An equal key anywhere on the descent path rejects the insert and
    /// leaves the tree untouched; existing payloads are never replaced.
    pub fn insert(&mut self, key: K, value: V) -> Result<(), DuplicateKey<K, V>> {
        let mut link = &mut self.root;

        while let Some(node) = link {
            link = match (self.cmp)(&key, &node.key) {
                Ordering::Less => &mut node.left,
                Ordering::Greater => &mut node.right,
                Ordering::Equal => return Err(DuplicateKey { key, value }),
            };
        }

        *link = Some(Box::new(Node {
            key,
            value,
            left: None,
            right: None,
        }));
        self.len += 1;

        Ok(())
    }

    /// Find the payload stored under `key`
    pub fn find(&self, key: &K) -> Option<&V> {
        self.find_by(|node_key| (self.cmp)(key, node_key))
    }

    /// Find the payload stored under `key`, mutably
    pub fn find_mut(&mut self, key: &K) -> Option<&mut V> {
        let mut node = self.root.as_deref_mut();

        while let Some(n) = node {
            match (self.cmp)(key, &n.key) {
                Ordering::Less => node = n.left.as_deref_mut(),
                Ordering::Greater => node = n.right.as_deref_mut(),
                Ordering::Equal => return Some(&mut n.value),
            }
        }

        None
    }

    /// Descend using a closure that orders the sought key against each node key.
    ///
    /// Lets callers search with a borrowed form of `K` (a `&str` against
    /// `String` keys, say). The closure must agree with the tree's comparator.
    pub fn find_by<F>(&self, mut seek: F) -> Option<&V>
    where
        F: FnMut(&K) -> Ordering,
    {
        let mut node = self.root.as_deref();

        while let Some(n) = node {
            node = match seek(&n.key) {
                Ordering::Less => n.left.as_deref(),
                Ordering::Greater => n.right.as_deref(),
                Ordering::Equal => return Some(&n.value),
            };
        }

        None
    }
}

impl<K, V, C> Tree<K, V, C> {
    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.root.is_none()
    }

    /// Number of nodes on the longest root-to-leaf path
    pub fn depth(&self) -> usize {
        let mut deepest = 0;
        let mut stack: Vec<(&Node<K, V>, usize)> = Vec::new();
        if let Some(root) = self.root.as_deref() {
            stack.push((root, 1));
        }

        while let Some((node, depth)) = stack.pop() {
            deepest = deepest.max(depth);
            for child in [node.left.as_deref(), node.right.as_deref()]
                .into_iter()
                .flatten()
            {
                stack.push((child, depth + 1));
            }
        }

        deepest
    }

    /// In-order traversal
    pub fn iter(&self) -> Iter<'_, K, V> {
        let mut iter = Iter { stack: Vec::new() };
        iter.push_left(self.root.as_deref());
        iter
    }

    /// Release every node, children before parents.
    ///
    /// Runs without recursion so a degenerate tree cannot exhaust the stack.
    pub fn clear(&mut self) {
        let mut pending: Vec<Box<Node<K, V>>> = self.root.take().into_iter().collect();

        while let Some(mut node) = pending.pop() {
            let left = node.left.take();
            let right = node.right.take();

            if left.is_none() && right.is_none() {
                drop(node);
                continue;
            }

            // revisit the parent once its children are gone
            pending.push(node);
            pending.extend(right);
            pending.extend(left);
        }

        self.len = 0;
    }
}

impl<K, V, C> Drop for Tree<K, V, C> {
    fn drop(&mut self) {
        self.clear();
    }
}

impl<K: fmt::Debug, V: fmt::Debug, C> fmt::Debug for Tree<K, V, C> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_map().entries(self.iter()).finish()
    }
}

impl<'a, K, V, C> IntoIterator for &'a Tree<K, V, C> {
    type Item = (&'a K, &'a V);
    type IntoIter = Iter<'a, K, V>;

    fn into_iter(self) -> Self::IntoIter {
        self.iter()
    }
}

/// In-order iterator over a [`Tree`]
pub struct Iter<'a, K, V> {
    stack: Vec<&'a Node<K, V>>,
}

impl<'a, K, V> Iter<'a, K, V> {
    fn push_left(&mut self, mut node: Option<&'a Node<K, V>>) {
        while let Some(n) = node {
            self.stack.push(n);
            node = n.left.as_deref();
        }
    }
}

impl<'a, K, V> Iterator for Iter<'a, K, V> {
    type Item = (&'a K, &'a V);

    fn next(&mut self) -> Option<Self::Item> {
        let node = self.stack.pop()?;
        self.push_left(node.right.as_deref());
        Some((&node.key, &node.value))
    }
}
