use crate::error::CritnibError;
use crate::link::{is_leaf, leaf_link, link_index, node_link, path_mask, slice_index, Link, DELETED_LIFE, NULL, SLICE};
use crate::node::{Leaf, Node};
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::sync::Mutex;
use tiermem_arena::Slab;

/// Compressed radix trie over `u64` keys with identity (`get`) and
/// predecessor (`find_le`) lookup.
///
/// Reads are lock-free: a read walks the tree following plain atomic
/// loads and never blocks on the writer. Writes (`insert`/`remove`) take a
/// single global mutex — concurrency among writers isn't the bottleneck
/// this structure optimizes for, only reader/writer contention is, and a
/// single lock is faster in practice than fine-grained per-node locks.
///
/// Removed nodes and leaves aren't freed for reuse immediately: a reader
/// that started its walk before a remove may still be mid-walk through a
/// just-unlinked node. Reused slots are deferred for [`DELETED_LIFE`]
/// further removes (a grace period), and readers detect straddling more
/// than that many removes and restart rather than risk a torn read.
pub struct Critnib<V> {
    nodes: Slab<Node>,
    leaves: Slab<Leaf<V>>,
    root: AtomicU64,
    write_lock: Mutex<()>,
    remove_count: AtomicU64,
    node_free_head: AtomicU64,
    leaf_free_head: AtomicU64,
    pending_del_nodes: [AtomicU64; DELETED_LIFE],
    pending_del_leaves: [AtomicU64; DELETED_LIFE],
    count: AtomicUsize,
}

impl<V: Copy> Critnib<V> {
    pub fn new(max_entries: usize) -> Self {
        Self {
            nodes: Slab::new(max_entries),
            leaves: Slab::new(max_entries),
            root: AtomicU64::new(NULL),
            write_lock: Mutex::new(()),
            remove_count: AtomicU64::new(0),
            node_free_head: AtomicU64::new(NULL),
            leaf_free_head: AtomicU64::new(NULL),
            pending_del_nodes: std::array::from_fn(|_| AtomicU64::new(NULL)),
            pending_del_leaves: std::array::from_fn(|_| AtomicU64::new(NULL)),
            count: AtomicUsize::new(0),
        }
    }

    pub fn len(&self) -> usize {
        self.count.load(Ordering::Relaxed)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn alloc_node(&self) -> Result<usize, CritnibError> {
        let head = self.node_free_head.load(Ordering::Relaxed);
        if head != NULL {
            let idx = link_index(head);
            let next = unsafe { self.nodes.get(idx) }.child[0].load(Ordering::Relaxed);
            self.node_free_head.store(next, Ordering::Relaxed);
            return Ok(idx);
        }
        if self.nodes.len() >= self.nodes.capacity() {
            return Err(CritnibError::OutOfNodes);
        }
        Ok(self.nodes.alloc(Node::default()))
    }

    fn alloc_leaf(&self, key: u64, value: V) -> Result<usize, CritnibError> {
        let head = self.leaf_free_head.load(Ordering::Relaxed);
        if head != NULL {
            let idx = link_index(head);
            let next = unsafe { self.leaves.get(idx) }.next_free;
            self.leaf_free_head.store(next, Ordering::Relaxed);
            let leaf = unsafe { self.leaves.get_mut(idx) };
            leaf.key = key;
            leaf.value = value;
            leaf.next_free = NULL;
            return Ok(idx);
        }
        if self.leaves.len() >= self.leaves.capacity() {
            return Err(CritnibError::OutOfNodes);
        }
        Ok(self.leaves.alloc(Leaf {
            key,
            value,
            next_free: NULL,
        }))
    }

    /// Returns an unpublished leaf immediately (no grace period needed: no
    /// reader could ever have observed it).
    fn free_leaf_immediately(&self, idx: usize) {
        let head = self.leaf_free_head.load(Ordering::Relaxed);
        unsafe { self.leaves.get_mut(idx) }.next_free = head;
        self.leaf_free_head.store(leaf_link(idx), Ordering::Relaxed);
    }

    fn retire_node(&self, link: Link) {
        if link == NULL {
            return;
        }
        let idx = link_index(link);
        let head = self.node_free_head.load(Ordering::Relaxed);
        unsafe { self.nodes.get(idx) }.child[0].store(head, Ordering::Relaxed);
        self.node_free_head.store(link, Ordering::Relaxed);
    }

    fn retire_leaf(&self, link: Link) {
        if link == NULL {
            return;
        }
        let idx = link_index(link);
        let head = self.leaf_free_head.load(Ordering::Relaxed);
        unsafe { self.leaves.get_mut(idx) }.next_free = head;
        self.leaf_free_head.store(link, Ordering::Relaxed);
    }

    /// Inserts `key -> value`.
    ///
    /// # Errors
    ///
    /// [`CritnibError::AlreadyExists`] if `key` is already present.
    /// [`CritnibError::OutOfNodes`] if the node or leaf pool is exhausted.
    pub fn insert(&self, key: u64, value: V) -> Result<(), CritnibError> {
        let _guard = self.write_lock.lock().unwrap();

        let leaf_idx = self.alloc_leaf(key, value)?;
        let kn = leaf_link(leaf_idx);

        let root = self.root.load(Ordering::Acquire);
        if root == NULL {
            self.root.store(kn, Ordering::Release);
            self.count.fetch_add(1, Ordering::Relaxed);
            return Ok(());
        }

        let mut n = root;
        let mut parent_slot: &AtomicU64 = &self.root;
        let mut prev = root;

        while n != NULL && !is_leaf(n) {
            let node = unsafe { self.nodes.get(link_index(n)) };
            if (key & path_mask(node.shift)) != node.path {
                break;
            }
            prev = n;
            parent_slot = &node.child[slice_index(key, node.shift)];
            n = parent_slot.load(Ordering::Acquire);
        }

        if n == NULL {
            let node = unsafe { self.nodes.get(link_index(prev)) };
            node.child[slice_index(key, node.shift)].store(kn, Ordering::Release);
            self.count.fetch_add(1, Ordering::Relaxed);
            return Ok(());
        }

        let path = if is_leaf(n) {
            unsafe { self.leaves.get(link_index(n)) }.key
        } else {
            unsafe { self.nodes.get(link_index(n)) }.path
        };

        let at = path ^ key;
        if at == 0 {
            self.free_leaf_immediately(leaf_idx);
            return Err(CritnibError::AlreadyExists);
        }

        let msb = 63 - at.leading_zeros() as u8;
        let sh = msb & !(SLICE as u8 - 1);

        let m = match self.alloc_node() {
            Ok(m) => m,
            Err(e) => {
                self.free_leaf_immediately(leaf_idx);
                return Err(e);
            }
        };

        let m_node = unsafe { self.nodes.get_mut(m) };
        for c in m_node.child.iter_mut() {
            *c = AtomicU64::new(NULL);
        }
        m_node.child[slice_index(key, sh)] = AtomicU64::new(kn);
        m_node.child[slice_index(path, sh)] = AtomicU64::new(n);
        m_node.shift = sh;
        m_node.path = key & path_mask(sh);

        parent_slot.store(node_link(m), Ordering::Release);
        self.count.fetch_add(1, Ordering::Relaxed);
        Ok(())
    }

    /// Removes `key`, returning its value if present.
    pub fn remove(&self, key: u64) -> Option<V> {
        let _guard = self.write_lock.lock().unwrap();

        let del = (self.remove_count.fetch_add(1, Ordering::AcqRel) % DELETED_LIFE as u64) as usize;
        let old_node = self.pending_del_nodes[del].swap(NULL, Ordering::Relaxed);
        self.retire_node(old_node);
        let old_leaf = self.pending_del_leaves[del].swap(NULL, Ordering::Relaxed);
        self.retire_leaf(old_leaf);

        let root = self.root.load(Ordering::Acquire);
        if root == NULL {
            return None;
        }

        if is_leaf(root) {
            let idx = link_index(root);
            let leaf = unsafe { self.leaves.get(idx) };
            if leaf.key != key {
                return None;
            }
            let value = leaf.value;
            self.root.store(NULL, Ordering::Release);
            self.pending_del_leaves[del].store(root, Ordering::Relaxed);
            self.count.fetch_sub(1, Ordering::Relaxed);
            return Some(value);
        }

        let mut n_parent_slot: &AtomicU64 = &self.root;
        let mut n_link: Link = root;
        let k_parent_slot: &AtomicU64;
        let kn: Link;

        loop {
            let node = unsafe { self.nodes.get(link_index(n_link)) };
            let slot = &node.child[slice_index(key, node.shift)];
            let next = slot.load(Ordering::Acquire);
            if next == NULL {
                return None;
            }
            if is_leaf(next) {
                k_parent_slot = slot;
                kn = next;
                break;
            }
            n_parent_slot = slot;
            n_link = next;
        }

        let leaf_idx = link_index(kn);
        let leaf = unsafe { self.leaves.get(leaf_idx) };
        if leaf.key != key {
            return None;
        }
        let value = leaf.value;

        k_parent_slot.store(NULL, Ordering::Release);

        let n_node = unsafe { self.nodes.get(link_index(n_link)) };
        let mut only_child: Option<usize> = None;
        let mut more_than_one = false;
        for (i, slot) in n_node.child.iter().enumerate() {
            if slot.load(Ordering::Acquire) != NULL {
                if only_child.is_some() {
                    more_than_one = true;
                    break;
                }
                only_child = Some(i);
            }
        }

        if !more_than_one {
            let ochild = only_child.expect("internal node must retain at least one child");
            let remaining = n_node.child[ochild].load(Ordering::Acquire);
            n_parent_slot.store(remaining, Ordering::Release);
            self.pending_del_nodes[del].store(n_link, Ordering::Relaxed);
        }

        self.pending_del_leaves[del].store(kn, Ordering::Relaxed);
        self.count.fetch_sub(1, Ordering::Relaxed);
        Some(value)
    }

    /// Identity ("==") lookup. Lock-free; retries internally if it detects
    /// it straddled too many concurrent removes.
    pub fn get(&self, key: u64) -> Option<V> {
        loop {
            let wrs1 = self.remove_count.load(Ordering::Acquire);

            let mut n = self.root.load(Ordering::Acquire);
            while n != NULL && !is_leaf(n) {
                let node = unsafe { self.nodes.get(link_index(n)) };
                n = node.child[slice_index(key, node.shift)].load(Ordering::Acquire);
            }

            let result = if n != NULL {
                let leaf = unsafe { self.leaves.get(link_index(n)) };
                (leaf.key == key).then_some(leaf.value)
            } else {
                None
            };

            let wrs2 = self.remove_count.load(Ordering::Acquire);
            if wrs1 + DELETED_LIFE as u64 > wrs2 {
                return result;
            }
        }
    }

    /// Predecessor ("<=") lookup: the largest key present that is `<= key`.
    pub fn find_le(&self, key: u64) -> Option<(u64, V)> {
        loop {
            let wrs1 = self.remove_count.load(Ordering::Acquire);
            let root = self.root.load(Ordering::Acquire);
            let result = if root == NULL {
                None
            } else {
                self.find_le_in(root, key)
            };
            let wrs2 = self.remove_count.load(Ordering::Acquire);
            if wrs1 + DELETED_LIFE as u64 > wrs2 {
                return result;
            }
        }
    }

    fn find_le_in(&self, n: Link, key: u64) -> Option<(u64, V)> {
        if n == NULL {
            return None;
        }

        if is_leaf(n) {
            let leaf = unsafe { self.leaves.get(link_index(n)) };
            return (leaf.key <= key).then_some((leaf.key, leaf.value));
        }

        let node = unsafe { self.nodes.get(link_index(n)) };
        let shift = node.shift;
        let path = node.path;

        if (key ^ path) >> shift & !(crate::link::NIB) != 0 {
            return if path < key {
                self.find_successor(n)
            } else {
                None
            };
        }

        let nib = slice_index(key, shift);
        let child = node.child[nib].load(Ordering::Acquire);
        if let Some(found) = self.find_le_in(child, key) {
            return Some(found);
        }

        for i in (0..nib).rev() {
            let m = node.child[i].load(Ordering::Acquire);
            if m != NULL {
                return if is_leaf(m) {
                    let leaf = unsafe { self.leaves.get(link_index(m)) };
                    Some((leaf.key, leaf.value))
                } else {
                    self.find_successor(m)
                };
            }
        }

        None
    }

    /// The rightmost (largest-key) leaf in the subtree rooted at `n`.
    fn find_successor(&self, mut n: Link) -> Option<(u64, V)> {
        loop {
            let node = unsafe { self.nodes.get(link_index(n)) };
            let mut next = NULL;
            for i in (0..crate::link::SLNODES).rev() {
                let c = node.child[i].load(Ordering::Acquire);
                if c != NULL {
                    next = c;
                    break;
                }
            }
            if next == NULL {
                return None;
            }
            if is_leaf(next) {
                let leaf = unsafe { self.leaves.get(link_index(next)) };
                return Some((leaf.key, leaf.value));
            }
            n = next;
        }
    }
}

unsafe impl<V: Send> Send for Critnib<V> {}
unsafe impl<V: Send> Sync for Critnib<V> {}
