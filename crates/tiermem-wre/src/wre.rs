use crate::node::{Node, Which};
use std::cmp::Ordering;
use tiermem_arena::Slab;

/// A weight-augmented AVL tree.
///
/// Nodes are kept in sorted order by a caller-supplied comparator over
/// `T` (in the hotness ranking, `T` pairs a frequency with a type id, so
/// the tree is sorted by frequency). Each node also carries an
/// `own_weight` (in the ranking, a byte size) that is independent of the
/// sort order; [`Wre::find_weighted`] answers "which node's sort key is
/// the boundary at which a `ratio` fraction of total weight lies below
/// it" — a weighted order-statistic query, not a plain rank query.
///
/// Insertion and removal rebalance with the same update-metadata /
/// rotate-if-needed walk back to the root (`rotate_left`, `rotate_right`,
/// plus a combined single-or-double rotation choice based on the heavy
/// child's own balance factor, needed for correctness that a plain
/// single-rotation-only walk doesn't guarantee after a deletion).
///
/// Not internally synchronized — callers needing concurrent access wrap
/// it behind their own lock, same as critnib wraps its writer side.
pub struct Wre<T> {
    nodes: Slab<Node<T>>,
    root: Option<usize>,
    compare: Box<dyn Fn(&T, &T) -> Ordering + Send>,
    len: usize,
}

impl<T: Copy> Wre<T> {
    pub fn new<F>(max_entries: usize, compare: F) -> Self
    where
        F: Fn(&T, &T) -> Ordering + Send + 'static,
    {
        Self {
            nodes: Slab::new(max_entries),
            root: None,
            compare: Box::new(compare),
            len: 0,
        }
    }

    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    pub fn total_weight(&self) -> f64 {
        self.root
            .map_or(0.0, |r| unsafe { self.nodes.get(r) }.subtree_weight)
    }

    fn height(&self, idx: Option<usize>) -> i64 {
        idx.map_or(0, |i| unsafe { self.nodes.get(i) }.height)
    }

    fn weight(&self, idx: Option<usize>) -> f64 {
        idx.map_or(0.0, |i| unsafe { self.nodes.get(i) }.subtree_weight)
    }

    fn update_metadata(&self, idx: usize) {
        let (left, right) = {
            let node = unsafe { self.nodes.get(idx) };
            (node.left, node.right)
        };
        let height = 1 + self.height(left).max(self.height(right));
        let subtree_weight = {
            let own = unsafe { self.nodes.get(idx) }.own_weight;
            self.weight(left) + self.weight(right) + own
        };
        let node = unsafe { self.nodes.get_mut(idx) };
        node.height = height;
        node.subtree_weight = subtree_weight;
    }

    /// Reattaches `new_root` where `old_root` used to hang (either under
    /// `old_root`'s parent, via its recorded `which` slot, or as the tree
    /// root).
    fn reattach(&mut self, old_parent: Option<usize>, old_which: Which, new_root: usize) {
        {
            let node = unsafe { self.nodes.get_mut(new_root) };
            node.parent = old_parent;
            node.which = old_which;
        }
        match old_parent {
            None => self.root = Some(new_root),
            Some(p) => {
                let pnode = unsafe { self.nodes.get_mut(p) };
                match old_which {
                    Which::Left => pnode.left = Some(new_root),
                    Which::Right => pnode.right = Some(new_root),
                    Which::Root => unreachable!("a non-root node never carries Which::Root"),
                }
            }
        }
    }

    /// Right-heavy rotation: `x`'s right child `z` becomes the subtree root.
    fn rotate_left(&mut self, x: usize) -> usize {
        let z = unsafe { self.nodes.get(x) }.right.expect("rotate_left needs a right child");
        let t = unsafe { self.nodes.get(z) }.left;
        let (x_parent, x_which) = {
            let xn = unsafe { self.nodes.get(x) };
            (xn.parent, xn.which)
        };

        {
            let xn = unsafe { self.nodes.get_mut(x) };
            xn.right = t;
        }
        if let Some(ti) = t {
            let tn = unsafe { self.nodes.get_mut(ti) };
            tn.parent = Some(x);
            tn.which = Which::Right;
        }

        {
            let zn = unsafe { self.nodes.get_mut(z) };
            zn.left = Some(x);
        }
        {
            let xn = unsafe { self.nodes.get_mut(x) };
            xn.parent = Some(z);
            xn.which = Which::Left;
        }

        self.reattach(x_parent, x_which, z);

        self.update_metadata(x);
        self.update_metadata(z);
        z
    }

    /// Left-heavy rotation: `x`'s left child `y` becomes the subtree root.
    fn rotate_right(&mut self, x: usize) -> usize {
        let y = unsafe { self.nodes.get(x) }.left.expect("rotate_right needs a left child");
        let t = unsafe { self.nodes.get(y) }.right;
        let (x_parent, x_which) = {
            let xn = unsafe { self.nodes.get(x) };
            (xn.parent, xn.which)
        };

        {
            let xn = unsafe { self.nodes.get_mut(x) };
            xn.left = t;
        }
        if let Some(ti) = t {
            let tn = unsafe { self.nodes.get_mut(ti) };
            tn.parent = Some(x);
            tn.which = Which::Left;
        }

        {
            let yn = unsafe { self.nodes.get_mut(y) };
            yn.right = Some(x);
        }
        {
            let xn = unsafe { self.nodes.get_mut(x) };
            xn.parent = Some(y);
            xn.which = Which::Right;
        }

        self.reattach(x_parent, x_which, y);

        self.update_metadata(x);
        self.update_metadata(y);
        y
    }

    /// Refreshes metadata at `idx` and rotates if it's out of balance,
    /// picking a single or double rotation based on the heavy child's own
    /// balance factor. Returns the (possibly new) subtree root at this
    /// position.
    fn rebalance_at(&mut self, idx: usize) -> usize {
        self.update_metadata(idx);

        let (left, right) = {
            let node = unsafe { self.nodes.get(idx) };
            (node.left, node.right)
        };
        let balance = self.height(left) - self.height(right);

        if balance > 1 {
            let l = left.expect("positive balance implies a left child");
            let (ll, lr) = {
                let ln = unsafe { self.nodes.get(l) };
                (ln.left, ln.right)
            };
            if self.height(ll) < self.height(lr) {
                self.rotate_left(l);
            }
            self.rotate_right(idx)
        } else if balance < -1 {
            let r = right.expect("negative balance implies a right child");
            let (rl, rr) = {
                let rn = unsafe { self.nodes.get(r) };
                (rn.left, rn.right)
            };
            if self.height(rr) < self.height(rl) {
                self.rotate_right(r);
            }
            self.rotate_left(idx)
        } else {
            idx
        }
    }

    fn balance_upwards(&mut self, start: Option<usize>) {
        let mut cur = start;
        while let Some(idx) = cur {
            let new_root = self.rebalance_at(idx);
            cur = unsafe { self.nodes.get(new_root) }.parent;
        }
    }

    /// Inserts `data` with the given `own_weight`, returning a stable
    /// handle for later [`Wre::remove`]/[`Wre::get`] calls.
    pub fn put(&mut self, data: T, own_weight: f64) -> usize {
        let mut cur = self.root;
        let mut parent = None;
        let mut which = Which::Root;

        while let Some(idx) = cur {
            parent = Some(idx);
            let existing = unsafe { self.nodes.get(idx) }.data;
            if (self.compare)(&existing, &data) != Ordering::Greater {
                which = Which::Right;
                cur = unsafe { self.nodes.get(idx) }.right;
            } else {
                which = Which::Left;
                cur = unsafe { self.nodes.get(idx) }.left;
            }
        }

        let new_idx = self.nodes.alloc(Node {
            data,
            own_weight,
            subtree_weight: own_weight,
            height: 1,
            left: None,
            right: None,
            parent,
            which,
        });

        match parent {
            None => self.root = Some(new_idx),
            Some(p) => {
                let pnode = unsafe { self.nodes.get_mut(p) };
                match which {
                    Which::Left => pnode.left = Some(new_idx),
                    Which::Right => pnode.right = Some(new_idx),
                    Which::Root => unreachable!(),
                }
            }
        }

        self.len += 1;
        self.balance_upwards(parent);
        new_idx
    }

    pub fn get(&self, handle: usize) -> &T {
        &unsafe { self.nodes.get(handle) }.data
    }

    /// Removes the node at `handle`, returning its data.
    pub fn remove(&mut self, handle: usize) -> T {
        let removed = unsafe { self.nodes.get(handle) }.data;

        let (has_left, has_right) = {
            let node = unsafe { self.nodes.get(handle) };
            (node.left.is_some(), node.right.is_some())
        };

        let physical = if has_left && has_right {
            let mut succ = unsafe { self.nodes.get(handle) }.right.unwrap();
            while let Some(l) = unsafe { self.nodes.get(succ) }.left {
                succ = l;
            }
            let (succ_data, succ_weight) = {
                let s = unsafe { self.nodes.get(succ) };
                (s.data, s.own_weight)
            };
            let h = unsafe { self.nodes.get_mut(handle) };
            h.data = succ_data;
            h.own_weight = succ_weight;
            succ
        } else {
            handle
        };

        self.unlink_and_free(physical);
        self.len -= 1;
        removed
    }

    /// Splices a node with at most one child out of the tree and
    /// rebalances from its former parent up to the root.
    fn unlink_and_free(&mut self, idx: usize) {
        let (child, parent, which) = {
            let node = unsafe { self.nodes.get(idx) };
            (node.left.or(node.right), node.parent, node.which)
        };

        if let Some(c) = child {
            let cnode = unsafe { self.nodes.get_mut(c) };
            cnode.parent = parent;
            cnode.which = which;
        }

        match parent {
            None => self.root = child,
            Some(p) => {
                let pnode = unsafe { self.nodes.get_mut(p) };
                match which {
                    Which::Left => pnode.left = child,
                    Which::Right => pnode.right = child,
                    Which::Root => unreachable!(),
                }
            }
        }

        unsafe { self.nodes.free(idx) };
        self.balance_upwards(parent);
    }

    /// Weighted quantile query: the data of the node at which a `ratio`
    /// fraction (clamped to `[0, 1]`) of total weight lies at or below.
    /// `None` only when the tree is empty.
    pub fn find_weighted(&self, ratio: f64) -> Option<&T> {
        let root = self.root?;
        let total = unsafe { self.nodes.get(root) }.subtree_weight;
        let mut remaining = ratio.clamp(0.0, 1.0) * total;
        let mut idx = root;

        loop {
            let (left, right, own_weight) = {
                let node = unsafe { self.nodes.get(idx) };
                (node.left, node.right, node.own_weight)
            };
            let left_w = self.weight(left);

            if remaining < left_w {
                idx = left.expect("left_w > 0 implies a left child exists");
                continue;
            }
            remaining -= left_w;

            if remaining < own_weight {
                return Some(&unsafe { self.nodes.get(idx) }.data);
            }
            remaining -= own_weight;

            match right {
                Some(r) => idx = r,
                None => return Some(&unsafe { self.nodes.get(idx) }.data),
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn by_key(a: &(i64, u64), b: &(i64, u64)) -> Ordering {
        a.0.cmp(&b.0)
    }

    #[test]
    fn insert_and_inorder_find_weighted_monotone() {
        let mut t: Wre<(i64, u64)> = Wre::new(256, by_key);
        let handles: Vec<_> = (0..50).map(|i| t.put((i, i as u64), 1.0)).collect();
        assert_eq!(t.len(), 50);
        assert_eq!(t.total_weight(), 50.0);

        let low = t.find_weighted(0.0).unwrap().0;
        let high = t.find_weighted(1.0).unwrap().0;
        assert!(low <= high);
        assert_eq!(high, 49);

        for h in handles {
            t.get(h);
        }
    }

    #[test]
    fn remove_preserves_remaining_order_and_balance() {
        let mut t: Wre<(i64, u64)> = Wre::new(256, by_key);
        let handles: Vec<_> = (0..100).map(|i| t.put((i, i as u64), 2.0)).collect();

        for &h in handles.iter().step_by(2) {
            t.remove(h);
        }
        assert_eq!(t.len(), 50);
        assert_eq!(t.total_weight(), 100.0);

        // every height must stay within AVL's O(log n) bound
        let max_reasonable_height = 2 * (t.len() as f64).log2().ceil() as i64 + 2;
        let root = t.root.unwrap();
        assert!(unsafe { t.nodes.get(root) }.height <= max_reasonable_height);
    }

    #[test]
    fn remove_all_then_reinsert() {
        let mut t: Wre<(i64, u64)> = Wre::new(64, by_key);
        let handles: Vec<_> = (0..20).map(|i| t.put((i, i as u64), 1.0)).collect();
        for h in handles {
            t.remove(h);
        }
        assert!(t.is_empty());
        assert_eq!(t.total_weight(), 0.0);

        let h = t.put((7, 700), 5.0);
        assert_eq!(t.get(h).1, 700);
        assert_eq!(t.len(), 1);
    }

    #[test]
    fn size_weighted_quantile_respects_weights() {
        let mut t: Wre<(i64, u64)> = Wre::new(16, by_key);
        // three entries with very different sizes: [100], [1], [100]
        t.put((0, 0), 100.0);
        t.put((1, 1), 1.0);
        t.put((2, 2), 100.0);

        // with ratio near 0, we should land in the smallest-key bucket
        assert_eq!(t.find_weighted(0.0).unwrap().0, 0);
        // with ratio near 1, the largest-key bucket
        assert_eq!(t.find_weighted(1.0).unwrap().0, 2);
        // a ratio targeting just past the first 100 units lands in the
        // middle (weight-1) bucket
        assert_eq!(t.find_weighted(100.5 / 201.0).unwrap().0, 1);
    }
}
