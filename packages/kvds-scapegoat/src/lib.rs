//! A scapegoat-balanced binary search tree engine.
//!
//! The hardest engine in this workspace: parent-linked mutation, in-order
//! successor/predecessor navigation, subtree detach/attach with size
//! maintenance, single-rotation un-stranding on deletion, and
//! scapegoat-condition rebuilds. Per the arena-indexing approach used
//! throughout this workspace, the database owns one `Vec<Option<Slot>>`
//! arena plus a `root` index; every parent/child link is an `Option<usize>`
//! rather than a pointer.

mod invariants;

use kvds_core::{CursorId, Database, SnapDirection, Unimplemented};

/// The maximum permitted ratio of a child subtree's size to its parent's.
const SCAPEGOAT_FACTOR: f64 = 10.0 / 16.0;

struct Slot {
    key: i64,
    payload: Vec<u8>,
    left: Option<usize>,
    right: Option<usize>,
    parent: Option<usize>,
    size: u32,
}

struct CursorState {
    key: i64,
    best: Option<usize>,
}

/// Constructs a fresh, empty scapegoat tree database.
pub fn create() -> Box<dyn Database> {
    Box::new(ScapegoatDatabase::new())
}

/// The scapegoat tree database.
pub struct ScapegoatDatabase {
    slots: Vec<Option<Slot>>,
    free_slots: Vec<usize>,
    root: Option<usize>,

    cursors: Vec<Option<CursorState>>,
    free_cursors: Vec<usize>,
}

impl Default for ScapegoatDatabase {
    fn default() -> Self {
        Self::new()
    }
}

impl ScapegoatDatabase {
    /// An empty database.
    pub fn new() -> Self {
        tracing::debug!("creating scapegoat-tree database");
        Self {
            slots: Vec::new(),
            free_slots: Vec::new(),
            root: None,
            cursors: Vec::new(),
            free_cursors: Vec::new(),
        }
    }

    pub(crate) fn slot(&self, idx: usize) -> &Slot {
        self.slots[idx].as_ref().expect("dangling node index")
    }

    fn slot_mut(&mut self, idx: usize) -> &mut Slot {
        self.slots[idx].as_mut().expect("dangling node index")
    }

    pub(crate) fn get_size(&self, idx: Option<usize>) -> u32 {
        idx.map_or(0, |i| self.slot(i).size)
    }

    fn is_left(&self, idx: usize) -> bool {
        match self.slot(idx).parent {
            Some(p) => self.slot(p).left == Some(idx),
            None => false,
        }
    }

    fn alloc_slot(&mut self, slot: Slot) -> usize {
        if let Some(idx) = self.free_slots.pop() {
            self.slots[idx] = Some(slot);
            idx
        } else {
            self.slots.push(Some(slot));
            self.slots.len() - 1
        }
    }

    fn free_slot(&mut self, idx: usize) -> Slot {
        let slot = self.slots[idx].take().expect("double free of node");
        self.free_slots.push(idx);
        slot
    }

    fn cursor(&self, id: CursorId) -> &CursorState {
        self.cursors[id.0 as usize]
            .as_ref()
            .expect("dangling cursor id")
    }

    fn cursor_mut(&mut self, id: CursorId) -> &mut CursorState {
        self.cursors[id.0 as usize]
            .as_mut()
            .expect("dangling cursor id")
    }

    fn alloc_cursor(&mut self, state: CursorState) -> CursorId {
        if let Some(idx) = self.free_cursors.pop() {
            self.cursors[idx] = Some(state);
            CursorId(idx as u32)
        } else {
            self.cursors.push(Some(state));
            CursorId((self.cursors.len() - 1) as u32)
        }
    }

    /// Descend from the root toward `key`, stopping at the node where an
    /// insertion at `key` would attach.
    fn locate(&self, key: i64) -> Option<usize> {
        let mut best = self.root?;
        loop {
            let node = self.slot(best);
            if node.key == key {
                return Some(best);
            }
            let next = if key < node.key { node.left } else { node.right };
            match next {
                Some(n) => best = n,
                None => return Some(best),
            }
        }
    }

    /// §4.4.1 Detach: remove `node` from its parent, optionally walking to
    /// the root to decrement ancestor sizes.
    fn detach(&mut self, idx: usize, update_size: bool) {
        let parent = self.slot(idx).parent;
        match parent {
            None => {
                debug_assert_eq!(self.root, Some(idx));
                self.root = None;
            }
            Some(p) => {
                if self.slot(p).left == Some(idx) {
                    self.slot_mut(p).left = None;
                } else if self.slot(p).right == Some(idx) {
                    self.slot_mut(p).right = None;
                } else {
                    unreachable!("node is not a child of its recorded parent");
                }
            }
        }
        if update_size {
            let size = self.slot(idx).size;
            let mut walk = parent;
            while let Some(p) = walk {
                self.slot_mut(p).size -= size;
                walk = self.slot(p).parent;
            }
        }
        self.slot_mut(idx).parent = None;
    }

    /// §4.4.1 Attach: install `node` as a child of `parent` (or as the root),
    /// optionally walking to the root to increment ancestor sizes.
    fn attach(&mut self, idx: usize, parent: Option<usize>, on_left: bool, update_size: bool) {
        debug_assert!(self.slot(idx).parent.is_none());
        self.slot_mut(idx).parent = parent;
        match parent {
            None => {
                debug_assert!(self.root.is_none());
                self.root = Some(idx);
            }
            Some(p) => {
                if on_left {
                    debug_assert!(self.slot(p).left.is_none());
                    self.slot_mut(p).left = Some(idx);
                } else {
                    debug_assert!(self.slot(p).right.is_none());
                    self.slot_mut(p).right = Some(idx);
                }
            }
        }
        if update_size {
            let size = self.slot(idx).size;
            let mut walk = parent;
            while let Some(p) = walk {
                self.slot_mut(p).size += size;
                walk = self.slot(p).parent;
            }
        }
    }

    /// §4.4.2 In-order predecessor.
    fn navigate_left(&self, idx: usize) -> Option<usize> {
        if let Some(left) = self.slot(idx).left {
            let mut result = left;
            while let Some(r) = self.slot(result).right {
                result = r;
            }
            Some(result)
        } else {
            let mut node = idx;
            while let Some(parent) = self.slot(node).parent {
                if self.slot(parent).right == Some(node) {
                    return Some(parent);
                }
                node = parent;
            }
            None
        }
    }

    /// §4.4.2 In-order successor.
    fn navigate_right(&self, idx: usize) -> Option<usize> {
        if let Some(right) = self.slot(idx).right {
            let mut result = right;
            while let Some(l) = self.slot(result).left {
                result = l;
            }
            Some(result)
        } else {
            let mut node = idx;
            while let Some(parent) = self.slot(node).parent {
                if self.slot(parent).left == Some(node) {
                    return Some(parent);
                }
                node = parent;
            }
            None
        }
    }

    /// §4.4.4 Rotation: exchange `node` with its parent, relocating the
    /// parent's other child and `node`'s middle child so the victim becomes
    /// a single-child node during deletion.
    fn rotate(&mut self, node: usize) -> usize {
        let parent = self.slot(node).parent.expect("rotate requires a parent");
        let is_left = self.slot(parent).left == Some(node);
        let middle = if is_left {
            self.slot(node).right
        } else {
            self.slot(node).left
        };
        let parent_old_loc = self.slot(parent).parent;
        let parent_old_is_left = self.is_left(parent);

        self.detach(parent, true);
        self.detach(node, true);
        if let Some(m) = middle {
            self.detach(m, true);
        }

        self.attach(parent, Some(node), !is_left, true);
        self.attach(node, parent_old_loc, parent_old_is_left, true);
        if let Some(m) = middle {
            self.attach(m, Some(parent), is_left, true);
        }
        node
    }

    fn collect_inorder(&self, idx: usize, out: &mut Vec<usize>) {
        let (left, right) = (self.slot(idx).left, self.slot(idx).right);
        if let Some(l) = left {
            self.collect_inorder(l, out);
        }
        out.push(idx);
        if let Some(r) = right {
            self.collect_inorder(r, out);
        }
    }

    fn reparent(&mut self, nodes: &[usize], parent: Option<usize>) -> Option<usize> {
        if nodes.is_empty() {
            return None;
        }
        let mid = nodes.len() / 2;
        let median = nodes[mid];
        let left = self.reparent(&nodes[..mid], Some(median));
        let right = self.reparent(&nodes[mid + 1..], Some(median));
        let left_size = self.get_size(left);
        let right_size = self.get_size(right);

        let slot = self.slot_mut(median);
        slot.left = left;
        slot.right = right;
        slot.parent = parent;
        slot.size = 1 + left_size + right_size;
        Some(median)
    }

    /// §4.4.5 step 1-4: detach the scapegoat, collect its subtree in-order,
    /// and recursively rebuild a weight-balanced subtree with each range's
    /// middle element as root.
    fn recreate(&mut self, old_root: usize, size: u32) {
        let old_parent = self.slot(old_root).parent;
        let old_parent_is_left = self.is_left(old_root);

        self.detach(old_root, false);

        let mut nodes = Vec::with_capacity(size as usize);
        self.collect_inorder(old_root, &mut nodes);
        debug_assert_eq!(nodes.len(), size as usize);

        let new_root = self
            .reparent(&nodes, None)
            .expect("non-empty subtree reparents to something");

        self.attach(new_root, old_parent, old_parent_is_left, false);
    }

    /// §4.4.5: walk from `node` to the root, recording the highest ancestor
    /// whose weight bound fails, and rebuild it if one was found.
    fn rebalance_from(&mut self, node: Option<usize>) {
        let mut to_recreate = None;
        let mut walk = node;
        while let Some(idx) = walk {
            let left_size = self.get_size(self.slot(idx).left);
            let right_size = self.get_size(self.slot(idx).right);
            let node_size = self.slot(idx).size;

            if (left_size as f64) > (node_size as f64) * SCAPEGOAT_FACTOR
                || (right_size as f64) > (node_size as f64) * SCAPEGOAT_FACTOR
            {
                to_recreate = Some(idx);
            }
            walk = self.slot(idx).parent;
        }
        if let Some(idx) = to_recreate {
            let size = self.slot(idx).size;
            self.recreate(idx, size);
        }
    }
}

impl Database for ScapegoatDatabase {
    fn create_cursor(&mut self, key: i64) -> CursorId {
        let best = self.locate(key);
        self.alloc_cursor(CursorState { key, best })
    }

    fn destroy_cursor(&mut self, cursor: CursorId) {
        let idx = cursor.0 as usize;
        self.cursors[idx] = None;
        self.free_cursors.push(idx);
    }

    fn move_cursor(&mut self, cursor: CursorId, key: i64) -> Result<(), Unimplemented> {
        let best = self.locate(key);
        let state = self.cursor_mut(cursor);
        state.key = key;
        state.best = best;
        Ok(())
    }

    fn key(&self, cursor: CursorId) -> Result<i64, Unimplemented> {
        Ok(self.cursor(cursor).key)
    }

    fn exists(&self, cursor: CursorId) -> Result<bool, Unimplemented> {
        let state = self.cursor(cursor);
        Ok(state.best.is_some_and(|idx| self.slot(idx).key == state.key))
    }

    fn snap(&mut self, cursor: CursorId, dir: SnapDirection) -> Result<(), Unimplemented> {
        let Some(best) = self.cursor(cursor).best else {
            return Ok(());
        };
        let cursor_key = self.cursor(cursor).key;

        let new_best = match dir {
            SnapDirection::Higher => {
                if self.slot(best).key <= cursor_key {
                    self.navigate_right(best).unwrap_or(best)
                } else {
                    best
                }
            }
            SnapDirection::Lower => {
                if cursor_key <= self.slot(best).key {
                    self.navigate_left(best).unwrap_or(best)
                } else {
                    best
                }
            }
            SnapDirection::ClosestLow => {
                if self.slot(best).key == cursor_key {
                    best
                } else {
                    let (left, right) = if cursor_key < self.slot(best).key {
                        (self.navigate_left(best), Some(best))
                    } else {
                        (Some(best), self.navigate_right(best))
                    };
                    match (left, right) {
                        (Some(l), Some(r)) => {
                            // Widen to i128 so the distance comparison can't
                            // overflow for keys near opposite ends of the range.
                            let to_left = i128::from(cursor_key) - i128::from(self.slot(l).key);
                            let to_right = i128::from(self.slot(r).key) - i128::from(cursor_key);
                            if to_left <= to_right {
                                l
                            } else {
                                r
                            }
                        }
                        _ => best,
                    }
                }
            }
        };

        let state = self.cursor_mut(cursor);
        state.best = Some(new_best);
        state.key = self.slot(new_best).key;
        Ok(())
    }

    fn write(
        &mut self,
        cursor: CursorId,
        payload: Vec<u8>,
    ) -> Result<Option<Vec<u8>>, Unimplemented> {
        let state_key = self.cursor(cursor).key;
        let best = self.cursor(cursor).best;

        if let Some(idx) = best {
            if self.slot(idx).key == state_key {
                let old = std::mem::replace(&mut self.slot_mut(idx).payload, payload);
                return Ok(Some(old));
            }
        }

        let on_left = best.is_some_and(|idx| state_key < self.slot(idx).key);
        let new_idx = self.alloc_slot(Slot {
            key: state_key,
            payload,
            left: None,
            right: None,
            parent: None,
            size: 1,
        });
        self.attach(new_idx, best, on_left, true);
        self.rebalance_from(Some(new_idx));

        self.cursor_mut(cursor).best = Some(new_idx);
        invariants::assert_invariants(self);
        Ok(None)
    }

    fn read(&self, cursor: CursorId) -> Result<Option<&[u8]>, Unimplemented> {
        let state = self.cursor(cursor);
        match state.best {
            Some(idx) if self.slot(idx).key == state.key => Ok(Some(&self.slot(idx).payload)),
            _ => Ok(None),
        }
    }

    fn remove(&mut self, cursor: CursorId) -> Result<Option<Vec<u8>>, Unimplemented> {
        let state = self.cursor(cursor);
        let Some(node) = state.best else {
            return Ok(None);
        };
        if self.slot(node).key != state.key {
            return Ok(None);
        }
        let cursor_key = state.key;

        let left = self.slot(node).left;
        let right = self.slot(node).right;

        let swap_node = if left.is_none() && right.is_none() {
            None
        } else if self.get_size(right) > self.get_size(left) {
            let mut s = right.expect("right is heavier, so it must exist");
            while let Some(l) = self.slot(s).left {
                s = l;
            }
            if let Some(r) = self.slot(s).right {
                self.rotate(r);
            }
            Some(s)
        } else {
            let mut s = left.expect("left is heavier or equal, so it must exist");
            while let Some(r) = self.slot(s).right {
                s = r;
            }
            if let Some(l) = self.slot(s).left {
                self.rotate(l);
            }
            Some(s)
        };

        let old_parent = self.slot(node).parent;
        let old_was_left = self.is_left(node);

        self.detach(node, true);

        let rebalance_from = if let Some(swap_idx) = swap_node {
            let node_left = self.slot(node).left;
            let node_right = self.slot(node).right;
            if let Some(nl) = node_left {
                self.detach(nl, true);
            }
            if let Some(nr) = node_right {
                self.detach(nr, true);
            }

            let rebalance_from = if node_left != Some(swap_idx) && node_right != Some(swap_idx) {
                let parent_of_swap = self.slot(swap_idx).parent;
                self.detach(swap_idx, true);
                parent_of_swap
            } else {
                Some(swap_idx)
            };

            if node_left != Some(swap_idx) {
                if let Some(nl) = node_left {
                    self.attach(nl, Some(swap_idx), true, true);
                }
            }
            if node_right != Some(swap_idx) {
                if let Some(nr) = node_right {
                    self.attach(nr, Some(swap_idx), false, true);
                }
            }
            self.attach(swap_idx, old_parent, old_was_left, true);

            rebalance_from
        } else {
            old_parent
        };

        self.rebalance_from(rebalance_from);

        let removed = self.free_slot(node);
        self.cursor_mut(cursor).best = self.locate(cursor_key);

        invariants::assert_invariants(self);
        Ok(Some(removed.payload))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn empty_database_reports_nothing() {
        let mut db = ScapegoatDatabase::new();
        let cursor = db.create_cursor(42);
        assert_eq!(db.exists(cursor), Ok(false));
        assert_eq!(db.read(cursor), Ok(None));
        assert_eq!(db.remove(cursor), Ok(None));
        assert_eq!(db.snap(cursor, SnapDirection::Higher), Ok(()));
    }

    #[test]
    fn write_read_round_trip() {
        let mut db = ScapegoatDatabase::new();
        let cursor = db.create_cursor(5);
        assert_eq!(db.write(cursor, b"hello".to_vec()), Ok(None));
        assert_eq!(db.exists(cursor), Ok(true));
        assert_eq!(db.read(cursor), Ok(Some(&b"hello"[..])));
    }

    #[test]
    fn write_overwrite_returns_previous() {
        let mut db = ScapegoatDatabase::new();
        let cursor = db.create_cursor(5);
        db.write(cursor, b"first".to_vec()).unwrap();
        let old = db.write(cursor, b"second".to_vec()).unwrap();
        assert_eq!(old, Some(b"first".to_vec()));
    }

    #[test]
    fn remove_inverts_write() {
        let mut db = ScapegoatDatabase::new();
        let cursor = db.create_cursor(5);
        db.write(cursor, b"hello".to_vec()).unwrap();
        let removed = db.remove(cursor).unwrap();
        assert_eq!(removed, Some(b"hello".to_vec()));
        assert_eq!(db.exists(cursor), Ok(false));
    }

    #[test]
    fn snap_visits_every_key_in_increasing_order() {
        let mut db = ScapegoatDatabase::new();
        for key in [10, 30, 20, 5, 25] {
            let cursor = db.create_cursor(key);
            db.write(cursor, vec![]).unwrap();
            db.destroy_cursor(cursor);
        }

        let cursor = db.create_cursor(i64::MIN);
        db.snap(cursor, SnapDirection::Higher).unwrap();
        let mut seen = Vec::new();
        loop {
            seen.push(db.key(cursor).unwrap());
            let before = db.key(cursor).unwrap();
            db.snap(cursor, SnapDirection::Higher).unwrap();
            if db.key(cursor).unwrap() == before {
                break;
            }
        }
        assert_eq!(seen, vec![5, 10, 20, 25, 30]);
    }

    #[test]
    fn concrete_scenario_c() {
        let mut db = ScapegoatDatabase::new();
        for (key, payload) in [(10, "a"), (20, "b"), (30, "c")] {
            let cursor = db.create_cursor(key);
            db.write(cursor, payload.as_bytes().to_vec()).unwrap();
            db.destroy_cursor(cursor);
        }

        let cursor = db.create_cursor(15);
        db.snap(cursor, SnapDirection::Higher).unwrap();
        assert_eq!(db.key(cursor), Ok(20));

        db.move_cursor(cursor, 15).unwrap();
        db.snap(cursor, SnapDirection::Lower).unwrap();
        assert_eq!(db.key(cursor), Ok(10));

        db.move_cursor(cursor, 15).unwrap();
        db.snap(cursor, SnapDirection::ClosestLow).unwrap();
        assert_eq!(db.key(cursor), Ok(10));
    }

    proptest! {
        #[test]
        fn insert_and_remove_preserve_the_weight_bound(
            keys in prop::collection::vec(-500i64..500, 1..400)
        ) {
            let mut db = ScapegoatDatabase::new();
            let mut inserted = Vec::new();
            for key in keys {
                let cursor = db.create_cursor(key);
                db.write(cursor, vec![]).unwrap();
                db.destroy_cursor(cursor);
                inserted.push(key);
                invariants::assert_invariants(&db);
            }
            for key in inserted {
                let cursor = db.create_cursor(key);
                db.remove(cursor).ok();
                db.destroy_cursor(cursor);
                invariants::assert_invariants(&db);
            }
        }
    }

    #[test]
    fn ten_thousand_random_inserts_then_removes_hold_the_invariant() {
        use std::collections::hash_map::DefaultHasher;
        use std::hash::{Hash, Hasher};

        fn shuffle(values: &mut [i64], seed: u64) {
            let mut state = seed;
            for i in (1..values.len()).rev() {
                let mut hasher = DefaultHasher::new();
                state.hash(&mut hasher);
                state = hasher.finish();
                let j = (state as usize) % (i + 1);
                values.swap(i, j);
            }
        }

        let mut keys: Vec<i64> = (0..10_000).collect();
        shuffle(&mut keys, 0x5EED_5EED);

        let mut db = ScapegoatDatabase::new();
        for &key in &keys {
            let cursor = db.create_cursor(key);
            db.write(cursor, vec![]).unwrap();
            db.destroy_cursor(cursor);
        }
        invariants::assert_invariants(&db);

        let mut removal_order = keys.clone();
        shuffle(&mut removal_order, 0xC0FF_EE00);
        for key in removal_order {
            let cursor = db.create_cursor(key);
            let removed = db.remove(cursor).unwrap();
            assert!(removed.is_some());
            db.destroy_cursor(cursor);
        }
        invariants::assert_invariants(&db);
        assert_eq!(db.root, None);
    }
}
