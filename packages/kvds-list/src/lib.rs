//! A sorted doubly linked list engine.
//!
//! Exists to be trivially, visibly correct: an O(N)-per-operation oracle the
//! comparator engine can check the scapegoat tree against. The database owns
//! a single arena of [`Node`]s; `head`/`tail` and every `prev`/`next` are
//! `Option<usize>` indices into it rather than pointers, per the
//! arena-indexing approach used throughout this workspace. Freed slots are
//! recycled through a free list so repeated write/remove doesn't grow the
//! arena unboundedly.

use kvds_core::{CursorId, Database, SnapDirection, Unimplemented};

struct Node {
    key: i64,
    payload: Vec<u8>,
    prev: Option<usize>,
    next: Option<usize>,
}

struct CursorState {
    key: i64,
    best: Option<usize>,
}

/// Constructs a fresh, empty list database.
pub fn create() -> Box<dyn Database> {
    Box::new(ListDatabase::new())
}

/// The sorted doubly linked list database.
pub struct ListDatabase {
    nodes: Vec<Option<Node>>,
    free_nodes: Vec<usize>,
    head: Option<usize>,
    tail: Option<usize>,

    cursors: Vec<Option<CursorState>>,
    free_cursors: Vec<usize>,
}

impl ListDatabase {
    /// An empty database.
    pub fn new() -> Self {
        tracing::debug!("creating sorted-list database");
        Self {
            nodes: Vec::new(),
            free_nodes: Vec::new(),
            head: None,
            tail: None,
            cursors: Vec::new(),
            free_cursors: Vec::new(),
        }
    }

    fn node(&self, idx: usize) -> &Node {
        self.nodes[idx].as_ref().expect("dangling node index")
    }

    fn node_mut(&mut self, idx: usize) -> &mut Node {
        self.nodes[idx].as_mut().expect("dangling node index")
    }

    fn alloc_node(&mut self, node: Node) -> usize {
        if let Some(idx) = self.free_nodes.pop() {
            self.nodes[idx] = Some(node);
            idx
        } else {
            self.nodes.push(Some(node));
            self.nodes.len() - 1
        }
    }

    fn free_node(&mut self, idx: usize) -> Node {
        let node = self.nodes[idx].take().expect("double free of node");
        self.free_nodes.push(idx);
        node
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

    /// Starting from `anchor` (or the nearer endpoint, if none), walk toward
    /// `key` and return the node closest to it, clamped to `head`/`tail`.
    fn locate(&self, anchor: Option<usize>, key: i64) -> Option<usize> {
        let mut node = match anchor {
            Some(n) => n,
            None => {
                let head = self.head?;
                let tail = self.tail?;
                if self.node(tail).key.wrapping_sub(key) < key.wrapping_sub(self.node(head).key) {
                    tail
                } else {
                    head
                }
            }
        };

        if self.node(node).key > key {
            loop {
                match self.node(node).prev {
                    Some(prev) if self.node(prev).key > key => node = prev,
                    Some(prev) => return Some(prev),
                    None => return self.head,
                }
            }
        } else if self.node(node).key < key {
            loop {
                match self.node(node).next {
                    Some(next) if self.node(next).key < key => node = next,
                    Some(next) => return Some(next),
                    None => return self.tail,
                }
            }
        } else {
            Some(node)
        }
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

    #[cfg(debug_assertions)]
    fn assert_invariants(&self) {
        let mut prev = None;
        let mut node = self.head;
        while let Some(idx) = node {
            assert_eq!(self.node(idx).prev, prev, "prev/next disagree");
            if let Some(prev_idx) = prev {
                assert!(self.node(idx).key > self.node(prev_idx).key, "keys out of order");
            }
            prev = node;
            node = self.node(idx).next;
        }
        assert_eq!(self.tail, prev, "tail does not match walked end");
    }

    #[cfg(not(debug_assertions))]
    fn assert_invariants(&self) {}
}

impl Default for ListDatabase {
    fn default() -> Self {
        Self::new()
    }
}

impl Database for ListDatabase {
    fn create_cursor(&mut self, key: i64) -> CursorId {
        let best = self.locate(None, key);
        self.alloc_cursor(CursorState { key, best })
    }

    fn destroy_cursor(&mut self, cursor: CursorId) {
        let idx = cursor.0 as usize;
        self.cursors[idx] = None;
        self.free_cursors.push(idx);
    }

    fn move_cursor(&mut self, cursor: CursorId, key: i64) -> Result<(), Unimplemented> {
        let anchor = self.cursor(cursor).best;
        let best = self.locate(anchor, key);
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
        Ok(state.best.is_some_and(|idx| self.node(idx).key == state.key))
    }

    fn snap(&mut self, cursor: CursorId, dir: SnapDirection) -> Result<(), Unimplemented> {
        let Some(best) = self.cursor(cursor).best else {
            return Ok(());
        };
        let cursor_key = self.cursor(cursor).key;

        let new_best = match dir {
            SnapDirection::ClosestLow => {
                if self.node(best).key == cursor_key {
                    best
                } else {
                    let (left, right) = if cursor_key < self.node(best).key {
                        (self.node(best).prev, Some(best))
                    } else {
                        (Some(best), self.node(best).next)
                    };
                    match (left, right) {
                        (Some(l), Some(r)) => {
                            // Widen to i128: the plain i64 distances can overflow
                            // when the stored keys sit near opposite ends of the
                            // range, and this comparison must be exact, unlike
                            // `locate`'s harmless-wraparound heuristic above.
                            let to_left = i128::from(cursor_key) - i128::from(self.node(l).key);
                            let to_right = i128::from(self.node(r).key) - i128::from(cursor_key);
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
            SnapDirection::Higher => {
                if cursor_key >= self.node(best).key {
                    self.node(best).next.unwrap_or(best)
                } else {
                    best
                }
            }
            SnapDirection::Lower => {
                if cursor_key <= self.node(best).key {
                    self.node(best).prev.unwrap_or(best)
                } else {
                    best
                }
            }
        };

        let state = self.cursor_mut(cursor);
        state.best = Some(new_best);
        state.key = self.node(new_best).key;
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
            if self.node(idx).key == state_key {
                let old = std::mem::replace(&mut self.node_mut(idx).payload, payload);
                return Ok(Some(old));
            }
        }

        let new_idx = match best {
            None => {
                let idx = self.alloc_node(Node {
                    key: state_key,
                    payload,
                    prev: None,
                    next: None,
                });
                self.head = Some(idx);
                self.tail = Some(idx);
                idx
            }
            Some(anchor) => {
                let (prev, next) = if self.node(anchor).key < state_key {
                    (Some(anchor), self.node(anchor).next)
                } else {
                    (self.node(anchor).prev, Some(anchor))
                };

                let idx = self.alloc_node(Node {
                    key: state_key,
                    payload,
                    prev,
                    next,
                });

                match next {
                    Some(n) => self.node_mut(n).prev = Some(idx),
                    None => self.tail = Some(idx),
                }
                match prev {
                    Some(p) => self.node_mut(p).next = Some(idx),
                    None => self.head = Some(idx),
                }
                idx
            }
        };

        self.cursor_mut(cursor).best = Some(new_idx);
        self.assert_invariants();
        Ok(None)
    }

    fn read(&self, cursor: CursorId) -> Result<Option<&[u8]>, Unimplemented> {
        let state = self.cursor(cursor);
        match state.best {
            Some(idx) if self.node(idx).key == state.key => Ok(Some(&self.node(idx).payload)),
            _ => Ok(None),
        }
    }

    fn remove(&mut self, cursor: CursorId) -> Result<Option<Vec<u8>>, Unimplemented> {
        let state = self.cursor(cursor);
        let Some(idx) = state.best else {
            return Ok(None);
        };
        if self.node(idx).key != state.key {
            return Ok(None);
        }

        let old_next = self.node(idx).next;
        let old_prev = self.node(idx).prev;

        match old_next {
            Some(n) => self.node_mut(n).prev = old_prev,
            None => self.tail = old_prev,
        }
        match old_prev {
            Some(p) => self.node_mut(p).next = old_next,
            None => self.head = old_next,
        }

        let removed = self.free_node(idx);
        self.cursor_mut(cursor).best = old_next.or(old_prev);

        self.assert_invariants();
        Ok(Some(removed.payload))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn empty_database_reports_nothing() {
        let mut db = ListDatabase::new();
        let cursor = db.create_cursor(42);
        assert_eq!(db.exists(cursor), Ok(false));
        assert_eq!(db.read(cursor), Ok(None));
        assert_eq!(db.remove(cursor), Ok(None));
        assert_eq!(db.snap(cursor, SnapDirection::Higher), Ok(()));
    }

    #[test]
    fn write_read_round_trip() {
        let mut db = ListDatabase::new();
        let cursor = db.create_cursor(5);
        assert_eq!(db.write(cursor, b"hello".to_vec()), Ok(None));
        assert_eq!(db.exists(cursor), Ok(true));
        assert_eq!(db.read(cursor), Ok(Some(&b"hello"[..])));
    }

    #[test]
    fn write_overwrite_returns_previous() {
        let mut db = ListDatabase::new();
        let cursor = db.create_cursor(5);
        db.write(cursor, b"first".to_vec()).unwrap();
        let old = db.write(cursor, b"second".to_vec()).unwrap();
        assert_eq!(old, Some(b"first".to_vec()));
        assert_eq!(db.read(cursor), Ok(Some(&b"second"[..])));
    }

    #[test]
    fn remove_inverts_write() {
        let mut db = ListDatabase::new();
        let cursor = db.create_cursor(5);
        db.write(cursor, b"hello".to_vec()).unwrap();
        let removed = db.remove(cursor).unwrap();
        assert_eq!(removed, Some(b"hello".to_vec()));
        assert_eq!(db.exists(cursor), Ok(false));
    }

    #[test]
    fn snap_visits_every_key_in_order() {
        let mut db = ListDatabase::new();
        for key in [30, 10, 20] {
            let cursor = db.create_cursor(key);
            db.write(cursor, key.to_string().into_bytes()).unwrap();
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
        assert_eq!(seen, vec![10, 20, 30]);
    }

    #[test]
    fn snap_closest_low_ties_toward_lower_key() {
        let mut db = ListDatabase::new();
        for key in [10, 20] {
            let cursor = db.create_cursor(key);
            db.write(cursor, vec![]).unwrap();
            db.destroy_cursor(cursor);
        }
        let cursor = db.create_cursor(15);
        db.snap(cursor, SnapDirection::ClosestLow).unwrap();
        assert_eq!(db.key(cursor), Ok(10));
    }

    #[test]
    fn concrete_scenario_a() {
        let mut db = ListDatabase::new();
        let cursor = db.create_cursor(5);
        db.write(cursor, b"hello".to_vec()).unwrap();
        assert_eq!(db.key(cursor), Ok(5));
        assert_eq!(db.read(cursor), Ok(Some(&b"hello"[..])));
        assert_eq!(db.exists(cursor), Ok(true));
    }

    proptest! {
        #[test]
        fn write_then_remove_every_key_leaves_the_list_empty_and_ordered(
            keys in prop::collection::vec(-500i64..500, 0..200)
        ) {
            let mut db = ListDatabase::new();
            let mut distinct: Vec<i64> = Vec::new();
            for key in keys {
                let cursor = db.create_cursor(key);
                let previous = db.write(cursor, key.to_string().into_bytes()).unwrap();
                if previous.is_none() {
                    distinct.push(key);
                }
                db.destroy_cursor(cursor);
            }
            distinct.sort_unstable();

            // Ordering property: repeated `snap Higher` from below everything
            // visits every stored key in strictly increasing order exactly once.
            let walker = db.create_cursor(i64::MIN);
            let mut seen = Vec::with_capacity(distinct.len());
            if !distinct.is_empty() {
                db.snap(walker, SnapDirection::Higher).unwrap();
                loop {
                    seen.push(db.key(walker).unwrap());
                    let before = db.key(walker).unwrap();
                    db.snap(walker, SnapDirection::Higher).unwrap();
                    if db.key(walker).unwrap() == before {
                        break;
                    }
                }
            }
            db.destroy_cursor(walker);
            prop_assert_eq!(&seen, &distinct);

            for key in distinct {
                let cursor = db.create_cursor(key);
                let removed = db.remove(cursor).unwrap();
                prop_assert_eq!(removed, Some(key.to_string().into_bytes()));
                db.destroy_cursor(cursor);
            }
            prop_assert!(db.head.is_none());
            prop_assert!(db.tail.is_none());
        }
    }
}
