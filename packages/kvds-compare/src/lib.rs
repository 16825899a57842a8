//! The invariant-comparing multiplexer engine.
//!
//! On construction, enumerates [`EngineRegistry::global`], drops aliases of
//! an already-seen algorithm and its own entry, and instantiates one
//! database per remaining peer. Every operation then fans out to each peer
//! in that order and asserts the results agree — a mismatch is a fatal
//! invariant violation between two engines that both claim to implement the
//! same contract.

use std::fmt::Debug;
use std::rc::Rc;

use kvds_core::{CursorId, Database, EngineRegistry, SnapDirection, Unimplemented};

/// Constructs a comparator database over every other engine in the global registry.
///
/// # Panics
/// Panics if [`EngineRegistry::install`] was never called.
pub fn create() -> Box<dyn Database> {
    Box::new(ComparatorDatabase::new())
}

struct CursorState {
    per_peer: Vec<CursorId>,
}

/// The comparator database: one real database per peer engine.
pub struct ComparatorDatabase {
    peers: Vec<Box<dyn Database>>,
    /// Every payload ever handed to `write`, insertion-sequenced. Mirrors
    /// the original's single shared allocation handed to every peer; here
    /// each peer still gets its own owned `Vec<u8>` copy (the `Database`
    /// contract takes payloads by value), so this slab exists to keep one
    /// canonical `Rc<[u8]>` per write rather than reallocating per peer.
    payload_slab: Vec<Rc<[u8]>>,

    cursors: Vec<Option<CursorState>>,
    free_cursors: Vec<usize>,
}

impl Default for ComparatorDatabase {
    fn default() -> Self {
        Self::new()
    }
}

impl ComparatorDatabase {
    /// Builds the peer set from the global registry and creates one database per peer.
    pub fn new() -> Self {
        let registry = EngineRegistry::global();
        let mut peers: Vec<Box<dyn Database>> = Vec::new();
        let mut last_create: Option<fn() -> Box<dyn Database>> = None;

        for entry in registry.iter() {
            if last_create == Some(entry.create) {
                continue; // another name for the algorithm we just added
            }
            last_create = Some(entry.create);

            if entry.create == (create as fn() -> Box<dyn Database>) {
                continue; // never recurse into ourselves
            }
            peers.push((entry.create)());
        }

        tracing::debug!(peer_count = peers.len(), "creating comparator database");
        Self {
            peers,
            payload_slab: Vec::new(),
            cursors: Vec::new(),
            free_cursors: Vec::new(),
        }
    }

    fn cursor_state(&self, id: CursorId) -> &CursorState {
        self.cursors[id.0 as usize]
            .as_ref()
            .expect("dangling cursor id")
    }

    fn cursor_state_mut(&mut self, id: CursorId) -> &mut CursorState {
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
}

/// Asserts every element of `results` equals the first, panicking (after
/// logging) on the first disagreement. Mismatch here means two engines that
/// both claim to implement the algorithm contract disagree about its
/// semantics — a bug in one of them, never a user error.
fn assert_peers_agree<T: PartialEq + Debug>(operation: &str, results: &[T]) {
    let Some(first) = results.first() else {
        return;
    };
    for (i, result) in results.iter().enumerate().skip(1) {
        if result != first {
            tracing::error!(
                operation,
                peer = i,
                expected = ?first,
                actual = ?result,
                "comparator engines disagree"
            );
            panic!("comparator: peers disagree on `{operation}`: peer 0 = {first:?}, peer {i} = {result:?}");
        }
    }
}

impl Database for ComparatorDatabase {
    fn create_cursor(&mut self, key: i64) -> CursorId {
        let per_peer = self
            .peers
            .iter_mut()
            .map(|peer| peer.create_cursor(key))
            .collect();
        self.alloc_cursor(CursorState { per_peer })
    }

    fn destroy_cursor(&mut self, cursor: CursorId) {
        let idx = cursor.0 as usize;
        let state = self.cursors[idx].take().expect("dangling cursor id");
        for (peer, id) in self.peers.iter_mut().zip(state.per_peer) {
            peer.destroy_cursor(id);
        }
        self.free_cursors.push(idx);
    }

    fn move_cursor(&mut self, cursor: CursorId, key: i64) -> Result<(), Unimplemented> {
        let mut per_peer = std::mem::take(&mut self.cursor_state_mut(cursor).per_peer);
        for (peer, id) in self.peers.iter_mut().zip(per_peer.iter_mut()) {
            match peer.move_cursor(*id, key) {
                Ok(()) => {}
                Err(Unimplemented) => {
                    peer.destroy_cursor(*id);
                    *id = peer.create_cursor(key);
                }
            }
        }
        self.cursor_state_mut(cursor).per_peer = per_peer;
        Ok(())
    }

    fn key(&self, cursor: CursorId) -> Result<i64, Unimplemented> {
        let state = self.cursor_state(cursor);
        let mut results = Vec::with_capacity(self.peers.len());
        for (peer, id) in self.peers.iter().zip(&state.per_peer) {
            results.push(peer.key(*id)?);
        }
        assert_peers_agree("key", &results);
        Ok(*results.last().expect("comparator has at least one peer"))
    }

    fn exists(&self, cursor: CursorId) -> Result<bool, Unimplemented> {
        let state = self.cursor_state(cursor);
        let mut results = Vec::with_capacity(self.peers.len());
        for (peer, id) in self.peers.iter().zip(&state.per_peer) {
            results.push(peer.exists(*id)?);
        }
        assert_peers_agree("exists", &results);
        Ok(*results.last().expect("comparator has at least one peer"))
    }

    fn snap(&mut self, cursor: CursorId, dir: SnapDirection) -> Result<(), Unimplemented> {
        let per_peer = self.cursor_state(cursor).per_peer.clone();
        let mut keys_after = Vec::with_capacity(self.peers.len());
        for (peer, id) in self.peers.iter_mut().zip(&per_peer) {
            peer.snap(*id, dir)?;
            keys_after.push(peer.key(*id)?);
        }
        assert_peers_agree("snap", &keys_after);
        Ok(())
    }

    fn write(
        &mut self,
        cursor: CursorId,
        payload: Vec<u8>,
    ) -> Result<Option<Vec<u8>>, Unimplemented> {
        let shared: Rc<[u8]> = payload.into();
        self.payload_slab.push(shared.clone());

        let per_peer = self.cursor_state(cursor).per_peer.clone();
        let mut results = Vec::with_capacity(self.peers.len());
        for (peer, id) in self.peers.iter_mut().zip(&per_peer) {
            results.push(peer.write(*id, shared.to_vec())?);
        }
        assert_peers_agree("write", &results);
        Ok(results.pop().expect("comparator has at least one peer"))
    }

    fn read(&self, cursor: CursorId) -> Result<Option<&[u8]>, Unimplemented> {
        let state = self.cursor_state(cursor);
        let mut results = Vec::with_capacity(self.peers.len());
        for (peer, id) in self.peers.iter().zip(&state.per_peer) {
            results.push(peer.read(*id)?);
        }
        assert_peers_agree("read", &results);
        Ok(results.pop().expect("comparator has at least one peer"))
    }

    fn remove(&mut self, cursor: CursorId) -> Result<Option<Vec<u8>>, Unimplemented> {
        let per_peer = self.cursor_state(cursor).per_peer.clone();
        let mut results = Vec::with_capacity(self.peers.len());
        for (peer, id) in self.peers.iter_mut().zip(&per_peer) {
            results.push(peer.remove(*id)?);
        }
        assert_peers_agree("remove", &results);
        Ok(results.pop().expect("comparator has at least one peer"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use kvds_core::EngineRegistry;
    use std::sync::Once;

    static INIT: Once = Once::new();

    fn install_registry_once() {
        INIT.call_once(|| {
            let mut registry = EngineRegistry::new();
            registry.register(
                "scapegoat",
                "scg",
                "Store entries in a scapegoat-balanced binary search tree.",
                kvds_scapegoat::create,
            );
            registry.register(
                "linkedlist",
                "lst",
                "Store entries in a sorted doubly-linked list",
                kvds_list::create,
            );
            registry.register("compare", "inv", "Cross-check every other engine.", create);
            registry.install();
        });
    }

    #[test]
    fn comparator_excludes_itself_from_its_peers() {
        install_registry_once();
        let db = ComparatorDatabase::new();
        assert_eq!(db.peers.len(), 2);
    }

    #[test]
    fn write_read_round_trip_agrees_across_peers() {
        install_registry_once();
        let mut db = ComparatorDatabase::new();
        let cursor = db.create_cursor(5);
        assert_eq!(db.write(cursor, b"hello".to_vec()), Ok(None));
        assert_eq!(db.read(cursor), Ok(Some(&b"hello"[..])));
        assert_eq!(db.exists(cursor), Ok(true));
    }

    #[test]
    fn remove_agrees_across_peers() {
        install_registry_once();
        let mut db = ComparatorDatabase::new();
        let cursor = db.create_cursor(5);
        db.write(cursor, b"hello".to_vec()).unwrap();
        assert_eq!(db.remove(cursor), Ok(Some(b"hello".to_vec())));
        assert_eq!(db.exists(cursor), Ok(false));
    }

    #[test]
    fn snap_agrees_across_peers_for_a_spread_of_keys() {
        install_registry_once();
        let mut db = ComparatorDatabase::new();
        for key in [10, 30, 20] {
            let cursor = db.create_cursor(key);
            db.write(cursor, vec![]).unwrap();
            db.destroy_cursor(cursor);
        }
        let cursor = db.create_cursor(15);
        db.snap(cursor, SnapDirection::Higher).unwrap();
        assert_eq!(db.key(cursor), Ok(20));
    }
}
