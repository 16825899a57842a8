//! The algorithm contract shared by every storage engine, plus the engine
//! registry used to look engines up by name.
//!
//! A "database" and "the engine's vtable applied to it" collapse into a
//! single object-safe trait ([`Database`]): `create` is the only operation
//! that produces one, and every other operation borrows `&self`/`&mut
//! self`. Cursors are not a separate owned type either — each engine keeps
//! cursor state in its own internal slab and only ever hands callers an
//! opaque [`CursorId`].

pub mod registry;

mod error;

pub use error::{CommandError, Unimplemented};
pub use registry::{Entry, EngineRegistry};

/// An opaque handle to a cursor owned by a [`Database`] implementation.
///
/// Carries no meaning outside the `Database` that issued it; engines are
/// free to interpret the inner index however they like.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct CursorId(pub u32);

/// The direction a [`Database::snap`] moves a cursor onto a stored entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SnapDirection {
    /// Move to the greatest stored key `<= cursor.key`; if none, the smallest stored key.
    Lower,
    /// Move to the smallest stored key `>= cursor.key`; if none, the largest stored key.
    Higher,
    /// Move to the stored key minimizing `|k - cursor.key|`; ties favor the lower key.
    ClosestLow,
}

/// The uniform contract every storage engine implements.
///
/// Keys are `i64`, payloads are opaque `Vec<u8>`. An engine may leave any
/// operation but `create_cursor`/`destroy_cursor` unimplemented; callers see
/// that as [`Unimplemented`]. `create_db`/`destroy_db` from the original
/// vtable are not trait methods here: construction is a plain `fn() ->
/// Box<dyn Database>` per engine (see [`registry::Entry`]), and destruction
/// is simply dropping the box — `Drop` on an engine's arena frees every
/// remaining payload for free.
pub trait Database {
    /// Create a new cursor positioned at `key`, which need not exist.
    fn create_cursor(&mut self, key: i64) -> CursorId;

    /// Release a cursor. The engine may reuse its slot for a future cursor.
    fn destroy_cursor(&mut self, cursor: CursorId);

    /// Reposition an existing cursor to `key`.
    fn move_cursor(&mut self, _cursor: CursorId, _key: i64) -> Result<(), Unimplemented> {
        Err(Unimplemented)
    }

    /// The key the cursor currently addresses.
    fn key(&self, _cursor: CursorId) -> Result<i64, Unimplemented> {
        Err(Unimplemented)
    }

    /// Whether an entry exists at the cursor's key.
    fn exists(&self, _cursor: CursorId) -> Result<bool, Unimplemented> {
        Err(Unimplemented)
    }

    /// Reposition the cursor onto a stored entry per `dir`. No-op on an empty database.
    fn snap(&mut self, _cursor: CursorId, _dir: SnapDirection) -> Result<(), Unimplemented> {
        Err(Unimplemented)
    }

    /// Install `payload` at the cursor's key, returning the previous payload if any.
    ///
    /// Ownership of `payload` transfers to the database; ownership of the
    /// returned payload transfers to the caller. After return the cursor
    /// addresses the just-written entry.
    fn write(
        &mut self,
        _cursor: CursorId,
        _payload: Vec<u8>,
    ) -> Result<Option<Vec<u8>>, Unimplemented> {
        Err(Unimplemented)
    }

    /// Borrow the stored payload at the cursor's key, if any.
    ///
    /// Valid until the next mutation on this database.
    fn read(&self, _cursor: CursorId) -> Result<Option<&[u8]>, Unimplemented> {
        Err(Unimplemented)
    }

    /// Remove the entry at the cursor's key, returning its payload if any.
    ///
    /// After return `exists` is false, the cursor's addressed key is
    /// unchanged, and `best`-style locality state is restored to a valid
    /// neighbor internally.
    fn remove(&mut self, _cursor: CursorId) -> Result<Option<Vec<u8>>, Unimplemented> {
        Err(Unimplemented)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    /// An engine that implements only cursor lifecycle, to exercise the
    /// default `Unimplemented` methods.
    struct BareEngine {
        next_id: u32,
    }

    impl Database for BareEngine {
        fn create_cursor(&mut self, _key: i64) -> CursorId {
            let id = CursorId(self.next_id);
            self.next_id += 1;
            id
        }

        fn destroy_cursor(&mut self, _cursor: CursorId) {}
    }

    #[test]
    fn unimplemented_operations_report_unimplemented() {
        let mut db = BareEngine { next_id: 0 };
        let cursor = db.create_cursor(5);

        assert_eq!(db.key(cursor), Err(Unimplemented));
        assert_eq!(db.exists(cursor), Err(Unimplemented));
        assert_eq!(db.move_cursor(cursor, 6), Err(Unimplemented));
        assert_eq!(db.snap(cursor, SnapDirection::Higher), Err(Unimplemented));
        assert_eq!(db.read(cursor), Err(Unimplemented));
        assert_eq!(db.write(cursor, vec![1]), Err(Unimplemented));
        assert_eq!(db.remove(cursor), Err(Unimplemented));
    }

    #[test]
    fn cursor_ids_are_distinct_per_engine() {
        let mut db = BareEngine { next_id: 0 };
        let a = db.create_cursor(1);
        let b = db.create_cursor(2);
        assert_ne!(a, b);
    }
}
