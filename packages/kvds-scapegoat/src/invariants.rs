//! Debug-only recursive invariant check (spec §4.4.7 in the design notes):
//! BST order, size bookkeeping, and the scapegoat weight bound at every
//! node. A failure panics — these are catastrophic by construction, not a
//! recoverable condition.

use super::ScapegoatDatabase;

struct Range {
    min: i64,
    max: i64,
}

#[cfg(debug_assertions)]
pub(super) fn assert_invariants(db: &ScapegoatDatabase) {
    if let Some(root) = db.root {
        assert!(db.slot(root).parent.is_none(), "root has a parent");
        check(db, root);
    }
}

#[cfg(not(debug_assertions))]
pub(super) fn assert_invariants(_db: &ScapegoatDatabase) {}

#[cfg(debug_assertions)]
fn check(db: &ScapegoatDatabase, idx: usize) -> Range {
    let node = db.slot(idx);
    let (left, right) = (node.left, node.right);

    let min = match left {
        None => node.key,
        Some(l) => {
            assert_eq!(db.slot(l).parent, Some(idx), "left child's parent link disagrees");
            let range = check(db, l);
            assert!(range.max < node.key, "left subtree out of order");
            range.min
        }
    };
    let max = match right {
        None => node.key,
        Some(r) => {
            assert_eq!(db.slot(r).parent, Some(idx), "right child's parent link disagrees");
            let range = check(db, r);
            assert!(node.key < range.min, "right subtree out of order");
            range.max
        }
    };

    let left_size = db.get_size(left);
    let right_size = db.get_size(right);
    let node = db.slot(idx);
    assert_eq!(node.size, 1 + left_size + right_size, "size bookkeeping drifted");
    assert!(
        (left_size as f64) <= (node.size as f64) * super::SCAPEGOAT_FACTOR,
        "left subtree exceeds the scapegoat weight bound"
    );
    assert!(
        (right_size as f64) <= (node.size as f64) * super::SCAPEGOAT_FACTOR,
        "right subtree exceeds the scapegoat weight bound"
    );

    Range { min, max }
}
