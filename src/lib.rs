//! Nested-set (modified preorder tree traversal) trees stored in SQLite.
//!
//! Each node of the tree is one row carrying a `left` and `right` bound;
//! ancestry is interval containment, so every read is a single statement and
//! every insert or delete renumbers the affected rows inside one write
//! transaction.
//!
//! ```no_run
//! use nested_set::{NestedSet, Payload, Placement, ReadOptions, Schema, StoreOptions};
//!
//! # fn main() -> nested_set::Result<()> {
//! let schema = Schema::builder("categories").payload_column("name").build()?;
//! let mut tree = NestedSet::open("tree.db", schema, &StoreOptions::default())?;
//! let root = tree.insert(Placement::Root, &Payload::from([("name".into(), "all".into())]))?;
//! tree.insert(Placement::ChildOf(root), &Payload::from([("name".into(), "books".into())]))?;
//! for row in tree.read_all_nodes(ReadOptions::all())? {
//!     println!("{} depth={:?}", row.node.key, row.depth);
//! }
//! # Ok(())
//! # }
//! ```

#![warn(missing_docs)]

mod error;
/// Node, bounds, payload values and read/insert option types.
pub mod model;
/// Insert and delete with renumbering under the write lock.
pub mod mutation;
/// Interval reader and derived facts.
pub mod reader;
/// Ancestor chains and subtrees.
pub mod resolver;
pub mod schema;
/// SQLite connection handling.
pub mod store;
mod tree;
pub mod verify;

pub use error::{InvalidOperation, NestedSetError, Result};
pub use model::{
    Bounds, DerivedFact, InsertMode, Node, NodeFacts, NodeKey, Payload, Placement, ReadOptions,
    Value,
};
pub use schema::{Schema, SchemaBuilder};
pub use store::{JournalMode, Store, StoreOptions, Synchronous};
pub use tree::NestedSet;
pub use verify::{VerifyCounts, VerifyFinding, VerifyReport, VerifySeverity};
