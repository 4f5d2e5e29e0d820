#![forbid(unsafe_code)]

use std::path::Path;

use crate::error::Result;
use crate::model::{InsertMode, Node, NodeFacts, NodeKey, Payload, Placement, ReadOptions};
use crate::schema::Schema;
use crate::store::{Store, StoreOptions};
use crate::verify::VerifyReport;
use crate::{mutation, reader, resolver, verify};

/// A nested-set tree bound to one table of one database connection.
///
/// Reads take `&self` and run as single statements; mutations take
/// `&mut self` and hold the database write lock for their whole transaction.
/// Threads that need to work on the same tree concurrently each open their
/// own handle on the same database file.
#[derive(Debug)]
pub struct NestedSet {
    store: Store,
    schema: Schema,
}

impl NestedSet {
    /// Opens the database at `path` and creates the tree table if needed.
    pub fn open(path: impl AsRef<Path>, schema: Schema, opts: &StoreOptions) -> Result<Self> {
        let store = Store::open(path, opts)?;
        Self::with_store(store, schema)
    }

    /// Creates a tree in a private in-memory database.
    pub fn in_memory(schema: Schema) -> Result<Self> {
        Self::with_store(Store::open_in_memory()?, schema)
    }

    /// Binds `schema` to an existing store, creating the table if needed.
    pub fn with_store(store: Store, schema: Schema) -> Result<Self> {
        store.ensure_table(&schema)?;
        Ok(Self { store, schema })
    }

    /// The schema binding in use.
    pub fn schema(&self) -> &Schema {
        &self.schema
    }

    /// The underlying store.
    pub fn store(&self) -> &Store {
        &self.store
    }

    /// Reads one node and the requested derived facts.
    pub fn read_node(&self, key: NodeKey, opts: ReadOptions) -> Result<Option<NodeFacts>> {
        reader::read_node(self.store.connection(), &self.schema, key, opts)
    }

    /// Reads all nodes in preorder with the requested derived facts.
    pub fn read_all_nodes(&self, opts: ReadOptions) -> Result<Vec<NodeFacts>> {
        reader::read_all_nodes(self.store.connection(), &self.schema, opts)
    }

    /// Reads one row without computing anything.
    pub fn simple_node(&self, key: NodeKey) -> Result<Option<Node>> {
        reader::simple_node(self.store.connection(), &self.schema, key)
    }

    /// Ancestors of `key` from the root down to `key` itself.
    pub fn parent_chain(&self, key: NodeKey) -> Result<Vec<Node>> {
        resolver::parent_chain(self.store.connection(), &self.schema, key)
    }

    /// `key` followed by all of its descendants in preorder.
    pub fn subtree(&self, key: NodeKey) -> Result<Vec<Node>> {
        resolver::subtree(self.store.connection(), &self.schema, key)
    }

    /// Inserts a node at `placement`.
    pub fn insert(&mut self, placement: Placement, payload: &Payload) -> Result<NodeKey> {
        mutation::insert(&mut self.store, &self.schema, placement, payload)
    }

    /// Inserts a node from a mode and an optional target.
    pub fn insert_with_mode(
        &mut self,
        mode: InsertMode,
        target: Option<NodeKey>,
        payload: &Payload,
    ) -> Result<NodeKey> {
        let placement = Placement::from_mode(mode, target)?;
        self.insert(placement, payload)
    }

    /// Deletes `key` together with its subtree.
    pub fn delete_subtree(&mut self, key: NodeKey) -> Result<usize> {
        mutation::delete_subtree(&mut self.store, &self.schema, key)
    }

    /// Checks the interval invariants over the whole table.
    pub fn verify(&self) -> Result<VerifyReport> {
        verify::verify(self.store.connection(), &self.schema)
    }

    /// Number of nodes in the tree.
    pub fn len(&self) -> Result<u64> {
        self.store.count_rows(&self.schema)
    }

    /// Whether the tree has no nodes.
    pub fn is_empty(&self) -> Result<bool> {
        Ok(self.len()? == 0)
    }
}
