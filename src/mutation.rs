#![forbid(unsafe_code)]

//! Mutation engine: placement of new nodes and subtree deletion.
//!
//! Every mutation runs inside one write transaction obtained from
//! [`Store::write_txn`], so the target lookup, the renumbering of unrelated
//! rows and the insert/delete itself commit together or not at all.
//!
//! Inserting opens a gap of two bound values at a position `p`: every bound
//! `>= p` moves up by 2 and the new leaf takes `(p, p + 1)`. Ancestors of the
//! insertion point straddle `p` (left below, right above), so only their right
//! bound moves and they widen; rows wholly after `p` shift. Deleting closes the
//! gap left by the removed interval the same way in reverse.

use std::time::Instant;

use rusqlite::{params_from_iter, Connection, ToSql, Transaction};
use tracing::{debug, info, warn};

use crate::error::{InvalidOperation, NestedSetError, Result};
use crate::model::{Bounds, Node, NodeKey, Payload, Placement};
use crate::reader::simple_node;
use crate::schema::{quote, Schema};
use crate::store::Store;

/// Inserts a new node at `placement` and returns its store-assigned key.
pub fn insert(
    store: &mut Store,
    schema: &Schema,
    placement: Placement,
    payload: &Payload,
) -> Result<NodeKey> {
    for column in payload.keys() {
        if !schema.has_payload_column(column) {
            return Err(NestedSetError::UnknownColumn(column.clone()));
        }
    }

    let start = Instant::now();
    let txn = store.write_txn()?;
    match insert_in(&txn, schema, placement, payload) {
        Ok((key, bounds)) => {
            txn.commit()?;
            info!(
                table = schema.table(),
                mode = %placement.mode(),
                target_key = placement.target().map(|k| k.0),
                key = key.0,
                left = bounds.left,
                right = bounds.right,
                duration_us = start.elapsed().as_micros() as u64,
                "mutation.insert.committed"
            );
            Ok(key)
        }
        Err(err) => {
            drop(txn);
            warn!(
                table = schema.table(),
                mode = %placement.mode(),
                target_key = placement.target().map(|k| k.0),
                error = %err,
                "mutation.insert.rolled_back"
            );
            Err(err)
        }
    }
}

/// Deletes `key` and all of its descendants, returning the number of rows removed.
pub fn delete_subtree(store: &mut Store, schema: &Schema, key: NodeKey) -> Result<usize> {
    let start = Instant::now();
    let txn = store.write_txn()?;
    match delete_in(&txn, schema, key) {
        Ok((removed, bounds)) => {
            txn.commit()?;
            info!(
                table = schema.table(),
                key = key.0,
                left = bounds.left,
                right = bounds.right,
                removed,
                duration_us = start.elapsed().as_micros() as u64,
                "mutation.delete.committed"
            );
            Ok(removed)
        }
        Err(err) => {
            drop(txn);
            warn!(
                table = schema.table(),
                key = key.0,
                error = %err,
                "mutation.delete.rolled_back"
            );
            Err(err)
        }
    }
}

fn insert_in(
    txn: &Transaction<'_>,
    schema: &Schema,
    placement: Placement,
    payload: &Payload,
) -> Result<(NodeKey, Bounds)> {
    let gap_at = match placement {
        Placement::Root => {
            if has_rows(txn, schema)? {
                return Err(InvalidOperation::RootExists.into());
            }
            None
        }
        Placement::ChildOf(key) => {
            let target = load(txn, schema, key)?;
            if !target.bounds.is_leaf() {
                return Err(InvalidOperation::ChildExists(key).into());
            }
            Some(target.bounds.right)
        }
        Placement::LeftOf(key) => {
            let target = load(txn, schema, key)?;
            if target.bounds.is_root() {
                return Err(InvalidOperation::RootSibling(key).into());
            }
            Some(target.bounds.left)
        }
        Placement::RightOf(key) => {
            let target = load(txn, schema, key)?;
            if target.bounds.is_root() {
                return Err(InvalidOperation::RootSibling(key).into());
            }
            Some(target.bounds.right + 1)
        }
    };

    let bounds = match gap_at {
        Some(position) => {
            let moved_right = shift(txn, schema, schema.right_column(), position, 2)?;
            let moved_left = shift(txn, schema, schema.left_column(), position, 2)?;
            debug!(
                table = schema.table(),
                position,
                moved_right,
                moved_left,
                "mutation.insert.open_gap"
            );
            Bounds::new(position, position + 1)
        }
        None => Bounds::new(1, 2),
    };

    let mut columns = vec![quote(schema.left_column()), quote(schema.right_column())];
    let mut values: Vec<&dyn ToSql> = vec![&bounds.left, &bounds.right];
    for (column, value) in payload {
        columns.push(quote(column));
        values.push(value);
    }
    let placeholders: Vec<String> = (1..=values.len()).map(|i| format!("?{i}")).collect();
    let sql = format!(
        "INSERT INTO {} ({}) VALUES ({})",
        quote(schema.table()),
        columns.join(", "),
        placeholders.join(", ")
    );
    txn.execute(&sql, params_from_iter(values))?;
    Ok((NodeKey(txn.last_insert_rowid()), bounds))
}

fn delete_in(txn: &Transaction<'_>, schema: &Schema, key: NodeKey) -> Result<(usize, Bounds)> {
    let target = load(txn, schema, key)?;
    let bounds = target.bounds;
    let left = quote(schema.left_column());
    let sql = format!(
        "DELETE FROM {} WHERE {left} BETWEEN ?1 AND ?2",
        quote(schema.table())
    );
    let removed = txn.execute(&sql, [bounds.left, bounds.right])?;

    let width = bounds.width();
    let moved_left = shift(txn, schema, schema.left_column(), bounds.right + 1, -width)?;
    let moved_right = shift(txn, schema, schema.right_column(), bounds.right + 1, -width)?;
    debug!(
        table = schema.table(),
        key = key.0,
        removed,
        width,
        moved_left,
        moved_right,
        "mutation.delete.close_gap"
    );
    Ok((removed, bounds))
}

/// Adds `delta` to `column` on every row where `column >= from`.
fn shift(conn: &Connection, schema: &Schema, column: &str, from: i64, delta: i64) -> Result<usize> {
    let column = quote(column);
    let sql = format!(
        "UPDATE {} SET {column} = {column} + ?1 WHERE {column} >= ?2",
        quote(schema.table())
    );
    Ok(conn.execute(&sql, [delta, from])?)
}

fn load(conn: &Connection, schema: &Schema, key: NodeKey) -> Result<Node> {
    simple_node(conn, schema, key)?.ok_or(NestedSetError::NotFound(key))
}

fn has_rows(conn: &Connection, schema: &Schema) -> Result<bool> {
    let sql = format!("SELECT EXISTS (SELECT 1 FROM {})", quote(schema.table()));
    let exists: bool = conn.query_row(&sql, [], |row| row.get(0))?;
    Ok(exists)
}
