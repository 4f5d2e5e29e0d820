#![forbid(unsafe_code)]

//! Ancestor chains and subtrees resolved from interval containment.

use rusqlite::Connection;

use crate::error::Result;
use crate::model::{Node, NodeKey};
use crate::reader::{node_from_row, select_columns};
use crate::schema::{quote, Schema};

/// Every node whose interval contains the target's left bound, root first.
///
/// The target itself is the last element. Empty when `key` does not exist.
pub fn parent_chain(conn: &Connection, schema: &Schema, key: NodeKey) -> Result<Vec<Node>> {
    let left = quote(schema.left_column());
    let right = quote(schema.right_column());
    let sql = format!(
        "SELECT {} FROM {table} AS t1, {table} AS t2 \
         WHERE t1.{left} BETWEEN t2.{left} AND t2.{right} \
         AND t1.{key} = ?1 ORDER BY t2.{left}",
        select_columns(schema, Some("t2")),
        table = quote(schema.table()),
        key = quote(schema.key_column()),
    );
    collect(conn, schema, &sql, key)
}

/// The target and every node nested inside it, in preorder.
///
/// Empty when `key` does not exist.
pub fn subtree(conn: &Connection, schema: &Schema, key: NodeKey) -> Result<Vec<Node>> {
    let left = quote(schema.left_column());
    let right = quote(schema.right_column());
    let sql = format!(
        "SELECT {} FROM {table} AS t1, {table} AS t2 \
         WHERE t2.{left} BETWEEN t1.{left} AND t1.{right} \
         AND t1.{key} = ?1 ORDER BY t2.{left}",
        select_columns(schema, Some("t2")),
        table = quote(schema.table()),
        key = quote(schema.key_column()),
    );
    collect(conn, schema, &sql, key)
}

fn collect(conn: &Connection, schema: &Schema, sql: &str, key: NodeKey) -> Result<Vec<Node>> {
    let mut stmt = conn.prepare(sql)?;
    let rows = stmt.query_map([key], |row| node_from_row(row, schema))?;
    let mut nodes = Vec::new();
    for node in rows {
        nodes.push(node?);
    }
    Ok(nodes)
}
