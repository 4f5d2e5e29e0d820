#![forbid(unsafe_code)]

//! Interval reader: rows plus facts derived from interval containment.
//!
//! Every read is a single statement. The target alias `t1` is joined against
//! every candidate `t2` whose interval contains `t1.left`; grouping by the
//! target key leaves one group of ancestors per node, from which depth and
//! the sibling flags are aggregated.
//!
//! The derived expressions are kept exactly as the established nested-set
//! formulas: `children` is the number of descendants (not immediate
//! children), and `lower` / `upper` are 0/1 flags rather than counts.

use rusqlite::{Connection, OptionalExtension, Row};

use crate::error::Result;
use crate::model::{Bounds, DerivedFact, Node, NodeFacts, NodeKey, Payload, ReadOptions};
use crate::schema::{quote, Schema};

/// Reads one node with the requested derived facts.
///
/// Returns `Ok(None)` when no node has `key`.
pub fn read_node(
    conn: &Connection,
    schema: &Schema,
    key: NodeKey,
    opts: ReadOptions,
) -> Result<Option<NodeFacts>> {
    let sql = facts_sql(schema, opts, true);
    let facts = conn
        .query_row(&sql, [key], |row| facts_from_row(row, schema, opts))
        .optional()?;
    Ok(facts)
}

/// Reads every node with the requested derived facts, ordered by left bound.
pub fn read_all_nodes(
    conn: &Connection,
    schema: &Schema,
    opts: ReadOptions,
) -> Result<Vec<NodeFacts>> {
    let sql = facts_sql(schema, opts, false);
    let mut stmt = conn.prepare(&sql)?;
    let rows = stmt.query_map([], |row| facts_from_row(row, schema, opts))?;
    let mut out = Vec::new();
    for row in rows {
        out.push(row?);
    }
    Ok(out)
}

/// Reads the bare row of one node without any join.
pub fn simple_node(conn: &Connection, schema: &Schema, key: NodeKey) -> Result<Option<Node>> {
    let sql = format!(
        "SELECT {} FROM {} WHERE {} = ?1 LIMIT 1",
        select_columns(schema, None),
        quote(schema.table()),
        quote(schema.key_column())
    );
    let node = conn
        .query_row(&sql, [key], |row| node_from_row(row, schema))
        .optional()?;
    Ok(node)
}

/// Column list `key, left, right, payload...`, optionally qualified by `alias`.
pub(crate) fn select_columns(schema: &Schema, alias: Option<&str>) -> String {
    let qualify = |column: &str| match alias {
        Some(alias) => format!("{alias}.{}", quote(column)),
        None => quote(column),
    };
    let mut columns = vec![
        qualify(schema.key_column()),
        qualify(schema.left_column()),
        qualify(schema.right_column()),
    ];
    columns.extend(schema.payload_columns().iter().map(|c| qualify(c)));
    columns.join(", ")
}

/// Decodes a row laid out by [`select_columns`].
pub(crate) fn node_from_row(row: &Row<'_>, schema: &Schema) -> rusqlite::Result<Node> {
    let key: NodeKey = row.get(0)?;
    let left: i64 = row.get(1)?;
    let right: i64 = row.get(2)?;
    let mut payload = Payload::new();
    for (offset, column) in schema.payload_columns().iter().enumerate() {
        payload.insert(column.clone(), row.get(3 + offset)?);
    }
    Ok(Node {
        key,
        bounds: Bounds::new(left, right),
        payload,
    })
}

fn facts_from_row(row: &Row<'_>, schema: &Schema, opts: ReadOptions) -> rusqlite::Result<NodeFacts> {
    let node = node_from_row(row, schema)?;
    let mut facts = NodeFacts {
        node,
        depth: None,
        child_count: None,
        lower_siblings: None,
        upper_siblings: None,
    };
    for fact in opts.facts() {
        let value: i64 = row.get(schema.fact_alias(fact).as_str())?;
        match fact {
            DerivedFact::Depth => facts.depth = Some(value),
            DerivedFact::ChildCount => facts.child_count = Some(value),
            DerivedFact::LowerSiblingCount => facts.lower_siblings = Some(value),
            DerivedFact::UpperSiblingCount => facts.upper_siblings = Some(value),
        }
    }
    Ok(facts)
}

fn fact_expr(schema: &Schema, fact: DerivedFact) -> String {
    let left = quote(schema.left_column());
    let right = quote(schema.right_column());
    match fact {
        DerivedFact::Depth => format!("COUNT(*) - 1 + (t1.{left} > 1)"),
        DerivedFact::ChildCount => format!("(t1.{right} - t1.{left} - 1) / 2"),
        DerivedFact::LowerSiblingCount => format!("(t1.{left} - MAX(t2.{left})) > 1"),
        DerivedFact::UpperSiblingCount => {
            format!("((MIN(t2.{right}) - t1.{right}) - (t1.{left} > 1)) / 2.0 > 0")
        }
    }
}

fn facts_sql(schema: &Schema, opts: ReadOptions, single: bool) -> String {
    let table = quote(schema.table());
    let key = quote(schema.key_column());
    let left = quote(schema.left_column());
    let right = quote(schema.right_column());

    let mut select = select_columns(schema, Some("t1"));
    for fact in opts.facts() {
        select.push_str(&format!(
            ", {} AS {}",
            fact_expr(schema, fact),
            quote(&schema.fact_alias(fact))
        ));
    }

    let mut sql = format!(
        "SELECT {select} FROM {table} AS t1, {table} AS t2 \
         WHERE t1.{left} BETWEEN t2.{left} AND t2.{right} \
         AND (t2.{key} != t1.{key} OR t1.{left} = 1)"
    );
    if single {
        sql.push_str(&format!(" AND t1.{key} = ?1"));
    }
    sql.push_str(&format!(" GROUP BY t1.{key} ORDER BY t1.{left}"));
    sql
}
