#![forbid(unsafe_code)]

//! Full-table integrity check of the nested-set invariants.

use std::collections::HashSet;

use rusqlite::Connection;
use serde::Serialize;
use tracing::warn;

use crate::error::Result;
use crate::model::{Bounds, Node, NodeKey};
use crate::reader::{node_from_row, select_columns};
use crate::schema::{quote, Schema};

const MAX_FINDINGS: usize = 32;

/// Indicates the severity level of a verification finding.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum VerifySeverity {
    /// Readable tree with unused bound values.
    Warning,
    /// Broken invariant; reads may return wrong ancestry.
    Error,
}

/// A single issue discovered during verification.
#[derive(Clone, Debug, Serialize)]
pub struct VerifyFinding {
    /// The severity level of this finding.
    pub severity: VerifySeverity,
    /// Node the finding is about, when it concerns one node.
    pub key: Option<NodeKey>,
    /// Human-readable description of the issue.
    pub message: String,
}

impl VerifyFinding {
    fn error(key: Option<NodeKey>, message: impl Into<String>) -> Self {
        Self {
            severity: VerifySeverity::Error,
            key,
            message: message.into(),
        }
    }

    fn warning(message: impl Into<String>) -> Self {
        Self {
            severity: VerifySeverity::Warning,
            key: None,
            message: message.into(),
        }
    }
}

/// Statistics collected while walking the table.
#[derive(Clone, Debug, Default, Serialize)]
pub struct VerifyCounts {
    /// Rows in the table.
    pub nodes: u64,
    /// Nodes not nested inside any other node.
    pub roots: u64,
    /// Deepest nesting seen (root is 0).
    pub max_depth: u64,
}

/// Complete report of a verification run.
#[derive(Clone, Debug, Serialize)]
pub struct VerifyReport {
    /// Whether no error-level finding was produced.
    pub success: bool,
    /// Issues found, capped at a fixed number.
    pub findings: Vec<VerifyFinding>,
    /// Whether findings were dropped because of the cap.
    pub truncated: bool,
    /// Statistics about the rows examined.
    pub counts: VerifyCounts,
}

/// Checks every invariant of the tree stored under `schema`.
pub fn verify(conn: &Connection, schema: &Schema) -> Result<VerifyReport> {
    let sql = format!(
        "SELECT {} FROM {} ORDER BY {}, {}",
        select_columns(schema, None),
        quote(schema.table()),
        quote(schema.left_column()),
        quote(schema.key_column())
    );
    let mut stmt = conn.prepare(&sql)?;
    let rows = stmt.query_map([], |row| node_from_row(row, schema))?;
    let mut nodes = Vec::new();
    for node in rows {
        nodes.push(node?);
    }
    let report = check(&nodes);
    for finding in &report.findings {
        warn!(
            table = schema.table(),
            severity = ?finding.severity,
            key = finding.key.map(|k| k.0),
            message = %finding.message,
            "verify.finding"
        );
    }
    Ok(report)
}

/// Checks nodes already sorted by left bound.
fn check(nodes: &[Node]) -> VerifyReport {
    let mut findings = Vec::new();
    let mut dropped = false;
    let mut push = |finding: VerifyFinding| {
        if findings.len() < MAX_FINDINGS {
            findings.push(finding);
        } else {
            dropped = true;
        }
    };
    let mut counts = VerifyCounts {
        nodes: nodes.len() as u64,
        ..VerifyCounts::default()
    };

    let mut seen = HashSet::new();
    for node in nodes {
        let Bounds { left, right } = node.bounds;
        if left < 1 || left >= right {
            push(VerifyFinding::error(
                Some(node.key),
                format!("invalid interval ({left}, {right})"),
            ));
        }
        for bound in [left, right] {
            if !seen.insert(bound) {
                push(VerifyFinding::error(
                    Some(node.key),
                    format!("bound {bound} is shared with another node"),
                ));
            }
        }
    }

    let mut open: Vec<Bounds> = Vec::new();
    for node in nodes {
        while open.last().is_some_and(|top| top.right < node.bounds.left) {
            open.pop();
        }
        match open.last() {
            Some(parent) if parent.right < node.bounds.right => {
                push(VerifyFinding::error(
                    Some(node.key),
                    format!(
                        "interval ({}, {}) partially overlaps ({}, {})",
                        node.bounds.left, node.bounds.right, parent.left, parent.right
                    ),
                ));
            }
            Some(_) => {}
            None => {
                counts.roots += 1;
                if node.bounds.left != 1 {
                    push(VerifyFinding::error(
                        Some(node.key),
                        format!("top-level node starts at {} instead of 1", node.bounds.left),
                    ));
                }
            }
        }
        counts.max_depth = counts.max_depth.max(open.len() as u64);
        open.push(node.bounds);
    }
    if counts.roots > 1 {
        push(VerifyFinding::error(
            None,
            format!("{} top-level nodes; expected a single root", counts.roots),
        ));
    }

    let expected = 2 * nodes.len() as i64;
    if let Some(root) = nodes.first() {
        if root.bounds.left == 1 && root.bounds.right != expected && counts.roots == 1 {
            push(VerifyFinding::warning(format!(
                "root closes at {} but {} nodes need exactly {expected} bounds",
                root.bounds.right,
                nodes.len()
            )));
        }
    }

    let success = findings
        .iter()
        .all(|f| f.severity != VerifySeverity::Error);
    VerifyReport {
        success,
        findings,
        truncated: dropped,
        counts,
    }
}
