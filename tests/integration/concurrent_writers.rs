#![allow(missing_docs)]

use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Barrier};
use std::thread;

use nested_set::{
    NestedSet, NodeKey, Payload, Placement, ReadOptions, Result, Schema, StoreOptions, Value,
};
use tempfile::tempdir;

const NUM_THREADS: usize = 4;
const INSERTS_PER_THREAD: usize = 25;

fn schema() -> Schema {
    Schema::builder("tree")
        .payload_columns(["label"])
        .build()
        .expect("valid schema")
}

fn options() -> StoreOptions {
    StoreOptions {
        busy_timeout_ms: 30_000,
        ..StoreOptions::default()
    }
}

fn open(path: &Path) -> Result<NestedSet> {
    NestedSet::open(path, schema(), &options())
}

fn label(text: String) -> Payload {
    Payload::from([("label".to_string(), Value::Text(text))])
}

fn assert_unique_bounds(tree: &NestedSet) -> Result<()> {
    let rows = tree.read_all_nodes(ReadOptions::default())?;
    let mut seen = HashSet::new();
    for row in &rows {
        assert!(seen.insert(row.node.bounds.left), "duplicate bound");
        assert!(seen.insert(row.node.bounds.right), "duplicate bound");
    }
    assert_eq!(seen.len(), rows.len() * 2);
    assert_eq!(seen.iter().max().copied().unwrap_or(0), rows.len() as i64 * 2);
    Ok(())
}

/// Root with two leaf children; returns the database path and the children.
fn seed(dir: &Path) -> Result<(PathBuf, NodeKey, NodeKey)> {
    let path = dir.join("tree.db");
    let mut tree = open(&path)?;
    let root = tree.insert(Placement::Root, &label("root".into()))?;
    let a = tree.insert(Placement::ChildOf(root), &label("a".into()))?;
    let b = tree.insert(Placement::RightOf(a), &label("b".into()))?;
    Ok((path, a, b))
}

#[test]
fn concurrent_child_inserts_serialize() -> Result<()> {
    let dir = tempdir().expect("tempdir");
    let (path, a, b) = seed(dir.path())?;
    let path = Arc::new(path);
    let barrier = Arc::new(Barrier::new(2));

    let handles: Vec<_> = [a, b]
        .into_iter()
        .map(|parent| {
            let path = Arc::clone(&path);
            let barrier = Arc::clone(&barrier);
            thread::spawn(move || -> Result<NodeKey> {
                let mut tree = open(&path)?;
                barrier.wait();
                tree.insert(Placement::ChildOf(parent), &label(format!("under-{parent}")))
            })
        })
        .collect();

    let mut inserted = Vec::new();
    for handle in handles {
        inserted.push(handle.join().expect("writer thread panicked")?);
    }

    let tree = open(&path)?;
    assert_eq!(tree.len()?, 5);
    let report = tree.verify()?;
    assert!(report.success, "{:?}", report.findings);
    assert!(report.findings.is_empty());
    assert_unique_bounds(&tree)?;
    for (child, parent) in inserted.iter().zip([a, b]) {
        let chain: Vec<_> = tree.parent_chain(*child)?.into_iter().map(|n| n.key).collect();
        assert_eq!(chain.len(), 3);
        assert_eq!(chain[1], parent);
    }
    Ok(())
}

#[test]
fn many_writers_keep_bounds_dense() -> Result<()> {
    let dir = tempdir().expect("tempdir");
    let (path, a, b) = seed(dir.path())?;
    let path = Arc::new(path);
    let barrier = Arc::new(Barrier::new(NUM_THREADS));

    let handles: Vec<_> = (0..NUM_THREADS)
        .map(|thread_id| {
            let path = Arc::clone(&path);
            let barrier = Arc::clone(&barrier);
            let anchor = if thread_id % 2 == 0 { a } else { b };
            thread::spawn(move || -> Result<()> {
                let mut tree = open(&path)?;
                barrier.wait();
                for i in 0..INSERTS_PER_THREAD {
                    let payload = label(format!("t{thread_id}-{i}"));
                    if i % 2 == 0 {
                        tree.insert(Placement::RightOf(anchor), &payload)?;
                    } else {
                        tree.insert(Placement::LeftOf(anchor), &payload)?;
                    }
                }
                Ok(())
            })
        })
        .collect();

    for handle in handles {
        handle.join().expect("writer thread panicked")?;
    }

    let tree = open(&path)?;
    assert_eq!(tree.len()?, (3 + NUM_THREADS * INSERTS_PER_THREAD) as u64);
    let report = tree.verify()?;
    assert!(report.findings.is_empty(), "{:?}", report.findings);
    assert_unique_bounds(&tree)?;
    Ok(())
}

#[test]
fn readers_never_observe_partial_renumbering() -> Result<()> {
    let dir = tempdir().expect("tempdir");
    let (path, a, _) = seed(dir.path())?;
    let done = Arc::new(AtomicBool::new(false));
    let barrier = Arc::new(Barrier::new(2));

    let reader = {
        let path = path.clone();
        let done = Arc::clone(&done);
        let barrier = Arc::clone(&barrier);
        thread::spawn(move || -> Result<usize> {
            let tree = open(&path)?;
            barrier.wait();
            let mut snapshots = 0;
            loop {
                let report = tree.verify()?;
                assert!(report.findings.is_empty(), "{:?}", report.findings);
                snapshots += 1;
                if done.load(Ordering::Acquire) {
                    return Ok(snapshots);
                }
            }
        })
    };

    {
        let mut tree = open(&path)?;
        barrier.wait();
        for i in 0..50 {
            let key = tree.insert(Placement::RightOf(a), &label(format!("w{i}")))?;
            if i % 3 == 0 {
                tree.delete_subtree(key)?;
            }
        }
    }
    done.store(true, Ordering::Release);

    let snapshots = reader.join().expect("reader thread panicked")?;
    assert!(snapshots > 0);
    Ok(())
}
