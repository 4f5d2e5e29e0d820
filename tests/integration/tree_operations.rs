#![allow(missing_docs)]

use nested_set::{
    Bounds, DerivedFact, InvalidOperation, NestedSet, NestedSetError, NodeKey, Payload,
    Placement, ReadOptions, Result, Schema, StoreOptions, Value,
};
use tempfile::tempdir;

fn named(name: &str) -> Payload {
    Payload::from([("name".to_string(), Value::from(name))])
}

fn schema() -> Schema {
    Schema::builder("categories")
        .payload_columns(["name"])
        .build()
        .expect("valid schema")
}

fn bounds_of(tree: &NestedSet, key: NodeKey) -> Result<Bounds> {
    tree.simple_node(key)?
        .map(|node| node.bounds)
        .ok_or(NestedSetError::NotFound(key))
}

/// root(1,8) -> a(2,3), b(4,7) -> c(5,6)
fn small_tree(tree: &mut NestedSet) -> Result<[NodeKey; 4]> {
    let root = tree.insert(Placement::Root, &named("root"))?;
    let a = tree.insert(Placement::ChildOf(root), &named("a"))?;
    let b = tree.insert(Placement::RightOf(a), &named("b"))?;
    let c = tree.insert(Placement::ChildOf(b), &named("c"))?;
    Ok([root, a, b, c])
}

#[test]
fn builds_expected_layout() -> Result<()> {
    let mut tree = NestedSet::in_memory(schema())?;
    let [root, a, b, c] = small_tree(&mut tree)?;

    assert_eq!(bounds_of(&tree, root)?, Bounds::new(1, 8));
    assert_eq!(bounds_of(&tree, a)?, Bounds::new(2, 3));
    assert_eq!(bounds_of(&tree, b)?, Bounds::new(4, 7));
    assert_eq!(bounds_of(&tree, c)?, Bounds::new(5, 6));
    assert!(tree.verify()?.success);
    Ok(())
}

#[test]
fn second_root_is_rejected() -> Result<()> {
    let mut tree = NestedSet::in_memory(schema())?;
    tree.insert(Placement::Root, &named("root"))?;

    let err = tree
        .insert(Placement::Root, &named("again"))
        .expect_err("second root must fail");
    assert!(matches!(
        err,
        NestedSetError::InvalidOperation(InvalidOperation::RootExists)
    ));
    assert_eq!(tree.len()?, 1);
    Ok(())
}

#[test]
fn second_child_is_rejected() -> Result<()> {
    let mut tree = NestedSet::in_memory(schema())?;
    let root = tree.insert(Placement::Root, &named("root"))?;
    tree.insert(Placement::ChildOf(root), &named("only"))?;

    let err = tree
        .insert(Placement::ChildOf(root), &named("second"))
        .expect_err("second child must fail");
    assert!(matches!(
        err,
        NestedSetError::InvalidOperation(InvalidOperation::ChildExists(key)) if key == root
    ));
    assert_eq!(tree.len()?, 2);
    Ok(())
}

#[test]
fn depth_follows_child_chain() -> Result<()> {
    let mut tree = NestedSet::in_memory(schema())?;
    let root = tree.insert(Placement::Root, &named("root"))?;
    let a = tree.insert(Placement::ChildOf(root), &named("a"))?;
    let b = tree.insert(Placement::ChildOf(a), &named("b"))?;
    let c = tree.insert(Placement::ChildOf(b), &named("c"))?;

    let opts = ReadOptions::default().with(DerivedFact::Depth);
    for (key, depth) in [(root, 0), (a, 1), (b, 2), (c, 3)] {
        let facts = tree.read_node(key, opts)?.expect("node exists");
        assert_eq!(facts.depth, Some(depth), "depth of {key}");
        assert_eq!(facts.child_count, None);
    }
    Ok(())
}

#[test]
fn deleting_subtree_shrinks_ancestors() -> Result<()> {
    let mut tree = NestedSet::in_memory(schema())?;
    let [root, a, b, c] = small_tree(&mut tree)?;

    let removed = tree.delete_subtree(b)?;
    assert_eq!(removed, 2);
    assert_eq!(bounds_of(&tree, root)?, Bounds::new(1, 4));
    assert_eq!(bounds_of(&tree, a)?, Bounds::new(2, 3));
    assert!(tree.simple_node(b)?.is_none());
    assert!(tree.simple_node(c)?.is_none());
    let rows = tree.read_all_nodes(ReadOptions::default())?;
    assert!(rows.iter().all(|row| row.node.bounds.right <= 4));
    assert!(tree.verify()?.findings.is_empty());
    Ok(())
}

#[test]
fn deleting_root_empties_tree() -> Result<()> {
    let mut tree = NestedSet::in_memory(schema())?;
    let [root, ..] = small_tree(&mut tree)?;
    assert_eq!(tree.delete_subtree(root)?, 4);
    assert!(tree.is_empty()?);
    tree.insert(Placement::Root, &named("fresh"))?;
    assert_eq!(tree.len()?, 1);
    Ok(())
}

#[test]
fn ancestor_and_descendant_round_trip() -> Result<()> {
    let mut tree = NestedSet::in_memory(schema())?;
    let [root, a, b, c] = small_tree(&mut tree)?;

    let c_left = bounds_of(&tree, c)?.left;
    let chain = tree.parent_chain(c)?;
    let chain_keys: Vec<_> = chain.iter().map(|n| n.key).collect();
    assert_eq!(chain_keys, [root, b, c]);
    assert!(chain
        .iter()
        .all(|n| n.bounds.left <= c_left && c_left <= n.bounds.right));

    let all: Vec<_> = tree
        .subtree(root)?
        .into_iter()
        .map(|n| n.key)
        .collect();
    assert_eq!(all, [root, a, b, c]);
    let everything: Vec<_> = tree
        .read_all_nodes(ReadOptions::default())?
        .into_iter()
        .map(|row| row.node.key)
        .collect();
    assert_eq!(all, everything);

    assert!(tree.parent_chain(NodeKey(404))?.is_empty());
    assert!(tree.subtree(NodeKey(404))?.is_empty());
    Ok(())
}

#[test]
fn derived_fact_formulas_are_literal() -> Result<()> {
    let mut tree = NestedSet::in_memory(schema())?;
    let root = tree.insert(Placement::Root, &named("root"))?;
    let first = tree.insert(Placement::ChildOf(root), &named("first"))?;
    let second = tree.insert(Placement::RightOf(first), &named("second"))?;
    let third = tree.insert(Placement::RightOf(second), &named("third"))?;
    tree.insert(Placement::ChildOf(third), &named("nested"))?;

    let root_facts = tree.read_node(root, ReadOptions::all())?.expect("root");
    // Four descendants, three of them immediate children.
    assert_eq!(root_facts.child_count, Some(4));
    assert_eq!(root_facts.lower_siblings, Some(0));
    assert_eq!(root_facts.upper_siblings, Some(0));

    let third_facts = tree.read_node(third, ReadOptions::all())?.expect("third");
    // Two siblings on the left, reported as a flag.
    assert_eq!(third_facts.lower_siblings, Some(1));
    assert_eq!(third_facts.upper_siblings, Some(0));
    assert_eq!(third_facts.fact(DerivedFact::Depth), Some(1));

    let first_facts = tree.read_node(first, ReadOptions::all())?.expect("first");
    assert_eq!(first_facts.lower_siblings, Some(0));
    assert_eq!(first_facts.upper_siblings, Some(1));
    assert_eq!(first_facts.child_count, Some(0));
    Ok(())
}

#[test]
fn payload_round_trips_every_value_kind() -> Result<()> {
    let schema = Schema::builder("things")
        .payload_columns(["label", "weight", "ratio", "raw", "note"])
        .build()?;
    let mut tree = NestedSet::in_memory(schema)?;
    let payload = Payload::from([
        ("label".to_string(), Value::from("crate")),
        ("weight".to_string(), Value::Integer(12)),
        ("ratio".to_string(), Value::Real(0.5)),
        ("raw".to_string(), Value::Blob(vec![0, 159, 255])),
        ("note".to_string(), Value::Null),
    ]);
    let key = tree.insert(Placement::Root, &payload)?;
    let node = tree.simple_node(key)?.expect("stored");
    assert_eq!(node.payload, payload);

    // Columns left out of the insert read back as NULL.
    let sparse = tree.insert(
        Placement::ChildOf(key),
        &Payload::from([("label".to_string(), Value::from("inner"))]),
    )?;
    let node = tree.simple_node(sparse)?.expect("stored");
    assert_eq!(node.get("weight"), Some(&Value::Null));
    Ok(())
}

#[test]
fn custom_column_names_are_honoured() -> Result<()> {
    let schema = Schema::builder("org_units")
        .key_column("unit_id")
        .left_column("l")
        .right_column("r")
        .payload_column("title")
        .prefix("")
        .build()?;
    let mut tree = NestedSet::in_memory(schema)?;
    let root = tree.insert(
        Placement::Root,
        &Payload::from([("title".to_string(), Value::from("hq"))]),
    )?;
    let child = tree.insert(Placement::ChildOf(root), &Payload::new())?;
    let facts = tree.read_node(child, ReadOptions::all())?.expect("child");
    assert_eq!(facts.depth, Some(1));
    assert_eq!(facts.node.bounds, Bounds::new(2, 3));
    Ok(())
}

#[test]
fn tree_persists_across_handles() -> Result<()> {
    let dir = tempdir().expect("tempdir");
    let path = dir.path().join("tree.db");
    let keys = {
        let mut tree = NestedSet::open(&path, schema(), &StoreOptions::default())?;
        small_tree(&mut tree)?
    };

    let tree = NestedSet::open(&path, schema(), &StoreOptions::default())?;
    assert_eq!(tree.len()?, 4);
    assert_eq!(bounds_of(&tree, keys[2])?, Bounds::new(4, 7));
    assert!(tree.verify()?.success);
    Ok(())
}
