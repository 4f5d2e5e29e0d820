use std::collections::BTreeMap;
use std::fmt;

use base64::Engine;
use rusqlite::types::{FromSql, FromSqlResult, ToSql, ToSqlOutput, ValueRef};
use serde::{Serialize, Serializer};

use crate::error::InvalidOperation;

/// Store-assigned primary key of a node.
#[derive(Copy, Clone, Eq, PartialEq, Ord, PartialOrd, Hash, Debug, Serialize)]
#[serde(transparent)]
pub struct NodeKey(pub i64);

impl fmt::Display for NodeKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<i64> for NodeKey {
    fn from(value: i64) -> Self {
        NodeKey(value)
    }
}

impl ToSql for NodeKey {
    fn to_sql(&self) -> rusqlite::Result<ToSqlOutput<'_>> {
        self.0.to_sql()
    }
}

impl FromSql for NodeKey {
    fn column_result(value: ValueRef<'_>) -> FromSqlResult<Self> {
        i64::column_result(value).map(NodeKey)
    }
}

/// The `[left, right]` interval of a node.
#[derive(Copy, Clone, Eq, PartialEq, Hash, Debug, Serialize)]
pub struct Bounds {
    /// Opening bound.
    pub left: i64,
    /// Closing bound.
    pub right: i64,
}

impl Bounds {
    /// Creates an interval from its two bounds.
    pub const fn new(left: i64, right: i64) -> Self {
        Self { left, right }
    }

    /// Number of bound values covered by the interval, both ends included.
    pub const fn width(&self) -> i64 {
        self.right - self.left + 1
    }

    /// Whether no other interval nests inside this one.
    pub const fn is_leaf(&self) -> bool {
        self.right - self.left == 1
    }

    /// Whether this interval is the root slot.
    pub const fn is_root(&self) -> bool {
        self.left == 1
    }

    /// Whether `other` lies strictly inside this interval.
    pub const fn contains(&self, other: &Bounds) -> bool {
        self.left < other.left && other.right < self.right
    }
}

/// A payload cell, one variant per SQLite storage class.
#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    /// SQL `NULL`.
    Null,
    /// 64-bit signed integer.
    Integer(i64),
    /// 64-bit float.
    Real(f64),
    /// UTF-8 text.
    Text(String),
    /// Raw bytes.
    Blob(Vec<u8>),
}

impl From<i64> for Value {
    fn from(value: i64) -> Self {
        Value::Integer(value)
    }
}

impl From<f64> for Value {
    fn from(value: f64) -> Self {
        Value::Real(value)
    }
}

impl From<&str> for Value {
    fn from(value: &str) -> Self {
        Value::Text(value.to_string())
    }
}

impl From<String> for Value {
    fn from(value: String) -> Self {
        Value::Text(value)
    }
}

impl From<Vec<u8>> for Value {
    fn from(value: Vec<u8>) -> Self {
        Value::Blob(value)
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Null => f.write_str("NULL"),
            Value::Integer(i) => write!(f, "{i}"),
            Value::Real(r) => write!(f, "{r}"),
            Value::Text(s) => f.write_str(s),
            Value::Blob(bytes) => {
                f.write_str(&base64::engine::general_purpose::STANDARD.encode(bytes))
            }
        }
    }
}

impl Serialize for Value {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        match self {
            Value::Null => serializer.serialize_unit(),
            Value::Integer(i) => serializer.serialize_i64(*i),
            Value::Real(r) => serializer.serialize_f64(*r),
            Value::Text(s) => serializer.serialize_str(s),
            Value::Blob(bytes) => serializer
                .serialize_str(&base64::engine::general_purpose::STANDARD.encode(bytes)),
        }
    }
}

impl ToSql for Value {
    fn to_sql(&self) -> rusqlite::Result<ToSqlOutput<'_>> {
        Ok(match self {
            Value::Null => ToSqlOutput::Borrowed(ValueRef::Null),
            Value::Integer(i) => ToSqlOutput::Borrowed(ValueRef::Integer(*i)),
            Value::Real(r) => ToSqlOutput::Borrowed(ValueRef::Real(*r)),
            Value::Text(s) => ToSqlOutput::Borrowed(ValueRef::Text(s.as_bytes())),
            Value::Blob(bytes) => ToSqlOutput::Borrowed(ValueRef::Blob(bytes)),
        })
    }
}

impl FromSql for Value {
    fn column_result(value: ValueRef<'_>) -> FromSqlResult<Self> {
        Ok(match value {
            ValueRef::Null => Value::Null,
            ValueRef::Integer(i) => Value::Integer(i),
            ValueRef::Real(r) => Value::Real(r),
            ValueRef::Text(_) => Value::Text(value.as_str()?.to_string()),
            ValueRef::Blob(bytes) => Value::Blob(bytes.to_vec()),
        })
    }
}

/// Caller-defined attributes stored next to the bounds.
pub type Payload = BTreeMap<String, Value>;

/// One stored tree element.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Node {
    /// Primary key.
    pub key: NodeKey,
    /// Interval of the node.
    #[serde(flatten)]
    pub bounds: Bounds,
    /// Payload columns declared by the schema, by name.
    pub payload: Payload,
}

impl Node {
    /// Looks up one payload value by column name.
    pub fn get(&self, column: &str) -> Option<&Value> {
        self.payload.get(column)
    }
}

/// A fact the interval reader can derive for each node.
#[derive(Copy, Clone, Debug, Eq, PartialEq, Hash)]
pub enum DerivedFact {
    /// Distance from the root.
    Depth,
    /// `(right - left - 1) / 2`, i.e. number of descendants.
    ChildCount,
    /// 1 when the node has a sibling on its left, otherwise 0.
    LowerSiblingCount,
    /// 1 when the node has a sibling on its right, otherwise 0.
    UpperSiblingCount,
}

impl DerivedFact {
    /// Every fact, in the order they appear in result rows.
    pub const ALL: [DerivedFact; 4] = [
        DerivedFact::Depth,
        DerivedFact::ChildCount,
        DerivedFact::LowerSiblingCount,
        DerivedFact::UpperSiblingCount,
    ];

    /// Column alias suffix appended to the schema prefix.
    pub const fn suffix(self) -> &'static str {
        match self {
            DerivedFact::Depth => "level",
            DerivedFact::ChildCount => "children",
            DerivedFact::LowerSiblingCount => "lower",
            DerivedFact::UpperSiblingCount => "upper",
        }
    }
}

/// Selects the derived facts a read should compute.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct ReadOptions {
    /// Compute [`DerivedFact::Depth`].
    pub depth: bool,
    /// Compute [`DerivedFact::ChildCount`].
    pub child_count: bool,
    /// Compute [`DerivedFact::LowerSiblingCount`].
    pub lower_siblings: bool,
    /// Compute [`DerivedFact::UpperSiblingCount`].
    pub upper_siblings: bool,
}

impl ReadOptions {
    /// Requests every derived fact.
    pub fn all() -> Self {
        Self {
            depth: true,
            child_count: true,
            lower_siblings: true,
            upper_siblings: true,
        }
    }

    /// Returns a copy with `fact` requested.
    pub fn with(mut self, fact: DerivedFact) -> Self {
        match fact {
            DerivedFact::Depth => self.depth = true,
            DerivedFact::ChildCount => self.child_count = true,
            DerivedFact::LowerSiblingCount => self.lower_siblings = true,
            DerivedFact::UpperSiblingCount => self.upper_siblings = true,
        }
        self
    }

    /// Whether `fact` is requested.
    pub fn contains(&self, fact: DerivedFact) -> bool {
        match fact {
            DerivedFact::Depth => self.depth,
            DerivedFact::ChildCount => self.child_count,
            DerivedFact::LowerSiblingCount => self.lower_siblings,
            DerivedFact::UpperSiblingCount => self.upper_siblings,
        }
    }

    /// Requested facts in row order.
    pub fn facts(&self) -> impl Iterator<Item = DerivedFact> + '_ {
        DerivedFact::ALL
            .into_iter()
            .filter(move |fact| self.contains(*fact))
    }
}

impl FromIterator<DerivedFact> for ReadOptions {
    fn from_iter<I: IntoIterator<Item = DerivedFact>>(iter: I) -> Self {
        iter.into_iter()
            .fold(ReadOptions::default(), |opts, fact| opts.with(fact))
    }
}

/// A node plus whichever derived facts were requested.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct NodeFacts {
    /// The stored row.
    #[serde(flatten)]
    pub node: Node,
    /// Distance from the root (root is 0).
    #[serde(skip_serializing_if = "Option::is_none")]
    pub depth: Option<i64>,
    /// Number of descendants, not only immediate children.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub child_count: Option<i64>,
    /// 0/1 flag: a left sibling exists.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub lower_siblings: Option<i64>,
    /// 0/1 flag: a right sibling exists.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub upper_siblings: Option<i64>,
}

impl NodeFacts {
    /// Value of a derived fact, if it was requested.
    pub fn fact(&self, fact: DerivedFact) -> Option<i64> {
        match fact {
            DerivedFact::Depth => self.depth,
            DerivedFact::ChildCount => self.child_count,
            DerivedFact::LowerSiblingCount => self.lower_siblings,
            DerivedFact::UpperSiblingCount => self.upper_siblings,
        }
    }
}

/// How a new node is positioned, without its target.
#[derive(Copy, Clone, Debug, Eq, PartialEq, Hash)]
pub enum InsertMode {
    /// First node of an empty table.
    Root,
    /// Only child of a leaf.
    Child,
    /// Immediately before a sibling.
    Left,
    /// Immediately after a sibling.
    Right,
}

impl fmt::Display for InsertMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            InsertMode::Root => "root",
            InsertMode::Child => "child",
            InsertMode::Left => "left-of",
            InsertMode::Right => "right-of",
        })
    }
}

/// Where a new node goes, relative to an existing one.
#[derive(Copy, Clone, Debug, Eq, PartialEq, Hash)]
pub enum Placement {
    /// The new node becomes the root.
    Root,
    /// The new node becomes the only child of the target.
    ChildOf(NodeKey),
    /// The new node becomes the target's immediate left sibling.
    LeftOf(NodeKey),
    /// The new node becomes the target's immediate right sibling.
    RightOf(NodeKey),
}

impl Placement {
    /// Combines a mode with an optional target key.
    ///
    /// A root placement ignores the target; every other mode requires one.
    pub fn from_mode(
        mode: InsertMode,
        target: Option<NodeKey>,
    ) -> Result<Self, InvalidOperation> {
        let require = |target: Option<NodeKey>| target.ok_or(InvalidOperation::MissingTarget(mode));
        Ok(match mode {
            InsertMode::Root => Placement::Root,
            InsertMode::Child => Placement::ChildOf(require(target)?),
            InsertMode::Left => Placement::LeftOf(require(target)?),
            InsertMode::Right => Placement::RightOf(require(target)?),
        })
    }

    /// The mode of this placement.
    pub fn mode(&self) -> InsertMode {
        match self {
            Placement::Root => InsertMode::Root,
            Placement::ChildOf(_) => InsertMode::Child,
            Placement::LeftOf(_) => InsertMode::Left,
            Placement::RightOf(_) => InsertMode::Right,
        }
    }

    /// The node the placement is relative to.
    pub fn target(&self) -> Option<NodeKey> {
        match self {
            Placement::Root => None,
            Placement::ChildOf(key) | Placement::LeftOf(key) | Placement::RightOf(key) => {
                Some(*key)
            }
        }
    }
}
