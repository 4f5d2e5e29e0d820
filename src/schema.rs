#![forbid(unsafe_code)]

//! Mapping from the logical roles of a nested-set table to physical names.
//!
//! A [`Schema`] is built once through [`SchemaBuilder`] and shared read-only by
//! every other component. All names are validated as plain SQL identifiers
//! because they are interpolated (quoted) into generated statements.

use std::collections::HashSet;

use crate::error::{NestedSetError, Result};
use crate::model::DerivedFact;

/// Default primary key column name.
pub const DEFAULT_KEY_COLUMN: &str = "id";
/// Default left bound column name.
pub const DEFAULT_LEFT_COLUMN: &str = "lft";
/// Default right bound column name.
pub const DEFAULT_RIGHT_COLUMN: &str = "rgt";
/// Default prefix for derived fact aliases.
pub const DEFAULT_PREFIX: &str = "ns_";

/// Immutable table/column binding for one tree.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Schema {
    table: String,
    key_column: String,
    left_column: String,
    right_column: String,
    payload_columns: Vec<String>,
    prefix: String,
}

impl Schema {
    /// Starts a builder for `table` with the default column names.
    pub fn builder(table: impl Into<String>) -> SchemaBuilder {
        SchemaBuilder::new(table)
    }

    /// Table holding the tree.
    pub fn table(&self) -> &str {
        &self.table
    }

    /// Primary key column.
    pub fn key_column(&self) -> &str {
        &self.key_column
    }

    /// Left bound column.
    pub fn left_column(&self) -> &str {
        &self.left_column
    }

    /// Right bound column.
    pub fn right_column(&self) -> &str {
        &self.right_column
    }

    /// Payload columns in declaration order.
    pub fn payload_columns(&self) -> &[String] {
        &self.payload_columns
    }

    /// Prefix prepended to derived fact aliases.
    pub fn prefix(&self) -> &str {
        &self.prefix
    }

    /// Whether `column` is a declared payload column.
    pub fn has_payload_column(&self, column: &str) -> bool {
        self.payload_columns.iter().any(|c| c == column)
    }

    /// Result column alias of a derived fact, e.g. `ns_level`.
    pub fn fact_alias(&self, fact: DerivedFact) -> String {
        format!("{}{}", self.prefix, fact.suffix())
    }
}

/// Builder for [`Schema`]; validation happens in [`SchemaBuilder::build`].
#[derive(Clone, Debug)]
pub struct SchemaBuilder {
    table: String,
    key_column: String,
    left_column: String,
    right_column: String,
    payload_columns: Vec<String>,
    prefix: String,
}

impl SchemaBuilder {
    /// Creates a builder for `table` with default key/left/right names.
    pub fn new(table: impl Into<String>) -> Self {
        Self {
            table: table.into(),
            key_column: DEFAULT_KEY_COLUMN.to_string(),
            left_column: DEFAULT_LEFT_COLUMN.to_string(),
            right_column: DEFAULT_RIGHT_COLUMN.to_string(),
            payload_columns: Vec::new(),
            prefix: DEFAULT_PREFIX.to_string(),
        }
    }

    /// Overrides the primary key column.
    pub fn key_column(mut self, name: impl Into<String>) -> Self {
        self.key_column = name.into();
        self
    }

    /// Overrides the left bound column.
    pub fn left_column(mut self, name: impl Into<String>) -> Self {
        self.left_column = name.into();
        self
    }

    /// Overrides the right bound column.
    pub fn right_column(mut self, name: impl Into<String>) -> Self {
        self.right_column = name.into();
        self
    }

    /// Appends one payload column.
    pub fn payload_column(mut self, name: impl Into<String>) -> Self {
        self.payload_columns.push(name.into());
        self
    }

    /// Appends several payload columns, keeping their order.
    pub fn payload_columns<I, S>(mut self, names: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.payload_columns
            .extend(names.into_iter().map(Into::into));
        self
    }

    /// Overrides the derived fact prefix. May be empty.
    pub fn prefix(mut self, prefix: impl Into<String>) -> Self {
        self.prefix = prefix.into();
        self
    }

    /// Validates every name and freezes the binding.
    pub fn build(self) -> Result<Schema> {
        validate_identifier("table", &self.table)?;
        validate_identifier("key column", &self.key_column)?;
        validate_identifier("left column", &self.left_column)?;
        validate_identifier("right column", &self.right_column)?;
        if !self.prefix.is_empty() && !is_identifier_fragment(&self.prefix) {
            return Err(NestedSetError::configuration(format!(
                "prefix '{}' is not a valid prefix",
                self.prefix
            )));
        }

        let mut reserved: HashSet<String> = HashSet::new();
        for name in [&self.key_column, &self.left_column, &self.right_column] {
            if !reserved.insert(name.to_ascii_lowercase()) {
                return Err(NestedSetError::configuration(format!(
                    "column '{name}' is bound to more than one role"
                )));
            }
        }
        let aliases: HashSet<String> = DerivedFact::ALL
            .iter()
            .map(|fact| format!("{}{}", self.prefix, fact.suffix()).to_ascii_lowercase())
            .collect();

        let mut seen: HashSet<String> = HashSet::new();
        for column in &self.payload_columns {
            validate_identifier("payload column", column)?;
            let folded = column.to_ascii_lowercase();
            if reserved.contains(&folded) {
                return Err(NestedSetError::configuration(format!(
                    "payload column '{column}' collides with the key or bound columns"
                )));
            }
            if aliases.contains(&folded) {
                return Err(NestedSetError::configuration(format!(
                    "payload column '{column}' collides with a derived fact alias"
                )));
            }
            if !seen.insert(folded) {
                return Err(NestedSetError::configuration(format!(
                    "payload column '{column}' is declared twice"
                )));
            }
        }

        Ok(Schema {
            table: self.table,
            key_column: self.key_column,
            left_column: self.left_column,
            right_column: self.right_column,
            payload_columns: self.payload_columns,
            prefix: self.prefix,
        })
    }
}

/// Double-quotes an identifier that already passed validation.
pub(crate) fn quote(name: &str) -> String {
    format!("\"{name}\"")
}

fn validate_identifier(role: &str, name: &str) -> Result<()> {
    if name.is_empty() {
        return Err(NestedSetError::configuration(format!(
            "{role} name must not be empty"
        )));
    }
    let starts_well = name
        .chars()
        .next()
        .is_some_and(|c| c.is_ascii_alphabetic() || c == '_');
    if !starts_well || !is_identifier_fragment(name) {
        return Err(NestedSetError::configuration(format!(
            "'{name}' is not a valid {role} name"
        )));
    }
    Ok(())
}

fn is_identifier_fragment(value: &str) -> bool {
    value.chars().all(|c| c.is_ascii_alphanumeric() || c == '_')
}
