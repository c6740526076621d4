//! # Storage Kinds and Runtime Values
//!
//! This module provides the canonical `StorageKind` enum describing how a
//! record field is stored, and the `Value` enum carrying the corresponding
//! runtime data.
//!
//! ## Type Categories
//!
//! | Category | Kinds | Storage |
//! |----------|-------|---------|
//! | **Fixed** | bool, int2, int4, int8, float4, float8 | Direct bytes at a packed offset |
//! | **Variable** | text, seq | Reference slot + payload in the var heap |
//!
//! `Seq` nests arbitrarily (`Seq(Seq(Int4))` is a vector of vectors of
//! int4), bounded by [`MAX_SEQ_DEPTH`]. The closed variant set replaces the
//! overload-resolution dispatch a template-based implementation would use:
//! one recursive encoder walks the kind tree, and the compiler checks the
//! match is exhaustive.
//!
//! ## Views
//!
//! A variable-length value never caches a pointer to its own storage.
//! The (pointer, length) view a store consumes is derived on demand by the
//! encoder ([`crate::records::encode`]) as a pure function of the owned
//! `String`/`Vec` at the moment of serialization, so there is no
//! "synchronize before read" discipline to violate and no stale view to
//! carry across copies, moves, or reallocation.

use eyre::{bail, ensure, Result};

/// Maximum `Seq` nesting depth accepted at schema construction.
pub const MAX_SEQ_DEPTH: usize = 32;

/// Storage kind of a single record field.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum StorageKind {
    Bool,
    Int2,
    Int4,
    Int8,
    Float4,
    Float8,
    /// UTF-8 text of arbitrary length.
    Text,
    /// Homogeneous sequence of the element kind, nesting allowed.
    Seq(Box<StorageKind>),
}

impl StorageKind {
    /// Convenience constructor for sequence kinds.
    pub fn seq(elem: StorageKind) -> Self {
        StorageKind::Seq(Box::new(elem))
    }

    /// Size in bytes when stored directly, or `None` for variable kinds.
    pub fn fixed_size(&self) -> Option<usize> {
        match self {
            StorageKind::Bool => Some(1),
            StorageKind::Int2 => Some(2),
            StorageKind::Int4 | StorageKind::Float4 => Some(4),
            StorageKind::Int8 | StorageKind::Float8 => Some(8),
            StorageKind::Text | StorageKind::Seq(_) => None,
        }
    }

    /// Natural alignment of the field in an in-memory record struct.
    ///
    /// Variable kinds count as an owning container (pointer-aligned).
    pub fn align(&self) -> usize {
        match self {
            StorageKind::Bool => 1,
            StorageKind::Int2 => 2,
            StorageKind::Int4 | StorageKind::Float4 => 4,
            StorageKind::Int8 | StorageKind::Float8 => 8,
            StorageKind::Text | StorageKind::Seq(_) => 8,
        }
    }

    /// In-memory footprint of the field inside a record struct.
    ///
    /// Variable kinds occupy a (ptr, len, cap) container, 24 bytes on
    /// 64-bit targets. Only used for layout accounting, never dereferenced.
    pub fn raw_size(&self) -> usize {
        self.fixed_size().unwrap_or(24)
    }

    pub fn is_variable(&self) -> bool {
        self.fixed_size().is_none()
    }

    /// Nesting depth: 0 for scalars and text, 1 + element depth for `Seq`.
    pub fn depth(&self) -> usize {
        match self {
            StorageKind::Seq(elem) => 1 + elem.depth(),
            _ => 0,
        }
    }

    /// Element kind for sequences, `None` otherwise.
    pub fn elem(&self) -> Option<&StorageKind> {
        match self {
            StorageKind::Seq(elem) => Some(elem),
            _ => None,
        }
    }
}

/// Runtime value of a record field.
///
/// `Seq` owns its elements; homogeneity is enforced against the schema at
/// push time, not by the enum itself.
#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    Bool(bool),
    Int2(i16),
    Int4(i32),
    Int8(i64),
    Float4(f32),
    Float8(f64),
    Text(String),
    Seq(Vec<Value>),
}

impl Value {
    /// Recursive structural check against a storage kind.
    pub fn kind_matches(&self, kind: &StorageKind) -> bool {
        match (self, kind) {
            (Value::Bool(_), StorageKind::Bool) => true,
            (Value::Int2(_), StorageKind::Int2) => true,
            (Value::Int4(_), StorageKind::Int4) => true,
            (Value::Int8(_), StorageKind::Int8) => true,
            (Value::Float4(_), StorageKind::Float4) => true,
            (Value::Float8(_), StorageKind::Float8) => true,
            (Value::Text(_), StorageKind::Text) => true,
            (Value::Seq(items), StorageKind::Seq(elem)) => {
                items.iter().all(|item| item.kind_matches(elem))
            }
            _ => false,
        }
    }

    /// Appends an element to a sequence value.
    pub fn push(&mut self, item: Value) -> Result<()> {
        match self {
            Value::Seq(items) => {
                items.push(item);
                Ok(())
            }
            other => bail!("push on non-sequence value ({})", other.describe()),
        }
    }

    /// Appends text to a text value.
    pub fn push_str(&mut self, s: &str) -> Result<()> {
        match self {
            Value::Text(text) => {
                text.push_str(s);
                Ok(())
            }
            other => bail!("push_str on non-text value ({})", other.describe()),
        }
    }

    /// Logical length of a variable value: element count for sequences,
    /// byte count for text. `None` for scalars.
    pub fn len(&self) -> Option<usize> {
        match self {
            Value::Seq(items) => Some(items.len()),
            Value::Text(text) => Some(text.len()),
            _ => None,
        }
    }

    pub fn is_empty(&self) -> Option<bool> {
        self.len().map(|len| len == 0)
    }

    /// Child values for sequences, `None` otherwise.
    pub fn children(&self) -> Option<&[Value]> {
        match self {
            Value::Seq(items) => Some(items),
            _ => None,
        }
    }

    pub(crate) fn describe(&self) -> &'static str {
        match self {
            Value::Bool(_) => "bool",
            Value::Int2(_) => "int2",
            Value::Int4(_) => "int4",
            Value::Int8(_) => "int8",
            Value::Float4(_) => "float4",
            Value::Float8(_) => "float8",
            Value::Text(_) => "text",
            Value::Seq(_) => "seq",
        }
    }
}

/// Validates a kind for use in a schema: depth-bounded.
pub(crate) fn check_kind(kind: &StorageKind) -> Result<()> {
    ensure!(
        kind.depth() <= MAX_SEQ_DEPTH,
        "sequence nesting depth {} exceeds maximum {}",
        kind.depth(),
        MAX_SEQ_DEPTH
    );
    Ok(())
}

impl From<bool> for Value {
    fn from(v: bool) -> Self {
        Value::Bool(v)
    }
}

impl From<i16> for Value {
    fn from(v: i16) -> Self {
        Value::Int2(v)
    }
}

impl From<i32> for Value {
    fn from(v: i32) -> Self {
        Value::Int4(v)
    }
}

impl From<i64> for Value {
    fn from(v: i64) -> Self {
        Value::Int8(v)
    }
}

impl From<f32> for Value {
    fn from(v: f32) -> Self {
        Value::Float4(v)
    }
}

impl From<f64> for Value {
    fn from(v: f64) -> Self {
        Value::Float8(v)
    }
}

impl From<&str> for Value {
    fn from(v: &str) -> Self {
        Value::Text(v.to_string())
    }
}

impl From<String> for Value {
    fn from(v: String) -> Self {
        Value::Text(v)
    }
}

impl<T: Into<Value>> From<Vec<T>> for Value {
    fn from(items: Vec<T>) -> Self {
        Value::Seq(items.into_iter().map(Into::into).collect())
    }
}
