// SPDX-License-Identifier: PolyForm-Noncommercial-1.0.0
// Copyright (c) 2025 Sylvex. All rights reserved.

//! Core types for address-space mirroring.
//!
//! This module provides the value-level vocabulary shared by every MIRA
//! component:
//!
//! - **NodeId**: all four OPC UA node identifier forms with parsing and
//!   formatting of the `ns=<n>;<kind>=<value>` notation
//! - **NodeClass**: the subset of node classes the mirror distinguishes
//! - **Value**: typed node values with a stable content hash used for
//!   change detection between sync cycles
//!
//! # Examples
//!
//! ```
//! use mira_core::types::{NodeId, Value};
//!
//! // Numeric node ID (most common)
//! let numeric = NodeId::numeric(2, 1001);
//!
//! // String node ID
//! let string = NodeId::string(2, "Device1.Temperature");
//!
//! // Parse from string notation
//! let parsed: NodeId = "ns=2;s=Device1.Temperature".parse().unwrap();
//! assert_eq!(parsed, string);
//!
//! // Values hash stably for change detection
//! assert_eq!(Value::Double(20.0).content_hash(), Value::Double(20.0).content_hash());
//! ```

use std::fmt;
use std::hash::{Hash, Hasher};
use std::str::FromStr;

use base64::{engine::general_purpose::STANDARD as BASE64, Engine};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::IdentityError;

// =============================================================================
// NodeId
// =============================================================================

/// OPC UA node identifier.
///
/// A `NodeId` uniquely identifies a node within a session's namespace and is
/// stable across resync cycles for the same logical node, which makes it the
/// join key between source nodes and their mirror records.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct NodeId {
    /// Namespace index (0 = OPC UA standard namespace).
    pub namespace_index: u16,

    /// The node identifier.
    pub identifier: NodeIdentifier,
}

impl NodeId {
    // =========================================================================
    // Constructors
    // =========================================================================

    /// Creates a numeric node ID.
    #[inline]
    pub fn numeric(namespace_index: u16, value: u32) -> Self {
        Self {
            namespace_index,
            identifier: NodeIdentifier::Numeric(value),
        }
    }

    /// Creates a string node ID.
    #[inline]
    pub fn string(namespace_index: u16, value: impl Into<String>) -> Self {
        Self {
            namespace_index,
            identifier: NodeIdentifier::String(value.into()),
        }
    }

    /// Creates a GUID node ID.
    #[inline]
    pub fn guid(namespace_index: u16, value: Uuid) -> Self {
        Self {
            namespace_index,
            identifier: NodeIdentifier::Guid(value),
        }
    }

    /// Creates an opaque (byte string) node ID.
    #[inline]
    pub fn opaque(namespace_index: u16, value: Vec<u8>) -> Self {
        Self {
            namespace_index,
            identifier: NodeIdentifier::Opaque(value),
        }
    }

    // =========================================================================
    // Standard Node IDs
    // =========================================================================

    /// Root folder node (ns=0, i=84).
    pub const ROOT_FOLDER: NodeId = NodeId {
        namespace_index: 0,
        identifier: NodeIdentifier::Numeric(84),
    };

    /// Objects folder node (ns=0, i=85).
    pub const OBJECTS_FOLDER: NodeId = NodeId {
        namespace_index: 0,
        identifier: NodeIdentifier::Numeric(85),
    };

    // =========================================================================
    // Properties
    // =========================================================================

    /// Returns `true` if this is a numeric identifier.
    #[inline]
    pub const fn is_numeric(&self) -> bool {
        matches!(self.identifier, NodeIdentifier::Numeric(_))
    }

    /// Returns `true` if this is a string identifier.
    #[inline]
    pub const fn is_string(&self) -> bool {
        matches!(self.identifier, NodeIdentifier::String(_))
    }

    /// Returns `true` if this is in the standard namespace (ns=0).
    #[inline]
    pub const fn is_standard(&self) -> bool {
        self.namespace_index == 0
    }

    /// Returns `true` if this is the null node ID (ns=0, i=0).
    #[inline]
    pub fn is_null(&self) -> bool {
        self.namespace_index == 0 && matches!(self.identifier, NodeIdentifier::Numeric(0))
    }
}

impl fmt::Display for NodeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.namespace_index != 0 {
            write!(f, "ns={};", self.namespace_index)?;
        }
        match &self.identifier {
            NodeIdentifier::Numeric(v) => write!(f, "i={}", v),
            NodeIdentifier::String(v) => write!(f, "s={}", v),
            NodeIdentifier::Guid(v) => write!(f, "g={}", v),
            NodeIdentifier::Opaque(v) => write!(f, "b={}", BASE64.encode(v)),
        }
    }
}

impl FromStr for NodeId {
    type Err = IdentityError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let mut namespace_index = 0u16;
        let mut rest = s.trim();

        if let Some(stripped) = rest.strip_prefix("ns=") {
            let (ns, tail) = stripped
                .split_once(';')
                .ok_or_else(|| IdentityError::malformed(s, "missing ';' after namespace"))?;
            namespace_index = ns
                .parse()
                .map_err(|_| IdentityError::malformed(s, "namespace index is not a u16"))?;
            rest = tail;
        }

        let (kind, value) = rest
            .split_once('=')
            .ok_or_else(|| IdentityError::malformed(s, "missing identifier kind"))?;

        let identifier = match kind {
            "i" => NodeIdentifier::Numeric(
                value
                    .parse()
                    .map_err(|_| IdentityError::malformed(s, "numeric identifier is not a u32"))?,
            ),
            "s" => NodeIdentifier::String(value.to_string()),
            "g" => NodeIdentifier::Guid(
                Uuid::parse_str(value)
                    .map_err(|_| IdentityError::malformed(s, "identifier is not a valid GUID"))?,
            ),
            "b" => NodeIdentifier::Opaque(
                BASE64
                    .decode(value)
                    .map_err(|_| IdentityError::malformed(s, "identifier is not valid base64"))?,
            ),
            other => {
                return Err(IdentityError::malformed(
                    s,
                    format!("unknown identifier kind '{}'", other),
                ))
            }
        };

        Ok(Self {
            namespace_index,
            identifier,
        })
    }
}

// =============================================================================
// NodeIdentifier
// =============================================================================

/// The identifier portion of a [`NodeId`].
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum NodeIdentifier {
    /// Numeric identifier (most common, most efficient).
    Numeric(u32),

    /// String identifier (human-readable).
    String(String),

    /// Globally unique identifier.
    Guid(Uuid),

    /// Opaque byte-string identifier.
    Opaque(Vec<u8>),
}

// =============================================================================
// NodeClass
// =============================================================================

/// The node classes the mirror distinguishes.
///
/// Only Objects and Variables are replicated onto the target. Every other
/// class is carried through snapshots as [`NodeClass::Unsupported`] so that
/// downstream components can see it was observed, but no operation is ever
/// emitted for it. Unsupported nodes are treated as leaves: the walker does
/// not descend into them (policy, not failure).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NodeClass {
    /// A structural node that can contain children.
    Object,

    /// A node carrying a readable (and on the mirror, writable) value.
    Variable,

    /// Any other node class, carrying the raw OPC UA class value.
    Unsupported(u32),
}

impl NodeClass {
    /// Creates a node class from the raw OPC UA class value.
    pub fn from_value(value: u32) -> Self {
        match value {
            1 => Self::Object,
            2 => Self::Variable,
            other => Self::Unsupported(other),
        }
    }

    /// Returns the raw OPC UA class value.
    pub fn value(&self) -> u32 {
        match self {
            Self::Object => 1,
            Self::Variable => 2,
            Self::Unsupported(v) => *v,
        }
    }

    /// Returns `true` if nodes of this class are replicated onto the target.
    #[inline]
    pub const fn is_mirrored(&self) -> bool {
        matches!(self, Self::Object | Self::Variable)
    }

    /// Returns `true` if nodes of this class can carry a value.
    #[inline]
    pub const fn has_value(&self) -> bool {
        matches!(self, Self::Variable)
    }
}

impl fmt::Display for NodeClass {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Object => write!(f, "Object"),
            Self::Variable => write!(f, "Variable"),
            Self::Unsupported(v) => write!(f, "Unsupported({})", v),
        }
    }
}

// =============================================================================
// Value
// =============================================================================

/// A typed node value.
///
/// Covers the scalar types observed on Variable nodes plus one-dimensional
/// arrays. The [`content_hash`](Value::content_hash) is what mirror records
/// store for change detection; it is stable across process restarts for the
/// same logical value (floats hash via their bit pattern).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Value {
    /// Boolean value.
    Boolean(bool),

    /// Signed byte.
    SByte(i8),

    /// Unsigned byte.
    Byte(u8),

    /// 16-bit signed integer.
    Int16(i16),

    /// 16-bit unsigned integer.
    UInt16(u16),

    /// 32-bit signed integer.
    Int32(i32),

    /// 32-bit unsigned integer.
    UInt32(u32),

    /// 64-bit signed integer.
    Int64(i64),

    /// 64-bit unsigned integer.
    UInt64(u64),

    /// 32-bit float.
    Float(f32),

    /// 64-bit double.
    Double(f64),

    /// UTF-8 string.
    String(String),

    /// Timestamp value.
    DateTime(DateTime<Utc>),

    /// Raw byte string.
    ByteString(Vec<u8>),

    /// One-dimensional array of values.
    Array(Vec<Value>),
}

impl Value {
    /// Returns the type name for logging and diagnostics.
    pub fn type_name(&self) -> &'static str {
        match self {
            Self::Boolean(_) => "Boolean",
            Self::SByte(_) => "SByte",
            Self::Byte(_) => "Byte",
            Self::Int16(_) => "Int16",
            Self::UInt16(_) => "UInt16",
            Self::Int32(_) => "Int32",
            Self::UInt32(_) => "UInt32",
            Self::Int64(_) => "Int64",
            Self::UInt64(_) => "UInt64",
            Self::Float(_) => "Float",
            Self::Double(_) => "Double",
            Self::String(_) => "String",
            Self::DateTime(_) => "DateTime",
            Self::ByteString(_) => "ByteString",
            Self::Array(_) => "Array",
        }
    }

    /// Returns the value as `f64` if it is numeric.
    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Self::SByte(v) => Some(*v as f64),
            Self::Byte(v) => Some(*v as f64),
            Self::Int16(v) => Some(*v as f64),
            Self::UInt16(v) => Some(*v as f64),
            Self::Int32(v) => Some(*v as f64),
            Self::UInt32(v) => Some(*v as f64),
            Self::Int64(v) => Some(*v as f64),
            Self::UInt64(v) => Some(*v as f64),
            Self::Float(v) => Some(*v as f64),
            Self::Double(v) => Some(*v),
            _ => None,
        }
    }

    /// Returns the value as `i64` if it is an integer.
    pub fn as_i64(&self) -> Option<i64> {
        match self {
            Self::SByte(v) => Some(*v as i64),
            Self::Byte(v) => Some(*v as i64),
            Self::Int16(v) => Some(*v as i64),
            Self::UInt16(v) => Some(*v as i64),
            Self::Int32(v) => Some(*v as i64),
            Self::UInt32(v) => Some(*v as i64),
            Self::Int64(v) => Some(*v),
            _ => None,
        }
    }

    /// Returns the value as `bool` if it is a boolean.
    pub fn as_bool(&self) -> Option<bool> {
        match self {
            Self::Boolean(v) => Some(*v),
            _ => None,
        }
    }

    /// Returns the value as `&str` if it is a string.
    pub fn as_str(&self) -> Option<&str> {
        match self {
            Self::String(v) => Some(v),
            _ => None,
        }
    }

    /// Returns a stable hash of the value's content.
    ///
    /// Two values with identical content always produce the same hash, which
    /// is what mirror records compare to decide whether an update operation
    /// is needed.
    pub fn content_hash(&self) -> u64 {
        let mut hasher = std::collections::hash_map::DefaultHasher::new();
        self.hash(&mut hasher);
        hasher.finish()
    }
}

impl Hash for Value {
    fn hash<H: Hasher>(&self, state: &mut H) {
        std::mem::discriminant(self).hash(state);
        match self {
            Self::Boolean(v) => v.hash(state),
            Self::SByte(v) => v.hash(state),
            Self::Byte(v) => v.hash(state),
            Self::Int16(v) => v.hash(state),
            Self::UInt16(v) => v.hash(state),
            Self::Int32(v) => v.hash(state),
            Self::UInt32(v) => v.hash(state),
            Self::Int64(v) => v.hash(state),
            Self::UInt64(v) => v.hash(state),
            // Floats hash via bit pattern so the hash is well-defined.
            Self::Float(v) => v.to_bits().hash(state),
            Self::Double(v) => v.to_bits().hash(state),
            Self::String(v) => v.hash(state),
            Self::DateTime(v) => v.timestamp_micros().hash(state),
            Self::ByteString(v) => v.hash(state),
            Self::Array(v) => {
                v.len().hash(state);
                for item in v {
                    item.hash(state);
                }
            }
        }
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Boolean(v) => write!(f, "{}", v),
            Self::SByte(v) => write!(f, "{}", v),
            Self::Byte(v) => write!(f, "{}", v),
            Self::Int16(v) => write!(f, "{}", v),
            Self::UInt16(v) => write!(f, "{}", v),
            Self::Int32(v) => write!(f, "{}", v),
            Self::UInt32(v) => write!(f, "{}", v),
            Self::Int64(v) => write!(f, "{}", v),
            Self::UInt64(v) => write!(f, "{}", v),
            Self::Float(v) => write!(f, "{}", v),
            Self::Double(v) => write!(f, "{}", v),
            Self::String(v) => write!(f, "{}", v),
            Self::DateTime(v) => write!(f, "{}", v.to_rfc3339()),
            Self::ByteString(v) => write!(f, "<{} bytes>", v.len()),
            Self::Array(v) => write!(f, "<array of {}>", v.len()),
        }
    }
}

// =============================================================================
// Hash helper for optional values
// =============================================================================

/// Returns the content hash of an optional value.
///
/// Absent values (unreadable at capture time) hash to a fixed sentinel so
/// that readable -> unreadable transitions are detected as changes.
pub fn optional_content_hash(value: Option<&Value>) -> u64 {
    match value {
        Some(v) => v.content_hash(),
        None => 0,
    }
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn node_id_display_roundtrip() {
        let cases = vec![
            NodeId::numeric(0, 85),
            NodeId::numeric(2, 1001),
            NodeId::string(2, "Device1.Temperature"),
            NodeId::guid(3, Uuid::nil()),
            NodeId::opaque(1, vec![0xde, 0xad, 0xbe, 0xef]),
        ];

        for id in cases {
            let text = id.to_string();
            let parsed: NodeId = text.parse().unwrap();
            assert_eq!(parsed, id, "roundtrip failed for {}", text);
        }
    }

    #[test]
    fn node_id_parse_standard_namespace() {
        let id: NodeId = "i=85".parse().unwrap();
        assert_eq!(id, NodeId::OBJECTS_FOLDER);
        assert!(id.is_standard());
    }

    #[test]
    fn node_id_parse_rejects_garbage() {
        assert!("".parse::<NodeId>().is_err());
        assert!("ns=2".parse::<NodeId>().is_err());
        assert!("ns=2;x=1".parse::<NodeId>().is_err());
        assert!("ns=notanumber;i=1".parse::<NodeId>().is_err());
        assert!("i=notanumber".parse::<NodeId>().is_err());
    }

    #[test]
    fn node_class_mapping() {
        assert_eq!(NodeClass::from_value(1), NodeClass::Object);
        assert_eq!(NodeClass::from_value(2), NodeClass::Variable);
        assert_eq!(NodeClass::from_value(4), NodeClass::Unsupported(4));

        assert!(NodeClass::Object.is_mirrored());
        assert!(NodeClass::Variable.is_mirrored());
        assert!(!NodeClass::Unsupported(4).is_mirrored());
        assert!(NodeClass::Variable.has_value());
        assert!(!NodeClass::Object.has_value());
    }

    #[test]
    fn value_content_hash_is_stable() {
        assert_eq!(
            Value::Double(20.0).content_hash(),
            Value::Double(20.0).content_hash()
        );
        assert_ne!(
            Value::Double(20.0).content_hash(),
            Value::Double(21.0).content_hash()
        );
        // Same numeric value, different type: different hash.
        assert_ne!(
            Value::Int32(1).content_hash(),
            Value::Int64(1).content_hash()
        );
    }

    #[test]
    fn optional_hash_detects_unreadable_transition() {
        let readable = optional_content_hash(Some(&Value::Int32(5)));
        let unreadable = optional_content_hash(None);
        assert_ne!(readable, unreadable);
    }

    #[test]
    fn value_accessors() {
        assert_eq!(Value::Double(2.5).as_f64(), Some(2.5));
        assert_eq!(Value::Int32(7).as_i64(), Some(7));
        assert_eq!(Value::Boolean(true).as_bool(), Some(true));
        assert_eq!(Value::String("x".into()).as_str(), Some("x"));
        assert_eq!(Value::String("x".into()).as_f64(), None);
    }
}
