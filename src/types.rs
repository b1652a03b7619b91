//! Closed set of value kinds flowing through query resolution.

use std::fmt;

use crate::entities::{Graph, GraphMetadata};

/// Kind of a resolved value. There is no implicit coercion between kinds.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum ValueKind {
    Graph,
    GraphMetadata,
    Integer,
    String,
}

impl ValueKind {
    /// Return the canonical name for this kind.
    pub fn as_atom(self) -> &'static str {
        match self {
            ValueKind::Graph => "Graph",
            ValueKind::GraphMetadata => "GraphMetadata",
            ValueKind::Integer => "Integer",
            ValueKind::String => "String",
        }
    }

    pub fn from_sigil(sigil: char) -> Option<ValueKind> {
        match sigil {
            '$' => Some(ValueKind::Graph),
            '@' => Some(ValueKind::GraphMetadata),
            _ => None,
        }
    }
}

impl fmt::Display for ValueKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_atom())
    }
}

/// A value tagged with its kind.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum TypedValue {
    Graph(Graph),
    GraphMetadata(GraphMetadata),
    Integer(i64),
    String(String),
}

impl TypedValue {
    pub fn kind(&self) -> ValueKind {
        match self {
            TypedValue::Graph(_) => ValueKind::Graph,
            TypedValue::GraphMetadata(_) => ValueKind::GraphMetadata,
            TypedValue::Integer(_) => ValueKind::Integer,
            TypedValue::String(_) => ValueKind::String,
        }
    }

    pub fn as_graph(&self) -> Option<&Graph> {
        match self {
            TypedValue::Graph(graph) => Some(graph),
            _ => None,
        }
    }

    pub fn as_integer(&self) -> Option<i64> {
        match self {
            TypedValue::Integer(n) => Some(*n),
            _ => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            TypedValue::String(s) => Some(s),
            _ => None,
        }
    }
}

/// Canonical rendering: entities print their name, scalars print their value.
impl fmt::Display for TypedValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TypedValue::Graph(graph) => f.write_str(graph.name()),
            TypedValue::GraphMetadata(metadata) => f.write_str(metadata.name()),
            TypedValue::Integer(n) => write!(f, "{n}"),
            TypedValue::String(s) => f.write_str(s),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn canonical_rendering() {
        assert_eq!(TypedValue::Graph(Graph::new("trace_4")).to_string(), "trace_4");
        assert_eq!(
            TypedValue::GraphMetadata(GraphMetadata::new("meta_2")).to_string(),
            "meta_2"
        );
        assert_eq!(TypedValue::Integer(-3).to_string(), "-3");
        assert_eq!(TypedValue::String("a b".into()).to_string(), "a b");
    }

    #[test]
    fn sigils_map_to_entity_kinds() {
        assert_eq!(ValueKind::from_sigil('$'), Some(ValueKind::Graph));
        assert_eq!(ValueKind::from_sigil('@'), Some(ValueKind::GraphMetadata));
        assert_eq!(ValueKind::from_sigil('#'), None);
    }
}
