use std::collections::{BTreeMap, BTreeSet};
use std::fmt;
use std::sync::Arc;

use serde_json::Value;

/// Raw payload as returned by a remote collaborator.
pub type Payload = Value;

/// Resource kind identifier, e.g. `"instances"`.
pub type KindId = &'static str;

/// Weak cross-reference to a resource of another kind. Resolved through the
/// cache engine, never owned.
#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ResourceRef {
    pub kind: KindId,
    pub id: String,
}

impl ResourceRef {
    pub fn new(kind: KindId, id: impl Into<String>) -> Self {
        Self {
            kind,
            id: id.into(),
        }
    }
}

impl fmt::Display for ResourceRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.kind, self.id)
    }
}

#[derive(Clone, Debug, PartialEq)]
pub struct ResourceRecord {
    pub id: String,
    pub attributes: BTreeMap<String, Value>,
    /// Full describe payload; fetched on demand.
    pub raw: Option<Arc<Payload>>,
    /// Relation targets extracted from `raw`, once it is known.
    pub relations: BTreeSet<ResourceRef>,
}

impl ResourceRecord {
    pub fn new(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            attributes: BTreeMap::new(),
            raw: None,
            relations: BTreeSet::new(),
        }
    }

    pub fn with_attr(mut self, name: &str, value: Value) -> Self {
        self.attributes.insert(name.to_string(), value);
        self
    }

    pub fn attr(&self, name: &str) -> Option<&Value> {
        self.attributes.get(name).filter(|v| !v.is_null())
    }

    /// Attribute rendered as display text; empty when absent.
    pub fn attr_text(&self, name: &str) -> String {
        match self.attr(name) {
            None => String::new(),
            Some(Value::String(s)) => s.clone(),
            Some(v) => v.to_string(),
        }
    }

    pub fn attr_i64(&self, name: &str) -> Option<i64> {
        match self.attr(name)? {
            Value::Number(n) => n.as_i64(),
            Value::String(s) => s.trim().parse().ok(),
            _ => None,
        }
    }

    /// Case-insensitive substring match over the id and attribute values.
    pub fn matches_filter(&self, filter: &str) -> bool {
        let q = filter.trim().to_lowercase();
        if q.is_empty() {
            return true;
        }
        if self.id.to_lowercase().contains(&q) {
            return true;
        }
        self.attributes
            .keys()
            .any(|k| self.attr_text(k).to_lowercase().contains(&q))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn filter_checks_id_and_attributes() {
        let rec = ResourceRecord::new("i-0abc")
            .with_attr("name", json!("web-frontend"))
            .with_attr("state", json!("running"));
        assert!(rec.matches_filter(""));
        assert!(rec.matches_filter("0AB"));
        assert!(rec.matches_filter("front"));
        assert!(!rec.matches_filter("stopped"));
    }

    #[test]
    fn null_attributes_read_as_absent() {
        let rec = ResourceRecord::new("x")
            .with_attr("ip", Value::Null)
            .with_attr("min", json!(2))
            .with_attr("max", json!("5"));
        assert!(rec.attr("ip").is_none());
        assert_eq!(rec.attr_text("ip"), "");
        assert_eq!(rec.attr_i64("min"), Some(2));
        assert_eq!(rec.attr_i64("max"), Some(5));
    }
}
