//! Binding paths — JSON-pointer-like paths rooted at a node's results or
//! parameters.
//!
//! A read binding points into `/results/…` of the source node; a write
//! binding points into `/parameters/…` of the target. Any other root is
//! rejected at parse time.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::WorkflowError;

/// The document a binding path is rooted at.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BindingRoot {
    /// The node's result document (read side).
    Results,
    /// The node's parameter document (write side).
    Parameters,
}

impl BindingRoot {
    /// The path segment naming this root.
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Results => "results",
            Self::Parameters => "parameters",
        }
    }
}

/// A parsed binding path: a root plus the segments below it.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct BindingPath {
    /// Which document the path addresses.
    pub root: BindingRoot,
    /// Path segments below the root. Never empty.
    pub segments: Vec<String>,
}

impl BindingPath {
    /// Parse a path of the form `/results/a/b` or `/parameters/x`.
    pub fn parse(raw: &str) -> Result<Self, WorkflowError> {
        let rest = raw
            .strip_prefix('/')
            .ok_or_else(|| WorkflowError::MalformedPath(raw.to_string()))?;
        let mut parts = rest.split('/');
        let root = match parts.next() {
            Some("results") => BindingRoot::Results,
            Some("parameters") => BindingRoot::Parameters,
            _ => return Err(WorkflowError::MalformedPath(raw.to_string())),
        };
        let segments: Vec<String> = parts.map(str::to_string).collect();
        if segments.is_empty() || segments.iter().any(String::is_empty) {
            return Err(WorkflowError::MalformedPath(raw.to_string()));
        }
        Ok(Self { root, segments })
    }

    /// Read the value this path addresses inside `doc` (the document below
    /// the root). `None` when any segment is absent.
    #[must_use]
    pub fn resolve<'a>(&self, doc: &'a Value) -> Option<&'a Value> {
        let mut current = doc;
        for segment in &self.segments {
            current = current.get(segment.as_str())?;
        }
        Some(current)
    }

    /// Write `value` at this path inside `doc`, creating intermediate
    /// objects as needed. Intermediate non-objects are replaced.
    pub fn write(&self, doc: &mut Value, value: Value) {
        if !doc.is_object() {
            *doc = Value::Object(serde_json::Map::new());
        }
        let mut current = doc;
        for segment in &self.segments[..self.segments.len() - 1] {
            let map = current.as_object_mut().expect("object ensured above");
            let entry = map
                .entry(segment.clone())
                .or_insert_with(|| Value::Object(serde_json::Map::new()));
            if !entry.is_object() {
                *entry = Value::Object(serde_json::Map::new());
            }
            current = entry;
        }
        let last = self.segments.last().expect("segments never empty");
        current
            .as_object_mut()
            .expect("object ensured above")
            .insert(last.clone(), value);
    }
}

impl fmt::Display for BindingPath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "/{}", self.root.as_str())?;
        for segment in &self.segments {
            write!(f, "/{segment}")?;
        }
        Ok(())
    }
}

impl FromStr for BindingPath {
    type Err = WorkflowError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

impl Serialize for BindingPath {
    fn serialize<S: serde::Serializer>(&self, s: S) -> Result<S::Ok, S::Error> {
        s.collect_str(self)
    }
}

impl<'de> Deserialize<'de> for BindingPath {
    fn deserialize<D: serde::Deserializer<'de>>(d: D) -> Result<Self, D::Error> {
        let raw = String::deserialize(d)?;
        Self::parse(&raw).map_err(serde::de::Error::custom)
    }
}
