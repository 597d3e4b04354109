//! The resolved relationship graph: nodes keyed by UID with typed edge sets
//! in both directions.

use std::collections::{BTreeMap, HashMap};

use k8s_openapi::apimachinery::pkg::apis::meta::v1::OwnerReference;
use serde_json::Value;

use crate::identity::{ObjectReference, Uid};
use crate::relationships::{Relationship, RelationshipSet};

/// Traversal direction through the graph.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Direction {
    /// Follow edges toward objects the current one depends on.
    Dependencies,
    /// Follow edges toward objects that depend on the current one.
    Dependents,
}

/// A Kubernetes object in the relationship graph.
#[derive(Debug, Clone)]
pub struct Node {
    /// The full manifest as fetched from the cluster.
    pub manifest: Value,
    pub uid: Uid,
    pub group: String,
    pub version: String,
    pub kind: String,
    /// Plural resource name, e.g. "deployments".
    pub resource: String,
    pub namespaced: bool,
    pub namespace: String,
    pub name: String,
    pub owner_references: Vec<OwnerReference>,
    pub dependencies: HashMap<Uid, RelationshipSet>,
    pub dependents: HashMap<Uid, RelationshipSet>,
    /// Minimum BFS distance from any root; 0 for roots.
    pub depth: u32,
}

impl Node {
    pub fn add_dependency(&mut self, uid: impl Into<Uid>, rel: Relationship) {
        self.dependencies.entry(uid.into()).or_default().insert(rel);
    }

    pub fn add_dependent(&mut self, uid: impl Into<Uid>, rel: Relationship) {
        self.dependents.entry(uid.into()).or_default().insert(rel);
    }

    /// The neighbor map for the chosen traversal direction.
    pub fn deps(&self, direction: Direction) -> &HashMap<Uid, RelationshipSet> {
        match direction {
            Direction::Dependencies => &self.dependencies,
            Direction::Dependents => &self.dependents,
        }
    }

    pub fn reference(&self) -> ObjectReference {
        ObjectReference {
            group: self.group.clone(),
            kind: self.kind.clone(),
            namespace: self.namespace.clone(),
            name: self.name.clone(),
        }
    }

    pub fn labels(&self) -> BTreeMap<String, String> {
        string_map(self.manifest.get("metadata").and_then(|m| m.get("labels")))
    }

    pub fn annotations(&self) -> BTreeMap<String, String> {
        string_map(self.manifest.get("metadata").and_then(|m| m.get("annotations")))
    }

    /// Walks `path` through the manifest and returns the string at the end,
    /// if present and actually a string.
    pub fn nested_str(&self, path: &[&str]) -> Option<&str> {
        let mut cur = &self.manifest;
        for p in path {
            cur = cur.get(p)?;
        }
        cur.as_str()
    }
}

fn string_map(value: Option<&Value>) -> BTreeMap<String, String> {
    value
        .and_then(|v| v.as_object())
        .map(|obj| {
            obj.iter()
                .filter_map(|(k, v)| v.as_str().map(|v| (k.clone(), v.to_string())))
                .collect()
        })
        .unwrap_or_default()
}

/// The resolved graph: UID to node. Roots carry depth 0.
pub type NodeMap = HashMap<Uid, Node>;

/// Sort key giving the deterministic output order: namespace, kind, group,
/// name.
pub fn node_sort_key(node: &Node) -> (String, String, String, String) {
    (
        node.namespace.clone(),
        node.kind.clone(),
        node.group.clone(),
        node.name.clone(),
    )
}
