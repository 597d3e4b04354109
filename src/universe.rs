//! The object universe: every fetched object, indexed for the resolver.
//!
//! Two indices are maintained: UID to node and reference key to UID. After
//! the base pass, core-group Node objects also gain alias UID entries for
//! their name and their `kubernetes.io/hostname` label, because Kubelet and
//! kube-proxy publish Events whose UID field carries the node name or
//! hostname instead of a real UID. Aliases live in a side table so a real
//! UID always shadows them.

use std::collections::HashMap;

use serde_json::Value;
use tracing::debug;

use crate::graph::Node;
use crate::identity::Uid;

/// Resolves `(group, kind)` into the plural resource name and scope, backed
/// by server discovery in production and by a fixture in tests.
pub trait ResourceMapper {
    fn rest_mapping(&self, group: &str, kind: &str) -> Option<ResourceMapping>;
}

#[derive(Debug, Clone)]
pub struct ResourceMapping {
    /// Plural resource name, e.g. "deployments".
    pub resource: String,
    pub namespaced: bool,
}

/// A mapper with no mappings; every lookup falls back to the naive plural.
#[derive(Debug, Default)]
pub struct EmptyMapper;

impl ResourceMapper for EmptyMapper {
    fn rest_mapping(&self, _group: &str, _kind: &str) -> Option<ResourceMapping> {
        None
    }
}

#[derive(Debug, Default)]
pub struct Universe {
    nodes: HashMap<Uid, Node>,
    by_key: HashMap<String, Uid>,
    aliases: HashMap<Uid, Uid>,
}

impl Universe {
    /// Builds the universe from a flat object list. Objects without a UID or
    /// kind are skipped with a debug log; duplicate UIDs and reference keys
    /// are last-write-wins, also logged.
    #[tracing::instrument(skip_all, fields(objects = objects.len()))]
    pub fn build(objects: Vec<Value>, mapper: &dyn ResourceMapper) -> Self {
        let mut universe = Universe::default();

        for manifest in objects {
            let Some(node) = node_from_manifest(manifest, mapper) else {
                continue;
            };
            let uid = node.uid.clone();
            let key = node.reference().key();
            if let Some(old) = universe.nodes.get(&uid) {
                debug!(kind = %old.kind, name = %old.name, %uid, "duplicate object uid, replacing");
            }
            if let Some(old_uid) = universe.by_key.get(&key) {
                if *old_uid != uid {
                    debug!(%key, "duplicate object key, replacing");
                }
            }
            universe.by_key.insert(key, uid.clone());
            universe.nodes.insert(uid, node);
        }

        // Alias pass for core-group Nodes, after the main pass so real UIDs
        // always win.
        let mut aliases = Vec::new();
        for node in universe.nodes.values() {
            if node.group.is_empty() && node.kind == "Node" {
                aliases.push((node.name.clone(), node.uid.clone()));
                if let Some(hostname) = node.labels().get("kubernetes.io/hostname") {
                    aliases.push((hostname.clone(), node.uid.clone()));
                }
            }
        }
        for (alias, uid) in aliases {
            if !universe.nodes.contains_key(&alias) {
                universe.aliases.insert(alias, uid);
            }
        }

        universe
    }

    /// Resolves a UID (or Node alias) to the canonical UID.
    pub fn canonical_uid(&self, uid: &str) -> Option<&Uid> {
        if let Some((canonical, _)) = self.nodes.get_key_value(uid) {
            return Some(canonical);
        }
        self.aliases.get(uid)
    }

    pub fn uid_for_key(&self, key: &str) -> Option<&Uid> {
        self.by_key.get(key)
    }

    pub fn get(&self, uid: &str) -> Option<&Node> {
        self.nodes.get(uid)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&Uid, &Node)> {
        self.nodes.iter()
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    /// Consumes the universe, handing node ownership to the resolver.
    pub(crate) fn into_nodes(self) -> (HashMap<Uid, Node>, HashMap<String, Uid>, HashMap<Uid, Uid>) {
        (self.nodes, self.by_key, self.aliases)
    }
}

fn node_from_manifest(manifest: Value, mapper: &dyn ResourceMapper) -> Option<Node> {
    let meta = manifest.get("metadata")?;
    let uid = meta.get("uid").and_then(|v| v.as_str())?.to_string();
    let name = meta
        .get("name")
        .and_then(|v| v.as_str())
        .unwrap_or_default()
        .to_string();
    let namespace = meta
        .get("namespace")
        .and_then(|v| v.as_str())
        .unwrap_or_default()
        .to_string();

    let api_version = manifest
        .get("apiVersion")
        .and_then(|v| v.as_str())
        .unwrap_or("v1");
    let (group, version) = match api_version.split_once('/') {
        Some((g, v)) => (g.to_string(), v.to_string()),
        None => (String::new(), api_version.to_string()),
    };
    let kind = manifest.get("kind").and_then(|v| v.as_str())?.to_string();

    let mapping = mapper.rest_mapping(&group, &kind);
    let resource = mapping
        .as_ref()
        .map(|m| m.resource.clone())
        .unwrap_or_else(|| format!("{}s", kind.to_lowercase()));
    let namespaced = mapping
        .map(|m| m.namespaced)
        .unwrap_or(!namespace.is_empty());

    let owner_references = meta
        .get("ownerReferences")
        .cloned()
        .and_then(|v| serde_json::from_value(v).ok())
        .unwrap_or_default();

    Some(Node {
        uid,
        name,
        namespace,
        namespaced,
        group,
        version,
        kind,
        resource,
        owner_references,
        dependencies: HashMap::new(),
        dependents: HashMap::new(),
        depth: 0,
        manifest,
    })
}
