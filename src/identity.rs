//! Object identity: the three addressing modes extractors use to point at
//! other objects before their UIDs are known.
//!
//! Keys use `\` as the field separator. Backslashes cannot appear in
//! Kubernetes names, namespaces or group names, and the three key spaces
//! carry distinct field counts, so keys never collide across maps.

use std::collections::BTreeSet;

use crate::selector::Selector;

/// Cluster-assigned object UID. Opaque; unique per object instance.
pub type Uid = String;

/// A reference to a single object by its API coordinates.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash)]
pub struct ObjectReference {
    pub group: String,
    pub kind: String,
    pub namespace: String,
    pub name: String,
}

impl ObjectReference {
    pub fn key(&self) -> String {
        format!(
            "{}\\{}\\{}\\{}",
            self.group, self.kind, self.namespace, self.name
        )
    }
}

/// A reference to a collection of objects of one kind matching a label
/// selector within a namespace (empty namespace = cluster scope).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ObjectLabelSelector {
    pub group: String,
    pub kind: String,
    pub namespace: String,
    pub selector: Selector,
}

impl ObjectLabelSelector {
    pub fn key(&self) -> String {
        format!(
            "{}\\{}\\{}\\{}",
            self.group, self.kind, self.namespace, self.selector
        )
    }
}

/// A reference to all objects of one kind, optionally restricted to a set of
/// namespaces (empty set = any namespace).
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ObjectSelector {
    pub group: String,
    pub kind: String,
    pub namespaces: BTreeSet<String>,
}

impl ObjectSelector {
    pub fn key(&self) -> String {
        let namespaces: Vec<&str> = self.namespaces.iter().map(String::as_str).collect();
        format!("{}\\{}\\{}", self.group, self.kind, namespaces.join(","))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_reference_key_is_deterministic() {
        let a = ObjectReference {
            group: "apps".into(),
            kind: "Deployment".into(),
            namespace: "default".into(),
            name: "web".into(),
        };
        assert_eq!(a.key(), "apps\\Deployment\\default\\web");
        assert_eq!(a.key(), a.clone().key());
    }

    #[test]
    fn test_cluster_scoped_reference_key() {
        let r = ObjectReference {
            kind: "Node".into(),
            name: "worker-1".into(),
            ..Default::default()
        };
        assert_eq!(r.key(), "\\Node\\\\worker-1");
    }

    #[test]
    fn test_selector_key_spaces_do_not_collide() {
        let by_ref = ObjectReference {
            group: "policy".into(),
            kind: "PodSecurityPolicy".into(),
            namespace: String::new(),
            name: "restricted".into(),
        };
        let by_kind = ObjectSelector {
            group: "policy".into(),
            kind: "PodSecurityPolicy".into(),
            namespaces: BTreeSet::new(),
        };
        // Four fields vs three: the kind-selector key can never equal a
        // reference key for the same group/kind.
        assert_ne!(by_ref.key(), by_kind.key());
    }

    #[test]
    fn test_object_selector_key_sorts_namespaces() {
        let sel = ObjectSelector {
            group: String::new(),
            kind: "Pod".into(),
            namespaces: ["kube-system", "default"].iter().map(|s| s.to_string()).collect(),
        };
        assert_eq!(sel.key(), "\\Pod\\default,kube-system");
    }
}
