//! ServiceAccount relationships: pull secrets it needs, token secrets that
//! hang off it.

use crate::error::Result;
use crate::graph::Node;
use crate::identity::ObjectReference;
use crate::relationships::{Relationship, RelationshipMap};

pub fn relationships(node: &Node) -> Result<RelationshipMap> {
    let mut result = RelationshipMap::default();
    let ns = node.namespace.as_str();

    if let Some(secrets) = node
        .manifest
        .get("imagePullSecrets")
        .and_then(|v| v.as_array())
    {
        for s in secrets {
            if let Some(name) = s.get("name").and_then(|v| v.as_str()) {
                let r = secret_ref(name, ns);
                result.add_dependency_by_ref(&r, Relationship::ServiceAccountImagePullSecret);
            }
        }
    }

    // Token secrets belong to the account, so they are recorded as its
    // dependents rather than its dependencies.
    if let Some(secrets) = node.manifest.get("secrets").and_then(|v| v.as_array()) {
        for s in secrets {
            if let Some(name) = s.get("name").and_then(|v| v.as_str()) {
                let r = secret_ref(name, ns);
                result.add_dependent_by_ref(&r, Relationship::ServiceAccountSecret);
            }
        }
    }

    Ok(result)
}

fn secret_ref(name: &str, ns: &str) -> ObjectReference {
    ObjectReference {
        kind: "Secret".into(),
        namespace: ns.into(),
        name: name.into(),
        ..Default::default()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::extractors::testutil::node_from_manifest;
    use serde_json::json;

    #[test]
    fn test_serviceaccount_secret_directions() {
        let node = node_from_manifest(json!({
            "apiVersion": "v1", "kind": "ServiceAccount",
            "metadata": {"name": "builder", "namespace": "ci", "uid": "sa1"},
            "imagePullSecrets": [{"name": "registry"}],
            "secrets": [{"name": "builder-token-abc12"}],
        }));
        let m = relationships(&node).unwrap();

        assert!(m.dependencies_by_ref["\\Secret\\ci\\registry"]
            .contains(&Relationship::ServiceAccountImagePullSecret));
        assert!(m.dependents_by_ref["\\Secret\\ci\\builder-token-abc12"]
            .contains(&Relationship::ServiceAccountSecret));
    }
}
