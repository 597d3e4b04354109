//! APIService relationships: the backing service of an aggregated API.

use crate::error::Result;
use crate::graph::Node;
use crate::identity::ObjectReference;
use crate::relationships::{Relationship, RelationshipMap};

pub fn relationships(node: &Node) -> Result<RelationshipMap> {
    let mut result = RelationshipMap::default();

    if let Some(svc) = node.manifest.get("spec").and_then(|s| s.get("service")) {
        if let Some(name) = svc.get("name").and_then(|v| v.as_str()) {
            let r = ObjectReference {
                kind: "Service".into(),
                namespace: svc
                    .get("namespace")
                    .and_then(|v| v.as_str())
                    .unwrap_or_default()
                    .into(),
                name: name.into(),
                ..Default::default()
            };
            result.add_dependency_by_ref(&r, Relationship::ApiService);
        }
    }

    Ok(result)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::extractors::testutil::node_from_manifest;
    use serde_json::json;

    #[test]
    fn test_aggregated_api_service_ref() {
        let node = node_from_manifest(json!({
            "apiVersion": "apiregistration.k8s.io/v1", "kind": "APIService",
            "metadata": {"name": "v1beta1.metrics.k8s.io", "uid": "as1"},
            "spec": {"service": {"name": "metrics-server", "namespace": "kube-system"}},
        }));
        let m = relationships(&node).unwrap();
        assert!(m.dependencies_by_ref["\\Service\\kube-system\\metrics-server"]
            .contains(&Relationship::ApiService));
    }

    #[test]
    fn test_local_api_service_has_no_edges() {
        let node = node_from_manifest(json!({
            "apiVersion": "apiregistration.k8s.io/v1", "kind": "APIService",
            "metadata": {"name": "v1.apps", "uid": "as2"},
            "spec": {"groupPriorityMinimum": 17800},
        }));
        assert!(relationships(&node).unwrap().is_empty());
    }
}
