//! RuntimeClass relationships: the node selector in its scheduling block.

use crate::error::Result;
use crate::graph::Node;
use crate::identity::ObjectLabelSelector;
use crate::relationships::{Relationship, RelationshipMap};
use crate::selector::Selector;

pub fn relationships(node: &Node) -> Result<RelationshipMap> {
    let mut result = RelationshipMap::default();

    if let Some(node_selector) = node
        .manifest
        .get("scheduling")
        .and_then(|s| s.get("nodeSelector"))
        .and_then(|v| v.as_object())
    {
        let ols = ObjectLabelSelector {
            group: String::new(),
            kind: "Node".into(),
            namespace: String::new(),
            selector: Selector::from_map(node_selector),
        };
        result.add_dependency_by_label_selector(ols, Relationship::RuntimeClass);
    }

    Ok(result)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::extractors::testutil::node_from_manifest;
    use serde_json::json;

    #[test]
    fn test_scheduling_node_selector() {
        let node = node_from_manifest(json!({
            "apiVersion": "node.k8s.io/v1", "kind": "RuntimeClass",
            "metadata": {"name": "gvisor", "uid": "rc1"},
            "handler": "runsc",
            "scheduling": {"nodeSelector": {"sandbox": "gvisor"}},
        }));
        let m = relationships(&node).unwrap();
        assert!(m.dependencies_by_label_selector["\\Node\\\\sandbox=gvisor"]
            .contains(&Relationship::RuntimeClass));
    }

    #[test]
    fn test_no_scheduling_block() {
        let node = node_from_manifest(json!({
            "apiVersion": "node.k8s.io/v1", "kind": "RuntimeClass",
            "metadata": {"name": "kata", "uid": "rc2"},
            "handler": "kata",
        }));
        assert!(relationships(&node).unwrap().is_empty());
    }
}
