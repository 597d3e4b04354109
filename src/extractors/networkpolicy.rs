//! NetworkPolicy relationships: the pod selector the policy applies to.

use crate::error::Result;
use crate::graph::Node;
use crate::identity::ObjectLabelSelector;
use crate::relationships::{Relationship, RelationshipMap};
use crate::selector::Selector;

pub fn relationships(node: &Node) -> Result<RelationshipMap> {
    let mut result = RelationshipMap::default();

    if let Some(pod_selector) = node.manifest.get("spec").and_then(|s| s.get("podSelector")) {
        let ols = ObjectLabelSelector {
            group: String::new(),
            kind: "Pod".into(),
            namespace: node.namespace.clone(),
            selector: Selector::from_label_selector(pod_selector)?,
        };
        result.add_dependency_by_label_selector(ols, Relationship::NetworkPolicy);
    }

    Ok(result)
}
