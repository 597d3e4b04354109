//! Service relationships: the pod label selector.

use crate::error::Result;
use crate::graph::Node;
use crate::identity::ObjectLabelSelector;
use crate::relationships::{Relationship, RelationshipMap};
use crate::selector::Selector;

pub fn relationships(node: &Node) -> Result<RelationshipMap> {
    let mut result = RelationshipMap::default();

    // Headless or ExternalName services without a selector target nothing.
    if let Some(selector) = node
        .manifest
        .get("spec")
        .and_then(|s| s.get("selector"))
        .and_then(|v| v.as_object())
    {
        let ols = ObjectLabelSelector {
            group: String::new(),
            kind: "Pod".into(),
            namespace: node.namespace.clone(),
            selector: Selector::from_map(selector),
        };
        result.add_dependency_by_label_selector(ols, Relationship::Service);
    }

    Ok(result)
}
