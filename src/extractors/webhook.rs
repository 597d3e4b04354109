//! Admission webhook configuration relationships: the services behind each
//! webhook's client config. Mutating and validating configurations share the
//! same shape.

use crate::error::Result;
use crate::graph::Node;
use crate::identity::ObjectReference;
use crate::relationships::{Relationship, RelationshipMap};

pub fn relationships(node: &Node) -> Result<RelationshipMap> {
    let mut result = RelationshipMap::default();

    if let Some(webhooks) = node.manifest.get("webhooks").and_then(|v| v.as_array()) {
        for wh in webhooks {
            let Some(svc) = wh.get("clientConfig").and_then(|c| c.get("service")) else {
                continue;
            };
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
                result.add_dependency_by_ref(&r, Relationship::WebhookConfigurationService);
            }
        }
    }

    Ok(result)
}
