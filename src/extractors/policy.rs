//! Policy-group relationships: PodSecurityPolicy allowances and
//! PodDisruptionBudget selectors.

use crate::error::Result;
use crate::graph::Node;
use crate::identity::{ObjectLabelSelector, ObjectReference};
use crate::relationships::{Relationship, RelationshipMap};
use crate::selector::Selector;

pub fn pod_security_policy(node: &Node) -> Result<RelationshipMap> {
    let mut result = RelationshipMap::default();
    let Some(spec) = node.manifest.get("spec") else {
        return Ok(result);
    };

    // PodSecurityPolicyAllowedCSIDriver
    if let Some(drivers) = spec.get("allowedCSIDrivers").and_then(|v| v.as_array()) {
        for d in drivers {
            if let Some(name) = d.get("name").and_then(|v| v.as_str()) {
                let r = ObjectReference {
                    group: "storage.k8s.io".into(),
                    kind: "CSIDriver".into(),
                    name: name.into(),
                    ..Default::default()
                };
                result.add_dependency_by_ref(&r, Relationship::PodSecurityPolicyAllowedCsiDriver);
            }
        }
    }

    if let Some(rc) = spec.get("runtimeClass") {
        // PodSecurityPolicyAllowedRuntimeClass
        if let Some(names) = rc
            .get("allowedRuntimeClassNames")
            .and_then(|v| v.as_array())
        {
            for name in names.iter().filter_map(|v| v.as_str()) {
                let r = runtime_class_ref(name);
                result.add_dependency_by_ref(&r, Relationship::PodSecurityPolicyAllowedRuntimeClass);
            }
        }
        // PodSecurityPolicyDefaultRuntimeClass
        if let Some(name) = rc.get("defaultRuntimeClassName").and_then(|v| v.as_str()) {
            let r = runtime_class_ref(name);
            result.add_dependency_by_ref(&r, Relationship::PodSecurityPolicyDefaultRuntimeClass);
        }
    }

    Ok(result)
}

pub fn pod_disruption_budget(node: &Node) -> Result<RelationshipMap> {
    let mut result = RelationshipMap::default();

    if let Some(selector) = node.manifest.get("spec").and_then(|s| s.get("selector")) {
        let ols = ObjectLabelSelector {
            group: String::new(),
            kind: "Pod".into(),
            namespace: node.namespace.clone(),
            selector: Selector::from_label_selector(selector)?,
        };
        result.add_dependency_by_label_selector(ols, Relationship::PodDisruptionBudget);
    }

    Ok(result)
}

fn runtime_class_ref(name: &str) -> ObjectReference {
    ObjectReference {
        group: "node.k8s.io".into(),
        kind: "RuntimeClass".into(),
        name: name.into(),
        ..Default::default()
    }
}
