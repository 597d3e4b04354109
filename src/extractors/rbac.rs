//! RBAC relationships: role bindings, aggregation rules and the policy
//! rules that grant use of PodSecurityPolicies.

use serde_json::Value;

use crate::error::Result;
use crate::graph::Node;
use crate::identity::{ObjectLabelSelector, ObjectReference, ObjectSelector};
use crate::relationships::{Relationship, RelationshipMap};
use crate::selector::Selector;

pub fn cluster_role(node: &Node) -> Result<RelationshipMap> {
    let mut result = RelationshipMap::default();

    // ClusterRoleAggregationRule
    if let Some(selectors) = node
        .manifest
        .get("aggregationRule")
        .and_then(|a| a.get("clusterRoleSelectors"))
        .and_then(|v| v.as_array())
    {
        for s in selectors {
            let ols = ObjectLabelSelector {
                group: "rbac.authorization.k8s.io".into(),
                kind: "ClusterRole".into(),
                namespace: String::new(),
                selector: Selector::from_label_selector(s)?,
            };
            result.add_dependency_by_label_selector(ols, Relationship::ClusterRoleAggregationRule);
        }
    }

    // ClusterRolePolicyRule
    add_psp_rules(
        &mut result,
        node.manifest.get("rules"),
        Relationship::ClusterRolePolicyRule,
    );

    Ok(result)
}

pub fn role(node: &Node) -> Result<RelationshipMap> {
    let mut result = RelationshipMap::default();

    // RolePolicyRule
    add_psp_rules(
        &mut result,
        node.manifest.get("rules"),
        Relationship::RolePolicyRule,
    );

    Ok(result)
}

pub fn cluster_role_binding(node: &Node) -> Result<RelationshipMap> {
    let mut result = RelationshipMap::default();

    // ClusterRoleBindingSubject. Only object subjects resolve; users and
    // groups are not API objects.
    add_subjects(
        &mut result,
        node.manifest.get("subjects"),
        Relationship::ClusterRoleBindingSubject,
    );

    // ClusterRoleBindingRole
    if let Some(r) = role_ref(node.manifest.get("roleRef"), "") {
        result.add_dependency_by_ref(&r, Relationship::ClusterRoleBindingRole);
    }

    Ok(result)
}

pub fn role_binding(node: &Node) -> Result<RelationshipMap> {
    let mut result = RelationshipMap::default();

    // RoleBindingSubject
    add_subjects(
        &mut result,
        node.manifest.get("subjects"),
        Relationship::RoleBindingSubject,
    );

    // RoleBindingRole. A RoleBinding's roleRef may name a namespaced Role,
    // so the binding's own namespace applies.
    if let Some(r) = role_ref(node.manifest.get("roleRef"), &node.namespace) {
        result.add_dependency_by_ref(&r, Relationship::RoleBindingRole);
    }

    Ok(result)
}

fn role_ref(value: Option<&Value>, ns: &str) -> Option<ObjectReference> {
    let v = value?;
    let kind = v.get("kind").and_then(|v| v.as_str())?;
    let name = v.get("name").and_then(|v| v.as_str())?;
    Some(ObjectReference {
        group: v
            .get("apiGroup")
            .and_then(|v| v.as_str())
            .unwrap_or_default()
            .into(),
        kind: kind.into(),
        namespace: ns.into(),
        name: name.into(),
    })
}

fn add_subjects(result: &mut RelationshipMap, subjects: Option<&Value>, rel: Relationship) {
    let Some(subjects) = subjects.and_then(|v| v.as_array()) else {
        return;
    };
    for s in subjects {
        let (Some(kind), Some(name)) = (
            s.get("kind").and_then(|v| v.as_str()),
            s.get("name").and_then(|v| v.as_str()),
        ) else {
            continue;
        };
        let r = ObjectReference {
            group: s
                .get("apiGroup")
                .and_then(|v| v.as_str())
                .unwrap_or_default()
                .into(),
            kind: kind.into(),
            namespace: s
                .get("namespace")
                .and_then(|v| v.as_str())
                .unwrap_or_default()
                .into(),
            name: name.into(),
        };
        result.add_dependent_by_ref(&r, rel);
    }
}

/// Scans policy rules for ones granting `use` on podsecuritypolicies. With
/// resourceNames the grant targets specific policies; without, every policy
/// of the kind.
fn add_psp_rules(result: &mut RelationshipMap, rules: Option<&Value>, rel: Relationship) {
    let Some(rules) = rules.and_then(|v| v.as_array()) else {
        return;
    };
    for rule in rules {
        if !psp_rule_matches(rule) {
            continue;
        }
        let names: Vec<&str> = rule
            .get("resourceNames")
            .and_then(|v| v.as_array())
            .map(|ns| ns.iter().filter_map(|v| v.as_str()).collect())
            .unwrap_or_default();
        if names.is_empty() {
            let os = ObjectSelector {
                group: "policy".into(),
                kind: "PodSecurityPolicy".into(),
                namespaces: Default::default(),
            };
            result.add_dependency_by_selector(os, rel);
        } else {
            for name in names {
                let r = ObjectReference {
                    group: "policy".into(),
                    kind: "PodSecurityPolicy".into(),
                    name: name.into(),
                    ..Default::default()
                };
                result.add_dependency_by_ref(&r, rel);
            }
        }
    }
}

/// The PodSecurityPolicy admission controller accepts grants under the
/// wildcard, extensions and policy API groups, so all three count here.
fn psp_rule_matches(rule: &Value) -> bool {
    let has_any = |field: &str, wanted: &[&str]| {
        rule.get(field)
            .and_then(|v| v.as_array())
            .is_some_and(|vs| {
                vs.iter()
                    .filter_map(|v| v.as_str())
                    .any(|v| wanted.contains(&v))
            })
    };
    has_any("apiGroups", &["*", "extensions", "policy"])
        && has_any("resources", &["*", "podsecuritypolicies"])
        && has_any("verbs", &["*", "use"])
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::extractors::testutil::node_from_manifest;
    use serde_json::json;

    #[test]
    fn test_cluster_role_psp_rule_without_names_is_a_kind_selector() {
        let node = node_from_manifest(json!({
            "apiVersion": "rbac.authorization.k8s.io/v1", "kind": "ClusterRole",
            "metadata": {"name": "psp-user", "uid": "cr1"},
            "rules": [{
                "apiGroups": ["policy"],
                "resources": ["podsecuritypolicies"],
                "verbs": ["use"],
                "resourceNames": [],
            }],
        }));
        let m = cluster_role(&node).unwrap();
        assert!(m.dependencies_by_selector["policy\\PodSecurityPolicy\\"]
            .contains(&Relationship::ClusterRolePolicyRule));
    }

    #[test]
    fn test_cluster_role_psp_rule_with_names_is_per_name() {
        let node = node_from_manifest(json!({
            "apiVersion": "rbac.authorization.k8s.io/v1", "kind": "ClusterRole",
            "metadata": {"name": "psp-user", "uid": "cr1"},
            "rules": [{
                "apiGroups": ["*"],
                "resources": ["*"],
                "verbs": ["*"],
                "resourceNames": ["restricted", "privileged"],
            }],
        }));
        let m = cluster_role(&node).unwrap();
        assert!(m
            .dependencies_by_ref
            .contains_key("policy\\PodSecurityPolicy\\\\restricted"));
        assert!(m
            .dependencies_by_ref
            .contains_key("policy\\PodSecurityPolicy\\\\privileged"));
    }

    #[test]
    fn test_non_psp_rule_is_ignored() {
        let node = node_from_manifest(json!({
            "apiVersion": "rbac.authorization.k8s.io/v1", "kind": "ClusterRole",
            "metadata": {"name": "view", "uid": "cr2"},
            "rules": [{
                "apiGroups": [""],
                "resources": ["pods"],
                "verbs": ["get", "list"],
            }],
        }));
        assert!(cluster_role(&node).unwrap().is_empty());
    }

    #[test]
    fn test_aggregation_rule_selectors() {
        let node = node_from_manifest(json!({
            "apiVersion": "rbac.authorization.k8s.io/v1", "kind": "ClusterRole",
            "metadata": {"name": "edit", "uid": "cr3"},
            "aggregationRule": {"clusterRoleSelectors": [
                {"matchLabels": {"rbac.example.com/aggregate-to-edit": "true"}},
            ]},
        }));
        let m = cluster_role(&node).unwrap();
        assert_eq!(m.dependencies_by_label_selector.len(), 1);
        let key = m.dependencies_by_label_selector.keys().next().unwrap();
        assert!(key.starts_with("rbac.authorization.k8s.io\\ClusterRole\\\\"));
    }

    #[test]
    fn test_binding_subjects_and_role() {
        let node = node_from_manifest(json!({
            "apiVersion": "rbac.authorization.k8s.io/v1", "kind": "ClusterRoleBinding",
            "metadata": {"name": "admins", "uid": "crb1"},
            "roleRef": {
                "apiGroup": "rbac.authorization.k8s.io", "kind": "ClusterRole",
                "name": "cluster-admin",
            },
            "subjects": [
                {"kind": "ServiceAccount", "name": "deployer", "namespace": "ci"},
                {"kind": "User", "apiGroup": "rbac.authorization.k8s.io", "name": "alice"},
            ],
        }));
        let m = cluster_role_binding(&node).unwrap();
        assert!(m.dependencies_by_ref
            ["rbac.authorization.k8s.io\\ClusterRole\\\\cluster-admin"]
            .contains(&Relationship::ClusterRoleBindingRole));
        assert!(m.dependents_by_ref["\\ServiceAccount\\ci\\deployer"]
            .contains(&Relationship::ClusterRoleBindingSubject));
    }

    #[test]
    fn test_role_binding_role_is_namespaced() {
        let node = node_from_manifest(json!({
            "apiVersion": "rbac.authorization.k8s.io/v1", "kind": "RoleBinding",
            "metadata": {"name": "readers", "namespace": "apps", "uid": "rb1"},
            "roleRef": {
                "apiGroup": "rbac.authorization.k8s.io", "kind": "Role", "name": "reader",
            },
            "subjects": [{"kind": "ServiceAccount", "name": "viewer", "namespace": "apps"}],
        }));
        let m = role_binding(&node).unwrap();
        assert!(m
            .dependencies_by_ref
            .contains_key("rbac.authorization.k8s.io\\Role\\apps\\reader"));
    }
}
