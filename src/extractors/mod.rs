//! Per-kind relationship extractors.
//!
//! Each extractor is a pure function from a node's manifest to a
//! [`RelationshipMap`](crate::relationships::RelationshipMap) of pending
//! edges. Absent or mistyped fields yield no edge; only a malformed label
//! selector is an error. Kinds that migrated API groups (Event, Ingress)
//! share one extractor that branches on the observed group.

pub mod apiservice;
pub mod event;
pub mod ingress;
pub mod networkpolicy;
pub mod persistentvolume;
pub mod pod;
pub mod policy;
pub mod rbac;
pub mod runtimeclass;
pub mod service;
pub mod serviceaccount;
pub mod storage;
pub mod webhook;

use crate::error::Result;
use crate::graph::Node;
use crate::relationships::RelationshipMap;

/// Selects and runs the extractor for the node's `(group, kind)`. Returns
/// `None` for kinds with no type-specific relationships.
pub fn extract(node: &Node) -> Option<Result<RelationshipMap>> {
    match (node.group.as_str(), node.kind.as_str()) {
        ("", "Pod") => Some(pod::relationships(node)),
        ("", "Service") => Some(service::relationships(node)),
        ("", "ServiceAccount") => Some(serviceaccount::relationships(node)),
        ("", "PersistentVolume") => Some(persistentvolume::persistent_volume(node)),
        ("", "PersistentVolumeClaim") => Some(persistentvolume::persistent_volume_claim(node)),
        ("", "Event") | ("events.k8s.io", "Event") => Some(event::relationships(node)),
        ("extensions", "Ingress") | ("networking.k8s.io", "Ingress") => {
            Some(ingress::ingress(node))
        }
        ("networking.k8s.io", "IngressClass") => Some(ingress::ingress_class(node)),
        ("networking.k8s.io", "NetworkPolicy") => Some(networkpolicy::relationships(node)),
        ("rbac.authorization.k8s.io", "ClusterRole") => Some(rbac::cluster_role(node)),
        ("rbac.authorization.k8s.io", "ClusterRoleBinding") => {
            Some(rbac::cluster_role_binding(node))
        }
        ("rbac.authorization.k8s.io", "Role") => Some(rbac::role(node)),
        ("rbac.authorization.k8s.io", "RoleBinding") => Some(rbac::role_binding(node)),
        ("policy", "PodSecurityPolicy") => Some(policy::pod_security_policy(node)),
        ("policy", "PodDisruptionBudget") => Some(policy::pod_disruption_budget(node)),
        ("node.k8s.io", "RuntimeClass") => Some(runtimeclass::relationships(node)),
        ("apiregistration.k8s.io", "APIService") => Some(apiservice::relationships(node)),
        ("admissionregistration.k8s.io", "MutatingWebhookConfiguration")
        | ("admissionregistration.k8s.io", "ValidatingWebhookConfiguration") => {
            Some(webhook::relationships(node))
        }
        ("storage.k8s.io", "CSINode") => Some(storage::csi_node(node)),
        ("storage.k8s.io", "CSIStorageCapacity") => Some(storage::csi_storage_capacity(node)),
        ("storage.k8s.io", "StorageClass") => Some(storage::storage_class(node)),
        ("storage.k8s.io", "VolumeAttachment") => Some(storage::volume_attachment(node)),
        _ => None,
    }
}


#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_dispatch_covers_both_event_groups() {
        let core = testutil::node_from_manifest(json!({
            "apiVersion": "v1", "kind": "Event",
            "metadata": {"name": "e", "namespace": "default", "uid": "e1"},
            "involvedObject": {"uid": "x"},
        }));
        let modern = testutil::node_from_manifest(json!({
            "apiVersion": "events.k8s.io/v1", "kind": "Event",
            "metadata": {"name": "e", "namespace": "default", "uid": "e2"},
            "regarding": {"uid": "x"},
        }));
        assert!(extract(&core).is_some());
        assert!(extract(&modern).is_some());
    }

    #[test]
    fn test_dispatch_skips_unknown_kinds() {
        let cm = testutil::node_from_manifest(json!({
            "apiVersion": "v1", "kind": "ConfigMap",
            "metadata": {"name": "c", "namespace": "default", "uid": "c1"},
        }));
        assert!(extract(&cm).is_none());
    }

    #[test]
    fn test_extractor_purity() {
        let pod = testutil::node_from_manifest(json!({
            "apiVersion": "v1", "kind": "Pod",
            "metadata": {"name": "p", "namespace": "default", "uid": "p1"},
            "spec": {
                "nodeName": "worker-1",
                "serviceAccountName": "default",
                "volumes": [{"name": "cfg", "configMap": {"name": "app-config"}}],
            },
        }));
        let a = extract(&pod).unwrap().unwrap();
        let b = extract(&pod).unwrap().unwrap();
        assert_eq!(a.dependencies_by_ref, b.dependencies_by_ref);
        assert_eq!(a.dependencies_by_uid, b.dependencies_by_uid);
        assert_eq!(
            a.dependencies_by_label_selector.keys().collect::<Vec<_>>(),
            b.dependencies_by_label_selector.keys().collect::<Vec<_>>()
        );
    }
}
