//! Storage-group relationships: CSINode, CSIStorageCapacity, StorageClass
//! and VolumeAttachment.

use crate::error::Result;
use crate::extractors::persistentvolume::{namespaced_secret_ref, storage_class_ref};
use crate::graph::Node;
use crate::identity::ObjectReference;
use crate::relationships::{Relationship, RelationshipMap};

pub fn csi_node(node: &Node) -> Result<RelationshipMap> {
    let mut result = RelationshipMap::default();

    // CSINodeDriver: the driver objects hang off the per-node registration.
    if let Some(drivers) = node
        .manifest
        .get("spec")
        .and_then(|s| s.get("drivers"))
        .and_then(|v| v.as_array())
    {
        for d in drivers {
            if let Some(name) = d.get("name").and_then(|v| v.as_str()) {
                let r = csi_driver_ref(name);
                result.add_dependent_by_ref(&r, Relationship::CsiNodeDriver);
            }
        }
    }

    Ok(result)
}

pub fn csi_storage_capacity(node: &Node) -> Result<RelationshipMap> {
    let mut result = RelationshipMap::default();

    // CSIStorageCapacityStorageClass
    if let Some(sc) = node
        .manifest
        .get("storageClassName")
        .and_then(|v| v.as_str())
    {
        if !sc.is_empty() {
            let r = storage_class_ref(sc);
            result.add_dependency_by_ref(&r, Relationship::CsiStorageCapacityStorageClass);
        }
    }

    Ok(result)
}

pub fn storage_class(node: &Node) -> Result<RelationshipMap> {
    let mut result = RelationshipMap::default();

    // StorageClassProvisioner. In-tree provisioners under kubernetes.io/
    // have no CSIDriver object to point at.
    if let Some(p) = node.manifest.get("provisioner").and_then(|v| v.as_str()) {
        if !p.is_empty() && !p.starts_with("kubernetes.io/") {
            let r = csi_driver_ref(p);
            result.add_dependency_by_ref(&r, Relationship::StorageClassProvisioner);
        }
    }

    Ok(result)
}

pub fn volume_attachment(node: &Node) -> Result<RelationshipMap> {
    let mut result = RelationshipMap::default();
    let Some(spec) = node.manifest.get("spec") else {
        return Ok(result);
    };

    // VolumeAttachmentAttacher
    if let Some(attacher) = spec.get("attacher").and_then(|v| v.as_str()) {
        if !attacher.is_empty() {
            let r = csi_driver_ref(attacher);
            result.add_dependency_by_ref(&r, Relationship::VolumeAttachmentAttacher);
        }
    }

    // VolumeAttachmentNode
    if let Some(name) = spec.get("nodeName").and_then(|v| v.as_str()) {
        if !name.is_empty() {
            let r = ObjectReference {
                kind: "Node".into(),
                name: name.into(),
                ..Default::default()
            };
            result.add_dependency_by_ref(&r, Relationship::VolumeAttachmentNode);
        }
    }

    // VolumeAttachmentSourceVolume
    if let Some(pv) = spec
        .get("source")
        .and_then(|s| s.get("persistentVolumeName"))
        .and_then(|v| v.as_str())
    {
        if !pv.is_empty() {
            let r = ObjectReference {
                kind: "PersistentVolume".into(),
                name: pv.into(),
                ..Default::default()
            };
            result.add_dependent_by_ref(&r, Relationship::VolumeAttachmentSourceVolume);
        }
    }

    // Inline volume spec: claim, storage class and CSI source.
    if let Some(inline) = spec.get("source").and_then(|s| s.get("inlineVolumeSpec")) {
        if let Some(claim) = inline.get("claimRef") {
            if let Some(name) = claim.get("name").and_then(|v| v.as_str()) {
                let r = ObjectReference {
                    kind: "PersistentVolumeClaim".into(),
                    namespace: claim
                        .get("namespace")
                        .and_then(|v| v.as_str())
                        .unwrap_or_default()
                        .into(),
                    name: name.into(),
                    ..Default::default()
                };
                result.add_dependent_by_ref(&r, Relationship::VolumeAttachmentSourceVolumeClaim);
            }
        }

        if let Some(sc) = inline.get("storageClassName").and_then(|v| v.as_str()) {
            if !sc.is_empty() {
                let r = storage_class_ref(sc);
                result
                    .add_dependent_by_ref(&r, Relationship::VolumeAttachmentSourceVolumeStorageClass);
            }
        }

        if let Some(csi) = inline.get("csi") {
            if let Some(driver) = csi.get("driver").and_then(|v| v.as_str()) {
                if !driver.is_empty() {
                    let r = csi_driver_ref(driver);
                    result.add_dependent_by_ref(
                        &r,
                        Relationship::VolumeAttachmentSourceVolumeCsiDriver,
                    );
                }
            }
            for field in [
                "controllerExpandSecretRef",
                "controllerPublishSecretRef",
                "nodePublishSecretRef",
                "nodeStageSecretRef",
            ] {
                if let Some(r) = namespaced_secret_ref(csi.get(field)) {
                    result.add_dependent_by_ref(
                        &r,
                        Relationship::VolumeAttachmentSourceVolumeCsiDriverSecret,
                    );
                }
            }
        }
    }

    Ok(result)
}

fn csi_driver_ref(name: &str) -> ObjectReference {
    ObjectReference {
        group: "storage.k8s.io".into(),
        kind: "CSIDriver".into(),
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
    fn test_csi_node_drivers_are_dependents() {
        let node = node_from_manifest(json!({
            "apiVersion": "storage.k8s.io/v1", "kind": "CSINode",
            "metadata": {"name": "worker-1", "uid": "cn1"},
            "spec": {"drivers": [{"name": "ebs.csi.aws.com", "nodeID": "i-0abc"}]},
        }));
        let m = csi_node(&node).unwrap();
        assert!(m.dependents_by_ref["storage.k8s.io\\CSIDriver\\\\ebs.csi.aws.com"]
            .contains(&Relationship::CsiNodeDriver));
    }

    #[test]
    fn test_external_provisioner_only() {
        let external = node_from_manifest(json!({
            "apiVersion": "storage.k8s.io/v1", "kind": "StorageClass",
            "metadata": {"name": "fast", "uid": "sc1"},
            "provisioner": "ebs.csi.aws.com",
        }));
        let intree = node_from_manifest(json!({
            "apiVersion": "storage.k8s.io/v1", "kind": "StorageClass",
            "metadata": {"name": "standard", "uid": "sc2"},
            "provisioner": "kubernetes.io/aws-ebs",
        }));
        assert!(!storage_class(&external).unwrap().is_empty());
        assert!(storage_class(&intree).unwrap().is_empty());
    }

    #[test]
    fn test_volume_attachment_edges() {
        let node = node_from_manifest(json!({
            "apiVersion": "storage.k8s.io/v1", "kind": "VolumeAttachment",
            "metadata": {"name": "csi-abc", "uid": "va1"},
            "spec": {
                "attacher": "ebs.csi.aws.com",
                "nodeName": "worker-1",
                "source": {"persistentVolumeName": "pv-1"},
            },
        }));
        let m = volume_attachment(&node).unwrap();
        assert!(m.dependencies_by_ref["storage.k8s.io\\CSIDriver\\\\ebs.csi.aws.com"]
            .contains(&Relationship::VolumeAttachmentAttacher));
        assert!(m.dependencies_by_ref["\\Node\\\\worker-1"]
            .contains(&Relationship::VolumeAttachmentNode));
        assert!(m.dependents_by_ref["\\PersistentVolume\\\\pv-1"]
            .contains(&Relationship::VolumeAttachmentSourceVolume));
    }

    #[test]
    fn test_volume_attachment_inline_spec() {
        let node = node_from_manifest(json!({
            "apiVersion": "storage.k8s.io/v1", "kind": "VolumeAttachment",
            "metadata": {"name": "csi-inline", "uid": "va2"},
            "spec": {
                "attacher": "ebs.csi.aws.com",
                "nodeName": "worker-2",
                "source": {"inlineVolumeSpec": {
                    "claimRef": {"name": "data", "namespace": "apps"},
                    "storageClassName": "fast",
                    "csi": {
                        "driver": "ebs.csi.aws.com",
                        "nodePublishSecretRef": {"name": "creds", "namespace": "apps"},
                    },
                }},
            },
        }));
        let m = volume_attachment(&node).unwrap();
        assert!(m.dependents_by_ref["\\PersistentVolumeClaim\\apps\\data"]
            .contains(&Relationship::VolumeAttachmentSourceVolumeClaim));
        assert!(m.dependents_by_ref["storage.k8s.io\\StorageClass\\\\fast"]
            .contains(&Relationship::VolumeAttachmentSourceVolumeStorageClass));
        assert!(m.dependents_by_ref["storage.k8s.io\\CSIDriver\\\\ebs.csi.aws.com"]
            .contains(&Relationship::VolumeAttachmentSourceVolumeCsiDriver));
        assert!(m.dependents_by_ref["\\Secret\\apps\\creds"]
            .contains(&Relationship::VolumeAttachmentSourceVolumeCsiDriverSecret));
    }
}
