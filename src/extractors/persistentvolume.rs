//! PersistentVolume and PersistentVolumeClaim relationships.
//!
//! The PV/PVC binding is declared from both ends: the PV asserts its bound
//! claim as a dependent, the PVC asserts its volume as a dependency. The
//! resolver unifies both halves into the same edge.

use serde_json::Value;

use crate::error::Result;
use crate::graph::Node;
use crate::identity::ObjectReference;
use crate::relationships::{Relationship, RelationshipMap};

pub fn persistent_volume(node: &Node) -> Result<RelationshipMap> {
    let mut result = RelationshipMap::default();
    let Some(spec) = node.manifest.get("spec") else {
        return Ok(result);
    };

    // PersistentVolumeClaim (bound claim, dependent half)
    if let Some(claim) = spec.get("claimRef") {
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
            result.add_dependent_by_ref(&r, Relationship::PersistentVolumeClaim);
        }
    }

    // PersistentVolumeCSIDriver and its secret refs
    if let Some(csi) = spec.get("csi") {
        if let Some(driver) = csi.get("driver").and_then(|v| v.as_str()) {
            let r = ObjectReference {
                group: "storage.k8s.io".into(),
                kind: "CSIDriver".into(),
                name: driver.into(),
                ..Default::default()
            };
            result.add_dependency_by_ref(&r, Relationship::PersistentVolumeCsiDriver);
        }
        for field in [
            "controllerExpandSecretRef",
            "controllerPublishSecretRef",
            "nodePublishSecretRef",
            "nodeStageSecretRef",
        ] {
            if let Some(r) = namespaced_secret_ref(csi.get(field)) {
                result.add_dependent_by_ref(&r, Relationship::PersistentVolumeCsiDriverSecret);
            }
        }
    }

    // PersistentVolumeStorageClass
    if let Some(sc) = spec.get("storageClassName").and_then(|v| v.as_str()) {
        if !sc.is_empty() {
            let r = storage_class_ref(sc);
            result.add_dependency_by_ref(&r, Relationship::PersistentVolumeStorageClass);
        }
    }

    Ok(result)
}

pub fn persistent_volume_claim(node: &Node) -> Result<RelationshipMap> {
    let mut result = RelationshipMap::default();

    // PersistentVolumeClaim (bound volume, dependency half)
    if let Some(volume) = node.nested_str(&["spec", "volumeName"]) {
        if !volume.is_empty() {
            let r = ObjectReference {
                kind: "PersistentVolume".into(),
                name: volume.into(),
                ..Default::default()
            };
            result.add_dependency_by_ref(&r, Relationship::PersistentVolumeClaim);
        }
    }

    Ok(result)
}

pub(crate) fn namespaced_secret_ref(value: Option<&Value>) -> Option<ObjectReference> {
    let v = value?;
    let name = v.get("name").and_then(|v| v.as_str())?;
    Some(ObjectReference {
        kind: "Secret".into(),
        namespace: v
            .get("namespace")
            .and_then(|v| v.as_str())
            .unwrap_or_default()
            .into(),
        name: name.into(),
        ..Default::default()
    })
}

pub(crate) fn storage_class_ref(name: &str) -> ObjectReference {
    ObjectReference {
        group: "storage.k8s.io".into(),
        kind: "StorageClass".into(),
        name: name.into(),
        ..Default::default()
    }
}
