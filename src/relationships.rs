//! The closed catalogue of relationship kinds and the per-object scratch
//! structure extractors fill in before unification.

use std::collections::{BTreeSet, HashMap};

use crate::identity::{ObjectLabelSelector, ObjectReference, ObjectSelector, Uid};

/// A named reason two objects are connected. One directed edge may carry
/// several relationships at once (e.g. Controller + Owner).
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Relationship {
    // Owner references, on every object.
    ControllerReference,
    OwnerReference,

    // APIService.
    ApiService,

    // RBAC.
    ClusterRoleAggregationRule,
    ClusterRolePolicyRule,
    ClusterRoleBindingRole,
    ClusterRoleBindingSubject,
    RoleBindingRole,
    RoleBindingSubject,
    RolePolicyRule,

    // Storage.
    CsiNodeDriver,
    CsiStorageCapacityStorageClass,
    StorageClassProvisioner,
    VolumeAttachmentAttacher,
    VolumeAttachmentNode,
    VolumeAttachmentSourceVolume,
    VolumeAttachmentSourceVolumeClaim,
    VolumeAttachmentSourceVolumeCsiDriver,
    VolumeAttachmentSourceVolumeCsiDriverSecret,
    VolumeAttachmentSourceVolumeStorageClass,

    // Events, both API groups.
    EventRegarding,
    EventRelated,

    // Ingress & IngressClass.
    IngressClass,
    IngressClassParameters,
    IngressResource,
    IngressService,
    IngressTlsSecret,

    // Admission webhooks.
    WebhookConfigurationService,

    // NetworkPolicy.
    NetworkPolicy,

    // PersistentVolume & PersistentVolumeClaim.
    PersistentVolumeClaim,
    PersistentVolumeCsiDriver,
    PersistentVolumeCsiDriverSecret,
    PersistentVolumeStorageClass,

    // Pod.
    PodContainerEnvironment,
    PodImagePullSecret,
    PodNode,
    PodPriorityClass,
    PodRuntimeClass,
    PodSecurityPolicy,
    PodServiceAccount,
    PodVolume,
    PodVolumeCsiDriver,
    PodVolumeCsiDriverSecret,

    // Policy.
    PodDisruptionBudget,
    PodSecurityPolicyAllowedCsiDriver,
    PodSecurityPolicyAllowedRuntimeClass,
    PodSecurityPolicyDefaultRuntimeClass,

    // RuntimeClass.
    RuntimeClass,

    // Service & ServiceAccount.
    Service,
    ServiceAccountImagePullSecret,
    ServiceAccountSecret,

    // Populated by the Helm release source, not by extractors.
    HelmRelease,
    HelmStorage,
}

impl Relationship {
    pub fn as_str(&self) -> &'static str {
        match self {
            Relationship::ControllerReference => "ControllerReference",
            Relationship::OwnerReference => "OwnerReference",
            Relationship::ApiService => "APIService",
            Relationship::ClusterRoleAggregationRule => "ClusterRoleAggregationRule",
            Relationship::ClusterRolePolicyRule => "ClusterRolePolicyRule",
            Relationship::ClusterRoleBindingRole => "ClusterRoleBindingRole",
            Relationship::ClusterRoleBindingSubject => "ClusterRoleBindingSubject",
            Relationship::RoleBindingRole => "RoleBindingRole",
            Relationship::RoleBindingSubject => "RoleBindingSubject",
            Relationship::RolePolicyRule => "RolePolicyRule",
            Relationship::CsiNodeDriver => "CSINodeDriver",
            Relationship::CsiStorageCapacityStorageClass => "CSIStorageCapacityStorageClass",
            Relationship::StorageClassProvisioner => "StorageClassProvisioner",
            Relationship::VolumeAttachmentAttacher => "VolumeAttachmentAttacher",
            Relationship::VolumeAttachmentNode => "VolumeAttachmentNode",
            Relationship::VolumeAttachmentSourceVolume => "VolumeAttachmentSourceVolume",
            Relationship::VolumeAttachmentSourceVolumeClaim => "VolumeAttachmentSourceVolumeClaim",
            Relationship::VolumeAttachmentSourceVolumeCsiDriver => {
                "VolumeAttachmentSourceVolumeCSIDriver"
            }
            Relationship::VolumeAttachmentSourceVolumeCsiDriverSecret => {
                "VolumeAttachmentSourceVolumeCSIDriverSecret"
            }
            Relationship::VolumeAttachmentSourceVolumeStorageClass => {
                "VolumeAttachmentSourceVolumeStorageClass"
            }
            Relationship::EventRegarding => "EventRegarding",
            Relationship::EventRelated => "EventRelated",
            Relationship::IngressClass => "IngressClass",
            Relationship::IngressClassParameters => "IngressClassParameters",
            Relationship::IngressResource => "IngressResource",
            Relationship::IngressService => "IngressService",
            Relationship::IngressTlsSecret => "IngressTLSSecret",
            Relationship::WebhookConfigurationService => "WebhookConfigurationService",
            Relationship::NetworkPolicy => "NetworkPolicy",
            Relationship::PersistentVolumeClaim => "PersistentVolumeClaim",
            Relationship::PersistentVolumeCsiDriver => "PersistentVolumeCSIDriver",
            Relationship::PersistentVolumeCsiDriverSecret => "PersistentVolumeCSIDriverSecret",
            Relationship::PersistentVolumeStorageClass => "PersistentVolumeStorageClass",
            Relationship::PodContainerEnvironment => "PodContainerEnvironment",
            Relationship::PodImagePullSecret => "PodImagePullSecret",
            Relationship::PodNode => "PodNode",
            Relationship::PodPriorityClass => "PodPriorityClass",
            Relationship::PodRuntimeClass => "PodRuntimeClass",
            Relationship::PodSecurityPolicy => "PodSecurityPolicy",
            Relationship::PodServiceAccount => "PodServiceAccount",
            Relationship::PodVolume => "PodVolume",
            Relationship::PodVolumeCsiDriver => "PodVolumeCSIDriver",
            Relationship::PodVolumeCsiDriverSecret => "PodVolumeCSIDriverSecret",
            Relationship::PodDisruptionBudget => "PodDisruptionBudget",
            Relationship::PodSecurityPolicyAllowedCsiDriver => "PodSecurityPolicyAllowedCSIDriver",
            Relationship::PodSecurityPolicyAllowedRuntimeClass => {
                "PodSecurityPolicyAllowedRuntimeClass"
            }
            Relationship::PodSecurityPolicyDefaultRuntimeClass => {
                "PodSecurityPolicyDefaultRuntimeClass"
            }
            Relationship::RuntimeClass => "RuntimeClass",
            Relationship::Service => "Service",
            Relationship::ServiceAccountImagePullSecret => "ServiceAccountImagePullSecret",
            Relationship::ServiceAccountSecret => "ServiceAccountSecret",
            Relationship::HelmRelease => "HelmRelease",
            Relationship::HelmStorage => "HelmStorage",
        }
    }
}

impl std::fmt::Display for Relationship {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Relationships attached to a single directed edge. A BTreeSet so listing
/// is always sorted.
pub type RelationshipSet = BTreeSet<Relationship>;

/// Pending edges for one object, partitioned by addressing mode and
/// direction. Consumed by the resolver's unification stage and discarded.
#[derive(Debug, Default)]
pub struct RelationshipMap {
    pub dependencies_by_ref: HashMap<String, RelationshipSet>,
    pub dependencies_by_label_selector: HashMap<String, RelationshipSet>,
    pub dependencies_by_selector: HashMap<String, RelationshipSet>,
    pub dependencies_by_uid: HashMap<Uid, RelationshipSet>,
    pub dependents_by_ref: HashMap<String, RelationshipSet>,
    pub dependents_by_label_selector: HashMap<String, RelationshipSet>,
    pub dependents_by_selector: HashMap<String, RelationshipSet>,
    pub dependents_by_uid: HashMap<Uid, RelationshipSet>,
    /// Key to concrete selector, shared by both directions.
    pub label_selectors: HashMap<String, ObjectLabelSelector>,
    pub selectors: HashMap<String, ObjectSelector>,
}

impl RelationshipMap {
    pub fn add_dependency_by_ref(&mut self, r: &ObjectReference, rel: Relationship) {
        self.dependencies_by_ref.entry(r.key()).or_default().insert(rel);
    }

    pub fn add_dependent_by_ref(&mut self, r: &ObjectReference, rel: Relationship) {
        self.dependents_by_ref.entry(r.key()).or_default().insert(rel);
    }

    pub fn add_dependency_by_label_selector(&mut self, s: ObjectLabelSelector, rel: Relationship) {
        let key = s.key();
        self.dependencies_by_label_selector
            .entry(key.clone())
            .or_default()
            .insert(rel);
        self.label_selectors.insert(key, s);
    }

    pub fn add_dependent_by_label_selector(&mut self, s: ObjectLabelSelector, rel: Relationship) {
        let key = s.key();
        self.dependents_by_label_selector
            .entry(key.clone())
            .or_default()
            .insert(rel);
        self.label_selectors.insert(key, s);
    }

    pub fn add_dependency_by_selector(&mut self, s: ObjectSelector, rel: Relationship) {
        let key = s.key();
        self.dependencies_by_selector
            .entry(key.clone())
            .or_default()
            .insert(rel);
        self.selectors.insert(key, s);
    }

    pub fn add_dependent_by_selector(&mut self, s: ObjectSelector, rel: Relationship) {
        let key = s.key();
        self.dependents_by_selector
            .entry(key.clone())
            .or_default()
            .insert(rel);
        self.selectors.insert(key, s);
    }

    pub fn add_dependency_by_uid(&mut self, uid: impl Into<Uid>, rel: Relationship) {
        self.dependencies_by_uid.entry(uid.into()).or_default().insert(rel);
    }

    pub fn add_dependent_by_uid(&mut self, uid: impl Into<Uid>, rel: Relationship) {
        self.dependents_by_uid.entry(uid.into()).or_default().insert(rel);
    }

    pub fn is_empty(&self) -> bool {
        self.dependencies_by_ref.is_empty()
            && self.dependencies_by_label_selector.is_empty()
            && self.dependencies_by_selector.is_empty()
            && self.dependencies_by_uid.is_empty()
            && self.dependents_by_ref.is_empty()
            && self.dependents_by_label_selector.is_empty()
            && self.dependents_by_selector.is_empty()
            && self.dependents_by_uid.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_duplicate_adds_are_idempotent() {
        let mut m = RelationshipMap::default();
        let r = ObjectReference {
            kind: "Secret".into(),
            namespace: "default".into(),
            name: "tls".into(),
            ..Default::default()
        };
        m.add_dependency_by_ref(&r, Relationship::IngressTlsSecret);
        m.add_dependency_by_ref(&r, Relationship::IngressTlsSecret);
        m.add_dependency_by_ref(&r, Relationship::PodVolume);

        let set = &m.dependencies_by_ref[&r.key()];
        assert_eq!(set.len(), 2);
    }

    #[test]
    fn test_relationship_set_lists_sorted() {
        let mut set = RelationshipSet::new();
        set.insert(Relationship::OwnerReference);
        set.insert(Relationship::ControllerReference);
        let listed: Vec<&str> = set.iter().map(|r| r.as_str()).collect();
        assert_eq!(listed, vec!["ControllerReference", "OwnerReference"]);
    }

    #[test]
    fn test_selector_side_table_tracks_keys() {
        let mut m = RelationshipMap::default();
        let s = ObjectSelector {
            group: "policy".into(),
            kind: "PodSecurityPolicy".into(),
            namespaces: Default::default(),
        };
        m.add_dependency_by_selector(s.clone(), Relationship::ClusterRolePolicyRule);
        assert!(m.selectors.contains_key(&s.key()));
        assert!(!m.is_empty());
    }
}
