//! Pod relationships: container environment sources, image pull secrets,
//! scheduling references and volume sources.

use serde_json::Value;

use crate::error::Result;
use crate::graph::Node;
use crate::identity::ObjectReference;
use crate::relationships::{Relationship, RelationshipMap};

pub fn relationships(node: &Node) -> Result<RelationshipMap> {
    let mut result = RelationshipMap::default();
    let ns = node.namespace.as_str();
    let Some(spec) = node.manifest.get("spec") else {
        return Ok(result);
    };

    // PodContainerEnvironment: envFrom and env.valueFrom across init and
    // main containers.
    for field in ["initContainers", "containers"] {
        let Some(containers) = spec.get(field).and_then(|v| v.as_array()) else {
            continue;
        };
        for container in containers {
            add_container_env(&mut result, container, ns);
        }
    }

    // PodImagePullSecret
    if let Some(secrets) = spec.get("imagePullSecrets").and_then(|v| v.as_array()) {
        for s in secrets {
            if let Some(name) = s.get("name").and_then(|v| v.as_str()) {
                let r = secret_ref(name, ns);
                result.add_dependency_by_ref(&r, Relationship::PodImagePullSecret);
            }
        }
    }

    // PodNode
    if let Some(node_name) = spec.get("nodeName").and_then(|v| v.as_str()) {
        if !node_name.is_empty() {
            let r = ObjectReference {
                kind: "Node".into(),
                name: node_name.into(),
                ..Default::default()
            };
            result.add_dependency_by_ref(&r, Relationship::PodNode);
        }
    }

    // PodPriorityClass
    if let Some(pc) = spec.get("priorityClassName").and_then(|v| v.as_str()) {
        if !pc.is_empty() {
            let r = ObjectReference {
                group: "scheduling.k8s.io".into(),
                kind: "PriorityClass".into(),
                name: pc.into(),
                ..Default::default()
            };
            result.add_dependency_by_ref(&r, Relationship::PodPriorityClass);
        }
    }

    // PodRuntimeClass
    if let Some(rc) = spec.get("runtimeClassName").and_then(|v| v.as_str()) {
        if !rc.is_empty() {
            let r = ObjectReference {
                group: "node.k8s.io".into(),
                kind: "RuntimeClass".into(),
                name: rc.into(),
                ..Default::default()
            };
            result.add_dependency_by_ref(&r, Relationship::PodRuntimeClass);
        }
    }

    // PodSecurityPolicy, recorded by the admission controller under the
    // "kubernetes.io/psp" annotation.
    if let Some(psp) = node.annotations().get("kubernetes.io/psp") {
        let r = ObjectReference {
            group: "policy".into(),
            kind: "PodSecurityPolicy".into(),
            name: psp.clone(),
            ..Default::default()
        };
        result.add_dependency_by_ref(&r, Relationship::PodSecurityPolicy);
    }

    // PodServiceAccount
    if let Some(sa) = spec.get("serviceAccountName").and_then(|v| v.as_str()) {
        if !sa.is_empty() {
            let r = ObjectReference {
                kind: "ServiceAccount".into(),
                namespace: ns.into(),
                name: sa.into(),
                ..Default::default()
            };
            result.add_dependency_by_ref(&r, Relationship::PodServiceAccount);
        }
    }

    // PodVolume, PodVolumeCSIDriver, PodVolumeCSIDriverSecret
    if let Some(volumes) = spec.get("volumes").and_then(|v| v.as_array()) {
        for volume in volumes {
            add_volume(&mut result, volume, ns);
        }
    }

    Ok(result)
}

fn add_container_env(result: &mut RelationshipMap, container: &Value, ns: &str) {
    if let Some(env_from) = container.get("envFrom").and_then(|v| v.as_array()) {
        for env in env_from {
            if let Some(name) = env
                .get("configMapRef")
                .and_then(|r| r.get("name"))
                .and_then(|v| v.as_str())
            {
                let r = config_map_ref(name, ns);
                result.add_dependency_by_ref(&r, Relationship::PodContainerEnvironment);
            }
            if let Some(name) = env
                .get("secretRef")
                .and_then(|r| r.get("name"))
                .and_then(|v| v.as_str())
            {
                let r = secret_ref(name, ns);
                result.add_dependency_by_ref(&r, Relationship::PodContainerEnvironment);
            }
        }
    }

    if let Some(env) = container.get("env").and_then(|v| v.as_array()) {
        for entry in env {
            let Some(value_from) = entry.get("valueFrom") else {
                continue;
            };
            if let Some(name) = value_from
                .get("configMapKeyRef")
                .and_then(|r| r.get("name"))
                .and_then(|v| v.as_str())
            {
                let r = config_map_ref(name, ns);
                result.add_dependency_by_ref(&r, Relationship::PodContainerEnvironment);
            }
            if let Some(name) = value_from
                .get("secretKeyRef")
                .and_then(|r| r.get("name"))
                .and_then(|v| v.as_str())
            {
                let r = secret_ref(name, ns);
                result.add_dependency_by_ref(&r, Relationship::PodContainerEnvironment);
            }
        }
    }
}

fn add_volume(result: &mut RelationshipMap, volume: &Value, ns: &str) {
    if let Some(name) = volume
        .get("configMap")
        .and_then(|v| v.get("name"))
        .and_then(|v| v.as_str())
    {
        let r = config_map_ref(name, ns);
        result.add_dependency_by_ref(&r, Relationship::PodVolume);
    }

    if let Some(csi) = volume.get("csi") {
        if let Some(driver) = csi.get("driver").and_then(|v| v.as_str()) {
            let r = ObjectReference {
                group: "storage.k8s.io".into(),
                kind: "CSIDriver".into(),
                name: driver.into(),
                ..Default::default()
            };
            result.add_dependency_by_ref(&r, Relationship::PodVolumeCsiDriver);
        }
        if let Some(name) = csi
            .get("nodePublishSecretRef")
            .and_then(|v| v.get("name"))
            .and_then(|v| v.as_str())
        {
            let r = secret_ref(name, ns);
            result.add_dependency_by_ref(&r, Relationship::PodVolumeCsiDriverSecret);
        }
    }

    if let Some(claim) = volume
        .get("persistentVolumeClaim")
        .and_then(|v| v.get("claimName"))
        .and_then(|v| v.as_str())
    {
        let r = ObjectReference {
            kind: "PersistentVolumeClaim".into(),
            namespace: ns.into(),
            name: claim.into(),
            ..Default::default()
        };
        result.add_dependency_by_ref(&r, Relationship::PodVolume);
    }

    if let Some(sources) = volume
        .get("projected")
        .and_then(|v| v.get("sources"))
        .and_then(|v| v.as_array())
    {
        for source in sources {
            if let Some(name) = source
                .get("configMap")
                .and_then(|v| v.get("name"))
                .and_then(|v| v.as_str())
            {
                let r = config_map_ref(name, ns);
                result.add_dependency_by_ref(&r, Relationship::PodVolume);
            }
            if let Some(name) = source
                .get("secret")
                .and_then(|v| v.get("name"))
                .and_then(|v| v.as_str())
            {
                let r = secret_ref(name, ns);
                result.add_dependency_by_ref(&r, Relationship::PodVolume);
            }
        }
    }

    if let Some(name) = volume
        .get("secret")
        .and_then(|v| v.get("secretName"))
        .and_then(|v| v.as_str())
    {
        let r = secret_ref(name, ns);
        result.add_dependency_by_ref(&r, Relationship::PodVolume);
    }
}

fn secret_ref(name: &str, ns: &str) -> ObjectReference {
    ObjectReference {
        kind: "Secret".into(),
        namespace: ns.into(),
        name: name.into(),
        ..Default::default()
    }
}

fn config_map_ref(name: &str, ns: &str) -> ObjectReference {
    ObjectReference {
        kind: "ConfigMap".into(),
        namespace: ns.into(),
        name: name.into(),
        ..Default::default()
    }
}
