//! Ingress and IngressClass relationships. Ingress exists under both the
//! legacy `extensions` group and `networking.k8s.io`; backends changed shape
//! between the two, so both are handled here.

use serde_json::Value;

use crate::error::Result;
use crate::graph::Node;
use crate::identity::ObjectReference;
use crate::relationships::{Relationship, RelationshipMap};

pub fn ingress(node: &Node) -> Result<RelationshipMap> {
    let mut result = RelationshipMap::default();
    let ns = node.namespace.as_str();
    let Some(spec) = node.manifest.get("spec") else {
        return Ok(result);
    };

    // IngressClass
    if let Some(class) = spec.get("ingressClassName").and_then(|v| v.as_str()) {
        if !class.is_empty() {
            let r = ObjectReference {
                group: "networking.k8s.io".into(),
                kind: "IngressClass".into(),
                name: class.into(),
                ..Default::default()
            };
            result.add_dependency_by_ref(&r, Relationship::IngressClass);
        }
    }

    // IngressResource / IngressService from the default backend and every
    // rule path. The legacy group names the default backend "backend".
    let default_backend = match node.group.as_str() {
        "extensions" => spec.get("backend"),
        _ => spec.get("defaultBackend"),
    };
    if let Some(backend) = default_backend {
        add_backend(&mut result, backend, ns);
    }
    if let Some(rules) = spec.get("rules").and_then(|v| v.as_array()) {
        for rule in rules {
            let Some(paths) = rule
                .get("http")
                .and_then(|h| h.get("paths"))
                .and_then(|v| v.as_array())
            else {
                continue;
            };
            for path in paths {
                if let Some(backend) = path.get("backend") {
                    add_backend(&mut result, backend, ns);
                }
            }
        }
    }

    // IngressTLSSecret
    if let Some(tls_list) = spec.get("tls").and_then(|v| v.as_array()) {
        for tls in tls_list {
            if let Some(secret) = tls.get("secretName").and_then(|v| v.as_str()) {
                let r = ObjectReference {
                    kind: "Secret".into(),
                    namespace: ns.into(),
                    name: secret.into(),
                    ..Default::default()
                };
                result.add_dependency_by_ref(&r, Relationship::IngressTlsSecret);
            }
        }
    }

    Ok(result)
}

fn add_backend(result: &mut RelationshipMap, backend: &Value, ns: &str) {
    // Resource backends take precedence over service backends.
    if let Some(resource) = backend.get("resource") {
        if let (Some(kind), Some(name)) = (
            resource.get("kind").and_then(|v| v.as_str()),
            resource.get("name").and_then(|v| v.as_str()),
        ) {
            let r = ObjectReference {
                group: resource
                    .get("apiGroup")
                    .and_then(|v| v.as_str())
                    .unwrap_or_default()
                    .into(),
                kind: kind.into(),
                namespace: ns.into(),
                name: name.into(),
            };
            result.add_dependency_by_ref(&r, Relationship::IngressResource);
            return;
        }
    }

    // Legacy shape: a bare serviceName.
    if let Some(name) = backend.get("serviceName").and_then(|v| v.as_str()) {
        let r = service_ref(name, ns);
        result.add_dependency_by_ref(&r, Relationship::IngressService);
        return;
    }

    // networking.k8s.io/v1 shape.
    if let Some(name) = backend
        .get("service")
        .and_then(|s| s.get("name"))
        .and_then(|v| v.as_str())
    {
        let r = service_ref(name, ns);
        result.add_dependency_by_ref(&r, Relationship::IngressService);
    }
}

fn service_ref(name: &str, ns: &str) -> ObjectReference {
    ObjectReference {
        kind: "Service".into(),
        namespace: ns.into(),
        name: name.into(),
        ..Default::default()
    }
}

pub fn ingress_class(node: &Node) -> Result<RelationshipMap> {
    let mut result = RelationshipMap::default();

    // IngressClassParameters
    if let Some(p) = node.manifest.get("spec").and_then(|s| s.get("parameters")) {
        if let (Some(kind), Some(name)) = (
            p.get("kind").and_then(|v| v.as_str()),
            p.get("name").and_then(|v| v.as_str()),
        ) {
            let r = ObjectReference {
                group: p
                    .get("apiGroup")
                    .and_then(|v| v.as_str())
                    .unwrap_or_default()
                    .into(),
                kind: kind.into(),
                namespace: p
                    .get("namespace")
                    .and_then(|v| v.as_str())
                    .unwrap_or_default()
                    .into(),
                name: name.into(),
            };
            result.add_dependency_by_ref(&r, Relationship::IngressClassParameters);
        }
    }

    Ok(result)
}
