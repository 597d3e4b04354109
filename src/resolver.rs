//! The relationship resolver: owner pass, extractor pass, reference
//! unification and the directed breadth-first traversal that carves the
//! reachable subgraph out of the universe.

use std::collections::{HashSet, VecDeque};

use tracing::debug;

use crate::extractors;
use crate::graph::{Direction, NodeMap};
use crate::identity::Uid;
use crate::relationships::{Relationship, RelationshipMap};
use crate::universe::Universe;

/// A unified edge: `dependent` depends on `dependency` for reason `rel`.
struct Edge {
    dependent: Uid,
    dependency: Uid,
    rel: Relationship,
}

/// Resolves the subgraph reachable from `roots` in the chosen direction.
/// Roots absent from the universe are ignored; if none remain, the result
/// is empty and the caller decides how to surface that.
#[tracing::instrument(skip(universe), fields(objects = universe.len()))]
pub fn resolve(universe: Universe, roots: &[Uid], direction: Direction) -> NodeMap {
    if roots.is_empty() {
        return NodeMap::new();
    }

    let mut edges = owner_edges(&universe);
    edges.extend(extractor_edges(&universe));

    let (mut nodes, _, _) = universe.into_nodes();

    for edge in edges {
        // Self-edges never enter the graph.
        if edge.dependent == edge.dependency {
            continue;
        }
        if let Some(node) = nodes.get_mut(&edge.dependent) {
            node.add_dependency(edge.dependency.clone(), edge.rel);
        }
        if let Some(node) = nodes.get_mut(&edge.dependency) {
            node.add_dependent(edge.dependent, edge.rel);
        }
    }

    // Directed BFS over the chosen adjacency, one sentinel per depth layer.
    // Nodes reached on several paths keep their smallest depth.
    let mut queue: VecDeque<Option<Uid>> = roots
        .iter()
        .filter(|uid| nodes.contains_key(*uid))
        .map(|uid| Some(uid.clone()))
        .collect();
    if queue.is_empty() {
        return NodeMap::new();
    }
    queue.push_back(None);

    let mut visited: HashSet<Uid> = HashSet::new();
    let mut depth: u32 = 0;
    while let Some(item) = queue.pop_front() {
        let Some(uid) = item else {
            if queue.is_empty() {
                break;
            }
            depth += 1;
            queue.push_back(None);
            continue;
        };
        if !visited.insert(uid.clone()) {
            continue;
        }
        let Some(node) = nodes.get_mut(&uid) else {
            continue;
        };
        if node.depth == 0 || depth < node.depth {
            node.depth = depth;
        }
        for neighbor in node.deps(direction).keys() {
            queue.push_back(Some(neighbor.clone()));
        }
    }

    debug!(resolved = visited.len(), "resolved relationship subgraph");
    nodes.retain(|uid, _| visited.contains(uid));
    nodes
}

/// Edges implied by ownerReferences: an owned object depends on each of its
/// owners, with an extra controller edge for the managing one.
fn owner_edges(universe: &Universe) -> Vec<Edge> {
    let mut edges = Vec::new();
    for (uid, node) in universe.iter() {
        for owner in &node.owner_references {
            let Some(owner_uid) = universe.canonical_uid(&owner.uid) else {
                continue;
            };
            if owner.controller == Some(true) {
                edges.push(Edge {
                    dependent: uid.clone(),
                    dependency: owner_uid.clone(),
                    rel: Relationship::ControllerReference,
                });
            }
            edges.push(Edge {
                dependent: uid.clone(),
                dependency: owner_uid.clone(),
                rel: Relationship::OwnerReference,
            });
        }
    }
    edges
}

/// Runs every node through its extractor and unifies the returned
/// relationship maps into concrete UID edges. Targets missing from the
/// universe simply contribute no edge.
fn extractor_edges(universe: &Universe) -> Vec<Edge> {
    let mut edges = Vec::new();
    for (uid, node) in universe.iter() {
        let rmap = match extractors::extract(node) {
            Some(Ok(rmap)) => rmap,
            Some(Err(err)) => {
                debug!(kind = %node.kind, name = %node.name, %err, "skipping object");
                continue;
            }
            None => continue,
        };
        unify(universe, uid, &rmap, &mut edges);
    }
    edges
}

fn unify(universe: &Universe, uid: &Uid, rmap: &RelationshipMap, edges: &mut Vec<Edge>) {
    let mut push = |dependent: &Uid, dependency: &Uid, rel: Relationship| {
        edges.push(Edge {
            dependent: dependent.clone(),
            dependency: dependency.clone(),
            rel,
        });
    };

    for (key, rset) in &rmap.dependencies_by_ref {
        if let Some(target) = universe.uid_for_key(key) {
            for rel in rset {
                push(uid, target, *rel);
            }
        }
    }
    for (key, rset) in &rmap.dependents_by_ref {
        if let Some(target) = universe.uid_for_key(key) {
            for rel in rset {
                push(target, uid, *rel);
            }
        }
    }

    for (key, rset) in &rmap.dependencies_by_label_selector {
        if let Some(ols) = rmap.label_selectors.get(key) {
            for target in label_selector_targets(universe, ols) {
                for rel in rset {
                    push(uid, &target, *rel);
                }
            }
        }
    }
    for (key, rset) in &rmap.dependents_by_label_selector {
        if let Some(ols) = rmap.label_selectors.get(key) {
            for target in label_selector_targets(universe, ols) {
                for rel in rset {
                    push(&target, uid, *rel);
                }
            }
        }
    }

    for (key, rset) in &rmap.dependencies_by_selector {
        if let Some(os) = rmap.selectors.get(key) {
            for target in selector_targets(universe, os) {
                for rel in rset {
                    push(uid, &target, *rel);
                }
            }
        }
    }
    for (key, rset) in &rmap.dependents_by_selector {
        if let Some(os) = rmap.selectors.get(key) {
            for target in selector_targets(universe, os) {
                for rel in rset {
                    push(&target, uid, *rel);
                }
            }
        }
    }

    for (target, rset) in &rmap.dependencies_by_uid {
        if let Some(target) = universe.canonical_uid(target) {
            for rel in rset {
                push(uid, target, *rel);
            }
        }
    }
    for (target, rset) in &rmap.dependents_by_uid {
        if let Some(target) = universe.canonical_uid(target) {
            for rel in rset {
                push(target, uid, *rel);
            }
        }
    }
}

fn label_selector_targets(
    universe: &Universe,
    ols: &crate::identity::ObjectLabelSelector,
) -> Vec<Uid> {
    universe
        .iter()
        .filter(|(_, n)| {
            n.group == ols.group && n.kind == ols.kind && n.namespace == ols.namespace
        })
        .filter(|(_, n)| ols.selector.matches(&n.labels()))
        .map(|(uid, _)| uid.clone())
        .collect()
}

fn selector_targets(universe: &Universe, os: &crate::identity::ObjectSelector) -> Vec<Uid> {
    universe
        .iter()
        .filter(|(_, n)| n.group == os.group && n.kind == os.kind)
        .filter(|(_, n)| os.namespaces.is_empty() || os.namespaces.contains(&n.namespace))
        .map(|(uid, _)| uid.clone())
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::universe::EmptyMapper;
    use serde_json::{json, Value};

    fn resolve_objects(objects: Vec<Value>, roots: &[&str], direction: Direction) -> NodeMap {
        let universe = Universe::build(objects, &EmptyMapper);
        let roots: Vec<Uid> = roots.iter().map(|s| s.to_string()).collect();
        resolve(universe, &roots, direction)
    }

    fn deployment_chain() -> Vec<Value> {
        vec![
            json!({
                "apiVersion": "apps/v1", "kind": "Deployment",
                "metadata": {"name": "coredns", "namespace": "kube-system", "uid": "d"},
            }),
            json!({
                "apiVersion": "apps/v1", "kind": "ReplicaSet",
                "metadata": {
                    "name": "coredns-5d69dc75db", "namespace": "kube-system", "uid": "rs",
                    "ownerReferences": [{
                        "apiVersion": "apps/v1", "kind": "Deployment", "name": "coredns",
                        "uid": "d", "controller": true,
                    }],
                },
            }),
            json!({
                "apiVersion": "v1", "kind": "Pod",
                "metadata": {
                    "name": "coredns-5d69dc75db-26wjw", "namespace": "kube-system", "uid": "pod",
                    "ownerReferences": [{
                        "apiVersion": "apps/v1", "kind": "ReplicaSet",
                        "name": "coredns-5d69dc75db", "uid": "rs", "controller": true,
                    }],
                },
            }),
        ]
    }

    #[test]
    fn test_deployment_dependents_chain() {
        let map = resolve_objects(deployment_chain(), &["d"], Direction::Dependents);

        assert_eq!(map.len(), 3);
        let owner_set = &map["rs"].dependencies["d"];
        assert!(owner_set.contains(&Relationship::ControllerReference));
        assert!(owner_set.contains(&Relationship::OwnerReference));
        assert!(map["d"].dependents["rs"].contains(&Relationship::ControllerReference));
        assert!(map["pod"].dependencies["rs"].contains(&Relationship::OwnerReference));

        assert_eq!(map["d"].depth, 0);
        assert_eq!(map["rs"].depth, 1);
        assert_eq!(map["pod"].depth, 2);
    }

    #[test]
    fn test_dependencies_direction_from_leaf() {
        let map = resolve_objects(deployment_chain(), &["pod"], Direction::Dependencies);
        assert_eq!(map.len(), 3);
        assert_eq!(map["pod"].depth, 0);
        assert_eq!(map["rs"].depth, 1);
        assert_eq!(map["d"].depth, 2);
    }

    #[test]
    fn test_dependents_from_leaf_is_just_the_leaf() {
        let map = resolve_objects(deployment_chain(), &["pod"], Direction::Dependents);
        assert_eq!(map.len(), 1);
        assert!(map.contains_key("pod"));
    }

    #[test]
    fn test_service_label_selector() {
        let objects = vec![
            json!({
                "apiVersion": "v1", "kind": "Service",
                "metadata": {"name": "kube-dns", "namespace": "kube-system", "uid": "svc"},
                "spec": {"selector": {"k8s-app": "kube-dns"}},
            }),
            json!({
                "apiVersion": "v1", "kind": "Pod",
                "metadata": {
                    "name": "coredns-abc", "namespace": "kube-system", "uid": "p1",
                    "labels": {"k8s-app": "kube-dns"},
                },
            }),
            json!({
                "apiVersion": "v1", "kind": "Pod",
                "metadata": {
                    "name": "other", "namespace": "kube-system", "uid": "p2",
                    "labels": {"app": "other"},
                },
            }),
        ];
        let map = resolve_objects(objects, &["svc"], Direction::Dependents);

        assert!(map.contains_key("p1"));
        assert!(!map.contains_key("p2"));
        assert!(map["p1"].dependents["svc"].contains(&Relationship::Service));
        assert!(map["svc"].dependencies["p1"].contains(&Relationship::Service));
    }

    #[test]
    fn test_event_by_uid() {
        let objects = vec![
            json!({
                "apiVersion": "v1", "kind": "Node",
                "metadata": {"name": "worker-1", "uid": "n"},
            }),
            json!({
                "apiVersion": "v1", "kind": "Event",
                "metadata": {"name": "x", "namespace": "default", "uid": "e"},
                "involvedObject": {"kind": "Node", "name": "worker-1", "uid": "n"},
            }),
        ];
        let map = resolve_objects(objects, &["n"], Direction::Dependents);

        assert!(map.contains_key("e"));
        assert!(map["n"].dependents["e"].contains(&Relationship::EventRegarding));
        assert!(map["e"].dependencies["n"].contains(&Relationship::EventRegarding));
    }

    #[test]
    fn test_event_through_hostname_alias() {
        let objects = vec![
            json!({
                "apiVersion": "v1", "kind": "Node",
                "metadata": {
                    "name": "worker-2", "uid": "n2",
                    "labels": {"kubernetes.io/hostname": "worker2"},
                },
            }),
            json!({
                "apiVersion": "events.k8s.io/v1", "kind": "Event",
                "metadata": {"name": "y", "namespace": "default", "uid": "e"},
                "regarding": {"kind": "Node", "name": "worker-2", "uid": "worker2"},
            }),
        ];
        let map = resolve_objects(objects, &["n2"], Direction::Dependents);

        assert!(map.contains_key("e"));
        assert!(map["n2"].dependents["e"].contains(&Relationship::EventRegarding));
    }

    #[test]
    fn test_psp_rule_with_empty_resource_names() {
        let objects = vec![
            json!({
                "apiVersion": "rbac.authorization.k8s.io/v1", "kind": "ClusterRole",
                "metadata": {"name": "r", "uid": "r"},
                "rules": [{
                    "apiGroups": ["policy"], "resources": ["podsecuritypolicies"],
                    "verbs": ["use"], "resourceNames": [],
                }],
            }),
            json!({
                "apiVersion": "policy/v1beta1", "kind": "PodSecurityPolicy",
                "metadata": {"name": "psp-a", "uid": "a"},
            }),
            json!({
                "apiVersion": "policy/v1beta1", "kind": "PodSecurityPolicy",
                "metadata": {"name": "psp-b", "uid": "b"},
            }),
        ];
        let map = resolve_objects(objects, &["r"], Direction::Dependencies);

        assert_eq!(map.len(), 3);
        for uid in ["a", "b"] {
            assert!(map["r"].dependencies[uid].contains(&Relationship::ClusterRolePolicyRule));
            assert!(map[uid].dependents["r"].contains(&Relationship::ClusterRolePolicyRule));
        }
    }

    #[test]
    fn test_pv_pvc_bidirectional_binding_collapses() {
        let objects = vec![
            json!({
                "apiVersion": "v1", "kind": "PersistentVolume",
                "metadata": {"name": "pv-1", "uid": "pv"},
                "spec": {"claimRef": {
                    "kind": "PersistentVolumeClaim", "name": "data", "namespace": "apps",
                }},
            }),
            json!({
                "apiVersion": "v1", "kind": "PersistentVolumeClaim",
                "metadata": {"name": "data", "namespace": "apps", "uid": "pvc"},
                "spec": {"volumeName": "pv-1"},
            }),
        ];
        let map = resolve_objects(objects, &["pv"], Direction::Dependents);

        // Both halves of the binding unify onto the same edge.
        assert_eq!(map["pvc"].dependencies["pv"].len(), 1);
        assert!(map["pvc"].dependencies["pv"].contains(&Relationship::PersistentVolumeClaim));
        assert!(map["pv"].dependents["pvc"].contains(&Relationship::PersistentVolumeClaim));
    }

    #[test]
    fn test_cycles_terminate_and_keep_min_depth() {
        // Two objects owning each other, which real clusters forbid but the
        // resolver must survive.
        let objects = vec![
            json!({
                "apiVersion": "example.com/v1", "kind": "Widget",
                "metadata": {
                    "name": "a", "namespace": "default", "uid": "a",
                    "ownerReferences": [{
                        "apiVersion": "example.com/v1", "kind": "Widget", "name": "b", "uid": "b",
                    }],
                },
            }),
            json!({
                "apiVersion": "example.com/v1", "kind": "Widget",
                "metadata": {
                    "name": "b", "namespace": "default", "uid": "b",
                    "ownerReferences": [{
                        "apiVersion": "example.com/v1", "kind": "Widget", "name": "a", "uid": "a",
                    }],
                },
            }),
        ];
        let map = resolve_objects(objects, &["a"], Direction::Dependents);
        assert_eq!(map.len(), 2);
        assert_eq!(map["a"].depth, 0);
        assert_eq!(map["b"].depth, 1);
    }

    #[test]
    fn test_no_self_edges_survive() {
        // An aggregated ClusterRole whose selector matches its own labels.
        let objects = vec![json!({
            "apiVersion": "rbac.authorization.k8s.io/v1", "kind": "ClusterRole",
            "metadata": {
                "name": "edit", "uid": "cr",
                "labels": {"rbac.example.com/aggregate": "true"},
            },
            "aggregationRule": {"clusterRoleSelectors": [
                {"matchLabels": {"rbac.example.com/aggregate": "true"}},
            ]},
        })];
        let map = resolve_objects(objects, &["cr"], Direction::Dependencies);
        assert!(!map["cr"].dependencies.contains_key("cr"));
        assert!(!map["cr"].dependents.contains_key("cr"));
    }

    #[test]
    fn test_edge_bidirectionality_invariant() {
        let map = resolve_objects(deployment_chain(), &["d"], Direction::Dependents);
        for (uid, node) in &map {
            for (dep_uid, rset) in &node.dependents {
                let mirror = &map[dep_uid].dependencies[uid];
                assert_eq!(rset, mirror);
            }
            for (dep_uid, rset) in &node.dependencies {
                let mirror = &map[dep_uid].dependents[uid];
                assert_eq!(rset, mirror);
            }
        }
    }

    #[test]
    fn test_resolution_is_repeatable() {
        let a = resolve_objects(deployment_chain(), &["d"], Direction::Dependents);
        let b = resolve_objects(deployment_chain(), &["d"], Direction::Dependents);
        assert_eq!(a.len(), b.len());
        for (uid, node) in &a {
            assert_eq!(node.dependencies, b[uid].dependencies);
            assert_eq!(node.dependents, b[uid].dependents);
            assert_eq!(node.depth, b[uid].depth);
        }
    }

    #[test]
    fn test_node_on_multiple_paths_keeps_shortest_depth() {
        // The pod hangs off the replicaset but also carries a direct owner
        // reference to the deployment, so two paths reach it at depths 2
        // and 1.
        let objects = vec![
            json!({
                "apiVersion": "apps/v1", "kind": "Deployment",
                "metadata": {"name": "web", "namespace": "default", "uid": "d"},
            }),
            json!({
                "apiVersion": "apps/v1", "kind": "ReplicaSet",
                "metadata": {
                    "name": "web-abc", "namespace": "default", "uid": "rs",
                    "ownerReferences": [{
                        "apiVersion": "apps/v1", "kind": "Deployment", "name": "web",
                        "uid": "d", "controller": true,
                    }],
                },
            }),
            json!({
                "apiVersion": "v1", "kind": "Pod",
                "metadata": {
                    "name": "web-abc-1", "namespace": "default", "uid": "pod",
                    "ownerReferences": [
                        {"apiVersion": "apps/v1", "kind": "ReplicaSet", "name": "web-abc",
                         "uid": "rs", "controller": true},
                        {"apiVersion": "apps/v1", "kind": "Deployment", "name": "web",
                         "uid": "d"},
                    ],
                },
            }),
        ];
        let map = resolve_objects(objects, &["d"], Direction::Dependents);
        assert_eq!(map["pod"].depth, 1);
        assert_eq!(map["rs"].depth, 1);
    }

    #[test]
    fn test_missing_root_yields_empty_map() {
        let map = resolve_objects(deployment_chain(), &["nope"], Direction::Dependents);
        assert!(map.is_empty());
    }

    #[test]
    fn test_unification_miss_drops_edge_silently() {
        // Pod references a node that was never fetched.
        let objects = vec![json!({
            "apiVersion": "v1", "kind": "Pod",
            "metadata": {"name": "p", "namespace": "default", "uid": "p"},
            "spec": {"nodeName": "gone"},
        })];
        let map = resolve_objects(objects, &["p"], Direction::Dependencies);
        assert_eq!(map.len(), 1);
        assert!(map["p"].dependencies.is_empty());
    }
}
