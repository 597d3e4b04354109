//! Tree projection: turns a resolved node map into an ordered,
//! de-duplicated sequence of rows with tree-glyph prefixes, ready for the
//! renderer. Pure over the node map, so it can run repeatedly with
//! different settings.

use std::collections::HashSet;

use crate::error::{Error, Result};
use crate::graph::{node_sort_key, Direction, NodeMap};
use crate::identity::Uid;
use crate::relationships::RelationshipSet;

/// One output line: which node, its glyph prefix, and the relationships it
/// has with the parent it is printed under (empty for the root).
#[derive(Debug, Clone)]
pub struct TreeRow {
    pub uid: Uid,
    pub prefix: String,
    pub relationships: RelationshipSet,
    pub depth: u32,
}

/// Projects the subgraph under `root_uid` into rows. `max_depth` of 0 means
/// unlimited; deeper nodes are trimmed here, never in the resolver.
#[tracing::instrument(skip(node_map), fields(nodes = node_map.len()))]
pub fn project(
    node_map: &NodeMap,
    root_uid: &str,
    direction: Direction,
    max_depth: u32,
) -> Result<Vec<TreeRow>> {
    let root = node_map.get(root_uid).ok_or_else(|| {
        Error::Render(format!(
            "requested object (uid: {root_uid}) not found in list of fetched objects"
        ))
    })?;

    let mut rows = Vec::with_capacity(node_map.len());
    rows.push(TreeRow {
        uid: root.uid.clone(),
        prefix: String::new(),
        relationships: RelationshipSet::new(),
        depth: 0,
    });

    let mut visited = HashSet::new();
    walk(node_map, root_uid, direction, "", 1, max_depth, &mut visited, &mut rows)?;
    Ok(rows)
}

/// Appends the neighbors of `uid` (and recursively theirs) to `rows`,
/// sorted by namespace, kind, group, name. The visited set prunes cycles:
/// a node is expanded once, at its first (shallowest) appearance.
#[allow(clippy::too_many_arguments)]
fn walk(
    node_map: &NodeMap,
    uid: &str,
    direction: Direction,
    prefix: &str,
    depth: u32,
    max_depth: u32,
    visited: &mut HashSet<Uid>,
    rows: &mut Vec<TreeRow>,
) -> Result<()> {
    if !visited.insert(uid.to_string()) {
        return Ok(());
    }
    let node = node_map
        .get(uid)
        .ok_or_else(|| Error::Render(format!("object (uid: {uid}) missing from node map")))?;

    let mut neighbors: Vec<&Uid> = node.deps(direction).keys().collect();
    neighbors.sort_by_key(|uid| {
        node_map
            .get(*uid)
            .map(node_sort_key)
            .unwrap_or_else(|| (String::new(), String::new(), String::new(), uid.to_string()))
    });

    let last = neighbors.len().saturating_sub(1);
    for (ix, neighbor_uid) in neighbors.iter().enumerate() {
        let (glyph, descent) = if ix != last {
            ("├── ", "│   ")
        } else {
            ("└── ", "    ")
        };
        let neighbor = node_map.get(*neighbor_uid).ok_or_else(|| {
            Error::Render(format!(
                "related object (uid: {neighbor_uid}) missing from node map"
            ))
        })?;
        let relationships = node
            .deps(direction)
            .get(*neighbor_uid)
            .cloned()
            .unwrap_or_default();

        rows.push(TreeRow {
            uid: neighbor.uid.clone(),
            prefix: format!("{prefix}{glyph}"),
            relationships,
            depth,
        });
        if max_depth == 0 || depth < max_depth {
            walk(
                node_map,
                neighbor_uid,
                direction,
                &format!("{prefix}{descent}"),
                depth + 1,
                max_depth,
                visited,
                rows,
            )?;
        }
    }
    Ok(())
}

/// Column hints derived from the nodes within the depth bound: whether a
/// kind needs its group shown (only when several groups share the kind),
/// and whether the namespace column is needed at all.
#[derive(Debug)]
pub struct ColumnHints {
    kind_groups: std::collections::HashMap<String, HashSet<String>>,
    multiple_namespaces: bool,
    force_group: bool,
}

impl ColumnHints {
    pub fn new(node_map: &NodeMap, max_depth: u32, force_group: bool) -> Self {
        let mut kind_groups: std::collections::HashMap<String, HashSet<String>> =
            std::collections::HashMap::new();
        let mut namespaces = HashSet::new();
        for node in node_map.values() {
            if max_depth != 0 && node.depth > max_depth {
                continue;
            }
            kind_groups
                .entry(node.kind.clone())
                .or_default()
                .insert(node.group.clone());
            namespaces.insert(node.namespace.clone());
        }
        Self {
            kind_groups,
            multiple_namespaces: namespaces.len() > 1,
            force_group,
        }
    }

    pub fn show_group(&self, kind: &str) -> bool {
        self.force_group || self.kind_groups.get(kind).is_some_and(|g| g.len() > 1)
    }

    pub fn show_namespace(&self) -> bool {
        self.multiple_namespaces
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::resolver::resolve;
    use crate::universe::{EmptyMapper, Universe};
    use serde_json::{json, Value};

    fn owned(kind: &str, name: &str, uid: &str, owner: Option<(&str, &str, &str)>) -> Value {
        let mut meta = json!({"name": name, "namespace": "default", "uid": uid});
        if let Some((okind, oname, ouid)) = owner {
            meta["ownerReferences"] = json!([{
                "apiVersion": "apps/v1", "kind": okind, "name": oname, "uid": ouid,
            }]);
        }
        json!({"apiVersion": "apps/v1", "kind": kind, "metadata": meta})
    }

    fn chain() -> NodeMap {
        let objects = vec![
            owned("App", "a", "a", None),
            owned("App", "b", "b", Some(("App", "a", "a"))),
            owned("App", "c", "c", Some(("App", "b", "b"))),
            owned("App", "d", "d", Some(("App", "c", "c"))),
        ];
        let universe = Universe::build(objects, &EmptyMapper);
        resolve(universe, &["a".to_string()], Direction::Dependents)
    }

    #[test]
    fn test_depth_bound_trims_rows() {
        let map = chain();
        let rows = project(&map, "a", Direction::Dependents, 2).unwrap();
        let uids: Vec<&str> = rows.iter().map(|r| r.uid.as_str()).collect();
        assert_eq!(uids, vec!["a", "b", "c"]);

        let all = project(&map, "a", Direction::Dependents, 0).unwrap();
        assert_eq!(all.len(), 4);
    }

    #[test]
    fn test_projection_is_deterministic_and_sorted() {
        let objects = vec![
            owned("App", "root", "root", None),
            owned("Zeta", "z", "z", Some(("App", "root", "root"))),
            owned("Alpha", "x", "x", Some(("App", "root", "root"))),
            owned("Alpha", "a", "a2", Some(("App", "root", "root"))),
        ];
        let universe = Universe::build(objects, &EmptyMapper);
        let map = resolve(universe, &["root".to_string()], Direction::Dependents);

        let rows = project(&map, "root", Direction::Dependents, 0).unwrap();
        let uids: Vec<&str> = rows.iter().map(|r| r.uid.as_str()).collect();
        // Children sorted by kind then name: Alpha/a, Alpha/x, Zeta/z.
        assert_eq!(uids, vec!["root", "a2", "x", "z"]);

        let again = project(&map, "root", Direction::Dependents, 0).unwrap();
        let prefixes: Vec<&str> = rows.iter().map(|r| r.prefix.as_str()).collect();
        let prefixes_again: Vec<&str> = again.iter().map(|r| r.prefix.as_str()).collect();
        assert_eq!(prefixes, prefixes_again);
        assert_eq!(prefixes, vec!["", "├── ", "├── ", "└── "]);
    }

    #[test]
    fn test_cycles_do_not_recurse_forever() {
        let objects = vec![
            owned("App", "a", "a", Some(("App", "b", "b"))),
            owned("App", "b", "b", Some(("App", "a", "a"))),
        ];
        let universe = Universe::build(objects, &EmptyMapper);
        let map = resolve(universe, &["a".to_string()], Direction::Dependents);

        let rows = project(&map, "a", Direction::Dependents, 0).unwrap();
        // a, its dependent b, and b's dependent a printed once more as a
        // leaf; b is not expanded a second time.
        assert!(rows.len() <= 3);
    }

    #[test]
    fn test_missing_root_is_a_render_error() {
        let map = NodeMap::new();
        assert!(project(&map, "nope", Direction::Dependents, 0).is_err());
    }

    #[test]
    fn test_column_hints() {
        let objects = vec![
            json!({
                "apiVersion": "v1", "kind": "Service",
                "metadata": {"name": "core-svc", "namespace": "default", "uid": "s1"},
            }),
            json!({
                "apiVersion": "serving.knative.dev/v1", "kind": "Service",
                "metadata": {
                    "name": "kn-svc", "namespace": "default", "uid": "s2",
                    "ownerReferences": [{
                        "apiVersion": "v1", "kind": "Service", "name": "core-svc", "uid": "s1",
                    }],
                },
            }),
        ];
        let universe = Universe::build(objects, &EmptyMapper);
        let map = resolve(universe, &["s1".to_string()], Direction::Dependents);

        let hints = ColumnHints::new(&map, 0, false);
        assert!(hints.show_group("Service"));
        assert!(!hints.show_group("Pod"));
        assert!(!hints.show_namespace());
    }
}
