//! Server-rendered table output (`-o split`): instead of one tree, the
//! resolved objects are grouped by kind and printed with the columns the
//! API server itself renders for `kubectl get`, one table per group-kind.

use std::collections::{BTreeMap, BTreeSet};

use futures::{stream::FuturesUnordered, StreamExt};
use serde::Deserialize;
use serde_json::Value;

use crate::client::ClusterClient;
use crate::error::{Error, Result};
use crate::graph::NodeMap;
use crate::render::format_table;
use crate::tree::ColumnHints;

/// A `meta.k8s.io` Table response. Only the fields the renderer needs.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct Table {
    #[serde(default, rename = "columnDefinitions")]
    pub column_definitions: Vec<TableColumnDefinition>,
    #[serde(default)]
    pub rows: Vec<TableRow>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct TableColumnDefinition {
    pub name: String,
    /// Columns with a non-zero priority only appear in wide output.
    #[serde(default)]
    pub priority: i32,
}

#[derive(Debug, Clone, Deserialize)]
pub struct TableRow {
    #[serde(default)]
    pub cells: Vec<Value>,
    /// Partial object metadata, requested alongside the cells.
    #[serde(default)]
    pub object: Value,
}

impl Table {
    /// Appends another table's rows; the first table's column definitions
    /// win (the server renders one shape per resource).
    pub fn merge(&mut self, other: Table) {
        if self.column_definitions.is_empty() {
            self.column_definitions = other.column_definitions;
        }
        self.rows.extend(other.rows);
    }
}

impl TableRow {
    fn namespace(&self) -> &str {
        self.object
            .get("metadata")
            .and_then(|m| m.get("namespace"))
            .and_then(|v| v.as_str())
            .unwrap_or_default()
    }

    fn name(&self) -> &str {
        self.object
            .get("metadata")
            .and_then(|m| m.get("name"))
            .and_then(|v| v.as_str())
            .unwrap_or_default()
    }
}

/// Prints the resolved node map as per-kind server tables, fetched
/// concurrently and emitted in group-kind order.
pub struct SplitPrinter<'a> {
    client: &'a ClusterClient,
}

impl<'a> SplitPrinter<'a> {
    pub fn new(client: &'a ClusterClient) -> Self {
        Self { client }
    }

    #[tracing::instrument(skip_all, fields(nodes = node_map.len()))]
    pub async fn print(
        &self,
        node_map: &NodeMap,
        max_depth: u32,
        wide: bool,
        force_group: bool,
    ) -> Result<String> {
        let hints = ColumnHints::new(node_map, max_depth, force_group);

        // Group the visible objects by group-kind, then namespace, with
        // names sorted for stable fetches.
        let mut by_gk: BTreeMap<(String, String), BTreeMap<String, BTreeSet<String>>> =
            BTreeMap::new();
        for node in node_map.values() {
            if node.kind.is_empty() || (max_depth != 0 && node.depth > max_depth) {
                continue;
            }
            by_gk
                .entry((node.group.clone(), node.kind.clone()))
                .or_default()
                .entry(node.namespace.clone())
                .or_default()
                .insert(node.name.clone());
        }

        let mut sections = Vec::new();
        for ((group, kind), by_ns) in by_gk {
            let Some(api) = self.client.mapper().lookup(&group, &kind).cloned() else {
                continue;
            };
            let show_namespace = by_ns.len() > 1;

            // One fetch per object, bounded by the client's own list
            // concurrency; namespaces merge back in sorted order.
            let mut merged_by_ns: BTreeMap<String, Table> = BTreeMap::new();
            let mut fetches = FuturesUnordered::new();
            for (ns, names) in &by_ns {
                for name in names {
                    let api = api.clone();
                    let ns = ns.clone();
                    let name = name.clone();
                    fetches.push(async move {
                        let scope = (api.namespaced && !ns.is_empty()).then_some(ns.as_str());
                        let table = self.client.get_table(&api, scope, &name).await;
                        (ns.clone(), table)
                    });
                }
            }
            while let Some((ns, outcome)) = fetches.next().await {
                if let Some(table) = outcome? {
                    merged_by_ns.entry(ns).or_default().merge(table);
                }
            }

            let mut table = Table::default();
            for (_, mut partial) in merged_by_ns {
                partial.rows.sort_by(|a, b| a.name().cmp(b.name()));
                table.merge(partial);
            }
            if table.rows.is_empty() {
                continue;
            }
            sections.push(render_server_table(
                &table,
                &group,
                &kind,
                &hints,
                wide,
                show_namespace,
            )?);
        }

        Ok(sections.join("\n"))
    }
}

/// Formats one merged server table: NAMESPACE column when asked, columns
/// filtered by priority, name cells prefixed with the kind.
pub fn render_server_table(
    table: &Table,
    group: &str,
    kind: &str,
    hints: &ColumnHints,
    wide: bool,
    show_namespace: bool,
) -> Result<String> {
    let visible: Vec<usize> = table
        .column_definitions
        .iter()
        .enumerate()
        .filter(|(_, col)| wide || col.priority == 0)
        .map(|(ix, _)| ix)
        .collect();
    if visible.is_empty() {
        return Err(Error::Render(format!(
            "server table for {kind} has no printable columns"
        )));
    }

    let kind_prefix = if !group.is_empty() && hints.show_group(kind) {
        format!("{kind}.{group}/")
    } else {
        format!("{kind}/")
    };

    let mut out: Vec<Vec<String>> = Vec::with_capacity(table.rows.len() + 1);
    let mut header = Vec::new();
    if show_namespace {
        header.push("NAMESPACE".to_string());
    }
    for ix in &visible {
        header.push(table.column_definitions[*ix].name.to_uppercase());
    }
    out.push(header);

    for row in &table.rows {
        let mut cells = Vec::new();
        if show_namespace {
            cells.push(row.namespace().to_string());
        }
        for (pos, ix) in visible.iter().enumerate() {
            let cell = row.cells.get(*ix).map(cell_to_string).unwrap_or_default();
            // The first server column is the object name.
            if pos == 0 {
                cells.push(format!("{kind_prefix}{cell}"));
            } else {
                cells.push(cell);
            }
        }
        out.push(cells);
    }

    Ok(format_table(&out))
}

fn cell_to_string(cell: &Value) -> String {
    match cell {
        Value::String(s) => s.clone(),
        Value::Null => String::new(),
        other => other.to_string(),
    }
}
