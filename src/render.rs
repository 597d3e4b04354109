//! Human-readable table output. Builds NAME/READY/STATUS/AGE rows (plus
//! RELATIONSHIPS in wide output) from a projected tree, with per-kind
//! ready/status cells mirroring what kubectl shows for the common workload
//! kinds.

use chrono::{DateTime, Utc};
use k8s_openapi::api::{apps::v1 as appsv1, core::v1 as corev1};
use serde_json::Value;

use crate::error::Result;
use crate::graph::{Node, NodeMap};
use crate::tree::{ColumnHints, TreeRow};

const CELL_UNKNOWN: &str = "<unknown>";
const CELL_NOT_APPLICABLE: &str = "-";

/// The supported output formats. Split formats print server-rendered
/// tables grouped by kind instead of one tree.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum OutputFormat {
    #[default]
    Table,
    Wide,
    Split,
    SplitWide,
}

impl OutputFormat {
    pub fn parse(s: Option<&str>) -> crate::error::Result<Self> {
        match s {
            None => Ok(OutputFormat::Table),
            Some("wide") => Ok(OutputFormat::Wide),
            Some("split") => Ok(OutputFormat::Split),
            Some("split-wide") => Ok(OutputFormat::SplitWide),
            Some(other) => Err(crate::error::Error::InvalidArgument(format!(
                "unable to match a printer suitable for the output format \"{other}\", allowed formats are: split,split-wide,wide"
            ))),
        }
    }

    pub fn is_split(self) -> bool {
        matches!(self, OutputFormat::Split | OutputFormat::SplitWide)
    }

    pub fn is_wide(self) -> bool {
        matches!(self, OutputFormat::Wide | OutputFormat::SplitWide)
    }
}

#[derive(Debug, Clone, Copy, Default)]
pub struct RenderSettings {
    /// Include the RELATIONSHIPS column.
    pub wide: bool,
    /// Force group suffixes on every kind.
    pub show_group: bool,
    /// Depth bound used for the column hints; 0 = unlimited.
    pub max_depth: u32,
}

/// Renders the projected rows as an aligned table.
pub fn render(node_map: &NodeMap, rows: &[TreeRow], settings: RenderSettings) -> Result<String> {
    let hints = ColumnHints::new(node_map, settings.max_depth, settings.show_group);

    let mut header: Vec<&str> = Vec::new();
    if hints.show_namespace() {
        header.push("NAMESPACE");
    }
    header.extend(["NAME", "READY", "STATUS", "AGE"]);
    if settings.wide {
        header.push("RELATIONSHIPS");
    }

    let mut table: Vec<Vec<String>> = vec![header.iter().map(|s| s.to_string()).collect()];
    for row in rows {
        let Some(node) = node_map.get(&row.uid) else {
            continue;
        };
        let mut cells = Vec::new();
        if hints.show_namespace() {
            cells.push(node.namespace.clone());
        }
        cells.push(name_cell(node, &row.prefix, &hints));
        let (ready, status) = ready_status(node);
        cells.push(if ready.is_empty() {
            CELL_NOT_APPLICABLE.into()
        } else {
            ready
        });
        cells.push(status);
        cells.push(age_cell(node));
        if settings.wide {
            let rels: Vec<&str> = row.relationships.iter().map(|r| r.as_str()).collect();
            cells.push(if rels.is_empty() {
                "[]".into()
            } else {
                format!("[{}]", rels.join(", "))
            });
        }
        table.push(cells);
    }

    Ok(format_table(&table))
}

/// Pads each column to its widest cell, two spaces between columns, the way
/// kubectl lays out get output.
pub(crate) fn format_table(table: &[Vec<String>]) -> String {
    let columns = table.first().map(Vec::len).unwrap_or(0);
    let mut widths = vec![0usize; columns];
    for row in table {
        for (ix, cell) in row.iter().enumerate() {
            widths[ix] = widths[ix].max(cell.chars().count());
        }
    }

    let mut out = String::new();
    for row in table {
        let mut line = String::new();
        for (ix, cell) in row.iter().enumerate() {
            line.push_str(cell);
            if ix != row.len() - 1 {
                let pad = widths[ix].saturating_sub(cell.chars().count()) + 2;
                line.extend(std::iter::repeat(' ').take(pad));
            }
        }
        out.push_str(line.trim_end());
        out.push('\n');
    }
    out
}

fn name_cell(node: &Node, prefix: &str, hints: &ColumnHints) -> String {
    if node.kind.is_empty() {
        return format!("{prefix}{}", node.name);
    }
    if !node.group.is_empty() && hints.show_group(&node.kind) {
        return format!("{prefix}{}.{}/{}", node.kind, node.group, node.name);
    }
    format!("{prefix}{}/{}", node.kind, node.name)
}

fn age_cell(node: &Node) -> String {
    let Some(ts) = node.nested_str(&["metadata", "creationTimestamp"]) else {
        return CELL_UNKNOWN.into();
    };
    let Ok(created) = ts.parse::<DateTime<Utc>>() else {
        return CELL_UNKNOWN.into();
    };
    compact_duration(Utc::now().signed_duration_since(created))
}

/// Compact kubectl-style duration: 42s, 5m, 3h, 2d, 1y20d.
fn compact_duration(diff: chrono::Duration) -> String {
    let seconds = diff.num_seconds();
    if seconds < 0 {
        return "0s".into();
    }
    let minutes = diff.num_minutes();
    let hours = diff.num_hours();
    let days = diff.num_days();
    if seconds < 120 {
        format!("{seconds}s")
    } else if minutes < 10 {
        format!("{}m{}s", minutes, seconds % 60)
    } else if hours < 3 {
        format!("{minutes}m")
    } else if hours < 48 {
        format!("{}h", hours)
    } else if days < 365 {
        format!("{days}d")
    } else {
        format!("{}y{}d", days / 365, days % 365)
    }
}

/// Per-kind ready/status cells; unknown kinds fall back to the object's
/// `Ready` condition.
fn ready_status(node: &Node) -> (String, String) {
    match (node.group.as_str(), node.kind.as_str()) {
        ("", "Pod") => pod_ready_status(node),
        ("", "Event") => (String::new(), core_event_status(node)),
        ("events.k8s.io", "Event") => (String::new(), event_status(node)),
        ("", "ReplicationController") => replicas_ready_status::<corev1::ReplicationController>(
            node,
            |rc| {
                let s = rc.status.as_ref();
                (
                    s.map(|s| s.ready_replicas.unwrap_or(0)).unwrap_or(0),
                    s.map(|s| s.replicas).unwrap_or(0),
                )
            },
        ),
        ("apps", "DaemonSet") => replicas_ready_status::<appsv1::DaemonSet>(node, |ds| {
            let s = ds.status.as_ref();
            (
                s.map(|s| s.number_ready).unwrap_or(0),
                s.map(|s| s.desired_number_scheduled).unwrap_or(0),
            )
        }),
        ("apps", "Deployment") => replicas_ready_status::<appsv1::Deployment>(node, |d| {
            let s = d.status.as_ref();
            (
                s.and_then(|s| s.ready_replicas).unwrap_or(0),
                s.and_then(|s| s.replicas).unwrap_or(0),
            )
        }),
        ("apps", "ReplicaSet") => replicas_ready_status::<appsv1::ReplicaSet>(node, |rs| {
            let s = rs.status.as_ref();
            (
                s.and_then(|s| s.ready_replicas).unwrap_or(0),
                s.map(|s| s.replicas).unwrap_or(0),
            )
        }),
        ("apps", "StatefulSet") => replicas_ready_status::<appsv1::StatefulSet>(node, |sts| {
            let s = sts.status.as_ref();
            (
                s.and_then(|s| s.ready_replicas).unwrap_or(0),
                s.map(|s| s.replicas).unwrap_or(0),
            )
        }),
        _ => condition_ready_status(node),
    }
}

fn replicas_ready_status<T: serde::de::DeserializeOwned>(
    node: &Node,
    counts: impl Fn(&T) -> (i32, i32),
) -> (String, String) {
    match serde_json::from_value::<T>(node.manifest.clone()) {
        Ok(obj) => {
            let (ready, desired) = counts(&obj);
            (format!("{ready}/{desired}"), String::new())
        }
        Err(_) => (String::new(), String::new()),
    }
}

/// Generic fallback: the `Ready` condition's status and reason, when the
/// object carries conditions at all.
fn condition_ready_status(node: &Node) -> (String, String) {
    let Some(conditions) = node
        .manifest
        .get("status")
        .and_then(|s| s.get("conditions"))
        .and_then(|v| v.as_array())
    else {
        return (String::new(), String::new());
    };
    for c in conditions {
        if c.get("type").and_then(|v| v.as_str()) == Some("Ready") {
            let ready = c
                .get("status")
                .and_then(|v| v.as_str())
                .unwrap_or_default()
                .to_string();
            let reason = c
                .get("reason")
                .and_then(|v| v.as_str())
                .unwrap_or_default()
                .to_string();
            return (ready, reason);
        }
    }
    (String::new(), String::new())
}

fn core_event_status(node: &Node) -> String {
    event_message(
        node.nested_str(&["reason"]),
        node.nested_str(&["message"]),
        node.manifest.get("count").and_then(Value::as_i64),
    )
}

fn event_status(node: &Node) -> String {
    event_message(
        node.nested_str(&["reason"]),
        node.nested_str(&["note"]),
        node.manifest
            .get("deprecatedCount")
            .and_then(Value::as_i64),
    )
}

fn event_message(reason: Option<&str>, note: Option<&str>, count: Option<i64>) -> String {
    let reason = reason.unwrap_or_default();
    let note = note.unwrap_or_default();
    match count {
        Some(n) if n > 1 => format!("{reason}: {note} (x{n})"),
        _ => format!("{reason}: {note}"),
    }
}

/// Pod ready/status following the kubectl row logic: init container
/// progress first, then container states, then deletion overrides.
fn pod_ready_status(node: &Node) -> (String, String) {
    let Ok(pod) = serde_json::from_value::<corev1::Pod>(node.manifest.clone()) else {
        return (String::new(), String::new());
    };

    let spec = pod.spec.as_ref();
    let status = pod.status.as_ref();
    let total = spec.map(|s| s.containers.len()).unwrap_or(0);
    let init_total = spec
        .and_then(|s| s.init_containers.as_ref().map(Vec::len))
        .unwrap_or(0);
    let mut ready_count = 0;
    let mut reason = status
        .and_then(|s| s.phase.clone())
        .unwrap_or_default();
    if let Some(r) = status.and_then(|s| s.reason.clone()) {
        if !r.is_empty() {
            reason = r;
        }
    }

    let mut initializing = false;
    if let Some(statuses) = status.and_then(|s| s.init_container_statuses.as_ref()) {
        for (ix, cs) in statuses.iter().enumerate() {
            let state = cs.state.as_ref();
            let terminated = state.and_then(|s| s.terminated.as_ref());
            let waiting = state.and_then(|s| s.waiting.as_ref());
            match (terminated, waiting) {
                (Some(t), _) if t.exit_code == 0 => continue,
                (Some(t), _) => {
                    reason = match (&t.reason, t.signal) {
                        (Some(r), _) if !r.is_empty() => format!("Init:{r}"),
                        (_, Some(signal)) if signal != 0 => format!("Init:Signal:{signal}"),
                        _ => format!("Init:ExitCode:{}", t.exit_code),
                    };
                }
                (None, Some(w))
                    if w.reason.as_deref().unwrap_or("") != ""
                        && w.reason.as_deref() != Some("PodInitializing") =>
                {
                    reason = format!("Init:{}", w.reason.as_deref().unwrap_or(""));
                }
                _ => {
                    reason = format!("Init:{ix}/{init_total}");
                }
            }
            initializing = true;
            break;
        }
    }

    if !initializing {
        let mut has_running = false;
        if let Some(statuses) = status.and_then(|s| s.container_statuses.as_ref()) {
            for cs in statuses.iter().rev() {
                let state = cs.state.as_ref();
                if let Some(t) = state.and_then(|s| s.terminated.as_ref()) {
                    reason = match (&t.reason, t.signal) {
                        (Some(r), _) if !r.is_empty() => r.clone(),
                        (_, Some(signal)) if signal != 0 => format!("Signal:{signal}"),
                        _ => format!("ExitCode:{}", t.exit_code),
                    };
                } else if let Some(w) = state.and_then(|s| s.waiting.as_ref()) {
                    if let Some(r) = &w.reason {
                        if !r.is_empty() {
                            reason = r.clone();
                        }
                    }
                } else if state.is_some_and(|s| s.running.is_some()) && cs.ready {
                    has_running = true;
                    ready_count += 1;
                }
            }
        }
        if reason == "Completed" && has_running {
            reason = "NotReady".into();
            let ready_condition = status
                .and_then(|s| s.conditions.as_ref())
                .is_some_and(|cs| {
                    cs.iter().any(|c| c.type_ == "Ready" && c.status == "True")
                });
            if ready_condition {
                reason = "Running".into();
            }
        }
    }

    if pod.metadata.deletion_timestamp.is_some() {
        reason = if status.and_then(|s| s.reason.as_deref()) == Some("NodeLost") {
            "Unknown".into()
        } else {
            "Terminating".into()
        };
    }

    (format!("{ready_count}/{total}"), reason)
}
