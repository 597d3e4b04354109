//! Label selector parsing and evaluation.
//!
//! Selectors arrive in two manifest shapes: a plain `matchLabels`-style map
//! of equality requirements, or a full `LabelSelector` with
//! `matchExpressions`. Both are normalized into a sorted requirement list so
//! the rendered form is stable and usable as a map key.

use std::collections::BTreeMap;
use std::fmt;

use serde_json::Value;

use crate::error::{Error, Result};

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Operator {
    Equals,
    In,
    NotIn,
    Exists,
    DoesNotExist,
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Requirement {
    pub key: String,
    pub operator: Operator,
    /// Sorted; empty for Exists/DoesNotExist.
    pub values: Vec<String>,
}

impl Requirement {
    fn matches(&self, labels: &BTreeMap<String, String>) -> bool {
        match self.operator {
            Operator::Equals | Operator::In => labels
                .get(&self.key)
                .is_some_and(|v| self.values.iter().any(|want| want == v)),
            // NotIn also matches objects that lack the key entirely.
            Operator::NotIn => labels
                .get(&self.key)
                .is_none_or(|v| !self.values.iter().any(|want| want == v)),
            Operator::Exists => labels.contains_key(&self.key),
            Operator::DoesNotExist => !labels.contains_key(&self.key),
        }
    }
}

impl fmt::Display for Requirement {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.operator {
            Operator::Equals => write!(f, "{}={}", self.key, self.values[0]),
            Operator::In => write!(f, "{} in ({})", self.key, self.values.join(",")),
            Operator::NotIn => write!(f, "{} notin ({})", self.key, self.values.join(",")),
            Operator::Exists => write!(f, "{}", self.key),
            Operator::DoesNotExist => write!(f, "!{}", self.key),
        }
    }
}

/// A conjunction of label requirements. The empty selector matches
/// everything, mirroring Kubernetes semantics for an empty `LabelSelector`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash)]
pub struct Selector {
    requirements: Vec<Requirement>,
}

impl Selector {
    /// Builds a selector from a plain `key: value` map (`spec.selector` on a
    /// Service, `scheduling.nodeSelector` on a RuntimeClass).
    pub fn from_map(map: &serde_json::Map<String, Value>) -> Self {
        let mut requirements: Vec<Requirement> = map
            .iter()
            .filter_map(|(k, v)| {
                v.as_str().map(|v| Requirement {
                    key: k.clone(),
                    operator: Operator::Equals,
                    values: vec![v.to_string()],
                })
            })
            .collect();
        requirements.sort_by(|a, b| (&a.key, a.operator).cmp(&(&b.key, b.operator)));
        Self { requirements }
    }

    /// Parses a `LabelSelector` value (`matchLabels` + `matchExpressions`).
    /// Fails only on malformed input: an unknown operator, or an In/NotIn
    /// expression without values.
    pub fn from_label_selector(value: &Value) -> Result<Self> {
        let mut requirements = Vec::new();

        if let Some(labels) = value.get("matchLabels").and_then(|v| v.as_object()) {
            for (k, v) in labels {
                if let Some(v) = v.as_str() {
                    requirements.push(Requirement {
                        key: k.clone(),
                        operator: Operator::Equals,
                        values: vec![v.to_string()],
                    });
                }
            }
        }

        if let Some(exprs) = value.get("matchExpressions").and_then(|v| v.as_array()) {
            for expr in exprs {
                let key = expr
                    .get("key")
                    .and_then(|v| v.as_str())
                    .ok_or_else(|| Error::Extraction("selector expression without key".into()))?;
                let op = expr.get("operator").and_then(|v| v.as_str()).unwrap_or("");
                let mut values: Vec<String> = expr
                    .get("values")
                    .and_then(|v| v.as_array())
                    .map(|vs| {
                        vs.iter()
                            .filter_map(|v| v.as_str().map(String::from))
                            .collect()
                    })
                    .unwrap_or_default();
                values.sort();

                let operator = match op {
                    "In" => Operator::In,
                    "NotIn" => Operator::NotIn,
                    "Exists" => Operator::Exists,
                    "DoesNotExist" => Operator::DoesNotExist,
                    other => {
                        return Err(Error::Extraction(format!(
                            "unknown selector operator \"{other}\" for key \"{key}\""
                        )))
                    }
                };
                match operator {
                    Operator::In | Operator::NotIn if values.is_empty() => {
                        return Err(Error::Extraction(format!(
                            "selector expression for key \"{key}\" requires values"
                        )))
                    }
                    Operator::Exists | Operator::DoesNotExist if !values.is_empty() => {
                        return Err(Error::Extraction(format!(
                            "selector expression for key \"{key}\" must not carry values"
                        )))
                    }
                    _ => {}
                }
                requirements.push(Requirement {
                    key: key.to_string(),
                    operator,
                    values,
                });
            }
        }

        requirements.sort_by(|a, b| (&a.key, a.operator).cmp(&(&b.key, b.operator)));
        Ok(Self { requirements })
    }

    pub fn matches(&self, labels: &BTreeMap<String, String>) -> bool {
        self.requirements.iter().all(|r| r.matches(labels))
    }

    pub fn is_empty(&self) -> bool {
        self.requirements.is_empty()
    }
}

impl fmt::Display for Selector {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut first = true;
        for r in &self.requirements {
            if !first {
                write!(f, ",")?;
            }
            write!(f, "{r}")?;
            first = false;
        }
        Ok(())
    }
}
