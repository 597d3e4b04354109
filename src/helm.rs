//! Helm release introspection: locates the release's storage object
//! (Secret or ConfigMap depending on the driver), decodes the release
//! record, and splits its rendered manifest back into object documents.

use base64::{engine::general_purpose::STANDARD as BASE64, Engine as _};
use flate2::read::GzDecoder;
use serde::Deserialize;
use serde_json::Value;
use std::io::Read;
use tracing::debug;

use crate::client::{ApiResourceInfo, ClusterClient};
use crate::error::{Error, Result};
use crate::graph::Node;
use crate::identity::Uid;

/// Prefix Helm puts on every storage object name.
const STORAGE_TYPE: &str = "sh.helm.release.v1";

/// Where Helm keeps release records, from the HELM_DRIVER environment
/// variable. Memory and SQL drivers have no in-cluster storage object.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HelmDriver {
    Secret,
    ConfigMap,
    Memory,
    Sql,
}

impl HelmDriver {
    pub fn from_env() -> Result<Self> {
        match std::env::var("HELM_DRIVER").unwrap_or_default().as_str() {
            "" | "secret" => Ok(HelmDriver::Secret),
            "configmap" => Ok(HelmDriver::ConfigMap),
            "memory" => Ok(HelmDriver::Memory),
            "sql" => Ok(HelmDriver::Sql),
            other => Err(Error::Helm(format!("helm driver \"{other}\" not supported"))),
        }
    }

    fn storage_api(&self) -> Option<ApiResourceInfo> {
        let (kind, name) = match self {
            HelmDriver::Secret => ("Secret", "secrets"),
            HelmDriver::ConfigMap => ("ConfigMap", "configmaps"),
            HelmDriver::Memory | HelmDriver::Sql => return None,
        };
        Some(ApiResourceInfo {
            group: String::new(),
            version: "v1".into(),
            kind: kind.into(),
            name: name.into(),
            namespaced: true,
        })
    }
}

/// A decoded Helm release record.
#[derive(Debug, Clone, Deserialize)]
pub struct Release {
    pub name: String,
    #[serde(default)]
    pub namespace: String,
    pub version: i64,
    #[serde(default)]
    pub manifest: String,
    #[serde(default)]
    pub info: ReleaseInfo,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct ReleaseInfo {
    #[serde(default)]
    pub status: String,
    #[serde(default)]
    pub first_deployed: String,
}

/// The storage object name for a release revision:
/// `sh.helm.release.v1.<name>.v<version>`.
pub fn storage_key(name: &str, version: i64) -> String {
    format!("{STORAGE_TYPE}.{name}.v{version}")
}

pub struct ReleaseSource<'a> {
    client: &'a ClusterClient,
    namespace: String,
    driver: HelmDriver,
}

impl<'a> ReleaseSource<'a> {
    pub fn new(client: &'a ClusterClient, namespace: impl Into<String>, driver: HelmDriver) -> Self {
        Self {
            client,
            namespace: namespace.into(),
            driver,
        }
    }

    /// Fetches the latest revision of the named release by scanning the
    /// driver's storage objects for it.
    pub async fn get_release(&self, name: &str) -> Result<Release> {
        let Some(api) = self.driver.storage_api() else {
            return Err(Error::Helm(
                "release storage is not kept in the cluster for this helm driver".into(),
            ));
        };
        let selector = format!("owner=helm,name={name}");
        let objects = self
            .client
            .list_with_selector(&api, Some(&self.namespace), &selector)
            .await?;

        let latest = objects
            .iter()
            .filter_map(|obj| {
                let version: i64 = obj
                    .get("metadata")
                    .and_then(|m| m.get("labels"))
                    .and_then(|l| l.get("version"))
                    .and_then(|v| v.as_str())
                    .and_then(|v| v.parse().ok())?;
                Some((version, obj))
            })
            .max_by_key(|(version, _)| *version);

        let Some((version, obj)) = latest else {
            return Err(Error::NotFound {
                kind: "release".into(),
                name: name.to_string(),
            });
        };
        debug!(release = name, version, "found helm release record");

        let blob = obj
            .get("data")
            .and_then(|d| d.get("release"))
            .and_then(|v| v.as_str())
            .ok_or_else(|| Error::Helm(format!("release record for \"{name}\" has no data")))?;

        // Secret values arrive base64-encoded by the API on top of Helm's
        // own encoding; peel that layer first.
        let blob = match self.driver {
            HelmDriver::Secret => String::from_utf8(
                BASE64
                    .decode(blob)
                    .map_err(|e| Error::Helm(format!("decoding release secret: {e}")))?,
            )
            .map_err(|e| Error::Helm(format!("decoding release secret: {e}")))?,
            _ => blob.to_string(),
        };

        decode_release(&blob)
    }

    /// Fetches the storage object backing the given release revision, if
    /// the driver keeps one in the cluster.
    pub async fn get_storage_object(&self, name: &str, version: i64) -> Result<Option<Value>> {
        let Some(api) = self.driver.storage_api() else {
            return Ok(None);
        };
        let obj = self
            .client
            .get(&storage_key(name, version), &api, Some(&self.namespace))
            .await?;
        Ok(Some(obj))
    }
}

/// Decodes Helm's release blob: base64 text wrapping an optionally
/// gzip-compressed JSON document.
pub fn decode_release(blob: &str) -> Result<Release> {
    let raw = BASE64
        .decode(blob.trim())
        .map_err(|e| Error::Helm(format!("decoding release record: {e}")))?;

    let json = if raw.starts_with(&[0x1f, 0x8b]) {
        let mut decoder = GzDecoder::new(raw.as_slice());
        let mut out = Vec::new();
        decoder
            .read_to_end(&mut out)
            .map_err(|e| Error::Helm(format!("decompressing release record: {e}")))?;
        out
    } else {
        raw
    };

    serde_json::from_slice(&json).map_err(|e| Error::Helm(format!("parsing release record: {e}")))
}

/// Splits a rendered manifest into its object documents, dropping empty
/// ones.
pub fn manifest_objects(manifest: &str) -> Result<Vec<Value>> {
    let mut docs = Vec::new();
    for de in serde_yaml::Deserializer::from_str(manifest) {
        let value = Value::deserialize(de)
            .map_err(|e| Error::Helm(format!("parsing release manifest: {e}")))?;
        if value.is_object() {
            docs.push(value);
        }
    }
    Ok(docs)
}

/// Builds the synthetic root node a Helm tree hangs off. It is not a real
/// cluster object; ready/status cells come from the release state.
pub fn release_node(release: &Release) -> Node {
    let (ready, status) = release_ready_status(&release.info.status);
    let manifest = serde_json::json!({
        "metadata": {
            "name": release.name,
            "namespace": release.namespace,
            "creationTimestamp": release.info.first_deployed,
        },
        "status": {
            "conditions": [{"type": "Ready", "status": ready, "reason": status}],
        },
    });
    Node {
        manifest,
        uid: Uid::new(),
        group: String::new(),
        version: String::new(),
        kind: String::new(),
        resource: String::new(),
        namespaced: !release.namespace.is_empty(),
        namespace: release.namespace.clone(),
        name: release.name.clone(),
        owner_references: Vec::new(),
        dependencies: Default::default(),
        dependents: Default::default(),
        depth: 0,
    }
}

fn release_ready_status(status: &str) -> (&'static str, &'static str) {
    match status {
        "deployed" => ("True", "Deployed"),
        "failed" => ("False", "Failed"),
        "pending-install" => ("False", "PendingInstall"),
        "pending-rollback" => ("False", "PendingRollback"),
        "pending-upgrade" => ("False", "PendingUpgrade"),
        "superseded" => ("False", "Superseded"),
        "uninstalled" => ("False", "Uninstalled"),
        "uninstalling" => ("False", "Uninstalling"),
        _ => ("False", "Unknown"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use flate2::{write::GzEncoder, Compression};
    use std::io::Write;

    fn encode_release(json: &str, gzip: bool) -> String {
        let payload = if gzip {
            let mut enc = GzEncoder::new(Vec::new(), Compression::default());
            enc.write_all(json.as_bytes()).unwrap();
            enc.finish().unwrap()
        } else {
            json.as_bytes().to_vec()
        };
        BASE64.encode(payload)
    }

    const RELEASE_JSON: &str = r#"{
        "name": "bar",
        "namespace": "default",
        "version": 2,
        "manifest": "---\napiVersion: v1\nkind: Service\nmetadata:\n  name: bar\n",
        "info": {"status": "deployed", "first_deployed": "2021-09-01T00:00:00Z"}
    }"#;

    #[test]
    fn test_storage_key() {
        assert_eq!(storage_key("bar", 2), "sh.helm.release.v1.bar.v2");
    }

    #[test]
    fn test_decode_gzipped_release() {
        let release = decode_release(&encode_release(RELEASE_JSON, true)).unwrap();
        assert_eq!(release.name, "bar");
        assert_eq!(release.version, 2);
        assert_eq!(release.info.status, "deployed");
        assert!(release.manifest.contains("kind: Service"));
    }

    #[test]
    fn test_decode_plain_release() {
        let release = decode_release(&encode_release(RELEASE_JSON, false)).unwrap();
        assert_eq!(release.name, "bar");
    }

    #[test]
    fn test_decode_garbage_fails() {
        assert!(decode_release("not base64 at all!").is_err());
        assert!(decode_release(&BASE64.encode(b"not json")).is_err());
    }

    #[test]
    fn test_manifest_objects_skips_empty_docs() {
        let manifest = "---\n# a comment only\n---\napiVersion: v1\nkind: Service\nmetadata:\n  name: web\n---\napiVersion: v1\nkind: ConfigMap\nmetadata:\n  name: cfg\n";
        let docs = manifest_objects(manifest).unwrap();
        assert_eq!(docs.len(), 2);
        assert_eq!(docs[0]["kind"], "Service");
        assert_eq!(docs[1]["kind"], "ConfigMap");
    }

    #[test]
    fn test_release_node_carries_status_condition() {
        let release = decode_release(&encode_release(RELEASE_JSON, true)).unwrap();
        let node = release_node(&release);
        assert_eq!(node.name, "bar");
        assert_eq!(node.kind, "");
        assert_eq!(
            node.manifest["status"]["conditions"][0]["reason"],
            "Deployed"
        );
    }
}
