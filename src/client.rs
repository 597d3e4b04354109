//! Cluster access: discovery-backed type resolution, single-object gets and
//! the parallel list fan-out that assembles the object universe.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use futures::{stream::FuturesUnordered, StreamExt};
use http::Request;
use kube::api::{DynamicObject, ListParams, TypeMeta};
use kube::config::KubeConfigOptions;
use kube::discovery::{verbs, ApiResource, Discovery, Scope};
use kube::{Api, Client, Config};
use serde_json::Value;
use tokio::sync::Semaphore;
use tracing::debug;

use crate::error::{Error, Result};
use crate::universe::{ResourceMapper, ResourceMapping};

/// Maximum simultaneous list requests during the universe fetch.
const LIST_CONCURRENCY: usize = 16;
/// Page size for list calls.
const LIST_PAGE_LIMIT: u32 = 250;
/// Content negotiation for server-rendered tables, newest scheme first.
const TABLE_ACCEPT: &str = "application/json;as=Table;v=v1;g=meta.k8s.io,\
                            application/json;as=Table;v=v1beta1;g=meta.k8s.io,\
                            application/json";

/// One discovered API resource: enough identity to build a dynamic client
/// for it and to index nodes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ApiResourceInfo {
    pub group: String,
    pub version: String,
    pub kind: String,
    /// Plural resource name, e.g. "deployments".
    pub name: String,
    pub namespaced: bool,
}

impl ApiResourceInfo {
    pub fn api_resource(&self) -> ApiResource {
        let api_version = if self.group.is_empty() {
            self.version.clone()
        } else {
            format!("{}/{}", self.group, self.version)
        };
        ApiResource {
            group: self.group.clone(),
            version: self.version.clone(),
            api_version,
            kind: self.kind.clone(),
            plural: self.name.clone(),
        }
    }

    pub fn with_group_string(&self) -> String {
        if self.group.is_empty() {
            self.name.clone()
        } else {
            format!("{}.{}", self.name, self.group)
        }
    }
}

impl std::fmt::Display for ApiResourceInfo {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        if self.group.is_empty() {
            write!(f, "{}.{}", self.name, self.version)
        } else {
            write!(f, "{}.{}.{}", self.name, self.version, self.group)
        }
    }
}

/// `(group, kind)` to plural/scope mapping assembled from discovery, handed
/// to the universe builder.
#[derive(Debug, Default)]
pub struct RestMapper {
    by_group_kind: HashMap<(String, String), ApiResourceInfo>,
}

impl RestMapper {
    pub fn new(resources: &[ApiResourceInfo]) -> Self {
        let by_group_kind = resources
            .iter()
            .map(|api| ((api.group.clone(), api.kind.clone()), api.clone()))
            .collect();
        Self { by_group_kind }
    }

    pub fn lookup(&self, group: &str, kind: &str) -> Option<&ApiResourceInfo> {
        self.by_group_kind.get(&(group.to_string(), kind.to_string()))
    }
}

impl ResourceMapper for RestMapper {
    fn rest_mapping(&self, group: &str, kind: &str) -> Option<ResourceMapping> {
        self.lookup(group, kind).map(|api| ResourceMapping {
            resource: api.name.clone(),
            namespaced: api.namespaced,
        })
    }
}

/// Result of a universe fetch. `partial` is set when one or more list calls
/// were denied; the universe is built from whatever was allowed.
#[derive(Debug)]
pub struct ListOutcome {
    pub objects: Vec<Value>,
    pub partial: bool,
}

pub struct ClusterClient {
    client: Client,
    default_namespace: String,
    resources: Vec<ApiResourceInfo>,
    mapper: RestMapper,
}

impl ClusterClient {
    /// Builds a client from kubeconfig (honoring an optional context
    /// override), then runs discovery to learn the listable resources.
    pub async fn new(context: Option<String>) -> Result<Self> {
        let config = match context {
            Some(context) => Config::from_kubeconfig(&KubeConfigOptions {
                context: Some(context),
                ..Default::default()
            })
            .await
            .map_err(|e| Error::InvalidArgument(format!("kubeconfig: {e}")))?,
            None => Config::infer()
                .await
                .map_err(|e| Error::InvalidArgument(format!("kubeconfig: {e}")))?,
        };
        let default_namespace = config.default_namespace.clone();
        let client = Client::try_from(config)?;

        let discovery = Discovery::new(client.clone()).run().await?;
        let resources = discovered_resources(&discovery);
        debug!(resources = resources.len(), "discovered listable API resources");

        let mapper = RestMapper::new(&resources);
        Ok(Self {
            client,
            default_namespace,
            resources,
            mapper,
        })
    }

    pub fn default_namespace(&self) -> &str {
        &self.default_namespace
    }

    pub fn mapper(&self) -> &RestMapper {
        &self.mapper
    }

    /// Preflight: a trivial request proving the apiserver answers.
    pub async fn is_reachable(&self) -> Result<()> {
        self.client
            .apiserver_version()
            .await
            .map(|_| ())
            .map_err(Error::NotReachable)
    }

    /// Parses a user-entered type string (`TYPE[.VERSION][.GROUP]`,
    /// matching plural or kind, case-insensitive) against discovery.
    pub fn resolve_api_resource(&self, s: &str) -> Result<ApiResourceInfo> {
        resolve_from(&self.resources, s).ok_or_else(|| {
            Error::InvalidArgument(format!("the server doesn't have a resource type \"{s}\""))
        })
    }

    /// Fetches a single object.
    pub async fn get(
        &self,
        name: &str,
        api: &ApiResourceInfo,
        namespace: Option<&str>,
    ) -> Result<Value> {
        let dyn_api = self.dynamic_api(api, namespace);
        match dyn_api.get(name).await {
            Ok(mut obj) => {
                ensure_type_meta(&mut obj, api);
                Ok(serde_json::to_value(&obj)
                    .map_err(|e| Error::Render(format!("serializing object: {e}")))?)
            }
            Err(kube::Error::Api(ae)) if ae.code == 404 => Err(Error::NotFound {
                kind: api.kind.clone(),
                name: name.to_string(),
            }),
            Err(e) => Err(e.into()),
        }
    }

    /// Fetches the server-rendered table for one object, the same payload
    /// `kubectl get` shows. Returns None for objects deleted since they
    /// were resolved.
    pub async fn get_table(
        &self,
        api: &ApiResourceInfo,
        namespace: Option<&str>,
        name: &str,
    ) -> Result<Option<crate::tables::Table>> {
        let path = object_path(api, namespace, name);
        let req = Request::builder()
            .uri(format!("{path}?includeObject=Metadata"))
            .header(http::header::ACCEPT, TABLE_ACCEPT)
            .body(Vec::new())
            .map_err(|e| Error::Render(format!("building table request: {e}")))?;
        match self.client.request::<crate::tables::Table>(req).await {
            Ok(table) => Ok(Some(table)),
            Err(kube::Error::Api(ae)) if ae.code == 404 => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    /// Lists objects matching a label selector for one resource.
    pub async fn list_with_selector(
        &self,
        api: &ApiResourceInfo,
        namespace: Option<&str>,
        label_selector: &str,
    ) -> Result<Vec<Value>> {
        let dyn_api = self.dynamic_api(api, namespace);
        let lp = ListParams::default().labels(label_selector);
        let list = dyn_api.list(&lp).await?;
        Ok(list
            .items
            .into_iter()
            .map(|mut obj| {
                ensure_type_meta(&mut obj, api);
                serde_json::to_value(&obj).unwrap_or_default()
            })
            .collect())
    }

    /// Fetches the object universe: every listable resource (after
    /// include/exclude filtering), fanned out with bounded concurrency,
    /// deduplicated by UID. Denied list calls degrade the result to
    /// partial instead of failing it.
    #[tracing::instrument(skip_all, fields(namespaces = namespaces.len()))]
    pub async fn list(
        &self,
        namespaces: &[String],
        include: &[ApiResourceInfo],
        exclude: &[ApiResourceInfo],
    ) -> Result<ListOutcome> {
        let mut apis: Vec<&ApiResourceInfo> = self.resources.iter().collect();
        if !include.is_empty() {
            let keep = group_kind_filter(include);
            apis.retain(|api| keep.contains(&(api.group.clone(), api.kind.clone())));
        }
        if !exclude.is_empty() {
            let drop = group_kind_filter(exclude);
            apis.retain(|api| !drop.contains(&(api.group.clone(), api.kind.clone())));
        }

        // Deduplicate namespaces; an empty entry or an empty list means the
        // cluster scope.
        let mut cluster_scope = namespaces.is_empty();
        let mut ns_set: HashSet<&str> = HashSet::new();
        for ns in namespaces {
            if ns.is_empty() {
                cluster_scope = true;
            } else {
                ns_set.insert(ns.as_str());
            }
        }

        let semaphore = Arc::new(Semaphore::new(LIST_CONCURRENCY));
        let mut tasks = FuturesUnordered::new();
        for api in apis {
            let scopes: Vec<Option<String>> = if cluster_scope || !api.namespaced {
                vec![None]
            } else {
                ns_set.iter().map(|ns| Some(ns.to_string())).collect()
            };
            for ns in scopes {
                let api = api.clone();
                let client = self.clone_client();
                let semaphore = Arc::clone(&semaphore);
                tasks.push(tokio::spawn(async move {
                    let _permit = semaphore.acquire_owned().await;
                    list_paged(client, api, ns).await
                }));
            }
        }

        let mut by_uid: HashMap<String, Value> = HashMap::new();
        let mut partial = false;
        while let Some(joined) = tasks.next().await {
            let outcome = joined.map_err(|e| Error::Render(format!("list task panicked: {e}")))?;
            match outcome {
                Ok(objects) => {
                    for obj in objects {
                        if let Some(uid) = obj
                            .get("metadata")
                            .and_then(|m| m.get("uid"))
                            .and_then(|v| v.as_str())
                        {
                            by_uid.insert(uid.to_string(), obj);
                        }
                    }
                }
                Err(ListFailure::Denied(api)) => {
                    debug!(%api, "no access to list resource, result will be partial");
                    partial = true;
                }
                Err(ListFailure::Fatal(err)) => return Err(err.into()),
            }
        }

        debug!(objects = by_uid.len(), partial, "fetched object universe");
        Ok(ListOutcome {
            objects: by_uid.into_values().collect(),
            partial,
        })
    }

    fn clone_client(&self) -> Client {
        self.client.clone()
    }

    fn dynamic_api(&self, api: &ApiResourceInfo, namespace: Option<&str>) -> Api<DynamicObject> {
        let ar = api.api_resource();
        if !api.namespaced {
            Api::all_with(self.client.clone(), &ar)
        } else if let Some(ns) = namespace {
            Api::namespaced_with(self.client.clone(), ns, &ar)
        } else {
            Api::all_with(self.client.clone(), &ar)
        }
    }
}

enum ListFailure {
    Denied(String),
    Fatal(kube::Error),
}

/// Lists one resource in one scope, following continue tokens.
async fn list_paged(
    client: Client,
    api: ApiResourceInfo,
    namespace: Option<String>,
) -> std::result::Result<Vec<Value>, ListFailure> {
    let ar = api.api_resource();
    let dyn_api: Api<DynamicObject> = if !api.namespaced {
        Api::all_with(client, &ar)
    } else if let Some(ns) = &namespace {
        Api::namespaced_with(client, ns, &ar)
    } else {
        Api::all_with(client, &ar)
    };

    let mut objects = Vec::new();
    let mut token: Option<String> = None;
    loop {
        let mut lp = ListParams::default().limit(LIST_PAGE_LIMIT);
        if let Some(t) = &token {
            lp = lp.continue_token(t);
        }
        let list = match dyn_api.list(&lp).await {
            Ok(list) => list,
            Err(kube::Error::Api(ae)) if ae.code == 403 => {
                return Err(ListFailure::Denied(api.to_string()));
            }
            Err(kube::Error::Api(ae)) if ae.code == 404 => return Ok(objects),
            Err(e) => return Err(ListFailure::Fatal(e)),
        };
        token = list.metadata.continue_.clone().filter(|t| !t.is_empty());
        for mut obj in list.items {
            ensure_type_meta(&mut obj, &api);
            if let Ok(value) = serde_json::to_value(&obj) {
                objects.push(value);
            }
        }
        if token.is_none() {
            break;
        }
    }
    debug!(resource = %api, ns = ?namespace, count = objects.len(), "listed resource");
    Ok(objects)
}

/// The REST path of one object, for requests the typed Api cannot express.
fn object_path(api: &ApiResourceInfo, namespace: Option<&str>, name: &str) -> String {
    let prefix = if api.group.is_empty() {
        format!("/api/{}", api.version)
    } else {
        format!("/apis/{}/{}", api.group, api.version)
    };
    match namespace {
        Some(ns) => format!("{prefix}/namespaces/{ns}/{}/{name}", api.name),
        None => format!("{prefix}/{}/{name}", api.name),
    }
}

/// List responses often omit per-item TypeMeta; restore it from the
/// resource identity so downstream manifests always carry apiVersion/kind.
fn ensure_type_meta(obj: &mut DynamicObject, api: &ApiResourceInfo) {
    if obj.types.is_none() {
        obj.types = Some(TypeMeta {
            api_version: api.api_resource().api_version,
            kind: api.kind.clone(),
        });
    }
}

/// Collects listable resources from discovery, dropping the group
/// alternatives Kubernetes migrated away from (core Event, extensions
/// Ingress) so objects are not fetched twice.
fn discovered_resources(discovery: &Discovery) -> Vec<ApiResourceInfo> {
    let mut resources = Vec::new();
    for group in discovery.groups() {
        for (ar, caps) in group.recommended_resources() {
            if !caps.supports_operation(verbs::LIST)
                || !caps.supports_operation(verbs::GET)
                || !caps.supports_operation(verbs::WATCH)
            {
                continue;
            }
            let api = ApiResourceInfo {
                group: ar.group.clone(),
                version: ar.version.clone(),
                kind: ar.kind.clone(),
                name: ar.plural.clone(),
                namespaced: caps.scope == Scope::Namespaced,
            };
            match (api.group.as_str(), api.kind.as_str()) {
                ("", "Event") | ("extensions", "Ingress") => {
                    debug!(%api, "excluding migrated duplicate resource");
                    continue;
                }
                _ => {}
            }
            resources.push(api);
        }
    }
    resources
}

/// Expands a resource list into the `(group, kind)` pairs it filters on,
/// canonicalizing both group alternatives of kinds that migrated API
/// groups so either spelling matches either variant.
pub fn group_kind_filter(apis: &[ApiResourceInfo]) -> HashSet<(String, String)> {
    let mut set = HashSet::new();
    for api in apis {
        match (api.group.as_str(), api.kind.as_str()) {
            ("" | "events.k8s.io", "Event") => {
                set.insert((String::new(), "Event".to_string()));
                set.insert(("events.k8s.io".to_string(), "Event".to_string()));
            }
            ("extensions" | "networking.k8s.io", "Ingress") => {
                set.insert(("extensions".to_string(), "Ingress".to_string()));
                set.insert(("networking.k8s.io".to_string(), "Ingress".to_string()));
            }
            _ => {
                set.insert((api.group.clone(), api.kind.clone()));
            }
        }
    }
    set
}

/// Matches a type string against the discovered resources. Bare names
/// match plural or kind; qualified names append `.VERSION`, `.GROUP` or
/// `.VERSION.GROUP`. Among bare-name matches the lexicographically
/// smallest group wins, which puts core resources first.
fn resolve_from(resources: &[ApiResourceInfo], s: &str) -> Option<ApiResourceInfo> {
    let s = s.to_lowercase();
    let mut matches: Vec<&ApiResourceInfo> = Vec::new();
    for api in resources {
        let bases = [api.name.to_lowercase(), api.kind.to_lowercase()];
        for base in &bases {
            let qualified = if api.group.is_empty() {
                vec![base.clone(), format!("{base}.{}", api.version)]
            } else {
                vec![
                    base.clone(),
                    format!("{base}.{}", api.group),
                    format!("{base}.{}.{}", api.version, api.group),
                ]
            };
            if qualified.contains(&s) {
                matches.push(api);
                break;
            }
        }
    }
    matches.sort_by(|a, b| a.group.cmp(&b.group).then(a.name.cmp(&b.name)));
    matches.first().map(|api| (*api).clone())
}
