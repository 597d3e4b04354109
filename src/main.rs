use anyhow::{bail, Context as _};
use clap::{ArgAction, Args, CommandFactory, Parser, Subcommand};
use clap_complete::Shell;
use serde_json::Value;
use tracing::{debug, warn};

use kindred::client::{ApiResourceInfo, ClusterClient};
use kindred::error::Error;
use kindred::graph::Direction;
use kindred::helm::{self, HelmDriver, ReleaseSource};
use kindred::identity::Uid;
use kindred::relationships::Relationship;
use kindred::render::{render, OutputFormat, RenderSettings};
use kindred::resolver::resolve;
use kindred::tables::SplitPrinter;
use kindred::tree::project;
use kindred::universe::Universe;

/// Explore the relationship graph of Kubernetes objects.
#[derive(Parser)]
#[command(
    name = "kindred",
    version,
    about = "Display dependents or dependencies of a Kubernetes object",
    args_conflicts_with_subcommands = true,
    disable_help_subcommand = true
)]
struct Cli {
    #[command(subcommand)]
    sub: Option<Sub>,

    /// TYPE[.VERSION][.GROUP]/NAME, or TYPE and NAME as two arguments
    #[arg(value_name = "TYPE/NAME")]
    target: Vec<String>,

    #[command(flatten)]
    query: QueryOpts,
}

#[derive(Subcommand)]
enum Sub {
    /// Display resources associated with a Helm release and their dependents
    Helm {
        /// Release name
        release: String,

        #[command(flatten)]
        query: QueryOpts,
    },
    /// Generate shell completions
    Completion {
        /// Target shell name
        shell: Shell,
    },
}

#[derive(Args, Clone, Default)]
struct QueryOpts {
    /// Traverse toward dependencies instead of dependents
    #[arg(short = 'D', long)]
    dependencies: bool,

    /// Maximum depth to display; 0 means unlimited
    #[arg(short = 'd', long, default_value_t = 0)]
    depth: u32,

    /// Find relationships across all namespaces
    #[arg(short = 'A', long)]
    all_namespaces: bool,

    /// Additional namespaces to search for relationships
    #[arg(short = 'S', long = "scopes", value_delimiter = ',')]
    scopes: Vec<String>,

    /// Namespace of the root object
    #[arg(short = 'n', long)]
    namespace: Option<String>,

    /// Kubeconfig context to use
    #[arg(long)]
    context: Option<String>,

    /// Resource types to exclude from relationship discovery
    #[arg(long, value_delimiter = ',')]
    exclude_types: Vec<String>,

    /// Resource types to restrict relationship discovery to
    #[arg(long, value_delimiter = ',')]
    include_types: Vec<String>,

    /// Output format: wide, split or split-wide
    #[arg(short = 'o', long)]
    output: Option<String>,

    /// Always include the group in object names
    #[arg(long)]
    show_group: bool,

    /// Increase log verbosity
    #[arg(short = 'v', action = ArgAction::Count)]
    verbose: u8,
}

impl QueryOpts {
    fn output_format(&self) -> anyhow::Result<OutputFormat> {
        Ok(OutputFormat::parse(self.output.as_deref())?)
    }

    fn render_settings(&self, format: OutputFormat) -> RenderSettings {
        RenderSettings {
            wide: format.is_wide(),
            show_group: self.show_group,
            max_depth: self.depth,
        }
    }
}

fn main() {
    let cli = match Cli::try_parse() {
        Ok(cli) => cli,
        Err(err) => {
            // clap renders help/version through the error path too; those
            // exit zero.
            err.print().ok();
            std::process::exit(if err.use_stderr() { 1 } else { 0 });
        }
    };

    let verbosity = match &cli.sub {
        Some(Sub::Helm { query, .. }) => query.verbose,
        _ => cli.query.verbose,
    };
    kindred::log::init(verbosity);

    let outcome = tokio::runtime::Runtime::new()
        .expect("tokio runtime")
        .block_on(run(cli));
    if let Err(err) = outcome {
        eprintln!("error: {err:#}");
        std::process::exit(1);
    }
}

async fn run(cli: Cli) -> anyhow::Result<()> {
    match cli.sub {
        Some(Sub::Completion { shell }) => {
            clap_complete::generate(shell, &mut Cli::command(), "kindred", &mut std::io::stdout());
            Ok(())
        }
        Some(Sub::Helm { release, query }) => run_helm(&release, &query).await,
        None => run_object(&cli.target, &cli.query).await,
    }
}

/// The root command: resolve a single object and print its relationship
/// tree.
async fn run_object(target: &[String], query: &QueryOpts) -> anyhow::Result<()> {
    let (type_arg, name) = split_target(target)?;
    let format = query.output_format()?;

    let client = ClusterClient::new(query.context.clone()).await?;
    client.is_reachable().await?;

    let api = client.resolve_api_resource(&type_arg)?;
    let namespace = query
        .namespace
        .clone()
        .unwrap_or_else(|| client.default_namespace().to_string());

    let root = client
        .get(&name, &api, api.namespaced.then_some(namespace.as_str()))
        .await?;
    let root_uid = object_uid(&root)
        .with_context(|| format!("{}/{} has no uid", api.kind, name))?;

    let (include, exclude) = resolve_type_filters(&client, query)?;
    let namespaces = query_namespaces(query, &namespace);
    let outcome = client.list(&namespaces, &include, &exclude).await?;
    if outcome.partial {
        warn!("some resources could not be listed, the relationship tree may be incomplete");
    }

    // Keep the root object even when its resource type could not be listed.
    let mut objects = outcome.objects;
    objects.push(root);

    let universe = Universe::build(objects, client.mapper());
    let direction = direction_of(query);
    let node_map = resolve(universe, &[root_uid.clone()], direction);
    if node_map.is_empty() {
        bail!(Error::NotFound {
            kind: api.kind.clone(),
            name,
        });
    }

    if format.is_split() {
        let printer = SplitPrinter::new(&client);
        let out = printer
            .print(&node_map, query.depth, format.is_wide(), query.show_group)
            .await?;
        print!("{out}");
        return Ok(());
    }

    let rows = project(&node_map, &root_uid, direction, query.depth)?;
    print!("{}", render(&node_map, &rows, query.render_settings(format))?);
    Ok(())
}

/// The helm subcommand: all resources of a release plus their dependents,
/// grafted under a synthetic release root.
async fn run_helm(release_name: &str, query: &QueryOpts) -> anyhow::Result<()> {
    let format = query.output_format()?;

    let client = ClusterClient::new(query.context.clone()).await?;
    client.is_reachable().await?;

    let namespace = query
        .namespace
        .clone()
        .unwrap_or_else(|| client.default_namespace().to_string());
    let source = ReleaseSource::new(&client, namespace.clone(), HelmDriver::from_env()?);

    let release = source.get_release(release_name).await?;
    debug!(name = %release.name, version = release.version, "fetched helm release");

    // Fetch the live counterpart of every manifest object; the manifest
    // itself carries no UIDs.
    let mut release_objects = Vec::new();
    for doc in helm::manifest_objects(&release.manifest)? {
        match fetch_manifest_object(&client, &doc, &namespace).await {
            Ok(Some(obj)) => release_objects.push(obj),
            Ok(None) => debug!("skipping manifest object with no live counterpart"),
            Err(err) => return Err(err.into()),
        }
    }

    let storage_object = match source.get_storage_object(&release.name, release.version).await {
        Ok(obj) => obj,
        Err(Error::NotFound { .. }) => None,
        Err(err) => return Err(err.into()),
    };

    // Collect the root UIDs and the namespaces the release spans.
    let mut roots: Vec<Uid> = release_objects.iter().filter_map(object_uid).collect();
    if let Some(obj) = &storage_object {
        roots.extend(object_uid(obj));
    }
    let mut namespaces = query_namespaces(query, &namespace);
    if !query.all_namespaces {
        for obj in &release_objects {
            if let Some(ns) = obj
                .get("metadata")
                .and_then(|m| m.get("namespace"))
                .and_then(|v| v.as_str())
            {
                if !namespaces.iter().any(|n| n == ns) {
                    namespaces.push(ns.to_string());
                }
            }
        }
    }

    let (include, exclude) = resolve_type_filters(&client, query)?;
    let outcome = client.list(&namespaces, &include, &exclude).await?;
    if outcome.partial {
        warn!("some resources could not be listed, the relationship tree may be incomplete");
    }

    let mut objects = outcome.objects;
    objects.extend(release_objects);
    if let Some(obj) = storage_object.clone() {
        objects.push(obj);
    }

    let universe = Universe::build(objects, client.mapper());
    let mut node_map = resolve(universe, &roots, Direction::Dependents);

    // Graft the synthetic release root above the resolved tree.
    let mut root = helm::release_node(&release);
    let storage_uid: Option<Uid> = storage_object.as_ref().and_then(|o| object_uid(o));
    for node in node_map.values_mut() {
        node.depth += 1;
        let rel = if Some(&node.uid) == storage_uid.as_ref() {
            Relationship::HelmStorage
        } else if roots.contains(&node.uid) {
            Relationship::HelmRelease
        } else {
            continue;
        };
        root.add_dependent(node.uid.clone(), rel);
        node.add_dependency(root.uid.clone(), rel);
    }
    let root_uid = root.uid.clone();
    node_map.insert(root_uid.clone(), root);

    if format.is_split() {
        let printer = SplitPrinter::new(&client);
        let out = printer
            .print(&node_map, query.depth, format.is_wide(), query.show_group)
            .await?;
        print!("{out}");
        return Ok(());
    }

    let rows = project(&node_map, &root_uid, Direction::Dependents, query.depth)?;
    print!("{}", render(&node_map, &rows, query.render_settings(format))?);
    Ok(())
}

/// Fetches the live object behind one manifest document. Objects deleted
/// since the release was deployed resolve to None.
async fn fetch_manifest_object(
    client: &ClusterClient,
    doc: &Value,
    default_namespace: &str,
) -> Result<Option<Value>, Error> {
    let api_version = doc.get("apiVersion").and_then(|v| v.as_str()).unwrap_or("v1");
    let (group, _) = match api_version.split_once('/') {
        Some((g, v)) => (g, v),
        None => ("", api_version),
    };
    let Some(kind) = doc.get("kind").and_then(|v| v.as_str()) else {
        return Ok(None);
    };
    let Some(name) = doc
        .get("metadata")
        .and_then(|m| m.get("name"))
        .and_then(|v| v.as_str())
    else {
        return Ok(None);
    };
    let Some(api) = client.mapper().lookup(group, kind).cloned() else {
        debug!(group, kind, "manifest object kind not served by the cluster");
        return Ok(None);
    };
    let ns = doc
        .get("metadata")
        .and_then(|m| m.get("namespace"))
        .and_then(|v| v.as_str())
        .unwrap_or(default_namespace);

    match client
        .get(name, &api, api.namespaced.then_some(ns))
        .await
    {
        Ok(obj) => Ok(Some(obj)),
        Err(Error::NotFound { .. }) => Ok(None),
        Err(err) => Err(err),
    }
}

fn split_target(target: &[String]) -> anyhow::Result<(String, String)> {
    match target {
        [combined] => match combined.split_once('/') {
            Some((ty, name)) if !ty.is_empty() && !name.is_empty() => {
                Ok((ty.to_string(), name.to_string()))
            }
            _ => bail!(Error::InvalidArgument(
                "you must specify one or two arguments: resource or resource and name".into()
            )),
        },
        [ty, name] => Ok((ty.clone(), name.clone())),
        _ => bail!(Error::InvalidArgument(
            "you must specify one or two arguments: resource or resource and name".into()
        )),
    }
}

fn object_uid(obj: &Value) -> Option<Uid> {
    obj.get("metadata")
        .and_then(|m| m.get("uid"))
        .and_then(|v| v.as_str())
        .map(String::from)
}

fn direction_of(query: &QueryOpts) -> Direction {
    if query.dependencies {
        Direction::Dependencies
    } else {
        Direction::Dependents
    }
}

/// The namespace scopes handed to the list fan-out: empty means cluster
/// scope, otherwise the root namespace plus any extra scopes.
fn query_namespaces(query: &QueryOpts, namespace: &str) -> Vec<String> {
    if query.all_namespaces {
        return Vec::new();
    }
    let mut namespaces = vec![namespace.to_string()];
    for scope in &query.scopes {
        if !namespaces.contains(scope) {
            namespaces.push(scope.clone());
        }
    }
    namespaces
}

fn resolve_type_filters(
    client: &ClusterClient,
    query: &QueryOpts,
) -> anyhow::Result<(Vec<ApiResourceInfo>, Vec<ApiResourceInfo>)> {
    let resolve_all = |types: &[String]| -> anyhow::Result<Vec<ApiResourceInfo>> {
        types
            .iter()
            .map(|t| client.resolve_api_resource(t).map_err(Into::into))
            .collect()
    };
    Ok((resolve_all(&query.include_types)?, resolve_all(&query.exclude_types)?))
}
