//! Error taxonomy for the relationship engine and its CLI surface.

use thiserror::Error;

pub type Result<T> = std::result::Result<T, Error>;

#[derive(Debug, Error)]
pub enum Error {
    /// Root specifier malformed or resource type unknown to the cluster.
    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    /// Cluster preflight failed.
    #[error("cluster is not reachable")]
    NotReachable(#[source] kube::Error),

    /// The requested root object does not exist.
    #[error("{kind} \"{name}\" not found")]
    NotFound { kind: String, name: String },

    /// A single object's manifest could not be interpreted, typically a
    /// malformed label selector. Logged and skipped by the resolver.
    #[error("failed to extract relationships: {0}")]
    Extraction(String),

    /// The projector hit an inconsistency in the resolved node map. This
    /// indicates a resolver bug, not bad cluster state.
    #[error("render error: {0}")]
    Render(String),

    #[error("helm release error: {0}")]
    Helm(String),

    #[error(transparent)]
    Kube(#[from] kube::Error),
}
