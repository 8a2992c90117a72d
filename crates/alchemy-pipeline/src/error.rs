use alchemy_io::ParamError;
use std::path::PathBuf;
use thiserror::Error;

/// Why a pipeline run ended in [`crate::PipelineState::Failed`].
#[derive(Error, Debug)]
pub enum PipelineError {
    #[error(transparent)]
    Parameters(#[from] ParamError),

    #[error("importer {importer} failed: {source:#}")]
    ImportFailure {
        importer: &'static str,
        #[source]
        source: anyhow::Error,
    },

    #[error("exporter {exporter} failed: {source:#}")]
    ExportFailure {
        exporter: &'static str,
        #[source]
        source: anyhow::Error,
    },

    #[error("notifier {notifier} failed for network '{network}': {source:#}")]
    NotifierFailure {
        notifier: &'static str,
        network: String,
        #[source]
        source: anyhow::Error,
    },

    #[error("error reading exported file {}: {source}", path.display())]
    ArtifactRead {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// The exporter named a network that is neither the root nor one of its feeders
    #[error("exported network '{0}' is not part of the topology")]
    UnknownNetwork(String),
}
