//! Hugging Face hub access: repository metadata, ingestion planning, and
//! resumable artifact downloads.

mod client;
mod fetch;
mod planner;
mod select;

pub use client::HubClient;
pub use planner::{plan_repo, PackagedArtifact, RepoProfile, SUPPORTED_ARCHITECTURES};
pub use select::{normalize_quant, select_artifact, QUANT_PREFERENCE};

#[derive(Debug, thiserror::Error)]
pub enum HubError {
    #[error("repository not found")]
    NotFound,
    #[error("authentication required (set HF_TOKEN)")]
    AuthRequired,
    #[error("repository is gated and the token is not authorized")]
    Gated,
    #[error("hub request failed: {0}")]
    Http(#[from] reqwest::Error),
    #[error("hub returned status {status}: {detail}")]
    Status { status: u16, detail: String },
    #[error("download failed: {0}")]
    Io(#[from] std::io::Error),
}

pub type Result<T> = std::result::Result<T, HubError>;
