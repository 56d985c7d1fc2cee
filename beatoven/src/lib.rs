//! Client for the Beatoven.ai text-to-music API.
//!
//! A generation submits a prompt, polls the resulting task until the remote
//! side reports a terminal state, and downloads the finished track.

use std::path::{Path, PathBuf};

pub mod api;
pub mod client;
pub mod config;
pub mod error;
pub mod models;
pub mod workflow;

pub use api::{HttpTrackApi, TrackApi};
pub use client::{BeatovenClient, GenerateOptions};
pub use config::{Overrides, Settings};
pub use error::{Error, Phase, Result, WorkflowError};
pub use models::{AudioFormat, TaskState, TextPrompt, TrackRequest, TrackStatus};
pub use workflow::{LogObserver, Observer, OutputTarget, Workflow, WorkflowState};

/// Resolves settings, then runs a single generation.
///
/// Configuration problems are reported with [`Phase::Setup`].
pub async fn generate_music(
    options: &GenerateOptions,
    overrides: &Overrides,
    env_file: Option<&Path>,
) -> Result<PathBuf, WorkflowError> {
    let client = BeatovenClient::from_env(overrides, env_file)
        .map_err(|e| WorkflowError::new(Phase::Setup, e))?;
    client.generate_music(options).await
}
