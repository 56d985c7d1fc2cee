use std::{
    path::{Path, PathBuf},
    sync::Arc,
};

use log::{info, warn};
use tokio::task::JoinSet;

use crate::{
    api::HttpTrackApi,
    config::{Overrides, Settings},
    error::{Error, Phase, WorkflowError},
    models::{AudioFormat, TrackRequest},
    workflow::{LogObserver, Observer, OutputTarget, Workflow},
};

/// Everything a single generation needs from the caller
#[derive(Debug, Clone, Default)]
pub struct GenerateOptions {
    pub prompt: String,
    /// Seconds, validated when the request is built
    pub duration: Option<i64>,
    pub format: Option<AudioFormat>,
    /// Falls back to the configured output directory
    pub output_dir: Option<PathBuf>,
    pub filename: Option<String>,
}

impl GenerateOptions {
    pub fn new(prompt: impl Into<String>) -> Self {
        Self {
            prompt: prompt.into(),
            ..Default::default()
        }
    }

    fn request(&self) -> crate::Result<TrackRequest> {
        let mut request = TrackRequest::new(self.prompt.as_str())?;
        if let Some(seconds) = self.duration {
            request = request.with_duration(seconds)?;
        }
        if let Some(format) = self.format {
            request = request.with_format(format);
        }
        Ok(request)
    }

    fn target(&self, settings: &Settings) -> OutputTarget {
        OutputTarget {
            dir: self
                .output_dir
                .clone()
                .unwrap_or_else(|| settings.output_dir.clone()),
            filename: self.filename.clone(),
        }
    }
}

/// Generates tracks with one set of settings and a shared connection pool.
///
/// Cheap to clone; clones share the pool and the settings.
#[derive(Clone)]
pub struct BeatovenClient {
    settings: Arc<Settings>,
    api: HttpTrackApi,
}

impl BeatovenClient {
    pub fn new(settings: Settings) -> Self {
        let settings = Arc::new(settings);
        Self {
            api: HttpTrackApi::new(settings.clone()),
            settings,
        }
    }

    pub fn with_http_client(settings: Settings, client: reqwest::Client) -> Self {
        let settings = Arc::new(settings);
        Self {
            api: HttpTrackApi::with_client(client, settings.clone()),
            settings,
        }
    }

    pub fn from_env(overrides: &Overrides, env_file: Option<&Path>) -> crate::Result<Self> {
        Ok(Self::new(Settings::from_env(overrides, env_file)?))
    }

    pub fn settings(&self) -> &Settings {
        &self.settings
    }

    pub fn api(&self) -> &HttpTrackApi {
        &self.api
    }

    pub async fn generate_music(&self, options: &GenerateOptions) -> Result<PathBuf, WorkflowError> {
        self.generate_music_with(options, &LogObserver).await
    }

    pub async fn generate_music_with(
        &self,
        options: &GenerateOptions,
        observer: &dyn Observer,
    ) -> Result<PathBuf, WorkflowError> {
        let request = options
            .request()
            .map_err(|e| WorkflowError::new(Phase::Setup, e))?;
        info!(
            "Generating music with prompt: {:?}, duration: {}s, format: {}",
            request.prompt().text(),
            request.duration().unwrap_or(self.settings.default_duration),
            request.resolved_format(&self.settings.track_defaults()),
        );

        Workflow::new(&self.api, &self.settings)
            .with_observer(observer)
            .run(&request, &options.target(&self.settings))
            .await
    }

    /// Runs every job as its own task. Results come back in input order.
    pub async fn generate_batch(
        &self,
        jobs: Vec<GenerateOptions>,
    ) -> Vec<Result<PathBuf, WorkflowError>> {
        let total = jobs.len();
        let mut set = JoinSet::new();
        for (idx, options) in jobs.into_iter().enumerate() {
            let client = self.clone();
            set.spawn(async move { (idx, client.generate_music(&options).await) });
        }
        join_in_order(set, total).await
    }
}

type Indexed = (usize, Result<PathBuf, WorkflowError>);

/// Slots whose task was cancelled report [`Error::Cancelled`] in the create phase
async fn join_in_order(
    mut set: JoinSet<Indexed>,
    total: usize,
) -> Vec<Result<PathBuf, WorkflowError>> {
    let mut results: Vec<Option<Result<PathBuf, WorkflowError>>> =
        (0..total).map(|_| None).collect();
    while let Some(joined) = set.join_next().await {
        match joined {
            Ok((idx, res)) => results[idx] = Some(res),
            Err(e) if e.is_panic() => std::panic::resume_unwind(e.into_panic()),
            Err(e) => warn!("Batch job did not finish: {e}"),
        }
    }

    results
        .into_iter()
        .map(|slot| {
            slot.unwrap_or_else(|| {
                Err(WorkflowError::new(
                    Phase::Create,
                    Error::Cancelled {
                        message: "the job ended before reporting a result".into(),
                    },
                ))
            })
        })
        .collect()
}
