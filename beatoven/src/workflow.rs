//! The compose → poll → download sequence behind every generation.
//!
//! ```text
//! CREATED --compose ok--> POLLING --completed--> SUCCEEDED --download--> path
//!    |                      |  \--failed-------> FAILED
//!    \--compose error-------+---\--ceiling-----> TIMED_OUT
//! ```
//!
//! The remote job is never cancelled: timing out or dropping the future only
//! stops local polling.

use std::{
    path::{Path, PathBuf},
    time::Duration,
};

use strum::Display;
use tokio::time::{sleep, timeout};

use crate::{
    Error, Result,
    api::TrackApi,
    config::Settings,
    error::{Phase, WorkflowError},
    models::{AudioFormat, TrackDefaults, TrackRequest, TrackStatus},
};

pub mod observer;
pub use observer::{LogObserver, Observer};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Display)]
#[strum(serialize_all = "SCREAMING_SNAKE_CASE")]
pub enum WorkflowState {
    Created,
    Polling,
    Succeeded,
    Failed,
    TimedOut,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PollPolicy {
    /// Pause between two status requests
    pub interval: Duration,
    /// Ceiling for the whole polling phase
    pub timeout: Duration,
}

impl PollPolicy {
    pub fn from_settings(settings: &Settings) -> Self {
        Self {
            interval: settings.poll_interval,
            timeout: settings.poll_timeout,
        }
    }
}

/// Where a finished track ends up
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OutputTarget {
    pub dir: PathBuf,
    /// File stem, or a full name carrying the format's extension
    pub filename: Option<String>,
}

impl OutputTarget {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self {
            dir: dir.into(),
            filename: None,
        }
    }

    pub fn with_filename(mut self, filename: impl Into<String>) -> Self {
        self.filename = Some(filename.into());
        self
    }

    /// Without a filename the task id names the file, so tracks generated in
    /// one run never collide.
    pub fn resolve(&self, format: AudioFormat, task_id: &str) -> PathBuf {
        let ext = format.extension();
        let stem = match &self.filename {
            Some(name) => name.clone(),
            None => format!("composed_track_{}", sanitize(task_id)),
        };

        if Path::new(&stem)
            .extension()
            .is_some_and(|e| e.eq_ignore_ascii_case(ext))
        {
            self.dir.join(stem)
        } else {
            self.dir.join(format!("{stem}.{ext}"))
        }
    }
}

fn sanitize(id: &str) -> String {
    id.chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || c == '-' || c == '_' {
                c
            } else {
                '_'
            }
        })
        .collect()
}

pub struct Workflow<'a, A: TrackApi + ?Sized> {
    api: &'a A,
    defaults: TrackDefaults,
    policy: PollPolicy,
    observer: &'a dyn Observer,
}

impl<'a, A: TrackApi + ?Sized> Workflow<'a, A> {
    pub fn new(api: &'a A, settings: &Settings) -> Self {
        Self {
            api,
            defaults: settings.track_defaults(),
            policy: PollPolicy::from_settings(settings),
            observer: &LogObserver,
        }
    }

    pub fn with_policy(mut self, policy: PollPolicy) -> Self {
        self.policy = policy;
        self
    }

    pub fn with_observer(mut self, observer: &'a dyn Observer) -> Self {
        self.observer = observer;
        self
    }

    /// Runs one generation to completion and returns the downloaded file
    pub async fn run(
        &self,
        request: &TrackRequest,
        target: &OutputTarget,
    ) -> Result<PathBuf, WorkflowError> {
        let request = request.clone().with_defaults(&self.defaults);
        self.observer.transition(WorkflowState::Created, None);

        let task_id = match self.api.compose_track(&request).await {
            Ok(created) => created.task_id,
            Err(e) => return Err(self.fail(Phase::Create, None, e)),
        };
        self.observer
            .transition(WorkflowState::Polling, Some(&task_id));

        let status = match timeout(self.policy.timeout, self.poll(&task_id)).await {
            Ok(Ok(status)) => status,
            Ok(Err(e)) => return Err(self.fail(Phase::Poll, Some(&task_id), e)),
            Err(_) => {
                self.observer
                    .transition(WorkflowState::TimedOut, Some(&task_id));
                let message = format!(
                    "task {task_id} did not finish within {:?}",
                    self.policy.timeout
                );
                return Err(WorkflowError::new(Phase::Poll, Error::Timeout { message }));
            }
        };

        let Some(track_url) = status.track_url() else {
            let e = Error::protocol(format!(
                "task {task_id} is {} but its meta has no track_url: {:?}",
                status.status, status.meta
            ));
            return Err(self.fail(Phase::Poll, Some(&task_id), e));
        };
        self.observer
            .transition(WorkflowState::Succeeded, Some(&task_id));

        let path = target.resolve(request.resolved_format(&self.defaults), &task_id);
        match self.api.download_track(track_url, &path).await {
            Ok(saved) => {
                self.observer.downloaded(&task_id, &saved);
                Ok(saved)
            }
            Err(e) => Err(self.fail(Phase::Download, Some(&task_id), e)),
        }
    }

    async fn poll(&self, task_id: &str) -> Result<TrackStatus> {
        let mut attempt = 0u32;
        loop {
            attempt += 1;
            let status = self.api.get_task_status(task_id).await?;
            self.observer.polled(task_id, attempt, &status.status);

            if status.status.is_success() {
                return Ok(status);
            }
            if status.status.is_failure() {
                return Err(Error::TaskFailed {
                    task_id: task_id.to_string(),
                    meta: status.meta,
                });
            }

            sleep(self.policy.interval).await;
        }
    }

    fn fail(&self, phase: Phase, task_id: Option<&str>, source: Error) -> WorkflowError {
        self.observer.transition(WorkflowState::Failed, task_id);
        WorkflowError::new(phase, source)
    }
}
