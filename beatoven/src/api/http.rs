use std::{
    path::{Path, PathBuf},
    sync::Arc,
};

use log::{debug, error, info};
use reqwest::{Client, Response, Url};
use tokio::{fs, io::AsyncWriteExt};
use tokio_stream::StreamExt;

use super::{ApiFuture, TrackApi};
use crate::{
    Error, Result,
    config::Settings,
    models::{ComposeResponse, TrackRequest, TrackStatus},
};

/// [`TrackApi`] over HTTPS. Clones share one connection pool.
#[derive(Clone)]
pub struct HttpTrackApi {
    client: Client,
    settings: Arc<Settings>,
}

impl HttpTrackApi {
    pub fn new(settings: Arc<Settings>) -> Self {
        Self::with_client(Client::new(), settings)
    }

    pub fn with_client(client: Client, settings: Arc<Settings>) -> Self {
        Self { client, settings }
    }

    pub fn settings(&self) -> &Settings {
        &self.settings
    }

    fn endpoint(&self, segments: &[&str]) -> Result<Url> {
        let mut url = Url::parse(&self.settings.api_url).map_err(|e| {
            Error::configuration(format!("invalid API URL {:?}: {e}", self.settings.api_url))
        })?;
        url.path_segments_mut()
            .map_err(|_| Error::configuration("API URL cannot be used as a base"))?
            .pop_if_empty()
            .extend(segments);
        Ok(url)
    }

    async fn compose(&self, request: &TrackRequest) -> Result<ComposeResponse> {
        let url = self.endpoint(&["tracks", "compose"])?;
        let body = request.body(&self.settings.track_defaults());
        info!("Sending composition request: {body:?}");

        let resp = self
            .client
            .post(url)
            .bearer_auth(&self.settings.api_key)
            .timeout(self.settings.request_timeout)
            .json(&body)
            .send()
            .await
            .map_err(|e| Error::from_reqwest("composition request", e))?;

        let text = read_body(resp, false, "composition request").await?;
        let parsed: ComposeResponse = serde_json::from_str(&text).map_err(|e| {
            Error::protocol(format!("invalid composition response ({e}): {text}"))
        })?;
        if parsed.task_id.is_empty() {
            return Err(Error::protocol(format!(
                "composition response carries no task_id: {text}"
            )));
        }

        debug!("Composition accepted: {parsed:?}");
        Ok(parsed)
    }

    async fn status(&self, task_id: &str) -> Result<TrackStatus> {
        if task_id.is_empty() {
            return Err(Error::validation("task id must not be empty"));
        }
        let url = self.endpoint(&["tasks", task_id])?;
        debug!("Checking status for task {task_id}");

        let resp = self
            .client
            .get(url)
            .bearer_auth(&self.settings.api_key)
            .timeout(self.settings.request_timeout)
            .send()
            .await
            .map_err(|e| Error::from_reqwest("status request", e))?;

        let text = read_body(resp, true, "status request").await?;
        let mut status: TrackStatus = serde_json::from_str(&text)
            .map_err(|e| Error::protocol(format!("invalid status response ({e}): {text}")))?;
        status.task_id = task_id.to_string();

        debug!("Task {task_id} status: {status:?}");
        Ok(status)
    }

    async fn download(&self, url: &str, output_path: &Path) -> Result<PathBuf> {
        let url = Url::parse(url)
            .map_err(|e| Error::protocol(format!("invalid track URL {url:?}: {e}")))?;

        info!("Downloading track to {}", output_path.display());
        let resp = self
            .client
            .get(url)
            .timeout(self.settings.download_timeout)
            .send()
            .await
            .map_err(|e| Error::from_reqwest("track download", e))?;

        let status = resp.status();
        if !status.is_success() {
            let body = resp.text().await.unwrap_or_default();
            error!("Download failed: {status} - {body}");
            return Err(Error::from_status(status, body, true));
        }

        if let Some(parent) = output_path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent)
                .await
                .map_err(|e| Error::io(parent, e))?;
        }

        let part = partial_path(output_path);
        match write_body(resp, &part).await {
            Ok(written) => {
                fs::rename(&part, output_path)
                    .await
                    .map_err(|e| Error::io(output_path, e))?;
                info!(
                    "Downloaded {written} bytes to {}",
                    output_path.display()
                );
                Ok(output_path.to_path_buf())
            }
            Err(e) => {
                if let Err(rm_err) = fs::remove_file(&part).await {
                    debug!("Could not remove {}: {rm_err}", part.display());
                }
                Err(e)
            }
        }
    }
}

impl TrackApi for HttpTrackApi {
    fn compose_track<'a>(&'a self, request: &'a TrackRequest) -> ApiFuture<'a, ComposeResponse> {
        Box::pin(self.compose(request))
    }

    fn get_task_status<'a>(&'a self, task_id: &'a str) -> ApiFuture<'a, TrackStatus> {
        Box::pin(self.status(task_id))
    }

    fn download_track<'a>(
        &'a self,
        url: &'a str,
        output_path: &'a Path,
    ) -> ApiFuture<'a, PathBuf> {
        Box::pin(self.download(url, output_path))
    }
}

async fn read_body(resp: Response, not_found_distinct: bool, context: &str) -> Result<String> {
    let status = resp.status();
    let body = resp
        .text()
        .await
        .map_err(|e| Error::from_reqwest(context, e))?;

    if status.is_success() {
        Ok(body)
    } else {
        error!("{context} failed: {status} - {body}");
        Err(Error::from_status(status, body, not_found_distinct))
    }
}

async fn write_body(resp: Response, path: &Path) -> Result<u64> {
    let mut file = fs::File::create(path)
        .await
        .map_err(|e| Error::io(path, e))?;

    let mut stream = resp.bytes_stream();
    let mut written = 0u64;
    while let Some(chunk) = stream.next().await {
        let chunk = chunk.map_err(|e| Error::from_reqwest("track download", e))?;
        file.write_all(&chunk)
            .await
            .map_err(|e| Error::io(path, e))?;
        written += chunk.len() as u64;
    }
    file.flush().await.map_err(|e| Error::io(path, e))?;

    Ok(written)
}

/// `track.mp3` -> `track.mp3.part`
fn partial_path(path: &Path) -> PathBuf {
    let mut name = path.file_name().unwrap_or_default().to_os_string();
    name.push(".part");
    path.with_file_name(name)
}
