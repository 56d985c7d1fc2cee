use std::{
    path::{Path, PathBuf},
    pin::Pin,
};

use crate::{
    Result,
    models::{ComposeResponse, TrackRequest, TrackStatus},
};

pub mod http;
pub use http::HttpTrackApi;

pub type ApiFuture<'a, T> = Pin<Box<dyn Future<Output = Result<T>> + Send + 'a>>;

/// The three remote calls a generation is made of.
///
/// Implementations must be usable from several workflows at once.
pub trait TrackApi: Send + Sync {
    /// Submits a composition job and returns the id used for polling
    fn compose_track<'a>(&'a self, request: &'a TrackRequest) -> ApiFuture<'a, ComposeResponse>;

    fn get_task_status<'a>(&'a self, task_id: &'a str) -> ApiFuture<'a, TrackStatus>;

    /// Stores the file behind `url` at `output_path`, creating missing directories
    fn download_track<'a>(&'a self, url: &'a str, output_path: &'a Path)
    -> ApiFuture<'a, PathBuf>;
}
