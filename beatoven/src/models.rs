use std::{fmt, str::FromStr};

use serde::{Deserialize, Deserializer, Serialize};
use serde_json::{Map, Value};
use strum::{Display, EnumIter, IntoEnumIterator};

use crate::{Error, Result};

pub const MIN_DURATION: u32 = 30;
pub const MAX_DURATION: u32 = 600;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TextPrompt {
    text: String,
}

impl TextPrompt {
    pub fn new(text: impl Into<String>) -> Result<Self> {
        let text = text.into();
        if text.trim().is_empty() {
            return Err(Error::validation("prompt text must not be empty"));
        }
        Ok(Self { text })
    }

    pub fn text(&self) -> &str {
        &self.text
    }
}

#[derive(
    Debug,
    Clone,
    Copy,
    Display,
    clap::ValueEnum,
    Serialize,
    Deserialize,
    Hash,
    PartialEq,
    Eq,
    EnumIter,
    Default,
)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase")]
pub enum AudioFormat {
    #[default]
    Mp3,
    Wav,
    Ogg,
}

impl AudioFormat {
    pub fn extension(&self) -> &'static str {
        match self {
            AudioFormat::Mp3 => "mp3",
            AudioFormat::Wav => "wav",
            AudioFormat::Ogg => "ogg",
        }
    }
}

impl FromStr for AudioFormat {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        let wanted = s.trim().to_ascii_lowercase();
        AudioFormat::iter()
            .find(|f| f.extension() == wanted)
            .ok_or_else(|| {
                let supported: Vec<_> = AudioFormat::iter().map(|f| f.to_string()).collect();
                Error::validation(format!(
                    "unsupported audio format {s:?}, expected one of {}",
                    supported.join(", ")
                ))
            })
    }
}

/// Values used for fields a [`TrackRequest`] leaves unset
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TrackDefaults {
    pub duration: u32,
    pub format: AudioFormat,
}

/// A single generation request. Built once and never mutated afterwards.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TrackRequest {
    prompt: TextPrompt,
    duration: Option<u32>,
    format: Option<AudioFormat>,
}

impl TrackRequest {
    pub fn new(prompt: impl Into<String>) -> Result<Self> {
        Ok(Self {
            prompt: TextPrompt::new(prompt)?,
            duration: None,
            format: None,
        })
    }

    /// Takes a signed value so that callers forwarding raw user input get a
    /// validation error instead of a silent wrap-around.
    pub fn with_duration(mut self, seconds: i64) -> Result<Self> {
        self.duration = Some(check_duration(seconds)?);
        Ok(self)
    }

    pub fn with_format(mut self, format: AudioFormat) -> Self {
        self.format = Some(format);
        self
    }

    /// Fills unset fields from `defaults`
    pub fn with_defaults(self, defaults: &TrackDefaults) -> Self {
        Self {
            duration: self.duration.or(Some(defaults.duration)),
            format: self.format.or(Some(defaults.format)),
            ..self
        }
    }

    pub fn prompt(&self) -> &TextPrompt {
        &self.prompt
    }

    pub fn duration(&self) -> Option<u32> {
        self.duration
    }

    pub fn format(&self) -> Option<AudioFormat> {
        self.format
    }

    pub fn resolved_format(&self, defaults: &TrackDefaults) -> AudioFormat {
        self.format.unwrap_or(defaults.format)
    }

    /// The JSON body sent to the composition endpoint
    pub fn body<'a>(&'a self, defaults: &TrackDefaults) -> ComposeBody<'a> {
        ComposeBody {
            prompt: &self.prompt,
            format: self.resolved_format(defaults),
            duration: self.duration.unwrap_or(defaults.duration),
        }
    }
}

pub(crate) fn check_duration(seconds: i64) -> Result<u32> {
    u32::try_from(seconds)
        .ok()
        .filter(|s| (MIN_DURATION..=MAX_DURATION).contains(s))
        .ok_or_else(|| {
            Error::validation(format!(
                "duration must be between {MIN_DURATION} and {MAX_DURATION} seconds, got {seconds}"
            ))
        })
}

#[derive(Debug, Serialize)]
pub struct ComposeBody<'a> {
    pub prompt: &'a TextPrompt,
    pub format: AudioFormat,
    pub duration: u32,
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct ComposeResponse {
    #[serde(default)]
    pub task_id: String,
}

/// Lifecycle state of a remote composition task.
///
/// The remote vocabulary is open, so unknown values are kept verbatim and
/// treated as still running.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum TaskState {
    Pending,
    Processing,
    Composing,
    Composed,
    Completed,
    Failed,
    Other(String),
}

impl TaskState {
    pub fn is_success(&self) -> bool {
        matches!(self, TaskState::Completed | TaskState::Composed)
    }

    pub fn is_failure(&self) -> bool {
        matches!(self, TaskState::Failed)
    }

    pub fn is_terminal(&self) -> bool {
        self.is_success() || self.is_failure()
    }

    pub fn as_str(&self) -> &str {
        match self {
            TaskState::Pending => "pending",
            TaskState::Processing => "processing",
            TaskState::Composing => "composing",
            TaskState::Composed => "composed",
            TaskState::Completed => "completed",
            TaskState::Failed => "failed",
            TaskState::Other(s) => s,
        }
    }
}

impl From<&str> for TaskState {
    fn from(s: &str) -> Self {
        match s {
            "pending" => TaskState::Pending,
            "processing" => TaskState::Processing,
            "composing" => TaskState::Composing,
            "composed" => TaskState::Composed,
            "completed" => TaskState::Completed,
            "failed" => TaskState::Failed,
            other => TaskState::Other(other.to_string()),
        }
    }
}

impl fmt::Display for TaskState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl<'de> Deserialize<'de> for TaskState {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        Ok(TaskState::from(s.as_str()))
    }
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct TrackStatus {
    /// Not part of the response body, filled in from the polled id
    #[serde(default)]
    pub task_id: String,
    pub status: TaskState,
    #[serde(default, deserialize_with = "null_as_empty")]
    pub meta: Map<String, Value>,
}

impl TrackStatus {
    pub fn track_url(&self) -> Option<&str> {
        self.meta.get("track_url").and_then(Value::as_str)
    }
}

fn null_as_empty<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Map<String, Value>, D::Error> {
    Ok(Option::<Map<String, Value>>::deserialize(deserializer)?.unwrap_or_default())
}
