//! Settings resolution.
//!
//! Values are looked up in this order: explicit [`Overrides`], the process
//! environment, a `.env` file, and finally built-in defaults. All variables
//! carry the `BEATOVEN_` prefix and are matched case-insensitively. The process environment is only read, never
//! written, so resolving settings is safe while other workflows are running.

use std::{
    collections::HashMap,
    fmt,
    path::{Path, PathBuf},
    str::FromStr,
    time::Duration,
};

use log::{debug, warn};
use reqwest::Url;

use crate::{
    Error, Result,
    models::{AudioFormat, TrackDefaults, check_duration},
};

pub const ENV_PREFIX: &str = "BEATOVEN_";
pub const DEFAULT_API_URL: &str = "https://public-api.beatoven.ai/api/v1";
pub const DEFAULT_DURATION: u32 = 180;
pub const DEFAULT_REQUEST_TIMEOUT: Duration = Duration::from_secs(30);
pub const DEFAULT_DOWNLOAD_TIMEOUT: Duration = Duration::from_secs(120);
pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_secs(5);
pub const DEFAULT_POLL_TIMEOUT: Duration = Duration::from_secs(600);
const ENV_FILE_NAME: &str = ".env";

#[derive(Clone, PartialEq)]
pub struct Settings {
    pub api_key: String,
    pub api_url: String,
    pub default_duration: u32,
    pub default_format: AudioFormat,
    pub output_dir: PathBuf,
    pub request_timeout: Duration,
    pub download_timeout: Duration,
    pub poll_interval: Duration,
    pub poll_timeout: Duration,
}

/// Caller supplied values that win over everything else
#[derive(Debug, Clone, Default)]
pub struct Overrides {
    pub api_key: Option<String>,
    pub api_url: Option<String>,
    pub output_dir: Option<PathBuf>,
}

impl Settings {
    /// Resolves settings from the process environment and a `.env` file.
    ///
    /// Without an explicit `env_file`, `./.env` and `$HOME/.env` are tried.
    pub fn from_env(overrides: &Overrides, env_file: Option<&Path>) -> Result<Self> {
        let source = EnvSource::process_and_file(env_file)?;
        Self::resolve(overrides, &source)
    }

    pub fn resolve(overrides: &Overrides, source: &EnvSource) -> Result<Self> {
        let api_key = overrides
            .api_key
            .clone()
            .or_else(|| source.get("API_KEY").map(str::to_string))
            .filter(|k| !k.trim().is_empty())
            .ok_or_else(|| {
                Error::configuration(format!(
                    "API key is required, pass it explicitly or set {ENV_PREFIX}API_KEY"
                ))
            })?;

        let api_url = overrides
            .api_url
            .clone()
            .or_else(|| source.get("API_URL").map(str::to_string))
            .unwrap_or_else(|| DEFAULT_API_URL.to_string());
        let parsed = Url::parse(&api_url)
            .map_err(|e| Error::configuration(format!("invalid API URL {api_url:?}: {e}")))?;
        if parsed.cannot_be_a_base() {
            return Err(Error::configuration(format!(
                "API URL {api_url:?} cannot be used as a base"
            )));
        }

        let default_duration = match source.parse::<i64>("DEFAULT_DURATION")? {
            Some(seconds) => check_duration(seconds).map_err(|e| {
                Error::configuration(format!("{ENV_PREFIX}DEFAULT_DURATION: {e}"))
            })?,
            None => DEFAULT_DURATION,
        };

        let default_format = source
            .parse::<AudioFormat>("DEFAULT_FORMAT")?
            .unwrap_or_default();

        let output_dir = overrides
            .output_dir
            .clone()
            .or_else(|| source.get("OUTPUT_DIR").map(PathBuf::from))
            .unwrap_or_else(|| PathBuf::from("."));

        Ok(Self {
            api_key,
            api_url: api_url.trim_end_matches('/').to_string(),
            default_duration,
            default_format,
            output_dir,
            request_timeout: source
                .seconds("REQUEST_TIMEOUT")?
                .unwrap_or(DEFAULT_REQUEST_TIMEOUT),
            download_timeout: source
                .seconds("DOWNLOAD_TIMEOUT")?
                .unwrap_or(DEFAULT_DOWNLOAD_TIMEOUT),
            poll_interval: match source.seconds("POLL_INTERVAL")? {
                Some(interval) => interval,
                None => source
                    .seconds("POLLING_INTERVAL")?
                    .unwrap_or(DEFAULT_POLL_INTERVAL),
            },
            poll_timeout: source
                .seconds("POLL_TIMEOUT")?
                .unwrap_or(DEFAULT_POLL_TIMEOUT),
        })
    }

    pub fn track_defaults(&self) -> TrackDefaults {
        TrackDefaults {
            duration: self.default_duration,
            format: self.default_format,
        }
    }
}

impl fmt::Debug for Settings {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Settings")
            .field("api_key", &"<redacted>")
            .field("api_url", &self.api_url)
            .field("default_duration", &self.default_duration)
            .field("default_format", &self.default_format)
            .field("output_dir", &self.output_dir)
            .field("request_timeout", &self.request_timeout)
            .field("download_timeout", &self.download_timeout)
            .field("poll_interval", &self.poll_interval)
            .field("poll_timeout", &self.poll_timeout)
            .finish()
    }
}

/// Layered lookup of `BEATOVEN_*` variables. Earlier layers win.
///
/// Keys are stored upper-cased, so `beatoven_api_key` and `BEATOVEN_API_KEY`
/// name the same variable.
#[derive(Debug, Clone, Default)]
pub struct EnvSource {
    layers: Vec<HashMap<String, String>>,
}

impl EnvSource {
    pub fn from_layers(layers: Vec<HashMap<String, String>>) -> Self {
        Self {
            layers: layers.into_iter().map(upper_keys).collect(),
        }
    }

    /// The process environment, backed by the given or discovered `.env` file
    pub fn process_and_file(env_file: Option<&Path>) -> Result<Self> {
        let process = upper_keys(
            std::env::vars_os()
                .filter_map(|(k, v)| Some((k.into_string().ok()?, v.into_string().ok()?))),
        );

        let file_path = match env_file {
            Some(path) if path.exists() => Some(path.to_path_buf()),
            Some(path) => {
                warn!(
                    "Environment file {} not found, using process environment and defaults",
                    path.display()
                );
                None
            }
            None => find_env_file(),
        };

        let mut layers = vec![process];
        if let Some(path) = file_path {
            debug!("Using environment file {}", path.display());
            layers.push(read_env_file(&path)?);
        }

        Ok(Self { layers })
    }

    /// Looks up `BEATOVEN_{name}`
    pub fn get(&self, name: &str) -> Option<&str> {
        let key = format!("{ENV_PREFIX}{name}");
        self.layers
            .iter()
            .filter_map(|layer| layer.get(&key))
            .map(String::as_str)
            .find(|v| !v.trim().is_empty())
    }

    fn parse<T>(&self, name: &str) -> Result<Option<T>>
    where
        T: FromStr,
        T::Err: fmt::Display,
    {
        self.get(name)
            .map(|raw| {
                raw.trim().parse::<T>().map_err(|e| {
                    Error::configuration(format!("invalid {ENV_PREFIX}{name} {raw:?}: {e}"))
                })
            })
            .transpose()
    }

    fn seconds(&self, name: &str) -> Result<Option<Duration>> {
        let Some(secs) = self.parse::<f64>(name)? else {
            return Ok(None);
        };
        Duration::try_from_secs_f64(secs).map(Some).map_err(|e| {
            Error::configuration(format!("invalid {ENV_PREFIX}{name} {secs}: {e}"))
        })
    }
}

pub fn find_env_file() -> Option<PathBuf> {
    let cwd = std::env::current_dir().ok().map(|d| d.join(ENV_FILE_NAME));
    let home = dirs::home_dir().map(|d| d.join(ENV_FILE_NAME));
    [cwd, home].into_iter().flatten().find(|p| p.is_file())
}

fn read_env_file(path: &Path) -> Result<HashMap<String, String>> {
    let iter = dotenvy::from_path_iter(path).map_err(|e| {
        Error::configuration(format!("cannot read {}: {e}", path.display()))
    })?;
    let vars = iter
        .map(|item| {
            item.map_err(|e| Error::configuration(format!("malformed {}: {e}", path.display())))
        })
        .collect::<Result<Vec<_>>>()?;
    Ok(upper_keys(vars))
}

/// Keeps the `BEATOVEN_` variables, keyed in upper case
fn upper_keys(vars: impl IntoIterator<Item = (String, String)>) -> HashMap<String, String> {
    vars.into_iter()
        .map(|(k, v)| (k.to_ascii_uppercase(), v))
        .filter(|(k, _)| k.starts_with(ENV_PREFIX))
        .collect()
}
