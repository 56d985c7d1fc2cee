use std::path::PathBuf;

use beatoven::{AudioFormat, GenerateOptions, Overrides};

/// Generate music from a text description with Beatoven.ai
#[derive(Debug, clap::Parser)]
#[command(name = "beatoven", version)]
pub struct Cli {
    /// Description of the music. Repeat to generate several tracks concurrently.
    #[arg(short, long, required = true)]
    pub prompt: Vec<String>,

    /// Track length in seconds
    #[arg(short, long, allow_negative_numbers = true)]
    pub duration: Option<i64>,

    #[arg(short, long, value_enum)]
    pub format: Option<AudioFormat>,

    /// Directory the tracks are written to
    #[arg(short, long)]
    pub output: Option<PathBuf>,

    /// File name without extension
    #[arg(long)]
    pub filename: Option<String>,

    /// Overrides BEATOVEN_API_KEY
    #[arg(long)]
    pub api_key: Option<String>,

    /// Read settings from this file instead of ./.env or ~/.env
    #[arg(long)]
    pub env_file: Option<PathBuf>,

    /// Debug output for this tool's own log messages
    #[arg(short, long)]
    pub verbose: bool,

    /// Also append log messages to this file
    #[arg(long)]
    pub log_file: Option<PathBuf>,
}

impl Cli {
    pub fn overrides(&self) -> Overrides {
        Overrides {
            api_key: self.api_key.clone(),
            api_url: None,
            output_dir: self.output.clone(),
        }
    }

    /// One job per prompt. With several prompts, `--filename` gets a `_<n>` suffix.
    pub fn jobs(&self) -> Vec<GenerateOptions> {
        let numbered = self.prompt.len() > 1;
        self.prompt
            .iter()
            .enumerate()
            .map(|(idx, prompt)| GenerateOptions {
                prompt: prompt.clone(),
                duration: self.duration,
                format: self.format,
                output_dir: self.output.clone(),
                filename: self.filename.as_ref().map(|name| {
                    if numbered {
                        format!("{name}_{}", idx + 1)
                    } else {
                        name.clone()
                    }
                }),
            })
            .collect()
    }
}
