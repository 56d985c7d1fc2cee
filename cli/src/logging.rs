use std::{
    fs::{self, File, OpenOptions},
    io::{self, Write},
    path::Path,
};

use color_eyre::{Result, eyre::WrapErr as _};
use log::LevelFilter;

/// Installs the process logger. `RUST_LOG`, when set, refines the defaults.
pub fn init(verbose: bool, log_file: Option<&Path>) -> Result<()> {
    let own_level = if verbose {
        LevelFilter::Debug
    } else {
        LevelFilter::Info
    };

    let mut builder = pretty_env_logger::formatted_timed_builder();
    builder
        .filter_level(LevelFilter::Warn)
        .filter_module("beatoven", own_level);

    if let Ok(filters) = std::env::var("RUST_LOG") {
        builder.parse_filters(&filters);
    }

    if let Some(path) = log_file {
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent)
                .wrap_err_with(|| format!("creating log directory {}", parent.display()))?;
        }
        let file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(path)
            .wrap_err_with(|| format!("opening log file {}", path.display()))?;
        builder.target(env_logger::Target::Pipe(Box::new(Tee { file })));
    }

    builder.try_init().wrap_err("installing logger")?;
    Ok(())
}

/// Writes log lines to stderr and a file
struct Tee {
    file: File,
}

impl Write for Tee {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        io::stderr().write_all(buf)?;
        self.file.write_all(buf)?;
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        io::stderr().flush()?;
        self.file.flush()
    }
}
