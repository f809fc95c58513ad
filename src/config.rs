use anyhow::{Context, Result};
use serde::Deserialize;
use std::{env, fs, path::PathBuf, str::FromStr};

/// Which repair pass to run over the input file.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Mode {
    /// Rebuild one physical line per logical record.
    Reassemble,
    /// Normalize per-column values against the header schema.
    Fix,
}

impl FromStr for Mode {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "reassemble" => Ok(Mode::Reassemble),
            "fix" => Ok(Mode::Fix),
            other => anyhow::bail!("unknown mode `{}`, expected `reassemble` or `fix`", other),
        }
    }
}

/// Run configuration. Defaults mirror the standard drop location of a bad
/// export; a JSON config file and `SDSREPAIR_*` environment variables can
/// override them, in that order.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct Config {
    pub input_path: PathBuf,
    pub output_path: PathBuf,
    pub mode: Mode,
    /// Tally physical-line field counts while reassembling, for manual
    /// inspection of a corrupted export. Off by default.
    pub tally_field_counts: bool,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            input_path: PathBuf::from("bad_sds.txt"),
            output_path: PathBuf::from("better_sds.txt"),
            mode: Mode::Fix,
            tally_field_counts: false,
        }
    }
}

impl Config {
    /// Parse a JSON config file. Missing keys fall back to the defaults.
    pub fn from_file(path: impl Into<PathBuf>) -> Result<Self> {
        let path: PathBuf = path.into();
        let raw = fs::read_to_string(&path)
            .with_context(|| format!("failed to read config file {}", path.display()))?;
        serde_json::from_str(&raw)
            .with_context(|| format!("failed to parse config file {}", path.display()))
    }

    /// Resolve the effective configuration: defaults, then the file named by
    /// `SDSREPAIR_CONFIG` if set, then per-field environment overrides
    /// (`SDSREPAIR_INPUT`, `SDSREPAIR_OUTPUT`, `SDSREPAIR_MODE`).
    pub fn load() -> Result<Self> {
        let mut config = match env::var("SDSREPAIR_CONFIG") {
            Ok(path) => Self::from_file(path)?,
            Err(_) => Self::default(),
        };
        if let Ok(path) = env::var("SDSREPAIR_INPUT") {
            config.input_path = PathBuf::from(path);
        }
        if let Ok(path) = env::var("SDSREPAIR_OUTPUT") {
            config.output_path = PathBuf::from(path);
        }
        if let Ok(mode) = env::var("SDSREPAIR_MODE") {
            config.mode = mode.parse()?;
        }
        Ok(config)
    }
}
