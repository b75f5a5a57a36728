/// Run configuration document: input, output, temp and pipeline template.
use crate::error::{Error, Result};
use crate::pipeline::PipelineTemplate;
use serde::Deserialize;
use serde_json::Value;
use std::fs;
use std::path::{Path, PathBuf};

#[derive(Deserialize)]
struct RawConfig {
    input: Option<String>,
    output: Option<String>,
    temp: Option<String>,
    pipeline: Option<Value>,
}

#[derive(Debug, Clone)]
pub struct Config {
    /// Input cloud (single mode) or directory of clouds (dir mode).
    pub input: PathBuf,
    pub output: PathBuf,
    /// Directory of pending pipeline records.
    pub temp: PathBuf,
    pub pipeline: PipelineTemplate,
}

fn required(value: Option<String>, key: &str) -> Result<PathBuf> {
    match value {
        Some(v) if !v.trim().is_empty() => Ok(PathBuf::from(v)),
        Some(_) => Err(Error::Config(format!("`{}` must not be empty", key))),
        None => Err(Error::Config(format!("missing required key `{}`", key))),
    }
}

impl Config {
    pub fn from_file(path: &Path) -> Result<Self> {
        let text = fs::read_to_string(path).map_err(|e| {
            Error::Config(format!("cannot read config {}: {}", path.display(), e))
        })?;
        Self::parse(&text)
    }

    /// Parse and validate, including the embedded pipeline template
    pub fn parse(text: &str) -> Result<Self> {
        let raw: RawConfig = serde_json::from_str(text)
            .map_err(|e| Error::Config(format!("invalid config document: {}", e)))?;

        let input = required(raw.input, "input")?;
        let output = required(raw.output, "output")?;
        let temp = required(raw.temp, "temp")?;
        let pipeline = raw
            .pipeline
            .ok_or_else(|| Error::Config("missing required key `pipeline`".to_string()))?;
        let pipeline = PipelineTemplate::from_value(&pipeline)
            .map_err(|e| Error::Config(format!("invalid `pipeline`: {}", e)))?;

        Ok(Self {
            input,
            output,
            temp,
            pipeline,
        })
    }
}
