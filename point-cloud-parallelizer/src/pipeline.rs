/// Typed PDAL pipeline stages and the per-tile template built from them
use crate::bounds::Bounds;
use crate::constants::{
    COPC_SUFFIX, CROP_FILTER_TYPE, FILTER_PREFIX, LAZ_COMPRESSIONS, READER_PREFIX, WRITER_PREFIX,
};
use crate::error::{Error, Result};
use serde_json::{Map, Value, json};
use std::path::{Path, PathBuf};

/// PDAL stage type string plus every other option of the stage.
#[derive(Debug, Clone, PartialEq)]
pub struct StageSpec {
    /// Full PDAL type, e.g. `readers.las`.
    pub kind: String,
    /// Remaining stage options, kept verbatim.
    pub options: Map<String, Value>,
}

impl StageSpec {
    pub fn new(kind: &str) -> Self {
        Self {
            kind: kind.to_string(),
            options: Map::new(),
        }
    }

    pub fn with_option(mut self, key: &str, value: Value) -> Self {
        self.options.insert(key.to_string(), value);
        self
    }

    pub fn filename(&self) -> Option<&str> {
        self.options.get("filename").and_then(Value::as_str)
    }

    fn set_filename(&mut self, filename: &Path) {
        self.options.insert(
            "filename".to_string(),
            Value::String(filename.to_string_lossy().to_string()),
        );
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum Stage {
    Reader(StageSpec),
    Filter(StageSpec),
    Writer(StageSpec),
}

impl Stage {
    pub fn spec(&self) -> &StageSpec {
        match self {
            Stage::Reader(spec) | Stage::Filter(spec) | Stage::Writer(spec) => spec,
        }
    }

    /// Classify a raw stage object by its `type` prefix.
    pub fn from_value(index: usize, value: &Value) -> Result<Self> {
        let object = value.as_object().ok_or_else(|| {
            Error::MalformedTemplate(format!("stage {} must be an object", index))
        })?;

        let kind = object
            .get("type")
            .and_then(Value::as_str)
            .ok_or_else(|| {
                Error::MalformedTemplate(format!("stage {} has no string `type`", index))
            })?;

        let mut options = object.clone();
        options.remove("type");
        let spec = StageSpec {
            kind: kind.to_string(),
            options,
        };

        let has_suffix = |prefix: &str| kind.strip_prefix(prefix).is_some_and(|s| !s.is_empty());
        if has_suffix(READER_PREFIX) {
            Ok(Stage::Reader(spec))
        } else if has_suffix(FILTER_PREFIX) {
            Ok(Stage::Filter(spec))
        } else if has_suffix(WRITER_PREFIX) {
            Ok(Stage::Writer(spec))
        } else {
            Err(Error::MalformedTemplate(format!(
                "stage {} has unknown type `{}`",
                index, kind
            )))
        }
    }

    pub fn to_value(&self) -> Value {
        let spec = self.spec();
        let mut object = Map::new();
        object.insert("type".to_string(), Value::String(spec.kind.clone()));
        for (key, value) in &spec.options {
            object.insert(key.clone(), value.clone());
        }
        Value::Object(object)
    }
}

/// Infer the output file extension from a writer stage.
///
/// `compression` wins when present: `laszip` and `lazperf` give `.laz`,
/// anything else `.las`. Otherwise the writer type suffix is used, with
/// `writers.copc` mapped to `.copc.las`.
pub fn writer_extension(writer: &StageSpec) -> Result<String> {
    if let Some(compression) = writer.options.get("compression") {
        let is_laz = compression
            .as_str()
            .is_some_and(|c| LAZ_COMPRESSIONS.contains(&c));
        return Ok(if is_laz { ".laz" } else { ".las" }.to_string());
    }

    let suffix = writer
        .kind
        .strip_prefix(WRITER_PREFIX)
        .and_then(|s| s.split('.').next())
        .filter(|s| !s.is_empty())
        .ok_or_else(|| {
            Error::MalformedTemplate(format!(
                "writer `{}` has neither compression nor a parseable type",
                writer.kind
            ))
        })?;

    if suffix == COPC_SUFFIX {
        Ok(format!(".{}.las", suffix))
    } else {
        Ok(format!(".{}", suffix))
    }
}

fn parse_stages(document: &Value) -> Result<Vec<Stage>> {
    let array = match document {
        Value::Array(stages) => stages,
        Value::Object(object) => object
            .get("pipeline")
            .and_then(Value::as_array)
            .ok_or_else(|| {
                Error::MalformedTemplate("pipeline object has no `pipeline` array".to_string())
            })?,
        _ => {
            return Err(Error::MalformedTemplate(
                "pipeline must be an array or an object".to_string(),
            ));
        }
    };

    array
        .iter()
        .enumerate()
        .map(|(i, v)| Stage::from_value(i, v))
        .collect()
}

fn stages_to_value(stages: &[Stage]) -> Value {
    json!({ "pipeline": stages.iter().map(Stage::to_value).collect::<Vec<_>>() })
}

/// User pipeline template. Each tile owns its own clone.
#[derive(Debug, Clone, PartialEq)]
pub struct PipelineTemplate {
    stages: Vec<Stage>,
}

impl PipelineTemplate {
    /// Parse and validate a template document: a bare stage array or an
    /// object with a `pipeline` array. Every stage is typed here, so later
    /// accessors never fail on a missing `type`.
    pub fn from_value(document: &Value) -> Result<Self> {
        let template = Self {
            stages: parse_stages(document)?,
        };
        template.validate()?;
        Ok(template)
    }

    fn validate(&self) -> Result<()> {
        if self.readers().next().is_none() {
            return Err(Error::MalformedTemplate(
                "pipeline has no reader stage".to_string(),
            ));
        }
        self.output_extension()?;
        Ok(())
    }

    pub fn stages(&self) -> &[Stage] {
        &self.stages
    }

    pub fn readers(&self) -> impl Iterator<Item = &StageSpec> {
        self.stages.iter().filter_map(|s| match s {
            Stage::Reader(spec) => Some(spec),
            _ => None,
        })
    }

    pub fn writers(&self) -> impl Iterator<Item = &StageSpec> {
        self.stages.iter().filter_map(|s| match s {
            Stage::Writer(spec) => Some(spec),
            _ => None,
        })
    }

    /// Extension inferred from the first writer.
    pub fn output_extension(&self) -> Result<String> {
        let writer = self.writers().next().ok_or_else(|| {
            Error::MalformedTemplate("pipeline has no writer stage".to_string())
        })?;
        writer_extension(writer)
    }

    pub fn set_readers_filename(&mut self, filename: &Path) {
        for stage in &mut self.stages {
            if let Stage::Reader(spec) = stage {
                spec.set_filename(filename);
            }
        }
    }

    pub fn set_writers_filename(&mut self, filename: &Path) {
        for stage in &mut self.stages {
            if let Stage::Writer(spec) = stage {
                spec.set_filename(filename);
            }
        }
    }

    /// Insert a crop filter directly after the last reader.
    pub fn add_crop_filter(&mut self, bounds: &Bounds) {
        let position = self
            .stages
            .iter()
            .rposition(|s| matches!(s, Stage::Reader(_)))
            .map_or(0, |i| i + 1);
        let crop = StageSpec::new(CROP_FILTER_TYPE)
            .with_option("bounds", Value::String(bounds.crop_expression()));
        self.stages.insert(position, Stage::Filter(crop));
    }

    /// Freeze the template into an executable pipeline.
    pub fn resolve(self) -> ResolvedPipeline {
        ResolvedPipeline {
            stages: self.stages,
        }
    }

    pub fn to_value(&self) -> Value {
        stages_to_value(&self.stages)
    }
}

/// Pipeline with concrete reader and writer paths, ready for the engine and
/// for persisting as a temp record.
#[derive(Debug, Clone, PartialEq)]
pub struct ResolvedPipeline {
    stages: Vec<Stage>,
}

impl ResolvedPipeline {
    pub fn from_json(text: &str) -> Result<Self> {
        let document: Value = serde_json::from_str(text)?;
        let stages = parse_stages(&document)?;
        if !stages.iter().any(|s| matches!(s, Stage::Writer(_))) {
            return Err(Error::MalformedTemplate(
                "resolved pipeline has no writer stage".to_string(),
            ));
        }
        Ok(Self { stages })
    }

    pub fn to_json(&self) -> Result<String> {
        Ok(serde_json::to_string_pretty(&self.to_value())?)
    }

    pub fn to_value(&self) -> Value {
        stages_to_value(&self.stages)
    }

    pub fn stages(&self) -> &[Stage] {
        &self.stages
    }

    /// Files this pipeline writes.
    pub fn outputs(&self) -> Vec<PathBuf> {
        self.stages
            .iter()
            .filter_map(|s| match s {
                Stage::Writer(spec) => spec.filename().map(PathBuf::from),
                _ => None,
            })
            .collect()
    }

    /// Files this pipeline reads.
    pub fn inputs(&self) -> Vec<PathBuf> {
        self.stages
            .iter()
            .filter_map(|s| match s {
                Stage::Reader(spec) => spec.filename().map(PathBuf::from),
                _ => None,
            })
            .collect()
    }
}
