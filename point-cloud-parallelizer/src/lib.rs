// Split point clouds into tiles and run a PDAL pipeline template over every
// tile on a worker pool. Each pipeline is recorded in the temp directory
// before it runs and the record is removed once it succeeds.
pub mod bounds;
pub mod config;
pub mod constants;
pub mod diagnostics;
pub mod engine;
pub mod error;
pub mod executor;
pub mod files;
pub mod laz;
pub mod orchestrator;
pub mod pipeline;
pub mod record;
pub mod recovery;
pub mod splitter;
pub mod task;
pub mod tile;

pub use bounds::Bounds;
pub use config::Config;
pub use engine::{PdalCli, PipelineEngine};
pub use error::{Error, Result};
pub use executor::{ExecutionContext, ExecutionSettings};
pub use orchestrator::{InputType, RunOptions, RunSummary, process_pipelines};
pub use pipeline::{PipelineTemplate, ResolvedPipeline, Stage};
pub use splitter::SplitOptions;
pub use tile::{BufferState, Tile};
