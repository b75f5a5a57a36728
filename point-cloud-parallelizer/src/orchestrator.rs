/// End-to-end run: recover or plan, execute, sweep, summarise.
use crate::config::Config;
use crate::constants::MEMORY_USAGE_FILE;
use crate::engine::PipelineEngine;
use crate::error::{Error, Result};
use crate::executor::{ExecutionContext, ExecutionSettings};
use crate::files::{list_input_files, sweep_empty_outputs};
use crate::laz::Cloud;
use crate::record::RecordStore;
use crate::recovery::{Recovery, RecoveryScanner};
use crate::splitter::{SplitOptions, split_cloud};
use crate::task::{TaskGraph, TaskGraphBuilder, files_as_tiles};
use std::fs;
use std::path::PathBuf;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InputType {
    /// One cloud split into tiles.
    Single,
    /// A directory of clouds, each processed whole.
    Dir,
}

#[derive(Debug, Clone)]
pub struct RunOptions {
    pub input_type: InputType,
    /// Test run over the first N tiles or files, without records.
    pub dry_run: Option<usize>,
    /// Sample memory during execution.
    pub diagnostic: bool,
    /// Tiling options. `limit` is taken from `dry_run`.
    pub split: SplitOptions,
    pub execution: ExecutionSettings,
}

/// What a run produced and what is left for the next one.
#[derive(Debug, Default)]
pub struct RunSummary {
    pub resumed: bool,
    pub dry_run: bool,
    pub produced: Vec<PathBuf>,
    pub failed: Vec<(String, String)>,
    pub rejected: Vec<(String, String)>,
    pub empty_outputs: Vec<PathBuf>,
    /// Outputs still carrying the buffer margin marked for removal.
    pub buffered_outputs: Vec<PathBuf>,
    pub remaining_records: Vec<PathBuf>,
    pub memory_report: Option<PathBuf>,
}

impl RunSummary {
    pub fn is_success(&self) -> bool {
        self.failed.is_empty() && self.rejected.is_empty()
    }

    /// Prints the run summary for the operator.
    pub fn print(&self) {
        println!("Run Summary:");
        if self.resumed {
            println!("  Resumed from records of a previous run");
        }
        if self.dry_run {
            println!("  Dry run: no records were kept");
        }
        println!("  Outputs produced: {}", self.produced.len());
        for path in &self.produced {
            println!("    {}", path.display());
        }
        if !self.empty_outputs.is_empty() {
            println!("  Empty outputs removed: {}", self.empty_outputs.len());
        }
        if !self.buffered_outputs.is_empty() {
            println!(
                "  Outputs with a buffer to remove: {}",
                self.buffered_outputs.len()
            );
            for path in &self.buffered_outputs {
                println!("    {}", path.display());
            }
        }
        if !self.rejected.is_empty() {
            println!("  Tiles rejected: {}", self.rejected.len());
            for (name, reason) in &self.rejected {
                println!("    {}: {}", name, reason);
            }
        }
        if !self.failed.is_empty() {
            println!("  Pipelines failed: {}", self.failed.len());
            for (name, reason) in &self.failed {
                println!("    {}: {}", name, reason);
            }
        }
        if let Some(path) = &self.memory_report {
            println!("  Memory usage: {}", path.display());
        }
        if !self.remaining_records.is_empty() {
            println!(
                "  {} records remain in the temp directory, run again to resume",
                self.remaining_records.len()
            );
        }
    }
}

/// Build a fresh task graph from the configured input.
fn plan(config: &Config, options: &RunOptions, store: &RecordStore) -> Result<TaskGraph> {
    let is_single_file = options.input_type == InputType::Single;
    let records = options.dry_run.is_none().then(|| store.clone());
    let mut builder = TaskGraphBuilder::new(records, is_single_file);

    let tiles = match options.input_type {
        InputType::Single => {
            let cloud = Cloud::open(&config.input)?;
            let split = SplitOptions {
                limit: options.dry_run,
                ..options.split.clone()
            };
            split_cloud(&cloud, &config.pipeline, &config.output, &split)?
        }
        InputType::Dir => {
            let files = list_input_files(&config.input, options.dry_run)?;
            files_as_tiles(&files, &config.pipeline, &config.output)
        }
    };

    builder.add_tiles(tiles)?;
    builder.build()
}

/// Run every pipeline of the configured job.
///
/// Records left in the temp directory take precedence over the configured
/// input: their presence means resume, and the input is not read at all.
pub fn process_pipelines(
    config: &Config,
    options: &RunOptions,
    engine: &dyn PipelineEngine,
) -> Result<RunSummary> {
    options.execution.validate()?;
    fs::create_dir_all(&config.output).map_err(|e| Error::io(&config.output, e))?;
    let store = RecordStore::open(&config.temp)?;

    let mut summary = RunSummary::default();

    // The scan completes before any record of this run is written.
    let graph = match RecoveryScanner::new(&store).scan()? {
        Recovery::Resume { tasks, unreadable } => {
            log::warn!(
                "Something went wrong during a previous execution; processing {} pending records and ignoring input {}",
                tasks.len(),
                config.input.display()
            );
            if options.dry_run.is_some() {
                log::warn!("Dry run ignored while resuming");
            }
            summary.resumed = true;
            TaskGraph {
                tasks,
                rejected: unreadable,
            }
        }
        Recovery::Fresh => {
            summary.dry_run = options.dry_run.is_some();
            plan(config, options, &store)?
        }
    };

    summary.rejected = graph
        .rejected
        .iter()
        .map(|(name, e)| (name.clone(), e.to_string()))
        .collect();

    if graph.is_empty() {
        log::warn!("Nothing to execute");
    } else {
        let memory_report = options
            .diagnostic
            .then(|| config.output.join(MEMORY_USAGE_FILE));

        let context = ExecutionContext::new(options.execution)?;
        log::info!("Parallelization started: {} pipelines", graph.len());
        let report = context.run(graph.tasks, engine, memory_report.as_deref())?;
        context.shutdown();

        summary.produced = report.produced();
        summary.buffered_outputs = report.pending_buffer_removal();
        if !summary.buffered_outputs.is_empty() {
            log::warn!(
                "{} outputs still include their buffer margin",
                summary.buffered_outputs.len()
            );
        }
        summary.failed = report
            .failed
            .iter()
            .map(|o| {
                let reason = o
                    .result
                    .as_ref()
                    .err()
                    .map(ToString::to_string)
                    .unwrap_or_default();
                (o.name.clone(), reason)
            })
            .collect();
        summary.memory_report = memory_report;
    }

    summary.empty_outputs = sweep_empty_outputs(&config.output)?;
    let empty = &summary.empty_outputs;
    summary.produced.retain(|p| !empty.contains(p));
    summary.buffered_outputs.retain(|p| !empty.contains(p));
    summary.remaining_records = store.list()?;

    Ok(summary)
}
