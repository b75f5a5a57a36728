/// Independent task units and the graph builder that persists them.
use crate::engine::PipelineEngine;
use crate::error::{Error, Result};
use crate::laz::Cloud;
use crate::pipeline::{PipelineTemplate, ResolvedPipeline};
use crate::record::RecordStore;
use crate::tile::{BufferState, Tile, TileNames};
use std::path::{Path, PathBuf};

/// One schedulable pipeline. Shares no state with other units.
#[derive(Debug, Clone, PartialEq)]
pub struct TaskUnit {
    pub name: String,
    pub pipeline: ResolvedPipeline,
    /// Temp record deleted once this unit succeeds. `None` for dry runs.
    pub record: Option<PathBuf>,
    pub buffer_state: BufferState,
}

impl TaskUnit {
    /// Execute the pipeline and retire its record on success.
    /// On failure the record stays so the next run retries it.
    pub fn run(&self, engine: &dyn PipelineEngine) -> Result<()> {
        engine.execute(&self.name, &self.pipeline)?;

        if let Some(record) = &self.record {
            if let Err(e) = RecordStore::remove(record) {
                log::warn!("{} succeeded but its record remains: {}", self.name, e);
            }
        }
        Ok(())
    }
}

/// Units ready for submission plus the tiles that could not be built.
#[derive(Debug, Default)]
pub struct TaskGraph {
    pub tasks: Vec<TaskUnit>,
    pub rejected: Vec<(String, Error)>,
}

impl TaskGraph {
    pub fn len(&self) -> usize {
        self.tasks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tasks.is_empty()
    }
}

/// Turns tiles into task units, persisting a record for each one first.
///
/// Records form one plan: the store is marked while they are written and the
/// mark is cleared by `build`. A fatal error removes the records written so far.
pub struct TaskGraphBuilder {
    /// `None` in dry-run mode: nothing is made recoverable.
    store: Option<RecordStore>,
    is_single_file: bool,
    plan_open: bool,
    graph: TaskGraph,
}

impl TaskGraphBuilder {
    pub fn new(store: Option<RecordStore>, is_single_file: bool) -> Self {
        Self {
            store,
            is_single_file,
            plan_open: false,
            graph: TaskGraph::default(),
        }
    }

    /// Link one tile and queue it.
    ///
    /// Tile-level failures are collected and do not stop the build. A record
    /// that cannot be written is fatal since recovery could no longer be
    /// guaranteed.
    pub fn add_tile(&mut self, tile: Tile) -> Result<()> {
        let result = self.queue(tile);
        if let Err(e) = &result {
            self.abort(e);
        }
        result
    }

    fn queue(&mut self, tile: Tile) -> Result<()> {
        let label = tile.name.clone();

        let linked = match tile.link_pipeline(self.is_single_file) {
            Ok(linked) => linked,
            Err(e) if !e.is_fatal() => {
                log::error!("Skipping tile {}: {}", label, e);
                self.graph.rejected.push((label, e));
                return Ok(());
            }
            Err(e) => return Err(e),
        };

        let record = match &self.store {
            Some(store) => {
                if !self.plan_open {
                    store.begin_plan()?;
                    self.plan_open = true;
                }
                store.write_buffer_state(&linked.name, &linked.buffer_state)?;
                Some(store.write(&linked.name, &linked.pipeline)?)
            }
            None => None,
        };

        self.graph.tasks.push(TaskUnit {
            name: linked.name,
            pipeline: linked.pipeline,
            record,
            buffer_state: linked.buffer_state,
        });
        Ok(())
    }

    pub fn add_tiles(&mut self, tiles: impl IntoIterator<Item = Tile>) -> Result<()> {
        for tile in tiles {
            self.add_tile(tile)?;
        }
        Ok(())
    }

    /// Roll back the records of this plan
    fn abort(&mut self, cause: &Error) {
        let Some(store) = &self.store else {
            return;
        };
        if !self.plan_open {
            return;
        }
        match store.discard_plan() {
            Ok(removed) => log::error!("Planning failed ({}); removed {} records", cause, removed),
            Err(e) => log::error!(
                "Planning failed ({}) and its records could not be removed: {}",
                cause,
                e
            ),
        }
        self.plan_open = false;
        self.graph.tasks.clear();
    }

    /// Close the plan and hand over the graph
    pub fn build(self) -> Result<TaskGraph> {
        if let (Some(store), true) = (&self.store, self.plan_open) {
            store.commit_plan()?;
        }
        log::info!(
            "Task graph: {} units, {} rejected{}",
            self.graph.tasks.len(),
            self.graph.rejected.len(),
            if self.store.is_none() { " (dry run)" } else { "" }
        );
        Ok(self.graph)
    }
}

/// Wrap directory-mode inputs as whole-file tiles named by file stem.
pub fn files_as_tiles(
    files: &[PathBuf],
    template: &PipelineTemplate,
    output_dir: &Path,
) -> Vec<Tile> {
    let mut names = TileNames::new();
    files
        .iter()
        .map(|path| {
            let cloud = Cloud::whole_file(path.clone());
            let name = names.claim(&cloud.stem());
            Tile::whole_file(cloud, template.clone(), output_dir).with_name(name)
        })
        .collect()
}
