/// Parallel execution of task units on a bounded worker pool.
use crate::constants::MEMORY_SAMPLE_INTERVAL_MS;
use crate::diagnostics::MemorySampler;
use crate::engine::PipelineEngine;
use crate::error::{Error, Result};
use crate::task::TaskUnit;
use crate::tile::BufferState;
use indicatif::{ProgressBar, ProgressStyle};
use rayon::prelude::*;
use rayon::{ThreadPool, ThreadPoolBuilder};
use std::path::{Path, PathBuf};
use std::time::{Duration, Instant};

/// Pool sizing. Pipelines run as `workers × threads_per_worker` concurrent slots.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ExecutionSettings {
    pub workers: usize,
    pub threads_per_worker: usize,
}

impl ExecutionSettings {
    pub fn slots(&self) -> usize {
        self.workers * self.threads_per_worker
    }

    pub fn validate(&self) -> Result<()> {
        if self.workers == 0 || self.threads_per_worker == 0 {
            return Err(Error::Config(format!(
                "workers and threads per worker must be positive, got {} x {}",
                self.workers, self.threads_per_worker
            )));
        }
        Ok(())
    }
}

/// Units handed to the pool, not yet run.
#[derive(Debug)]
pub struct Batch {
    tasks: Vec<TaskUnit>,
}

impl Batch {
    pub fn len(&self) -> usize {
        self.tasks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tasks.is_empty()
    }
}

/// Result of one unit, inspected individually.
#[derive(Debug)]
pub struct TaskOutcome {
    pub name: String,
    pub outputs: Vec<PathBuf>,
    pub elapsed: Duration,
    pub buffer_state: BufferState,
    pub result: Result<()>,
}

#[derive(Debug, Default)]
pub struct BatchReport {
    pub succeeded: Vec<TaskOutcome>,
    pub failed: Vec<TaskOutcome>,
}

impl BatchReport {
    pub fn produced(&self) -> Vec<PathBuf> {
        self.succeeded
            .iter()
            .flat_map(|o| o.outputs.iter().cloned())
            .collect()
    }

    /// Outputs of successful units whose buffer margin still has to be cut
    pub fn pending_buffer_removal(&self) -> Vec<PathBuf> {
        self.succeeded
            .iter()
            .filter(|o| o.buffer_state.pending_removal)
            .flat_map(|o| o.outputs.iter().cloned())
            .collect()
    }
}

/// Explicit scheduler context. Built after the task graph, shut down after
/// gathering.
pub struct ExecutionContext {
    pool: ThreadPool,
    settings: ExecutionSettings,
}

impl ExecutionContext {
    pub fn new(settings: ExecutionSettings) -> Result<Self> {
        settings.validate()?;

        let pool = ThreadPoolBuilder::new()
            .num_threads(settings.slots())
            .thread_name(|i| format!("tile-worker-{}", i))
            .build()
            .map_err(|e| Error::Scheduler(format!("cannot build worker pool: {}", e)))?;

        log::info!(
            "Worker pool ready: {} workers x {} threads",
            settings.workers,
            settings.threads_per_worker
        );
        Ok(Self { pool, settings })
    }

    pub fn settings(&self) -> ExecutionSettings {
        self.settings
    }

    pub fn persist(&self, tasks: Vec<TaskUnit>) -> Batch {
        Batch { tasks }
    }

    /// Run every unit of the batch in parallel.
    /// Each unit retires its own record, so one failure never blocks the
    /// cleanup of others.
    pub fn compute(&self, batch: &Batch, engine: &dyn PipelineEngine) -> Vec<TaskOutcome> {
        let pb = ProgressBar::new(batch.len() as u64);
        pb.set_style(
            ProgressStyle::default_bar()
                .template("[{bar:40.green/blue}] {pos}/{len} pipelines ({percent}%) {msg}")
                .unwrap_or_else(|_| ProgressStyle::default_bar())
                .progress_chars("█▉▊▋▌▍▎▏"),
        );
        pb.set_message("Executing pipelines");

        let outcomes = self.pool.install(|| {
            batch
                .tasks
                .par_iter()
                .map(|task| {
                    let started = Instant::now();
                    let result = task.run(engine);
                    if let Err(e) = &result {
                        pb.println(format!("{} failed: {}", task.name, e));
                    }
                    pb.inc(1);
                    TaskOutcome {
                        name: task.name.clone(),
                        outputs: task.pipeline.outputs(),
                        elapsed: started.elapsed(),
                        buffer_state: task.buffer_state,
                        result,
                    }
                })
                .collect::<Vec<_>>()
        });

        pb.finish_with_message("Pipelines executed");
        outcomes
    }

    /// Split outcomes into successes and failures
    pub fn gather(&self, outcomes: Vec<TaskOutcome>) -> BatchReport {
        let (succeeded, failed): (Vec<_>, Vec<_>) =
            outcomes.into_iter().partition(|o| o.result.is_ok());
        BatchReport { succeeded, failed }
    }

    /// Persist, compute and gather, optionally inside a memory sampling
    /// session written to `memory_report`.
    pub fn run(
        &self,
        tasks: Vec<TaskUnit>,
        engine: &dyn PipelineEngine,
        memory_report: Option<&Path>,
    ) -> Result<BatchReport> {
        let batch = self.persist(tasks);

        let outcomes = match memory_report {
            Some(path) => {
                let sampler = MemorySampler::start(
                    "execution",
                    Duration::from_millis(MEMORY_SAMPLE_INTERVAL_MS),
                );
                let outcomes = self.compute(&batch, engine);
                sampler.finish(path)?;
                outcomes
            }
            None => self.compute(&batch, engine),
        };

        Ok(self.gather(outcomes))
    }

    /// Tear down the pool, joining its threads
    pub fn shutdown(self) {
        drop(self.pool);
        log::debug!("Worker pool shut down");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pipeline::ResolvedPipeline;
    use crate::record::RecordStore;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use tempfile::tempdir;

    struct FailOdd {
        calls: AtomicUsize,
    }

    impl PipelineEngine for FailOdd {
        fn execute(&self, task: &str, _pipeline: &ResolvedPipeline) -> Result<()> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            let index: usize = task.parse().unwrap();
            if index % 2 == 1 {
                return Err(Error::Execution {
                    task: task.to_string(),
                    message: "odd".to_string(),
                });
            }
            Ok(())
        }
    }

    fn unit(store: &RecordStore, index: usize) -> TaskUnit {
        let pipeline = ResolvedPipeline::from_json(&format!(
            r#"{{"pipeline": [{{"type": "readers.las"}}, {{"type": "writers.las", "filename": "/out/{}.las"}}]}}"#,
            index
        ))
        .unwrap();
        let name = index.to_string();
        let record = store.write(&name, &pipeline).unwrap();
        TaskUnit {
            name,
            pipeline,
            record: Some(record),
            buffer_state: BufferState::default(),
        }
    }

    #[test]
    fn zero_workers_is_config_error() {
        let settings = ExecutionSettings {
            workers: 0,
            threads_per_worker: 1,
        };
        assert!(matches!(
            ExecutionContext::new(settings),
            Err(Error::Config(_))
        ));
    }

    #[test]
    fn failures_keep_records_successes_remove_them() {
        let dir = tempdir().unwrap();
        let store = RecordStore::open(dir.path()).unwrap();
        let tasks: Vec<TaskUnit> = (0..6).map(|i| unit(&store, i)).collect();

        let context = ExecutionContext::new(ExecutionSettings {
            workers: 2,
            threads_per_worker: 2,
        })
        .unwrap();
        let engine = FailOdd {
            calls: AtomicUsize::new(0),
        };
        let report = context.run(tasks, &engine, None).unwrap();
        context.shutdown();

        assert_eq!(engine.calls.load(Ordering::SeqCst), 6);
        assert_eq!(report.succeeded.len(), 3);
        assert_eq!(report.failed.len(), 3);

        let mut produced = report.produced();
        produced.sort();
        assert_eq!(
            produced,
            vec![
                PathBuf::from("/out/0.las"),
                PathBuf::from("/out/2.las"),
                PathBuf::from("/out/4.las")
            ]
        );

        let left: Vec<PathBuf> = store.list().unwrap();
        assert_eq!(
            left,
            vec![
                store.record_path("1"),
                store.record_path("3"),
                store.record_path("5")
            ]
        );
    }

    #[test]
    fn successful_buffered_outputs_are_reported_for_removal() {
        let dir = tempdir().unwrap();
        let store = RecordStore::open(dir.path()).unwrap();
        let pending = BufferState {
            applied: true,
            pending_removal: true,
        };
        let tasks: Vec<TaskUnit> = (0..3)
            .map(|i| TaskUnit {
                buffer_state: pending,
                ..unit(&store, i)
            })
            .collect();

        let context = ExecutionContext::new(ExecutionSettings {
            workers: 1,
            threads_per_worker: 1,
        })
        .unwrap();
        let engine = FailOdd {
            calls: AtomicUsize::new(0),
        };
        let report = context.run(tasks, &engine, None).unwrap();

        let mut pending_outputs = report.pending_buffer_removal();
        pending_outputs.sort();
        assert_eq!(
            pending_outputs,
            vec![PathBuf::from("/out/0.las"), PathBuf::from("/out/2.las")]
        );
    }

    #[test]
    fn memory_report_is_written_when_requested() {
        let dir = tempdir().unwrap();
        let store = RecordStore::open(&dir.path().join("temp")).unwrap();
        let tasks = vec![unit(&store, 0)];
        let report_path = dir.path().join("memory-usage.csv");

        let context = ExecutionContext::new(ExecutionSettings {
            workers: 1,
            threads_per_worker: 1,
        })
        .unwrap();
        let engine = FailOdd {
            calls: AtomicUsize::new(0),
        };
        context.run(tasks, &engine, Some(&report_path)).unwrap();

        assert!(report_path.exists());
    }
}
