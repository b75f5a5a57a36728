/// Startup scan of the temp directory for work left by a previous run.
use crate::error::{Error, Result};
use crate::record::RecordStore;
use crate::task::TaskUnit;

#[derive(Debug)]
pub enum Recovery {
    /// No records: derive tiles from the configured input.
    Fresh,
    /// Records found: they are the whole work list.
    Resume {
        tasks: Vec<TaskUnit>,
        /// Records that could not be read. Left in place for the operator.
        unreadable: Vec<(String, Error)>,
    },
}

pub struct RecoveryScanner<'a> {
    store: &'a RecordStore,
}

impl<'a> RecoveryScanner<'a> {
    pub fn new(store: &'a RecordStore) -> Self {
        Self { store }
    }

    /// List the store and turn every record into a task unit.
    /// Must finish before any new record is written.
    ///
    /// Records of a plan that never finished writing are not a complete work
    /// list. They are discarded and the run starts fresh.
    pub fn scan(&self) -> Result<Recovery> {
        if self.store.has_open_plan() {
            let discarded = self.store.discard_plan()?;
            log::warn!(
                "A previous run stopped while planning; discarded {} records and planning again",
                discarded
            );
            return Ok(Recovery::Fresh);
        }

        let records = self.store.list()?;
        if records.is_empty() {
            return Ok(Recovery::Fresh);
        }

        log::warn!(
            "Found {} records from a previous run in {}, resuming",
            records.len(),
            self.store.dir().display()
        );

        let mut tasks = Vec::with_capacity(records.len());
        let mut unreadable = Vec::new();
        for path in records {
            let loaded = RecordStore::load(&path).and_then(|(name, pipeline)| {
                Ok((name, pipeline, RecordStore::load_buffer_state(&path)?))
            });
            match loaded {
                Ok((name, pipeline, buffer_state)) => tasks.push(TaskUnit {
                    name,
                    pipeline,
                    record: Some(path),
                    buffer_state,
                }),
                Err(e) => {
                    log::error!("Cannot read record {}: {}", path.display(), e);
                    unreadable.push((path.display().to_string(), e));
                }
            }
        }

        Ok(Recovery::Resume { tasks, unreadable })
    }
}
