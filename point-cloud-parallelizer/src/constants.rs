/// Shared configuration for tiling and pipeline execution

/// Default tile width and height in source coordinate units
pub const DEFAULT_TILE_SIZE: (f64, f64) = (256.0, 256.0);

/// Default number of worker slots in the execution pool
pub const DEFAULT_WORKERS: usize = 3;

/// Default number of threads per worker slot
pub const DEFAULT_THREADS_PER_WORKER: usize = 1;

/// PDAL stage type prefixes
pub const READER_PREFIX: &str = "readers.";
pub const FILTER_PREFIX: &str = "filters.";
pub const WRITER_PREFIX: &str = "writers.";

/// Stage used to restrict each tile to its bounds
pub const CROP_FILTER_TYPE: &str = "filters.crop";

/// Writer compression values that produce LAZ output
pub const LAZ_COMPRESSIONS: &[&str] = &["laszip", "lazperf"];

/// Writer suffix whose output is named `.copc.las`
pub const COPC_SUFFIX: &str = "copc";

/// Extension of temp directory records
pub const RECORD_EXTENSION: &str = "json";

/// Suffix of records still being written
pub const PARTIAL_SUFFIX: &str = "partial";

/// Extension of the buffer flags kept beside a record
pub const BUFFER_STATE_EXTENSION: &str = "buffer";

/// Present in the temp directory while a plan's records are being written
pub const PLAN_MARKER: &str = ".plan-in-progress";

/// Input extensions picked up in directory mode
pub const POINT_CLOUD_EXTENSIONS: &[&str] = &["las", "laz"];

/// Memory diagnostics artifact written to the output directory
pub const MEMORY_USAGE_FILE: &str = "memory-usage.csv";

/// Interval between memory samples (milliseconds)
pub const MEMORY_SAMPLE_INTERVAL_MS: u64 = 500;

/// Poll interval while waiting on a pipeline process (milliseconds)
pub const PROCESS_POLL_INTERVAL_MS: u64 = 50;

/// Default PDAL executable
pub const PDAL_PROGRAM: &str = "pdal";
