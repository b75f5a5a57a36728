/// Memory sampling around the execution phase.
///
/// Samples resident memory of this process and its live child processes
/// (the pipeline engines) and writes them as CSV for plotting.
use crate::error::{Error, Result};
use std::fmt::Write as _;
use std::fs;
use std::path::Path;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct MemorySample {
    pub elapsed: Duration,
    pub rss_bytes: u64,
}

/// Scoped sampling session. Stopped and written by [`MemorySampler::finish`].
pub struct MemorySampler {
    label: String,
    stop: Arc<AtomicBool>,
    handle: JoinHandle<Vec<MemorySample>>,
}

impl MemorySampler {
    pub fn start(label: &str, interval: Duration) -> Self {
        let stop = Arc::new(AtomicBool::new(false));
        let flag = Arc::clone(&stop);

        let handle = thread::spawn(move || {
            let started = Instant::now();
            let mut samples = Vec::new();
            let mut warned = false;
            loop {
                let rss_bytes = match resident_bytes() {
                    Some(bytes) => bytes,
                    None => {
                        if !warned {
                            log::warn!("Resident memory is not readable on this platform");
                            warned = true;
                        }
                        0
                    }
                };
                samples.push(MemorySample {
                    elapsed: started.elapsed(),
                    rss_bytes,
                });

                if flag.load(Ordering::Relaxed) {
                    break;
                }
                thread::sleep(interval);
            }
            samples
        });

        Self {
            label: label.to_string(),
            stop,
            handle,
        }
    }

    /// Stop sampling and write `label,elapsed_secs,rss_bytes` rows to `path`
    pub fn finish(self, path: &Path) -> Result<Vec<MemorySample>> {
        self.stop.store(true, Ordering::Relaxed);
        let samples = self
            .handle
            .join()
            .map_err(|_| Error::Scheduler("memory sampler thread panicked".to_string()))?;

        fs::write(path, to_csv(&self.label, &samples)).map_err(|e| Error::io(path, e))?;
        let peak = samples.iter().map(|s| s.rss_bytes).max().unwrap_or(0);
        log::info!(
            "Memory usage ({} samples, peak {:.1} MiB) saved to {}",
            samples.len(),
            peak as f64 / (1024.0 * 1024.0),
            path.display()
        );
        Ok(samples)
    }
}

fn to_csv(label: &str, samples: &[MemorySample]) -> String {
    let mut out = String::from("label,elapsed_secs,rss_bytes\n");
    for sample in samples {
        let _ = writeln!(
            out,
            "{},{:.3},{}",
            label,
            sample.elapsed.as_secs_f64(),
            sample.rss_bytes
        );
    }
    out
}

/// `VmRSS` of a `/proc/<pid>/status` document, in bytes
fn parse_vm_rss(status: &str) -> Option<u64> {
    let line = status.lines().find(|l| l.starts_with("VmRSS:"))?;
    let kib: u64 = line.split_whitespace().nth(1)?.parse().ok()?;
    Some(kib * 1024)
}

fn process_rss(pid: &str) -> Option<u64> {
    fs::read_to_string(format!("/proc/{}/status", pid))
        .ok()
        .and_then(|s| parse_vm_rss(&s))
}

/// Resident memory of this process plus its direct children
fn resident_bytes() -> Option<u64> {
    let mut total = process_rss("self")?;

    if let Ok(tasks) = fs::read_dir("/proc/self/task") {
        for task in tasks.flatten() {
            let Ok(children) = fs::read_to_string(task.path().join("children")) else {
                continue;
            };
            for pid in children.split_whitespace() {
                total += process_rss(pid).unwrap_or(0);
            }
        }
    }
    Some(total)
}
