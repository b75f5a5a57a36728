/// Pipeline execution boundary and the PDAL command line engine.
use crate::constants::{PDAL_PROGRAM, PROCESS_POLL_INTERVAL_MS};
use crate::error::{Error, Result};
use crate::pipeline::ResolvedPipeline;
use std::io::{Read, Write};
use std::path::PathBuf;
use std::process::{Command, Stdio};
use std::thread;
use std::time::{Duration, Instant};

/// Runs one resolved pipeline to completion. Only success or failure matters.
pub trait PipelineEngine: Send + Sync {
    fn execute(&self, task: &str, pipeline: &ResolvedPipeline) -> Result<()>;
}

/// Executes pipelines with `pdal pipeline --stdin`.
#[derive(Debug, Clone)]
pub struct PdalCli {
    program: PathBuf,
    timeout: Option<Duration>,
}

impl Default for PdalCli {
    fn default() -> Self {
        Self::new(PDAL_PROGRAM)
    }
}

impl PdalCli {
    pub fn new(program: impl Into<PathBuf>) -> Self {
        Self {
            program: program.into(),
            timeout: None,
        }
    }

    /// Kill pipelines running longer than `timeout`
    pub fn with_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.timeout = timeout;
        self
    }

    /// Check the executable is callable before any work is submitted
    pub fn probe(&self) -> Result<String> {
        let output = Command::new(&self.program)
            .arg("--version")
            .stdin(Stdio::null())
            .output()
            .map_err(|e| {
                Error::Scheduler(format!(
                    "cannot run `{}`: {}",
                    self.program.display(),
                    e
                ))
            })?;

        if !output.status.success() {
            return Err(Error::Scheduler(format!(
                "`{} --version` exited with {}",
                self.program.display(),
                output.status
            )));
        }

        let version = String::from_utf8_lossy(&output.stdout)
            .lines()
            .find(|l| !l.trim().is_empty() && !l.starts_with('-'))
            .unwrap_or_default()
            .trim()
            .to_string();
        Ok(version)
    }
}

impl PipelineEngine for PdalCli {
    fn execute(&self, task: &str, pipeline: &ResolvedPipeline) -> Result<()> {
        let failure = |message: String| Error::Execution {
            task: task.to_string(),
            message,
        };

        let json = pipeline.to_json()?;
        let mut child = Command::new(&self.program)
            .args(["pipeline", "--stdin"])
            .stdin(Stdio::piped())
            .stdout(Stdio::null())
            .stderr(Stdio::piped())
            .spawn()
            .map_err(|e| failure(format!("spawn failed: {}", e)))?;

        if let Some(mut stdin) = child.stdin.take() {
            if let Err(e) = stdin.write_all(json.as_bytes()) {
                let _ = child.kill();
                let _ = child.wait();
                return Err(failure(format!("writing pipeline failed: {}", e)));
            }
        }

        // Drain stderr on its own thread so a chatty pipeline cannot block.
        let stderr = child.stderr.take();
        let stderr_reader = thread::spawn(move || {
            let mut text = String::new();
            if let Some(mut stderr) = stderr {
                let _ = stderr.read_to_string(&mut text);
            }
            text
        });

        let started = Instant::now();
        let status = loop {
            match child.try_wait() {
                Ok(Some(status)) => break status,
                Ok(None) => {}
                Err(e) => return Err(failure(format!("wait failed: {}", e))),
            }

            if let Some(timeout) = self.timeout {
                if started.elapsed() > timeout {
                    let _ = child.kill();
                    let _ = child.wait();
                    return Err(failure(format!("timed out after {:?}", timeout)));
                }
            }
            thread::sleep(Duration::from_millis(PROCESS_POLL_INTERVAL_MS));
        };

        let stderr = stderr_reader.join().unwrap_or_default();
        if status.success() {
            log::debug!("{} finished in {:.1?}", task, started.elapsed());
            Ok(())
        } else {
            Err(failure(format!("{}: {}", status, stderr.trim())))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn probe_missing_program_is_scheduler_error() {
        let engine = PdalCli::new("/nonexistent/pdal-binary");
        assert!(matches!(engine.probe(), Err(Error::Scheduler(_))));
    }

    #[test]
    fn execute_missing_program_is_execution_error() {
        let pipeline = ResolvedPipeline::from_json(
            r#"{"pipeline": [{"type": "readers.las"}, {"type": "writers.las"}]}"#,
        )
        .unwrap();
        let err = PdalCli::new("/nonexistent/pdal-binary")
            .execute("0_0", &pipeline)
            .unwrap_err();
        match err {
            Error::Execution { task, .. } => assert_eq!(task, "0_0"),
            other => panic!("unexpected error: {other}"),
        }
    }

    #[cfg(unix)]
    #[test]
    fn pipeline_rejected_on_stdin_fails_without_hanging() {
        // Larger than a pipe buffer, so the write outlives `true`.
        let filename = "x".repeat(256 * 1024);
        let pipeline = ResolvedPipeline::from_json(&format!(
            r#"{{"pipeline": [{{"type": "readers.las", "filename": "{}"}}, {{"type": "writers.las"}}]}}"#,
            filename
        ))
        .unwrap();

        let err = PdalCli::new("true")
            .with_timeout(Some(Duration::from_secs(5)))
            .execute("0_0", &pipeline)
            .unwrap_err();
        match err {
            Error::Execution { message, .. } => {
                assert!(message.contains("writing pipeline failed"), "{message}")
            }
            other => panic!("unexpected error: {other}"),
        }
    }
}
