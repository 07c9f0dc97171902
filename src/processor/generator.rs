//! Subprocess processor: runs the map generator to rebuild a geometry index.

use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::process::Stdio;

use async_trait::async_trait;
use tokio::process::Command;
use tracing::{debug, info};

use super::{ExternalProcessor, ProcessorError};
use crate::enumerate::MwmUnit;

/// Default scratch directory handed to the generator.
const DEFAULT_INTERMEDIATE_DATA_PATH: &str = "/tmp/";

/// Number of trailing stderr lines kept in a failure reason.
const STDERR_TAIL_LINES: usize = 20;

/// The generator binary invoked once per map file.
#[derive(Debug, Clone)]
pub struct GeneratorTool {
    binary: PathBuf,
    intermediate_data_path: PathBuf,
}

impl GeneratorTool {
    pub fn new(binary: impl Into<PathBuf>) -> Self {
        Self {
            binary: binary.into(),
            intermediate_data_path: PathBuf::from(DEFAULT_INTERMEDIATE_DATA_PATH),
        }
    }

    /// Sets the scratch directory passed as `--intermediate_data_path`.
    pub fn with_intermediate_data_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.intermediate_data_path = path.into();
        self
    }

    /// Generator arguments for one unit.
    pub fn args_for(&self, unit: &MwmUnit) -> Vec<String> {
        vec![
            format!("--data_path={}", unit.dir.display()),
            format!("--output={}", unit.country_name()),
            "--generate_index=true".to_string(),
            format!(
                "--intermediate_data_path={}",
                self.intermediate_data_path.display()
            ),
        ]
    }
}

/// Maps a spawn failure to a processor error. A binary that is missing or
/// not executable means the dependency itself is unavailable.
fn spawn_error(binary: &Path, err: std::io::Error) -> ProcessorError {
    let message = format!("cannot run '{}': {err}", binary.display());
    match err.kind() {
        ErrorKind::NotFound | ErrorKind::PermissionDenied => ProcessorError::Unreachable(message),
        _ => ProcessorError::Failed(message),
    }
}

fn tail_lines(text: &str, max_lines: usize) -> String {
    let lines: Vec<&str> = text.trim_end().lines().collect();
    let start = lines.len().saturating_sub(max_lines);
    lines[start..].join("\n")
}

#[async_trait]
impl ExternalProcessor<MwmUnit> for GeneratorTool {
    async fn process(&self, unit: &MwmUnit) -> Result<Vec<String>, ProcessorError> {
        info!(unit = %unit, "Processing map file");

        let output = Command::new(&self.binary)
            .args(self.args_for(unit))
            .stdin(Stdio::null())
            .stdout(Stdio::inherit())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .output()
            .await
            .map_err(|e| spawn_error(&self.binary, e))?;

        if output.status.success() {
            debug!(unit = %unit, "Generator finished");
            return Ok(Vec::new());
        }

        let stderr = tail_lines(&String::from_utf8_lossy(&output.stderr), STDERR_TAIL_LINES);
        let reason = if stderr.is_empty() {
            format!("'{}' exited with {}", self.binary.display(), output.status)
        } else {
            format!(
                "'{}' exited with {}: {stderr}",
                self.binary.display(),
                output.status
            )
        };
        Err(ProcessorError::Failed(reason))
    }
}

/// A follow-up tool started once the batch has been processed.
///
/// The tool is launched detached; the run does not wait for it.
#[derive(Debug, Clone)]
pub struct DesignerLaunch {
    program: PathBuf,
    args: Vec<String>,
}

impl DesignerLaunch {
    pub fn new(program: impl Into<PathBuf>, args: Vec<String>) -> Self {
        Self {
            program: program.into(),
            args,
        }
    }

    /// Builds a launch from a command line, program first. Returns `None`
    /// for an empty command line.
    pub fn from_command_line(command: &[String]) -> Option<Self> {
        let (program, args) = command.split_first()?;
        Some(Self::new(program, args.to_vec()))
    }

    pub fn program(&self) -> &Path {
        &self.program
    }

    pub fn args(&self) -> &[String] {
        &self.args
    }

    /// Starts the tool and returns its process id without waiting for it.
    pub fn launch(&self) -> std::io::Result<Option<u32>> {
        info!(program = %self.program.display(), "Starting designer tool");
        let child = Command::new(&self.program).args(&self.args).spawn()?;
        Ok(child.id())
    }
}
