//! Solver that runs the optimizer as an external process.

use super::{classify_artifact, ArtifactFiles, SolveOutcome, SolveRequest, Solver};
use crate::cancellation::CancellationToken;
use crate::config::SolverConfig;
use crate::errors::{FailureKind, StageFailure};
use async_trait::async_trait;
use std::collections::BTreeMap;
use std::path::PathBuf;
use std::process::Stdio;
use tokio::process::Command;
use tracing::{debug, warn};

const STDERR_TAIL: usize = 2000;

/// Runs a configured program once per stage.
///
/// Arguments may contain `{specification}`, `{output}`, `{stage}` and
/// `{year}`. The child is killed when the solve future is dropped, which is
/// how timeouts and cancellation reach the process.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProcessSolver {
    program: String,
    args: Vec<String>,
    working_dir: Option<PathBuf>,
    env: BTreeMap<String, String>,
    files: ArtifactFiles,
}

impl ProcessSolver {
    /// Creates a solver for `program` with no arguments.
    #[must_use]
    pub fn new(program: impl Into<String>) -> Self {
        Self {
            program: program.into(),
            args: Vec::new(),
            working_dir: None,
            env: BTreeMap::new(),
            files: ArtifactFiles::default(),
        }
    }

    /// Creates a solver from configuration.
    #[must_use]
    pub fn from_config(config: &SolverConfig) -> Self {
        Self {
            program: config.program.clone(),
            args: config.args.clone(),
            working_dir: config.working_dir.clone(),
            env: config.env.clone(),
            files: ArtifactFiles::from_config(config),
        }
    }

    /// Sets the argument templates.
    #[must_use]
    pub fn with_args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.args = args.into_iter().map(Into::into).collect();
        self
    }

    /// Sets the artifact file names.
    #[must_use]
    pub fn with_files(mut self, files: ArtifactFiles) -> Self {
        self.files = files;
        self
    }

    /// Arguments with placeholders substituted for `request`.
    #[must_use]
    pub fn render_args(&self, request: &SolveRequest) -> Vec<String> {
        let specification = request.specification_path.display().to_string();
        let output = request.output_dir.display().to_string();
        let stage = request.stage_index.to_string();
        let year = request.year.to_string();
        self.args
            .iter()
            .map(|arg| {
                arg.replace("{specification}", &specification)
                    .replace("{output}", &output)
                    .replace("{stage}", &stage)
                    .replace("{year}", &year)
            })
            .collect()
    }
}

fn tail(bytes: &[u8]) -> String {
    let text = String::from_utf8_lossy(bytes);
    let text = text.trim();
    let start = text
        .char_indices()
        .rev()
        .nth(STDERR_TAIL)
        .map_or(0, |(i, _)| i);
    text[start..].to_string()
}

#[async_trait]
impl Solver for ProcessSolver {
    async fn solve(&self, request: &SolveRequest, cancel: &CancellationToken) -> SolveOutcome {
        if self.program.is_empty() {
            return SolveOutcome::Error(StageFailure::new(
                FailureKind::SolverCrash,
                "no solver program configured",
            ));
        }

        let mut command = Command::new(&self.program);
        command
            .args(self.render_args(request))
            .envs(&self.env)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);
        if let Some(dir) = &self.working_dir {
            command.current_dir(dir);
        }

        let child = match command.spawn() {
            Ok(child) => child,
            Err(e) => {
                return SolveOutcome::Error(StageFailure::new(
                    FailureKind::SolverCrash,
                    format!("failed to start '{}': {e}", self.program),
                ))
            }
        };
        debug!(
            stage = request.stage_index,
            pid = child.id(),
            program = %self.program,
            "Spawned solver process"
        );

        let output = tokio::select! {
            biased;
            () = cancel.cancelled() => {
                warn!(stage = request.stage_index, "Killing solver process on cancellation");
                return SolveOutcome::Error(StageFailure::cancelled(
                    cancel.reason().unwrap_or_else(|| "solve cancelled".to_string()),
                ));
            }
            output = child.wait_with_output() => output,
        };

        let output = match output {
            Ok(output) => output,
            Err(e) => {
                return SolveOutcome::Error(StageFailure::new(
                    FailureKind::SolverCrash,
                    format!("failed to wait for solver: {e}"),
                ))
            }
        };

        if output.status.success() && !request.output_dir.join(&self.files.status).is_file() {
            return SolveOutcome::Error(StageFailure::new(
                FailureKind::SolverCrash,
                format!(
                    "solver exited cleanly without writing {} to {}",
                    self.files.status,
                    request.output_dir.display()
                ),
            ));
        }

        let outcome = classify_artifact(&request.output_dir, &self.files);
        if output.status.success() {
            return outcome;
        }
        // An explicit infeasible status wins over the exit code.
        if matches!(outcome, SolveOutcome::Infeasible { .. }) {
            return outcome;
        }
        SolveOutcome::Error(StageFailure::new(
            FailureKind::SolverCrash,
            format!(
                "solver exited with {}: {}",
                output.status,
                tail(&output.stderr)
            ),
        ))
    }
}
