//! Re-reads artifacts already on disk without invoking the optimizer.

use super::{classify_artifact, ArtifactFiles, SolveOutcome, SolveRequest, Solver};
use crate::cancellation::CancellationToken;
use crate::errors::{FailureKind, StageFailure};
use async_trait::async_trait;
use tracing::debug;

/// Classifies each stage's existing artifact.
///
/// Refuses to replay when the rebuilt specification differs from the one
/// the artifact was produced from.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ReplaySolver {
    files: ArtifactFiles,
}

impl ReplaySolver {
    /// Creates a replay solver for the given artifact file names.
    #[must_use]
    pub fn new(files: ArtifactFiles) -> Self {
        Self { files }
    }
}

#[async_trait]
impl Solver for ReplaySolver {
    async fn solve(&self, request: &SolveRequest, _cancel: &CancellationToken) -> SolveOutcome {
        match request.previous_specification_hash.as_deref() {
            Some(stored) if stored == request.specification_hash => {
                debug!(stage = request.stage_index, "Replaying stored artifact");
                classify_artifact(&request.output_dir, &self.files)
            }
            Some(stored) => SolveOutcome::Error(StageFailure::new(
                FailureKind::ReplayMismatch,
                format!(
                    "stage {} specification changed since its artifact was produced ({stored} != {})",
                    request.stage_index, request.specification_hash
                ),
            )),
            None => SolveOutcome::Error(StageFailure::new(
                FailureKind::ReplayMismatch,
                format!("stage {} has no stored specification hash", request.stage_index),
            )),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::ArtifactFixture;
    use std::time::Duration;

    fn request(dir: &std::path::Path, stored: Option<&str>) -> SolveRequest {
        SolveRequest {
            stage_index: 0,
            year: 2025,
            specification_path: dir.join("specification.csv"),
            output_dir: dir.join("output"),
            specification_hash: "abc".to_string(),
            previous_specification_hash: stored.map(str::to_string),
            timeout: Duration::from_secs(1),
        }
    }

    #[tokio::test]
    async fn test_matching_hash_replays() {
        let dir = tempfile::tempdir().unwrap();
        ArtifactFixture::solved()
            .write_to(&dir.path().join("output"), &ArtifactFiles::default())
            .unwrap();

        let outcome = ReplaySolver::default()
            .solve(&request(dir.path(), Some("abc")), &CancellationToken::new())
            .await;
        assert!(matches!(outcome, SolveOutcome::Solved(_)));
    }

    #[tokio::test]
    async fn test_changed_specification_refused() {
        let dir = tempfile::tempdir().unwrap();
        let outcome = ReplaySolver::default()
            .solve(&request(dir.path(), Some("def")), &CancellationToken::new())
            .await;
        assert!(matches!(outcome, SolveOutcome::Error(f) if f.kind == FailureKind::ReplayMismatch));
    }

    #[tokio::test]
    async fn test_missing_hash_refused() {
        let dir = tempfile::tempdir().unwrap();
        let outcome = ReplaySolver::default()
            .solve(&request(dir.path(), None), &CancellationToken::new())
            .await;
        assert!(matches!(outcome, SolveOutcome::Error(f) if f.kind == FailureKind::ReplayMismatch));
    }
}
