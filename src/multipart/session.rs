//! Upload session and part results / 上传会话与分片结果

use std::fmt;

use super::planner::PartPlan;
use crate::error::{OssError, Result};

/// Session status / 会话状态
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionStatus {
    Initiated,
    InProgress,
    Completed,
    Aborted,
}

impl SessionStatus {
    /// Completed and Aborted are final / 终态
    pub fn is_terminal(self) -> bool {
        matches!(self, SessionStatus::Completed | SessionStatus::Aborted)
    }

    pub fn can_transition_to(self, next: SessionStatus) -> bool {
        use SessionStatus::*;
        matches!(
            (self, next),
            (Initiated, InProgress) | (Initiated, Aborted) | (InProgress, Completed) | (InProgress, Aborted)
        )
    }
}

impl fmt::Display for SessionStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            SessionStatus::Initiated => "initiated",
            SessionStatus::InProgress => "in_progress",
            SessionStatus::Completed => "completed",
            SessionStatus::Aborted => "aborted",
        };
        f.write_str(s)
    }
}

/// One backend multipart upload / 一次分片上传会话
#[derive(Debug, Clone)]
pub struct UploadSession {
    key: String,
    upload_id: String,
    total_size: u64,
    part_size: u64,
    part_count: u32,
    status: SessionStatus,
}

impl UploadSession {
    pub(crate) fn new(key: &str, upload_id: String, plan: &PartPlan) -> Self {
        Self {
            key: key.to_string(),
            upload_id,
            total_size: plan.total_size,
            part_size: plan.part_size,
            part_count: plan.part_count(),
            status: SessionStatus::Initiated,
        }
    }

    pub fn key(&self) -> &str {
        &self.key
    }

    /// Upload id issued by the bucket / 上传ID
    pub fn upload_id(&self) -> &str {
        &self.upload_id
    }

    pub fn total_size(&self) -> u64 {
        self.total_size
    }

    pub fn part_size(&self) -> u64 {
        self.part_size
    }

    pub fn part_count(&self) -> u32 {
        self.part_count
    }

    pub fn status(&self) -> SessionStatus {
        self.status
    }

    /// Fails with `InvalidState` unless `next` is reachable / 检查状态转换
    pub(crate) fn ensure_can(&self, next: SessionStatus, action: &'static str) -> Result<()> {
        if self.status.can_transition_to(next) {
            Ok(())
        } else {
            Err(OssError::InvalidState {
                upload_id: self.upload_id.clone(),
                status: self.status,
                action,
            })
        }
    }

    pub(crate) fn transition(&mut self, next: SessionStatus, action: &'static str) -> Result<()> {
        self.ensure_can(next, action)?;
        tracing::debug!(
            "Upload session {} ({}): {} -> {}",
            self.upload_id,
            self.key,
            self.status,
            next
        );
        self.status = next;
        Ok(())
    }
}

/// Outcome of one part / 分片结果
#[derive(Debug)]
pub enum PartOutcome {
    Uploaded { etag: String },
    Failed { error: OssError },
}

/// Result of uploading one part / 分片上传结果
#[derive(Debug)]
pub struct PartResult {
    pub part_number: u32,
    pub size: u64,
    pub outcome: PartOutcome,
}

impl PartResult {
    pub fn uploaded(part_number: u32, size: u64, etag: String) -> Self {
        Self {
            part_number,
            size,
            outcome: PartOutcome::Uploaded { etag },
        }
    }

    pub fn failed(part_number: u32, size: u64, error: OssError) -> Self {
        Self {
            part_number,
            size,
            outcome: PartOutcome::Failed { error },
        }
    }

    pub fn is_success(&self) -> bool {
        matches!(self.outcome, PartOutcome::Uploaded { .. })
    }

    pub fn etag(&self) -> Option<&str> {
        match &self.outcome {
            PartOutcome::Uploaded { etag } => Some(etag),
            PartOutcome::Failed { .. } => None,
        }
    }

    pub fn error(&self) -> Option<&OssError> {
        match &self.outcome {
            PartOutcome::Uploaded { .. } => None,
            PartOutcome::Failed { error } => Some(error),
        }
    }

    pub(crate) fn into_error(self) -> Option<OssError> {
        match self.outcome {
            PartOutcome::Uploaded { .. } => None,
            PartOutcome::Failed { error } => Some(error),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::multipart::planner::{plan_parts, PartLimits};

    #[test]
    fn test_state_machine() {
        use SessionStatus::*;
        assert!(Initiated.can_transition_to(InProgress));
        assert!(Initiated.can_transition_to(Aborted));
        assert!(InProgress.can_transition_to(Completed));
        assert!(InProgress.can_transition_to(Aborted));
        assert!(!Initiated.can_transition_to(Completed));
        assert!(!InProgress.can_transition_to(InProgress));
        for terminal in [Completed, Aborted] {
            assert!(terminal.is_terminal());
            for next in [Initiated, InProgress, Completed, Aborted] {
                assert!(!terminal.can_transition_to(next));
            }
        }
    }

    #[test]
    fn test_session_transition_errors() {
        let plan = plan_parts(1024, 1024, &PartLimits::default()).unwrap();
        let mut session = UploadSession::new("a.txt", "upload-1".to_string(), &plan);
        assert_eq!(session.status(), SessionStatus::Initiated);
        assert_eq!(session.part_count(), 1);

        session.transition(SessionStatus::InProgress, "run").unwrap();
        session.transition(SessionStatus::Completed, "finalize").unwrap();

        let err = session.transition(SessionStatus::Aborted, "abort").unwrap_err();
        assert!(matches!(
            err,
            OssError::InvalidState { status: SessionStatus::Completed, action: "abort", .. }
        ));
    }

    #[test]
    fn test_part_result_accessors() {
        let ok = PartResult::uploaded(1, 10, "etag-1".to_string());
        assert!(ok.is_success());
        assert_eq!(ok.etag(), Some("etag-1"));
        assert!(ok.error().is_none());

        let failed = PartResult::failed(2, 10, OssError::backend("upload_part", "boom"));
        assert!(!failed.is_success());
        assert!(failed.etag().is_none());
        assert!(failed.into_error().is_some());
    }
}
