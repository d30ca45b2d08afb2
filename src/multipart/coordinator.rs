//! Multipart upload coordinator / 分片上传协调器
//!
//! Design:
//! - parts are dispatched to at most `concurrency` spawned workers
//! - each worker reads its own byte range, no shared cursor
//! - first failure stops dispatch, in-flight workers are drained, session is aborted
//! - complete is sent only with every planned part, ordered by part number

use bytes::Bytes;
use futures::stream::{FuturesUnordered, StreamExt};
use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;

use super::planner::{plan_parts, PartLimits, PartPlan, PartTask, DEFAULT_PART_SIZE};
use super::session::{PartResult, SessionStatus, UploadSession};
use super::source::PartSource;
use crate::error::{OssError, Result};
use crate::storage::{BucketHandle, CompletedPart, ProgressCallback};
use crate::utils::{object_url, validate_object_key};

/// Default number of concurrent part uploads / 默认并发数
pub const DEFAULT_CONCURRENCY: usize = 4;

/// Default retries per part after the first attempt / 默认重试次数
pub const DEFAULT_MAX_RETRIES: u32 = 3;

/// Tuning knobs for one coordinator / 上传参数
#[derive(Debug, Clone)]
pub struct UploadOptions {
    pub preferred_part_size: u64,
    pub concurrency: usize,
    pub max_retries: u32,
    /// First backoff delay, doubled on every retry / 首次重试等待时间
    pub retry_base_delay: Duration,
    /// Deadline of a single upload_part call / 单片上传超时
    pub part_timeout: Duration,
    pub limits: PartLimits,
}

impl Default for UploadOptions {
    fn default() -> Self {
        Self {
            preferred_part_size: DEFAULT_PART_SIZE,
            concurrency: DEFAULT_CONCURRENCY,
            max_retries: DEFAULT_MAX_RETRIES,
            retry_base_delay: Duration::from_millis(200),
            part_timeout: Duration::from_secs(300),
            limits: PartLimits::default(),
        }
    }
}

/// Everything one worker needs / 分片工作者上下文
#[derive(Clone)]
struct PartWorker {
    bucket: Arc<dyn BucketHandle>,
    source: Arc<dyn PartSource>,
    key: Arc<str>,
    upload_id: Arc<str>,
    max_retries: u32,
    retry_base_delay: Duration,
    part_timeout: Duration,
    cancel: CancellationToken,
}

impl PartWorker {
    async fn upload(self, task: PartTask) -> PartResult {
        let data = match self.source.read_range(task.offset, task.length).await {
            Ok(data) => data,
            Err(e) => return PartResult::failed(task.part_number, task.length, e),
        };

        let mut attempt = 0u32;
        loop {
            match self.upload_once(task.part_number, data.clone()).await {
                Ok(etag) => {
                    tracing::debug!(
                        "Part uploaded: key={}, part={}, size={}, attempts={}",
                        self.key,
                        task.part_number,
                        task.length,
                        attempt + 1
                    );
                    return PartResult::uploaded(task.part_number, task.length, etag);
                }
                Err(e) if e.is_retryable() && attempt < self.max_retries && !self.cancel.is_cancelled() => {
                    attempt += 1;
                    let delay = self
                        .retry_base_delay
                        .saturating_mul(1u32 << (attempt - 1).min(16));
                    tracing::warn!(
                        "Part {} of {} failed (attempt {}/{}): {}, retrying in {:?}",
                        task.part_number,
                        self.key,
                        attempt,
                        self.max_retries + 1,
                        e,
                        delay
                    );
                    tokio::select! {
                        _ = self.cancel.cancelled() => {
                            return PartResult::failed(task.part_number, task.length, e);
                        }
                        _ = tokio::time::sleep(delay) => {}
                    }
                }
                Err(e) => return PartResult::failed(task.part_number, task.length, e),
            }
        }
    }

    async fn upload_once(&self, part_number: u32, data: Bytes) -> Result<String> {
        let call = self
            .bucket
            .upload_part(&self.key, &self.upload_id, part_number, data);
        match tokio::time::timeout(self.part_timeout, call).await {
            Ok(result) => result,
            Err(_) => Err(OssError::Timeout {
                operation: "upload_part",
                timeout: self.part_timeout,
            }),
        }
    }
}

/// Multipart upload coordinator / 分片上传协调器
pub struct UploadCoordinator {
    bucket: Arc<dyn BucketHandle>,
    endpoint: String,
    options: UploadOptions,
    progress: Option<ProgressCallback>,
}

impl UploadCoordinator {
    /// `endpoint` is the bare host used in public object URLs / endpoint为公开URL使用的主机名
    pub fn new(bucket: Arc<dyn BucketHandle>, endpoint: impl Into<String>, options: UploadOptions) -> Self {
        Self {
            bucket,
            endpoint: endpoint.into(),
            options,
            progress: None,
        }
    }

    /// Report (completed_bytes, total_bytes) as parts finish / 设置进度回调
    pub fn with_progress(mut self, progress: ProgressCallback) -> Self {
        self.progress = Some(progress);
        self
    }

    pub fn options(&self) -> &UploadOptions {
        &self.options
    }

    pub fn object_url(&self, key: &str) -> String {
        object_url(self.bucket.bucket_name(), &self.endpoint, key)
    }

    /// Plan parts with the configured preferred size / 按配置规划分片
    pub fn plan(&self, total_size: u64) -> Result<PartPlan> {
        plan_parts(total_size, self.options.preferred_part_size, &self.options.limits)
    }

    /// Start a backend session for `key` / 初始化分片上传
    pub async fn initiate(&self, key: &str, plan: &PartPlan) -> Result<UploadSession> {
        validate_object_key(key)?;
        if plan.tasks.is_empty() {
            return Err(OssError::invalid_input("part plan is empty"));
        }

        let upload_id = self.bucket.initiate_multipart_upload(key).await?;
        tracing::info!(
            "Multipart upload started: key={}, upload_id={}, size={}, parts={}x{}",
            key,
            upload_id,
            plan.total_size,
            plan.part_count(),
            plan.part_size
        );
        Ok(UploadSession::new(key, upload_id, plan))
    }

    /// Upload every task with a bounded worker pool / 并发上传所有分片
    ///
    /// Returns results ordered by part number. On the first failed part no new
    /// parts are dispatched, in-flight parts are awaited and discarded, the
    /// session is aborted and `MultipartUploadFailed` is returned.
    pub async fn run(
        &self,
        session: &mut UploadSession,
        source: Arc<dyn PartSource>,
        tasks: &[PartTask],
        concurrency: usize,
    ) -> Result<Vec<PartResult>> {
        if concurrency == 0 {
            return Err(OssError::invalid_input("concurrency must be at least 1"));
        }
        if tasks.is_empty() {
            return Err(OssError::invalid_input("no parts to upload"));
        }
        if let Some(task) = tasks.iter().find(|t| t.end() > source.len()) {
            return Err(OssError::invalid_input(format!(
                "part {} ends at {} but the source has {} bytes",
                task.part_number,
                task.end(),
                source.len()
            )));
        }
        session.transition(SessionStatus::InProgress, "run")?;

        let total_bytes: u64 = tasks.iter().map(|t| t.length).sum();
        let cancel = CancellationToken::new();
        let worker = PartWorker {
            bucket: self.bucket.clone(),
            source,
            key: Arc::from(session.key()),
            upload_id: Arc::from(session.upload_id()),
            max_retries: self.options.max_retries,
            retry_base_delay: self.options.retry_base_delay,
            part_timeout: self.options.part_timeout,
            cancel: cancel.clone(),
        };

        let mut queue = tasks.iter().copied();
        let mut pending = FuturesUnordered::new();
        let mut results: Vec<PartResult> = Vec::with_capacity(tasks.len());
        let mut first_failure: Option<(u32, OssError)> = None;
        let mut completed_bytes = 0u64;

        loop {
            // Fill free worker slots unless a part already failed
            while first_failure.is_none() && pending.len() < concurrency {
                let Some(task) = queue.next() else { break };
                let handle = tokio::spawn(worker.clone().upload(task));
                pending.push(async move {
                    match handle.await {
                        Ok(result) => result,
                        Err(e) => PartResult::failed(
                            task.part_number,
                            task.length,
                            OssError::Internal {
                                message: format!("part worker {} died: {}", task.part_number, e),
                            },
                        ),
                    }
                });
            }

            let Some(result) = pending.next().await else { break };

            if first_failure.is_some() {
                // Draining: result is discarded
                tracing::debug!(
                    "Discarding part {} of {} after earlier failure (success={})",
                    result.part_number,
                    session.key(),
                    result.is_success()
                );
                continue;
            }

            if result.is_success() {
                completed_bytes += result.size;
                if let Some(progress) = &self.progress {
                    progress(completed_bytes, total_bytes);
                }
                results.push(result);
            } else {
                let part_number = result.part_number;
                let error = result.into_error().unwrap_or_else(|| OssError::Internal {
                    message: format!("part {} failed without an error", part_number),
                });
                tracing::warn!(
                    "Part {} of {} failed, cancelling remaining parts: {}",
                    part_number,
                    session.key(),
                    error
                );
                cancel.cancel();
                first_failure = Some((part_number, error));
            }
        }

        if let Some((part_number, error)) = first_failure {
            if let Err(abort_err) = self.abort(session).await {
                tracing::warn!(
                    "Abort after failed part left upload {} behind: {}",
                    session.upload_id(),
                    abort_err
                );
            }
            return Err(OssError::MultipartUploadFailed {
                key: session.key().to_string(),
                part_number,
                source: Box::new(error),
            });
        }

        results.sort_by_key(|r| r.part_number);
        Ok(results)
    }

    /// Complete the upload and return the public URL / 完成分片上传并返回URL
    pub async fn finalize(&self, session: &mut UploadSession, results: &[PartResult]) -> Result<String> {
        session.ensure_can(SessionStatus::Completed, "finalize")?;
        let parts = ordered_parts(session, results)?;

        self.bucket
            .complete_multipart_upload(session.key(), session.upload_id(), parts)
            .await?;
        session.transition(SessionStatus::Completed, "finalize")?;

        tracing::info!(
            "Multipart upload completed: key={}, upload_id={}",
            session.key(),
            session.upload_id()
        );
        Ok(self.object_url(session.key()))
    }

    /// Abort the session; repeated calls succeed / 取消分片上传（幂等）
    pub async fn abort(&self, session: &mut UploadSession) -> Result<()> {
        if session.status() == SessionStatus::Aborted {
            tracing::debug!("Upload {} already aborted", session.upload_id());
            return Ok(());
        }
        session.ensure_can(SessionStatus::Aborted, "abort")?;

        match self
            .bucket
            .abort_multipart_upload(session.key(), session.upload_id())
            .await
        {
            Ok(()) => {}
            Err(OssError::UploadNotFound { upload_id }) => {
                tracing::debug!("Upload {} unknown to backend, treating as aborted", upload_id);
            }
            Err(e) => return Err(e),
        }

        session.transition(SessionStatus::Aborted, "abort")?;
        tracing::warn!(
            "Multipart upload aborted: key={}, upload_id={}",
            session.key(),
            session.upload_id()
        );
        Ok(())
    }

    /// Plan, initiate, run and finalize in one call / 一次完成整个分片上传
    pub async fn upload(&self, key: &str, source: Arc<dyn PartSource>) -> Result<String> {
        let plan = self.plan(source.len())?;
        let mut session = self.initiate(key, &plan).await?;
        let results = self
            .run(&mut session, source, &plan.tasks, self.options.concurrency)
            .await?;

        match self.finalize(&mut session, &results).await {
            Ok(url) => Ok(url),
            Err(e) => {
                if let Err(abort_err) = self.abort(&mut session).await {
                    tracing::warn!("Abort after failed finalize failed: {}", abort_err);
                }
                Err(e)
            }
        }
    }
}

/// Check completeness and build the ordered part list / 校验并排序分片
fn ordered_parts(session: &UploadSession, results: &[PartResult]) -> Result<Vec<CompletedPart>> {
    let expected = session.part_count();
    let mut parts: BTreeMap<u32, &str> = BTreeMap::new();
    let mut duplicated = Vec::new();
    let mut failed = Vec::new();
    let mut unexpected = Vec::new();

    for result in results {
        let number = result.part_number;
        if number == 0 || number > expected {
            unexpected.push(number);
            continue;
        }
        match result.etag() {
            Some(etag) => {
                if parts.insert(number, etag).is_some() {
                    duplicated.push(number);
                }
            }
            None => failed.push(number),
        }
    }

    let missing: Vec<u32> = (1..=expected)
        .filter(|n| !parts.contains_key(n) && !failed.contains(n))
        .collect();

    if !missing.is_empty() || !duplicated.is_empty() || !failed.is_empty() || !unexpected.is_empty() {
        return Err(OssError::IncompleteUpload {
            key: session.key().to_string(),
            missing,
            duplicated,
            failed,
            unexpected,
        });
    }

    Ok(parts
        .into_iter()
        .map(|(part_number, etag)| CompletedPart {
            part_number,
            etag: etag.to_string(),
        })
        .collect())
}
