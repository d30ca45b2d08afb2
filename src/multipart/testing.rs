//! In-memory bucket for tests / 测试用内存存储桶

use async_trait::async_trait;
use bytes::{Bytes, BytesMut};
use parking_lot::Mutex;
use std::collections::{BTreeMap, HashMap, HashSet};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use crate::error::{OssError, Result};
use crate::storage::{BucketHandle, CompletedPart};

#[derive(Default)]
struct State {
    next_upload: u32,
    open: HashMap<String, BTreeMap<u32, Bytes>>,
    aborted: HashSet<String>,
    objects: HashMap<String, Bytes>,
    /// part_number -> remaining failures (usize::MAX = always)
    failures: HashMap<u32, usize>,
    /// parts answered with CredentialExpired
    expired: HashSet<u32>,
    delays: HashMap<u32, Duration>,
    part_attempts: HashMap<u32, usize>,
    completed: Vec<(String, Vec<CompletedPart>)>,
    abort_calls: usize,
    fail_abort: bool,
}

/// Recording bucket with failure injection / 带故障注入的记录型存储桶
pub struct MemoryBucket {
    name: String,
    state: Mutex<State>,
    in_flight: AtomicUsize,
    max_in_flight: AtomicUsize,
}

impl MemoryBucket {
    pub fn new(name: &str) -> Self {
        Self {
            name: name.to_string(),
            state: Mutex::new(State::default()),
            in_flight: AtomicUsize::new(0),
            max_in_flight: AtomicUsize::new(0),
        }
    }

    /// Part fails `times` times before succeeding / 注入分片失败
    pub fn fail_part(&self, part_number: u32, times: usize) {
        self.state.lock().failures.insert(part_number, times);
    }

    pub fn fail_part_always(&self, part_number: u32) {
        self.fail_part(part_number, usize::MAX);
    }

    /// Part is rejected as if the security token had expired / 注入凭证过期
    pub fn expire_credentials_on(&self, part_number: u32) {
        self.state.lock().expired.insert(part_number);
    }

    pub fn delay_part(&self, part_number: u32, delay: Duration) {
        self.state.lock().delays.insert(part_number, delay);
    }

    pub fn fail_abort(&self) {
        self.state.lock().fail_abort = true;
    }

    pub fn insert_object(&self, key: &str, data: impl Into<Bytes>) {
        self.state.lock().objects.insert(key.to_string(), data.into());
    }

    pub fn object(&self, key: &str) -> Option<Bytes> {
        self.state.lock().objects.get(key).cloned()
    }

    pub fn complete_calls(&self) -> Vec<(String, Vec<CompletedPart>)> {
        self.state.lock().completed.clone()
    }

    pub fn abort_calls(&self) -> usize {
        self.state.lock().abort_calls
    }

    pub fn is_aborted(&self, upload_id: &str) -> bool {
        self.state.lock().aborted.contains(upload_id)
    }

    pub fn attempts(&self, part_number: u32) -> usize {
        self.state.lock().part_attempts.get(&part_number).copied().unwrap_or(0)
    }

    pub fn uploaded_parts(&self, upload_id: &str) -> Vec<u32> {
        self.state
            .lock()
            .open
            .get(upload_id)
            .map(|parts| parts.keys().copied().collect())
            .unwrap_or_default()
    }

    pub fn max_in_flight(&self) -> usize {
        self.max_in_flight.load(Ordering::SeqCst)
    }
}

fn etag_for(part_number: u32, data: &Bytes) -> String {
    format!("etag-{}-{}", part_number, data.len())
}

#[async_trait]
impl BucketHandle for MemoryBucket {
    fn bucket_name(&self) -> &str {
        &self.name
    }

    async fn initiate_multipart_upload(&self, _key: &str) -> Result<String> {
        let mut state = self.state.lock();
        state.next_upload += 1;
        let upload_id = format!("upload-{}", state.next_upload);
        state.open.insert(upload_id.clone(), BTreeMap::new());
        Ok(upload_id)
    }

    async fn upload_part(
        &self,
        _key: &str,
        upload_id: &str,
        part_number: u32,
        data: Bytes,
    ) -> Result<String> {
        let current = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.max_in_flight.fetch_max(current, Ordering::SeqCst);

        let delay = {
            let mut state = self.state.lock();
            *state.part_attempts.entry(part_number).or_insert(0) += 1;
            state.delays.get(&part_number).copied()
        };
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }

        let result = {
            let mut state = self.state.lock();
            let inject = match state.failures.get_mut(&part_number) {
                Some(remaining) if *remaining > 0 => {
                    if *remaining != usize::MAX {
                        *remaining -= 1;
                    }
                    true
                }
                _ => false,
            };
            if state.expired.contains(&part_number) {
                Err(OssError::CredentialExpired {
                    reason: format!("SecurityTokenExpired on part {}", part_number),
                })
            } else if inject {
                Err(OssError::backend("upload_part", format!("injected failure on part {}", part_number)))
            } else {
                match state.open.get_mut(upload_id) {
                    Some(parts) => {
                        let etag = etag_for(part_number, &data);
                        parts.insert(part_number, data);
                        Ok(etag)
                    }
                    None => Err(OssError::UploadNotFound {
                        upload_id: upload_id.to_string(),
                    }),
                }
            }
        };

        self.in_flight.fetch_sub(1, Ordering::SeqCst);
        result
    }

    async fn complete_multipart_upload(
        &self,
        key: &str,
        upload_id: &str,
        parts: Vec<CompletedPart>,
    ) -> Result<()> {
        let mut state = self.state.lock();
        state.completed.push((key.to_string(), parts.clone()));
        let stored = state.open.remove(upload_id).ok_or_else(|| OssError::UploadNotFound {
            upload_id: upload_id.to_string(),
        })?;

        let mut object = BytesMut::new();
        for part in &parts {
            let data = stored.get(&part.part_number).ok_or_else(|| {
                OssError::backend("complete_multipart_upload", format!("part {} was never uploaded", part.part_number))
            })?;
            if etag_for(part.part_number, data) != part.etag {
                return Err(OssError::backend("complete_multipart_upload", "etag mismatch"));
            }
            object.extend_from_slice(data);
        }
        state.objects.insert(key.to_string(), object.freeze());
        Ok(())
    }

    async fn abort_multipart_upload(&self, _key: &str, upload_id: &str) -> Result<()> {
        let mut state = self.state.lock();
        state.abort_calls += 1;
        if state.fail_abort {
            return Err(OssError::backend("abort_multipart_upload", "injected abort failure"));
        }
        if state.open.remove(upload_id).is_some() {
            state.aborted.insert(upload_id.to_string());
            Ok(())
        } else {
            Err(OssError::UploadNotFound {
                upload_id: upload_id.to_string(),
            })
        }
    }

    async fn get_object(&self, key: &str) -> Result<Bytes> {
        self.object(key).ok_or_else(|| OssError::ObjectNotFound {
            key: key.to_string(),
        })
    }

    async fn put_object(&self, key: &str, data: Bytes) -> Result<()> {
        self.insert_object(key, data);
        Ok(())
    }

    async fn delete_object(&self, key: &str) -> Result<()> {
        self.state.lock().objects.remove(key);
        Ok(())
    }
}
