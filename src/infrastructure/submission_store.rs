//! 提交记录存储 - 基础设施层
//!
//! 多个提交的流水线之间唯一的共享点

use async_trait::async_trait;
use std::collections::HashMap;
use tokio::sync::RwLock;
use tracing::debug;

use crate::error::{ErrorCode, StoreError};
use crate::models::{Submission, SubmissionStatus};

/// 提交记录存储能力
#[async_trait]
pub trait SubmissionStore: Send + Sync {
    async fn get(&self, id: &str) -> Result<Submission, StoreError>;

    async fn update_status(&self, id: &str, status: SubmissionStatus) -> Result<(), StoreError>;

    /// 标记完成并记录最终输出引用
    async fn complete(&self, id: &str, output_ref: Option<String>) -> Result<(), StoreError>;

    /// 标记失败并记录错误
    async fn fail(&self, id: &str, code: ErrorCode, message: &str) -> Result<(), StoreError>;
}

/// 内存中的提交记录存储
#[derive(Default)]
pub struct InMemorySubmissionStore {
    records: RwLock<HashMap<String, Submission>>,
}

impl InMemorySubmissionStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn insert(&self, submission: Submission) {
        self.records
            .write()
            .await
            .insert(submission.id.clone(), submission);
    }

    pub async fn all(&self) -> Vec<Submission> {
        let mut all: Vec<Submission> = self.records.read().await.values().cloned().collect();
        all.sort_by(|a, b| a.id.cmp(&b.id));
        all
    }

    async fn transition(
        &self,
        id: &str,
        next: SubmissionStatus,
        apply: impl FnOnce(&mut Submission) + Send,
    ) -> Result<(), StoreError> {
        let mut records = self.records.write().await;
        let record = records
            .get_mut(id)
            .ok_or_else(|| StoreError::SubmissionNotFound(id.to_string()))?;

        if !record.status.can_transition_to(next) {
            return Err(StoreError::InvalidTransition {
                id: id.to_string(),
                from: record.status.to_string(),
                to: next.to_string(),
            });
        }

        debug!("[提交 {}] 状态 {} → {}", id, record.status, next);
        record.status = next;
        apply(record);
        Ok(())
    }
}

#[async_trait]
impl SubmissionStore for InMemorySubmissionStore {
    async fn get(&self, id: &str) -> Result<Submission, StoreError> {
        self.records
            .read()
            .await
            .get(id)
            .cloned()
            .ok_or_else(|| StoreError::SubmissionNotFound(id.to_string()))
    }

    async fn update_status(&self, id: &str, status: SubmissionStatus) -> Result<(), StoreError> {
        self.transition(id, status, |_| {}).await
    }

    async fn complete(&self, id: &str, output_ref: Option<String>) -> Result<(), StoreError> {
        self.transition(id, SubmissionStatus::Completed, move |record| {
            record.output_ref = output_ref;
        })
        .await
    }

    async fn fail(&self, id: &str, code: ErrorCode, message: &str) -> Result<(), StoreError> {
        let message = message.to_string();
        self.transition(id, SubmissionStatus::Failed, move |record| {
            record.error_code = Some(code);
            record.error_message = Some(message);
        })
        .await
    }
}
