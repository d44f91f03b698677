use serde::{Deserialize, Serialize};
use std::fmt;

use super::context::ContextValue;

/// 一次参与者提交
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Submission {
    pub id: String,
    #[serde(default)]
    pub participant: Participant,
    /// 按提交顺序记录的答案
    #[serde(default)]
    pub answers: Vec<RecordedAnswer>,
    /// 自拍在资源存储中的引用
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub capture_ref: Option<String>,
    #[serde(default)]
    pub status: SubmissionStatus,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub output_ref: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error_code: Option<crate::error::ErrorCode>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error_message: Option<String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Participant {
    pub name: Option<String>,
    pub first_name: Option<String>,
    pub email: Option<String>,
}

/// 单个答案：表单元素 id + 值
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RecordedAnswer {
    pub element_id: String,
    pub value: ContextValue,
}

impl Submission {
    pub fn new(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            participant: Participant::default(),
            answers: Vec::new(),
            capture_ref: None,
            status: SubmissionStatus::Pending,
            output_ref: None,
            error_code: None,
            error_message: None,
        }
    }

    /// 查找某个表单元素的答案
    pub fn answer_for(&self, element_id: &str) -> Option<&RecordedAnswer> {
        self.answers.iter().find(|a| a.element_id == element_id)
    }
}

/// 提交状态机: pending → processing → {completed | failed}
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SubmissionStatus {
    #[default]
    Pending,
    Processing,
    Completed,
    Failed,
}

impl SubmissionStatus {
    pub fn is_terminal(self) -> bool {
        matches!(self, SubmissionStatus::Completed | SubmissionStatus::Failed)
    }

    /// 终态不再接受任何转换
    pub fn can_transition_to(self, next: SubmissionStatus) -> bool {
        if self.is_terminal() {
            return false;
        }
        matches!(
            (self, next),
            (SubmissionStatus::Pending, SubmissionStatus::Processing)
                | (SubmissionStatus::Processing, SubmissionStatus::Completed)
                | (SubmissionStatus::Processing, SubmissionStatus::Failed)
        )
    }
}

impl fmt::Display for SubmissionStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            SubmissionStatus::Pending => "pending",
            SubmissionStatus::Processing => "processing",
            SubmissionStatus::Completed => "completed",
            SubmissionStatus::Failed => "failed",
        };
        f.write_str(s)
    }
}
