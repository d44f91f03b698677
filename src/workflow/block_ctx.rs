//! 块执行上下文
//!
//! 封装"我正在处理哪个提交的哪个块"这一信息，仅用于日志

use std::fmt::Display;

use crate::models::PipelineBlock;

/// 块执行上下文
#[derive(Debug, Clone)]
pub struct BlockCtx {
    /// 提交 ID
    pub submission_id: String,

    /// 块 ID
    pub block_id: String,

    /// 块名称
    pub block_name: String,

    /// 块的声明顺序
    pub order: u32,
}

impl BlockCtx {
    /// 创建新的块上下文
    pub fn new(submission_id: impl Into<String>, block: &PipelineBlock) -> Self {
        Self {
            submission_id: submission_id.into(),
            block_id: block.id.clone(),
            block_name: block.name.clone(),
            order: block.order,
        }
    }
}

impl Display for BlockCtx {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "[提交 {} 块 {}#{} {}]",
            self.submission_id, self.block_id, self.order, self.block_name
        )
    }
}
