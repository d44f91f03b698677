//! 上下文构建服务 - 业务能力层
//!
//! 只负责把一次提交的答案变成变量表，不关心流程

use tracing::debug;

use crate::models::{ExecutionContext, Submission};

/// 由一次提交构建执行上下文
///
/// 写入的键：
/// - `nom` / `prenom` / `email`：参与者字段（缺失则不写）
/// - `question{N}`：第 N 个答案（从 1 开始，按提交顺序）
/// - `answer_{elementId}`：按表单元素 id 索引的答案
pub fn build_context(submission: &Submission) -> ExecutionContext {
    let mut ctx = ExecutionContext::new();
    let participant = &submission.participant;

    if let Some(name) = &participant.name {
        ctx.insert("nom", name.as_str());
    }
    if let Some(first_name) = &participant.first_name {
        ctx.insert("prenom", first_name.as_str());
    }
    if let Some(email) = &participant.email {
        ctx.insert("email", email.as_str());
    }

    for (index, answer) in submission.answers.iter().enumerate() {
        ctx.insert(format!("question{}", index + 1), answer.value.clone());
        ctx.insert(format!("answer_{}", answer.element_id), answer.value.clone());
    }

    debug!(
        "[提交 {}] 上下文构建完成，共 {} 个变量",
        submission.id,
        ctx.len()
    );

    ctx
}
