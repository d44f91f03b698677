//! 问卷计分服务 - 业务能力层
//!
//! 只负责"把答案累计到档案上并选出胜者"，不关心流程

use std::collections::BTreeMap;
use tracing::{debug, info, warn};

use crate::models::{ExecutionContext, PipelineBlock, ScoringConfig, ScoringProfile, Submission};

/// 一个计分块的结果
#[derive(Debug, Clone, PartialEq)]
pub struct ScoringOutcome {
    /// 上下文键前缀：块名称原样，以及（不同时）规范化后的别名
    pub prefixes: Vec<String>,
    pub winner: ScoringProfile,
    pub scores: BTreeMap<String, u32>,
}

impl ScoringOutcome {
    /// 把胜出档案写入上下文
    pub fn enrich(&self, ctx: &mut ExecutionContext) {
        let scores = serde_json::to_string(&self.scores).unwrap_or_default();
        for p in &self.prefixes {
            ctx.insert(format!("{}_profile_key", p), self.winner.key.as_str());
            ctx.insert(format!("{}_profile_name", p), self.winner.name.as_str());
            ctx.insert(
                format!("{}_profile_description", p),
                self.winner.description.as_str(),
            );
            ctx.insert(
                format!("{}_profile_image_style", p),
                self.winner.image_style.as_str(),
            );
            ctx.insert(format!("{}_scores", p), scores.as_str());
        }
    }
}

/// 块名称 → 上下文键前缀（小写，非字母数字连续段替换为 `_`）
pub fn context_prefix(block_name: &str) -> String {
    let mut prefix = String::with_capacity(block_name.len());
    let mut pending_sep = false;
    for c in block_name.trim().chars() {
        if c.is_alphanumeric() {
            if pending_sep && !prefix.is_empty() {
                prefix.push('_');
            }
            pending_sep = false;
            prefix.extend(c.to_lowercase());
        } else {
            pending_sep = true;
        }
    }
    prefix
}

/// 块名称原样（去首尾空白）在前，规范化别名与之不同时追加在后
pub fn context_prefixes(block_name: &str) -> Vec<String> {
    let declared = block_name.trim().to_string();
    let slug = context_prefix(block_name);
    let mut prefixes = vec![declared];
    if !slug.is_empty() && !prefixes.contains(&slug) {
        prefixes.push(slug);
    }
    prefixes
}

/// 对一个计分块计分
///
/// 未配置完成（档案少于 2 个或没有选题）时返回 `None`，调用方不做富化继续执行
pub fn score_block(block: &PipelineBlock, submission: &Submission) -> Option<ScoringOutcome> {
    let cfg = block.as_scoring()?;

    if !cfg.is_configured() {
        info!(
            "[提交 {}] 计分块 {} 未配置完成 ({} 个档案, {} 道题)，跳过",
            submission.id,
            block.name,
            cfg.profiles.len(),
            cfg.selected_questions.len()
        );
        return None;
    }

    let scores = tally(cfg, submission);
    let winner = pick_winner(cfg, &scores)?;

    debug!(
        "[提交 {}] 计分块 {} 得分: {:?}",
        submission.id, block.name, scores
    );
    info!(
        "[提交 {}] ✓ 计分块 {} 胜出档案: {} ({})",
        submission.id, block.name, winner.key, winner.name
    );

    Some(ScoringOutcome {
        prefixes: context_prefixes(&block.name),
        winner,
        scores,
    })
}

fn tally(cfg: &ScoringConfig, submission: &Submission) -> BTreeMap<String, u32> {
    let mut scores: BTreeMap<String, u32> =
        cfg.profiles.iter().map(|p| (p.key.clone(), 0)).collect();

    for question_id in &cfg.selected_questions {
        let Some(answer) = submission.answer_for(question_id) else {
            warn!(
                "[提交 {}] ⚠️ 题目 {} 没有作答，不计分",
                submission.id, question_id
            );
            continue;
        };
        let answer_text = answer.value.as_text();

        // 选项文本与答案逐字比较，仅忽略首尾空白
        let profile_key = cfg
            .mappings
            .iter()
            .find(|m| &m.question_id == question_id)
            .and_then(|m| {
                m.options
                    .iter()
                    .find(|o| o.option_text.trim() == answer_text.trim())
            })
            .map(|o| o.profile_key.as_str());

        match profile_key.and_then(|key| scores.get_mut(key)) {
            Some(score) => *score += 1,
            None => warn!(
                "[提交 {}] ⚠️ 题目 {} 的答案 '{}' 没有对应档案，不计分",
                submission.id, question_id, answer_text
            ),
        }
    }

    scores
}

/// 最高分胜出，同分按 key 字母序取第一个
fn pick_winner(cfg: &ScoringConfig, scores: &BTreeMap<String, u32>) -> Option<ScoringProfile> {
    // BTreeMap 按 key 升序迭代，严格大于才替换即可保证字母序优先
    let mut best: Option<(&String, u32)> = None;
    for (key, &score) in scores {
        if best.map_or(true, |(_, s)| score > s) {
            best = Some((key, score));
        }
    }
    let (key, _) = best?;
    cfg.profiles.iter().find(|p| &p.key == key).cloned()
}
