//! 提示词模板替换 - 业务能力层
//!
//! 两轮替换，顺序不可调换：
//! 1. 参考图名称 `{name}` → `Image K`
//! 2. 其余 `{key}` → 执行上下文中的值，找不到则替换为空串

use regex::{Captures, Regex};
use std::collections::HashMap;
use std::sync::OnceLock;
use tracing::warn;

use crate::models::{ExecutionContext, ReferenceImageSpec};

/// 渲染结果
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RenderedPrompt {
    pub text: String,
    /// 没有在上下文中找到的变量（已替换为空串）
    pub unresolved: Vec<String>,
}

fn token_regex() -> &'static Regex {
    static TOKEN: OnceLock<Regex> = OnceLock::new();
    TOKEN.get_or_init(|| Regex::new(r"\{([^{}]+)\}").expect("token regex is valid"))
}

/// 参考图名称（小写）→ `Image K`
///
/// K = 1 + 声明顺序严格更小的参考图数量，与存储顺序无关
pub fn image_labels(images: &[ReferenceImageSpec]) -> HashMap<String, String> {
    images
        .iter()
        .map(|spec| {
            let rank = 1 + images.iter().filter(|other| other.order < spec.order).count();
            (spec.name.trim().to_lowercase(), format!("Image {}", rank))
        })
        .collect()
}

/// 第一轮：替换参考图名称，不匹配的占位符原样保留
pub fn substitute_image_tokens(template: &str, images: &[ReferenceImageSpec]) -> String {
    if images.is_empty() {
        return template.to_string();
    }
    let labels = image_labels(images);

    token_regex()
        .replace_all(template, |caps: &Captures| {
            let key = caps[1].trim().to_lowercase();
            match labels.get(&key) {
                Some(label) => label.clone(),
                None => caps[0].to_string(),
            }
        })
        .into_owned()
}

/// 第二轮：用上下文替换剩余占位符
pub fn substitute_context_tokens(text: &str, ctx: &ExecutionContext) -> RenderedPrompt {
    let mut unresolved = Vec::new();

    let rendered = token_regex()
        .replace_all(text, |caps: &Captures| {
            let key = caps[1].trim();
            match ctx.get(key) {
                Some(value) => value.to_string(),
                None => {
                    unresolved.push(key.to_string());
                    String::new()
                }
            }
        })
        .into_owned();

    for key in &unresolved {
        warn!("⚠️ 提示词变量 {{{}}} 未找到，已替换为空", key);
    }

    RenderedPrompt {
        text: rendered,
        unresolved,
    }
}

/// 完整渲染（两轮）
pub fn render_prompt(
    template: &str,
    images: &[ReferenceImageSpec],
    ctx: &ExecutionContext,
) -> RenderedPrompt {
    let with_images = substitute_image_tokens(template, images);
    substitute_context_tokens(&with_images, ctx)
}
