use crate::models::{PipelineDefinition, Submission};
use anyhow::{Context, Result};
use std::path::{Path, PathBuf};
use tokio::fs;

/// 从 TOML 文件加载流水线定义
pub async fn load_pipeline(toml_file_path: &Path) -> Result<PipelineDefinition> {
    let content = fs::read_to_string(toml_file_path)
        .await
        .with_context(|| format!("无法读取流水线文件: {}", toml_file_path.display()))?;

    let pipeline: PipelineDefinition = toml::from_str(&content)
        .with_context(|| format!("无法解析流水线文件: {}", toml_file_path.display()))?;

    Ok(pipeline)
}

/// 从 TOML 文件加载单个提交
pub async fn load_submission(toml_file_path: &Path) -> Result<Submission> {
    let content = fs::read_to_string(toml_file_path)
        .await
        .with_context(|| format!("无法读取提交文件: {}", toml_file_path.display()))?;

    let submission: Submission = toml::from_str(&content)
        .with_context(|| format!("无法解析提交文件: {}", toml_file_path.display()))?;

    Ok(submission)
}

/// 从文件夹中加载所有提交，解析失败的文件跳过并记录
pub async fn load_all_submissions(folder_path: &str) -> Result<Vec<Submission>> {
    let folder = PathBuf::from(folder_path);

    if !folder.exists() {
        anyhow::bail!("文件夹不存在: {}", folder_path);
    }

    let mut paths = Vec::new();
    let mut entries = fs::read_dir(&folder)
        .await
        .with_context(|| format!("无法读取文件夹: {}", folder_path))?;

    while let Some(entry) = entries.next_entry().await? {
        let path = entry.path();
        if path.extension().and_then(|s| s.to_str()) == Some("toml") {
            paths.push(path);
        }
    }
    paths.sort();

    let mut submissions = Vec::new();
    for path in paths {
        match load_submission(&path).await {
            Ok(submission) => {
                tracing::info!(
                    "成功加载提交 {} ({} 个答案)",
                    submission.id,
                    submission.answers.len()
                );
                submissions.push(submission);
            }
            Err(e) => {
                tracing::warn!("加载文件失败 {}: {:#}", path.display(), e);
            }
        }
    }

    Ok(submissions)
}
