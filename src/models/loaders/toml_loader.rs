use anyhow::{Context, Result};
use serde::Deserialize;
use std::path::{Path, PathBuf};
use tokio::fs;

/// 一个评审意见文件（`comments = [...]`）
#[derive(Debug, Clone, Default, Deserialize)]
pub struct CommentFile {
    #[serde(default)]
    pub comments: Vec<String>,
}

/// 从 TOML 文件加载评审意见
pub async fn load_comment_file(toml_file_path: &Path) -> Result<CommentFile> {
    let content = fs::read_to_string(toml_file_path)
        .await
        .with_context(|| format!("无法读取TOML文件: {}", toml_file_path.display()))?;

    toml::from_str(&content)
        .with_context(|| format!("无法解析TOML文件: {}", toml_file_path.display()))
}

/// 从文件夹中加载所有 TOML 文件
///
/// 单个文件解析失败只记录警告，不影响其他文件；按文件名排序保证顺序稳定
pub async fn load_all_comment_files(folder_path: &str) -> Result<Vec<CommentFile>> {
    let folder = PathBuf::from(folder_path);

    if !folder.exists() {
        anyhow::bail!("文件夹不存在: {}", folder_path);
    }

    let mut toml_paths = Vec::new();
    let mut entries = fs::read_dir(&folder)
        .await
        .with_context(|| format!("无法读取文件夹: {}", folder_path))?;

    while let Some(entry) = entries.next_entry().await? {
        let path = entry.path();
        if path.extension().and_then(|s| s.to_str()) == Some("toml") {
            toml_paths.push(path);
        }
    }
    toml_paths.sort();

    let mut files = Vec::new();
    for path in toml_paths {
        tracing::info!(
            "正在加载: {}",
            path.file_name().unwrap_or_default().to_string_lossy()
        );

        match load_comment_file(&path).await {
            Ok(file) => {
                tracing::info!("成功加载 {} 条评审意见", file.comments.len());
                files.push(file);
            }
            Err(e) => {
                tracing::warn!("加载文件失败 {}: {}", path.display(), e);
            }
        }
    }

    Ok(files)
}

/// 合并所有文件中的评审意见（去掉空白条目）
pub fn collect_comments(files: &[CommentFile]) -> Vec<String> {
    files
        .iter()
        .flat_map(|f| f.comments.iter())
        .map(|c| c.trim())
        .filter(|c| !c.is_empty())
        .map(str::to_string)
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_load_all_comment_files_skips_broken_files() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(
            dir.path().join("a.toml"),
            "comments = [\"loop skips the last element\", \"  \"]\n",
        )
        .unwrap();
        std::fs::write(dir.path().join("b.toml"), "comments = not valid").unwrap();
        std::fs::write(dir.path().join("notes.txt"), "ignored").unwrap();

        let files = load_all_comment_files(dir.path().to_str().unwrap())
            .await
            .unwrap();
        assert_eq!(files.len(), 1);
        assert_eq!(
            collect_comments(&files),
            vec!["loop skips the last element".to_string()]
        );
    }

    #[tokio::test]
    async fn test_missing_folder_is_an_error() {
        assert!(load_all_comment_files("/definitely/not/here").await.is_err());
    }
}
