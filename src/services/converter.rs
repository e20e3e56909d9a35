//! 文档转换服务 - 业务能力层
//!
//! 把文档按页转为图片。转换本体归属外部能力，
//! 默认实现调用外部命令行工具

use anyhow::{bail, Context, Result};
use async_trait::async_trait;
use std::path::{Path, PathBuf};
use tracing::debug;

use crate::models::PageImage;

/// 支持的图片扩展名
const IMAGE_EXTENSIONS: [&str; 5] = ["jpg", "jpeg", "png", "webp", "gif"];

/// 文件名是否为受支持的图片
pub fn is_image_file(file_name: &str) -> bool {
    let lower = file_name.to_ascii_lowercase();
    IMAGE_EXTENSIONS.iter().any(|ext| lower.ends_with(&format!(".{}", ext)))
}

/// 文档转图片接口
#[async_trait]
pub trait DocumentConverter: Send + Sync {
    /// 把文档转换为按页排序的图片列表
    ///
    /// # 参数
    /// - `document`: 文档路径
    /// - `page_range`: 可选的页码范围（1-based，闭区间）
    /// - `work_dir`: 页面图片的输出目录
    async fn to_page_images(
        &self,
        document: &Path,
        page_range: Option<(u32, u32)>,
        work_dir: &Path,
    ) -> Result<Vec<PageImage>>;
}

/// 调用外部命令的转换实现
///
/// 按 pdftoppm 的调用约定：`cmd -png [-f N -l M] input prefix`，
/// 产出 `prefix-<页号>.png` 系列文件
pub struct CommandConverter {
    command: String,
}

impl CommandConverter {
    pub fn new(command: impl Into<String>) -> Self {
        Self {
            command: command.into(),
        }
    }
}

#[async_trait]
impl DocumentConverter for CommandConverter {
    async fn to_page_images(
        &self,
        document: &Path,
        page_range: Option<(u32, u32)>,
        work_dir: &Path,
    ) -> Result<Vec<PageImage>> {
        let stem = document
            .file_stem()
            .and_then(|s| s.to_str())
            .unwrap_or("pages");
        let prefix = work_dir.join(format!("{}_page", stem));

        let mut cmd = tokio::process::Command::new(&self.command);
        cmd.arg("-png");
        if let Some((first, last)) = page_range {
            cmd.arg("-f").arg(first.to_string());
            cmd.arg("-l").arg(last.to_string());
        }
        cmd.arg(document).arg(&prefix);

        let output = cmd
            .output()
            .await
            .with_context(|| format!("执行文档转换命令失败: {}", self.command))?;
        if !output.status.success() {
            bail!(
                "文档转换命令退出异常: {}",
                String::from_utf8_lossy(&output.stderr).trim()
            );
        }

        let pages = collect_pages(work_dir, &prefix).await?;
        if pages.is_empty() {
            bail!("文档转换没有产出任何页面");
        }
        debug!("文档 {} 转出 {} 页", document.display(), pages.len());
        Ok(pages)
    }
}

/// 收集转换产出的页面文件，按页号排序
async fn collect_pages(work_dir: &Path, prefix: &Path) -> Result<Vec<PageImage>> {
    let prefix_name = prefix
        .file_name()
        .and_then(|s| s.to_str())
        .unwrap_or_default()
        .to_string();

    let mut numbered: Vec<(u32, PathBuf)> = Vec::new();
    let mut entries = tokio::fs::read_dir(work_dir)
        .await
        .with_context(|| format!("读取转换输出目录失败: {}", work_dir.display()))?;
    while let Some(entry) = entries.next_entry().await? {
        let name = entry.file_name().to_string_lossy().to_string();
        if let Some(page_number) = parse_page_number(&name, &prefix_name) {
            numbered.push((page_number, entry.path()));
        }
    }

    numbered.sort_by_key(|(number, _)| *number);
    Ok(numbered
        .into_iter()
        .enumerate()
        .map(|(index, (_, path))| PageImage { index, path })
        .collect())
}

/// 从 `prefix-<N>.png` 形式的文件名解析页号
fn parse_page_number(file_name: &str, prefix: &str) -> Option<u32> {
    let rest = file_name.strip_prefix(prefix)?;
    let rest = rest.strip_prefix('-')?;
    rest.strip_suffix(".png")?.parse().ok()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn image_extensions_are_recognized() {
        assert!(is_image_file("photo.JPG"));
        assert!(is_image_file("scan.png"));
        assert!(is_image_file("anim.webp"));
        assert!(!is_image_file("paper.pdf"));
        assert!(!is_image_file("data.csv"));
    }

    #[test]
    fn page_numbers_parse_and_sort_numerically() {
        assert_eq!(parse_page_number("doc_page-1.png", "doc_page"), Some(1));
        assert_eq!(parse_page_number("doc_page-12.png", "doc_page"), Some(12));
        assert_eq!(parse_page_number("doc_page-01.png", "doc_page"), Some(1));
        assert_eq!(parse_page_number("other-1.png", "doc_page"), None);
        assert_eq!(parse_page_number("doc_page-1.jpg", "doc_page"), None);
    }
}
