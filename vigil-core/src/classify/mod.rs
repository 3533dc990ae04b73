//! Change classification.
//!
//! A changed file is matched against the server's categories with a fixed
//! three-pass cascade: path patterns first, then filename keywords, then
//! (gated) content keywords. Categories are evaluated in the order the
//! server returned them and the first match wins.

use std::path::Path;

use regex::RegexBuilder;
use tracing::trace;
use vigil_model::{Category, ChangeType};

pub mod content;

/// File extensions eligible for content scanning: plain text, logs,
/// structured data, and the machine-control family.
const SCANNABLE_EXTENSIONS: &[&str] = &[
    "txt", "log", "csv", "json", "xml", "md", "ini", "cfg", "nc", "cnc",
    "gcode", "tap", "ngc", "mpf", "eia", "pgm",
];

const CONTEXT_MAX_CHARS: usize = 50;

/// Tuning for the content-scan stage of classification.
#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
#[serde(default)]
pub struct ScanConfig {
    /// Master switch for the content pass. When off, file content is never
    /// opened regardless of extension or size.
    pub scan_file_contents: bool,
    /// Upper bound on the size of a file the content pass will read.
    pub max_file_size_mb: u64,
    /// Extensions the content pass recognizes, lower-case without dots.
    pub scannable_extensions: Vec<String>,
}

impl Default for ScanConfig {
    fn default() -> Self {
        Self {
            scan_file_contents: true,
            max_file_size_mb: 10,
            scannable_extensions: SCANNABLE_EXTENSIONS
                .iter()
                .map(|ext| ext.to_string())
                .collect(),
        }
    }
}

impl ScanConfig {
    pub fn max_file_size_bytes(&self) -> u64 {
        self.max_file_size_mb * 1024 * 1024
    }

    fn is_scannable(&self, path: &Path) -> bool {
        let Some(ext) = path.extension().and_then(|ext| ext.to_str()) else {
            return false;
        };
        let ext = ext.to_lowercase();
        self.scannable_extensions.iter().any(|known| *known == ext)
    }
}

/// A successful category match.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Classification {
    pub category_id: i64,
    pub matched_keyword: String,
}

/// Classify one changed file against the category list.
///
/// Deleted events carry no file to inspect and always yield `None`; so does
/// a file that vanished between the notification and the scan.
pub async fn classify(
    path: &Path,
    change_type: ChangeType,
    categories: &[Category],
    scan: &ScanConfig,
) -> Option<Classification> {
    if !change_type.is_classifiable() {
        return None;
    }

    if let Some(hit) = match_path_patterns(path, categories) {
        return Some(hit);
    }
    if let Some(hit) = match_filename_keywords(path, categories) {
        return Some(hit);
    }
    match_content_keywords(path, categories, scan).await
}

/// Pass 1: category `file_patterns` as case-insensitive regexes against the
/// full path. Patterns that fail to compile are skipped.
fn match_path_patterns(path: &Path, categories: &[Category]) -> Option<Classification> {
    let path_str = path.to_string_lossy();
    for category in categories {
        for pattern in &category.file_patterns {
            let regex = match RegexBuilder::new(pattern).case_insensitive(true).build() {
                Ok(regex) => regex,
                Err(err) => {
                    trace!(pattern = %pattern, error = %err, "skipping invalid file pattern");
                    continue;
                }
            };
            if regex.is_match(&path_str) {
                return Some(Classification {
                    category_id: category.id,
                    matched_keyword: format!("Pattern: {pattern}"),
                });
            }
        }
    }
    None
}

/// Pass 2: case-insensitive keyword containment in the file's base name.
fn match_filename_keywords(path: &Path, categories: &[Category]) -> Option<Classification> {
    let file_name = path.file_name()?.to_string_lossy().to_lowercase();
    for category in categories {
        for keyword in &category.keywords {
            if file_name.contains(&keyword.to_lowercase()) {
                return Some(Classification {
                    category_id: category.id,
                    matched_keyword: format!("Filename: {keyword}"),
                });
            }
        }
    }
    None
}

/// Pass 3: line-by-line keyword scan of the decoded file content. Only runs
/// when scanning is enabled, the extension is recognized, and the file still
/// exists within the size bound.
async fn match_content_keywords(
    path: &Path,
    categories: &[Category],
    scan: &ScanConfig,
) -> Option<Classification> {
    if !scan.scan_file_contents || !scan.is_scannable(path) {
        return None;
    }
    if categories.iter().all(|category| category.keywords.is_empty()) {
        return None;
    }
    let size = tokio::fs::metadata(path).await.ok()?.len();
    if size > scan.max_file_size_bytes() {
        return None;
    }

    let text = content::read_text(path).await;
    if text.is_empty() {
        return None;
    }

    for category in categories {
        for keyword in &category.keywords {
            let needle = keyword.to_lowercase();
            for (index, line) in text.lines().enumerate() {
                if line.to_lowercase().contains(&needle) {
                    return Some(Classification {
                        category_id: category.id,
                        matched_keyword: format!(
                            "Content: {} (Line {}: {})",
                            keyword,
                            index + 1,
                            line_context(line),
                        ),
                    });
                }
            }
        }
    }
    None
}

fn line_context(line: &str) -> String {
    let trimmed = line.trim();
    if trimmed.chars().count() > CONTEXT_MAX_CHARS {
        let cut: String = trimmed.chars().take(CONTEXT_MAX_CHARS).collect();
        format!("{cut}...")
    } else {
        trimmed.to_string()
    }
}
