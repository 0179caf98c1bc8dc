//! 项目概况模块
//!
//! 遍历仓库目录，统计语言分布、项目标记文件与逐文件声明，
//! 推断项目类型，并生成确定性的概览提示。

use crate::error::{DocScopeError, Result};
use crate::git::SKIPPED_DIRECTORIES;
use crate::parser::{Declaration, DeclarationScanner, Language, LanguageTable};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};
use tracing::debug;
use walkdir::WalkDir;

/// 概况扫描选项
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProfileOptions {
    /// 最多检查的文件数
    pub max_files: usize,
    /// 超过该大小的文件不解析声明
    pub max_file_size: u64,
    /// 概览提示中列出的文件数
    pub prompt_files: usize,
    /// 概览提示中每个文件列出的声明数
    pub prompt_declarations: usize,
}

impl Default for ProfileOptions {
    fn default() -> Self {
        Self {
            max_files: 2000,
            max_file_size: 1_000_000,
            prompt_files: 10,
            prompt_declarations: 6,
        }
    }
}

/// 概况中的单个文件
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProfiledFile {
    pub path: PathBuf,
    pub size: u64,
    pub language: Language,
    pub declarations: Vec<Declaration>,
}

/// 仓库概况
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProjectProfile {
    pub root: PathBuf,
    pub file_count: usize,
    /// 语言 -> 文件数，不含未知语言
    pub languages: BTreeMap<Language, usize>,
    /// 标记类别 -> 标记文件路径
    pub markers: BTreeMap<String, Vec<PathBuf>>,
    pub files: Vec<ProfiledFile>,
    pub guesses: Vec<String>,
}

impl ProjectProfile {
    /// 扫描仓库目录
    pub fn scan(root: &Path, table: &LanguageTable, options: &ProfileOptions) -> Result<Self> {
        if !root.is_dir() {
            return Err(DocScopeError::InputNotFound(format!(
                "Project root does not exist: {}",
                root.display()
            )));
        }

        let mut scanner = DeclarationScanner::new();
        let mut languages: BTreeMap<Language, usize> = BTreeMap::new();
        let mut markers: BTreeMap<String, Vec<PathBuf>> = BTreeMap::new();
        let mut files = Vec::new();

        let walker = WalkDir::new(root)
            .min_depth(1)
            .sort_by_file_name()
            .into_iter()
            .filter_entry(|entry| {
                !(entry.file_type().is_dir()
                    && entry
                        .file_name()
                        .to_str()
                        .is_some_and(|name| SKIPPED_DIRECTORIES.contains(&name)))
            });

        for entry in walker {
            if files.len() >= options.max_files {
                debug!("Stopping profile scan after {} files", options.max_files);
                break;
            }

            let entry = match entry {
                Ok(entry) => entry,
                Err(e) => {
                    debug!("Skipping unreadable entry: {e}");
                    continue;
                }
            };
            if !entry.file_type().is_file() {
                continue;
            }

            let Ok(relative) = entry.path().strip_prefix(root) else {
                continue;
            };
            let relative = relative.to_path_buf();
            let size = entry.metadata().map(|m| m.len()).unwrap_or(0);
            let language = table.detect(&relative);

            if language.is_known() {
                *languages.entry(language).or_default() += 1;
            }

            let file_name = entry.file_name().to_string_lossy();
            for (kind, names) in table.project_markers() {
                if names.iter().any(|name| *name == file_name) {
                    markers
                        .entry(kind.to_string())
                        .or_default()
                        .push(relative.clone());
                }
            }

            let declarations = if size <= options.max_file_size {
                fs::read(entry.path())
                    .map(|bytes| {
                        let text = String::from_utf8_lossy(&bytes);
                        scanner.scan(&text, table.scan_capability(language))
                    })
                    .unwrap_or_default()
            } else {
                Vec::new()
            };

            files.push(ProfiledFile {
                path: relative,
                size,
                language,
                declarations,
            });
        }

        let guesses = infer_project_type(&markers, &languages);
        Ok(Self {
            root: root.to_path_buf(),
            file_count: files.len(),
            languages,
            markers,
            files,
            guesses,
        })
    }

    /// 生成概览提示
    pub fn overview_prompt(&self, options: &ProfileOptions) -> String {
        let languages = self
            .languages
            .iter()
            .map(|(language, count)| format!("{language}={count}"))
            .collect::<Vec<_>>()
            .join(", ");
        let markers = self
            .markers
            .iter()
            .map(|(kind, paths)| {
                let paths: Vec<String> = paths.iter().map(|p| p.display().to_string()).collect();
                format!("{kind}: {}", paths.join(" "))
            })
            .collect::<Vec<_>>()
            .join("; ");

        let mut prompt = String::new();
        prompt.push_str(&format!("Repository root: {}\n", self.root.display()));
        prompt.push_str(&format!("File count: {}\n", self.file_count));
        prompt.push_str(&format!("Languages: {languages}\n"));
        prompt.push_str(&format!("Marker files: {markers}\n"));
        prompt.push_str(&format!("Project type guesses: {}\n\n", self.guesses.join(", ")));

        prompt.push_str("Sample files and top declarations:\n");
        for file in self.files.iter().take(options.prompt_files) {
            let declarations = file
                .declarations
                .iter()
                .take(options.prompt_declarations)
                .map(Declaration::label)
                .collect::<Vec<_>>()
                .join(", ");
            prompt.push_str(&format!(
                "- {} ({}) declarations: {declarations}\n",
                file.path.display(),
                file.language
            ));
        }

        prompt.push_str(
            "\nTask: using the information above, summarize the purpose of the project and its likely \
runtime or framework, name the key modules and the five files to read first, list the build and \
deployment artifacts, and suggest three questions that would sharpen the analysis. \
Answer with a short JSON object with the keys summary, entry_points, artifacts, questions and confidence.\n",
        );
        prompt
    }
}

/// 根据标记文件与语言分布推断项目类型
pub fn infer_project_type(
    markers: &BTreeMap<String, Vec<PathBuf>>,
    languages: &BTreeMap<Language, usize>,
) -> Vec<String> {
    const GUESSES: &[(&str, &str)] = &[
        ("python", "python-package"),
        ("node", "nodejs-app"),
        ("docker", "dockerized"),
        ("rust", "rust-crate"),
        ("go", "go-module"),
    ];

    let mut guesses: Vec<String> = GUESSES
        .iter()
        .filter(|(kind, _)| markers.get(*kind).is_some_and(|paths| !paths.is_empty()))
        .map(|(_, guess)| guess.to_string())
        .collect();

    if guesses.is_empty() {
        // 数量相同时取名称靠前的语言
        let dominant = languages
            .iter()
            .max_by(|a, b| a.1.cmp(b.1).then_with(|| b.0.as_str().cmp(a.0.as_str())));
        match dominant {
            Some((language, _)) => guesses.push(format!("dominant-language:{language}")),
            None => guesses.push("unknown".to_string()),
        }
    }

    guesses
}
