//! 文档合成模块
//!
//! 合并已有文档、生成文本与缺失占位，为每个源文件渲染文档，
//! 维护仓库级摘要并追加一条运行历史。非草稿模式下提交输出文件。

use crate::doccomment::DocCommentExtractor;
use crate::error::{DocScopeError, Result};
use crate::formatter::{
    DocSection, ExportFormat, FileDocument, OutputRenderer, Provenance, SUMMARY_DISPLAY_CAP,
    Template, artifact_file_name,
};
use crate::generator::{DocGenerationRequest, DocGenerator, GeneratedDocs, TextGenerationClient};
use crate::git::{CommitWriter, SourceRepository};
use crate::history::{HistoryEntry, HistoryStore, RunConfiguration};
use crate::parser::{Declaration, DeclarationKey, DeclarationScanner, Language, LanguageTable};
use crate::report::{
    ArtifactLocation, Collaborator, FileOutputs, ProvenanceCounts, RecoveredIssue, SynthesisReport,
};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fs;
use std::path::{Component, Path, PathBuf};
use tracing::{debug, info, warn};

/// 输出根目录，相对于仓库根目录
pub const DOCS_DIR: &str = "docs";
/// 正式输出区
pub const FILES_DIR: &str = "files";
/// 草稿输出区
pub const DRAFTS_DIR: &str = "drafts";
pub const SUMMARY_FILE: &str = "summary.md";
pub const HISTORY_FILE: &str = "history.jsonl";

/// 文档合成选项
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SynthesisOptions {
    pub template: Template,
    pub export_formats: Vec<ExportFormat>,
    /// 为缺少文档的声明请求生成文本
    pub generate: bool,
    /// 输出写入草稿区且不提交
    pub manual_override: bool,
    pub max_file_size: u64,
    pub summary_display_cap: usize,
    /// 接受只有名称的生成结果键
    pub legacy_bare_name_fallback: bool,
}

impl Default for SynthesisOptions {
    fn default() -> Self {
        Self {
            template: Template::Api,
            export_formats: vec![ExportFormat::Markdown],
            generate: false,
            manual_override: false,
            max_file_size: 1_000_000,
            summary_display_cap: SUMMARY_DISPLAY_CAP,
            legacy_bare_name_fallback: false,
        }
    }
}

impl SynthesisOptions {
    /// 验证选项
    pub fn validate(&self) -> Result<()> {
        if self.export_formats.is_empty() {
            return Err(DocScopeError::ConfigError(
                "At least one export format is required".to_string(),
            ));
        }
        if self.summary_display_cap == 0 {
            return Err(DocScopeError::ConfigError(
                "Summary display cap must be greater than 0".to_string(),
            ));
        }
        Ok(())
    }

    /// 去重后的导出格式，保持给定顺序
    fn formats(&self) -> Vec<ExportFormat> {
        let mut formats = Vec::new();
        for format in &self.export_formats {
            if !formats.contains(format) {
                formats.push(*format);
            }
        }
        formats
    }

    fn run_configuration(&self) -> RunConfiguration {
        RunConfiguration {
            template: self.template,
            export_formats: self.formats(),
            manual_override: self.manual_override,
            generation_enabled: self.generate,
        }
    }
}

/// 单个源文件的处理结果
struct ScannedFile {
    path: PathBuf,
    language: Language,
    source: String,
    declarations: Vec<Declaration>,
}

/// 文档合成器
pub struct DocSynthesizer<'a> {
    table: &'a LanguageTable,
    committer: &'a dyn CommitWriter,
    client: Option<&'a dyn TextGenerationClient>,
    options: SynthesisOptions,
    renderer: OutputRenderer,
}

impl<'a> DocSynthesizer<'a> {
    /// 创建新的文档合成器
    pub fn new(
        table: &'a LanguageTable,
        committer: &'a dyn CommitWriter,
        options: SynthesisOptions,
    ) -> Self {
        Self {
            table,
            committer,
            client: None,
            options,
            renderer: OutputRenderer::new(),
        }
    }

    /// 设置文本生成服务
    pub fn with_client(mut self, client: &'a dyn TextGenerationClient) -> Self {
        self.client = Some(client);
        self
    }

    pub fn options(&self) -> &SynthesisOptions {
        &self.options
    }

    /// 对仓库运行一次文档合成
    pub fn run(&self, repository: &dyn SourceRepository) -> Result<SynthesisReport> {
        self.options.validate()?;

        let root = repository.root().to_path_buf();
        if !root.is_dir() {
            return Err(DocScopeError::InputNotFound(format!(
                "Repository root does not exist: {}",
                root.display()
            )));
        }

        let area = self.output_area();
        let output_dir = root.join(&area);
        let history_path = Path::new(DOCS_DIR).join(HISTORY_FILE);
        let formats = self.options.formats();

        let mut issues = Vec::new();
        let mut outputs = Vec::new();
        let mut touched = Vec::new();
        let mut counts = ProvenanceCounts::default();
        let mut scanner = DeclarationScanner::new();
        let extractor = DocCommentExtractor::new(self.table);

        let candidates = repository.list_files()?;
        debug!("Repository lists {} files", candidates.len());

        for path in candidates {
            let language = self.table.detect(&path);
            if !language.is_known() || is_output_path(&path) {
                continue;
            }

            let Some(file) = self.scan_file(&root, &path, language, &mut scanner, &mut issues)
            else {
                continue;
            };

            let existing: HashMap<DeclarationKey, String> = extractor
                .extract(&file.source, file.language, &file.declarations)
                .into_iter()
                .map(|record| (record.key, record.body))
                .collect();

            let generated = self.generate_missing(&file, &existing, &mut issues);
            let sections = resolve_sections(&file.declarations, &existing, &generated);

            let mut file_counts = ProvenanceCounts::default();
            for section in &sections {
                file_counts.record(section.provenance);
            }
            counts.merge(&file_counts);

            let document = FileDocument {
                path: file.path.clone(),
                language: file.language,
                template: self.options.template,
                sections,
            };

            let artifacts = self.write_artifacts(&root, &area, &document, &formats, &mut issues);
            outputs.push(FileOutputs {
                source: file.path.clone(),
                artifacts,
                counts: file_counts,
            });
            touched.push(file.path);
        }

        // 仓库级摘要
        let summary = self.renderer.render_summary(
            self.options.template,
            &touched,
            self.options.summary_display_cap,
        );
        let summary_path = area.join(SUMMARY_FILE);
        let summary_path = match write_output(&output_dir.join(SUMMARY_FILE), &summary) {
            Ok(()) => Some(summary_path),
            Err(e) => {
                warn!("Failed to write summary: {e}");
                issues.push(RecoveredIssue::OutputWriteFailure {
                    path: summary_path,
                    message: e.to_string(),
                });
                None
            }
        };

        // 每次运行恰好追加一条历史
        let revision = repository.head_revision();
        let entry = HistoryEntry::new(
            revision.clone(),
            self.options.run_configuration(),
            touched.clone(),
            counts,
        );
        let history_written = match HistoryStore::new(root.join(&history_path)).append(&entry) {
            Ok(()) => true,
            Err(e) => {
                warn!("Failed to append history: {e}");
                issues.push(RecoveredIssue::OutputWriteFailure {
                    path: history_path.clone(),
                    message: e.to_string(),
                });
                false
            }
        };

        let commit = if self.options.manual_override {
            None
        } else {
            let mut paths: Vec<PathBuf> = outputs
                .iter()
                .flat_map(|o| o.artifacts.iter().map(|a| a.path.clone()))
                .collect();
            paths.extend(summary_path.clone());
            if history_written {
                paths.push(history_path.clone());
            }
            self.commit_outputs(&root, &paths, revision.as_deref(), touched.len(), &mut issues)
        };

        info!(
            "Documented {} files ({} existing, {} generated, {} missing)",
            touched.len(),
            counts.existing,
            counts.generated,
            counts.missing
        );

        Ok(SynthesisReport {
            revision,
            template: self.options.template,
            draft: self.options.manual_override,
            touched_files: touched,
            outputs,
            summary_path,
            history_path,
            commit,
            counts,
            issues,
        })
    }

    /// 当前输出区，相对于仓库根目录
    fn output_area(&self) -> PathBuf {
        let area = if self.options.manual_override {
            DRAFTS_DIR
        } else {
            FILES_DIR
        };
        Path::new(DOCS_DIR).join(area)
    }

    /// 读取并扫描源文件，没有声明或无法读取时返回 `None`
    fn scan_file(
        &self,
        root: &Path,
        path: &Path,
        language: Language,
        scanner: &mut DeclarationScanner,
        issues: &mut Vec<RecoveredIssue>,
    ) -> Option<ScannedFile> {
        let full_path = root.join(path);

        let size = match fs::metadata(&full_path) {
            Ok(metadata) => metadata.len(),
            Err(e) => {
                issues.push(RecoveredIssue::SkippedInput {
                    path: Some(path.to_path_buf()),
                    reason: format!("cannot read file: {e}"),
                });
                return None;
            }
        };
        if size > self.options.max_file_size {
            issues.push(RecoveredIssue::SkippedInput {
                path: Some(path.to_path_buf()),
                reason: format!(
                    "file is {size} bytes, above the {} byte limit",
                    self.options.max_file_size
                ),
            });
            return None;
        }

        let source = match fs::read(&full_path) {
            Ok(bytes) => String::from_utf8_lossy(&bytes).into_owned(),
            Err(e) => {
                issues.push(RecoveredIssue::SkippedInput {
                    path: Some(path.to_path_buf()),
                    reason: format!("cannot read file: {e}"),
                });
                return None;
            }
        };

        let declarations = match scanner.try_scan(&source, self.table.scan_capability(language)) {
            Ok(declarations) => declarations,
            Err(e) => {
                debug!("{} could not be parsed: {e}", path.display());
                issues.push(RecoveredIssue::UnparsableSource {
                    path: path.to_path_buf(),
                    message: e.to_string(),
                });
                Vec::new()
            }
        };

        if declarations.is_empty() {
            return None;
        }

        Some(ScannedFile {
            path: path.to_path_buf(),
            language,
            source,
            declarations,
        })
    }

    /// 为缺少文档的声明请求生成文本，失败时降级为空结果
    fn generate_missing(
        &self,
        file: &ScannedFile,
        existing: &HashMap<DeclarationKey, String>,
        issues: &mut Vec<RecoveredIssue>,
    ) -> GeneratedDocs {
        let client = match self.client {
            Some(client) if self.options.generate => client,
            _ => return GeneratedDocs::default(),
        };

        let undocumented: Vec<usize> = file
            .declarations
            .iter()
            .enumerate()
            .filter(|(_, decl)| !existing.contains_key(&decl.key()))
            .map(|(index, _)| index)
            .collect();

        let Some(request) = DocGenerationRequest::new(
            &file.path,
            file.language,
            &file.source,
            &file.declarations,
            &undocumented,
        ) else {
            return GeneratedDocs::default();
        };

        let generator =
            DocGenerator::new(client).with_bare_names(self.options.legacy_bare_name_fallback);
        match generator.generate(&request) {
            Ok(generated) => {
                for key in &generated.ignored_keys {
                    issues.push(RecoveredIssue::IgnoredGeneratedKey {
                        path: file.path.clone(),
                        key: key.clone(),
                    });
                }
                generated
            }
            Err(e) => {
                warn!("Generation failed for {}: {e}", file.path.display());
                issues.push(RecoveredIssue::CollaboratorFailure {
                    collaborator: Collaborator::TextGeneration,
                    path: Some(file.path.clone()),
                    message: e.to_string(),
                });
                GeneratedDocs::default()
            }
        }
    }

    /// 按格式写出文件文档，每个产物的失败互不影响
    fn write_artifacts(
        &self,
        root: &Path,
        area: &Path,
        document: &FileDocument,
        formats: &[ExportFormat],
        issues: &mut Vec<RecoveredIssue>,
    ) -> Vec<ArtifactLocation> {
        let mut artifacts = Vec::new();

        for &format in formats {
            let relative = area.join(artifact_file_name(&document.path, format));
            let written = self
                .renderer
                .render(document, format)
                .and_then(|content| write_output(&root.join(&relative), &content));

            match written {
                Ok(()) => artifacts.push(ArtifactLocation {
                    format,
                    path: relative,
                }),
                Err(e) => {
                    warn!("Failed to write {}: {e}", relative.display());
                    issues.push(RecoveredIssue::OutputWriteFailure {
                        path: relative,
                        message: e.to_string(),
                    });
                }
            }
        }

        artifacts
    }

    /// 提交输出文件，失败时返回 `None` 并记录问题
    fn commit_outputs(
        &self,
        root: &Path,
        paths: &[PathBuf],
        revision: Option<&str>,
        file_count: usize,
        issues: &mut Vec<RecoveredIssue>,
    ) -> Option<String> {
        if paths.is_empty() {
            return None;
        }

        let message = commit_message(revision, self.options.template, file_count);
        match self.committer.commit(root, paths, &message) {
            Ok(commit) => {
                info!("Committed documentation as {commit}");
                Some(commit)
            }
            Err(e) => {
                warn!("Documentation commit failed: {e}");
                issues.push(RecoveredIssue::CollaboratorFailure {
                    collaborator: Collaborator::WriteBack,
                    path: None,
                    message: e.to_string(),
                });
                None
            }
        }
    }
}

/// 为每个声明确定文档来源：已有文档优先，其次生成文本，否则为缺失
pub fn resolve_sections(
    declarations: &[Declaration],
    existing: &HashMap<DeclarationKey, String>,
    generated: &GeneratedDocs,
) -> Vec<DocSection> {
    let mut sections: Vec<DocSection> = declarations
        .iter()
        .map(|decl| {
            if let Some(body) = existing.get(&decl.key()) {
                DocSection {
                    declaration: decl.clone(),
                    body: body.clone(),
                    provenance: Provenance::Existing,
                }
            } else if let Some(body) = generated.get(&decl.keyword, &decl.name) {
                DocSection {
                    declaration: decl.clone(),
                    body: body.to_string(),
                    provenance: Provenance::Generated,
                }
            } else {
                DocSection {
                    declaration: decl.clone(),
                    body: String::new(),
                    provenance: Provenance::Missing,
                }
            }
        })
        .collect();

    sections.sort_by_key(|section| section.declaration.start_line);
    sections
}

/// 提交信息
pub fn commit_message(revision: Option<&str>, template: Template, file_count: usize) -> String {
    let revision = revision
        .map(|r| r.chars().take(8).collect::<String>())
        .unwrap_or_else(|| "working tree".to_string());
    format!("docs: update for {revision} using template {template} ({file_count} files)")
}

/// 输出目录下的路径不作为源文件处理
fn is_output_path(path: &Path) -> bool {
    matches!(path.components().next(), Some(Component::Normal(first)) if first == DOCS_DIR)
}

fn write_output(path: &Path, content: &str) -> Result<()> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)?;
    }
    fs::write(path, content).map_err(|e| {
        DocScopeError::IoError(std::io::Error::new(
            e.kind(),
            format!("Failed to write {}: {e}", path.display()),
        ))
    })
}
