//! 文档生成模块
//!
//! 为缺少文档的声明构建逐文件的生成请求，调用文本生成服务，
//! 并把返回的 `kind:name` 映射解析为生成文本。

use crate::error::{DocScopeError, Result};
use crate::parser::{Declaration, Language};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::debug;

/// 声明行之前纳入提示的行数
pub const WINDOW_BEFORE: usize = 10;
/// 声明行之后纳入提示的行数
pub const WINDOW_AFTER: usize = 30;

/// 文本生成服务
pub trait TextGenerationClient {
    /// 发送提示并返回生成的文本
    fn complete(&self, prompt: &str) -> Result<String>;
}

/// 文本生成服务配置
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GenerationConfig {
    pub endpoint: String,
    pub model: String,
    #[serde(skip_serializing)]
    pub api_key: Option<String>,
    pub max_output_tokens: u32,
    pub timeout: Duration,
}

impl Default for GenerationConfig {
    fn default() -> Self {
        Self {
            endpoint: String::new(),
            model: "groq-1".to_string(),
            api_key: None,
            max_output_tokens: 600,
            timeout: Duration::from_secs(20),
        }
    }
}

/// 请求体
#[derive(Serialize)]
struct CompletionBody<'a> {
    model: &'a str,
    input: &'a str,
    max_output_tokens: u32,
}

/// 基于 reqwest 阻塞客户端的 HTTP 传输
pub struct HttpTextClient {
    client: reqwest::blocking::Client,
    config: GenerationConfig,
}

impl HttpTextClient {
    /// 创建新的 HTTP 客户端
    pub fn new(config: GenerationConfig) -> Result<Self> {
        if config.endpoint.trim().is_empty() {
            return Err(DocScopeError::ConfigError(
                "Text generation endpoint is not configured".to_string(),
            ));
        }

        let client = reqwest::blocking::Client::builder()
            .timeout(config.timeout)
            .build()
            .map_err(|e| DocScopeError::GenerationError(format!("Failed to build HTTP client: {e}")))?;

        Ok(Self { client, config })
    }

    pub fn config(&self) -> &GenerationConfig {
        &self.config
    }
}

impl TextGenerationClient for HttpTextClient {
    fn complete(&self, prompt: &str) -> Result<String> {
        let body = CompletionBody {
            model: &self.config.model,
            input: prompt,
            max_output_tokens: self.config.max_output_tokens,
        };

        let mut request = self.client.post(&self.config.endpoint).json(&body);
        if let Some(api_key) = &self.config.api_key {
            request = request.bearer_auth(api_key);
        }

        let response = request
            .send()
            .map_err(|e| DocScopeError::GenerationError(format!("Generation request failed: {e}")))?;

        let status = response.status();
        let text = response.text().map_err(|e| {
            DocScopeError::GenerationError(format!("Failed to read generation response: {e}"))
        })?;

        if !status.is_success() {
            return Err(DocScopeError::GenerationError(format!(
                "HTTP {}: {text}",
                status.as_u16()
            )));
        }

        Ok(extract_response_text(&text))
    }
}

/// 从常见的响应信封中取出文本，都不匹配时返回原始响应体
pub fn extract_response_text(body: &str) -> String {
    let Ok(value) = serde_json::from_str::<Value>(body) else {
        return body.to_string();
    };

    const POINTERS: &[&str] = &[
        "/output_text",
        "/text",
        "/response",
        "/choices/0/message/content",
        "/choices/0/text",
        "/output/0/content/0/text",
    ];

    POINTERS
        .iter()
        .find_map(|pointer| value.pointer(pointer).and_then(Value::as_str))
        .map(str::to_string)
        .unwrap_or_else(|| body.to_string())
}

/// 一个待生成文档的声明
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GenerationTarget {
    pub keyword: String,
    pub name: String,
    pub line: u32,
}

impl GenerationTarget {
    /// `kind:name` 形式的响应键
    pub fn response_key(&self) -> String {
        format!("{}:{}", self.keyword, self.name)
    }
}

/// 单个文件的生成请求
#[derive(Debug, Clone)]
pub struct DocGenerationRequest {
    pub path: PathBuf,
    pub language: Language,
    pub targets: Vec<GenerationTarget>,
    pub prompt: String,
    /// 文件内每个名称出现过的关键字
    name_kinds: HashMap<String, BTreeSet<String>>,
}

impl DocGenerationRequest {
    /// 为 `undocumented` 下标指向的声明构建请求，没有目标时返回 `None`
    pub fn new(
        path: &Path,
        language: Language,
        source: &str,
        declarations: &[Declaration],
        undocumented: &[usize],
    ) -> Option<Self> {
        let targets: Vec<GenerationTarget> = undocumented
            .iter()
            .filter_map(|&index| declarations.get(index))
            .map(|decl| GenerationTarget {
                keyword: decl.keyword.clone(),
                name: decl.name.clone(),
                line: decl.start_line,
            })
            .collect();

        if targets.is_empty() {
            return None;
        }

        let mut name_kinds: HashMap<String, BTreeSet<String>> = HashMap::new();
        for decl in declarations {
            name_kinds
                .entry(decl.name.clone())
                .or_default()
                .insert(decl.keyword.clone());
        }

        let prompt = build_prompt(language, source, &targets);
        Some(Self {
            path: path.to_path_buf(),
            language,
            targets,
            prompt,
            name_kinds,
        })
    }

    fn has_target(&self, keyword: &str, name: &str) -> bool {
        self.targets
            .iter()
            .any(|t| t.keyword == keyword && t.name == name)
    }

    /// 名称在文件中只对应一种关键字时返回该关键字
    fn unambiguous_kind(&self, name: &str) -> Option<&str> {
        let kinds = self.name_kinds.get(name)?;
        if kinds.len() == 1 {
            kinds.iter().next().map(String::as_str)
        } else {
            None
        }
    }
}

fn build_prompt(language: Language, source: &str, targets: &[GenerationTarget]) -> String {
    let lines: Vec<&str> = source.lines().collect();
    let mut prompt = format!(
        "Generate concise API-style docstrings for the following {language} declarations. \
For each declaration, provide a 2-3 sentence description explaining what it does, \
its parameters (if applicable), and return value (if applicable). \
Format as JSON object mapping 'kind:name' to the docstring.\n\n"
    );

    for target in targets {
        let line = target.line as usize;
        let start = line.saturating_sub(WINDOW_BEFORE).min(lines.len());
        let end = (line + WINDOW_AFTER).min(lines.len());
        let window = lines[start..end].join("\n");

        prompt.push_str(&format!(
            "{} {} (line {}):\n{window}\n---\n\n",
            target.keyword, target.name, target.line
        ));
    }

    prompt
}

/// 解析后的生成文本
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct GeneratedDocs {
    /// (关键字, 名称) -> 文本
    docs: BTreeMap<(String, String), String>,
    /// 无法安全匹配而被忽略的键
    pub ignored_keys: Vec<String>,
}

impl GeneratedDocs {
    pub fn get(&self, keyword: &str, name: &str) -> Option<&str> {
        self.docs
            .get(&(keyword.to_string(), name.to_string()))
            .map(String::as_str)
    }

    pub fn insert(&mut self, keyword: &str, name: &str, body: &str) {
        self.docs
            .insert((keyword.to_string(), name.to_string()), body.to_string());
    }

    pub fn len(&self) -> usize {
        self.docs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.docs.is_empty()
    }
}

/// 解析生成服务返回的映射
///
/// 键必须是 `kind:name`。只有在 `allow_bare_names` 打开且名称在文件内没有歧义时，
/// 才接受只有名称的键。
pub fn parse_generated_docs(
    text: &str,
    request: &DocGenerationRequest,
    allow_bare_names: bool,
) -> Result<GeneratedDocs> {
    let mapping = first_json_object(text).ok_or_else(|| {
        DocScopeError::GenerationError(format!(
            "Response for {} contained no JSON object",
            request.path.display()
        ))
    })?;

    let mut generated = GeneratedDocs::default();
    for (key, value) in mapping {
        let Some(body) = value.as_str().map(str::trim).filter(|b| !b.is_empty()) else {
            generated.ignored_keys.push(key);
            continue;
        };

        let resolved = match key.split_once(':') {
            Some((keyword, name)) => request
                .has_target(keyword.trim(), name.trim())
                .then(|| (keyword.trim().to_string(), name.trim().to_string())),
            None if allow_bare_names => request
                .unambiguous_kind(key.trim())
                .filter(|keyword| request.has_target(keyword, key.trim()))
                .map(|keyword| (keyword.to_string(), key.trim().to_string())),
            None => None,
        };

        match resolved {
            Some((keyword, name)) if generated.get(&keyword, &name).is_none() => {
                generated.insert(&keyword, &name, body);
            }
            _ => generated.ignored_keys.push(key),
        }
    }

    debug!(
        "Parsed {} generated docs for {} ({} ignored)",
        generated.len(),
        request.path.display(),
        generated.ignored_keys.len()
    );
    Ok(generated)
}

/// 文本中出现的第一个完整 JSON 对象
fn first_json_object(text: &str) -> Option<Map<String, Value>> {
    text.match_indices('{').find_map(|(offset, _)| {
        serde_json::Deserializer::from_str(&text[offset..])
            .into_iter::<Map<String, Value>>()
            .next()
            .and_then(|parsed| parsed.ok())
    })
}

/// 文档生成器
pub struct DocGenerator<'a> {
    client: &'a dyn TextGenerationClient,
    allow_bare_names: bool,
}

impl<'a> DocGenerator<'a> {
    pub fn new(client: &'a dyn TextGenerationClient) -> Self {
        Self {
            client,
            allow_bare_names: false,
        }
    }

    /// 接受只有名称的旧式响应键
    pub fn with_bare_names(mut self, allow: bool) -> Self {
        self.allow_bare_names = allow;
        self
    }

    /// 为单个文件请求生成文本
    pub fn generate(&self, request: &DocGenerationRequest) -> Result<GeneratedDocs> {
        debug!(
            "Requesting docs for {} declarations in {}",
            request.targets.len(),
            request.path.display()
        );
        let text = self.client.complete(&request.prompt)?;
        parse_generated_docs(&text, request, self.allow_bare_names)
    }
}
