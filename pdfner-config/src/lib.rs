use std::env;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::Deserialize;
use thiserror::Error;

const CONFIG_ENV: &str = "PDFNER_CONFIG";
const API_KEY_ENV: &str = "PDFNER_API_KEY";

pub const DEFAULT_BASE_URL: &str = "https://openrouter.ai/api/v1";
pub const DEFAULT_MODEL: &str = "z-ai/glm-4.5-air:free";

/// 内置的学术 NER 系统提示词，`system_prompt` 为空时使用。
pub const DEFAULT_SYSTEM_PROMPT: &str = r#"You are an academic named-entity recognition (NER) engine.

Given a text passage, extract all named entities and return ONLY a JSON object (no markdown, no explanation) in this exact format:
{"entities":[{"text":"exact text","type":"TYPE","start":0,"end":5}]}

Entity types:
1. METHOD - algorithms, models, architectures, techniques (e.g., "BERT", "gradient descent")
2. DATASET - named datasets, benchmarks (e.g., "ImageNet", "GLUE")
3. METRIC - evaluation measures, scores (e.g., "F1 score", "accuracy", "95%")
4. TASK - research problems, objectives (e.g., "object detection", "NER")
5. PERSON - researchers, authors (e.g., "Vaswani", "Hinton")
6. MATERIAL - chemicals, genes, proteins, substances (e.g., "dopamine", "graphene")
7. INSTITUTION - organizations, universities, companies (e.g., "MIT", "Google")
8. TERM - key technical terms, theories, concepts (e.g., "attention mechanism", "overfitting")

Rules:
- "start" is the 0-based character offset where the entity begins in the input text.
- "end" is the exclusive character offset (start + length of entity text).
- "text" must be the exact substring from the input at [start, end).
- Return ONLY valid JSON. No markdown code fences, no commentary.
- If no entities found, return {"entities":[]}."#;

/// 应用配置的根结构。
#[derive(Debug, Clone, Default, Deserialize)]
pub struct AppConfig {
    #[serde(default)]
    pub logging: LoggingConfig,
    #[serde(default)]
    pub llm: LlmConfig,
    #[serde(default)]
    pub output: OutputConfig,
}

impl AppConfig {
    /// 从显式路径加载配置。
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let content = fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        toml::from_str(&content).map_err(|source| ConfigError::Parse {
            path: path.to_path_buf(),
            source,
        })
    }

    /// 自动发现配置文件：优先读取环境变量 `PDFNER_CONFIG`，否则寻找 `./config/default.toml`。
    /// 若文件缺失，则返回默认配置。
    pub fn discover() -> Result<Self, ConfigError> {
        if let Some(path) = env::var_os(CONFIG_ENV) {
            return Self::from_file(PathBuf::from(path));
        }

        let default_path = env::current_dir()
            .map(|dir| dir.join("config").join("default.toml"))
            .map_err(|source| ConfigError::Context {
                message: "获取当前工作目录失败".to_string(),
                source,
            })?;

        if default_path.exists() {
            Self::from_file(default_path)
        } else {
            Ok(Self::default())
        }
    }
}

/// 日志配置，支持设置默认等级。
#[derive(Debug, Clone, Deserialize)]
pub struct LoggingConfig {
    #[serde(default = "LoggingConfig::default_level")]
    pub level: String,
}

impl LoggingConfig {
    fn default_level() -> String {
        "info".to_string()
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: Self::default_level(),
        }
    }
}

/// 大模型接入参数。每次请求时读取，修改后无需重启即可生效。
#[derive(Debug, Clone, Deserialize)]
pub struct LlmConfig {
    #[serde(default)]
    pub api_key: String,
    #[serde(default = "LlmConfig::default_base_url")]
    pub base_url: String,
    #[serde(default = "LlmConfig::default_model")]
    pub model: String,
    /// 为空时使用 [`DEFAULT_SYSTEM_PROMPT`]。
    #[serde(default)]
    pub system_prompt: String,
    #[serde(default = "LlmConfig::default_timeout_secs")]
    pub timeout_secs: u64,
    #[serde(default = "LlmConfig::default_max_attempts")]
    pub max_attempts: u32,
    #[serde(default = "LlmConfig::default_base_backoff_ms")]
    pub base_backoff_ms: u64,
}

impl LlmConfig {
    fn default_base_url() -> String {
        DEFAULT_BASE_URL.to_string()
    }

    fn default_model() -> String {
        DEFAULT_MODEL.to_string()
    }

    fn default_timeout_secs() -> u64 {
        30
    }

    fn default_max_attempts() -> u32 {
        3
    }

    fn default_base_backoff_ms() -> u64 {
        1_000
    }

    /// `{base_url}/chat/completions`，会去掉末尾多余的斜杠；空值回退到默认地址。
    pub fn endpoint(&self) -> String {
        let base = self.base_url.trim();
        let base = if base.is_empty() {
            DEFAULT_BASE_URL
        } else {
            base
        };
        format!("{}/chat/completions", base.trim_end_matches('/'))
    }

    pub fn effective_model(&self) -> &str {
        let model = self.model.trim();
        if model.is_empty() { DEFAULT_MODEL } else { model }
    }

    pub fn effective_system_prompt(&self) -> &str {
        if self.system_prompt.trim().is_empty() {
            DEFAULT_SYSTEM_PROMPT
        } else {
            &self.system_prompt
        }
    }

    /// 仅在配置了非空密钥时返回。
    pub fn bearer_token(&self) -> Option<&str> {
        let key = self.api_key.trim();
        (!key.is_empty()).then_some(key)
    }

    #[inline]
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }

    /// 配置文件中未填写密钥时，使用环境变量 `PDFNER_API_KEY`。
    pub fn with_env_overrides(self) -> Self {
        let key = env::var(API_KEY_ENV).ok();
        self.with_api_key_fallback(key)
    }

    pub fn with_api_key_fallback(mut self, key: Option<String>) -> Self {
        if self.bearer_token().is_none() {
            if let Some(key) = key.filter(|k| !k.trim().is_empty()) {
                self.api_key = key;
            }
        }
        self
    }
}

impl Default for LlmConfig {
    fn default() -> Self {
        Self {
            api_key: String::new(),
            base_url: Self::default_base_url(),
            model: Self::default_model(),
            system_prompt: String::new(),
            timeout_secs: Self::default_timeout_secs(),
            max_attempts: Self::default_max_attempts(),
            base_backoff_ms: Self::default_base_backoff_ms(),
        }
    }
}

/// 注释输出设置。
#[derive(Debug, Clone, Default, Deserialize)]
pub struct OutputConfig {
    /// 设置后，高亮注释会以 JSON Lines 形式追加到该文件。
    #[serde(default)]
    pub jsonl_path: Option<PathBuf>,
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("读取配置文件 {path:?} 失败: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("解析配置文件 {path:?} 失败: {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: toml::de::Error,
    },
    #[error("{message}")]
    Context {
        message: String,
        #[source]
        source: std::io::Error,
    },
}
