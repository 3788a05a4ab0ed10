use std::fs::{self, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};

use pdfner_core::annotation::HighlightAnnotation;
use pdfner_core::geometry::Rect;
use pdfner_core::layout::PageLayout;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::warn;

pub mod llm;
pub mod repair;

pub use llm::{ChatTransport, ExtractError, ExtractionClient, ReqwestTransport, RetryPolicy};
pub use repair::{RepairError, parse_entities};

#[derive(Debug, Error)]
pub enum IoError {
    #[error("failed to read file {path:?}: {source}")]
    ReadError {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("failed to write file {path:?}: {source}")]
    WriteError {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("invalid highlight request: {source}")]
    InvalidRequest {
        #[source]
        source: serde_json::Error,
    },
    #[error("failed to encode annotation: {source}")]
    Encode {
        #[source]
        source: serde_json::Error,
    },
}

/// 一次高亮请求：选中文本、选区矩形，以及可选的整页排版和离线模型输出。
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HighlightRequest {
    pub text: String,
    #[serde(default)]
    pub page_index: usize,
    #[serde(default)]
    pub selection_rects: Vec<Rect>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub page: Option<PageLayout>,
    /// 提供时跳过网络请求，直接修复并解析这段模型输出。
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub model_output: Option<String>,
}

impl HighlightRequest {
    #[inline]
    pub fn is_replay(&self) -> bool {
        self.model_output.is_some()
    }
}

pub trait RequestLoader {
    fn load(&self, path: &Path) -> Result<HighlightRequest, IoError>;
    fn parse(&self, data: &str) -> Result<HighlightRequest, IoError>;
}

pub trait AnnotationSaver {
    fn save(&self, annotation: &HighlightAnnotation) -> Result<(), IoError>;
}

pub struct JsonRequestFacade;

impl JsonRequestFacade {
    pub fn new() -> Self {
        Self
    }
}

impl Default for JsonRequestFacade {
    fn default() -> Self {
        Self::new()
    }
}

impl RequestLoader for JsonRequestFacade {
    fn load(&self, path: &Path) -> Result<HighlightRequest, IoError> {
        let data = fs::read_to_string(path).map_err(|source| IoError::ReadError {
            path: path.to_path_buf(),
            source,
        })?;
        self.parse(&data)
    }

    fn parse(&self, data: &str) -> Result<HighlightRequest, IoError> {
        let request: HighlightRequest =
            serde_json::from_str(data).map_err(|source| IoError::InvalidRequest { source })?;
        if let Some(page) = &request.page {
            if page.page_index != request.page_index {
                warn!(
                    request = request.page_index,
                    layout = page.page_index,
                    "页面排版的页码与请求不一致，注释使用请求页码"
                );
            }
        }
        Ok(request)
    }
}

/// 以 JSON Lines 形式把注释追加到文件。
#[derive(Debug, Clone)]
pub struct JsonLinesFacade {
    path: PathBuf,
}

impl JsonLinesFacade {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl AnnotationSaver for JsonLinesFacade {
    fn save(&self, annotation: &HighlightAnnotation) -> Result<(), IoError> {
        let mut line =
            serde_json::to_string(annotation).map_err(|source| IoError::Encode { source })?;
        line.push('\n');

        let write_error = |source| IoError::WriteError {
            path: self.path.clone(),
            source,
        };
        let mut file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)
            .map_err(write_error)?;
        file.write_all(line.as_bytes()).map_err(write_error)
    }
}
