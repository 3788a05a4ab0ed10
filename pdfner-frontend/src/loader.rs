use std::env;
use std::path::{Path, PathBuf};

use pdfner_core::geometry::Rect;
use pdfner_core::layout::{PageLayout, TextRun};
use pdfner_io::{HighlightRequest, JsonRequestFacade, RequestLoader};
use serde_json::json;
use tracing::{info, warn};

use crate::errors::FrontendError;

pub const REQUEST_ENV: &str = "PDFNER_REQUEST";

/// 请求来源，便于在摘要中说明。
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RequestSource {
    File(PathBuf),
    Env(PathBuf),
    Demo,
}

#[derive(Debug, Clone)]
pub struct LoadedRequest {
    pub request: HighlightRequest,
    pub source: RequestSource,
}

/// 依次使用命令行路径、环境变量 `PDFNER_REQUEST`、内置示例。
///
/// 命令行显式给出的文件读取失败时返回错误；环境变量指向的文件失败时回退到内置示例。
pub fn load_request(explicit: Option<&Path>) -> Result<LoadedRequest, FrontendError> {
    let loader = JsonRequestFacade::new();
    if let Some(path) = explicit {
        let request = loader.load(path)?;
        info!(path = %path.display(), "已加载高亮请求");
        return Ok(LoadedRequest {
            request,
            source: RequestSource::File(path.to_path_buf()),
        });
    }

    if let Some(path) = env::var_os(REQUEST_ENV) {
        let path = PathBuf::from(path);
        match loader.load(&path) {
            Ok(request) => {
                info!(path = %path.display(), "从环境变量加载高亮请求");
                return Ok(LoadedRequest {
                    request,
                    source: RequestSource::Env(path),
                });
            }
            Err(err) => {
                warn!(path = %path.display(), error = %err, "加载请求失败，回退到内置示例");
            }
        }
    }

    Ok(LoadedRequest {
        request: demo_request(),
        source: RequestSource::Demo,
    })
}

/// 离线示例：跨三行的选区，附带整页排版与一段带代码块的模型输出。
pub fn demo_request() -> HighlightRequest {
    let page = PageLayout::new(
        0,
        vec![
            TextRun::new("Results. We fine-tune", 72.0, 700.0, 210.0, 10.0).with_eol(),
            TextRun::new("BERT on GLUE and", 72.0, 686.0, 160.0, 10.0).with_eol(),
            TextRun::new("report accuracy.", 72.0, 672.0, 160.0, 10.0),
        ],
    );
    let model_output = json!({
        "entities": [
            {"text": "BERT", "type": "method", "start": 10, "end": 14},
            {"text": "GLUE", "type": "dataset", "start": 18, "end": 22},
            {"text": "accuracy", "type": "metric", "start": 35, "end": 43},
        ]
    });

    HighlightRequest {
        text: "fine-tune BERT on GLUE and report accuracy".to_string(),
        page_index: 0,
        selection_rects: vec![
            Rect::new(192.0, 697.5, 282.0, 707.5),
            Rect::new(72.0, 683.5, 232.0, 693.5),
            Rect::new(72.0, 669.5, 222.0, 679.5),
        ],
        page: Some(page),
        model_output: Some(format!("```json\n{model_output}\n```")),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn explicit_missing_file_is_an_error() {
        let err = load_request(Some(Path::new("/nonexistent/pdfner.json"))).unwrap_err();
        assert!(matches!(err, FrontendError::Request(_)));
    }

    #[test]
    fn explicit_file_is_loaded() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("request.json");
        std::fs::write(&path, r#"{"text":"GLUE","selectionRects":[[0,0,40,10]]}"#).unwrap();
        let loaded = load_request(Some(&path)).unwrap();
        assert_eq!(loaded.source, RequestSource::File(path));
        assert_eq!(loaded.request.text, "GLUE");
        assert!(!loaded.request.is_replay());
    }

    #[test]
    fn demo_request_replays_offline() {
        let request = demo_request();
        assert!(request.is_replay());
        assert_eq!(request.selection_rects.len(), 3);
    }
}
