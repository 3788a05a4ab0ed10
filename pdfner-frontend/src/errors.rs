use pdfner_io::{ExtractError, IoError, RepairError};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum FrontendError {
    #[error("加载高亮请求失败: {0}")]
    Request(#[from] IoError),
    #[error("实体抽取失败: {0}")]
    Extract(#[from] ExtractError),
    #[error("离线模型输出无法解析: {0}")]
    Replay(#[from] RepairError),
}
