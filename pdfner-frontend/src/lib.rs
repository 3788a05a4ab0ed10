pub mod cli;
pub mod errors;
pub mod loader;
pub mod writers;

use std::path::PathBuf;

use cli::{Pipeline, RunSummary, build_writer_chain, print_summary};
use errors::FrontendError;
use pdfner_config::AppConfig;
use tracing::info;

/// 命令行可覆盖的运行参数。
#[derive(Debug, Clone, Default)]
pub struct RunOptions {
    pub request: Option<PathBuf>,
    /// 优先于配置中的 `output.jsonl_path`。
    pub output: Option<PathBuf>,
}

/// 加载请求并执行一次完整的抽取与高亮。
pub async fn run_cli(config: &AppConfig, options: &RunOptions) -> Result<RunSummary, FrontendError> {
    info!("启动 CLI 前端");
    let loaded = loader::load_request(options.request.as_deref())?;
    let output = options
        .output
        .as_deref()
        .or(config.output.jsonl_path.as_deref());
    let chain = build_writer_chain(output);
    info!(writers = ?chain.available_writers().collect::<Vec<_>>(), "注释写入链");

    let summary = Pipeline::new()
        .run(&config.llm, &loaded.request, &chain)
        .await?;
    print_summary(&loaded.source, &summary);
    Ok(summary)
}
