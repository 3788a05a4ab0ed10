use std::path::Path;

use pdfner_config::LlmConfig;
use pdfner_core::entity::Entity;
use pdfner_engine::{Highlighter, Selection, WriteReport, WriterChain};
use pdfner_io::{
    ChatTransport, ExtractionClient, HighlightRequest, JsonLinesFacade, ReqwestTransport,
    parse_entities,
};
use tracing::info;

use crate::errors::FrontendError;
use crate::loader::RequestSource;
use crate::writers::{JsonLinesWriter, StdoutWriter};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RunSummary {
    pub entities: usize,
    pub highlights: usize,
    pub skipped: usize,
    pub report: WriteReport,
}

/// 抽取、定位、写入的完整流程。
pub struct Pipeline<T = ReqwestTransport> {
    client: ExtractionClient<T>,
    highlighter: Highlighter,
}

impl Pipeline<ReqwestTransport> {
    pub fn new() -> Self {
        Self::with_parts(ExtractionClient::new(), Highlighter::default())
    }
}

impl Default for Pipeline<ReqwestTransport> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T: ChatTransport> Pipeline<T> {
    pub fn with_parts(client: ExtractionClient<T>, highlighter: Highlighter) -> Self {
        Self {
            client,
            highlighter,
        }
    }

    /// 离线请求直接解析附带的模型输出，否则调用模型。
    pub async fn entities(
        &self,
        config: &LlmConfig,
        request: &HighlightRequest,
    ) -> Result<Vec<Entity>, FrontendError> {
        match &request.model_output {
            Some(raw) => {
                info!("使用请求中附带的模型输出");
                Ok(parse_entities(raw, &request.text)?)
            }
            None => Ok(self.client.extract(config, &request.text).await?),
        }
    }

    pub async fn run(
        &self,
        config: &LlmConfig,
        request: &HighlightRequest,
        chain: &WriterChain,
    ) -> Result<RunSummary, FrontendError> {
        let entities = self.entities(config, request).await?;
        let selection = Selection::new(
            request.text.clone(),
            request.page_index,
            request.selection_rects.clone(),
        );
        let plan = self
            .highlighter
            .plan(&selection, request.page.as_ref(), &entities);
        let report = chain.write_all(&plan.annotations);
        info!(
            entities = entities.len(),
            written = report.written,
            failed = report.failed,
            "高亮写入完成"
        );

        Ok(RunSummary {
            entities: entities.len(),
            highlights: plan.annotations.len(),
            skipped: plan.skipped,
            report,
        })
    }
}

/// 配置了输出文件时先写文件，再写标准输出。
pub fn build_writer_chain(jsonl_path: Option<&Path>) -> WriterChain {
    let mut chain = WriterChain::new();
    if let Some(path) = jsonl_path {
        chain.register(JsonLinesWriter::new(JsonLinesFacade::new(path)));
    }
    chain.register(StdoutWriter);
    chain
}

pub fn print_summary(source: &RequestSource, summary: &RunSummary) {
    let origin = match source {
        RequestSource::File(path) | RequestSource::Env(path) => path.display().to_string(),
        RequestSource::Demo => "内置示例".to_string(),
    };
    eprintln!("请求来源：{origin}");
    eprintln!(
        "实体 {} 个，生成高亮 {} 个，跳过 {} 个",
        summary.entities, summary.highlights, summary.skipped
    );
    eprintln!(
        "写入成功 {} 个，失败 {} 个",
        summary.report.written, summary.report.failed
    );
}
