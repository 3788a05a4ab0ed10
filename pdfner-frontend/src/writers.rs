use std::io::{self, Write};

use pdfner_core::annotation::HighlightAnnotation;
use pdfner_engine::AnnotationWriter;
use pdfner_io::{AnnotationSaver, JsonLinesFacade};
use tracing::warn;

/// 追加到 JSON Lines 文件。
pub struct JsonLinesWriter {
    sink: JsonLinesFacade,
}

impl JsonLinesWriter {
    pub fn new(sink: JsonLinesFacade) -> Self {
        Self { sink }
    }
}

impl AnnotationWriter for JsonLinesWriter {
    fn name(&self) -> &'static str {
        "jsonl"
    }

    fn write(&self, annotation: &HighlightAnnotation) -> bool {
        match self.sink.save(annotation) {
            Ok(()) => true,
            Err(err) => {
                warn!(path = %self.sink.path().display(), error = %err, "写入 JSON Lines 失败");
                false
            }
        }
    }
}

/// 逐行打印到标准输出。
pub struct StdoutWriter;

impl AnnotationWriter for StdoutWriter {
    fn name(&self) -> &'static str {
        "stdout"
    }

    fn write(&self, annotation: &HighlightAnnotation) -> bool {
        let Ok(line) = serde_json::to_string(annotation) else {
            return false;
        };
        writeln!(io::stdout().lock(), "{line}").is_ok()
    }
}
