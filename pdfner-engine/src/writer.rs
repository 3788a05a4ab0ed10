use pdfner_core::annotation::HighlightAnnotation;
use tracing::{debug, warn};

/// 注释写入端。返回 `false` 表示本端无法写入，交由链上的下一个写入端。
pub trait AnnotationWriter: Send + Sync {
    fn name(&self) -> &'static str;
    fn write(&self, annotation: &HighlightAnnotation) -> bool;
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct WriteReport {
    pub written: usize,
    pub failed: usize,
    /// 每条成功写入的注释由哪个写入端接收。
    pub accepted_by: Vec<&'static str>,
}

/// 按注册顺序尝试写入端，第一个接受的写入端生效。
#[derive(Default)]
pub struct WriterChain {
    writers: Vec<Box<dyn AnnotationWriter>>,
}

impl WriterChain {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register<W: AnnotationWriter + 'static>(&mut self, writer: W) {
        self.writers.push(Box::new(writer));
    }

    pub fn is_empty(&self) -> bool {
        self.writers.is_empty()
    }

    pub fn write_one(&self, annotation: &HighlightAnnotation) -> Option<&'static str> {
        for writer in &self.writers {
            if writer.write(annotation) {
                debug!(writer = writer.name(), text = %annotation.text, "注释已写入");
                return Some(writer.name());
            }
        }
        warn!(text = %annotation.text, "所有写入端均拒绝该注释");
        None
    }

    /// 逐条写入；单条失败不影响其余注释。
    pub fn write_all(&self, annotations: &[HighlightAnnotation]) -> WriteReport {
        let mut report = WriteReport::default();
        for annotation in annotations {
            match self.write_one(annotation) {
                Some(name) => {
                    report.written += 1;
                    report.accepted_by.push(name);
                }
                None => report.failed += 1,
            }
        }
        report
    }

    pub fn available_writers(&self) -> impl Iterator<Item = &'static str> + '_ {
        self.writers.iter().map(|writer| writer.name())
    }
}
