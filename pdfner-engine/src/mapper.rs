use pdfner_core::geometry::{Rect, merge_rects};
use pdfner_core::layout::PageLayout;

use crate::errors::EngineError;
use crate::glyph::{PageText, WidthModel};
use crate::locate::{Anchor, TextLocator};

/// 页面级字符映射：把相对片段的实体偏移换算为页面上的合并矩形。
#[derive(Debug, Clone)]
pub struct PageMapper {
    page_index: usize,
    page_text: PageText,
}

impl PageMapper {
    pub fn new(page: &PageLayout, widths: &dyn WidthModel) -> Self {
        Self {
            page_index: page.page_index,
            page_text: PageText::build(page, widths),
        }
    }

    #[inline]
    pub fn page_index(&self) -> usize {
        self.page_index
    }

    /// 在页面全文中定位片段。
    pub fn locate(&self, locator: &dyn TextLocator, snippet: &str) -> Result<Anchor, EngineError> {
        locator
            .locate(self.page_text.text(), snippet)
            .ok_or(EngineError::SnippetNotLocated)
    }

    /// 页面字符区间 `[start, end)` 的矩形：滤掉可忽略的占位矩形后按行合并。
    pub fn rects_for_range(&self, start: usize, end: usize) -> Vec<Rect> {
        let rects: Vec<Rect> = self
            .page_text
            .slice(start, end)
            .iter()
            .map(|position| position.rect)
            .filter(|rect| !rect.is_negligible())
            .collect();
        merge_rects(&rects)
    }

    /// 片段锚定后，把相对片段的实体偏移映射为页面矩形。
    pub fn rects_for_entity(&self, anchor: Anchor, entity_start: usize, entity_end: usize) -> Vec<Rect> {
        self.rects_for_range(anchor.offset + entity_start, anchor.offset + entity_end)
    }
}
