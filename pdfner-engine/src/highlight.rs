use pdfner_core::annotation::HighlightAnnotation;
use pdfner_core::entity::Entity;
use pdfner_core::geometry::{Rect, merge_rects};
use pdfner_core::layout::PageLayout;
use tracing::{debug, info, warn};

use crate::errors::EngineError;
use crate::glyph::{HeuristicWidths, WidthModel};
use crate::interpolate;
use crate::locate::{Anchor, FuzzyLocator, MatchStrategy, TextLocator};
use crate::mapper::PageMapper;

/// 用户选中的文本及其在页面上的矩形。
#[derive(Debug, Clone, PartialEq)]
pub struct Selection {
    pub text: String,
    pub page_index: usize,
    pub rects: Vec<Rect>,
}

impl Selection {
    pub fn new(text: impl Into<String>, page_index: usize, rects: Vec<Rect>) -> Self {
        Self {
            text: text.into(),
            page_index,
            rects,
        }
    }
}

/// 矩形来源：页面逐字符映射，或选区比例插值。
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GeometrySource {
    Page(MatchStrategy),
    Interpolated,
}

#[derive(Debug, Clone, PartialEq)]
pub struct EntityGeometry {
    pub rects: Vec<Rect>,
    pub source: GeometrySource,
}

/// 一次请求的高亮结果，顺序与实体顺序一致。
#[derive(Debug, Clone, Default)]
pub struct HighlightPlan {
    pub annotations: Vec<HighlightAnnotation>,
    pub sources: Vec<GeometrySource>,
    /// 无法得到几何而被跳过的实体数。
    pub skipped: usize,
}

/// 把实体偏移转换为高亮注释。宽度模型与文本定位策略均可替换。
pub struct Highlighter {
    widths: Box<dyn WidthModel>,
    locator: Box<dyn TextLocator>,
}

impl Highlighter {
    pub fn new(widths: Box<dyn WidthModel>, locator: Box<dyn TextLocator>) -> Self {
        Self { widths, locator }
    }

    /// 为选区与可选的页面排版准备映射上下文；片段无法定位时退化为插值。
    fn anchor_page(&self, selection: &Selection, page: Option<&PageLayout>) -> Option<(PageMapper, Anchor)> {
        let page = page?;
        let mapper = PageMapper::new(page, self.widths.as_ref());
        match mapper.locate(self.locator.as_ref(), &selection.text) {
            Ok(anchor) => {
                debug!(offset = anchor.offset, strategy = ?anchor.strategy, "片段已在页面中定位");
                Some((mapper, anchor))
            }
            Err(err) => {
                warn!(page = page.page_index, error = %err, "退化为选区矩形插值");
                None
            }
        }
    }

    fn geometry(
        &self,
        selection: &Selection,
        anchored: Option<&(PageMapper, Anchor)>,
        entity: &Entity,
    ) -> Result<EntityGeometry, EngineError> {
        if let Some((mapper, anchor)) = anchored {
            let rects = mapper.rects_for_entity(*anchor, entity.start, entity.end);
            if !rects.is_empty() {
                return Ok(EntityGeometry {
                    rects,
                    source: GeometrySource::Page(anchor.strategy),
                });
            }
            debug!(text = %entity.text, "页面映射为空，改用插值");
        }

        let rects = merge_rects(&interpolate::entity_rects(
            &selection.text,
            &selection.rects,
            entity.start,
            entity.end,
        ));
        if rects.is_empty() {
            return Err(EngineError::NoGeometryOverlap {
                text: entity.text.clone(),
                start: entity.start,
                end: entity.end,
            });
        }
        Ok(EntityGeometry {
            rects,
            source: GeometrySource::Interpolated,
        })
    }

    /// 计算单个实体的矩形（偏移相对于选区文本）。
    pub fn entity_geometry(
        &self,
        selection: &Selection,
        page: Option<&PageLayout>,
        entity: &Entity,
    ) -> Result<EntityGeometry, EngineError> {
        let anchored = self.anchor_page(selection, page);
        self.geometry(selection, anchored.as_ref(), entity)
    }

    /// 按实体顺序生成高亮；单个实体失败只会减少产出，不会中断整批。
    pub fn plan(
        &self,
        selection: &Selection,
        page: Option<&PageLayout>,
        entities: &[Entity],
    ) -> HighlightPlan {
        let anchored = self.anchor_page(selection, page);
        let mut plan = HighlightPlan::default();

        for entity in entities {
            match self.geometry(selection, anchored.as_ref(), entity) {
                Ok(geometry) => {
                    plan.annotations.push(HighlightAnnotation::for_entity(
                        entity,
                        selection.page_index,
                        geometry.rects,
                    ));
                    plan.sources.push(geometry.source);
                }
                Err(err) => {
                    debug!(error = %err, "跳过实体");
                    plan.skipped += 1;
                }
            }
        }

        info!(
            highlights = plan.annotations.len(),
            skipped = plan.skipped,
            "高亮几何计算完成"
        );
        plan
    }
}

impl Default for Highlighter {
    fn default() -> Self {
        Self::new(Box::new(HeuristicWidths), Box::new(FuzzyLocator::default()))
    }
}
