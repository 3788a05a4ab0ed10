//! 由文本段（run）级排版推导逐字符矩形。
//!
//! 缺少真实字形度量时，用字符类别的相对宽度估算每个字符的占位，
//! 并按整段实际宽度归一化，保证各字符宽度之和与段宽一致。

use pdfner_core::geometry::Rect;
use pdfner_core::layout::{CharPosition, PageLayout, TextRun};
use tracing::trace;

/// 字符相对宽度策略。
pub trait WidthModel: Send + Sync {
    fn relative_width(&self, ch: char) -> f64;
}

const NARROW: &[char] = &['i', 'l', '1', '|', '\'', '!', '.', ':', ';', ','];
const MEDIUM_NARROW: &[char] = &[
    'f', 't', 'j', 'r', 'I', 'J', '(', ')', '[', ']', '{', '}', '/', '-',
];
const WIDE: &[char] = &['m', 'w', 'M', 'W', '@', '&'];

/// 按字符类别估算的相对宽度（平均字符为 1.0）。
#[derive(Debug, Clone, Copy, Default)]
pub struct HeuristicWidths;

impl HeuristicWidths {
    fn is_extra_wide(ch: char) -> bool {
        matches!(
            ch as u32,
            0x2014
                | 0x1100..=0x115F
                | 0x2E80..=0x303E
                | 0x3041..=0x33FF
                | 0x3400..=0x4DBF
                | 0x4E00..=0x9FFF
                | 0xA000..=0xA4CF
                | 0xAC00..=0xD7A3
                | 0xF900..=0xFAFF
                | 0xFE30..=0xFE4F
                | 0xFF00..=0xFF60
                | 0xFFE0..=0xFFE6
        )
    }
}

impl WidthModel for HeuristicWidths {
    fn relative_width(&self, ch: char) -> f64 {
        if ch == ' ' || ch == '\t' {
            0.5
        } else if NARROW.contains(&ch) {
            0.35
        } else if MEDIUM_NARROW.contains(&ch) {
            0.55
        } else if WIDE.contains(&ch) {
            1.3
        } else if Self::is_extra_wide(ch) {
            1.7
        } else if ch.is_ascii_digit() {
            0.85
        } else if ch.is_uppercase() {
            1.1
        } else {
            1.0
        }
    }
}

/// 所有字符等宽，便于测试得到确定的几何。
#[derive(Debug, Clone, Copy, Default)]
pub struct UniformWidths;

impl WidthModel for UniformWidths {
    fn relative_width(&self, _ch: char) -> f64 {
        1.0
    }
}

/// 把 `total_width` 按相对宽度分摊到 `text` 的每个字符上。
pub fn estimate_char_widths(model: &dyn WidthModel, text: &str, total_width: f64) -> Vec<f64> {
    let weights: Vec<f64> = text.chars().map(|ch| model.relative_width(ch)).collect();
    let sum: f64 = weights.iter().sum();
    if weights.is_empty() {
        return weights;
    }
    if sum <= 0.0 {
        let even = total_width / weights.len() as f64;
        return vec![even; weights.len()];
    }
    weights.iter().map(|w| w * total_width / sum).collect()
}

/// 页面的全文及与之逐字符对齐的位置序列。
#[derive(Debug, Clone, Default)]
pub struct PageText {
    text: String,
    positions: Vec<CharPosition>,
}

impl PageText {
    /// 基于页面排版构建逐字符位置；带 `has_eol` 的段之后追加零宽 `\n`。
    pub fn build(page: &PageLayout, model: &dyn WidthModel) -> Self {
        let mut text = String::new();
        let mut positions = Vec::new();

        for run in &page.runs {
            let (top, bottom) = vertical_extent(run);
            let rects = run_char_rects(run, model, top, bottom);
            for (ch, rect) in run.text.chars().zip(rects) {
                text.push(ch);
                positions.push(CharPosition {
                    ch,
                    rect,
                    page_index: page.page_index,
                });
            }
            if run.has_eol {
                let x = run.x + run.width;
                text.push('\n');
                positions.push(CharPosition {
                    ch: '\n',
                    rect: Rect::new(x, top, x, bottom),
                    page_index: page.page_index,
                });
            }
        }

        trace!(
            page = page.page_index,
            chars = positions.len(),
            "页面逐字符位置已构建"
        );
        Self { text, positions }
    }

    #[inline]
    pub fn text(&self) -> &str {
        &self.text
    }

    #[inline]
    pub fn positions(&self) -> &[CharPosition] {
        &self.positions
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.positions.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.positions.is_empty()
    }

    /// `[start, end)` 对应的字符位置，越界部分被截断。
    pub fn slice(&self, start: usize, end: usize) -> &[CharPosition] {
        let end = end.min(self.positions.len());
        let start = start.min(end);
        &self.positions[start..end]
    }
}

/// 基线下移 25% 字高，使矩形居中覆盖字形而非贴着基线。
fn vertical_extent(run: &TextRun) -> (f64, f64) {
    let top = run.y - run.height * 0.25;
    (top, top + run.height)
}

fn run_char_rects(run: &TextRun, model: &dyn WidthModel, top: f64, bottom: f64) -> Vec<Rect> {
    if let Some(exact) = run.exact_char_rects() {
        return exact.to_vec();
    }

    let widths = estimate_char_widths(model, &run.text, run.width);
    let count = widths.len();
    let mut rects = Vec::with_capacity(count);
    let mut left = run.x;
    for (index, width) in widths.into_iter().enumerate() {
        // 最后一个字符直接对齐到段的右边，避免累加误差。
        let right = if index + 1 == count {
            run.x + run.width
        } else {
            left + width
        };
        rects.push(Rect::new(left, top, right, bottom));
        left = right;
    }
    rects
}
