//! 仅有选区整体矩形（无逐字符排版）时，按字符比例插值出实体的子矩形。

use pdfner_core::geometry::Rect;
use pdfner_core::layout::LineAllocation;

/// 按矩形宽度比例，把 `total_chars` 个字符分配到各行。
///
/// 结果首尾相接且覆盖全部字符：第一行从 0 开始，最后一行止于 `total_chars`。
pub fn allocate_lines(total_chars: usize, rects: &[Rect]) -> Vec<LineAllocation> {
    if rects.is_empty() || total_chars == 0 {
        return Vec::new();
    }

    let widths: Vec<f64> = rects.iter().map(|rect| rect.width().abs()).collect();
    let total_width: f64 = widths.iter().sum();

    // 总宽度为零时平均分配。
    if total_width <= 0.0 {
        let per_line = total_chars.div_ceil(rects.len());
        return rects
            .iter()
            .enumerate()
            .map(|(index, rect)| {
                let is_last = index + 1 == rects.len();
                LineAllocation {
                    rect_index: index,
                    char_start: (index * per_line).min(total_chars),
                    char_end: if is_last {
                        total_chars
                    } else {
                        ((index + 1) * per_line).min(total_chars)
                    },
                    rect: *rect,
                }
            })
            .collect();
    }

    let mut allocations = Vec::with_capacity(rects.len());
    let mut cursor = 0usize;
    for (index, rect) in rects.iter().enumerate() {
        let is_last = index + 1 == rects.len();
        let chars_for_line = if is_last {
            total_chars - cursor
        } else {
            (widths[index] / total_width * total_chars as f64).round() as usize
        };
        let char_end = (cursor + chars_for_line).min(total_chars);
        allocations.push(LineAllocation {
            rect_index: index,
            char_start: cursor,
            char_end,
            rect: *rect,
        });
        cursor = char_end;
    }
    allocations
}

/// 在一行矩形内，把 `[target_start, target_end)` 映射为水平插值后的子矩形。
fn interpolate_x(
    rect: Rect,
    line_start: usize,
    line_end: usize,
    target_start: usize,
    target_end: usize,
) -> Rect {
    let line_len = line_end.saturating_sub(line_start);
    if line_len == 0 {
        return rect;
    }
    let start_ratio = (target_start - line_start) as f64 / line_len as f64;
    let end_ratio = (target_end - line_start) as f64 / line_len as f64;
    rect.with_x(rect.lerp_x(start_ratio), rect.lerp_x(end_ratio))
}

/// 计算实体 `[entity_start, entity_end)` 在整段选区中的矩形。
///
/// `full_rects` 为空、区间为空或起点越界时返回空列表；终点会被截断到文本长度。
pub fn entity_rects(
    full_text: &str,
    full_rects: &[Rect],
    entity_start: usize,
    entity_end: usize,
) -> Vec<Rect> {
    let total_chars = full_text.chars().count();
    if full_rects.is_empty() || entity_end <= entity_start || entity_start >= total_chars {
        return Vec::new();
    }
    let clamped_end = entity_end.min(total_chars);

    if let [single] = full_rects {
        return vec![interpolate_x(
            *single,
            0,
            total_chars,
            entity_start,
            clamped_end,
        )];
    }

    allocate_lines(total_chars, full_rects)
        .into_iter()
        .filter(|line| {
            !line.is_empty() && line.char_end > entity_start && line.char_start < clamped_end
        })
        .map(|line| {
            let overlap_start = entity_start.max(line.char_start);
            let overlap_end = clamped_end.min(line.char_end);
            if overlap_start == line.char_start && overlap_end == line.char_end {
                line.rect
            } else {
                interpolate_x(
                    line.rect,
                    line.char_start,
                    line.char_end,
                    overlap_start,
                    overlap_end,
                )
            }
        })
        .collect()
}
