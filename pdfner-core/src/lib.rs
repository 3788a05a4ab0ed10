pub mod geometry {
    use glam::DVec2;
    use serde::{Deserialize, Serialize};

    /// 判定为同一行时，上下边允许的最大偏差。
    pub const SAME_LINE_TOLERANCE: f64 = 5.0;
    /// 相邻矩形之间允许合并的最大水平间隙（严格小于）。
    pub const ADJACENT_GAP: f64 = 10.0;
    /// 宽度低于该值的矩形视为可忽略（例如换行占位符）。
    pub const MIN_RECT_WIDTH: f64 = 0.1;

    /// 页面坐标系下的轴对齐矩形 `[x1, y1, x2, y2]`。
    ///
    /// 构造时保证 `x1 <= x2`；y 方向不做约束，因为基线坐标可能自上而下递减。
    #[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
    #[serde(from = "[f64; 4]", into = "[f64; 4]")]
    pub struct Rect {
        start: DVec2,
        end: DVec2,
    }

    impl Rect {
        /// 创建矩形；若 `x1 > x2` 则交换，修正舍入造成的退化矩形。
        #[inline]
        pub fn new(x1: f64, y1: f64, x2: f64, y2: f64) -> Self {
            let (x1, x2) = if x1 > x2 { (x2, x1) } else { (x1, x2) };
            Self {
                start: DVec2::new(x1, y1),
                end: DVec2::new(x2, y2),
            }
        }

        #[inline]
        pub fn x1(self) -> f64 {
            self.start.x
        }

        #[inline]
        pub fn y1(self) -> f64 {
            self.start.y
        }

        #[inline]
        pub fn x2(self) -> f64 {
            self.end.x
        }

        #[inline]
        pub fn y2(self) -> f64 {
            self.end.y
        }

        #[inline]
        pub fn width(self) -> f64 {
            self.end.x - self.start.x
        }

        #[inline]
        pub fn height(self) -> f64 {
            (self.end.y - self.start.y).abs()
        }

        /// 保持纵向范围不变，替换水平范围。
        #[inline]
        pub fn with_x(self, x1: f64, x2: f64) -> Self {
            Self::new(x1, self.start.y, x2, self.end.y)
        }

        /// 按比例 `t ∈ [0, 1]` 在左右边之间插值出的 x 坐标。
        #[inline]
        pub fn lerp_x(self, t: f64) -> f64 {
            self.start.x + t * (self.end.x - self.start.x)
        }

        #[inline]
        pub fn is_negligible(self) -> bool {
            self.width() < MIN_RECT_WIDTH
        }

        /// 上下边均在容差之内即视为同一行。
        #[inline]
        pub fn is_same_line(self, other: Rect) -> bool {
            (self.start.y - other.start.y).abs() <= SAME_LINE_TOLERANCE
                && (self.end.y - other.end.y).abs() <= SAME_LINE_TOLERANCE
        }

        /// 当前矩形右边到 `next` 左边的水平间隙，重叠时为负值。
        #[inline]
        pub fn horizontal_gap(self, next: Rect) -> f64 {
            next.start.x - self.end.x
        }

        #[inline]
        pub fn to_array(self) -> [f64; 4] {
            [self.start.x, self.start.y, self.end.x, self.end.y]
        }
    }

    impl From<[f64; 4]> for Rect {
        fn from(value: [f64; 4]) -> Self {
            Self::new(value[0], value[1], value[2], value[3])
        }
    }

    impl From<Rect> for [f64; 4] {
        fn from(value: Rect) -> Self {
            value.to_array()
        }
    }

    /// 按阅读顺序从左到右扫描，合并同一行且水平相邻的矩形。
    ///
    /// 不会排序：输入顺序必须已是阅读顺序。
    pub fn merge_rects(rects: &[Rect]) -> Vec<Rect> {
        let mut merged = Vec::with_capacity(rects.len());
        let mut iter = rects.iter().copied();
        let Some(mut current) = iter.next() else {
            return merged;
        };

        for next in iter {
            if current.is_same_line(next) && current.horizontal_gap(next) < ADJACENT_GAP {
                current = current.with_x(current.x1(), current.x2().max(next.x2()));
            } else {
                merged.push(current);
                current = next;
            }
        }
        merged.push(current);
        merged
    }

}

pub mod entity {
    use std::fmt;

    use serde::{Deserialize, Serialize};

    /// 未知实体类型使用的高亮颜色（黄色）。
    pub const FALLBACK_COLOR: &str = "#ffd400";

    /// 模型可识别的实体类型；未登记的标签以大写形式保留在 `Other` 中。
    #[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
    #[serde(from = "String", into = "String")]
    pub enum EntityType {
        Method,
        Dataset,
        Metric,
        Task,
        Person,
        Material,
        Institution,
        Term,
        Other(String),
    }

    impl EntityType {
        pub const KNOWN: [EntityType; 8] = [
            EntityType::Method,
            EntityType::Dataset,
            EntityType::Metric,
            EntityType::Task,
            EntityType::Person,
            EntityType::Material,
            EntityType::Institution,
            EntityType::Term,
        ];

        /// 大小写不敏感地解析类型标签。
        pub fn parse(raw: &str) -> Self {
            let tag = raw.trim().to_uppercase();
            match tag.as_str() {
                "METHOD" => EntityType::Method,
                "DATASET" => EntityType::Dataset,
                "METRIC" => EntityType::Metric,
                "TASK" => EntityType::Task,
                "PERSON" => EntityType::Person,
                "MATERIAL" => EntityType::Material,
                "INSTITUTION" => EntityType::Institution,
                "TERM" => EntityType::Term,
                _ => EntityType::Other(tag),
            }
        }

        pub fn as_str(&self) -> &str {
            match self {
                EntityType::Method => "METHOD",
                EntityType::Dataset => "DATASET",
                EntityType::Metric => "METRIC",
                EntityType::Task => "TASK",
                EntityType::Person => "PERSON",
                EntityType::Material => "MATERIAL",
                EntityType::Institution => "INSTITUTION",
                EntityType::Term => "TERM",
                EntityType::Other(tag) => tag,
            }
        }

        /// 高亮颜色，取自阅读器内置调色板。
        pub fn color(&self) -> &'static str {
            match self {
                EntityType::Method => "#2ea8e5",
                EntityType::Dataset => "#f19837",
                EntityType::Metric => "#ff6666",
                EntityType::Task => "#5fb236",
                EntityType::Person => "#ffd400",
                EntityType::Material => "#e56eee",
                EntityType::Institution => "#a28ae5",
                EntityType::Term => "#aaaaaa",
                EntityType::Other(_) => FALLBACK_COLOR,
            }
        }
    }

    impl From<String> for EntityType {
        fn from(value: String) -> Self {
            Self::parse(&value)
        }
    }

    impl From<EntityType> for String {
        fn from(value: EntityType) -> Self {
            value.as_str().to_string()
        }
    }

    impl fmt::Display for EntityType {
        fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
            f.write_str(self.as_str())
        }
    }

    /// 经过校验的命名实体。偏移量以 Unicode 标量（`char`）计数，`end` 为开区间。
    #[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
    pub struct Entity {
        pub text: String,
        #[serde(rename = "type")]
        pub kind: EntityType,
        pub start: usize,
        pub end: usize,
    }

    impl Entity {
        pub fn new(text: impl Into<String>, kind: EntityType, start: usize, end: usize) -> Self {
            Self {
                text: text.into(),
                kind,
                start,
                end,
            }
        }

        #[inline]
        pub fn len(&self) -> usize {
            self.end.saturating_sub(self.start)
        }

        #[inline]
        pub fn is_empty(&self) -> bool {
            self.len() == 0
        }
    }

    #[cfg(test)]
    mod tests {
        use super::*;

        #[test]
        fn parse_is_case_insensitive() {
            assert_eq!(EntityType::parse("method"), EntityType::Method);
            assert_eq!(EntityType::parse(" Dataset "), EntityType::Dataset);
            assert_eq!(
                EntityType::parse("gene"),
                EntityType::Other("GENE".to_string())
            );
        }

        #[test]
        fn every_known_type_has_its_own_color() {
            let mut colors: Vec<_> = EntityType::KNOWN.iter().map(|t| t.color()).collect();
            colors.sort_unstable();
            colors.dedup();
            assert_eq!(colors.len(), 8);
            assert_eq!(EntityType::parse("gene").color(), FALLBACK_COLOR);
        }

        #[test]
        fn entity_serializes_type_tag() {
            let entity = Entity::new("BERT", EntityType::parse("method"), 0, 4);
            let value = serde_json::to_value(&entity).unwrap();
            assert_eq!(value["type"], "METHOD");
            assert_eq!(value["end"], 4);
            let back: Entity = serde_json::from_value(value).unwrap();
            assert_eq!(back, entity);
        }
    }
}

pub mod chat {
    use serde::{Deserialize, Serialize};

    #[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
    #[serde(rename_all = "lowercase")]
    pub enum Role {
        System,
        User,
        Assistant,
    }

    #[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
    pub struct ChatMessage {
        pub role: Role,
        pub content: String,
    }

    impl ChatMessage {
        pub fn system(content: impl Into<String>) -> Self {
            Self {
                role: Role::System,
                content: content.into(),
            }
        }

        pub fn user(content: impl Into<String>) -> Self {
            Self {
                role: Role::User,
                content: content.into(),
            }
        }
    }
}

pub mod layout {
    use serde::{Deserialize, Serialize};

    use crate::geometry::Rect;

    /// 页面排版中的一段连续文本（共享同一渲染变换）。
    #[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
    #[serde(rename_all = "camelCase")]
    pub struct TextRun {
        pub text: String,
        /// 左侧 x 坐标。
        pub x: f64,
        /// 基线 y 坐标。
        pub y: f64,
        pub width: f64,
        pub height: f64,
        /// 为真时在该段之后追加一个零宽换行占位符。
        #[serde(default)]
        pub has_eol: bool,
        /// 真实的逐字符几何；仅当数量与字符数一致时才会采用。
        #[serde(default, skip_serializing_if = "Option::is_none")]
        pub char_rects: Option<Vec<Rect>>,
    }

    impl TextRun {
        pub fn new(text: impl Into<String>, x: f64, y: f64, width: f64, height: f64) -> Self {
            Self {
                text: text.into(),
                x,
                y,
                width,
                height,
                has_eol: false,
                char_rects: None,
            }
        }

        pub fn with_eol(mut self) -> Self {
            self.has_eol = true;
            self
        }

        pub fn with_char_rects(mut self, rects: Vec<Rect>) -> Self {
            self.char_rects = Some(rects);
            self
        }

        #[inline]
        pub fn char_count(&self) -> usize {
            self.text.chars().count()
        }

        /// 逐字符几何可用时返回之。
        pub fn exact_char_rects(&self) -> Option<&[Rect]> {
            self.char_rects
                .as_deref()
                .filter(|rects| rects.len() == self.char_count())
        }
    }

    #[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
    #[serde(rename_all = "camelCase")]
    pub struct PageLayout {
        pub page_index: usize,
        #[serde(default)]
        pub runs: Vec<TextRun>,
    }

    impl PageLayout {
        pub fn new(page_index: usize, runs: Vec<TextRun>) -> Self {
            Self { page_index, runs }
        }
    }

    /// 页面上单个字符及其估算（或真实）矩形。
    #[derive(Debug, Clone, Copy, PartialEq)]
    pub struct CharPosition {
        pub ch: char,
        pub rect: Rect,
        pub page_index: usize,
    }

    /// 多行选区中某一行分得的字符区间 `[char_start, char_end)`。
    #[derive(Debug, Clone, Copy, PartialEq)]
    pub struct LineAllocation {
        pub rect_index: usize,
        pub char_start: usize,
        pub char_end: usize,
        pub rect: Rect,
    }

    impl LineAllocation {
        #[inline]
        pub fn len(&self) -> usize {
            self.char_end - self.char_start
        }

        #[inline]
        pub fn is_empty(&self) -> bool {
            self.char_end <= self.char_start
        }
    }

}

pub mod annotation {
    use serde::{Deserialize, Serialize};

    use crate::entity::Entity;
    use crate::geometry::Rect;

    #[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
    #[serde(rename_all = "lowercase")]
    pub enum AnnotationKind {
        Highlight,
    }

    #[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
    #[serde(rename_all = "camelCase")]
    pub struct AnnotationPosition {
        pub page_index: usize,
        pub rects: Vec<Rect>,
    }

    /// 交给外部写入方的高亮注释描述。
    #[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
    pub struct HighlightAnnotation {
        #[serde(rename = "type")]
        pub kind: AnnotationKind,
        pub color: String,
        pub text: String,
        pub position: AnnotationPosition,
    }

    impl HighlightAnnotation {
        /// 以实体类型对应的颜色构造高亮。
        pub fn for_entity(entity: &Entity, page_index: usize, rects: Vec<Rect>) -> Self {
            Self {
                kind: AnnotationKind::Highlight,
                color: entity.kind.color().to_string(),
                text: entity.text.clone(),
                position: AnnotationPosition { page_index, rects },
            }
        }
    }

    #[cfg(test)]
    mod tests {
        use super::*;
        use crate::entity::EntityType;

        #[test]
        fn annotation_matches_write_contract() {
            let entity = Entity::new("ImageNet", EntityType::Dataset, 3, 11);
            let annotation =
                HighlightAnnotation::for_entity(&entity, 4, vec![Rect::new(1.0, 2.0, 3.0, 4.0)]);
            let value = serde_json::to_value(&annotation).unwrap();
            assert_eq!(value["type"], "highlight");
            assert_eq!(value["color"], "#f19837");
            assert_eq!(value["text"], "ImageNet");
            assert_eq!(value["position"]["pageIndex"], 4);
            assert_eq!(value["position"]["rects"][0][2], 3.0);
        }
    }
}

pub mod text {
    /// 在字符序列中查找子序列首次出现的位置（按 `char` 计数）。
    pub fn find_chars(haystack: &[char], needle: &[char]) -> Option<usize> {
        if needle.is_empty() || needle.len() > haystack.len() {
            return None;
        }
        haystack
            .windows(needle.len())
            .position(|window| window == needle)
    }

    /// 截取前 `max` 个字符，用于日志与错误信息。
    pub fn truncate_chars(text: &str, max: usize) -> &str {
        match text.char_indices().nth(max) {
            Some((byte, _)) => &text[..byte],
            None => text,
        }
    }

    #[cfg(test)]
    mod tests {
        use super::*;

        #[test]
        fn find_chars_counts_scalars() {
            let hay: Vec<char> = "naïve BERT".chars().collect();
            let needle: Vec<char> = "BERT".chars().collect();
            assert_eq!(find_chars(&hay, &needle), Some(6));
            assert_eq!(find_chars(&hay, &[]), None);
            assert_eq!(find_chars(&needle, &hay), None);
        }

        #[test]
        fn truncate_respects_char_boundaries() {
            assert_eq!(truncate_chars("déjà vu", 4), "déjà");
            assert_eq!(truncate_chars("short", 10), "short");
        }
    }
}
