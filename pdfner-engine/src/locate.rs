//! 在页面全文中定位选中片段（snippet）的起点。

use pdfner_core::text::find_chars;
use tracing::debug;

/// 命中所使用的策略。
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MatchStrategy {
    Exact,
    Normalized,
    /// 规范化后按前缀匹配，记录前缀长度。
    Prefix(usize),
}

/// 片段在原始页面文本中的起始字符偏移。
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Anchor {
    pub offset: usize,
    pub strategy: MatchStrategy,
}

/// 文本定位策略。
pub trait TextLocator: Send + Sync {
    fn locate(&self, page_text: &str, snippet: &str) -> Option<Anchor>;
}

/// 仅做原文精确匹配。
#[derive(Debug, Clone, Copy, Default)]
pub struct ExactLocator;

impl TextLocator for ExactLocator {
    fn locate(&self, page_text: &str, snippet: &str) -> Option<Anchor> {
        let page: Vec<char> = page_text.chars().collect();
        let needle: Vec<char> = snippet.chars().collect();
        find_chars(&page, &needle).map(|offset| Anchor {
            offset,
            strategy: MatchStrategy::Exact,
        })
    }
}

/// 依次尝试：原文精确匹配、规范化后匹配、规范化前缀匹配。
/// 片段多次出现时取第一次出现的位置。
#[derive(Debug, Clone)]
pub struct FuzzyLocator {
    prefix_lengths: Vec<usize>,
    min_prefix: usize,
}

impl FuzzyLocator {
    pub fn new(prefix_lengths: Vec<usize>, min_prefix: usize) -> Self {
        Self {
            prefix_lengths,
            min_prefix,
        }
    }
}

impl Default for FuzzyLocator {
    fn default() -> Self {
        Self::new(vec![50, 30, 20], 10)
    }
}

impl TextLocator for FuzzyLocator {
    fn locate(&self, page_text: &str, snippet: &str) -> Option<Anchor> {
        if let Some(anchor) = ExactLocator.locate(page_text, snippet) {
            return Some(anchor);
        }

        let page = Normalized::new(page_text);
        let needle = Normalized::new(snippet);
        // 锚点对应片段的第 0 个字符，需扣除片段开头被规范化去掉的空白。
        let lead = needle.origin.first().copied().unwrap_or(0);
        if let Some(found) = find_chars(&page.chars, &needle.chars) {
            return Some(Anchor {
                offset: page.origin[found].saturating_sub(lead),
                strategy: MatchStrategy::Normalized,
            });
        }

        for &length in &self.prefix_lengths {
            let length = length.min(needle.chars.len());
            if length < self.min_prefix {
                continue;
            }
            if let Some(found) = find_chars(&page.chars, &needle.chars[..length]) {
                debug!(length, "片段按前缀定位成功");
                return Some(Anchor {
                    offset: page.origin[found].saturating_sub(lead),
                    strategy: MatchStrategy::Prefix(length),
                });
            }
        }
        None
    }
}

/// 规范化后的文本，`origin[i]` 为第 i 个字符在原文中的字符偏移。
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Normalized {
    pub chars: Vec<char>,
    pub origin: Vec<usize>,
}

impl Normalized {
    /// 折叠连续空白为单个空格、弯引号转直引号，并去掉首尾空白。
    pub fn new(text: &str) -> Self {
        let mut out = Self::default();
        let mut pending_space: Option<usize> = None;

        for (index, ch) in text.chars().enumerate() {
            if ch.is_whitespace() {
                pending_space.get_or_insert(index);
                continue;
            }
            if let Some(space_at) = pending_space.take() {
                if !out.chars.is_empty() {
                    out.chars.push(' ');
                    out.origin.push(space_at);
                }
            }
            out.chars.push(straighten_quote(ch));
            out.origin.push(index);
        }
        out
    }

    pub fn as_string(&self) -> String {
        self.chars.iter().collect()
    }
}

fn straighten_quote(ch: char) -> char {
    match ch {
        '\u{2018}' | '\u{2019}' | '\u{201A}' | '\u{201B}' => '\'',
        '\u{201C}' | '\u{201D}' | '\u{201E}' | '\u{201F}' => '"',
        other => other,
    }
}
