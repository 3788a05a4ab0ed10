//! 从模型输出中取出 JSON，并把实体偏移校验或修复到与源文本逐字一致。

use once_cell::sync::Lazy;
use pdfner_core::entity::{Entity, EntityType};
use pdfner_core::text::{find_chars, truncate_chars};
use regex::Regex;
use serde_json::Value;
use thiserror::Error;
use tracing::debug;

/// 声明区间两侧额外搜索的字符数。
pub const WINDOW_SLACK: usize = 30;

static FENCE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"```(?:json)?\s*\n?([\s\S]*?)\n?\s*```").expect("代码块正则应当有效")
});

#[derive(Debug, Error)]
pub enum RepairError {
    #[error("model output contains no parseable JSON object: {snippet}")]
    MalformedResponse { snippet: String },
    #[error("model output is missing an `entities` array")]
    MissingEntitiesField,
}

/// 依次尝试：整段文本、代码块内部、首个 `{` 到最后一个 `}`；取第一个能解析的结果。
pub fn extract_json(raw: &str) -> Result<Value, RepairError> {
    let trimmed = raw.trim();
    let mut candidates: Vec<&str> = Vec::with_capacity(3);

    if trimmed.starts_with('{') || trimmed.starts_with('[') {
        candidates.push(trimmed);
    }
    if let Some(inner) = FENCE.captures(trimmed).and_then(|caps| caps.get(1)) {
        candidates.push(inner.as_str().trim());
    }
    if let (Some(first), Some(last)) = (trimmed.find('{'), trimmed.rfind('}')) {
        if last > first {
            candidates.push(&trimmed[first..=last]);
        }
    }

    candidates
        .into_iter()
        .find_map(|candidate| serde_json::from_str::<Value>(candidate).ok())
        .ok_or_else(|| RepairError::MalformedResponse {
            snippet: truncate_chars(trimmed, 200).to_string(),
        })
}

/// 解析模型输出并返回通过校验的实体，顺序与模型给出的顺序一致。
pub fn parse_entities(raw: &str, source: &str) -> Result<Vec<Entity>, RepairError> {
    let value = extract_json(raw)?;
    let candidates = value
        .get("entities")
        .and_then(Value::as_array)
        .ok_or(RepairError::MissingEntitiesField)?;

    let source_chars: Vec<char> = source.chars().collect();
    let entities: Vec<Entity> = candidates
        .iter()
        .filter_map(|candidate| validate_candidate(candidate, &source_chars))
        .collect();

    debug!(valid = entities.len(), raw = candidates.len(), "实体校验完成");
    Ok(entities)
}

struct Candidate<'a> {
    text: &'a str,
    kind: &'a str,
    start: f64,
    end: f64,
}

impl<'a> Candidate<'a> {
    fn from_value(value: &'a Value) -> Option<Self> {
        let text = value.get("text")?.as_str().filter(|s| !s.is_empty())?;
        let kind = value.get("type")?.as_str().filter(|s| !s.trim().is_empty())?;
        let start = value.get("start")?.as_f64().filter(|v| v.is_finite())?;
        let end = value.get("end")?.as_f64().filter(|v| v.is_finite())?;
        Some(Self {
            text,
            kind,
            start,
            end,
        })
    }
}

fn validate_candidate(value: &Value, source: &[char]) -> Option<Entity> {
    let Some(candidate) = Candidate::from_value(value) else {
        debug!(candidate = %value, "缺少必要字段，丢弃");
        return None;
    };

    let needle: Vec<char> = candidate.text.chars().collect();
    let Some(start) = repair_offset(source, &needle, candidate.start, candidate.end) else {
        debug!(text = candidate.text, "源文本中找不到该实体，丢弃");
        return None;
    };

    Some(Entity::new(
        candidate.text,
        EntityType::parse(candidate.kind),
        start,
        start + needle.len(),
    ))
}

/// 声明的偏移是否精确；否则在附近窗口内查找；再否则全文查找第一次出现。
///
/// 负数或带小数的偏移不可能精确命中，但仍参与窗口修复与全文查找。
fn repair_offset(source: &[char], needle: &[char], start: f64, end: f64) -> Option<usize> {
    if let (Some(s), Some(e)) = (exact_index(start), exact_index(end)) {
        if s < e && e <= source.len() && &source[s..e] == needle {
            return Some(s);
        }
    }

    let slack = WINDOW_SLACK as f64;
    let window_start = clamp_index(start - slack, source.len());
    let window_end = clamp_index(end + slack, source.len());
    if window_start < window_end {
        if let Some(found) = find_chars(&source[window_start..window_end], needle) {
            debug!(declared = start, repaired = window_start + found, "偏移已在附近窗口修复");
            return Some(window_start + found);
        }
    }

    find_chars(source, needle)
}

fn exact_index(value: f64) -> Option<usize> {
    (value >= 0.0 && value.fract() == 0.0 && value <= usize::MAX as f64).then(|| value as usize)
}

fn clamp_index(value: f64, len: usize) -> usize {
    value.floor().clamp(0.0, len as f64) as usize
}
