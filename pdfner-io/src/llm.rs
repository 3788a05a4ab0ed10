//! 对话补全接口客户端：构造请求、按状态码分类失败、指数退避重试。

use std::future::Future;
use std::time::Duration;

use pdfner_config::LlmConfig;
use pdfner_core::chat::ChatMessage;
use pdfner_core::entity::Entity;
use pdfner_core::text::truncate_chars;
use rand::Rng;
use serde_json::{Value, json};
use thiserror::Error;
use tracing::{debug, info, warn};

use crate::repair::{self, RepairError};

/// 退避抖动上限（毫秒，开区间）。
pub const MAX_JITTER_MS: u64 = 500;

const ERROR_BODY_LIMIT: usize = 200;
const LOG_PREVIEW_LIMIT: usize = 300;

#[derive(Debug, Error)]
pub enum ExtractError {
    #[error("LLM API 429: {body}")]
    RateLimited { body: String },
    #[error("LLM API {status}: {body}")]
    ServerError { status: u16, body: String },
    #[error("LLM API {status}: {body}")]
    ClientError { status: u16, body: String },
    #[error("LLM request timed out after {0:?}")]
    Timeout(Duration),
    #[error("network failure: {0}")]
    Network(String),
    #[error("LLM returned empty content")]
    EmptyModelOutput,
    #[error("response envelope is not valid JSON: {0}")]
    InvalidEnvelope(String),
    #[error(transparent)]
    Repair(#[from] RepairError),
}

impl ExtractError {
    pub fn is_retryable(&self) -> bool {
        !matches!(self, ExtractError::ClientError { .. } | ExtractError::Repair(_))
    }

    /// 非 2xx 状态码的分类：429 限流，5xx 服务端错误，其余均视为客户端错误。
    fn from_status(status: u16, body: &str) -> Self {
        let body = truncate_chars(body, ERROR_BODY_LIMIT).to_string();
        match status {
            429 => ExtractError::RateLimited { body },
            500.. => ExtractError::ServerError { status, body },
            _ => ExtractError::ClientError { status, body },
        }
    }
}

#[derive(Debug, Error)]
pub enum TransportError {
    #[error("transport timed out")]
    Timeout,
    #[error("{0}")]
    Network(String),
}

/// 一次 HTTP POST 所需的全部信息。
#[derive(Debug, Clone, Copy)]
pub struct HttpRequest<'a> {
    pub url: &'a str,
    pub bearer: Option<&'a str>,
    pub body: &'a Value,
    pub timeout: Duration,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HttpReply {
    pub status: u16,
    pub body: String,
}

impl HttpReply {
    pub fn new(status: u16, body: impl Into<String>) -> Self {
        Self {
            status,
            body: body.into(),
        }
    }

    #[inline]
    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }
}

/// HTTP 传输层。非 2xx 响应同样以 `Ok` 返回，由客户端负责分类。
pub trait ChatTransport: Send + Sync {
    fn send(
        &self,
        request: HttpRequest<'_>,
    ) -> impl Future<Output = Result<HttpReply, TransportError>> + Send;
}

#[derive(Debug, Clone, Default)]
pub struct ReqwestTransport {
    client: reqwest::Client,
}

impl ReqwestTransport {
    pub fn new() -> Self {
        Self::default()
    }
}

impl ChatTransport for ReqwestTransport {
    async fn send(&self, request: HttpRequest<'_>) -> Result<HttpReply, TransportError> {
        let mut builder = self
            .client
            .post(request.url)
            .timeout(request.timeout)
            .json(request.body);
        if let Some(token) = request.bearer {
            builder = builder.bearer_auth(token);
        }

        let response = builder.send().await.map_err(transport_error)?;
        let status = response.status().as_u16();
        let body = response.text().await.map_err(transport_error)?;
        Ok(HttpReply { status, body })
    }
}

fn transport_error(err: reqwest::Error) -> TransportError {
    if err.is_timeout() {
        TransportError::Timeout
    } else {
        TransportError::Network(err.to_string())
    }
}

/// 第 n 次失败后的等待时间为 `base * 2^n + jitter`，`jitter ∈ [0, 500ms)`。
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    pub base_delay: Duration,
}

impl RetryPolicy {
    pub fn new(max_attempts: u32, base_delay: Duration) -> Self {
        Self {
            max_attempts: max_attempts.max(1),
            base_delay,
        }
    }

    pub fn from_config(config: &LlmConfig) -> Self {
        Self::new(
            config.max_attempts,
            Duration::from_millis(config.base_backoff_ms),
        )
    }

    pub fn delay_for_attempt(&self, attempt: u32, jitter: Duration) -> Duration {
        let factor = 1u32.checked_shl(attempt.min(16)).unwrap_or(u32::MAX);
        let jitter = jitter.min(Duration::from_millis(MAX_JITTER_MS - 1));
        self.base_delay.saturating_mul(factor) + jitter
    }

    pub fn random_jitter() -> Duration {
        Duration::from_millis(rand::thread_rng().gen_range(0..MAX_JITTER_MS))
    }
}

/// 实体抽取客户端。配置在每次调用时传入，修改即时生效。
#[derive(Debug, Clone, Default)]
pub struct ExtractionClient<T = ReqwestTransport> {
    transport: T,
}

impl ExtractionClient<ReqwestTransport> {
    pub fn new() -> Self {
        Self::with_transport(ReqwestTransport::new())
    }
}

impl<T: ChatTransport> ExtractionClient<T> {
    pub fn with_transport(transport: T) -> Self {
        Self { transport }
    }

    pub fn transport(&self) -> &T {
        &self.transport
    }

    /// 抽取 `text` 中的实体；空白文本直接返回空列表，不发起请求。
    pub async fn extract(&self, config: &LlmConfig, text: &str) -> Result<Vec<Entity>, ExtractError> {
        if text.trim().is_empty() {
            debug!("输入为空，跳过实体抽取");
            return Ok(Vec::new());
        }

        let messages = [
            ChatMessage::system(config.effective_system_prompt()),
            ChatMessage::user(text),
        ];
        let raw = self.complete(config, &messages).await?;
        let entities = repair::parse_entities(&raw, text)?;
        info!(count = entities.len(), "实体抽取完成");
        Ok(entities)
    }

    /// 发送对话并返回模型的原始文本输出，可重试的失败按退避策略重试。
    pub async fn complete(&self, config: &LlmConfig, messages: &[ChatMessage]) -> Result<String, ExtractError> {
        let policy = RetryPolicy::from_config(config);
        let url = config.endpoint();
        let body = json!({
            "model": config.effective_model(),
            "messages": messages,
            "temperature": 0,
        });
        let request = HttpRequest {
            url: &url,
            bearer: config.bearer_token(),
            body: &body,
            timeout: config.timeout(),
        };

        let mut attempt = 0u32;
        loop {
            let err = match self.attempt(request).await {
                Ok(content) => return Ok(content),
                Err(err) => err,
            };

            let remaining = attempt + 1 < policy.max_attempts;
            warn!(
                attempt = attempt + 1,
                max_attempts = policy.max_attempts,
                retryable = err.is_retryable(),
                error = %err,
                "LLM 请求失败"
            );
            if !err.is_retryable() || !remaining {
                return Err(err);
            }

            let delay = policy.delay_for_attempt(attempt, RetryPolicy::random_jitter());
            debug!(delay_ms = delay.as_millis() as u64, "退避后重试");
            tokio::time::sleep(delay).await;
            attempt += 1;
        }
    }

    async fn attempt(&self, request: HttpRequest<'_>) -> Result<String, ExtractError> {
        let reply = match tokio::time::timeout(request.timeout, self.transport.send(request)).await {
            Err(_) | Ok(Err(TransportError::Timeout)) => {
                return Err(ExtractError::Timeout(request.timeout));
            }
            Ok(Err(TransportError::Network(message))) => return Err(ExtractError::Network(message)),
            Ok(Ok(reply)) => reply,
        };

        if !reply.is_success() {
            return Err(ExtractError::from_status(reply.status, &reply.body));
        }

        let envelope: Value = serde_json::from_str(&reply.body)
            .map_err(|err| ExtractError::InvalidEnvelope(err.to_string()))?;
        let content = envelope
            .pointer("/choices/0/message/content")
            .and_then(Value::as_str)
            .unwrap_or_default();
        if content.trim().is_empty() {
            return Err(ExtractError::EmptyModelOutput);
        }

        debug!(
            chars = content.chars().count(),
            preview = truncate_chars(content, LOG_PREVIEW_LIMIT),
            "模型原始输出"
        );
        Ok(content.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::VecDeque;
    use std::sync::Mutex;
    use std::sync::atomic::{AtomicUsize, Ordering};

    use pdfner_core::entity::EntityType;
    use tokio::time::Instant;

    #[derive(Default)]
    struct Scripted {
        replies: Mutex<VecDeque<Result<HttpReply, TransportError>>>,
        requests: Mutex<Vec<(String, Option<String>, Value)>>,
    }

    impl Scripted {
        fn new(replies: Vec<Result<HttpReply, TransportError>>) -> Self {
            Self {
                replies: Mutex::new(replies.into()),
                requests: Mutex::default(),
            }
        }

        fn calls(&self) -> usize {
            self.requests.lock().unwrap().len()
        }
    }

    impl ChatTransport for Scripted {
        async fn send(&self, request: HttpRequest<'_>) -> Result<HttpReply, TransportError> {
            self.requests.lock().unwrap().push((
                request.url.to_string(),
                request.bearer.map(str::to_string),
                request.body.clone(),
            ));
            self.replies
                .lock()
                .unwrap()
                .pop_front()
                .unwrap_or_else(|| Err(TransportError::Network("script exhausted".into())))
        }
    }

    struct Stalled {
        calls: AtomicUsize,
    }

    impl ChatTransport for Stalled {
        fn send(
            &self,
            _request: HttpRequest<'_>,
        ) -> impl Future<Output = Result<HttpReply, TransportError>> + Send {
            self.calls.fetch_add(1, Ordering::SeqCst);
            std::future::pending()
        }
    }

    fn completion(content: &str) -> Result<HttpReply, TransportError> {
        let body = json!({"choices": [{"message": {"role": "assistant", "content": content}}]});
        Ok(HttpReply::new(200, body.to_string()))
    }

    fn config() -> LlmConfig {
        LlmConfig {
            api_key: "sk-test".into(),
            base_url: "https://llm.example/v1//".into(),
            ..LlmConfig::default()
        }
    }

    const BERT_OUTPUT: &str =
        r#"{"entities":[{"text":"BERT","type":"method","start":0,"end":4}]}"#;

    #[test]
    fn backoff_grows_exponentially_within_jitter_bounds() {
        let policy = RetryPolicy::new(3, Duration::from_millis(1_000));
        assert_eq!(
            policy.delay_for_attempt(0, Duration::ZERO),
            Duration::from_millis(1_000)
        );
        assert_eq!(
            policy.delay_for_attempt(2, Duration::from_millis(250)),
            Duration::from_millis(4_250)
        );
        for attempt in 0..4 {
            let base = Duration::from_millis(1_000 * (1 << attempt));
            let delay = policy.delay_for_attempt(attempt, RetryPolicy::random_jitter());
            assert!(delay >= base && delay < base + Duration::from_millis(MAX_JITTER_MS));
        }
        assert_eq!(RetryPolicy::new(0, Duration::ZERO).max_attempts, 1);
    }

    #[test]
    fn status_codes_are_classified() {
        assert!(matches!(
            ExtractError::from_status(429, ""),
            ExtractError::RateLimited { .. }
        ));
        assert!(matches!(
            ExtractError::from_status(503, ""),
            ExtractError::ServerError { status: 503, .. }
        ));
        let client = ExtractError::from_status(401, &"x".repeat(500));
        assert!(!client.is_retryable());
        match client {
            ExtractError::ClientError { status, body } => {
                assert_eq!(status, 401);
                assert_eq!(body.len(), 200);
            }
            other => panic!("unexpected {other:?}"),
        }
        assert!(ExtractError::Timeout(Duration::from_secs(1)).is_retryable());
        assert!(ExtractError::EmptyModelOutput.is_retryable());
    }

    #[tokio::test(start_paused = true)]
    async fn rate_limits_are_retried_with_backoff() {
        let transport = Scripted::new(vec![
            Ok(HttpReply::new(429, "slow down")),
            Ok(HttpReply::new(429, "slow down")),
            completion(BERT_OUTPUT),
        ]);
        let client = ExtractionClient::with_transport(transport);

        let started = Instant::now();
        let entities = client.extract(&config(), "BERT is a model").await.unwrap();
        let elapsed = started.elapsed();

        assert_eq!(entities, vec![Entity::new("BERT", EntityType::Method, 0, 4)]);
        assert_eq!(client.transport().calls(), 3);
        assert!(elapsed >= Duration::from_millis(3_000), "{elapsed:?}");
        assert!(elapsed < Duration::from_millis(4_000), "{elapsed:?}");
    }

    #[tokio::test(start_paused = true)]
    async fn client_errors_are_not_retried() {
        let transport = Scripted::new(vec![
            Ok(HttpReply::new(401, "bad key")),
            completion(BERT_OUTPUT),
        ]);
        let client = ExtractionClient::with_transport(transport);

        let started = Instant::now();
        let err = client.extract(&config(), "BERT is a model").await.unwrap_err();
        assert!(matches!(err, ExtractError::ClientError { status: 401, .. }));
        assert_eq!(client.transport().calls(), 1);
        assert_eq!(started.elapsed(), Duration::ZERO);
    }

    #[tokio::test(start_paused = true)]
    async fn last_error_surfaces_after_ceiling() {
        let transport = Scripted::new(vec![
            Ok(HttpReply::new(500, "boom")),
            Err(TransportError::Network("connection reset".into())),
            completion("   "),
        ]);
        let client = ExtractionClient::with_transport(transport);
        let err = client.extract(&config(), "BERT is a model").await.unwrap_err();
        assert!(matches!(err, ExtractError::EmptyModelOutput));
        assert_eq!(client.transport().calls(), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn stalled_requests_time_out_and_retry() {
        let client = ExtractionClient::with_transport(Stalled {
            calls: AtomicUsize::new(0),
        });
        let config = LlmConfig {
            timeout_secs: 5,
            max_attempts: 2,
            ..config()
        };

        let started = Instant::now();
        let err = client.complete(&config, &[ChatMessage::user("hi")]).await.unwrap_err();
        let elapsed = started.elapsed();

        assert!(matches!(err, ExtractError::Timeout(d) if d == Duration::from_secs(5)));
        assert_eq!(client.transport().calls.load(Ordering::SeqCst), 2);
        assert!(elapsed >= Duration::from_millis(11_000), "{elapsed:?}");
        assert!(elapsed < Duration::from_millis(11_500), "{elapsed:?}");
    }

    #[tokio::test]
    async fn blank_input_skips_the_network() {
        let client = ExtractionClient::with_transport(Scripted::default());
        let entities = client.extract(&config(), " \n\t ").await.unwrap();
        assert!(entities.is_empty());
        assert_eq!(client.transport().calls(), 0);
    }

    #[tokio::test]
    async fn request_carries_endpoint_auth_and_prompt() {
        let client = ExtractionClient::with_transport(Scripted::new(vec![completion(BERT_OUTPUT)]));
        client.extract(&config(), "BERT is a model").await.unwrap();

        let requests = client.transport().requests.lock().unwrap();
        let (url, bearer, body) = &requests[0];
        assert_eq!(url, "https://llm.example/v1/chat/completions");
        assert_eq!(bearer.as_deref(), Some("sk-test"));
        assert_eq!(body["model"], "z-ai/glm-4.5-air:free");
        assert_eq!(body["temperature"], 0);
        assert_eq!(body["messages"][0]["role"], "system");
        assert_eq!(body["messages"][1]["content"], "BERT is a model");
    }

    #[tokio::test]
    async fn malformed_model_output_is_terminal() {
        let client = ExtractionClient::with_transport(Scripted::new(vec![
            completion("I could not find any entities."),
            completion(BERT_OUTPUT),
        ]));
        let err = client.extract(&config(), "BERT is a model").await.unwrap_err();
        assert!(matches!(
            err,
            ExtractError::Repair(RepairError::MalformedResponse { .. })
        ));
        assert_eq!(client.transport().calls(), 1);
    }
}
