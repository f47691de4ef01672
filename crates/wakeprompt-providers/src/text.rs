//! Wake-up text generation over a chat-completion API.

use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Local, TimeZone, Utc};
use serde::{Deserialize, Serialize};

use wakeprompt_core::config::ProviderConfig;
use wakeprompt_core::error::ProviderError;
use wakeprompt_core::ports::{CredentialStore, WakeTextContext, WakeTextProvider};
use wakeprompt_core::DEFAULT_USER_PROMPT;

use crate::http::{send_with_retry, HttpRequest, HttpTransport, RetryPolicy};

/// Human form of the fire time used in the prompt, e.g.
/// `Monday, March 2, 2026 at 7:05 AM`.
pub fn format_fire_time<Tz: TimeZone>(fire_time: &DateTime<Tz>) -> String
where
    Tz::Offset: std::fmt::Display,
{
    fire_time.format("%A, %B %-d, %Y at %-I:%M %p").to_string()
}

/// System instruction for a given formatted fire time.
pub fn system_prompt(time: &str) -> String {
    format!(
        "Generate a wake-up message for {}. Be encouraging and energizing. \
         3-4 sentences, approximately 30 seconds when spoken aloud. \
         Do not include any stage directions or annotations.",
        time
    )
}

#[derive(Debug, Serialize)]
struct ChatMessage<'a> {
    role: &'a str,
    content: &'a str,
}

#[derive(Debug, Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    messages: Vec<ChatMessage<'a>>,
    max_tokens: u32,
    temperature: f32,
}

#[derive(Debug, Deserialize)]
struct ChatResponse {
    #[serde(default)]
    choices: Vec<ChatChoice>,
}

#[derive(Debug, Deserialize)]
struct ChatChoice {
    message: ChatChoiceMessage,
}

#[derive(Debug, Deserialize)]
struct ChatChoiceMessage {
    content: Option<String>,
}

/// Extract the trimmed content of the first choice.
fn parse_completion(body: &[u8]) -> Result<String, ProviderError> {
    let response: ChatResponse = serde_json::from_slice(body)
        .map_err(|e| ProviderError::InvalidResponse(format!("malformed completion: {}", e)))?;
    let content = response
        .choices
        .into_iter()
        .next()
        .and_then(|choice| choice.message.content)
        .ok_or_else(|| ProviderError::InvalidResponse("completion has no content".to_string()))?;
    let text = content.trim();
    if text.is_empty() {
        return Err(ProviderError::InvalidResponse(
            "completion content is empty".to_string(),
        ));
    }
    Ok(text.to_string())
}

/// Text provider backed by an OpenAI-compatible chat-completion endpoint.
pub struct OpenAiTextProvider {
    transport: Arc<dyn HttpTransport>,
    credentials: Arc<dyn CredentialStore>,
    config: ProviderConfig,
    policy: RetryPolicy,
}

impl OpenAiTextProvider {
    pub fn new(
        transport: Arc<dyn HttpTransport>,
        credentials: Arc<dyn CredentialStore>,
        config: ProviderConfig,
    ) -> Self {
        let policy = RetryPolicy::from_config(&config);
        Self {
            transport,
            credentials,
            config,
            policy,
        }
    }

    pub fn with_policy(mut self, policy: RetryPolicy) -> Self {
        self.policy = policy;
        self
    }

    fn build_request(
        &self,
        bearer: String,
        fire_time: DateTime<Utc>,
        context: &WakeTextContext,
    ) -> Result<HttpRequest, ProviderError> {
        let system = system_prompt(&format_fire_time(&fire_time.with_timezone(&Local)));
        let user = context.user_prompt.as_deref().unwrap_or(DEFAULT_USER_PROMPT);
        let body = ChatRequest {
            model: &self.config.text_model,
            messages: vec![
                ChatMessage {
                    role: "system",
                    content: &system,
                },
                ChatMessage {
                    role: "user",
                    content: user,
                },
            ],
            max_tokens: self.config.max_tokens,
            temperature: self.config.temperature,
        };
        let body = serde_json::to_value(&body)
            .map_err(|e| ProviderError::InvalidResponse(format!("unencodable request: {}", e)))?;
        Ok(HttpRequest {
            url: self.config.chat_completions_url(),
            bearer,
            body,
        })
    }
}

#[async_trait]
impl WakeTextProvider for OpenAiTextProvider {
    async fn generate_wake_text(
        &self,
        fire_time: DateTime<Utc>,
        context: &WakeTextContext,
    ) -> Result<String, ProviderError> {
        let bearer = self
            .credentials
            .load()
            .ok_or(ProviderError::MissingCredential)?;
        let request = self.build_request(bearer, fire_time, context)?;

        tracing::debug!(voice = %context.voice, "Requesting wake-up text");
        let body = send_with_retry(self.transport.as_ref(), &self.policy, &request).await?;
        let text = parse_completion(&body)?;
        tracing::debug!(chars = text.len(), "Wake-up text generated");
        Ok(text)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::http::testing::ScriptedTransport;
    use chrono::FixedOffset;
    use std::sync::Mutex;
    use wakeprompt_core::error::StoreError;
    use wakeprompt_core::Voice;

    struct StaticCredentials(Mutex<Option<String>>);

    impl StaticCredentials {
        fn with(secret: Option<&str>) -> Arc<Self> {
            Arc::new(Self(Mutex::new(secret.map(str::to_string))))
        }
    }

    impl CredentialStore for StaticCredentials {
        fn save(&self, secret: &str) -> Result<(), StoreError> {
            *self.0.lock().unwrap() = Some(secret.to_string());
            Ok(())
        }
        fn load(&self) -> Option<String> {
            self.0.lock().unwrap().clone()
        }
        fn delete(&self) -> Result<(), StoreError> {
            *self.0.lock().unwrap() = None;
            Ok(())
        }
    }

    fn completion(content: &str) -> Vec<u8> {
        serde_json::json!({
            "choices": [{"message": {"role": "assistant", "content": content}}]
        })
        .to_string()
        .into_bytes()
    }

    fn context(prompt: Option<&str>) -> WakeTextContext {
        WakeTextContext {
            voice: Voice::Coral,
            user_prompt: prompt.map(str::to_string),
        }
    }

    #[test]
    fn test_format_fire_time() {
        let tz = FixedOffset::east_opt(0).unwrap();
        let at = tz.with_ymd_and_hms(2026, 3, 2, 7, 5, 0).unwrap();
        assert_eq!(format_fire_time(&at), "Monday, March 2, 2026 at 7:05 AM");

        let evening = tz.with_ymd_and_hms(2026, 10, 17, 19, 30, 0).unwrap();
        assert_eq!(format_fire_time(&evening), "Saturday, October 17, 2026 at 7:30 PM");
    }

    #[test]
    fn test_system_prompt_constraints() {
        let prompt = system_prompt("Monday, March 2, 2026 at 7:05 AM");
        assert!(prompt.contains("Monday, March 2, 2026 at 7:05 AM"));
        assert!(prompt.contains("encouraging"));
        assert!(prompt.contains("3-4 sentences"));
        assert!(prompt.contains("30 seconds"));
        assert!(prompt.contains("stage directions"));
    }

    #[test]
    fn test_parse_completion_trims() {
        let text = parse_completion(&completion("\n  Good morning, sunshine!  \n")).unwrap();
        assert_eq!(text, "Good morning, sunshine!");
    }

    #[test]
    fn test_parse_completion_rejects_malformed() {
        assert!(matches!(
            parse_completion(b"not json"),
            Err(ProviderError::InvalidResponse(_))
        ));
        assert!(matches!(
            parse_completion(br#"{"choices": []}"#),
            Err(ProviderError::InvalidResponse(_))
        ));
        assert!(matches!(
            parse_completion(&completion("   ")),
            Err(ProviderError::InvalidResponse(_))
        ));
    }

    #[tokio::test]
    async fn test_generate_sends_expected_request() {
        let transport = Arc::new(ScriptedTransport::new(vec![Ok(crate::http::HttpResponse {
            status: 200,
            body: completion("Wake up, champion."),
        })]));
        let provider = OpenAiTextProvider::new(
            transport.clone(),
            StaticCredentials::with(Some("sk-live")),
            ProviderConfig::default(),
        );

        let text = provider
            .generate_wake_text(Utc::now(), &context(Some("mention coffee")))
            .await
            .unwrap();
        assert_eq!(text, "Wake up, champion.");

        let requests = transport.requests();
        assert_eq!(requests.len(), 1);
        let request = &requests[0];
        assert_eq!(request.url, "https://api.openai.com/v1/chat/completions");
        assert_eq!(request.bearer, "sk-live");
        assert_eq!(request.body["model"], "gpt-4o-mini");
        assert_eq!(request.body["max_tokens"], 200);
        assert_eq!(request.body["messages"][0]["role"], "system");
        assert_eq!(request.body["messages"][1]["content"], "mention coffee");
    }

    #[tokio::test]
    async fn test_generate_uses_default_prompt() {
        let transport = Arc::new(ScriptedTransport::statuses(&[200], &completion("Hi")));
        let provider = OpenAiTextProvider::new(
            transport.clone(),
            StaticCredentials::with(Some("sk-live")),
            ProviderConfig::default(),
        );
        provider
            .generate_wake_text(Utc::now(), &context(None))
            .await
            .unwrap();
        assert_eq!(
            transport.requests()[0].body["messages"][1]["content"],
            DEFAULT_USER_PROMPT
        );
    }

    #[tokio::test]
    async fn test_generate_without_credential_makes_no_request() {
        let transport = Arc::new(ScriptedTransport::statuses(&[200], &completion("Hi")));
        let provider = OpenAiTextProvider::new(
            transport.clone(),
            StaticCredentials::with(None),
            ProviderConfig::default(),
        );
        let err = provider
            .generate_wake_text(Utc::now(), &context(None))
            .await
            .unwrap_err();
        assert_eq!(err, ProviderError::MissingCredential);
        assert_eq!(transport.calls(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_generate_retries_rate_limit() {
        let transport = Arc::new(ScriptedTransport::new(vec![
            Ok(crate::http::HttpResponse {
                status: 429,
                body: Vec::new(),
            }),
            Ok(crate::http::HttpResponse {
                status: 200,
                body: completion("Second time lucky."),
            }),
        ]));
        let provider = OpenAiTextProvider::new(
            transport.clone(),
            StaticCredentials::with(Some("sk-live")),
            ProviderConfig::default(),
        );
        let text = provider
            .generate_wake_text(Utc::now(), &context(None))
            .await
            .unwrap();
        assert_eq!(text, "Second time lucky.");
        assert_eq!(transport.calls(), 2);
    }
}
