//! Speech synthesis over an OpenAI-compatible speech endpoint.

use std::sync::Arc;

use async_trait::async_trait;
use serde::Serialize;

use wakeprompt_core::config::ProviderConfig;
use wakeprompt_core::error::ProviderError;
use wakeprompt_core::ports::{CredentialStore, SpeechProvider};
use wakeprompt_core::Voice;

use crate::http::{send_with_retry, HttpRequest, HttpTransport, RetryPolicy};

/// Audio container requested from the provider.
const RESPONSE_FORMAT: &str = "wav";

#[derive(Debug, Serialize)]
struct SpeechRequest<'a> {
    model: &'a str,
    input: &'a str,
    voice: &'a str,
    response_format: &'a str,
}

/// Speech provider returning WAV bytes.
pub struct OpenAiSpeechProvider {
    transport: Arc<dyn HttpTransport>,
    credentials: Arc<dyn CredentialStore>,
    config: ProviderConfig,
    policy: RetryPolicy,
}

impl OpenAiSpeechProvider {
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
}

#[async_trait]
impl SpeechProvider for OpenAiSpeechProvider {
    async fn synthesize(&self, text: &str, voice: Voice) -> Result<Vec<u8>, ProviderError> {
        let bearer = self
            .credentials
            .load()
            .ok_or(ProviderError::MissingCredential)?;
        let body = SpeechRequest {
            model: &self.config.speech_model,
            input: text,
            voice: voice.as_str(),
            response_format: RESPONSE_FORMAT,
        };
        let request = HttpRequest {
            url: self.config.speech_url(),
            bearer,
            body: serde_json::to_value(&body).map_err(|e| {
                ProviderError::InvalidResponse(format!("unencodable request: {}", e))
            })?,
        };

        tracing::debug!(voice = %voice, chars = text.len(), "Requesting speech synthesis");
        let audio = send_with_retry(self.transport.as_ref(), &self.policy, &request).await?;
        if audio.is_empty() {
            return Err(ProviderError::InvalidResponse(
                "speech response body is empty".to_string(),
            ));
        }
        tracing::debug!(bytes = audio.len(), "Speech synthesized");
        Ok(audio)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::http::testing::ScriptedTransport;
    use std::time::Duration;
    use tokio::time::Instant;
    use wakeprompt_core::error::StoreError;

    struct FixedCredential(Option<&'static str>);

    impl CredentialStore for FixedCredential {
        fn save(&self, _secret: &str) -> Result<(), StoreError> {
            Ok(())
        }
        fn load(&self) -> Option<String> {
            self.0.map(str::to_string)
        }
        fn delete(&self) -> Result<(), StoreError> {
            Ok(())
        }
    }

    fn provider(transport: Arc<ScriptedTransport>) -> OpenAiSpeechProvider {
        OpenAiSpeechProvider::new(
            transport,
            Arc::new(FixedCredential(Some("sk-live"))),
            ProviderConfig::default(),
        )
    }

    #[tokio::test]
    async fn test_synthesize_returns_body_bytes() {
        let transport = Arc::new(ScriptedTransport::statuses(&[200], b"RIFF....WAVE"));
        let audio = provider(transport.clone())
            .synthesize("Good morning", Voice::Onyx)
            .await
            .unwrap();
        assert_eq!(audio, b"RIFF....WAVE");

        let request = &transport.requests()[0];
        assert_eq!(request.url, "https://api.openai.com/v1/audio/speech");
        assert_eq!(request.body["model"], "tts-1");
        assert_eq!(request.body["input"], "Good morning");
        assert_eq!(request.body["voice"], "onyx");
        assert_eq!(request.body["response_format"], "wav");
    }

    #[tokio::test]
    async fn test_synthesize_rejects_empty_body() {
        let transport = Arc::new(ScriptedTransport::statuses(&[200], b""));
        let err = provider(transport)
            .synthesize("Good morning", Voice::Coral)
            .await
            .unwrap_err();
        assert!(matches!(err, ProviderError::InvalidResponse(_)));
    }

    #[tokio::test(start_paused = true)]
    async fn test_synthesize_persistent_server_error() {
        let transport = Arc::new(ScriptedTransport::statuses(&[500], b""));
        let started = Instant::now();
        let err = provider(transport.clone())
            .synthesize("Good morning", Voice::Coral)
            .await
            .unwrap_err();
        assert_eq!(err, ProviderError::Server(500));
        assert_eq!(transport.calls(), 3);
        assert!(started.elapsed() >= Duration::from_secs(6));
    }

    #[tokio::test]
    async fn test_synthesize_invalid_credential_single_attempt() {
        let transport = Arc::new(ScriptedTransport::statuses(&[401], b""));
        let err = provider(transport.clone())
            .synthesize("Good morning", Voice::Coral)
            .await
            .unwrap_err();
        assert_eq!(err, ProviderError::InvalidCredential);
        assert_eq!(transport.calls(), 1);
    }

    #[tokio::test]
    async fn test_synthesize_missing_credential() {
        let transport = Arc::new(ScriptedTransport::statuses(&[200], b"audio"));
        let provider = OpenAiSpeechProvider::new(
            transport.clone(),
            Arc::new(FixedCredential(None)),
            ProviderConfig::default(),
        );
        let err = provider.synthesize("hi", Voice::Coral).await.unwrap_err();
        assert_eq!(err, ProviderError::MissingCredential);
        assert_eq!(transport.calls(), 0);
    }
}
