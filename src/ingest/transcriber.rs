//! Audio transcription backends.

use std::path::Path;

use async_trait::async_trait;
use serde::Deserialize;
use tracing::debug;

/// Result of transcription
#[derive(Debug, Clone)]
pub struct TranscriptResult {
    pub text: String,
    pub language: Option<String>,
}

#[async_trait]
pub trait Transcriber: Send + Sync {
    async fn transcribe(&self, audio_path: &Path) -> anyhow::Result<TranscriptResult>;
}

/// OpenAI audio transcription endpoint (whisper-1 by default)
pub struct OpenAiTranscriber {
    api_key: String,
    base_url: String,
    model: String,
    client: reqwest::Client,
}

#[derive(Debug, Deserialize)]
struct TranscriptionResponse {
    text: String,
    #[serde(default)]
    language: Option<String>,
}

impl OpenAiTranscriber {
    pub fn new(api_key: String) -> Self {
        Self {
            api_key,
            base_url: "https://api.openai.com/v1".to_string(),
            model: "whisper-1".to_string(),
            client: reqwest::Client::new(),
        }
    }

    pub fn from_env() -> anyhow::Result<Self> {
        let api_key = std::env::var("OPENAI_API_KEY")
            .map_err(|_| anyhow::anyhow!("OPENAI_API_KEY is not set"))?;
        Ok(Self::new(api_key))
    }

    pub fn with_base_url(mut self, base_url: String) -> Self {
        self.base_url = base_url;
        self
    }

    pub fn with_model(mut self, model: String) -> Self {
        self.model = model;
        self
    }
}

#[async_trait]
impl Transcriber for OpenAiTranscriber {
    async fn transcribe(&self, audio_path: &Path) -> anyhow::Result<TranscriptResult> {
        let file_name = audio_path
            .file_name()
            .map(|n| n.to_string_lossy().to_string())
            .ok_or_else(|| anyhow::anyhow!("audio path has no file name"))?;

        debug!(path = %audio_path.display(), "Transcribing audio file");

        let bytes = tokio::fs::read(audio_path).await?;
        let part = reqwest::multipart::Part::bytes(bytes).file_name(file_name);
        let form = reqwest::multipart::Form::new()
            .part("file", part)
            .text("model", self.model.clone())
            .text("response_format", "verbose_json");

        let response = self
            .client
            .post(format!("{}/audio/transcriptions", self.base_url))
            .bearer_auth(&self.api_key)
            .multipart(form)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            anyhow::bail!("transcription failed ({}): {}", status, body);
        }

        let parsed: TranscriptionResponse = response.json().await?;
        Ok(TranscriptResult {
            text: parsed.text.trim().to_string(),
            language: parsed.language,
        })
    }
}
