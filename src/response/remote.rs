//! Remote answer service client

use std::path::{Path, PathBuf};
use std::time::Duration;

use async_trait::async_trait;
use base64::Engine;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use url::Url;

use super::{ResponsePayload, ResponseProvider, ResponseSource, UserInput, emotion};
use crate::artifacts::ArtifactStore;
use crate::{Error, Result};

/// Default bound on one remote call
pub const DEFAULT_REMOTE_TIMEOUT: Duration = Duration::from_secs(20);

#[derive(Serialize)]
struct AskRequest<'a> {
    user_input: &'a str,
    user_id: &'a str,
}

#[derive(Deserialize)]
struct AskResponse {
    text: String,
    #[serde(default)]
    audio_url: Option<String>,
    #[serde(default)]
    audio_bytes: Option<String>,
    #[serde(default)]
    emotion: Option<String>,
}

/// Calls `POST {base}/api/ask` over one persistent HTTP client
pub struct RemoteProvider {
    client: Client,
    base_url: Url,
    endpoint: Url,
    user_id: String,
    store: ArtifactStore,
}

impl RemoteProvider {
    /// Create a client for the service at `base_url`
    ///
    /// # Errors
    ///
    /// Returns error if the URL is invalid or the client cannot be built
    pub fn new(
        base_url: &str,
        user_id: String,
        timeout: Duration,
        store: ArtifactStore,
    ) -> Result<Self> {
        let base_url = parse_base(base_url)?;
        let endpoint = base_url
            .join("api/ask")
            .map_err(|e| Error::Config(format!("invalid API URL: {e}")))?;

        let client = Client::builder().timeout(timeout).build()?;

        tracing::debug!(
            endpoint = %endpoint,
            timeout_ms = u64::try_from(timeout.as_millis()).unwrap_or(u64::MAX),
            "remote provider ready"
        );

        Ok(Self {
            client,
            base_url,
            endpoint,
            user_id,
            store,
        })
    }

    /// The `/api/ask` URL
    #[must_use]
    pub const fn endpoint(&self) -> &Url {
        &self.endpoint
    }

    async fn send(&self, input: &UserInput) -> Result<reqwest::Response> {
        let request = self.client.post(self.endpoint.clone());

        let request = match input {
            UserInput::Text(text) => request.json(&AskRequest {
                user_input: text,
                user_id: &self.user_id,
            }),
            UserInput::Audio(utterance) => {
                let file_name = utterance.path.file_name().map_or_else(
                    || "utterance.wav".to_string(),
                    |n| n.to_string_lossy().into_owned(),
                );

                let part = reqwest::multipart::Part::bytes(utterance.audio.clone())
                    .file_name(file_name)
                    .mime_str("audio/wav")?;

                let form = reqwest::multipart::Form::new()
                    .part("audio", part)
                    .text("user_id", self.user_id.clone());

                request.multipart(form)
            }
        };

        Ok(request.send().await?)
    }

    /// Fetch reply audio; failures only cost the audio
    async fn fetch_audio(&self, body: &AskResponse) -> Option<PathBuf> {
        if let Some(encoded) = &body.audio_bytes {
            return match base64::engine::general_purpose::STANDARD.decode(encoded) {
                Ok(bytes) => self.save(&bytes, "mp3"),
                Err(e) => {
                    tracing::warn!(error = %e, "invalid inline audio");
                    None
                }
            };
        }

        let raw = body.audio_url.as_deref()?;
        let url = match self.base_url.join(raw) {
            Ok(url) => url,
            Err(e) => {
                tracing::warn!(audio_url = raw, error = %e, "invalid audio URL");
                return None;
            }
        };

        match self.download(&url).await {
            Ok(bytes) => self.save(&bytes, audio_extension(&url)),
            Err(e) => {
                tracing::warn!(url = %url, error = %e, "audio download failed");
                None
            }
        }
    }

    async fn download(&self, url: &Url) -> Result<Vec<u8>> {
        let response = self.client.get(url.clone()).send().await?;

        let status = response.status();
        if !status.is_success() {
            return Err(Error::Remote(format!("audio download returned {status}")));
        }

        Ok(response.bytes().await?.to_vec())
    }

    fn save(&self, bytes: &[u8], extension: &str) -> Option<PathBuf> {
        self.store
            .save_response(bytes, extension)
            .map_err(|e| tracing::warn!(error = %e, "failed to save response audio"))
            .ok()
    }
}

#[async_trait]
impl ResponseProvider for RemoteProvider {
    fn name(&self) -> &'static str {
        "remote"
    }

    async fn respond(&self, input: &UserInput) -> Result<ResponsePayload> {
        tracing::debug!(endpoint = %self.endpoint, input = input.kind(), "calling remote service");

        let response = self.send(input).await.map_err(|e| match e {
            Error::Http(e) if e.is_timeout() => Error::Remote("request timed out".to_string()),
            other => other,
        })?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(Error::Remote(format!("API error {status}: {body}")));
        }

        let body: AskResponse = response
            .json()
            .await
            .map_err(|e| Error::Remote(format!("malformed response: {e}")))?;

        let audio = self.fetch_audio(&body).await;

        Ok(ResponsePayload {
            text: body.text,
            audio,
            emotion: body.emotion.unwrap_or_else(|| emotion::NEUTRAL.to_string()),
            latency: Duration::ZERO,
            source: ResponseSource::Remote,
        })
    }
}

fn parse_base(raw: &str) -> Result<Url> {
    let mut url =
        Url::parse(raw).map_err(|e| Error::Config(format!("invalid API URL {raw}: {e}")))?;

    if !url.path().ends_with('/') {
        let path = format!("{}/", url.path());
        url.set_path(&path);
    }

    Ok(url)
}

fn audio_extension(url: &Url) -> &'static str {
    match Path::new(url.path()).extension().and_then(|e| e.to_str()) {
        Some(ext) if ext.eq_ignore_ascii_case("wav") => "wav",
        _ => "mp3",
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_endpoint_join() {
        let dir = tempfile::tempdir().unwrap();
        let store = ArtifactStore::new(dir.path()).unwrap();

        let remote = RemoteProvider::new(
            "http://localhost:5000",
            "u".into(),
            DEFAULT_REMOTE_TIMEOUT,
            store.clone(),
        )
        .unwrap();
        assert_eq!(remote.endpoint().as_str(), "http://localhost:5000/api/ask");

        let prefixed =
            RemoteProvider::new("http://host/mentor", "u".into(), DEFAULT_REMOTE_TIMEOUT, store)
                .unwrap();
        assert_eq!(prefixed.endpoint().as_str(), "http://host/mentor/api/ask");
    }

    #[test]
    fn test_invalid_url_is_config_error() {
        let dir = tempfile::tempdir().unwrap();
        let store = ArtifactStore::new(dir.path()).unwrap();
        let result = RemoteProvider::new("not a url", "u".into(), DEFAULT_REMOTE_TIMEOUT, store);
        assert!(matches!(result, Err(Error::Config(_))));
    }

    #[test]
    fn test_audio_extension() {
        let url = Url::parse("http://h/static/a.WAV").unwrap();
        assert_eq!(audio_extension(&url), "wav");
        let url = Url::parse("http://h/audio?id=1").unwrap();
        assert_eq!(audio_extension(&url), "mp3");
        // Playback only decodes WAV and MP3
        let url = Url::parse("http://h/static/a.ogg").unwrap();
        assert_eq!(audio_extension(&url), "mp3");
    }

    #[test]
    fn test_response_defaults() {
        let body: AskResponse = serde_json::from_str(r#"{"text":"hi"}"#).unwrap();
        assert!(body.audio_url.is_none());
        assert!(body.emotion.is_none());
    }
}
