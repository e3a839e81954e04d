//! Vision-model photo descriptions.
//!
//! Photos imported without a description are described by a local vision
//! model served by Ollama (`POST /api/chat` with the image attached as
//! base64). Generation is slow, minutes per photo on modest hardware, so
//! each call is bounded by `describe.timeout_secs` and an expired call
//! fails with [`IndexError::Timeout`] instead of stalling the import.

use anyhow::{bail, Context, Result};
use base64::Engine;
use std::path::Path;
use std::time::{Duration, Instant};
use tracing::{debug, info};

use photo_index_core::error::IndexError;

use crate::config::DescribeConfig;

const DESCRIBE_PROMPT: &str = "Describe this image in comprehensive detail, including:
- Main subjects and objects present
- Colors and lighting (bright, dim, warm tones, cool tones, etc.)
- Composition and framing (close-up, wide shot, rule of thirds, etc.)
- Image orientation (landscape, portrait, square)
- Image quality (sharp, blurry, well-exposed, underexposed, etc.)
- Mood and atmosphere (cheerful, somber, energetic, calm, etc.)
- Setting and background elements
- Any notable features, patterns, or textures
- Activities or actions taking place
Be specific and detailed to enable accurate searching.";

/// Ollama vision client.
pub struct Describer {
    client: reqwest::Client,
    model: String,
    url: String,
    timeout_secs: u64,
}

impl Describer {
    /// Build a describer, or `None` when `describe.provider = "disabled"`.
    pub fn from_config(config: &DescribeConfig) -> Result<Option<Self>> {
        match config.provider.as_str() {
            "disabled" => Ok(None),
            "ollama" => Ok(Some(Self {
                client: reqwest::Client::builder().build()?,
                model: config.model.clone(),
                url: config.url.trim_end_matches('/').to_string(),
                timeout_secs: config.timeout_secs,
            })),
            other => bail!("Unknown describe provider: {}", other),
        }
    }

    /// Generate a description for the image at `image_path`.
    pub async fn describe(&self, image_path: &Path) -> Result<String> {
        let bytes = tokio::fs::read(image_path)
            .await
            .with_context(|| format!("Failed to read image: {}", image_path.display()))?;
        let image = base64::engine::general_purpose::STANDARD.encode(&bytes);

        let body = serde_json::json!({
            "model": self.model,
            "stream": false,
            "messages": [{
                "role": "user",
                "content": DESCRIBE_PROMPT,
                "images": [image],
            }],
        });

        debug!(image = %image_path.display(), model = %self.model, "requesting description");
        let start = Instant::now();

        let description = tokio::time::timeout(Duration::from_secs(self.timeout_secs), self.chat(&body))
            .await
            .map_err(|_| IndexError::Timeout {
                operation: format!("description of {}", image_path.display()),
                secs: self.timeout_secs,
            })??;

        info!(
            image = %image_path.display(),
            elapsed_secs = start.elapsed().as_secs_f64(),
            "description generated"
        );
        Ok(description)
    }

    async fn chat(&self, body: &serde_json::Value) -> Result<String> {
        let response = self
            .client
            .post(format!("{}/api/chat", self.url))
            .json(body)
            .send()
            .await
            .with_context(|| format!("Ollama connection error (is Ollama running at {}?)", self.url))?;
        let status = response.status();
        if !status.is_success() {
            let text = response.text().await.unwrap_or_default();
            bail!("Ollama API error {}: {}", status, text);
        }
        let json: serde_json::Value = response.json().await?;
        parse_chat_response(&json)
    }
}

fn parse_chat_response(json: &serde_json::Value) -> Result<String> {
    let content = json
        .get("message")
        .and_then(|m| m.get("content"))
        .and_then(|c| c.as_str())
        .ok_or_else(|| anyhow::anyhow!("Invalid Ollama response: missing message.content"))?
        .trim();
    if content.is_empty() {
        bail!("Vision model returned an empty description");
    }
    Ok(content.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn disabled_config_builds_nothing() {
        let describer = Describer::from_config(&DescribeConfig::default()).unwrap();
        assert!(describer.is_none());
    }

    #[test]
    fn parses_chat_content() {
        let json = serde_json::json!({
            "message": {"role": "assistant", "content": "  A dog on a beach.\n"}
        });
        assert_eq!(parse_chat_response(&json).unwrap(), "A dog on a beach.");
        assert!(parse_chat_response(&serde_json::json!({"message": {"content": ""}})).is_err());
    }

    #[tokio::test]
    async fn missing_image_is_an_error() {
        let describer = Describer::from_config(&DescribeConfig {
            provider: "ollama".into(),
            ..DescribeConfig::default()
        })
        .unwrap()
        .unwrap();
        let err = describer
            .describe(Path::new("/nonexistent/photo.jpg"))
            .await
            .unwrap_err();
        assert!(err.to_string().contains("Failed to read image"));
    }
}
