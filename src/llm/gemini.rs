//! Gemini REST client implementing [`ChatModel`] and [`Embedder`].

use async_trait::async_trait;
use reqwest::{Client, StatusCode};
use serde::{Deserialize, Serialize};
use std::time::Duration;

use super::{ChatModel, Content, Embedder, LlmError, Part};
use crate::config::LlmConfig;

pub struct GeminiClient {
    client: Client,
    base_url: String,
    api_key: Option<String>,
    model: String,
    temperature: f64,
    system_instruction: String,
    embedding_model: String,
    dimensions: usize,
}

// ── Wire types ────────────────────────────────────────────────────────────────

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct GenerateContentRequest<'a> {
    contents: &'a [Content],
    #[serde(skip_serializing_if = "Option::is_none")]
    system_instruction: Option<SystemInstruction>,
    generation_config: GenerationConfig,
}

#[derive(Debug, Serialize)]
struct SystemInstruction {
    parts: Vec<Part>,
}

#[derive(Debug, Serialize)]
struct GenerationConfig {
    temperature: f64,
}

#[derive(Debug, Deserialize)]
struct GenerateContentResponse {
    #[serde(default)]
    candidates: Vec<Candidate>,
}

#[derive(Debug, Deserialize)]
struct Candidate {
    content: Option<CandidateContent>,
}

#[derive(Debug, Deserialize)]
struct CandidateContent {
    #[serde(default)]
    parts: Vec<ResponsePart>,
}

#[derive(Debug, Deserialize)]
struct ResponsePart {
    text: Option<String>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct EmbedContentRequest<'a> {
    model: String,
    content: EmbedContent<'a>,
    output_dimensionality: usize,
}

#[derive(Debug, Serialize)]
struct EmbedContent<'a> {
    parts: [EmbedPart<'a>; 1],
}

#[derive(Debug, Serialize)]
struct EmbedPart<'a> {
    text: &'a str,
}

#[derive(Debug, Deserialize)]
struct EmbedContentResponse {
    embedding: Option<EmbeddingValues>,
}

#[derive(Debug, Deserialize)]
struct EmbeddingValues {
    #[serde(default)]
    values: Vec<f32>,
}

#[derive(Debug, Deserialize)]
struct ErrorEnvelope {
    error: ErrorBody,
}

#[derive(Debug, Deserialize)]
struct ErrorBody {
    message: String,
}

// ── Client ────────────────────────────────────────────────────────────────────

impl GeminiClient {
    pub fn new(config: &LlmConfig) -> anyhow::Result<Self> {
        let client = Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .connect_timeout(Duration::from_secs(10))
            .build()?;

        if config.api_key.is_none() {
            tracing::warn!("no LLM API key configured; generation and embedding will fail");
        }

        Ok(Self {
            client,
            base_url: config.base_url.trim_end_matches('/').to_string(),
            api_key: config.api_key.clone(),
            model: model_path(&config.model),
            temperature: config.temperature,
            system_instruction: config.system_instruction.clone(),
            embedding_model: model_path(&config.embedding_model),
            dimensions: config.embedding_dimensions,
        })
    }

    async fn post<B: Serialize + ?Sized, R: for<'de> Deserialize<'de>>(
        &self,
        method: &str,
        model: &str,
        body: &B,
    ) -> Result<R, LlmError> {
        let api_key = self.api_key.as_deref().ok_or(LlmError::MissingApiKey)?;
        let url = format!("{}/{model}:{method}", self.base_url);

        let response = self
            .client
            .post(&url)
            .header("x-goog-api-key", api_key)
            .json(body)
            .send()
            .await?;

        let status = response.status();
        if status == StatusCode::SERVICE_UNAVAILABLE {
            tracing::warn!(model, method, "LLM provider overloaded");
            return Err(LlmError::Overloaded);
        }
        if !status.is_success() {
            let text = response.text().await.unwrap_or_default();
            let message = serde_json::from_str::<ErrorEnvelope>(&text)
                .map(|e| e.error.message)
                .unwrap_or(text);
            tracing::error!(model, method, status = status.as_u16(), %message, "LLM request rejected");
            return Err(LlmError::Api {
                status: status.as_u16(),
                message,
            });
        }

        Ok(response.json::<R>().await?)
    }
}

/// `gemini-2.0-flash` → `models/gemini-2.0-flash`; already-qualified names pass through.
fn model_path(model: &str) -> String {
    if model.starts_with("models/") {
        model.to_string()
    } else {
        format!("models/{model}")
    }
}

#[async_trait]
impl ChatModel for GeminiClient {
    async fn generate(&self, contents: &[Content]) -> Result<String, LlmError> {
        let system_instruction = (!self.system_instruction.is_empty()).then(|| SystemInstruction {
            parts: vec![Part {
                text: self.system_instruction.clone(),
            }],
        });
        let request = GenerateContentRequest {
            contents,
            system_instruction,
            generation_config: GenerationConfig {
                temperature: self.temperature,
            },
        };

        tracing::debug!(turns = contents.len(), model = %self.model, "generating content");
        let response: GenerateContentResponse =
            self.post("generateContent", &self.model, &request).await?;

        let text: String = response
            .candidates
            .into_iter()
            .next()
            .and_then(|c| c.content)
            .map(|c| c.parts.into_iter().filter_map(|p| p.text).collect())
            .unwrap_or_default();

        if text.is_empty() {
            return Err(LlmError::EmptyResponse("candidate text"));
        }
        Ok(text)
    }
}

#[async_trait]
impl Embedder for GeminiClient {
    async fn embed(&self, text: &str) -> Result<Vec<f32>, LlmError> {
        let request = EmbedContentRequest {
            model: self.embedding_model.clone(),
            content: EmbedContent {
                parts: [EmbedPart { text }],
            },
            output_dimensionality: self.dimensions,
        };

        let response: EmbedContentResponse = self
            .post("embedContent", &self.embedding_model, &request)
            .await?;

        let values = response
            .embedding
            .map(|e| e.values)
            .filter(|v| !v.is_empty())
            .ok_or(LlmError::EmptyResponse("embedding"))?;

        if values.len() != self.dimensions {
            return Err(LlmError::Dimensions {
                expected: self.dimensions,
                actual: values.len(),
            });
        }
        Ok(values)
    }

    fn dimensions(&self) -> usize {
        self.dimensions
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::extract::State;
    use axum::http::{HeaderMap, StatusCode as AxumStatus};
    use axum::response::IntoResponse;
    use axum::routing::post;
    use axum::{Json, Router};
    use std::sync::{Arc, Mutex};

    /// Captured request bodies plus the status/body every call answers with.
    #[derive(Clone)]
    struct Mock {
        seen: Arc<Mutex<Vec<(String, serde_json::Value)>>>,
        status: u16,
        reply: serde_json::Value,
    }

    async fn handle(
        State(mock): State<Mock>,
        headers: HeaderMap,
        axum::extract::Path(call): axum::extract::Path<String>,
        Json(body): Json<serde_json::Value>,
    ) -> impl IntoResponse {
        assert_eq!(headers.get("x-goog-api-key").unwrap(), "test-key");
        mock.seen.lock().unwrap().push((call, body));
        (
            AxumStatus::from_u16(mock.status).unwrap(),
            Json(mock.reply.clone()),
        )
    }

    async fn spawn_mock(status: u16, reply: serde_json::Value) -> (String, Mock) {
        let mock = Mock {
            seen: Arc::new(Mutex::new(Vec::new())),
            status,
            reply,
        };
        let app = Router::new()
            .route("/models/{call}", post(handle))
            .with_state(mock.clone());
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });
        (format!("http://{addr}"), mock)
    }

    fn client_for(base_url: String, dimensions: usize) -> GeminiClient {
        GeminiClient::new(&LlmConfig {
            base_url,
            api_key: Some("test-key".into()),
            embedding_dimensions: dimensions,
            ..LlmConfig::default()
        })
        .unwrap()
    }

    #[test]
    fn model_path_is_qualified_once() {
        assert_eq!(model_path("gemini-2.0-flash"), "models/gemini-2.0-flash");
        assert_eq!(model_path("models/x"), "models/x");
    }

    #[tokio::test]
    async fn generate_sends_history_and_returns_text() {
        let (url, mock) = spawn_mock(
            200,
            serde_json::json!({
                "candidates": [{"content": {"role": "model", "parts": [{"text": "Namaste "}, {"text": "ji"}]}}]
            }),
        )
        .await;
        let client = client_for(url, 4);

        let reply = client
            .generate(&[Content::user("hello"), Content::model("hi"), Content::user("how are you")])
            .await
            .unwrap();
        assert_eq!(reply, "Namaste ji");

        let seen = mock.seen.lock().unwrap();
        let (call, body) = &seen[0];
        assert_eq!(call, "gemini-2.0-flash:generateContent");
        assert_eq!(body["contents"].as_array().unwrap().len(), 3);
        assert_eq!(body["contents"][1]["role"], "model");
        assert_eq!(body["generationConfig"]["temperature"], 1.4);
        assert!(body["systemInstruction"]["parts"][0]["text"]
            .as_str()
            .unwrap()
            .starts_with("You are Weirwood"));
    }

    #[tokio::test]
    async fn service_unavailable_maps_to_overloaded() {
        let (url, _mock) = spawn_mock(503, serde_json::json!({"error": {"message": "busy"}})).await;
        let client = client_for(url, 4);

        let err = client.generate(&[Content::user("hi")]).await.unwrap_err();
        assert!(matches!(err, LlmError::Overloaded));
    }

    #[tokio::test]
    async fn api_errors_carry_the_provider_message() {
        let (url, _mock) =
            spawn_mock(400, serde_json::json!({"error": {"code": 400, "message": "bad key"}})).await;
        let client = client_for(url, 4);

        match client.generate(&[Content::user("hi")]).await.unwrap_err() {
            LlmError::Api { status, message } => {
                assert_eq!(status, 400);
                assert_eq!(message, "bad key");
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[tokio::test]
    async fn embed_requests_configured_dimensionality() {
        let (url, mock) = spawn_mock(
            200,
            serde_json::json!({"embedding": {"values": [0.1, 0.2, 0.3, 0.4]}}),
        )
        .await;
        let client = client_for(url, 4);

        let vector = client.embed("remember me").await.unwrap();
        assert_eq!(vector.len(), 4);

        let seen = mock.seen.lock().unwrap();
        let (call, body) = &seen[0];
        assert_eq!(call, "gemini-embedding-001:embedContent");
        assert_eq!(body["outputDimensionality"], 4);
        assert_eq!(body["content"]["parts"][0]["text"], "remember me");
    }

    #[tokio::test]
    async fn embed_rejects_wrong_dimensionality() {
        let (url, _mock) =
            spawn_mock(200, serde_json::json!({"embedding": {"values": [0.1, 0.2]}})).await;
        let client = client_for(url, 4);

        let err = client.embed("short").await.unwrap_err();
        assert!(matches!(err, LlmError::Dimensions { expected: 4, actual: 2 }));
    }

    #[tokio::test]
    async fn missing_key_fails_without_a_request() {
        let client = GeminiClient::new(&LlmConfig {
            base_url: "http://127.0.0.1:9".into(),
            api_key: None,
            ..LlmConfig::default()
        })
        .unwrap();
        assert!(matches!(
            client.embed("x").await.unwrap_err(),
            LlmError::MissingApiKey
        ));
    }
}
