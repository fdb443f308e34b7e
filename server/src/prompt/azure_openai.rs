use std::time::Duration;

use anyhow::{anyhow, Context};
use indoc::formatdoc;
use reqwest::StatusCode;
use serde::{Deserialize, Serialize};
use serde_json::json;

use super::category::{Category, ClassificationResult};
use crate::{
    error::{AppError, AppResult},
    rate_limiters::RateLimiters,
    server_config::{InferenceCredentials, ModelConfig},
    HttpClient,
};

fn system_prompt(categories: &[Category]) -> String {
    let descriptions = categories
        .iter()
        .map(|c| format!("- {}: {}", c, category_hint(*c)))
        .collect::<Vec<_>>()
        .join("\n");

    formatdoc! {r#"
        You are an email classification assistant for university students at the University of Iowa.
        Your job is to categorize emails to help students organize their inbox efficiently.

        Classify each email into exactly ONE of these categories:
        {descriptions}

        Consider:
        1. Sender domain (e.g., @uiowa.edu suggests ACADEMIC or ADMINISTRATIVE)
        2. Keywords indicating urgency, deadlines, or time-sensitivity
        3. Tone (official vs casual vs marketing)
        4. Context clues in subject and body

        Respond ONLY with valid JSON in this exact format:
        {{
          "category": "CATEGORY_NAME",
          "confidence": 0.85,
          "reasoning": "Brief explanation of why this category was chosen"
        }}"#}
}

fn category_hint(category: Category) -> &'static str {
    match category {
        Category::Urgent => "Time-sensitive, requires immediate action, has deadlines",
        Category::Academic => {
            "Classes, assignments, grades, lectures, professors, course materials"
        }
        Category::Administrative => {
            "Registration, forms, tuition, university business, official notices"
        }
        Category::Social => "Events, club meetings, social gatherings, RSVPs, campus activities",
        Category::Promotional => "Marketing, newsletters, advertisements, bulk emails",
        Category::Other => "Everything else",
    }
}

fn user_prompt(subject: &str, body: &str, sender: &str) -> String {
    formatdoc! {"
        Classify this email:

        From: {sender}
        Subject: {subject}
        Body Preview: {body}"}
}

/// Chat completions client for an Azure OpenAI deployment
#[derive(Clone)]
pub struct AzureOpenAiClient {
    http_client: HttpClient,
    rate_limiters: RateLimiters,
    credentials: InferenceCredentials,
    model: ModelConfig,
}

impl AzureOpenAiClient {
    pub fn new(
        http_client: HttpClient,
        rate_limiters: RateLimiters,
        credentials: InferenceCredentials,
        model: ModelConfig,
    ) -> Self {
        Self {
            http_client,
            rate_limiters,
            credentials,
            model,
        }
    }

    fn chat_url(&self) -> String {
        format!(
            "{}/openai/deployments/{}/chat/completions",
            self.credentials.endpoint.trim_end_matches('/'),
            self.model.deployment
        )
    }

    fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.model.request_timeout_secs)
    }

    /// Sends one classification prompt. Inputs are expected to be sanitized.
    pub async fn send_classification_prompt(
        &self,
        subject: &str,
        body: &str,
        sender: &str,
    ) -> AppResult<ClassificationResult> {
        self.rate_limiters.acquire_one().await;

        let payload = json!({
            "messages": [
                {
                    "role": "system",
                    "content": system_prompt(&Category::all())
                },
                {
                    "role": "user",
                    "content": user_prompt(subject, body, sender)
                }
            ],
            "temperature": self.model.temperature,
            "max_tokens": self.model.max_tokens,
            "response_format": { "type": "json_object" }
        });

        let resp = tokio::time::timeout(self.request_timeout(), self.call(&payload))
            .await
            .map_err(|_| AppError::RequestTimeout)??;

        let parsed = serde_json::from_value::<ChatApiResponseOrError>(resp.clone())
            .context(format!("Could not parse chat response: {}", resp))?;

        let parsed = match parsed {
            ChatApiResponseOrError::Error(error) => {
                return Err(anyhow!("Chat API error: {:?}", error.error).into());
            }
            ChatApiResponseOrError::Response(parsed) => parsed,
        };

        if let Some(usage) = &parsed.usage {
            tracing::debug!("Classification token usage: {}", usage.total_tokens);
        }

        let content = parsed
            .choices
            .first()
            .context("No choices in response")?
            .message
            .content
            .as_deref()
            .context("No content in response")?;

        let answer = parse_answer(content)?;
        Ok(ClassificationResult::from_label(
            &answer.category,
            answer.confidence,
            answer.reasoning,
        ))
    }

    async fn call(&self, payload: &serde_json::Value) -> AppResult<serde_json::Value> {
        let resp = self
            .http_client
            .post(self.chat_url())
            .query(&[("api-version", self.model.api_version.as_str())])
            .header("api-key", &self.credentials.api_key)
            .json(payload)
            .send()
            .await?;

        let status = resp.status();
        if status == StatusCode::TOO_MANY_REQUESTS {
            self.rate_limiters.trigger_backoff();
            return Err(AppError::TooManyRequests);
        }

        let body = resp.json::<serde_json::Value>().await.map_err(|e| {
            AppError::Internal(anyhow!("Chat API returned {} with unreadable body: {}", status, e))
        })?;
        Ok(body)
    }
}

/// The answer must be the JSON object the system prompt asks for. Anything
/// else, including a truncated object, is an error.
fn parse_answer(content: &str) -> AppResult<AnswerJson> {
    serde_json::from_str::<AnswerJson>(content).map_err(|e| {
        tracing::warn!("Model answer is not valid JSON: {}", e);
        AppError::Internal(anyhow!("Malformed classification answer: {}", e))
    })
}

#[derive(Debug, Serialize, Deserialize)]
pub struct AnswerJson {
    pub category: String,
    #[serde(default)]
    pub confidence: f32,
    #[serde(default)]
    pub reasoning: String,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct PromptUsage {
    pub prompt_tokens: i64,
    pub completion_tokens: i64,
    pub total_tokens: i64,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct ChatMessage {
    pub role: String,
    pub content: Option<String>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct ChatChoice {
    pub index: i32,
    pub message: ChatMessage,
    pub finish_reason: Option<String>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct ChatApiResponse {
    pub choices: Vec<ChatChoice>,
    pub usage: Option<PromptUsage>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct ChatApiErrorDetail {
    pub code: Option<String>,
    pub message: String,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct ChatApiError {
    pub error: ChatApiErrorDetail,
}

#[derive(Debug, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ChatApiResponseOrError {
    Response(ChatApiResponse),
    Error(ChatApiError),
}
