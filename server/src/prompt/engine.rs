use async_trait::async_trait;

use super::{
    azure_openai::AzureOpenAiClient,
    category::ClassificationResult,
    keywords::classify_by_keywords,
};
use crate::{email::sanitize::sanitize_input, error::AppResult};

/// Assigns a category to a message. Never fails: errors are folded into a
/// catch-all result that names the failure.
#[async_trait]
pub trait Classifier: Send + Sync {
    async fn classify(&self, subject: &str, body: &str, sender: &str) -> ClassificationResult;
}

/// Classifies through the inference deployment when one is configured,
/// otherwise through the keyword table.
#[derive(Clone)]
pub struct ClassificationEngine {
    inference: Option<AzureOpenAiClient>,
}

impl ClassificationEngine {
    pub fn new(inference: Option<AzureOpenAiClient>) -> Self {
        if inference.is_none() {
            tracing::warn!("Inference is not configured, classifying by keywords");
        }
        Self { inference }
    }

    pub fn keyword_only() -> Self {
        Self { inference: None }
    }

    pub fn uses_inference(&self) -> bool {
        self.inference.is_some()
    }

    /// Like [`Classifier::classify`], but surfaces inference errors
    pub async fn try_classify(
        &self,
        subject: &str,
        body: &str,
        sender: &str,
    ) -> AppResult<ClassificationResult> {
        let subject = sanitize_input(subject);
        let body = sanitize_input(body);
        let sender = sanitize_input(sender);

        match &self.inference {
            Some(client) => client.send_classification_prompt(&subject, &body, &sender).await,
            None => Ok(classify_by_keywords(&subject, &body)),
        }
    }
}

#[async_trait]
impl Classifier for ClassificationEngine {
    async fn classify(&self, subject: &str, body: &str, sender: &str) -> ClassificationResult {
        match self.try_classify(subject, body, sender).await {
            Ok(result) => {
                tracing::info!(
                    "Email classified as '{}' with confidence {:.2}",
                    result.category,
                    result.confidence
                );
                result
            }
            Err(e) => {
                tracing::error!("Classification failed: {:?}", e);
                ClassificationResult::failed(e)
            }
        }
    }
}
