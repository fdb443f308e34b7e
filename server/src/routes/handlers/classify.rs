use axum::{extract::State, Json};
use serde::Deserialize;
use serde_json::{json, Map, Value};

use crate::{
    error::{AppError, AppJsonResult},
    prompt::{
        invalid_categories, Category, ClassificationEngine, ClassificationResult,
        FALLBACK_KEYWORDS,
    },
};

#[derive(Debug, Deserialize)]
pub struct ClassifyRequest {
    subject: String,
    body: String,
    #[serde(rename = "from", alias = "from_address")]
    from_address: String,
    #[serde(default)]
    categories: Option<Vec<String>>,
}

impl ClassifyRequest {
    fn validate(&self) -> Result<(), AppError> {
        for (field, value) in [
            ("subject", &self.subject),
            ("body", &self.body),
            ("from", &self.from_address),
        ] {
            if value.trim().is_empty() {
                return Err(AppError::BadRequest(format!("Field '{}' must not be empty", field)));
            }
        }

        if let Some(categories) = &self.categories {
            let invalid = invalid_categories(categories);
            if !invalid.is_empty() {
                tracing::warn!("Invalid categories provided: {:?}", invalid);
                let valid: Vec<String> = Category::all().iter().map(|c| c.to_string()).collect();
                return Err(AppError::BadRequest(format!(
                    "Invalid categories: {:?}. Valid categories are: {:?}",
                    invalid, valid
                )));
            }
        }

        Ok(())
    }
}

pub async fn handler_classify(
    State(engine): State<ClassificationEngine>,
    Json(request): Json<ClassifyRequest>,
) -> AppJsonResult<ClassificationResult> {
    request.validate()?;
    tracing::info!("Classifying email: {}", request.subject);

    let result = engine
        .try_classify(&request.subject, &request.body, &request.from_address)
        .await
        .map_err(|e| AppError::Internal(anyhow::anyhow!("Classification failed: {}", e)))?;

    tracing::info!(
        "Email classified as '{}' with confidence {:.2}",
        result.category,
        result.confidence
    );
    Ok(Json(result))
}

pub async fn handler_categories(State(engine): State<ClassificationEngine>) -> Json<Value> {
    let keywords: Map<String, Value> = FALLBACK_KEYWORDS
        .iter()
        .map(|(category, words)| (category.to_string(), json!(words)))
        .collect();

    Json(json!({
        "categories": Category::all(),
        "catchAll": Category::CATCH_ALL,
        "fallbackKeywords": keywords,
        "classifier": if engine.uses_inference() { "azure-openai" } else { "keywords" },
    }))
}

#[cfg(test)]
mod tests {
    use crate::{
        routes::AppRouter,
        testing::common::{test_server_state, ScriptedMailbox},
    };
    use axum::{
        body::Body,
        http::{header, Request, StatusCode},
    };
    use http_body_util::BodyExt;
    use serde_json::{json, Value};
    use std::sync::Arc;
    use tower::ServiceExt;

    async fn post_classify(body: Value) -> (StatusCode, Value) {
        let state = test_server_state(Arc::new(ScriptedMailbox::new(vec![])), "http://127.0.0.1:9");
        let resp = AppRouter::create(state)
            .oneshot(
                Request::post("/classify")
                    .header(header::CONTENT_TYPE, "application/json")
                    .body(Body::from(body.to_string()))
                    .unwrap(),
            )
            .await
            .unwrap();
        let status = resp.status();
        let bytes = resp.into_body().collect().await.unwrap().to_bytes();
        (status, serde_json::from_slice(&bytes).unwrap_or(Value::Null))
    }

    #[tokio::test]
    async fn test_classify_with_keyword_engine() {
        let (status, body) = post_classify(json!({
            "subject": "CS 4980 Assignment Due Friday",
            "body": "Your programming assignment is due this Friday at 11:59 PM",
            "from": "john-smith@uiowa.edu",
            "categories": ["URGENT", "ACADEMIC"]
        }))
        .await;

        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["category"], "ACADEMIC");
        assert_eq!(body["reasoning"], "Keyword match: 'assignment'");
    }

    #[tokio::test]
    async fn test_unknown_category_rejected() {
        let (status, body) = post_classify(json!({
            "subject": "Hello",
            "body": "World",
            "from": "a@b.c",
            "categories": ["URGENT", "SPAM"]
        }))
        .await;

        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert!(body["error"]["message"]
            .as_str()
            .unwrap()
            .contains("SPAM"));
    }

    #[tokio::test]
    async fn test_empty_field_rejected() {
        let (status, _) = post_classify(json!({
            "subject": "  ",
            "body": "World",
            "from": "a@b.c"
        }))
        .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn test_categories_endpoint_lists_table() {
        let state = test_server_state(Arc::new(ScriptedMailbox::new(vec![])), "http://127.0.0.1:9");
        let resp = AppRouter::create(state)
            .oneshot(Request::get("/classify/categories").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(resp.status(), StatusCode::OK);

        let bytes = resp.into_body().collect().await.unwrap().to_bytes();
        let body: Value = serde_json::from_slice(&bytes).unwrap();
        assert_eq!(body["categories"].as_array().unwrap().len(), 6);
        assert_eq!(body["catchAll"], "OTHER");
        assert_eq!(body["fallbackKeywords"]["URGENT"][0], "urgent");
        assert_eq!(body["classifier"], "keywords");
    }
}
