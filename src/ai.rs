use std::env;

use anyhow::{anyhow, Result};
use log::warn;
use serde::Deserialize;
use serde_json::json;
use url::Url;

/// Apology shown when the chat proxy cannot reach the inference service.
pub const CHAT_FALLBACK: &str =
    "Sorry, a temporary error occurred. Please try again in a moment.";

/// Canned three-part feedback substituted whenever question analysis fails;
/// the dashboard renders it verbatim.
pub const ANALYSIS_FALLBACK: &str = "\
Strengths
- The question is clear and easy to understand
- It shows real curiosity and a drive to explore

Weaknesses
- Including a concrete situation or some background would help
- Narrowing the scope would make the question easier to answer

Suggestions
- Sharpen \"why is it so?\" into \"in which situations is it so, and why?\"
- Work one of your own observations or experiences into the question
- Split it into smaller sub-questions that can be explored from several angles";

const ANALYSIS_SYSTEM_PROMPT: &str = "\
You are an education expert. Analyze the student's question and reply in this format:

Strengths: 1-2 good points about this question
Weaknesses: 1-2 areas that need improvement
Suggestions: 1-2 concrete ways to deepen the question

Keep it concise and easy for a student to understand.";

#[derive(Debug, Deserialize)]
struct CompletionResponse {
    response: String,
}

/// Thin pass-through to a hosted text-completion service. Configured from
/// the environment; with no endpoint configured every call degrades to the
/// fallback text, which also makes tests hermetic.
#[derive(Clone)]
pub struct AiClient {
    http: reqwest::Client,
    endpoint: Option<Url>,
    api_key: Option<String>,
    model: String,
}

impl AiClient {
    pub fn from_env() -> Self {
        let endpoint = env::var("AI_ENDPOINT")
            .ok()
            .and_then(|raw| match Url::parse(&raw) {
                Ok(url) => Some(url),
                Err(e) => {
                    warn!("Ignoring unparseable AI_ENDPOINT: {}", e);
                    None
                }
            });
        Self {
            http: reqwest::Client::new(),
            endpoint,
            api_key: env::var("AI_API_KEY").ok(),
            model: env::var("AI_MODEL").unwrap_or_else(|_| "llama-2-7b-chat-int8".to_string()),
        }
    }

    /// A client with no endpoint: every call returns the fallback text.
    pub fn disabled() -> Self {
        Self {
            http: reqwest::Client::new(),
            endpoint: None,
            api_key: None,
            model: "disabled".to_string(),
        }
    }

    /// Free-form chat. Never fails; any upstream problem becomes the apology
    /// string.
    pub async fn chat(&self, message: &str) -> String {
        match self
            .complete("You are a friendly learning assistant for students.", message)
            .await
        {
            Ok(text) => text,
            Err(e) => {
                warn!("AI chat failed, using fallback: {}", e);
                CHAT_FALLBACK.to_string()
            }
        }
    }

    /// Question-quality feedback. Never fails; any upstream problem becomes
    /// the canned analysis.
    pub async fn analyze_question(&self, question: &str) -> String {
        let user_prompt = format!("Please analyze this question: \"{}\"", question);
        match self.complete(ANALYSIS_SYSTEM_PROMPT, &user_prompt).await {
            Ok(text) => text,
            Err(e) => {
                warn!("AI analysis failed, using fallback: {}", e);
                ANALYSIS_FALLBACK.to_string()
            }
        }
    }

    async fn complete(&self, system: &str, user: &str) -> Result<String> {
        let endpoint = self
            .endpoint
            .clone()
            .ok_or_else(|| anyhow!("no AI endpoint configured"))?;
        let body = json!({
            "model": self.model,
            "messages": [
                { "role": "system", "content": system },
                { "role": "user", "content": user },
            ],
        });
        let mut request = self.http.post(endpoint).json(&body);
        if let Some(key) = &self.api_key {
            request = request.bearer_auth(key);
        }
        let response = request.send().await?.error_for_status()?;
        let parsed: CompletionResponse = response.json().await?;
        Ok(parsed.response)
    }
}
