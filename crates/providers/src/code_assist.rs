use anyhow::{anyhow, Context, Result};
use async_trait::async_trait;
use reqwest::Client;
use shared::agent_api::{AssistReply, CodeAssistRequest, CodeAssistResponse};
use shared::settings::AppSettings;
use std::time::Duration;
use tracing::{debug, warn};
use url::Url;

const ENDPOINT_PATH: &str = "api/code-assist";

/// Anything that can answer a prompt about attached code.
#[async_trait]
pub trait AssistBackend: Send + Sync {
    async fn assist(&self, user_prompt: &str, repo_context: &str) -> Result<AssistReply>;
}

/// Client for the hosted code-assist backend, which forwards prompts to Gemini.
pub struct CodeAssistClient {
    http: Client,
    endpoint: Url,
    api_key: String,
}

impl CodeAssistClient {
    pub fn new(base_url: &str, api_key: &str) -> Result<Self> {
        let mut base = Url::parse(base_url)
            .with_context(|| format!("Invalid backend URL: {}", base_url))?;
        if !base.path().ends_with('/') {
            let path = format!("{}/", base.path());
            base.set_path(&path);
        }
        Ok(Self {
            http: Client::builder().timeout(Duration::from_secs(45)).build()?,
            endpoint: base.join(ENDPOINT_PATH)?,
            api_key: api_key.to_string(),
        })
    }

    /// Build a client from settings. Environment overrides are expected to be
    /// applied to `settings` already.
    pub fn from_settings(settings: &AppSettings) -> Result<Self> {
        let api_key = settings
            .api_key()
            .ok_or_else(|| anyhow!("Please set your Gemini API key in settings"))?;
        Self::new(&settings.backend_url, api_key)
    }

    pub fn endpoint(&self) -> &Url {
        &self.endpoint
    }
}

#[async_trait]
impl AssistBackend for CodeAssistClient {
    async fn assist(&self, user_prompt: &str, repo_context: &str) -> Result<AssistReply> {
        let req = CodeAssistRequest {
            user_prompt: user_prompt.to_string(),
            repo_context: repo_context.to_string(),
            api_key: self.api_key.clone(),
        };
        debug!(
            endpoint = %self.endpoint,
            context_len = repo_context.len(),
            "sending code-assist request"
        );

        let resp = self.http.post(self.endpoint.clone()).json(&req).send().await?;
        if !resp.status().is_success() {
            let status = resp.status();
            let body = resp.text().await.unwrap_or_default();
            warn!(%status, body = body.trim(), "code-assist backend returned an error status");
            return Err(anyhow!("Backend API request failed"));
        }

        let body: CodeAssistResponse = resp
            .json()
            .await
            .context("Backend returned an unreadable response")?;
        if !body.ok {
            return Err(anyhow!(body
                .error
                .filter(|e| !e.is_empty())
                .unwrap_or_else(|| "Unknown error from backend".to_string())));
        }
        body.result
            .ok_or_else(|| anyhow!("Backend returned an empty result"))
    }
}
