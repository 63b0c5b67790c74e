//! Request orchestration for the Code Assistant app
//!
//! Resolves the backend from settings and paces a request through the
//! "thinking" stages shown while the backend works.

use anyhow::{anyhow, Result};
use async_trait::async_trait;
use providers::{AssistBackend, CodeAssistClient};
use shared::agent_api::AssistReply;
use shared::settings::AppSettings;
use std::future::Future;
use std::time::Duration;

/// One step of the progress indicator.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ThinkingStage {
    pub text: &'static str,
    pub duration: Duration,
}

pub const THINKING_STAGES: [ThinkingStage; 3] = [
    ThinkingStage {
        text: "Analyzing uploaded files...",
        duration: Duration::from_millis(800),
    },
    ThinkingStage {
        text: "Processing your request...",
        duration: Duration::from_millis(1000),
    },
    ThinkingStage {
        text: "Generating response...",
        duration: Duration::from_millis(1200),
    },
];

/// Announce each stage and wait out its duration, then run `work`.
pub async fn with_thinking_stages<T, F>(
    enabled: bool,
    on_stage: &mut (dyn FnMut(&ThinkingStage) + Send),
    work: F,
) -> T
where
    F: Future<Output = T>,
{
    if enabled {
        for stage in &THINKING_STAGES {
            on_stage(stage);
            tokio::time::sleep(stage.duration).await;
        }
    }
    work.await
}

/// Stands in for the real client when it cannot be built, so the failure is
/// reported through the normal reply path.
struct UnavailableBackend {
    reason: String,
}

#[async_trait]
impl AssistBackend for UnavailableBackend {
    async fn assist(&self, _user_prompt: &str, _repo_context: &str) -> Result<AssistReply> {
        Err(anyhow!(self.reason.clone()))
    }
}

/// Build the backend client for the current settings.
pub fn connect_backend(settings: &AppSettings) -> Box<dyn AssistBackend> {
    match CodeAssistClient::from_settings(settings) {
        Ok(client) => Box::new(client),
        Err(e) => {
            tracing::debug!(error = %e, "backend unavailable");
            Box::new(UnavailableBackend {
                reason: e.to_string(),
            })
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::time::Instant;

    #[tokio::test(start_paused = true)]
    async fn test_stages_run_in_order_before_work() {
        let mut seen = Vec::new();
        let start = Instant::now();
        let result = with_thinking_stages(
            true,
            &mut |stage: &ThinkingStage| seen.push(stage.text),
            async { 42 },
        )
        .await;

        assert_eq!(result, 42);
        assert_eq!(
            seen,
            vec![
                "Analyzing uploaded files...",
                "Processing your request...",
                "Generating response...",
            ]
        );
        assert!(start.elapsed() >= Duration::from_millis(3000));
    }

    #[tokio::test]
    async fn test_disabled_stages_skip_straight_to_work() {
        let mut calls = 0;
        let result =
            with_thinking_stages(false, &mut |_: &ThinkingStage| calls += 1, async { "done" })
                .await;
        assert_eq!(result, "done");
        assert_eq!(calls, 0);
    }

    #[tokio::test]
    async fn test_missing_key_surfaces_on_assist() {
        let settings = AppSettings {
            api_key: None,
            ..AppSettings::default()
        };
        let backend = connect_backend(&settings);
        let err = backend.assist("hi", "").await.unwrap_err();
        assert_eq!(err.to_string(), "Please set your Gemini API key in settings");
    }
}
