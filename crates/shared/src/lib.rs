pub mod error;
pub mod files;
pub mod segments;

pub mod settings {
    use serde::{Deserialize, Serialize};

    pub const DEFAULT_BACKEND_URL: &str = "https://code-assistant-backend.vercel.app";

    fn default_backend_url() -> String {
        DEFAULT_BACKEND_URL.to_string()
    }

    fn default_true() -> bool {
        true
    }

    fn default_context_chars() -> usize {
        2000
    }

    fn default_max_in_flight() -> usize {
        16
    }

    #[derive(Debug, Clone, Serialize, Deserialize)]
    pub struct AppSettings {
        /// Gemini API key forwarded to the backend with every request
        #[serde(default)]
        pub api_key: Option<String>,
        #[serde(default = "default_backend_url")]
        pub backend_url: String,
        /// How much of each attached file is sent as repo context
        #[serde(default = "default_context_chars")]
        pub context_chars_per_file: usize,
        #[serde(default = "default_true")]
        pub show_thinking_stages: bool,
        /// Cap on concurrent file reads during ingestion
        #[serde(default = "default_max_in_flight")]
        pub max_in_flight_reads: usize,
    }

    impl AppSettings {
        /// The API key if one is set and non-blank.
        pub fn api_key(&self) -> Option<&str> {
            self.api_key
                .as_deref()
                .map(str::trim)
                .filter(|k| !k.is_empty())
        }
    }

    impl Default for AppSettings {
        fn default() -> Self {
            Self {
                api_key: None,
                backend_url: default_backend_url(),
                context_chars_per_file: default_context_chars(),
                show_thinking_stages: true,
                max_in_flight_reads: default_max_in_flight(),
            }
        }
    }
}

pub mod agent_api {
    use serde::{Deserialize, Serialize};

    /// Body of `POST /api/code-assist`.
    #[derive(Debug, Clone, Serialize, Deserialize)]
    #[serde(rename_all = "camelCase")]
    pub struct CodeAssistRequest {
        pub user_prompt: String,
        pub repo_context: String,
        pub api_key: String,
    }

    #[derive(Debug, Clone, Serialize, Deserialize)]
    pub struct CodeAssistResponse {
        pub ok: bool,
        #[serde(default)]
        pub result: Option<AssistReply>,
        #[serde(default)]
        pub error: Option<String>,
    }

    /// What the backend answered with: free text, or separate fields.
    #[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
    #[serde(untagged)]
    pub enum AssistReply {
        Text(String),
        Structured(StructuredReply),
    }

    /// An assistant reply delivered as separate fields instead of one string.
    #[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
    pub struct StructuredReply {
        #[serde(default)]
        pub explanation: Option<String>,
        #[serde(default)]
        pub code: Option<String>,
        #[serde(default)]
        pub language: Option<String>,
    }

    impl StructuredReply {
        pub fn language_or_default(&self) -> &str {
            self.language
                .as_deref()
                .filter(|l| !l.is_empty())
                .unwrap_or(crate::segments::DEFAULT_LANGUAGE)
        }
    }
}
