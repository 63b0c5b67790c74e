pub mod code_assist;

pub use code_assist::{AssistBackend, CodeAssistClient};
