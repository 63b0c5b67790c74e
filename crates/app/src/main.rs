mod sessions;
mod simple_md;
mod state;
mod utils;

use anyhow::{Context, Result};
use services::{FileSource, IngestOptions, Ingestor, LocalEntry, LocalFile};
use sessions::{ChatSession, SendOptions};
use shared::settings::AppSettings;
use state::{connect_backend, ThinkingStage};
use std::path::PathBuf;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tracing_subscriber::EnvFilter;

const HELP: &str = "\
Commands:
  /add <path>...     attach files, or every file in a folder
  /drop <path>...    attach dropped files and folders
  /files             list pending attachments
  /remove <n>        remove attachment n
  /clear             remove all attachments
  /key <api-key>     set and save your Gemini API key
  /settings          show current settings
  /export <file>     save the conversation as HTML
  /help              show this help
  /quit              exit
Anything else is sent to the assistant with the pending attachments.";

#[derive(Debug, PartialEq, Eq)]
enum Command {
    Add(Vec<PathBuf>),
    Drop(Vec<PathBuf>),
    Files,
    Remove(usize),
    Clear,
    Key(String),
    Settings,
    Export(PathBuf),
    Help,
    Quit,
    Prompt(String),
    /// A slash command with missing or bad arguments
    Usage(&'static str),
}

impl Command {
    fn parse(line: &str) -> Self {
        let trimmed = line.trim();
        if !trimmed.starts_with('/') {
            return Command::Prompt(line.to_string());
        }
        let (name, args) = trimmed
            .split_once(char::is_whitespace)
            .map(|(n, a)| (n, a.trim()))
            .unwrap_or((trimmed, ""));
        let paths = || -> Vec<PathBuf> { args.split_whitespace().map(PathBuf::from).collect() };

        match name {
            "/add" if !args.is_empty() => Command::Add(paths()),
            "/add" => Command::Usage("/add <path>..."),
            "/drop" if !args.is_empty() => Command::Drop(paths()),
            "/drop" => Command::Usage("/drop <path>..."),
            "/files" => Command::Files,
            "/remove" => match args.parse::<usize>() {
                Ok(n) if n >= 1 => Command::Remove(n),
                _ => Command::Usage("/remove <n>"),
            },
            "/clear" => Command::Clear,
            "/key" if !args.is_empty() => Command::Key(args.to_string()),
            "/key" => Command::Usage("/key <api-key>"),
            "/settings" => Command::Settings,
            "/export" if !args.is_empty() => Command::Export(PathBuf::from(args)),
            "/export" => Command::Usage("/export <file>"),
            "/help" => Command::Help,
            "/quit" | "/exit" => Command::Quit,
            _ => Command::Prompt(line.to_string()),
        }
    }
}

struct Repl {
    settings: AppSettings,
    session: ChatSession,
}

impl Repl {
    fn ingestor(&self) -> Ingestor {
        Ingestor::new(IngestOptions {
            max_in_flight: self.settings.max_in_flight_reads.max(1),
            ..IngestOptions::default()
        })
    }

    async fn attach(&mut self, source: FileSource, announce: bool) {
        match self.ingestor().ingest(vec![source]).await {
            Ok(records) => {
                let count = self.session.add_files(records);
                if announce {
                    self.session.announce_upload(count);
                    if let Some(msg) = self.session.messages.last().filter(|_| count > 0) {
                        println!("{}", simple_md::render_message_terminal(msg));
                    }
                }
                if count == 0 {
                    println!("No supported files were found.");
                } else if !announce {
                    println!("Attached {} file(s).", count);
                }
            }
            Err(e) => {
                tracing::warn!(error = %e, "attachment batch failed");
                println!("Could not attach files: {}", e);
            }
        }
    }

    fn list_files(&self) {
        let files = self.session.pending_files();
        if files.is_empty() {
            println!("No pending attachments.");
            return;
        }
        for (i, f) in files.iter().enumerate() {
            let label = if f.is_code() { "code" } else { "file" };
            println!("  {}. [{}] {} ({})", i + 1, label, f.path, f.size_kb());
        }
    }

    fn show_settings(&self) {
        let key = self
            .settings
            .api_key()
            .map(utils::mask_key)
            .unwrap_or_else(|| "(not set)".to_string());
        println!("API key:         {}", key);
        println!("Backend:         {}", self.settings.backend_url);
        println!("Context chars:   {}", self.settings.context_chars_per_file);
        println!("Thinking stages: {}", self.settings.show_thinking_stages);
        println!("Parallel reads:  {}", self.settings.max_in_flight_reads);
        if let Some(path) = utils::config_path() {
            println!("Settings file:   {}", path.display());
        }
    }

    async fn send(&mut self, input: &str) {
        let backend = connect_backend(&self.settings);
        let options = SendOptions {
            context_chars_per_file: self.settings.context_chars_per_file,
            show_thinking_stages: self.settings.show_thinking_stages,
        };
        let before = self.session.messages.len();
        let mut on_stage = |stage: &ThinkingStage| println!("  ... {}", stage.text);

        self.session
            .send(input, backend.as_ref(), &options, &mut on_stage)
            .await;

        // The user's own message is already on screen.
        for msg in self.session.messages.iter().skip(before + 1) {
            println!("{}\n", simple_md::render_message_terminal(msg));
        }
    }

    /// Run one command. Returns false when the REPL should exit.
    async fn handle(&mut self, command: Command) -> Result<bool> {
        match command {
            Command::Add(paths) => match LocalFile::pick(&paths).await {
                Ok(source) => self.attach(source, false).await,
                Err(e) => println!("Could not open folder: {}", e),
            },
            Command::Drop(paths) => {
                let source = LocalEntry::from_drop(&paths).await;
                self.attach(source, true).await;
            }
            Command::Files => self.list_files(),
            Command::Remove(n) => match self.session.remove_file(n - 1) {
                Some(f) => println!("Removed {}", f.path),
                None => println!("No attachment #{}", n),
            },
            Command::Clear => {
                self.session.clear_files();
                println!("Attachments cleared.");
            }
            Command::Key(key) => {
                utils::set_api_key(&mut self.settings, &key);
                utils::save_settings(&self.settings)?;
                println!("API key saved.");
            }
            Command::Settings => self.show_settings(),
            Command::Export(path) => {
                let html = simple_md::transcript_html(&self.session.messages);
                tokio::fs::write(&path, html)
                    .await
                    .with_context(|| format!("Failed to write {}", path.display()))?;
                println!("Conversation saved to {}", path.display());
            }
            Command::Help => println!("{}", HELP),
            Command::Quit => return Ok(false),
            Command::Usage(usage) => println!("Usage: {}", usage),
            Command::Prompt(input) => self.send(&input).await,
        }
        Ok(true)
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_writer(std::io::stderr)
        .init();

    let (settings, loaded) = utils::load_settings_or_default();
    tracing::info!(loaded, backend = %settings.backend_url, "settings ready");

    let mut repl = Repl {
        settings,
        session: ChatSession::new(),
    };
    tracing::debug!(
        session = %repl.session.id,
        started = %repl.session.created_at,
        "chat session opened"
    );

    println!("Code Assistant. Type /help for commands.");
    if repl.settings.api_key().is_none() {
        println!("No API key yet. Set one with /key <api-key>.");
    }

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    let mut stdout = tokio::io::stdout();
    loop {
        stdout.write_all(b"> ").await?;
        stdout.flush().await?;

        let Some(line) = lines.next_line().await? else {
            break;
        };
        match repl.handle(Command::parse(&line)).await {
            Ok(true) => {}
            Ok(false) => break,
            Err(e) => println!("Error: {:#}", e),
        }
    }
    Ok(())
}
