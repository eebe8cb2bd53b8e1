//! Interactive terminal front-end: the counterpart of a chat page, driving a
//! [`ChatSession`] from stdin and rendering progress and replies on stdout.

use futures::StreamExt;
use log::{ error, warn };
use std::error::Error;
use std::io::Write;
use tokio::io::{ AsyncBufReadExt, BufReader };
use tokio_stream::wrappers::LinesStream;
use tokio_util::sync::CancellationToken;

use crate::llm::error::ClientError;
use crate::llm::ollama::OllamaClient;
use crate::models::chat::format_history;
use crate::models::ollama::{ catalog_availability, resolve_model, ModelInfo, PullProgress };
use crate::session::{ ChatSession, SessionError };

const HELP: &str = "\
Commands:
  /models       list installed models (also retries the connection)
  /load NAME    pull and load a model
  /clear        forget the conversation so far
  /history      print the conversation so far
  /help         show this help
  /quit         exit
Anything else is sent to the loaded model. Ctrl-C cancels a running pull or reply.";

#[derive(Debug, PartialEq, Eq)]
pub enum Input {
    Chat(String),
    Models,
    Load(String),
    Clear,
    History,
    Help,
    Quit,
    Empty,
    Unknown(String),
}

pub fn parse_input(line: &str) -> Input {
    let line = line.trim();
    if line.is_empty() {
        return Input::Empty;
    }
    if !line.starts_with('/') {
        return Input::Chat(line.to_string());
    }
    let (command, rest) = match line.split_once(char::is_whitespace) {
        Some((command, rest)) => (command, rest.trim()),
        None => (line, ""),
    };
    match command {
        "/models" => Input::Models,
        "/load" if !rest.is_empty() => Input::Load(rest.to_string()),
        "/clear" => Input::Clear,
        "/history" => Input::History,
        "/help" => Input::Help,
        "/quit" | "/exit" => Input::Quit,
        _ => Input::Unknown(line.to_string()),
    }
}

/// The part of a cumulative reply not yet printed.
///
/// Replies only grow by appending, so `printed` always lands on a char boundary.
pub fn unseen_suffix(cumulative: &str, printed: usize) -> &str {
    cumulative.get(printed..).unwrap_or("")
}

pub fn format_progress(progress: &PullProgress) -> String {
    match (progress.completed, progress.total) {
        (Some(completed), Some(total)) if total > 0 => {
            format!("{} {}%", progress.status, completed.saturating_mul(100) / total)
        }
        _ => progress.status.clone(),
    }
}

/// A fresh token that fires on the next Ctrl-C. Abort the handle once the
/// guarded operation is over.
pub fn cancel_on_ctrl_c() -> (CancellationToken, tokio::task::JoinHandle<()>) {
    let token = CancellationToken::new();
    let trigger = token.clone();
    let handle = tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            trigger.cancel();
        }
    });
    (token, handle)
}

/// Prints cumulative replies incrementally.
#[derive(Debug, Default)]
pub struct ReplyPrinter {
    printed: usize,
}

impl ReplyPrinter {
    pub fn render(&mut self, cumulative: &str) {
        let suffix = unseen_suffix(cumulative, self.printed);
        print!("{}", suffix);
        let _ = std::io::stdout().flush();
        self.printed = cumulative.len();
    }
}

pub async fn print_pull(client: &OllamaClient, name: &str) -> Result<(), ClientError> {
    let (cancel, ctrl_c) = cancel_on_ctrl_c();
    let result = async {
        let events = client.pull_stream(name, cancel).await?;
        let mut events = std::pin::pin!(events);
        while let Some(event) = events.next().await {
            println!("{}", format_progress(&event?));
        }
        Ok::<(), ClientError>(())
    }.await;
    ctrl_c.abort();
    result
}

async fn connect(client: &OllamaClient, catalog: &[String]) -> Option<Vec<ModelInfo>> {
    println!("Checking Ollama connection...");
    match client.list_models().await {
        Ok(models) => {
            println!("Connected! Found {} models", models.len());
            for entry in catalog_availability(catalog, &models) {
                if entry.is_available() {
                    println!("  [available] {} ({})", entry.display_name, entry.pull_name());
                } else {
                    println!("  [not installed] {}", entry.display_name);
                }
            }
            Some(models)
        }
        Err(e) => {
            error!("Connection error: {}", e);
            println!(
                "Failed to connect. Make sure Ollama is running on {}. Type /models to retry.",
                client.base_url()
            );
            None
        }
    }
}

async fn load(session: &mut ChatSession, client: &OllamaClient, installed: &[ModelInfo], name: &str) {
    let name = resolve_model(installed, name).map(|m| m.name.clone()).unwrap_or_else(|| name.to_string());
    let (cancel, ctrl_c) = cancel_on_ctrl_c();
    let result = session.load_model(client, &name, &cancel, |status| {
        print!("\r\x1b[2K{}", status);
        let _ = std::io::stdout().flush();
    }).await;
    ctrl_c.abort();
    println!();
    match result {
        Ok(()) => println!("Model {} loaded. How can I help you?", name),
        Err(e) => {
            warn!("Error loading model {}: {}", name, e);
            println!("Failed to load model. Make sure Ollama is running on {}", client.base_url());
        }
    }
}

async fn chat(session: &mut ChatSession, client: &OllamaClient, text: &str) {
    if session.current_model().is_none() {
        println!("Load a model first with /load NAME");
        return;
    }
    let (cancel, ctrl_c) = cancel_on_ctrl_c();
    let mut printer = ReplyPrinter::default();
    print!("Assistant: ");
    let _ = std::io::stdout().flush();
    let result = session.send(client, text, &cancel, |reply| printer.render(reply)).await;
    ctrl_c.abort();
    println!();
    match result {
        Ok(_) => {}
        Err(SessionError::NoModelLoaded) => println!("Load a model first with /load NAME"),
        Err(SessionError::EmptyMessage) => {}
        Err(e) => println!("Error: {}. Make sure Ollama is running.", e),
    }
}

pub async fn run_interactive(
    client: &OllamaClient,
    catalog: &[String]
) -> Result<(), Box<dyn Error + Send + Sync>> {
    let mut session = ChatSession::new();
    let mut installed = connect(client, catalog).await.unwrap_or_default();
    println!("{}", HELP);

    let mut lines = LinesStream::new(BufReader::new(tokio::io::stdin()).lines());
    loop {
        print!("> ");
        std::io::stdout().flush()?;
        let Some(line) = lines.next().await else {
            break;
        };
        match parse_input(&line?) {
            Input::Empty => {}
            Input::Chat(text) => chat(&mut session, client, &text).await,
            Input::Models => {
                if let Some(models) = connect(client, catalog).await {
                    for model in &models {
                        println!("  {}", model.name);
                    }
                    installed = models;
                }
            }
            Input::Load(name) => load(&mut session, client, &installed, &name).await,
            Input::Clear => {
                session.clear();
                println!("Conversation cleared.");
            }
            Input::History => print!("{}", format_history(session.history())),
            Input::Help => println!("{}", HELP),
            Input::Quit => break,
            Input::Unknown(command) => println!("Unknown command: {} (try /help)", command),
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn plain_text_is_a_chat_message() {
        assert_eq!(parse_input("  hello there \n"), Input::Chat("hello there".into()));
        assert_eq!(parse_input("   "), Input::Empty);
    }

    #[test]
    fn slash_commands_parse() {
        assert_eq!(parse_input("/models"), Input::Models);
        assert_eq!(parse_input("/load  llama3:8b "), Input::Load("llama3:8b".into()));
        assert_eq!(parse_input("/quit"), Input::Quit);
        assert_eq!(parse_input("/exit"), Input::Quit);
        assert_eq!(parse_input("/load"), Input::Unknown("/load".into()));
        assert_eq!(parse_input("/dance now"), Input::Unknown("/dance now".into()));
    }

    #[test]
    fn unseen_suffix_tracks_printed_prefix() {
        assert_eq!(unseen_suffix("Hel", 0), "Hel");
        assert_eq!(unseen_suffix("Hello", 3), "lo");
        assert_eq!(unseen_suffix("Hello", 5), "");
        assert_eq!(unseen_suffix("h\u{e9}", 3), "");
    }

    #[test]
    fn progress_shows_percentage_when_sizes_known() {
        let mut progress = PullProgress {
            status: "pulling 8eeb52dfb3bb".into(),
            digest: Some("sha256:8eeb52dfb3bb".into()),
            total: Some(200),
            completed: Some(50),
        };
        assert_eq!(format_progress(&progress), "pulling 8eeb52dfb3bb 25%");
        progress.total = None;
        assert_eq!(format_progress(&progress), "pulling 8eeb52dfb3bb");
    }
}
