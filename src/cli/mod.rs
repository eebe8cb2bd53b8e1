use clap::{ Parser, Subcommand };

use crate::llm::{ secs_to_timeout, ClientConfig };

#[derive(Parser, Debug, Clone)]
#[command(author, version, about, long_about = None)]
pub struct Args {
    /// Base URL of the Ollama daemon
    #[arg(long, env = "OLLAMA_BASE_URL", default_value = "http://localhost:11434")]
    pub base_url: String,

    /// Seconds to wait for a response or for the next streamed chunk. 0 waits forever.
    #[arg(long, env = "OLLAMA_TIMEOUT_SECS", default_value = "300")]
    pub timeout_secs: u64,

    /// Seconds allowed for establishing the TCP connection. 0 uses the system default.
    #[arg(long, env = "OLLAMA_CONNECT_TIMEOUT_SECS", default_value = "10")]
    pub connect_timeout_secs: u64,

    /// Featured model names shown on connect, matched against installed models
    #[arg(long, env = "OLLAMA_CATALOG", value_delimiter = ',', default_value = "llama3.2,mistral,phi3,gemma2")]
    pub catalog: Vec<String>,

    /// Enable debug logging/output
    #[arg(long, env = "DEBUG", default_value = "false")]
    pub debug: bool,

    #[command(subcommand)]
    pub command: Option<Command>,
}

#[derive(Subcommand, Debug, Clone, PartialEq, Eq)]
pub enum Command {
    /// List the models installed on the daemon
    Models,

    /// Pull (load) a model, printing progress
    Pull {
        /// Model name, e.g. llama3.2 or mistral:7b
        name: String,
    },

    /// Send a single prompt and stream the reply to stdout
    Chat {
        /// Model to use; a display name is resolved against installed models
        #[arg(long, short = 'm')]
        model: String,

        /// The prompt text
        prompt: String,
    },
}

impl Args {
    pub fn client_config(&self) -> ClientConfig {
        ClientConfig {
            base_url: self.base_url.clone(),
            inactivity_timeout: secs_to_timeout(self.timeout_secs),
            connect_timeout: secs_to_timeout(self.connect_timeout_secs),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[test]
    fn defaults_target_local_daemon() {
        let args = Args::try_parse_from(["ollama-chat"]).unwrap();
        assert_eq!(args.base_url, "http://localhost:11434");
        assert_eq!(args.command, None);
        assert_eq!(args.catalog, vec!["llama3.2", "mistral", "phi3", "gemma2"]);
        let config = args.client_config();
        assert_eq!(config.inactivity_timeout, Some(Duration::from_secs(300)));
    }

    #[test]
    fn parses_chat_subcommand() {
        let args = Args::try_parse_from([
            "ollama-chat",
            "--base-url",
            "http://gpu-box:11434",
            "--timeout-secs",
            "0",
            "chat",
            "-m",
            "llama3",
            "why is the sky blue?",
        ])
        .unwrap();
        assert_eq!(
            args.command,
            Some(Command::Chat {
                model: "llama3".into(),
                prompt: "why is the sky blue?".into(),
            })
        );
        assert_eq!(args.client_config().inactivity_timeout, None);
    }

    #[test]
    fn catalog_splits_on_commas() {
        let args = Args::try_parse_from(["ollama-chat", "--catalog", "qwen2,llava", "models"]).unwrap();
        assert_eq!(args.catalog, vec!["qwen2", "llava"]);
        assert_eq!(args.command, Some(Command::Models));
    }
}
