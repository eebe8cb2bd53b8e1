pub mod cli;
pub mod llm;
pub mod models;
pub mod repl;
pub mod session;

use cli::{ Args, Command };
use llm::ollama::OllamaClient;
use log::info;
use models::chat::ChatMessage;
use repl::{ cancel_on_ctrl_c, print_pull, run_interactive, ReplyPrinter };
use std::error::Error;

pub async fn run(args: Args) -> Result<(), Box<dyn Error + Send + Sync>> {
    let config = args.client_config();
    info!("--- Client Configuration ---");
    info!("Ollama Base URL: {}", config.base_url);
    info!("Inactivity Timeout: {:?}", config.inactivity_timeout);
    info!("Connect Timeout: {:?}", config.connect_timeout);
    info!("Catalog: {}", args.catalog.join(", "));
    info!("---------------------------");

    let client = OllamaClient::from_config(&config)?;

    match args.command {
        Some(Command::Models) => {
            for model in client.list_models().await? {
                println!("{}", model.name);
            }
        }
        Some(Command::Pull { name }) => {
            print_pull(&client, &name).await?;
        }
        Some(Command::Chat { model, prompt }) => {
            let resolved = client.resolve_model(&model).await?;
            let model = resolved.unwrap_or(model);
            info!("Using model {}", model);
            let history = vec![ChatMessage::user(prompt)];
            let (cancel, ctrl_c) = cancel_on_ctrl_c();
            let mut printer = ReplyPrinter::default();
            let result = client.chat(&model, &history, &cancel, |reply| printer.render(reply)).await;
            ctrl_c.abort();
            println!();
            result?;
        }
        None => run_interactive(&client, &args.catalog).await?,
    }

    Ok(())
}
