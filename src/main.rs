use anyhow::Result;
use clap::{Parser, Subcommand};
use tracing::info;

use lead_conversion::ml::TrainingEngine;
use lead_conversion::{client, web, Config};

#[derive(Parser)]
#[command(name = "lead-conversion")]
#[command(about = "Train and serve a random-forest model predicting lead conversion")]
struct Cli {
    #[arg(short, long, default_value = "config.toml")]
    config: String,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Preprocess the raw quotes, train the forest and write the evaluation report
    Train,
    /// Serve the prediction API
    Serve {
        #[arg(long)]
        port: Option<u16>,
    },
    /// Post a sampled lead to a running server
    Client,
}

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize tracing
    tracing_subscriber::fmt::init();

    let cli = Cli::parse();
    let mut config = Config::load_or_default(&cli.config)?;

    match cli.command {
        Command::Train => {
            info!("Starting lead conversion training run");
            let engine = TrainingEngine::new(&config);
            // Training is CPU-bound, keep it off the runtime threads
            let summary = tokio::task::spawn_blocking(move || engine.run()).await??;
            println!("{}", summary.render());
            info!(model = %summary.model_path.display(), "Training finished");
        }
        Command::Serve { port } => {
            // Command-line port wins over the config file
            if let Some(port) = port {
                config.server.port = port;
            }
            web::serve(&config).await?;
        }
        Command::Client => client::run(&config).await?,
    }

    Ok(())
}
