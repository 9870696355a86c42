use clap::{Parser, Subcommand};
use std::process;

#[derive(Parser)]
#[command(name = "ragkit")]
#[command(version)]
#[command(about = "Markdown splitting and language model plumbing for RAG pipelines", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Split a markdown file into header-annotated fragments
    Split {
        file: String,
        /// Comma-separated marker=label pairs
        #[arg(long, default_value = "#=h1,##=h2,###=h3")]
        headers: String,
        /// Keep header lines in fragment content
        #[arg(long)]
        keep_headers: bool,
        #[arg(long)]
        json: bool,
    },
    /// Generate a completion from a loaded model
    Generate {
        prompt: String,
        #[arg(short, long)]
        model: String,
        /// Ollama endpoint, defaults to OLLAMA_HOST
        #[arg(long)]
        base_url: Option<String>,
        /// Run the model in-process from the Hugging Face hub instead of Ollama
        #[arg(long)]
        hf: bool,
        #[arg(long)]
        stream: bool,
        #[arg(long)]
        temperature: Option<f32>,
        #[arg(long)]
        max_tokens: Option<usize>,
    },
}

#[tokio::main]
async fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    let cli = Cli::parse();

    let result = match cli.command {
        Commands::Split {
            file,
            headers,
            keep_headers,
            json,
        } => ragkit::cmd::split(&file, &headers, keep_headers, json).await,
        Commands::Generate {
            prompt,
            model,
            base_url,
            hf,
            stream,
            temperature,
            max_tokens,
        } => {
            ragkit::cmd::generate(&prompt, &model, base_url, hf, stream, temperature, max_tokens)
                .await
        }
    };

    if let Err(e) = result {
        eprintln!("Error: {}", e);
        process::exit(1);
    }
}
