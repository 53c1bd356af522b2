use clap::Parser;
use offerwatch::cli::{self, Cli, Commands};

#[tokio::main]
async fn main() {
    let _ = dotenvy::dotenv();

    let cli = Cli::parse();
    match cli.command {
        Commands::Run(args) => {
            if let Err(e) = cli::run::execute(args).await {
                eprintln!("Fatal: {e}");
                std::process::exit(1);
            }
        }
        Commands::Check(args) => cli::check::execute(args),
        Commands::Refresh(args) => {
            if let Err(e) = cli::refresh::execute(args).await {
                eprintln!("Fatal: {e}");
                std::process::exit(1);
            }
        }
    }
}
