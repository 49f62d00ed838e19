use clap::Parser;

#[tokio::main]
async fn main() {
    let cli = tracehop::cli::Cli::parse();
    if let Err(e) = tracehop::cmd::dispatch(cli).await {
        eprintln!("Error: {e}");
        std::process::exit(1);
    }
}
