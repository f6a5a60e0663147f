mod cli;

use clap::Parser;

#[tokio::main]
async fn main() {
    let args = cli::GlobalCli::parse();
    if let Err(err) = cli::run(args).await {
        eprintln!("error: {err:#}");
        std::process::exit(1);
    }
}
