use clap::Parser;

#[tokio::main]
async fn main() {
    let cli = carelink::cli::Cli::parse();
    carelink::logging::init(cli.verbose);

    if let Err(err) = carelink::run(cli).await {
        eprintln!("error: {err}");
        std::process::exit(1);
    }
}
