use clap::Parser;

#[tokio::main]
async fn main() {
    let cli = redpostctl::Cli::parse();
    redpostctl::init_tracing();
    match redpostctl::run(cli).await {
        Ok(code) => std::process::exit(code),
        Err(err) => {
            eprintln!("error: {err}");
            std::process::exit(1);
        }
    }
}
