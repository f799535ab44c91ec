use pgprobe::cli;

#[tokio::main]
async fn main() {
    if let Err(err) = cli::start().await {
        eprintln!("Error: {err:#}");
        std::process::exit(1);
    }
}
