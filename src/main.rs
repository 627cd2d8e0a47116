#[tokio::main]
async fn main() -> Result<(), nbrun::cli::CliError> {
    // Diagnostics go to stderr; stdout carries command output only.
    tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .init();

    nbrun::cli::run().await
}
