/// Entry point for the fimd file integrity monitoring agent.
///
/// Configuration is read from `FIMD_*` environment variables; logging is controlled with
/// `RUST_LOG`.
///
/// # Examples
///
/// ```bash
/// RUST_LOG=info FIMD_LISTEN_ADDR=127.0.0.1:50051 cargo run
/// ```
#[tokio::main]
async fn main() -> std::result::Result<(), Box<dyn std::error::Error>> {
    env_logger::init();
    fimd::run().await
}
