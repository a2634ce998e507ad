//! Main entry point.
#[tokio::main]
async fn main() {
    if let Err(err) = repo_mirror::app::run().await {
        eprintln!("application error: {err}");
        std::process::exit(1);
    }
}
