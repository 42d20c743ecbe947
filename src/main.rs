#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tether_cli::run().await
}
