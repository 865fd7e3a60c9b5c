#[tokio::main]
async fn main() -> anyhow::Result<()> {
    streambox::run().await
}
