#[tokio::main]
async fn main() -> anyhow::Result<()> {
  parlor::run().await
}
