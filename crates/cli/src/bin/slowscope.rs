use anyhow::Result;

#[tokio::main]
async fn main() -> Result<()> {
    slowscope_cli::main_entry().await
}
