#[tokio::main]
async fn main() -> anyhow::Result<()> {
    #[cfg(feature = "seed")]
    {
        if let Ok(source) = std::env::var("SEED_SOURCE") {
            let mut backends = process::connect().await?;
            process::load_stores(&mut backends, &source).await?;
        }
    }

    server::start_server().await
}
