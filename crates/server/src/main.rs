use server::config::ServerConfig;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    server::init_tracing();
    let config = ServerConfig::from_env();
    server::run(config).await
}
