use ccm_services::server;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    server::run_verification_service().await
}
