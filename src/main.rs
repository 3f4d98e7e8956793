use charisma_lib::utils::ErrorResponse;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    charisma_lib::run().await.map_err(|e| {
        let response = ErrorResponse::from(e);
        tracing::error!("{}: {}", response.code, response.message);
        anyhow::anyhow!("[{}] {}", response.code, response.message)
    })
}
