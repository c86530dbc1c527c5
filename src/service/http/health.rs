#[tracing::instrument(name = "http::health")]
pub async fn health() -> &'static str {
    "ok"
}
