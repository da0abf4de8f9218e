use axum::routing::{get, post};
use axum::{Extension, Json, Router};
use forgeauth::prelude::*;
use serde::Deserialize;
use serde_json::{json, Value};
use tracing_subscriber::EnvFilter;

// ---------------------------------------------------------------------------
// Protected routes
// ---------------------------------------------------------------------------

#[derive(Deserialize)]
struct CreateToken {
    name: String,
    symbol: String,
}

async fn me(Extension(user): Extension<AuthenticatedUser>) -> Json<Value> {
    Json(json!({ "success": true, "address": user.address }))
}

async fn create_token(
    Extension(user): Extension<AuthenticatedUser>,
    Json(request): Json<CreateToken>,
) -> Json<Value> {
    tracing::info!(creator = %user.address, symbol = %request.symbol, "token requested");
    Json(json!({
        "success": true,
        "creator": user.address,
        "name": request.name,
        "symbol": request.symbol.to_uppercase(),
    }))
}

fn routes() -> Router {
    Router::new()
        .route("/api/me", get(me))
        .route("/api/tokens", post(create_token))
}

#[tokio::main]
async fn main() -> Result<(), ForgeAuthError> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let bind = std::env::var("FORGEAUTH_BIND").unwrap_or_else(|_| "0.0.0.0:3001".to_string());
    let app_name =
        std::env::var("FORGEAUTH_APP_NAME").unwrap_or_else(|_| AuthConfig::default().app_name);

    let server = ApiServer::builder()
        .bind(&bind)
        .auth_config(AuthConfig {
            app_name,
            ..Default::default()
        })
        .build(routes())
        .await?;

    server.run().await
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::io::{AsyncReadExt, AsyncWriteExt};

    async fn get_raw(addr: std::net::SocketAddr, path: &str) -> String {
        let mut stream = tokio::net::TcpStream::connect(addr).await.unwrap();
        let request = format!("GET {path} HTTP/1.1\r\nHost: localhost\r\nConnection: close\r\n\r\n");
        stream.write_all(request.as_bytes()).await.unwrap();
        let mut response = String::new();
        stream.read_to_string(&mut response).await.unwrap();
        response
    }

    #[tokio::test]
    async fn test_protected_route_without_credential_is_401() {
        let server = ApiServer::builder()
            .bind("127.0.0.1:0")
            .build(routes())
            .await
            .unwrap();
        let addr = server.local_addr().unwrap();
        tokio::spawn(server.run());

        let response = get_raw(addr, "/api/me").await;

        assert!(response.starts_with("HTTP/1.1 401"), "got: {response}");
        assert!(response.contains("No authorization header"));
    }
}
