use backend::{app, AppState};
use std::env;

#[tokio::main]
async fn main() {
    tracing_subscriber::fmt::init();

    let games_root = env::var("GAMES_ROOT").unwrap_or_else(|_| "static/games".to_string());
    std::fs::create_dir_all(&games_root).expect("create games root");

    let addr = env::var("BIND_ADDR").unwrap_or_else(|_| "0.0.0.0:8080".to_string());
    let state = AppState::new(games_root);
    tracing::info!("starting server on {addr}");
    axum::serve(
        tokio::net::TcpListener::bind(&addr).await.expect("bind"),
        app(state),
    )
    .await
    .expect("server error");
}
