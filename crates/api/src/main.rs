#[tokio::main]
async fn main() {
    masthead_observability::init();

    let config = masthead_api::config::AppConfig::from_env();
    let bind_addr = config.bind_addr.clone();

    let state = masthead_api::app::AppState::in_memory(config);
    let app = masthead_api::app::build_app(state);

    let listener = tokio::net::TcpListener::bind(&bind_addr)
        .await
        .unwrap_or_else(|err| panic!("failed to bind {bind_addr}: {err}"));

    tracing::info!("listening on {}", listener.local_addr().unwrap());

    axum::serve(listener, app).await.unwrap();
}
