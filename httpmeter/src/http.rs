use axum::Router;
use tower_http::trace::TraceLayer;
use tracing::info;

use crate::shutdown::StopFlag;

pub async fn setup_http_server(
    app: Router,
    bind_address: &str,
    stop_flag: StopFlag,
) -> anyhow::Result<tokio::task::JoinHandle<anyhow::Result<()>>> {
    let app = app.layer(TraceLayer::new_for_http());

    let listener = tokio::net::TcpListener::bind(bind_address).await?;
    info!("HTTP server listening at {}", listener.local_addr()?);

    let handle = tokio::spawn(async move {
        axum::serve(listener, app)
            .with_graceful_shutdown(async move {
                stop_flag.wait().await;
                info!("Stop flag was set, shutting down HTTP server gracefully");
            })
            .await?;
        info!("HTTP server is down");
        Ok(())
    });

    Ok(handle)
}
