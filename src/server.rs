use std::future::Future;

use tokio::{io::AsyncWriteExt, net::TcpListener};
use tracing::{debug, info, warn};

use crate::session::StatsSnapshot;

/// Block after the batch completes, serving the frozen stats snapshot on the
/// configured address until `shutdown` resolves.
///
/// This is the only intentional indefinite wait in the program; tests drive
/// it with a synthetic shutdown future instead of a signal.
pub async fn idle_serve<F>(
    bind_address: &str,
    bind_port: u16,
    snapshot: StatsSnapshot,
    silent: bool,
    shutdown: F,
) where
    F: Future<Output = ()>,
{
    let status_task = match TcpListener::bind((bind_address, bind_port)).await {
        Ok(listener) => {
            if !silent {
                info!("Status endpoint available at http://{bind_address}:{bind_port}");
            }
            Some(tokio::spawn(serve_status(listener, snapshot)))
        }
        Err(e) => {
            warn!("Failed to bind status endpoint on {bind_address}:{bind_port}: {e}");
            None
        }
    };

    if !silent {
        info!("Press Ctrl+C to exit");
    }
    shutdown.await;

    if let Some(task) = status_task {
        task.abort();
    }
}

async fn serve_status(listener: TcpListener, snapshot: StatsSnapshot) {
    let body = serde_json::to_string(&snapshot).unwrap_or_else(|_| "{}".to_string());
    let response = format!(
        "HTTP/1.1 200 OK\r\nContent-Type: application/json\r\nContent-Length: {}\r\nConnection: close\r\n\r\n{}",
        body.len(),
        body
    );
    loop {
        match listener.accept().await {
            Ok((mut stream, peer)) => {
                debug!("Status request from {peer}");
                let _ = stream.write_all(response.as_bytes()).await;
                let _ = stream.shutdown().await;
            }
            Err(e) => {
                debug!("Status endpoint accept error: {e}");
            }
        }
    }
}
