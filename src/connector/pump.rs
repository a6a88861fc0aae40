//! The bidirectional byte pump: two independent copiers, each preserving
//! strict in-order delivery within its own direction. No ordering is
//! guaranteed between the two directions.

use std::sync::Arc;

use tokio::io::{self, AsyncRead, AsyncWrite};
use tokio::sync::mpsc;

use crate::metrics::MetricsSink;

pub enum PumpResult {
    ClientClosed,
    ServerClosed,
    Error(io::Error),
}

/// Copies bytes in both directions until either side reaches EOF, either
/// side errors, or `cancelled` fires. Returns once the first direction
/// finishes; the spec gives no ordering guarantee between directions so we
/// do not wait for the loser to also finish.
pub async fn pump<CR, CW, SR, SW>(
    client_read: CR,
    mut client_write: CW,
    server_read: SR,
    mut server_write: SW,
    server_address: &str,
    metrics: &Arc<dyn MetricsSink>,
    cancelled: tokio_util::sync::CancellationToken,
) -> PumpResult
where
    CR: AsyncRead + Unpin + Send + 'static,
    CW: AsyncWrite + Unpin + Send + 'static,
    SR: AsyncRead + Unpin + Send + 'static,
    SW: AsyncWrite + Unpin + Send + 'static,
{
    let (done_tx, mut done_rx) = mpsc::channel::<PumpResult>(2);

    let up_metrics = metrics.clone();
    let up_server = server_address.to_string();
    let up_tx = done_tx.clone();
    let up_cancel = cancelled.clone();
    tokio::spawn(async move {
        let mut client_read = client_read;
        let result = tokio::select! {
            r = io::copy(&mut client_read, &mut server_write) => r,
            _ = up_cancel.cancelled() => return,
        };
        match result {
            Ok(bytes) => {
                up_metrics.add_bytes("client_to_server", &up_server, bytes);
                let _ = up_tx.send(PumpResult::ClientClosed).await;
            }
            Err(e) => {
                let _ = up_tx.send(PumpResult::Error(e)).await;
            }
        }
    });

    let down_metrics = metrics.clone();
    let down_server = server_address.to_string();
    let down_tx = done_tx;
    let down_cancel = cancelled.clone();
    tokio::spawn(async move {
        let mut server_read = server_read;
        let result = tokio::select! {
            r = io::copy(&mut server_read, &mut client_write) => r,
            _ = down_cancel.cancelled() => return,
        };
        match result {
            Ok(bytes) => {
                down_metrics.add_bytes("server_to_client", &down_server, bytes);
                let _ = down_tx.send(PumpResult::ServerClosed).await;
            }
            Err(e) => {
                let _ = down_tx.send(PumpResult::Error(e)).await;
            }
        }
    });

    tokio::select! {
        Some(result) = done_rx.recv() => result,
        _ = cancelled.cancelled() => PumpResult::ClientClosed,
    }
}
