use std::sync::Arc;

use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream, UdpSocket};
use tokio::sync::watch;

use crate::AppState;

use super::handler;

const MAX_UDP_QUERY: usize = 4096;

/// Run the UDP and TCP capture listeners on the configured address until
/// the shutdown signal fires. One task per datagram / connection.
pub async fn run(state: Arc<AppState>, shutdown: watch::Receiver<bool>) -> anyhow::Result<()> {
    let addr = normalize_listen_addr(&state.runtime.config().dns_listen_addr);

    let udp = Arc::new(UdpSocket::bind(&addr).await?);
    let tcp = TcpListener::bind(&addr).await?;
    tracing::info!(
        addr = %addr,
        upstream = %state.runtime.current_upstream(),
        "dns capture server listening (udp+tcp)"
    );

    let udp_task = tokio::spawn(udp_loop(state.clone(), udp, shutdown.clone()));
    let tcp_task = tokio::spawn(tcp_loop(state, tcp, shutdown));

    let _ = udp_task.await;
    let _ = tcp_task.await;
    tracing::info!("dns capture server stopped");
    Ok(())
}

async fn udp_loop(state: Arc<AppState>, socket: Arc<UdpSocket>, mut shutdown: watch::Receiver<bool>) {
    let mut buf = vec![0u8; MAX_UDP_QUERY];
    loop {
        tokio::select! {
            _ = shutdown.changed() => break,
            received = socket.recv_from(&mut buf) => {
                let (n, peer) = match received {
                    Ok(pair) => pair,
                    Err(e) => {
                        tracing::warn!(error = %e, "udp recv failed");
                        continue;
                    }
                };
                let query = buf[..n].to_vec();
                let state = state.clone();
                let socket = socket.clone();
                tokio::spawn(async move {
                    let client_ip = peer.ip().to_string();
                    if let Some(response) =
                        handler::handle_query(&state, &query, &client_ip, "udp").await
                    {
                        if let Err(e) = socket.send_to(&response, peer).await {
                            tracing::warn!(error = %e, peer = %peer, "udp send failed");
                        }
                    }
                });
            }
        }
    }
}

async fn tcp_loop(state: Arc<AppState>, listener: TcpListener, mut shutdown: watch::Receiver<bool>) {
    loop {
        tokio::select! {
            _ = shutdown.changed() => break,
            accepted = listener.accept() => {
                let (stream, peer) = match accepted {
                    Ok(pair) => pair,
                    Err(e) => {
                        tracing::warn!(error = %e, "tcp accept failed");
                        continue;
                    }
                };
                let state = state.clone();
                tokio::spawn(async move {
                    let client_ip = peer.ip().to_string();
                    if let Err(e) = serve_tcp_conn(state, stream, &client_ip).await {
                        tracing::debug!(error = %e, peer = %peer, "tcp conn closed");
                    }
                });
            }
        }
    }
}

/// DNS-over-TCP framing: two-byte big-endian length prefix per message.
/// Serves queries sequentially until the peer closes.
async fn serve_tcp_conn(
    state: Arc<AppState>,
    mut stream: TcpStream,
    client_ip: &str,
) -> anyhow::Result<()> {
    loop {
        let mut len_buf = [0u8; 2];
        if stream.read_exact(&mut len_buf).await.is_err() {
            return Ok(());
        }
        let len = u16::from_be_bytes(len_buf) as usize;
        let mut query = vec![0u8; len];
        stream.read_exact(&mut query).await?;

        if let Some(response) = handler::handle_query(&state, &query, client_ip, "tcp").await {
            let resp_len = u16::try_from(response.len())?;
            stream.write_all(&resp_len.to_be_bytes()).await?;
            stream.write_all(&response).await?;
        }
    }
}

/// `":15353"` means every interface; anything with a host passes through.
pub fn normalize_listen_addr(addr: &str) -> String {
    if let Some(port) = addr.strip_prefix(':') {
        format!("0.0.0.0:{port}")
    } else {
        addr.to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn listen_addr_normalization() {
        assert_eq!(normalize_listen_addr(":15353"), "0.0.0.0:15353");
        assert_eq!(normalize_listen_addr("127.0.0.1:53"), "127.0.0.1:53");
    }
}
