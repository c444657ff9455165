use std::time::Duration;

use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpStream, UdpSocket};

const EXCHANGE_TIMEOUT: Duration = Duration::from_secs(5);
const MAX_UDP_RESPONSE: usize = 4096;

/// Relay a raw DNS message to `upstream_addr` over the given protocol and
/// return the raw response. The caller restores the transaction id.
pub async fn exchange(protocol: &str, payload: &[u8], upstream_addr: &str) -> anyhow::Result<Vec<u8>> {
    match protocol {
        "tcp" => exchange_tcp(payload, upstream_addr).await,
        _ => exchange_udp(payload, upstream_addr).await,
    }
}

async fn exchange_udp(payload: &[u8], upstream_addr: &str) -> anyhow::Result<Vec<u8>> {
    let socket = UdpSocket::bind("0.0.0.0:0").await?;
    socket.connect(upstream_addr).await?;
    socket.send(payload).await?;

    let mut buf = vec![0u8; MAX_UDP_RESPONSE];
    let n = tokio::time::timeout(EXCHANGE_TIMEOUT, socket.recv(&mut buf)).await??;
    buf.truncate(n);
    Ok(buf)
}

async fn exchange_tcp(payload: &[u8], upstream_addr: &str) -> anyhow::Result<Vec<u8>> {
    let fut = async {
        let mut stream = TcpStream::connect(upstream_addr).await?;

        let len = u16::try_from(payload.len())?;
        stream.write_all(&len.to_be_bytes()).await?;
        stream.write_all(payload).await?;

        let mut len_buf = [0u8; 2];
        stream.read_exact(&mut len_buf).await?;
        let resp_len = u16::from_be_bytes(len_buf) as usize;

        let mut resp = vec![0u8; resp_len];
        stream.read_exact(&mut resp).await?;
        Ok::<_, anyhow::Error>(resp)
    };
    tokio::time::timeout(EXCHANGE_TIMEOUT, fut).await?
}
