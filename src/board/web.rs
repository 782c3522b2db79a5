//! HTTP workers serving the gauge API on port 80

use core::fmt::Write as _;

use defmt::*;
use embassy_net::tcp::{Error as TcpError, TcpSocket};
use embassy_net::Stack;
use embassy_time::{Duration, Timer};

use lidar_gauge::api::http::{self, MAX_REQUEST_SIZE};
use lidar_gauge::api::ApiResponse;

use super::BoardApi;

pub const HTTP_PORT: u16 = 80;
pub const HTTP_WORKERS: usize = 2;

const SOCKET_TIMEOUT: Duration = Duration::from_secs(10);
const ACCEPT_RETRY_DELAY: Duration = Duration::from_millis(200);

#[embassy_executor::task(pool_size = HTTP_WORKERS)]
pub async fn http_worker(stack: Stack<'static>, api: BoardApi, worker_id: usize) -> ! {
    let mut rx_buf = [0u8; 1024];
    let mut tx_buf = [0u8; 1024];

    info!("HTTP worker {} listening on port {}", worker_id, HTTP_PORT);

    loop {
        stack.wait_config_up().await;

        let mut socket = TcpSocket::new(stack, &mut rx_buf, &mut tx_buf);
        socket.set_timeout(Some(SOCKET_TIMEOUT));

        match socket.accept(HTTP_PORT).await {
            Ok(()) => {
                if let Err(e) = handle_connection(&mut socket, &api).await {
                    warn!("HTTP worker {} connection error: {:?}", worker_id, e);
                }
            }
            Err(e) => {
                warn!("HTTP worker {} accept error: {:?}", worker_id, e);
                Timer::after(ACCEPT_RETRY_DELAY).await;
            }
        }

        socket.abort();
    }
}

async fn handle_connection(socket: &mut TcpSocket<'_>, api: &BoardApi) -> Result<(), TcpError> {
    let mut buf = [0u8; MAX_REQUEST_SIZE];
    let mut total = 0usize;

    // read until the head is in, then until the announced body is in
    let wanted = loop {
        let n = socket.read(&mut buf[total..]).await?;
        if n == 0 {
            if total == 0 {
                return Ok(());
            }
            break total;
        }
        total += n;

        match http::parse_head(&buf[..total]) {
            Ok(Some(head)) if total >= head.total_len() => break head.total_len(),
            Ok(Some(_)) | Ok(None) if total < buf.len() => continue,
            _ => break total,
        }
    };

    let response = api.respond(&buf[..wanted]).await;
    write_response(socket, &response).await
}

async fn write_response(socket: &mut TcpSocket<'_>, response: &ApiResponse) -> Result<(), TcpError> {
    let mut head = heapless::String::<256>::new();
    if http::write_head(&mut head, response.status, response.content_type, response.body.len()).is_err() {
        error!("response head does not fit");
        return Ok(());
    }

    write_all(socket, head.as_bytes()).await?;
    write_all(socket, response.body.as_bytes()).await?;
    socket.flush().await
}

async fn write_all(socket: &mut TcpSocket<'_>, mut bytes: &[u8]) -> Result<(), TcpError> {
    while !bytes.is_empty() {
        let n = socket.write(bytes).await?;
        if n == 0 {
            return Err(TcpError::ConnectionReset);
        }
        bytes = &bytes[n..];
    }
    Ok(())
}
