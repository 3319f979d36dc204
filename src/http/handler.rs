//! HTTP connection handler for the Tokio runtime.

use bytes::{Buf, BytesMut};
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};
use tracing::{debug, trace};

use super::parser::{self, ParseResult, Version};
use super::{GET_BODY, POST_BODY};

/// Requests with a longer head are rejected.
const MAX_HEAD_SIZE: usize = 64 * 1024;

const CONTENT_TYPE: (&str, &str) = ("Content-Type", "text/html; charset=utf-8");

/// What to do with the connection after a response.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum After {
    KeepAlive,
    Close,
}

/// Serve requests on one connection until the peer closes or a response
/// ends the connection.
pub async fn handle_connection<S>(mut stream: S) -> Result<(), Box<dyn std::error::Error + Send + Sync>>
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    let mut buffer = BytesMut::with_capacity(4096);

    loop {
        let (head, consumed) = loop {
            match parser::parse(&buffer) {
                ParseResult::Complete(head, consumed) => break (head, consumed),
                ParseResult::Incomplete if buffer.len() > MAX_HEAD_SIZE => {
                    send_error(&mut stream, 431, "Request Header Fields Too Large", "Header too long")
                        .await?;
                    stream.shutdown().await?;
                    return Ok(());
                }
                ParseResult::Incomplete => {
                    if stream.read_buf(&mut buffer).await? == 0 {
                        trace!("Connection closed by client");
                        return Ok(());
                    }
                }
                ParseResult::Error(msg) => {
                    debug!(error = msg, "Bad request");
                    send_error(&mut stream, 400, "Bad Request", msg).await?;
                    stream.shutdown().await?;
                    return Ok(());
                }
            }
        };
        buffer.advance(consumed);

        debug!(
            method = %head.method,
            path = %head.path,
            version = head.version.as_str(),
            "HTTP request"
        );

        let after = match head.method.as_str() {
            "GET" => do_get(&mut stream).await?,
            "HEAD" => do_head(&mut stream).await?,
            "POST" => {
                if !discard_body(&mut stream, &mut buffer, head.content_length).await? {
                    return Ok(());
                }
                do_post(&mut stream).await?
            }
            other => {
                let message = format!("Unsupported method ('{other}')");
                send_error(&mut stream, 501, "Not Implemented", &message).await?;
                After::Close
            }
        };

        if after == After::Close {
            stream.shutdown().await?;
            return Ok(());
        }
    }
}

/// GET always ends the connection; only POST keeps it alive.
async fn do_get<S>(stream: &mut S) -> std::io::Result<After>
where
    S: AsyncWrite + Unpin,
{
    let length = GET_BODY.len().to_string();
    let response = parser::response(
        Version::Http11,
        200,
        "OK",
        &[CONTENT_TYPE, ("Content-Length", &length)],
        GET_BODY,
        &parser::http_date(),
    );
    stream.write_all(&response).await?;
    Ok(After::Close)
}

async fn do_head<S>(stream: &mut S) -> std::io::Result<After>
where
    S: AsyncWrite + Unpin,
{
    let response = parser::response(
        Version::Http10,
        200,
        "OK",
        &[CONTENT_TYPE],
        b"",
        &parser::http_date(),
    );
    stream.write_all(&response).await?;
    Ok(After::Close)
}

async fn do_post<S>(stream: &mut S) -> std::io::Result<After>
where
    S: AsyncWrite + Unpin,
{
    let length = POST_BODY.len().to_string();
    let response = parser::response(
        Version::Http11,
        200,
        "OK",
        &[
            CONTENT_TYPE,
            ("Content-Length", &length),
            ("Connection", "keep-alive"),
        ],
        POST_BODY,
        &parser::http_date(),
    );
    stream.write_all(&response).await?;
    Ok(After::KeepAlive)
}

async fn send_error<S>(stream: &mut S, status: u16, reason: &str, message: &str) -> std::io::Result<()>
where
    S: AsyncWrite + Unpin,
{
    let body = parser::error_page(status, message);
    let length = body.len().to_string();
    let response = parser::response(
        Version::Http10,
        status,
        reason,
        &[
            ("Connection", "close"),
            ("Content-Type", "text/html;charset=utf-8"),
            ("Content-Length", &length),
        ],
        body.as_bytes(),
        &parser::http_date(),
    );
    stream.write_all(&response).await
}

/// Drop `len` body bytes, reading more as needed. Returns false on EOF.
async fn discard_body<S>(stream: &mut S, buffer: &mut BytesMut, len: usize) -> std::io::Result<bool>
where
    S: AsyncRead + Unpin,
{
    let mut remaining = len;
    loop {
        let take = remaining.min(buffer.len());
        buffer.advance(take);
        remaining -= take;
        if remaining == 0 {
            return Ok(true);
        }
        if stream.read_buf(buffer).await? == 0 {
            return Ok(false);
        }
    }
}
