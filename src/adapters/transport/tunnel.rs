use base64::Engine;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};

use crate::domain::{ProxyError, ProxyTarget, Result};

const MAX_RESPONSE_HEAD: usize = 8192;

/// `Proxy-Authorization` value for credentials embedded in a proxy target.
pub fn basic_auth(proxy: &ProxyTarget) -> Option<String> {
    proxy.credentials.as_ref().map(|(user, pass)| {
        let token = base64::engine::general_purpose::STANDARD.encode(format!("{}:{}", user, pass));
        format!("Basic {}", token)
    })
}

/// Issues `CONNECT authority` on `io` and waits for a 2xx answer. On success
/// the stream is a raw pipe to `authority`.
pub async fn tunnel<T>(io: &mut T, authority: &str, headers: &[(String, String)]) -> Result<()>
where
    T: AsyncRead + AsyncWrite + Unpin,
{
    let mut request = format!("CONNECT {authority} HTTP/1.1\r\nHost: {authority}\r\n");
    for (name, value) in headers {
        request.push_str(&format!("{}: {}\r\n", name, value));
    }
    request.push_str("\r\n");
    io.write_all(request.as_bytes()).await?;

    // Read byte by byte so nothing past the response head is consumed.
    let mut head = Vec::with_capacity(256);
    let mut byte = [0u8; 1];
    while !head.ends_with(b"\r\n\r\n") {
        if head.len() == MAX_RESPONSE_HEAD {
            return Err(ProxyError::Io("proxy headers too long for tunnel".to_string()));
        }
        if io.read(&mut byte).await? == 0 {
            return Err(ProxyError::Io("unexpected eof while tunneling".to_string()));
        }
        head.push(byte[0]);
    }

    let status_line = head.split(|b| *b == b'\n').next().unwrap_or_default();
    let status_line = String::from_utf8_lossy(status_line);
    let status = status_line
        .split_whitespace()
        .nth(1)
        .and_then(|code| code.parse::<u16>().ok());

    match status {
        Some(code) if (200..300).contains(&code) => Ok(()),
        Some(407) => Err(ProxyError::Io("proxy authentication required".to_string())),
        _ => Err(ProxyError::Io(format!("unsuccessful tunnel: {}", status_line.trim_end()))),
    }
}
