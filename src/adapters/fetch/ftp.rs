//! Just enough FTP to download one file: login, `MDTM`, `PASV`, `RETR`.

use std::net::{Ipv4Addr, SocketAddr};
use std::time::Duration;
use tokio::io::{AsyncBufReadExt, AsyncReadExt, AsyncWriteExt, BufReader};
use tokio::net::tcp::{OwnedReadHalf, OwnedWriteHalf};
use tokio::net::TcpStream;
use percent_encoding::percent_decode_str;
use tokio::time::timeout;
use url::{Host, Url};

use crate::domain::models::TokenState;
use crate::domain::{CacheToken, FetchedSource, ProxyError, Result};

const DEFAULT_PORT: u16 = 21;
const IO_TIMEOUT: Duration = Duration::from_secs(30);

#[derive(Debug)]
struct Reply {
    code: u16,
    text: String,
}

struct Control {
    reader: BufReader<OwnedReadHalf>,
    writer: OwnedWriteHalf,
}

impl Control {
    async fn connect(host: &str, port: u16) -> Result<Self> {
        let stream = timeout(IO_TIMEOUT, TcpStream::connect((host, port)))
            .await
            .map_err(|_| ProxyError::Timeout)??;
        let (read, writer) = stream.into_split();
        let mut control = Self {
            reader: BufReader::new(read),
            writer,
        };
        control.expect(&[220]).await?;
        Ok(control)
    }

    async fn read_reply(&mut self) -> Result<Reply> {
        let mut line = String::new();
        let mut text = String::new();
        let mut code: Option<u16> = None;
        loop {
            line.clear();
            let n = timeout(IO_TIMEOUT, self.reader.read_line(&mut line))
                .await
                .map_err(|_| ProxyError::Timeout)??;
            if n == 0 {
                return Err(ProxyError::Fetch("FTP server closed the control connection".to_string()));
            }
            let trimmed = line.trim_end();
            text.push_str(trimmed);
            text.push('\n');

            let prefix = trimmed.get(..3).and_then(|c| c.parse::<u16>().ok());
            let last = trimmed.as_bytes().get(3) != Some(&b'-');
            match (code, prefix) {
                (None, Some(c)) if last => return Ok(Reply { code: c, text }),
                (None, Some(c)) => code = Some(c),
                (Some(c), Some(p)) if p == c && last => return Ok(Reply { code: c, text }),
                (None, None) => {
                    return Err(ProxyError::Fetch(format!("Malformed FTP reply: {}", trimmed)));
                }
                _ => {}
            }
        }
    }

    async fn command(&mut self, command: &str) -> Result<Reply> {
        log::debug!("FTP > {}", command.split(' ').next().unwrap_or(command));
        self.writer.write_all(format!("{}\r\n", command).as_bytes()).await?;
        self.read_reply().await
    }

    async fn expect(&mut self, codes: &[u16]) -> Result<Reply> {
        let reply = self.read_reply().await?;
        check(reply, codes)
    }
}

fn check(reply: Reply, codes: &[u16]) -> Result<Reply> {
    if codes.contains(&reply.code) {
        Ok(reply)
    } else {
        Err(ProxyError::Fetch(format!("Unexpected FTP reply: {}", reply.text.trim_end())))
    }
}

/// Data address from a `227 Entering Passive Mode (h1,h2,h3,h4,p1,p2)` reply.
fn passive_address(text: &str) -> Option<SocketAddr> {
    let start = text.find('(')?;
    let end = text[start..].find(')')? + start;
    let numbers = text[start + 1..end]
        .split(',')
        .map(|n| n.trim().parse::<u8>().ok())
        .collect::<Option<Vec<_>>>()?;
    match numbers.as_slice() {
        [a, b, c, d, p1, p2] => Some(SocketAddr::from((
            Ipv4Addr::new(*a, *b, *c, *d),
            u16::from(*p1) << 8 | u16::from(*p2),
        ))),
        _ => None,
    }
}

fn percent_decoded(value: &str) -> String {
    percent_decode_str(value).decode_utf8_lossy().into_owned()
}

/// Host to dial for the control connection; IPv6 literals lose their brackets.
fn control_host(uri: &Url) -> String {
    match uri.host() {
        Some(Host::Ipv6(addr)) => addr.to_string(),
        Some(host) => host.to_string(),
        None => "localhost".to_string(),
    }
}

/// Reads an `ftp:` URI. Logs in anonymously unless the URI carries
/// credentials; skips the download while `MDTM` reports the same time.
pub async fn fetch_ftp(uri: &Url, cache: Option<&CacheToken>) -> Result<FetchedSource> {
    let path = percent_decoded(uri.path());
    if path.is_empty() || path == "/" {
        return Err(ProxyError::InvalidInput(format!("No path in FTP URI \"{}\"", uri)));
    }
    let host = control_host(uri);
    let port = uri.port().unwrap_or(DEFAULT_PORT);
    let user = match uri.username() {
        "" => "anonymous".to_string(),
        name => percent_decoded(name),
    };
    let password = uri
        .password()
        .map(percent_decoded)
        .unwrap_or_else(|| "anonymous@".to_string());

    let mut control = Control::connect(&host, port).await?;
    let reply = control.command(&format!("USER {}", user)).await?;
    if reply.code == 331 {
        check(control.command(&format!("PASS {}", password)).await?, &[230, 202])?;
    } else {
        check(reply, &[230])?;
    }
    check(control.command("TYPE I").await?, &[200])?;

    let reply = control.command(&format!("MDTM {}", path)).await?;
    let modified = match reply.code {
        213 => Some(reply.text.get(4..).unwrap_or_default().trim().to_string()),
        550 => return Err(ProxyError::NotFound(uri.to_string())),
        _ => {
            log::debug!("MDTM unsupported by {}: {}", host, reply.text.trim_end());
            None
        }
    };

    if let (Some(modified), Some(CacheToken(TokenState::Ftp { href, modified: previous }))) = (&modified, cache) {
        if href.as_str() == uri.as_str() && previous == modified {
            log::debug!("{} unchanged since {}", uri, modified);
            let _ = control.command("QUIT").await;
            return Err(ProxyError::NotModified);
        }
    }

    let reply = check(control.command("PASV").await?, &[227])?;
    let data_addr = passive_address(&reply.text)
        .ok_or_else(|| ProxyError::Fetch(format!("Malformed PASV reply: {}", reply.text.trim_end())))?;
    let mut data = timeout(IO_TIMEOUT, TcpStream::connect(data_addr))
        .await
        .map_err(|_| ProxyError::Timeout)??;

    let reply = control.command(&format!("RETR {}", path)).await?;
    match reply.code {
        125 | 150 => {}
        550 => return Err(ProxyError::NotFound(uri.to_string())),
        _ => return Err(ProxyError::Fetch(format!("Unexpected FTP reply: {}", reply.text.trim_end()))),
    }

    let mut bytes = Vec::new();
    timeout(IO_TIMEOUT, data.read_to_end(&mut bytes))
        .await
        .map_err(|_| ProxyError::Timeout)??;
    drop(data);
    control.expect(&[226, 250]).await?;
    let _ = control.command("QUIT").await;

    // Without MDTM every fetch downloads again.
    let token = CacheToken(TokenState::Ftp {
        href: uri.to_string(),
        modified: modified.unwrap_or_default(),
    });
    Ok(FetchedSource { bytes, token })
}
