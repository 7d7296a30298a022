use http_body_util::{combinators::BoxBody, BodyExt, Empty, Full};
use hyper::body::{Bytes, Incoming};
use hyper::header::{HeaderName, HeaderValue, HOST};
use hyper::{Method, Request, Response, StatusCode, Uri};
use hyper_util::rt::TokioIo;
use std::sync::Arc;
use tracing::error;
use url::Url;

use crate::domain::{ConnectRequest, ProxyDispatcher, ProxyError, Result, StreamMode};

type Body = BoxBody<Bytes, hyper::Error>;

/// Headers meaningful only between the client and this proxy.
const HOP_BY_HOP: &[&str] = &["proxy-connection", "proxy-authorization", "keep-alive"];

/// Local proxy front-end: `CONNECT` is tunneled through the dispatch chain
/// and absolute-form requests are sent over a dispatched connection.
pub struct HyperProxyAdapter {
    dispatcher: Arc<ProxyDispatcher>,
}

impl HyperProxyAdapter {
    pub fn new(dispatcher: Arc<ProxyDispatcher>) -> Self {
        Self { dispatcher }
    }

    pub async fn handle(&self, req: Request<Incoming>) -> Response<Body> {
        let result = if req.method() == Method::CONNECT {
            self.handle_connect(req).await
        } else {
            self.handle_http(req).await
        };

        result.unwrap_or_else(|e| {
            error!("Proxy error: {}", e);
            let status = match e {
                ProxyError::InvalidInput(_) => StatusCode::BAD_REQUEST,
                ProxyError::Timeout => StatusCode::GATEWAY_TIMEOUT,
                _ => StatusCode::BAD_GATEWAY,
            };
            text_response(status, e.to_string())
        })
    }

    async fn handle_connect(&self, req: Request<Incoming>) -> Result<Response<Body>> {
        let request = connect_target(req.uri())?;
        let socket = self.dispatcher.connect(&request).await?;
        let authority = request.authority();

        tokio::spawn(async move {
            match hyper::upgrade::on(req).await {
                Ok(upgraded) => {
                    let mut upgraded = TokioIo::new(upgraded);
                    let mut server = socket;
                    if let Err(e) = tokio::io::copy_bidirectional(&mut upgraded, &mut server).await {
                        log::debug!("Tunnel error for {}: {}", authority, e);
                    }
                }
                Err(e) => error!("Failed to upgrade to CONNECT: {}", e),
            }
        });

        Ok(Response::new(empty()))
    }

    async fn handle_http(&self, mut req: Request<Incoming>) -> Result<Response<Body>> {
        let url = absolute_url(&req)?;
        let request = ConnectRequest::from_url(&url)?;
        let socket = self.dispatcher.connect(&request).await?;

        for name in HOP_BY_HOP {
            req.headers_mut().remove(*name);
        }
        if socket.is_forwarding() {
            *req.uri_mut() = parse_uri(url.as_str())?;
            for (name, value) in socket.forwarding_headers() {
                let name = HeaderName::from_bytes(name.as_bytes())
                    .map_err(|e| ProxyError::Config(format!("Invalid proxy header name {}: {}", name, e)))?;
                let value = HeaderValue::from_str(value)
                    .map_err(|e| ProxyError::Config(format!("Invalid proxy header value: {}", e)))?;
                req.headers_mut().insert(name, value);
            }
        } else {
            *req.uri_mut() = parse_uri(&request.path)?;
        }
        if !req.headers().contains_key(HOST) {
            let host = HeaderValue::from_str(&request.authority())
                .map_err(|e| ProxyError::InvalidInput(format!("Invalid host: {}", e)))?;
            req.headers_mut().insert(HOST, host);
        }

        let (mut sender, connection) = hyper::client::conn::http1::Builder::new()
            .preserve_header_case(true)
            .title_case_headers(true)
            .handshake(TokioIo::new(socket))
            .await
            .map_err(|e| ProxyError::Io(format!("HTTP handshake with {} failed: {}", url, e)))?;
        tokio::spawn(async move {
            if let Err(e) = connection.await {
                log::debug!("Upstream connection closed: {}", e);
            }
        });

        let response = sender
            .send_request(req)
            .await
            .map_err(|e| ProxyError::Io(format!("Request to {} failed: {}", url, e)))?;
        Ok(response.map(|body| body.boxed()))
    }
}

fn parse_uri(raw: &str) -> Result<Uri> {
    raw.parse::<Uri>()
        .map_err(|e| ProxyError::InvalidInput(format!("Invalid request URI {}: {}", raw, e)))
}

/// Destination of a `CONNECT host:port` request. The port decides the
/// scheme shown to the PAC script.
fn connect_target(uri: &Uri) -> Result<ConnectRequest> {
    let authority = uri
        .authority()
        .ok_or_else(|| ProxyError::InvalidInput(format!("CONNECT without authority: {}", uri)))?;
    let port = authority
        .port_u16()
        .ok_or_else(|| ProxyError::InvalidInput(format!("CONNECT without port: {}", uri)))?;
    let host = authority.host().trim_start_matches('[').trim_end_matches(']');

    Ok(ConnectRequest::new(host, port, port != 80).with_mode(StreamMode::Tunnel))
}

/// Full URL of a proxied request, from the absolute-form target or the Host header.
fn absolute_url(req: &Request<Incoming>) -> Result<Url> {
    let uri = req.uri();
    if uri.scheme().is_some() {
        return Url::parse(&uri.to_string())
            .map_err(|e| ProxyError::InvalidInput(format!("Invalid request URI {}: {}", uri, e)));
    }

    let host = req
        .headers()
        .get(HOST)
        .ok_or_else(|| ProxyError::InvalidInput("Missing Host header".to_string()))?
        .to_str()
        .map_err(|e| ProxyError::InvalidInput(format!("Invalid host header: {}", e)))?;
    let path = uri.path_and_query().map(|p| p.as_str()).unwrap_or("/");
    let raw = format!("http://{}{}", host, path);
    Url::parse(&raw).map_err(|e| ProxyError::InvalidInput(format!("Invalid host header URL {}: {}", raw, e)))
}

fn empty() -> Body {
    Empty::<Bytes>::new().map_err(|never| match never {}).boxed()
}

fn text_response(status: StatusCode, message: String) -> Response<Body> {
    let mut response = Response::new(Full::new(Bytes::from(message)).map_err(|never| match never {}).boxed());
    *response.status_mut() = status;
    response
}
