use percent_encoding::percent_decode_str;
use std::fmt;

/// `host:port` of a proxy hop, with optional `user:pass@` credentials.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProxyTarget {
    pub host: String,
    pub port: u16,
    pub credentials: Option<(String, String)>,
}

impl ProxyTarget {
    /// Parses `[user:pass@]host[:port]`, using `default_port` when the port is omitted.
    /// Credentials are percent-decoded.
    pub fn parse(raw: &str, default_port: u16) -> Option<Self> {
        let (credentials, authority) = match raw.rsplit_once('@') {
            Some((userinfo, authority)) => {
                let (user, pass) = userinfo.split_once(':').unwrap_or((userinfo, ""));
                (Some((decode_userinfo(user), decode_userinfo(pass))), authority)
            }
            None => (None, raw),
        };

        let (host, port) = if let Some(rest) = authority.strip_prefix('[') {
            // [v6]:port
            let (host, tail) = rest.split_once(']')?;
            let port = match tail.strip_prefix(':') {
                Some(p) => p.parse().ok()?,
                None if tail.is_empty() => default_port,
                None => return None,
            };
            (host, port)
        } else {
            match authority.rsplit_once(':') {
                Some((host, port)) => (host, port.parse().ok()?),
                None => (authority, default_port),
            }
        };

        if host.is_empty() {
            return None;
        }

        Some(Self {
            host: host.to_string(),
            port,
            credentials,
        })
    }

    /// Address suitable for `TcpStream::connect`.
    pub fn address(&self) -> String {
        if self.host.contains(':') {
            format!("[{}]:{}", self.host, self.port)
        } else {
            format!("{}:{}", self.host, self.port)
        }
    }
}

fn decode_userinfo(raw: &str) -> String {
    percent_decode_str(raw).decode_utf8_lossy().into_owned()
}

impl fmt::Display for ProxyTarget {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if let Some((user, _)) = &self.credentials {
            write!(f, "{}@", user)?;
        }
        f.write_str(&self.address())
    }
}

/// One fallback candidate from a PAC result.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ProxyDirective {
    Direct,
    Proxy(ProxyTarget),
    Http(ProxyTarget),
    Https(ProxyTarget),
    Socks(ProxyTarget),
    Socks4(ProxyTarget),
    Socks5(ProxyTarget),
    /// Anything the grammar does not recognise; dispatching it always fails.
    Unknown(String),
}

impl ProxyDirective {
    pub fn parse(segment: &str) -> Self {
        let mut parts = segment.split_whitespace();
        let kind = parts.next().unwrap_or_default();
        let target = parts.next();

        if kind == "DIRECT" {
            return ProxyDirective::Direct;
        }

        let build: fn(ProxyTarget) -> ProxyDirective = match kind {
            "PROXY" => ProxyDirective::Proxy,
            "HTTP" => ProxyDirective::Http,
            "HTTPS" => ProxyDirective::Https,
            "SOCKS" => ProxyDirective::Socks,
            "SOCKS4" => ProxyDirective::Socks4,
            "SOCKS5" => ProxyDirective::Socks5,
            _ => return ProxyDirective::Unknown(segment.to_string()),
        };
        let default_port = match kind {
            "HTTPS" => 443,
            "PROXY" | "HTTP" => 80,
            _ => 1080,
        };

        match target.and_then(|t| ProxyTarget::parse(t, default_port)) {
            Some(target) => build(target),
            None => ProxyDirective::Unknown(segment.to_string()),
        }
    }

    pub fn is_direct(&self) -> bool {
        matches!(self, ProxyDirective::Direct)
    }

    pub fn keyword(&self) -> &str {
        match self {
            ProxyDirective::Direct => "DIRECT",
            ProxyDirective::Proxy(_) => "PROXY",
            ProxyDirective::Http(_) => "HTTP",
            ProxyDirective::Https(_) => "HTTPS",
            ProxyDirective::Socks(_) => "SOCKS",
            ProxyDirective::Socks4(_) => "SOCKS4",
            ProxyDirective::Socks5(_) => "SOCKS5",
            ProxyDirective::Unknown(raw) => raw.as_str(),
        }
    }
}

impl fmt::Display for ProxyDirective {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ProxyDirective::Direct => f.write_str("DIRECT"),
            ProxyDirective::Proxy(t)
            | ProxyDirective::Http(t)
            | ProxyDirective::Https(t)
            | ProxyDirective::Socks(t)
            | ProxyDirective::Socks4(t)
            | ProxyDirective::Socks5(t) => write!(f, "{} {}", self.keyword(), t),
            ProxyDirective::Unknown(raw) => f.write_str(raw),
        }
    }
}

/// Splits a PAC result on `;`, trimming and dropping empty segments.
pub fn parse_directives(result: &str) -> Vec<ProxyDirective> {
    result
        .trim()
        .split(';')
        .map(str::trim)
        .filter(|segment| !segment.is_empty())
        .map(ProxyDirective::parse)
        .collect()
}

/// Appends `DIRECT` when asked to and the script did not already return it.
pub fn with_direct_fallback(mut directives: Vec<ProxyDirective>, fallback_to_direct: bool) -> Vec<ProxyDirective> {
    if fallback_to_direct && !directives.iter().any(ProxyDirective::is_direct) {
        directives.push(ProxyDirective::Direct);
    }
    directives
}

#[cfg(test)]
mod tests {
    use super::*;

    fn target(host: &str, port: u16) -> ProxyTarget {
        ProxyTarget {
            host: host.to_string(),
            port,
            credentials: None,
        }
    }

    #[test]
    fn test_parse_keeps_order_and_drops_empty_segments() {
        let directives = parse_directives("  PROXY a:80;;  SOCKS b:1080 ;DIRECT; ");
        assert_eq!(
            directives,
            vec![
                ProxyDirective::Proxy(target("a", 80)),
                ProxyDirective::Socks(target("b", 1080)),
                ProxyDirective::Direct,
            ]
        );
    }

    #[test]
    fn test_parse_every_kind() {
        let directives = parse_directives("HTTP h:1; HTTPS s:2; SOCKS4 four:3; SOCKS5 five:4");
        assert_eq!(
            directives,
            vec![
                ProxyDirective::Http(target("h", 1)),
                ProxyDirective::Https(target("s", 2)),
                ProxyDirective::Socks4(target("four", 3)),
                ProxyDirective::Socks5(target("five", 4)),
            ]
        );
    }

    #[test]
    fn test_keywords_are_case_sensitive() {
        assert_eq!(
            ProxyDirective::parse("proxy a:80"),
            ProxyDirective::Unknown("proxy a:80".to_string())
        );
        assert_eq!(ProxyDirective::parse("PROXY"), ProxyDirective::Unknown("PROXY".to_string()));
        assert_eq!(
            ProxyDirective::parse("QUIC q:443"),
            ProxyDirective::Unknown("QUIC q:443".to_string())
        );
    }

    #[test]
    fn test_target_defaults_and_credentials() {
        assert_eq!(ProxyDirective::parse("HTTPS secure"), ProxyDirective::Https(target("secure", 443)));
        assert_eq!(ProxyDirective::parse("SOCKS s"), ProxyDirective::Socks(target("s", 1080)));

        let with_auth = ProxyTarget::parse("bob:secret@proxy:3128", 80).unwrap();
        assert_eq!(with_auth.credentials, Some(("bob".to_string(), "secret".to_string())));
        assert_eq!(with_auth.address(), "proxy:3128");

        let encoded = ProxyTarget::parse("user%40corp:p%3Ass@proxy:3128", 80).unwrap();
        assert_eq!(encoded.credentials, Some(("user@corp".to_string(), "p:ss".to_string())));
        assert_eq!(encoded.host, "proxy");

        let v6 = ProxyTarget::parse("[::1]:8080", 80).unwrap();
        assert_eq!(v6.host, "::1");
        assert_eq!(v6.address(), "[::1]:8080");

        assert!(ProxyTarget::parse("host:notaport", 80).is_none());
    }

    #[test]
    fn test_direct_fallback_only_when_missing() {
        let appended = with_direct_fallback(parse_directives("PROXY a:1"), true);
        assert_eq!(appended.last(), Some(&ProxyDirective::Direct));
        assert_eq!(appended.len(), 2);

        let untouched = with_direct_fallback(parse_directives("DIRECT; PROXY a:1"), true);
        assert_eq!(untouched.len(), 2);

        let disabled = with_direct_fallback(parse_directives("PROXY a:1"), false);
        assert_eq!(disabled.len(), 1);
    }

    #[test]
    fn test_display_round_trips_the_candidate() {
        let directive = ProxyDirective::parse("SOCKS bad:1");
        assert_eq!(directive.to_string(), "SOCKS bad:1");
        assert_eq!(ProxyDirective::Direct.to_string(), "DIRECT");
    }
}
