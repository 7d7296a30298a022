use regex::Regex;
use std::net::Ipv4Addr;

pub fn is_plain_host_name(host: &str) -> bool {
    !host.contains('.')
}

pub fn dns_domain_is(host: &str, domain: &str) -> bool {
    host.ends_with(domain)
}

/// Exact match, or an unqualified `host` matching the first label of `hostdom`.
pub fn local_host_or_domain_is(host: &str, hostdom: &str) -> bool {
    if host == hostdom {
        return true;
    }
    match hostdom.split_once('.') {
        Some((first, _)) => !host.contains('.') && host == first,
        None => false,
    }
}

pub fn dns_domain_levels(host: &str) -> usize {
    host.matches('.').count()
}

/// Shell expression match: `*` is any run, `?` one character, `.` literal.
/// Other characters keep their regex meaning, so `(a|b)` alternations work.
pub fn sh_exp_match(text: &str, shexp: &str) -> bool {
    let pattern = shexp.replace('.', "\\.").replace('?', ".").replace('*', ".*");
    match Regex::new(&format!("^{}$", pattern)) {
        Ok(re) => re.is_match(text),
        Err(e) => {
            log::debug!("Invalid shell expression {:?}: {}", shexp, e);
            false
        }
    }
}

/// `(addr & mask) == (pattern & mask)`; false when pattern or mask is not an
/// IPv4 dotted quad.
pub fn in_net(addr: Ipv4Addr, pattern: &str, mask: &str) -> bool {
    let (Ok(pattern), Ok(mask)) = (pattern.trim().parse::<Ipv4Addr>(), mask.trim().parse::<Ipv4Addr>()) else {
        return false;
    };
    let mask = u32::from(mask);
    u32::from(addr) & mask == u32::from(pattern) & mask
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_is_plain_host_name() {
        assert!(is_plain_host_name("www"));
        assert!(!is_plain_host_name("www.netscape.com"));
    }

    #[test]
    fn test_dns_domain_is() {
        assert!(dns_domain_is("www.netscape.com", ".netscape.com"));
        assert!(!dns_domain_is("www", ".netscape.com"));
        assert!(!dns_domain_is("www.mcom.com", ".netscape.com"));
    }

    #[test]
    fn test_local_host_or_domain_is() {
        assert!(local_host_or_domain_is("www.netscape.com", "www.netscape.com"));
        assert!(local_host_or_domain_is("www", "www.netscape.com"));
        assert!(!local_host_or_domain_is("www.mcom.com", "www.netscape.com"));
        assert!(!local_host_or_domain_is("home.netscape.com", "www.netscape.com"));
    }

    #[test]
    fn test_dns_domain_levels() {
        assert_eq!(dns_domain_levels("www"), 0);
        assert_eq!(dns_domain_levels("www.netscape"), 1);
        assert_eq!(dns_domain_levels("www.netscape.com"), 2);
    }

    #[test]
    fn test_sh_exp_match() {
        assert!(sh_exp_match("http://home.netscape.com/people/ari/index.html", "*/ari/*"));
        assert!(!sh_exp_match("http://home.netscape.com/people/montulli/index.html", "*/ari/*"));
        assert!(sh_exp_match("abc", "a?c"));
        assert!(!sh_exp_match("abc.com", "?.com"));
        assert!(sh_exp_match("foo.abcdomain.com", "(*.abcdomain.com|abcdomain.com)"));
        assert!(!sh_exp_match("abcdomainXcom", "abcdomain.com"));
        assert!(!sh_exp_match("anything", "(unclosed"));
    }

    #[test]
    fn test_in_net() {
        let addr: Ipv4Addr = "198.95.249.79".parse().unwrap();
        assert!(in_net(addr, "198.95.249.79", "255.255.255.255"));
        assert!(in_net(addr, "198.95.0.0", "255.255.0.0"));
        assert!(!in_net("198.94.1.1".parse().unwrap(), "198.95.0.0", "255.255.0.0"));
        assert!(!in_net(addr, "not-an-ip", "255.255.0.0"));
    }
}
