use futures::FutureExt;
use std::time::Duration;

use super::calendar::{self, Moment};
use super::dns;
use super::hosts;
use crate::domain::{arg_string, HostFunction, HostValue, SandboxBindings};

/// Builds the standard PAC function set. DNS-backed entries are asynchronous
/// and bounded by `dns_timeout`.
pub fn function_library(dns_timeout: Duration) -> SandboxBindings {
    let mut library = SandboxBindings::new();

    library.insert(
        "isPlainHostName".to_string(),
        HostFunction::sync(|args| Ok(hosts::is_plain_host_name(&arg_string(args, 0)).into())),
    );
    library.insert(
        "dnsDomainIs".to_string(),
        HostFunction::sync(|args| Ok(hosts::dns_domain_is(&arg_string(args, 0), &arg_string(args, 1)).into())),
    );
    library.insert(
        "localHostOrDomainIs".to_string(),
        HostFunction::sync(|args| {
            Ok(hosts::local_host_or_domain_is(&arg_string(args, 0), &arg_string(args, 1)).into())
        }),
    );
    library.insert(
        "dnsDomainLevels".to_string(),
        HostFunction::sync(|args| Ok(HostValue::Number(hosts::dns_domain_levels(&arg_string(args, 0)) as f64))),
    );
    library.insert(
        "shExpMatch".to_string(),
        HostFunction::sync(|args| Ok(hosts::sh_exp_match(&arg_string(args, 0), &arg_string(args, 1)).into())),
    );
    library.insert(
        "weekdayRange".to_string(),
        HostFunction::sync(|args| Ok(calendar::weekday_range(args, &Moment::now()).into())),
    );
    library.insert(
        "dateRange".to_string(),
        HostFunction::sync(|args| Ok(calendar::date_range(args, &Moment::now()).into())),
    );
    library.insert(
        "timeRange".to_string(),
        HostFunction::sync(|args| Ok(calendar::time_range(args, &Moment::now()).into())),
    );
    library.insert(
        "alert".to_string(),
        HostFunction::sync(|args| {
            log::info!(target: "pacproxy::alert", "{}", arg_string(args, 0));
            Ok(HostValue::Undefined)
        }),
    );

    library.insert(
        "dnsResolve".to_string(),
        HostFunction::asynchronous(move |args| {
            let host = arg_string(&args, 0);
            async move {
                let addr = dns::resolve_ipv4(&host, dns_timeout).await;
                Ok(addr.map(|a| a.to_string()).into())
            }
            .boxed()
        }),
    );
    library.insert(
        "isResolvable".to_string(),
        HostFunction::asynchronous(move |args| {
            let host = arg_string(&args, 0);
            async move { Ok(dns::resolve_ipv4(&host, dns_timeout).await.is_some().into()) }.boxed()
        }),
    );
    library.insert(
        "isInNet".to_string(),
        HostFunction::asynchronous(move |args| {
            let host = arg_string(&args, 0);
            let pattern = arg_string(&args, 1);
            let mask = arg_string(&args, 2);
            async move {
                let matched = match dns::resolve_ipv4(&host, dns_timeout).await {
                    Some(addr) => hosts::in_net(addr, &pattern, &mask),
                    None => false,
                };
                Ok(matched.into())
            }
            .boxed()
        }),
    );
    library.insert(
        "myIpAddress".to_string(),
        HostFunction::asynchronous(move |_args| {
            async move { Ok(HostValue::String(dns::my_ip_address(dns_timeout).await.to_string())) }.boxed()
        }),
    );

    library
}
