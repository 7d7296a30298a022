use clap::{Parser, Subcommand};
use std::path::PathBuf;
use std::sync::Arc;
use tokio::net::TcpListener;
use url::Url;

use pacproxy::adapters::{serve, AttemptTracker, HyperProxyAdapter, NetworkTransport, PacResolverFactory, SchemeFetcher};
use pacproxy::config::AppConfig;
use pacproxy::domain::{normalize_result, parse_directives, PacLoader, ProxyDispatcher, ProxyError, Result};
use pacproxy::telemetry;

#[derive(Parser, Debug)]
#[clap(version = env!("PACPROXY_VERSION"), about = "Proxy auto-config resolver and local proxy")]
pub struct Opts {
    /// Configuration file (defaults to the per-user pacproxy config)
    #[clap(long, short = 'c', global = true)]
    config: Option<PathBuf>,

    /// Enable debug logs, -vv for trace
    #[clap(short = 'v', long, action = clap::ArgAction::Count, global = true)]
    verbose: u8,

    #[clap(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Evaluate a PAC file for one URL
    Resolve {
        /// PAC file URI
        pac: String,
        /// URL to find a proxy for
        url: String,
        /// Host passed to FindProxyForURL instead of the URL hostname
        #[clap(long)]
        host: Option<String>,
    },
    /// Print the PAC file as rewritten for asynchronous evaluation
    Compile {
        /// PAC file URI
        pac: String,
    },
    /// Run a local HTTP proxy that routes every connection through the PAC file
    Serve {
        /// PAC file URI, overrides `pac_url` from the configuration
        #[clap(long)]
        pac: Option<String>,
        /// Listen on this network address
        #[clap(long, short = 'b')]
        bind: Option<String>,
        /// Append DIRECT to every PAC answer
        #[clap(long)]
        fallback_to_direct: bool,
    },
}

fn loader(config: &AppConfig, pac: &str) -> Result<PacLoader> {
    let fetcher = Arc::new(SchemeFetcher::new(config.accept_invalid_certs)?);
    let factory = Arc::new(PacResolverFactory::new(config.resolver_options()));
    PacLoader::new(pac, fetcher, factory, config.source_label.clone())
}

async fn resolve(config: &AppConfig, pac: &str, url: &str, host: Option<&str>) -> Result<()> {
    let url = Url::parse(url).map_err(|e| ProxyError::InvalidInput(format!("Invalid URL {}: {}", url, e)))?;
    let resolver = loader(config, pac)?.resolve().await?;
    let value = resolver.find_proxy(&url, host).await?;

    println!("{}", value);
    for directive in parse_directives(&normalize_result(&value)) {
        println!("  {}", directive);
    }
    Ok(())
}

async fn compile(config: &AppConfig, pac: &str) -> Result<()> {
    let resolver = loader(config, pac)?.resolve().await?;
    println!("{}", resolver.source());
    Ok(())
}

async fn run_server(config: AppConfig) -> Result<()> {
    let pac = config
        .pac_url
        .clone()
        .ok_or_else(|| ProxyError::Config("No PAC file configured, use --pac or pac_url".to_string()))?;

    let transport = Arc::new(NetworkTransport::new(config.transport_options())?);
    let tracker = Arc::new(AttemptTracker::default());
    tracker.start_cleanup();

    let dispatcher = ProxyDispatcher::new(loader(&config, &pac)?, transport, config.dispatch_options())
        .with_observer(tracker);
    // Fail early on an unreachable or broken PAC file.
    dispatcher.loader().resolve().await?;

    let listener = TcpListener::bind(&config.bind).await?;
    serve(listener, Arc::new(HyperProxyAdapter::new(Arc::new(dispatcher)))).await
}

#[tokio::main]
async fn main() {
    let opts = Opts::parse();

    if let Err(e) = telemetry::init(opts.verbose) {
        eprintln!("{}", e);
    }

    let result = match AppConfig::load(opts.config.as_deref()) {
        Ok(mut config) => match opts.command {
            Command::Resolve { pac, url, host } => resolve(&config, &pac, &url, host.as_deref()).await,
            Command::Compile { pac } => compile(&config, &pac).await,
            Command::Serve {
                pac,
                bind,
                fallback_to_direct,
            } => {
                config.pac_url = pac.or(config.pac_url);
                config.bind = bind.unwrap_or(config.bind);
                config.fallback_to_direct |= fallback_to_direct;
                run_server(config).await
            }
        },
        Err(e) => Err(e),
    };

    if let Err(e) = result {
        eprintln!("Error: {}", e);
        std::process::exit(1);
    }
}
