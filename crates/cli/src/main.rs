//! netjar entry point.
//!
//! Fetches every URL given on the command line and writes the bodies to
//! stdout. Logging goes to stderr so the output can be piped.

use anyhow::{Context, Result};
use tokio::io::AsyncWriteExt;
use tracing_subscriber::EnvFilter;

use netjar_client::{Fetcher, ProxyTransport, RequestSpec, Transport};
use netjar_core::{AppConfig, Cache};

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_writer(std::io::stderr)
        .json()
        .init();

    let urls: Vec<String> = std::env::args().skip(1).collect();
    if urls.is_empty() {
        anyhow::bail!("usage: netjar <url>...");
    }

    let config = AppConfig::load().context("loading configuration")?;
    let transport = Transport::new(config.net, Cache::new(&config.cache))?;

    if config.proxy.enabled {
        tracing::info!("fetching {} urls through {}", urls.len(), config.proxy.endpoint);
        let mut proxy = ProxyTransport::new(config.proxy, transport)?;
        let fetched = fetch_all(&mut proxy, &urls).await;
        tracing::info!("{}", proxy.inner_mut().summary().line);
        proxy.close().await.context("closing proxy sessions")?;
        fetched
    } else {
        let mut transport = transport;
        let fetched = fetch_all(&mut transport, &urls).await;
        tracing::info!("{}", transport.summary().line);
        fetched
    }
}

async fn fetch_all(fetcher: &mut dyn Fetcher, urls: &[String]) -> Result<()> {
    let mut stdout = tokio::io::stdout();
    for url in urls {
        let body = fetcher.get_url(&RequestSpec::get(url)).await.with_context(|| format!("fetching {url}"))?;
        stdout.write_all(&body).await?;
    }
    stdout.flush().await?;
    Ok(())
}
