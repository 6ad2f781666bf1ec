//! Upstream feed intake
//!
//! Accepts upstream publisher connections on a dedicated TCP port and
//! ingests one newline-delimited JSON update per line, in arrival order
//! per connection. Malformed lines are counted and dropped; they never
//! reach the store. On shutdown the listener stops accepting and each
//! stream finishes the line it is on (drain, not abort).

use std::net::SocketAddr;
use std::sync::Arc;

use market_data::feed::parse_feed_line;
use market_data::service::MarketService;
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::watch;
use tracing::{debug, info, warn};

pub async fn run_feed_listener(
    addr: SocketAddr,
    service: Arc<MarketService>,
    mut shutdown: watch::Receiver<bool>,
) -> Result<(), std::io::Error> {
    let listener = TcpListener::bind(addr).await?;
    info!(%addr, "feed listener ready");

    loop {
        tokio::select! {
            accepted = listener.accept() => match accepted {
                Ok((stream, peer)) => {
                    info!(%peer, "upstream feed connected");
                    tokio::spawn(ingest_stream(
                        stream,
                        Arc::clone(&service),
                        shutdown.clone(),
                    ));
                }
                Err(err) => {
                    warn!(error = %err, "feed accept failed");
                }
            },
            _ = shutdown.changed() => break,
        }
    }

    info!("feed listener stopped");
    Ok(())
}

async fn ingest_stream(
    stream: TcpStream,
    service: Arc<MarketService>,
    mut shutdown: watch::Receiver<bool>,
) {
    let mut lines = BufReader::new(stream).lines();
    loop {
        tokio::select! {
            line = lines.next_line() => match line {
                Ok(Some(line)) => ingest_line(&service, &line),
                Ok(None) => {
                    debug!("upstream feed disconnected");
                    break;
                }
                Err(err) => {
                    warn!(error = %err, "feed read error");
                    break;
                }
            },
            _ = shutdown.changed() => break,
        }
    }
}

fn ingest_line(service: &MarketService, line: &str) {
    if line.trim().is_empty() {
        return;
    }
    match parse_feed_line(line) {
        // Apply/stale/invalid outcomes are counted inside the service
        Ok(update) => {
            let _ = service.ingest(update);
        }
        Err(err) => {
            service.metrics().record_rejected_invalid();
            warn!(error = %err, "dropping malformed feed line");
        }
    }
}
