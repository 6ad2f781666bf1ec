use std::sync::Arc;

use market_data::service::MarketService;
use tracing::info;

use crate::config::GatewayConfig;
use crate::connection::Connection;
use crate::registry::ConnectionRegistry;

#[derive(Clone)]
pub struct AppState {
    pub service: Arc<MarketService>,
    pub connections: Arc<ConnectionRegistry>,
    pub config: Arc<GatewayConfig>,
}

impl AppState {
    pub fn new(service: Arc<MarketService>, config: GatewayConfig) -> Self {
        Self {
            service,
            connections: Arc::new(ConnectionRegistry::new()),
            config: Arc::new(config),
        }
    }

    /// Drive a connection through `Closing → Closed`.
    ///
    /// Safe to call from any trigger (client close, write error, overflow
    /// disconnect, shutdown); only the first caller does the work. Closes
    /// the outbox before releasing subscriptions, so no new events are
    /// enqueued once teardown begins.
    pub fn teardown_connection(&self, connection: &Connection) {
        if !connection.begin_close() {
            return;
        }

        connection.outbox().close();
        let handles = connection.take_subscriptions();
        let released = handles.len();
        for handle in &handles {
            self.service.unsubscribe(handle);
        }

        self.connections.remove(connection.id());
        connection.mark_closed();
        info!(
            connection = %connection.id(),
            released,
            "connection closed"
        );
    }

    /// Tear down every live connection. Used at process shutdown.
    pub fn close_all_connections(&self) {
        for connection in self.connections.drain() {
            self.teardown_connection(&connection);
        }
    }
}
