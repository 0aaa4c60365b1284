//! Shared application state.

use std::net::IpAddr;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

use dashmap::DashMap;
use tracing::debug;

use crate::config::ServerConfig;
use crate::core::realtime::{OpenAIRealtimeFactory, SharedRealtimeFactory};
use crate::core::tools::ToolDispatcher;

/// Why a new WebSocket connection was refused.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionLimitError {
    /// The server-wide limit is reached
    GlobalLimitReached,
    /// This client IP already holds its maximum number of connections
    PerIpLimitReached,
}

/// State shared by every request handler.
pub struct AppState {
    /// Server configuration
    pub config: ServerConfig,
    /// Opens the AI leg for each call
    pub realtime_factory: SharedRealtimeFactory,
    /// Tools available to every call
    pub tools: Arc<ToolDispatcher>,
    ws_connections: AtomicUsize,
    ip_connections: DashMap<IpAddr, u32>,
}

impl AppState {
    /// State backed by the OpenAI Realtime API and the built-in tools.
    pub async fn new(config: ServerConfig) -> Arc<Self> {
        let tools = ToolDispatcher::with_default_tools(config.tool_timeout());
        Self::with_components(config, Arc::new(OpenAIRealtimeFactory), tools)
    }

    /// State with an explicit backend factory and tool set.
    pub fn with_components(
        config: ServerConfig,
        realtime_factory: SharedRealtimeFactory,
        tools: ToolDispatcher,
    ) -> Arc<Self> {
        Arc::new(Self {
            config,
            realtime_factory,
            tools: Arc::new(tools),
            ws_connections: AtomicUsize::new(0),
            ip_connections: DashMap::new(),
        })
    }

    /// Reserve a WebSocket slot for `ip`.
    pub fn try_acquire_connection(&self, ip: IpAddr) -> Result<(), ConnectionLimitError> {
        let max_global = self.config.max_websocket_connections;

        // Reserve globally first, undo if the per-IP check fails
        let previous = self.ws_connections.fetch_add(1, Ordering::SeqCst);
        if let Some(max) = max_global
            && previous >= max
        {
            self.ws_connections.fetch_sub(1, Ordering::SeqCst);
            return Err(ConnectionLimitError::GlobalLimitReached);
        }

        let mut entry = self.ip_connections.entry(ip).or_insert(0);
        if *entry >= self.config.max_connections_per_ip {
            drop(entry);
            self.ws_connections.fetch_sub(1, Ordering::SeqCst);
            return Err(ConnectionLimitError::PerIpLimitReached);
        }
        *entry += 1;

        debug!(ip = %ip, per_ip = *entry, total = previous + 1, "Connection acquired");
        Ok(())
    }

    /// Release a slot previously acquired for `ip`.
    pub fn release_connection(&self, ip: IpAddr) {
        let _ = self
            .ws_connections
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1));

        self.ip_connections.remove_if_mut(&ip, |_, count| {
            *count = count.saturating_sub(1);
            *count == 0
        });
    }

    /// Current number of open WebSocket connections.
    pub fn ws_connection_count(&self) -> usize {
        self.ws_connections.load(Ordering::SeqCst)
    }

    /// Current number of open WebSocket connections from `ip`.
    pub fn ip_connection_count(&self, ip: &IpAddr) -> u32 {
        self.ip_connections.get(ip).map(|c| *c).unwrap_or(0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::net::Ipv4Addr;

    fn config(max_global: Option<usize>, per_ip: u32) -> ServerConfig {
        ServerConfig {
            max_websocket_connections: max_global,
            max_connections_per_ip: per_ip,
            ..Default::default()
        }
    }

    #[tokio::test]
    async fn test_connection_tracking_basic() {
        let state = AppState::new(config(Some(10), 3)).await;
        let ip: IpAddr = Ipv4Addr::new(192, 168, 1, 100).into();

        assert_eq!(state.ws_connection_count(), 0);
        assert_eq!(state.ip_connection_count(&ip), 0);

        for n in 1..=3 {
            assert!(state.try_acquire_connection(ip).is_ok());
            assert_eq!(state.ws_connection_count(), n);
            assert_eq!(state.ip_connection_count(&ip), n as u32);
        }

        assert_eq!(
            state.try_acquire_connection(ip),
            Err(ConnectionLimitError::PerIpLimitReached)
        );
        assert_eq!(state.ws_connection_count(), 3);

        state.release_connection(ip);
        assert_eq!(state.ws_connection_count(), 2);
        assert_eq!(state.ip_connection_count(&ip), 2);

        assert!(state.try_acquire_connection(ip).is_ok());
        assert_eq!(state.ws_connection_count(), 3);
    }

    #[tokio::test]
    async fn test_global_connection_limit() {
        let state = AppState::new(config(Some(2), 100)).await;
        let a: IpAddr = Ipv4Addr::new(10, 0, 0, 1).into();
        let b: IpAddr = Ipv4Addr::new(10, 0, 0, 2).into();
        let c: IpAddr = Ipv4Addr::new(10, 0, 0, 3).into();

        assert!(state.try_acquire_connection(a).is_ok());
        assert!(state.try_acquire_connection(b).is_ok());
        assert_eq!(
            state.try_acquire_connection(c),
            Err(ConnectionLimitError::GlobalLimitReached)
        );
        assert_eq!(state.ws_connection_count(), 2);
        assert_eq!(state.ip_connection_count(&c), 0);
    }

    #[tokio::test]
    async fn test_release_removes_idle_ip_and_never_underflows() {
        let state = AppState::new(config(None, 5)).await;
        let ip: IpAddr = Ipv4Addr::new(127, 0, 0, 1).into();

        assert!(state.try_acquire_connection(ip).is_ok());
        state.release_connection(ip);
        state.release_connection(ip);

        assert_eq!(state.ws_connection_count(), 0);
        assert_eq!(state.ip_connection_count(&ip), 0);
    }
}
