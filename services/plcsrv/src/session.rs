//! Serialized access to the device session
//!
//! HTTP handlers run concurrently but the PLC gets one transaction at a time.
//! `PlcSession` owns the transport behind an async mutex, connects lazily and
//! drops the session whenever a cycle ends in a state it cannot vouch for.

use tokio::sync::Mutex;
use tracing::{debug, info};

use crate::core::{orchestrator, Snapshot, TagRegistry};
use crate::error::{PlcSrvError, Result};
use crate::transport::Transport;

pub struct PlcSession {
    transport: Mutex<Box<dyn Transport>>,
    keep_alive: bool,
    endpoint: String,
}

impl std::fmt::Debug for PlcSession {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PlcSession")
            .field("endpoint", &self.endpoint)
            .field("keep_alive", &self.keep_alive)
            .finish()
    }
}

impl PlcSession {
    /// Wrap `transport`; with `keep_alive` off every cycle gets a fresh connection
    pub fn new(transport: Box<dyn Transport>, keep_alive: bool) -> Self {
        let endpoint = transport.endpoint();
        Self {
            transport: Mutex::new(transport),
            keep_alive,
            endpoint,
        }
    }

    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }

    async fn ensure_connected(transport: &mut dyn Transport) -> Result<()> {
        if transport.is_connected() {
            return Ok(());
        }
        transport.connect().await.map_err(|e| {
            debug!("Connect failed: {}", e);
            PlcSrvError::Connectivity(e)
        })
    }

    /// Close unless the outcome leaves a reusable session and keep-alive is on
    async fn settle<T>(&self, transport: &mut dyn Transport, outcome: &Result<T>) {
        let reusable = match outcome {
            Ok(_) => true,
            Err(e) => e.session_is_reusable(),
        };
        if !reusable {
            info!("Dropping session to {} after failed cycle", self.endpoint);
            transport.close().await;
        } else if !self.keep_alive {
            transport.close().await;
        }
    }

    /// One complete read cycle over `registry`
    pub async fn snapshot(&self, registry: &TagRegistry) -> Result<Snapshot> {
        let mut guard = self.transport.lock().await;
        let transport: &mut dyn Transport = guard.as_mut();

        if let Err(e) = Self::ensure_connected(transport).await {
            transport.close().await;
            return Err(e);
        }

        let outcome = orchestrator::read_snapshot(registry, transport).await;
        self.settle(transport, &outcome).await;
        outcome
    }

    /// Device liveness; see [`orchestrator::probe`]
    pub async fn probe(&self) -> Result<bool> {
        let mut guard = self.transport.lock().await;
        let transport: &mut dyn Transport = guard.as_mut();

        if let Err(e) = Self::ensure_connected(transport).await {
            transport.close().await;
            return Err(e);
        }

        let outcome = orchestrator::probe(transport).await;
        // a garbled reply reports Ok(false); the transport has already dropped that link
        self.settle(transport, &outcome).await;
        outcome
    }

    /// Drop the session, e.g. on shutdown
    pub async fn close(&self) {
        self.transport.lock().await.close().await;
    }

    pub async fn is_connected(&self) -> bool {
        self.transport.lock().await.is_connected()
    }
}

#[cfg(test)]
#[allow(clippy::disallowed_methods)] // Test code - unwrap is acceptable
mod tests {
    use super::*;
    use crate::core::{AddressSpace, TagDefinition};
    use crate::transport::{MockTransport, TransportError};
    use std::time::Duration;

    fn registry() -> TagRegistry {
        TagRegistry::new(vec![TagDefinition::new(
            "Y6",
            AddressSpace::OutputCoils,
            6,
        )])
        .unwrap()
    }

    #[tokio::test]
    async fn test_connects_lazily_and_keeps_alive() {
        let mock = MockTransport::new();
        let session = PlcSession::new(Box::new(mock.clone()), true);
        assert!(!session.is_connected().await);

        session.snapshot(&registry()).await.unwrap();
        session.snapshot(&registry()).await.unwrap();
        assert!(session.is_connected().await);
        assert_eq!(mock.connect_count(), 1);
    }

    #[tokio::test]
    async fn test_without_keep_alive_closes_each_cycle() {
        let mock = MockTransport::new();
        let session = PlcSession::new(Box::new(mock.clone()), false);

        session.snapshot(&registry()).await.unwrap();
        assert!(!session.is_connected().await);
        session.snapshot(&registry()).await.unwrap();
        assert_eq!(mock.connect_count(), 2);
    }

    #[tokio::test]
    async fn test_timeout_forces_reconnect() {
        let mock = MockTransport::new();
        let session = PlcSession::new(Box::new(mock.clone()), true);

        mock.fail_next(TransportError::Timeout(Duration::from_secs(3)));
        let err = session.snapshot(&registry()).await.unwrap_err();
        assert!(matches!(err, PlcSrvError::Connectivity(_)));
        assert!(!session.is_connected().await);

        session.snapshot(&registry()).await.unwrap();
        assert_eq!(mock.connect_count(), 2);
    }

    #[tokio::test]
    async fn test_refused_connect_is_connectivity() {
        let mock = MockTransport::new();
        mock.set_refuse_connect(true);
        let session = PlcSession::new(Box::new(mock.clone()), true);

        assert!(matches!(
            session.probe().await,
            Err(PlcSrvError::Connectivity(_))
        ));
        assert!(mock.reads().is_empty());
    }
}
