//! Coil discovery
//!
//! Polls a block of bits on a fixed interval and reports every position
//! whose value differs from the previous sample. The first successful sample
//! only establishes the baseline. Read failures are logged and retried; the
//! loop ends when its cancellation token fires or the event receiver is
//! dropped.

use std::time::Duration;

use serde::Serialize;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::transport::{BitTable, Transport};

/// Polling parameters
#[derive(Debug, Clone)]
pub struct DiscoveryConfig {
    pub table: BitTable,
    pub start: u16,
    pub count: u16,
    pub interval: Duration,
    pub retry_delay: Duration,
}

impl Default for DiscoveryConfig {
    fn default() -> Self {
        Self {
            table: BitTable::Coils,
            start: 0,
            count: 256,
            interval: Duration::from_millis(500),
            retry_delay: Duration::from_millis(1000),
        }
    }
}

/// A bit that changed between two consecutive samples
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct ChangeEvent {
    /// Wire address of the bit
    pub position: u16,
    pub value: bool,
}

/// Last observed value per position; `None` until first seen
#[derive(Debug, Clone)]
pub struct DiscoveryState {
    start: u16,
    last: Vec<Option<bool>>,
}

impl DiscoveryState {
    pub fn new(start: u16, count: u16) -> Self {
        Self {
            start,
            last: vec![None; count as usize],
        }
    }

    /// Fold a sample into the state, returning changes in ascending position
    ///
    /// Positions seen for the first time are adopted silently. Positions the
    /// sample does not cover keep their previous value.
    pub fn observe(&mut self, sample: &[bool]) -> Vec<ChangeEvent> {
        let mut events = Vec::new();
        for (idx, (slot, &value)) in self.last.iter_mut().zip(sample).enumerate() {
            if let Some(previous) = *slot {
                if previous != value {
                    events.push(ChangeEvent {
                        position: self.start.wrapping_add(idx as u16),
                        value,
                    });
                }
            }
            *slot = Some(value);
        }
        events
    }

    pub fn get(&self, position: u16) -> Option<bool> {
        let idx = position.checked_sub(self.start)? as usize;
        self.last.get(idx).copied().flatten()
    }

    pub fn has_baseline(&self) -> bool {
        self.last.iter().any(Option::is_some)
    }
}

/// Counters reported when the loop ends
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DiscoveryStats {
    pub cycles: u64,
    pub failures: u64,
    pub events: u64,
}

/// Sleep for `period`; `false` if cancelled first
async fn pause(cancel: &CancellationToken, period: Duration) -> bool {
    tokio::select! {
        _ = cancel.cancelled() => false,
        _ = tokio::time::sleep(period) => true,
    }
}

/// Poll `transport` until `cancel` fires, sending changes to `events`
///
/// Cancellation is honored at cycle boundaries and during sleeps; an
/// in-flight read is allowed to finish. The transport is closed on exit.
pub async fn run(
    config: &DiscoveryConfig,
    transport: &mut dyn Transport,
    events: mpsc::Sender<ChangeEvent>,
    cancel: CancellationToken,
) -> DiscoveryStats {
    let mut state = DiscoveryState::new(config.start, config.count);
    let mut stats = DiscoveryStats::default();

    info!(
        "Discovery: {} {}..+{} every {:?} on {}",
        config.table,
        config.start,
        config.count,
        config.interval,
        transport.endpoint()
    );

    'poll: while !cancel.is_cancelled() {
        if !transport.is_connected() {
            if let Err(e) = transport.connect().await {
                stats.failures += 1;
                warn!("Connect failed: {}, retry in {:?}", e, config.retry_delay);
                if !pause(&cancel, config.retry_delay).await {
                    break;
                }
                continue;
            }
        }

        match transport
            .read_bits(config.table, config.start, config.count)
            .await
        {
            Ok(sample) => {
                stats.cycles += 1;
                if sample.len() < config.count as usize {
                    debug!("Short sample: {} of {} bits", sample.len(), config.count);
                }
                let first = !state.has_baseline();
                for event in state.observe(&sample) {
                    stats.events += 1;
                    if events.send(event).await.is_err() {
                        info!("Event receiver closed, stopping discovery");
                        break 'poll;
                    }
                }
                if first {
                    info!("Discovery baseline: {} bits", sample.len());
                }
            },
            Err(e) => {
                stats.failures += 1;
                warn!("Read failed: {}, retry in {:?}", e, config.retry_delay);
                if !e.leaves_session_clean() {
                    transport.close().await;
                }
                if !pause(&cancel, config.retry_delay).await {
                    break;
                }
                continue;
            },
        }

        if !pause(&cancel, config.interval).await {
            break;
        }
    }

    transport.close().await;
    info!(
        "Discovery stopped: {} cycles, {} failures, {} events",
        stats.cycles, stats.failures, stats.events
    );
    stats
}
