//! Background threads of the bridge
//!
//! Both loops may block: the output worker on the handoff condvar and the
//! outbound channel, the input worker on the inbound channel and the
//! schedule lock. Each checks the shutdown flag after every unit of work.

use std::sync::Arc;
use std::time::Duration;

use rtrb::Consumer;
use tracing::{debug, error, info, warn};

use crate::bridge::{ScheduleError, SharedState};
use crate::event::Event;
use crate::shared::{BridgeStats, WorkerToken};
use crate::transport::{InboundChannel, OutboundChannel};
use crate::wire;

/// Drain captured events onto the outbound channel until shutdown
pub(crate) fn output_worker<O: OutboundChannel>(
    shared: Arc<SharedState>,
    mut consumer: Consumer<Event>,
    mut outbound: O,
    wait: Duration,
    token: WorkerToken,
) {
    debug!("Output worker running");
    let mut forwarded = 0u64;

    loop {
        shared.signal.wait(&token, wait);

        while let Ok(event) = consumer.pop() {
            let record = wire::encode(&event);
            if let Err(e) = outbound.send(&record) {
                error!("Outbound channel failed: {}", e);
                shared.shutdown.trigger();
                return;
            }
            forwarded += 1;
            BridgeStats::bump(&shared.stats.forwarded);
            debug!("Forwarded {:?}", event);
        }

        if shared.shutdown.is_set() {
            break;
        }
    }

    info!("Output worker stopped after forwarding {} events", forwarded);
}

/// Receive scheduled events and park them in the heap until shutdown
///
/// In pass-through mode nothing drains the heap, so records are decoded,
/// counted and dropped.
pub(crate) fn input_worker<I: InboundChannel>(
    shared: Arc<SharedState>,
    mut inbound: I,
    poll: Duration,
    pass_through: bool,
    token: WorkerToken,
) {
    debug!("Input worker running (pass_through={})", pass_through);
    let mut received = 0u64;

    while !shared.shutdown.is_set() {
        let record = match inbound.recv(poll) {
            Ok(Some(record)) => record,
            Ok(None) => continue,
            Err(e) => {
                error!("Inbound channel failed, shutting down: {}", e);
                shared.shutdown.trigger();
                shared.signal.notify(&token);
                break;
            }
        };

        let event = match wire::decode(&record) {
            Ok(event) => event,
            Err(e) => {
                BridgeStats::bump(&shared.stats.malformed);
                warn!("Dropping malformed record: {}", e);
                continue;
            }
        };
        received += 1;
        BridgeStats::bump(&shared.stats.received);
        if pass_through {
            debug!("Pass-through, not scheduling {:?}", event);
            continue;
        }

        // Guard is released before logging
        let result = shared.schedule.lock(&token).insert(event);
        match result {
            Ok(()) => debug!("Scheduled {:?}", event),
            Err(ScheduleError::PoolExhausted) => {
                BridgeStats::bump(&shared.stats.pool_exhausted);
                warn!("Dropping event at {}: block pool exhausted", event.time());
            }
            Err(e @ ScheduleError::HeapFull(_)) => {
                BridgeStats::bump(&shared.stats.heap_full);
                warn!("Dropping event at {}: {}", event.time(), e);
            }
        }
    }

    info!("Input worker stopped after receiving {} events", received);
}
