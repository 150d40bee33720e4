//! The pending-call table: matches replies to the calls that produced them.
//!
//! Every call registers a one-shot completion slot under its sequence
//! number before its request is sent. The reader task looks the sequence
//! of each reply up in the same table, removes the entry, and fulfils the
//! slot. Nothing here depends on arrival order: the sequence number is the
//! only key.
//!
//! ```text
//! caller ─ register() ─→ [seq → slot] ←─ complete(reply) ─ reader
//!                             ↑
//!                 abandon_all() on teardown
//! ```
//!
//! The table lives behind a `std` mutex. Inserts (callers) and removals
//! (reader, timeouts, teardown) come from different tasks, and no lock is
//! ever held across an `.await`.

use std::collections::HashMap;
use std::collections::hash_map::Entry;
use std::sync::{Mutex, MutexGuard};
use std::time::Instant;

use sidewire_protocol::{Operation, Reply, SequenceAllocator};
use tokio::sync::oneshot;

use crate::SidewireError;

/// What a waiting caller eventually receives.
pub(crate) type CallResult = Result<Reply, SidewireError>;

/// One outstanding call.
struct PendingCall {
    /// Distinguishes this call from a later one that reuses the sequence.
    generation: u64,
    operation: Operation,
    created_at: Instant,
    slot: oneshot::Sender<CallResult>,
}

#[derive(Default)]
struct PendingTable {
    calls: HashMap<u32, PendingCall>,
    next_generation: u64,
    /// Set by `abandon_all`; no call may register afterwards.
    closed: bool,
}

/// A registered call, held by the caller while it waits.
#[derive(Debug, Clone, Copy)]
pub(crate) struct Ticket {
    pub(crate) sequence: u32,
    pub(crate) generation: u64,
}

/// Allocates sequence numbers and tracks pending calls.
pub(crate) struct Correlator {
    allocator: SequenceAllocator,
    table: Mutex<PendingTable>,
}

impl Correlator {
    pub(crate) fn new(max_sequence: u32) -> Self {
        Self {
            allocator: SequenceAllocator::new(max_sequence),
            table: Mutex::new(PendingTable::default()),
        }
    }

    /// Allocates a free sequence and registers a pending call under it.
    ///
    /// # Errors
    /// - [`SidewireError::ConnectionClosed`] once the table was abandoned.
    /// - [`SidewireError::TooManyInFlight`] if every sequence is pending.
    pub(crate) fn register(
        &self,
        operation: &Operation,
    ) -> Result<(Ticket, oneshot::Receiver<CallResult>), SidewireError> {
        let mut table = self.lock();
        if table.closed {
            return Err(SidewireError::ConnectionClosed);
        }

        let sequence = self.free_sequence(&table)?;
        let generation = table.next_generation;
        table.next_generation += 1;

        let (tx, rx) = oneshot::channel();
        table.calls.insert(
            sequence,
            PendingCall {
                generation,
                operation: operation.clone(),
                created_at: Instant::now(),
                slot: tx,
            },
        );

        Ok((
            Ticket {
                sequence,
                generation,
            },
            rx,
        ))
    }

    /// Allocates a sequence for a request that expects no reply.
    ///
    /// Nothing is registered, but a sequence a pending call still holds is
    /// never handed out, so a stray reply can't be confused with it.
    pub(crate) fn allocate_untracked(&self) -> Result<u32, SidewireError> {
        let table = self.lock();
        if table.closed {
            return Err(SidewireError::ConnectionClosed);
        }
        self.free_sequence(&table)
    }

    /// Fulfils the call registered under `reply.sequence`.
    ///
    /// Returns `false` if no call is waiting for that sequence (it timed
    /// out, was dropped, or the service sent a bogus number).
    pub(crate) fn complete(&self, reply: Reply) -> bool {
        let Some(call) = self.lock().calls.remove(&reply.sequence) else {
            return false;
        };

        tracing::trace!(
            seq = reply.sequence,
            operation = %call.operation,
            elapsed_ms = call.created_at.elapsed().as_millis() as u64,
            "reply matched"
        );

        let result = if reply.fault {
            Err(SidewireError::ServiceFault {
                operation: call.operation.to_string(),
                detail: reply.data,
            })
        } else {
            Ok(reply)
        };
        // The caller may have stopped waiting; that's fine.
        let _ = call.slot.send(result);
        true
    }

    /// Removes a call without completing it (timeout, send failure, or the
    /// caller went away). A no-op if the sequence now belongs to a newer
    /// call.
    pub(crate) fn cancel(&self, ticket: &Ticket) -> bool {
        let mut table = self.lock();
        match table.calls.entry(ticket.sequence) {
            Entry::Occupied(entry) if entry.get().generation == ticket.generation => {
                entry.remove();
                true
            }
            _ => false,
        }
    }

    /// Fails every pending call with `ConnectionClosed` and refuses new
    /// registrations. Returns how many calls were abandoned.
    pub(crate) fn abandon_all(&self) -> usize {
        let drained: Vec<PendingCall> = {
            let mut table = self.lock();
            table.closed = true;
            table.calls.drain().map(|(_, call)| call).collect()
        };
        let count = drained.len();
        for call in drained {
            let _ = call.slot.send(Err(SidewireError::ConnectionClosed));
        }
        count
    }

    /// Number of calls currently waiting for a reply.
    pub(crate) fn pending_len(&self) -> usize {
        self.lock().calls.len()
    }

    pub(crate) fn max_sequence(&self) -> u32 {
        self.allocator.max()
    }

    /// Draws from the allocator until it yields a sequence no pending call
    /// holds. At most `max` draws: after that every number has been seen.
    fn free_sequence(&self, table: &PendingTable) -> Result<u32, SidewireError> {
        let max = self.allocator.max();
        if table.calls.len() >= max as usize {
            return Err(SidewireError::TooManyInFlight(max));
        }
        for _ in 0..max {
            let candidate = self.allocator.next();
            if !table.calls.contains_key(&candidate) {
                return Ok(candidate);
            }
            tracing::debug!(seq = candidate, "sequence still pending, skipping");
        }
        Err(SidewireError::TooManyInFlight(max))
    }

    fn lock(&self) -> MutexGuard<'_, PendingTable> {
        self.table.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}
