mod admin;
mod availability;
mod conflict;
mod error;
mod locks;
mod queries;
mod reservations;
mod store;

pub use conflict::now_ms;
pub use error::{EngineError, ErrorKind};
pub use store::{
    FloorStore, InMemoryStore, ReservationStore, SlotStore, Store, VehicleTypeStore,
};

use std::io;
use std::path::PathBuf;
use std::sync::{Mutex as StdMutex, PoisonError};

use tokio::sync::{mpsc, oneshot, Mutex, RwLock};
use tracing::{error, info, warn};
use ulid::{Generator, Ulid};

use crate::config::EngineConfig;
use crate::model::*;
use crate::observability::{WAL_COMPACTIONS_TOTAL, WAL_FLUSH_BATCH_SIZE, WAL_FLUSH_DURATION_SECONDS};
use crate::wal::Wal;

use locks::LockTable;

// ── Group-commit WAL channel ─────────────────────────────

pub(super) enum WalCommand {
    Append {
        event: Event,
        response: oneshot::Sender<io::Result<()>>,
    },
    Compact {
        events: Vec<Event>,
        response: oneshot::Sender<io::Result<()>>,
    },
    AppendsSinceCompact {
        response: oneshot::Sender<u64>,
    },
}

type Pending = (Event, oneshot::Sender<io::Result<()>>);

/// Background task that owns the WAL and batches appends for group commit.
/// Blocks for the first append, drains whatever else is already queued,
/// then fsyncs once for the whole batch.
async fn wal_writer_loop(mut wal: Wal, mut rx: mpsc::Receiver<WalCommand>) {
    while let Some(cmd) = rx.recv().await {
        let (event, response) = match cmd {
            WalCommand::Append { event, response } => (event, response),
            other => {
                handle_non_append(&mut wal, other);
                continue;
            }
        };
        let mut batch = vec![(event, response)];
        let mut deferred = None;
        loop {
            match rx.try_recv() {
                Ok(WalCommand::Append { event, response }) => batch.push((event, response)),
                Ok(other) => {
                    deferred = Some(other);
                    break;
                }
                Err(_) => break,
            }
        }

        commit_batch(&mut wal, &mut batch);
        if let Some(cmd) = deferred {
            handle_non_append(&mut wal, cmd);
        }
    }
}

fn commit_batch(wal: &mut Wal, batch: &mut Vec<Pending>) {
    metrics::histogram!(WAL_FLUSH_BATCH_SIZE).record(batch.len() as f64);
    let flush_start = std::time::Instant::now();
    let result = flush_batch(wal, batch);
    metrics::histogram!(WAL_FLUSH_DURATION_SECONDS).record(flush_start.elapsed().as_secs_f64());
    if let Err(e) = &result {
        error!("WAL flush of {} events failed: {e}", batch.len());
        // Every caller in the batch sees an error, so none of it may replay.
        if let Err(e) = wal.rollback() {
            error!("WAL rollback failed, refusing further appends: {e}");
        }
    }
    respond_batch(batch, &result);
}

fn flush_batch(wal: &mut Wal, batch: &[Pending]) -> io::Result<()> {
    for (event, _) in batch {
        wal.append_buffered(event)?;
    }
    wal.flush_sync()
}

fn respond_batch(batch: &mut Vec<Pending>, result: &io::Result<()>) {
    for (_, tx) in batch.drain(..) {
        let r = match result {
            Ok(()) => Ok(()),
            Err(e) => Err(io::Error::new(e.kind(), e.to_string())),
        };
        let _ = tx.send(r);
    }
}

fn handle_non_append(wal: &mut Wal, cmd: WalCommand) {
    match cmd {
        WalCommand::Compact { events, response } => {
            let result = Wal::write_compact_file(wal.path(), &events)
                .and_then(|()| wal.swap_compact_file());
            let _ = response.send(result);
        }
        WalCommand::AppendsSinceCompact { response } => {
            let _ = response.send(wal.appends_since_compact());
        }
        WalCommand::Append { event, response } => {
            let mut batch = vec![(event, response)];
            commit_batch(wal, &mut batch);
        }
    }
}

// ── Event application ────────────────────────────────────

/// Apply one event to the store. Used for live mutations after the WAL
/// append and for replay on open, so both paths agree on the result.
pub(crate) fn apply_event<S: Store>(store: &S, event: &Event) {
    match event {
        Event::FloorCreated(floor) => store.save_floor(floor.clone()),
        Event::FloorDeleted { id } => {
            for slot in store.slots_by_floor(id) {
                store.delete_slot(&slot.id);
            }
            store.delete_floor(id);
        }
        Event::VehicleTypeCreated(vt) => store.save_vehicle_type(vt.clone()),
        Event::SlotCreated(slot) => store.save_slot(slot.clone()),
        Event::SlotAvailabilityChanged { id, is_available } => {
            if let Some(mut slot) = store.slot(id) {
                slot.is_available = *is_available;
                store.save_slot(slot);
            }
        }
        Event::SlotDeleted { id } => {
            store.delete_slot(id);
        }
        Event::ReservationCreated(r) => store.save_reservation(r.clone()),
        Event::ReservationCancelled { id, .. } => {
            if let Some(mut r) = store.get_any(id) {
                r.status = ReservationStatus::Cancelled;
                store.save_reservation(r);
            }
        }
    }
}

/// Why a logged reservation can't be applied on top of what replay has
/// rebuilt so far, if it can't. Active reservations must land on an
/// existing slot without overlapping another active hold on that slot or
/// vehicle.
fn replay_rejection<S: Store>(store: &S, event: &Event) -> Option<String> {
    let Event::ReservationCreated(r) = event else {
        return None;
    };
    if r.status != ReservationStatus::Active {
        return None;
    }
    if store.slot(&r.slot_id).is_none() {
        return Some(format!("slot {} does not exist", r.slot_id));
    }
    if let Some(id) = conflict::slot_blocker(store, &r.slot_id, &r.span) {
        return Some(format!("overlaps reservation {id} on slot {}", r.slot_id));
    }
    conflict::vehicle_blocker(store, &r.vehicle_number, &r.span)
        .map(|id| format!("overlaps reservation {id} for vehicle {}", r.vehicle_number))
}

/// Minimal event stream that rebuilds the store's current contents.
/// Parents come before children so replay never sees a dangling reference.
fn snapshot_events<S: Store>(store: &S) -> Vec<Event> {
    let mut events = Vec::new();
    events.extend(store.floors().into_iter().map(Event::FloorCreated));
    events.extend(store.vehicle_types().into_iter().map(Event::VehicleTypeCreated));
    events.extend(store.slots().into_iter().map(Event::SlotCreated));
    events.extend(store.list_all().into_iter().map(Event::ReservationCreated));
    events
}

// ── Engine ───────────────────────────────────────────────

/// The reservation engine: validation, conflict detection, pricing and
/// persistence over a [`Store`].
///
/// Every mutation is appended to the WAL and acknowledged by the writer
/// task before it touches the store, so an `Ok` return means the change
/// survives a crash.
pub struct Engine<S: Store = InMemoryStore> {
    store: S,
    wal_tx: mpsc::Sender<WalCommand>,
    /// Held across conflict checks and the WAL append of create/cancel.
    slot_locks: LockTable<Ulid>,
    /// Always taken before any slot lock.
    vehicle_locks: LockTable<String>,
    /// Serializes catalogue changes (floors, vehicle types, slot creation and
    /// deletion) so uniqueness checks hold until the write lands.
    admin_lock: Mutex<()>,
    /// Mutations hold it shared from WAL append through store apply;
    /// compaction takes it exclusively so its snapshot matches the log.
    commit_gate: RwLock<()>,
    ids: StdMutex<Generator>,
}

impl Engine<InMemoryStore> {
    /// Replay `wal_path` into a fresh in-memory store.
    pub fn new(wal_path: PathBuf) -> io::Result<Self> {
        Self::with_store(InMemoryStore::new(), wal_path)
    }

    /// Create `data_dir` if needed and open the WAL inside it.
    pub fn open(config: &EngineConfig) -> io::Result<Self> {
        std::fs::create_dir_all(&config.data_dir)?;
        Self::new(config.wal_path())
    }
}

impl<S: Store> Engine<S> {
    /// Replay `wal_path` into `store` and start the WAL writer task.
    /// Must be called inside a tokio runtime.
    pub fn with_store(store: S, wal_path: PathBuf) -> io::Result<Self> {
        let (wal, events) = Wal::recover(&wal_path)?;
        let mut skipped = 0usize;
        for event in &events {
            if let Some(reason) = replay_rejection(&store, event) {
                warn!("skipping {event:?} on replay: {reason}");
                skipped += 1;
                continue;
            }
            apply_event(&store, event);
        }
        info!(
            "replayed {} events from {} ({} slots, {} active reservations, {skipped} skipped)",
            events.len(),
            wal_path.display(),
            store.slot_count(),
            store.list_active().len()
        );

        let (wal_tx, wal_rx) = mpsc::channel(4096);
        tokio::spawn(wal_writer_loop(wal, wal_rx));

        Ok(Self {
            store,
            wal_tx,
            slot_locks: LockTable::new(),
            vehicle_locks: LockTable::new(),
            admin_lock: Mutex::new(()),
            commit_gate: RwLock::new(()),
            ids: StdMutex::new(Generator::new()),
        })
    }

    /// Read-only access to the backing store.
    pub fn store(&self) -> &S {
        &self.store
    }

    /// Monotonic within this process, so ids sort in creation order.
    pub(super) fn next_id(&self) -> Ulid {
        let mut ids = self.ids.lock().unwrap_or_else(PoisonError::into_inner);
        ids.generate().unwrap_or_else(|_| Ulid::new())
    }

    /// Write event to WAL via the background group-commit writer.
    async fn wal_append(&self, event: &Event) -> Result<(), EngineError> {
        let (tx, rx) = oneshot::channel();
        self.wal_tx
            .send(WalCommand::Append {
                event: event.clone(),
                response: tx,
            })
            .await
            .map_err(|_| EngineError::WalError("WAL writer shut down".into()))?;
        rx.await
            .map_err(|_| EngineError::WalError("WAL writer dropped response".into()))?
            .map_err(|e| EngineError::WalError(e.to_string()))
    }

    /// Durable append, then apply. Nothing reaches the store if the append fails.
    pub(super) async fn persist_and_apply(&self, event: &Event) -> Result<(), EngineError> {
        let _gate = self.commit_gate.read().await;
        if let Err(e) = self.wal_append(event).await {
            error!("persisting {event:?} failed: {e}");
            return Err(e);
        }
        apply_event(&self.store, event);
        Ok(())
    }

    /// Rewrite the WAL as the minimal event stream for the current state.
    pub async fn compact_wal(&self) -> Result<(), EngineError> {
        let _gate = self.commit_gate.write().await;
        let events = snapshot_events(&self.store);
        let count = events.len();

        let (tx, rx) = oneshot::channel();
        self.wal_tx
            .send(WalCommand::Compact { events, response: tx })
            .await
            .map_err(|_| EngineError::WalError("WAL writer shut down".into()))?;
        rx.await
            .map_err(|_| EngineError::WalError("WAL writer dropped response".into()))?
            .map_err(|e| {
                error!("WAL compaction failed: {e}");
                EngineError::WalError(e.to_string())
            })?;

        metrics::counter!(WAL_COMPACTIONS_TOTAL).increment(1);
        info!("compacted WAL to {count} events");
        Ok(())
    }

    pub async fn wal_appends_since_compact(&self) -> u64 {
        let (tx, rx) = oneshot::channel();
        if self
            .wal_tx
            .send(WalCommand::AppendsSinceCompact { response: tx })
            .await
            .is_err()
        {
            return 0;
        }
        rx.await.unwrap_or(0)
    }
}
