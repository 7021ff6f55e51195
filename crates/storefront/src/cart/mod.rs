//! Cart synchronization engine.
//!
//! # Architecture
//!
//! - The backend cart is authoritative; [`CartEngine`] keeps a local
//!   [`CartMirror`] for instant display
//! - Quantity edits are applied to the mirror immediately and sent to the
//!   backend after a debounce window; repeated edits to one line inside the
//!   window collapse into a single update carrying the final quantity
//! - A failed update rolls back only its own line; a failed delete reloads
//!   the whole cart
//! - Remote calls for one line are serialised; different lines are
//!   independent
//!
//! User-visible outcomes of background work are published as
//! [`CartNotice`]s on a broadcast channel.

mod debounce;
mod mirror;
mod optimistic;

use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use bitebox_core::{CartLine, CartTotals, LineId, ProductId, SizeId};
use tokio::sync::broadcast;
use tokio::task::JoinSet;
use tracing::{debug, error, info, instrument, warn};

pub use debounce::Debouncer;
pub use mirror::CartMirror;
pub use optimistic::{PendingEdits, PendingMutation, Rollback};

use crate::api::{CommerceApi, NewCartLine};
use crate::error::{Result, SessionError, add_breadcrumb};
use crate::identity::IdentityResolver;

/// Capacity of the notice channel; slow subscribers miss the oldest notices.
const NOTICE_CAPACITY: usize = 32;

/// Notification about background cart work the shopper should see.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CartNotice {
    /// A quantity update was rejected or failed.
    SyncFailed {
        line_id: LineId,
        /// The quantity the line was put back to, if it was rolled back now.
        restored_quantity: Option<u32>,
        message: String,
    },
    /// A delete failed; a reload follows.
    RemoveFailed { line_id: LineId, message: String },
    /// The mirror was reloaded from the backend after a failure.
    Resynced { item_count: u32 },
}

#[derive(Debug, Default)]
struct CartState {
    mirror: CartMirror,
    pending: PendingEdits,
    last_error: Option<String>,
}

/// Optimistic, debounced cart for one shopper.
///
/// Cheap to clone; clones share the mirror and scheduled work.
pub struct CartEngine<A> {
    inner: Arc<CartEngineInner<A>>,
}

struct CartEngineInner<A> {
    api: A,
    identity: Arc<IdentityResolver>,
    state: Mutex<CartState>,
    line_locks: Mutex<HashMap<LineId, Arc<tokio::sync::Mutex<()>>>>,
    debouncer: Debouncer<LineId>,
    notices: broadcast::Sender<CartNotice>,
    debounce: Duration,
}

impl<A> Clone for CartEngine<A> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl<A> std::fmt::Debug for CartEngine<A> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CartEngine")
            .field("debounce", &self.inner.debounce)
            .finish_non_exhaustive()
    }
}

impl<A: CommerceApi> CartEngine<A> {
    /// Create an engine with an empty mirror. Call [`load`](Self::load) to
    /// fill it.
    #[must_use]
    pub fn new(api: A, identity: Arc<IdentityResolver>, debounce: Duration) -> Self {
        let (notices, _) = broadcast::channel(NOTICE_CAPACITY);
        Self {
            inner: Arc::new(CartEngineInner {
                api,
                identity,
                state: Mutex::new(CartState::default()),
                line_locks: Mutex::new(HashMap::new()),
                debouncer: Debouncer::new(),
                notices,
                debounce,
            }),
        }
    }

    /// Fetch the authoritative cart and replace the mirror.
    ///
    /// Edits still waiting for their debounce window are re-applied on top
    /// of the fresh lines; edits for lines that no longer exist are dropped.
    ///
    /// # Errors
    ///
    /// Returns `Fetch` if the cart could not be loaded. The previous mirror is
    /// kept and the failure is available from [`last_error`](Self::last_error).
    #[instrument(skip(self))]
    pub async fn load(&self) -> Result<Vec<CartLine>> {
        let identity = self.inner.identity.resolve();
        match self.inner.api.fetch_cart(&identity).await {
            Ok(lines) => {
                let lines = self.install(lines);
                debug!(lines = lines.len(), "Cart loaded");
                Ok(lines)
            }
            Err(e) => {
                let err = SessionError::from(e);
                warn!(error = %err, "Failed to load cart, keeping last known lines");
                self.state().last_error = Some(err.user_message());
                Err(err)
            }
        }
    }

    /// Change a line's quantity by `delta`, never going below 1.
    ///
    /// The mirror is updated immediately and the remote update is scheduled
    /// after the debounce window. Must be called within a Tokio runtime.
    ///
    /// # Errors
    ///
    /// Returns `Validation` if the line is not in the cart.
    pub fn change_quantity(&self, line_id: LineId, delta: i64) -> Result<u32> {
        self.stage(line_id, |current| apply_delta(current, delta))
    }

    /// Set a line's quantity from free text. Anything that is not a number
    /// of at least 1 becomes 1.
    ///
    /// # Errors
    ///
    /// Returns `Validation` if the line is not in the cart.
    pub fn set_quantity_from_input(&self, line_id: LineId, raw: &str) -> Result<u32> {
        let quantity = parse_quantity_input(raw);
        self.stage(line_id, |_| quantity)
    }

    fn stage(&self, line_id: LineId, next: impl FnOnce(u32) -> u32) -> Result<u32> {
        let (current, target) = {
            let mut state = self.state();
            let current = state
                .mirror
                .quantity(line_id)
                .ok_or_else(|| unknown_line(line_id))?;
            let target = next(current);

            if target == current && state.pending.get(line_id).is_none() {
                return Ok(current);
            }

            state.pending.record(line_id, current, target);
            state.mirror.set_quantity(line_id, target);
            (current, target)
        };

        add_breadcrumb(
            "cart",
            "Changed quantity",
            Some(&[
                ("line_id", line_id.to_string().as_str()),
                ("quantity", target.to_string().as_str()),
            ]),
        );
        debug!(%line_id, from = current, to = target, "Scheduling quantity sync");

        let engine = self.clone();
        self.inner
            .debouncer
            .schedule(line_id, self.inner.debounce, async move {
                // Failures are rolled back and announced inside.
                let _ = engine.remote_quantity_sync(line_id).await;
            });

        Ok(target)
    }

    /// Send the queued quantity for one line.
    #[instrument(skip(self))]
    async fn remote_quantity_sync(&self, line_id: LineId) -> Result<()> {
        let lock = self.line_lock(line_id);
        let _guard = lock.lock().await;

        let Some(edit) = self.state().pending.dispatch(line_id) else {
            return Ok(());
        };

        let identity = self.inner.identity.resolve();
        match self
            .inner
            .api
            .update_cart_line(&identity, line_id, edit.target)
            .await
        {
            Ok(()) => {
                self.state().pending.settle(line_id);
                debug!(%line_id, quantity = edit.target, "Quantity synced");
                Ok(())
            }
            Err(e) => {
                let err = SessionError::from(e);
                let message = err.user_message();

                let restored_quantity = {
                    let mut state = self.state();
                    state.last_error = Some(message.clone());
                    match state.pending.rollback(line_id, edit) {
                        Rollback::Deferred => None,
                        Rollback::Restore(quantity) => state
                            .mirror
                            .set_quantity(line_id, quantity)
                            .map(|_| quantity),
                    }
                };

                warn!(
                    %line_id,
                    error = %err,
                    restored = ?restored_quantity,
                    "Quantity sync failed"
                );
                err.capture();
                self.notify(CartNotice::SyncFailed {
                    line_id,
                    restored_quantity,
                    message,
                });
                Err(err)
            }
        }
    }

    /// Remove a line.
    ///
    /// Any scheduled update for the line is cancelled. If the backend delete
    /// fails the whole cart is reloaded and the delete error is returned.
    ///
    /// # Errors
    ///
    /// Returns `Validation` for an unknown line, or `Fetch` if the delete
    /// failed.
    #[instrument(skip(self))]
    pub async fn remove(&self, line_id: LineId) -> Result<()> {
        self.inner.debouncer.cancel(&line_id);
        {
            let mut state = self.state();
            state.pending.discard(line_id);
            if state.mirror.remove(line_id).is_none() {
                return Err(unknown_line(line_id));
            }
        }

        add_breadcrumb(
            "cart",
            "Removed line",
            Some(&[("line_id", line_id.to_string().as_str())]),
        );

        let lock = self.line_lock(line_id);
        let result = {
            let _guard = lock.lock().await;
            let identity = self.inner.identity.resolve();
            self.inner.api.delete_cart_line(&identity, line_id).await
        };

        match result {
            Ok(()) => {
                info!(%line_id, "Cart line removed");
                Ok(())
            }
            Err(e) => {
                let err = SessionError::from(e);
                warn!(%line_id, error = %err, "Remove failed, reloading cart");
                err.capture();
                self.notify(CartNotice::RemoveFailed {
                    line_id,
                    message: err.user_message(),
                });
                self.resync().await;
                Err(err)
            }
        }
    }

    /// Add a product. Not optimistic: the backend's cart replaces the mirror.
    ///
    /// # Errors
    ///
    /// Returns `Validation` for a zero quantity, or `Fetch` if the backend
    /// call failed.
    #[instrument(skip(self))]
    pub async fn add_item(
        &self,
        product_id: ProductId,
        size_id: Option<SizeId>,
        quantity: u32,
    ) -> Result<Vec<CartLine>> {
        if quantity == 0 {
            return Err(SessionError::Validation(
                "Quantity must be at least 1".to_string(),
            ));
        }

        let identity = self.inner.identity.resolve();
        let line = NewCartLine {
            product_id,
            size_id,
            quantity,
        };
        let lines = self.inner.api.add_cart_line(&identity, &line).await?;

        add_breadcrumb(
            "cart",
            "Added item",
            Some(&[("product_id", product_id.to_string().as_str())]),
        );
        Ok(self.install(lines))
    }

    /// Dispatch every scheduled update now and wait for all in-flight
    /// updates.
    ///
    /// # Errors
    ///
    /// Returns the first update failure. Every failed line has already been
    /// rolled back.
    #[instrument(skip(self))]
    pub async fn flush(&self) -> Result<()> {
        let cancelled = self.inner.debouncer.cancel_all();
        let lines = self.state().pending.line_ids();
        debug!(
            cancelled = cancelled.len(),
            lines = lines.len(),
            "Flushing cart updates"
        );

        let mut tasks = JoinSet::new();
        for line_id in lines {
            let engine = self.clone();
            tasks.spawn(async move { engine.remote_quantity_sync(line_id).await });
        }

        let mut first_error = None;
        while let Some(joined) = tasks.join_next().await {
            match joined {
                Ok(Ok(())) => {}
                Ok(Err(e)) => {
                    if first_error.is_none() {
                        first_error = Some(e);
                    }
                }
                Err(e) => error!(error = %e, "Cart sync task failed"),
            }
        }

        // Updates dispatched by the debouncer before the flush.
        let locks: Vec<_> = self
            .inner
            .line_locks
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .values()
            .cloned()
            .collect();
        for lock in locks {
            drop(lock.lock().await);
        }

        first_error.map_or(Ok(()), Err)
    }

    /// Empty the mirror and drop queued edits, e.g. after an order was
    /// placed.
    pub fn clear_local(&self) {
        self.inner.debouncer.cancel_all();
        let mut state = self.state();
        state.pending.clear();
        state.mirror.clear();
    }

    /// Totals of the mirror, including optimistic edits.
    #[must_use]
    pub fn totals(&self) -> CartTotals {
        self.state().mirror.totals()
    }

    /// Snapshot of the mirror.
    #[must_use]
    pub fn lines(&self) -> Vec<CartLine> {
        self.state().mirror.lines().to_vec()
    }

    /// Subscribe to cart notices.
    #[must_use]
    pub fn subscribe(&self) -> broadcast::Receiver<CartNotice> {
        self.inner.notices.subscribe()
    }

    /// Message of the last failed load or sync, cleared by a successful load.
    #[must_use]
    pub fn last_error(&self) -> Option<String> {
        self.state().last_error.clone()
    }

    /// Whether any edit is still waiting to be sent.
    #[must_use]
    pub fn has_pending(&self) -> bool {
        !self.state().pending.is_empty()
    }

    /// Reload after a failure, announcing the outcome.
    async fn resync(&self) {
        match self.load().await {
            Ok(_) => {
                let item_count = self.totals().item_count;
                self.notify(CartNotice::Resynced { item_count });
            }
            Err(e) => warn!(error = %e, "Cart resync failed"),
        }
    }

    /// Replace the mirror with backend lines, re-applying unconfirmed edits.
    fn install(&self, lines: Vec<CartLine>) -> Vec<CartLine> {
        let (snapshot, dropped) = {
            let mut guard = self.state();
            let state = &mut *guard;
            state.mirror.replace(lines);

            let mirror = &mut state.mirror;
            let dropped = state.pending.rebase(|id| mirror.quantity(id));
            for (line_id, target) in state.pending.targets() {
                mirror.set_quantity(line_id, target);
            }
            state.last_error = None;
            (mirror.lines().to_vec(), dropped)
        };

        for line_id in dropped {
            debug!(%line_id, "Dropping queued edit for vanished line");
            self.inner.debouncer.cancel(&line_id);
        }
        snapshot
    }

    fn line_lock(&self, line_id: LineId) -> Arc<tokio::sync::Mutex<()>> {
        let mut locks = self
            .inner
            .line_locks
            .lock()
            .unwrap_or_else(PoisonError::into_inner);
        Arc::clone(locks.entry(line_id).or_default())
    }

    fn notify(&self, notice: CartNotice) {
        if self.inner.notices.send(notice).is_err() {
            debug!("No cart notice subscribers");
        }
    }

    fn state(&self) -> MutexGuard<'_, CartState> {
        self.inner.state.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

fn unknown_line(line_id: LineId) -> SessionError {
    SessionError::Validation(format!("Line {line_id} is not in the cart"))
}

/// `max(1, current + delta)`, saturating at `u32::MAX`.
fn apply_delta(current: u32, delta: i64) -> u32 {
    let next = i64::from(current).saturating_add(delta).max(1);
    u32::try_from(next).unwrap_or(u32::MAX)
}

/// Quantity typed by the shopper; anything unusable becomes 1.
fn parse_quantity_input(raw: &str) -> u32 {
    match raw.trim().parse::<i64>() {
        Ok(n) if n >= 1 => u32::try_from(n).unwrap_or(u32::MAX),
        _ => 1,
    }
}
