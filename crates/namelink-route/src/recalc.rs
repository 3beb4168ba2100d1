//! Coalescing reconvergence triggers.
//!
//! Status transitions schedule either an adjacency-LSA rebuild or a routing
//! table recalculation. Both consumers are driven through the same coalescing
//! trigger: any number of schedules between drains collapses into one run.

/// A coalescing one-pending-run trigger.
#[derive(Debug)]
#[must_use]
pub struct RecalcScheduler {
    label: &'static str,
    pending: bool,
    scheduled_total: u64,
    run_total: u64,
}

impl RecalcScheduler {
    /// The adjacency-LSA rebuild trigger (link-state routing mode).
    pub fn adj_lsa_build() -> Self {
        Self::new("adjacency-lsa-build")
    }

    /// The routing table recalculation trigger (hyperbolic routing mode).
    pub fn routing_calculation() -> Self {
        Self::new("routing-calculation")
    }

    fn new(label: &'static str) -> Self {
        Self {
            label,
            pending: false,
            scheduled_total: 0,
            run_total: 0,
        }
    }

    /// Request a run. Idempotent: repeated schedules before the next drain
    /// coalesce into one pending run.
    pub fn schedule(&mut self) {
        self.scheduled_total += 1;
        if !self.pending {
            self.pending = true;
            tracing::debug!(trigger = self.label, "reconvergence scheduled");
        }
    }

    /// Drain the trigger: returns true when a run is due, at most once per
    /// batch of schedules.
    pub fn take_pending(&mut self) -> bool {
        if self.pending {
            self.pending = false;
            self.run_total += 1;
            tracing::info!(trigger = self.label, runs = self.run_total, "reconvergence running");
            true
        } else {
            false
        }
    }

    #[must_use]
    pub fn is_pending(&self) -> bool {
        self.pending
    }

    /// How many runs have been drained so far.
    #[must_use]
    pub fn run_total(&self) -> u64 {
        self.run_total
    }

    /// How many schedule requests have arrived so far.
    #[must_use]
    pub fn scheduled_total(&self) -> u64 {
        self.scheduled_total
    }
}
