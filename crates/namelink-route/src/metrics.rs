//! Per-neighbor link metrics and the cost-calculator hook.
//!
//! The `LinkCostManager` observes hello protocol outcomes, keeps one metrics
//! record per neighbor, and answers link-cost queries. A query starts from
//! the rtt-based baseline cost and, when a calculator is installed in the
//! hook slot, passes it through that calculator. The slot holds at most one
//! calculator; installing replaces the previous one and clearing restores
//! baseline behavior.

use std::collections::BTreeMap;
use std::time::{Duration, Instant};

use namelink_core::RouterName;

use crate::rtt::SmoothedRtt;

/// Immutable metrics snapshot handed to a cost calculator per query.
#[derive(Debug, Clone)]
pub struct LinkMetrics {
    pub neighbor: RouterName,
    /// Configured (administrative) cost of the link; always positive for
    /// configured neighbors.
    pub original_cost: f64,
    /// RTT of the most recent validated response, if any.
    pub current_rtt: Option<Duration>,
    /// Consecutive probe timeouts since the last validated response.
    pub timeout_count: Option<u32>,
    /// When the last validated response arrived.
    pub last_success: Option<Instant>,
}

/// A pluggable cost calculator installed into the manager's hook slot.
pub trait CostCalculator: Send {
    /// Short name for logging.
    fn name(&self) -> &'static str;

    /// Transform the rtt-based baseline cost for one neighbor.
    fn adjusted_cost(&mut self, rtt_based_cost: f64, metrics: &LinkMetrics, now: Instant) -> f64;
}

#[derive(Debug, Default)]
struct LinkState {
    original_cost: f64,
    rtt: SmoothedRtt,
    current_rtt: Option<Duration>,
    timeout_count: u32,
    last_success: Option<Instant>,
    /// When the most recent probe went out, for RTT measurement.
    probe_sent_at: Option<Instant>,
}

/// The per-neighbor metrics store and cost-query surface.
#[derive(Default)]
#[must_use]
pub struct LinkCostManager {
    links: BTreeMap<RouterName, LinkState>,
    calculator: Option<Box<dyn CostCalculator>>,
}

impl LinkCostManager {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a configured neighbor link and its administrative cost.
    pub fn insert_link(&mut self, neighbor: RouterName, original_cost: f64) {
        self.links.insert(
            neighbor,
            LinkState {
                original_cost,
                ..LinkState::default()
            },
        );
    }

    #[must_use]
    pub fn has_link(&self, neighbor: &RouterName) -> bool {
        self.links.contains_key(neighbor)
    }

    /// A probe went out toward `neighbor`.
    pub fn on_probe_sent(&mut self, neighbor: &RouterName, now: Instant) {
        if let Some(link) = self.links.get_mut(neighbor) {
            link.probe_sent_at = Some(now);
        }
    }

    /// A validated response arrived from `neighbor`.
    ///
    /// Returns the measured RTT when a probe send time was on record.
    pub fn on_data_received(&mut self, neighbor: &RouterName, now: Instant) -> Option<Duration> {
        let link = self.links.get_mut(neighbor)?;
        link.timeout_count = 0;
        link.last_success = Some(now);
        let rtt = link
            .probe_sent_at
            .take()
            .and_then(|sent| now.checked_duration_since(sent));
        if let Some(rtt) = rtt {
            link.current_rtt = Some(rtt);
            link.rtt.observe(rtt);
        }
        rtt
    }

    /// A probe toward `neighbor` timed out; `count` is the running total.
    pub fn on_timeout(&mut self, neighbor: &RouterName, count: u32) {
        if let Some(link) = self.links.get_mut(neighbor) {
            link.timeout_count = count;
        }
    }

    /// Snapshot the metrics for one neighbor.
    #[must_use]
    pub fn metrics(&self, neighbor: &RouterName) -> Option<LinkMetrics> {
        self.links.get(neighbor).map(|link| LinkMetrics {
            neighbor: neighbor.clone(),
            original_cost: link.original_cost,
            current_rtt: link.current_rtt,
            timeout_count: Some(link.timeout_count),
            last_success: link.last_success,
        })
    }

    /// The rtt-derived baseline cost: the smoothed RTT in milliseconds once
    /// the link has been measured, the configured cost before that.
    #[must_use]
    pub fn rtt_based_cost(&self, neighbor: &RouterName) -> Option<f64> {
        self.links.get(neighbor).map(|link| {
            if link.rtt.is_initialized() {
                link.rtt.srtt_ms()
            } else {
                link.original_cost
            }
        })
    }

    /// The effective link cost toward `neighbor`: the baseline, adjusted by
    /// the installed calculator when one is set.
    pub fn link_cost(&mut self, neighbor: &RouterName, now: Instant) -> Option<f64> {
        let baseline = self.rtt_based_cost(neighbor)?;
        let metrics = self.metrics(neighbor)?;
        let cost = match self.calculator.as_mut() {
            Some(calculator) => {
                let adjusted = calculator.adjusted_cost(baseline, &metrics, now);
                tracing::trace!(
                    %neighbor,
                    calculator = calculator.name(),
                    baseline,
                    adjusted,
                    "link cost query"
                );
                adjusted
            }
            None => baseline,
        };
        Some(cost)
    }

    /// Install a cost calculator, replacing any previous one.
    pub fn set_load_aware_cost_calculator(&mut self, calculator: Box<dyn CostCalculator>) {
        tracing::info!(calculator = calculator.name(), "cost calculator installed");
        self.calculator = Some(calculator);
    }

    /// Clear the hook slot, restoring baseline cost behavior.
    pub fn clear_load_aware_cost_calculator(&mut self) {
        if self.calculator.take().is_some() {
            tracing::info!("cost calculator cleared, baseline costs restored");
        }
    }

    #[must_use]
    pub fn has_cost_calculator(&self) -> bool {
        self.calculator.is_some()
    }

    /// Install a calculator for the lifetime of the returned guard.
    ///
    /// The guard clears the slot when dropped, on every exit path.
    pub fn scoped_calculator(
        &mut self,
        calculator: Box<dyn CostCalculator>,
    ) -> ScopedCalculator<'_> {
        self.set_load_aware_cost_calculator(calculator);
        ScopedCalculator { manager: self }
    }

    pub fn neighbors(&self) -> impl Iterator<Item = &RouterName> {
        self.links.keys()
    }
}

/// RAII handle for a temporarily installed cost calculator.
#[must_use = "dropping the guard immediately clears the calculator"]
pub struct ScopedCalculator<'a> {
    manager: &'a mut LinkCostManager,
}

impl ScopedCalculator<'_> {
    pub fn manager(&mut self) -> &mut LinkCostManager {
        self.manager
    }
}

impl Drop for ScopedCalculator<'_> {
    fn drop(&mut self) {
        self.manager.clear_load_aware_cost_calculator();
    }
}
