//! Link metrics and cost adjustment for the namelink routing daemon.
//!
//! This crate owns the per-neighbor link metrics store, the rtt-based
//! baseline link cost, and the pluggable cost-calculator hook the routing
//! calculator queries through. Two calculators are provided: the load-aware
//! calculator (latency class, load, stability) and an ML-adaptive calculator
//! with a lightweight online linear model. It also holds the coalescing
//! schedulers that downstream consumers (LSDB rebuild, route recalculation)
//! are triggered through.

pub mod load_aware;
pub mod metrics;
pub mod ml;
pub mod recalc;
pub mod rtt;

pub use load_aware::{CostWeights, LoadAwareCostCalculator};
pub use metrics::{CostCalculator, LinkCostManager, LinkMetrics, ScopedCalculator};
pub use ml::MlAdaptiveCalculator;
pub use recalc::RecalcScheduler;
pub use rtt::SmoothedRtt;
