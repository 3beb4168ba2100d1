//! The hello protocol engine.
//!
//! The engine consumes protocol events (probe ticks, inbound probes,
//! validated responses, timeouts, nacks) and returns the observable events it
//! emitted plus the actions the driver must perform. It never does I/O and
//! never reads a clock: delays in actions are relative, and the driver feeds
//! outcomes back in. Each entry point runs to completion against engine state,
//! which is what makes the per-neighbor state machine correct under
//! interleaved deliveries on a single-threaded executor.

use std::time::Duration;

use namelink_core::{DataPacket, INFO_COMPONENT, NameComponent, RouterName};

use crate::adjacency::{AdjacencyList, Status};
use crate::probe;
use crate::stats::{PacketCounters, PacketKind};

/// Hello protocol configuration.
#[derive(Debug, Clone)]
pub struct HelloConfig {
    /// This router's name; probes identify their sender with it.
    pub router_prefix: RouterName,
    /// Interval between periodic probes toward each neighbor.
    pub probe_interval: Duration,
    /// Lifetime of each probe; the face reports a timeout after this long.
    pub probe_lifetime: Duration,
    /// Consecutive timeouts before an active neighbor is declared inactive.
    pub retry_limit: u32,
    /// Whether hyperbolic routing is on, which selects the reconvergence hook.
    pub hyperbolic_routing: bool,
}

/// Observable events emitted by the engine, in emission order.
#[derive(Debug, Clone, PartialEq)]
pub enum HelloEvent {
    InterestSent {
        neighbor: RouterName,
    },
    DataReceived {
        neighbor: RouterName,
    },
    Timeout {
        neighbor: RouterName,
        count: u32,
    },
    NeighborStatusChanged {
        neighbor: RouterName,
        status: Status,
    },
    InitialHelloDataValidated {
        neighbor: RouterName,
    },
}

/// Actions the driver must perform after an engine step.
#[derive(Debug, Clone, PartialEq)]
pub enum HelloAction {
    /// Register an inbound filter for the hello namespace. Emitted once from
    /// `start`; registration failure is fatal to the daemon.
    RegisterFilter { prefix: RouterName },
    /// Express a probe with the given lifetime toward its named neighbor.
    ExpressProbe {
        name: RouterName,
        lifetime: Duration,
    },
    /// Sign and transmit a reply; the signature fields are left empty here.
    PutData { data: DataPacket },
    /// Call `send_probe(neighbor)` again after `delay`.
    ScheduleProbe {
        neighbor: RouterName,
        delay: Duration,
    },
    /// Deliver `on_timeout(probe)` after `delay`. Emitted for nacks, which
    /// get a grace window before escalation.
    ScheduleDeferredTimeout {
        probe: RouterName,
        delay: Duration,
    },
    /// Reconvergence: rebuild the adjacency LSA (link-state routing).
    RebuildAdjacencyLsa,
    /// Reconvergence: recalculate routes (hyperbolic routing).
    RecalculateRoutes,
}

/// The result of one engine step.
///
/// Drivers deliver `events` to observers before dispatching `actions`, so a
/// status-change event is always observed before the reconvergence schedule
/// it caused.
#[derive(Debug, Default, Clone, PartialEq)]
#[must_use]
pub struct HelloOutput {
    pub events: Vec<HelloEvent>,
    pub actions: Vec<HelloAction>,
}

impl HelloOutput {
    fn none() -> Self {
        Self::default()
    }
}

/// The hello protocol state machine.
#[must_use]
pub struct HelloEngine {
    config: HelloConfig,
    adjacencies: AdjacencyList,
    counters: PacketCounters,
    /// Version counter appended to reply data names.
    next_version: u64,
}

impl HelloEngine {
    pub fn new(config: HelloConfig, adjacencies: AdjacencyList) -> Self {
        Self {
            config,
            adjacencies,
            counters: PacketCounters::new(),
            next_version: 0,
        }
    }

    pub fn adjacencies(&self) -> &AdjacencyList {
        &self.adjacencies
    }

    /// Mutable access for the driver: face binding and success telemetry.
    pub fn adjacencies_mut(&mut self) -> &mut AdjacencyList {
        &mut self.adjacencies
    }

    #[must_use]
    pub fn counters(&self) -> &PacketCounters {
        &self.counters
    }

    pub fn config(&self) -> &HelloConfig {
        &self.config
    }

    /// Start the protocol: register the inbound filter and kick off one
    /// probe loop per configured neighbor at `t = 0`.
    pub fn start(&mut self) -> HelloOutput {
        let mut out = HelloOutput::none();
        out.actions.push(HelloAction::RegisterFilter {
            prefix: probe::hello_filter_prefix(&self.config.router_prefix),
        });
        for neighbor in self.adjacencies.names() {
            out.actions.push(HelloAction::ScheduleProbe {
                neighbor,
                delay: Duration::ZERO,
            });
        }
        out
    }

    /// One tick of the periodic probe loop for `neighbor`.
    ///
    /// Skips dispatch while no face is bound but reschedules regardless, so
    /// the loop self-sustains until process exit. Unknown neighbors get
    /// nothing, not even a reschedule.
    pub fn send_probe(&mut self, neighbor: &RouterName) -> HelloOutput {
        let Some(adjacency) = self.adjacencies.find(neighbor) else {
            return HelloOutput::none();
        };

        let mut out = HelloOutput::none();
        if adjacency.has_face() {
            self.express_probe(&mut out, neighbor);
        } else {
            tracing::debug!(%neighbor, "no face bound, skipping probe this tick");
        }

        out.actions.push(HelloAction::ScheduleProbe {
            neighbor: neighbor.clone(),
            delay: self.config.probe_interval,
        });
        out
    }

    /// Handle an inbound probe addressed to our hello namespace.
    pub fn on_inbound_probe(&mut self, name: &RouterName) -> HelloOutput {
        self.counters.increment(PacketKind::RcvHelloInterest);

        let Some(neighbor) = probe::neighbor_from_inbound(name) else {
            tracing::debug!(probe = %name, "inbound probe name does not match hello shape");
            return HelloOutput::none();
        };

        if !self.adjacencies.is_neighbor(&neighbor) {
            tracing::debug!(%neighbor, "inbound probe from unknown neighbor");
            return HelloOutput::none();
        }

        let mut out = HelloOutput::none();

        let version = self.next_version;
        self.next_version += 1;
        let data = DataPacket {
            name: name.clone().append(NameComponent::version(version)),
            // A reply cached longer than needed to satisfy one probe causes
            // counterintuitive liveness readings, so freshness stays at zero.
            freshness: Duration::ZERO,
            content: INFO_COMPONENT.to_vec(),
            key_locator: None,
            signature: Vec::new(),
        };
        out.actions.push(HelloAction::PutData { data });
        self.counters.increment(PacketKind::SentHelloData);

        // A probe from a neighbor we believe is down is a recovery signal:
        // probe it back right away. The periodic loop keeps running.
        let probe_back = self
            .adjacencies
            .find(&neighbor)
            .is_some_and(|a| a.status == Status::Inactive && a.has_face());
        if probe_back {
            self.express_probe(&mut out, &neighbor);
        }

        out
    }

    /// Handle a response that passed validation.
    pub fn on_response_validated(&mut self, data_name: &RouterName) -> HelloOutput {
        let mut out = HelloOutput::none();

        if let Some(neighbor) = probe::neighbor_from_validated_data(data_name) {
            let old_status = self.adjacencies.status_of(&neighbor);
            self.adjacencies.set_status(&neighbor, Status::Active);
            self.adjacencies.set_timeouts(&neighbor, 0);

            out.events.push(HelloEvent::DataReceived {
                neighbor: neighbor.clone(),
            });

            if old_status != Status::Active {
                tracing::info!(%neighbor, "neighbor is now active");
                out.events.push(HelloEvent::NeighborStatusChanged {
                    neighbor: neighbor.clone(),
                    status: Status::Active,
                });
                out.actions.push(self.reconvergence_action());
                out.events
                    .push(HelloEvent::InitialHelloDataValidated { neighbor });
            }
        } else {
            tracing::debug!(data = %data_name, "validated data name does not match hello shape");
        }

        self.counters.increment(PacketKind::RcvHelloData);
        out
    }

    /// Handle a probe timeout reported by the face.
    pub fn on_timeout(&mut self, probe_name: &RouterName) -> HelloOutput {
        let Some(neighbor) = probe::neighbor_from_timeout(probe_name) else {
            return HelloOutput::none();
        };
        if !self.adjacencies.is_neighbor(&neighbor) {
            return HelloOutput::none();
        }

        self.adjacencies.increment_timeouts(&neighbor);
        let count = self.adjacencies.timed_out_count(&neighbor);
        let status = self.adjacencies.status_of(&neighbor);
        tracing::debug!(%neighbor, count, "probe timed out");

        let mut out = HelloOutput::none();
        out.events.push(HelloEvent::Timeout {
            neighbor: neighbor.clone(),
            count,
        });

        if count < self.config.retry_limit {
            self.express_probe(&mut out, &neighbor);
        } else if status == Status::Active {
            self.adjacencies.set_status(&neighbor, Status::Inactive);
            tracing::info!(%neighbor, "neighbor is now inactive");
            out.events.push(HelloEvent::NeighborStatusChanged {
                neighbor,
                status: Status::Inactive,
            });
            out.actions.push(self.reconvergence_action());
        }
        // Already inactive: nothing to escalate, the periodic loop continues.

        out
    }

    /// Handle a nack: escalate to a timeout after twice the probe lifetime.
    ///
    /// The upstream rejected the probe, but the neighbor may still be
    /// reachable, so the grace window avoids immediate escalation.
    pub fn on_nack(&mut self, probe_name: &RouterName) -> HelloOutput {
        let mut out = HelloOutput::none();
        out.actions.push(HelloAction::ScheduleDeferredTimeout {
            probe: probe_name.clone(),
            delay: 2 * self.config.probe_lifetime,
        });
        out
    }

    /// Express a probe toward `neighbor`: the action, the observable event,
    /// and the sent counter. Shared by the periodic loop, the reactive path,
    /// and timeout reissue.
    fn express_probe(&mut self, out: &mut HelloOutput, neighbor: &RouterName) {
        let name = probe::probe_name(neighbor, &self.config.router_prefix);
        tracing::trace!(probe = %name, "expressing probe");
        out.actions.push(HelloAction::ExpressProbe {
            name,
            lifetime: self.config.probe_lifetime,
        });
        out.events.push(HelloEvent::InterestSent {
            neighbor: neighbor.clone(),
        });
        self.counters.increment(PacketKind::SentHelloInterest);
    }

    fn reconvergence_action(&self) -> HelloAction {
        if self.config.hyperbolic_routing {
            HelloAction::RecalculateRoutes
        } else {
            HelloAction::RebuildAdjacencyLsa
        }
    }
}
