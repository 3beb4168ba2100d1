//! The node orchestrator and its async event loop.
//!
//! The node wires the hello engine, the link-cost manager, the reconvergence
//! triggers, faces, signing, and validation into one logical event loop. The
//! engine stays pure: faces and timers post `NodeEvent`s into a channel, the
//! loop feeds them to the engine, and the returned actions are dispatched
//! back out (transmits, timers, reconvergence). Engine events are delivered
//! to observers before actions are dispatched.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Instant;

use tokio::sync::{broadcast, mpsc, watch};

use namelink_core::{Packet, Probe, RouterName};
use namelink_hello::engine::{HelloAction, HelloEvent, HelloOutput};
use namelink_hello::probe as probe_names;
use namelink_hello::{HelloEngine, PacketCounters, Status};
use namelink_route::{
    LinkCostManager, LoadAwareCostCalculator, MlAdaptiveCalculator, RecalcScheduler,
};

use crate::config::{CalculatorKind, NodeConfig, parse_key_bytes, parse_socket_addr};
use crate::error::NodeError;
use crate::face::{AnyFace, UdpFace};
use crate::scheduler::{CancelHandle, Scheduler, monotonic_now};
use crate::signing::{
    AcceptAllValidator, Ed25519Signer, Ed25519Validator, Sign, Validate,
};

/// Events delivered to the event loop from faces, timers, and the scheduler.
#[derive(Debug)]
pub enum NodeEvent {
    /// Periodic probe tick for one neighbor.
    SendProbe { neighbor: RouterName },
    /// A packet arrived on a face.
    InboundPacket { face_id: u64, packet: Packet },
    /// An outstanding probe expired without a response.
    ProbeTimedOut { probe: RouterName },
    /// A face stopped delivering packets.
    FaceDown { face_id: u64 },
}

/// An outstanding probe awaiting data, nack, or timeout.
struct PendingProbe {
    cancel: CancelHandle,
}

/// Handle for signalling shutdown from outside the event loop.
#[derive(Clone)]
pub struct ShutdownHandle {
    tx: watch::Sender<bool>,
}

impl ShutdownHandle {
    pub fn shutdown(&self) {
        let _ = self.tx.send(true);
    }
}

/// A namelink routing daemon instance.
pub struct Node {
    config: NodeConfig,
    engine: HelloEngine,
    hello_prefix: RouterName,
    cost_manager: LinkCostManager,
    adj_lsa: RecalcScheduler,
    routing_calc: RecalcScheduler,
    signer: Ed25519Signer,
    validator: Box<dyn Validate>,
    faces: HashMap<u64, Arc<AnyFace>>,
    pending_probes: HashMap<RouterName, PendingProbe>,
    scheduler: Scheduler<NodeEvent>,
    event_tx: mpsc::Sender<NodeEvent>,
    event_rx: mpsc::Receiver<NodeEvent>,
    events_out: broadcast::Sender<HelloEvent>,
    shutdown_tx: watch::Sender<bool>,
    shutdown_rx: watch::Receiver<bool>,
    bridge_handles: Vec<tokio::task::JoinHandle<()>>,
    started: bool,
}

impl Node {
    /// Build a node from configuration.
    pub fn new(config: NodeConfig) -> Result<Self, NodeError> {
        let hello_config = config.hello_config()?;
        let router_prefix = hello_config.router_prefix.clone();
        let hello_prefix = probe_names::hello_filter_prefix(&router_prefix);
        let adjacencies = config.adjacency_list()?;

        let mut cost_manager = LinkCostManager::new();
        for adjacency in adjacencies.iter() {
            cost_manager.insert_link(adjacency.name().clone(), adjacency.cost);
        }
        match config.calculator_kind()? {
            CalculatorKind::LoadAware => cost_manager.set_load_aware_cost_calculator(Box::new(
                LoadAwareCostCalculator::new(config.cost_weights()),
            )),
            CalculatorKind::MlAdaptive => cost_manager
                .set_load_aware_cost_calculator(Box::new(MlAdaptiveCalculator::new())),
            CalculatorKind::None => {}
        }

        let key_name = router_prefix.clone().append_str("KEY");
        let signer = match &config.signing.private_key {
            Some(hex_seed) => Ed25519Signer::from_seed(parse_key_bytes(hex_seed)?, key_name),
            None => Ed25519Signer::generate(key_name),
        };

        let mut anchors = Ed25519Validator::new();
        for entry in &config.neighbors {
            if let Some(ref hex_key) = entry.public_key {
                let bytes = parse_key_bytes(hex_key)?;
                let key = ed25519_dalek::VerifyingKey::from_bytes(&bytes)
                    .map_err(|e| NodeError::Config(format!("bad public key for {}: {e}", entry.name)))?;
                let key_name = RouterName::from_uri(&entry.name)?.append_str("KEY");
                anchors.add_anchor(key_name, key);
            }
        }
        let validator: Box<dyn Validate> = if anchors.is_empty() {
            Box::new(AcceptAllValidator)
        } else {
            Box::new(anchors)
        };

        let (event_tx, event_rx) = mpsc::channel(1024);
        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        let (events_out, _) = broadcast::channel(256);

        Ok(Self {
            engine: HelloEngine::new(hello_config, adjacencies),
            hello_prefix,
            cost_manager,
            adj_lsa: RecalcScheduler::adj_lsa_build(),
            routing_calc: RecalcScheduler::routing_calculation(),
            signer,
            validator,
            faces: HashMap::new(),
            pending_probes: HashMap::new(),
            scheduler: Scheduler::new(event_tx.clone()),
            event_tx,
            event_rx,
            events_out,
            shutdown_tx,
            shutdown_rx,
            bridge_handles: Vec::new(),
            started: false,
            config,
        })
    }

    /// Observe hello events as they are emitted.
    pub fn subscribe(&self) -> broadcast::Receiver<HelloEvent> {
        self.events_out.subscribe()
    }

    pub fn shutdown_handle(&self) -> ShutdownHandle {
        ShutdownHandle {
            tx: self.shutdown_tx.clone(),
        }
    }

    /// Add a face programmatically (tests and demos use memory faces).
    pub fn add_face(&mut self, face_id: u64, face: AnyFace) {
        self.faces.insert(face_id, Arc::new(face));
    }

    #[must_use]
    pub fn counters(&self) -> PacketCounters {
        *self.engine.counters()
    }

    #[must_use]
    pub fn neighbor_status(&self, neighbor: &RouterName) -> Status {
        self.engine.adjacencies().status_of(neighbor)
    }

    /// Build configured faces, spawn their receive bridges, and start the
    /// hello protocol. Prefix registration failure is fatal.
    pub async fn start(&mut self) -> Result<(), NodeError> {
        if self.started {
            return Err(NodeError::AlreadyRunning);
        }
        self.started = true;

        let entries: Vec<(u64, String, String, String)> = self
            .config
            .faces
            .udp
            .iter()
            .map(|e| (e.id, e.name.clone(), e.bind.clone(), e.target.clone()))
            .collect();
        for (id, name, bind, target) in entries {
            if id == 0 {
                return Err(NodeError::Config(format!(
                    "face '{name}' must have a nonzero id"
                )));
            }
            if self.faces.contains_key(&id) {
                return Err(NodeError::Config(format!("duplicate face id {id}")));
            }
            let face =
                UdpFace::bind(&name, parse_socket_addr(&bind)?, parse_socket_addr(&target)?)
                    .await?;
            tracing::info!(face = %name, id, "udp face bound");
            self.add_face(id, AnyFace::Udp(face));
        }

        self.spawn_receive_bridges();

        let output = self.engine.start();
        self.dispatch(output, None).await?;

        tracing::info!(
            neighbors = self.engine.adjacencies().len(),
            faces = self.faces.len(),
            "hello protocol started"
        );
        Ok(())
    }

    /// Spawn one receive bridge task per face.
    fn spawn_receive_bridges(&mut self) {
        for (&face_id, face) in &self.faces {
            let face = Arc::clone(face);
            let event_tx = self.event_tx.clone();
            let mut shutdown_rx = self.shutdown_rx.clone();

            let handle = tokio::spawn(async move {
                loop {
                    tokio::select! {
                        biased;
                        _ = shutdown_rx.changed() => break,
                        result = face.receive() => match result {
                            Ok(packet) => {
                                if event_tx
                                    .send(NodeEvent::InboundPacket { face_id, packet })
                                    .await
                                    .is_err()
                                {
                                    break;
                                }
                            }
                            Err(e) => {
                                tracing::warn!(face = %face.name(), "receive error: {e}");
                                let _ = event_tx.send(NodeEvent::FaceDown { face_id }).await;
                                break;
                            }
                        },
                    }
                }
            });
            self.bridge_handles.push(handle);
        }
    }

    /// Run the event loop until shutdown is signalled.
    pub async fn run(&mut self) {
        let mut maintenance = tokio::time::interval(std::time::Duration::from_secs(1));
        maintenance.tick().await;

        tracing::info!("entering event loop");
        loop {
            tokio::select! {
                biased;

                _ = self.shutdown_rx.changed() => {
                    tracing::info!("shutdown signal received");
                    break;
                }

                event = self.event_rx.recv() => {
                    match event {
                        Some(event) => self.handle_event(event).await,
                        None => break,
                    }
                }

                _ = maintenance.tick() => {
                    self.run_maintenance();
                }
            }
        }
    }

    /// Stop bridges, cancel outstanding timers, and drop faces.
    pub async fn shutdown(mut self) {
        tracing::info!("shutting down node");
        let _ = self.shutdown_tx.send(true);

        for (_, pending) in self.pending_probes.drain() {
            pending.cancel.cancel();
        }
        for handle in self.bridge_handles.drain(..) {
            let _ = handle.await;
        }
        tracing::info!(counters = %self.engine.counters(), "node shutdown complete");
    }

    async fn handle_event(&mut self, event: NodeEvent) {
        match event {
            NodeEvent::SendProbe { neighbor } => {
                let output = self.engine.send_probe(&neighbor);
                self.dispatch_nonfatal(output, None).await;
            }
            NodeEvent::InboundPacket { face_id, packet } => {
                self.handle_inbound_packet(face_id, packet).await;
            }
            NodeEvent::ProbeTimedOut { probe } => {
                // Only a live pending probe can time out; a cancelled timer
                // that already reached the channel is ignored.
                if self.pending_probes.remove(&probe).is_none() {
                    return;
                }
                let output = self.engine.on_timeout(&probe);
                self.dispatch_nonfatal(output, None).await;
            }
            NodeEvent::FaceDown { face_id } => {
                tracing::warn!(face_id, "face down, unbinding its neighbors");
                let affected: Vec<RouterName> = self
                    .engine
                    .adjacencies()
                    .iter()
                    .filter(|a| a.face_id == face_id)
                    .map(|a| a.name().clone())
                    .collect();
                for neighbor in affected {
                    // The periodic loop keeps ticking; probes resume if the
                    // face comes back under the same id.
                    self.engine.adjacencies_mut().set_face_id(&neighbor, 0);
                }
                self.faces.remove(&face_id);
            }
        }
    }

    async fn handle_inbound_packet(&mut self, face_id: u64, packet: Packet) {
        match packet {
            Packet::Probe(probe) => {
                if !probe.name.starts_with(&self.hello_prefix) {
                    tracing::trace!(name = %probe.name, "probe outside hello namespace");
                    return;
                }
                let output = self.engine.on_inbound_probe(&probe.name);
                self.dispatch_nonfatal(output, Some(face_id)).await;
            }
            Packet::Data(data) => {
                let probe_name = data.name.drop_back(1);
                let Some(pending) = self.pending_probes.remove(&probe_name) else {
                    tracing::trace!(name = %data.name, "unsolicited data");
                    return;
                };
                pending.cancel.cancel();

                if let Err(e) = self.validator.validate(&data) {
                    tracing::debug!(name = %data.name, "dropping data: {e}");
                    return;
                }
                let output = self.engine.on_response_validated(&data.name);
                self.dispatch_nonfatal(output, Some(face_id)).await;
            }
            Packet::Nack(nack) => {
                if !self.pending_probes.contains_key(&nack.name) {
                    tracing::trace!(name = %nack.name, "nack for no outstanding probe");
                    return;
                }
                tracing::debug!(name = %nack.name, reason = ?nack.reason, "probe nacked");
                let output = self.engine.on_nack(&nack.name);
                self.dispatch_nonfatal(output, Some(face_id)).await;
            }
        }
    }

    async fn dispatch_nonfatal(&mut self, output: HelloOutput, context_face: Option<u64>) {
        if let Err(e) = self.dispatch(output, context_face).await {
            tracing::error!("dispatch failed: {e}");
        }
    }

    /// Deliver engine events, then perform engine actions.
    ///
    /// Only filter registration can fail; everything else degrades to logs.
    async fn dispatch(
        &mut self,
        output: HelloOutput,
        context_face: Option<u64>,
    ) -> Result<(), NodeError> {
        let now = monotonic_now();
        for event in output.events {
            self.observe_event(&event, now);
            let _ = self.events_out.send(event);
        }

        for action in output.actions {
            match action {
                HelloAction::RegisterFilter { prefix } => {
                    for face in self.faces.values() {
                        face.register_prefix(&prefix).await?;
                    }
                    tracing::debug!(%prefix, "hello filter registered");
                }
                HelloAction::ExpressProbe { name, lifetime } => {
                    self.express_probe(name, lifetime).await;
                }
                HelloAction::PutData { mut data } => {
                    self.signer.sign(&mut data);
                    match context_face.and_then(|id| self.faces.get(&id)) {
                        Some(face) => {
                            if let Err(e) = face.transmit(&Packet::Data(data)).await {
                                tracing::warn!("failed to send hello reply: {e}");
                            }
                        }
                        None => tracing::warn!("no face to send hello reply on"),
                    }
                }
                HelloAction::ScheduleProbe { neighbor, delay } => {
                    // The probe loop runs for the life of the process; its
                    // timers die with the runtime.
                    let _ = self
                        .scheduler
                        .schedule(delay, NodeEvent::SendProbe { neighbor });
                }
                HelloAction::ScheduleDeferredTimeout { probe, delay } => {
                    if let Some(old) = self.pending_probes.remove(&probe) {
                        old.cancel.cancel();
                    }
                    let cancel = self.scheduler.schedule(
                        delay,
                        NodeEvent::ProbeTimedOut {
                            probe: probe.clone(),
                        },
                    );
                    self.pending_probes.insert(probe, PendingProbe { cancel });
                }
                HelloAction::RebuildAdjacencyLsa => self.adj_lsa.schedule(),
                HelloAction::RecalculateRoutes => self.routing_calc.schedule(),
            }
        }
        Ok(())
    }

    /// Fold one engine event into the link metrics.
    fn observe_event(&mut self, event: &HelloEvent, now: Instant) {
        match event {
            HelloEvent::InterestSent { neighbor } => {
                self.cost_manager.on_probe_sent(neighbor, now);
            }
            HelloEvent::DataReceived { neighbor } => {
                let rtt = self.cost_manager.on_data_received(neighbor, now);
                self.engine
                    .adjacencies_mut()
                    .note_success(neighbor, now, rtt);
            }
            HelloEvent::Timeout { neighbor, count } => {
                self.cost_manager.on_timeout(neighbor, *count);
            }
            HelloEvent::NeighborStatusChanged { neighbor, status } => {
                tracing::info!(%neighbor, ?status, "neighbor status changed");
            }
            HelloEvent::InitialHelloDataValidated { .. } => {}
        }
    }

    /// Send one probe and arm its timeout.
    async fn express_probe(&mut self, name: RouterName, lifetime: std::time::Duration) {
        let Some(neighbor) = probe_names::neighbor_from_timeout(&name) else {
            return;
        };
        let face_id = self
            .engine
            .adjacencies()
            .find(&neighbor)
            .map(|a| a.face_id)
            .unwrap_or(0);
        let Some(face) = self.faces.get(&face_id) else {
            tracing::warn!(%neighbor, face_id, "no face for probe");
            return;
        };

        let probe = Probe {
            name: name.clone(),
            nonce: rand::random(),
            lifetime,
            must_be_fresh: true,
            can_be_prefix: true,
        };
        if let Err(e) = face.transmit(&Packet::Probe(probe)).await {
            tracing::warn!(%neighbor, "failed to send probe: {e}");
        }

        let cancel = self
            .scheduler
            .schedule(lifetime, NodeEvent::ProbeTimedOut { probe: name.clone() });
        if let Some(old) = self.pending_probes.insert(name, PendingProbe { cancel }) {
            old.cancel.cancel();
        }
    }

    /// Drain the reconvergence triggers and report link costs.
    fn run_maintenance(&mut self) {
        let mut reconverged = false;
        if self.adj_lsa.take_pending() {
            tracing::info!("rebuilding adjacency LSA");
            reconverged = true;
        }
        if self.routing_calc.take_pending() {
            tracing::info!("recalculating routing table");
            reconverged = true;
        }
        if reconverged {
            let now = monotonic_now();
            let neighbors = self.engine.adjacencies().names();
            for neighbor in neighbors {
                if let Some(cost) = self.cost_manager.link_cost(&neighbor, now) {
                    let status = self.engine.adjacencies().status_of(&neighbor);
                    tracing::debug!(%neighbor, cost, ?status, "link cost");
                }
            }
        }
        tracing::trace!(counters = %self.engine.counters(), "hello counters");
    }
}
