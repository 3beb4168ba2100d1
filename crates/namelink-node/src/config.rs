//! TOML-based configuration for namelink nodes.

use std::net::SocketAddr;
use std::path::Path;
use std::time::Duration;

use serde::Deserialize;

use namelink_core::RouterName;
use namelink_hello::{Adjacency, AdjacencyList, HelloConfig};
use namelink_route::CostWeights;

use crate::error::NodeError;

/// Top-level node configuration loaded from a TOML file.
#[derive(Debug, Default, Deserialize)]
pub struct NodeConfig {
    #[serde(default)]
    pub router: RouterSection,
    #[serde(default)]
    pub hello: HelloSection,
    #[serde(default)]
    pub routing: RoutingSection,
    #[serde(default)]
    pub logging: LoggingSection,
    #[serde(default)]
    pub signing: SigningSection,
    #[serde(default)]
    pub faces: FacesSection,
    #[serde(default)]
    pub neighbors: Vec<NeighborEntry>,
}

impl NodeConfig {
    /// Load configuration from a TOML file.
    pub fn load(path: &Path) -> Result<Self, NodeError> {
        let content = std::fs::read_to_string(path)
            .map_err(|e| NodeError::Config(format!("failed to read config file: {e}")))?;
        toml::from_str(&content)
            .map_err(|e| NodeError::Config(format!("failed to parse config: {e}")))
    }

    /// Parse configuration from a TOML string.
    pub fn parse(s: &str) -> Result<Self, NodeError> {
        toml::from_str(s).map_err(|e| NodeError::Config(format!("failed to parse config: {e}")))
    }

    /// This router's name prefix.
    pub fn router_prefix(&self) -> Result<RouterName, NodeError> {
        if self.router.prefix.is_empty() {
            return Err(NodeError::Config("router.prefix is required".to_string()));
        }
        Ok(RouterName::from_uri(&self.router.prefix)?)
    }

    /// The hello protocol parameters, validated.
    pub fn hello_config(&self) -> Result<HelloConfig, NodeError> {
        if self.hello.info_interest_interval == 0 {
            return Err(NodeError::Config(
                "hello.info_interest_interval must be at least 1 second".to_string(),
            ));
        }
        if self.hello.interest_resend_time == 0 {
            return Err(NodeError::Config(
                "hello.interest_resend_time must be at least 1 second".to_string(),
            ));
        }
        if self.hello.interest_retry_number == 0 {
            return Err(NodeError::Config(
                "hello.interest_retry_number must be at least 1".to_string(),
            ));
        }
        Ok(HelloConfig {
            router_prefix: self.router_prefix()?,
            probe_interval: Duration::from_secs(self.hello.info_interest_interval),
            probe_lifetime: Duration::from_secs(self.hello.interest_resend_time),
            retry_limit: self.hello.interest_retry_number,
            hyperbolic_routing: self.routing.hyperbolic,
        })
    }

    /// The configured neighbor set.
    pub fn adjacency_list(&self) -> Result<AdjacencyList, NodeError> {
        let mut list = AdjacencyList::new();
        for entry in &self.neighbors {
            if entry.cost <= 0.0 {
                return Err(NodeError::Config(format!(
                    "neighbor {} has non-positive cost {}",
                    entry.name, entry.cost
                )));
            }
            let name = RouterName::from_uri(&entry.name)?;
            list.insert(Adjacency::new(name, entry.face_id, entry.cost));
        }
        Ok(list)
    }

    pub fn cost_weights(&self) -> CostWeights {
        CostWeights {
            rtt: self.routing.rtt_weight,
            load: self.routing.load_weight,
            stability: self.routing.stability_weight,
        }
    }

    /// Which cost calculator to install into the link-cost manager.
    pub fn calculator_kind(&self) -> Result<CalculatorKind, NodeError> {
        match self.routing.cost_calculator.as_str() {
            "load-aware" | "load_aware" => Ok(CalculatorKind::LoadAware),
            "ml-adaptive" | "ml_adaptive" | "ml" => Ok(CalculatorKind::MlAdaptive),
            "none" | "baseline" => Ok(CalculatorKind::None),
            other => Err(NodeError::Config(format!(
                "unknown cost calculator: {other}"
            ))),
        }
    }
}

/// Which cost calculator the node installs at startup.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CalculatorKind {
    LoadAware,
    MlAdaptive,
    None,
}

/// The `[router]` section.
#[derive(Debug, Default, Deserialize)]
pub struct RouterSection {
    /// This router's name, e.g. `/ndn/edu/site/router-a`.
    #[serde(default)]
    pub prefix: String,
}

/// The `[hello]` section.
#[derive(Debug, Deserialize)]
pub struct HelloSection {
    /// Seconds between periodic probes toward each neighbor.
    #[serde(default = "default_info_interest_interval")]
    pub info_interest_interval: u64,
    /// Probe lifetime in seconds.
    #[serde(default = "default_interest_resend_time")]
    pub interest_resend_time: u64,
    /// Timeouts before an active neighbor is declared inactive.
    #[serde(default = "default_interest_retry_number")]
    pub interest_retry_number: u32,
}

fn default_info_interest_interval() -> u64 {
    60
}

fn default_interest_resend_time() -> u64 {
    15
}

fn default_interest_retry_number() -> u32 {
    3
}

impl Default for HelloSection {
    fn default() -> Self {
        Self {
            info_interest_interval: default_info_interest_interval(),
            interest_resend_time: default_interest_resend_time(),
            interest_retry_number: default_interest_retry_number(),
        }
    }
}

/// The `[routing]` section.
#[derive(Debug, Deserialize)]
pub struct RoutingSection {
    /// Hyperbolic routing selects the route-recalculation reconvergence hook.
    #[serde(default)]
    pub hyperbolic: bool,
    /// "load-aware", "ml-adaptive", or "none".
    #[serde(default = "default_cost_calculator")]
    pub cost_calculator: String,
    #[serde(default = "default_rtt_weight")]
    pub rtt_weight: f64,
    #[serde(default = "default_load_weight")]
    pub load_weight: f64,
    #[serde(default = "default_stability_weight")]
    pub stability_weight: f64,
}

fn default_cost_calculator() -> String {
    "load-aware".to_string()
}

fn default_rtt_weight() -> f64 {
    0.3
}

fn default_load_weight() -> f64 {
    0.4
}

fn default_stability_weight() -> f64 {
    0.3
}

impl Default for RoutingSection {
    fn default() -> Self {
        Self {
            hyperbolic: false,
            cost_calculator: default_cost_calculator(),
            rtt_weight: default_rtt_weight(),
            load_weight: default_load_weight(),
            stability_weight: default_stability_weight(),
        }
    }
}

/// The `[logging]` section.
#[derive(Debug, Deserialize)]
pub struct LoggingSection {
    #[serde(default = "default_log_level")]
    pub level: String,
}

fn default_log_level() -> String {
    "info".to_string()
}

impl Default for LoggingSection {
    fn default() -> Self {
        Self {
            level: default_log_level(),
        }
    }
}

/// The `[signing]` section.
#[derive(Debug, Default, Deserialize)]
pub struct SigningSection {
    /// Hex-encoded 32-byte Ed25519 seed. An ephemeral key is generated when
    /// absent.
    pub private_key: Option<String>,
}

/// The `[faces]` section.
#[derive(Debug, Default, Deserialize)]
pub struct FacesSection {
    #[serde(default)]
    pub udp: Vec<UdpFaceEntry>,
}

/// A `[[faces.udp]]` entry.
#[derive(Debug, Deserialize)]
pub struct UdpFaceEntry {
    /// Face id neighbors reference; must be nonzero.
    pub id: u64,
    pub name: String,
    pub bind: String,
    pub target: String,
}

/// A `[[neighbors]]` entry.
#[derive(Debug, Deserialize)]
pub struct NeighborEntry {
    /// The neighbor's router name.
    pub name: String,
    /// Face the neighbor is reachable through; 0 leaves it unbound.
    #[serde(default)]
    pub face_id: u64,
    /// Administrative link cost.
    #[serde(default = "default_link_cost")]
    pub cost: f64,
    /// Hex-encoded Ed25519 public key used to validate this neighbor's
    /// replies. When no neighbor has a key, validation accepts everything.
    pub public_key: Option<String>,
}

fn default_link_cost() -> f64 {
    10.0
}

/// Parse a socket address string like "0.0.0.0:6363".
pub fn parse_socket_addr(s: &str) -> Result<SocketAddr, NodeError> {
    s.parse()
        .map_err(|e| NodeError::Config(format!("invalid socket address '{s}': {e}")))
}

/// Parse a hex-encoded 32-byte key.
pub fn parse_key_bytes(s: &str) -> Result<[u8; 32], NodeError> {
    let bytes =
        hex::decode(s).map_err(|e| NodeError::Config(format!("invalid hex key: {e}")))?;
    bytes.try_into().map_err(|bytes: Vec<u8>| {
        NodeError::Config(format!("key must be 32 bytes, got {}", bytes.len()))
    })
}
