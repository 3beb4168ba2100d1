//! The adjacency list: configured neighbors and their liveness state.

use std::collections::BTreeMap;
use std::time::{Duration, Instant};

use namelink_core::RouterName;

/// Liveness status of a configured neighbor.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Status {
    Active,
    #[default]
    Inactive,
}

/// One configured neighbor and its mutable liveness state.
#[derive(Debug, Clone)]
pub struct Adjacency {
    name: RouterName,
    /// Face the neighbor is reachable through; `0` means no face bound yet.
    pub face_id: u64,
    /// Configured link cost toward this neighbor.
    pub cost: f64,
    pub status: Status,
    /// Consecutive probe timeouts since the last validated response.
    pub timed_out_count: u32,
    /// Telemetry: when the last validated response arrived.
    pub last_success: Option<Instant>,
    /// Telemetry: round-trip time of the last validated response.
    pub last_rtt: Option<Duration>,
}

impl Adjacency {
    pub fn new(name: RouterName, face_id: u64, cost: f64) -> Self {
        Self {
            name,
            face_id,
            cost,
            status: Status::Inactive,
            timed_out_count: 0,
            last_success: None,
            last_rtt: None,
        }
    }

    pub fn name(&self) -> &RouterName {
        &self.name
    }

    pub fn has_face(&self) -> bool {
        self.face_id != 0
    }
}

/// Registry of configured neighbors, keyed by exact router name.
///
/// Populated once from configuration; neighbors are not added or removed at
/// runtime. Iteration order is the name order, which keeps probe scheduling
/// deterministic. Mutating operations silently ignore unknown names.
#[derive(Debug, Default)]
#[must_use]
pub struct AdjacencyList {
    entries: BTreeMap<RouterName, Adjacency>,
}

impl AdjacencyList {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert a neighbor, replacing any previous entry with the same name.
    pub fn insert(&mut self, adjacency: Adjacency) {
        self.entries.insert(adjacency.name.clone(), adjacency);
    }

    #[must_use]
    pub fn find(&self, name: &RouterName) -> Option<&Adjacency> {
        self.entries.get(name)
    }

    pub fn find_mut(&mut self, name: &RouterName) -> Option<&mut Adjacency> {
        self.entries.get_mut(name)
    }

    #[must_use]
    pub fn is_neighbor(&self, name: &RouterName) -> bool {
        self.entries.contains_key(name)
    }

    /// The neighbor's status, defaulting to `Inactive` for unknown names.
    #[must_use]
    pub fn status_of(&self, name: &RouterName) -> Status {
        self.entries.get(name).map_or(Status::Inactive, |a| a.status)
    }

    pub fn set_status(&mut self, name: &RouterName, status: Status) {
        if let Some(adjacency) = self.entries.get_mut(name) {
            adjacency.status = status;
        }
    }

    #[must_use]
    pub fn timed_out_count(&self, name: &RouterName) -> u32 {
        self.entries.get(name).map_or(0, |a| a.timed_out_count)
    }

    pub fn increment_timeouts(&mut self, name: &RouterName) {
        if let Some(adjacency) = self.entries.get_mut(name) {
            adjacency.timed_out_count = adjacency.timed_out_count.saturating_add(1);
        }
    }

    pub fn set_timeouts(&mut self, name: &RouterName, count: u32) {
        if let Some(adjacency) = self.entries.get_mut(name) {
            adjacency.timed_out_count = count;
        }
    }

    /// Record a validated response: success instant and measured RTT.
    pub fn note_success(&mut self, name: &RouterName, now: Instant, rtt: Option<Duration>) {
        if let Some(adjacency) = self.entries.get_mut(name) {
            adjacency.last_success = Some(now);
            if rtt.is_some() {
                adjacency.last_rtt = rtt;
            }
        }
    }

    /// Bind or clear the face toward a neighbor.
    pub fn set_face_id(&mut self, name: &RouterName, face_id: u64) {
        if let Some(adjacency) = self.entries.get_mut(name) {
            adjacency.face_id = face_id;
        }
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Adjacency> {
        self.entries.values()
    }

    /// All neighbor names in deterministic order.
    #[must_use]
    pub fn names(&self) -> Vec<RouterName> {
        self.entries.keys().cloned().collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn name(uri: &str) -> RouterName {
        RouterName::from_uri(uri).unwrap()
    }

    fn make_list() -> AdjacencyList {
        let mut list = AdjacencyList::new();
        list.insert(Adjacency::new(name("/site/b"), 7, 25.0));
        list.insert(Adjacency::new(name("/site/c"), 0, 10.0));
        list
    }

    #[test]
    fn find_and_is_neighbor() {
        let list = make_list();
        assert!(list.is_neighbor(&name("/site/b")));
        assert!(!list.is_neighbor(&name("/site/x")));
        assert_eq!(list.find(&name("/site/b")).unwrap().face_id, 7);
        assert!(list.find(&name("/site/x")).is_none());
    }

    #[test]
    fn new_adjacency_starts_inactive_with_zero_timeouts() {
        let list = make_list();
        let adjacency = list.find(&name("/site/b")).unwrap();
        assert_eq!(adjacency.status, Status::Inactive);
        assert_eq!(adjacency.timed_out_count, 0);
        assert!(adjacency.last_success.is_none());
    }

    #[test]
    fn status_of_unknown_defaults_to_inactive() {
        let list = make_list();
        assert_eq!(list.status_of(&name("/site/x")), Status::Inactive);
    }

    #[test]
    fn set_status_and_timeouts() {
        let mut list = make_list();
        let b = name("/site/b");
        list.set_status(&b, Status::Active);
        assert_eq!(list.status_of(&b), Status::Active);

        list.increment_timeouts(&b);
        list.increment_timeouts(&b);
        assert_eq!(list.timed_out_count(&b), 2);

        list.set_timeouts(&b, 0);
        assert_eq!(list.timed_out_count(&b), 0);
    }

    #[test]
    fn mutations_on_unknown_names_are_ignored() {
        let mut list = make_list();
        let x = name("/site/x");
        list.set_status(&x, Status::Active);
        list.increment_timeouts(&x);
        list.set_timeouts(&x, 5);
        list.set_face_id(&x, 9);
        assert!(!list.is_neighbor(&x));
        assert_eq!(list.timed_out_count(&x), 0);
    }

    #[test]
    fn has_face_is_nonzero_face_id() {
        let list = make_list();
        assert!(list.find(&name("/site/b")).unwrap().has_face());
        assert!(!list.find(&name("/site/c")).unwrap().has_face());
    }

    #[test]
    fn note_success_updates_telemetry() {
        let mut list = make_list();
        let b = name("/site/b");
        let t0 = Instant::now();
        list.note_success(&b, t0, Some(Duration::from_millis(12)));
        let adjacency = list.find(&b).unwrap();
        assert_eq!(adjacency.last_success, Some(t0));
        assert_eq!(adjacency.last_rtt, Some(Duration::from_millis(12)));

        // A success without an RTT sample keeps the previous RTT.
        list.note_success(&b, t0 + Duration::from_secs(1), None);
        let adjacency = list.find(&b).unwrap();
        assert_eq!(adjacency.last_rtt, Some(Duration::from_millis(12)));
    }

    #[test]
    fn names_are_in_deterministic_order() {
        let list = make_list();
        assert_eq!(list.names(), vec![name("/site/b"), name("/site/c")]);
    }
}
