//! Hello packet counters.

use core::fmt;

/// The hello packet kinds the engine counts.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PacketKind {
    SentHelloInterest,
    RcvHelloInterest,
    SentHelloData,
    RcvHelloData,
}

impl PacketKind {
    fn index(self) -> usize {
        match self {
            PacketKind::SentHelloInterest => 0,
            PacketKind::RcvHelloInterest => 1,
            PacketKind::SentHelloData => 2,
            PacketKind::RcvHelloData => 3,
        }
    }
}

/// Monotonic counters over hello packet kinds.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PacketCounters {
    counts: [u64; 4],
}

impl PacketCounters {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn increment(&mut self, kind: PacketKind) {
        self.counts[kind.index()] += 1;
    }

    #[must_use]
    pub fn get(&self, kind: PacketKind) -> u64 {
        self.counts[kind.index()]
    }
}

impl fmt::Display for PacketCounters {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "sent_interest={} rcv_interest={} sent_data={} rcv_data={}",
            self.get(PacketKind::SentHelloInterest),
            self.get(PacketKind::RcvHelloInterest),
            self.get(PacketKind::SentHelloData),
            self.get(PacketKind::RcvHelloData),
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn counters_start_at_zero_and_increment_independently() {
        let mut counters = PacketCounters::new();
        for kind in [
            PacketKind::SentHelloInterest,
            PacketKind::RcvHelloInterest,
            PacketKind::SentHelloData,
            PacketKind::RcvHelloData,
        ] {
            assert_eq!(counters.get(kind), 0);
        }

        counters.increment(PacketKind::SentHelloInterest);
        counters.increment(PacketKind::SentHelloInterest);
        counters.increment(PacketKind::RcvHelloData);

        assert_eq!(counters.get(PacketKind::SentHelloInterest), 2);
        assert_eq!(counters.get(PacketKind::RcvHelloInterest), 0);
        assert_eq!(counters.get(PacketKind::SentHelloData), 0);
        assert_eq!(counters.get(PacketKind::RcvHelloData), 1);
    }

    #[test]
    fn display_formats_all_four() {
        let mut counters = PacketCounters::new();
        counters.increment(PacketKind::SentHelloData);
        assert_eq!(
            counters.to_string(),
            "sent_interest=0 rcv_interest=0 sent_data=1 rcv_data=0"
        );
    }
}
