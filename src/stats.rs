//! Lock-free counter bank addressable by field name, with a JSON
//! projection for the status endpoint.

use std::sync::atomic::{AtomicI64, AtomicU64, Ordering};

use serde::Serialize;

/// Request "kind" used to index the per-kind counters.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Kind {
    Info,
    Status,
    Put,
    Get,
    Head,
    Delete,
    List,
    Other,
}

impl Kind {
    fn index(self) -> usize {
        match self {
            Kind::Info => 0,
            Kind::Status => 1,
            Kind::Put => 2,
            Kind::Get => 3,
            Kind::Head => 4,
            Kind::Delete => 5,
            Kind::List => 6,
            Kind::Other => 7,
        }
    }

    fn name(self) -> &'static str {
        match self {
            Kind::Info => "info",
            Kind::Status => "status",
            Kind::Put => "put",
            Kind::Get => "get",
            Kind::Head => "head",
            Kind::Delete => "delete",
            Kind::List => "list",
            Kind::Other => "other",
        }
    }

    const COUNT: usize = 8;
}

/// Response codes with a dedicated histogram bucket; anything else
/// falls into `c_50X`.
const KNOWN_CODES: [u16; 15] = [
    200, 201, 204, 206, 400, 403, 404, 405, 408, 409, 418, 499, 502, 503, 0,
];

fn code_index(code: u16) -> usize {
    KNOWN_CODES[..KNOWN_CODES.len() - 1]
        .iter()
        .position(|&c| c == code)
        .unwrap_or(KNOWN_CODES.len() - 1)
}

fn code_label(i: usize) -> String {
    if i == KNOWN_CODES.len() - 1 {
        "50X".to_string()
    } else {
        KNOWN_CODES[i].to_string()
    }
}

/// Process-wide atomic counter bank. Every field is a plain `AtomicU64`;
/// increments are independent and unordered with respect to each other,
/// so a JSON snapshot is consistent per field, not atomic as a whole.
#[derive(Debug, Default)]
pub struct Stats {
    bytes_in: AtomicU64,
    bytes_out: AtomicU64,
    handled: [AtomicU64; Kind::COUNT],
    micros: [AtomicU64; Kind::COUNT],
    codes: [AtomicU64; KNOWN_CODES.len()],
    /// Concurrent connections currently being header-parsed, i.e. between
    /// accept and handoff to an executor lane. `workers_ingress` bounds
    /// this only as a soft, observed-not-enforced gauge — never part of
    /// the `/v1/status` JSON projection, since that key set is fixed.
    ingress_inflight: AtomicI64,
}

impl Stats {
    pub fn new() -> Self {
        Stats::default()
    }

    /// Marks one more connection entering header-parse. Returns the new
    /// in-flight count.
    pub fn ingress_enter(&self) -> i64 {
        self.ingress_inflight.fetch_add(1, Ordering::Relaxed) + 1
    }

    pub fn ingress_exit(&self) {
        self.ingress_inflight.fetch_sub(1, Ordering::Relaxed);
    }

    pub fn ingress_gauge(&self) -> i64 {
        self.ingress_inflight.load(Ordering::Relaxed)
    }

    pub fn add_bytes_in(&self, n: u64) {
        self.bytes_in.fetch_add(n, Ordering::Relaxed);
    }

    pub fn add_bytes_out(&self, n: u64) {
        self.bytes_out.fetch_add(n, Ordering::Relaxed);
    }

    /// Records the completion of one request of the given `kind`,
    /// including its handler duration and final status code. Exactly
    /// one of `c_<code>`/`c_50X` is incremented.
    pub fn record(&self, kind: Kind, elapsed_micros: u64, status_code: u16) {
        self.handled[kind.index()].fetch_add(1, Ordering::Relaxed);
        self.micros[kind.index()].fetch_add(elapsed_micros, Ordering::Relaxed);
        self.codes[code_index(status_code)].fetch_add(1, Ordering::Relaxed);
    }

    /// Snapshots every counter into a serializable projection keyed by
    /// the exact field names the status endpoint exposes.
    pub fn snapshot(&self) -> StatsSnapshot {
        let mut fields = std::collections::BTreeMap::new();
        fields.insert("b_in".to_string(), self.bytes_in.load(Ordering::Relaxed));
        fields.insert("b_out".to_string(), self.bytes_out.load(Ordering::Relaxed));
        for kind in [
            Kind::Info,
            Kind::Status,
            Kind::Put,
            Kind::Get,
            Kind::Head,
            Kind::Delete,
            Kind::List,
            Kind::Other,
        ] {
            fields.insert(format!("h_{}", kind.name()), self.handled[kind.index()].load(Ordering::Relaxed));
            fields.insert(format!("t_{}", kind.name()), self.micros[kind.index()].load(Ordering::Relaxed));
        }
        for (i, counter) in self.codes.iter().enumerate() {
            fields.insert(format!("c_{}", code_label(i)), counter.load(Ordering::Relaxed));
        }
        StatsSnapshot(fields)
    }
}

/// A point-in-time read of every counter, ready to serialize as the
/// `/v1/status` JSON body.
#[derive(Debug, Serialize)]
pub struct StatsSnapshot(std::collections::BTreeMap<String, u64>);

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unknown_code_falls_into_50x() {
        let stats = Stats::new();
        stats.record(Kind::Get, 10, 555);
        let snap = stats.snapshot();
        assert_eq!(snap.0["c_50X"], 1);
    }

    #[test]
    fn each_kind_has_its_own_bucket() {
        let stats = Stats::new();
        stats.record(Kind::Put, 5, 201);
        stats.record(Kind::Get, 3, 200);
        let snap = stats.snapshot();
        assert_eq!(snap.0["h_put"], 1);
        assert_eq!(snap.0["h_get"], 1);
        assert_eq!(snap.0["t_put"], 5);
        assert_eq!(snap.0["c_201"], 1);
        assert_eq!(snap.0["c_200"], 1);
    }

    #[test]
    fn bytes_accumulate() {
        let stats = Stats::new();
        stats.add_bytes_in(100);
        stats.add_bytes_in(50);
        stats.add_bytes_out(7);
        let snap = stats.snapshot();
        assert_eq!(snap.0["b_in"], 150);
        assert_eq!(snap.0["b_out"], 7);
    }

    #[test]
    fn ingress_gauge_tracks_enter_and_exit() {
        let stats = Stats::new();
        assert_eq!(stats.ingress_enter(), 1);
        assert_eq!(stats.ingress_enter(), 2);
        assert_eq!(stats.ingress_gauge(), 2);
        stats.ingress_exit();
        assert_eq!(stats.ingress_gauge(), 1);
    }

    #[test]
    fn key_set_matches_expected_shape() {
        let stats = Stats::new();
        let snap = stats.snapshot();
        assert!(snap.0.contains_key("b_in"));
        assert!(snap.0.contains_key("b_out"));
        assert!(snap.0.contains_key("h_other"));
        assert!(snap.0.contains_key("t_list"));
        assert!(snap.0.contains_key("c_418"));
        assert!(snap.0.contains_key("c_50X"));
        assert_eq!(snap.0.len(), 2 + Kind::COUNT * 2 + KNOWN_CODES.len());
    }
}
