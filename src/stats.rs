//! Message statistics
//!
//! Counters for everything the demodulator decides silently: messages sent
//! per downlink format, duplicates collapsed, repairs attempted. Reported
//! through the log every few seconds of stream time and once at exit; the
//! counters themselves cost one increment on paths that are already taken.

use tracing::info;

/// Stream-time interval between periodic reports, in 1 MHz iterations.
const REPORT_INTERVAL: u64 = 5_000_000;

#[derive(Debug, Default)]
pub struct Stats {
    enabled: bool,

    /// Outer sample steps processed (1 per microsecond of stream time).
    pub iterations: u64,

    /// Messages emitted, indexed by downlink format.
    pub sent: [u64; 25],
    /// Messages suppressed as duplicates, indexed by downlink format.
    pub dups: [u64; 25],

    pub es_good: u64,
    pub es_bad_message: u64,
    pub es_repair_success: u64,
    pub es_repair_failed: u64,

    pub df11_good_crc: u64,
    pub df11_repaired: u64,
    pub df11_trust_elevated: u64,

    pub surv_good: u64,
    pub plausibility_rejected: u64,
    pub cache_miss_dropped: u64,
}

impl Stats {
    pub fn new(enabled: bool) -> Self {
        Self {
            enabled,
            ..Self::default()
        }
    }

    #[inline]
    pub fn log_sent(&mut self, df: u8) {
        self.sent[df as usize & 0x1F] += 1;
    }

    #[inline]
    pub fn log_dup(&mut self, df: u8) {
        self.dups[df as usize & 0x1F] += 1;
    }

    /// One outer sample step has completed; periodically emit a report.
    #[inline]
    pub fn tick_iteration(&mut self) {
        self.iterations += 1;
        if self.enabled && self.iterations % REPORT_INTERVAL == 0 {
            self.report("periodic");
        }
    }

    pub fn total_sent(&self) -> u64 {
        self.sent.iter().sum()
    }

    pub fn total_dups(&self) -> u64 {
        self.dups.iter().sum()
    }

    pub fn report_final(&self) {
        if self.enabled {
            self.report("final");
        }
    }

    fn report(&self, label: &str) {
        let secs = self.iterations as f64 / 1_000_000.0;
        let es_sent = self.sent[17] + self.sent[18] + self.sent[19];
        let commb_sent = self.sent[20] + self.sent[21];
        let acas_sent = self.sent[0] + self.sent[16];
        let surv_sent = self.sent[4] + self.sent[5];
        info!(
            target: "stats",
            label,
            stream_secs = secs,
            total = self.total_sent(),
            dups = self.total_dups(),
            "messages"
        );
        info!(
            target: "stats",
            adsb = es_sent,
            comm_b = commb_sent,
            acas = acas_sent,
            surv = surv_sent,
            df11 = self.sent[11],
            "by class"
        );
        info!(
            target: "stats",
            es_good = self.es_good,
            es_bad = self.es_bad_message,
            repaired = self.es_repair_success,
            repair_failed = self.es_repair_failed,
            df11_repaired = self.df11_repaired,
            df11_elevated = self.df11_trust_elevated,
            plausibility_rejected = self.plausibility_rejected,
            cache_miss = self.cache_miss_dropped,
            "decisions"
        );
    }
}
