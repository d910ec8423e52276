//! Demodulator core
//!
//! No preamble search happens anywhere in this crate. Every slot, each of
//! the N phase streams shifts one freshly sliced bit into its register set,
//! and the core asks a single question per stream: do the low 56 or 112
//! bits, together with their running CRC residue and the cached set of
//! believed senders, form a message right now?
//!
//! Dispatch is by downlink format. Extended squitters check themselves
//! (residue zero) and are the only path that makes an address trusted.
//! Address-parity formats are believed when their residue names a cached,
//! living address — plus a squawk/altitude plausibility check against the
//! entry, which stops single-message aliases on the 16-bit hash. Broken
//! frames get one table lookup against the residue-indexed fix tables, never
//! a search.

use crossbeam_channel::Sender;

use crate::bits::Bits128;
use crate::fix_table::FixTable;
use crate::icao::IcaoCache;
use crate::modes;
use crate::registers::RegisterBank;
use crate::stats::Stats;

/// A framed message on its way to the output writer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DetectedFrame {
    /// 56-bit frame in the low bits, timestamp in 12 MHz ticks.
    Short { frame: u64, t12: u64 },
    /// 112-bit frame, timestamp in 12 MHz ticks.
    Long { frame: Bits128, t12: u64 },
}

/// Tunables that survive into the hot loop.
#[derive(Debug, Clone)]
pub struct DemodOptions {
    /// Accept a DF11 with a broken, unrepairable parity block from an
    /// already-trusted sender by folding the residue back into the parity
    /// bits. The one trust-elevating shortcut; can be switched off.
    pub df11_trust_elevation: bool,
    /// Periodically report counters through the log.
    pub stats: bool,
}

impl Default for DemodOptions {
    fn default() -> Self {
        Self {
            df11_trust_elevation: true,
            stats: false,
        }
    }
}

pub struct DemodCore<B: RegisterBank> {
    bank: B,
    num_streams: usize,
    cache: IcaoCache,
    long_table: FixTable,
    short_table: FixTable,
    stats: Stats,
    df11_trust_elevation: bool,
    tx: Sender<DetectedFrame>,

    // What the previous stream held one slot ago. Neighbouring phase
    // streams latch the same content when the true phase falls between two
    // grid positions; equality here means the work is already done.
    prev_frame_long: Bits128,
    prev_crc_112: u32,
    prev_frame_short: u64,
    prev_crc_56: u32,

    // Last frames emitted, for collapsing duplicates across streams.
    prev_long_sent: Bits128,
    prev_long_sent_slot: u64,
    prev_short_sent: u64,
    prev_short_sent_slot: u64,

    /// Bit slots consumed so far, N per outer sample step.
    curr_slot: u64,
}

#[cfg(test)]
impl<B: RegisterBank> DemodCore<B> {
    /// Fast-forward stream time with an idle signal: only the cache ages.
    fn advance_stream_seconds(&mut self, secs: u32) {
        for _ in 0..secs as u64 * 1_000_000 {
            self.cache.tick();
            self.curr_slot += self.num_streams as u64;
        }
    }
}

impl<B: RegisterBank> DemodCore<B> {
    pub fn new(num_streams: usize, tx: Sender<DetectedFrame>, options: DemodOptions) -> Self {
        Self {
            bank: B::new(num_streams),
            num_streams,
            cache: IcaoCache::new(),
            long_table: FixTable::long(),
            short_table: FixTable::short(),
            stats: Stats::new(options.stats),
            df11_trust_elevation: options.df11_trust_elevation,
            tx,
            prev_frame_long: Bits128::ZERO,
            prev_crc_112: 0,
            prev_frame_short: 0,
            prev_crc_56: 0,
            prev_long_sent: Bits128::ZERO,
            prev_long_sent_slot: 0,
            prev_short_sent: 0,
            prev_short_sent_slot: 0,
            curr_slot: 0,
        }
    }

    pub fn stats(&self) -> &Stats {
        &self.stats
    }

    /// Current stream time rescaled to 12 MHz, truncating.
    #[inline]
    fn t12(&self) -> u64 {
        self.curr_slot * 12 / self.num_streams as u64
    }

    /// Advance every stream by one bit and inspect each once. `bits` holds
    /// one 0/1 value per stream. Called once per outer sample step, which
    /// is one microsecond of stream time.
    pub fn shift_in_new_bits(&mut self, bits: &[u64]) {
        debug_assert_eq!(bits.len(), self.num_streams);
        self.bank.shift_in(bits);

        for i in 0..self.num_streams {
            let found_short = self.handle_stream_short(i);
            if !found_short {
                self.handle_stream_long(i);
            }

            self.prev_frame_long = self.bank.frame_long(i);
            self.prev_crc_112 = self.bank.crc112(i);
            self.prev_frame_short = self.bank.frame_short(i);
            self.prev_crc_56 = self.bank.crc56(i);
            self.curr_slot += 1;
        }

        self.cache.tick();
        self.stats.tick_iteration();
    }

    /// Returns true if a 56-bit message went to the output; the 112-bit
    /// window of this stream is not considered in that case.
    fn handle_stream_short(&mut self, i: usize) -> bool {
        let crc = self.bank.crc56(i);
        let frame = self.bank.frame_short(i);

        // the previous stream already dealt with this content, good or bad
        if crc == self.prev_crc_56 && modes::equal_short(frame, self.prev_frame_short) {
            return false;
        }

        match self.bank.df56(i) {
            df @ (0 | 4 | 5) => self.handle_surv_short(df, crc, frame),
            11 => self.handle_df11(crc, frame),
            _ => false,
        }
    }

    fn handle_stream_long(&mut self, i: usize) -> bool {
        let crc = self.bank.crc112(i);
        let frame = self.bank.frame_long(i);

        if crc == self.prev_crc_112 && modes::equal_long(&frame, &self.prev_frame_long) {
            return false;
        }

        match self.bank.df112(i) {
            df @ (17 | 18 | 19) => self.handle_ext_squitter(df, crc, frame),
            df @ (16 | 20 | 21) => self.handle_acas_comm_b(df, crc, frame),
            _ => false,
        }
    }

    /// DF17/18/19: the parity block carries the CRC of the preceding 88
    /// bits with nothing overlaid, so the frame vouches for itself. This is
    /// the only place an address becomes trusted.
    fn handle_ext_squitter(&mut self, df: u8, crc: u32, frame: Bits128) -> bool {
        if crc == 0 {
            self.stats.es_good += 1;
            let icao_ca = modes::icao_ca_long(&frame);
            if let Some(e) = self.cache.find_with_ca(icao_ca) {
                self.cache.mark_as_trusted_seen(e);
                self.send_frame_long(df, frame);
                return true;
            }
            // first contact: remember the address, say nothing
            self.cache.insert_with_ca(icao_ca);
            return false;
        }

        self.stats.es_bad_message += 1;
        let fix = self.long_table.lookup(crc);
        if fix.is_valid() {
            let mut repaired = frame;
            fix.apply(&mut repaired);
            // repairing and taking the address on faith at the same time is
            // too dangerous; only a currently trusted sender qualifies
            let icao_ca = modes::icao_ca_long(&repaired);
            if let Some(e) = self.cache.find_with_ca(icao_ca) {
                if self.cache.is_trusted(e) {
                    self.stats.es_repair_success += 1;
                    self.cache.mark_as_seen(e);
                    self.send_frame_long(df, repaired);
                    return true;
                }
            }
        }
        self.stats.es_repair_failed += 1;
        false
    }

    /// DF16/20/21: address parity. A valid frame's residue equals the
    /// sender's ICAO address, so the residue itself is the cache lookup.
    fn handle_acas_comm_b(&mut self, df: u8, crc: u32, frame: Bits128) -> bool {
        if crc == 0 {
            return false;
        }
        let Some(e) = self.cache.find(crc) else {
            self.stats.cache_miss_dropped += 1;
            return false;
        };
        let plausible = match df {
            20 => self.cache.check_altitude(e, modes::ac13_long(&frame)),
            21 => self.cache.check_squawk(e, modes::id13_long(&frame)),
            _ => true,
        };
        if !plausible {
            self.stats.plausibility_rejected += 1;
            return false;
        }
        self.stats.surv_good += 1;
        self.cache.mark_as_seen(e);
        self.send_frame_long(df, frame);
        true
    }

    /// DF0/4/5: address parity, 56 bits.
    fn handle_surv_short(&mut self, df: u8, crc: u32, frame: u64) -> bool {
        if crc == 0 {
            return false;
        }
        let Some(e) = self.cache.find(crc) else {
            self.stats.cache_miss_dropped += 1;
            return false;
        };
        let plausible = match df {
            0 | 4 => self.cache.check_altitude(e, modes::ac13_short(frame)),
            5 => self.cache.check_squawk(e, modes::id13_short(frame)),
            _ => true,
        };
        if !plausible {
            self.stats.plausibility_rejected += 1;
            return false;
        }
        self.stats.surv_good += 1;
        self.cache.mark_as_seen(e);
        self.send_frame_short(df, frame);
        true
    }

    /// DF11 all-call replies feed the cache.
    fn handle_df11(&mut self, crc: u32, frame: u64) -> bool {
        if crc == 0 {
            self.stats.df11_good_crc += 1;
            return self.accept_df11(frame, true);
        }

        let fix = self.short_table.lookup(crc);
        if fix.is_valid() {
            let mut repaired = Bits128::from(frame);
            fix.apply(&mut repaired);
            self.stats.df11_repaired += 1;
            // a repaired all-call may be emitted for a known sender but
            // must never plant a fabricated address in the cache
            return self.accept_df11(repaired.lo & modes::SHORT_FRAME_MASK, false);
        }

        if self.df11_trust_elevation {
            // Unrepairable parity block. If the header names a sender we
            // currently trust, the only damaged data left is the parity
            // itself: fold the residue back in and pass the frame on.
            let icao_ca = modes::icao_ca_short(frame);
            if let Some(e) = self.cache.find_with_ca(icao_ca) {
                if self.cache.is_trusted(e) {
                    self.stats.df11_trust_elevated += 1;
                    self.cache.mark_as_seen(e);
                    self.send_frame_short(11, frame ^ crc as u64);
                    return true;
                }
            }
        }
        false
    }

    /// Zero-residue (or repaired) DF11: emit for a known sender, otherwise
    /// remember the address as observed.
    fn accept_df11(&mut self, frame: u64, may_insert: bool) -> bool {
        let icao_ca = modes::icao_ca_short(frame);
        match self.cache.find_with_ca(icao_ca) {
            Some(e) => {
                self.cache.mark_as_seen(e);
                self.send_frame_short(11, frame);
                true
            }
            None => {
                if may_insert {
                    self.cache.insert_with_ca(icao_ca);
                }
                false
            }
        }
    }

    fn send_frame_long(&mut self, df: u8, frame: Bits128) {
        if self.curr_slot - self.prev_long_sent_slot < self.num_streams as u64
            && modes::equal_long(&frame, &self.prev_long_sent)
        {
            self.stats.log_dup(df);
            return;
        }
        self.stats.log_sent(df);
        self.prev_long_sent = frame;
        self.prev_long_sent_slot = self.curr_slot;

        let t12 = self.t12() + B::OFFSET_MLAT_LONG;
        let _ = self.tx.send(DetectedFrame::Long { frame, t12 });
    }

    fn send_frame_short(&mut self, df: u8, frame: u64) {
        if self.curr_slot - self.prev_short_sent_slot < self.num_streams as u64
            && modes::equal_short(frame, self.prev_short_sent)
        {
            self.stats.log_dup(df);
            return;
        }
        self.stats.log_sent(df);
        self.prev_short_sent = frame;
        self.prev_short_sent_slot = self.curr_slot;

        let t12 = self.t12() + B::OFFSET_MLAT_SHORT;
        let _ = self.tx.send(DetectedFrame::Short { frame, t12 });
    }
}
