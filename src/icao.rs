//! ICAO address cache
//!
//! The framing criterion of this demodulator is "CRC plus a sender we
//! believe". This cache is that belief: a direct-mapped table over the low
//! 16 bits of the 27-bit address+CA, each entry carrying an alive countdown
//! and a trusted countdown in seconds. DF11 all-calls put an address into
//! the table (observed), a self-checked extended squitter promotes it to
//! trusted, and address-parity messages are only emitted while the entry
//! lives. A 16-bit collision simply evicts; the loser reappears on its next
//! all-call.
//!
//! Aging is spread over the sample clock: one microsecond of stream time
//! ages at most one slot, so every entry is visited exactly once per second
//! and the hot loop never scans the table.

/// Table size: 2^16 direct-mapped slots.
pub const CACHE_SIZE: usize = 1 << 16;

/// Seconds an entry stays alive after it was last seen.
pub const TTL_ALIVE: u8 = 10;

/// Seconds an entry stays trusted after its last self-checked message.
pub const TTL_TRUSTED: u8 = 30;

/// Ticks of the aging counter per second (the slot rate is 1 MHz).
const TICKS_PER_SECOND: u32 = 1_000_000;

/// Largest accepted jump of the raw 13-bit altitude code between
/// consecutive messages of one transponder.
const ALTITUDE_MAX_DELTA: u16 = 80;

const EMPTY: u32 = u32::MAX;

/// Index of a live cache entry, only obtainable from `find*`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Slot(u16);

pub struct IcaoCache {
    /// 27-bit address+CA per slot, `EMPTY` when vacant.
    icao: Vec<u32>,
    ttl: Vec<u8>,
    ttl_trusted: Vec<u8>,
    /// Last seen raw 13-bit identity code and its confirmation count.
    squawk: Vec<u16>,
    squawk_hits: Vec<u8>,
    /// Last seen raw 13-bit altitude code and its confirmation count.
    altitude: Vec<u16>,
    altitude_hits: Vec<u8>,
    /// Aging cursor, microseconds within the current second.
    t_us: u32,
}

impl IcaoCache {
    pub fn new() -> Self {
        Self {
            icao: vec![EMPTY; CACHE_SIZE],
            ttl: vec![0; CACHE_SIZE],
            ttl_trusted: vec![0; CACHE_SIZE],
            squawk: vec![0; CACHE_SIZE],
            squawk_hits: vec![0; CACHE_SIZE],
            altitude: vec![0; CACHE_SIZE],
            altitude_hits: vec![0; CACHE_SIZE],
            t_us: 0,
        }
    }

    #[inline]
    fn key(v: u32) -> usize {
        (v & 0xFFFF) as usize
    }

    /// Exact 27-bit address+CA match.
    pub fn find_with_ca(&self, icao_ca: u32) -> Option<Slot> {
        let k = Self::key(icao_ca);
        if self.icao[k] == icao_ca && self.ttl[k] > 0 {
            Some(Slot(k as u16))
        } else {
            None
        }
    }

    /// 24-bit address match, ignoring the stored CA bits. This is the
    /// lookup used when the residue of an address-parity frame is taken as
    /// the sender's address.
    pub fn find(&self, icao: u32) -> Option<Slot> {
        let k = Self::key(icao);
        if self.icao[k] != EMPTY && (self.icao[k] & 0xFF_FFFF) == icao && self.ttl[k] > 0 {
            Some(Slot(k as u16))
        } else {
            None
        }
    }

    /// Insert (or evict-and-replace) an observed address. The entry starts
    /// alive but untrusted, with no confirmed squawk or altitude.
    pub fn insert_with_ca(&mut self, icao_ca: u32) {
        let k = Self::key(icao_ca);
        self.icao[k] = icao_ca;
        self.ttl[k] = TTL_ALIVE;
        self.ttl_trusted[k] = 0;
        self.squawk[k] = 0;
        self.squawk_hits[k] = 0;
        self.altitude[k] = 0;
        self.altitude_hits[k] = 0;
    }

    /// Refresh the alive countdown.
    pub fn mark_as_seen(&mut self, s: Slot) {
        self.ttl[s.0 as usize] = TTL_ALIVE;
    }

    /// Refresh both countdowns; only self-checked messages call this.
    pub fn mark_as_trusted_seen(&mut self, s: Slot) {
        self.ttl[s.0 as usize] = TTL_ALIVE;
        self.ttl_trusted[s.0 as usize] = TTL_TRUSTED;
    }

    pub fn is_trusted(&self, s: Slot) -> bool {
        self.ttl_trusted[s.0 as usize] > 0
    }

    pub fn is_alive(&self, s: Slot) -> bool {
        self.ttl[s.0 as usize] > 0
    }

    /// Advance one microsecond of stream time. The first 2^16 microseconds
    /// of every second each age one slot; when the alive countdown reaches
    /// zero the entry is cleared.
    pub fn tick(&mut self) {
        let t = self.t_us;
        self.t_us += 1;
        if self.t_us == TICKS_PER_SECOND {
            self.t_us = 0;
        }
        if (t as usize) < CACHE_SIZE {
            self.age(t as usize);
        }
    }

    fn age(&mut self, k: usize) {
        if self.ttl[k] == 0 {
            return;
        }
        self.ttl_trusted[k] = self.ttl_trusted[k].saturating_sub(1);
        self.ttl[k] -= 1;
        if self.ttl[k] == 0 {
            self.icao[k] = EMPTY;
            self.ttl_trusted[k] = 0;
            self.squawk[k] = 0;
            self.squawk_hits[k] = 0;
            self.altitude[k] = 0;
            self.altitude_hits[k] = 0;
        }
    }

    /// Squawk plausibility for DF5/DF21: a code is emitted only once it has
    /// been seen twice in a row for this entry. A zero code carries no
    /// identity and passes unchecked; a mismatch reseeds silently.
    pub fn check_squawk(&mut self, s: Slot, code: u16) -> bool {
        if code == 0 {
            return true;
        }
        let k = s.0 as usize;
        if self.squawk[k] == code {
            self.squawk_hits[k] = self.squawk_hits[k].saturating_add(1);
            true
        } else {
            self.squawk[k] = code;
            self.squawk_hits[k] = 0;
            false
        }
    }

    /// Altitude plausibility for DF0/DF4/DF20: accepted while the raw
    /// 13-bit code moves at most `ALTITUDE_MAX_DELTA` between messages;
    /// the first observation only seeds the entry.
    pub fn check_altitude(&mut self, s: Slot, code: u16) -> bool {
        if code == 0 {
            return true;
        }
        let k = s.0 as usize;
        if self.altitude[k] != 0 && self.altitude[k].abs_diff(code) <= ALTITUDE_MAX_DELTA {
            self.altitude[k] = code;
            self.altitude_hits[k] = self.altitude_hits[k].saturating_add(1);
            true
        } else {
            self.altitude[k] = code;
            self.altitude_hits[k] = 0;
            false
        }
    }
}

impl Default for IcaoCache {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const ICAO_CA: u32 = (5 << 24) | 0x4840D6;

    /// Advance the cache by whole seconds of stream time.
    fn advance_seconds(cache: &mut IcaoCache, secs: u32) {
        for _ in 0..secs * TICKS_PER_SECOND {
            cache.tick();
        }
    }

    #[test]
    fn insert_find_and_evict() {
        let mut cache = IcaoCache::new();
        assert!(cache.find_with_ca(ICAO_CA).is_none());

        cache.insert_with_ca(ICAO_CA);
        let s = cache.find_with_ca(ICAO_CA).expect("inserted");
        assert!(cache.is_alive(s));
        assert!(!cache.is_trusted(s));
        assert!(cache.find(0x4840D6).is_some());

        // a different CA is a different 27-bit identity
        assert!(cache.find_with_ca(0x4840D6).is_none());

        // colliding low 16 bits evict the previous occupant
        let other = (1 << 24) | 0x7740D6;
        cache.insert_with_ca(other);
        assert!(cache.find_with_ca(ICAO_CA).is_none());
        assert!(cache.find_with_ca(other).is_some());
    }

    #[test]
    fn trusted_implies_alive() {
        let mut cache = IcaoCache::new();
        cache.insert_with_ca(ICAO_CA);
        let s = cache.find_with_ca(ICAO_CA).expect("inserted");
        cache.mark_as_trusted_seen(s);
        for _ in 0..40 {
            if cache.find_with_ca(ICAO_CA).is_none() {
                break;
            }
            let s = cache.find_with_ca(ICAO_CA).expect("alive");
            if cache.is_trusted(s) {
                assert!(cache.is_alive(s));
            }
            advance_seconds(&mut cache, 1);
        }
    }

    #[test]
    fn alive_countdown_clears_the_entry() {
        let mut cache = IcaoCache::new();
        cache.insert_with_ca(ICAO_CA);
        advance_seconds(&mut cache, TTL_ALIVE as u32 - 1);
        assert!(cache.find_with_ca(ICAO_CA).is_some());
        advance_seconds(&mut cache, 1);
        assert!(cache.find_with_ca(ICAO_CA).is_none());
    }

    #[test]
    fn trust_decays_before_aliveness_when_refreshed() {
        let mut cache = IcaoCache::new();
        cache.insert_with_ca(ICAO_CA);
        let s = cache.find_with_ca(ICAO_CA).expect("inserted");
        cache.mark_as_trusted_seen(s);

        // keep the entry alive without re-trusting it
        for _ in 0..TTL_TRUSTED {
            let s = cache.find_with_ca(ICAO_CA).expect("alive");
            cache.mark_as_seen(s);
            advance_seconds(&mut cache, 1);
        }
        let s = cache.find_with_ca(ICAO_CA).expect("still alive");
        assert!(!cache.is_trusted(s));
    }

    #[test]
    fn exactly_one_aging_pass_per_second() {
        let mut cache = IcaoCache::new();
        cache.insert_with_ca(ICAO_CA);
        let k = (ICAO_CA & 0xFFFF) as usize;
        let before = cache.ttl[k];
        advance_seconds(&mut cache, 1);
        assert_eq!(cache.ttl[k], before - 1);
    }

    #[test]
    fn squawk_needs_two_consistent_observations() {
        let mut cache = IcaoCache::new();
        cache.insert_with_ca(ICAO_CA);
        let s = cache.find_with_ca(ICAO_CA).expect("inserted");
        assert!(!cache.check_squawk(s, 0x0655)); // seed
        assert!(cache.check_squawk(s, 0x0655)); // confirm
        assert!(!cache.check_squawk(s, 0x1200)); // change reseeds
        assert!(cache.check_squawk(s, 0x1200));
    }

    #[test]
    fn altitude_accepts_small_steps_only() {
        let mut cache = IcaoCache::new();
        cache.insert_with_ca(ICAO_CA);
        let s = cache.find_with_ca(ICAO_CA).expect("inserted");
        assert!(!cache.check_altitude(s, 1000)); // seed
        assert!(cache.check_altitude(s, 1040)); // climbing
        assert!(cache.check_altitude(s, 1040 + 80)); // at the limit
        assert!(!cache.check_altitude(s, 4000)); // implausible jump reseeds
        assert!(cache.check_altitude(s, 4010));
    }

    #[test]
    fn zero_codes_pass_unchecked() {
        let mut cache = IcaoCache::new();
        cache.insert_with_ca(ICAO_CA);
        let s = cache.find_with_ca(ICAO_CA).expect("inserted");
        assert!(cache.check_squawk(s, 0));
        assert!(cache.check_altitude(s, 0));
    }

    #[test]
    fn reinsert_resets_trust_and_confirmations() {
        let mut cache = IcaoCache::new();
        cache.insert_with_ca(ICAO_CA);
        let s = cache.find_with_ca(ICAO_CA).expect("inserted");
        cache.mark_as_trusted_seen(s);
        assert!(!cache.check_squawk(s, 0x0655));
        assert!(cache.check_squawk(s, 0x0655));

        cache.insert_with_ca(ICAO_CA);
        let s = cache.find_with_ca(ICAO_CA).expect("reinserted");
        assert!(!cache.is_trusted(s));
        assert!(!cache.check_squawk(s, 0x0655));
    }
}
