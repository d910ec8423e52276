//! Residue-driven error correction tables
//!
//! A broken frame's CRC residue identifies the damage: for every repair
//! operation of interest the residue it would produce is known up front, so
//! a lookup table keyed by `residue % size` maps straight to the bit flips
//! that undo it. The table sizes are chosen so that the enumerated families
//! hash perfectly, one op per bucket; lookup compares the full residue and
//! returns the null op on any mismatch.

use crate::crc::FixOp;

/// Bucket count for the 112-bit table. Perfect for single bits, adjacent
/// pairs, adjacent triples and the parity slide family.
pub const LONG_TABLE_SIZE: usize = 4859;

/// Bucket count for the 56-bit table: single bits and adjacent pairs.
pub const SHORT_TABLE_SIZE: usize = 469;

/// Fixed-size perfect-hash map from CRC residue to repair operation.
pub struct FixTable {
    keys: Vec<u32>,
    ops: Vec<FixOp>,
}

impl FixTable {
    fn with_size(size: usize) -> Self {
        Self {
            keys: vec![0; size],
            ops: vec![FixOp::NONE; size],
        }
    }

    /// Insert an op keyed by its own residue. Occupied buckets are left
    /// alone; the declared families are known not to collide at the chosen
    /// table sizes, which the tests pin down.
    fn insert(&mut self, op: FixOp) {
        let crc = op.crc();
        let i = crc as usize % self.keys.len();
        if self.keys[i] == 0 {
            self.keys[i] = crc;
            self.ops[i] = op;
        }
    }

    /// Return the repair for this residue, or the null op.
    #[inline]
    pub fn lookup(&self, crc: u32) -> FixOp {
        let i = crc as usize % self.keys.len();
        if self.keys[i] == crc {
            self.ops[i]
        } else {
            FixOp::NONE
        }
    }

    /// Table for 112-bit frames. The flip families leave the 5 DF bits
    /// alone: a frame whose DF is damaged was dispatched to the wrong
    /// handler to begin with and cannot be repaired here.
    pub fn long() -> Self {
        let mut table = Self::with_size(LONG_TABLE_SIZE);
        for i in 0..112 - 5 {
            table.insert(FixOp::new(0b1, i));
        }
        for i in 0..111 - 5 {
            table.insert(FixOp::new(0b11, i));
        }
        for i in 0..110 - 5 {
            table.insert(FixOp::new(0b111, i));
        }
        // 1 0000000 1 slid across the 24 parity bits
        for i in 0..16 {
            table.insert(FixOp::new(0x81, i));
        }
        table
    }

    /// Table for 56-bit frames: single bits and adjacent pairs, again
    /// excluding the DF field.
    pub fn short() -> Self {
        let mut table = Self::with_size(SHORT_TABLE_SIZE);
        for i in 0..56 - 5 {
            table.insert(FixOp::new(0b1, i));
        }
        for i in 0..55 - 5 {
            table.insert(FixOp::new(0b11, i));
        }
        table
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bits::Bits128;
    use crate::crc;

    fn long_family() -> Vec<FixOp> {
        let mut ops = Vec::new();
        ops.extend((0..107).map(|i| FixOp::new(0b1, i)));
        ops.extend((0..106).map(|i| FixOp::new(0b11, i)));
        ops.extend((0..105).map(|i| FixOp::new(0b111, i)));
        ops.extend((0..16).map(|i| FixOp::new(0x81, i)));
        ops
    }

    fn short_family() -> Vec<FixOp> {
        let mut ops = Vec::new();
        ops.extend((0..51).map(|i| FixOp::new(0b1, i)));
        ops.extend((0..50).map(|i| FixOp::new(0b11, i)));
        ops
    }

    #[test]
    fn long_table_hashes_perfectly() {
        let mut seen = vec![false; LONG_TABLE_SIZE];
        for op in long_family() {
            let bucket = op.crc() as usize % LONG_TABLE_SIZE;
            assert!(!seen[bucket], "bucket collision for {:?}", op);
            seen[bucket] = true;
        }
    }

    #[test]
    fn short_table_hashes_perfectly() {
        let mut seen = vec![false; SHORT_TABLE_SIZE];
        for op in short_family() {
            let bucket = op.crc() as usize % SHORT_TABLE_SIZE;
            assert!(!seen[bucket], "bucket collision for {:?}", op);
            seen[bucket] = true;
        }
    }

    #[test]
    fn every_family_member_is_retrievable() {
        let long = FixTable::long();
        for op in long_family() {
            assert_eq!(long.lookup(op.crc()), op);
        }
        let short = FixTable::short();
        for op in short_family() {
            assert_eq!(short.lookup(op.crc()), op);
        }
    }

    #[test]
    fn unknown_residues_return_the_null_op() {
        let long = FixTable::long();
        let keys: Vec<u32> = long_family().iter().map(|op| op.crc()).collect();
        let mut x: u32 = 0x1234_5678;
        let mut misses = 0;
        for _ in 0..1000 {
            x = x.wrapping_mul(1_103_515_245).wrapping_add(12_345);
            let crc = x & 0xFF_FFFF;
            if !keys.contains(&crc) {
                assert_eq!(long.lookup(crc), FixOp::NONE);
                misses += 1;
            }
        }
        assert!(misses > 900);
    }

    #[test]
    fn looked_up_fix_repairs_a_damaged_frame() {
        let long = FixTable::long();
        let good = crate::crc::tests::frame_from_bytes(&crate::crc::tests::GOOD_DF17);

        // damage with each family shape and repair via the table
        for damage in [FixOp::new(0b1, 42), FixOp::new(0b11, 9), FixOp::new(0b111, 77)] {
            let mut frame = good;
            damage.apply(&mut frame);
            let residue = crc::compute(&frame, 112);
            let fix = long.lookup(residue);
            assert!(fix.is_valid());
            let mut repaired = frame;
            fix.apply(&mut repaired);
            assert_eq!(repaired, good);
        }
    }

    #[test]
    fn null_op_for_zero_residue() {
        // residue zero means nothing to fix; bucket 0 must not fire
        assert_eq!(FixTable::long().lookup(0), FixOp::NONE);
        assert_eq!(FixTable::short().lookup(0), FixOp::NONE);
    }

    #[test]
    fn short_table_repairs_single_bit_df11() {
        let short = FixTable::short();
        // a DF11 all-call: DF=11, CA=0, ICAO 4840D6, parity closing to zero
        let mut frame = Bits128::ZERO;
        // build header then append the parity that zeroes the residue
        for bit in (0..32).rev().map(|i| (0x5848_40D6u32 >> i) & 1 != 0) {
            frame.shift_left();
            frame |= bit as u64;
        }
        let mut residue = 0;
        for i in (0..32).rev() {
            residue = crc::push_bit(residue, frame.get(i));
        }
        for _ in 0..24 {
            residue = crc::push_bit(residue, false);
        }
        frame.shift_left_by(24);
        frame ^= residue as u64;
        assert_eq!(crc::compute(&frame, 56), 0);

        let damage = FixOp::new(0b1, 17);
        let mut broken = frame;
        damage.apply(&mut broken);
        let fix = short.lookup(crc::compute(&broken, 56));
        assert!(fix.is_valid());
        let mut repaired = broken;
        fix.apply(&mut repaired);
        assert_eq!(repaired, frame);
    }
}
