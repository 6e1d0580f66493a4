//! Circular comparison of 16-bit sequence numbers

use crate::constants::SEQ_HALF_RANGE;

/// Returns true when `a` comes logically after `b`.
///
/// Values closer than half the sequence space compare normally; a distance
/// of half the space or more means one side wrapped, and the smaller raw
/// value is the newer one.
pub fn is_after(a: u16, b: u16) -> bool {
    let diff = a as i32 - b as i32;
    if diff.abs() < SEQ_HALF_RANGE {
        a > b
    } else {
        diff <= -SEQ_HALF_RANGE
    }
}

/// Number of sequence values from `from` up to (not including) `to`.
pub fn distance(from: u16, to: u16) -> u16 {
    to.wrapping_sub(from)
}
