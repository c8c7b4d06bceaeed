use std::collections::BTreeMap;

use anchor_lang::prelude::*;
use arrayref::array_ref;
use chrono::Utc;
use uuid::Uuid;

use crate::{error::DrawError, state::UserId};

/// Supplies raw 64-bit randomness to the winner selector.
pub trait EntropySource {
    fn next_u64(&mut self) -> u64;
}

/// Entropy from the operating system, combined with the wall clock.
///
/// Two fresh v4 UUIDs supply 32 bytes from the OS generator. Two words are
/// pulled out of them and mixed with the current timestamp so a single weak
/// source cannot fully determine the result.
#[derive(Default)]
pub struct OsEntropy;

impl EntropySource for OsEntropy {
    fn next_u64(&mut self) -> u64 {
        let mut data = [0u8; 32];
        data[..16].copy_from_slice(Uuid::new_v4().as_bytes());
        data[16..].copy_from_slice(Uuid::new_v4().as_bytes());

        let chunk1 = array_ref![data, 0, 8];
        let chunk2 = array_ref![data, 20, 8];
        let hash_value1 = u64::from_le_bytes(*chunk1);
        let hash_value2 = u64::from_le_bytes(*chunk2);
        let timestamp = Utc::now().timestamp_nanos_opt().unwrap_or_default() as u64;

        let mixed_value = mix(hash_value1, timestamp);
        mix(mixed_value, hash_value2)
    }
}

/// Deterministic splitmix64 stream, used for reproducible draws in tests.
pub struct SeededEntropy {
    state: u64,
}

impl SeededEntropy {
    pub fn new(seed: u64) -> Self {
        SeededEntropy { state: seed }
    }
}

impl EntropySource for SeededEntropy {
    fn next_u64(&mut self) -> u64 {
        self.state = self.state.wrapping_add(0x9e3779b97f4a7c15);
        mix(self.state, 0)
    }
}

/// splitmix64 finalizer: every output bit depends on every input bit.
pub fn mix(a: u64, b: u64) -> u64 {
    let mut z = a.wrapping_add(b);

    z = (z ^ (z >> 30)).wrapping_mul(0xbf58476d1ce4e5b9);
    z = (z ^ (z >> 27)).wrapping_mul(0x94d049bb133111eb);
    z ^ (z >> 31)
}

/// Maps a random draw onto `0..range` without modulo bias.
///
/// Values in the biased tail above the last full multiple of `range` are
/// rejected and a fresh value is taken from `source`.
pub fn unbiased_range(source: &mut impl EntropySource, range: u64) -> Result<u64> {
    require_gt!(range, 0, DrawError::NoEntries);

    if range.is_power_of_two() {
        return Ok(source.next_u64() & (range - 1));
    }

    let threshold = u64::MAX - (u64::MAX % range);
    loop {
        let value = source.next_u64();
        if value < threshold {
            return Ok(value % range);
        }
    }
}

/// Outcome of a weighted pick over a draw's entries.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct WeightedPick {
    pub user_id: UserId,
    pub winner_entries: u64,
    pub total_entries: u64,
}

/// Picks one ticket uniformly from all tickets, so each holder wins in
/// proportion to their count.
///
/// Instead of expanding every ticket, cumulative counts are built per holder
/// and the drawn ticket index is located with a binary search.
pub fn weighted_pick(
    entries: &BTreeMap<UserId, u64>,
    source: &mut impl EntropySource,
) -> Result<WeightedPick> {
    let mut holders = Vec::with_capacity(entries.len());
    let mut cumulative = Vec::with_capacity(entries.len());
    let mut running: u64 = 0;
    for (user_id, count) in entries.iter().filter(|(_, count)| **count > 0) {
        running = running.checked_add(*count).ok_or(DrawError::Overflow)?;
        holders.push((*user_id, *count));
        cumulative.push(running);
    }
    require_gt!(running, 0, DrawError::NoEntries);

    let ticket = unbiased_range(source, running)?;
    // First holder whose cumulative total passes the ticket index owns it
    let index = cumulative.partition_point(|upper| *upper <= ticket);
    let (user_id, winner_entries) = holders[index];

    Ok(WeightedPick {
        user_id,
        winner_entries,
        total_entries: running,
    })
}
