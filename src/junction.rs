//! Coalesces intron-spanning alignments into BED12 records, joining
//! companion intron halves by a precomputed pair window.

use std::collections::BTreeMap;
use std::io::Write;

use crate::error::{Error, Result};

pub type JunctionKey = (String, i32, i32);

#[derive(Debug, Clone)]
pub struct JunctionValue {
    pub name: String,
    pub count: u32,
    pub strand_char: char,
    pub block_size_left: u16,
    pub block_size_right: u16,
    pub pair_start: i32,
    pub pair_end: i32,
}

/// Accumulates junction counts keyed by `(chromosome, start, end)`.
///
/// Uses a `BTreeMap` so BED output iterates in a reproducible order
/// (chromosome, then start, then end); see DESIGN.md.
#[derive(Debug, Default)]
pub struct JunctionRecorder {
    entries: BTreeMap<JunctionKey, JunctionValue>,
}

impl JunctionRecorder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Upserts a junction: on a fresh key, stores `value` with count 1; on
    /// an existing key, increments `count` only (other fields are left as
    /// they were first recorded).
    pub fn record(
        &mut self,
        chromosome: &str,
        start_coord: i32,
        end_coord: i32,
        name: &str,
        strand_char: char,
        block_size_left: u16,
        block_size_right: u16,
        pair_start: i32,
        pair_end: i32,
    ) {
        let key = (chromosome.to_string(), start_coord, end_coord);
        match self.entries.get_mut(&key) {
            Some(existing) => existing.count += 1,
            None => {
                self.entries.insert(
                    key,
                    JunctionValue {
                        name: name.to_string(),
                        count: 1,
                        strand_char,
                        block_size_left,
                        block_size_right,
                        pair_start,
                        pair_end,
                    },
                );
            }
        }
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    #[cfg(test)]
    pub fn get(&self, key: &JunctionKey) -> Option<&JunctionValue> {
        self.entries.get(key)
    }

    /// Name prefix up to (not including) the first `-`, used to verify a
    /// pair-linked junction's companion belongs to the same transcript
    /// before emitting it.
    fn name_prefix(name: &str) -> &str {
        match name.find('-') {
            Some(idx) => &name[..idx],
            None => name,
        }
    }

    /// Writes BED12 lines for every junction that either isn't half of a
    /// pair, or whose companion is present and passes the name-prefix
    /// check. Iteration is in key order (deterministic).
    pub fn write_bed12<W: Write>(&self, mut out: W) -> Result<()> {
        for (key, value) in self.entries.iter() {
            if value.pair_start >= 0 {
                let companion_key = (key.0.clone(), value.pair_start, value.pair_end);
                let Some(companion) = self.entries.get(&companion_key) else {
                    continue;
                };
                if Self::name_prefix(&value.name) != Self::name_prefix(&companion.name) {
                    continue;
                }
            }
            writeln!(
                out,
                "{}\t{}\t{}\t{}\t{}\t{}\t{}\t{}\t255,0,0\t2\t{},{}\t0,0",
                key.0,
                key.1,
                key.2,
                value.name,
                value.count,
                value.strand_char,
                key.1,
                key.2,
                value.block_size_left,
                value.block_size_right,
            )
            .map_err(|e| Error::IoFailure {
                path: "<bed output>".into(),
                source: e,
            })?;
        }
        Ok(())
    }
}
