//! Per-chromosome maximum projected length and a dense ref-ID assigned
//! in iteration order.

use crate::error::{Error, Result};
use crate::exon_map::ExonMap;

#[derive(Debug, Clone, Copy)]
pub struct ReferenceEntry {
    pub length: i32,
    pub ref_id: i32,
}

pub type ReferenceTable = indexmap_like::IndexMap;

/// A minimal insertion-ordered map, since the BAM header's reference order
/// (and therefore every downstream `ref_id`) must reproduce the order
/// chromosomes are first seen in `transcript_order`.
mod indexmap_like {
    use super::ReferenceEntry;
    use std::collections::HashMap;

    #[derive(Debug, Default)]
    pub struct IndexMap {
        order: Vec<String>,
        entries: HashMap<String, ReferenceEntry>,
    }

    impl IndexMap {
        pub fn new() -> Self {
            IndexMap {
                order: Vec::new(),
                entries: HashMap::new(),
            }
        }

        pub fn merge_max_length(&mut self, chromosome: &str, length: i32) {
            if let Some(entry) = self.entries.get_mut(chromosome) {
                entry.length = entry.length.max(length);
            } else {
                self.order.push(chromosome.to_string());
                self.entries.insert(
                    chromosome.to_string(),
                    ReferenceEntry { length, ref_id: -1 },
                );
            }
        }

        /// Assigns dense 0-based ref_ids in first-seen order.
        pub fn assign_ref_ids(&mut self) {
            for (ref_id, chrom) in self.order.clone().into_iter().enumerate() {
                self.entries.get_mut(&chrom).unwrap().ref_id = ref_id as i32;
            }
        }

        pub fn get(&self, chromosome: &str) -> Option<&ReferenceEntry> {
            self.entries.get(chromosome)
        }

        pub fn len(&self) -> usize {
            self.order.len()
        }

        pub fn is_empty(&self) -> bool {
            self.order.is_empty()
        }

        /// Chromosomes in the order their ref_ids were assigned.
        pub fn iter_in_order(&self) -> impl Iterator<Item = (&str, &ReferenceEntry)> {
            self.order
                .iter()
                .map(move |chrom| (chrom.as_str(), &self.entries[chrom]))
        }
    }
}

/// Projected genome length of a transcript: the last span's extent on
/// the forward strand, the first span's on the reverse strand (since
/// spans are stored in transcript order regardless of strand).
fn projected_length(entry: &crate::exon_map::TranscriptEntry) -> Result<i32> {
    let span = if entry.strand < 0 {
        entry
            .spans
            .first()
            .ok_or_else(|| Error::Invariant("transcript has no spans".to_string()))?
    } else {
        entry
            .spans
            .last()
            .ok_or_else(|| Error::Invariant("transcript has no spans".to_string()))?
    };
    Ok(span.genome_position + span.segment_end - span.segment_start)
}

/// Builds the reference table by visiting every transcript named in
/// `transcript_order` (the canonical name list owned by the transcript
/// index, a dependency external to this crate) and merging its projected
/// length into the per-chromosome maximum.
pub fn build_reference_table(
    exon_map: &ExonMap,
    transcript_order: &[String],
) -> Result<ReferenceTable> {
    let mut table = ReferenceTable::new();
    for name in transcript_order {
        let entry = exon_map
            .get(name)
            .ok_or_else(|| Error::ConfigMissing(name.clone()))?;
        let length = projected_length(entry)?;
        table.merge_max_length(&entry.chromosome, length);
    }
    table.assign_ref_ids();
    Ok(table)
}
