//! Builds the transcript -> exon-span table from the exon coordinate CSV.
//!
//! Column layout:
//! `[transcript_name, transcript_length, segment_start, segment_end,
//!   genome_position, chromosome, strand_sign]`.

use std::collections::HashMap;
use std::io::BufRead;

use crate::csv_row::{CsvReader, CsvRow};
use crate::error::{Error, Result};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IntronFlag {
    None,
    Start,
    End,
    Full,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ExonSpan {
    pub segment_start: i32,
    pub segment_end: i32,
    pub genome_position: i32,
}

#[derive(Debug, Clone)]
pub struct TranscriptEntry {
    pub chromosome: String,
    pub strand: i8,
    pub intron_flag: IntronFlag,
    pub pair_junction_start: i32,
    pub pair_junction_end: i32,
    pub spans: Vec<ExonSpan>,
}

pub type ExonMap = HashMap<String, TranscriptEntry>;

fn parse_i32(row: &CsvRow, index: usize, field_name: &str) -> Result<i32> {
    let raw = row.get(index).ok_or_else(|| {
        Error::MalformedInput(format!("missing column {} ({})", index, field_name))
    })?;
    raw.trim()
        .parse::<i32>()
        .map_err(|_| Error::MalformedInput(format!("non-integer {} field: {:?}", field_name, raw)))
}

/// Does `name` end in `)`, marking it as an intron-bearing transcript variant?
fn is_intron_bearing(name: &str) -> bool {
    name.ends_with(')')
}

/// Prefix up to and including the first `::`, used to test whether two
/// intron-bearing transcript names form a pair.
fn pair_prefix(name: &str) -> &str {
    match name.find("::") {
        Some(idx) => &name[..idx + 2],
        None => name,
    }
}

pub fn load_exon_map<R: BufRead>(reader: R) -> Result<ExonMap> {
    let mut exon_map: ExonMap = HashMap::new();
    let mut last_key = String::new();

    for row in CsvReader::new(reader) {
        let row = row.map_err(|e| Error::IoFailure {
            path: "<exon coordinate stream>".into(),
            source: e,
        })?;
        if row.is_empty() {
            continue;
        }
        let name = row
            .get(0)
            .ok_or_else(|| Error::MalformedInput("row missing transcript name".to_string()))?
            .to_string();

        if last_key == name {
            let segment_start = parse_i32(&row, 2, "segment_start")?;
            let segment_end = parse_i32(&row, 3, "segment_end")?;
            let genome_position = parse_i32(&row, 4, "genome_position")?;
            let entry = exon_map
                .get_mut(&last_key)
                .ok_or_else(|| Error::Invariant(format!("missing in-progress entry for {}", last_key)))?;
            entry.spans.push(ExonSpan {
                segment_start,
                segment_end,
                genome_position,
            });
            continue;
        }

        // row[1] (transcript_length) is parsed only to validate the row shape.
        parse_i32(&row, 1, "transcript_length")?;
        let segment_start = parse_i32(&row, 2, "segment_start")?;
        let segment_end = parse_i32(&row, 3, "segment_end")?;
        let genome_position = parse_i32(&row, 4, "genome_position")?;
        let chromosome = row
            .get(5)
            .ok_or_else(|| Error::MalformedInput("row missing chromosome column".to_string()))?
            .to_string();
        let strand_sign = parse_i32(&row, 6, "strand_sign")?;
        let strand: i8 = if strand_sign < 0 { -1 } else { 1 };

        let mut intron_flag = IntronFlag::None;
        let mut pair_junction_start = -1;
        let mut pair_junction_end = -1;

        if is_intron_bearing(&name) {
            if is_intron_bearing(&last_key) && pair_prefix(&last_key) == pair_prefix(&name) {
                intron_flag = IntronFlag::End;
                let start_coord = exon_map
                    .get(&last_key)
                    .and_then(|e| e.spans.first())
                    .map(|s| s.genome_position)
                    .ok_or_else(|| {
                        Error::Invariant(format!("missing first span for {}", last_key))
                    })?;
                let end_coord = genome_position + segment_end - segment_start;
                pair_junction_start = start_coord + 39;
                pair_junction_end = start_coord + 59;

                // Retroactively reclassify the previous entry as the Start half.
                if let Some(prev) = exon_map.get_mut(&last_key) {
                    prev.intron_flag = IntronFlag::Start;
                    prev.pair_junction_start = end_coord - 60;
                    prev.pair_junction_end = end_coord - 40;
                }
            } else {
                intron_flag = IntronFlag::Full;
            }
        }

        last_key = name.clone();
        exon_map.insert(
            name,
            TranscriptEntry {
                chromosome,
                strand,
                intron_flag,
                pair_junction_start,
                pair_junction_end,
                spans: vec![ExonSpan {
                    segment_start,
                    segment_end,
                    genome_position,
                }],
            },
        );
    }

    Ok(exon_map)
}
