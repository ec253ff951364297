//! Walks a transcript's exon spans for a read and its mate, producing a
//! gapped genome CIGAR and genome positions.
//!
//! The per-span decision is modeled as an explicit state machine rather
//! than a three-way `if` cascade; the geometry this computes must match
//! bit-for-bit regardless of how the branching is expressed.

use log::warn;

use crate::cigar::{CigarOp, CigarSink};
use crate::error::{Error, Result};
use crate::exon_map::{ExonMap, ExonSpan, IntronFlag, TranscriptEntry};
use crate::junction::JunctionRecorder;

/// Fields mutated in place by [`project_alignment`], mirroring the
/// source's by-reference `ref_name`/`strand`/`posread`/`posmate`
/// parameters.
pub struct AlignmentFields {
    /// In: transcript name. Out: chromosome name.
    pub ref_name: String,
    /// Out: `+1` or `-1`, taken from the exon map entry.
    pub strand: i8,
    /// In: 1-based transcript position of the read. Out: 1-based genome
    /// position of the read's genome-leftmost aligned base.
    pub posread: i32,
    /// In: 1-based transcript position of the mate, or 0 if unpaired.
    /// Out: 1-based genome position, or unchanged 0 if unpaired.
    pub posmate: i32,
}

/// Per-span classification of where a cursor (read or mate) stands
/// relative to the current exon span.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum CursorState {
    /// The cursor hasn't reached this span yet.
    NotStarted,
    /// The cursor starts mapping inside this span.
    Begin,
    /// The cursor started mapping in an earlier span and continues here.
    InProgress,
    /// The cursor has already placed every base.
    Done,
}

fn classify_read(read_rem: i32, slen1: i32, posread: i32, span: &ExonSpan) -> CursorState {
    if read_rem <= 0 {
        CursorState::Done
    } else if read_rem == slen1 {
        if posread > span.segment_end {
            CursorState::NotStarted
        } else {
            CursorState::Begin
        }
    } else {
        CursorState::InProgress
    }
}

fn classify_mate(mate_rem: i32, slen2: i32, posmate: i32, span: &ExonSpan) -> CursorState {
    if mate_rem <= 0 {
        CursorState::Done
    } else if mate_rem == slen2 {
        if posmate > span.segment_end {
            CursorState::NotStarted
        } else {
            CursorState::Begin
        }
    } else {
        CursorState::InProgress
    }
}

pub fn project_alignment<S: CigarSink>(
    exon_map: &ExonMap,
    fields: &mut AlignmentFields,
    slen1: i32,
    slen2: i32,
    cigar: &mut S,
    mut junctions: Option<&mut JunctionRecorder>,
) -> Result<()> {
    let trans_name = fields.ref_name.clone();
    let entry: &TranscriptEntry = exon_map
        .get(&trans_name)
        .ok_or_else(|| Error::ConfigMissing(trans_name.clone()))?;

    fields.ref_name = entry.chromosome.clone();
    fields.strand = entry.strand;
    let negstrand = entry.strand < 0;

    let mut read_rem = slen1;
    let mut mate_rem = if fields.posmate == 0 { 0 } else { slen2 };
    let mut read_offset: i32 = 0;
    let mut posread = fields.posread;
    let mut posmate = fields.posmate;

    for span in &entry.spans {
        if read_rem > 0 {
            match classify_read(read_rem, slen1, posread, span) {
                CursorState::NotStarted | CursorState::Done => {}
                CursorState::InProgress => {
                    let (start_coord, end_coord) = if negstrand {
                        (
                            span.genome_position + span.segment_end - span.segment_start,
                            read_offset,
                        )
                    } else {
                        (read_offset, span.genome_position)
                    };

                    cigar.push(negstrand, end_coord - start_coord - 1, CigarOp::RefSkip);
                    if let Some(rec) = junctions.as_deref_mut() {
                        rec.record(
                            &fields.ref_name,
                            start_coord,
                            end_coord,
                            &trans_name,
                            if negstrand { '-' } else { '+' },
                            0,
                            0,
                            -1,
                            -1,
                        );
                    }

                    let span_len = span.segment_end - span.segment_start + 1;
                    let op_len;
                    if read_rem > span_len {
                        op_len = span_len;
                        read_offset = if negstrand {
                            span.genome_position
                        } else {
                            span_len + span.genome_position - 1
                        };
                    } else {
                        op_len = read_rem;
                        if negstrand {
                            posread = start_coord - read_rem + 1;
                        }
                    }
                    read_rem -= op_len;
                    cigar.push(negstrand, op_len, CigarOp::Match);
                }
                CursorState::Begin => {
                    if posread < span.segment_start {
                        let op_len = span.segment_start - posread;
                        read_rem -= op_len;
                        cigar.push(false, op_len, CigarOp::SoftClip);
                    }

                    read_offset = posread + slen1 - span.segment_end - 1;
                    let op_len;
                    if read_offset > 0 {
                        op_len = read_rem - read_offset;
                        if negstrand {
                            read_offset = span.genome_position;
                        } else {
                            read_offset = span.genome_position + span.segment_end - span.segment_start;
                            posread += span.genome_position - span.segment_start;
                        }
                    } else {
                        op_len = read_rem;
                        posread = if negstrand {
                            span.genome_position - read_offset
                        } else {
                            posread + span.genome_position - span.segment_start
                        };
                    }
                    read_rem -= op_len;
                    cigar.push(negstrand, op_len, CigarOp::Match);
                }
            }
        }

        if mate_rem > 0 {
            match classify_mate(mate_rem, slen2, posmate, span) {
                CursorState::NotStarted | CursorState::Done => {}
                CursorState::InProgress => {
                    mate_rem -= span.segment_end - span.segment_start + 1;
                    posmate = span.genome_position - mate_rem;
                }
                CursorState::Begin => {
                    if negstrand {
                        mate_rem = posmate + slen2 - span.segment_end - 1;
                        posmate = span.genome_position - mate_rem;
                    } else {
                        mate_rem = 0;
                        posmate += span.genome_position - span.segment_start;
                    }
                }
            }
        }

        if read_rem <= 0 && mate_rem <= 0 {
            break;
        }
    }

    if read_rem > 0 {
        if negstrand {
            posread = read_offset - read_rem;
        }
        cigar.push(negstrand, read_rem, CigarOp::SoftClip);
    }

    if mate_rem == slen2 && fields.posmate != 0 {
        warn!("mate outside segment: {}", trans_name);
        let last = entry
            .spans
            .last()
            .ok_or_else(|| Error::Invariant("transcript has no spans".to_string()))?;
        posmate = if negstrand {
            last.genome_position - posmate - slen2 + last.segment_end + 1
        } else {
            posmate + last.genome_position - last.segment_start
        };
    }

    if let Some(rec) = junctions.as_deref_mut() {
        if entry.intron_flag != IntronFlag::None {
            record_intron_window_junctions(
                entry,
                &fields.ref_name,
                &trans_name,
                negstrand,
                posread,
                posmate,
                slen1,
                slen2,
                rec,
            )?;
        }
    }

    fields.posread = posread;
    fields.posmate = posmate;
    Ok(())
}

#[allow(clippy::too_many_arguments)]
fn record_intron_window_junctions(
    entry: &TranscriptEntry,
    chromosome: &str,
    trans_name: &str,
    negstrand: bool,
    posread: i32,
    posmate: i32,
    slen1: i32,
    slen2: i32,
    rec: &mut JunctionRecorder,
) -> Result<()> {
    let span = entry
        .spans
        .first()
        .ok_or_else(|| Error::Invariant("transcript has no spans".to_string()))?;
    let start_coord = span.genome_position;
    let end_coord = span.genome_position + span.segment_end - span.segment_start;
    let name_prefix = match trans_name.find("::") {
        Some(idx) => &trans_name[..idx],
        None => trans_name,
    };
    let strand_char = if negstrand { '-' } else { '+' };

    let emit_5prime = |rec: &mut JunctionRecorder, pair_start: i32, pair_end: i32| {
        rec.record(
            chromosome,
            start_coord + 39,
            start_coord + 59,
            &format!("{}-{}", name_prefix, start_coord + 50),
            strand_char,
            10,
            10,
            pair_start,
            pair_end,
        );
    };
    let emit_3prime = |rec: &mut JunctionRecorder, pair_start: i32, pair_end: i32| {
        rec.record(
            chromosome,
            end_coord - 60,
            end_coord - 40,
            &format!("{}-{}", name_prefix, end_coord - 50),
            strand_char,
            10,
            10,
            pair_start,
            pair_end,
        );
    };

    match entry.intron_flag {
        IntronFlag::None => {}
        IntronFlag::Start => {
            if posread >= start_coord
                && posread < start_coord + 50
                && posread + slen1 >= start_coord + 50
                && posread + slen1 < end_coord
                && posmate < end_coord
            {
                emit_5prime(rec, entry.pair_junction_start, entry.pair_junction_end);
            }
        }
        IntronFlag::End => {
            if posread >= start_coord
                && posread < end_coord - 50
                && posread + slen1 >= end_coord - 50
                && posread + slen1 < end_coord
                && posmate + slen2 >= start_coord
            {
                emit_3prime(rec, entry.pair_junction_start, entry.pair_junction_end);
            }
        }
        IntronFlag::Full => {
            if posread >= start_coord
                && posread < start_coord + 50
                && posread + slen1 >= start_coord + 50
                && posread + slen1 < end_coord - 50
                && posmate < end_coord
            {
                emit_5prime(rec, end_coord - 60, end_coord - 40);
            }
            if posread >= start_coord + 50
                && posread < end_coord - 50
                && posread + slen1 >= end_coord - 50
                && posread + slen1 < end_coord
                && posmate + slen2 >= start_coord
            {
                emit_3prime(rec, start_coord + 39, start_coord + 59);
            }
        }
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cigar::{BamCigarSink, SamCigarSink};

    fn single_span_map(chrom: &str, strand: i8, start: i32, end: i32, genome_pos: i32) -> ExonMap {
        let mut map = ExonMap::new();
        map.insert(
            "TX".to_string(),
            TranscriptEntry {
                chromosome: chrom.to_string(),
                strand,
                intron_flag: IntronFlag::None,
                pair_junction_start: -1,
                pair_junction_end: -1,
                spans: vec![ExonSpan {
                    segment_start: start,
                    segment_end: end,
                    genome_position: genome_pos,
                }],
            },
        );
        map
    }

    fn two_span_map(chrom: &str, strand: i8) -> ExonMap {
        let mut map = ExonMap::new();
        map.insert(
            "TX2".to_string(),
            TranscriptEntry {
                chromosome: chrom.to_string(),
                strand,
                intron_flag: IntronFlag::None,
                pair_junction_start: -1,
                pair_junction_end: -1,
                spans: vec![
                    ExonSpan {
                        segment_start: 1,
                        segment_end: 50,
                        genome_position: 1000,
                    },
                    ExonSpan {
                        segment_start: 51,
                        segment_end: 100,
                        genome_position: 2000,
                    },
                ],
            },
        );
        map
    }

    // S1
    #[test]
    fn scenario_s1_read_fully_within_single_span() {
        let map = single_span_map("chr1", 1, 1, 100, 1000);
        let mut fields = AlignmentFields {
            ref_name: "TX".to_string(),
            strand: 0,
            posread: 10,
            posmate: 0,
        };
        let mut cigar = SamCigarSink::new();
        project_alignment(&map, &mut fields, 20, 0, &mut cigar, None).unwrap();
        assert_eq!(cigar.text, "20M");
        assert_eq!(fields.ref_name, "chr1");
        assert_eq!(fields.posread, 1009);
    }

    // S2
    #[test]
    fn scenario_s2_read_extends_past_span_end() {
        let map = single_span_map("chr1", 1, 1, 100, 1000);
        let mut fields = AlignmentFields {
            ref_name: "TX".to_string(),
            strand: 0,
            posread: 95,
            posmate: 0,
        };
        let mut cigar = SamCigarSink::new();
        project_alignment(&map, &mut fields, 20, 0, &mut cigar, None).unwrap();
        assert_eq!(cigar.text, "6M14S");
        assert_eq!(fields.posread, 1094);
    }

    // S3
    #[test]
    fn scenario_s3_forward_strand_junction_crossing() {
        let map = two_span_map("chr1", 1);
        let mut fields = AlignmentFields {
            ref_name: "TX2".to_string(),
            strand: 0,
            posread: 40,
            posmate: 0,
        };
        let mut cigar = SamCigarSink::new();
        let mut junctions = JunctionRecorder::new();
        project_alignment(&map, &mut fields, 20, 0, &mut cigar, Some(&mut junctions)).unwrap();
        // See DESIGN.md: the intron here is 950 bases (genome 1050..1999
        // inclusive), recorded at the (last exonic base, next exonic
        // base) pair (1049, 2000).
        assert_eq!(cigar.text, "11M950N9M");
        assert_eq!(fields.posread, 1039);
        assert_eq!(junctions.len(), 1);
        let value = junctions.get(&("chr1".to_string(), 1049, 2000)).unwrap();
        assert_eq!(value.count, 1);
    }

    // S4 — note the span list for a negative-strand transcript must be
    // ordered with *decreasing* genome_position along the transcript
    // (span 0 is the genomically-rightmost exon, matching a gene read
    // 5'->3' against decreasing genome coordinates); see DESIGN.md.
    #[test]
    fn scenario_s4_reverse_strand_junction_crossing_reverses_cigar() {
        let mut map = ExonMap::new();
        map.insert(
            "TX2R".to_string(),
            TranscriptEntry {
                chromosome: "chr1".to_string(),
                strand: -1,
                intron_flag: IntronFlag::None,
                pair_junction_start: -1,
                pair_junction_end: -1,
                spans: vec![
                    ExonSpan {
                        segment_start: 1,
                        segment_end: 50,
                        genome_position: 2000,
                    },
                    ExonSpan {
                        segment_start: 51,
                        segment_end: 100,
                        genome_position: 1000,
                    },
                ],
            },
        );
        let mut fields = AlignmentFields {
            ref_name: "TX2R".to_string(),
            strand: 0,
            posread: 40,
            posmate: 0,
        };
        let mut cigar = SamCigarSink::new();
        let mut junctions = JunctionRecorder::new();
        project_alignment(&map, &mut fields, 20, 0, &mut cigar, Some(&mut junctions)).unwrap();
        assert_eq!(cigar.text, "9M950N11M");
        assert_eq!(fields.posread, 1041);
        // Same genomic intron window as the forward-strand scenario.
        let value = junctions.get(&("chr1".to_string(), 1049, 2000)).unwrap();
        assert_eq!(value.count, 1);
    }

    #[test]
    fn bam_sink_produces_packed_ops_matching_sam_text() {
        let map = two_span_map("chr1", 1);
        let mut fields = AlignmentFields {
            ref_name: "TX2".to_string(),
            strand: 0,
            posread: 40,
            posmate: 0,
        };
        let mut cigar = BamCigarSink::new();
        project_alignment(&map, &mut fields, 20, 0, &mut cigar, None).unwrap();
        // 11M, 950N, 9M
        assert_eq!(
            cigar.ops,
            vec![(11u32 << 4) | 0, (950u32 << 4) | 3, (9u32 << 4) | 0]
        );
        assert_eq!(cigar.align_len(), 11 + 950 + 9);
    }

    #[test]
    fn missing_transcript_is_config_missing() {
        let map = ExonMap::new();
        let mut fields = AlignmentFields {
            ref_name: "GHOST".to_string(),
            strand: 0,
            posread: 1,
            posmate: 0,
        };
        let mut cigar = SamCigarSink::new();
        let err = project_alignment(&map, &mut fields, 10, 0, &mut cigar, None).unwrap_err();
        assert!(matches!(err, Error::ConfigMissing(name) if name == "GHOST"));
    }

    #[test]
    fn intron_full_transcript_records_paired_window_on_five_prime_flank() {
        let mut map = ExonMap::new();
        // start_coord=1000, end_coord=1000+2000-1=2999; 5' window read must
        // sit at [1000,1050) extending into [1050,2949).
        map.insert(
            "GENE::TX(intron)".to_string(),
            TranscriptEntry {
                chromosome: "chr1".to_string(),
                strand: 1,
                intron_flag: IntronFlag::Full,
                pair_junction_start: -1,
                pair_junction_end: -1,
                spans: vec![ExonSpan {
                    segment_start: 1,
                    segment_end: 2000,
                    genome_position: 1000,
                }],
            },
        );
        let mut fields = AlignmentFields {
            ref_name: "GENE::TX(intron)".to_string(),
            strand: 0,
            posread: 21,
            posmate: 0,
        };
        let mut cigar = SamCigarSink::new();
        let mut junctions = JunctionRecorder::new();
        project_alignment(&map, &mut fields, 40, 0, &mut cigar, Some(&mut junctions)).unwrap();
        assert_eq!(junctions.len(), 1);
        let value = junctions.get(&("chr1".to_string(), 1039, 1059)).unwrap();
        assert_eq!(value.block_size_left, 10);
        assert_eq!(value.block_size_right, 10);
        assert_eq!(value.pair_start, 2939);
        assert_eq!(value.pair_end, 2959);
    }
}
