//! SAM header text and the BAM header binary prefix.

use std::io::Write;

use crate::error::{Error, Result};
use crate::reference::ReferenceTable;

pub const PROGRAM_NAME: &str = "exoproject";
pub const PROGRAM_VERSION: &str = env!("CARGO_PKG_VERSION");

fn io_err(e: std::io::Error) -> Error {
    Error::IoFailure {
        path: "<header output>".into(),
        source: e,
    }
}

/// `@HD`/`@SQ`/`@PG` text, `@SQ` rows in `ref_id` order.
pub fn sam_header_text(references: &ReferenceTable) -> String {
    let mut text = String::from("@HD\tVN:1.0\tSO:coordinate\n");
    for (chrom, entry) in references.iter_in_order() {
        text.push_str(&format!("@SQ\tSN:{}\tLN:{}\n", chrom, entry.length));
    }
    text.push_str(&format!(
        "@PG\tID:{}\tPN:{}\tVN:{}\n",
        PROGRAM_NAME, PROGRAM_NAME, PROGRAM_VERSION
    ));
    text
}

/// Writes the BAM magic, header text, and per-chromosome reference
/// dictionary to `out`.
pub fn write_bam_header<W: Write>(mut out: W, references: &ReferenceTable) -> Result<()> {
    let text = sam_header_text(references);
    out.write_all(b"BAM\x01").map_err(io_err)?;
    out.write_all(&(text.len() as i32).to_le_bytes())
        .map_err(io_err)?;
    out.write_all(text.as_bytes()).map_err(io_err)?;
    out.write_all(&(references.len() as i32).to_le_bytes())
        .map_err(io_err)?;
    for (chrom, entry) in references.iter_in_order() {
        let name_len = (chrom.len() + 1) as i32;
        out.write_all(&name_len.to_le_bytes()).map_err(io_err)?;
        out.write_all(chrom.as_bytes()).map_err(io_err)?;
        out.write_all(&[0u8]).map_err(io_err)?;
        out.write_all(&entry.length.to_le_bytes()).map_err(io_err)?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::exon_map::{ExonMap, ExonSpan, IntronFlag, TranscriptEntry};
    use crate::reference::build_reference_table;

    fn sample_references() -> ReferenceTable {
        let mut map = ExonMap::new();
        map.insert(
            "TX1".to_string(),
            TranscriptEntry {
                chromosome: "chr2".to_string(),
                strand: 1,
                intron_flag: IntronFlag::None,
                pair_junction_start: -1,
                pair_junction_end: -1,
                spans: vec![ExonSpan {
                    segment_start: 1,
                    segment_end: 100,
                    genome_position: 1000,
                }],
            },
        );
        map.insert(
            "TX2".to_string(),
            TranscriptEntry {
                chromosome: "chr1".to_string(),
                strand: 1,
                intron_flag: IntronFlag::None,
                pair_junction_start: -1,
                pair_junction_end: -1,
                spans: vec![ExonSpan {
                    segment_start: 1,
                    segment_end: 50,
                    genome_position: 500,
                }],
            },
        );
        build_reference_table(&map, &["TX1".to_string(), "TX2".to_string()]).unwrap()
    }

    #[test]
    fn sam_header_lists_sq_rows_in_ref_id_order() {
        let references = sample_references();
        let text = sam_header_text(&references);
        let lines: Vec<&str> = text.lines().collect();
        assert_eq!(lines[0], "@HD\tVN:1.0\tSO:coordinate");
        assert_eq!(lines[1], "@SQ\tSN:chr2\tLN:1099");
        assert_eq!(lines[2], "@SQ\tSN:chr1\tLN:549");
        assert!(lines[3].starts_with("@PG\tID:exoproject"));
    }

    #[test]
    fn bam_header_round_trips_chromosome_dictionary() {
        let references = sample_references();
        let mut buf = Vec::new();
        write_bam_header(&mut buf, &references).unwrap();

        assert_eq!(&buf[0..4], b"BAM\x01");
        let text_len = i32::from_le_bytes(buf[4..8].try_into().unwrap()) as usize;
        let text = std::str::from_utf8(&buf[8..8 + text_len]).unwrap();
        assert!(text.starts_with("@HD"));

        let mut cursor = 8 + text_len;
        let n_ref = i32::from_le_bytes(buf[cursor..cursor + 4].try_into().unwrap());
        assert_eq!(n_ref, 2);
        cursor += 4;

        let name_len = i32::from_le_bytes(buf[cursor..cursor + 4].try_into().unwrap()) as usize;
        cursor += 4;
        let name = std::str::from_utf8(&buf[cursor..cursor + name_len - 1]).unwrap();
        assert_eq!(name, "chr2");
        cursor += name_len;
        let seq_len = i32::from_le_bytes(buf[cursor..cursor + 4].try_into().unwrap());
        assert_eq!(seq_len, 1099);
    }
}
