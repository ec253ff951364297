use std::fs::File;
use std::io::{BufReader, Write};
use std::path::Path;

use clap::{Arg, ArgAction, Command};
use log::{debug, info, LevelFilter};

use exoproject::bam_encoder::{encode_record, BamRecordInput};
use exoproject::bgzf::BgzfSink;
use exoproject::cigar::{BamCigarSink, SamCigarSink};
use exoproject::csv_row::CsvReader;
use exoproject::error::{Error, Result};
use exoproject::exon_map::{self, ExonMap};
use exoproject::header;
use exoproject::junction::JunctionRecorder;
use exoproject::projector::{project_alignment, AlignmentFields};
use exoproject::reference::{self, ReferenceTable};
use exoproject::sort_store::ScratchStore;

/// One row of the `--reads` smoke-test input: a stand-in for what the
/// pseudoaligner (out of scope for this crate) would otherwise supply.
struct DemoRead {
    transcript: String,
    posread: i32,
    posmate: i32,
    slen1: i32,
    slen2: i32,
    qname: String,
    seq: String,
    qual: String,
    nmap: i32,
}

fn parse_demo_reads(path: &str) -> Result<Vec<DemoRead>> {
    let file = File::open(path).map_err(|e| Error::IoFailure {
        path: path.into(),
        source: e,
    })?;
    let mut reads = Vec::new();
    for row in CsvReader::new(BufReader::new(file)) {
        let row = row.map_err(|e| Error::IoFailure {
            path: path.into(),
            source: e,
        })?;
        if row.is_empty() || row.get(0).map(str::is_empty).unwrap_or(true) {
            continue;
        }
        let field = |idx: usize, name: &str| -> Result<&str> {
            row.get(idx)
                .ok_or_else(|| Error::MalformedInput(format!("reads row missing column {} ({})", idx, name)))
        };
        let parse_i32 = |idx: usize, name: &str| -> Result<i32> {
            field(idx, name)?
                .trim()
                .parse::<i32>()
                .map_err(|_| Error::MalformedInput(format!("non-integer {} in reads row", name)))
        };
        reads.push(DemoRead {
            transcript: field(0, "transcript")?.to_string(),
            posread: parse_i32(1, "posread")?,
            posmate: parse_i32(2, "posmate")?,
            slen1: parse_i32(3, "len1")?,
            slen2: parse_i32(4, "len2")?,
            qname: field(5, "qname")?.to_string(),
            seq: field(6, "seq")?.to_string(),
            qual: field(7, "qual")?.to_string(),
            nmap: parse_i32(8, "nmap")?,
        });
    }
    Ok(reads)
}

/// Derives the transcript visitation order directly from the exon
/// coordinate file (first-seen order of consecutive same-name runs),
/// standing in for the canonical transcript-name list a transcript
/// index would otherwise supply.
fn transcript_order_from_csv(path: &str) -> Result<Vec<String>> {
    let file = File::open(path).map_err(|e| Error::IoFailure {
        path: path.into(),
        source: e,
    })?;
    let mut order = Vec::new();
    let mut last = String::new();
    for row in CsvReader::new(BufReader::new(file)) {
        let row = row.map_err(|e| Error::IoFailure {
            path: path.into(),
            source: e,
        })?;
        let Some(name) = row.get(0) else { continue };
        if name.is_empty() || name == last {
            continue;
        }
        order.push(name.to_string());
        last = name.to_string();
    }
    Ok(order)
}

fn load_exon_coords(path: &str) -> Result<ExonMap> {
    let file = File::open(path).map_err(|e| Error::IoFailure {
        path: path.into(),
        source: e,
    })?;
    exon_map::load_exon_map(BufReader::new(file))
}

fn run() -> Result<()> {
    let matches = Command::new("exoproject")
        .version(env!("CARGO_PKG_VERSION"))
        .author("Naoto Kubota")
        .about("Project transcriptome-space pseudoalignments into genome-space BAM and BED12 junction records")
        .arg(
            Arg::new("exon_coords")
                .required(true)
                .help("Path to the exon coordinate CSV"),
        )
        .arg(
            Arg::new("output")
                .required(true)
                .help("Output directory for scratch files and results"),
        )
        .arg(
            Arg::new("sorted_bam")
                .long("sorted-bam")
                .action(ArgAction::SetTrue)
                .help("Emit a coordinate-sorted BAM file instead of SAM text"),
        )
        .arg(
            Arg::new("bed_file")
                .long("bed-file")
                .value_parser(clap::value_parser!(String))
                .help("Write junction BED12 records to this path"),
        )
        .arg(
            Arg::new("threads")
                .long("threads")
                .default_value("1")
                .value_parser(clap::value_parser!(usize))
                .help("Number of scratch-sort worker threads"),
        )
        .arg(
            Arg::new("reads")
                .long("reads")
                .value_parser(clap::value_parser!(String))
                .help("Demo read list driving the projector and encoder"),
        )
        .arg(
            Arg::new("verbose")
                .short('v')
                .long("verbose")
                .action(ArgAction::SetTrue)
                .help("Enable verbose (debug-level) logging"),
        )
        .get_matches();

    let exon_coords = matches.get_one::<String>("exon_coords").unwrap();
    let output_dir = matches.get_one::<String>("output").unwrap();
    let sorted_bam = matches.get_flag("sorted_bam");
    let bed_file = matches.get_one::<String>("bed_file");
    let threads = *matches.get_one::<usize>("threads").unwrap();
    let reads_file = matches.get_one::<String>("reads");
    let verbose = matches.get_flag("verbose");

    if verbose {
        env_logger::Builder::from_default_env()
            .filter(None, LevelFilter::Debug)
            .init();
    } else {
        env_logger::Builder::from_default_env()
            .filter(None, LevelFilter::Info)
            .init();
    }

    info!("Running exoproject");
    info!("Exon coordinates: {}", exon_coords);
    info!("Output directory: {}", output_dir);
    info!("Sorted BAM output: {}", sorted_bam);
    info!("Threads: {}", threads);

    std::fs::create_dir_all(output_dir).map_err(|e| Error::IoFailure {
        path: output_dir.into(),
        source: e,
    })?;

    let exon_map = load_exon_coords(exon_coords)?;
    info!("Loaded {} transcripts", exon_map.len());

    let transcript_order = transcript_order_from_csv(exon_coords)?;
    let references: ReferenceTable = reference::build_reference_table(&exon_map, &transcript_order)?;
    info!("Reference table has {} chromosomes", references.len());

    let mut junctions = bed_file.map(|_| JunctionRecorder::new());

    let Some(reads_file) = reads_file else {
        info!("No --reads file given; exon map and reference table loaded, nothing to project");
        return Ok(());
    };

    let reads = parse_demo_reads(reads_file)?;
    let total_reads = reads.len() as u64;
    info!("Total demo reads: {}", total_reads);

    let scratch_dir = Path::new(output_dir).join("sorting");
    let scratch_store = if sorted_bam {
        Some(ScratchStore::new(&scratch_dir, threads)?)
    } else {
        None
    };
    let mut scratch_writer = scratch_store.as_ref().map(|s| s.writer_for_thread(0));

    let sam_out_path = Path::new(output_dir).join("out.sam");
    let mut sam_out = if sorted_bam {
        None
    } else {
        Some(File::create(&sam_out_path).map_err(|e| Error::IoFailure {
            path: sam_out_path.clone(),
            source: e,
        })?)
    };

    let mut last_percentage = 0u64;
    for (read_count, demo) in reads.iter().enumerate() {
        let read_count = (read_count + 1) as u64;
        if total_reads > 0 {
            let progress_percentage = (read_count * 100) / total_reads;
            if progress_percentage > last_percentage {
                info!("Progress: {}% ({} / {})", progress_percentage, read_count, total_reads);
                last_percentage = progress_percentage;
            }
        }

        let mut fields = AlignmentFields {
            ref_name: demo.transcript.clone(),
            strand: 0,
            posread: demo.posread,
            posmate: demo.posmate,
        };

        if sorted_bam {
            let mut cigar = BamCigarSink::new();
            project_alignment(
                &exon_map,
                &mut fields,
                demo.slen1,
                demo.slen2,
                &mut cigar,
                junctions.as_mut(),
            )?;

            let ref_entry = references
                .get(&fields.ref_name)
                .ok_or_else(|| Error::ConfigMissing(fields.ref_name.clone()))?;
            let flag: u16 = if fields.strand < 0 { 0x10 } else { 0 };
            let input = BamRecordInput {
                ref_id: ref_entry.ref_id,
                posread: fields.posread,
                posmate: fields.posmate,
                flag,
                cigar: &cigar.ops,
                name: &demo.qname,
                seq: demo.seq.as_bytes(),
                qual: demo.qual.as_bytes(),
                tlen: 0,
                nmap: demo.nmap,
                strand: fields.strand,
            };
            let block = encode_record(&input)?;
            debug!("encoded {} bytes for read {}", block.len(), demo.qname);
            scratch_writer
                .as_mut()
                .unwrap()
                .append(ref_entry.ref_id, &block)?;
        } else {
            let mut cigar = SamCigarSink::new();
            project_alignment(
                &exon_map,
                &mut fields,
                demo.slen1,
                demo.slen2,
                &mut cigar,
                junctions.as_mut(),
            )?;
            let out = sam_out.as_mut().unwrap();
            writeln!(
                out,
                "{}\t{}\t{}\t{}\t255\t{}\t*\t0\t0\t{}\t{}\tNH:i:{}\tXS:A:{}",
                demo.qname,
                if fields.strand < 0 { 16 } else { 0 },
                fields.ref_name,
                fields.posread,
                cigar.text,
                demo.seq,
                demo.qual,
                demo.nmap,
                if fields.strand < 0 { '-' } else { '+' },
            )
            .map_err(|e| Error::IoFailure {
                path: sam_out_path.clone(),
                source: e,
            })?;
        }
    }

    if let Some(writer) = scratch_writer.take() {
        drop(writer);
        let store = scratch_store.unwrap();
        let bam_path = Path::new(output_dir).join("out.bam");
        let raw = File::create(&bam_path).map_err(|e| Error::IoFailure {
            path: bam_path.clone(),
            source: e,
        })?;
        let mut sink = BgzfSink::new(raw);
        header::write_bam_header(&mut sink, &references)?;
        store.sort_and_emit(references.len() as i32, &mut sink)?;
        sink.finish().map_err(|e| Error::IoFailure {
            path: bam_path.clone(),
            source: e,
        })?;
        info!("Wrote sorted BAM to {}", bam_path.display());
    }

    if let (Some(bed_path), Some(recorder)) = (bed_file, junctions.as_ref()) {
        let bed_out = File::create(bed_path).map_err(|e| Error::IoFailure {
            path: bed_path.into(),
            source: e,
        })?;
        recorder.write_bed12(bed_out)?;
        info!("Wrote {} junction records to {}", recorder.len(), bed_path);
    }

    info!("Finished processing");
    Ok(())
}

fn main() {
    if let Err(e) = run() {
        log::error!("{}", e);
        std::process::exit(1);
    }
}
