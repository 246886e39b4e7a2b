use std::fs::File;
use std::io::BufWriter;
use std::path::PathBuf;

use pktsched_record::{
    to_words, ErrorFlags, Header, Record, StreamWord, Subheader, Word, WordWriter,
};
use serde::Serialize;

use crate::cmd::GenerateArgs;
use crate::exit::{io_error, record_error, CliError, CliResult, SUCCESS, USAGE};
use crate::output::{print_json, table, OutputFormat};

/// Deterministic generator so a seed reproduces the same lane files.
struct Lcg {
    state: u64,
}

impl Lcg {
    fn new(seed: u64) -> Self {
        Self { state: seed }
    }

    fn next_u64(&mut self) -> u64 {
        self.state = self
            .state
            .wrapping_mul(6364136223846793005)
            .wrapping_add(1442695040888963407);
        self.state >> 33
    }

    /// True with the given chance in percent.
    fn chance(&mut self, percent: u8) -> bool {
        percent > 0 && self.next_u64() % 100 < u64::from(percent)
    }
}

#[derive(Serialize)]
struct LaneFile {
    lane: u16,
    path: PathBuf,
    words: u64,
    hits: u64,
    hit_errors: u64,
}

#[derive(Serialize)]
struct GenerateOutput {
    frames: u32,
    slots: u16,
    seed: u64,
    files: Vec<LaneFile>,
}

pub fn run(args: GenerateArgs, format: OutputFormat) -> CliResult<i32> {
    if u32::from(args.slots) * u32::from(args.hits) > u32::from(u16::MAX) {
        return Err(CliError::new(
            USAGE,
            format!(
                "{} slots of {} hits overflow the 16-bit frame hit count",
                args.slots, args.hits
            ),
        ));
    }
    std::fs::create_dir_all(&args.out_dir)
        .map_err(|err| io_error("create output directory", err))?;

    let mut rng = Lcg::new(args.seed);
    let mut files = Vec::with_capacity(usize::from(args.lanes));
    for lane in 0..args.lanes {
        let path = args.out_dir.join(format!("lane{lane}.pw"));
        let file = File::create(&path).map_err(|err| io_error("create lane file", err))?;
        let mut writer = WordWriter::new(BufWriter::new(file), lane);
        let mut summary = LaneFile {
            lane,
            path,
            words: 0,
            hits: 0,
            hit_errors: 0,
        };

        for frame in 0..args.frames {
            let words = lane_frame(&args, lane, frame, &mut rng, &mut summary);
            let last = words.len() - 1;
            for (i, word) in words.into_iter().enumerate() {
                let word = StreamWord {
                    word,
                    sop: i == 0,
                    eop: i == last,
                };
                writer
                    .write_word(&word)
                    .map_err(|err| record_error("write lane file", err))?;
            }
        }
        summary.words = writer.words_written();
        writer
            .finish()
            .map_err(|err| record_error("write lane file", err))?;
        tracing::debug!(lane, words = summary.words, "lane file written");
        files.push(summary);
    }

    let out = GenerateOutput {
        frames: args.frames,
        slots: args.slots,
        seed: args.seed,
        files,
    };
    print_output(&out, format);
    Ok(SUCCESS)
}

fn lane_frame(
    args: &GenerateArgs,
    lane: u16,
    frame: u32,
    rng: &mut Lcg,
    summary: &mut LaneFile,
) -> Vec<Word> {
    let frame_ts = args.start_ts + u64::from(frame) * u64::from(args.slots);
    let blocks: Vec<u16> = (0..args.slots)
        .map(|_| {
            if rng.chance(args.empty_percent) {
                0
            } else {
                args.hits
            }
        })
        .collect();

    let mut records = vec![Record::Header(Header {
        timestamp: frame_ts,
        serial: frame,
        subheader_count: args.slots,
        hit_count: blocks.iter().sum(),
    })];
    for (slot, &hits) in blocks.iter().enumerate() {
        records.push(Record::Subheader(Subheader {
            slot: slot as u8,
            hit_count: hits,
        }));
        records.extend((0..hits).map(|i| Record::Hit(hit_value(lane, frame, slot, i))));
    }
    records.push(Record::Trailer);

    let mut words = to_words(&records);
    for word in words.iter_mut().filter(|w| !w.ctrl).skip(4) {
        summary.hits += 1;
        if rng.chance(args.error_percent) {
            *word = word.with_err(ErrorFlags::HIT);
            summary.hit_errors += 1;
        }
    }
    words
}

/// Hit payload naming its origin: lane, frame, slot and index, a byte each.
fn hit_value(lane: u16, frame: u32, slot: usize, index: u16) -> u32 {
    (u32::from(lane & 0xFF) << 24)
        | ((frame & 0xFF) << 16)
        | ((slot as u32 & 0xFF) << 8)
        | u32::from(index & 0xFF)
}

fn print_output(out: &GenerateOutput, format: OutputFormat) {
    match format {
        OutputFormat::Json => print_json(out),
        OutputFormat::Table => {
            let mut t = table(vec!["LANE", "FILE", "WORDS", "HITS", "HIT ERRORS"]);
            for f in &out.files {
                t.add_row(vec![
                    f.lane.to_string(),
                    f.path.display().to_string(),
                    f.words.to_string(),
                    f.hits.to_string(),
                    f.hit_errors.to_string(),
                ]);
            }
            println!("{t}");
        }
        OutputFormat::Pretty => {
            for f in &out.files {
                println!(
                    "lane={} file={} words={} hits={} hit_errors={}",
                    f.lane,
                    f.path.display(),
                    f.words,
                    f.hits,
                    f.hit_errors
                );
            }
        }
        OutputFormat::Raw => {
            for f in &out.files {
                println!("{}", f.path.display());
            }
        }
    }
}
