use std::fs::File;
use std::io::BufReader;

use pktsched_record::{Record, RecordDecoder, StreamWord, WordReader};
use serde::Serialize;

use crate::cmd::InspectArgs;
use crate::exit::{io_error, record_error, CliResult, SUCCESS};
use crate::output::{error_names, lane_label, print_json, print_raw_words, table, OutputFormat};

#[derive(Debug, Serialize, PartialEq, Eq)]
#[serde(tag = "record", rename_all = "snake_case")]
enum RecordView {
    Header {
        timestamp: u64,
        serial: u32,
        subheader_count: u16,
        hit_count: u16,
    },
    Subheader {
        slot: u8,
        hit_count: u16,
    },
    Hit {
        value: u32,
    },
    Trailer,
}

impl From<Record> for RecordView {
    fn from(record: Record) -> Self {
        match record {
            Record::Header(h) => RecordView::Header {
                timestamp: h.timestamp,
                serial: h.serial,
                subheader_count: h.subheader_count,
                hit_count: h.hit_count,
            },
            Record::Subheader(s) => RecordView::Subheader {
                slot: s.slot,
                hit_count: s.hit_count,
            },
            Record::Hit(value) => RecordView::Hit { value },
            Record::Trailer => RecordView::Trailer,
        }
    }
}

#[derive(Debug, Serialize)]
struct Entry {
    /// Index of the word that completed the record.
    word: usize,
    #[serde(flatten)]
    record: RecordView,
    errors: Vec<&'static str>,
}

#[derive(Debug, Serialize)]
struct InspectOutput {
    lane: String,
    words: usize,
    frames: usize,
    records: usize,
    stray_words: u64,
    entries: Vec<Entry>,
}

pub fn run(args: InspectArgs, format: OutputFormat) -> CliResult<i32> {
    let context = format!("read {}", args.path.display());
    let file = File::open(&args.path).map_err(|err| io_error(&context, err))?;
    let mut reader = WordReader::new(BufReader::new(file));
    let lane = reader.lane().map_err(|err| record_error(&context, err))?;
    let words = reader
        .read_to_end()
        .map_err(|err| record_error(&context, err))?;

    if matches!(format, OutputFormat::Raw) {
        let shown = args.limit.map_or(words.len(), |n| n.min(words.len()));
        print_raw_words(&words[..shown]);
        return Ok(SUCCESS);
    }

    let out = decode(lane_label(lane), &words, args.limit);
    match format {
        OutputFormat::Json => print_json(&out),
        OutputFormat::Table => {
            let mut t = table(vec!["WORD", "RECORD", "FIELDS", "ERRORS"]);
            for e in &out.entries {
                let (kind, fields) = describe(&e.record);
                t.add_row(vec![e.word.to_string(), kind.to_string(), fields, e.errors.join(",")]);
            }
            println!("{t}");
            println!(
                "lane {}: {} words, {} frames, {} records, {} stray",
                out.lane, out.words, out.frames, out.records, out.stray_words
            );
        }
        OutputFormat::Pretty | OutputFormat::Raw => {
            for e in &out.entries {
                let (kind, fields) = describe(&e.record);
                let errors = if e.errors.is_empty() {
                    String::new()
                } else {
                    format!(" errors={}", e.errors.join(","))
                };
                println!("{:>6} {kind:<9} {fields}{errors}", e.word);
            }
        }
    }
    Ok(SUCCESS)
}

fn decode(lane: String, words: &[StreamWord], limit: Option<usize>) -> InspectOutput {
    let mut decoder = RecordDecoder::new();
    let mut entries = Vec::new();
    let mut records = 0;
    for (idx, w) in words.iter().enumerate() {
        let Some(record) = decoder.feed(&w.word) else {
            continue;
        };
        records += 1;
        if limit.is_none_or(|n| entries.len() < n) {
            entries.push(Entry {
                word: idx,
                record: record.into(),
                errors: error_names(w.word.err),
            });
        }
    }
    InspectOutput {
        lane,
        words: words.len(),
        frames: words.iter().filter(|w| w.eop).count(),
        records,
        stray_words: decoder.stray(),
        entries,
    }
}

fn describe(record: &RecordView) -> (&'static str, String) {
    match record {
        RecordView::Header {
            timestamp,
            serial,
            subheader_count,
            hit_count,
        } => (
            "header",
            format!("ts={timestamp} serial={serial} subheaders={subheader_count} hits={hit_count}"),
        ),
        RecordView::Subheader { slot, hit_count } => {
            ("subheader", format!("slot={slot} hits={hit_count}"))
        }
        RecordView::Hit { value } => ("hit", format!("{value:#010x}")),
        RecordView::Trailer => ("trailer", String::new()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pktsched_record::{to_words, ErrorFlags, Header, Subheader, Word};

    fn stream() -> Vec<StreamWord> {
        let mut words = to_words(&[
            Record::Header(Header {
                timestamp: 5,
                serial: 1,
                subheader_count: 1,
                hit_count: 2,
            }),
            Record::Subheader(Subheader { slot: 0, hit_count: 2 }),
            Record::Hit(0xA),
            Record::Hit(0xB),
            Record::Trailer,
        ]);
        words[8] = words[8].with_err(ErrorFlags::HIT);
        let last = words.len() - 1;
        words
            .into_iter()
            .enumerate()
            .map(|(i, word)| StreamWord {
                word,
                sop: i == 0,
                eop: i == last,
            })
            .collect()
    }

    #[test]
    fn decodes_one_frame() {
        let out = decode("0".into(), &stream(), None);
        assert_eq!(out.words, 9);
        assert_eq!(out.frames, 1);
        assert_eq!(out.records, 5);
        assert_eq!(out.stray_words, 0);
        assert_eq!(out.entries[0].word, 4);
        assert_eq!(out.entries[2].record, RecordView::Hit { value: 0xA });
        assert_eq!(out.entries[4].errors, vec!["hit_error"]);
    }

    #[test]
    fn limit_caps_entries_not_counts() {
        let out = decode("0".into(), &stream(), Some(2));
        assert_eq!(out.entries.len(), 2);
        assert_eq!(out.records, 5);
    }

    #[test]
    fn stray_control_words_are_counted() {
        let mut words = stream();
        words.insert(0, StreamWord::from(Word::control(0x55)));
        assert_eq!(decode("0".into(), &words, None).stray_words, 1);
    }

    #[test]
    fn header_serialises_with_tag() {
        let out = decode("egress".into(), &stream(), Some(1));
        let json = serde_json::to_value(&out).unwrap();
        assert_eq!(json["entries"][0]["record"], "header");
        assert_eq!(json["entries"][0]["timestamp"], 5);
        assert_eq!(json["lane"], "egress");
    }
}
