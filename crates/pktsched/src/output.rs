use std::io::{IsTerminal, Write};

use clap::ValueEnum;
use comfy_table::{presets::UTF8_FULL, ContentArrangement, Table};
use pktsched_record::{ErrorFlags, StreamWord};
use serde::Serialize;

#[derive(Clone, Debug, Copy, PartialEq, Eq, ValueEnum)]
pub enum OutputFormat {
    Json,
    Table,
    Pretty,
    Raw,
}

impl OutputFormat {
    pub fn default_for_stdout() -> Self {
        if std::io::stdout().is_terminal() {
            Self::Table
        } else {
            Self::Json
        }
    }
}

pub fn print_json<T: Serialize>(value: &T) {
    println!(
        "{}",
        serde_json::to_string(value).unwrap_or_else(|_| "{}".to_string())
    );
}

pub fn table(header: Vec<&str>) -> Table {
    let mut table = Table::new();
    table
        .load_preset(UTF8_FULL)
        .set_content_arrangement(ContentArrangement::Dynamic)
        .set_header(header);
    table
}

pub fn print_raw_words(words: &[StreamWord]) {
    let mut out = std::io::stdout().lock();
    for w in words {
        if writeln!(out, "{}", raw_word(w)).is_err() {
            return;
        }
    }
    let _ = out.flush();
}

/// `data` in hex, `k` for control words, then error and frame markers.
pub fn raw_word(w: &StreamWord) -> String {
    let mut line = format!("{:08x}", w.word.data);
    if w.word.ctrl {
        line.push_str(" k");
    }
    for name in error_names(w.word.err) {
        line.push(' ');
        line.push_str(name);
    }
    if w.sop {
        line.push_str(" sop");
    }
    if w.eop {
        line.push_str(" eop");
    }
    line
}

pub fn error_names(err: ErrorFlags) -> Vec<&'static str> {
    [
        (ErrorFlags::HIT, "hit_error"),
        (ErrorFlags::BLOCK, "block_error"),
        (ErrorFlags::FRAME, "frame_error"),
    ]
    .into_iter()
    .filter(|(flag, _)| err.contains(*flag))
    .map(|(_, name)| name)
    .collect()
}

pub fn lane_label(lane: u16) -> String {
    if lane == pktsched_record::EGRESS_LANE {
        "egress".to_string()
    } else {
        lane.to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pktsched_record::Word;

    #[test]
    fn raw_word_marks_control_and_errors() {
        let w = StreamWord {
            word: Word::control(0x9C).with_err(ErrorFlags::HIT | ErrorFlags::FRAME),
            sop: false,
            eop: true,
        };
        assert_eq!(raw_word(&w), "0000009c k hit_error frame_error eop");
    }

    #[test]
    fn egress_lane_has_a_name() {
        assert_eq!(lane_label(pktsched_record::EGRESS_LANE), "egress");
        assert_eq!(lane_label(3), "3");
    }
}
