//! End-to-end pipeline scenarios: lane words in, egress words out.

use pktsched_core::{always_ready, Driver, Scheduler, SchedulerConfig};
use pktsched_record::{
    to_words, ErrorFlags, Header, Record, RecordDecoder, StreamWord, Subheader, Word, HEADER_WORDS,
    TRAILER_WORDS,
};

fn frame(ts: u64, serial: u32, blocks: &[(u8, Vec<u32>)]) -> Vec<Record> {
    let mut out = vec![Record::Header(Header {
        timestamp: ts,
        serial,
        subheader_count: blocks.len() as u16,
        hit_count: blocks.iter().map(|(_, h)| h.len() as u16).sum(),
    })];
    for (slot, hits) in blocks {
        out.push(Record::Subheader(Subheader {
            slot: *slot,
            hit_count: hits.len() as u16,
        }));
        out.extend(hits.iter().map(|h| Record::Hit(*h)));
    }
    out.push(Record::Trailer);
    out
}

fn run(config: SchedulerConfig, lanes: Vec<Vec<Word>>) -> (Scheduler, Vec<StreamWord>) {
    run_with(config, lanes, always_ready)
}

fn run_with(
    config: SchedulerConfig,
    lanes: Vec<Vec<Word>>,
    ready: impl FnMut(u64) -> bool,
) -> (Scheduler, Vec<StreamWord>) {
    let sched = Scheduler::new(config).unwrap();
    let mut driver = Driver::new(sched, lanes, ready).unwrap();
    driver.run().unwrap();
    driver.into_parts()
}

fn records(egress: &[StreamWord]) -> Vec<Record> {
    let words: Vec<Word> = egress.iter().map(|w| w.word).collect();
    RecordDecoder::decode_all(&words)
}

fn hits(egress: &[StreamWord]) -> Vec<u32> {
    records(egress)
        .into_iter()
        .filter_map(|r| match r {
            Record::Hit(h) => Some(h),
            _ => None,
        })
        .collect()
}

/// Step the scheduler with per-lane word lists until all are used up,
/// collecting egress.
fn feed(sched: &mut Scheduler, lanes: &[Vec<Word>], egress: &mut Vec<StreamWord>) {
    let longest = lanes.iter().map(Vec::len).max().unwrap_or(0);
    for i in 0..longest {
        let ingress: Vec<Option<Word>> = lanes.iter().map(|l| l.get(i).copied()).collect();
        egress.extend(sched.step(&ingress, true).unwrap());
    }
}

fn settle(sched: &mut Scheduler, egress: &mut Vec<StreamWord>) {
    sched.set_draining(true);
    let idle = vec![None; sched.lanes()];
    for _ in 0..10_000 {
        if sched.is_quiescent() {
            return;
        }
        egress.extend(sched.step(&idle, true).unwrap());
    }
    panic!("pipeline did not settle");
}

#[test]
fn two_lanes_one_block_each() {
    let lane0 = to_words(&frame(10, 0, &[(0, vec![0xA0, 0xA1])]));
    let lane1 = to_words(&frame(10, 0, &[(0, vec![0xB0, 0xB1])]));
    let (_, egress) = run(SchedulerConfig::default(), vec![lane0, lane1]);

    assert_eq!(egress.len(), HEADER_WORDS + 1 + 4 + TRAILER_WORDS);
    assert!(egress[0].sop);
    assert!(egress.last().unwrap().eop);
    assert_eq!(egress.iter().filter(|w| w.sop || w.eop).count(), 2);
    assert_eq!(hits(&egress), vec![0xA0, 0xA1, 0xB0, 0xB1]);
}

#[test]
fn empty_subheader_still_marks_its_slot() {
    let lane0 = to_words(&frame(3, 0, &[(0, vec![])]));
    let lane1 = to_words(&frame(3, 0, &[(0, vec![])]));
    let (sched, egress) = run(SchedulerConfig::default(), vec![lane0, lane1]);

    assert_eq!(egress.len(), HEADER_WORDS + 1 + TRAILER_WORDS);
    let recs = records(&egress);
    assert_eq!(recs[1], Record::Subheader(Subheader { slot: 0, hit_count: 0 }));
    assert_eq!(sched.diagnostics().totals.subheaders_written, 1);
}

#[test]
fn credit_exhaustion_masks_then_lane_resumes() {
    let config = SchedulerConfig {
        descriptor_queue_depth: 3,
        ..SchedulerConfig::default()
    };
    let mut sched = Scheduler::new(config).unwrap();
    let mut egress = Vec::new();

    let blocks = |base: u32| vec![(0, vec![base]), (1, vec![base + 1]), (2, vec![base + 2])];
    let a0 = to_words(&frame(0, 0, &blocks(0x100)));
    let a1 = to_words(&frame(0, 0, &blocks(0x200)));
    let b0 = to_words(&frame(100, 1, &[(0, vec![0x110, 0x111])]));
    let b1 = to_words(&frame(100, 1, &[(0, vec![0x210, 0x211])]));

    // Lane 1 is silent while lane 0 sends a whole frame: lane 0's
    // descriptors pile up and its credit runs dry.
    feed(&mut sched, &[a0, vec![]], &mut egress);
    let lane0 = *sched.parsers()[0].counters();
    assert_eq!(lane0.credit_masks, 2);
    assert_eq!(lane0.descriptors_dropped, 0);
    // The last block's zero-length descriptor waits for credit.
    assert!(sched.parsers()[0].has_pending_mask());

    // Lane 1 catches up; frame A is placed and lane 0's credit flows back.
    feed(&mut sched, &[vec![], a1], &mut egress);
    feed(&mut sched, &[b0, vec![]], &mut egress);
    feed(&mut sched, &[vec![], b1], &mut egress);
    settle(&mut sched, &mut egress);

    assert_eq!(
        hits(&egress),
        vec![0x100, 0x200, 0x201, 0x202, 0x110, 0x111, 0x210, 0x211]
    );
    assert_eq!(sched.parsers()[0].counters().credit_masks, 2);
    assert_eq!(sched.parsers()[0].counters().descriptors_dropped, 0);
    assert!(!sched.parsers()[0].has_pending_mask());
    assert_eq!(sched.diagnostics().totals.headers_written, 2);
}

fn two_frame_lanes(hits_per_block: u32) -> Vec<Vec<Word>> {
    (0..2u32)
        .map(|lane| {
            let mut records = Vec::new();
            for f in 0..2u32 {
                let base = lane * 0x100 + f * 0x10;
                let hits = (0..hits_per_block).map(|h| base + h).collect();
                records.extend(frame(u64::from(f) * 8, f, &[(0, hits)]));
            }
            to_words(&records)
        })
        .collect()
}

#[test]
fn exact_fit_frame_does_not_spill() {
    // Each frame: span 11, reserved 12. After the first frame 12 words are
    // left, exactly the second frame's reservation.
    let config = SchedulerConfig {
        storage_words: 46,
        tiles: 2,
        ..SchedulerConfig::default()
    };
    let (sched, egress) = run(config, two_frame_lanes(2));
    let diag = sched.diagnostics();
    assert_eq!(diag.mapper.spills, 0);
    assert_eq!(diag.totals.frames_presented, 2);
    assert_eq!(egress.len(), 22);
}

#[test]
fn one_word_short_spills() {
    let config = SchedulerConfig {
        storage_words: 44,
        tiles: 2,
        ..SchedulerConfig::default()
    };
    let (sched, egress) = run(config, two_frame_lanes(2));
    let diag = sched.diagnostics();
    assert_eq!(diag.mapper.spills, 1);
    assert_eq!(diag.totals.frames_presented, 2);
    assert_eq!(egress.len(), 22);
}

#[test]
fn frame_crossing_one_tile_boundary_is_unbroken() {
    // Tiles of 16 words; frames of 9. The second frame starts at word 9 and
    // its last two words land in tile 1.
    let config = SchedulerConfig {
        storage_words: 32,
        tiles: 2,
        ..SchedulerConfig::default()
    };
    let (sched, egress) = run(config, two_frame_lanes(1));
    let diag = sched.diagnostics();
    assert_eq!(diag.mapper.spills, 1);
    assert_eq!(diag.presenter.counters.tile_crossings, 1);
    assert_eq!(diag.presenter.counters.tile_changes, 1);
    assert_eq!(diag.presenter.tile, 1);

    assert_eq!(egress.len(), 18);
    assert_eq!(hits(&egress), vec![0x000, 0x100, 0x010, 0x110]);
    let second = records(&egress[9..]);
    assert!(matches!(second[0], Record::Header(Header { timestamp: 8, serial: 1, .. })));
    assert_eq!(second.last(), Some(&Record::Trailer));
}

fn single_lane_stream() -> Vec<Record> {
    let mut records = Vec::new();
    for f in 0..4u32 {
        let blocks = vec![
            (0, vec![f * 100, f * 100 + 1]),
            (1, vec![]),
            (3, vec![f * 100 + 2, f * 100 + 3, f * 100 + 4]),
        ];
        records.extend(frame(u64::from(f) * 10, f, &blocks));
    }
    records
}

#[test]
fn clean_single_lane_round_trip() {
    let config = SchedulerConfig {
        lanes: 1,
        ..SchedulerConfig::default()
    };
    let input = single_lane_stream();
    let (_, egress) = run(config, vec![to_words(&input)]);
    assert_eq!(records(&egress), input);
}

#[test]
fn backpressure_never_duplicates_or_drops() {
    let lanes: Vec<Vec<Word>> = (0..3u32)
        .map(|lane| {
            let mut records = Vec::new();
            for f in 0..5u32 {
                let hits = (0..(lane + f) % 4 + 1).map(|h| lane << 16 | f << 8 | h).collect();
                records.extend(frame(u64::from(f) * 4, f, &[(0, hits), (2, vec![lane])]));
            }
            to_words(&records)
        })
        .collect();
    let config = SchedulerConfig {
        lanes: 3,
        ..SchedulerConfig::default()
    };

    let (_, smooth) = run(config.clone(), lanes.clone());
    let (stalled_sched, stalled) = run_with(config, lanes, |r| r % 3 != 0 && r % 11 > 2);

    assert!(!smooth.is_empty());
    assert_eq!(smooth, stalled);
    assert!(stalled_sched.diagnostics().totals.restarts > 0);
}

#[test]
fn alternating_consumer_still_drains() {
    let lanes: Vec<Vec<Word>> = (0..2u32)
        .map(|lane| {
            let mut records = Vec::new();
            for f in 0..6u32 {
                let hits = (0..3).map(|h| lane << 16 | f << 8 | h).collect();
                records.extend(frame(u64::from(f) * 4, f, &[(0, hits), (1, vec![lane])]));
            }
            to_words(&records)
        })
        .collect();
    let (_, smooth) = run(SchedulerConfig::default(), lanes.clone());
    assert!(!smooth.is_empty());

    for depth in 1..=3 {
        let config = SchedulerConfig {
            presenter_pipeline_depth: depth,
            ..SchedulerConfig::default()
        };
        let (sched, every_other) = run_with(config.clone(), lanes.clone(), |r| r % 2 != 0);
        assert_eq!(every_other, smooth, "depth {depth}, odd rounds");
        assert!(sched.diagnostics().totals.restarts > 0);

        let (_, even) = run_with(config, lanes.clone(), |r| r % 2 == 0);
        assert_eq!(even, smooth, "depth {depth}, even rounds");
    }
}

#[test]
fn egress_timestamps_strictly_increase() {
    let lanes: Vec<Vec<Word>> = (0..2u32)
        .map(|lane| {
            let mut records = Vec::new();
            for f in 0..6u64 {
                records.extend(frame(100 + f * 5, 0, &[(0, vec![lane]), (1, vec![lane + 10])]));
            }
            // A frame from the past is rejected by the parser.
            if lane == 0 {
                records.extend(frame(50, 0, &[(0, vec![99])]));
            }
            to_words(&records)
        })
        .collect();
    let (sched, egress) = run(SchedulerConfig::default(), lanes);

    let stamps: Vec<u64> = records(&egress)
        .into_iter()
        .filter_map(|r| match r {
            Record::Header(h) => Some(h.timestamp),
            _ => None,
        })
        .collect();
    assert_eq!(stamps, vec![100, 105, 110, 115, 120, 125]);
    assert!(stamps.windows(2).all(|w| w[0] < w[1]));
    assert_eq!(sched.parsers()[0].counters().frame_errors, 1);
}

#[test]
fn hit_error_reaches_the_trailer() {
    let mut lane0 = to_words(&frame(0, 0, &[(0, vec![1, 2, 3])]));
    // Corrupt the second hit.
    lane0[HEADER_WORDS + 2] = lane0[HEADER_WORDS + 2].with_err(ErrorFlags::HIT);
    let lane1 = to_words(&frame(0, 0, &[(0, vec![4])]));
    let (_, egress) = run(SchedulerConfig::default(), vec![lane0, lane1]);

    assert_eq!(hits(&egress), vec![1, 4]);
    let trailer = egress.last().unwrap();
    assert!(trailer.eop);
    assert!(trailer.word.err.contains(ErrorFlags::HIT));
}

#[test]
fn serial_counts_frames_not_input_serials() {
    let lane = |serials: [u32; 3]| {
        let mut records = Vec::new();
        for (i, s) in serials.iter().enumerate() {
            records.extend(frame(i as u64 * 2, *s, &[(0, vec![*s])]));
        }
        to_words(&records)
    };
    let (_, egress) = run(SchedulerConfig::default(), vec![lane([7, 8, 9]), lane([40, 41, 42])]);
    let serials: Vec<u32> = records(&egress)
        .into_iter()
        .filter_map(|r| match r {
            Record::Header(h) => Some(h.serial),
            _ => None,
        })
        .collect();
    assert_eq!(serials, vec![0, 1, 2]);
}
