use std::fs::File;
use std::io::{BufReader, BufWriter};
use std::path::Path;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use pktsched_core::{Diagnostics, Driver, Scheduler, SchedulerConfig};
use pktsched_record::{StreamWord, Word, WordReader, WordWriter, EGRESS_LANE};
use serde::Serialize;

use crate::cmd::RunArgs;
use crate::exit::{
    io_error, record_error, scheduler_error, CliError, CliResult, FAILURE, INTERRUPTED, SUCCESS,
    USAGE,
};
use crate::output::{print_json, table, OutputFormat};

#[derive(Serialize)]
struct RunOutput<'a> {
    lanes: usize,
    input_words: Vec<usize>,
    egress_words: usize,
    frames_out: usize,
    /// False when the run was interrupted before the pipeline drained.
    settled: bool,
    output: Option<&'a Path>,
    diagnostics: Diagnostics,
}

pub fn run(args: RunArgs, format: OutputFormat) -> CliResult<i32> {
    let config = load_config(&args)?;
    let stall = stall_pattern(&args)?;
    let inputs = args
        .inputs
        .iter()
        .enumerate()
        .map(|(lane, path)| read_lane(lane, path))
        .collect::<CliResult<Vec<_>>>()?;
    let input_words: Vec<usize> = inputs.iter().map(Vec::len).collect();

    let scheduler =
        Scheduler::new(config).map_err(|err| scheduler_error("start scheduler", err))?;
    let ready = move |round: u64| stall.is_none_or(|(every, stalled)| round % every >= stalled);
    let mut driver = Driver::new(scheduler, inputs, ready)
        .map_err(|err| scheduler_error("start scheduler", err))?;
    if let Some(max) = args.max_rounds {
        driver = driver.with_max_rounds(max);
    }

    let running = Arc::new(AtomicBool::new(true));
    install_ctrlc_handler(running.clone())?;

    tracing::info!(lanes = input_words.len(), "replaying lane streams");
    let settled = driver
        .run_while(|| running.load(Ordering::SeqCst))
        .map_err(|err| scheduler_error("run", err))?;
    if !settled {
        tracing::warn!(round = driver.scheduler().round(), "interrupted before the pipeline settled");
    }

    if let Some(path) = &args.output {
        write_egress(path, driver.egress())?;
    }

    let diagnostics = driver.scheduler().diagnostics();
    let dropped = diagnostics.totals.hits_dropped > 0 || diagnostics.totals.headers_dropped > 0;
    let out = RunOutput {
        lanes: input_words.len(),
        input_words,
        egress_words: driver.egress().len(),
        frames_out: driver.egress().iter().filter(|w| w.eop).count(),
        settled,
        output: args.output.as_deref(),
        diagnostics,
    };
    print_output(&out, format);

    if !settled {
        Ok(INTERRUPTED)
    } else if args.fail_on_drop && dropped {
        Ok(FAILURE)
    } else {
        Ok(SUCCESS)
    }
}

/// Defaults, then the config file, then individual flags.
fn load_config(args: &RunArgs) -> CliResult<SchedulerConfig> {
    let mut config = match &args.config {
        Some(path) => SchedulerConfig::from_json_file(path)
            .map_err(|err| scheduler_error(&format!("load {}", path.display()), err))?,
        None => SchedulerConfig::default(),
    };
    config.lanes = args.inputs.len();
    if let Some(v) = args.descriptor_depth {
        config.descriptor_queue_depth = v;
    }
    if let Some(v) = args.payload_depth {
        config.payload_queue_depth = v;
    }
    if let Some(v) = args.storage_words {
        config.storage_words = v;
    }
    if let Some(v) = args.tiles {
        config.tiles = v;
    }
    if let Some(v) = args.future_slack {
        config.future_slack = v;
    }
    if let Some(v) = args.quantum {
        config.arbiter_quantum = v;
    }
    if let Some(v) = args.pipeline_depth {
        config.presenter_pipeline_depth = v;
    }
    Ok(config)
}

fn stall_pattern(args: &RunArgs) -> CliResult<Option<(u64, u64)>> {
    match (args.stall_every, args.stall_for) {
        (Some(every), Some(stalled)) if stalled >= every => Err(CliError::new(
            USAGE,
            format!("--stall-for ({stalled}) must be less than --stall-every ({every})"),
        )),
        (Some(every), Some(stalled)) => Ok(Some((every, stalled))),
        _ => Ok(None),
    }
}

fn read_lane(lane: usize, path: &Path) -> CliResult<Vec<Word>> {
    let context = format!("read {}", path.display());
    let file = File::open(path).map_err(|err| io_error(&context, err))?;
    let mut reader = WordReader::new(BufReader::new(file));
    let id = reader.lane().map_err(|err| record_error(&context, err))?;
    if usize::from(id) != lane {
        tracing::warn!(lane, file_lane = id, path = %path.display(), "lane id in stream header differs from position");
    }
    let words = reader
        .read_to_end()
        .map_err(|err| record_error(&context, err))?;
    Ok(words.into_iter().map(|w| w.word).collect())
}

fn write_egress(path: &Path, egress: &[StreamWord]) -> CliResult<()> {
    let context = format!("write {}", path.display());
    let file = File::create(path).map_err(|err| io_error(&context, err))?;
    let mut writer = WordWriter::new(BufWriter::new(file), EGRESS_LANE);
    writer
        .write_words(egress)
        .map_err(|err| record_error(&context, err))?;
    writer.finish().map_err(|err| record_error(&context, err))?;
    Ok(())
}

fn install_ctrlc_handler(running: Arc<AtomicBool>) -> CliResult<()> {
    ctrlc::set_handler(move || {
        running.store(false, Ordering::SeqCst);
    })
    .map_err(|err| {
        CliError::new(
            crate::exit::INTERNAL,
            format!("signal handler setup failed: {err}"),
        )
    })
}

fn print_output(out: &RunOutput<'_>, format: OutputFormat) {
    let d = &out.diagnostics;
    let t = &d.totals;
    match format {
        OutputFormat::Json => print_json(out),
        OutputFormat::Table => {
            let mut summary = table(vec!["METRIC", "VALUE"]);
            for (name, value) in [
                ("rounds", d.round),
                ("frames out", out.frames_out as u64),
                ("egress words", out.egress_words as u64),
                ("hits written", t.hits_written),
                ("hits dropped", t.hits_dropped),
                ("subheaders written", t.subheaders_written),
                ("subheaders dropped", t.subheaders_dropped),
                ("headers written", t.headers_written),
                ("headers dropped", t.headers_dropped),
                ("contention drops", t.contention_drops),
                ("frames overwritten", t.frames_overwritten),
                ("restarts", t.restarts),
                ("warps", t.warps),
            ] {
                summary.add_row(vec![name.to_string(), value.to_string()]);
            }
            println!("{summary}");

            let mut lanes = table(vec![
                "LANE",
                "PARSER",
                "WORDS",
                "HITS",
                "DROPPED",
                "CREDIT MASKS",
                "BLOCKS MOVED",
                "SKIPPED",
            ]);
            for lane in &d.lanes {
                lanes.add_row(vec![
                    lane.lane.to_string(),
                    format!("{:?}", lane.parser_state),
                    lane.parser.words.to_string(),
                    lane.parser.hits_accepted.to_string(),
                    lane.parser.hits_dropped.to_string(),
                    lane.parser.credit_masks.to_string(),
                    lane.mover.blocks_moved.to_string(),
                    lane.mover.blocks_skipped.to_string(),
                ]);
            }
            println!("{lanes}");

            let mut tiles = table(vec!["TILE", "FILL", "EPOCH", "PENDING", "UNREAD"]);
            for tile in &d.tiles {
                tiles.add_row(vec![
                    tile.tile.to_string(),
                    tile.fill.to_string(),
                    tile.epoch.map_or_else(|| "-".to_string(), |e| e.to_string()),
                    tile.frames_pending.to_string(),
                    tile.frames_unread.to_string(),
                ]);
            }
            println!("{tiles}");
            if !out.settled {
                println!("interrupted at round {}", d.round);
            }
        }
        OutputFormat::Pretty => {
            println!(
                "rounds={} frames_out={} egress_words={} settled={}",
                d.round, out.frames_out, out.egress_words, out.settled
            );
            println!(
                "hits written={} dropped={}  subheaders written={} dropped={}  headers written={} dropped={}",
                t.hits_written,
                t.hits_dropped,
                t.subheaders_written,
                t.subheaders_dropped,
                t.headers_written,
                t.headers_dropped
            );
            for lane in &d.lanes {
                println!(
                    "lane {}: parser={:?} hits={} dropped={} credit_masks={} blocks_moved={}",
                    lane.lane,
                    lane.parser_state,
                    lane.parser.hits_accepted,
                    lane.parser.hits_dropped,
                    lane.parser.credit_masks,
                    lane.mover.blocks_moved
                );
            }
        }
        OutputFormat::Raw => {
            println!(
                "{} {} {} {}",
                out.frames_out, out.egress_words, t.hits_written, t.hits_dropped
            );
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;

    fn args() -> RunArgs {
        RunArgs {
            inputs: vec![PathBuf::from("a.pw"), PathBuf::from("b.pw"), PathBuf::from("c.pw")],
            config: None,
            output: None,
            descriptor_depth: None,
            payload_depth: None,
            storage_words: None,
            tiles: Some(8),
            future_slack: None,
            quantum: Some(16),
            pipeline_depth: None,
            stall_every: None,
            stall_for: None,
            max_rounds: None,
            fail_on_drop: false,
        }
    }

    #[test]
    fn flags_override_defaults_and_inputs_set_lanes() {
        let config = load_config(&args()).unwrap();
        assert_eq!(config.lanes, 3);
        assert_eq!(config.tiles, 8);
        assert_eq!(config.arbiter_quantum, 16);
        assert_eq!(config.storage_words, SchedulerConfig::default().storage_words);
    }

    #[test]
    fn flags_override_the_config_file() {
        let path = std::env::temp_dir().join(format!("pktsched-run-config-{}.json", std::process::id()));
        std::fs::write(&path, r#"{"tiles": 2, "future_slack": 3}"#).unwrap();
        let mut a = args();
        a.config = Some(path.clone());
        let config = load_config(&a).unwrap();
        let _ = std::fs::remove_file(&path);

        assert_eq!(config.tiles, 8);
        assert_eq!(config.future_slack, 3);
    }

    #[test]
    fn stall_must_leave_ready_rounds() {
        let mut a = args();
        a.stall_every = Some(4);
        a.stall_for = Some(4);
        assert_eq!(stall_pattern(&a).unwrap_err().code, USAGE);
        a.stall_for = Some(1);
        assert_eq!(stall_pattern(&a).unwrap(), Some((4, 1)));
    }
}
