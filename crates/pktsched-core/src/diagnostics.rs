//! Read-only snapshot of pipeline state and counters.

use serde::Serialize;

use crate::allocator::{AllocatorCounters, AllocatorState};
use crate::arbiter::ArbiterCounters;
use crate::frame_table::{MapperCounters, PresenterCounters, PresenterState, Spill};
use crate::mover::{MoverCounters, MoverState};
use crate::parser::{ParserCounters, ParserState};
use crate::scheduler::Scheduler;

#[derive(Debug, Clone, Serialize)]
pub struct CreditSnapshot {
    pub available: usize,
    pub max: usize,
}

#[derive(Debug, Clone, Serialize)]
pub struct LaneDiagnostics {
    pub lane: usize,
    pub parser_state: ParserState,
    pub descriptor_credit: CreditSnapshot,
    pub payload_credit: CreditSnapshot,
    pub descriptors_queued: usize,
    pub handles_queued: usize,
    pub mover_state: MoverState,
    pub parser: ParserCounters,
    pub mover: MoverCounters,
}

#[derive(Debug, Clone, Serialize)]
pub struct AllocatorDiagnostics {
    pub state: AllocatorState,
    /// Serial the next frame will carry.
    pub serial: u32,
    pub running_timestamp: u64,
    pub frame_open: bool,
    #[serde(flatten)]
    pub counters: AllocatorCounters,
}

#[derive(Debug, Clone, Serialize)]
pub struct TileDiagnostics {
    pub tile: usize,
    pub fill: usize,
    pub epoch: Option<u64>,
    pub frames_pending: usize,
    pub frames_completed: usize,
    pub frames_unread: usize,
    pub spill: Option<Spill>,
}

#[derive(Debug, Clone, Serialize)]
pub struct PresenterDiagnostics {
    pub state: PresenterState,
    pub tile: usize,
    #[serde(flatten)]
    pub counters: PresenterCounters,
}

/// Pipeline-wide totals.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct Totals {
    pub hits_written: u64,
    /// Hits lost in parsing or placement.
    pub hits_dropped: u64,
    pub subheaders_written: u64,
    /// Blocks rejected by a parser or discarded by the allocator.
    pub subheaders_dropped: u64,
    pub headers_written: u64,
    /// Frames masked by a parser or not placed by the allocator.
    pub headers_dropped: u64,
    pub frames_presented: u64,
    pub words_presented: u64,
    pub contention_drops: u64,
    pub frames_overwritten: u64,
    pub restarts: u64,
    pub warps: u64,
}

#[derive(Debug, Clone, Serialize)]
pub struct Diagnostics {
    pub round: u64,
    pub resets: u64,
    pub lanes: Vec<LaneDiagnostics>,
    pub allocator: AllocatorDiagnostics,
    pub arbiter: ArbiterCounters,
    pub mapper: MapperCounters,
    pub tiles: Vec<TileDiagnostics>,
    pub presenter: PresenterDiagnostics,
    pub totals: Totals,
}

impl Diagnostics {
    pub(crate) fn capture(s: &Scheduler) -> Self {
        let lanes: Vec<LaneDiagnostics> = s
            .parsers()
            .iter()
            .zip(s.staging())
            .zip(s.movers())
            .map(|((parser, staging), mover)| LaneDiagnostics {
                lane: parser.lane(),
                parser_state: parser.state(),
                descriptor_credit: CreditSnapshot {
                    available: staging.descriptor_credit().available(),
                    max: staging.descriptor_credit().max(),
                },
                payload_credit: CreditSnapshot {
                    available: staging.payload_credit().available(),
                    max: staging.payload_credit().max(),
                },
                descriptors_queued: staging.descriptors_queued(),
                handles_queued: staging.handles_queued(),
                mover_state: mover.state(),
                parser: *parser.counters(),
                mover: *mover.counters(),
            })
            .collect();

        let table = s.frame_table();
        let tiles = table
            .trackers()
            .iter()
            .enumerate()
            .map(|(tile, t)| TileDiagnostics {
                tile,
                fill: t.fill(),
                epoch: t.epoch(),
                frames_pending: t.headers_written() - t.trailers_written(),
                frames_completed: t.trailers_written(),
                frames_unread: t.unread(),
                spill: t.spill(),
            })
            .collect();

        let alloc = s.allocator();
        let ac = *alloc.counters();
        let mc = *table.mapper().counters();
        let pc = *table.presenter().counters();

        let parser_sum = |f: fn(&ParserCounters) -> u64| -> u64 {
            s.parsers().iter().map(|p| f(p.counters())).sum()
        };
        let totals = Totals {
            hits_written: ac.hits_written,
            hits_dropped: ac.hits_dropped + parser_sum(|c| c.hits_dropped),
            subheaders_written: ac.subheaders_written,
            subheaders_dropped: ac.subheaders_dropped + parser_sum(|c| c.block_errors),
            headers_written: ac.headers_written,
            headers_dropped: ac.headers_dropped + parser_sum(|c| c.frames_masked),
            frames_presented: pc.frames_presented,
            words_presented: pc.words_presented,
            contention_drops: mc.contention_drops,
            frames_overwritten: mc.frames_overwritten,
            restarts: pc.restarts,
            warps: pc.warps,
        };

        Self {
            round: s.round(),
            resets: s.resets(),
            lanes,
            allocator: AllocatorDiagnostics {
                state: alloc.state(),
                serial: alloc.serial(),
                running_timestamp: alloc.running_timestamp(),
                frame_open: alloc.has_open_frame(),
                counters: ac,
            },
            arbiter: s.arbiter().counters().clone(),
            mapper: mc,
            tiles,
            presenter: PresenterDiagnostics {
                state: table.presenter().state(),
                tile: table.presenter().tile(),
                counters: pc,
            },
            totals,
        }
    }
}
