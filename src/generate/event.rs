use std::sync::Arc;

use crate::{
    assets::{Palette, Sprite},
    foundation::error::StructuresResult,
    progress::ReadyCause,
    render::BlendMode,
};

/// Deferred work the machine schedules for itself.
#[derive(Clone, Copy, Debug, PartialEq, Eq, serde::Serialize)]
pub enum Step {
    StartBuilding,
    AddBasement,
    AddFloor,
    /// End of the pause after a completed set.
    OpenSet,
    /// One partial-opacity overlay of a between-set fade.
    FadeVeil,
    /// Fade finished; reload or open the next set.
    CloseFade,
}

/// Named states of the generation machine.
#[derive(Clone, Copy, Debug, PartialEq, Eq, serde::Serialize)]
pub enum Phase {
    /// Constructed, never reset.
    Idle,
    /// Waiting for a sprite fetch to resolve.
    Loading,
    /// A fetch failed; a retry is scheduled.
    AwaitingRetry,
    Basements,
    Floors,
    /// Building done, next one scheduled.
    BetweenBuildings,
    /// Set done, next set scheduled.
    SetBreak,
    Fading,
    /// Auto-continue is off and the last set finished.
    Parked,
    /// Fetches kept failing past the retry ceiling.
    Failed,
}

impl Phase {
    pub fn is_terminal(self) -> bool {
        matches!(self, Phase::Parked | Phase::Failed)
    }
}

/// Identifies an in-flight fetch; `epoch` ties it to the run that issued it.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct FetchTicket {
    pub epoch: u64,
    pub palette: Palette,
    pub name: String,
}

/// Inputs that drive the machine.
pub enum Event {
    FetchCompleted {
        ticket: FetchTicket,
        outcome: StructuresResult<Arc<Sprite>>,
    },
    TimerFired(Step),
}

/// Summary of one processed event.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Trace {
    Fetched { name: String, ok: bool },
    /// Completion from before the last reset; dropped.
    StaleFetch { name: String },
    Timer(Step),
}

/// Outward notifications, drained with `Engine::take_notices`.
#[derive(Clone, Debug, PartialEq, serde::Serialize)]
#[serde(tag = "notice", rename_all = "snake_case")]
pub enum Notice {
    Reset {
        epoch: u64,
    },
    SetStarted {
        index: u64,
        palette: Palette,
        blend: BlendMode,
        spacing: f64,
        center_shift: f64,
        target_buildings: f64,
    },
    BuildingComposed {
        set_index: u64,
        building: u64,
        total: u64,
        sprite: String,
        floors: u32,
        basements: u32,
    },
    FetchFailed {
        name: String,
        consecutive: u32,
    },
    SetCompleted {
        index: u64,
    },
    Ready {
        cause: ReadyCause,
        buildings_composed: u64,
    },
    ExportDue {
        file_name: String,
    },
    Parked,
    Halted {
        reason: String,
    },
}
