use std::collections::VecDeque;
use std::sync::Arc;

use tracing::{debug, error, info, warn};

use crate::{
    assets::{AssetCatalog, Palette, Sprite},
    config::Config,
    export::export_file_name,
    foundation::core::Rgba8Premul,
    foundation::error::{StructuresError, StructuresResult},
    generate::event::{Event, FetchTicket, Notice, Phase, Step, Trace},
    generate::params::{BuildingPlan, SetParams, StepKind, stamp_transform},
    overlay::LoadingOverlay,
    pacing::Pacing,
    progress::ProgressGate,
    render::{BlendMode, Canvas, RasterCanvas, RecordingCanvas},
    rng::{RandomSource, SeededRandom, pick_index},
    scheduler::Scheduler,
};

/// Upper bound on events handled by one [`Engine::advance_to`] call, so a
/// zero-delay loop cannot starve the frame hooks.
const EVENTS_PER_ADVANCE: usize = 4096;

/// The building currently being stamped.
#[derive(Clone, Debug)]
pub struct BuildingState {
    pub plan: BuildingPlan,
    /// Floors stamped so far.
    pub floor: u32,
    /// Basements stamped so far.
    pub basement: u32,
}

/// Counters and per-set state of one run.
#[derive(Clone, Debug)]
pub struct RunContext {
    pub palette: Palette,
    pub blend: BlendMode,
    pub sets_started: u64,
    pub sets_completed: u64,
    pub set: Option<SetParams>,
    pub buildings_in_set: u64,
    pub building: Option<BuildingState>,
    /// Buildings composed since the last reset; never decreases otherwise.
    pub buildings_composed: u64,
    pub consecutive_failures: u32,
}

impl Default for RunContext {
    fn default() -> Self {
        Self {
            palette: Palette::Light,
            blend: BlendMode::Add,
            sets_started: 0,
            sets_completed: 0,
            set: None,
            buildings_in_set: 0,
            building: None,
            buildings_composed: 0,
            consecutive_failures: 0,
        }
    }
}

/// Generation state machine: Set -> Building -> Basements/Floors -> ...
///
/// Single-threaded and event driven. Sprite fetches are queued and resolved
/// on a later turn; every other step is a timer on the virtual clock. Each
/// step schedules its successor only after its own drawing is done, so no two
/// steps ever overlap.
pub struct Engine<K: Canvas> {
    config: Config,
    seed: u64,
    rng: Box<dyn RandomSource>,
    catalog: Box<dyn AssetCatalog>,
    canvas: K,
    overlay: Option<LoadingOverlay>,
    overlay_pick: Option<String>,
    scheduler: Scheduler<Step>,
    fetches: VecDeque<FetchTicket>,
    gate: ProgressGate,
    ctx: RunContext,
    phase: Phase,
    fast_forward: bool,
    export_requested: bool,
    epoch: u64,
    run_started_ms: u64,
    notices: Vec<Notice>,
}

impl Engine<RasterCanvas> {
    /// Engine drawing into a CPU raster buffer, seeded with `ChaCha8`.
    pub fn raster(
        config: Config,
        seed: u64,
        catalog: Box<dyn AssetCatalog>,
    ) -> StructuresResult<Self> {
        let canvas = RasterCanvas::new(config.canvas)?;
        Self::new(config, seed, Box::new(SeededRandom::new(seed)), catalog, canvas)
    }
}

impl Engine<RecordingCanvas> {
    /// Engine that records draw calls instead of rasterizing.
    pub fn recording(
        config: Config,
        seed: u64,
        catalog: Box<dyn AssetCatalog>,
    ) -> StructuresResult<Self> {
        let canvas = RecordingCanvas::new(config.canvas);
        Self::new(config, seed, Box::new(SeededRandom::new(seed)), catalog, canvas)
    }
}

impl<K: Canvas> Engine<K> {
    pub fn new(
        config: Config,
        seed: u64,
        rng: Box<dyn RandomSource>,
        catalog: Box<dyn AssetCatalog>,
        canvas: K,
    ) -> StructuresResult<Self> {
        config.validate()?;
        if canvas.size() != config.canvas {
            return Err(StructuresError::validation(format!(
                "canvas is {}x{} but config expects {}x{}",
                canvas.size().width,
                canvas.size().height,
                config.canvas.width,
                config.canvas.height
            )));
        }

        let mut engine = Self {
            gate: ProgressGate::new(&config.warmup),
            fast_forward: config.fast_forward,
            config,
            seed,
            rng,
            catalog,
            canvas,
            overlay: None,
            overlay_pick: None,
            scheduler: Scheduler::new(),
            fetches: VecDeque::new(),
            ctx: RunContext::default(),
            phase: Phase::Idle,
            export_requested: false,
            epoch: 0,
            run_started_ms: 0,
            notices: Vec::new(),
        };
        engine.prepare_overlay();
        Ok(engine)
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn seed(&self) -> u64 {
        self.seed
    }

    pub fn phase(&self) -> Phase {
        self.phase
    }

    pub fn context(&self) -> &RunContext {
        &self.ctx
    }

    pub fn canvas(&self) -> &K {
        &self.canvas
    }

    pub fn overlay(&self) -> Option<&LoadingOverlay> {
        self.overlay.as_ref()
    }

    pub fn now_ms(&self) -> u64 {
        self.scheduler.now()
    }

    pub fn pending_timers(&self) -> usize {
        self.scheduler.pending()
    }

    pub fn progress(&self) -> f64 {
        self.gate.progress(self.ctx.buildings_composed)
    }

    pub fn is_warming_up(&self) -> bool {
        self.gate.warming_up(self.ctx.buildings_composed)
    }

    /// Held fast-forward toggle: delays shrink to 1 ms while on.
    pub fn set_fast_forward(&mut self, on: bool) {
        self.fast_forward = on;
    }

    /// Ask for an export; it is announced as [`Notice::ExportDue`] by the
    /// first [`Engine::frame`] outside warm-up.
    pub fn request_export(&mut self) {
        self.export_requested = true;
    }

    pub fn take_notices(&mut self) -> Vec<Notice> {
        std::mem::take(&mut self.notices)
    }

    /// Edit the configuration between steps. Ranges take effect at the next
    /// draw that uses them. Warm-up, fast-forward and loading edits apply
    /// immediately; an already fired ready signal stays fired until reload.
    pub fn update_config(&mut self, edit: impl FnOnce(&mut Config)) -> StructuresResult<()> {
        let mut next = self.config.clone();
        edit(&mut next);
        next.validate()?;
        if next.canvas != self.config.canvas {
            return Err(StructuresError::validation(
                "the composition buffer cannot be resized mid-run",
            ));
        }

        let warmup_changed = next.warmup != self.config.warmup;
        let overlay_changed = warmup_changed
            || next.loading != self.config.loading
            || next.background != self.config.background;
        if next.fast_forward != self.config.fast_forward {
            self.fast_forward = next.fast_forward;
        }
        self.config = next;

        if warmup_changed {
            self.gate.reconfigure(&self.config.warmup);
            debug!(
                enabled = self.config.warmup.enabled,
                target = self.gate.target(),
                latched = self.gate.is_latched(),
                "warm-up reconfigured"
            );
        }
        if overlay_changed {
            self.build_overlay();
        }
        Ok(())
    }

    /// Time of the next pending event, if any.
    pub fn next_wakeup(&self) -> Option<u64> {
        if !self.fetches.is_empty() {
            return Some(self.scheduler.now());
        }
        self.scheduler.next_due()
    }

    /// User-facing reset. Ignored while warm-up is still building up, unless
    /// the run has already parked or halted.
    pub fn request_reset(&mut self) -> bool {
        if self.is_warming_up() && !self.phase.is_terminal() {
            debug!("reset ignored during warm-up");
            return false;
        }
        self.reset();
        true
    }

    /// Clear the buffer, drop all pending work, zero the counters and open a
    /// fresh set. The buffer keeps its allocation.
    #[tracing::instrument(skip(self))]
    pub fn reset(&mut self) {
        info!(epoch = self.epoch + 1, "reset");
        self.epoch += 1;
        let bg = self.background();
        self.canvas.clear(bg);
        let dropped = self.scheduler.cancel_all();
        let dropped_fetches = self.fetches.len();
        self.fetches.clear();
        debug!(dropped, dropped_fetches, "cancelled pending work");
        self.ctx = RunContext::default();
        self.notices.push(Notice::Reset { epoch: self.epoch });
        self.start_set();
    }

    /// Restart the run from its seed, as if the process had just started.
    #[tracing::instrument(skip(self))]
    pub fn reload(&mut self) {
        info!("reloading run");
        self.rng.restart();
        self.gate.rearm();
        self.run_started_ms = self.scheduler.now();
        self.prepare_overlay();
        self.reset();
    }

    /// Process exactly one pending event regardless of its due time.
    pub fn pump_one(&mut self) -> StructuresResult<Option<Trace>> {
        if let Some(trace) = self.resolve_next_fetch() {
            return trace.map(Some);
        }
        match self.scheduler.pop_due(u64::MAX) {
            Some(step) => self.dispatch(Event::TimerFired(step)).map(Some),
            None => Ok(None),
        }
    }

    /// Handle fetch completions and every timer due by `now_ms`, then move the
    /// clock to `now_ms`. Returns the number of events handled; when the
    /// per-call bound is hit the clock stays at the last handled event.
    pub fn advance_to(&mut self, now_ms: u64) -> StructuresResult<usize> {
        let mut processed = 0usize;
        while processed < EVENTS_PER_ADVANCE {
            if let Some(trace) = self.resolve_next_fetch() {
                trace?;
                processed += 1;
                continue;
            }
            let Some(step) = self.scheduler.pop_due(now_ms) else {
                self.scheduler.advance_clock(now_ms);
                break;
            };
            self.dispatch(Event::TimerFired(step))?;
            processed += 1;
        }
        Ok(processed)
    }

    /// Per-frame hooks: time-based ready signal, loading overlay, deferred
    /// export.
    pub fn frame(&mut self) -> StructuresResult<()> {
        self.poll_ready();

        let composed = self.ctx.buildings_composed;
        let warming = self.gate.warming_up(composed);
        if warming && let Some(overlay) = self.overlay.as_mut() {
            overlay.render(self.gate.display_progress(composed))?;
            let plans = self.catalog.list(Palette::Light).len();
            debug!(
                caption = %LoadingOverlay::caption(composed, self.gate.target(), plans),
                "loading"
            );
        }

        // A parked machine never finishes warm-up, so it may export anyway.
        if self.export_requested && (!warming || self.phase.is_terminal()) {
            self.export_requested = false;
            let file_name = export_file_name(self.seed, self.scheduler.now());
            self.notices.push(Notice::ExportDue { file_name });
        }
        Ok(())
    }

    /// Transition function. Events a phase does not accept are logged and
    /// dropped; fetch completions from an earlier epoch are always dropped.
    pub fn dispatch(&mut self, event: Event) -> StructuresResult<Trace> {
        match event {
            Event::FetchCompleted { ticket, outcome } => {
                if ticket.epoch != self.epoch {
                    debug!(name = %ticket.name, "dropping fetch from before reset");
                    return Ok(Trace::StaleFetch { name: ticket.name });
                }
                let trace = Trace::Fetched {
                    name: ticket.name.clone(),
                    ok: outcome.is_ok(),
                };
                match (self.phase, outcome) {
                    (Phase::Loading, Ok(sprite)) => self.compose_building(sprite),
                    (Phase::Loading, Err(err)) => self.fetch_failed(ticket, err),
                    (phase, _) => {
                        warn!(?phase, name = %ticket.name, "ignoring fetch outside loading")
                    }
                }
                Ok(trace)
            }
            Event::TimerFired(step) => {
                match (self.phase, step) {
                    (Phase::AwaitingRetry | Phase::BetweenBuildings, Step::StartBuilding) => {
                        self.start_building()
                    }
                    (Phase::Basements, Step::AddBasement) => self.add_basement()?,
                    (Phase::Floors, Step::AddFloor) => self.add_floor()?,
                    (Phase::SetBreak, Step::OpenSet) => self.open_set(),
                    (_, Step::FadeVeil) => self.fade_veil(),
                    (Phase::Fading, Step::CloseFade) => self.close_set_break(),
                    (phase, step) => {
                        warn!(?phase, ?step, "ignoring timer not accepted in this phase")
                    }
                }
                Ok(Trace::Timer(step))
            }
        }
    }

    fn resolve_next_fetch(&mut self) -> Option<StructuresResult<Trace>> {
        let ticket = self.fetches.pop_front()?;
        let outcome = self.catalog.fetch(ticket.palette, &ticket.name);
        Some(self.dispatch(Event::FetchCompleted { ticket, outcome }))
    }

    fn start_set(&mut self) {
        self.ctx.sets_started += 1;
        self.scheduler.cancel_all();
        if self.config.flow.set_clean {
            let bg = self.background();
            self.canvas.clear(bg);
        }

        let params = SetParams::draw(
            self.ctx.sets_started,
            self.ctx.palette,
            &self.config,
            self.rng.as_mut(),
        );
        info!(
            index = params.index,
            palette = ?params.palette,
            blend = ?params.blend,
            spacing = params.spacing,
            buildings = params.target_buildings,
            "new set"
        );
        self.ctx.blend = params.blend;
        self.notices.push(Notice::SetStarted {
            index: params.index,
            palette: params.palette,
            blend: params.blend,
            spacing: params.spacing,
            center_shift: params.center_shift,
            target_buildings: params.target_buildings,
        });
        self.ctx.set = Some(params);
        self.ctx.buildings_in_set = 0;
        self.start_building();
    }

    fn start_building(&mut self) {
        let palette = self.ctx.palette;
        let names = self.catalog.list(palette);
        let Some(idx) = pick_index(self.rng.as_mut(), names.len()) else {
            self.halt(format!("the {palette:?} palette has no sprites"));
            return;
        };
        let name = names[idx].clone();
        debug!(%name, ?palette, "fetching sprite");
        self.fetches.push_back(FetchTicket {
            epoch: self.epoch,
            palette,
            name,
        });
        self.phase = Phase::Loading;
    }

    fn compose_building(&mut self, sprite: Arc<Sprite>) {
        self.ctx.consecutive_failures = 0;
        self.ctx.buildings_in_set += 1;
        self.ctx.buildings_composed += 1;

        let plan = BuildingPlan::draw(sprite, &self.config, self.canvas.size(), self.rng.as_mut());
        let p = plan.placement;
        info!(
            sprite = %plan.sprite.name,
            floors = plan.floors,
            basements = plan.basements,
            "loaded"
        );
        debug!(
            x = p.location.x,
            y = p.location.y,
            rotation = p.rotation_rad(),
            scale = p.scale,
            flipped = p.flipped,
            "placement"
        );
        self.notices.push(Notice::BuildingComposed {
            set_index: self.ctx.set.as_ref().map_or(0, |s| s.index),
            building: self.ctx.buildings_in_set,
            total: self.ctx.buildings_composed,
            sprite: plan.sprite.name.clone(),
            floors: plan.floors,
            basements: plan.basements,
        });

        let (phase, first) = if plan.basements > 0 {
            (Phase::Basements, Step::AddBasement)
        } else {
            (Phase::Floors, Step::AddFloor)
        };
        self.ctx.building = Some(BuildingState {
            plan,
            floor: 0,
            basement: 0,
        });
        self.phase = phase;
        self.poll_ready();
        self.schedule(first, ms(self.config.delays.step_ms));
    }

    fn fetch_failed(&mut self, ticket: FetchTicket, err: StructuresError) {
        self.ctx.consecutive_failures = self.ctx.consecutive_failures.saturating_add(1);
        let consecutive = self.ctx.consecutive_failures;
        warn!(name = %ticket.name, consecutive, %err, "sprite fetch failed");
        self.notices.push(Notice::FetchFailed {
            name: ticket.name.clone(),
            consecutive,
        });

        if let Some(max) = self.config.max_fetch_retries
            && consecutive > max
        {
            self.halt(format!(
                "sprite fetch failed {consecutive} times in a row (last '{}'): {err}",
                ticket.name
            ));
            return;
        }
        self.phase = Phase::AwaitingRetry;
        self.schedule(Step::StartBuilding, ms(self.config.delays.step_ms));
    }

    fn add_basement(&mut self) -> StructuresResult<()> {
        let (Some(set), Some(b)) = (self.ctx.set.as_ref(), self.ctx.building.as_mut()) else {
            return Err(StructuresError::render("basement step without a building"));
        };
        let t = stamp_transform(
            self.canvas.size(),
            set,
            &b.plan,
            StepKind::Basement,
            b.basement,
        );
        self.canvas.blend(&b.plan.sprite, t, self.ctx.blend)?;
        b.basement += 1;

        if b.basement < b.plan.basements {
            self.schedule(Step::AddBasement, ms(self.config.delays.step_ms));
        } else {
            self.phase = Phase::Floors;
            self.schedule(Step::AddFloor, ms(self.config.delays.step_ms));
        }
        Ok(())
    }

    fn add_floor(&mut self) -> StructuresResult<()> {
        if self.config.flow.floor_fade {
            let bg = self.background();
            self.canvas.veil(bg, self.config.floor_fade_opacity);
        }
        let (Some(set), Some(b)) = (self.ctx.set.as_ref(), self.ctx.building.as_mut()) else {
            return Err(StructuresError::render("floor step without a building"));
        };
        let t = stamp_transform(self.canvas.size(), set, &b.plan, StepKind::Floor, b.floor);
        self.canvas.blend(&b.plan.sprite, t, self.ctx.blend)?;
        b.floor += 1;

        let more_floors = b.floor < b.plan.floors;
        let target = set.target_buildings;
        if more_floors {
            self.schedule(Step::AddFloor, ms(self.config.delays.step_ms));
        } else if (self.ctx.buildings_in_set as f64) < target {
            self.phase = Phase::BetweenBuildings;
            self.schedule(Step::StartBuilding, ms(self.config.delays.building_ms));
        } else {
            self.continuation();
        }
        Ok(())
    }

    fn continuation(&mut self) {
        let (auto_continue, new_set) = (
            self.config.flow.auto_continue,
            self.config.flow.new_set,
        );
        if !auto_continue {
            info!("auto-continue is off; parking");
            self.phase = Phase::Parked;
            self.notices.push(Notice::Parked);
            return;
        }
        if new_set {
            let index = self.ctx.set.as_ref().map_or(0, |s| s.index);
            self.ctx.sets_completed += 1;
            self.notices.push(Notice::SetCompleted { index });
            self.phase = Phase::SetBreak;
            self.schedule(Step::OpenSet, ms(self.config.delays.new_set_ms));
        } else {
            self.phase = Phase::BetweenBuildings;
            self.schedule(Step::StartBuilding, ms(self.config.delays.building_ms));
        }
    }

    fn open_set(&mut self) {
        if self.config.flow.set_switch {
            self.ctx.palette = self.ctx.palette.toggled();
        }
        if !self.config.flow.set_fade {
            self.close_set_break();
            return;
        }

        let steps = self.config.delays.fade_steps;
        let every = self.config.delays.fade_step_ms;
        for i in 0..steps {
            self.schedule(Step::FadeVeil, (every * f64::from(i)).round() as i64);
        }
        self.schedule(Step::CloseFade, (every * f64::from(steps)).round() as i64);
        self.phase = Phase::Fading;
    }

    fn close_set_break(&mut self) {
        if self.config.flow.reload {
            self.reload();
        } else {
            self.start_set();
        }
    }

    fn fade_veil(&mut self) {
        let bg = self.background();
        self.canvas.veil(bg, self.config.set_fade_opacity);
    }

    fn halt(&mut self, reason: String) {
        error!(%reason, "generation halted");
        self.scheduler.cancel_all();
        self.fetches.clear();
        self.phase = Phase::Failed;
        self.notices.push(Notice::Halted { reason });
    }

    fn poll_ready(&mut self) {
        let elapsed = self.scheduler.now().saturating_sub(self.run_started_ms);
        let composed = self.ctx.buildings_composed;
        if let Some(cause) = self.gate.poll(composed, elapsed) {
            info!(?cause, composed, "ready");
            self.notices.push(Notice::Ready {
                cause,
                buildings_composed: composed,
            });
        }
    }

    /// Pacing is re-evaluated at every call; warm-up can end mid-run.
    fn schedule(&mut self, step: Step, requested_ms: i64) {
        let pacing = Pacing {
            warming_up: self.gate.warming_up(self.ctx.buildings_composed),
            fast_forward: self.fast_forward,
        };
        self.scheduler.schedule(step, pacing.delay(requested_ms));
    }

    fn prepare_overlay(&mut self) {
        self.overlay_pick = None;
        if self.config.warmup.enabled {
            // The pick is drawn even when the overlay is hidden, so toggling it
            // leaves the generation sequence untouched.
            let names = self.catalog.list(Palette::Light);
            self.overlay_pick =
                pick_index(self.rng.as_mut(), names.len()).map(|idx| names[idx].clone());
        }
        self.build_overlay();
    }

    fn build_overlay(&mut self) {
        self.overlay = None;
        if !self.config.warmup.enabled || !self.config.loading.show {
            return;
        }
        let Some(name) = self.overlay_pick.clone() else {
            return;
        };
        let overlay = self
            .catalog
            .fetch(Palette::Light, &name)
            .and_then(|s| LoadingOverlay::new(s, &self.config.loading, self.config.background));
        match overlay {
            Ok(o) => self.overlay = Some(o),
            Err(err) => warn!(%name, %err, "loading overlay unavailable"),
        }
    }

    fn background(&self) -> Rgba8Premul {
        Rgba8Premul::gray(self.config.background)
    }
}

fn ms(v: u64) -> i64 {
    i64::try_from(v).unwrap_or(i64::MAX)
}
