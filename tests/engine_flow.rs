use understructures::{
    BlendMode, CanvasOp, Config, Engine, MemoryCatalog, Notice, Palette, Phase, ReadyCause,
    RecordingCanvas, Span, Sprite, Step, SurfaceSize, Trace, export_file_name,
};

fn small_config() -> Config {
    let mut cfg = Config {
        canvas: SurfaceSize {
            width: 96,
            height: 64,
        },
        floors: Span::new(3.0, 7.0),
        buildings_per_set: Span::new(2.0, 4.0),
        ..Config::default()
    };
    cfg.warmup.enabled = false;
    cfg
}

fn catalog() -> MemoryCatalog {
    MemoryCatalog::new()
        .with_sprite(
            Palette::Light,
            Sprite::solid("l0.png", 8, 12, [200, 200, 200, 255]),
        )
        .with_sprite(
            Palette::Light,
            Sprite::solid("l1.png", 6, 10, [255, 255, 255, 255]),
        )
        .with_sprite(Palette::Dark, Sprite::solid("d0.png", 8, 8, [10, 10, 10, 255]))
}

fn started(cfg: Config, seed: u64, catalog: MemoryCatalog) -> Engine<RecordingCanvas> {
    let mut e = Engine::recording(cfg, seed, Box::new(catalog)).unwrap();
    e.reset();
    e
}

fn drain(e: &mut Engine<RecordingCanvas>, max: usize) -> Vec<Trace> {
    let mut out = Vec::new();
    while out.len() < max {
        match e.pump_one().unwrap() {
            Some(t) => out.push(t),
            None => break,
        }
    }
    out
}

#[test]
fn same_seed_replays_identical_draw_sequence() {
    let run = |seed| {
        let mut e = started(small_config(), seed, catalog());
        drain(&mut e, 600);
        e.canvas().ops().to_vec()
    };
    let a = run(7);
    let b = run(7);
    let c = run(8);
    assert!(a.len() > 20);
    assert_eq!(a, b);
    assert_ne!(a, c);
}

#[test]
fn reset_drops_every_pending_step() {
    let mut e = started(small_config(), 3, catalog());
    let mut guard = 0;
    while !(e.phase() == Phase::Floors
        && e.context().building.as_ref().is_some_and(|b| b.floor > 0))
    {
        e.pump_one().unwrap();
        guard += 1;
        assert!(guard < 1000, "never reached the middle of a building");
    }
    assert!(e.pending_timers() > 0);
    e.take_notices();

    e.reset();
    assert_eq!(e.pending_timers(), 0);
    assert_eq!(e.context().buildings_composed, 0);
    assert_eq!(e.take_notices().first(), Some(&Notice::Reset { epoch: 2 }));

    // Only the new set's first fetch is left.
    assert!(matches!(
        e.pump_one().unwrap(),
        Some(Trace::Fetched { ok: true, .. })
    ));
    assert_eq!(e.context().buildings_composed, 1);
    assert_eq!(
        e.context().building.as_ref().map(|b| (b.floor, b.basement)),
        Some((0, 0))
    );
}

#[test]
fn each_building_stamps_its_basements_then_its_floors() {
    let mut cfg = small_config();
    cfg.flow.basements = true;
    cfg.floors = Span::new(12.0, 16.0);
    let mut e = started(cfg, 11, catalog());

    let mut finished = 0;
    let mut basements_total = 0;
    let mut current: Option<(u32, u32)> = None;
    let (mut floors, mut bases) = (0u32, 0u32);

    for _ in 0..2000 {
        let blends_before = e.canvas().blend_count();
        let trace = e.pump_one().unwrap().unwrap();
        match trace {
            Trace::Fetched { ok: true, .. } => {
                if let Some(expected) = current.take() {
                    assert_eq!((floors, bases), expected);
                    finished += 1;
                }
                let b = e.context().building.as_ref().unwrap();
                current = Some((b.plan.floors, b.plan.basements));
                basements_total += b.plan.basements;
                floors = 0;
                bases = 0;
            }
            Trace::Timer(Step::AddBasement) => {
                assert_eq!(floors, 0, "basement after a floor");
                bases += 1;
                assert_eq!(e.canvas().blend_count(), blends_before + 1);
            }
            Trace::Timer(Step::AddFloor) => {
                if floors == 0 {
                    assert_eq!(Some(bases), current.map(|c| c.1));
                }
                floors += 1;
                assert_eq!(e.canvas().blend_count(), blends_before + 1);
            }
            _ => assert_eq!(e.canvas().blend_count(), blends_before),
        }
        if finished >= 12 {
            break;
        }
    }
    assert!(finished >= 12);
    assert!(basements_total > 0);
}

#[test]
fn warmup_ready_fires_once_when_the_hundredth_building_lands() {
    let mut cfg = Config::default();
    cfg.loading.show = false;
    cfg.floors = Span::new(8.0, 40.0);
    cfg.buildings_per_set = Span::new(5.0, 10.0);
    cfg.scale = Span::new(0.3, 0.5);
    cfg.warmup.target_buildings = 100;
    let mut e = started(cfg, 42, catalog());

    let mut ready = Vec::new();
    let mut last_composed = 0;
    let mut now = 0;
    while e.context().buildings_composed < 110 {
        e.advance_to(now).unwrap();
        e.frame().unwrap();
        assert!(e.context().buildings_composed >= last_composed);
        last_composed = e.context().buildings_composed;
        for n in e.take_notices() {
            if let Notice::Ready {
                cause,
                buildings_composed,
            } = n
            {
                ready.push((cause, buildings_composed));
            }
        }
        now += 16;
        assert!(now < 10_000_000);
    }
    assert_eq!(ready, vec![(ReadyCause::WarmupComplete, 100)]);
}

#[test]
fn failing_fetch_retries_forever_without_a_ceiling() {
    let mut cfg = small_config();
    cfg.max_fetch_retries = None;
    let mut e = started(cfg, 5, catalog().fail_all());

    for round in 0..200 {
        let t = e.pump_one().unwrap();
        assert!(
            matches!(t, Some(Trace::Fetched { ok: false, .. })),
            "round {round}: {t:?}"
        );
        assert_eq!(e.phase(), Phase::AwaitingRetry);
        assert_eq!(e.next_wakeup(), Some(e.now_ms() + 70));
        assert_eq!(
            e.pump_one().unwrap(),
            Some(Trace::Timer(Step::StartBuilding))
        );
    }
    assert_eq!(e.context().buildings_in_set, 0);
    assert_eq!(e.context().consecutive_failures, 200);
}

#[test]
fn retry_ceiling_halts_the_run() {
    let mut cfg = small_config();
    cfg.max_fetch_retries = Some(3);
    let mut e = started(cfg, 5, catalog().fail_all());

    drain(&mut e, 100);
    assert_eq!(e.phase(), Phase::Failed);
    assert_eq!(e.pending_timers(), 0);
    assert_eq!(e.next_wakeup(), None);

    let notices = e.take_notices();
    let failures = notices
        .iter()
        .filter(|n| matches!(n, Notice::FetchFailed { .. }))
        .count();
    assert_eq!(failures, 4);
    assert!(matches!(notices.last(), Some(Notice::Halted { .. })));
}

#[test]
fn reset_requests_are_ignored_while_warming_up() {
    let mut cfg = small_config();
    cfg.warmup.enabled = true;
    cfg.warmup.target_buildings = 5;
    cfg.loading.show = false;
    let mut e = started(cfg, 9, catalog());

    while e.context().buildings_composed < 2 {
        e.pump_one().unwrap();
    }
    assert!(e.is_warming_up());
    assert!(!e.request_reset());
    assert_eq!(e.context().buildings_composed, 2);

    while e.context().buildings_composed < 5 {
        e.pump_one().unwrap();
    }
    assert!(!e.is_warming_up());
    assert!(e.request_reset());
    assert_eq!(e.context().buildings_composed, 0);
}

#[test]
fn a_halted_warmup_can_still_be_reset() {
    let mut cfg = small_config();
    cfg.warmup.enabled = true;
    cfg.warmup.target_buildings = 5;
    cfg.loading.show = false;
    cfg.max_fetch_retries = Some(1);
    let mut e = started(cfg, 9, catalog().fail_all());

    drain(&mut e, 100);
    assert_eq!(e.phase(), Phase::Failed);
    assert!(e.is_warming_up());
    e.take_notices();

    assert!(e.request_reset());
    assert_eq!(e.phase(), Phase::Loading);
    assert_eq!(e.take_notices().first(), Some(&Notice::Reset { epoch: 2 }));
}

#[test]
fn warmup_and_fast_forward_edits_apply_mid_run() {
    let mut cfg = small_config();
    cfg.warmup.enabled = true;
    cfg.warmup.target_buildings = 100;
    cfg.loading.show = false;
    let mut e = started(cfg, 21, catalog());
    assert!(e.overlay().is_none());

    while e.context().buildings_composed < 1 {
        e.pump_one().unwrap();
    }
    assert!(e.is_warming_up());

    e.update_config(|c| c.loading.show = true).unwrap();
    assert!(e.overlay().is_some());

    e.update_config(|c| {
        c.warmup.target_buildings = 2;
        c.warmup.enabled = false;
        c.fast_forward = true;
    })
    .unwrap();
    assert!(!e.is_warming_up());
    assert!(e.overlay().is_none());

    while e.context().buildings_composed < 3 {
        e.pump_one().unwrap();
    }
    assert!(!e.is_warming_up());
    let mut guard = 0;
    while e.pump_one().unwrap() != Some(Trace::Timer(Step::AddFloor)) {
        guard += 1;
        assert!(guard < 1000, "no floor was stamped");
    }
    assert_eq!(e.next_wakeup(), Some(e.now_ms() + 1));

    e.update_config(|c| {
        c.warmup.enabled = true;
        c.warmup.target_buildings = 50;
    })
    .unwrap();
    assert!(e.is_warming_up());
}

#[test]
fn center_shift_follows_range_edits_at_the_next_set() {
    let mut e = started(small_config(), 4, catalog());
    while e.phase() != Phase::SetBreak {
        e.pump_one().unwrap();
    }
    let drawn = e.canvas().ops().to_vec();
    let first = e.context().set.clone().unwrap();
    assert_eq!(first.center_shift, small_config().center_shift());

    e.update_config(|c| {
        c.floor_spacing = Span::new(40.0, 50.0);
        c.floors = Span::new(2.0, 4.0);
    })
    .unwrap();
    while e.context().sets_started < 2 {
        e.pump_one().unwrap();
    }

    let second = e.context().set.clone().unwrap();
    assert_eq!(second.center_shift, 45.0 * 3.0 / 2.0);
    assert!((40.0..50.0).contains(&second.spacing));
    assert_eq!(&e.canvas().ops()[..drawn.len()], drawn.as_slice());
}

#[test]
fn without_auto_continue_the_machine_parks_after_one_set() {
    let mut cfg = small_config();
    cfg.flow.auto_continue = false;
    let mut e = started(cfg, 21, catalog());

    drain(&mut e, 5000);
    assert_eq!(e.phase(), Phase::Parked);
    assert_eq!(e.context().sets_started, 1);
    assert_eq!(e.pending_timers(), 0);
    assert!(e.take_notices().contains(&Notice::Parked));
}

#[test]
fn palette_and_blend_alternate_between_sets() {
    let mut e = started(small_config(), 6, catalog());
    let mut sets = Vec::new();
    while sets.len() < 3 {
        e.pump_one().unwrap();
        for n in e.take_notices() {
            if let Notice::SetStarted { palette, blend, .. } = n {
                sets.push((palette, blend));
            }
        }
    }
    assert_eq!(
        sets,
        vec![
            (Palette::Light, BlendMode::Screen),
            (Palette::Dark, BlendMode::Multiply),
            (Palette::Light, BlendMode::Screen),
        ]
    );
}

#[test]
fn set_fade_veils_the_buffer_before_the_next_set() {
    let mut cfg = small_config();
    cfg.flow.set_fade = true;
    cfg.delays.fade_steps = 3;
    let mut e = started(cfg, 8, catalog());

    while e.context().sets_started < 2 {
        e.pump_one().unwrap();
    }
    let ops = e.canvas().ops();
    let veils = ops
        .iter()
        .filter(|op| matches!(op, CanvasOp::Veil { .. }))
        .count();
    assert_eq!(veils, 3);
    assert!(
        ops[ops.len() - 3..]
            .iter()
            .all(|op| matches!(op, CanvasOp::Veil { .. }))
    );
}

#[test]
fn floor_fade_veils_before_every_floor() {
    let mut cfg = small_config();
    cfg.flow.floor_fade = true;
    let mut e = started(cfg, 10, catalog());

    drain(&mut e, 200);
    let ops = e.canvas().ops();
    for (i, op) in ops.iter().enumerate() {
        if matches!(op, CanvasOp::Blend { .. }) {
            assert!(matches!(ops[i - 1], CanvasOp::Veil { .. }), "op {i}");
        }
    }
}

#[test]
fn export_waits_for_warmup_to_finish() {
    let mut cfg = small_config();
    cfg.warmup.enabled = true;
    cfg.warmup.target_buildings = 3;
    cfg.loading.show = false;
    let mut e = started(cfg, 77, catalog());

    e.request_export();
    e.frame().unwrap();
    assert!(
        !e.take_notices()
            .iter()
            .any(|n| matches!(n, Notice::ExportDue { .. }))
    );

    while e.context().buildings_composed < 3 {
        e.pump_one().unwrap();
    }
    e.frame().unwrap();
    let expected = export_file_name(77, e.now_ms());
    assert!(e.take_notices().contains(&Notice::ExportDue {
        file_name: expected
    }));
}

#[test]
fn fast_forward_shrinks_delays_while_held() {
    let mut e = started(small_config(), 2, catalog());

    e.set_fast_forward(true);
    assert!(matches!(
        e.pump_one().unwrap(),
        Some(Trace::Fetched { ok: true, .. })
    ));
    assert_eq!(e.next_wakeup(), Some(e.now_ms() + 1));

    e.set_fast_forward(false);
    assert_eq!(e.pump_one().unwrap(), Some(Trace::Timer(Step::AddFloor)));
    assert_eq!(e.next_wakeup(), Some(e.now_ms() + 70));
}

#[test]
fn reload_replays_the_run_from_its_seed() {
    let mut cfg = small_config();
    cfg.flow.reload = true;
    let mut e = started(cfg, 13, catalog());

    let mut resets = 0;
    while resets < 2 {
        e.pump_one().unwrap();
        resets += e
            .take_notices()
            .iter()
            .filter(|n| matches!(n, Notice::Reset { .. }))
            .count();
    }
    let second = e
        .canvas()
        .ops()
        .iter()
        .rposition(|op| matches!(op, CanvasOp::Clear { .. }))
        .unwrap();
    assert!(second > 0);

    while e.canvas().ops().len() < 2 * second {
        e.pump_one().unwrap();
    }
    let ops = e.canvas().ops();
    assert_eq!(&ops[second..2 * second], &ops[..second]);
}

const FRAME_MS: u64 = 16;

/// Step the engine frame by frame up to `until`, collecting ready signals.
fn frames_until(e: &mut Engine<RecordingCanvas>, until: u64) -> Vec<(ReadyCause, u64)> {
    let mut readies = Vec::new();
    let mut now = e.now_ms();
    while now < until {
        now += FRAME_MS;
        e.advance_to(now).unwrap();
        e.frame().unwrap();
        for n in e.take_notices() {
            if let Notice::Ready { cause, .. } = n {
                readies.push((cause, e.now_ms()));
            }
        }
    }
    readies
}

#[test]
fn elapsed_ready_fires_once_per_run_without_warmup() {
    let mut e = started(small_config(), 17, catalog());

    let readies = frames_until(&mut e, 45_000);
    assert_eq!(readies.len(), 1);
    let (cause, at) = readies[0];
    assert_eq!(cause, ReadyCause::Elapsed);
    assert!((30_001..=30_000 + FRAME_MS).contains(&at), "ready at {at}");

    let reloaded_at = e.now_ms();
    e.reload();
    let readies = frames_until(&mut e, reloaded_at + 45_000);
    assert_eq!(readies.len(), 1);
    let (cause, at) = readies[0];
    assert_eq!(cause, ReadyCause::Elapsed);
    let since_reload = at - reloaded_at;
    assert!(
        (30_001..=30_000 + FRAME_MS).contains(&since_reload),
        "ready {since_reload} ms after reload"
    );
}
