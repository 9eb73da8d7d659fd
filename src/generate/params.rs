//! Per-set and per-building parameter draws and the stamp transform.
//!
//! Draw order matters for reproducibility: every function here consumes the
//! random source in a fixed sequence.

use std::f64::consts::PI;
use std::sync::Arc;

use crate::{
    assets::{Palette, Sprite},
    config::Config,
    foundation::core::{Affine, Point, SurfaceSize, Vec2},
    render::BlendMode,
    rng::RandomSource,
};

/// Which kind of stamp a step draws.
#[derive(Clone, Copy, Debug, PartialEq, Eq, serde::Serialize)]
pub enum StepKind {
    Floor,
    Basement,
}

/// Parameters shared by every building of one set.
#[derive(Clone, Debug, PartialEq, serde::Serialize)]
pub struct SetParams {
    pub index: u64,
    pub palette: Palette,
    pub blend: BlendMode,
    /// Vertical distance between consecutive floors.
    pub spacing: f64,
    pub center_shift: f64,
    /// Buildings to compose before the set ends; fractional on dark sets.
    pub target_buildings: f64,
}

impl SetParams {
    pub fn draw(index: u64, palette: Palette, config: &Config, rng: &mut dyn RandomSource) -> Self {
        let blend = config.blend_family.mode(palette);
        let spacing = rng
            .between(config.floor_spacing.min, config.floor_spacing.max)
            .floor();
        let mut target_buildings = rng
            .between(config.buildings_per_set.min, config.buildings_per_set.max)
            .ceil();
        if palette == Palette::Dark {
            target_buildings *= 1.25;
        }
        Self {
            index,
            palette,
            blend,
            spacing,
            center_shift: config.center_shift(),
            target_buildings,
        }
    }
}

/// Where and how a building is placed.
#[derive(Clone, Copy, Debug, PartialEq, serde::Serialize)]
pub struct Placement {
    pub location: Point,
    pub rotated: bool,
    pub scale: f64,
    pub flipped: bool,
}

impl Placement {
    /// Smaller buildings scatter farther: the spread is `breadth / scale`
    /// times the surface, centered on it.
    pub fn draw(config: &Config, surface: SurfaceSize, rng: &mut dyn RandomSource) -> Self {
        let rotated = rng.coin();
        let scale = rng.between(config.scale.min, config.scale.max);
        let flipped = rng.coin();
        let br = config.breadth / scale;
        let (w, h) = (f64::from(surface.width), f64::from(surface.height));
        let x = rng.between(w / 2.0 - w * br / 2.0, w / 2.0 + w * br / 2.0);
        let y = rng.between(h / 2.0 - h * br / 2.0, h / 2.0 + h * br / 2.0);
        Self {
            location: Point::new(x, y),
            rotated,
            scale,
            flipped,
        }
    }

    pub fn rotation_rad(&self) -> f64 {
        if self.rotated { PI } else { 0.0 }
    }
}

/// Everything needed to stamp one building.
#[derive(Clone, Debug)]
pub struct BuildingPlan {
    pub sprite: Arc<Sprite>,
    pub floors: u32,
    pub basements: u32,
    pub placement: Placement,
}

impl BuildingPlan {
    pub fn draw(
        sprite: Arc<Sprite>,
        config: &Config,
        surface: SurfaceSize,
        rng: &mut dyn RandomSource,
    ) -> Self {
        let floors = rng.between(config.floors.min, config.floors.max).floor() as u32;
        // Always drawn so the sequence does not depend on the basement switch.
        let basements = rng.below(f64::from(floors) / 3.0).floor() as u32;
        let basements = if config.flow.basements { basements } else { 0 };
        let placement = Placement::draw(config, surface, rng);
        Self {
            sprite,
            floors,
            basements,
            placement,
        }
    }
}

/// Transform for stamp `index` of `kind`.
///
/// Order: scale about the surface center, shift by the set's center offset,
/// move to the building location, climb (floors) or descend (basements) by
/// `spacing * index`, rotate, flip, then center the sprite on that point.
/// Basements get an extra half turn so they hang upside down.
pub fn stamp_transform(
    surface: SurfaceSize,
    set: &SetParams,
    plan: &BuildingPlan,
    kind: StepKind,
    index: u32,
) -> Affine {
    let c = surface.center().to_vec2();
    let p = &plan.placement;
    let offset = set.spacing * f64::from(index);

    let mut t = Affine::translate(c) * Affine::scale(p.scale) * Affine::translate(-c);
    t = t * Affine::translate(Vec2::new(0.0, set.center_shift));
    t = t * Affine::translate(p.location.to_vec2());
    t = match kind {
        StepKind::Floor => t * Affine::translate(Vec2::new(0.0, -offset)),
        StepKind::Basement => t * Affine::translate(Vec2::new(0.0, offset)),
    };
    if p.rotated {
        t = t * Affine::rotate(PI);
    }
    if kind == StepKind::Basement {
        t = t * Affine::rotate(PI);
    }
    if p.flipped {
        t = t * Affine::scale_non_uniform(-1.0, 1.0);
    }
    let half = Vec2::new(
        f64::from(plan.sprite.width) / 2.0,
        f64::from(plan.sprite.height) / 2.0,
    );
    t * Affine::translate(-half)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{config::Span, rng::SeededRandom};

    fn surface() -> SurfaceSize {
        SurfaceSize {
            width: 1920,
            height: 1080,
        }
    }

    fn plan(placement: Placement) -> BuildingPlan {
        BuildingPlan {
            sprite: Arc::new(Sprite::solid("p", 100, 60, [255, 255, 255, 255])),
            floors: 3,
            basements: 1,
            placement,
        }
    }

    fn set(spacing: f64, center_shift: f64) -> SetParams {
        SetParams {
            index: 1,
            palette: Palette::Light,
            blend: BlendMode::Screen,
            spacing,
            center_shift,
            target_buildings: 5.0,
        }
    }

    fn close(a: Point, b: Point) -> bool {
        (a.x - b.x).abs() < 1e-9 && (a.y - b.y).abs() < 1e-9
    }

    #[test]
    fn dark_sets_compose_a_quarter_more_buildings() {
        let cfg = Config {
            buildings_per_set: Span::new(4.0, 4.0),
            ..Config::default()
        };
        let mut rng = SeededRandom::new(9);
        let light = SetParams::draw(1, Palette::Light, &cfg, &mut rng);
        let dark = SetParams::draw(2, Palette::Dark, &cfg, &mut rng);
        assert_eq!(light.target_buildings, 4.0);
        assert_eq!(dark.target_buildings, 5.0);
        assert_eq!(dark.blend, BlendMode::Multiply);
        assert!((20.0..30.0).contains(&light.spacing));
        assert_eq!(light.spacing, light.spacing.floor());
    }

    #[test]
    fn building_draws_respect_ranges_and_basement_switch() {
        let sprite = Arc::new(Sprite::solid("p", 4, 4, [255, 255, 255, 255]));
        let mut rng = SeededRandom::new(42);
        let off = Config::default();
        for _ in 0..200 {
            let b = BuildingPlan::draw(Arc::clone(&sprite), &off, surface(), &mut rng);
            assert!((8..40).contains(&b.floors));
            assert_eq!(b.basements, 0);
            assert!((0.3..0.5).contains(&b.placement.scale));
        }

        let mut on = Config::default();
        on.flow.basements = true;
        for _ in 0..200 {
            let b = BuildingPlan::draw(Arc::clone(&sprite), &on, surface(), &mut rng);
            assert!(f64::from(b.basements) < f64::from(b.floors) / 3.0 + 1e-9);
        }
    }

    #[test]
    fn placement_spread_widens_as_scale_shrinks() {
        let cfg = Config::default();
        let mut rng = SeededRandom::new(5);
        for _ in 0..500 {
            let p = Placement::draw(&cfg, surface(), &mut rng);
            let br = cfg.breadth / p.scale;
            assert!((p.location.x - 960.0).abs() <= 1920.0 * br / 2.0);
            assert!((p.location.y - 540.0).abs() <= 1080.0 * br / 2.0);
        }
    }

    #[test]
    fn ground_floor_centers_sprite_on_location() {
        let p = plan(Placement {
            location: Point::new(960.0, 540.0),
            rotated: false,
            scale: 1.0,
            flipped: false,
        });
        let t = stamp_transform(surface(), &set(25.0, 0.0), &p, StepKind::Floor, 0);
        assert!(close(t * Point::new(50.0, 30.0), Point::new(960.0, 540.0)));
    }

    #[test]
    fn floors_climb_and_basements_descend() {
        let p = plan(Placement {
            location: Point::new(960.0, 540.0),
            rotated: false,
            scale: 1.0,
            flipped: false,
        });
        let s = set(25.0, 10.0);
        let floor = stamp_transform(surface(), &s, &p, StepKind::Floor, 2);
        let base = stamp_transform(surface(), &s, &p, StepKind::Basement, 2);
        assert!(close(floor * Point::new(50.0, 30.0), Point::new(960.0, 500.0)));
        assert!(close(base * Point::new(50.0, 30.0), Point::new(960.0, 600.0)));
        // Upside down: the sprite's top-left lands bottom-right of center.
        assert!(close(base * Point::new(0.0, 0.0), Point::new(1010.0, 630.0)));
    }

    #[test]
    fn scale_pulls_toward_surface_center() {
        let p = plan(Placement {
            location: Point::new(1160.0, 540.0),
            rotated: true,
            scale: 0.5,
            flipped: true,
        });
        let t = stamp_transform(surface(), &set(25.0, 0.0), &p, StepKind::Floor, 0);
        assert!(close(t * Point::new(50.0, 30.0), Point::new(1060.0, 540.0)));
        // Rotation and flip together mirror vertically.
        assert!(close(t * Point::new(0.0, 0.0), Point::new(1035.0, 555.0)));
    }
}
