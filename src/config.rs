use std::{fs::File, io::BufReader, path::Path};

use anyhow::Context;

use crate::{
    foundation::core::SurfaceSize,
    foundation::error::{StructuresError, StructuresResult},
    render::blend::BlendFamily,
};

/// Half-open numeric range `[min, max)` used for random draws.
///
/// Serialized as a two-element array, e.g. `[20, 30]`.
#[derive(Clone, Copy, Debug, PartialEq, serde::Serialize, serde::Deserialize)]
#[serde(from = "[f64; 2]", into = "[f64; 2]")]
pub struct Span {
    pub min: f64,
    pub max: f64,
}

impl Span {
    pub const fn new(min: f64, max: f64) -> Self {
        Self { min, max }
    }

    pub fn midpoint(self) -> f64 {
        (self.max - self.min) / 2.0 + self.min
    }

    pub fn validate(self, name: &str) -> StructuresResult<()> {
        if !self.min.is_finite() || !self.max.is_finite() {
            return Err(StructuresError::validation(format!(
                "{name} range must be finite (got [{}, {}])",
                self.min, self.max
            )));
        }
        if self.min > self.max {
            return Err(StructuresError::validation(format!(
                "{name} range is inverted: min {} > max {}",
                self.min, self.max
            )));
        }
        Ok(())
    }
}

impl From<[f64; 2]> for Span {
    fn from(v: [f64; 2]) -> Self {
        Self::new(v[0], v[1])
    }
}

impl From<Span> for [f64; 2] {
    fn from(s: Span) -> Self {
        [s.min, s.max]
    }
}

/// Accelerated initial build-up and the preview signal it gates.
#[derive(Clone, Debug, PartialEq, serde::Serialize, serde::Deserialize)]
#[serde(default)]
pub struct Warmup {
    pub enabled: bool,
    pub target_buildings: u32,
    /// Wall-clock fallback for the ready signal when warm-up is disabled.
    pub preview_fallback_ms: u64,
}

impl Default for Warmup {
    fn default() -> Self {
        Self {
            enabled: true,
            target_buildings: 100,
            preview_fallback_ms: 30_000,
        }
    }
}

/// Loading overlay shown while warm-up runs.
#[derive(Clone, Debug, PartialEq, serde::Serialize, serde::Deserialize)]
#[serde(default)]
pub struct Loading {
    pub show: bool,
    pub floors: u32,
    pub area: SurfaceSize,
}

impl Default for Loading {
    fn default() -> Self {
        Self {
            show: true,
            floors: 20,
            area: SurfaceSize {
                width: 400,
                height: 400,
            },
        }
    }
}

/// Switches that shape how sets follow each other.
#[derive(Clone, Debug, PartialEq, serde::Serialize, serde::Deserialize)]
#[serde(default)]
pub struct Flow {
    /// When false the machine parks once a set is exhausted.
    pub auto_continue: bool,
    /// Divide into sets; when false buildings keep accumulating in one set.
    pub new_set: bool,
    /// Restart the whole run instead of opening a new set.
    pub reload: bool,
    /// Veil the buffer with the background before every floor.
    pub floor_fade: bool,
    /// Clear the buffer when a set opens.
    pub set_clean: bool,
    /// Fade toward the background between sets.
    pub set_fade: bool,
    /// Alternate light and dark palettes between sets.
    pub set_switch: bool,
    /// Stamp upside-down floors below each building.
    pub basements: bool,
}

impl Default for Flow {
    fn default() -> Self {
        Self {
            auto_continue: true,
            new_set: true,
            reload: false,
            floor_fade: false,
            set_clean: false,
            set_fade: false,
            set_switch: true,
            basements: false,
        }
    }
}

/// Pacing delays in milliseconds.
#[derive(Clone, Debug, PartialEq, serde::Serialize, serde::Deserialize)]
#[serde(default)]
pub struct Delays {
    pub step_ms: u64,
    pub building_ms: u64,
    pub new_set_ms: u64,
    pub fade_steps: u32,
    pub fade_step_ms: f64,
}

impl Default for Delays {
    fn default() -> Self {
        Self {
            step_ms: 70,
            building_ms: 350,
            new_set_ms: 800,
            fade_steps: 60,
            fade_step_ms: 1000.0 / 24.0,
        }
    }
}

/// Full engine configuration. Every field has a default, so JSON files may
/// override any subset.
#[derive(Clone, Debug, PartialEq, serde::Serialize, serde::Deserialize)]
#[serde(default)]
pub struct Config {
    pub canvas: SurfaceSize,
    /// Background gray level.
    pub background: u8,
    pub warmup: Warmup,
    pub loading: Loading,
    /// Initial state of the held fast-forward toggle.
    pub fast_forward: bool,
    pub flow: Flow,
    pub blend_family: BlendFamily,
    pub delays: Delays,
    pub floor_spacing: Span,
    pub floors: Span,
    pub buildings_per_set: Span,
    pub scale: Span,
    /// Spread of building anchors around the buffer center.
    pub breadth: f64,
    pub floor_fade_opacity: f32,
    pub set_fade_opacity: f32,
    /// Consecutive fetch failures tolerated before the run halts; `None`
    /// retries forever.
    pub max_fetch_retries: Option<u32>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            canvas: SurfaceSize {
                width: 1920,
                height: 1080,
            },
            background: 24,
            warmup: Warmup::default(),
            loading: Loading::default(),
            fast_forward: false,
            flow: Flow::default(),
            blend_family: BlendFamily::ScreenMultiply,
            delays: Delays::default(),
            floor_spacing: Span::new(20.0, 30.0),
            floors: Span::new(8.0, 40.0),
            buildings_per_set: Span::new(5.0, 10.0),
            scale: Span::new(0.3, 0.5),
            breadth: 1.1,
            floor_fade_opacity: 1.0 / 40.0,
            set_fade_opacity: 20.0 / 255.0,
            max_fetch_retries: Some(64),
        }
    }
}

impl Config {
    pub fn validate(&self) -> StructuresResult<()> {
        SurfaceSize::new(self.canvas.width, self.canvas.height)?;
        SurfaceSize::new(self.loading.area.width, self.loading.area.height)?;

        self.floor_spacing.validate("floor_spacing")?;
        self.floors.validate("floors")?;
        self.buildings_per_set.validate("buildings_per_set")?;
        self.scale.validate("scale")?;

        if self.floors.min < 1.0 {
            return Err(StructuresError::validation(
                "floors range must start at 1 or more",
            ));
        }
        if self.buildings_per_set.min < 0.0 {
            return Err(StructuresError::validation(
                "buildings_per_set range must not be negative",
            ));
        }
        if self.scale.min <= 0.0 {
            return Err(StructuresError::validation("scale range must be > 0"));
        }
        if !self.breadth.is_finite() || self.breadth < 0.0 {
            return Err(StructuresError::validation(
                "breadth must be finite and >= 0",
            ));
        }
        if self.warmup.enabled && self.warmup.target_buildings == 0 {
            return Err(StructuresError::validation(
                "warmup target_buildings must be > 0",
            ));
        }
        if self.flow.set_fade && self.delays.fade_steps == 0 {
            return Err(StructuresError::validation(
                "fade_steps must be > 0 when set_fade is on",
            ));
        }
        if !self.delays.fade_step_ms.is_finite() || self.delays.fade_step_ms < 0.0 {
            return Err(StructuresError::validation(
                "fade_step_ms must be finite and >= 0",
            ));
        }
        for (name, v) in [
            ("floor_fade_opacity", self.floor_fade_opacity),
            ("set_fade_opacity", self.set_fade_opacity),
        ] {
            if !(0.0..=1.0).contains(&v) {
                return Err(StructuresError::validation(format!(
                    "{name} must be within [0, 1]"
                )));
            }
        }
        Ok(())
    }

    /// Read a JSON config file and validate it.
    pub fn from_json_path(path: impl AsRef<Path>) -> StructuresResult<Self> {
        let path = path.as_ref();
        let f = File::open(path).with_context(|| format!("open config '{}'", path.display()))?;
        let cfg: Self = serde_json::from_reader(BufReader::new(f))
            .map_err(|e| StructuresError::serde(format!("{}: {e}", path.display())))?;
        cfg.validate()?;
        Ok(cfg)
    }

    /// Vertical offset that keeps an average-height stack centered.
    pub fn center_shift(&self) -> f64 {
        self.floor_spacing.midpoint() * self.floors.midpoint() / 2.0
    }
}
