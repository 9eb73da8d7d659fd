//! Procedural architectural-drawing generator.
//!
//! Sprites of plan drawings are stamped, one floor at a time, into a
//! persistent buffer. Buildings group into sets; each set fixes a floor
//! spacing, a palette and a blend mode. An accelerated warm-up phase builds
//! up the first buildings before the ready signal fires.
//!
//! [`Engine`] is the state machine. It drives any [`Canvas`] from sprites an
//! [`AssetCatalog`] supplies and advances on a virtual millisecond clock.
#![forbid(unsafe_code)]

pub mod assets;
pub mod config;
pub mod export;
pub mod foundation;
pub mod generate;
pub mod overlay;
pub mod pacing;
pub mod progress;
pub mod render;
pub mod rng;
pub mod scheduler;

pub use assets::{AssetCatalog, FsCatalog, MemoryCatalog, Palette, Sprite};
pub use config::{Config, Span};
pub use export::{export_file_name, save_png};
pub use foundation::core::{Affine, Point, Rgba8Premul, SurfaceSize, Vec2};
pub use foundation::error::{StructuresError, StructuresResult};
pub use generate::{Engine, Notice, Phase, RunContext, Step, Trace};
pub use overlay::LoadingOverlay;
pub use progress::{ProgressGate, ReadyCause};
pub use render::{BlendFamily, BlendMode, Canvas, CanvasOp, RasterCanvas, RecordingCanvas};
pub use rng::{RandomSource, SeededRandom};
pub use scheduler::Scheduler;
