//! Path-tracing core for procedural terrain generation.
//!
//! Takes a declarative DAG of path segments (branching, merging, widening,
//! losing density, following cost gradients, aiming at targets) and renders
//! it into 2D raster grids while avoiding self-collisions, repairing them by
//! rewriting the path graph and retrying.
//!
//! Three coupled subsystems:
//! - `path`: a mutable DAG of typed segments (arena of ids, no owning links).
//! - `trace`: a deterministic forward integrator producing frame sequences,
//!   accumulating into grids and detecting collisions.
//! - `repair`: a collision handler that rewrites the graph (merges,
//!   diversions, stability regions, tenacity, simplifications, stubs) until
//!   a trace pass completes clean or the attempt budget runs out.
//!
//! A bounded-angle pathfinder (`finder`) is embedded for segments with an
//! explicit target.

pub mod config;
pub mod finder;
pub mod geom;
pub mod grid;
pub mod path;
pub mod queue;
pub mod repair;
pub mod trace;

/// Library version string.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

pub use geom::Vec2;

/// Common exports for quick imports in callers.
pub mod prelude {
    pub use crate::config::{FinderCfg, HandlerCfg, OffsetMode, TraceCfg};
    pub use crate::geom::{direction, normalize_deg, signed_angle, Vec2, Vec2Ext};
    pub use crate::grid::{CurveSampler, Grid, GridLayout, GridSampler, GridView};
    pub use crate::path::{
        DiversionPoint, Param, ParamArgs, Path, Segment, SmoothDelta, StabilityPoint, TraceParams,
    };
    pub use crate::trace::{TraceCollision, TraceFrame, TraceResult, Tracer};
}
