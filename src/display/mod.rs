//! Terminal output: the live fixed-slot progress block and run summaries.
//!
//! Nothing here keeps global state. Whether colour is used is decided once by
//! the caller and passed in as a [`Palette`]; the live block is drawn through
//! whichever indicatif draw target the caller hands it.

mod format;
mod palette;
mod render;
mod summary;

pub use format::{format_duration, format_speed, truncate_path};
pub use palette::Palette;
pub use render::{
    BarLine, Frame, ProgressRenderer, REFRESH_INTERVAL, RendererHandle, compose_frame,
};
pub use summary::{
    estimated_time, failure, header, info, run_header, run_summary, scan_progress, scan_report,
    success, warning,
};
