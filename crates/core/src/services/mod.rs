//! Filesystem-facing services: dumping objects, discovering analyzable
//! objects, and the batch pipeline that writes per-driver reports.

pub mod objdump;
pub mod pipeline;
pub mod scan;

pub use objdump::ObjdumpCache;
pub use pipeline::{
    analyze_dumps, DoneMarker, DriverReport, DriverStatus, GlobalSummary, OfflineAnalysis,
    Pipeline, PipelineError, RunSummary,
};
pub use scan::SourceFilter;
