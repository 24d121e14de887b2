pub mod attempt_log;
pub mod config;
pub mod error;
pub mod executor;
pub mod grid;
pub mod item_path;
pub mod period;
pub mod planner;
pub mod task;

/* --------- Re-exports usados por planner y worker --------- */

pub use attempt_log::{
    AttemptLog, AttemptRecord, AttemptStatus, FileStore, LogStore, MemoryStore, StatusMap,
    LOG_HEADER,
};
pub use config::Settings;
pub use error::GridTaskError;
pub use executor::{Loader, Outcome, Processor, Raster, RunSummary, TaskExecutor, TaskInput, Writer};
pub use grid::{GridCatalog, Tile};
pub use item_path::ItemPath;
pub use planner::PlanRequest;
pub use task::{TaskKey, TaskParams};
