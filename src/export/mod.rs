//! Run output: JSON for scripts, a plain summary for people.

mod json;
mod summary;

pub use json::{export_json, export_targets_json, ExportOptions};
pub use summary::write_summary;
