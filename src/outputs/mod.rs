//! Persistent run records.
//!
//! - [`runlog`]: append-only JSON Lines log, one line per attempt
//! - [`summary`]: last outcome and rolling statistics as a single JSON file
//!
//! ```text
//! state/
//! ├── runs.jsonl      # run log
//! └── summary.json    # rewritten after every run
//! ```

pub mod runlog;
pub mod summary;
