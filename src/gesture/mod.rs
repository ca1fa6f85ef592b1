//! File-drag detection: per-gesture state, the file provider seam and the
//! state machine that ties them together.

pub mod detector;
pub mod files;
pub mod state;

pub use detector::{Confirmation, DragThresholds, GestureDetector, GesturePhase};
pub use files::{DraggedFileEntry, FileListProvider, NoFiles};
pub use state::{DragState, Trajectory};
