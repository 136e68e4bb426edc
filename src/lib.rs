//! An N-way structural merge engine for Valve Map Format (VMF) files.
//!
//! Given one designated *parent* map and one or more *child* maps that were
//! each edited independently from that parent, the engine computes a
//! structural diff per child, folds the diffs into one consistent change
//! set, detects semantic conflicts, and produces a merged output map. When
//! conflicts are detected, it additionally synthesises "Manual Merge"
//! VisGroups inside the output map that materialise the parent-side and
//! each conflicting child-side version of the affected objects, so a human
//! can reconcile them inside Hammer.
//!
//! # Example
//!
//! ```no_run
//! use vmf_merge::prelude::*;
//!
//! fn main() -> Result<(), VmfError> {
//!     let mut maps = vmf_merge::driver::load_maps(&["base.vmf", "a.vmf", "b.vmf"])?;
//!     let parent_index = vmf_merge::driver::choose_parent(&maps);
//!     let mut parent = maps.remove(parent_index);
//!
//!     let report = do_merge(&mut parent, &maps, &MergeOptions::default(), |_| {})?;
//!     println!("{} conflicted delta(s)", report.conflicted.len());
//!     Ok(())
//! }
//! ```

pub mod delta;
pub mod diff;
pub mod driver;
pub mod errors;
pub mod map;
pub mod merge;
pub mod resolve;
pub mod vdf;

pub mod prelude;

pub use delta::{Change, Delta, DeltaKey, DeltaKind};
pub use driver::{do_merge, MergeOptions, MergeReport, ProgressUpdate};
pub use errors::{VmfError, VmfResult};
pub use map::{ObjectId, ObjectInfo, VmfClass, VmfMap};
pub use merge::{merge_delta_lists, DeltaMergeConflict};
