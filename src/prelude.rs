//! A prelude module that re-exports commonly used items from the
//! `vmf_merge` crate.
//!
//! # Example
//!
//! ```
//! use vmf_merge::prelude::*;
//!
//! let map = VmfMap::parse(
//!     "versioninfo { \"mapversion\" \"1\" }\n\
//!      world { \"id\" \"1\" \"classname\" \"worldspawn\" }\n",
//! );
//! assert!(map.is_ok());
//! ```

pub use crate::errors::{VmfError, VmfResult};

pub use crate::delta::{Change, Delta, DeltaKey, DeltaKind};
pub use crate::diff::diff;
pub use crate::driver::{do_merge, MergeOptions, MergeReport, ProgressUpdate};
pub use crate::map::{ObjectId, ObjectInfo, VmfClass, VmfMap};
pub use crate::merge::{merge_delta_lists, DeltaMergeConflict};
pub use crate::resolve::create_conflict_resolution_deltas;
pub use crate::vdf::{VdfObject, VdfValue};
