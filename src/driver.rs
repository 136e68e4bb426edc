//! Orchestration: batch loading, parent selection, and the merge pipeline
//! with its progress-callback contract.
//!
//! The core is single-threaded and synchronous. The callback is invoked
//! synchronously at stage boundaries on whatever thread runs [`do_merge`];
//! a GUI wrapper may run the merge on a worker thread and poll the updates
//! from its own.

use std::path::{Path, PathBuf};

use tracing::{debug, info, warn};

use crate::delta::Delta;
use crate::diff::diff;
use crate::errors::VmfResult;
use crate::map::io::{backup_path, merged_output_path};
use crate::map::VmfMap;
use crate::merge::{merge_delta_lists, DeltaMergeConflict};
use crate::resolve::create_conflict_resolution_deltas;

/// One progress notification. `progress` is a stage counter clamped to
/// `max_progress`; `finished` is set on the final update.
#[derive(Debug, Clone)]
pub struct ProgressUpdate {
    pub message: String,
    pub progress: usize,
    pub max_progress: usize,
    pub finished: bool,
}

/// Knobs for [`do_merge`].
#[derive(Debug, Clone, Default)]
pub struct MergeOptions {
    /// Reserved for aggressive conflict resolution; currently a no-op.
    pub aggressive: bool,
    /// Deep-copy the parent before merging. The differ and the apply step
    /// otherwise mutate the caller's parent map.
    pub no_parent_side_effects: bool,
    /// Deep-copy the children before merging.
    pub no_child_side_effects: bool,
    /// Copy the parent file to `<parent>_old.vmf` before writing the merged
    /// output.
    pub backup_parent: bool,
}

/// The outcome of a merge.
#[derive(Debug)]
pub struct MergeReport {
    /// Deltas that were found to conflict; empty when the merge was clean.
    /// The merged map is produced either way.
    pub conflicted: Vec<Delta>,
    /// Where the merged map was written, when the parent had a path.
    pub output_path: Option<PathBuf>,
}

struct ProgressTracker<'a> {
    progress: usize,
    max_progress: usize,
    callback: &'a mut dyn FnMut(&ProgressUpdate),
}

impl ProgressTracker<'_> {
    fn update(&mut self, message: &str) {
        self.notify(message, false);
    }

    fn finish(&mut self, message: &str) {
        self.notify(message, true);
    }

    fn notify(&mut self, message: &str, finished: bool) {
        info!("{}", message);
        (self.callback)(&ProgressUpdate {
            message: message.to_string(),
            progress: self.progress.min(self.max_progress),
            max_progress: self.max_progress,
            finished,
        });
        self.progress += 1;
    }
}

/// Performs a merge of the children's deltas into the parent and writes the
/// merged map next to the parent file.
///
/// On conflicts the merge still completes: the conflicted deltas are
/// reported in the [`MergeReport`] and the written map carries the Manual
/// Merge VisGroups synthesised by the conflict resolver.
pub fn do_merge(
    parent: &mut VmfMap,
    children: &[VmfMap],
    options: &MergeOptions,
    mut update_callback: impl FnMut(&ProgressUpdate),
) -> VmfResult<MergeReport> {
    // Not including the conflict resolution step.
    const NUM_MERGE_STEPS: usize = 3;

    let max_progress = usize::from(options.no_parent_side_effects)
        + usize::from(options.no_child_side_effects) * children.len()
        + children.len()
        + NUM_MERGE_STEPS;
    let mut tracker = ProgressTracker {
        progress: 0,
        max_progress,
        callback: &mut update_callback,
    };

    let mut parent_copy;
    let parent: &mut VmfMap = if options.no_parent_side_effects {
        tracker.update("Preparing parent VMF for merge...");
        parent_copy = parent.clone();
        &mut parent_copy
    } else {
        parent
    };

    let children_copies: Vec<VmfMap>;
    let children: &[VmfMap] = if options.no_child_side_effects {
        children_copies = children
            .iter()
            .map(|child| {
                tracker.update(&format!("Preparing {} for merge...", child.filename()));
                child.clone()
            })
            .collect();
        &children_copies
    } else {
        children
    };

    // Generate the per-child delta lists, tagged with their origin.
    let mut delta_lists: Vec<Vec<Delta>> = Vec::with_capacity(children.len());
    for (index, child) in children.iter().enumerate() {
        tracker.update(&format!("Generating delta list for {}...", child.filename()));
        let mut deltas = diff(parent, child);
        for delta in &mut deltas {
            delta.origin = Some(index);
        }
        delta_lists.push(deltas);
    }

    tracker.update("Merging deltas...");
    let (merged, conflicted) = match merge_delta_lists(delta_lists, options.aggressive) {
        Ok(merged) => (merged, Vec::new()),
        Err(DeltaMergeConflict {
            partial,
            conflicted,
        }) => {
            warn!(
                "merge conflict(s) detected; human intervention will be required \
                 for conflict resolution"
            );
            for delta in &conflicted {
                let origin = delta
                    .origin
                    .and_then(|index| children.get(index))
                    .map(VmfMap::filename)
                    .unwrap_or_else(|| "(unknown)".to_string());
                debug!("conflicted (from {}): {}", origin, delta);
            }

            tracker.max_progress += 1;
            tracker.update("Creating Manual Merge VisGroups...");
            let resolution =
                create_conflict_resolution_deltas(parent, &conflicted, &partial, children)?;

            let mut merged = partial;
            merged.extend(resolution);
            (merged, conflicted)
        }
    };

    tracker.update("Applying deltas...");
    parent.apply_deltas(&merged, true)?;

    tracker.update("Writing merged VMF...");
    let output_path = match parent.path.clone() {
        Some(parent_path) => {
            if options.backup_parent {
                std::fs::copy(&parent_path, backup_path(&parent_path))?;
            }
            let output = merged_output_path(&parent_path);
            parent.save(&output)?;
            Some(output)
        }
        None => None,
    };

    tracker.finish("Done!");
    Ok(MergeReport {
        conflicted,
        output_path,
    })
}

/// Loads every path, in order.
pub fn load_maps<P: AsRef<Path>>(paths: &[P]) -> VmfResult<Vec<VmfMap>> {
    let mut maps = Vec::with_capacity(paths.len());
    for (index, path) in paths.iter().enumerate() {
        info!(
            "({}/{}) Loading {}...",
            index + 1,
            paths.len(),
            path.as_ref().display()
        );
        maps.push(VmfMap::open(path)?);
    }
    Ok(maps)
}

/// From a set of maps, the index of the one with the lowest map version:
/// the parent. The first map wins a tie.
pub fn choose_parent(maps: &[VmfMap]) -> usize {
    let mut parent = 0;
    for (index, map) in maps.iter().enumerate().skip(1) {
        if map.revision() < maps[parent].revision() {
            parent = index;
        }
    }
    parent
}

#[cfg(test)]
mod tests {
    use super::*;

    fn map_with_revision(revision: i32) -> VmfMap {
        let content = format!(
            "versioninfo {{ \"mapversion\" \"{}\" }}\n\
             world {{ \"id\" \"1\" \"classname\" \"worldspawn\" }}\n",
            revision
        );
        VmfMap::parse(&content).unwrap()
    }

    #[test]
    fn choose_parent_picks_lowest_revision() {
        let maps = vec![
            map_with_revision(4),
            map_with_revision(2),
            map_with_revision(3),
        ];
        assert_eq!(choose_parent(&maps), 1);
    }

    #[test]
    fn choose_parent_first_wins_ties() {
        let maps = vec![
            map_with_revision(2),
            map_with_revision(2),
            map_with_revision(5),
        ];
        assert_eq!(choose_parent(&maps), 0);
    }
}
