//! Loading and saving maps, and the output-path conventions of the merge
//! driver.

use std::fs;
use std::path::{Path, PathBuf};
use std::str::FromStr;

use crate::errors::{VmfError, VmfResult};
use crate::vdf;

use super::VmfMap;

/// The only file extension accepted for maps.
pub const EXTENSION: &str = "vmf";

impl VmfMap {
    /// Parses a map from VMF text.
    pub fn parse(content: &str) -> VmfResult<Self> {
        let tree = vdf::parse_vdf(content)?;
        VmfMap::from_tree(tree, None)
    }

    /// Opens and parses a map from a `*.vmf` file path.
    ///
    /// Fails with [`VmfError::InvalidMap`] when the extension is wrong, the
    /// file does not parse, or the map has no world.
    pub fn open(path: impl AsRef<Path>) -> VmfResult<Self> {
        let path = path.as_ref();
        if path.extension().and_then(|ext| ext.to_str()) != Some(EXTENSION) {
            return Err(VmfError::invalid_map(Some(path), "invalid file extension"));
        }

        let content = fs::read_to_string(path)?;
        let tree = vdf::parse_vdf(&content).map_err(|e| {
            VmfError::invalid_map(Some(path), format!("failed to parse VMF: {}", e))
        })?;
        VmfMap::from_tree(tree, Some(path.to_path_buf()))
    }

    /// Serialises the map back into VMF text.
    pub fn to_vmf_string(&self) -> String {
        vdf::format_vdf(&self.to_tree())
    }

    /// Saves the map to the given path.
    pub fn save(&self, path: impl AsRef<Path>) -> VmfResult<()> {
        fs::write(path, self.to_vmf_string())?;
        Ok(())
    }

    /// The file name of the map, for reporting.
    pub fn filename(&self) -> String {
        self.path
            .as_ref()
            .and_then(|path| path.file_name())
            .map(|name| name.to_string_lossy().into_owned())
            .unwrap_or_else(|| "(unsaved)".to_string())
    }
}

impl FromStr for VmfMap {
    type Err = VmfError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        VmfMap::parse(s)
    }
}

fn sibling_with_suffix(path: &Path, suffix: &str) -> PathBuf {
    let stem = path
        .file_stem()
        .map(|stem| stem.to_string_lossy().into_owned())
        .unwrap_or_else(|| "map".to_string());
    let dir = path.parent().unwrap_or_else(|| Path::new(""));
    dir.join(format!("{}{}.{}", stem, suffix, EXTENSION))
}

/// The sibling path the merged map is written to: `<parent>_merged.vmf`, or
/// `<parent>_merged_<n>.vmf` when that already exists.
pub fn merged_output_path(parent_path: &Path) -> PathBuf {
    let mut candidate = sibling_with_suffix(parent_path, "_merged");
    let mut n = 0;
    while candidate.exists() {
        candidate = sibling_with_suffix(parent_path, &format!("_merged_{}", n));
        n += 1;
    }
    candidate
}

/// The sibling path a pre-merge backup of the parent is copied to.
pub fn backup_path(parent_path: &Path) -> PathBuf {
    sibling_with_suffix(parent_path, "_old")
}

#[cfg(test)]
mod tests {
    use super::*;

    const MINIMAL: &str = "\
        versioninfo\n\
        {\n\
        \t\"mapversion\" \"1\"\n\
        }\n\
        world\n\
        {\n\
        \t\"id\" \"1\"\n\
        \t\"classname\" \"worldspawn\"\n\
        }\n";

    #[test]
    fn open_rejects_wrong_extension() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("map.txt");
        fs::write(&path, MINIMAL).unwrap();

        let result = VmfMap::open(&path);
        assert!(matches!(result, Err(VmfError::InvalidMap { .. })));
    }

    #[test]
    fn open_save_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("map.vmf");
        fs::write(&path, MINIMAL).unwrap();

        let map = VmfMap::open(&path).unwrap();
        assert_eq!(map.revision(), 1);
        assert_eq!(map.filename(), "map.vmf");

        let out = dir.path().join("copy.vmf");
        map.save(&out).unwrap();
        let copy = VmfMap::open(&out).unwrap();
        assert_eq!(copy.to_vmf_string(), map.to_vmf_string());
    }

    #[test]
    fn parse_requires_world() {
        let result = VmfMap::parse("versioninfo { \"mapversion\" \"1\" }\n");
        assert!(matches!(result, Err(VmfError::InvalidMap { .. })));
    }

    #[test]
    fn merged_output_path_avoids_collisions() {
        let dir = tempfile::tempdir().unwrap();
        let parent = dir.path().join("map.vmf");
        fs::write(&parent, MINIMAL).unwrap();

        let first = merged_output_path(&parent);
        assert_eq!(first, dir.path().join("map_merged.vmf"));

        fs::write(&first, "x").unwrap();
        let second = merged_output_path(&parent);
        assert_eq!(second, dir.path().join("map_merged_0.vmf"));
    }
}
