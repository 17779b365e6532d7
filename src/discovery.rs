//! Auxiliary per-subject inputs that are fetched before staging
//!
//! Discovery never fails the workflow: anything that goes wrong, from a missing project to an
//! unreachable server, is logged and reported as "nothing found".

use std::path::{Component, Path, PathBuf};

/// XNAT REST client
pub mod xnat;

pub trait ResourceDiscovery {
    /// Download the first freesurfer resource collection of `session` in `project`
    ///
    /// Returns true if a collection was found and downloaded.
    fn find_auxiliary_resources(&self, project: Option<&str>, session: &str) -> bool;
}

/// Resource collections are matched by a case-insensitive "freesurfer" substring
pub fn is_freesurfer_label(label: &str) -> bool {
    label.to_lowercase().contains("freesurfer")
}

/// Path of a file inside its resource collection
///
/// XNAT file URIs look like `.../resources/<label>/files/<path>`, so the path starts after the
/// first `/files/` segment following `/resources/`. Deeper directories named `files` are kept.
/// Returns `None` if the remaining path is empty or tries to leave the collection.
pub fn relative_resource_path(uri: &str) -> Option<PathBuf> {
    let collection = uri.split_once("/resources/").map_or(uri, |(_, rest)| rest);
    let relative = collection.split_once("/files/").map_or(collection, |(_, rest)| rest);
    let path = Path::new(relative);

    let normal = path.components().all(|c| matches!(c, Component::Normal(_)));
    if relative.is_empty() || !normal {
        return None;
    }
    Some(path.to_path_buf())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn freesurfer_labels_match_case_insensitively() {
        assert!(is_freesurfer_label("FREESURFER"));
        assert!(is_freesurfer_label("fmriprep_FreeSurfer_7"));
        assert!(!is_freesurfer_label("NIFTI"));
    }

    #[test]
    fn nested_structure_is_kept() {
        let uri = "/data/experiments/XNAT_E001/resources/FREESURFER/files/sub-01/mri/T1.mgz";
        assert_eq!(relative_resource_path(uri), Some(PathBuf::from("sub-01/mri/T1.mgz")));
    }

    #[test]
    fn directories_named_like_files_are_kept() {
        let uri = "/data/experiments/XNAT_E001/resources/FREESURFER/files/sub-01/profiles/lh.txt";
        assert_eq!(relative_resource_path(uri), Some(PathBuf::from("sub-01/profiles/lh.txt")));
        let uri = "/data/experiments/XNAT_E001/resources/FREESURFER/files/sub-01/files/rh.txt";
        assert_eq!(relative_resource_path(uri), Some(PathBuf::from("sub-01/files/rh.txt")));
    }

    #[test]
    fn paths_without_files_segment_are_used_as_is() {
        assert_eq!(relative_resource_path("sub-01/surf/lh.white"), Some(PathBuf::from("sub-01/surf/lh.white")));
    }

    #[test]
    fn escaping_paths_are_rejected() {
        assert_eq!(relative_resource_path("/data/files/../../etc/passwd"), None);
        assert_eq!(relative_resource_path("/etc/passwd"), None);
        assert_eq!(relative_resource_path("/data/files/"), None);
    }
}
