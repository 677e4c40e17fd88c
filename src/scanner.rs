use std::collections::HashSet;
use std::fs;
use std::path::{Path, PathBuf};
use chrono::Utc;
use walkdir::{DirEntry, WalkDir};
use crate::error::OpsResult;
use crate::filter::{ExtensionSet, IgnoreSet};
use crate::model::{modified_of, FileDescriptor, FolderDescriptor};
use crate::progress::{CancellationToken, PhaseCounter};

/// Walks one start folder, skipping ignored subtrees entirely
pub struct Scanner {
    ignore: IgnoreSet,
    cancel: CancellationToken,
}

impl Scanner {
    pub fn new(ignore: IgnoreSet, cancel: CancellationToken) -> Self {
        Self { ignore, cancel }
    }

    /// Count matching files per set in one walk, used to fix the progress totals
    pub fn count_candidates(&self, dir: &Path, sets: &[&ExtensionSet]) -> OpsResult<Vec<u64>> {
        let mut counts = vec![0u64; sets.len()];
        for entry in self.walk(dir) {
            self.cancel.check()?;
            let Some(entry) = entry else { continue };
            if !entry.file_type().is_file() {
                continue;
            }
            for (count, set) in counts.iter_mut().zip(sets) {
                if set.matches(entry.path()) {
                    *count += 1;
                }
            }
        }
        Ok(counts)
    }

    /// Collect every file under `dir` whose extension is in `extensions`
    pub fn scan(&self, dir: &Path, extensions: &ExtensionSet) -> OpsResult<Vec<FileDescriptor>> {
        self.scan_inner(dir, extensions, None)
    }

    pub(crate) fn scan_with_progress(
        &self,
        dir: &Path,
        extensions: &ExtensionSet,
        counter: &mut PhaseCounter<'_>,
    ) -> OpsResult<Vec<FileDescriptor>> {
        self.scan_inner(dir, extensions, Some(counter))
    }

    fn scan_inner(
        &self,
        dir: &Path,
        extensions: &ExtensionSet,
        mut counter: Option<&mut PhaseCounter<'_>>,
    ) -> OpsResult<Vec<FileDescriptor>> {
        let mut files = Vec::new();

        for entry in self.walk(dir) {
            self.cancel.check()?;
            let Some(entry) = entry else { continue };

            // Symlinks are not followed, so they never report as files
            if !entry.file_type().is_file() || !extensions.matches(entry.path()) {
                continue;
            }

            match entry.metadata() {
                Ok(metadata) => {
                    files.push(FileDescriptor::from_metadata(entry.path(), &metadata));
                }
                Err(e) => {
                    log::warn!("Skipping {}: cannot read metadata: {}", entry.path().display(), e);
                }
            }

            if let Some(counter) = counter.as_deref_mut() {
                counter.tick();
            }
        }

        Ok(files)
    }

    /// Depth-first walk in file-name order. Unreadable entries are logged and dropped.
    fn walk<'s>(&'s self, dir: &Path) -> impl Iterator<Item = Option<DirEntry>> + 's {
        WalkDir::new(dir)
            .follow_links(false)
            .sort_by_file_name()
            .into_iter()
            .filter_entry(move |e| e.depth() == 0 || !self.ignore.is_ignored(e.path()))
            .map(|entry| match entry {
                Ok(entry) => Some(entry),
                Err(e) => {
                    let path = e
                        .path()
                        .map(|p| p.display().to_string())
                        .unwrap_or_else(|| "<unknown>".to_string());
                    log::warn!("Skipping unreadable entry {}: {}", path, e);
                    None
                }
            })
    }

    /// Folders with nothing in them right now, deepest first.
    ///
    /// Folders holding only files are kept out of the listing, as are their
    /// parents.
    pub fn find_empty_directories(&self, dir: &Path) -> OpsResult<Vec<FolderDescriptor>> {
        let mut folders = self.find_future_empty_directories(dir, &[], &[], &[])?;
        folders.retain(|f| !f.requires_user_decision);
        Ok(folders)
    }

    /// Folders that will be empty once the pending deletions and moves run.
    ///
    /// Evaluation is bottom-up: a folder only counts as empty after each of
    /// its subfolders has been found empty too. A folder left holding nothing
    /// but unscheduled files is reported with `requires_user_decision` set
    /// and is never treated as empty. Results are ordered deepest first, and
    /// `dir` itself is never reported.
    pub fn find_future_empty_directories(
        &self,
        dir: &Path,
        photos_to_delete: &[FileDescriptor],
        short_videos: &[FileDescriptor],
        long_videos: &[FileDescriptor],
    ) -> OpsResult<Vec<FolderDescriptor>> {
        let pending = pending_paths(photos_to_delete, short_videos, long_videos);

        let mut folders = Vec::new();
        self.evaluate_folder(dir, 0, &pending, &mut folders)?;
        Ok(folders)
    }

    /// Whether `dir` itself ends up with nothing in it once the pending
    /// files are gone. Unlike the listing variants, `dir` is judged too.
    pub fn is_future_empty(
        &self,
        dir: &Path,
        photos_to_delete: &[FileDescriptor],
        short_videos: &[FileDescriptor],
        long_videos: &[FileDescriptor],
    ) -> OpsResult<bool> {
        let pending = pending_paths(photos_to_delete, short_videos, long_videos);
        let mut scratch = Vec::new();
        self.evaluate_folder(dir, 1, &pending, &mut scratch)
    }

    /// Returns whether `dir` will be gone once everything pending is applied
    fn evaluate_folder(
        &self,
        dir: &Path,
        depth: usize,
        pending: &HashSet<PathBuf>,
        folders: &mut Vec<FolderDescriptor>,
    ) -> OpsResult<bool> {
        self.cancel.check()?;

        let entries = match read_dir_sorted(dir) {
            Ok(entries) => entries,
            Err(e) => {
                log::warn!("Cannot read folder {}: {}", dir.display(), e);
                return Ok(false);
            }
        };

        let mut remaining_dirs = 0usize;
        let mut survivors = Vec::new();

        for entry in entries {
            let path = entry.path();
            let file_type = match entry.file_type() {
                Ok(t) => t,
                Err(e) => {
                    log::warn!("Cannot inspect {}: {}", path.display(), e);
                    remaining_dirs += 1;
                    continue;
                }
            };

            if file_type.is_dir() {
                if self.ignore.is_ignored(&path) {
                    remaining_dirs += 1;
                } else if !self.evaluate_folder(&path, depth + 1, pending, folders)? {
                    remaining_dirs += 1;
                }
            } else if !pending.contains(&path) {
                survivors.push(survivor_descriptor(&path));
            }
        }

        if depth == 0 || remaining_dirs > 0 {
            return Ok(false);
        }

        let last_modified = fs::metadata(dir)
            .map(|m| modified_of(&m))
            .unwrap_or_else(|_| Utc::now());

        if survivors.is_empty() {
            log::debug!("Folder will be empty: {}", dir.display());
            folders.push(FolderDescriptor::empty(dir, last_modified));
            Ok(true)
        } else {
            log::debug!(
                "Folder keeps {} unscheduled file(s): {}",
                survivors.len(),
                dir.display()
            );
            folders.push(FolderDescriptor::needing_decision(dir, last_modified, survivors));
            Ok(false)
        }
    }
}

fn pending_paths(
    photos: &[FileDescriptor],
    short_videos: &[FileDescriptor],
    long_videos: &[FileDescriptor],
) -> HashSet<PathBuf> {
    photos
        .iter()
        .chain(short_videos)
        .chain(long_videos)
        .map(|f| f.path.clone())
        .collect()
}

/// Entries of `dir` by file name. Only a failure to open `dir` is an error,
/// a single unreadable entry is logged and left out.
fn read_dir_sorted(dir: &Path) -> std::io::Result<Vec<fs::DirEntry>> {
    let mut entries: Vec<fs::DirEntry> = fs::read_dir(dir)?
        .filter_map(|entry| match entry {
            Ok(entry) => Some(entry),
            Err(e) => {
                log::warn!("Skipping unreadable entry in {}: {}", dir.display(), e);
                None
            }
        })
        .collect();
    entries.sort_by_key(|e| e.file_name());
    Ok(entries)
}

fn survivor_descriptor(path: &Path) -> FileDescriptor {
    match fs::symlink_metadata(path) {
        Ok(metadata) => FileDescriptor::from_metadata(path, &metadata),
        Err(e) => {
            log::warn!("Cannot read metadata for {}: {}", path.display(), e);
            FileDescriptor {
                path: path.to_path_buf(),
                name: crate::model::file_name_of(path),
                size: 0,
                last_modified: Utc::now(),
                duration: None,
                is_duplicate: false,
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs::File;
    use std::io::Write;
    use tempfile::tempdir;

    fn touch(path: &Path) -> PathBuf {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).unwrap();
        }
        let mut file = File::create(path).unwrap();
        file.write_all(b"DUMMY MEDIA DATA").unwrap();
        path.to_path_buf()
    }

    fn scanner(root: &Path, ignore: &[&str]) -> Scanner {
        Scanner::new(IgnoreSet::new(ignore, root), CancellationToken::new())
    }

    fn names(folders: &[FolderDescriptor]) -> Vec<String> {
        folders.iter().map(|f| f.name.clone()).collect()
    }

    #[test]
    fn scan_collects_matching_files_and_skips_ignored() {
        let dir = tempdir().unwrap();
        let root = dir.path();
        touch(&root.join("a.jpg"));
        touch(&root.join("nested/b.JPG"));
        touch(&root.join("nested/c.mp4"));
        touch(&root.join("skip/d.jpg"));
        touch(&root.join("notes.txt"));

        let photos = ExtensionSet::new(&["jpg"]);
        let files = scanner(root, &["skip"]).scan(root, &photos).unwrap();

        let paths: Vec<PathBuf> = files.iter().map(|f| f.path.clone()).collect();
        assert_eq!(paths, vec![root.join("a.jpg"), root.join("nested/b.JPG")]);
        assert_eq!(files[0].size, 16);
        assert_eq!(files[0].name, "a.jpg");
    }

    #[test]
    fn count_covers_every_category() {
        let dir = tempdir().unwrap();
        let root = dir.path();
        touch(&root.join("a.jpg"));
        touch(&root.join("b.mp4"));
        touch(&root.join("c.txt"));

        let photos = ExtensionSet::new(&["jpg"]);
        let videos = ExtensionSet::new(&["mp4"]);
        let counts = scanner(root, &[]).count_candidates(root, &[&photos, &videos]).unwrap();
        assert_eq!(counts, vec![1, 1]);
    }

    #[test]
    fn cancelled_scan_returns_aborted() {
        let dir = tempdir().unwrap();
        touch(&dir.path().join("a.jpg"));

        let cancel = CancellationToken::new();
        cancel.cancel();
        let scanner = Scanner::new(IgnoreSet::default(), cancel);
        let result = scanner.scan(dir.path(), &ExtensionSet::new(&["jpg"]));
        assert!(matches!(result, Err(crate::error::OpsError::Aborted)));
    }

    #[test]
    fn empty_directories_are_found_bottom_up() {
        let dir = tempdir().unwrap();
        let root = dir.path();
        fs::create_dir_all(root.join("outer/inner")).unwrap();
        fs::create_dir_all(root.join("kept/also_empty")).unwrap();
        touch(&root.join("kept/file.jpg"));

        // "kept" still holds a file
        let folders = scanner(root, &[]).find_empty_directories(root).unwrap();
        assert_eq!(names(&folders), vec!["also_empty", "inner", "outer"]);
        assert!(folders.iter().all(|f| !f.requires_user_decision && f.size == 0));
    }

    #[test]
    fn folder_holding_a_file_is_not_empty() {
        let dir = tempdir().unwrap();
        let root = dir.path();
        touch(&root.join("album/a.jpg"));

        let folders = scanner(root, &[]).find_empty_directories(root).unwrap();
        assert!(folders.is_empty());
    }

    #[test]
    fn sorted_listing_keeps_every_readable_entry() {
        let dir = tempdir().unwrap();
        let root = dir.path();
        touch(&root.join("b.jpg"));
        touch(&root.join("a.jpg"));
        fs::create_dir_all(root.join("c")).unwrap();

        let entries = read_dir_sorted(root).unwrap();
        let names: Vec<String> = entries
            .iter()
            .map(|e| e.file_name().to_string_lossy().to_string())
            .collect();
        assert_eq!(names, vec!["a.jpg", "b.jpg", "c"]);
        assert!(read_dir_sorted(&root.join("missing")).is_err());
    }

    #[test]
    fn ignored_folders_are_never_reported_and_keep_parents() {
        let dir = tempdir().unwrap();
        let root = dir.path();
        fs::create_dir_all(root.join("parent/ignored")).unwrap();

        let folders = scanner(root, &["parent/ignored"]).find_empty_directories(root).unwrap();
        assert!(folders.is_empty());
    }

    #[test]
    fn future_empty_subtracts_pending_files() {
        let dir = tempdir().unwrap();
        let root = dir.path();
        let photo = touch(&root.join("trip/day1/a.jpg"));
        let video = touch(&root.join("trip/day2/b.mp4"));

        let s = scanner(root, &[]);
        let photos = s.scan(root, &ExtensionSet::new(&["jpg"])).unwrap();
        let videos = s.scan(root, &ExtensionSet::new(&["mp4"])).unwrap();
        assert_eq!(photos[0].path, photo);
        assert_eq!(videos[0].path, video);

        let folders = s
            .find_future_empty_directories(root, &photos, &[], &videos)
            .unwrap();
        assert_eq!(names(&folders), vec!["day1", "day2", "trip"]);
        assert!(folders.iter().all(|f| !f.requires_user_decision));
    }

    #[test]
    fn leftover_files_require_a_user_decision() {
        let dir = tempdir().unwrap();
        let root = dir.path();
        touch(&root.join("album/a.jpg"));
        touch(&root.join("album/readme.txt"));

        let s = scanner(root, &[]);
        let photos = s.scan(root, &ExtensionSet::new(&["jpg"])).unwrap();
        let folders = s.find_future_empty_directories(root, &photos, &[], &[]).unwrap();

        assert_eq!(folders.len(), 1);
        let album = &folders[0];
        assert!(album.requires_user_decision);
        assert!(album.has_non_media_files);
        assert_eq!(album.non_media_files.len(), 1);
        assert_eq!(album.non_media_files[0].name, "readme.txt");
        assert_eq!(album.size, 16);
    }

    #[test]
    fn single_folder_emptiness_judges_the_folder_itself() {
        let dir = tempdir().unwrap();
        let root = dir.path();
        let photo = touch(&root.join("album/a.jpg"));
        fs::create_dir_all(root.join("album/sub")).unwrap();

        let s = scanner(root, &[]);
        let photos = s.scan(root, &ExtensionSet::new(&["jpg"])).unwrap();
        assert_eq!(photos[0].path, photo);

        assert!(s.is_future_empty(&root.join("album"), &photos, &[], &[]).unwrap());
        assert!(!s.is_future_empty(&root.join("album"), &[], &[], &[]).unwrap());
    }

    #[test]
    fn decision_folder_keeps_its_parent() {
        let dir = tempdir().unwrap();
        let root = dir.path();
        touch(&root.join("outer/inner/keep.txt"));

        let s = scanner(root, &[]);
        let folders = s.find_future_empty_directories(root, &[], &[], &[]).unwrap();
        assert_eq!(names(&folders), vec!["inner"]);
        assert!(folders[0].requires_user_decision);
        assert!(s.find_empty_directories(root).unwrap().is_empty());
    }
}
