use crate::config::CleanupConfig;
use crate::model::{FileDescriptor, FolderDescriptor, ScanResult};
use crate::progress::{report, CancellationToken, LogLevel, ProgressObserver};
use crate::scanner::Scanner;

/// Re-check a loaded scan against the filesystem as it is now.
///
/// Files and folders that disappeared are dropped. Folders that were waiting
/// on a manual decision get their leftover files re-checked, and once none
/// are left the folder is tested for true emptiness again.
pub fn verify_scan(
    result: &ScanResult,
    config: &CleanupConfig,
    observer: &dyn ProgressObserver,
) -> ScanResult {
    let photo_files = existing_files(&result.photo_files, observer);
    let short_videos = existing_files(&result.short_videos, observer);
    let long_videos = existing_files(&result.long_videos, observer);

    let scanner = Scanner::new(config.ignore_set(), CancellationToken::new());
    let mut empty_folders = Vec::new();

    for folder in &result.empty_folders {
        if !folder.path.is_dir() {
            report(observer, LogLevel::Warn, format!(
                "Folder no longer exists, dropped: {}",
                folder.path.display()
            ));
            continue;
        }

        if !folder.requires_user_decision {
            empty_folders.push(folder.clone());
            continue;
        }

        let leftovers: Vec<FileDescriptor> = folder
            .non_media_files
            .iter()
            .filter(|f| f.path.exists())
            .cloned()
            .collect();

        if !leftovers.is_empty() {
            empty_folders.push(FolderDescriptor::needing_decision(
                &folder.path,
                folder.last_modified,
                leftovers,
            ));
            continue;
        }

        // Long videos only leave the folder when they are being moved
        let pending_long: &[FileDescriptor] = if config.move_videos {
            &long_videos
        } else {
            &[]
        };
        match scanner.is_future_empty(&folder.path, &photo_files, &short_videos, pending_long) {
            Ok(true) => {
                report(observer, LogLevel::Info, format!(
                    "Leftover files are gone, folder can be removed: {}",
                    folder.path.display()
                ));
                empty_folders.push(FolderDescriptor::empty(&folder.path, folder.last_modified));
            }
            Ok(false) => {
                report(observer, LogLevel::Warn, format!(
                    "Folder has new content, dropped: {}",
                    folder.path.display()
                ));
            }
            Err(e) => {
                report(observer, LogLevel::Warn, format!(
                    "Could not re-check {}: {}",
                    folder.path.display(),
                    e
                ));
            }
        }
    }

    let verified = ScanResult {
        photo_files,
        short_videos,
        long_videos,
        empty_folders,
    };
    log_dropped(result, &verified);
    verified
}

fn existing_files(files: &[FileDescriptor], observer: &dyn ProgressObserver) -> Vec<FileDescriptor> {
    files
        .iter()
        .filter(|f| {
            let exists = f.path.is_file();
            if !exists {
                report(observer, LogLevel::Warn, format!(
                    "File no longer exists, dropped: {}",
                    f.path.display()
                ));
            }
            exists
        })
        .cloned()
        .collect()
}

fn log_dropped(before: &ScanResult, after: &ScanResult) {
    let before = before.photo_files.len()
        + before.short_videos.len()
        + before.long_videos.len()
        + before.empty_folders.len();
    let after = after.photo_files.len()
        + after.short_videos.len()
        + after.long_videos.len()
        + after.empty_folders.len();
    log::info!("Verified loaded scan: {} of {} entries still valid", after, before);
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::filter::ExtensionSet;
    use crate::progress::NullObserver;
    use std::fs;
    use std::path::Path;
    use tempfile::tempdir;

    fn scan(root: &Path) -> ScanResult {
        let scanner = Scanner::new(Default::default(), CancellationToken::new());
        let photo_files = scanner.scan(root, &ExtensionSet::new(&["jpg"])).unwrap();
        let empty_folders = scanner
            .find_future_empty_directories(root, &photo_files, &[], &[])
            .unwrap();
        ScanResult {
            photo_files,
            empty_folders,
            ..Default::default()
        }
    }

    #[test]
    fn untouched_tree_keeps_every_entry() {
        let dir = tempdir().unwrap();
        let root = dir.path();
        fs::create_dir_all(root.join("empty")).unwrap();
        fs::create_dir_all(root.join("album")).unwrap();
        fs::write(root.join("album/a.jpg"), b"x").unwrap();
        fs::write(root.join("album/notes.txt"), b"x").unwrap();

        let original = scan(root);
        let verified = verify_scan(&original, &CleanupConfig::new(root), &NullObserver);
        assert_eq!(verified, original);
    }

    #[test]
    fn vanished_entries_are_dropped() {
        let dir = tempdir().unwrap();
        let root = dir.path();
        fs::create_dir_all(root.join("empty")).unwrap();
        fs::write(root.join("a.jpg"), b"x").unwrap();

        let original = scan(root);
        fs::remove_file(root.join("a.jpg")).unwrap();
        fs::remove_dir(root.join("empty")).unwrap();

        let verified = verify_scan(&original, &CleanupConfig::new(root), &NullObserver);
        assert!(verified.is_empty());
    }

    #[test]
    fn decision_folder_becomes_empty_once_leftovers_go() {
        let dir = tempdir().unwrap();
        let root = dir.path();
        fs::create_dir_all(root.join("album")).unwrap();
        fs::write(root.join("album/a.jpg"), b"x").unwrap();
        fs::write(root.join("album/notes.txt"), b"x").unwrap();

        let original = scan(root);
        assert!(original.empty_folders[0].requires_user_decision);

        fs::remove_file(root.join("album/notes.txt")).unwrap();
        let verified = verify_scan(&original, &CleanupConfig::new(root), &NullObserver);

        assert_eq!(verified.empty_folders.len(), 1);
        let album = &verified.empty_folders[0];
        assert!(!album.requires_user_decision);
        assert!(album.non_media_files.is_empty());
        assert_eq!(verified.counts().empty_folders, 1);
    }

    #[test]
    fn decision_folder_with_new_content_is_dropped() {
        let dir = tempdir().unwrap();
        let root = dir.path();
        fs::create_dir_all(root.join("album")).unwrap();
        fs::write(root.join("album/notes.txt"), b"x").unwrap();

        let original = scan(root);
        fs::remove_file(root.join("album/notes.txt")).unwrap();
        fs::write(root.join("album/other.txt"), b"x").unwrap();

        let verified = verify_scan(&original, &CleanupConfig::new(root), &NullObserver);
        assert!(verified.empty_folders.is_empty());
    }
}
