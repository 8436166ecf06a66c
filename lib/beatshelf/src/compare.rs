//! Compare/rescan engine.
//!
//! Walks the configured folders for audio files, then identity-matches the
//! recognized tracks against what was found. The two phases report progress
//! separately: the walk is the long one, the match is the informative one.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::LazyLock;

use itertools::Itertools;
use regex::Regex;
use shared::status::{Folder, FolderStats};
use shared::track::TrackRef;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};
use walkdir::WalkDir;

use crate::keys;
use crate::progress::ProgressChannel;

const AUDIO_EXTENSIONS: [&str; 7] = ["flac", "wav", "m4a", "ogg", "aac", "wma", "mp3"];

static RE_LEAD_TRACK_NUMBER: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^\s*\d{1,3}\s*[\.\-]\s*").unwrap());

/// One local file whose stem parsed as "Artist - Title".
#[derive(Debug, Clone)]
pub struct ScannedFile {
    pub path: PathBuf,
    pub folder: String,
    pub track: TrackRef,
}

#[derive(Debug, Default)]
pub struct CompareOutcome {
    pub folders: Vec<FolderStats>,
    /// Recognized tracks resolved to a local file.
    pub matches: Vec<(TrackRef, PathBuf)>,
}

fn is_audio_file(path: &Path) -> bool {
    path.extension()
        .and_then(|s| s.to_str())
        .map(|ext| AUDIO_EXTENSIONS.contains(&ext.to_lowercase().as_str()))
        .unwrap_or(false)
}

/// Parse a file stem like "03 - Artist - Title" or "Artist - Title".
fn parse_stem(stem: &str) -> Option<TrackRef> {
    let cleaned = RE_LEAD_TRACK_NUMBER.replace(stem, "");
    let cleaned = cleaned.replace('_', " ");
    let (artist, title) = cleaned.split_once(" - ")?;
    let artist = artist.trim();
    let title = title.trim();
    if artist.is_empty() || title.is_empty() {
        return None;
    }
    Some(TrackRef::new(artist, title))
}

fn walk_folder(folder: &Folder) -> Vec<ScannedFile> {
    let mut files = Vec::new();
    for entry in WalkDir::new(&folder.path)
        .follow_links(false)
        .into_iter()
        .filter_map(|e| match e {
            Ok(entry) => Some(entry),
            Err(err) => {
                warn!("Skipping unreadable entry under {}: {}", folder.path, err);
                None
            }
        })
    {
        if !entry.file_type().is_file() || !is_audio_file(entry.path()) {
            continue;
        }
        let Some(stem) = entry.path().file_stem().and_then(|s| s.to_str()) else {
            continue;
        };
        match parse_stem(stem) {
            Some(track) => files.push(ScannedFile {
                path: entry.path().to_path_buf(),
                folder: folder.path.clone(),
                track,
            }),
            None => debug!("Unparseable stem, skipping: {}", stem),
        }
    }
    files
}

/// Phase 1: walk every folder. Blocking I/O, run it off the async worker.
pub async fn scan_folders(
    folders: &[Folder],
    progress: &ProgressChannel,
    token: &CancellationToken,
) -> Vec<ScannedFile> {
    progress.set_phase("Scanning local folders", Some(folders.len() as u64));

    let mut all = Vec::new();
    for folder in folders {
        if token.is_cancelled() {
            info!("Rescan cancelled during the scan phase");
            break;
        }
        let f = folder.clone();
        let scanned = match tokio::task::spawn_blocking(move || walk_folder(&f)).await {
            Ok(files) => files,
            Err(e) => {
                warn!("Folder walk for {} aborted: {}", folder.path, e);
                Vec::new()
            }
        };
        info!("Scanned {}: {} audio files", folder.path, scanned.len());
        progress.advance(None, format!("Scanned {}", folder.path));
        all.extend(scanned);
    }
    all
}

/// Phase 2: identity-match the recognized tracks against the scanned files.
pub fn match_tracks(
    recognized: &[TrackRef],
    scanned: &[ScannedFile],
    progress: &ProgressChannel,
    token: &CancellationToken,
) -> CompareOutcome {
    progress.set_phase("Matching recognized tracks", Some(recognized.len() as u64));

    // Every key form of every scanned file, first writer wins.
    let mut file_index: HashMap<String, usize> = HashMap::new();
    for (i, file) in scanned.iter().enumerate() {
        for form in keys::normalize_ref(&file.track).forms() {
            file_index.entry(form.clone()).or_insert(i);
        }
    }

    let mut matches = Vec::new();
    let mut matched_files: Vec<usize> = Vec::new();
    for track in recognized {
        if token.is_cancelled() {
            info!("Rescan cancelled during the match phase");
            break;
        }
        let key = keys::normalize_ref(track);
        let hit = key.forms().iter().find_map(|f| file_index.get(f)).copied();
        if let Some(i) = hit {
            matches.push((track.clone(), scanned[i].path.clone()));
            matched_files.push(i);
        }
        progress.advance(Some(key.primary()), format!("Matched {} tracks", matches.len()));
    }

    let scanned_per_folder = scanned.iter().map(|f| f.folder.clone()).counts();
    let matched_per_folder = matched_files
        .iter()
        .unique()
        .map(|&i| scanned[i].folder.clone())
        .counts();

    let folders = scanned_per_folder
        .into_iter()
        .sorted()
        .map(|(path, count)| FolderStats {
            scanned: count as u64,
            matched: matched_per_folder.get(&path).copied().unwrap_or(0) as u64,
            path,
        })
        .collect();

    CompareOutcome { folders, matches }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn stems_parse_with_and_without_track_numbers() {
        assert_eq!(
            parse_stem("03 - Burial - Archangel"),
            Some(TrackRef::new("Burial", "Archangel"))
        );
        assert_eq!(
            parse_stem("Burial - Archangel"),
            Some(TrackRef::new("Burial", "Archangel"))
        );
        assert_eq!(parse_stem("Archangel"), None);
    }

    #[test]
    fn underscores_read_as_spaces() {
        assert_eq!(
            parse_stem("Burial_-_Archangel"),
            Some(TrackRef::new("Burial", "Archangel"))
        );
    }

    #[test]
    fn only_audio_extensions_count() {
        assert!(is_audio_file(Path::new("/m/a.mp3")));
        assert!(is_audio_file(Path::new("/m/a.FLAC")));
        assert!(!is_audio_file(Path::new("/m/a.txt")));
        assert!(!is_audio_file(Path::new("/m/cover.jpg")));
    }

    #[test]
    fn matching_crosses_naming_conventions() {
        let scanned = vec![ScannedFile {
            path: PathBuf::from("/m/Burial & Four Tet - Moth.flac"),
            folder: "/m".to_string(),
            track: TrackRef::new("Burial & Four Tet", "Moth"),
        }];
        let recognized = vec![
            TrackRef::new("Four Tet and Burial", "Moth"),
            TrackRef::new("Burial", "Untrue"),
        ];
        let progress = ProgressChannel::new();
        let token = CancellationToken::new();

        let outcome = match_tracks(&recognized, &scanned, &progress, &token);
        assert_eq!(outcome.matches.len(), 1);
        assert_eq!(outcome.matches[0].0, recognized[0]);
        assert_eq!(outcome.folders.len(), 1);
        assert_eq!(outcome.folders[0].scanned, 1);
        assert_eq!(outcome.folders[0].matched, 1);
    }

    #[test]
    fn match_phase_reports_per_track_progress() {
        let recognized = vec![
            TrackRef::new("A", "One"),
            TrackRef::new("B", "Two"),
        ];
        let progress = ProgressChannel::new();
        progress.begin(shared::job::JobKind::Rescan, None, None);
        let token = CancellationToken::new();

        match_tracks(&recognized, &[], &progress, &token);
        let p = progress.read();
        assert_eq!(p.total, Some(2));
        assert_eq!(p.current, Some(2));
    }
}
