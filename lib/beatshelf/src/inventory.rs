//! The reconciled track inventory, single source of truth server-side.
//!
//! Records are created when a source inventory is first loaded (recognition
//! feed, local scan, favorites scan) and never deleted, only flagged. Every
//! normalized key form of every track is indexed, and lookups probe every
//! form of the query key, so records match across the sources' naming
//! conventions without callers re-deriving key variants.

use std::collections::HashMap;

use chrono::{DateTime, Utc};
use shared::status::{FolderStats, QueueSnapshot, StatusSnapshot};
use shared::track::{Track, TrackRef, TrackState};
use tracing::debug;

use crate::error::{EngineError, Result};
use crate::keys::{self, KeySet};

#[derive(Default)]
pub struct Inventory {
    tracks: Vec<Track>,
    keys: Vec<KeySet>,
    index: HashMap<String, usize>,
    folders: Vec<FolderStats>,
}

impl Inventory {
    pub fn new() -> Self {
        Self::default()
    }

    /// Rebuild from persisted records at startup.
    pub fn from_tracks(tracks: Vec<Track>) -> Self {
        let mut inv = Self::new();
        for track in tracks {
            inv.insert(track);
        }
        inv
    }

    pub fn len(&self) -> usize {
        self.tracks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tracks.is_empty()
    }

    fn insert(&mut self, track: Track) -> usize {
        let key = keys::normalize(&track.artist, &track.title);
        let slot = self.tracks.len();
        for f in key.forms() {
            self.index.entry(f.clone()).or_insert(slot);
        }
        self.tracks.push(track);
        self.keys.push(key);
        slot
    }

    fn find(&self, track: &TrackRef) -> Option<usize> {
        let key = keys::normalize_ref(track);
        key.forms()
            .iter()
            .find_map(|f| self.index.get(f))
            .copied()
    }

    fn find_or_insert(&mut self, track: &TrackRef) -> usize {
        match self.find(track) {
            Some(slot) => slot,
            None => {
                debug!("New inventory record: {}", track);
                self.insert(Track::new(track.artist.clone(), track.title.clone()))
            }
        }
    }

    fn slot(&self, track: &TrackRef) -> Result<usize> {
        self.find(track).ok_or(EngineError::UnknownTrack)
    }

    pub fn get(&self, track: &TrackRef) -> Option<&Track> {
        self.find(track).map(|i| &self.tracks[i])
    }

    pub fn state_of(&self, track: &TrackRef) -> Result<TrackState> {
        self.slot(track).map(|i| self.tracks[i].state())
    }

    pub fn primary_key(&self, track: &TrackRef) -> String {
        match self.find(track) {
            Some(i) => self.keys[i].primary().to_string(),
            None => keys::normalize_ref(track).primary().to_string(),
        }
    }

    pub fn tracks(&self) -> &[Track] {
        &self.tracks
    }

    // --- source loads -----------------------------------------------------

    /// Record one entry of the device recognition feed.
    pub fn upsert_recognized(
        &mut self,
        track: &TrackRef,
        recognized_at: DateTime<Utc>,
    ) -> &Track {
        let slot = self.find_or_insert(track);
        let t = &mut self.tracks[slot];
        if t.recognized_at.is_none() {
            t.recognized_at = Some(recognized_at);
        }
        t
    }

    /// Attach a scanned local file; the track becomes `Have`.
    pub fn attach_local(&mut self, track: &TrackRef, path: &str) -> &Track {
        let slot = self.find_or_insert(track);
        let t = &mut self.tracks[slot];
        t.local_path = Some(path.to_string());
        t
    }

    /// Merge one marketplace favorite. A dismissed record keeps its
    /// dismissal: the user's explicit unfavorite outranks a stale listing.
    pub fn merge_favorite(
        &mut self,
        track: &TrackRef,
        url: &str,
        display_title: Option<&str>,
    ) -> &Track {
        let slot = self.find_or_insert(track);
        let t = &mut self.tracks[slot];
        t.marketplace_url = Some(url.to_string());
        if let Some(title) = display_title {
            t.display_title = Some(title.to_string());
        }
        if !t.dismissed {
            t.starred = true;
        }
        t
    }

    // --- state machine ----------------------------------------------------

    pub fn skip(&mut self, track: &TrackRef) -> Result<Track> {
        let slot = self.slot(track)?;
        let state = self.tracks[slot].state();
        if state != TrackState::ToDownload {
            return Err(EngineError::InvalidTransition { op: "skip", state });
        }
        self.tracks[slot].skipped = true;
        Ok(self.tracks[slot].clone())
    }

    pub fn unskip(&mut self, track: &TrackRef) -> Result<Track> {
        let slot = self.slot(track)?;
        let state = self.tracks[slot].state();
        if state != TrackState::Skipped {
            return Err(EngineError::InvalidTransition { op: "unskip", state });
        }
        self.tracks[slot].skipped = false;
        Ok(self.tracks[slot].clone())
    }

    /// Check that a dismiss may be queued: any non-`Have` state with a known
    /// marketplace URL.
    pub fn check_dismiss(&self, track: &TrackRef) -> Result<()> {
        let slot = self.slot(track)?;
        let t = &self.tracks[slot];
        if t.marketplace_url.is_none() {
            return Err(EngineError::MissingUrl);
        }
        let state = t.state();
        if state == TrackState::Have {
            return Err(EngineError::InvalidTransition {
                op: "dismiss",
                state,
            });
        }
        Ok(())
    }

    /// Apply the dismiss flags after the remote unstar confirmed.
    /// Dismissing always unfavorites.
    pub fn apply_dismiss(&mut self, track: &TrackRef) -> Result<Track> {
        let slot = self.slot(track)?;
        self.tracks[slot].dismissed = true;
        self.tracks[slot].starred = false;
        Ok(self.tracks[slot].clone())
    }

    pub fn apply_undismiss(&mut self, track: &TrackRef) -> Result<Track> {
        let slot = self.slot(track)?;
        let state = self.tracks[slot].state();
        if state != TrackState::Dismissed {
            return Err(EngineError::InvalidTransition {
                op: "undismiss",
                state,
            });
        }
        self.tracks[slot].dismissed = false;
        Ok(self.tracks[slot].clone())
    }

    /// Reset the dismissed flag without re-starring (the strike-through
    /// cleanup operation, not the inverse of dismiss).
    pub fn clear_dismissed(&mut self, track: &TrackRef) -> Result<Track> {
        let slot = self.slot(track)?;
        self.tracks[slot].dismissed = false;
        Ok(self.tracks[slot].clone())
    }

    pub fn confirm_star(
        &mut self,
        track: &TrackRef,
        url: Option<&str>,
        display_title: Option<&str>,
    ) -> Result<Track> {
        let slot = self.slot(track)?;
        let t = &mut self.tracks[slot];
        t.starred = true;
        t.dismissed = false;
        if let Some(url) = url {
            t.marketplace_url = Some(url.to_string());
        }
        if let Some(title) = display_title {
            t.display_title = Some(title.to_string());
        }
        Ok(t.clone())
    }

    pub fn confirm_unstar(&mut self, track: &TrackRef) -> Result<Track> {
        let slot = self.slot(track)?;
        self.tracks[slot].starred = false;
        Ok(self.tracks[slot].clone())
    }

    pub fn record_search_hit(
        &mut self,
        track: &TrackRef,
        url: &str,
        display_title: &str,
        match_score: f64,
    ) -> Result<Track> {
        let slot = self.slot(track)?;
        let t = &mut self.tracks[slot];
        t.marketplace_url = Some(url.to_string());
        t.display_title = Some(display_title.to_string());
        t.match_score = Some(match_score);
        t.searched_not_found = false;
        Ok(t.clone())
    }

    /// A confirmed negative search result. Distinct from "never searched",
    /// which has neither a URL nor this flag.
    pub fn record_not_found(&mut self, track: &TrackRef) -> Result<Track> {
        let slot = self.slot(track)?;
        self.tracks[slot].searched_not_found = true;
        Ok(self.tracks[slot].clone())
    }

    /// Clear the not-found flag on every track, touching nothing else.
    /// Returns the tracks that changed.
    pub fn reset_not_found(&mut self) -> Vec<Track> {
        let mut changed = Vec::new();
        for t in &mut self.tracks {
            if t.searched_not_found {
                t.searched_not_found = false;
                changed.push(t.clone());
            }
        }
        changed
    }

    // --- folder stats -----------------------------------------------------

    pub fn set_folder_stats(&mut self, stats: FolderStats) {
        match self.folders.iter_mut().find(|f| f.path == stats.path) {
            Some(existing) => *existing = stats,
            None => self.folders.push(stats),
        }
    }

    pub fn folders(&self) -> &[FolderStats] {
        &self.folders
    }

    // --- snapshot ---------------------------------------------------------

    pub fn snapshot(&self, queues: QueueSnapshot) -> StatusSnapshot {
        let mut snap = StatusSnapshot {
            folders: self.folders.clone(),
            queues,
            ..StatusSnapshot::default()
        };

        for (t, k) in self.tracks.iter().zip(&self.keys) {
            match t.state() {
                TrackState::Have => snap.have.push(t.clone()),
                TrackState::ToDownload => snap.to_download.push(t.clone()),
                TrackState::Skipped => snap.skipped.push(t.clone()),
                _ => {}
            }
            let key = k.primary().to_string();
            if t.starred {
                snap.starred.insert(key.clone(), true);
            }
            if t.dismissed {
                snap.dismissed.insert(key.clone(), true);
            }
            if t.searched_not_found {
                snap.not_found.insert(key, true);
            }
        }
        snap
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn aphex() -> TrackRef {
        TrackRef::new("Aphex Twin", "Xtal")
    }

    fn remote(inv: &mut Inventory, track: &TrackRef) {
        inv.upsert_recognized(track, Utc::now());
        inv.record_search_hit(track, "https://market.example/t/1", "Xtal", 0.93)
            .unwrap();
    }

    #[test]
    fn states_derive_from_flags() {
        let mut inv = Inventory::new();
        let t = aphex();
        inv.upsert_recognized(&t, Utc::now());
        assert_eq!(inv.state_of(&t).unwrap(), TrackState::Unresolved);

        inv.record_search_hit(&t, "https://market.example/t/1", "Xtal", 0.9)
            .unwrap();
        assert_eq!(inv.state_of(&t).unwrap(), TrackState::ToDownload);

        inv.attach_local(&t, "/music/xtal.mp3");
        assert_eq!(inv.state_of(&t).unwrap(), TrackState::Have);
    }

    #[test]
    fn lookup_matches_across_key_forms() {
        let mut inv = Inventory::new();
        inv.upsert_recognized(&TrackRef::new("Orbital & Yazoo", "Belfast (Edit)"), Utc::now());
        let other = TrackRef::new("Yazoo and Orbital", "Belfast");
        assert!(inv.get(&other).is_some());
    }

    #[test]
    fn skip_only_from_to_download() {
        let mut inv = Inventory::new();
        let t = aphex();
        inv.upsert_recognized(&t, Utc::now());

        let err = inv.skip(&t).unwrap_err();
        assert!(matches!(
            err,
            EngineError::InvalidTransition { op: "skip", .. }
        ));

        remote(&mut inv, &t);
        inv.skip(&t).unwrap();
        assert_eq!(inv.state_of(&t).unwrap(), TrackState::Skipped);
        inv.unskip(&t).unwrap();
        assert_eq!(inv.state_of(&t).unwrap(), TrackState::ToDownload);
    }

    #[test]
    fn dismiss_requires_url_and_non_have() {
        let mut inv = Inventory::new();
        let t = aphex();
        inv.upsert_recognized(&t, Utc::now());
        assert!(matches!(
            inv.check_dismiss(&t).unwrap_err(),
            EngineError::MissingUrl
        ));

        remote(&mut inv, &t);
        inv.attach_local(&t, "/music/xtal.mp3");
        assert!(matches!(
            inv.check_dismiss(&t).unwrap_err(),
            EngineError::InvalidTransition { op: "dismiss", .. }
        ));
    }

    #[test]
    fn dismiss_forces_starred_off() {
        let mut inv = Inventory::new();
        let t = aphex();
        remote(&mut inv, &t);
        inv.confirm_star(&t, None, None).unwrap();
        inv.check_dismiss(&t).unwrap();
        let dismissed = inv.apply_dismiss(&t).unwrap();
        assert!(dismissed.dismissed);
        assert!(!dismissed.starred);
    }

    #[test]
    fn clear_dismissed_does_not_restar() {
        let mut inv = Inventory::new();
        let t = aphex();
        remote(&mut inv, &t);
        inv.apply_dismiss(&t).unwrap();
        let cleared = inv.clear_dismissed(&t).unwrap();
        assert!(!cleared.dismissed);
        assert!(!cleared.starred);
    }

    #[test]
    fn stale_favorite_does_not_resurrect_dismissed() {
        let mut inv = Inventory::new();
        let t = aphex();
        remote(&mut inv, &t);
        inv.apply_dismiss(&t).unwrap();
        let merged = inv.merge_favorite(&t, "https://market.example/t/1", None);
        assert!(merged.dismissed);
        assert!(!merged.starred);
    }

    #[test]
    fn reset_not_found_touches_nothing_else() {
        let mut inv = Inventory::new();
        let t = aphex();
        inv.upsert_recognized(&t, Utc::now());
        inv.record_not_found(&t).unwrap();
        inv.attach_local(&TrackRef::new("Boards of Canada", "Roygbiv"), "/m/r.mp3");

        let changed = inv.reset_not_found();
        assert_eq!(changed.len(), 1);
        let track = inv.get(&t).unwrap();
        assert!(!track.searched_not_found);
        assert!(!track.starred);
        assert!(track.local_path.is_none());
    }

    #[test]
    fn search_hit_clears_not_found() {
        let mut inv = Inventory::new();
        let t = aphex();
        inv.upsert_recognized(&t, Utc::now());
        inv.record_not_found(&t).unwrap();
        inv.record_search_hit(&t, "https://market.example/t/1", "Xtal", 0.8)
            .unwrap();
        assert!(!inv.get(&t).unwrap().searched_not_found);
    }

    #[test]
    fn snapshot_buckets_by_state() {
        let mut inv = Inventory::new();
        let a = TrackRef::new("A", "One");
        let b = TrackRef::new("B", "Two");
        let c = TrackRef::new("C", "Three");
        inv.attach_local(&a, "/m/one.mp3");
        remote(&mut inv, &b);
        remote(&mut inv, &c);
        inv.skip(&c).unwrap();
        inv.confirm_star(&b, None, None).unwrap();

        let snap = inv.snapshot(QueueSnapshot::default());
        assert_eq!(snap.have.len(), 1);
        assert_eq!(snap.to_download.len(), 1);
        assert_eq!(snap.skipped.len(), 1);
        assert_eq!(snap.starred.len(), 1);
        assert!(snap.starred.contains_key("b|two"));
    }
}
