//! Bounded log of already-notified record ids.
//!
//! Ids are kept newest first. An empty log means "never initialized": the
//! first batch it sees is recorded silently instead of being reported as new,
//! so turning a source on does not flood every sink with its backlog.

use std::collections::{HashSet, VecDeque};

pub const DEFAULT_MAX_SEEN: usize = 100;
pub const MAX_SEEN_LIMIT: usize = 10_000;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SeenLog {
    ids: VecDeque<String>,
    max_len: usize,
}

impl SeenLog {
    /// `max_len` is clamped to `1..=MAX_SEEN_LIMIT`.
    pub fn new(max_len: usize) -> Self {
        let max_len = max_len.clamp(1, MAX_SEEN_LIMIT);
        Self {
            ids: VecDeque::with_capacity(max_len.min(256)),
            max_len,
        }
    }

    /// Rebuild from persisted ids (newest first), dropping duplicates and overflow.
    pub fn from_ids<I, S>(ids: I, max_len: usize) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let mut log = Self::new(max_len);
        let ids: Vec<String> = ids.into_iter().map(Into::into).collect();
        log.ids = dedup_first(&ids).into_iter().take(log.max_len).collect();
        log
    }

    /// Report which candidates are new and remember them.
    ///
    /// `candidates` is in fetch order (newest first). The returned ids are
    /// oldest first, the order notifications should go out in.
    pub fn diff_and_update(&mut self, candidates: &[String]) -> Vec<String> {
        let unique = dedup_first(candidates);

        if self.ids.is_empty() {
            self.ids = unique.into_iter().take(self.max_len).collect();
            return Vec::new();
        }

        let known: HashSet<&str> = self.ids.iter().map(String::as_str).collect();
        let new: Vec<String> = unique
            .iter()
            .rev()
            .filter(|id| !known.contains(id.as_str()))
            .cloned()
            .collect();
        drop(known);

        for id in &new {
            self.ids.push_front(id.clone());
        }
        self.ids.truncate(self.max_len);
        new
    }

    pub fn contains(&self, id: &str) -> bool {
        self.ids.iter().any(|s| s == id)
    }

    /// Newest first.
    pub fn ids(&self) -> impl Iterator<Item = &str> {
        self.ids.iter().map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.ids.len()
    }

    pub fn is_empty(&self) -> bool {
        self.ids.is_empty()
    }

    pub fn max_len(&self) -> usize {
        self.max_len
    }

    pub fn to_json(&self) -> String {
        serde_json::to_string(&self.ids).unwrap_or_else(|_| "[]".to_string())
    }

    pub fn from_json(s: &str, max_len: usize) -> serde_json::Result<Self> {
        let ids: Vec<String> = serde_json::from_str(s)?;
        Ok(Self::from_ids(ids, max_len))
    }
}

fn dedup_first(ids: &[String]) -> Vec<String> {
    let mut seen = HashSet::with_capacity(ids.len());
    ids.iter()
        .filter(|id| seen.insert(id.as_str()))
        .cloned()
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ids(xs: &[&str]) -> Vec<String> {
        xs.iter().map(|s| s.to_string()).collect()
    }

    fn contents(log: &SeenLog) -> Vec<&str> {
        log.ids().collect()
    }

    #[test]
    fn cold_start_seeds_quietly() {
        let mut log = SeenLog::new(100);
        let new = log.diff_and_update(&ids(&["C", "B", "A"]));
        assert!(new.is_empty());
        assert_eq!(contents(&log), vec!["C", "B", "A"]);
    }

    #[test]
    fn cold_start_dedups_and_truncates() {
        let mut log = SeenLog::new(2);
        let new = log.diff_and_update(&ids(&["C", "C", "B", "A"]));
        assert!(new.is_empty());
        assert_eq!(contents(&log), vec!["C", "B"]);
    }

    #[test]
    fn empty_batch_keeps_log_uninitialized() {
        let mut log = SeenLog::new(10);
        assert!(log.diff_and_update(&[]).is_empty());
        assert!(log.is_empty());
        // first real batch is still treated as the seed
        assert!(log.diff_and_update(&ids(&["A"])).is_empty());
    }

    #[test]
    fn steady_state_detects_unseen() {
        let mut log = SeenLog::from_ids(["A", "B", "C"], 100);
        let new = log.diff_and_update(&ids(&["D", "A", "B", "C"]));
        assert_eq!(new, ids(&["D"]));
        assert_eq!(contents(&log), vec!["D", "A", "B", "C"]);
    }

    #[test]
    fn new_ids_come_back_oldest_first() {
        let mut log = SeenLog::from_ids(["A"], 100);
        let new = log.diff_and_update(&ids(&["F", "E", "D", "A"]));
        assert_eq!(new, ids(&["D", "E", "F"]));
        assert_eq!(contents(&log), vec!["F", "E", "D", "A"]);
    }

    #[test]
    fn duplicates_in_batch_are_reported_once() {
        let mut log = SeenLog::from_ids(["A"], 100);
        let new = log.diff_and_update(&ids(&["B", "B", "A", "B"]));
        assert_eq!(new, ids(&["B"]));
        assert_eq!(log.len(), 2);
    }

    #[test]
    fn truncation_drops_oldest() {
        let mut log = SeenLog::from_ids(["B", "A"], 3);
        log.diff_and_update(&ids(&["D", "C", "B", "A"]));
        assert_eq!(contents(&log), vec!["D", "C", "B"]);
        assert!(!log.contains("A"));
    }

    #[test]
    fn bounded_growth_keeps_most_recent() {
        let m = 5;
        let mut log = SeenLog::from_ids(["id-0"], m);
        for i in 1..=50 {
            let id = format!("id-{i}");
            let new = log.diff_and_update(&[id.clone()]);
            assert_eq!(new, vec![id]);
            assert!(log.len() <= m);
            let expected: Vec<String> = (0..=i).rev().take(m).map(|n| format!("id-{n}")).collect();
            assert_eq!(log.ids().map(str::to_string).collect::<Vec<_>>(), expected);
        }
    }

    #[test]
    fn json_round_trip_respects_max_len() {
        let log = SeenLog::from_ids(["C", "B", "A"], 10);
        let back = SeenLog::from_json(&log.to_json(), 2).unwrap();
        assert_eq!(contents(&back), vec!["C", "B"]);
        assert!(SeenLog::from_json("{", 2).is_err());
    }

    #[test]
    fn max_len_is_clamped() {
        assert_eq!(SeenLog::new(0).max_len(), 1);
        assert_eq!(SeenLog::new(usize::MAX).max_len(), MAX_SEEN_LIMIT);
    }
}
