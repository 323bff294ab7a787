//! Per-session state: the sliding frame window and the label history used
//! for temporal smoothing.
//!
//! The outer map takes a short std lock only to look up or insert a session;
//! each session then has its own async mutex, held for the whole request so
//! two in-flight requests for the same session id serialize instead of
//! interleaving their window writes. Session entries are evicted
//! least-recently-used once the map reaches its cap.

use std::collections::{HashMap, VecDeque};
use std::sync::{Arc, Mutex};
use std::time::Instant;

use tokio::sync::Mutex as AsyncMutex;

use crate::features::WindowFrame;

/// State owned by one client stream.
pub struct Session {
    window: VecDeque<WindowFrame>,
    history: VecDeque<String>,
    sequence_len: usize,
    history_len: usize,
}

impl Session {
    fn new(sequence_len: usize, history_len: usize) -> Self {
        Session {
            window: VecDeque::with_capacity(sequence_len),
            history: VecDeque::with_capacity(history_len),
            sequence_len,
            history_len,
        }
    }

    /// Append a frame, evicting the oldest once the window is full.
    /// Returns whether the window has reached `sequence_len`.
    pub fn push(&mut self, frame: WindowFrame) -> bool {
        if self.window.len() == self.sequence_len {
            self.window.pop_front();
        }
        self.window.push_back(frame);
        self.window.len() == self.sequence_len
    }

    /// The current window, oldest first.
    pub fn window(&self) -> Vec<WindowFrame> {
        self.window.iter().cloned().collect()
    }

    /// Record a non-empty label and return the smoothed majority label.
    ///
    /// Ties break toward the label that first appeared earliest in the
    /// history window, so the vote is stable across calls. Empty labels must
    /// not reach this method; the caller skips smoothing for them.
    pub fn record_label(&mut self, label: &str) -> String {
        debug_assert!(!label.is_empty());
        if self.history.len() == self.history_len {
            self.history.pop_front();
        }
        self.history.push_back(label.to_string());
        majority_vote(&self.history).unwrap_or_else(|| label.to_string())
    }

    #[cfg(test)]
    pub fn history(&self) -> Vec<String> {
        self.history.iter().cloned().collect()
    }
}

/// Most frequent label in insertion order, first-seen wins ties.
fn majority_vote(history: &VecDeque<String>) -> Option<String> {
    let mut counts: Vec<(&String, usize)> = Vec::new();
    for label in history {
        match counts.iter_mut().find(|(l, _)| *l == label) {
            Some((_, count)) => *count += 1,
            None => counts.push((label, 1)),
        }
    }
    // Counts are in first-appearance order; only a strictly greater count
    // displaces the current winner, so ties keep the earliest label.
    let mut best: Option<(&String, usize)> = None;
    for (label, count) in counts {
        if best.map_or(true, |(_, c)| count > c) {
            best = Some((label, count));
        }
    }
    best.map(|(label, _)| label.clone())
}

struct SessionEntry {
    session: Arc<AsyncMutex<Session>>,
    last_seen: Instant,
}

/// Concurrent map of session id to session state, created lazily on first
/// request for an unseen id.
pub struct SessionStore {
    sessions: Mutex<HashMap<String, SessionEntry>>,
    sequence_len: usize,
    history_len: usize,
    max_sessions: usize,
}

impl SessionStore {
    pub fn new(sequence_len: usize, history_len: usize, max_sessions: usize) -> Self {
        SessionStore {
            sessions: Mutex::new(HashMap::new()),
            sequence_len,
            history_len,
            max_sessions,
        }
    }

    /// Fetch or create the session for `session_id`, refreshing its LRU
    /// stamp. The returned handle must be locked by the caller for the
    /// duration of the request.
    pub fn checkout(&self, session_id: &str) -> Arc<AsyncMutex<Session>> {
        let mut sessions = self.sessions.lock().expect("session map poisoned");

        if let Some(entry) = sessions.get_mut(session_id) {
            entry.last_seen = Instant::now();
            return Arc::clone(&entry.session);
        }

        if sessions.len() >= self.max_sessions {
            if let Some(oldest) = sessions
                .iter()
                .min_by_key(|(_, entry)| entry.last_seen)
                .map(|(id, _)| id.clone())
            {
                println!("[runtime] session cap reached, evicting idle session {}", oldest);
                sessions.remove(&oldest);
            }
        }

        let session = Arc::new(AsyncMutex::new(Session::new(
            self.sequence_len,
            self.history_len,
        )));
        sessions.insert(
            session_id.to_string(),
            SessionEntry {
                session: Arc::clone(&session),
                last_seen: Instant::now(),
            },
        );
        session
    }

    pub fn len(&self) -> usize {
        self.sessions.lock().expect("session map poisoned").len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn frame(tag: f32) -> WindowFrame {
        WindowFrame {
            descriptor: vec![tag],
            jpeg: vec![],
        }
    }

    #[test]
    fn test_window_not_ready_until_full() {
        let mut session = Session::new(4, 5);
        for i in 0..3 {
            assert!(!session.push(frame(i as f32)), "push {} should not be ready", i);
        }
        assert!(session.push(frame(3.0)));
        // Every push after capacity stays ready.
        assert!(session.push(frame(4.0)));
    }

    #[test]
    fn test_window_evicts_exactly_oldest() {
        let mut session = Session::new(4, 5);
        for i in 0..6 {
            session.push(frame(i as f32));
        }
        let window = session.window();
        assert_eq!(window.len(), 4);
        let tags: Vec<f32> = window.iter().map(|f| f.descriptor[0]).collect();
        assert_eq!(tags, vec![2.0, 3.0, 4.0, 5.0]);
    }

    #[test]
    fn test_majority_vote_prefers_most_frequent() {
        let mut session = Session::new(4, 5);
        for label in ["w", "w", "x", "w"] {
            session.record_label(label);
        }
        assert_eq!(session.record_label("w"), "w");
        assert_eq!(session.history(), vec!["w", "w", "x", "w", "w"]);
    }

    #[test]
    fn test_majority_vote_tie_breaks_to_earliest() {
        let mut session = Session::new(4, 5);
        session.record_label("a");
        session.record_label("b");
        // One a, one b: earliest-appearing wins.
        assert_eq!(session.record_label("b"), "b");
        // Now b leads 2-1.
        let mut tied = Session::new(4, 5);
        tied.record_label("x");
        assert_eq!(tied.record_label("y"), "x");
    }

    #[test]
    fn test_history_bounded() {
        let mut session = Session::new(4, 5);
        for label in ["a", "a", "a", "a", "a"] {
            session.record_label(label);
        }
        for _ in 0..5 {
            session.record_label("b");
        }
        assert_eq!(session.history(), vec!["b"; 5]);
        assert_eq!(session.record_label("b"), "b");
    }

    #[test]
    fn test_store_creates_lazily_and_reuses() {
        let store = SessionStore::new(4, 5, 8);
        let first = store.checkout("s1");
        let again = store.checkout("s1");
        assert!(Arc::ptr_eq(&first, &again));
        assert_eq!(store.len(), 1);
    }

    #[test]
    fn test_store_evicts_lru_at_cap() {
        let store = SessionStore::new(4, 5, 2);
        store.checkout("old");
        std::thread::sleep(std::time::Duration::from_millis(5));
        store.checkout("newer");
        std::thread::sleep(std::time::Duration::from_millis(5));
        // Touch "old" so "newer" becomes the LRU candidate.
        store.checkout("old");
        std::thread::sleep(std::time::Duration::from_millis(5));
        store.checkout("third");
        assert_eq!(store.len(), 2);
        // "old" must have survived the eviction.
        let sessions = store.sessions.lock().unwrap();
        assert!(sessions.contains_key("old"));
        assert!(sessions.contains_key("third"));
        assert!(!sessions.contains_key("newer"));
    }
}
