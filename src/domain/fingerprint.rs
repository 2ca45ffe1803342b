//! Duplicate-message detection.
//!
//! Sources deliver at-least-once, and popular calls get reposted across
//! channels. A fingerprint hashes (trader, normalized text); the dispatcher
//! drops any message whose fingerprint was already seen inside a sliding
//! window. The window is bounded both by age and by capacity so memory use
//! stays flat no matter how busy the sources are.

use chrono::{DateTime, Duration, Utc};
use sha2::{Digest, Sha256};
use std::collections::{HashMap, VecDeque};

/// Hash of (trader, whitespace-collapsed lowercase text), hex-encoded.
pub fn fingerprint(trader: &str, text: &str) -> String {
    let normalized = text
        .split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
        .to_lowercase();

    let mut hasher = Sha256::new();
    hasher.update(trader.as_bytes());
    hasher.update([0x1f]);
    hasher.update(normalized.as_bytes());
    hex::encode(hasher.finalize())
}

/// Bounded sliding window of recently seen fingerprints.
///
/// A fingerprint counts as duplicate while its first sighting is younger than
/// the window; a repeat does not extend the window. When capacity is reached
/// the oldest entry is evicted regardless of age.
#[derive(Debug)]
pub struct DedupWindow {
    window: Duration,
    capacity: usize,
    seen: HashMap<String, DateTime<Utc>>,
    order: VecDeque<String>,
}

impl DedupWindow {
    pub fn new(window: Duration, capacity: usize) -> Self {
        DedupWindow {
            window,
            capacity: capacity.max(1),
            seen: HashMap::new(),
            order: VecDeque::new(),
        }
    }

    /// Record a sighting. Returns `true` if the fingerprint is new within the
    /// window (the caller should process the message), `false` for a
    /// duplicate.
    pub fn observe(&mut self, fp: &str, now: DateTime<Utc>) -> bool {
        self.prune(now);

        if let Some(first_seen) = self.seen.get(fp) {
            if now - *first_seen < self.window {
                return false;
            }
            // Aged out between prunes; treat as new and restart its window.
            self.forget(fp);
        }

        if self.seen.len() >= self.capacity {
            if let Some(oldest) = self.order.pop_front() {
                self.seen.remove(&oldest);
            }
        }

        self.seen.insert(fp.to_string(), now);
        self.order.push_back(fp.to_string());
        true
    }

    /// Pre-load a fingerprint seen at a known time, e.g. from the store on
    /// startup.
    pub fn seed(&mut self, fp: &str, seen_at: DateTime<Utc>) {
        if self.seen.contains_key(fp) || self.seen.len() >= self.capacity {
            return;
        }
        self.seen.insert(fp.to_string(), seen_at);
        self.order.push_back(fp.to_string());
    }

    pub fn len(&self) -> usize {
        self.seen.len()
    }

    pub fn is_empty(&self) -> bool {
        self.seen.is_empty()
    }

    fn prune(&mut self, now: DateTime<Utc>) {
        while let Some(front) = self.order.front() {
            let expired = self
                .seen
                .get(front)
                .map(|seen_at| now - *seen_at >= self.window)
                .unwrap_or(true);
            if !expired {
                break;
            }
            let fp = self.order.pop_front();
            if let Some(fp) = fp {
                self.seen.remove(&fp);
            }
        }
    }

    fn forget(&mut self, fp: &str) {
        self.seen.remove(fp);
        self.order.retain(|f| f != fp);
    }
}
