//! Staging → live promotion
//!
//! Promotion is all-or-nothing. When no staged token is inside the freshness
//! window nothing changes and the caller decides what to do. Otherwise the
//! live pool is replaced wholesale by the fresh tokens (re-stamped with the
//! promotion time), staging is emptied and the trigger counters reset.
//!
//! These functions only touch an in-memory document; `FileStore::promote`
//! persists the result in a single atomic write.

use std::time::Duration;

use crate::state::{RegionDocument, TokenRecord};

/// Whether `token` is no older than `window` at `now`.
pub fn is_fresh(token: &TokenRecord, now: u64, window: Duration) -> bool {
    token.timestamp.saturating_add(window.as_millis() as u64) >= now
}

/// Staged tokens eligible for promotion at `now`.
pub fn select_fresh(staging: &[TokenRecord], now: u64, window: Duration) -> Vec<TokenRecord> {
    staging
        .iter()
        .filter(|t| is_fresh(t, now, window))
        .cloned()
        .collect()
}

/// Promote fresh staged tokens in `doc`. Returns the new live pool size, or
/// `None` (document untouched) when nothing qualifies.
pub fn apply(doc: &mut RegionDocument, now: u64, window: Duration) -> Option<usize> {
    let fresh = select_fresh(&doc.staging, now, window);
    if fresh.is_empty() {
        return None;
    }

    doc.live = fresh
        .into_iter()
        .map(|t| TokenRecord {
            timestamp: now,
            ..t
        })
        .collect();
    doc.staging.clear();
    doc.state.success_count = 0;
    doc.state.refresh_done = false;
    doc.state.last_update_time = Some(now);
    Some(doc.live.len())
}

#[cfg(test)]
mod tests {
    use super::*;
    use common::Region;

    const WINDOW: Duration = Duration::from_secs(30 * 60);
    const MINUTE: u64 = 60_000;

    fn token(uid: &str, timestamp: u64) -> TokenRecord {
        TokenRecord {
            uid: uid.into(),
            token: format!("tok-{uid}"),
            timestamp,
        }
    }

    fn doc_with(staging: Vec<TokenRecord>, live: Vec<TokenRecord>) -> RegionDocument {
        let mut doc = RegionDocument::new(Region::Ind);
        doc.staging = staging;
        doc.live = live;
        doc.state.success_count = 31;
        doc.state.refresh_done = true;
        doc
    }

    #[test]
    fn freshness_boundary_is_inclusive() {
        let now = 100 * MINUTE;
        assert!(is_fresh(&token("a", now - 30 * MINUTE), now, WINDOW));
        assert!(!is_fresh(&token("a", now - 30 * MINUTE - 1), now, WINDOW));
        assert!(is_fresh(&token("a", now + MINUTE), now, WINDOW));
    }

    #[test]
    fn all_stale_leaves_document_untouched() {
        let now = 100 * MINUTE;
        let live = vec![token("old-1", 0), token("old-2", 0)];
        let mut doc = doc_with(vec![token("s", now - 31 * MINUTE)], live.clone());

        assert_eq!(apply(&mut doc, now, WINDOW), None);
        assert_eq!(doc.live, live);
        assert_eq!(doc.staging.len(), 1);
        assert_eq!(doc.state.success_count, 31);
        assert!(doc.state.refresh_done);
    }

    #[test]
    fn promotes_only_fresh_tokens_and_resets_counters() {
        let now = 100 * MINUTE;
        let mut doc = doc_with(
            vec![
                token("fresh-1", now - MINUTE),
                token("stale", now - 45 * MINUTE),
                token("fresh-2", now - 29 * MINUTE),
            ],
            vec![token("old", 0)],
        );

        assert_eq!(apply(&mut doc, now, WINDOW), Some(2));
        let uids: Vec<&str> = doc.live.iter().map(|t| t.uid.as_str()).collect();
        assert_eq!(uids, vec!["fresh-1", "fresh-2"]);
        assert!(doc.live.iter().all(|t| t.timestamp == now));
        assert!(doc.staging.is_empty());
        assert_eq!(doc.state.success_count, 0);
        assert!(!doc.state.refresh_done);
        assert_eq!(doc.state.last_update_time, Some(now));
    }

    #[test]
    fn smaller_fresh_batch_replaces_larger_live_pool() {
        let now = 100 * MINUTE;
        let live: Vec<TokenRecord> = (0..50).map(|i| token(&format!("l{i}"), 0)).collect();
        let mut doc = doc_with(vec![token("only", now)], live);

        assert_eq!(apply(&mut doc, now, WINDOW), Some(1));
        assert_eq!(doc.live.len(), 1);
        assert_eq!(doc.live[0].uid, "only");
    }
}
