//! Deterministic choice between a local and a remote value of one entity.
//!
//! Values are ranked by `(_version, updated_at, device_id)`. The higher key
//! wins no matter which replica holds it, so every device converges on the
//! same value. Equal keys keep the local copy.

use std::cmp::Ordering;

use crate::models::{ConflictSide, EntityRecord, ResolutionReason};

/// Outcome of comparing two values of the same entity
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Resolution {
    /// Side whose value is kept
    pub winner: ConflictSide,
    /// Rule that decided
    pub reason: ResolutionReason,
    /// Whether the discarded value differs in content from the kept one
    pub diverged: bool,
}

impl Resolution {
    pub fn remote_wins(&self) -> bool {
        self.winner == ConflictSide::Remote
    }

    /// Pick the kept value out of the pair that was resolved
    pub fn kept<'a>(&self, local: &'a EntityRecord, remote: &'a EntityRecord) -> &'a EntityRecord {
        match self.winner {
            ConflictSide::Local => local,
            ConflictSide::Remote => remote,
        }
    }

    /// Pick the discarded value out of the pair that was resolved
    pub fn discarded<'a>(
        &self,
        local: &'a EntityRecord,
        remote: &'a EntityRecord,
    ) -> &'a EntityRecord {
        match self.winner {
            ConflictSide::Local => remote,
            ConflictSide::Remote => local,
        }
    }
}

/// Resolve `local` against `remote`
pub fn resolve(local: &EntityRecord, remote: &EntityRecord) -> Resolution {
    let (ordering, reason) = compare(local, remote);
    let winner = if ordering == Ordering::Less {
        ConflictSide::Remote
    } else {
        ConflictSide::Local
    };
    Resolution {
        winner,
        reason,
        diverged: !local.same_content(remote),
    }
}

fn compare(local: &EntityRecord, remote: &EntityRecord) -> (Ordering, ResolutionReason) {
    match local.version.cmp(&remote.version) {
        Ordering::Equal => {}
        ordering => return (ordering, ResolutionReason::StaleVersion),
    }
    match local.updated_at.cmp(&remote.updated_at) {
        Ordering::Equal => {}
        ordering => return (ordering, ResolutionReason::NewerTimestamp),
    }
    match local.device_id.cmp(&remote.device_id) {
        Ordering::Equal => (Ordering::Equal, ResolutionReason::Identical),
        ordering => (ordering, ResolutionReason::DeviceTiebreak),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::Fields;
    use serde_json::json;

    fn value(version: i64, updated_at: i64, device: &str, name: &str) -> EntityRecord {
        let mut fields = Fields::new();
        fields.insert("name".to_string(), json!(name));
        let mut record = EntityRecord::new("user-1", device, fields);
        record.version = version;
        record.updated_at = updated_at;
        record
    }

    fn same_entity(mut record: EntityRecord, like: &EntityRecord) -> EntityRecord {
        record.id = like.id;
        record.created_at = like.created_at;
        record
    }

    #[test]
    fn higher_version_beats_newer_timestamp() {
        let local = value(2, 10, "a1", "local");
        let remote = same_entity(value(3, 5, "b2", "remote"), &local);

        let resolution = resolve(&local, &remote);
        assert_eq!(resolution.winner, ConflictSide::Remote);
        assert_eq!(resolution.reason, ResolutionReason::StaleVersion);
        assert!(resolution.diverged);
        assert_eq!(resolution.kept(&local, &remote), &remote);
        assert_eq!(resolution.discarded(&local, &remote), &local);
    }

    #[test]
    fn stale_remote_is_discarded() {
        let local = value(4, 1, "a1", "x");
        let remote = same_entity(value(3, 99, "z9", "y"), &local);

        let resolution = resolve(&local, &remote);
        assert_eq!(resolution.winner, ConflictSide::Local);
        assert_eq!(resolution.reason, ResolutionReason::StaleVersion);
    }

    #[test]
    fn equal_versions_fall_back_to_timestamp_then_device() {
        let local = value(2, 100, "a1", "local");
        let remote = same_entity(value(2, 200, "b2", "remote"), &local);
        let resolution = resolve(&local, &remote);
        assert_eq!(resolution.winner, ConflictSide::Remote);
        assert_eq!(resolution.reason, ResolutionReason::NewerTimestamp);

        let remote = same_entity(value(2, 100, "b2", "remote"), &local);
        let resolution = resolve(&local, &remote);
        assert_eq!(resolution.winner, ConflictSide::Remote);
        assert_eq!(resolution.reason, ResolutionReason::DeviceTiebreak);
    }

    #[test]
    fn identical_keys_keep_local() {
        let local = value(2, 100, "a1", "same");
        let remote = same_entity(value(2, 100, "a1", "same"), &local);
        let resolution = resolve(&local, &remote);
        assert_eq!(resolution.winner, ConflictSide::Local);
        assert_eq!(resolution.reason, ResolutionReason::Identical);
        assert!(!resolution.diverged);
    }

    #[test]
    fn outcome_is_independent_of_argument_order() {
        let base = value(1, 0, "a1", "base");
        let candidates = [
            same_entity(value(1, 10, "a1", "p"), &base),
            same_entity(value(1, 10, "b2", "q"), &base),
            same_entity(value(1, 20, "a1", "r"), &base),
            same_entity(value(2, 5, "c3", "s"), &base),
            same_entity(value(3, 1, "a1", "t"), &base),
        ];

        for a in &candidates {
            for b in &candidates {
                let forward = resolve(a, b);
                let backward = resolve(b, a);
                if forward.reason == ResolutionReason::Identical {
                    continue;
                }
                assert_eq!(forward.kept(a, b), backward.kept(b, a));
                assert_eq!(forward.reason, backward.reason);
            }
        }
    }
}
