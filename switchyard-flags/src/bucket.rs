//! Deterministic bucketing of caller identifiers.

use sha2::{Digest, Sha256};

/// Number of buckets callers are spread over.
pub const BUCKET_COUNT: u64 = 100;

/// Map an identifier to a stable bucket in `0..100`.
///
/// Percentage rules and percentage rollouts both go through this function,
/// so a caller lands in the same bucket for either.
///
/// # Examples
///
/// ```
/// use switchyard_flags::bucket::bucket;
///
/// assert_eq!(bucket("user-42"), bucket("user-42"));
/// assert!(bucket("user-42") < 100);
/// ```
pub fn bucket(identifier: &str) -> u8 {
    let digest = Sha256::digest(identifier.as_bytes());

    let mut prefix = [0u8; 8];
    prefix.copy_from_slice(&digest[..8]);

    (u64::from_be_bytes(prefix) % BUCKET_COUNT) as u8
}

/// Whether `identifier` falls inside the first `percentage` buckets.
///
/// `percentage <= 0` never includes and `percentage >= 100` always does.
pub fn in_percentage(identifier: &str, percentage: f64) -> bool {
    if percentage <= 0.0 {
        return false;
    }
    if percentage >= 100.0 {
        return true;
    }
    f64::from(bucket(identifier)) < percentage
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_bucket_is_stable() {
        for id in ["alice", "bob", "", "user-123", "üñíçødé"] {
            assert_eq!(bucket(id), bucket(id));
            assert!(bucket(id) < 100);
        }
    }

    #[test]
    fn test_percentage_bounds() {
        for i in 0..500 {
            let id = format!("user-{}", i);
            assert!(!in_percentage(&id, 0.0));
            assert!(!in_percentage(&id, -5.0));
            assert!(in_percentage(&id, 100.0));
            assert!(in_percentage(&id, 250.0));
        }
    }

    #[test]
    fn test_distribution_is_roughly_uniform() {
        let mut counts = [0u32; 100];
        for i in 0..20_000 {
            counts[bucket(&format!("caller-{}", i)) as usize] += 1;
        }

        // 200 expected per bucket
        assert!(counts.iter().all(|&c| (120..=280).contains(&c)));

        let included = (0..10_000)
            .filter(|i| in_percentage(&format!("member-{}", i), 30.0))
            .count();
        assert!((2_700..=3_300).contains(&included));
    }
}
