//! Pure allocation function for the worker pool's per-user worker quota.
//!
//! Two phases: a base allocation split evenly across active users with an
//! error-count penalty, then redistribution of capacity reclaimed from
//! penalized users back to unpenalized ones. The allocator never fails -
//! it's a pure function of its inputs, so callers who can't read the store
//! just keep the previous allocation.

use std::collections::HashMap;

use uuid::Uuid;

/// Reduction applied to a user's base allocation per this many cumulative
/// batch-level errors.
pub const DEFAULT_ERROR_PENALTY_THRESHOLD: i64 = 50;

/// An active user's cumulative error count, the sole input besides the
/// pool's total capacity. Order matters: it is the tie-break order for
/// phase 1's `rem` bonus distribution.
#[derive(Debug, Clone, Copy)]
pub struct UserLoad {
    pub user_id: Uuid,
    pub error_count: i64,
}

/// Computes the per-user worker allocation. `users` order is the phase-1
/// input order (typically ascending by first-pending-task creation time,
/// the caller's concern). Returns an empty map if `users` is empty.
pub fn allocate(users: &[UserLoad], capacity: u32, penalty_threshold: i64) -> HashMap<Uuid, u32> {
    let k = users.len();
    if k == 0 {
        return HashMap::new();
    }
    let penalty_threshold = penalty_threshold.max(1);

    let base = capacity / k as u32;
    let rem = capacity % k as u32;

    // Phase 1: base allocation with bonus for the first `rem` users, then
    // the error penalty, each floored at 1.
    let mut alloc: Vec<u32> = Vec::with_capacity(k);
    let mut reduced: Vec<u32> = Vec::with_capacity(k);
    for (i, user) in users.iter().enumerate() {
        let bonus = if (i as u32) < rem { 1 } else { 0 };
        let base_alloc = (base + bonus).max(1);
        let penalty = (user.error_count / penalty_threshold).max(0) as u32;
        let actual = base_alloc.saturating_sub(penalty).max(1);
        alloc.push(actual);
        reduced.push(base_alloc - actual);
    }

    let mut pool: u32 = reduced.iter().sum();

    // Phase 2: redistribute the reclaimed pool to unpenalized users,
    // ascending by error count (stable).
    if pool > 0 {
        let mut eligible: Vec<usize> = (0..k).filter(|&i| reduced[i] == 0).collect();
        eligible.sort_by_key(|&i| users[i].error_count);

        let mut remaining = eligible.len();
        let mut idx = 0;
        while pool > 0 && remaining > 0 {
            let i = eligible[idx];
            let grant = (pool / remaining as u32).max(1).min(pool);
            alloc[i] += grant;
            pool -= grant;
            remaining -= 1;
            idx += 1;
        }
    }

    // Degenerate case (k > N): once cumulative allocation reaches capacity,
    // every remaining user (in original input order) gets zero this cycle.
    let mut running_total: u32 = 0;
    for a in alloc.iter_mut() {
        if running_total >= capacity {
            *a = 0;
        } else {
            running_total += *a;
        }
    }

    users
        .iter()
        .zip(alloc)
        .map(|(u, a)| (u.user_id, a))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn user(error_count: i64) -> UserLoad {
        UserLoad {
            user_id: Uuid::new_v4(),
            error_count,
        }
    }

    #[test]
    fn empty_users_yield_empty_allocation() {
        assert!(allocate(&[], 10, DEFAULT_ERROR_PENALTY_THRESHOLD).is_empty());
    }

    #[test]
    fn even_split_with_no_errors() {
        let users = [user(0), user(0), user(0)];
        let alloc = allocate(&users, 6, DEFAULT_ERROR_PENALTY_THRESHOLD);
        assert_eq!(alloc[&users[0].user_id], 2);
        assert_eq!(alloc[&users[1].user_id], 2);
        assert_eq!(alloc[&users[2].user_id], 2);
    }

    /// Scenario 5 from the documented test matrix: N=6, three users with
    /// errors {0, 50, 100}.
    #[test]
    fn penalty_and_redistribution_matches_documented_scenario() {
        let users = [user(0), user(50), user(100)];
        let alloc = allocate(&users, 6, DEFAULT_ERROR_PENALTY_THRESHOLD);
        assert_eq!(alloc[&users[0].user_id], 4);
        assert_eq!(alloc[&users[1].user_id], 1);
        assert_eq!(alloc[&users[2].user_id], 1);
        assert_eq!(alloc.values().sum::<u32>(), 6);
    }

    /// Boundary: N=1, five users sharing a single slot - only the first
    /// (in input order) is granted the slot this cycle.
    #[test]
    fn single_slot_among_many_users_never_oversubscribes() {
        let users: Vec<UserLoad> = (0..5).map(|_| user(0)).collect();
        let alloc = allocate(&users, 1, DEFAULT_ERROR_PENALTY_THRESHOLD);
        assert_eq!(alloc.values().sum::<u32>(), 1);
        assert_eq!(alloc[&users[0].user_id], 1);
        for u in &users[1..] {
            assert_eq!(alloc[&u.user_id], 0);
        }
    }

    #[test]
    fn heavy_error_user_is_floored_at_one() {
        let users = [user(0), user(5000)];
        let alloc = allocate(&users, 4, DEFAULT_ERROR_PENALTY_THRESHOLD);
        assert_eq!(alloc[&users[1].user_id], 1);
    }

    #[test]
    fn allocation_never_exceeds_capacity() {
        let users: Vec<UserLoad> = (0..10).map(|i| user(i * 7)).collect();
        let alloc = allocate(&users, 6, DEFAULT_ERROR_PENALTY_THRESHOLD);
        assert!(alloc.values().sum::<u32>() <= 6);
    }
}
