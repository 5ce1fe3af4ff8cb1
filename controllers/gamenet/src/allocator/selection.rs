//! Load-balancer selection policy
//!
//! Both strategies walk the configured candidate list and require the chosen
//! candidate to hold enough free ports up front; selection never commits to
//! an under-capacity candidate.

use serde::Serialize;

/// How a load balancer is chosen from the candidate list.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum SelectionPolicy {
    /// First candidate in list order with sufficient capacity
    FirstFit,
    /// Round-robin over candidates with sufficient capacity
    Scatter,
}

impl std::str::FromStr for SelectionPolicy {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim() {
            "first-fit" => Ok(SelectionPolicy::FirstFit),
            "scatter" => Ok(SelectionPolicy::Scatter),
            other => Err(format!("unknown selection policy: {other}")),
        }
    }
}

/// Picks the index of the candidate to allocate on, or `None` when no
/// candidate has `needed` free ports.
///
/// `free_counts[i]` is the free-port count of candidate `i`; candidates
/// without a bitmap yet count as fully free. The scatter cursor advances
/// past the chosen candidate and wraps; it is process-local state, so
/// distribution is best-effort across restarts.
pub(crate) fn select_candidate(
    policy: SelectionPolicy,
    free_counts: &[usize],
    needed: usize,
    cursor: &mut usize,
) -> Option<usize> {
    if free_counts.is_empty() {
        return None;
    }
    match policy {
        SelectionPolicy::FirstFit => free_counts.iter().position(|free| *free >= needed),
        SelectionPolicy::Scatter => {
            let start = *cursor % free_counts.len();
            for offset in 0..free_counts.len() {
                let idx = (start + offset) % free_counts.len();
                if free_counts[idx] >= needed {
                    *cursor = idx + 1;
                    return Some(idx);
                }
            }
            None
        }
    }
}
