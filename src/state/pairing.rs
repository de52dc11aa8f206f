//! Pairing Algorithm: candidate selection for random matching.
//!
//! Pure selection over a pool snapshot. The caller re-validates the chosen
//! candidate under lock before committing; staleness here is tolerated,
//! commitment is not.

use chrono::{DateTime, Utc};
use rand::Rng;
use tandem_proto::{SkillLevel, SkillPreference, UserId};

/// One member of the random-match pool: an available user with a pending
/// random request, as seen at snapshot time.
#[derive(Debug, Clone)]
pub struct PoolCandidate {
    pub user_id: UserId,
    pub skill_level: SkillLevel,
    pub preference: SkillPreference,
    pub last_active: DateTime<Utc>,
}

/// Whether a seeker with `own_level` and `preference` accepts a partner at
/// `other_level`.
pub fn accepts(own_level: SkillLevel, preference: SkillPreference, other_level: SkillLevel) -> bool {
    match preference {
        SkillPreference::Similar => other_level == own_level,
        SkillPreference::Advanced => other_level > own_level,
        SkillPreference::Any => true,
    }
}

/// Whether a pairing is valid from both sides.
pub fn mutually_compatible(
    requester_level: SkillLevel,
    requester_pref: SkillPreference,
    candidate: &PoolCandidate,
) -> bool {
    accepts(requester_level, requester_pref, candidate.skill_level)
        && accepts(candidate.skill_level, candidate.preference, requester_level)
}

/// Select a candidate for the requester, or confirm none exists.
///
/// Policy, in priority order: (1) mutual skill compatibility; (2) prefer
/// candidates not recently paired with the requester; (3) break remaining
/// ties by most recent activity, and exact timestamp ties uniformly at
/// random so pool order carries no bias.
///
/// Returns an index into `pool`. No candidate is a valid, non-error
/// outcome.
pub fn select_candidate(
    requester_level: SkillLevel,
    requester_pref: SkillPreference,
    pool: &[PoolCandidate],
    recent_partners: &[UserId],
) -> Option<usize> {
    let valid: Vec<usize> = (0..pool.len())
        .filter(|&i| mutually_compatible(requester_level, requester_pref, &pool[i]))
        .collect();
    if valid.is_empty() {
        return None;
    }

    let fresh: Vec<usize> = valid
        .iter()
        .copied()
        .filter(|&i| !recent_partners.contains(&pool[i].user_id))
        .collect();
    let shortlist = if fresh.is_empty() { valid } else { fresh };

    let best_seen = shortlist.iter().map(|&i| pool[i].last_active).max()?;
    let finalists: Vec<usize> =
        shortlist.into_iter().filter(|&i| pool[i].last_active == best_seen).collect();

    if finalists.len() == 1 {
        Some(finalists[0])
    } else {
        let pick = rand::thread_rng().gen_range(0..finalists.len());
        Some(finalists[pick])
    }
}
