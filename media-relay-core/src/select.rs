use tracing::debug;

use crate::contract::CandidateItem;
use crate::ledger::Ledger;

/// Drop candidates already in the ledger and return the rest oldest first.
///
/// `candidates` arrive newest first, as every source lists them. Publishing in
/// reverse keeps the destination feed in source chronology, and an interrupted
/// run resumes from the oldest item still missing.
pub fn select(candidates: Vec<CandidateItem>, ledger: &Ledger) -> Vec<CandidateItem> {
    let total = candidates.len();
    let mut unseen: Vec<CandidateItem> = candidates
        .into_iter()
        .filter(|item| !ledger.contains(&item.id))
        .collect();
    unseen.reverse();

    debug!(
        candidates = total,
        unseen = unseen.len(),
        "Selected unseen candidates"
    );
    unseen
}
