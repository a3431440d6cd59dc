//! Best-match scan over enrolled profiles.

use crate::embedding::cosine_sim;
use crate::profile::ProfileTable;

/// The best-matching enrolled user for a query embedding.
#[derive(Debug, Clone, PartialEq)]
pub struct Match {
    pub user_id: String,
    pub similarity: f32,
}

/// Returns the enrolled user most similar to the query embedding.
///
/// Linear scan; tables hold tens of users, an index would buy nothing.
/// Ties resolve to the lexicographically smallest user id so results are
/// reproducible regardless of table order. Returns `None` for an empty
/// table.
pub fn best_match(embedding: &[f32], profiles: &ProfileTable) -> Option<Match> {
    let mut best: Option<Match> = None;
    for p in profiles.iter() {
        let similarity = cosine_sim(embedding, &p.embedding);
        let better = match &best {
            None => true,
            Some(m) => {
                similarity > m.similarity
                    || (similarity == m.similarity && p.user_id < m.user_id)
            }
        };
        if better {
            best = Some(Match {
                user_id: p.user_id.clone(),
                similarity,
            });
        }
    }
    best
}
