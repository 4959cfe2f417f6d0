use std::collections::{BTreeSet, HashMap};

use crate::JobId;

/// Ordered set keyed by a numeric score, removable by member.
///
/// Mirrors a redis sorted set: ties on score order by member.
#[derive(Debug, Default, Clone)]
pub(crate) struct ScoredSet {
    by_score: BTreeSet<(i64, JobId)>,
    scores: HashMap<JobId, i64>,
}

impl ScoredSet {
    /// Add or re-score a member
    pub fn insert(&mut self, id: JobId, score: i64) {
        if let Some(old) = self.scores.insert(id.clone(), score) {
            self.by_score.remove(&(old, id.clone()));
        }
        self.by_score.insert((score, id));
    }

    /// Remove a member; false if it was not there
    pub fn remove(&mut self, id: &JobId) -> bool {
        match self.scores.remove(id) {
            Some(score) => self.by_score.remove(&(score, id.clone())),
            None => false,
        }
    }

    /// Remove and return up to `limit` members with score <= `max_score`,
    /// lowest score first
    pub fn pop_due(&mut self, max_score: i64, limit: usize) -> Vec<JobId> {
        let due: Vec<(i64, JobId)> = self
            .by_score
            .iter()
            .take_while(|(score, _)| *score <= max_score)
            .take(limit)
            .cloned()
            .collect();

        for entry in &due {
            self.by_score.remove(entry);
            self.scores.remove(&entry.1);
        }
        due.into_iter().map(|(_, id)| id).collect()
    }

    pub fn len(&self) -> usize {
        self.scores.len()
    }

    #[cfg(test)]
    pub fn score(&self, id: &JobId) -> Option<i64> {
        self.scores.get(id).copied()
    }
}
