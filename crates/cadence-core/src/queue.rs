use std::cmp::Ordering;
use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;

use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::candidate::RebloomCandidate;
use crate::types::now_ms;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct QueueConfig {
    pub ttl_ms: u64,
    pub min_viable_score: f64,
    pub trust_weight: f64,
    pub stability_weight: f64,
    pub reinforcement_weight: f64,
    pub vitality_weight: f64,
    pub generation_decay: f64,
    pub cluster_base: f64,
    pub cluster_step: f64,
    pub cluster_cap: f64,
    /// Largest share of priority taken from a seed that was just popped.
    pub failure_penalty: f64,
    pub failure_recovery: f64,
}

impl Default for QueueConfig {
    fn default() -> Self {
        QueueConfig {
            ttl_ms: 2 * 60 * 60 * 1000,
            min_viable_score: 0.1,
            trust_weight: 0.35,
            stability_weight: 0.2,
            reinforcement_weight: 0.2,
            vitality_weight: 0.25,
            generation_decay: 0.15,
            cluster_base: 0.95,
            cluster_step: 0.05,
            cluster_cap: 1.10,
            failure_penalty: 0.7,
            failure_recovery: 3.0,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Error)]
pub enum QueueRejection {
    #[error("seed {seed_id} is already queued")]
    Duplicate { seed_id: String },
    #[error("priority {score:.4} is below the viable minimum {minimum:.4}")]
    BelowMinimum { score: f64, minimum: f64 },
}

impl QueueRejection {
    pub fn as_str(&self) -> &'static str {
        match self {
            QueueRejection::Duplicate { .. } => "duplicate",
            QueueRejection::BelowMinimum { .. } => "below_minimum",
        }
    }
}

/// Read-only line of [`RebloomPriorityQueue::preview`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QueuedEntry {
    pub seed_id: String,
    pub score: f64,
    pub enqueued_ms: u64,
    pub generation: u32,
    pub rebloom_tag: String,
}

/// Orders best score first, then oldest, then by seed id.
#[derive(Debug, Clone)]
struct EntryKey {
    score: f64,
    enqueued_ms: u64,
    seed_id: String,
}

impl Ord for EntryKey {
    fn cmp(&self, other: &Self) -> Ordering {
        other
            .score
            .total_cmp(&self.score)
            .then_with(|| self.enqueued_ms.cmp(&other.enqueued_ms))
            .then_with(|| self.seed_id.cmp(&other.seed_id))
    }
}

impl PartialOrd for EntryKey {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl PartialEq for EntryKey {
    fn eq(&self, other: &Self) -> bool {
        self.cmp(other) == Ordering::Equal
    }
}

impl Eq for EntryKey {}

#[derive(Debug)]
struct QueueInner {
    cfg: QueueConfig,
    entries: BTreeMap<EntryKey, RebloomCandidate>,
    index: HashMap<String, EntryKey>,
    lineage: HashMap<String, Vec<String>>,
    failures: HashMap<String, u64>,
    next_tag: u64,
}

impl QueueInner {
    fn is_stale(&self, key: &EntryKey, now_ms: u64) -> bool {
        now_ms.saturating_sub(key.enqueued_ms) > self.cfg.ttl_ms
    }

    fn purge_stale(&mut self, now_ms: u64) {
        let stale: Vec<EntryKey> = self
            .entries
            .keys()
            .filter(|key| self.is_stale(key, now_ms))
            .cloned()
            .collect();
        for key in stale {
            self.index.remove(&key.seed_id);
            self.entries.remove(&key);
            tracing::info!(
                seed = %key.seed_id,
                age_ms = now_ms.saturating_sub(key.enqueued_ms),
                "queue.evicted"
            );
        }
    }

    fn prune_failures(&mut self, now_ms: u64) {
        let ttl = self.cfg.ttl_ms;
        self.failures
            .retain(|_, at| now_ms.saturating_sub(*at) <= ttl);
    }

    fn cluster_factor(&self, candidate: &RebloomCandidate, now_ms: u64) -> f64 {
        let Some((col, row)) = candidate.grid_position else {
            return 1.0;
        };
        let neighbours = self
            .entries
            .iter()
            .filter(|(key, queued)| {
                queued.seed_id != candidate.seed_id && !self.is_stale(key, now_ms)
            })
            .filter_map(|(_, queued)| queued.grid_position)
            .filter(|(c, r)| (c - col).abs() + (r - row).abs() <= 1)
            .count();
        let cfg = &self.cfg;
        (cfg.cluster_base + cfg.cluster_step * neighbours as f64).min(cfg.cluster_cap)
    }

    fn failure_factor(&self, seed_id: &str, now_ms: u64) -> f64 {
        let Some(failed_at) = self.failures.get(seed_id) else {
            return 1.0;
        };
        let elapsed = now_ms.saturating_sub(*failed_at);
        if elapsed > self.cfg.ttl_ms {
            return 1.0;
        }
        let ttl = self.cfg.ttl_ms.max(1) as f64;
        1.0 - self.cfg.failure_penalty * (-self.cfg.failure_recovery * elapsed as f64 / ttl).exp()
    }

    /// Lineage length + 1, or the candidate's own generation if deeper.
    fn generation_of(&self, candidate: &RebloomCandidate) -> u32 {
        let depth = self
            .lineage
            .get(&candidate.seed_id)
            .map(Vec::len)
            .unwrap_or(0);
        let from_lineage = u32::try_from(depth).unwrap_or(u32::MAX - 1) + 1;
        candidate.generation.max(from_lineage)
    }

    fn score(&self, candidate: &RebloomCandidate, now_ms: u64) -> f64 {
        let cfg = &self.cfg;
        let reinforcement = (candidate.reinforcement_count as f64 * 0.1).min(0.5);
        let base = cfg.trust_weight * candidate.trust_score
            + cfg.stability_weight * (1.0 - candidate.entropy_score)
            + cfg.reinforcement_weight * reinforcement
            + cfg.vitality_weight * candidate.vitality;
        let generations = self.generation_of(candidate) as f64 - 1.0;
        let decay = (-cfg.generation_decay * generations).exp();
        let score = base
            * decay
            * self.cluster_factor(candidate, now_ms)
            * self.failure_factor(&candidate.seed_id, now_ms);
        if score.is_nan() {
            return 0.0;
        }
        score.clamp(0.0, 1.0)
    }

    fn try_push(
        &mut self,
        mut candidate: RebloomCandidate,
        now_ms: u64,
    ) -> Result<String, QueueRejection> {
        self.purge_stale(now_ms);
        if self.index.contains_key(&candidate.seed_id) {
            return Err(QueueRejection::Duplicate {
                seed_id: candidate.seed_id,
            });
        }
        self.prune_failures(now_ms);
        candidate.generation = self.generation_of(&candidate);
        let score = self.score(&candidate, now_ms);
        if score < self.cfg.min_viable_score {
            return Err(QueueRejection::BelowMinimum {
                score,
                minimum: self.cfg.min_viable_score,
            });
        }

        self.next_tag += 1;
        let tag = format!(
            "rebloom-{}-g{}-{}",
            candidate.seed_id, candidate.generation, self.next_tag
        );
        self.lineage
            .entry(candidate.seed_id.clone())
            .or_default()
            .push(tag.clone());
        candidate.rebloom_tag = Some(tag.clone());

        let key = EntryKey {
            score,
            enqueued_ms: now_ms,
            seed_id: candidate.seed_id.clone(),
        };
        self.index.insert(candidate.seed_id.clone(), key.clone());
        tracing::debug!(seed = %candidate.seed_id, score, tag = %tag, "queue.pushed");
        self.entries.insert(key, candidate);
        Ok(tag)
    }

    fn pop(&mut self, now_ms: u64) -> Option<RebloomCandidate> {
        self.purge_stale(now_ms);
        let (key, candidate) = self.entries.pop_first()?;
        self.index.remove(&key.seed_id);
        self.failures.insert(key.seed_id, now_ms);
        Some(candidate)
    }
}

/// Scored max-priority queue of rebloom candidates. Clones share the queue.
#[derive(Debug, Clone)]
pub struct RebloomPriorityQueue {
    inner: Arc<Mutex<QueueInner>>,
}

impl Default for RebloomPriorityQueue {
    fn default() -> Self {
        RebloomPriorityQueue::new(QueueConfig::default())
    }
}

impl RebloomPriorityQueue {
    pub fn new(cfg: QueueConfig) -> Self {
        RebloomPriorityQueue {
            inner: Arc::new(Mutex::new(QueueInner {
                cfg,
                entries: BTreeMap::new(),
                index: HashMap::new(),
                lineage: HashMap::new(),
                failures: HashMap::new(),
                next_tag: 0,
            })),
        }
    }

    /// Builds a candidate whose generation follows this queue's lineage for `seed_id`.
    pub fn candidate(
        &self,
        seed_id: impl Into<String>,
        trust_score: f64,
        entropy_score: f64,
    ) -> RebloomCandidate {
        let candidate = RebloomCandidate::new(seed_id, trust_score, entropy_score);
        let generation = self.inner.lock().generation_of(&candidate);
        candidate.with_generation(generation)
    }

    pub fn push(&self, candidate: RebloomCandidate) -> bool {
        self.push_at(candidate, now_ms())
    }

    pub fn push_at(&self, candidate: RebloomCandidate, now_ms: u64) -> bool {
        self.try_push_at(candidate, now_ms).is_ok()
    }

    pub fn try_push(&self, candidate: RebloomCandidate) -> Result<String, QueueRejection> {
        self.try_push_at(candidate, now_ms())
    }

    pub fn try_push_at(
        &self,
        candidate: RebloomCandidate,
        now_ms: u64,
    ) -> Result<String, QueueRejection> {
        let seed = candidate.seed_id.clone();
        let result = self.inner.lock().try_push(candidate, now_ms);
        if let Err(err) = &result {
            tracing::info!(seed = %seed, reason = err.as_str(), error = %err, "queue.rejected");
        }
        result
    }

    pub fn pop(&self) -> Option<RebloomCandidate> {
        self.pop_at(now_ms())
    }

    pub fn pop_at(&self, now_ms: u64) -> Option<RebloomCandidate> {
        self.inner.lock().pop(now_ms)
    }

    pub fn mark_success(&self, seed_id: &str) {
        self.inner.lock().failures.remove(seed_id);
    }

    pub fn compute_priority(&self, candidate: &RebloomCandidate) -> f64 {
        self.compute_priority_at(candidate, now_ms())
    }

    pub fn compute_priority_at(&self, candidate: &RebloomCandidate, now_ms: u64) -> f64 {
        self.inner.lock().score(candidate, now_ms)
    }

    pub fn preview(&self, limit: usize) -> Vec<QueuedEntry> {
        self.preview_at(limit, now_ms())
    }

    /// Best-first snapshot of live entries; stale entries are skipped, not removed.
    pub fn preview_at(&self, limit: usize, now_ms: u64) -> Vec<QueuedEntry> {
        let inner = self.inner.lock();
        inner
            .entries
            .iter()
            .filter(|(key, _)| !inner.is_stale(key, now_ms))
            .take(limit)
            .map(|(key, candidate)| QueuedEntry {
                seed_id: key.seed_id.clone(),
                score: key.score,
                enqueued_ms: key.enqueued_ms,
                generation: candidate.generation,
                rebloom_tag: candidate.rebloom_tag.clone().unwrap_or_default(),
            })
            .collect()
    }

    pub fn len(&self) -> usize {
        self.inner.lock().entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn lineage(&self, seed_id: &str) -> Vec<String> {
        self.inner
            .lock()
            .lineage
            .get(seed_id)
            .cloned()
            .unwrap_or_default()
    }

    pub fn lineage_depth(&self, seed_id: &str) -> usize {
        self.inner
            .lock()
            .lineage
            .get(seed_id)
            .map(Vec::len)
            .unwrap_or(0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const T0: u64 = 1_000_000;

    fn queue() -> RebloomPriorityQueue {
        RebloomPriorityQueue::new(QueueConfig::default())
    }

    #[test]
    fn pushing_the_same_seed_twice_keeps_one_entry() {
        let q = queue();
        let first = q.push_at(RebloomCandidate::new("s1", 0.8, 0.2), T0);
        let second = q.push_at(RebloomCandidate::new("s1", 0.9, 0.1), T0 + 5);
        assert_eq!((first, second), (true, false));
        assert_eq!(q.len(), 1);
        assert!(matches!(
            q.try_push_at(RebloomCandidate::new("s1", 0.9, 0.1), T0 + 6),
            Err(QueueRejection::Duplicate { .. })
        ));
    }

    #[test]
    fn higher_trust_pops_first() {
        let q = queue();
        for (seed, trust) in [("low", 0.5), ("high", 0.9), ("mid", 0.7)] {
            assert!(q.push_at(RebloomCandidate::new(seed, trust, 0.2), T0));
        }
        let order: Vec<_> = std::iter::from_fn(|| q.pop_at(T0 + 1))
            .map(|c| c.seed_id)
            .collect();
        assert_eq!(order, vec!["high", "mid", "low"]);
    }

    #[test]
    fn first_generation_beats_third() {
        let q = queue();
        q.push_at(RebloomCandidate::new("old", 0.8, 0.2).with_generation(3), T0);
        q.push_at(RebloomCandidate::new("young", 0.8, 0.2).with_generation(1), T0);
        assert_eq!(q.pop_at(T0).map(|c| c.seed_id), Some("young".to_string()));
    }

    #[test]
    fn equal_scores_pop_oldest_first() {
        let q = queue();
        q.push_at(RebloomCandidate::new("b", 0.8, 0.2), T0 + 10);
        q.push_at(RebloomCandidate::new("a", 0.8, 0.2), T0 + 20);
        q.push_at(RebloomCandidate::new("c", 0.8, 0.2), T0 + 10);
        let order: Vec<_> = std::iter::from_fn(|| q.pop_at(T0 + 30))
            .map(|c| c.seed_id)
            .collect();
        assert_eq!(order, vec!["b", "c", "a"]);
    }

    #[test]
    fn stale_entries_are_skipped_and_evicted() {
        let q = queue();
        let ttl = QueueConfig::default().ttl_ms;
        q.push_at(RebloomCandidate::new("stale", 0.9, 0.1), T0);
        q.push_at(RebloomCandidate::new("fresh", 0.5, 0.5), T0 + ttl);
        let preview = q.preview_at(10, T0 + ttl + 1);
        assert_eq!(preview.len(), 1);
        assert_eq!(preview[0].seed_id, "fresh");
        assert_eq!(q.len(), 2);
        assert_eq!(
            q.pop_at(T0 + ttl + 1).map(|c| c.seed_id),
            Some("fresh".to_string())
        );
        assert!(q.is_empty());
    }

    #[test]
    fn weakest_candidate_is_rejected() {
        let q = queue();
        let weak = RebloomCandidate::new("weak", 0.0, 1.0);
        let score = q.compute_priority_at(&weak, T0);
        assert!((score - 0.0375).abs() < 1e-9);
        match q.try_push_at(weak, T0) {
            Err(QueueRejection::BelowMinimum { score, .. }) => assert!(score < 0.1),
            other => panic!("unexpected {other:?}"),
        }
        assert!(q.is_empty());
    }

    #[test]
    fn neighbours_raise_cluster_factor() {
        let q = queue();
        let lone = RebloomCandidate::new("lone", 0.8, 0.2).with_position(0, 1);
        let alone = q.compute_priority_at(&lone, T0);
        let unplaced = q.compute_priority_at(&RebloomCandidate::new("lone", 0.8, 0.2), T0);
        assert!((alone - unplaced * 0.95).abs() < 1e-12);

        q.push_at(RebloomCandidate::new("n1", 0.8, 0.2).with_position(0, 0), T0);
        q.push_at(RebloomCandidate::new("far", 0.8, 0.2).with_position(9, 9), T0);
        let clustered = q.compute_priority_at(&lone, T0);
        assert!((clustered - unplaced).abs() < 1e-12);
    }

    #[test]
    fn recent_pop_penalises_until_success() {
        let q = queue();
        let ttl = QueueConfig::default().ttl_ms;
        let template = RebloomCandidate::new("s", 0.8, 0.2);
        let first = q.compute_priority_at(&template, T0);
        q.push_at(template.clone(), T0);
        q.pop_at(T0);
        let second_generation = first * (-0.15f64).exp();
        let penalised = q.compute_priority_at(&template, T0);
        assert!((penalised - second_generation * 0.3).abs() < 1e-9);
        let later = q.compute_priority_at(&template, T0 + ttl / 2);
        assert!(later > penalised && later < second_generation);
        q.mark_success("s");
        assert!((q.compute_priority_at(&template, T0) - second_generation).abs() < 1e-12);
    }

    #[test]
    fn lineage_drives_generation() {
        let q = queue();
        let first = q.candidate("s", 0.8, 0.2);
        assert_eq!(first.generation, 1);
        let tag = q.try_push_at(first, T0).expect("push");
        assert!(tag.starts_with("rebloom-s-g1-"));
        let popped = q.pop_at(T0).expect("pop");
        assert_eq!(popped.rebloom_tag.as_deref(), Some(tag.as_str()));
        let second = q.candidate("s", 0.8, 0.2);
        assert_eq!(second.generation, 2);
        q.push_at(second, T0 + 1);
        assert_eq!(q.lineage_depth("s"), 2);
        assert_eq!(q.lineage("s").len(), 2);
        assert_eq!(q.lineage_depth("other"), 0);
    }

    #[test]
    fn plain_candidates_inherit_generation_from_lineage() {
        let q = queue();
        for round in 0..4u64 {
            let tag = q
                .try_push_at(RebloomCandidate::new("s", 0.8, 0.2), T0 + round)
                .expect("push");
            assert!(tag.starts_with(&format!("rebloom-s-g{}-", round + 1)));
            let popped = q.pop_at(T0 + round).expect("pop");
            assert_eq!(popped.generation as u64, round + 1);
            q.mark_success("s");
        }
        assert_eq!(q.lineage_depth("s"), 4);

        let fifth = RebloomCandidate::new("s", 0.8, 0.2);
        assert_eq!(fifth.generation, 1);
        let newcomer = RebloomCandidate::new("t", 0.8, 0.2);
        let fifth_score = q.compute_priority_at(&fifth, T0 + 10);
        let newcomer_score = q.compute_priority_at(&newcomer, T0 + 10);
        assert!((fifth_score - newcomer_score * (-0.6f64).exp()).abs() < 1e-12);
        let tag = q.try_push_at(fifth, T0 + 10).expect("push");
        assert!(tag.starts_with("rebloom-s-g5-"));
        assert_eq!(q.preview_at(1, T0 + 10)[0].generation, 5);
        assert_eq!(q.candidate("s", 0.8, 0.2).generation, 6);
    }

    #[test]
    fn clones_share_one_queue() {
        let q = queue();
        let producer = q.clone();
        producer.push_at(RebloomCandidate::new("s", 0.8, 0.2), T0);
        assert_eq!(q.preview_at(5, T0).len(), 1);
    }
}
