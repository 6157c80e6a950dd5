// Score fusion: merge lexical and vector candidates into one ranking
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::collections::{BTreeSet, HashMap};

use crate::config::FusionConfig;
use crate::errors::{QueryError, Result};
use crate::fusion::normalize::min_max;
use crate::retrieval::{rank_candidates, Candidate, RetrievalMethod};

/// How per-method signals are combined
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FusionStrategy {
    /// Weighted sum of min-max normalized scores
    #[default]
    WeightedSum,
    /// Weighted reciprocal rank, `w / (rrf_k + rank)`
    ReciprocalRank,
}

/// One document in the final ranking
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RankedResult {
    pub id: String,
    /// Fused score, comparable across documents of one response
    pub score: f32,
    pub methods: BTreeSet<RetrievalMethod>,
    /// Normalized lexical contribution before weighting
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub lexical_score: Option<f32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub vector_score: Option<f32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub snippet: Option<String>,
    #[serde(default)]
    pub metadata: serde_json::Map<String, serde_json::Value>,
}

/// Which source is missing from a degraded ranking, and why
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Degradation {
    pub missing: RetrievalMethod,
    pub reason: String,
}

/// Fusion output
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FusedResults {
    pub results: Vec<RankedResult>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub degraded: Option<Degradation>,
}

impl FusedResults {
    pub fn is_degraded(&self) -> bool {
        self.degraded.is_some()
    }
}

/// Descending fused score, then ascending document id
pub fn result_order(a: &RankedResult, b: &RankedResult) -> Ordering {
    b.score.total_cmp(&a.score).then_with(|| a.id.cmp(&b.id))
}

/// Score fusion and final ranking
#[derive(Debug, Clone)]
pub struct ScoreFusion {
    config: FusionConfig,
}

impl Default for ScoreFusion {
    fn default() -> Self {
        Self::new(FusionConfig::default())
    }
}

impl ScoreFusion {
    pub fn new(config: FusionConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &FusionConfig {
        &self.config
    }

    /// Merge the outcome of both retrievers into at most `limit` results.
    ///
    /// One failed side yields a ranking from the other, flagged degraded.
    /// Both failed is `NoRetrievalAvailable`. Both empty is an empty ranking.
    pub fn fuse(
        &self,
        lexical: Result<Vec<Candidate>>,
        vector: Result<Vec<Candidate>>,
        limit: usize,
    ) -> Result<FusedResults> {
        let (lexical, vector, degraded) = match (lexical, vector) {
            (Ok(lexical), Ok(vector)) => (lexical, vector, None),
            (Err(e), Ok(vector)) => (
                Vec::new(),
                vector,
                Some(Degradation {
                    missing: RetrievalMethod::Lexical,
                    reason: e.to_string(),
                }),
            ),
            (Ok(lexical), Err(e)) => (
                lexical,
                Vec::new(),
                Some(Degradation {
                    missing: RetrievalMethod::Vector,
                    reason: e.to_string(),
                }),
            ),
            (Err(lexical_err), Err(vector_err)) => {
                return Err(QueryError::NoRetrievalAvailable(format!(
                    "lexical: {}; vector: {}",
                    lexical_err, vector_err
                )));
            }
        };

        let results = self.rank(lexical, vector, limit);
        Ok(FusedResults { results, degraded })
    }

    /// Fuse two successful candidate lists
    pub fn rank(
        &self,
        lexical: Vec<Candidate>,
        vector: Vec<Candidate>,
        limit: usize,
    ) -> Vec<RankedResult> {
        // one candidate per id per method, in retriever order
        let lexical = rank_candidates(lexical, usize::MAX);
        let vector = rank_candidates(vector, usize::MAX);

        let mut merged: HashMap<String, RankedResult> =
            HashMap::with_capacity(lexical.len() + vector.len());

        self.accumulate(&mut merged, lexical, RetrievalMethod::Lexical);
        self.accumulate(&mut merged, vector, RetrievalMethod::Vector);

        let mut results: Vec<RankedResult> = merged.into_values().collect();
        results.sort_by(result_order);
        results.truncate(limit);
        results
    }

    fn weight(&self, method: RetrievalMethod) -> f32 {
        match method {
            RetrievalMethod::Lexical => self.config.lexical_weight,
            RetrievalMethod::Vector => self.config.vector_weight,
        }
    }

    /// Per-candidate contribution before weighting
    fn signals(&self, candidates: &[Candidate]) -> Vec<f32> {
        match self.config.strategy {
            FusionStrategy::WeightedSum => {
                let raw: Vec<f32> = candidates.iter().map(|c| c.score).collect();
                min_max(&raw)
            }
            FusionStrategy::ReciprocalRank => (1..=candidates.len())
                .map(|rank| 1.0 / (self.config.rrf_k + rank as f32))
                .collect(),
        }
    }

    fn accumulate(
        &self,
        merged: &mut HashMap<String, RankedResult>,
        candidates: Vec<Candidate>,
        method: RetrievalMethod,
    ) {
        let signals = self.signals(&candidates);
        let weight = self.weight(method);

        for (candidate, signal) in candidates.into_iter().zip(signals) {
            let entry = merged
                .entry(candidate.id.clone())
                .or_insert_with(|| RankedResult {
                    id: candidate.id.clone(),
                    score: 0.0,
                    methods: BTreeSet::new(),
                    lexical_score: None,
                    vector_score: None,
                    snippet: None,
                    metadata: serde_json::Map::new(),
                });

            entry.score += weight * signal;
            entry.methods.insert(method);
            match method {
                RetrievalMethod::Lexical => entry.lexical_score = Some(signal),
                RetrievalMethod::Vector => entry.vector_score = Some(signal),
            }
            if entry.snippet.is_none() {
                entry.snippet = candidate.snippet;
            }
            for (key, value) in candidate.metadata {
                entry.metadata.entry(key).or_insert(value);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use quickcheck_macros::quickcheck;

    fn lexical(id: &str, score: f32) -> Candidate {
        Candidate::new(id, score, RetrievalMethod::Lexical)
    }

    fn vector(id: &str, score: f32) -> Candidate {
        Candidate::new(id, score, RetrievalMethod::Vector)
    }

    fn ids(results: &[RankedResult]) -> Vec<&str> {
        results.iter().map(|r| r.id.as_str()).collect()
    }

    #[test]
    fn test_worked_example() {
        let fusion = ScoreFusion::default();
        let fused = fusion
            .fuse(
                Ok(vec![lexical("A", 10.0), lexical("B", 5.0)]),
                Ok(vec![vector("B", 0.9), vector("C", 0.4)]),
                10,
            )
            .unwrap();

        assert!(!fused.is_degraded());
        assert_eq!(ids(&fused.results), vec!["A", "B", "C"]);
        let scores: Vec<f32> = fused.results.iter().map(|r| r.score).collect();
        assert_eq!(scores, vec![0.5, 0.5, 0.0]);

        let b = &fused.results[1];
        assert_eq!(b.lexical_score, Some(0.0));
        assert_eq!(b.vector_score, Some(1.0));
        assert_eq!(
            b.methods,
            BTreeSet::from([RetrievalMethod::Lexical, RetrievalMethod::Vector])
        );
    }

    #[test]
    fn test_lexical_failure_scales_vector_ranking() {
        let fusion = ScoreFusion::new(FusionConfig {
            lexical_weight: 0.3,
            vector_weight: 0.7,
            ..FusionConfig::default()
        });
        let fused = fusion
            .fuse(
                Err(QueryError::IndexUnavailable("connection refused".to_string())),
                Ok(vec![vector("x", 0.8), vector("y", 0.6), vector("z", 0.4)]),
                10,
            )
            .unwrap();

        let degraded = fused.degraded.as_ref().unwrap();
        assert_eq!(degraded.missing, RetrievalMethod::Lexical);
        assert!(degraded.reason.contains("connection refused"));

        assert_eq!(ids(&fused.results), vec!["x", "y", "z"]);
        let scores: Vec<f32> = fused.results.iter().map(|r| r.score).collect();
        let expected = [0.7, 0.35, 0.0];
        for (got, want) in scores.iter().zip(expected) {
            assert!((got - want).abs() < 1e-6, "{} != {}", got, want);
        }
    }

    #[test]
    fn test_vector_failure_is_degraded() {
        let fused = ScoreFusion::default()
            .fuse(
                Ok(vec![lexical("a", 2.0)]),
                Err(QueryError::Timeout { duration_ms: 2000 }),
                10,
            )
            .unwrap();
        assert_eq!(fused.degraded.unwrap().missing, RetrievalMethod::Vector);
        assert_eq!(fused.results[0].score, 0.5);
    }

    #[test]
    fn test_both_failed() {
        let err = ScoreFusion::default()
            .fuse(
                Err(QueryError::IndexUnavailable("down".to_string())),
                Err(QueryError::InferenceTimeout { duration_ms: 1000 }),
                10,
            )
            .unwrap_err();
        assert!(matches!(err, QueryError::NoRetrievalAvailable(_)));
    }

    #[test]
    fn test_both_empty_is_empty() {
        let fused = ScoreFusion::default().fuse(Ok(vec![]), Ok(vec![]), 10).unwrap();
        assert!(fused.results.is_empty());
        assert!(!fused.is_degraded());
    }

    #[test]
    fn test_truncates_to_limit() {
        let fused = ScoreFusion::default()
            .fuse(
                Ok(vec![lexical("a", 3.0), lexical("b", 2.0), lexical("c", 1.0)]),
                Ok(vec![]),
                2,
            )
            .unwrap();
        assert_eq!(ids(&fused.results), vec!["a", "b"]);
    }

    #[test]
    fn test_metadata_and_snippet_merge() {
        let mut lex = lexical("doc", 1.0).with_snippet("Lexical title");
        lex.metadata.insert("url".to_string(), "https://a".into());
        let mut vec_hit = vector("doc", 0.5).with_snippet("Vector title");
        vec_hit.metadata.insert("url".to_string(), "https://b".into());
        vec_hit.metadata.insert("topics".to_string(), serde_json::json!(["economy"]));

        let results = ScoreFusion::default().rank(vec![lex], vec![vec_hit], 10);
        assert_eq!(results.len(), 1);
        assert_eq!(results[0].snippet.as_deref(), Some("Lexical title"));
        assert_eq!(results[0].metadata["url"], "https://a");
        assert_eq!(results[0].metadata["topics"], serde_json::json!(["economy"]));
    }

    #[test]
    fn test_reciprocal_rank_strategy() {
        let fusion = ScoreFusion::new(FusionConfig {
            strategy: FusionStrategy::ReciprocalRank,
            rrf_k: 60.0,
            ..FusionConfig::default()
        });
        let results = fusion.rank(
            vec![lexical("A", 10.0), lexical("B", 5.0)],
            vec![vector("B", 0.9), vector("C", 0.4)],
            10,
        );

        assert_eq!(ids(&results), vec!["B", "A", "C"]);
        let expected_b = 0.5 / 62.0 + 0.5 / 61.0;
        assert!((results[0].score - expected_b).abs() < 1e-6);
    }

    #[test]
    fn test_strategy_serde() {
        let strategy: FusionStrategy = serde_json::from_str("\"reciprocal_rank\"").unwrap();
        assert_eq!(strategy, FusionStrategy::ReciprocalRank);
        assert_eq!(FusionStrategy::default(), FusionStrategy::WeightedSum);
    }

    fn candidates(raw: &[(u8, u16)], method: RetrievalMethod) -> Vec<Candidate> {
        raw.iter()
            .map(|&(id, score)| Candidate::new(format!("d{}", id % 16), score as f32, method))
            .collect()
    }

    #[quickcheck]
    fn prop_dual_source_outscores_each_weighted_contribution(
        lex: Vec<(u8, u16)>,
        vec_hits: Vec<(u8, u16)>,
    ) -> bool {
        let fusion = ScoreFusion::default();
        let config = fusion.config().clone();
        let results = fusion.rank(
            candidates(&lex, RetrievalMethod::Lexical),
            candidates(&vec_hits, RetrievalMethod::Vector),
            usize::MAX,
        );

        results.iter().all(|r| {
            let l = r.lexical_score.unwrap_or(0.0) * config.lexical_weight;
            let v = r.vector_score.unwrap_or(0.0) * config.vector_weight;
            r.score + 1e-6 >= l && r.score + 1e-6 >= v
        })
    }

    #[quickcheck]
    fn prop_sorted_and_deterministic(lex: Vec<(u8, u16)>, vec_hits: Vec<(u8, u16)>) -> bool {
        let fusion = ScoreFusion::default();
        let run = || {
            fusion.rank(
                candidates(&lex, RetrievalMethod::Lexical),
                candidates(&vec_hits, RetrievalMethod::Vector),
                8,
            )
        };
        let first = run();
        let sorted = first
            .windows(2)
            .all(|w| result_order(&w[0], &w[1]) != Ordering::Greater);
        sorted && first == run() && first.len() <= 8
    }
}
