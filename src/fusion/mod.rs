//! Score fusion and final ranking
//!
//! Normalizes each retriever's raw scores onto [0, 1], merges candidates by
//! document id and orders the merged list by fused score.

pub mod normalize;
pub mod ranker;

pub use normalize::min_max;
pub use ranker::{
    result_order, Degradation, FusedResults, FusionStrategy, RankedResult, ScoreFusion,
};
