//! Candidate retrieval
//!
//! Two independent paths produce scored candidates for one query:
//! - Lexical: BM25 keyword match
//! - Vector: kNN over document embeddings
//!
//! Both sit behind traits so the pipeline can run against any backend.

pub mod lexical;
pub mod retry;
pub mod types;
pub mod vector;

pub use lexical::{EsLexicalRetriever, LexicalRetriever};
pub use retry::RetryManager;
pub use types::{candidate_order, rank_candidates, Candidate, RetrievalMethod};
pub use vector::{check_dimension, EsVectorRetriever, VectorRetriever};
