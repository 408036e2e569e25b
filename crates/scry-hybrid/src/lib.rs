//! Dense embedding interface (C3) and the hybrid sparse+dense index (C4)
//! built on top of it.

pub mod circuit_embedder;
pub mod embedder;
pub mod hashing_embedder;
pub mod index;
pub mod on_disk;

pub use circuit_embedder::CircuitBreakerEmbedder;
pub use embedder::{Embedder, cosine_similarity};
pub use hashing_embedder::HashingEmbedder;
pub use index::{HybridIndex, HybridIndexError, SearchHit, SearchWeights};
pub use on_disk::HybridMeta;
