pub mod engine;
pub mod error;
pub mod grounding;
pub mod persist;
pub mod tf;
pub mod tokenizer;

pub use engine::{Document, SearchHit, VectorEngine, DEFAULT_LIMIT, MIN_SCORE};
pub use error::{Result, StoreError};
pub use persist::KnowledgeRecord;
