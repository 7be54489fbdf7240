//! # Shibie Core
//!
//! Tensor-free half of the Shibie NER toolkit. Provides the canonical IOB
//! tag set, the entity decoder, entity-level precision/recall/F1 scoring,
//! the TSV dataset loader and the character-level sentence encoder.
//!
//! ## Quick Start
//!
//! ```rust
//! use shibie_core::{decode, EntityKind, EvalStats, Tag};
//!
//! let tokens = ["张", "三", "在", "北", "京"];
//! let tags = [
//!     Tag::Begin(EntityKind::Person),
//!     Tag::Inside(EntityKind::Person),
//!     Tag::Outside,
//!     Tag::Begin(EntityKind::Location),
//!     Tag::Inside(EntityKind::Location),
//! ];
//! let ids: Vec<usize> = tags.iter().map(Tag::index).collect();
//!
//! let entities = decode(&tokens, &ids);
//! assert_eq!(entities[&EntityKind::Person], vec!["张三".to_string()]);
//! assert_eq!(entities[&EntityKind::Location], vec!["北京".to_string()]);
//!
//! let mut stats = EvalStats::new();
//! stats.update(&entities, &entities);
//! assert!(stats.micro_f1() > 0.99);
//! ```
pub mod data;
pub mod decode;
pub mod encode;
pub mod error;
pub mod metrics;
pub mod tags;

// Re-export primary API
pub use data::{load_examples, parse_line, Example};
pub use decode::{decode, decode_spans, join_tokens, Entities, Span};
pub use encode::{EncodedExample, SentenceEncoder};
pub use error::{Result, ShibieError};
pub use metrics::{EntityCounts, EvalReport, EvalStats, KindScore, EPSILON};
pub use tags::{EntityKind, Tag};
