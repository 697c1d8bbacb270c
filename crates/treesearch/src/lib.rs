//! Incremental filesystem index with a search-as-you-type query engine.
//!
//! - Node trees per search area, collected in parallel and kept current by
//!   filesystem watchers
//! - A small query language (`/and`, `/re`, `/p.size /m.ge 4K`, `/since -5day`)
//!   parsed into typed search keys
//! - A single command worker that serializes collects, searches and mutations

pub mod area;
pub mod cancel;
pub mod command;
pub mod config;
pub mod engine;
pub mod error;
pub mod filter;
pub mod index;
pub mod normalize;
pub mod query;
pub mod tree;
pub mod watcher;

pub use area::SearchArea;
pub use cancel::CancellationToken;
pub use command::{CommandFault, CommandHandle, CommandKind, CommandOutcome, EngineState, MutateKind};
pub use config::EngineConfig;
pub use engine::{Engine, LiveResults};
pub use error::{IndexError, ParseError, Result};
pub use filter::{CompiledQuery, FilterEngine, Property, SearchItem};
pub use index::{IndexChange, IndexCoordinator};
pub use query::{Conjunction, OperatorKind, QueryParser, SearchKey, SearchValue};
pub use tree::{NodeEntry, NodeFlags, NodeId};
