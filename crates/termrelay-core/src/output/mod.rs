pub mod aggregator;
pub mod chunker;
pub mod router;
pub mod source;
pub mod stripper;

pub use aggregator::DebouncedAggregator;
pub use chunker::AnsiSafeChunker;
pub use router::{OutputRouter, RouterState};
pub use source::{FileTailer, OutputSource, PtyReader};
