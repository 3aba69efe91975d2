//! Text processing - chunking of ticket, attachment and knowledge content

pub mod chunker;

pub use chunker::TextChunker;
