//! Model provider seams and their HTTP implementations

pub mod document_parser;
pub mod embedder;
pub mod llm_worker;
pub mod provider;

pub use document_parser::HttpDocumentParser;
pub use embedder::Embedder;
pub use llm_worker::LlmWorker;
pub use provider::{
    AttachmentRef, AttachmentSource, ChatModel, ChatRequest, DocumentParser, EmbeddingProvider,
    ModerationProvider, ModerationVerdict,
};
