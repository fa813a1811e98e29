pub mod openai_batch;
pub mod scoring_service;

pub use openai_batch::{OpenAiBatchClient, OpenAiSettings};
pub use scoring_service::{
    BatchProgress, JobHandle, RemoteBatch, RemoteStatus, ScoringService, ScoringServiceError,
};
