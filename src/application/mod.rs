pub mod features;
pub mod fetcher;
pub mod pipeline;
pub mod projector;
pub mod scorer;
pub mod selector;
