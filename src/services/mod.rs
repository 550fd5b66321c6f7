pub mod fetcher;
pub mod maintenance;
pub mod orchestrator;
pub mod streamer;
pub mod symbols;
