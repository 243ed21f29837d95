//! Whole-graph tests against in-memory fixtures

pub mod sample;

mod transcode;
