//! Scoring service client.

pub mod client;

pub use client::{Score, ScoreClient, ScoreError, ScoreResponse};
