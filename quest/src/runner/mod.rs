//! Sandbox runner collaborator.

pub mod client;

pub use client::{DryRunner, HttpRunner, Runner, RunnerBackend};
