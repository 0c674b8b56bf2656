//! Arbor Harness: reference worlds and evaluators for driving `arbor-search`.
//!
//! Worlds are small, fully deterministic graphs whose shape is known in
//! advance, so tests and benchmarks can assert exact counts. Evaluators
//! cover each evaluator behavior the engine distinguishes (labels, prunes,
//! failures, panics, slow or cooperative evaluation, self-reporting).
//! The runner drives a search to the end and summarizes it.
//!
//! The harness does NOT implement search logic; it only feeds the engine.

#![forbid(unsafe_code)]
#![deny(clippy::all)]
#![warn(clippy::pedantic)]

pub mod evaluators;
pub mod runner;
pub mod worlds;
