//! Trainer for restricted Boltzmann machines on top of the `costs` crate.
//!
//! Loads a data matrix (or generates a synthetic one), trains an RBM with
//! CD, PCD, NCE, SM or SMD, and writes burn checkpoints. Also hosts the
//! diagonal-normal KL optimization check.

pub mod config;
pub mod data;
pub mod metrics;
pub mod pipeline;
