//! # arbor
//!
//! Command-line front end for `arbor-core`: replays scenario files against a
//! tree, validates them, and dumps or inspects canonical exports.

pub mod cli;
pub mod scenario;
