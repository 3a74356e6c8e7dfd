//! Accessors, predicates and mutators shared by the state transition and fork choice.

pub mod accessors;
pub mod error;
pub mod misc;
pub mod mutators;
pub mod predicates;
pub mod signing;
pub mod verifier;
