//! Evolutionary operators: mutation strategies and fitness inheritance.
//!
//! - **Mutation**: which type a mutant daughter belongs to, and the rate and
//!   mutation probability she starts with ([`MutationHandler`]).
//! - **Inheritance**: how a daughter's birth rate is drawn from her mother's
//!   ([`FitnessModel`]).

pub mod inheritance;
pub mod mutation;

pub use inheritance::FitnessModel;
pub use mutation::{MutationHandler, Mutant};
