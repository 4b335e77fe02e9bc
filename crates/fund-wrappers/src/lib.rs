//! Contract bindings for the fund system and loading of the compiled
//! artifacts needed to deploy it.

mod artifacts;
pub mod wrappers;

pub use artifacts::{Artifact, ArtifactStore};
