//! BriefSynthesizer (spec §4.8): composes the final [`crate::domain::Brief`]
//! from every upstream component's staged output.

pub mod synthesizer;
pub mod timeline;
pub mod trend;

pub use synthesizer::{BriefSynthesizer, SynthesisInputs};
