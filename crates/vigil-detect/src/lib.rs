pub mod machine;

pub use machine::{DetectionMachine, DetectionPhase, SessionCommand};
