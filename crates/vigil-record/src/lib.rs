pub mod capture;
pub mod error;
pub mod paths;
pub mod session;
pub mod snapshot;

pub use capture::{CaptureLauncher, CaptureOutcome, CaptureProcess, FfmpegLauncher};
pub use error::{RecordError, Result};
pub use paths::{ArtifactPaths, OutputLayout};
pub use session::{RecordingSession, SessionManager, SessionStatus};
pub use snapshot::{HttpSnapshotFetcher, SnapshotFetcher};
