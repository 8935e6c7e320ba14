pub mod clock;
pub mod event;
pub mod source;

pub use clock::{Clock, ManualClock, SystemClock};
pub use event::DetectionEvent;
pub use source::EventSource;
