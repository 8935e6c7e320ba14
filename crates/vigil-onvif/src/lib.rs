pub mod backoff;
pub mod client;
pub mod error;
pub mod stream;

pub use backoff::Backoff;
pub use client::{DeviceInformation, OnvifClient, PullResponse, RawNotification, Subscription};
pub use error::{OnvifError, Result};
pub use stream::{OnvifEventStream, StreamOptions};
