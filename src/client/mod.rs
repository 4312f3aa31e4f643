//! Learner-session side of progress tracking: a local cache that absorbs
//! viewer updates and reconciles them with the progress API.

pub mod cache;
pub mod remote;
pub mod throttle;

pub use cache::{CacheConfig, LocalProgress, ProgressCache, ProgressKey, ProgressUpdate, WriteOutcome};
pub use remote::{ClientError, ClientResult, HttpProgressRemote, ProgressRemote};
pub use throttle::KeyedThrottle;
