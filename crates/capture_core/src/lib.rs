//! Capture, playback and upload orchestration for walkthroughs.
//!
//! Device access sits behind [`CameraDevice`] and [`HapticFeedback`]; all
//! periodic work runs inside a [`ScheduledTask`] owned by whoever started it.

pub mod auto_capture;
pub mod camera;
pub mod capture;
pub mod finalize;
pub mod haptics;
pub mod navigation;
pub mod network;
pub mod playback;
pub mod ticker;
pub mod upload;

pub use auto_capture::{AutoCapture, DEFAULT_CAPTURE_CADENCE};
pub use camera::{build_camera, CameraDevice, CameraSettings, CapturedImage, SyntheticCamera};
pub use capture::{CaptureSessionManager, CaptureState};
pub use finalize::{device_info, finalize_session, SessionDetails};
pub use haptics::{HapticFeedback, LogHaptics, NoHaptics};
pub use navigation::{NavigationError, Navigator, Screen};
pub use network::{
    ConnectivityProbe, HttpProbe, ListenerHandle, NetworkStatusObserver, StaticProbe,
    DEFAULT_PROBE_TIMEOUT,
};
pub use playback::{PlaybackController, PlaybackSession, PlaybackSnapshot, PlaybackSpeed};
pub use ticker::ScheduledTask;
pub use upload::{Uploader, DEFAULT_UPLOAD_DELAY};
