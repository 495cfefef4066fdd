//! Inspectcam: camera capture engine for inspection photos.
//!
//! Negotiates a camera stream, waits for it to settle, and turns a single
//! frame into a cropped, rotated, watermarked JPEG with provenance metadata.

pub mod capture;
pub mod error;
pub mod frame;
pub mod options;
pub mod processing;
pub mod upload;

pub use capture::{DeviceManager, SessionState, StreamSession, TrackCapabilityController, TrackControlsSupport};
pub use error::{classify, CaptureError, ErrorCode, PlatformError};
pub use options::{
    AspectPolicy, Dimension, FacingMode, FlashMode, OrientationPolicy, SessionOptions, StabilizationOptions,
};
pub use processing::{process_frame, CaptureMeta, CaptureResult, CapturedFile, Rotation};
pub use upload::{DirectoryUploader, UploadError, UploadReceipt, Uploader};
