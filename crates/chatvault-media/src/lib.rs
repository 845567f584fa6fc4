//! # chatvault-media
//!
//! Attachment handling for the archive: Ogg/Opus voice-note analysis, the
//! synthetic waveform, the per-chat media cache, the remote object-store
//! transport, and the pipeline and worker pool that move bytes on demand.

pub mod audio;
pub mod cache;
pub mod pipeline;
pub mod queue;
pub mod transport;
pub mod waveform;

mod error;

pub use audio::{analyze, AudioError, VoiceAnalysis};
pub use error::{MediaError, Result};
pub use pipeline::{FetchedMedia, MediaPipeline, OutboundMedia, UploadedMedia, VoiceNote};
pub use queue::{TransferHandle, TransferQueue};
pub use transport::{HttpTransport, MediaTransport};
