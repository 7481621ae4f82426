//! # vidfusion-av
//!
//! Chained media transformations over ffmpeg, with duration-driven clip
//! assembly.
//!
//! This crate provides functionality for:
//! - Running ffmpeg/ffprobe through one [`Engine`] that applies the
//!   invocation policy (overwrite flag, hardware decode) uniformly
//! - Allocating and disposing of session-scoped intermediate files
//! - Fluent [`Session`]s that thread a current artifact through trim, resize,
//!   flip, speed, overlay, subtitle and audio steps
//! - Assembling a pool of clips into an artifact of an exact duration
//!
//! ## Example
//!
//! ```no_run
//! use vidfusion_av::{ClipPlan, ClipSource, ClipTransform, Engine, EngineConfig, Session};
//!
//! let engine = Engine::new(EngineConfig::default());
//! let plan = ClipPlan::new(15.0, 1080, 1920)
//!     .with_source(ClipSource::new("/clips/a.mp4"))
//!     .with_source(ClipSource::new("/clips/b.mp4").with_transform(ClipTransform::Flip));
//!
//! let mut session = Session::empty(engine);
//! session.assemble(&plan)?.silence()?;
//! let output = session.finalize("/renders/short.mp4")?;
//! println!("Wrote {}", output.display());
//! # Ok::<(), vidfusion_av::Error>(())
//! ```

pub mod assembly;
pub mod encoder;
pub mod engine;
mod error;
pub mod invoker;
pub mod media;
pub mod registry;
pub mod session;
pub mod step;
pub mod tools;

// Re-exports
pub use assembly::{select_clips, ClipPlan, ClipSource, ClipTransform, RepeatPolicy, Selection};
pub use encoder::Encoder;
pub use engine::{Engine, EngineConfig};
pub use error::{Error, Result};
pub use invoker::{CommandInvoker, Invoker, ToolOutput};
pub use media::pick_random_clips;
pub use registry::{ArtifactHandle, ArtifactRegistry, SessionId};
pub use session::{Session, SessionState};
pub use step::{OverlayOptions, SubtitleStyle, TransformStep, MIN_DURATION};
pub use tools::{check_tool, check_tools, require_tool, ToolInfo};
