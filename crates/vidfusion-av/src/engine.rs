//! The external processing engine: ffmpeg for transformations, ffprobe for
//! measurements.

use crate::invoker::{
    parse_dimensions, parse_scalar, tool_name, CommandInvoker, Invoker, ToolOutput,
};
use crate::{Encoder, Error, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

/// Default frame rate assembled clips are normalized to.
pub const DEFAULT_FRAME_RATE: u32 = 30;

/// Engine settings, passed explicitly to every [`Engine`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    /// ffmpeg executable.
    pub ffmpeg: PathBuf,
    /// ffprobe executable.
    pub ffprobe: PathBuf,
    /// Encoder for steps that re-encode video.
    pub encoder: Encoder,
    /// Directory intermediates are allocated in.
    pub temp_dir: PathBuf,
    /// Frame rate used when normalizing clips for concatenation.
    pub frame_rate: u32,
    /// Kill an invocation after this many seconds.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub timeout_secs: Option<u64>,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            ffmpeg: PathBuf::from("ffmpeg"),
            ffprobe: PathBuf::from("ffprobe"),
            encoder: Encoder::default(),
            temp_dir: std::env::temp_dir(),
            frame_rate: DEFAULT_FRAME_RATE,
            timeout_secs: None,
        }
    }
}

impl EngineConfig {
    /// Per-invocation deadline, if configured.
    pub fn timeout(&self) -> Option<Duration> {
        self.timeout_secs.map(Duration::from_secs)
    }
}

/// Handle to the external engine.
///
/// Cheap to clone; clones share the same [`Invoker`], so sessions running on
/// different threads can use one engine.
#[derive(Clone)]
pub struct Engine {
    config: EngineConfig,
    invoker: Arc<dyn Invoker>,
}

impl std::fmt::Debug for Engine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Engine")
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}

impl Engine {
    /// Create an engine that runs real processes.
    pub fn new(config: EngineConfig) -> Self {
        let invoker = CommandInvoker::new().with_timeout(config.timeout());
        Self::with_invoker(config, Arc::new(invoker))
    }

    /// Create an engine over a custom invoker.
    pub fn with_invoker(config: EngineConfig, invoker: Arc<dyn Invoker>) -> Self {
        Self { config, invoker }
    }

    /// Engine settings.
    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    /// Selected video encoder.
    pub fn encoder(&self) -> Encoder {
        self.config.encoder
    }

    /// Apply the invocation policy: overwrite flag, plus decode acceleration
    /// when a hardware encoder is selected.
    pub fn augment(&self, args: Vec<String>) -> Vec<String> {
        let decode = self.config.encoder.decode_args();
        let mut full = Vec::with_capacity(decode.len() + 1 + args.len());
        full.extend(decode.iter().map(|s| s.to_string()));
        full.push("-y".to_string());
        full.extend(args);
        full
    }

    /// Run ffmpeg with `args` after augmentation.
    pub fn run(&self, args: Vec<String>) -> Result<ToolOutput> {
        let args = self.augment(args);
        self.invoke(&self.config.ffmpeg, &args)
    }

    /// Invoke `program` and classify its exit status.
    ///
    /// A non-zero exit becomes [`Error::Invocation`] carrying the combined
    /// output verbatim.
    pub fn invoke(&self, program: &Path, args: &[String]) -> Result<ToolOutput> {
        let tool = tool_name(program);
        tracing::debug!(tool = %tool, ?args, "Running command");

        let output = self.invoker.invoke(program, args)?;

        if !output.success() {
            tracing::warn!(tool = %tool, status = %output.status_label(), "Command failed");
            return Err(Error::invocation(
                tool,
                output.status_label(),
                output.combined(),
            ));
        }

        Ok(output)
    }

    /// Invoke `program` and parse a single number from its stdout.
    pub fn invoke_and_parse_scalar(&self, program: &Path, args: &[String]) -> Result<f64> {
        let output = self.invoke(program, args)?;
        parse_scalar(&tool_name(program), &output.stdout)
    }

    /// Invoke `program` and parse a single `WxH` token from its stdout.
    pub fn invoke_and_parse_dimensions(
        &self,
        program: &Path,
        args: &[String],
    ) -> Result<(u32, u32)> {
        let output = self.invoke(program, args)?;
        parse_dimensions(&tool_name(program), &output.stdout)
    }

    /// Container duration of a media file in seconds.
    ///
    /// Works for audio-only files as well as video.
    pub fn probe_duration(&self, path: &Path) -> Result<f64> {
        let args = vec![
            "-i".to_string(),
            path.display().to_string(),
            "-show_entries".to_string(),
            "format=duration".to_string(),
            "-v".to_string(),
            "quiet".to_string(),
            "-of".to_string(),
            "csv=p=0".to_string(),
        ];
        self.invoke_and_parse_scalar(&self.config.ffprobe, &args)
    }

    /// Width and height of the first video stream.
    pub fn probe_dimensions(&self, path: &Path) -> Result<(u32, u32)> {
        let args = vec![
            "-v".to_string(),
            "error".to_string(),
            "-select_streams".to_string(),
            "v:0".to_string(),
            "-show_entries".to_string(),
            "stream=width,height".to_string(),
            "-of".to_string(),
            "csv=s=x:p=0".to_string(),
            path.display().to_string(),
        ];
        self.invoke_and_parse_dimensions(&self.config.ffprobe, &args)
    }
}
