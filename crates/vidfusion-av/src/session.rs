//! Fluent transformation sessions.

use crate::registry::{ArtifactHandle, ArtifactRegistry, SessionId};
use crate::step::{
    concat_list, join_args, OverlayOptions, SubtitleStyle, TransformStep, ARTIFACT_EXTENSION,
};
use crate::{Engine, Error, Result};
use std::fs::File;
use std::path::{Path, PathBuf};

/// Lifecycle state of a [`Session`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    Open,
    /// Finalized or cleaned up; intermediates are gone.
    Closed,
}

/// A chain of transformations over one evolving current artifact.
///
/// Every step reads the current artifact, writes a fresh intermediate and
/// makes that the new current artifact. Intermediates live until
/// [`Session::finalize`] or [`Session::cleanup`]; dropping a session leaves
/// them on disk.
///
/// # Example
///
/// ```no_run
/// use vidfusion_av::{Engine, EngineConfig, Session};
///
/// let engine = Engine::new(EngineConfig::default());
/// let mut session = Session::new(engine, "/media/input.mp4");
/// session.trim(0.0, 30.0)?.flip()?.speed_change(1.5)?;
/// session.finalize("/media/out/result.mp4")?;
/// # Ok::<(), vidfusion_av::Error>(())
/// ```
#[derive(Debug)]
pub struct Session {
    engine: Engine,
    registry: ArtifactRegistry,
    seed: Option<PathBuf>,
    current: Option<PathBuf>,
    state: SessionState,
}

impl Session {
    /// Start a session on `seed`. The seed stays owned by the caller and is
    /// never deleted.
    ///
    /// A borrowed seed is not registered: it never appears in
    /// [`intermediates`](Self::intermediates) and survives both
    /// [`finalize`](Self::finalize) and [`cleanup`](Self::cleanup). After the
    /// first step the previous artifacts listed there are only the ones this
    /// session produced. Use [`Session::adopt`] to hand the seed over.
    pub fn new(engine: Engine, seed: impl Into<PathBuf>) -> Self {
        Self::with_seed(engine, Some(seed.into()))
    }

    /// Start a session that takes ownership of `seed`; it is disposed of
    /// together with the intermediates.
    pub fn adopt(engine: Engine, seed: impl Into<PathBuf>) -> Self {
        let seed = seed.into();
        let mut session = Self::with_seed(engine, Some(seed.clone()));
        session.registry.register(seed);
        session
    }

    /// Start a session with no current artifact, to be produced by
    /// [`Session::assemble`] or [`Session::concatenate`].
    pub fn empty(engine: Engine) -> Self {
        Self::with_seed(engine, None)
    }

    fn with_seed(engine: Engine, seed: Option<PathBuf>) -> Self {
        let id = SessionId::generate();
        let registry = ArtifactRegistry::new(engine.config().temp_dir.clone(), id);
        tracing::debug!(session = %registry.session(), seed = ?seed, "Session created");

        Self {
            engine,
            registry,
            current: seed.clone(),
            seed,
            state: SessionState::Open,
        }
    }

    /// Session token namespacing every intermediate.
    pub fn id(&self) -> &SessionId {
        self.registry.session()
    }

    /// Engine this session runs on.
    pub fn engine(&self) -> &Engine {
        &self.engine
    }

    /// The most recently produced artifact.
    pub fn current(&self) -> Option<&Path> {
        self.current.as_deref()
    }

    /// The artifact the session started from.
    pub fn seed(&self) -> Option<&Path> {
        self.seed.as_deref()
    }

    /// Every artifact the session owns, in creation order.
    pub fn intermediates(&self) -> &[ArtifactHandle] {
        self.registry.handles()
    }

    pub fn state(&self) -> SessionState {
        self.state
    }

    pub fn is_open(&self) -> bool {
        self.state == SessionState::Open
    }

    /// Apply one step to the current artifact.
    ///
    /// On failure the current artifact is left unchanged; the handle reserved
    /// for the failed output is still disposed of with the session.
    pub fn apply(&mut self, step: &TransformStep) -> Result<&mut Self> {
        self.ensure_open()?;

        let output = match step {
            TransformStep::Concatenate {
                clips,
                width,
                height,
            } => {
                step.validate()?;
                self.concatenate_clips(clips, *width, *height)?
            }
            _ => {
                let input = self.current.clone().ok_or(Error::NoCurrentArtifact)?;
                self.transform(&input, step)?
            }
        };

        self.current = Some(output);
        Ok(self)
    }

    pub fn trim(&mut self, start: f64, end: f64) -> Result<&mut Self> {
        self.apply(&TransformStep::Trim { start, end })
    }

    pub fn resize(&mut self, width: u32, height: u32) -> Result<&mut Self> {
        self.apply(&TransformStep::Resize { width, height })
    }

    /// Scale down into `width`x`height` keeping aspect ratio, at the engine's
    /// normalization frame rate.
    pub fn fit(&mut self, width: u32, height: u32) -> Result<&mut Self> {
        let frame_rate = self.engine.config().frame_rate;
        self.apply(&TransformStep::Fit {
            width,
            height,
            frame_rate,
        })
    }

    pub fn flip(&mut self) -> Result<&mut Self> {
        self.apply(&TransformStep::Flip)
    }

    /// Speed up by `factor`, then trim so the container duration matches.
    pub fn speed_change(&mut self, factor: f64) -> Result<&mut Self> {
        self.apply(&TransformStep::SpeedChange { factor })
    }

    pub fn scale_up(&mut self, factor: f64) -> Result<&mut Self> {
        self.apply(&TransformStep::ScaleUp { factor })
    }

    pub fn mix_audio(&mut self, track: impl Into<PathBuf>, volume: f64) -> Result<&mut Self> {
        self.apply(&TransformStep::MixAudio {
            track: track.into(),
            volume,
        })
    }

    pub fn overlay(&mut self, options: OverlayOptions) -> Result<&mut Self> {
        self.apply(&TransformStep::Overlay(options))
    }

    pub fn silence(&mut self) -> Result<&mut Self> {
        self.apply(&TransformStep::Silence)
    }

    pub fn inject_silent_track(&mut self) -> Result<&mut Self> {
        self.apply(&TransformStep::SilentTrackInject)
    }

    pub fn subtitle(
        &mut self,
        file: impl Into<PathBuf>,
        style: SubtitleStyle,
    ) -> Result<&mut Self> {
        self.apply(&TransformStep::Subtitle {
            file: file.into(),
            style,
        })
    }

    /// Normalize `clips` to `width`x`height` and join them into the new
    /// current artifact.
    pub fn concatenate(
        &mut self,
        clips: Vec<PathBuf>,
        width: u32,
        height: u32,
    ) -> Result<&mut Self> {
        self.apply(&TransformStep::Concatenate {
            clips,
            width,
            height,
        })
    }

    /// Duration of the current artifact in seconds.
    pub fn duration(&self) -> Result<f64> {
        let current = self.current.as_deref().ok_or(Error::NoCurrentArtifact)?;
        self.engine.probe_duration(current)
    }

    /// Dimensions of the current artifact.
    pub fn dimensions(&self) -> Result<(u32, u32)> {
        let current = self.current.as_deref().ok_or(Error::NoCurrentArtifact)?;
        self.engine.probe_dimensions(current)
    }

    /// Copy the current artifact to `destination` and dispose of every
    /// intermediate.
    ///
    /// The copy is synced to disk before disposal starts. If the copy fails
    /// the intermediates are left in place and the session stays open.
    pub fn finalize(&mut self, destination: impl AsRef<Path>) -> Result<PathBuf> {
        self.ensure_open()?;
        let destination = destination.as_ref();
        let current = self.current.clone().ok_or(Error::NoCurrentArtifact)?;

        if same_file(&current, destination) {
            return Err(Error::InvalidInput(format!(
                "destination {} is the current artifact",
                destination.display()
            )));
        }

        if let Some(parent) = destination.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent)
                .map_err(|e| Error::resource_at("failed to create output directory", parent, e))?;
        }

        copy_synced(&current, destination)?;
        tracing::info!(
            session = %self.id(),
            output = %destination.display(),
            "Session finalized"
        );

        self.close()?;
        Ok(destination.to_path_buf())
    }

    /// Dispose of every intermediate without producing output.
    ///
    /// Safe to call more than once; later calls remove nothing.
    pub fn cleanup(&mut self) -> Result<usize> {
        self.close()
    }

    fn close(&mut self) -> Result<usize> {
        self.state = SessionState::Closed;
        let removed = self.registry.dispose_all()?;
        tracing::debug!(session = %self.id(), removed, "Disposed intermediates");
        Ok(removed)
    }

    pub(crate) fn set_current(&mut self, artifact: ArtifactHandle) {
        self.current = Some(artifact);
    }

    pub(crate) fn ensure_open(&self) -> Result<()> {
        match self.state {
            SessionState::Open => Ok(()),
            SessionState::Closed => Err(Error::SessionClosed),
        }
    }

    /// Run `step` on `input` without touching the current artifact.
    ///
    /// `SpeedChange` is a composite: the timestamp filter leaves the
    /// container duration alone, so the result is trimmed to
    /// `duration / factor` afterwards.
    pub(crate) fn transform(
        &mut self,
        input: &Path,
        step: &TransformStep,
    ) -> Result<ArtifactHandle> {
        step.validate()?;
        let output = self.run_single(input, step)?;

        if let TransformStep::SpeedChange { factor } = step {
            let duration = self.engine.probe_duration(&output)?;
            let trim = TransformStep::Trim {
                start: 0.0,
                end: duration / factor,
            };
            return self.run_single(&output, &trim);
        }

        Ok(output)
    }

    pub(crate) fn run_single(
        &mut self,
        input: &Path,
        step: &TransformStep,
    ) -> Result<ArtifactHandle> {
        let output = self.registry.allocate(ARTIFACT_EXTENSION)?;
        let args = step.args(input, &output, self.engine.encoder())?;

        tracing::info!(
            session = %self.id(),
            step = step.name(),
            input = %input.display(),
            "Applying step"
        );
        self.engine.run(args)?;

        Ok(output)
    }

    fn concatenate_clips(
        &mut self,
        clips: &[PathBuf],
        width: u32,
        height: u32,
    ) -> Result<ArtifactHandle> {
        let fit = TransformStep::Fit {
            width,
            height,
            frame_rate: self.engine.config().frame_rate,
        };

        let mut normalized = Vec::with_capacity(clips.len());
        for clip in clips {
            normalized.push(self.run_single(clip, &fit)?);
        }

        self.join(&normalized)
    }

    /// Join already-normalized clips with the concat demuxer.
    pub(crate) fn join(&mut self, clips: &[PathBuf]) -> Result<ArtifactHandle> {
        let list = self.registry.allocate("txt")?;
        std::fs::write(&list, concat_list(clips))
            .map_err(|e| Error::resource_at("failed to write concat list", &list, e))?;

        let output = self.registry.allocate(ARTIFACT_EXTENSION)?;
        tracing::info!(session = %self.id(), clips = clips.len(), "Joining clips");
        self.engine
            .run(join_args(&list, &output, self.engine.encoder()))?;

        Ok(output)
    }
}

fn same_file(a: &Path, b: &Path) -> bool {
    if a == b {
        return true;
    }
    match (std::fs::canonicalize(a), std::fs::canonicalize(b)) {
        (Ok(a), Ok(b)) => a == b,
        _ => false,
    }
}

/// Byte copy with an explicit sync; works across devices, unlike rename.
fn copy_synced(source: &Path, destination: &Path) -> Result<()> {
    let mut reader = File::open(source)
        .map_err(|e| Error::resource_at("failed to open artifact", source, e))?;
    let mut writer = File::create(destination)
        .map_err(|e| Error::resource_at("failed to create", destination, e))?;

    std::io::copy(&mut reader, &mut writer)
        .map_err(|e| Error::resource_at("failed to copy to", destination, e))?;
    writer
        .sync_all()
        .map_err(|e| Error::resource_at("failed to sync", destination, e))?;

    Ok(())
}
