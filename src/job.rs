//! Declarative job files and their runner.
//!
//! A job describes one session: an optional input, an optional clip assembly,
//! a list of steps and the output path.
//!
//! ```toml
//! output = "out/short.mp4"
//!
//! [assembly]
//! target_duration = 15.0
//! width = 1080
//! height = 1920
//!
//! [[assembly.sources]]
//! path = "clips/a.mp4"
//!
//! [[steps]]
//! op = "silence"
//! ```

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use vidfusion_av::{ClipPlan, Engine, Session, TransformStep};

/// Progress callback type
pub type ProgressCallback = Box<dyn Fn(f32, &str) + Send + Sync>;

#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct Job {
    /// Seed artifact. Required unless the job assembles clips.
    #[serde(default)]
    pub input: Option<PathBuf>,

    pub output: PathBuf,

    /// Delete the input together with the intermediates on success.
    #[serde(default)]
    pub adopt_input: bool,

    #[serde(default)]
    pub assembly: Option<ClipPlan>,

    /// Applied in order, after assembly.
    #[serde(default)]
    pub steps: Vec<TransformStep>,
}

impl Job {
    /// Load a job file. Relative paths inside it are resolved against the
    /// file's directory.
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read job file: {:?}", path))?;

        let mut job: Job = toml::from_str(&content)
            .with_context(|| format!("Failed to parse job file: {:?}", path))?;

        if let Some(base) = path.parent() {
            job.resolve_paths(base);
        }
        job.validate()?;

        Ok(job)
    }

    pub fn validate(&self) -> Result<()> {
        match (&self.input, &self.assembly) {
            (None, None) => anyhow::bail!("Job needs an input or an [assembly] section"),
            (Some(_), Some(_)) => {
                anyhow::bail!("Job cannot have both an input and an [assembly] section")
            }
            _ => {}
        }

        if self.adopt_input && self.input.is_none() {
            anyhow::bail!("adopt_input is set but the job has no input");
        }

        if let Some(plan) = &self.assembly {
            plan.validate().context("Invalid [assembly] section")?;
        }

        for (i, step) in self.steps.iter().enumerate() {
            step.validate()
                .with_context(|| format!("Invalid step {} ({})", i + 1, step.name()))?;
        }

        Ok(())
    }

    fn resolve_paths(&mut self, base: &Path) {
        let resolve = |path: &mut PathBuf| {
            if path.is_relative() {
                *path = base.join(&*path);
            }
        };

        if let Some(input) = self.input.as_mut() {
            resolve(input);
        }
        resolve(&mut self.output);

        if let Some(plan) = self.assembly.as_mut() {
            for source in &mut plan.sources {
                resolve(&mut source.path);
            }
        }

        for step in &mut self.steps {
            match step {
                TransformStep::MixAudio { track, .. } => resolve(track),
                TransformStep::Overlay(opts) => resolve(&mut opts.image),
                TransformStep::Subtitle { file, .. } => resolve(file),
                TransformStep::Concatenate { clips, .. } => {
                    for clip in clips {
                        resolve(clip);
                    }
                }
                _ => {}
            }
        }
    }

    fn session(&self, engine: Engine) -> Session {
        match &self.input {
            Some(input) if self.adopt_input => Session::adopt(engine, input),
            Some(input) => Session::new(engine, input),
            None => Session::empty(engine),
        }
    }
}

/// Execute a job through one session
pub struct JobRunner {
    engine: Engine,
    dry_run: bool,
    progress_callback: Option<ProgressCallback>,
}

impl JobRunner {
    pub fn new(engine: Engine, dry_run: bool) -> Self {
        Self {
            engine,
            dry_run,
            progress_callback: None,
        }
    }

    pub fn with_progress_callback(mut self, callback: ProgressCallback) -> Self {
        self.progress_callback = Some(callback);
        self
    }

    fn report_progress(&self, progress: f32, step: &str) {
        if let Some(ref cb) = self.progress_callback {
            cb(progress, step);
        }
        tracing::info!("[{:.0}%] {}", progress, step);
    }

    /// Run `job` and return the output path.
    ///
    /// When assembly or a step fails, the session's intermediates are
    /// removed unless the job adopted its input. When writing the output
    /// fails, every intermediate is kept so the last artifact can be
    /// inspected or recovered.
    pub fn run(&self, job: &Job) -> Result<PathBuf> {
        job.validate()?;

        let total = job.steps.len() + usize::from(job.assembly.is_some());
        if total == 0 {
            tracing::info!("Job has no steps, output is a copy of the input");
        }

        let mut session = job.session(self.engine.clone());
        if let Err(e) = self.execute(job, &mut session, total) {
            abandon(&mut session, job.adopt_input);
            return Err(e);
        }

        self.report_progress(100.0, "Finalizing");

        if self.dry_run {
            tracing::info!("[DRY RUN] Would finalize to {:?}", job.output);
            return Ok(job.output.clone());
        }

        match session.finalize(&job.output) {
            Ok(output) => Ok(output),
            Err(e) => {
                tracing::warn!(
                    "Keeping {} intermediates of session {} after failed finalize",
                    session.intermediates().len(),
                    session.id()
                );
                Err(e).with_context(|| format!("Failed to write output: {:?}", job.output))
            }
        }
    }

    /// Assemble and apply every step, leaving the result as the session's
    /// current artifact.
    fn execute(&self, job: &Job, session: &mut Session, total: usize) -> Result<()> {
        let mut done = 0;
        let progress = |done: usize| {
            if total == 0 {
                100.0
            } else {
                (done as f32 / total as f32) * 100.0
            }
        };

        if let Some(plan) = &job.assembly {
            self.report_progress(
                progress(done),
                &format!("Assembling {} clips", plan.sources.len()),
            );

            if self.dry_run {
                tracing::info!(
                    "[DRY RUN] Would assemble {:.2}s at {}x{} from {} sources",
                    plan.target_duration,
                    plan.width,
                    plan.height,
                    plan.sources.len()
                );
            } else {
                session
                    .assemble(plan)
                    .context("Failed to assemble clips")?;
            }
            done += 1;
        }

        for step in &job.steps {
            self.report_progress(progress(done), &format!("Starting: {}", step.name()));

            if self.dry_run {
                tracing::info!("[DRY RUN] Would execute: {:?}", step);
            } else {
                session
                    .apply(step)
                    .with_context(|| format!("Failed to execute step: {}", step.name()))?;
            }
            done += 1;
        }

        Ok(())
    }
}

fn abandon(session: &mut Session, keep: bool) {
    if !session.is_open() {
        return;
    }

    if keep {
        tracing::warn!(
            "Keeping {} intermediates of session {} for inspection",
            session.intermediates().len(),
            session.id()
        );
        return;
    }

    if let Err(e) = session.cleanup() {
        tracing::warn!("Failed to clean up intermediates: {:#}", anyhow::Error::new(e));
    }
}
