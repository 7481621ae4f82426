//! Duration-driven clip assembly.
//!
//! Given a pool of source clips, assembly pre-transforms them, measures them,
//! greedily selects clips in order until their cumulative duration reaches
//! the target, normalizes the selection to common dimensions and frame rate,
//! joins it and trims the tail to exactly the target duration.

use crate::engine::DEFAULT_FRAME_RATE;
use crate::step::{TransformStep, MIN_DURATION};
use crate::{Error, Result, Session};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// What to do when one pass over the pool is shorter than the target.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(tag = "mode", rename_all = "snake_case")]
pub enum RepeatPolicy {
    /// Fail with [`Error::InsufficientDuration`].
    #[default]
    FailFast,
    /// Walk the pool again, at most `max_passes` times in total.
    Repeat { max_passes: u32 },
}

impl RepeatPolicy {
    fn max_passes(&self) -> u32 {
        match self {
            RepeatPolicy::FailFast => 1,
            RepeatPolicy::Repeat { max_passes } => (*max_passes).max(1),
        }
    }
}

/// Pre-transform applied to a source clip before selection.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "op", rename_all = "snake_case")]
pub enum ClipTransform {
    Flip,
    SpeedUp { factor: f64 },
    ScaleUp { factor: f64 },
}

impl ClipTransform {
    /// The session step this transform runs as.
    pub fn to_step(&self) -> TransformStep {
        match self {
            ClipTransform::Flip => TransformStep::Flip,
            ClipTransform::SpeedUp { factor } => TransformStep::SpeedChange { factor: *factor },
            ClipTransform::ScaleUp { factor } => TransformStep::ScaleUp { factor: *factor },
        }
    }
}

/// One candidate clip.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ClipSource {
    pub path: PathBuf,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub transform: Option<ClipTransform>,
}

impl ClipSource {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            transform: None,
        }
    }

    pub fn with_transform(mut self, transform: ClipTransform) -> Self {
        self.transform = Some(transform);
        self
    }
}

fn default_frame_rate() -> u32 {
    DEFAULT_FRAME_RATE
}

/// Input to [`Session::assemble`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ClipPlan {
    /// Exact duration of the assembled artifact, in seconds.
    pub target_duration: f64,
    /// Width every clip is fitted into.
    pub width: u32,
    /// Height every clip is fitted into.
    pub height: u32,
    #[serde(default = "default_frame_rate")]
    pub frame_rate: u32,
    pub sources: Vec<ClipSource>,
    #[serde(default)]
    pub repeat: RepeatPolicy,
}

impl ClipPlan {
    pub fn new(target_duration: f64, width: u32, height: u32) -> Self {
        Self {
            target_duration,
            width,
            height,
            frame_rate: DEFAULT_FRAME_RATE,
            sources: Vec::new(),
            repeat: RepeatPolicy::default(),
        }
    }

    pub fn with_source(mut self, source: ClipSource) -> Self {
        self.sources.push(source);
        self
    }

    pub fn with_repeat(mut self, repeat: RepeatPolicy) -> Self {
        self.repeat = repeat;
        self
    }

    /// Check the plan before any clip is touched.
    pub fn validate(&self) -> Result<()> {
        if !self.target_duration.is_finite() || self.target_duration < MIN_DURATION {
            return Err(Error::InvalidInput(format!(
                "target duration must be at least {}s, got {}",
                MIN_DURATION, self.target_duration
            )));
        }
        if self.sources.is_empty() {
            return Err(Error::InvalidInput("clip plan has no sources".into()));
        }

        self.fit_step().validate()?;
        for source in &self.sources {
            if let Some(transform) = &source.transform {
                transform.to_step().validate()?;
            }
        }
        Ok(())
    }

    fn fit_step(&self) -> TransformStep {
        TransformStep::Fit {
            width: self.width,
            height: self.height,
            frame_rate: self.frame_rate,
        }
    }
}

/// Clips chosen by [`select_clips`].
#[derive(Debug, Clone, PartialEq)]
pub struct Selection {
    /// Indices into the measured pool, in join order. An index repeats when
    /// the pool was walked more than once.
    pub indices: Vec<usize>,
    /// Summed duration of the selection.
    pub total: f64,
    /// Passes over the pool that were needed.
    pub passes: u32,
}

/// Greedily pick clips until their durations reach `target`.
///
/// `None` entries are clips that could not be measured and are skipped. The
/// clip that crosses the threshold is included. Fails up front when the pool
/// cannot reach `target` within the policy's pass limit.
pub fn select_clips(
    durations: &[Option<f64>],
    target: f64,
    policy: RepeatPolicy,
) -> Result<Selection> {
    let usable = |d: &Option<f64>| d.filter(|d| d.is_finite() && *d > 0.0);
    let available: f64 = durations.iter().filter_map(usable).sum();
    let max_passes = policy.max_passes();

    let insufficient = || Error::InsufficientDuration {
        available,
        requested: target,
    };

    if available <= 0.0 || available * f64::from(max_passes) < target {
        return Err(insufficient());
    }

    let mut indices = Vec::new();
    let mut total = 0.0;
    for pass in 1..=max_passes {
        for (index, duration) in durations.iter().enumerate() {
            let Some(duration) = usable(duration) else {
                continue;
            };
            indices.push(index);
            total += duration;
            if total >= target {
                return Ok(Selection {
                    indices,
                    total,
                    passes: pass,
                });
            }
        }
    }

    Err(insufficient())
}

impl Session {
    /// Build the current artifact from `plan`'s clip pool.
    ///
    /// Pre-transform failures are fatal. Clips whose duration cannot be
    /// probed are skipped. The result is exactly `plan.target_duration` long.
    pub fn assemble(&mut self, plan: &ClipPlan) -> Result<&mut Self> {
        self.ensure_open()?;
        plan.validate()?;

        tracing::info!(
            session = %self.id(),
            sources = plan.sources.len(),
            target = plan.target_duration,
            "Assembling clips"
        );

        let mut clips = Vec::with_capacity(plan.sources.len());
        for source in &plan.sources {
            let clip = match &source.transform {
                Some(transform) => self.transform(&source.path, &transform.to_step())?,
                None => source.path.clone(),
            };
            clips.push(clip);
        }

        let mut durations = Vec::with_capacity(clips.len());
        for clip in &clips {
            match self.engine().probe_duration(clip) {
                Ok(duration) => durations.push(Some(duration)),
                Err(e) if e.is_probe_failure() => {
                    tracing::warn!(clip = %clip.display(), error = %e, "Skipping unprobeable clip");
                    durations.push(None);
                }
                Err(e) => return Err(e),
            }
        }

        let selection = select_clips(&durations, plan.target_duration, plan.repeat)?;
        tracing::debug!(
            selected = selection.indices.len(),
            total = selection.total,
            passes = selection.passes,
            "Clips selected"
        );

        // A clip picked on several passes is normalized once.
        let fit = plan.fit_step();
        let mut normalized: Vec<Option<PathBuf>> = vec![None; clips.len()];
        let mut ordered = Vec::with_capacity(selection.indices.len());
        for &index in &selection.indices {
            let clip = match &normalized[index] {
                Some(done) => done.clone(),
                None => {
                    let done = self.run_single(&clips[index], &fit)?;
                    normalized[index] = Some(done.clone());
                    done
                }
            };
            ordered.push(clip);
        }

        let joined = self.join(&ordered)?;
        let trim = TransformStep::Trim {
            start: 0.0,
            end: plan.target_duration,
        };
        let assembled = self.run_single(&joined, &trim)?;
        self.set_current(assembled);

        Ok(self)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn threshold_crossing_clip_is_included() {
        let selection =
            select_clips(&[Some(3.0), Some(4.0), Some(5.0)], 9.0, RepeatPolicy::FailFast).unwrap();
        assert_eq!(selection.indices, vec![0, 1, 2]);
        assert_eq!(selection.total, 12.0);
        assert_eq!(selection.passes, 1);
    }

    #[test]
    fn selection_stops_once_target_reached() {
        let selection =
            select_clips(&[Some(3.0), Some(4.0), Some(5.0)], 7.0, RepeatPolicy::FailFast).unwrap();
        assert_eq!(selection.indices, vec![0, 1]);
    }

    #[test]
    fn insufficient_pool_fails_fast() {
        let err = select_clips(&[Some(3.0), Some(4.0)], 20.0, RepeatPolicy::FailFast).unwrap_err();
        match err {
            Error::InsufficientDuration {
                available,
                requested,
            } => {
                assert_eq!(available, 7.0);
                assert_eq!(requested, 20.0);
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn unmeasured_clips_are_skipped() {
        let selection =
            select_clips(&[None, Some(4.0), None, Some(6.0)], 8.0, RepeatPolicy::FailFast).unwrap();
        assert_eq!(selection.indices, vec![1, 3]);
    }

    #[test]
    fn pool_without_usable_duration_fails() {
        let policy = RepeatPolicy::Repeat { max_passes: 100 };
        assert!(select_clips(&[None, Some(0.0)], 1.0, policy).is_err());
        assert!(select_clips(&[], 1.0, policy).is_err());
    }

    #[test]
    fn repeat_policy_rewalks_pool_within_cap() {
        let policy = RepeatPolicy::Repeat { max_passes: 3 };
        let selection = select_clips(&[Some(3.0), Some(4.0)], 15.0, policy).unwrap();
        assert_eq!(selection.indices, vec![0, 1, 0, 1, 0]);
        assert_eq!(selection.passes, 3);

        let err = select_clips(&[Some(3.0), Some(4.0)], 22.0, policy).unwrap_err();
        assert!(matches!(err, Error::InsufficientDuration { .. }));
    }

    #[test]
    fn exact_total_is_enough() {
        let selection = select_clips(&[Some(2.5), Some(2.5)], 5.0, RepeatPolicy::FailFast).unwrap();
        assert_eq!(selection.indices, vec![0, 1]);
    }

    #[test]
    fn plan_validation() {
        let plan = ClipPlan::new(9.0, 1080, 1920);
        assert!(plan.validate().is_err(), "no sources");

        let plan = plan.with_source(ClipSource::new("a.mp4"));
        assert!(plan.validate().is_ok());

        let mut bad = plan.clone();
        bad.target_duration = 0.0;
        assert!(bad.validate().is_err());

        bad.target_duration = 0.004;
        assert!(bad.validate().is_err(), "rounds to an empty trim");

        let slow = ClipSource::new("b.mp4").with_transform(ClipTransform::SpeedUp { factor: 0.0 });
        let bad = plan.clone().with_source(slow);
        assert!(bad.validate().is_err());
    }

    #[test]
    fn plan_deserializes_with_defaults() {
        let plan: ClipPlan = serde_json::from_str(
            r#"{
                "target_duration": 12.5,
                "width": 720,
                "height": 1280,
                "sources": [
                    {"path": "a.mp4"},
                    {"path": "b.mp4", "transform": {"op": "speed_up", "factor": 2.0}}
                ],
                "repeat": {"mode": "repeat", "max_passes": 2}
            }"#,
        )
        .unwrap();

        assert_eq!(plan.frame_rate, 30);
        assert_eq!(plan.repeat, RepeatPolicy::Repeat { max_passes: 2 });
        assert_eq!(
            plan.sources[1].transform,
            Some(ClipTransform::SpeedUp { factor: 2.0 })
        );
    }
}
