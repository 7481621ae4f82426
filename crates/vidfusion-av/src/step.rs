//! Transformation steps and their ffmpeg argument lists.
//!
//! A [`TransformStep`] carries parameters only. The session decides which
//! file is the input and which handle receives the output.

use crate::{Encoder, Error, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Container extension for every intermediate.
pub const ARTIFACT_EXTENSION: &str = "mp4";

/// Shortest span a trim can express. Trim offsets are written with two
/// decimals, so anything shorter rounds to an empty range.
pub const MIN_DURATION: f64 = 0.01;

/// Image overlay placement.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OverlayOptions {
    /// Image to draw over the video.
    pub image: PathBuf,
    /// Width the image is scaled to.
    pub width: u32,
    /// Height the image is scaled to.
    pub height: u32,
    /// Left edge in output pixels.
    pub x: i64,
    /// Top edge in output pixels.
    pub y: i64,
}

/// Subtitle rendering style, passed to libass as `force_style`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SubtitleStyle {
    pub font_size: u32,
    /// Left and right margin.
    pub margin_x: i64,
    /// Vertical margin.
    pub margin_y: i64,
    pub font: String,
    /// `BBGGRR` hex colour.
    pub font_color: String,
    /// 1 left, 2 centre, 3 right.
    pub alignment: u8,
}

impl Default for SubtitleStyle {
    fn default() -> Self {
        Self {
            font_size: 24,
            margin_x: 10,
            margin_y: 10,
            font: "Arial".to_string(),
            font_color: "FFFFFF".to_string(),
            alignment: 2,
        }
    }
}

impl SubtitleStyle {
    fn force_style(&self) -> String {
        format!(
            "Alignment={},Fontsize={},PrimaryColour=&H{}&,FontName={},MarginL={},MarginR={},MarginV={}",
            self.alignment,
            self.font_size,
            self.font_color,
            self.font,
            self.margin_x,
            self.margin_x,
            self.margin_y,
        )
    }
}

/// One external-engine edit.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "op", rename_all = "snake_case")]
pub enum TransformStep {
    /// Keep `start..end` seconds.
    Trim { start: f64, end: f64 },
    /// Scale to exactly `width`x`height`.
    Resize { width: u32, height: u32 },
    /// Scale down to fit `width`x`height` keeping aspect ratio, and resample
    /// to `frame_rate`.
    Fit {
        width: u32,
        height: u32,
        frame_rate: u32,
    },
    /// Mirror horizontally.
    Flip,
    /// Play `factor` times faster.
    SpeedChange { factor: f64 },
    /// Multiply both dimensions by `factor`.
    ScaleUp { factor: f64 },
    /// Mix `track` under the existing audio at `volume`.
    MixAudio { track: PathBuf, volume: f64 },
    /// Draw an image over the video.
    Overlay(OverlayOptions),
    /// Drop all audio.
    Silence,
    /// Add a silent stereo track.
    SilentTrackInject,
    /// Burn in subtitles.
    Subtitle {
        file: PathBuf,
        #[serde(default)]
        style: SubtitleStyle,
    },
    /// Normalize `clips` to `width`x`height` and join them.
    Concatenate {
        clips: Vec<PathBuf>,
        width: u32,
        height: u32,
    },
}

impl TransformStep {
    /// Short name for logs and progress reports.
    pub fn name(&self) -> &'static str {
        match self {
            TransformStep::Trim { .. } => "Trim",
            TransformStep::Resize { .. } => "Resize",
            TransformStep::Fit { .. } => "Fit",
            TransformStep::Flip => "Flip",
            TransformStep::SpeedChange { .. } => "Speed Change",
            TransformStep::ScaleUp { .. } => "Scale Up",
            TransformStep::MixAudio { .. } => "Mix Audio",
            TransformStep::Overlay(_) => "Image Overlay",
            TransformStep::Silence => "Silence",
            TransformStep::SilentTrackInject => "Silent Track",
            TransformStep::Subtitle { .. } => "Subtitles",
            TransformStep::Concatenate { .. } => "Concatenate",
        }
    }

    /// Check parameters before anything is allocated.
    pub fn validate(&self) -> Result<()> {
        match self {
            TransformStep::Trim { start, end } => {
                if !(start.is_finite() && end.is_finite()) || *start < 0.0 || end <= start {
                    return Err(Error::InvalidInput(format!(
                        "trim range {}..{} is empty or negative",
                        start, end
                    )));
                }
                if end - start < MIN_DURATION {
                    return Err(Error::InvalidInput(format!(
                        "trim range {}..{} is shorter than {}s",
                        start, end, MIN_DURATION
                    )));
                }
            }
            TransformStep::Resize { width, height }
            | TransformStep::Concatenate { width, height, .. } => {
                check_dimensions(*width, *height)?;
            }
            TransformStep::Fit {
                width,
                height,
                frame_rate,
            } => {
                check_dimensions(*width, *height)?;
                if *frame_rate == 0 {
                    return Err(Error::InvalidInput("frame rate must be positive".into()));
                }
            }
            TransformStep::SpeedChange { factor } | TransformStep::ScaleUp { factor } => {
                if !factor.is_finite() || *factor <= 0.0 {
                    return Err(Error::InvalidInput(format!(
                        "{} factor must be positive, got {}",
                        self.name(),
                        factor
                    )));
                }
            }
            TransformStep::Overlay(opts) => check_dimensions(opts.width, opts.height)?,
            _ => {}
        }

        if let TransformStep::Concatenate { clips, .. } = self {
            if clips.is_empty() {
                return Err(Error::InvalidInput("nothing to concatenate".into()));
            }
        }

        Ok(())
    }

    /// Build the argument list reading `input` and writing `output`.
    ///
    /// The overwrite and acceleration flags are added by the engine.
    /// `Concatenate` has no single input and is rejected here; sessions build
    /// it from [`join_args`].
    pub fn args(&self, input: &Path, output: &Path, encoder: Encoder) -> Result<Vec<String>> {
        let mut args = vec!["-i".to_string(), path_arg(input)];

        match self {
            TransformStep::Trim { start, end } => {
                push(&mut args, ["-ss", &format!("{:.2}", start)]);
                push(&mut args, ["-to", &format!("{:.2}", end)]);
            }
            TransformStep::Resize { width, height } => {
                push(&mut args, ["-vf", &format!("scale={}:{}", width, height)]);
            }
            TransformStep::Fit {
                width,
                height,
                frame_rate,
            } => {
                let filter = format!(
                    "scale={}:{}:force_original_aspect_ratio=decrease",
                    width, height
                );
                push(&mut args, ["-vf", &filter]);
                push(&mut args, ["-r", &frame_rate.to_string()]);
                push(&mut args, ["-c:a", "copy"]);
            }
            TransformStep::Flip => {
                push(&mut args, ["-vf", "hflip"]);
                push(&mut args, ["-c:v", encoder.ffmpeg_name(), "-c:a", "copy"]);
            }
            TransformStep::SpeedChange { factor } => {
                let filter = format!("setpts={:.6}*PTS", 1.0 / factor);
                push(&mut args, ["-filter:v", &filter]);
            }
            TransformStep::ScaleUp { factor } => {
                let filter = format!("scale=iw*{:.6}:ih*{:.6}", factor, factor);
                push(&mut args, ["-vf", &filter]);
            }
            TransformStep::MixAudio { track, volume } => {
                let graph = format!(
                    "[1:a]volume={:.1}[a1];[0:a][a1]amix=inputs=2:duration=first:dropout_transition=2[a]",
                    volume
                );
                push(&mut args, ["-i", &path_arg(track)]);
                push(&mut args, ["-filter_complex", &graph]);
                push(&mut args, ["-map", "0:v", "-map", "[a]"]);
                push(&mut args, ["-c:v", "copy", "-c:a", "aac", "-b:a", "192k"]);
                args.push("-shortest".to_string());
            }
            TransformStep::Overlay(opts) => {
                let graph = format!(
                    "[1:v]scale={}:{}[img];[0:v][img]overlay={}:{}",
                    opts.width, opts.height, opts.x, opts.y
                );
                push(&mut args, ["-i", &path_arg(&opts.image)]);
                push(&mut args, ["-filter_complex", &graph]);
                push(&mut args, ["-c:v", encoder.ffmpeg_name()]);
                push(&mut args, ["-preset", "slow", "-crf", "23", "-c:a", "copy"]);
            }
            TransformStep::Silence => {
                push(&mut args, ["-an", "-c:v", "copy", "-c:a", "aac"]);
            }
            TransformStep::SilentTrackInject => {
                push(&mut args, ["-f", "lavfi", "-i", "anullsrc=r=44100:cl=stereo"]);
                push(&mut args, ["-c:v", "copy", "-c:a", "aac", "-shortest"]);
            }
            TransformStep::Subtitle { file, style } => {
                let filter = format!(
                    "subtitles={}:force_style='{}'",
                    quote_filter_path(file),
                    style.force_style()
                );
                push(&mut args, ["-vf", &filter]);
                push(&mut args, ["-c:v", encoder.ffmpeg_name()]);
                push(&mut args, ["-c:a", "aac", "-b:a", "192k", "-shortest"]);
            }
            TransformStep::Concatenate { .. } => {
                return Err(Error::InvalidInput(
                    "concatenate takes a clip list, not a single input".into(),
                ));
            }
        }

        args.push(path_arg(output));
        Ok(args)
    }
}

/// Arguments joining the clips listed in a concat-demuxer file.
pub fn join_args(list_file: &Path, output: &Path, encoder: Encoder) -> Vec<String> {
    vec![
        "-f".to_string(),
        "concat".to_string(),
        "-safe".to_string(),
        "0".to_string(),
        "-i".to_string(),
        path_arg(list_file),
        "-c:v".to_string(),
        encoder.ffmpeg_name().to_string(),
        path_arg(output),
    ]
}

/// Contents of a concat-demuxer list file for `clips`, in order.
pub fn concat_list<P: AsRef<Path>>(clips: &[P]) -> String {
    clips
        .iter()
        .map(|clip| format!("file {}\n", quote_filter_path(clip.as_ref())))
        .collect()
}

/// Single-quote a path for ffmpeg's filter and concat parsers.
///
/// Backslashes become forward slashes; embedded quotes are closed, escaped and
/// reopened.
pub fn quote_filter_path(path: &Path) -> String {
    let slashed = path.to_string_lossy().replace('\\', "/");
    format!("'{}'", slashed.replace('\'', r"'\''"))
}

fn check_dimensions(width: u32, height: u32) -> Result<()> {
    if width == 0 || height == 0 {
        return Err(Error::InvalidInput(format!(
            "dimensions must be positive, got {}x{}",
            width, height
        )));
    }
    Ok(())
}

fn path_arg(path: &Path) -> String {
    path.to_string_lossy().into_owned()
}

fn push<const N: usize>(args: &mut Vec<String>, items: [&str; N]) {
    args.extend(items.iter().map(|s| s.to_string()));
}

#[cfg(test)]
mod tests {
    use super::*;

    fn args_for(step: &TransformStep, encoder: Encoder) -> Vec<String> {
        step.args(Path::new("in.mp4"), Path::new("out.mp4"), encoder)
            .unwrap()
    }

    #[test]
    fn trim_formats_two_decimals() {
        let args = args_for(&TransformStep::Trim { start: 0.0, end: 4.999 }, Encoder::Libx264);
        assert_eq!(args, ["-i", "in.mp4", "-ss", "0.00", "-to", "5.00", "out.mp4"]);
    }

    #[test]
    fn speed_change_inverts_factor() {
        let args = args_for(&TransformStep::SpeedChange { factor: 2.0 }, Encoder::Libx264);
        assert!(args.contains(&"setpts=0.500000*PTS".to_string()));
    }

    #[test]
    fn fit_is_decrease_only_with_frame_rate() {
        let step = TransformStep::Fit {
            width: 1080,
            height: 1920,
            frame_rate: 30,
        };
        let args = args_for(&step, Encoder::Libx264);
        assert!(args.contains(&"scale=1080:1920:force_original_aspect_ratio=decrease".to_string()));
        let r = args.iter().position(|a| a == "-r").unwrap();
        assert_eq!(args[r + 1], "30");
    }

    #[test]
    fn encoder_emitted_by_reencoding_steps() {
        let steps = [
            TransformStep::Flip,
            TransformStep::Overlay(OverlayOptions {
                image: PathBuf::from("logo.png"),
                width: 100,
                height: 50,
                x: 10,
                y: 20,
            }),
            TransformStep::Subtitle {
                file: PathBuf::from("subs.srt"),
                style: SubtitleStyle::default(),
            },
        ];
        for step in &steps {
            let args = args_for(step, Encoder::H264Nvenc);
            let c = args.iter().position(|a| a == "-c:v").unwrap();
            assert_eq!(args[c + 1], "h264_nvenc", "step {}", step.name());
        }
    }

    #[test]
    fn output_is_always_last() {
        let step = TransformStep::MixAudio {
            track: PathBuf::from("music.mp3"),
            volume: 0.3,
        };
        let args = args_for(&step, Encoder::Libx264);
        assert_eq!(args.last().unwrap(), "out.mp4");
        assert!(args.iter().any(|a| a.starts_with("[1:a]volume=0.3[a1]")));
    }

    #[test]
    fn concatenate_has_no_single_input_form() {
        let step = TransformStep::Concatenate {
            clips: vec![PathBuf::from("a.mp4")],
            width: 640,
            height: 360,
        };
        assert!(step
            .args(Path::new("in.mp4"), Path::new("out.mp4"), Encoder::Libx264)
            .is_err());
    }

    #[test]
    fn validate_rejects_bad_parameters() {
        assert!(TransformStep::SpeedChange { factor: 0.0 }.validate().is_err());
        assert!(TransformStep::ScaleUp { factor: -1.0 }.validate().is_err());
        assert!(TransformStep::Trim { start: 5.0, end: 5.0 }.validate().is_err());
        assert!(TransformStep::Resize { width: 0, height: 10 }.validate().is_err());
        assert!(TransformStep::Concatenate {
            clips: vec![],
            width: 10,
            height: 10
        }
        .validate()
        .is_err());
        assert!(TransformStep::Trim { start: 0.0, end: 5.0 }.validate().is_ok());
    }

    #[test]
    fn trim_shorter_than_formatting_resolution_is_rejected() {
        let err = TransformStep::Trim { start: 0.0, end: 0.004 }
            .validate()
            .unwrap_err();
        assert!(err.to_string().contains("shorter than 0.01s"));
        assert!(TransformStep::Trim { start: 2.0, end: 2.009 }.validate().is_err());
        assert!(TransformStep::Trim { start: 0.0, end: MIN_DURATION }.validate().is_ok());
    }

    #[test]
    fn quote_filter_path_escapes_quotes_and_backslashes() {
        assert_eq!(quote_filter_path(Path::new(r"C:\subs\a.srt")), "'C:/subs/a.srt'");
        assert_eq!(quote_filter_path(Path::new("/tmp/it's.srt")), r"'/tmp/it'\''s.srt'");
    }

    #[test]
    fn concat_list_preserves_order() {
        let list = concat_list(&[PathBuf::from("/t/b.mp4"), PathBuf::from("/t/a.mp4")]);
        assert_eq!(list, "file '/t/b.mp4'\nfile '/t/a.mp4'\n");
    }

    #[test]
    fn steps_deserialize_from_tagged_form() {
        let step: TransformStep =
            serde_json::from_str(r#"{"op": "speed_change", "factor": 1.5}"#).unwrap();
        assert_eq!(step, TransformStep::SpeedChange { factor: 1.5 });

        let step: TransformStep = serde_json::from_str(
            r#"{"op": "overlay", "image": "logo.png", "width": 64, "height": 64, "x": 8, "y": 8}"#,
        )
        .unwrap();
        assert_eq!(step.name(), "Image Overlay");
    }
}
