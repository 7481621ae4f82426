//! Video encoder selection.

use serde::{Deserialize, Serialize};

/// Video encoder emitted by steps that re-encode their output.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum Encoder {
    /// Software H.264 baseline encoder.
    #[default]
    #[serde(rename = "libx264")]
    Libx264,
    /// NVIDIA NVENC H.264 encoder.
    #[serde(rename = "h264_nvenc")]
    H264Nvenc,
}

impl Encoder {
    /// Get the ffmpeg encoder name for `-c:v`.
    pub fn ffmpeg_name(&self) -> &'static str {
        match self {
            Encoder::Libx264 => "libx264",
            Encoder::H264Nvenc => "h264_nvenc",
        }
    }

    /// Whether this encoder runs on a hardware-accelerated profile.
    pub fn is_hardware(&self) -> bool {
        matches!(self, Encoder::H264Nvenc)
    }

    /// Decode-acceleration arguments to place ahead of every invocation.
    pub fn decode_args(&self) -> &'static [&'static str] {
        match self {
            Encoder::Libx264 => &[],
            Encoder::H264Nvenc => &["-hwaccel", "cuda"],
        }
    }
}

impl std::fmt::Display for Encoder {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.ffmpeg_name())
    }
}

impl std::str::FromStr for Encoder {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "libx264" | "x264" | "software" => Ok(Encoder::Libx264),
            "h264_nvenc" | "nvenc" | "hardware" => Ok(Encoder::H264Nvenc),
            _ => Err(format!("Unknown encoder: {}", s)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_encoder_from_str() {
        assert_eq!("libx264".parse::<Encoder>().ok(), Some(Encoder::Libx264));
        assert_eq!("NVENC".parse::<Encoder>().ok(), Some(Encoder::H264Nvenc));
        assert_eq!("h264_nvenc".parse::<Encoder>().ok(), Some(Encoder::H264Nvenc));
        assert_eq!("vp9".parse::<Encoder>().ok(), None);
    }

    #[test]
    fn test_decode_args_only_for_hardware() {
        assert!(Encoder::Libx264.decode_args().is_empty());
        assert_eq!(Encoder::H264Nvenc.decode_args(), &["-hwaccel", "cuda"]);
        assert!(Encoder::H264Nvenc.is_hardware());
    }
}
