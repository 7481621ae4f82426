//! Shared test harness for session and assembly tests.
//!
//! Provides [`SimulatedInvoker`], an [`Invoker`] that stands in for ffmpeg
//! and ffprobe. It tracks a duration per file: transformation steps carry the
//! input duration to the output, `-ss`/`-to` trims it and concat sums the
//! listed clips.

#![allow(dead_code)]

use std::collections::{HashMap, HashSet};
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};

use tempfile::TempDir;
use vidfusion_av::{Engine, EngineConfig, Invoker, Result, ToolOutput};

/// One recorded invocation.
#[derive(Debug, Clone)]
pub struct Call {
    pub program: String,
    pub args: Vec<String>,
}

#[derive(Default)]
pub struct SimulatedInvoker {
    durations: Mutex<HashMap<PathBuf, f64>>,
    failures: Mutex<Vec<String>>,
    unprobeable: Mutex<HashSet<PathBuf>>,
    joins: Mutex<Vec<Vec<PathBuf>>>,
    calls: Mutex<Vec<Call>>,
}

impl SimulatedInvoker {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// Make ffmpeg fail for any invocation with an argument containing
    /// `needle`.
    pub fn fail_when(&self, needle: &str) {
        self.failures.lock().unwrap().push(needle.to_string());
    }

    /// Make ffprobe fail for `path`.
    pub fn unprobeable(&self, path: &Path) {
        self.unprobeable.lock().unwrap().insert(path.to_path_buf());
    }

    pub fn set_duration(&self, path: &Path, duration: f64) {
        self.durations
            .lock()
            .unwrap()
            .insert(path.to_path_buf(), duration);
    }

    pub fn duration_of(&self, path: &Path) -> Option<f64> {
        self.durations.lock().unwrap().get(path).copied()
    }

    pub fn calls(&self) -> Vec<Call> {
        self.calls.lock().unwrap().clone()
    }

    pub fn ffmpeg_calls(&self) -> Vec<Vec<String>> {
        self.calls()
            .into_iter()
            .filter(|c| c.program == "ffmpeg")
            .map(|c| c.args)
            .collect()
    }

    /// Clip lists of every concat invocation, in order.
    pub fn joins(&self) -> Vec<Vec<PathBuf>> {
        self.joins.lock().unwrap().clone()
    }

    fn probe(&self, args: &[String]) -> ToolOutput {
        let target = if args.first().map(String::as_str) == Some("-i") {
            PathBuf::from(&args[1])
        } else {
            PathBuf::from(args.last().cloned().unwrap_or_default())
        };

        if self.unprobeable.lock().unwrap().contains(&target) {
            return failure("Invalid data found when processing input");
        }

        match self.duration_of(&target) {
            Some(_) if args.iter().any(|a| a == "stream=width,height") => ok("1920x1080\n"),
            Some(d) => ok(&format!("{:.6}\n", d)),
            None => failure(&format!("{}: No such file or directory", target.display())),
        }
    }

    fn transform(&self, args: &[String]) -> ToolOutput {
        if let Some(needle) = self
            .failures
            .lock()
            .unwrap()
            .iter()
            .find(|n| args.iter().any(|a| a.contains(n.as_str())))
        {
            return failure(&format!("simulated failure on {}", needle));
        }

        let args: Vec<&str> = args
            .iter()
            .map(String::as_str)
            .skip_while(|a| *a != "-y")
            .skip(1)
            .collect();
        let output = PathBuf::from(*args.last().unwrap());
        let input = PathBuf::from(value_after(&args, "-i").unwrap());

        let mut duration = if args.windows(2).any(|w| w == ["-f", "concat"]) {
            let clips = read_concat_list(&input);
            let mut total = 0.0;
            for clip in &clips {
                match self.duration_of(clip) {
                    Some(d) => total += d,
                    None => return failure(&format!("{}: No such file", clip.display())),
                }
            }
            self.joins.lock().unwrap().push(clips);
            total
        } else {
            match self.duration_of(&input) {
                Some(d) => d,
                None => {
                    return failure(&format!(
                        "{}: No such file or directory",
                        input.display()
                    ))
                }
            }
        };

        if let (Some(start), Some(end)) = (value_after(&args, "-ss"), value_after(&args, "-to")) {
            let start: f64 = start.parse().unwrap();
            let end: f64 = end.parse().unwrap();
            duration = (end.min(duration) - start).max(0.0);
        }

        fs::write(&output, format!("simulated:{}", output.display())).unwrap();
        self.set_duration(&output, duration);
        ok("")
    }
}

impl Invoker for SimulatedInvoker {
    fn invoke(&self, program: &Path, args: &[String]) -> Result<ToolOutput> {
        let program = program.file_name().unwrap().to_string_lossy().into_owned();
        self.calls.lock().unwrap().push(Call {
            program: program.clone(),
            args: args.to_vec(),
        });

        Ok(match program.as_str() {
            "ffprobe" => self.probe(args),
            _ => self.transform(args),
        })
    }
}

fn ok(stdout: &str) -> ToolOutput {
    ToolOutput {
        code: Some(0),
        stdout: stdout.to_string(),
        stderr: String::new(),
    }
}

fn failure(stderr: &str) -> ToolOutput {
    ToolOutput {
        code: Some(1),
        stdout: String::new(),
        stderr: stderr.to_string(),
    }
}

fn value_after<'a>(args: &[&'a str], flag: &str) -> Option<&'a str> {
    args.iter()
        .position(|a| *a == flag)
        .and_then(|i| args.get(i + 1).copied())
}

fn read_concat_list(list: &Path) -> Vec<PathBuf> {
    fs::read_to_string(list)
        .unwrap()
        .lines()
        .filter_map(|line| line.strip_prefix("file '"))
        .map(|rest| PathBuf::from(rest.trim_end_matches('\'').replace(r"'\''", "'")))
        .collect()
}

/// A temp directory, a simulated engine allocating inside it, and the
/// invoker behind that engine.
pub struct Harness {
    pub dir: TempDir,
    pub sim: Arc<SimulatedInvoker>,
    pub engine: Engine,
}

impl Harness {
    pub fn new() -> Self {
        Self::with_config(EngineConfig::default())
    }

    pub fn with_config(config: EngineConfig) -> Self {
        let dir = tempfile::tempdir().unwrap();
        let sim = SimulatedInvoker::new();
        let config = EngineConfig {
            temp_dir: dir.path().join("scratch"),
            ..config
        };
        let engine = Engine::with_invoker(config, sim.clone());
        Self { dir, sim, engine }
    }

    /// Create a source clip of `duration` seconds.
    pub fn clip(&self, name: &str, duration: f64) -> PathBuf {
        let path = self.dir.path().join(name);
        fs::write(&path, format!("source:{}", name)).unwrap();
        self.sim.set_duration(&path, duration);
        path
    }

    pub fn scratch(&self) -> PathBuf {
        self.dir.path().join("scratch")
    }

    /// Files left in the scratch directory.
    pub fn leftovers(&self) -> Vec<PathBuf> {
        match fs::read_dir(self.scratch()) {
            Ok(entries) => entries.map(|e| e.unwrap().path()).collect(),
            Err(_) => Vec::new(),
        }
    }
}

pub fn approx_eq(a: f64, b: f64) -> bool {
    (a - b).abs() < 0.1
}
