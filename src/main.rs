mod cli;

use vidfusion::config;
use vidfusion::job::{Job, JobRunner};
use vidfusion_av::{check_tools as detect_tools, media, require_tool, Engine};

use anyhow::Result;
use clap::Parser;
use cli::{Cli, Commands};
use serde::Serialize;
use std::path::Path;

fn main() -> Result<()> {
    let cli = Cli::parse();

    // Initialize logging
    // Respect RUST_LOG env var if set, otherwise use defaults based on verbose flag
    let env_filter = std::env::var("RUST_LOG").unwrap_or_else(|_| {
        if cli.verbose {
            "vidfusion=trace,vidfusion_av=trace".to_string()
        } else {
            configured_filter(cli.config.as_deref())
                .unwrap_or_else(|| "vidfusion=info,vidfusion_av=info".to_string())
        }
    });

    tracing_subscriber::fmt()
        .with_env_filter(&env_filter)
        .with_writer(std::io::stderr)
        .init();

    match cli.command {
        Commands::Run { job, dry_run } => run_job(&job, cli.config.as_deref(), dry_run),
        Commands::Probe { file, json } => probe_file(&file, cli.config.as_deref(), json),
        Commands::Pick { dir, count, ext } => pick_clips(&dir, &ext, count),
        Commands::CheckTools => check_tools(cli.config.as_deref()),
        Commands::Validate {
            config: config_path,
        } => {
            let path = config_path.or(cli.config);
            validate_config(path.as_deref())
        }
        Commands::Version => {
            println!("vidfusion {}", env!("CARGO_PKG_VERSION"));
            Ok(())
        }
    }
}

/// Log filter from the config file, if one loads and sets a level.
fn configured_filter(config_path: Option<&Path>) -> Option<String> {
    config::load_config_or_default(config_path)
        .ok()
        .and_then(|config| config.logging.filter())
}

fn run_job(job_path: &Path, config_path: Option<&Path>, dry_run: bool) -> Result<()> {
    let config = config::load_config_or_default(config_path)?;
    let job = Job::load(job_path)?;

    if let Some(ref input) = job.input {
        if !input.exists() {
            anyhow::bail!("Input file does not exist: {:?}", input);
        }
    }

    println!("Job: {}", job_path.display());
    if let Some(ref input) = job.input {
        println!("Input: {}", input.display());
    }
    if let Some(ref plan) = job.assembly {
        println!(
            "Assembly: {:.2}s at {}x{} from {} sources",
            plan.target_duration,
            plan.width,
            plan.height,
            plan.sources.len()
        );
    }
    println!("Steps: {}", job.steps.len());
    for (i, step) in job.steps.iter().enumerate() {
        println!("  {}. {}", i + 1, step.name());
    }

    if dry_run {
        let output = JobRunner::new(Engine::new(config.engine), true).run(&job)?;
        println!("\n[DRY RUN] Would write {}", output.display());
        return Ok(());
    }

    require_tool(&config.engine.ffmpeg)?;
    require_tool(&config.engine.ffprobe)?;
    let runner = JobRunner::new(Engine::new(config.engine), false);

    println!("\nRunning job...");
    let output = runner.run(&job)?;

    println!("\nProcessing complete!");
    println!("Output: {}", output.display());

    Ok(())
}

#[derive(Serialize)]
struct ProbeReport {
    file: std::path::PathBuf,
    duration: f64,
    width: Option<u32>,
    height: Option<u32>,
}

fn probe_file(file: &Path, config_path: Option<&Path>, json: bool) -> Result<()> {
    if !file.exists() {
        anyhow::bail!("File does not exist: {:?}", file);
    }

    let config = config::load_config_or_default(config_path)?;
    let engine = Engine::new(config.engine);

    let duration = engine.probe_duration(file)?;
    // Audio-only files have no video stream to measure.
    let dimensions = match engine.probe_dimensions(file) {
        Ok(dims) => Some(dims),
        Err(e) => {
            tracing::debug!("No video dimensions for {:?}: {}", file, e);
            None
        }
    };

    let report = ProbeReport {
        file: file.to_path_buf(),
        duration,
        width: dimensions.map(|(w, _)| w),
        height: dimensions.map(|(_, h)| h),
    };

    if json {
        println!("{}", serde_json::to_string_pretty(&report)?);
    } else {
        println!("File: {}", report.file.display());
        let secs = duration as u64;
        println!(
            "Duration: {:02}:{:02}:{:02} ({:.3}s)",
            secs / 3600,
            (secs / 60) % 60,
            secs % 60,
            duration
        );
        if let Some((width, height)) = dimensions {
            println!("Dimensions: {}x{}", width, height);
        }
    }

    Ok(())
}

fn pick_clips(dir: &Path, ext: &str, count: usize) -> Result<()> {
    let clips = media::pick_random_clips(dir, ext, count)?;

    if clips.len() < count {
        tracing::warn!(
            "Only {} clips with extension {:?} in {:?}",
            clips.len(),
            ext,
            dir
        );
    }

    for clip in &clips {
        println!("{}", clip.display());
    }

    Ok(())
}

fn check_tools(config_path: Option<&Path>) -> Result<()> {
    println!("Checking external tools...\n");

    let config = config::load_config_or_default(config_path)?;
    let tools = detect_tools(&config.engine);
    let mut all_ok = true;

    for tool in &tools {
        let status = if tool.available {
            "✓"
        } else {
            all_ok = false;
            "✗"
        };

        print!("{} {}", status, tool.name);

        if let Some(ref version) = tool.version {
            print!(" ({})", version);
        }

        if let Some(ref path) = tool.path {
            print!(" - {}", path.display());
        }

        println!();
    }

    println!();
    if all_ok {
        println!("All required tools are available!");
    } else {
        println!("Some tools are missing. Install ffmpeg and ffprobe to run jobs.");
    }

    Ok(())
}

fn validate_config(path: Option<&Path>) -> Result<()> {
    let (source, config) = match path {
        Some(p) => {
            println!("Validating config: {:?}", p);
            (p.display().to_string(), config::load_config(p)?)
        }
        None => {
            println!("No config file specified, using defaults");
            ("defaults".to_string(), config::Config::default())
        }
    };

    println!("✓ Configuration is valid ({})", source);
    println!("  ffmpeg: {}", config.engine.ffmpeg.display());
    println!("  ffprobe: {}", config.engine.ffprobe.display());
    println!("  Encoder: {}", config.engine.encoder);
    println!("  Temp dir: {}", config.engine.temp_dir.display());
    println!("  Frame rate: {}", config.engine.frame_rate);
    match config.engine.timeout_secs {
        Some(secs) => println!("  Timeout: {}s", secs),
        None => println!("  Timeout: none"),
    }

    Ok(())
}
