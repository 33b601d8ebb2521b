use std::fs;
use std::path::{Path, PathBuf};
use std::process::ExitCode;
use std::sync::Arc;

use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use clap_to_find::analysis::{ClapDetector, ClapModel, HeuristicClapModel, TriggerEvent};
use clap_to_find::audio::{self, load_wav, Pacing, SyntheticSource};
use clap_to_find::pipeline::{ClapPipeline, PipelineEvent, PipelineStatsSnapshot};
use clap_to_find::{init_logging, AppConfig};
use serde::Serialize;
use tokio::sync::broadcast::error::RecvError;

#[derive(Parser, Debug)]
#[command(
    name = "clap_cli",
    about = "Clap detection harness: offline WAV analysis and live microphone listening"
)]
struct Cli {
    /// JSON configuration file (defaults are used when omitted)
    #[arg(long, global = true)]
    config: Option<PathBuf>,
    /// ONNX clap model (requires the `onnx` feature); heuristic scorer otherwise
    #[arg(long, global = true)]
    model: Option<PathBuf>,
    /// Log at debug level instead of info
    #[arg(short, long, global = true)]
    verbose: bool,
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Run a WAV clip through the detector and print triggers as JSON lines
    Detect {
        #[arg(long)]
        wav: PathBuf,
        /// Also print every window score
        #[arg(long)]
        scores: bool,
        /// Replay through the threaded pipeline at real-time speed
        #[arg(long)]
        realtime: bool,
    },
    /// Listen to the microphone until Ctrl-C
    Listen {
        /// Input device name (platform default when omitted)
        #[arg(long)]
        device: Option<String>,
        /// Also print every window score
        #[arg(long)]
        scores: bool,
    },
    /// Print the effective configuration as JSON
    DumpConfig,
}

#[derive(Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
enum Line<'a> {
    Score {
        timestamp_ms: u64,
        score: f32,
        source: String,
    },
    Trigger(&'a TriggerEvent),
    Dropped {
        total: u64,
    },
    Summary {
        windows: u64,
        triggers: u64,
        #[serde(skip_serializing_if = "Option::is_none")]
        stats: Option<PipelineStatsSnapshot>,
    },
}

fn emit(line: &Line<'_>) {
    match serde_json::to_string(line) {
        Ok(json) => println!("{json}"),
        Err(err) => eprintln!("Error: failed to serialize output: {err}"),
    }
}

fn main() -> ExitCode {
    match run() {
        Ok(code) => code,
        Err(err) => {
            eprintln!("Error: {err:?}");
            ExitCode::from(1)
        }
    }
}

fn run() -> Result<ExitCode> {
    let cli = Cli::parse();
    init_logging(if cli.verbose {
        tracing::Level::DEBUG
    } else {
        tracing::Level::INFO
    });

    let config = load_config(cli.config.as_deref())?;

    match cli.command {
        Commands::Detect {
            wav,
            scores,
            realtime,
        } => {
            let model = build_model(&config, cli.model.as_deref())?;
            if realtime {
                run_replay(config, model, &wav, scores)
            } else {
                run_detect(&config, model, &wav, scores)
            }
        }
        Commands::Listen { device, scores } => {
            let model = build_model(&config, cli.model.as_deref())?;
            run_listen(config, model, device, scores)
        }
        Commands::DumpConfig => {
            println!("{}", serde_json::to_string_pretty(&config)?);
            Ok(ExitCode::from(0))
        }
    }
}

fn load_config(path: Option<&Path>) -> Result<AppConfig> {
    match path {
        Some(path) => {
            let json =
                fs::read_to_string(path).with_context(|| format!("reading {}", path.display()))?;
            AppConfig::from_json_str(&json)
                .with_context(|| format!("loading config {}", path.display()))
        }
        None => Ok(AppConfig::default()),
    }
}

#[cfg(feature = "onnx")]
fn build_model(config: &AppConfig, path: Option<&Path>) -> Result<Arc<dyn ClapModel>> {
    use clap_to_find::analysis::{ModelInput, OnnxClapModel};

    let Some(path) = path else {
        return Ok(Arc::new(HeuristicClapModel::new()));
    };
    let detection = &config.detection;
    let layout = &config.model;
    let (input, len) = if layout.stacked_frames > 0 {
        (
            ModelInput::StackedLogMel {
                frames: layout.stacked_frames,
            },
            detection.mel_bands,
        )
    } else if detection.mel_bands > 0 {
        (ModelInput::LogMel, detection.mel_bands)
    } else {
        (ModelInput::Spectrum, detection.window_size / 2 + 1)
    };
    let model = OnnxClapModel::load(path, input, len)
        .and_then(|model| model.with_output_index(layout.output_index))
        .with_context(|| format!("loading model {}", path.display()))?
        .with_logit_output(layout.output_is_logit);
    Ok(Arc::new(model))
}

#[cfg(not(feature = "onnx"))]
fn build_model(_config: &AppConfig, path: Option<&Path>) -> Result<Arc<dyn ClapModel>> {
    if let Some(path) = path {
        bail!(
            "cannot load {}: clap_cli was built without the `onnx` feature",
            path.display()
        );
    }
    Ok(Arc::new(HeuristicClapModel::new()))
}

fn load_clip(config: &AppConfig, wav: &Path) -> Result<Vec<f32>> {
    let clip = load_wav(wav)?;
    if clip.sample_rate != config.audio.sample_rate {
        bail!(
            "{} is {} Hz but the pipeline runs at {} Hz",
            wav.display(),
            clip.sample_rate,
            config.audio.sample_rate
        );
    }
    Ok(clip.samples)
}

fn run_detect(
    config: &AppConfig,
    model: Arc<dyn ClapModel>,
    wav: &Path,
    print_scores: bool,
) -> Result<ExitCode> {
    let samples = load_clip(config, wav)?;
    let mut detector = ClapDetector::new(config, model)?;
    let reports = detector
        .process_clip(&samples)
        .with_context(|| format!("processing {}", wav.display()))?;

    let mut triggers = 0u64;
    for report in &reports {
        if print_scores {
            emit(&Line::Score {
                timestamp_ms: report.score.timestamp_ms,
                score: report.score.score,
                source: format!("{:?}", report.source),
            });
        }
        if let Some(trigger) = &report.trigger {
            triggers += 1;
            emit(&Line::Trigger(trigger));
        }
    }

    emit(&Line::Summary {
        windows: reports.len() as u64,
        triggers,
        stats: None,
    });
    Ok(ExitCode::from(0))
}

/// Print one pipeline event; returns false once the session has ended
fn print_event(event: Result<PipelineEvent, RecvError>, print_scores: bool) -> bool {
    match event {
        Ok(PipelineEvent::Score(score)) => {
            if print_scores {
                emit(&Line::Score {
                    timestamp_ms: score.timestamp_ms,
                    score: score.score,
                    source: "pipeline".to_string(),
                });
            }
        }
        Ok(PipelineEvent::Triggered(trigger)) => emit(&Line::Trigger(&trigger)),
        Ok(PipelineEvent::FramesDropped { total }) => emit(&Line::Dropped { total }),
        Ok(PipelineEvent::Stopped { error }) => {
            if let Some(err) = error {
                eprintln!("Pipeline stopped: {err}");
            }
            return false;
        }
        Err(RecvError::Closed) => return false,
        Err(RecvError::Lagged(n)) => eprintln!("Warning: output lagged, {n} events skipped"),
    }
    true
}

fn summary(stats: PipelineStatsSnapshot) -> Line<'static> {
    Line::Summary {
        windows: stats.windows_analyzed,
        triggers: stats.triggers,
        stats: Some(stats),
    }
}

fn run_replay(
    config: AppConfig,
    model: Arc<dyn ClapModel>,
    wav: &Path,
    print_scores: bool,
) -> Result<ExitCode> {
    let samples = load_clip(&config, wav)?;
    let pipeline = ClapPipeline::new(config, model, Arc::new(|_: &TriggerEvent| {}))?;

    let mut rx = pipeline.subscribe();
    let printer = std::thread::spawn(move || while print_event(rx.blocking_recv(), print_scores) {});
    let source = SyntheticSource::from_clip(samples).with_pacing(Pacing::Realtime);
    pipeline.start(Box::new(source))?;
    let result = pipeline.wait();
    let _ = printer.join();

    result?;
    emit(&summary(pipeline.stats()));
    Ok(ExitCode::from(0))
}

fn run_listen(
    config: AppConfig,
    model: Arc<dyn ClapModel>,
    device: Option<String>,
    print_scores: bool,
) -> Result<ExitCode> {
    let source: Box<dyn clap_to_find::AudioSource> = match device {
        #[cfg(not(target_os = "android"))]
        Some(name) => Box::new(audio::CpalSource::with_device(name)),
        #[cfg(target_os = "android")]
        Some(_) => bail!("--device is not supported on Android"),
        None => audio::default_source(),
    };

    let pipeline = ClapPipeline::new(config, model, Arc::new(clap_to_find::LogSink))?;
    let mut rx = pipeline.subscribe();
    pipeline.start(source)?;
    eprintln!("Listening... press Ctrl-C to stop");

    let runtime = tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()
        .context("building tokio runtime")?;

    runtime.block_on(async {
        loop {
            tokio::select! {
                _ = tokio::signal::ctrl_c() => break,
                event = rx.recv() => {
                    if !print_event(event, print_scores) {
                        break;
                    }
                }
            }
        }
    });

    pipeline.stop()?;
    emit(&summary(pipeline.stats()));
    Ok(ExitCode::from(0))
}
