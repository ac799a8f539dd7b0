use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use beep_player::audio::{render_offline, BeatClock, WaveformSource};
use beep_player::engine::{AudioBackend, CpalBackend, TransportController};
use beep_player::{AppConfig, RenderStrategy};
use clap::{Parser, Subcommand, ValueEnum};
use tokio::sync::broadcast::error::RecvError;

#[derive(Parser, Debug)]
#[command(name = "beep_cli", about = "Sample-accurate metronome player")]
struct Cli {
    /// JSON config file (defaults to assets/beep_config.json)
    #[arg(long)]
    config: Option<PathBuf>,
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Play on the default output device and print beat events as JSON lines
    Play {
        #[arg(long, default_value_t = 120.0)]
        bpm: f64,
        /// Beep asset (WAV or raw 16-bit PCM); the synthesized tone is used if absent
        #[arg(long)]
        beep: Option<PathBuf>,
        /// Stop after this many seconds (runs until Ctrl-C otherwise)
        #[arg(long)]
        seconds: Option<f64>,
        #[arg(long, value_enum)]
        strategy: Option<StrategyArg>,
        /// Mute after this many seconds
        #[arg(long)]
        mute_at: Option<f64>,
        /// Unmute after this many seconds
        #[arg(long)]
        unmute_at: Option<f64>,
    },
    /// Pre-render a number of beats to a WAV file
    Render {
        #[arg(long, default_value_t = 120.0)]
        bpm: f64,
        #[arg(long)]
        beep: Option<PathBuf>,
        #[arg(long, default_value_t = 16)]
        beats: u32,
        #[arg(long, default_value_t = 44100)]
        sample_rate: u32,
        #[arg(long)]
        output: PathBuf,
    },
}

#[derive(Clone, Copy, Debug, ValueEnum)]
enum StrategyArg {
    Streaming,
    Offline,
    Lookahead,
}

impl From<StrategyArg> for RenderStrategy {
    fn from(arg: StrategyArg) -> Self {
        match arg {
            StrategyArg::Streaming => RenderStrategy::Streaming,
            StrategyArg::Offline => RenderStrategy::Offline,
            StrategyArg::Lookahead => RenderStrategy::Lookahead,
        }
    }
}

#[tokio::main]
async fn main() -> ExitCode {
    tracing_subscriber::fmt::init();

    match run().await {
        Ok(code) => code,
        Err(err) => {
            eprintln!("Error: {err:?}");
            ExitCode::from(1)
        }
    }
}

async fn run() -> Result<ExitCode> {
    let cli = Cli::parse();
    let config = match &cli.config {
        Some(path) => AppConfig::load_from_file(path),
        None => AppConfig::load(),
    };

    match cli.command {
        Commands::Play {
            bpm,
            beep,
            seconds,
            strategy,
            mute_at,
            unmute_at,
        } => {
            let mut config = config;
            if let Some(strategy) = strategy {
                config.render.strategy = strategy.into();
            }
            run_play(config, bpm, beep, seconds, mute_at, unmute_at).await
        }
        Commands::Render {
            bpm,
            beep,
            beats,
            sample_rate,
            output,
        } => run_render(&config, bpm, beep, beats, sample_rate, output),
    }
}

async fn run_play(
    config: AppConfig,
    bpm: f64,
    beep: Option<PathBuf>,
    seconds: Option<f64>,
    mute_at: Option<f64>,
    unmute_at: Option<f64>,
) -> Result<ExitCode> {
    let backend: Arc<dyn AudioBackend> = Arc::new(CpalBackend::new());
    let transport = Arc::new(TransportController::new(backend, config));
    let mut beats = transport.subscribe_beats();

    transport
        .start(bpm, beep.as_deref())
        .context("starting transport")?;

    for (at, muted) in [(mute_at, true), (unmute_at, false)] {
        if let Some(at) = at {
            let transport = Arc::clone(&transport);
            tokio::spawn(async move {
                tokio::time::sleep(Duration::from_secs_f64(at.max(0.0))).await;
                transport.mute(muted);
            });
        }
    }

    let deadline = async {
        match seconds {
            Some(secs) => tokio::time::sleep(Duration::from_secs_f64(secs.max(0.0))).await,
            None => std::future::pending::<()>().await,
        }
    };
    tokio::pin!(deadline);

    loop {
        tokio::select! {
            _ = &mut deadline => break,
            _ = tokio::signal::ctrl_c() => break,
            event = beats.recv() => match event {
                Ok(event) => println!("{}", serde_json::to_string(&event)?),
                Err(RecvError::Lagged(skipped)) => {
                    tracing::warn!("[beep_cli] Skipped {} beat events", skipped);
                }
                Err(RecvError::Closed) => break,
            },
        }
    }

    transport.stop().context("stopping transport")?;
    Ok(ExitCode::from(0))
}

fn run_render(
    config: &AppConfig,
    bpm: f64,
    beep: Option<PathBuf>,
    beats: u32,
    sample_rate: u32,
    output: PathBuf,
) -> Result<ExitCode> {
    let resolved = WaveformSource::resolve(beep.as_deref(), &config.tone, sample_rate);
    let waveform = Arc::new(resolved.waveform);
    let clock = BeatClock::new(bpm, sample_rate as f64, waveform.len())?;
    let samples = render_offline(&waveform, clock, beats, false);

    let spec = hound::WavSpec {
        channels: 1,
        sample_rate,
        bits_per_sample: 16,
        sample_format: hound::SampleFormat::Int,
    };
    let mut writer = hound::WavWriter::create(&output, spec)
        .with_context(|| format!("creating {}", output.display()))?;
    for sample in &samples {
        writer.write_sample((sample.clamp(-1.0, 1.0) * i16::MAX as f32) as i16)?;
    }
    writer
        .finalize()
        .with_context(|| format!("writing {}", output.display()))?;

    println!(
        "{}",
        serde_json::json!({
            "output": output.display().to_string(),
            "beats": beats,
            "samples": samples.len(),
            "beatPeriodSamples": clock.beat_period_samples(),
        })
    );
    Ok(ExitCode::from(0))
}
