use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};

use clap::{Parser, Subcommand};
use spectra_core::{
    AppConfig, AudioEngine, AudioFrame, AutomationKind, FrameOutput, Orchestrator, ParamOwner,
    PlaybackClock, ProjectCodec, RenderGraph, RenderTarget, SpectraError,
};
use tracing_subscriber::EnvFilter;

fn main() -> spectra_core::Result<()> {
    init_tracing();

    let cli = Cli::parse();
    let config = load_config(cli.config.as_deref())?;

    match cli.command {
        Commands::Render {
            project,
            audio,
            duration,
            fps,
            output,
        } => run_render(
            config,
            project.as_deref(),
            audio.as_deref(),
            duration,
            fps,
            output.as_deref(),
        ),
        Commands::New { output, name } => run_new(&config, &output, name),
        Commands::Inspect { project } => run_inspect(&config, &project),
    }
}

fn load_config(path: Option<&Path>) -> spectra_core::Result<AppConfig> {
    match path {
        Some(path) => {
            let config = serde_json::from_str(&std::fs::read_to_string(path)?)?;
            tracing::info!(?path, "loaded configuration");
            Ok(config)
        }
        None => Ok(AppConfig::offline_defaults()),
    }
}

fn run_render(
    mut config: AppConfig,
    project: Option<&Path>,
    audio: Option<&Path>,
    duration: Option<f64>,
    fps: Option<u32>,
    output: Option<&Path>,
) -> spectra_core::Result<()> {
    if let Some(fps) = fps {
        config.render.fps = fps.max(1);
    }

    let mut engine = Orchestrator::new(config.render.resolution());
    if let Some(path) = project {
        let report = ProjectCodec::load_file(&mut engine, path)?;
        tracing::info!(?path, issues = report.issues.len(), "project ready");
    }

    let samples = match audio {
        Some(path) => {
            let (samples, rate) = read_wav(path)?;
            config.audio.sample_rate = rate;
            samples
        }
        None => Vec::new(),
    };
    let mut analyser = AudioEngine::new(config.audio.clone(), engine.settings().fft_size)?;

    let rate = f64::from(config.audio.sample_rate);
    let duration = duration.unwrap_or(if samples.is_empty() {
        5.0
    } else {
        samples.len() as f64 / rate
    });
    let frames = (duration.max(0.0) * f64::from(config.render.fps)).ceil() as u64;
    tracing::info!(frames, fps = config.render.fps, "rendering");

    let mut graph = RenderGraph::new();
    let mut log = output.map(JsonLines::create).transpose()?;

    let mut clock = PlaybackClock::at(0.0);
    engine.play(clock.time_seconds);
    for _ in 0..frames {
        let time = clock.time_seconds;
        let frame = if samples.is_empty() {
            AudioFrame::silent(analyser.fft_size())
        } else {
            let cursor = ((time * rate) as usize).min(samples.len());
            analyser.analyse(&samples[..cursor])?
        };

        let rendered = engine.update(time, frame, true);
        graph.render(rendered)?;
        if let Some(log) = log.as_mut() {
            log.render(rendered)?;
        }
        clock.step(config.render.fps);
    }
    if let Some(log) = log.as_mut() {
        log.flush()?;
    }
    engine.stop();

    tracing::info!(
        frames = graph.frames_rendered(),
        ops = graph.ops_rendered(),
        failures = graph.failures(),
        "render finished"
    );
    Ok(())
}

fn run_new(config: &AppConfig, output: &Path, name: Option<String>) -> spectra_core::Result<()> {
    let mut engine = Orchestrator::new(config.render.resolution());
    if let Some(name) = name {
        engine.settings_mut().project_name = name;
    }

    let scene = engine.add_scene("canvas")?;
    let ring = engine.add_item(scene, "spectrumRing")?;
    let pulse = engine.add_automation("math")?;
    if let Some(AutomationKind::Math(expression)) = engine
        .automations_mut()
        .get_mut(pulse)
        .map(|automation| automation.kind_mut())
    {
        expression.set_expression("1.1 + 0.05 * sin(t * 2.0)");
    }
    engine.bind(ParamOwner::Item(scene, ring), "scale", pulse)?;

    ProjectCodec::save(&engine, output)?;
    tracing::info!(?output, "starter project written");
    Ok(())
}

fn run_inspect(config: &AppConfig, project: &Path) -> spectra_core::Result<()> {
    let mut engine = Orchestrator::new(config.render.resolution());
    let report = ProjectCodec::load_file(&mut engine, project)?;

    println!("project: {}", engine.settings().project_name);
    println!("fft size: {}", engine.settings().fft_size);
    println!("automations: {}", report.automations);
    for layer in engine.graph().layers() {
        let items = layer.as_scene().map(|scene| scene.items().len()).unwrap_or(0);
        println!("  layer {} `{}` ({items} items)", layer.id(), layer.tag());
    }
    for issue in &report.issues {
        println!("issue: {issue}");
    }
    Ok(())
}

/// Reads a WAV file and downmixes it to mono `f32` samples.
fn read_wav(path: &Path) -> spectra_core::Result<(Vec<f32>, u32)> {
    let wav_err = |err: hound::Error| SpectraError::msg(format!("{}: {err}", path.display()));
    let mut reader = hound::WavReader::open(path).map_err(wav_err)?;
    let spec = reader.spec();

    let samples: Vec<f32> = match spec.sample_format {
        hound::SampleFormat::Float => reader
            .samples::<f32>()
            .collect::<Result<_, _>>()
            .map_err(wav_err)?,
        hound::SampleFormat::Int => {
            let scale = 1.0 / (1_i64 << (spec.bits_per_sample.max(1) - 1)) as f32;
            reader
                .samples::<i32>()
                .map(|sample| sample.map(|value| value as f32 * scale))
                .collect::<Result<_, _>>()
                .map_err(wav_err)?
        }
    };

    let channels = usize::from(spec.channels.max(1));
    let mono = samples
        .chunks(channels)
        .map(|frame| frame.iter().sum::<f32>() / frame.len() as f32)
        .collect();
    Ok((mono, spec.sample_rate))
}

/// Writes one JSON object per frame.
struct JsonLines {
    writer: BufWriter<File>,
}

impl JsonLines {
    fn create(path: &Path) -> spectra_core::Result<Self> {
        Ok(Self {
            writer: BufWriter::new(File::create(path)?),
        })
    }

    fn flush(&mut self) -> spectra_core::Result<()> {
        self.writer.flush()?;
        Ok(())
    }
}

impl RenderTarget for JsonLines {
    fn render(&mut self, frame: &FrameOutput) -> spectra_core::Result<()> {
        serde_json::to_writer(&mut self.writer, frame)?;
        self.writer.write_all(b"\n")?;
        Ok(())
    }
}

fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .try_init();
}

#[derive(Parser, Debug)]
#[command(author, version, about = "Audio-reactive visual engine", long_about = None)]
struct Cli {
    /// JSON file with audio and render settings.
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Drive a project offline and record the render instructions.
    Render {
        /// Project file to load; an empty project is used otherwise.
        #[arg(short, long)]
        project: Option<PathBuf>,
        /// WAV file feeding the analyser; silence otherwise.
        #[arg(short, long)]
        audio: Option<PathBuf>,
        /// Seconds to render. Defaults to the audio length, or five seconds.
        #[arg(short, long)]
        duration: Option<f64>,
        /// Frames per second.
        #[arg(long)]
        fps: Option<u32>,
        /// Destination for per-frame JSON lines.
        #[arg(short, long)]
        output: Option<PathBuf>,
    },
    /// Write a starter project with one ring scene.
    New {
        /// Path of the project file to create.
        output: PathBuf,
        /// Project name stored in the settings.
        #[arg(short, long)]
        name: Option<String>,
    },
    /// Load a project and print its layers and any load issues.
    Inspect {
        /// Path of the project file to read.
        project: PathBuf,
    },
}
