// src/main.rs
mod gui;

use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::mpsc::{channel, Receiver};
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

use anyhow::{anyhow, Context, Result};
use clap::{Parser, ValueEnum};
use eframe::egui;
use log::{error, info, warn};

use serial_scope::drivers::{available_ports, write_frame_png, FramingPolicy, PlotStyle};
use serial_scope::render::LogSink;
use serial_scope::{
    open_link, render_once, AcquisitionEvent, ConnectionMode, DynController, RenderSettings,
    RenderTicker, ScopeConfig, WindowStore,
};

#[derive(Clone, Copy, Debug, ValueEnum)]
enum Framing {
    Line,
    Tokens,
}

#[derive(Parser, Debug)]
#[command(version, about = "Live plot of whitespace-delimited serial telemetry")]
struct Cli {
    /// JSON configuration file; flags below override it
    #[arg(short, long)]
    config: Option<PathBuf>,
    /// Serial device, e.g. /dev/ttyACM0 or COM4
    #[arg(short, long)]
    port: Option<String>,
    /// Use the built-in simulated device instead of a serial port
    #[arg(long)]
    simulate: bool,
    /// Run without the viewer, logging readouts
    #[arg(long)]
    headless: bool,
    /// Headless run time in seconds (default: until Ctrl-C)
    #[arg(long)]
    duration: Option<u64>,
    #[arg(long, value_enum)]
    framing: Option<Framing>,
    #[arg(long)]
    tokens_per_frame: Option<usize>,
    /// Window capacity in samples [100, 2000]
    #[arg(short, long)]
    window: Option<usize>,
    /// Moving-average length in samples
    #[arg(long)]
    smoothing: Option<usize>,
    /// Append every raw line to this file
    #[arg(long)]
    log: Option<PathBuf>,
    /// Write the last rendered frame as PNG on exit (headless only)
    #[arg(long)]
    export_png: Option<PathBuf>,
    /// Print detected serial ports and exit
    #[arg(long)]
    list_ports: bool,
}

impl Cli {
    fn resolve_config(&self) -> Result<ScopeConfig> {
        let mut config = match &self.config {
            Some(path) => ScopeConfig::load(path)
                .with_context(|| format!("loading config {}", path.display()))?,
            None => ScopeConfig::default(),
        };
        if let Some(port) = &self.port {
            config.port_name = port.clone();
        }
        if let Some(framing) = self.framing {
            config.framing = match framing {
                Framing::Line => FramingPolicy::Line,
                Framing::Tokens => FramingPolicy::TokenAccumulating,
            };
        }
        if let Some(n) = self.tokens_per_frame {
            config.tokens_per_frame = n;
        }
        if let Some(window) = self.window {
            config.window_capacity = window;
        }
        if let Some(smoothing) = self.smoothing {
            config.smoothing_window = smoothing;
        }
        if self.log.is_some() {
            config.log_path = self.log.clone();
        }
        config.validate().context("invalid configuration")?;
        Ok(config)
    }

    fn mode(&self) -> ConnectionMode {
        if self.simulate {
            ConnectionMode::Simulation
        } else {
            ConnectionMode::Hardware
        }
    }
}

fn build_controller(config: &ScopeConfig) -> Result<(DynController, Receiver<AcquisitionEvent>)> {
    let store = Arc::new(WindowStore::new(
        config.layout().num_channels(),
        config.window_capacity,
        config.sample_interval(),
    )?);
    let (tx, rx) = channel();
    let controller = DynController::new(config, store)?.with_events(tx);
    Ok((controller, rx))
}

fn run_headless(cli: &Cli, config: ScopeConfig) -> Result<()> {
    let (mut controller, events) = build_controller(&config)?;
    let (reader, writer) = open_link(&config, cli.mode())
        .with_context(|| format!("connecting to {}", config.port_name))?;
    controller.connect(reader, writer)?;

    let interrupted = Arc::new(AtomicBool::new(false));
    {
        let flag = Arc::clone(&interrupted);
        ctrlc::set_handler(move || flag.store(true, Ordering::SeqCst))
            .context("installing Ctrl-C handler")?;
    }

    let settings = RenderSettings::from_config(&config);
    let ticks_per_second = (1000 / config.render_interval_ms.max(1)).max(1);
    let mut ticker = RenderTicker::spawn(
        Arc::clone(controller.store()),
        settings.clone(),
        LogSink::new(ticks_per_second),
    );
    controller.start()?;

    let deadline = cli.duration.map(|s| Instant::now() + Duration::from_secs(s));
    'session: while !interrupted.load(Ordering::SeqCst) {
        if deadline.is_some_and(|d| Instant::now() >= d) {
            break;
        }
        for event in events.try_iter() {
            match event {
                AcquisitionEvent::LinkLost(reason) => {
                    error!("link lost: {reason}");
                    break 'session;
                }
                AcquisitionEvent::MalformedFrame { line, error } => {
                    warn!("malformed frame {line:?}: {error}")
                }
                other => info!("{other:?}"),
            }
        }
        thread::sleep(Duration::from_millis(50));
    }

    ticker.stop();
    if let Err(e) = controller.stop() {
        warn!("stop: {e}");
    }
    let stats = controller.stats();
    info!(
        "session done: {} lines, {} samples, {} malformed",
        stats.lines_read, stats.samples_accepted, stats.malformed_frames
    );
    if let Some(path) = &cli.export_png {
        let frame = render_once(controller.store(), &settings);
        write_frame_png(&frame, &PlotStyle::default(), path)
            .with_context(|| format!("exporting {}", path.display()))?;
        info!("wrote {}", path.display());
    }
    controller.disconnect();
    Ok(())
}

fn run_viewer(cli: &Cli, config: ScopeConfig) -> Result<()> {
    let (controller, events) = build_controller(&config)?;
    let mode = cli.mode();
    let viewport = egui::ViewportBuilder::default()
        .with_inner_size([1280.0, 860.0])
        .with_min_inner_size([900.0, 600.0])
        .with_title("serial-scope");
    let options = eframe::NativeOptions {
        viewport,
        ..Default::default()
    };
    eframe::run_native(
        "serial-scope",
        options,
        Box::new(move |_cc| Box::new(gui::ScopeApp::new(config, mode, controller, events))),
    )
    .map_err(|e| anyhow!("viewer failed: {e}"))
}

fn main() -> Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();
    let cli = Cli::parse();
    if cli.list_ports {
        let ports = available_ports()?;
        if ports.is_empty() {
            warn!("no serial ports found");
        }
        for port in ports {
            println!("{port}");
        }
        return Ok(());
    }
    let config = cli.resolve_config()?;
    if cli.headless {
        run_headless(&cli, config)
    } else {
        run_viewer(&cli, config)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn flags_override_defaults() {
        let cli = Cli::parse_from([
            "serial-scope",
            "--port",
            "COM7",
            "--framing",
            "line",
            "--tokens-per-frame",
            "3",
            "--window",
            "2000",
            "--simulate",
        ]);
        let config = cli.resolve_config().unwrap();
        assert_eq!(config.port_name, "COM7");
        assert_eq!(config.framing, FramingPolicy::Line);
        assert_eq!(config.layout().num_channels(), 3);
        assert_eq!(config.window_capacity, 2000);
        assert_eq!(cli.mode(), ConnectionMode::Simulation);
    }

    #[test]
    fn out_of_range_window_is_rejected() {
        let cli = Cli::parse_from(["serial-scope", "--window", "50"]);
        assert!(cli.resolve_config().is_err());
    }
}
