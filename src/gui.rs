// src/gui.rs
use std::sync::mpsc::Receiver;
use std::sync::Arc;
use std::time::Instant;

use eframe::egui;
use egui::Color32;
use egui_plot::{Legend, Line, Plot, PlotPoints};

use serial_scope::drivers::buffer::{MAX_WINDOW_CAPACITY, MIN_WINDOW_CAPACITY};
use serial_scope::drivers::available_ports;
use serial_scope::{
    open_link, render_once, AcquisitionEvent, ConnectionMode, DynController, LinkState,
    RenderFrame, RenderSettings, ScopeConfig, WindowStore,
};

const TRACE_COLORS: [Color32; 4] = [
    Color32::RED,
    Color32::GREEN,
    Color32::from_rgb(60, 120, 255),
    Color32::from_rgb(160, 32, 240),
];

pub struct ScopeApp {
    config: ScopeConfig,
    connection_mode: ConnectionMode,
    known_ports: Vec<String>,

    controller: DynController,
    store: Arc<WindowStore>,
    events: Receiver<AcquisitionEvent>,

    settings: RenderSettings,
    capacity: usize,
    frame: RenderFrame,
    last_tick: Instant,

    log_messages: Vec<String>,
}

impl ScopeApp {
    pub fn new(
        config: ScopeConfig,
        connection_mode: ConnectionMode,
        controller: DynController,
        events: Receiver<AcquisitionEvent>,
    ) -> Self {
        let store = Arc::clone(controller.store());
        let settings = RenderSettings::from_config(&config);
        Self {
            capacity: store.capacity(),
            known_ports: available_ports().unwrap_or_default(),
            connection_mode,
            controller,
            store,
            events,
            settings,
            frame: RenderFrame::default(),
            last_tick: Instant::now(),
            log_messages: vec!["serial-scope ready.".to_owned()],
            config,
        }
    }

    fn log(&mut self, msg: &str) {
        self.log_messages.push(format!("> {}", msg));
        if self.log_messages.len() > 8 {
            self.log_messages.remove(0);
        }
    }

    fn connect(&mut self) {
        match open_link(&self.config, self.connection_mode) {
            Ok((reader, writer)) => match self.controller.connect(reader, writer) {
                Ok(()) => self.log("Connected"),
                Err(e) => self.log(&format!("Connect failed: {e}")),
            },
            Err(e) => self.log(&format!("Connect failed: {e}")),
        }
    }

    fn toggle_stream(&mut self) {
        let result = if self.controller.is_running() {
            self.controller.stop()
        } else {
            self.controller.start()
        };
        if let Err(e) = result {
            self.log(&format!("Link error: {e}"));
        }
    }

    fn drain_events(&mut self) {
        let mut malformed = 0usize;
        let mut last_bad = None;
        while let Ok(event) = self.events.try_recv() {
            match event {
                AcquisitionEvent::Started => self.log("Stream started"),
                AcquisitionEvent::Stopped => self.log("Stream stopped"),
                AcquisitionEvent::LinkLost(reason) => self.log(&format!("Link lost: {reason}")),
                AcquisitionEvent::MalformedFrame { line, error } => {
                    malformed += 1;
                    last_bad = Some(format!("{line:?} ({error})"));
                }
            }
        }
        if let Some(last) = last_bad {
            self.log(&format!("Dropped {malformed} malformed frame(s), last {last}"));
        }
    }

    fn side_panel(&mut self, ui: &mut egui::Ui, state: LinkState) {
        ui.add_space(10.0);
        ui.heading("serial-scope");
        ui.label("Live telemetry");
        ui.separator();

        let connected = state != LinkState::Disconnected;
        ui.add_enabled_ui(!connected, |ui| {
            ui.horizontal(|ui| {
                ui.selectable_value(&mut self.connection_mode, ConnectionMode::Simulation, "SIM");
                ui.selectable_value(&mut self.connection_mode, ConnectionMode::Hardware, "SERIAL");
            });
            if self.connection_mode == ConnectionMode::Hardware {
                ui.horizontal(|ui| {
                    ui.label("Port");
                    ui.text_edit_singleline(&mut self.config.port_name);
                });
                egui::ComboBox::from_id_source("ports")
                    .selected_text("Detected ports")
                    .show_ui(ui, |ui| {
                        for port in &self.known_ports {
                            ui.selectable_value(&mut self.config.port_name, port.clone(), port);
                        }
                    });
                if ui.button("Rescan").clicked() {
                    self.known_ports = available_ports().unwrap_or_default();
                }
            }
        });

        let btn_txt = if connected { "DISCONNECT" } else { "CONNECT" };
        if ui.button(btn_txt).clicked() {
            if connected {
                self.controller.disconnect();
                self.log("Disconnected");
            } else {
                self.connect();
            }
        }
        if connected {
            let stream_btn = if state == LinkState::Streaming {
                "STOP STREAM"
            } else {
                "START STREAM"
            };
            if ui.button(stream_btn).clicked() {
                self.toggle_stream();
            }
        }

        ui.add_space(20.0);
        ui.label("WINDOW");
        let slider = ui.add(
            egui::Slider::new(&mut self.capacity, MIN_WINDOW_CAPACITY..=MAX_WINDOW_CAPACITY)
                .text("samples"),
        );
        // Resizing drops history, so only apply once the user lets go.
        if slider.drag_released() || (slider.changed() && !slider.dragged()) {
            match self.store.resize(self.capacity) {
                Ok(()) => self.log(&format!("Window set to {} samples", self.capacity)),
                Err(e) => self.log(&e.to_string()),
            }
        }
        ui.checkbox(&mut self.settings.smoothing_enabled, "Moving average");
        ui.add(
            egui::DragValue::new(&mut self.settings.smoothing_window)
                .clamp_range(1..=MAX_WINDOW_CAPACITY)
                .prefix("length: "),
        );

        ui.add_space(20.0);
        ui.separator();
        ui.label("READOUT");
        if let Some(latest) = &self.frame.latest {
            egui::Grid::new("readout").striped(true).show(ui, |ui| {
                for (series, value) in self.frame.series.iter().zip(latest) {
                    ui.label(&series.label);
                    ui.monospace(format!("{value:>12.4}"));
                    ui.end_row();
                }
            });
        } else {
            ui.label("No samples yet.");
        }
        let stats = self.controller.stats();
        ui.small(format!(
            "lines {}  samples {}  malformed {}",
            stats.lines_read, stats.samples_accepted, stats.malformed_frames
        ));

        ui.add_space(10.0);
        egui::ScrollArea::vertical().max_height(120.0).show(ui, |ui| {
            for m in &self.log_messages {
                ui.monospace(m);
            }
        });
    }

    fn plots(&self, ui: &mut egui::Ui) {
        if self.frame.series.is_empty() {
            ui.label("Connect first.");
            return;
        }
        let rows = self.frame.series.len() as f32;
        let height = (ui.available_height() / rows - 8.0).max(60.0);
        for (idx, series) in self.frame.series.iter().enumerate() {
            let points: Vec<[f64; 2]> = series
                .x
                .iter()
                .zip(&series.y)
                .map(|(&x, &y)| [x, y])
                .collect();
            let color = TRACE_COLORS[idx % TRACE_COLORS.len()];
            Plot::new(format!("channel_plot_{idx}"))
                .height(height)
                .legend(Legend::default())
                .allow_scroll(false)
                .auto_bounds_x()
                .auto_bounds_y()
                .show(ui, |plot_ui| {
                    plot_ui.line(
                        Line::new(PlotPoints::new(points))
                            .name(&series.label)
                            .color(color),
                    );
                });
        }
    }
}

impl eframe::App for ScopeApp {
    fn update(&mut self, ctx: &egui::Context, _frame: &mut eframe::Frame) {
        self.drain_events();
        let state = self.controller.poll();

        // Render tick: driven by repaint scheduling instead of a thread.
        if self.last_tick.elapsed() >= self.settings.interval {
            self.frame = render_once(&self.store, &self.settings);
            self.last_tick = Instant::now();
        }
        ctx.request_repaint_after(self.settings.interval);

        ctx.set_visuals(egui::Visuals::dark());

        egui::SidePanel::left("controls").min_width(260.0).show(ctx, |ui| {
            self.side_panel(ui, state);
        });
        egui::CentralPanel::default().show(ctx, |ui| {
            if self.frame.smoothed {
                ui.label(format!(
                    "Moving average over {} samples",
                    self.settings.smoothing_window
                ));
            }
            self.plots(ui);
        });
    }
}
