//! station.rs
//! Lifecycle controller: builds every channel and queue, starts the workers in
//! order and tears them down in order.
//!
//! Start-up: radio configured → (server) → queues + publishers → radio reader →
//! camera reader → status reporter.
//! Shutdown: flag cleared once → readers joined → publishers drain and join →
//! radio released → server stopped → summary exported.

use std::{
    collections::HashMap,
    io,
    net::SocketAddr,
    sync::{
        Arc,
        atomic::{AtomicBool, Ordering},
    },
    thread::{self, JoinHandle},
    time::{SystemTime, UNIX_EPOCH},
};

use log::{error, info, warn};
use thiserror::Error;

use crate::publish::{
    publisher::ChannelPublisher,
    queue::{QueueProducer, output_queue},
    router::{ChannelFanout, ChannelKind, RocketChannelSet, RocketRouter},
    sink::{LogSink, Sink, SinkError},
    transport::{TransportError, VisualizationServer},
};
use crate::receive::{
    camera::{Camera, CameraReader, ImageDirCamera},
    radio::{Radio, RadioError},
    radio_reader::RadioReader,
    simulated::{ReplayRadio, SimulatedRadio},
};
use crate::schema;
use crate::utils::{
    config::{ConfigError, GroundStationConfig, RadioSource},
    export::{export_summary_csv, log_status, spawn_status_reporter},
    metrics::StationMetrics,
};

pub const CAMERA_TOPIC: &str = "/camera/image_compressed";

#[derive(Debug, Error)]
pub enum StationError {
    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error("radio initialization failed: {0}")]
    Radio(#[from] RadioError),

    #[error("visualization server failed to start: {0}")]
    Transport(#[from] TransportError),

    #[error("log sink failed to open: {0}")]
    Sink(#[from] SinkError),

    #[error("failed to spawn worker thread: {0}")]
    Spawn(#[from] io::Error),
}

/// Build the configured radio source. Not yet configured.
pub fn build_radio(config: &GroundStationConfig) -> Result<Box<dyn Radio>, RadioError> {
    match config.radio_source {
        RadioSource::Simulated => {
            let mut radio = SimulatedRadio::new(config.rockets.clone(), config.packet_period);
            if config.corrupt_every > 0 {
                radio = radio.with_corruption(config.corrupt_every);
            }
            Ok(Box::new(radio))
        }
        RadioSource::Replay => {
            let path = config.replay_file.as_deref().ok_or_else(|| {
                RadioError::InvalidConfig("replay radio without a replay file".into())
            })?;
            let radio = ReplayRadio::from_file(path, config.packet_period)?.looping(config.replay_loop);
            Ok(Box::new(radio))
        }
    }
}

/// Open the camera if enabled. Failure degrades to running without one.
pub fn open_camera(config: &GroundStationConfig) -> Option<Box<dyn Camera>> {
    if !config.enable_camera {
        return None;
    }
    let dir = config.camera_dir.as_deref()?;
    match ImageDirCamera::open(dir, config.camera_fps) {
        Ok(cam) => Some(Box::new(cam)),
        Err(e) => {
            warn!("[Station] camera unavailable, continuing without it: {}", e);
            None
        }
    }
}

struct Worker<T> {
    name: String,
    handle: JoinHandle<T>,
}

impl<T> Worker<T> {
    fn join(self) -> Option<T> {
        match self.handle.join() {
            Ok(v) => Some(v),
            Err(_) => {
                error!("[Station] worker {} panicked", self.name);
                None
            }
        }
    }
}

pub struct GroundStation {
    config: GroundStationConfig,
    session: String,
    running: Arc<AtomicBool>,
    metrics: Arc<StationMetrics>,
    server: Option<VisualizationServer>,
    radio_reader: Option<Worker<Box<dyn Radio>>>,
    camera_reader: Option<Worker<Box<dyn Camera>>>,
    publishers: Vec<Worker<()>>,
    status: Option<JoinHandle<()>>,
    topics: Vec<String>,
    stopped: bool,
}

impl GroundStation {
    /// Start every worker. On error, whatever was already started is shut down
    /// before returning.
    pub fn start(
        config: GroundStationConfig,
        mut radio: Box<dyn Radio>,
        camera: Option<Box<dyn Camera>>,
        running: Arc<AtomicBool>,
    ) -> Result<Self, StationError> {
        config.validate()?;
        radio.configure(&config.radio)?;
        info!("[Station] radio configured: {:?}", config.radio);

        let server = if config.enable_visualization {
            Some(VisualizationServer::start(&config.server_name, config.server_addr)?)
        } else {
            None
        };
        if !config.enable_visualization && !config.enable_logging {
            warn!("[Station] visualization and logging both disabled, records will be discarded");
        }

        let mut station = Self {
            session: session_id(),
            config,
            running,
            metrics: Arc::new(StationMetrics::default()),
            server,
            radio_reader: None,
            camera_reader: None,
            publishers: Vec::new(),
            status: None,
            topics: Vec::new(),
            stopped: false,
        };

        // Every queue and its publisher exists before any reader can write to it.
        let mut table = HashMap::new();
        for rocket in station.config.rockets.clone() {
            let set = RocketChannelSet {
                telemetry: station.open_channel(&ChannelKind::Telemetry.topic_for(&rocket), ChannelKind::Telemetry.schema_name())?,
                location: station.open_channel(&ChannelKind::Location.topic_for(&rocket), ChannelKind::Location.schema_name())?,
                signal: station.open_channel(&ChannelKind::Signal.topic_for(&rocket), ChannelKind::Signal.schema_name())?,
            };
            table.insert(rocket, set);
        }
        let camera_channel = match camera {
            Some(cam) => Some((cam, station.open_channel(CAMERA_TOPIC, schema::names::COMPRESSED_IMAGE)?)),
            None => None,
        };

        let router = RocketRouter::new(table, station.metrics.clone());
        let reader = RadioReader::new(
            radio,
            router,
            station.running.clone(),
            station.metrics.clone(),
            station.config.radio_timeout,
        )
        .pinned_to(station.config.radio_core);
        station.radio_reader = Some(Worker {
            name: "radio-reader".into(),
            handle: thread::Builder::new()
                .name("radio-reader".into())
                .spawn(move || reader.run())?,
        });

        if let Some((cam, fanout)) = camera_channel {
            let reader = CameraReader::new(cam, fanout, station.running.clone(), station.metrics.clone());
            station.camera_reader = Some(Worker {
                name: "camera-reader".into(),
                handle: thread::Builder::new()
                    .name("camera-reader".into())
                    .spawn(move || reader.run())?,
            });
        }

        station.status = spawn_status_reporter(
            station.metrics.clone(),
            station.running.clone(),
            station.config.status_interval,
        );

        info!(
            "[Station] started: {} rockets, {} publishers, camera {}",
            station.config.rockets.len(),
            station.publishers.len(),
            if station.camera_reader.is_some() { "on" } else { "off" }
        );
        Ok(station)
    }

    /// One queue + publisher per sink subscribed to `topic`.
    fn open_channel(&mut self, topic: &str, schema_name: &str) -> Result<ChannelFanout, StationError> {
        let mut sinks: Vec<Box<dyn Sink>> = Vec::new();
        if let Some(server) = &self.server {
            sinks.push(Box::new(server.add_channel(topic, schema_name)));
        }
        if self.config.enable_logging {
            sinks.push(Box::new(LogSink::create(&self.config.log_dir, &self.session, topic)?));
        }

        let mut producers: Vec<QueueProducer> = Vec::with_capacity(sinks.len());
        for sink in sinks {
            let name = format!("{} -> {}", topic, sink.describe());
            let (producer, consumer) = output_queue(topic, self.config.queue_capacity);
            let publisher = ChannelPublisher::new(
                consumer,
                sink,
                self.running.clone(),
                self.config.publish_timeout,
                self.metrics.clone(),
            );
            let handle = thread::Builder::new()
                .name(format!("pub{}", topic.replace('/', "-")))
                .spawn(move || {
                    publisher.run();
                })?;
            self.publishers.push(Worker { name, handle });
            producers.push(producer);
        }

        self.topics.push(topic.to_string());
        Ok(ChannelFanout::new(topic, producers))
    }

    /// Orderly shutdown. Returns once every started worker has exited.
    /// Calling it again is a no-op.
    pub fn shutdown(&mut self) {
        if self.stopped {
            return;
        }
        self.stopped = true;
        self.running.store(false, Ordering::Release);
        info!("[Station] shutting down");

        let radio = self.radio_reader.take().and_then(Worker::join);
        if let Some(worker) = self.camera_reader.take() {
            worker.join();
        }
        if let Some(handle) = self.status.take() {
            let _ = handle.join();
        }
        for worker in self.publishers.drain(..) {
            worker.join();
        }

        if let Some(mut radio) = radio {
            radio.release();
        }
        if let Some(server) = self.server.as_mut() {
            server.stop();
        }

        let snapshot = self.metrics.snapshot();
        log_status(&snapshot);
        if self.config.enable_logging {
            if let Err(e) = export_summary_csv(&self.config.log_dir, &self.session, &snapshot) {
                warn!("[Station] summary export failed: {}", e);
            }
        }
        info!("[Station] stopped.");
    }

    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::Acquire)
    }

    pub fn running_flag(&self) -> Arc<AtomicBool> {
        self.running.clone()
    }

    pub fn metrics(&self) -> &Arc<StationMetrics> {
        &self.metrics
    }

    pub fn config(&self) -> &GroundStationConfig {
        &self.config
    }

    /// Prefix of every log file written by this run.
    pub fn session(&self) -> &str {
        &self.session
    }

    pub fn topics(&self) -> &[String] {
        &self.topics
    }

    pub fn publisher_count(&self) -> usize {
        self.publishers.len()
    }

    pub fn has_camera(&self) -> bool {
        self.camera_reader.is_some()
    }

    pub fn visualization_addr(&self) -> Option<SocketAddr> {
        self.server.as_ref().map(VisualizationServer::local_addr)
    }
}

impl Drop for GroundStation {
    fn drop(&mut self) {
        self.shutdown();
    }
}

fn session_id() -> String {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_secs()
        .to_string()
}
