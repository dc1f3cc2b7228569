//! The acquisition control loop.
//!
//! One thread owns the serial port, the raw file, the sample ring and the
//! status files; every read, decode, write and append happens in sequence
//! here, so the raw file is strictly time-ordered and consumers always
//! observe a consistent ring cursor. The loop is paced by the blocking
//! serial read; bucket predicates on the fused wall clock fire the file
//! rotation, the child dispatch, the statistics and particle outputs and
//! the status snapshots.

use std::path::PathBuf;

use log::{error, info};
use rand::rngs::ThreadRng;

use crate::buffer::{SampleRing, Snapshot, WindSample};
use crate::config::AcqConfig;
use crate::decode::{decode_line, DataRecord, RecordKind, SonicModel, INVALID};
use crate::dispatch::{self, ProcessingJob};
use crate::error::AcqError;
use crate::stats;
use crate::timing::{wall_from_epoch, wall_now, MonotonicClock, TimeStep, WallTime};

use super::command::{Command, CommandPipe};
use super::raw_writer::HourlyRawWriter;
use super::serial::{LineRead, SonicPort};
use super::status::{Status, StatusPublisher};

const ONE_HOUR: u32 = 3600;
const PARTICLE_INTERVAL: u32 = 10;

/// What distinguishes the two acquisition binaries.
pub struct VariantSpec {
    pub model: SonicModel,
    pub raw_suffix: char,
    pub status_prefix: &'static str,
    pub processor_exec: String,
    pub processor_name: String,
    /// Namelist for the 3D post-processor; `None` selects the 2D report
    /// and argument shape.
    pub processor_ini: Option<String>,
    pub report_file: &'static str,
    /// Seconds between post-processor dispatches.
    pub processing_interval: u32,
}

/// Turbulence machinery, wired only for the 3D variant.
struct Turbulence {
    ring: SampleRing,
    snapshot: Snapshot,
    eddy_step: TimeStep,
    depths: Vec<f64>,
    report_path: PathBuf,
    window_dump_path: PathBuf,
    particles: Option<Particles>,
}

struct Particles {
    plume: crate::particles::Plume,
    footprint: crate::particles::Footprint,
    winds: WindSample,
    step: TimeStep,
    rng: ThreadRng,
    per_step: usize,
    initial_altitude: f64,
    footprint_depth: f64,
    wind_pool: usize,
    plume_path: PathBuf,
    footprint_path: PathBuf,
}

/// Packet counters and the last decoded values, reset at every status
/// publication.
struct PacketCounters {
    total: u32,
    valid: u32,
    last_data: [i16; 4],
}

impl PacketCounters {
    fn new() -> Self {
        Self {
            total: 0,
            valid: 0,
            last_data: [INVALID; 4],
        }
    }

    /// Update for one decoded record. Returns true exactly when the
    /// record is a wind quadruple with all four values valid; only those
    /// may feed the turbulence machinery.
    fn count(&mut self, model: SonicModel, rec: &DataRecord) -> bool {
        self.last_data = rec.values();
        let valid_wind =
            rec.kind == RecordKind::Wind && rec.values().iter().all(|&v| v > INVALID);
        match model {
            SonicModel::Usonic2 => {
                // The 2D total is counted per loop iteration by the
                // caller; every decoded record counts as valid.
                self.valid = self.valid.wrapping_add(1);
            }
            SonicModel::Usa1 | SonicModel::Usonic3 => {
                if rec.kind == RecordKind::Wind {
                    self.total = self.total.wrapping_add(1);
                    if valid_wind {
                        self.valid = self.valid.wrapping_add(1);
                    }
                }
            }
        }
        valid_wind
    }

    fn reset(&mut self) {
        self.total = 0;
        self.valid = 0;
    }
}

/// Everything that happens to a decoded record after the raw write:
/// counter bookkeeping, then the ring append and one particle advection
/// step for valid wind quadruples only. Gap markers carry -9999 sentinels
/// and analog blocks are not wind; neither may pollute the turbulence
/// window.
fn track_record(
    counters: &mut PacketCounters,
    turbulence: Option<&mut Turbulence>,
    model: SonicModel,
    rec: &DataRecord,
    mono: f64,
    freq: u32,
) {
    let valid_wind = counters.count(model, rec);
    if valid_wind {
        if let Some(turb) = turbulence {
            turb.ingest(rec, mono, freq);
        }
    }
}

pub struct Supervisor {
    cfg: AcqConfig,
    spec: VariantSpec,
    data_dir: PathBuf,
    debug: bool,

    clock: MonotonicClock,
    port: SonicPort,
    cmd: CommandPipe,
    writer: HourlyRawWriter,
    status: StatusPublisher,

    hour_step: TimeStep,
    proc_step: TimeStep,
    status_step: TimeStep,
    turbulence: Option<Turbulence>,

    counters: PacketCounters,
    just_started: bool,
}

impl Supervisor {
    /// Open the initial raw file and assemble the loop state. The serial
    /// port and command pipe are opened by the caller so their exit codes
    /// stay distinct.
    pub fn new(
        cfg: AcqConfig,
        spec: VariantSpec,
        port: SonicPort,
        cmd: CommandPipe,
        debug: bool,
    ) -> Result<Self, AcqError> {
        let data_dir = PathBuf::from(&cfg.data_path);
        let wall = wall_now(cfg.fuse);
        let writer = HourlyRawWriter::open(&data_dir, spec.raw_suffix, &wall)
            .map_err(AcqError::InitialRawFile)?;
        let status = StatusPublisher::new(&data_dir, spec.status_prefix);

        let turbulence = (spec.model != SonicModel::Usonic2).then(|| {
            let capacity = cfg.ring_capacity();
            Turbulence {
                ring: SampleRing::new(capacity),
                snapshot: Snapshot::new(capacity),
                eddy_step: TimeStep::new(cfg.eddy_interval),
                depths: cfg.avg_depths.clone(),
                report_path: data_dir.join("eddy_cov.dat"),
                window_dump_path: data_dir.join("sonic_window.bin"),
                particles: cfg.particles.enable.then(|| {
                    let p = &cfg.particles;
                    Particles {
                        plume: crate::particles::Plume::new(
                            p.max_particles,
                            p.sources.clone(),
                        ),
                        footprint: crate::particles::Footprint::new(
                            p.max_particles,
                            p.max_particles,
                        ),
                        winds: WindSample::new(p.max_particles),
                        step: TimeStep::new(PARTICLE_INTERVAL),
                        rng: rand::rng(),
                        per_step: p.per_step,
                        initial_altitude: p.initial_altitude,
                        footprint_depth: p.footprint_depth,
                        wind_pool: p.wind_pool,
                        plume_path: data_dir.join("plume.csv"),
                        footprint_path: data_dir.join("footprint.dat"),
                    }
                }),
            }
        });

        Ok(Self {
            hour_step: TimeStep::new(ONE_HOUR),
            proc_step: TimeStep::new(spec.processing_interval),
            status_step: TimeStep::new(cfg.status_interval),
            cfg,
            spec,
            data_dir,
            debug,
            clock: MonotonicClock::new(),
            port,
            cmd,
            writer,
            status,
            turbulence,
            counters: PacketCounters::new(),
            just_started: true,
        })
    }

    /// Run until the command pipe asks for a stop.
    pub fn run(&mut self) -> Result<(), AcqError> {
        loop {
            if !self.iterate()? {
                return Ok(());
            }
        }
    }

    /// One pass of the acquisition loop; `Ok(false)` means orderly stop.
    fn iterate(&mut self) -> Result<bool, AcqError> {
        dispatch::log_pending_sighup();

        // Command pipe first: a stop must win over a pending frame.
        if self.cmd.poll() == Some(Command::Stop) {
            self.writer.flush()?;
            info!("Stopped by external program through 'cmd_server' pipe");
            return Ok(false);
        }

        // Blocking read paces the loop; both stamps are taken right after.
        let read = self.port.read_line();
        let wall = wall_now(self.cfg.fuse);
        let mono = self.clock.now();

        if self.hour_step.advance(wall.epoch) && !self.just_started {
            self.writer.rotate(&wall)?;
        }

        if self.proc_step.advance(wall.epoch) && !self.just_started {
            // Flush so the processor sees everything up to the boundary.
            self.writer.flush()?;
            self.dispatch_processor();
        }

        if self.spec.model == SonicModel::Usonic2 {
            self.counters.total = self.counters.total.wrapping_add(1);
        }

        match read {
            LineRead::Line(line) => {
                let record =
                    decode_line(self.spec.model, wall.intra_hour(), &line, self.debug);
                if let Some(rec) = record {
                    self.accept_record(&rec, mono)?;
                }
            }
            LineRead::Empty => {}
            LineRead::Timeout => {
                // Reset the sonic and cycle the port; a failed reopen
                // ends the run.
                self.port.reset_cycle()?;
            }
        }

        self.run_turbulence(mono, wall.epoch);

        if self.status_step.advance(wall.epoch) && !self.just_started {
            self.publish_status(mono, &wall);
        }

        self.just_started = false;
        Ok(true)
    }

    fn accept_record(&mut self, rec: &DataRecord, mono: f64) -> Result<(), AcqError> {
        self.writer.write_record(&rec.fields)?;
        track_record(
            &mut self.counters,
            self.turbulence.as_mut(),
            self.spec.model,
            rec,
            mono,
            self.cfg.sampling_frequency,
        );
        Ok(())
    }

    fn dispatch_processor(&mut self) {
        let activation = wall_from_epoch(
            self.proc_step.bucket() - i64::from(self.spec.processing_interval),
        );
        let job = ProcessingJob {
            executable: self.spec.processor_exec.clone(),
            proc_name: self.spec.processor_name.clone(),
            ini_file: self.spec.processor_ini.clone(),
            raw_dir: self.data_dir.clone(),
            activation,
            interval_seconds: self.spec.processing_interval,
            fuse: self.cfg.fuse,
            report_path: self.data_dir.join(self.spec.report_file),
        };
        info!("About to start processing");
        if let Err(e) = dispatch::dispatch(&job) {
            // Spawn failure is recoverable: the next interval retries.
            error!("Post-processor dispatch failed: {}", e);
        }
    }

    fn run_turbulence(&mut self, mono: f64, epoch: i64) {
        let just_started = self.just_started;
        let z = self.cfg.anemometer_height;
        let Some(turb) = &mut self.turbulence else {
            return;
        };

        if turb.eddy_step.advance(epoch) && !just_started {
            turb.ring.snapshot_into(&mut turb.snapshot);
            match stats::compute(&turb.snapshot, mono, z, &turb.depths) {
                Ok(windows) => {
                    if let Err(e) = stats::write_report(&turb.report_path, &windows) {
                        error!("Statistics report not written: {}", e);
                    }
                }
                Err(e) => error!("Statistics pass failed: {}", e),
            }
            if let Err(e) = stats::write_snapshot(&turb.window_dump_path, &turb.snapshot) {
                error!("Snapshot dump not written: {}", e);
            }
        }

        if let Some(parts) = &mut turb.particles {
            if parts.step.advance(epoch) && !just_started {
                parts.plume.generate(parts.per_step);
                parts.footprint.seed(parts.initial_altitude);
                if let Err(e) = parts.plume.dump(&parts.plume_path) {
                    error!("Plume dump not written: {}", e);
                }
                if let Err(e) =
                    parts
                        .footprint
                        .dump(&parts.footprint_path, mono, parts.footprint_depth)
                {
                    error!("Footprint dump not written: {}", e);
                }
            }
        }
    }

    fn publish_status(&mut self, mono: f64, wall: &WallTime) {
        let snapshot = Status {
            uptime: mono,
            wall: *wall,
            total: self.counters.total,
            valid: self.counters.valid,
            last_data: (self.spec.model != SonicModel::Usonic2)
                .then_some(self.counters.last_data),
        };
        if let Err(e) = self.status.publish(&snapshot) {
            error!("Status snapshot not written: {}", e);
        }
        self.counters.reset();
    }
}

impl Turbulence {
    /// Feed one valid wind quadruple: append it to the ring and advance
    /// the particle engines by one sampling step.
    fn ingest(&mut self, rec: &DataRecord, mono: f64, freq: u32) {
        let [u, v, w, t] = rec.values();
        self.ring.append(mono, u, v, w, t);
        if let Some(parts) = &mut self.particles {
            parts.advect(&self.ring, freq, mono);
        }
    }
}

impl Particles {
    /// Advance both engines by one sampling step with a fresh random wind
    /// sub-sample; the plume adds the wind, the footprint subtracts it.
    fn advect(&mut self, ring: &SampleRing, freq: u32, mono: f64) {
        ring.sample_random_into(&mut self.rng, self.wind_pool, &mut self.winds);
        let f = f64::from(freq);
        self.plume
            .advect(&self.winds.u, &self.winds.v, &self.winds.w, f);
        self.footprint
            .advect_back(&self.winds.u, &self.winds.v, &self.winds.w, f, mono);
    }
}
