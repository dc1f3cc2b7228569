//! uSonic-3 (3D) data acquisition task.

use std::path::{Path, PathBuf};
use std::process;

use clap::Parser;
use log::error;

use sonic_acq::acquisition::{CommandPipe, SonicPort, Supervisor, VariantSpec};
use sonic_acq::config::{
    AcqConfig, DATA_PROCESSING_CONFIG, DATA_PROCESSING_EXEC, LOCK_FILE,
};
use sonic_acq::dispatch;
use sonic_acq::error::AcqError;

#[derive(Parser)]
#[command(name = "usa_usonic3", about = "uSonic-3 data acquisition task")]
struct Cli {
    /// Serial port device, e.g. /dev/ttyS0
    serial_device: String,
    /// INI configuration file
    config_path: PathBuf,
    /// Echo decoded frames to the log
    #[arg(long)]
    debug: bool,
}

fn main() {
    env_logger::init();
    let cli = Cli::try_parse().unwrap_or_else(|e| {
        let _ = e.print();
        process::exit(1);
    });
    if let Err(e) = run(cli) {
        error!("{}", e);
        process::exit(e.exit_code());
    }
}

fn run(cli: Cli) -> Result<(), AcqError> {
    let cfg = AcqConfig::load(&cli.config_path)?;
    let _lock = dispatch::acquire_instance_lock(Path::new(LOCK_FILE))?;
    dispatch::install_signal_handlers();

    let mut port = SonicPort::open(&cli.serial_device)?;
    port.configure_sonic(cfg.raw_per_sample, cfg.sampling_frequency, cfg.od_code_3d())?;

    let _reaper = dispatch::spawn_reaper();
    let cmd = CommandPipe::create_and_open(&Path::new(&cfg.data_path).join("cmd_server"))?;

    let spec = VariantSpec {
        model: cfg.sensor_model,
        raw_suffix: 'R',
        status_prefix: "UsaStatus",
        processor_exec: DATA_PROCESSING_EXEC.to_string(),
        processor_name: "eddy_cov".to_string(),
        processor_ini: Some(DATA_PROCESSING_CONFIG.to_string()),
        report_file: "eddy_cov.report",
        processing_interval: cfg.processing_interval,
    };
    let mut supervisor = Supervisor::new(cfg, spec, port, cmd, cli.debug)?;
    supervisor.run()
}
