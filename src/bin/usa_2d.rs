//! uSonic-2 (2D) data acquisition task.

use std::path::{Path, PathBuf};
use std::process;

use clap::Parser;
use log::error;

use sonic_acq::acquisition::{CommandPipe, SonicPort, Supervisor, VariantSpec};
use sonic_acq::config::{AcqConfig, DATA_PROCESSING_2D_EXEC, LOCK_FILE_2D};
use sonic_acq::decode::SonicModel;
use sonic_acq::dispatch;
use sonic_acq::error::AcqError;

/// Output descriptor selecting the single UVTQ record stream.
const OD_CODE_2D: u32 = 2049;

#[derive(Parser)]
#[command(name = "usa_2d", about = "uSonic-2 data acquisition task")]
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
    let _lock = dispatch::acquire_instance_lock(Path::new(LOCK_FILE_2D))?;
    dispatch::install_signal_handlers();

    let mut port = SonicPort::open(&cli.serial_device)?;
    port.configure_sonic(cfg.raw_per_sample, cfg.sampling_frequency, OD_CODE_2D)?;

    let _reaper = dispatch::spawn_reaper();
    let cmd = CommandPipe::create_and_open(&Path::new(&cfg.data_path).join("cmd_server"))?;

    let spec = VariantSpec {
        model: SonicModel::Usonic2,
        raw_suffix: 'S',
        status_prefix: "Usa2DStatus",
        processor_exec: DATA_PROCESSING_2D_EXEC.to_string(),
        processor_name: "proc2d".to_string(),
        processor_ini: None,
        report_file: "proc2d.report",
        processing_interval: cfg.averaging_period,
    };
    let mut supervisor = Supervisor::new(cfg, spec, port, cmd, cli.debug)?;
    supervisor.run()
}
