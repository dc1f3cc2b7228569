//! Child post-processor dispatch and process housekeeping.
//!
//! The supervisor never waits on its children: they are spawned detached
//! and a dedicated reaper thread collects whatever terminated, ten
//! seconds at a time. The single-instance lock and the signal handlers
//! live here too.

use std::fs::{File, OpenOptions};
use std::io::{self, Write};
use std::os::fd::AsRawFd;
use std::os::unix::process::CommandExt;
use std::path::{Path, PathBuf};
use std::process::{Command, Stdio};
use std::sync::atomic::{AtomicBool, Ordering};
use std::thread;
use std::time::Duration;

use log::{error, info, warn};

use crate::error::AcqError;
use crate::timing::WallTime;

/// One post-processing run over a completed interval.
#[derive(Debug, Clone)]
pub struct ProcessingJob {
    pub executable: String,
    pub proc_name: String,
    /// Namelist passed to the 3D processor; the 2D one takes none.
    pub ini_file: Option<String>,
    pub raw_dir: PathBuf,
    pub activation: WallTime,
    pub interval_seconds: u32,
    pub fuse: i32,
    pub report_path: PathBuf,
}

/// Write the activation report, then start the processor detached.
///
/// The parent returns immediately; the reaper thread collects the child
/// whenever it terminates.
pub fn dispatch(job: &ProcessingJob) -> io::Result<()> {
    let stamp = job.activation.date_time_string();
    write_report(job, &stamp)?;
    info!("Proc: {}", stamp);

    let mut cmd = Command::new(&job.executable);
    cmd.arg0(&job.proc_name);
    if let Some(ini) = &job.ini_file {
        cmd.arg(ini);
    }
    cmd.arg(&job.raw_dir)
        .arg(&stamp)
        .arg(job.interval_seconds.to_string())
        .arg(job.fuse.to_string())
        .stdin(Stdio::null())
        .stdout(Stdio::null())
        .stderr(Stdio::null());
    // The Child handle is dropped without waiting; reaping happens in the
    // background thread.
    cmd.spawn().map(drop)
}

fn write_report(job: &ProcessingJob, stamp: &str) -> io::Result<()> {
    let mut report = File::create(&job.report_path)?;
    if job.ini_file.is_none() {
        // The 2D report leads with the executable identity.
        writeln!(report, "Executable:              {}", job.executable)?;
        writeln!(report, "Process name:            {}", job.proc_name)?;
        writeln!(report, "Raw data file:           {}", job.raw_dir.display())?;
    }
    writeln!(report, "Nominal activation time: {}", stamp)?;
    writeln!(report, "Raw data directory:      {}", job.raw_dir.display())?;
    writeln!(report, "Averaging time:          {}", job.interval_seconds)?;
    writeln!(report, "Fuse:                    {}", job.fuse)?;
    Ok(())
}

/// Zombie collector: sleep ten seconds, then non-blocking wait-any.
pub fn spawn_reaper() -> thread::JoinHandle<()> {
    thread::spawn(|| loop {
        thread::sleep(Duration::from_secs(10));
        unsafe {
            libc::waitpid(-1, std::ptr::null_mut(), libc::WNOHANG | libc::WUNTRACED);
        }
    })
}

/// Held for process lifetime; dropping it releases the lock.
pub struct InstanceLock {
    _file: File,
    path: PathBuf,
}

impl InstanceLock {
    pub fn path(&self) -> &Path {
        &self.path
    }
}

/// Take a write lock on the PID file; contention means another instance
/// is already running.
pub fn acquire_instance_lock(path: &Path) -> Result<InstanceLock, AcqError> {
    let mut file = OpenOptions::new()
        .read(true)
        .write(true)
        .create(true)
        .open(path)
        .map_err(|_| AcqError::LockContention(path.display().to_string()))?;

    let mut fl: libc::flock = unsafe { std::mem::zeroed() };
    fl.l_type = libc::F_WRLCK as libc::c_short;
    fl.l_whence = libc::SEEK_SET as libc::c_short;
    if unsafe { libc::fcntl(file.as_raw_fd(), libc::F_SETLK, &fl) } < 0 {
        return Err(AcqError::LockContention(path.display().to_string()));
    }

    file.set_len(0)?;
    writeln!(file, "{}", std::process::id())?;
    Ok(InstanceLock {
        _file: file,
        path: path.to_path_buf(),
    })
}

static SIGHUP_SEEN: AtomicBool = AtomicBool::new(false);

extern "C" fn on_sigterm(_signo: libc::c_int) {
    // Immediate exit; only async-signal-safe work here.
    unsafe { libc::_exit(0) }
}

extern "C" fn on_sighup(_signo: libc::c_int) {
    SIGHUP_SEEN.store(true, Ordering::Relaxed);
}

/// SIGTERM exits immediately; SIGHUP is remembered for the supervisor to
/// log on its next iteration.
pub fn install_signal_handlers() {
    unsafe {
        if libc::signal(libc::SIGTERM, on_sigterm as libc::sighandler_t) == libc::SIG_ERR {
            error!("Can't catch SIGTERM");
        }
        if libc::signal(libc::SIGHUP, on_sighup as libc::sighandler_t) == libc::SIG_ERR {
            error!("Can't catch SIGHUP");
        }
    }
}

/// Log and clear a pending SIGHUP, if any.
pub fn log_pending_sighup() {
    if SIGHUP_SEEN.swap(false, Ordering::Relaxed) {
        warn!("Got SIGHUP, and logging it only");
    }
}
