//! Serial link to the sonic anemometer.
//!
//! 9600 8N1, no flow control, a five-second read timeout. Lines are
//! assembled byte by byte up to the `0x0A` terminator; trailing CR/LF are
//! stripped before the decoder sees the buffer.

use std::io::{self, Read, Write};
use std::time::Duration;

use log::{error, info};
use serialport::{DataBits, FlowControl, Parity, SerialPort, StopBits};

use crate::error::AcqError;

pub const SONIC_BAUD: u32 = 9600;

const READ_TIMEOUT: Duration = Duration::from_secs(5);
const LINE_TERMINATOR: u8 = 0x0A;
const MAX_LINE: usize = 64;

/// Instrument reset string sent before a port cycle.
pub const RESET_COMMAND: &str = "RS\r";

/// Outcome of one line read.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LineRead {
    /// A line arrived; terminators already stripped.
    Line(Vec<u8>),
    /// Terminator with no payload.
    Empty,
    /// Nothing arrived within the timeout.
    Timeout,
}

pub struct SonicPort {
    path: String,
    port: Box<dyn SerialPort>,
}

impl SonicPort {
    pub fn open(path: &str) -> Result<Self, AcqError> {
        let port = serialport::new(path, SONIC_BAUD)
            .data_bits(DataBits::Eight)
            .parity(Parity::None)
            .stop_bits(StopBits::One)
            .flow_control(FlowControl::None)
            .timeout(READ_TIMEOUT)
            .open()
            .map_err(|source| AcqError::SerialOpen {
                port: path.to_string(),
                source,
            })?;
        Ok(Self {
            path: path.to_string(),
            port,
        })
    }

    pub fn send_str(&mut self, line: &str) -> io::Result<()> {
        self.port.write_all(line.as_bytes())
    }

    /// Send the instrument configuration sequence: averaging off, raw
    /// count per sample, sampling frequency, output descriptor.
    pub fn configure_sonic(
        &mut self,
        raw_per_sample: u32,
        sampling_frequency: u32,
        od_code: u32,
    ) -> io::Result<()> {
        self.send_str("AT=0\r\n")?;
        self.send_str(&format!("AV={}\r\n", raw_per_sample))?;
        self.send_str(&format!(
            "SF={}\r\n",
            sampling_frequency * 1000 * raw_per_sample
        ))?;
        self.send_str(&format!("OD={}\r\n", od_code))
    }

    /// Read one line, bounded by the internal buffer size.
    pub fn read_line(&mut self) -> LineRead {
        let mut line: Vec<u8> = Vec::with_capacity(MAX_LINE);
        let mut byte = [0u8; 1];
        loop {
            match self.port.read(&mut byte) {
                Ok(1) => {
                    if byte[0] == LINE_TERMINATOR {
                        break;
                    }
                    line.push(byte[0]);
                    if line.len() >= MAX_LINE - 2 {
                        break;
                    }
                }
                Ok(_) => return LineRead::Timeout,
                Err(e) if e.kind() == io::ErrorKind::TimedOut => return LineRead::Timeout,
                Err(e) => {
                    error!("Serial read on {} failed: {}", self.path, e);
                    return LineRead::Timeout;
                }
            }
        }
        while line.last() == Some(&b'\r') {
            line.pop();
        }
        if line.is_empty() {
            LineRead::Empty
        } else {
            LineRead::Line(line)
        }
    }

    /// Timeout recovery: reset the instrument, then cycle the port.
    pub fn reset_cycle(&mut self) -> Result<(), AcqError> {
        if let Err(e) = self.send_str(RESET_COMMAND) {
            error!("Reset command on {} failed: {}", self.path, e);
        }
        let reopened = Self::open(&self.path)?;
        self.port = reopened.port;
        info!("Serial port {} cycled after timeout", self.path);
        Ok(())
    }
}
