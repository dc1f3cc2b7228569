//! Hour-bucketed raw record file.
//!
//! One file per wall-clock hour, `YYYYMMDD.HHR` for the 3D variant and
//! `.HHS` for the 2D. Records are five 16-bit integers, packed tight,
//! little-endian; the format never crosses hosts but the byte order is
//! fixed so offline readers have one answer.

use std::fs::{File, OpenOptions};
use std::io::{self, BufWriter, Write};
use std::path::{Path, PathBuf};

use log::info;

use crate::timing::WallTime;

pub struct HourlyRawWriter {
    base: PathBuf,
    suffix: char,
    out: BufWriter<File>,
    path: PathBuf,
}

impl HourlyRawWriter {
    /// Open (append) the file for the hour `wall` falls in.
    pub fn open(base: &Path, suffix: char, wall: &WallTime) -> io::Result<Self> {
        let path = Self::path_for(base, suffix, wall);
        let out = BufWriter::new(
            OpenOptions::new().create(true).append(true).open(&path)?,
        );
        Ok(Self {
            base: base.to_path_buf(),
            suffix,
            out,
            path,
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn path_for(base: &Path, suffix: char, wall: &WallTime) -> PathBuf {
        base.join(format!(
            "{:04}{:02}{:02}.{:02}{}",
            wall.year, wall.month, wall.day, wall.hour, suffix
        ))
    }

    /// Close the current hour and open the next.
    pub fn rotate(&mut self, wall: &WallTime) -> io::Result<()> {
        self.out.flush()?;
        let path = Self::path_for(&self.base, self.suffix, wall);
        self.out = BufWriter::new(
            OpenOptions::new().create(true).append(true).open(&path)?,
        );
        info!("Raw file rotated to {}", path.display());
        self.path = path;
        Ok(())
    }

    pub fn write_record(&mut self, record: &[i16; 5]) -> io::Result<()> {
        let mut bytes = [0u8; 10];
        for (chunk, value) in bytes.chunks_exact_mut(2).zip(record.iter()) {
            chunk.copy_from_slice(&value.to_le_bytes());
        }
        self.out.write_all(&bytes)
    }

    pub fn flush(&mut self) -> io::Result<()> {
        self.out.flush()
    }
}
