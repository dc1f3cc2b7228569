//! Periodic status snapshots: a human-readable text file and a sibling
//! binary file with the same fields packed sequentially in host order.

use std::fs::File;
use std::io::{self, BufWriter, Write};
use std::path::{Path, PathBuf};

use crate::timing::WallTime;

/// One status observation, published at every status interval.
#[derive(Debug, Clone, Copy)]
pub struct Status {
    pub uptime: f64,
    pub wall: WallTime,
    pub total: u32,
    pub valid: u32,
    /// Last decoded data values; the 2D variant publishes none.
    pub last_data: Option<[i16; 4]>,
}

pub struct StatusPublisher {
    txt_path: PathBuf,
    bin_path: PathBuf,
}

impl StatusPublisher {
    /// `prefix` is `UsaStatus` for the 3D variant, `Usa2DStatus` for 2D.
    pub fn new(dir: &Path, prefix: &str) -> Self {
        Self {
            txt_path: dir.join(format!("{prefix}.txt")),
            bin_path: dir.join(format!("{prefix}.bin")),
        }
    }

    pub fn publish(&self, status: &Status) -> io::Result<()> {
        self.write_text(status)?;
        self.write_binary(status)
    }

    fn write_text(&self, s: &Status) -> io::Result<()> {
        let mut out = BufWriter::new(File::create(&self.txt_path)?);
        writeln!(out, "[Timing]")?;
        writeln!(out, "Uptime = {:.6}", s.uptime)?;
        writeln!(out, "Sysclk = {}", s.wall.date_time_string())?;
        writeln!(out)?;
        writeln!(out, "[Packets]")?;
        writeln!(out, "Total = {}", s.total)?;
        writeln!(out, "Valid = {}", s.valid)?;
        if let Some(d) = s.last_data {
            writeln!(out, "Last data = {}, {}, {}, {}", d[0], d[1], d[2], d[3])?;
        }
        out.flush()
    }

    fn write_binary(&self, s: &Status) -> io::Result<()> {
        let mut out = BufWriter::new(File::create(&self.bin_path)?);
        out.write_all(&s.uptime.to_ne_bytes())?;
        for field in [
            s.wall.year,
            s.wall.month as i32,
            s.wall.day as i32,
            s.wall.hour as i32,
            s.wall.minute as i32,
            s.wall.second as i32,
        ] {
            out.write_all(&field.to_ne_bytes())?;
        }
        out.write_all(&s.total.to_ne_bytes())?;
        out.write_all(&s.valid.to_ne_bytes())?;
        if let Some(d) = s.last_data {
            for value in d {
                out.write_all(&value.to_ne_bytes())?;
            }
        }
        out.flush()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::timing::wall_from_epoch;

    fn status(last: Option<[i16; 4]>) -> Status {
        Status {
            uptime: 12.34,
            wall: wall_from_epoch(1_709_622_489),
            total: 100,
            valid: 97,
            last_data: last,
        }
    }

    #[test]
    fn text_snapshot_sections() {
        let dir = tempfile::tempdir().unwrap();
        let publisher = StatusPublisher::new(dir.path(), "UsaStatus");
        publisher.publish(&status(Some([100, -50, -10, 230]))).unwrap();
        let text = std::fs::read_to_string(dir.path().join("UsaStatus.txt")).unwrap();
        let lines: Vec<&str> = text.lines().collect();
        assert_eq!(lines[0], "[Timing]");
        assert_eq!(lines[1], "Uptime = 12.340000");
        assert_eq!(lines[2], "Sysclk = 2024-03-05 07:08:09");
        assert_eq!(lines[4], "[Packets]");
        assert_eq!(lines[5], "Total = 100");
        assert_eq!(lines[6], "Valid = 97");
        assert_eq!(lines[7], "Last data = 100, -50, -10, 230");
    }

    #[test]
    fn binary_snapshot_length() {
        let dir = tempfile::tempdir().unwrap();
        let publisher = StatusPublisher::new(dir.path(), "UsaStatus");
        publisher.publish(&status(Some([1, 2, 3, 4]))).unwrap();
        let bytes = std::fs::read(dir.path().join("UsaStatus.bin")).unwrap();
        // f64 + 6 x i32 + 2 x u32 + 4 x i16
        assert_eq!(bytes.len(), 8 + 24 + 8 + 8);

        let publisher = StatusPublisher::new(dir.path(), "Usa2DStatus");
        publisher.publish(&status(None)).unwrap();
        let bytes = std::fs::read(dir.path().join("Usa2DStatus.bin")).unwrap();
        assert_eq!(bytes.len(), 8 + 24 + 8);
    }

    #[test]
    fn two_d_text_omits_last_data() {
        let dir = tempfile::tempdir().unwrap();
        let publisher = StatusPublisher::new(dir.path(), "Usa2DStatus");
        publisher.publish(&status(None)).unwrap();
        let text = std::fs::read_to_string(dir.path().join("Usa2DStatus.txt")).unwrap();
        assert!(!text.contains("Last data"));
    }
}
