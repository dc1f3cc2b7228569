//! Forward dispersion: particles emitted at fixed sources, advected by
//! sampled winds, reflected at the ground.

use std::io;
use std::path::Path;

use serde::Serialize;

/// One emission source: easting, northing, height, unit mass.
#[derive(Debug, Clone, Copy, Serialize)]
pub struct Source {
    pub e: f64,
    pub n: f64,
    pub h: f64,
    pub mass: f64,
}

/// Dump rows are decimeter-quantized; positions beyond ~3.3 km are
/// outside the representable range and skipped.
const DUMP_RANGE_M: f64 = 3276.0;

#[derive(Debug, Serialize)]
struct PlumeRow {
    x_dm: i16,
    y_dm: i16,
    z_dm: i16,
}

pub struct Plume {
    x: Vec<f64>,
    y: Vec<f64>,
    z: Vec<f64>,
    m: Vec<f64>,
    alive: Vec<i16>,
    last_pos: usize,
    sources: Vec<Source>,
}

impl Plume {
    pub fn new(capacity: usize, sources: Vec<Source>) -> Self {
        assert!(capacity > 0);
        assert!(sources.len() <= super::MAX_SOURCES);
        Self {
            x: vec![0.0; capacity],
            y: vec![0.0; capacity],
            z: vec![0.0; capacity],
            m: vec![0.0; capacity],
            alive: vec![0; capacity],
            last_pos: capacity - 1,
            sources,
        }
    }

    pub fn capacity(&self) -> usize {
        self.x.len()
    }

    pub fn alive_count(&self) -> usize {
        self.alive.iter().filter(|&&a| a > 0).count()
    }

    /// Emit `per_step - 1` fresh particles per source, recycling the
    /// oldest slots when the ring is full.
    pub fn generate(&mut self, per_step: usize) {
        let n = self.capacity();
        for src in &self.sources {
            for _ in 1..per_step {
                let pos = (self.last_pos + 1) % n;
                self.x[pos] = src.e;
                self.y[pos] = src.n;
                self.z[pos] = src.h;
                self.m[pos] = src.mass;
                self.alive[pos] = 1;
                self.last_pos = pos;
            }
        }
    }

    /// Advance every live particle by one sampling step; winds are indexed
    /// per particle slot. Particles crossing the ground reflect.
    pub fn advect(&mut self, su: &[f64], sv: &[f64], sw: &[f64], freq: f64) {
        let dt = 1.0 / freq;
        for i in 0..self.capacity() {
            if self.alive[i] > 0 {
                self.x[i] += su[i] * dt;
                self.y[i] += sv[i] * dt;
                self.z[i] += sw[i] * dt;
                if self.z[i] < 0.0 {
                    self.z[i] = -self.z[i];
                }
            }
        }
    }

    /// CSV dump of live particles, decimeter-quantized, one `x,y,z` row
    /// per particle.
    pub fn dump(&self, path: &Path) -> io::Result<()> {
        let mut out = csv::WriterBuilder::new()
            .has_headers(false)
            .from_path(path)
            .map_err(io::Error::other)?;
        for i in 0..self.capacity() {
            if self.alive[i] > 0
                && self.x[i].abs() < DUMP_RANGE_M
                && self.y[i].abs() < DUMP_RANGE_M
                && self.z[i].abs() < DUMP_RANGE_M
            {
                out.serialize(PlumeRow {
                    x_dm: (self.x[i] * 10.0) as i16,
                    y_dm: (self.y[i] * 10.0) as i16,
                    z_dm: (self.z[i] * 10.0) as i16,
                })
                .map_err(io::Error::other)?;
            }
        }
        out.flush()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn one_source() -> Vec<Source> {
        vec![Source {
            e: 100.0,
            n: -50.0,
            h: 2.0,
            mass: 1.5,
        }]
    }

    #[test]
    fn generate_emits_per_step_minus_one() {
        let mut plume = Plume::new(64, one_source());
        plume.generate(10);
        assert_eq!(plume.alive_count(), 9);
        plume.generate(10);
        assert_eq!(plume.alive_count(), 18);
    }

    #[test]
    fn advect_moves_and_reflects() {
        let mut plume = Plume::new(4, one_source());
        plume.generate(2); // one particle, at slot 0
        let su = vec![10.0; 4];
        let sv = vec![-5.0; 4];
        let sw = vec![-30.0; 4];
        plume.advect(&su, &sv, &sw, 10.0);
        // dt = 0.1: x 100+1, y -50-0.5, z 2-3 = -1 reflected to 1.
        assert_eq!(plume.x[0], 101.0);
        assert_eq!(plume.y[0], -50.5);
        assert_eq!(plume.z[0], 1.0);
    }

    #[test]
    fn dead_slots_do_not_move() {
        let mut plume = Plume::new(4, one_source());
        plume.generate(2);
        let winds = vec![100.0; 4];
        plume.advect(&winds, &winds, &winds, 1.0);
        assert_eq!(plume.x[1], 0.0);
        assert_eq!(plume.y[3], 0.0);
    }

    #[test]
    fn dump_quantizes_and_filters() {
        use std::fs;
        let mut plume = Plume::new(8, one_source());
        plume.generate(3); // two particles
        // Push the second one out of dumping range.
        plume.x[1] = 5000.0;
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("plume.csv");
        plume.dump(&path).unwrap();
        let text = fs::read_to_string(&path).unwrap();
        let rows: Vec<&str> = text.lines().collect();
        assert_eq!(rows, vec!["1000,-500,20"]);
    }
}
