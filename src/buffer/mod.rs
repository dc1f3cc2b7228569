//! Fixed-capacity ring of wind samples, kept as parallel arrays.
//!
//! One producer (the acquisition loop) appends; consumers take
//! chronological snapshots or random sub-samples into buffers they own.
//! Unwritten slots carry a timestamp of negative infinity so they can
//! never fall inside an averaging or footprint window.

use rand::Rng;

/// Chronologically ordered copy of the ring, oldest first.
///
/// Allocation belongs to the consumer; the same `Snapshot` is reused
/// across acquisition cycles.
#[derive(Debug, Clone)]
pub struct Snapshot {
    pub ts: Vec<f64>,
    pub u: Vec<i16>,
    pub v: Vec<i16>,
    pub w: Vec<i16>,
    pub t: Vec<i16>,
}

impl Snapshot {
    pub fn new(n: usize) -> Self {
        Self {
            ts: vec![f64::NEG_INFINITY; n],
            u: vec![0; n],
            v: vec![0; n],
            w: vec![0; n],
            t: vec![0; n],
        }
    }

    pub fn len(&self) -> usize {
        self.ts.len()
    }

    pub fn is_empty(&self) -> bool {
        self.ts.is_empty()
    }
}

/// One random wind sub-sample in SI units (m/s).
#[derive(Debug, Clone)]
pub struct WindSample {
    pub u: Vec<f64>,
    pub v: Vec<f64>,
    pub w: Vec<f64>,
}

impl WindSample {
    pub fn new(n: usize) -> Self {
        Self {
            u: vec![0.0; n],
            v: vec![0.0; n],
            w: vec![0.0; n],
        }
    }
}

pub struct SampleRing {
    ts: Vec<f64>,
    u: Vec<i16>,
    v: Vec<i16>,
    w: Vec<i16>,
    t: Vec<i16>,
    last_pos: usize,
    appended: u64,
}

impl SampleRing {
    pub fn new(capacity: usize) -> Self {
        assert!(capacity > 0);
        Self {
            ts: vec![f64::NEG_INFINITY; capacity],
            u: vec![0; capacity],
            v: vec![0; capacity],
            w: vec![0; capacity],
            t: vec![0; capacity],
            // First append lands on slot 0.
            last_pos: capacity - 1,
            appended: 0,
        }
    }

    pub fn capacity(&self) -> usize {
        self.ts.len()
    }

    /// Index of the most recently written slot.
    pub fn last_pos(&self) -> usize {
        self.last_pos
    }

    /// Number of appends performed so far.
    pub fn appended(&self) -> u64 {
        self.appended
    }

    pub fn append(&mut self, ts: f64, u: i16, v: i16, w: i16, t: i16) {
        let pos = (self.last_pos + 1) % self.capacity();
        self.ts[pos] = ts;
        self.u[pos] = u;
        self.v[pos] = v;
        self.w[pos] = w;
        self.t[pos] = t;
        self.last_pos = pos;
        self.appended += 1;
    }

    /// Copy the whole ring in time order, starting at the slot after the
    /// cursor. The timestamp array is copied on both branches.
    pub fn snapshot_into(&self, out: &mut Snapshot) {
        let n = self.capacity();
        assert_eq!(out.len(), n);
        let mut j = 0;
        for i in (self.last_pos + 1)..n {
            out.ts[j] = self.ts[i];
            out.u[j] = self.u[i];
            out.v[j] = self.v[i];
            out.w[j] = self.w[i];
            out.t[j] = self.t[i];
            j += 1;
        }
        for i in 0..=self.last_pos {
            out.ts[j] = self.ts[i];
            out.u[j] = self.u[i];
            out.v[j] = self.v[i];
            out.w[j] = self.w[i];
            out.t[j] = self.t[i];
            j += 1;
        }
    }

    pub fn snapshot(&self) -> Snapshot {
        let mut out = Snapshot::new(self.capacity());
        self.snapshot_into(&mut out);
        out
    }

    /// The most recent `size` entries in write order, without wrapping:
    /// the run is clamped at slot 0 when the cursor sits too close to it.
    pub fn sample_raw(&self, size: usize) -> Snapshot {
        let take = size.min(self.last_pos + 1);
        let first = self.last_pos + 1 - take;
        let mut out = Snapshot::new(take);
        out.ts.copy_from_slice(&self.ts[first..=self.last_pos]);
        out.u.copy_from_slice(&self.u[first..=self.last_pos]);
        out.v.copy_from_slice(&self.v[first..=self.last_pos]);
        out.w.copy_from_slice(&self.w[first..=self.last_pos]);
        out.t.copy_from_slice(&self.t[first..=self.last_pos]);
        out
    }

    /// Draw `out.u.len()` winds uniformly (with replacement) from the last
    /// `pool` writes, converting cm/s to m/s on the fly.
    pub fn sample_random_into<R: Rng>(&self, rng: &mut R, pool: usize, out: &mut WindSample) {
        let n = self.capacity();
        let pool = pool.clamp(1, n);
        for i in 0..out.u.len() {
            let offset = rng.random_range(0..pool);
            let idx = (self.last_pos + n - offset) % n;
            out.u[i] = f64::from(self.u[idx]) * 0.01;
            out.v[i] = f64::from(self.v[idx]) * 0.01;
            out.w[i] = f64::from(self.w[idx]) * 0.01;
        }
    }
}
