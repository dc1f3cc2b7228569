//! Multi-window turbulence statistics over a ring snapshot.
//!
//! Samples are assigned to the innermost window whose depth still covers
//! them, partial sums are then cumulated outward so window `i` covers
//! everything within `depths[i]` of `now`. Per window: first and second
//! moments, a double rotation of the wind frame (yaw zeroes the mean
//! crosswind, pitch by the covariance half-angle), and the derived
//! micrometeorological scalars u*, H0 and 1/L.

use std::f64::consts::PI;
use std::fs::File;
use std::io::{self, BufWriter, Write};
use std::path::Path;

use crate::buffer::Snapshot;
use crate::error::AcqError;

/// Hard cap on the number of averaging windows.
pub const MAX_WINDOWS: usize = 16;

/// Sentinel for scalars of an empty window.
pub const MISSING: f64 = -9999.9;

/// Derived quantities for one averaging window.
#[derive(Debug, Clone, Copy)]
pub struct WindowStats {
    pub from: f64,
    pub depth: f64,
    pub n: u32,
    pub vel: f64,
    pub dir: f64,
    pub t_avg: f64,
    pub scalar_vel: f64,
    pub vel_std: f64,
    pub u_avg: f64,
    pub v_avg: f64,
    pub w_avg: f64,
    pub u_std: f64,
    pub v_std: f64,
    pub w_std: f64,
    pub t_std: f64,
    pub uv_cov: f64,
    pub uw_cov: f64,
    pub vw_cov: f64,
    pub ut_cov: f64,
    pub vt_cov: f64,
    pub wt_cov: f64,
    pub u_star: f64,
    pub h0: f64,
    pub lm1: f64,
    pub phi_deg: f64,
}

#[derive(Debug, Clone, Copy, Default)]
struct Accum {
    n: u32,
    su: f64,
    sv: f64,
    sw: f64,
    st: f64,
    suu: f64,
    svv: f64,
    sww: f64,
    stt: f64,
    suv: f64,
    suw: f64,
    svw: f64,
    sut: f64,
    svt: f64,
    swt: f64,
    svel: f64,
    svel2: f64,
}

impl Accum {
    fn add(&mut self, other: &Accum) {
        self.n += other.n;
        self.su += other.su;
        self.sv += other.sv;
        self.sw += other.sw;
        self.st += other.st;
        self.suu += other.suu;
        self.svv += other.svv;
        self.sww += other.sww;
        self.stt += other.stt;
        self.suv += other.suv;
        self.suw += other.suw;
        self.svw += other.svw;
        self.sut += other.sut;
        self.svt += other.svt;
        self.swt += other.swt;
        self.svel += other.svel;
        self.svel2 += other.svel2;
    }
}

/// Compute per-window statistics for a time-ordered snapshot.
///
/// `now` is the reference monotonic time, `z` the station altitude in
/// metres, `depths` a strictly increasing vector of window lengths in
/// seconds. At most [`MAX_WINDOWS`] windows are accepted.
pub fn compute(
    snap: &Snapshot,
    now: f64,
    z: f64,
    depths: &[f64],
) -> Result<Vec<WindowStats>, AcqError> {
    if depths.len() > MAX_WINDOWS {
        return Err(AcqError::TooManyWindows {
            got: depths.len(),
            max: MAX_WINDOWS,
        });
    }

    let m = depths.len();
    let mut acc = vec![Accum::default(); m];
    let from: Vec<f64> = depths.iter().map(|d| now - d).collect();

    // Innermost-window assignment: each sample contributes to exactly one
    // partial sum.
    for k in 0..snap.len() {
        let ts = snap.ts[k];
        for (w, a) in acc.iter_mut().enumerate() {
            if from[w] < ts && ts <= now {
                let u = f64::from(snap.u[k]) * 0.01;
                let v = f64::from(snap.v[k]) * 0.01;
                let wv = f64::from(snap.w[k]) * 0.01;
                let t = f64::from(snap.t[k]) * 0.01;
                a.n += 1;
                a.su += u;
                a.sv += v;
                a.sw += wv;
                a.st += t;
                a.suu += u * u;
                a.svv += v * v;
                a.sww += wv * wv;
                a.stt += t * t;
                a.suv += u * v;
                a.suw += u * wv;
                a.svw += v * wv;
                a.sut += u * t;
                a.svt += v * t;
                a.swt += wv * t;
                a.svel2 += u * u + v * v;
                a.svel += (u * u + v * v).sqrt();
                break;
            }
        }
    }

    // Partial to total sums: window i absorbs everything inner to it.
    for w in 1..m {
        let (inner, outer) = acc.split_at_mut(w);
        outer[0].add(&inner[w - 1]);
    }

    Ok(acc
        .iter()
        .zip(depths.iter())
        .zip(from.iter())
        .map(|((a, &depth), &from)| finalize(a, from, depth, z))
        .collect())
}

fn finalize(a: &Accum, from: f64, depth: f64, z: f64) -> WindowStats {
    let n = a.n;
    if n == 0 {
        return WindowStats {
            from,
            depth,
            n: 0,
            vel: MISSING,
            dir: MISSING,
            t_avg: MISSING,
            scalar_vel: MISSING,
            vel_std: MISSING,
            u_avg: MISSING,
            v_avg: MISSING,
            w_avg: MISSING,
            u_std: MISSING,
            v_std: MISSING,
            w_std: MISSING,
            t_std: MISSING,
            uv_cov: MISSING,
            uw_cov: MISSING,
            vw_cov: MISSING,
            ut_cov: MISSING,
            vt_cov: MISSING,
            wt_cov: MISSING,
            u_star: MISSING,
            h0: MISSING,
            lm1: MISSING,
            phi_deg: MISSING,
        };
    }
    let nf = f64::from(n);

    // Biased moments in the unrotated frame.
    let u = a.su / nf;
    let v = a.sv / nf;
    let w = a.sw / nf;
    let t = a.st / nf;
    let uu = a.suu / nf - u * u;
    let uv = a.suv / nf - u * v;
    let uw = a.suw / nf - u * w;
    let vv = a.svv / nf - v * v;
    let vw = a.svw / nf - v * w;
    let ww = a.sww / nf - w * w;
    let ut = a.sut / nf - u * t;
    let vt = a.svt / nf - v * t;
    let wt = a.swt / nf - w * t;
    let tt = a.stt / nf - t * t;
    let scalar_vel = a.svel / nf;
    let vel2 = a.svel2 / nf;

    // First rotation: yaw into the mean wind.
    let theta = v.atan2(u);
    let (sr, cr) = theta.sin_cos();
    let (sr2, cr2) = (2.0 * theta).sin_cos();

    let utr = ut * cr + vt * sr;
    let vtr = -ut * sr + vt * cr;
    let wtr = wt;

    let uur = uu * cr * cr + vv * sr * sr + uv * sr2;
    let uvr = 0.5 * (2.0 * uv * cr2 + (vv - uu) * sr2);
    let uwr = uw * cr + vw * sr;
    let vvr = vv * cr * cr - 2.0 * uv * cr * sr + uu * sr * sr;
    let vwr = vw * cr - uw * sr;
    let wwr = ww;

    // Second rotation: pitch by the covariance half-angle.
    let phi = 0.5 * (2.0 * vwr).atan2(vvr - wwr);
    let (ss, cs) = phi.sin_cos();
    let (ss2, cs2) = (2.0 * phi).sin_cos();

    let uts = utr * cs + wtr * ss;
    let vts = vtr;
    let wts = wtr * cs - utr * ss;

    let uus = uur * cs * cs + wwr * ss * ss + uwr * ss2;
    let uvs = uvr * cs + vwr * ss;
    let uws = 0.5 * (2.0 * uwr * cs2 + (wwr - uur) * ss2);
    let vvs = vvr;
    let vws = vwr * cs - uvr * ss;
    let wws = wwr * cs * cs - 2.0 * uwr * cs * ss + uur * ss * ss;

    let vel = (u * u + v * v).sqrt();
    let mut dir = 180.0 * (-u).atan2(-v) / PI;
    if dir < 0.0 {
        dir += 360.0;
    }
    let vel_std = (vel2 - scalar_vel * scalar_vel).sqrt();

    let u_star = (uws * uws + vws * vws).sqrt().sqrt();
    let t_kelvin = t + 273.15;
    let h0 = 350.125 * 1013.0 * (-0.0342 / t_kelvin * z).exp() / t_kelvin * wts;
    let lm1 = -0.4 * 9.807 / t_kelvin * wts / (u_star * u_star * u_star);

    WindowStats {
        from,
        depth,
        n,
        vel,
        dir,
        t_avg: t,
        scalar_vel,
        vel_std,
        u_avg: u,
        v_avg: v,
        w_avg: w,
        u_std: uus.sqrt(),
        v_std: vvs.sqrt(),
        w_std: wws.sqrt(),
        t_std: tt.sqrt(),
        uv_cov: uvs,
        uw_cov: uws,
        vw_cov: vws,
        ut_cov: uts,
        vt_cov: vts,
        wt_cov: wts,
        u_star,
        h0,
        lm1,
        phi_deg: phi * 180.0 / PI,
    }
}

/// Write the statistics report: a count line, then 25 lines per window.
pub fn write_report(path: &Path, windows: &[WindowStats]) -> io::Result<()> {
    let mut out = BufWriter::new(File::create(path)?);
    writeln!(out, "{}", windows.len())?;
    for w in windows {
        writeln!(out, "{:.6}", w.from)?;
        writeln!(out, "{:.6}", w.depth)?;
        writeln!(out, "{}", w.n)?;
        for value in [
            w.vel, w.dir, w.t_avg, w.scalar_vel, w.vel_std, w.u_avg, w.v_avg, w.w_avg, w.u_std,
            w.v_std, w.w_std, w.t_std, w.uv_cov, w.uw_cov, w.vw_cov, w.ut_cov, w.vt_cov, w.wt_cov,
            w.u_star, w.h0, w.lm1, w.phi_deg,
        ] {
            writeln!(out, "{:.6}", value)?;
        }
    }
    out.flush()
}

/// Binary dump of a snapshot: record count, then the five arrays packed
/// sequentially, little-endian.
pub fn write_snapshot(path: &Path, snap: &Snapshot) -> io::Result<()> {
    let mut out = BufWriter::new(File::create(path)?);
    out.write_all(&(snap.len() as i32).to_le_bytes())?;
    for ts in &snap.ts {
        out.write_all(&ts.to_le_bytes())?;
    }
    for field in [&snap.u, &snap.v, &snap.w, &snap.t] {
        for value in field.iter() {
            out.write_all(&value.to_le_bytes())?;
        }
    }
    out.flush()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::f64::consts::PI;

    const TOL: f64 = 1e-6;

    fn snapshot_of(samples: &[(f64, i16, i16, i16, i16)]) -> Snapshot {
        let mut snap = Snapshot::new(samples.len());
        for (k, &(ts, u, v, w, t)) in samples.iter().enumerate() {
            snap.ts[k] = ts;
            snap.u[k] = u;
            snap.v[k] = v;
            snap.w[k] = w;
            snap.t[k] = t;
        }
        snap
    }

    #[test]
    fn too_many_windows_is_an_error() {
        let snap = Snapshot::new(1);
        let depths: Vec<f64> = (1..=17).map(|d| d as f64).collect();
        assert!(compute(&snap, 0.0, 10.0, &depths).is_err());
    }

    #[test]
    fn empty_windows_emit_sentinels() {
        // All samples older than the deepest window.
        let samples: Vec<_> = (0..100).map(|k| (k as f64, 100, 0, 0, 1500)).collect();
        let snap = snapshot_of(&samples);
        let now = 1000.0;
        let out = compute(&snap, now, 10.0, &[10.0, 60.0, 600.0]).unwrap();
        assert_eq!(out.len(), 3);
        for w in &out {
            assert_eq!(w.n, 0);
            for value in [
                w.vel, w.dir, w.t_avg, w.scalar_vel, w.vel_std, w.u_avg, w.v_avg, w.w_avg,
                w.u_std, w.v_std, w.w_std, w.t_std, w.uv_cov, w.uw_cov, w.vw_cov, w.ut_cov,
                w.vt_cov, w.wt_cov, w.u_star, w.h0, w.lm1, w.phi_deg,
            ] {
                assert_eq!(value, MISSING);
            }
        }
    }

    #[test]
    fn constant_wind_along_v() {
        // 600 samples at v = 500 cm/s; wind from due south.
        let samples: Vec<_> = (0..600).map(|k| (0.1 + k as f64, 0, 500, 0, 0)).collect();
        let snap = snapshot_of(&samples);
        let out = compute(&snap, 600.1, 10.0, &[601.0]).unwrap();
        let w = &out[0];
        assert_eq!(w.n, 600);
        assert!((w.vel - 5.0).abs() < TOL);
        assert!((w.dir - 180.0).abs() < TOL);
        assert!(w.u_star.abs() < TOL);
        for cov in [w.uv_cov, w.uw_cov, w.vw_cov, w.ut_cov, w.vt_cov, w.wt_cov] {
            assert!(cov.abs() < TOL);
        }
        assert!((w.scalar_vel - 5.0).abs() < TOL);
    }

    #[test]
    fn constant_wind_along_u_points_west() {
        let samples: Vec<_> = (0..600).map(|k| (0.1 + k as f64, 500, 0, 0, 0)).collect();
        let snap = snapshot_of(&samples);
        let out = compute(&snap, 600.1, 10.0, &[601.0]).unwrap();
        assert!((out[0].dir - 270.0).abs() < TOL);
        assert!((out[0].vel - 5.0).abs() < TOL);
    }

    #[test]
    fn window_counts_partition_and_cumulate() {
        // One sample per second for 700 s ending at now.
        let now = 700.0;
        let samples: Vec<_> = (0..700).map(|k| (1.0 + k as f64, 10, 20, -5, 1234)).collect();
        let snap = snapshot_of(&samples);
        let depths = [10.0, 60.0, 600.0];
        let out = compute(&snap, now, 10.0, &depths).unwrap();
        // After cumulation window i holds every sample within depths[i].
        assert_eq!(out[0].n, 10);
        assert_eq!(out[1].n, 60);
        assert_eq!(out[2].n, 600);
    }

    #[test]
    fn first_rotation_zeroes_the_crosswind() {
        // Noisy two-component wind; v_r must vanish by construction, which
        // shows up as dir/vel consistency: the rotated mean crosswind is
        // sin/cos applied to the mean, so check atan2 alignment instead.
        let samples: Vec<_> = (0..500)
            .map(|k| {
                let jitter = ((k * 37) % 100) as i16 - 50;
                (1.0 + k as f64, 300 + jitter, 400 - jitter, jitter / 5, 1500 + jitter)
            })
            .collect();
        let snap = snapshot_of(&samples);
        let out = compute(&snap, 501.0, 10.0, &[600.0]).unwrap();
        let w = &out[0];
        let theta = w.v_avg.atan2(w.u_avg);
        let v_rot = -w.u_avg * theta.sin() + w.v_avg * theta.cos();
        assert!(v_rot.abs() < 1e-12);
        assert!((w.vel - (w.u_avg * w.u_avg + w.v_avg * w.v_avg).sqrt()).abs() < TOL);
    }

    #[test]
    fn second_rotation_zeroes_mean_vertical_for_level_flow() {
        // w = 0 and vw = 0 throughout: the pitch angle collapses to zero
        // and the rotated mean vertical wind stays zero.
        let samples: Vec<_> = (0..200)
            .map(|k| {
                let jitter = ((k * 13) % 40) as i16 - 20;
                (1.0 + k as f64, 200 + jitter, 100 - jitter, 0, 1500)
            })
            .collect();
        let snap = snapshot_of(&samples);
        let out = compute(&snap, 201.0, 10.0, &[300.0]).unwrap();
        let w = &out[0];
        assert!(w.phi_deg.abs() < TOL);
        let phi = w.phi_deg * PI / 180.0;
        let theta = w.v_avg.atan2(w.u_avg);
        let ur = w.u_avg * theta.cos() + w.v_avg * theta.sin();
        let ws = w.w_avg * phi.cos() - ur * phi.sin();
        assert!(ws.abs() < TOL);
    }

    #[test]
    fn engine_is_idempotent() {
        let samples: Vec<_> = (0..300)
            .map(|k| {
                let jitter = ((k * 7) % 60) as i16 - 30;
                (1.0 + k as f64, 250 + jitter, -100 + jitter, jitter, 1700 - jitter)
            })
            .collect();
        let snap = snapshot_of(&samples);
        let a = compute(&snap, 301.0, 25.0, &[30.0, 120.0, 600.0]).unwrap();
        let b = compute(&snap, 301.0, 25.0, &[30.0, 120.0, 600.0]).unwrap();
        for (x, y) in a.iter().zip(b.iter()) {
            assert_eq!(x.n, y.n);
            assert_eq!(x.vel.to_bits(), y.vel.to_bits());
            assert_eq!(x.uw_cov.to_bits(), y.uw_cov.to_bits());
            assert_eq!(x.h0.to_bits(), y.h0.to_bits());
            assert_eq!(x.lm1.to_bits(), y.lm1.to_bits());
        }
    }

    #[test]
    fn heat_flux_sign_follows_wt() {
        // Warm updrafts: w and t correlated, so wt > 0 and H0 > 0. The u
        // fluctuation rides on the same updrafts, giving a finite u*; the
        // v fluctuation is independent of them.
        let samples: Vec<_> = (0..400)
            .map(|k| {
                let s = if k % 2 == 0 { 1 } else { -1 };
                let s2 = if k % 4 < 2 { 1 } else { -1 };
                (1.0 + k as f64, 300 + 20 * s, 100 * s2, 50 * s, 1500 + 100 * s)
            })
            .collect();
        let snap = snapshot_of(&samples);
        let out = compute(&snap, 401.0, 10.0, &[600.0]).unwrap();
        let w = &out[0];
        assert!(w.wt_cov > 0.0);
        assert!(w.h0 > 0.0);
        assert!(w.u_star > 0.0);
        // Unstable stratification: 1/L negative.
        assert!(w.lm1 < 0.0);
    }

    #[test]
    fn report_layout() {
        use std::io::Read;
        let samples: Vec<_> = (0..50).map(|k| (1.0 + k as f64, 100, 200, 0, 1500)).collect();
        let snap = snapshot_of(&samples);
        let out = compute(&snap, 51.0, 10.0, &[60.0, 600.0]).unwrap();
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("eddy_cov.dat");
        write_report(&path, &out).unwrap();
        let mut text = String::new();
        File::open(&path).unwrap().read_to_string(&mut text).unwrap();
        let lines: Vec<&str> = text.lines().collect();
        assert_eq!(lines[0], "2");
        assert_eq!(lines.len(), 1 + 2 * 25);
        // Count line of the first window.
        assert_eq!(lines[3], "50");
    }

    #[test]
    fn snapshot_dump_layout() {
        let snap = snapshot_of(&[(1.0, 1, 2, 3, 4), (2.0, 5, 6, 7, 8)]);
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("sonic_window.bin");
        write_snapshot(&path, &snap).unwrap();
        let bytes = std::fs::read(&path).unwrap();
        // 4 (count) + 2*8 (ts) + 4 fields * 2 samples * 2 bytes
        assert_eq!(bytes.len(), 4 + 16 + 16);
        assert_eq!(i32::from_le_bytes(bytes[0..4].try_into().unwrap()), 2);
    }
}
