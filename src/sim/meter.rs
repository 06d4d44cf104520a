//! # Three-Phase Meter Simulation
//!
//! Composes ten [`RandomWalk`]s (frequency, per-phase currents, voltages and
//! power factors) into one simulated electricity meter. Every cycle derives
//! per-phase and total active/reactive power, line-to-line voltages, and
//! integrates four cumulative energy registers.

use chrono::{DateTime, Duration, Local};
use rand::rngs::StdRng;
use rand::SeedableRng;

use super::signal::RandomWalk;
use super::{ModelError, Sample, SampleKind};
use crate::config::MeterConfig;

/// Phase offset between line voltages: 120 degrees.
const PHASE_OFFSET_RAD: f64 = 2.0 * std::f64::consts::PI / 3.0;

/// A simulated three-phase electricity meter.
///
/// Owns one walk per physical quantity and four monotonically non-decreasing
/// energy registers (active/reactive, import/export). All walks are advanced
/// by the same elapsed time per [`cycle`](MeterSimulator::cycle), so a meter
/// behaves identically whether driven by real clock ticks or by synthetic
/// batch steps.
pub struct MeterSimulator {
    label: String,

    f: RandomWalk,
    i: [RandomWalk; 3],
    v: [RandomWalk; 3],
    pf: [RandomWalk; 3],

    /// `true` for an inductive load convention (positive reactive power),
    /// `false` for capacitive (sign-flipped).
    q_ind: bool,

    /// Energy registers in watt-hours, never decreasing.
    ep_imp: f64,
    ep_exp: f64,
    eq_imp: f64,
    eq_exp: f64,

    last_tick: DateTime<Local>,
    rng: StdRng,
}

impl MeterSimulator {
    /// Builds a meter from its configuration.
    ///
    /// `epoch` is the reference timestamp the first cycle's delta is measured
    /// against; callers must pass it explicitly per construction site (the
    /// real-time driver passes startup time, the batch driver passes the
    /// window start).
    pub fn new(config: &MeterConfig, epoch: DateTime<Local>) -> Result<Self, ModelError> {
        let [fb, fv, fd] = config.f;
        let [ib, iv, id] = config.i;
        let [vb, vv, vd] = config.v;
        let [pb, pv, pd] = config.pf;

        let rng = match config.seed {
            Some(seed) => StdRng::seed_from_u64(seed),
            None => StdRng::from_entropy(),
        };

        Ok(Self {
            label: config.label.clone(),
            f: RandomWalk::new("f", fb, fv, fd)?,
            i: [
                RandomWalk::new("i1", ib, iv, id)?,
                RandomWalk::new("i2", ib, iv, id)?,
                RandomWalk::new("i3", ib, iv, id)?,
            ],
            v: [
                RandomWalk::new("v1", vb, vv, vd)?,
                RandomWalk::new("v2", vb, vv, vd)?,
                RandomWalk::new("v3", vb, vv, vd)?,
            ],
            pf: [
                RandomWalk::new("pf1", pb, pv, pd)?,
                RandomWalk::new("pf2", pb, pv, pd)?,
                RandomWalk::new("pf3", pb, pv, pd)?,
            ],
            q_ind: config.q_ind,
            ep_imp: 0.0,
            ep_exp: 0.0,
            eq_imp: 0.0,
            eq_exp: 0.0,
            last_tick: epoch,
            rng,
        })
    }

    /// Meter label, used as the measurement name on every emitted sample.
    pub fn label(&self) -> &str {
        &self.label
    }

    /// Advances the meter to `now` and returns one sample per quantity.
    ///
    /// An out-of-order `now` (clock skew, misconfigured batch cursor) clamps
    /// the elapsed time to zero: the current state is re-emitted but no walk
    /// moves and no energy accrues.
    pub fn cycle(&mut self, now: DateTime<Local>) -> Vec<Sample> {
        let delta = (now - self.last_tick).max(Duration::zero());
        self.last_tick = now;
        let delta_s = delta.to_std().unwrap_or_default().as_secs_f64();

        let f = self.f.advance(delta_s, &mut self.rng);
        let mut i = [0.0; 3];
        let mut v = [0.0; 3];
        let mut pf = [0.0; 3];
        for k in 0..3 {
            i[k] = self.i[k].advance(delta_s, &mut self.rng);
            v[k] = self.v[k].advance(delta_s, &mut self.rng);
            pf[k] = self.pf[k].advance(delta_s, &mut self.rng);
        }

        let mut p_phase = [0.0; 3];
        let mut q_phase = [0.0; 3];
        for k in 0..3 {
            p_phase[k] = i[k] * v[k] * pf[k];
            q_phase[k] = i[k] * v[k] * pf[k].acos().sin();
            if !self.q_ind {
                q_phase[k] = -q_phase[k];
            }
        }
        let p: f64 = p_phase.iter().sum();
        let q: f64 = q_phase.iter().sum();

        // Law of cosines across the 120 degree offset.
        let v12 = line_to_line(v[0], v[1]);
        let v23 = line_to_line(v[1], v[2]);
        let v31 = line_to_line(v[2], v[0]);

        // Rectangular Riemann sum over the tick, in watt-hours.
        let hours = delta_s / 3600.0;
        if p > 0.0 {
            self.ep_imp += p.abs() * hours;
        } else if p < 0.0 {
            self.ep_exp += p.abs() * hours;
        }
        if q > 0.0 {
            self.eq_imp += q.abs() * hours;
        } else if q < 0.0 {
            self.eq_exp += q.abs() * hours;
        }

        let gauges: [(&'static str, f64); 21] = [
            ("f", f),
            ("i1", i[0]),
            ("i2", i[1]),
            ("i3", i[2]),
            ("pf1", pf[0]),
            ("pf2", pf[1]),
            ("pf3", pf[2]),
            ("p1", p_phase[0]),
            ("p2", p_phase[1]),
            ("p3", p_phase[2]),
            ("p", p),
            ("q1", q_phase[0]),
            ("q2", q_phase[1]),
            ("q3", q_phase[2]),
            ("q", q),
            ("v1", v[0]),
            ("v2", v[1]),
            ("v3", v[2]),
            ("v12", v12),
            ("v23", v23),
            ("v31", v31),
        ];
        let counters: [(&'static str, f64); 4] = [
            ("ep_imp", self.ep_imp),
            ("ep_exp", self.ep_exp),
            ("eq_imp", self.eq_imp),
            ("eq_exp", self.eq_exp),
        ];

        let mut out = Vec::with_capacity(gauges.len() + counters.len());
        out.extend(gauges.iter().map(|&(field, value)| Sample {
            meter: self.label.clone(),
            field,
            value,
            time: now,
            kind: SampleKind::Gauge,
        }));
        out.extend(counters.iter().map(|&(field, value)| Sample {
            meter: self.label.clone(),
            field,
            value,
            time: now,
            kind: SampleKind::Counter,
        }));
        out
    }
}

fn line_to_line(v_x: f64, v_y: f64) -> f64 {
    (v_x * v_x + v_y * v_y - 2.0 * v_x * v_y * PHASE_OFFSET_RAD.cos()).sqrt()
}
