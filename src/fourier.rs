//! Spectral analysis of the label along one feature and sinusoidal feature
//! synthesis from the dominant frequencies.

use crate::data::{Column, Feature};
use crate::error::GenerationError;
use crate::expression::{BinaryOp, Expr, UnaryOp};
use crate::generator::GeneratorInstance;
use crate::param::{self, AdaptionType};
use crate::view::FeatureView;
use num_complex::Complex;
use rand::{Rng, RngCore};
use rand_distr::{Distribution, Normal};
use rustfft::{Fft, FftPlanner};
use std::f64::consts::{FRAC_PI_2, PI};
use std::sync::Arc;

/// Dominant frequency of the label seen as a function of a feature
#[derive(Debug, Clone, PartialEq)]
pub struct Peak {
    /// Cycles per unit of the feature
    pub frequency: f64,
    pub magnitude: f64,
    /// Phase of the cosine component at `origin`
    pub phase: f64,
    pub origin: f64,
}

impl Peak {
    /// Angular frequency and phase shift of `sin(omega * x + shift)` following
    /// this peak at `frequency`
    pub fn sinusoid(&self, frequency: f64) -> (f64, f64) {
        let omega = 2.0 * PI * frequency;
        (omega, self.phase + FRAC_PI_2 - omega * self.origin)
    }
}

/// Local maxima of the label spectrum over `x`, strongest first.
///
/// Rows are sorted by `x`, the label is interpolated onto a uniform
/// power-of-two grid and centred, then transformed. Fewer than four usable
/// rows or a constant `x` yield no peak.
pub fn spectral_peaks(x: &[f64], y: &[f64]) -> Vec<Peak> {
    let mut points: Vec<(f64, f64)> = x
        .iter()
        .zip(y)
        .filter(|(a, b)| a.is_finite() && b.is_finite())
        .map(|(a, b)| (*a, *b))
        .collect();
    if points.len() < 4 {
        return Vec::new();
    }
    points.sort_by(|a, b| a.0.total_cmp(&b.0));

    let origin = points[0].0;
    let range = points[points.len() - 1].0 - origin;
    if !(range > 0.0) {
        return Vec::new();
    }

    let m = points.len().next_power_of_two().max(16);
    let step = range / m as f64;
    let mut grid = Vec::with_capacity(m);
    let mut idx = 0;
    for j in 0..m {
        let gx = origin + j as f64 * step;
        while idx + 1 < points.len() && points[idx + 1].0 <= gx {
            idx += 1;
        }
        let (x0, y0) = points[idx];
        let value = match points.get(idx + 1) {
            Some(&(x1, y1)) if x1 > x0 => y0 + (y1 - y0) * (gx - x0) / (x1 - x0),
            _ => y0,
        };
        grid.push(value);
    }
    let mean = grid.iter().sum::<f64>() / m as f64;

    let mut buffer: Vec<Complex<f64>> = grid.iter().map(|v| Complex::new(v - mean, 0.0)).collect();
    let mut planner = FftPlanner::<f64>::new();
    planner.plan_fft_forward(m).process(&mut buffer);

    let half = m / 2;
    let magnitude = |b: usize| if b >= 1 && b <= half { buffer[b].norm() } else { 0.0 };

    let mut peaks: Vec<Peak> = (1..=half)
        .filter(|&b| magnitude(b) > magnitude(b - 1) && magnitude(b) >= magnitude(b + 1) && magnitude(b) > 1e-12)
        .map(|b| Peak {
            frequency: b as f64 / range,
            magnitude: 2.0 * buffer[b].norm() / m as f64,
            phase: buffer[b].arg(),
            origin,
        })
        .collect();
    peaks.sort_by(|a, b| b.magnitude.total_cmp(&a.magnitude));
    peaks
}

/// Keeps up to `k` peaks, skipping those within `epsilon` relative distance of
/// an already kept frequency
pub fn select_peaks(peaks: Vec<Peak>, k: usize, epsilon: f64) -> Vec<Peak> {
    let mut kept: Vec<Peak> = Vec::new();
    for peak in peaks {
        if kept.len() >= k {
            break;
        }
        let known = kept.iter().any(|p| {
            (p.frequency - peak.frequency).abs() <= epsilon * p.frequency.max(peak.frequency)
        });
        if !known {
            kept.push(peak);
        }
    }
    kept
}

fn round6(v: f64) -> f64 {
    (v * 1e6).round() / 1e6
}

/// Computes `sin(omega * x + shift)` over one input feature
pub struct SinusoidInstance {
    input: Arc<Column>,
    omega: f64,
    shift: f64,
}

impl SinusoidInstance {
    pub fn new(input: Arc<Column>, omega: f64, shift: f64) -> SinusoidInstance {
        SinusoidInstance {
            input,
            omega: round6(omega),
            shift: round6(shift.rem_euclid(2.0 * PI)),
        }
    }
}

impl GeneratorInstance for SinusoidInstance {
    fn function(&self) -> &str {
        "sin"
    }

    fn synthesize(&self, view: &FeatureView) -> Result<Vec<Column>, GenerationError> {
        if self.input.values.len() != view.rows() {
            return Err(GenerationError::Domain {
                function: "sin".to_string(),
                reason: "input length differs from the dataset".to_string(),
            });
        }
        let construction = Expr::unary(
            UnaryOp::Sin,
            Expr::binary(
                BinaryOp::Plus,
                Expr::binary(BinaryOp::Mult, Expr::Constant(self.omega), self.input.feature.construction.clone()),
                Expr::Constant(self.shift),
            ),
        );
        let values = self.input.values.iter().map(|x| (self.omega * x + self.shift).sin()).collect();
        Ok(vec![Column::new(Feature::constructed(construction), values)])
    }
}

/// Settings for building sinusoidal features from spectral peaks
#[derive(Debug, Clone, PartialEq)]
pub struct FourierSynthesis {
    peaks: usize,
    per_peak: usize,
    epsilon: f64,
    adaption: AdaptionType,
}

impl FourierSynthesis {
    pub fn new(peaks: usize, per_peak: usize, epsilon: f64, adaption: AdaptionType) -> FourierSynthesis {
        FourierSynthesis {
            peaks,
            per_peak,
            epsilon,
            adaption,
        }
    }

    /// `None` when peak search is disabled
    pub fn from_param(param: &param::Fourier) -> Option<FourierSynthesis> {
        if param.search_fourier_peaks == 0 {
            return None;
        }
        Some(FourierSynthesis::new(
            param.search_fourier_peaks,
            param.attributes_per_peak.max(1),
            param.epsilon,
            param.adaption_type,
        ))
    }

    fn adapt(&self, frequency: f64, rng: &mut dyn RngCore) -> f64 {
        match self.adaption {
            AdaptionType::uniformly_without_nu => frequency,
            AdaptionType::uniformly => frequency * (1.0 + rng.gen_range(-self.epsilon..=self.epsilon)),
            AdaptionType::gaussian => {
                let noise = Normal::new(0.0, self.epsilon).map(|n| n.sample(rng)).unwrap_or(0.0);
                frequency * (1.0 + noise)
            }
        }
    }

    /// Sinusoid generators for the strongest peaks of `label` over `column`
    pub fn instances(&self, column: &Arc<Column>, label: &[f64], rng: &mut dyn RngCore) -> Vec<SinusoidInstance> {
        if !column.feature.is_numeric() {
            return Vec::new();
        }
        let peaks = select_peaks(spectral_peaks(&column.values, label), self.peaks, self.epsilon);
        let mut instances = Vec::with_capacity(peaks.len() * self.per_peak);
        for peak in &peaks {
            for _ in 0..self.per_peak {
                let (omega, shift) = peak.sinusoid(self.adapt(peak.frequency, rng));
                instances.push(SinusoidInstance::new(Arc::clone(column), omega, shift));
            }
        }
        instances
    }
}
