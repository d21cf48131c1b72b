use rustfft::{num_complex::Complex, Fft, FftPlanner};
use std::sync::Arc;

pub const DEFAULT_BINS: usize = 1024;
pub const DEFAULT_SMOOTHING: f32 = 0.8;

const MIN_DB: f32 = -100.0;
const MAX_DB: f32 = -30.0;

/// Real-time spectrum analyzer producing byte energies per frequency bin.
///
/// Behaves like a browser `AnalyserNode`: Blackman-windowed FFT of the most
/// recent `2 * bins` samples, magnitudes smoothed over time, converted to
/// decibels and scaled so that `[-100 dB, -30 dB]` maps to `[0, 255]`.
pub struct SpectrumAnalyzer {
    fft: Arc<dyn Fft<f32>>,
    window: Vec<f32>,
    buffer: Vec<Complex<f32>>,
    smoothed: Vec<f32>,
    energies: Vec<u8>,
    smoothing: f32,
}

impl SpectrumAnalyzer {
    pub fn new(bins: usize, smoothing: f32) -> Self {
        let bins = bins.max(1);
        let size = bins * 2;
        let mut planner = FftPlanner::<f32>::new();
        let fft = planner.plan_fft_forward(size);

        Self {
            fft,
            window: blackman_window(size),
            buffer: vec![Complex::new(0.0, 0.0); size],
            smoothed: vec![0.0; bins],
            energies: vec![0; bins],
            smoothing: smoothing.clamp(0.0, 1.0),
        }
    }

    pub fn fft_size(&self) -> usize {
        self.window.len()
    }

    #[cfg(test)]
    fn bins(&self) -> usize {
        self.energies.len()
    }

    /// Analyze the tail of `samples`. Shorter input is zero padded at the
    /// front, as if the source had been silent before it started.
    pub fn analyze(&mut self, samples: &[f32]) -> &[u8] {
        let size = self.fft_size();
        let tail = &samples[samples.len().saturating_sub(size)..];
        let pad = size - tail.len();

        for (i, slot) in self.buffer.iter_mut().enumerate() {
            let s = if i < pad { 0.0 } else { tail[i - pad] };
            let s = if s.is_finite() { s } else { 0.0 };
            *slot = Complex::new(s * self.window[i], 0.0);
        }
        self.fft.process(&mut self.buffer);

        let scale = 255.0 / (MAX_DB - MIN_DB);
        for (k, (smoothed, energy)) in self
            .smoothed
            .iter_mut()
            .zip(self.energies.iter_mut())
            .enumerate()
        {
            let magnitude = self.buffer[k].norm() / size as f32;
            *smoothed = self.smoothing * *smoothed + (1.0 - self.smoothing) * magnitude;

            let db = 20.0 * smoothed.log10();
            *energy = if db.is_finite() {
                (scale * (db - MIN_DB)).floor().clamp(0.0, 255.0) as u8
            } else {
                0
            };
        }

        &self.energies
    }

    #[cfg(test)]
    fn energies(&self) -> &[u8] {
        &self.energies
    }

    /// Energy of the bin nearest to `hz`.
    pub fn energy_at(&self, hz: f32, sample_rate: u32) -> f32 {
        let nyquist = sample_rate as f32 / 2.0;
        if !(nyquist > 0.0) || !hz.is_finite() {
            return 0.0;
        }
        let last = self.energies.len() - 1;
        let index = (hz / nyquist * self.energies.len() as f32).round().max(0.0) as usize;
        self.energies[index.min(last)] as f32
    }
}

fn blackman_window(size: usize) -> Vec<f32> {
    let (a0, a1, a2) = (0.42f32, 0.5f32, 0.08f32);
    let tau = 2.0 * std::f32::consts::PI;
    (0..size)
        .map(|i| {
            let x = i as f32 / size as f32;
            a0 - a1 * (tau * x).cos() + a2 * (2.0 * tau * x).cos()
        })
        .collect()
}
