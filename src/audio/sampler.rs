use super::analyzer::SpectrumAnalyzer;
use super::source::AudioSource;

/// Energy lookup by frequency, in `[0, 255]`.
pub trait Spectrum {
    fn energy_at(&self, hz: f32) -> f32;
}

/// Binds an analyzer to an audio source. Call `refresh` once per frame
/// before any lookups; until the first refresh every lookup is NaN.
pub struct SpectrumSampler {
    source: Box<dyn AudioSource>,
    analyzer: SpectrumAnalyzer,
    window: Vec<f32>,
    refreshed: bool,
}

impl SpectrumSampler {
    pub fn new(source: Box<dyn AudioSource>, bins: usize, smoothing: f32) -> Self {
        let analyzer = SpectrumAnalyzer::new(bins, smoothing);
        let window = vec![0.0; analyzer.fft_size()];
        Self {
            source,
            analyzer,
            window,
            refreshed: false,
        }
    }

    pub fn refresh(&mut self) {
        self.source.fill_window(&mut self.window);
        self.analyzer.analyze(&self.window);
        self.refreshed = true;
    }

    #[cfg(test)]
    fn is_ready(&self) -> bool {
        self.refreshed
    }

    pub fn source(&self) -> &dyn AudioSource {
        self.source.as_ref()
    }

    pub fn source_mut(&mut self) -> &mut dyn AudioSource {
        self.source.as_mut()
    }

    /// Stop the source and drop the analyzer.
    pub fn teardown(mut self) {
        log::debug!("Tearing down sampler for {}", self.source.describe());
        self.source.stop();
    }
}

impl Spectrum for SpectrumSampler {
    fn energy_at(&self, hz: f32) -> f32 {
        if !self.refreshed {
            return f32::NAN;
        }
        self.analyzer.energy_at(hz, self.source.sample_rate())
    }
}
