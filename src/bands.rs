use thiserror::Error;

/// A0, the lowest key on a piano.
pub const DEFAULT_BASE_FREQ: f32 = 27.5;
pub const DEFAULT_OCTAVES: usize = 8;
pub const DEFAULT_STEPS: usize = 24;

/// Note names at their chromatic positions, starting from A.
pub const NOTE_NAMES: [&str; 12] = ["A", "", "B", "C", "", "D", "", "E", "F", "", "G", ""];

#[derive(Debug, Error, PartialEq)]
pub enum BandError {
    #[error("octave count must be positive")]
    NoOctaves,
    #[error("steps per octave must be positive")]
    NoSteps,
    #[error("base frequency must be a positive number, got {0}")]
    BadBase(f32),
}

/// Sample frequencies for each octave band.
///
/// Band `o`, step `s` is `base * 2^(o + s / steps)`, the same relation used
/// to find the frequency of a piano key from its semitone offset.
pub fn generate_bands(
    base_freq: f32,
    octaves: usize,
    steps: usize,
) -> Result<Vec<Vec<f32>>, BandError> {
    if octaves == 0 {
        return Err(BandError::NoOctaves);
    }
    if steps == 0 {
        return Err(BandError::NoSteps);
    }
    if !base_freq.is_finite() || base_freq <= 0.0 {
        return Err(BandError::BadBase(base_freq));
    }

    let bands = (0..octaves)
        .map(|o| {
            (0..steps)
                .map(|s| base_freq * 2f32.powf(o as f32 + s as f32 / steps as f32))
                .collect()
        })
        .collect();
    Ok(bands)
}

/// Generated band table, kept together with the parameters that produced it.
#[derive(Clone, Debug)]
pub struct BandTable {
    base_freq: f32,
    octaves: usize,
    steps: usize,
    bands: Vec<Vec<f32>>,
}

impl BandTable {
    pub fn new(base_freq: f32, octaves: usize, steps: usize) -> Result<Self, BandError> {
        let bands = generate_bands(base_freq, octaves, steps)?;
        Ok(Self {
            base_freq,
            octaves,
            steps,
            bands,
        })
    }

    /// Regenerate only if the layout actually changed. Returns true when the
    /// table was rebuilt.
    pub fn reshape(&mut self, octaves: usize, steps: usize) -> Result<bool, BandError> {
        if octaves == self.octaves && steps == self.steps {
            return Ok(false);
        }
        self.bands = generate_bands(self.base_freq, octaves, steps)?;
        self.octaves = octaves;
        self.steps = steps;
        log::debug!("Regenerated band table: {} octaves x {} steps", octaves, steps);
        Ok(true)
    }

    pub fn bands(&self) -> &[Vec<f32>] {
        &self.bands
    }

    pub fn octaves(&self) -> usize {
        self.octaves
    }

    pub fn steps(&self) -> usize {
        self.steps
    }
}

impl Default for BandTable {
    fn default() -> Self {
        Self {
            base_freq: DEFAULT_BASE_FREQ,
            octaves: DEFAULT_OCTAVES,
            steps: DEFAULT_STEPS,
            bands: generate_bands(DEFAULT_BASE_FREQ, DEFAULT_OCTAVES, DEFAULT_STEPS)
                .unwrap_or_default(),
        }
    }
}
