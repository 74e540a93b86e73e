use std::{f32::consts::PI, fmt, sync::Arc};

use realfft::{num_complex::Complex32, RealFftPlanner, RealToComplex};
use serde::{Deserialize, Serialize};

use crate::{config::VisualizerConfig, PlayerError, Result};

const MIN_FFT_SIZE: usize = 32;
const MAX_FFT_SIZE: usize = 32_768;

/// Tuning for the analyser node.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct AnalyserSettings {
    pub fft_size: usize,
    /// Weight of the previous frame in the magnitude average, in [0, 1].
    pub smoothing: f32,
    pub min_decibels: f32,
    pub max_decibels: f32,
}

impl Default for AnalyserSettings {
    fn default() -> Self {
        Self::from(&VisualizerConfig::default())
    }
}

impl From<&VisualizerConfig> for AnalyserSettings {
    fn from(config: &VisualizerConfig) -> Self {
        Self {
            fft_size: config.fft_size,
            smoothing: config.smoothing,
            min_decibels: config.min_decibels,
            max_decibels: config.max_decibels,
        }
    }
}

/// Frequency analyser producing byte-scaled magnitudes, one per bin.
///
/// Each call windows the most recent `fft_size` samples, runs a forward real
/// FFT, blends the normalised magnitudes with the previous frame and maps the
/// result from decibels onto `0..=255`.
pub struct Analyser {
    settings: AnalyserSettings,
    fft: FftResources,
    smoothed: Vec<f32>,
    bytes: Vec<u8>,
}

impl Analyser {
    pub fn new(settings: AnalyserSettings) -> Result<Self> {
        let size = settings.fft_size;
        if !size.is_power_of_two() || !(MIN_FFT_SIZE..=MAX_FFT_SIZE).contains(&size) {
            return Err(PlayerError::InvalidInput(
                "fft size must be a power of two between 32 and 32768",
            ));
        }
        if !(0.0..=1.0).contains(&settings.smoothing) {
            return Err(PlayerError::InvalidInput(
                "smoothing must lie within [0, 1]",
            ));
        }
        if settings.max_decibels <= settings.min_decibels {
            return Err(PlayerError::InvalidInput(
                "max decibels must exceed min decibels",
            ));
        }

        let bins = size / 2;
        Ok(Self {
            settings,
            fft: FftResources::new(size),
            smoothed: vec![0.0; bins],
            bytes: vec![0; bins],
        })
    }

    pub fn fft_size(&self) -> usize {
        self.settings.fft_size
    }

    pub fn frequency_bin_count(&self) -> usize {
        self.settings.fft_size / 2
    }

    pub fn settings(&self) -> &AnalyserSettings {
        &self.settings
    }

    /// Clears the smoothing history.
    pub fn reset(&mut self) {
        self.smoothed.fill(0.0);
        self.bytes.fill(0);
    }

    /// Analyses `samples` and returns the byte magnitudes for every bin.
    ///
    /// Only the last `fft_size` samples are used; shorter input is treated as
    /// zero-padded at the front.
    pub fn byte_frequency_data(&mut self, samples: &[f32]) -> Result<&[u8]> {
        let size = self.settings.fft_size;
        let tail = &samples[samples.len().saturating_sub(size)..];
        let offset = size - tail.len();

        self.fft.input.fill(0.0);
        for (index, value) in tail.iter().enumerate() {
            let position = offset + index;
            self.fft.input[position] = *value * hann_value(position, size);
        }

        self.fft.plan.process_with_scratch(
            &mut self.fft.input,
            &mut self.fft.spectrum,
            &mut self.fft.scratch,
        )?;

        let tau = self.settings.smoothing;
        let range = self.settings.max_decibels - self.settings.min_decibels;
        let scale = 1.0 / size as f32;

        for (bin, smoothed) in self.smoothed.iter_mut().enumerate() {
            let magnitude = self.fft.spectrum[bin].norm() * scale;
            *smoothed = tau * *smoothed + (1.0 - tau) * magnitude;

            let byte = if *smoothed <= f32::EPSILON {
                0.0
            } else {
                let decibels = 20.0 * smoothed.log10();
                (255.0 * (decibels - self.settings.min_decibels) / range).floor()
            };
            self.bytes[bin] = byte.clamp(0.0, 255.0) as u8;
        }

        Ok(&self.bytes)
    }
}

struct FftResources {
    size: usize,
    plan: Arc<dyn RealToComplex<f32>>,
    scratch: Vec<Complex32>,
    spectrum: Vec<Complex32>,
    input: Vec<f32>,
}

impl FftResources {
    fn new(size: usize) -> Self {
        let plan = RealFftPlanner::<f32>::new().plan_fft_forward(size);
        Self {
            size,
            scratch: plan.make_scratch_vec(),
            spectrum: plan.make_output_vec(),
            input: plan.make_input_vec(),
            plan,
        }
    }
}

impl fmt::Debug for Analyser {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Analyser")
            .field("settings", &self.settings)
            .field("fft", &self.fft)
            .finish()
    }
}

impl fmt::Debug for FftResources {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FftResources")
            .field("size", &self.size)
            .finish()
    }
}

fn hann_value(index: usize, len: usize) -> f32 {
    if len <= 1 {
        return 1.0;
    }

    0.5 - 0.5 * ((2.0 * PI * index as f32) / (len as f32 - 1.0)).cos()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn unsmoothed(fft_size: usize) -> Analyser {
        Analyser::new(AnalyserSettings {
            fft_size,
            smoothing: 0.0,
            ..Default::default()
        })
        .unwrap()
    }

    fn tone(bin: usize, size: usize, amplitude: f32) -> Vec<f32> {
        (0..size)
            .map(|i| amplitude * (2.0 * PI * bin as f32 * i as f32 / size as f32).sin())
            .collect()
    }

    #[test]
    fn silence_maps_to_zero() {
        let mut analyser = Analyser::new(AnalyserSettings::default()).unwrap();
        let bytes = analyser.byte_frequency_data(&[0.0; 256]).unwrap();

        assert_eq!(bytes.len(), 128);
        assert!(bytes.iter().all(|b| *b == 0));
    }

    #[test]
    fn tone_peaks_at_its_bin() {
        let mut analyser = unsmoothed(256);
        let bytes = analyser
            .byte_frequency_data(&tone(20, 256, 0.01))
            .unwrap()
            .to_vec();

        let peak = bytes[20];
        assert!(peak > 0);
        assert!(bytes
            .iter()
            .enumerate()
            .all(|(bin, value)| bin == 20 || *value < peak));
        assert!(bytes[100] < bytes[20]);
    }

    #[test]
    fn smoothing_blends_with_previous_frame() {
        let mut analyser = Analyser::new(AnalyserSettings::default()).unwrap();
        let loud = tone(10, 256, 0.01);

        let first = analyser.byte_frequency_data(&loud).unwrap()[10];
        let second = analyser.byte_frequency_data(&loud).unwrap()[10];
        assert!(second > first);

        analyser.reset();
        let after_reset = analyser.byte_frequency_data(&loud).unwrap()[10];
        assert_eq!(after_reset, first);
    }

    #[test]
    fn rejects_invalid_sizes() {
        for size in [0, 100, 16, 65_536] {
            let settings = AnalyserSettings {
                fft_size: size,
                ..Default::default()
            };
            assert!(matches!(
                Analyser::new(settings),
                Err(PlayerError::InvalidInput(_))
            ));
        }
    }

    #[test]
    fn short_input_is_zero_padded() {
        let mut analyser = unsmoothed(64);
        let bytes = analyser.byte_frequency_data(&[0.5; 8]).unwrap();
        assert_eq!(bytes.len(), 32);
    }
}
