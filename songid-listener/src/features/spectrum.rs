//! Short-time spectral analysis
//!
//! Windowing and FFT magnitude computation, scaled to the 0-255 byte range
//! between a fixed decibel floor and ceiling.

use rustfft::num_complex::Complex;
use rustfft::{Fft, FftPlanner};
use std::f32::consts::PI;
use std::sync::Arc;

/// Computes byte-scaled magnitude spectra for fixed-size frames
pub struct SpectrumAnalyzer {
    window_size: usize,
    window: Vec<f32>,
    fft: Arc<dyn Fft<f32>>,
    min_decibels: f32,
    max_decibels: f32,
}

impl SpectrumAnalyzer {
    pub fn new(window_size: usize, min_decibels: f32, max_decibels: f32) -> Self {
        let mut planner = FftPlanner::<f32>::new();
        Self {
            window_size,
            window: blackman_window(window_size),
            fft: planner.plan_fft_forward(window_size),
            min_decibels,
            max_decibels,
        }
    }

    pub fn window_size(&self) -> usize {
        self.window_size
    }

    /// Number of usable frequency bins (half the window)
    pub fn bin_count(&self) -> usize {
        self.window_size / 2
    }

    /// Byte-scaled magnitude spectrum of one frame
    ///
    /// `frame` must hold exactly `window_size` samples; shorter frames are
    /// zero-padded. Output has `bin_count()` entries.
    pub fn byte_spectrum(&self, frame: &[f32]) -> Vec<u8> {
        let mut buffer: Vec<Complex<f32>> = (0..self.window_size)
            .map(|i| {
                let sample = frame.get(i).copied().unwrap_or(0.0);
                Complex {
                    re: sample * self.window[i],
                    im: 0.0,
                }
            })
            .collect();

        self.fft.process(&mut buffer);

        let n = self.window_size as f32;
        buffer[..self.bin_count()]
            .iter()
            .map(|c| self.to_byte(c.norm() / n))
            .collect()
    }

    fn to_byte(&self, magnitude: f32) -> u8 {
        if magnitude <= 0.0 {
            return 0;
        }
        let db = 20.0 * magnitude.log10();
        let scaled = 255.0 * (db - self.min_decibels) / (self.max_decibels - self.min_decibels);
        scaled.clamp(0.0, 255.0) as u8
    }
}

/// Blackman window of `size` points
pub fn blackman_window(size: usize) -> Vec<f32> {
    if size < 2 {
        return vec![1.0; size];
    }
    let n = size as f32;
    (0..size)
        .map(|i| {
            let x = 2.0 * PI * i as f32 / n;
            0.42 - 0.5 * x.cos() + 0.08 * (2.0 * x).cos()
        })
        .collect()
}

/// Index of the strongest bin in `[min_bin, max_bin)`, with its value
///
/// Ties resolve to the lowest bin. Returns `None` for an empty band.
pub fn peak_in_band(spectrum: &[u8], min_bin: usize, max_bin: usize) -> Option<(usize, u8)> {
    let end = max_bin.min(spectrum.len());
    if min_bin >= end {
        return None;
    }

    let mut best = (min_bin, spectrum[min_bin]);
    for (bin, &value) in spectrum.iter().enumerate().take(end).skip(min_bin + 1) {
        if value > best.1 {
            best = (bin, value);
        }
    }
    Some(best)
}
