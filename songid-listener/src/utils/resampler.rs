//! Mono resampling using rubato
//!
//! Normalizes decoded clips to the analysis sample rate so frequency-bin
//! indices mean the same thing whatever rate the live stream runs at.

use anyhow::{anyhow, Result};
use rubato::{FastFixedIn, PolynomialDegree, Resampler};
use tracing::debug;

/// Resample mono samples from `input_rate` to `output_rate`
///
/// Returns a copy without resampling when the rates already match.
pub fn resample_mono(input: &[f32], input_rate: u32, output_rate: u32) -> Result<Vec<f32>> {
    if input_rate == output_rate || input.is_empty() {
        return Ok(input.to_vec());
    }

    debug!(input_rate, output_rate, frames = input.len(), "Resampling clip");

    let mut resampler = FastFixedIn::<f32>::new(
        output_rate as f64 / input_rate as f64,
        1.0, // max_relative_ratio (no runtime changes)
        PolynomialDegree::Septic,
        input.len(),
        1,
    )
    .map_err(|e| anyhow!("Failed to create resampler: {}", e))?;

    let planar_input = vec![input.to_vec()];
    let mut planar_output = resampler
        .process(&planar_input, None)
        .map_err(|e| anyhow!("Resampling failed: {}", e))?;

    Ok(planar_output.pop().unwrap_or_default())
}
