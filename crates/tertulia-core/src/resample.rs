//! Stateful rational resampling between port and bridge clock rates.
//!
//! Resampling by P/Q (the reduced output/input rate ratio) is upsampling by
//! P, lowpass filtering at `min(1/P, 1/Q)` normalized frequency, then
//! downsampling by Q. The polyphase decomposition computes only the output
//! samples actually needed, with the anti-aliasing lowpass designed by the
//! windowed-sinc method (Blackman window, unity DC gain).
//!
//! Unlike an offline converter, [`Resampler`] is fed one frame at a time and
//! carries its filter history across calls, so a port can stream frames of
//! any size without boundary glitches. A cheaper 2-point linear mode trades
//! stopband rejection for CPU; the filter length has a compact variant for
//! memory-constrained use.

use std::f32::consts::PI;

use crate::gain::saturate16;

/// Resampling quality selector.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ResampleQuality {
    /// Windowed-sinc polyphase FIR. `small` selects the compact filter table.
    Sinc {
        /// Use the short filter (fewer taps, less rejection).
        small: bool,
    },
    /// 2-point linear interpolation.
    Linear,
}

impl Default for ResampleQuality {
    fn default() -> Self {
        Self::Sinc { small: false }
    }
}

/// Compute windowed-sinc lowpass FIR coefficients.
///
/// `h[n] = sinc(cutoff * (n - M/2)) * w_blackman[n]`, normalized to unity
/// gain at DC. `cutoff` is normalized so 1.0 is the Nyquist frequency.
fn design_lowpass(num_taps: usize, cutoff: f32) -> Vec<f32> {
    if num_taps == 0 {
        return Vec::new();
    }

    let m = num_taps - 1;
    let mut coeffs = Vec::with_capacity(num_taps);

    for n in 0..num_taps {
        let x = n as f32 - m as f32 / 2.0;

        let sinc = if x.abs() < 1e-7 {
            cutoff
        } else {
            (PI * cutoff * x).sin() / (PI * x)
        };

        // Blackman window: w[n] = 0.42 - 0.5*cos(2πn/M) + 0.08*cos(4πn/M)
        let window = if m == 0 {
            1.0
        } else {
            let phase = 2.0 * PI * n as f32 / m as f32;
            0.42 - 0.5 * phase.cos() + 0.08 * (2.0 * phase).cos()
        };

        coeffs.push(sinc * window);
    }

    let sum: f32 = coeffs.iter().sum();
    if sum.abs() > 1e-10 {
        for c in &mut coeffs {
            *c /= sum;
        }
    }

    coeffs
}

fn gcd(mut a: usize, mut b: usize) -> usize {
    while b != 0 {
        let t = b;
        b = a % b;
        a = t;
    }
    a
}

/// Streaming rational resampler for interleaved PCM16.
pub struct Resampler {
    /// Upsampling factor (reduced).
    p: usize,
    /// Downsampling factor (reduced).
    q: usize,
    channels: usize,
    quality: ResampleQuality,
    /// P polyphase sub-filters of `taps_per_phase` coefficients each.
    /// Empty in linear and passthrough modes.
    polyphase: Vec<Vec<f32>>,
    /// Input samples carried between calls, per channel.
    history_len: usize,
    history: Vec<Vec<f32>>,
}

impl Resampler {
    /// Creates a resampler converting `rate_in` to `rate_out`.
    pub fn new(rate_in: u32, rate_out: u32, channels: usize, quality: ResampleQuality) -> Self {
        assert!(rate_in > 0 && rate_out > 0, "rates must be non-zero");
        assert!(channels > 0, "channel count must be non-zero");

        let g = gcd(rate_out as usize, rate_in as usize);
        let p = rate_out as usize / g;
        let q = rate_in as usize / g;

        let (polyphase, history_len) = if p == q {
            (Vec::new(), 0)
        } else {
            match quality {
                ResampleQuality::Linear => (Vec::new(), 1),
                ResampleQuality::Sinc { small } => {
                    let factor = p.max(q);
                    let num_taps = if small { 8 * factor + 1 } else { 40 * factor + 1 };
                    let cutoff = 0.9 / factor as f32;
                    let prototype = design_lowpass(num_taps, cutoff);

                    // Sub-filter k takes prototype taps k, k+P, k+2P, ...
                    let taps_per_phase = num_taps.div_ceil(p);
                    let mut polyphase = vec![vec![0.0f32; taps_per_phase]; p];
                    for (tap_idx, &coeff) in prototype.iter().enumerate() {
                        polyphase[tap_idx % p][tap_idx / p] = coeff;
                    }
                    (polyphase, taps_per_phase - 1)
                }
            }
        };

        Self {
            p,
            q,
            channels,
            quality,
            polyphase,
            history_len,
            history: vec![vec![0.0; history_len]; channels],
        }
    }

    /// True when input and output rates are equal.
    pub fn is_passthrough(&self) -> bool {
        self.p == self.q
    }

    /// Number of output samples produced for `input_len` interleaved samples.
    pub fn output_len(&self, input_len: usize) -> usize {
        let frames = input_len / self.channels;
        frames * self.p / self.q * self.channels
    }

    /// Clears the carried filter history.
    pub fn reset(&mut self) {
        for h in &mut self.history {
            h.fill(0.0);
        }
    }

    /// Converts one frame of interleaved samples, replacing `output`.
    ///
    /// Produces exactly [`output_len`](Self::output_len) samples. Callers
    /// feed whole-millisecond frames, so `frames * P` divides evenly by `Q`
    /// and no output samples are dropped between calls.
    pub fn resample(&mut self, input: &[i16], output: &mut Vec<i16>) {
        output.clear();
        if self.is_passthrough() {
            output.extend_from_slice(input);
            return;
        }

        let channels = self.channels;
        let in_frames = input.len() / channels;
        let out_frames = in_frames * self.p / self.q;
        output.resize(out_frames * channels, 0);

        for ch in 0..channels {
            let mut extended = Vec::with_capacity(self.history_len + in_frames);
            extended.extend_from_slice(&self.history[ch]);
            extended.extend((0..in_frames).map(|f| f32::from(input[f * channels + ch])));

            for k in 0..out_frames {
                let full = k * self.q;
                let n = full / self.p;
                let phase = full % self.p;

                let value = match self.quality {
                    ResampleQuality::Linear => {
                        // One sample of latency keeps both taps in range.
                        let frac = phase as f32 / self.p as f32;
                        let s0 = extended[self.history_len + n - 1];
                        let s1 = extended[self.history_len + n];
                        s0 + frac * (s1 - s0)
                    }
                    ResampleQuality::Sinc { .. } => {
                        let sub = &self.polyphase[phase];
                        let base = self.history_len + n;
                        let mut acc = 0.0f32;
                        for (i, &coeff) in sub.iter().enumerate() {
                            acc += coeff * extended[base - i];
                        }
                        acc * self.p as f32
                    }
                };

                output[k * channels + ch] = saturate16(value.round() as i32);
            }

            let tail = extended.len() - self.history_len;
            self.history[ch].copy_from_slice(&extended[tail..]);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    /// Generate a sine wave at `frequency` Hz, sampled at `sample_rate` Hz.
    fn sine_wave(frequency: f32, sample_rate: f32, amplitude: f32, num_samples: usize) -> Vec<i16> {
        (0..num_samples)
            .map(|i| {
                let phase = 2.0 * PI * frequency * i as f32 / sample_rate;
                (phase.sin() * amplitude) as i16
            })
            .collect()
    }

    /// Estimate the amplitude of a frequency component via a direct DFT bin.
    fn spectral_peak_at(signal: &[i16], freq_hz: f32, sample_rate: f32) -> f32 {
        let mut re = 0.0f32;
        let mut im = 0.0f32;
        for (i, &s) in signal.iter().enumerate() {
            let phase = 2.0 * PI * freq_hz * i as f32 / sample_rate;
            re += f32::from(s) * phase.cos();
            im += f32::from(s) * phase.sin();
        }
        2.0 * (re * re + im * im).sqrt() / signal.len() as f32
    }

    #[test]
    fn lowpass_is_symmetric_with_unity_dc() {
        let coeffs = design_lowpass(65, 0.4);
        let n = coeffs.len();
        for i in 0..n / 2 {
            assert!((coeffs[i] - coeffs[n - 1 - i]).abs() < 1e-6);
        }
        let sum: f32 = coeffs.iter().sum();
        assert!((sum - 1.0).abs() < 1e-5);
    }

    #[test]
    fn passthrough_is_identity() {
        let mut rs = Resampler::new(8000, 8000, 1, ResampleQuality::default());
        let input: Vec<i16> = (0..160).map(|i| i as i16).collect();
        let mut output = Vec::new();
        rs.resample(&input, &mut output);
        assert_eq!(output, input);
    }

    #[test]
    fn output_length_follows_ratio() {
        let cases = [(16000u32, 8000u32, 320usize, 160usize), (8000, 48000, 160, 960), (48000, 16000, 960, 320)];
        for (rin, rout, in_len, out_len) in cases {
            let mut rs = Resampler::new(rin, rout, 1, ResampleQuality::default());
            let mut output = Vec::new();
            rs.resample(&vec![0i16; in_len], &mut output);
            assert_eq!(output.len(), out_len, "{rin} -> {rout}");
            assert_eq!(rs.output_len(in_len), out_len);
        }
    }

    #[test]
    fn tone_survives_downsampling() {
        // 1 kHz sine at 16 kHz downsampled to 8 kHz, streamed in 20 ms frames.
        let signal = sine_wave(1000.0, 16000.0, 10000.0, 16000);
        let mut rs = Resampler::new(16000, 8000, 1, ResampleQuality::default());
        let mut out = Vec::new();
        let mut scratch = Vec::new();
        for frame in signal.chunks(320) {
            rs.resample(frame, &mut scratch);
            out.extend_from_slice(&scratch);
        }
        assert_eq!(out.len(), 8000);
        let peak = spectral_peak_at(&out[800..], 1000.0, 8000.0);
        assert!(peak > 7000.0, "tone lost in downsampling, peak={peak}");
    }

    #[test]
    fn tone_survives_upsampling() {
        let signal = sine_wave(1000.0, 8000.0, 10000.0, 8000);
        let mut rs = Resampler::new(8000, 48000, 1, ResampleQuality::default());
        let mut out = Vec::new();
        let mut scratch = Vec::new();
        for frame in signal.chunks(160) {
            rs.resample(frame, &mut scratch);
            out.extend_from_slice(&scratch);
        }
        assert_eq!(out.len(), 48000);
        let peak = spectral_peak_at(&out[4800..], 1000.0, 48000.0);
        assert!(peak > 7000.0, "tone lost in upsampling, peak={peak}");
    }

    #[test]
    fn streaming_matches_single_shot() {
        // Feeding frame-by-frame must equal feeding the whole signal at once.
        let signal = sine_wave(700.0, 16000.0, 12000.0, 3200);

        let mut whole = Resampler::new(16000, 8000, 1, ResampleQuality::default());
        let mut whole_out = Vec::new();
        whole.resample(&signal, &mut whole_out);

        let mut streamed = Resampler::new(16000, 8000, 1, ResampleQuality::default());
        let mut streamed_out = Vec::new();
        let mut scratch = Vec::new();
        for frame in signal.chunks(320) {
            streamed.resample(frame, &mut scratch);
            streamed_out.extend_from_slice(&scratch);
        }

        assert_eq!(whole_out, streamed_out);
    }

    #[test]
    fn linear_mode_tracks_constant_signal() {
        let mut rs = Resampler::new(8000, 16000, 1, ResampleQuality::Linear);
        let input = vec![5000i16; 160];
        let mut output = Vec::new();
        rs.resample(&input, &mut output);
        assert_eq!(output.len(), 320);
        // After the one-sample warm-up the interpolator must sit on the value.
        assert!(output[4..].iter().all(|&s| s == 5000));
    }

    #[test]
    fn stereo_channels_stay_independent() {
        let mut rs = Resampler::new(16000, 8000, 2, ResampleQuality::Linear);
        // Left constant 1000, right constant -2000, interleaved.
        let mut input = Vec::new();
        for _ in 0..320 {
            input.push(1000i16);
            input.push(-2000i16);
        }
        let mut output = Vec::new();
        rs.resample(&input, &mut output);
        assert_eq!(output.len(), 320);
        for pair in output[8..].chunks(2) {
            assert_eq!(pair[0], 1000);
            assert_eq!(pair[1], -2000);
        }
    }
}
