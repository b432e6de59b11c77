//! The port abstraction and built-in port implementations.
//!
//! A port is the bridge's view of an endpoint: something that can produce
//! frames (`pull_frame`), consume frames (`push_frame`), or both. Ports are
//! created by the application and handed to the bridge, which takes shared
//! ownership; a port never holds a reference back to the bridge.

use parking_lot::Mutex;
use std::sync::Arc;

use tertulia_core::{Frame, FrameKind};

use crate::{Error, Result};

/// The media a port carries.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum MediaKind {
    /// PCM16 audio.
    Audio,
    /// Video frames. Video ports cannot be attached to the bridge.
    Video,
}

/// PCM format of a port or of the bridge itself.
///
/// `samples_per_frame` counts interleaved samples across all channels, so a
/// 20 ms mono frame at 8 kHz is 160 and its stereo counterpart is 320.
#[derive(Clone, Copy, Debug, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub struct AudioFormat {
    /// Sampling clock rate in Hz.
    pub clock_rate: u32,
    /// Number of interleaved channels.
    pub channel_count: u16,
    /// Bits per sample. Only 16 is supported by the bridge.
    pub bits_per_sample: u16,
    /// Interleaved samples per frame across all channels.
    pub samples_per_frame: u32,
}

impl AudioFormat {
    /// Creates a 16-bit format.
    pub fn new(clock_rate: u32, channel_count: u16, samples_per_frame: u32) -> Self {
        Self {
            clock_rate,
            channel_count,
            bits_per_sample: 16,
            samples_per_frame,
        }
    }

    /// Samples per frame for a single channel.
    pub fn samples_per_channel(&self) -> u32 {
        self.samples_per_frame / u32::from(self.channel_count.max(1))
    }

    /// Frame duration in milliseconds, rounded down.
    pub fn ptime_ms(&self) -> u32 {
        if self.clock_rate == 0 {
            return 0;
        }
        self.samples_per_channel() * 1000 / self.clock_rate
    }
}

/// Video stream details carried by file-reader ports.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct VideoInfo {
    /// Frame width in pixels.
    pub width: u32,
    /// Frame height in pixels.
    pub height: u32,
    /// Frame rate numerator.
    pub fps_num: u32,
    /// Frame rate denominator.
    pub fps_den: u32,
}

/// Descriptive information about a port.
#[derive(Clone, Debug)]
pub struct PortInfo {
    /// Human-readable port name.
    pub name: String,
    /// Media kind.
    pub kind: MediaKind,
    /// Native PCM format (nominal for video ports).
    pub format: AudioFormat,
    /// Video details, present on video ports.
    pub video: Option<VideoInfo>,
}

impl PortInfo {
    /// Creates info for an audio port.
    pub fn audio(name: impl Into<String>, format: AudioFormat) -> Self {
        Self {
            name: name.into(),
            kind: MediaKind::Audio,
            format,
            video: None,
        }
    }

    /// Creates info for a video port with a nominal 90 kHz clock.
    pub fn video(name: impl Into<String>, video: VideoInfo) -> Self {
        Self {
            name: name.into(),
            kind: MediaKind::Video,
            format: AudioFormat::new(90_000, 1, 0),
            video: Some(video),
        }
    }
}

/// Enable/disable request for one direction of a port.
///
/// `tx` is the port-to-bridge direction (the port transmits); `rx` is the
/// bridge-to-port direction (the port receives the mix).
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum PortOp {
    /// Leave the current setting untouched.
    #[default]
    NoChange,
    /// Allow media flow in this direction.
    Enable,
    /// Block media flow in this direction.
    Disable,
}

/// A media endpoint attached to the bridge.
///
/// The bridge calls `pull_frame` at most once per tick on transmitting ports
/// and `push_frame` once per tick on receiving ports. Neither call may block
/// on the bridge itself; implementations may block on their own transport.
/// A pull that fills a [`FrameKind::None`] frame, or returns an error, is
/// treated as silence for the tick — the port is not removed.
pub trait Port {
    /// Describes the port. Must be stable for the port's lifetime.
    fn info(&self) -> &PortInfo;

    /// Produces one frame in the port's native format.
    fn pull_frame(&mut self, frame: &mut Frame) -> Result<()> {
        frame.make_silence();
        Err(Error::NotSupported("pull_frame"))
    }

    /// Consumes one mixed frame in the port's native format.
    fn push_frame(&mut self, frame: &Frame) -> Result<()> {
        let _ = frame;
        Err(Error::NotSupported("push_frame"))
    }

    /// Called once when the bridge releases the port, after the tick that
    /// removed it has completed.
    fn on_destroy(&mut self) {}
}

/// A port that produces silence and discards everything pushed to it.
///
/// The default master port: it keeps the clock slot occupied when the
/// application has no device to attach.
pub struct SilencePort {
    info: PortInfo,
}

impl SilencePort {
    /// Creates a silence port with the given name and format.
    pub fn new(name: impl Into<String>, format: AudioFormat) -> Self {
        Self {
            info: PortInfo::audio(name, format),
        }
    }
}

impl Port for SilencePort {
    fn info(&self) -> &PortInfo {
        &self.info
    }

    fn pull_frame(&mut self, frame: &mut Frame) -> Result<()> {
        frame.make_silence();
        Ok(())
    }

    fn push_frame(&mut self, _frame: &Frame) -> Result<()> {
        Ok(())
    }
}

/// A memory-backed port: plays a sample buffer and records pushed frames.
///
/// The capture buffer is shared, so the application can keep reading it
/// after the port itself has moved into the bridge.
pub struct MemoryPort {
    info: PortInfo,
    playback: Vec<i16>,
    play_pos: usize,
    looping: bool,
    captured: Arc<Mutex<Vec<i16>>>,
    timestamp: u64,
}

impl MemoryPort {
    /// Creates a port with no playback material; it pulls silence.
    pub fn new(name: impl Into<String>, format: AudioFormat) -> Self {
        Self {
            info: PortInfo::audio(name, format),
            playback: Vec::new(),
            play_pos: 0,
            looping: false,
            captured: Arc::new(Mutex::new(Vec::new())),
            timestamp: 0,
        }
    }

    /// Creates a port that plays `samples`, optionally looping.
    pub fn with_playback(
        name: impl Into<String>,
        format: AudioFormat,
        samples: Vec<i16>,
        looping: bool,
    ) -> Self {
        let mut port = Self::new(name, format);
        port.playback = samples;
        port.looping = looping;
        port
    }

    /// Shared handle to the capture buffer; clone it before `add_port`.
    pub fn capture_buffer(&self) -> Arc<Mutex<Vec<i16>>> {
        Arc::clone(&self.captured)
    }
}

impl Port for MemoryPort {
    fn info(&self) -> &PortInfo {
        &self.info
    }

    fn pull_frame(&mut self, frame: &mut Frame) -> Result<()> {
        let spf = self.info.format.samples_per_frame as usize;
        if self.playback.is_empty() || (!self.looping && self.play_pos >= self.playback.len()) {
            frame.make_silence();
            return Ok(());
        }

        frame.kind = FrameKind::Audio;
        frame.samples.resize(spf, 0);
        frame.timestamp = self.timestamp;
        for slot in frame.samples.iter_mut() {
            if self.play_pos >= self.playback.len() {
                if !self.looping {
                    *slot = 0;
                    continue;
                }
                self.play_pos = 0;
            }
            *slot = self.playback[self.play_pos];
            self.play_pos += 1;
        }
        self.timestamp += u64::from(self.info.format.samples_per_channel());
        Ok(())
    }

    fn push_frame(&mut self, frame: &Frame) -> Result<()> {
        let spf = self.info.format.samples_per_frame as usize;
        let mut captured = self.captured.lock();
        match frame.kind {
            FrameKind::Audio => captured.extend_from_slice(&frame.samples),
            // Keep the capture timeline aligned across silent ticks.
            _ => captured.extend(std::iter::repeat_n(0i16, spf)),
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn fmt() -> AudioFormat {
        AudioFormat::new(8000, 1, 160)
    }

    #[test]
    fn format_derives_ptime() {
        assert_eq!(fmt().ptime_ms(), 20);
        assert_eq!(AudioFormat::new(16000, 2, 640).ptime_ms(), 20);
        assert_eq!(AudioFormat::new(16000, 2, 640).samples_per_channel(), 320);
    }

    #[test]
    fn silence_port_pulls_none() {
        let mut port = SilencePort::new("quiet", fmt());
        let mut frame = Frame::audio(160);
        port.pull_frame(&mut frame).unwrap();
        assert!(frame.is_silence());
    }

    #[test]
    fn memory_port_plays_and_loops() {
        let samples: Vec<i16> = (0..200).map(|i| i as i16).collect();
        let mut port = MemoryPort::with_playback("mem", fmt(), samples, true);
        let mut frame = Frame::audio(160);

        port.pull_frame(&mut frame).unwrap();
        assert_eq!(frame.kind, FrameKind::Audio);
        assert_eq!(frame.samples[0], 0);
        assert_eq!(frame.samples[159], 159);

        port.pull_frame(&mut frame).unwrap();
        assert_eq!(frame.samples[0], 160);
        // Wrapped back to the start after 200 samples.
        assert_eq!(frame.samples[40], 0);
    }

    #[test]
    fn memory_port_without_loop_runs_dry() {
        let mut port = MemoryPort::with_playback("mem", fmt(), vec![5; 160], false);
        let mut frame = Frame::audio(160);
        port.pull_frame(&mut frame).unwrap();
        assert_eq!(frame.kind, FrameKind::Audio);
        port.pull_frame(&mut frame).unwrap();
        assert!(frame.is_silence());
    }

    #[test]
    fn memory_port_captures_pushes() {
        let mut port = MemoryPort::new("mem", fmt());
        let captured = port.capture_buffer();

        let mut frame = Frame::audio(160);
        frame.samples.fill(7);
        port.push_frame(&frame).unwrap();

        frame.make_silence();
        port.push_frame(&frame).unwrap();

        let data = captured.lock();
        assert_eq!(data.len(), 320);
        assert!(data[..160].iter().all(|&s| s == 7));
        assert!(data[160..].iter().all(|&s| s == 0));
    }
}
