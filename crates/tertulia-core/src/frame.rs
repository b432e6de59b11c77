//! Media frames exchanged with bridge ports.
//!
//! A [`Frame`] is a reusable buffer: the owner allocates it once (sized to the
//! port's samples-per-frame) and hands it to `pull_frame`/`push_frame` every
//! tick. Producers overwrite the payload and set the kind; they never
//! reallocate unless the frame is too small.

/// What a [`Frame`] carries for one tick.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum FrameKind {
    /// No media this tick. The mixer treats this as silence.
    #[default]
    None,
    /// PCM16 audio in [`Frame::samples`].
    Audio,
    /// Encoded or raw video in [`Frame::payload`].
    Video,
}

/// A reusable media buffer.
///
/// Audio frames carry interleaved PCM16 in `samples`; video frames carry raw
/// bytes in `payload`. The timestamp is in the producer's clock units (sample
/// count for audio, 90 kHz units for video).
#[derive(Clone, Debug, Default)]
pub struct Frame {
    /// What the frame carries.
    pub kind: FrameKind,
    /// Interleaved PCM16 samples, valid when `kind` is [`FrameKind::Audio`].
    pub samples: Vec<i16>,
    /// Payload bytes, valid when `kind` is [`FrameKind::Video`].
    pub payload: Vec<u8>,
    /// Presentation timestamp in the producer's clock units.
    pub timestamp: u64,
}

impl Frame {
    /// Creates an audio frame holding `samples` zeroed PCM16 samples.
    pub fn audio(samples: usize) -> Self {
        Self {
            kind: FrameKind::Audio,
            samples: vec![0; samples],
            payload: Vec::new(),
            timestamp: 0,
        }
    }

    /// Creates an empty silence frame.
    pub fn silent() -> Self {
        Self::default()
    }

    /// Marks the frame as silence without shrinking its buffers.
    ///
    /// The sample buffer is zeroed so a consumer that ignores the kind still
    /// reads silence.
    pub fn make_silence(&mut self) {
        self.kind = FrameKind::None;
        self.samples.fill(0);
        self.payload.clear();
    }

    /// Returns true when the frame carries no media.
    pub fn is_silence(&self) -> bool {
        self.kind == FrameKind::None
    }
}
