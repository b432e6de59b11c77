//! AVI stream readers.
//!
//! [`AviReader::open`] parses the container headers, filters the streams it
//! can play, and yields one [`AviStream`] per survivor. Each stream owns an
//! independent file handle positioned at the start of the movi section and
//! implements the bridge [`Port`] trait on its pull side, so audio streams
//! attach to a conference slot directly.
//!
//! Frame production walks movi sub-chunks: a stream takes only chunks whose
//! two-digit prefix matches its container index, honors WORD padding, reads
//! audio across chunk boundaries, and decodes A-law/µ-law payloads to PCM16
//! on the fly (doubling the emitted byte count). EOF is raised exactly once
//! per epoch, through the shared event channel and the optional callback;
//! with looping enabled the sibling set rewinds together once every stream
//! has drained.

use crossbeam_channel::{Receiver, Sender, unbounded};
use std::fs::File;
use std::io::{Read, Seek, SeekFrom};
use std::path::Path;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use tracing::{debug, trace, warn};

use tertulia_bridge::{AudioFormat, MediaKind, Port, PortInfo, VideoInfo};
use tertulia_core::{Frame, FrameKind, alaw_to_linear, ulaw_to_linear};

use crate::riff::{
    self, AVIF_MUSTUSEINDEX, AVISF_DISABLED, AVISF_VIDEO_PALCHANGES, ChunkHeader, FourCc,
    StreamFormat, WAVE_FMT_ALAW, WAVE_FMT_PCM, WAVE_FMT_ULAW,
};
use crate::sync::{AvSync, MediaId};
use crate::{Error, Result};

/// Maximum number of container streams the reader accepts.
pub const MAX_STREAMS: usize = 4;

/// Timestamp clock rate for video streams.
const VIDEO_CLOCK_RATE: u64 = 90_000;

/// Frame duration produced by audio stream ports, in milliseconds.
const AUDIO_PTIME_MS: u32 = 20;

/// Reader options.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub struct AviOptions {
    /// Stop at end of file instead of rewinding.
    #[serde(default)]
    pub no_loop: bool,
    /// Disable cross-stream presentation-time synchronization.
    #[serde(default)]
    pub no_sync: bool,
}

/// Events posted on the reader's shared channel.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum AviEvent {
    /// The stream with this reader index reached end of file.
    EndOfFile {
        /// Index of the stream within the reader.
        stream: usize,
    },
}

/// Audio payload encodings the reader can decode.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum AudioCodec {
    /// Linear 16-bit PCM.
    Pcm16,
    /// G.711 A-law, decoded to PCM16.
    Alaw,
    /// G.711 µ-law, decoded to PCM16.
    Ulaw,
}

/// Video codecs the reader passes through.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[allow(missing_docs)]
pub enum VideoCodec {
    Mjpeg,
    H264,
    Uyvy,
    Yuy2,
    Iyuv,
    I420,
    Dib,
    Rgb24,
    Rgb32,
    Mpeg4,
}

fn map_video_codec(codec: FourCc, bit_count: u16) -> Option<VideoCodec> {
    match &codec.0 {
        b"MJPG" | b"mjpg" => Some(VideoCodec::Mjpeg),
        b"H264" | b"h264" | b"X264" | b"x264" | b"avc1" => Some(VideoCodec::H264),
        b"UYVY" => Some(VideoCodec::Uyvy),
        b"YUY2" => Some(VideoCodec::Yuy2),
        b"IYUV" => Some(VideoCodec::Iyuv),
        b"I420" => Some(VideoCodec::I420),
        b"DIB " => Some(VideoCodec::Dib),
        // The MPEG-4 ASP FourCC family.
        b"XVID" | b"xvid" | b"DIVX" | b"divx" | b"FMP4" | b"DX50" => Some(VideoCodec::Mpeg4),
        // BI_RGB: uncompressed, layout determined by the bit count.
        [0, 0, 0, 0] => match bit_count {
            24 => Some(VideoCodec::Rgb24),
            32 => Some(VideoCodec::Rgb32),
            _ => None,
        },
        _ => None,
    }
}

#[derive(Clone, Copy, Debug)]
enum StreamDetail {
    Audio {
        codec: AudioCodec,
        clock_rate: u32,
        channels: u16,
    },
    Video {
        fps_num: u32,
        fps_den: u32,
        codec: VideoCodec,
    },
}

struct SharedStreams {
    num_streams: usize,
    eof_cnt: AtomicUsize,
    avsync: Option<AvSync>,
    event_tx: Sender<AviEvent>,
}

/// One playable stream of an AVI file.
///
/// Implements [`Port`] on the pull side; pushing is not supported.
pub struct AviStream {
    file: File,
    /// Index of this stream within the reader's usable set.
    index: usize,
    /// The container stream number matched against chunk-id prefixes.
    container_id: usize,
    info: PortInfo,
    detail: StreamDetail,
    options: AviOptions,
    start_data: u64,
    fsize: u64,
    /// Unread bytes of the current own chunk.
    size_left: u32,
    /// Pending WORD-alignment byte before the next chunk header.
    pad: u8,
    /// Sample frames (audio) or frames (video) consumed since the epoch.
    frame_cnt: u64,
    next_ts: u64,
    /// 0 = live, 1 = at EOF, 2 = EOF reported.
    eof: u8,
    slow_down_frames: u64,
    sync_media: Option<MediaId>,
    shared: Arc<SharedStreams>,
    eof_cb: Option<Box<dyn FnMut(usize) + Send>>,
    byte_scratch: Vec<u8>,
}

/// The opened container: its usable streams plus the shared event channel.
pub struct AviReader {
    streams: Vec<AviStream>,
    events: Receiver<AviEvent>,
    data_len: u64,
}

impl AviReader {
    /// Opens an AVI file and builds a reader per supported stream.
    ///
    /// Unsupported streams are skipped with a log entry; a file with no
    /// usable stream is rejected.
    pub fn open(path: impl AsRef<Path>, options: AviOptions) -> Result<Self> {
        let path = path.as_ref();
        let mut file = File::open(path)?;
        let fsize = file.metadata()?.len();
        let layout = riff::read_layout(&mut file)?;
        drop(file);

        if layout.main.num_streams as usize > MAX_STREAMS {
            return Err(Error::NotSupported("too many streams"));
        }
        if layout.main.flags & AVIF_MUSTUSEINDEX != 0 {
            warn!("AVI requires its index; playback may misbehave");
        }
        debug!(
            num_streams = layout.main.num_streams,
            movi_start = layout.movi_start,
            "AVI header parsed"
        );

        let fname = path
            .file_name()
            .and_then(|n| n.to_str())
            .unwrap_or("stream");

        let mut picked = Vec::new();
        for (i, raw) in layout.streams.iter().enumerate() {
            if raw.header.flags & AVISF_DISABLED != 0 {
                debug!(stream = i, "skipping disabled stream");
                continue;
            }
            match raw.format {
                StreamFormat::Video(fmt) => {
                    if raw.header.flags & AVISF_VIDEO_PALCHANGES != 0 {
                        debug!(stream = i, "skipping palette-change video stream");
                        continue;
                    }
                    let Some(codec) = map_video_codec(raw.header.codec, fmt.bit_count) else {
                        debug!(stream = i, codec = %raw.header.codec, "unsupported video stream");
                        continue;
                    };
                    let fps_num = if raw.header.rate == 0 {
                        25
                    } else {
                        raw.header.rate
                    };
                    let fps_den = raw.header.scale.max(1);
                    let info = PortInfo::video(
                        format!("video-of-{fname}"),
                        VideoInfo {
                            width: fmt.width.unsigned_abs(),
                            height: fmt.height.unsigned_abs(),
                            fps_num,
                            fps_den,
                        },
                    );
                    picked.push((
                        i,
                        StreamDetail::Video {
                            fps_num,
                            fps_den,
                            codec,
                        },
                        info,
                    ));
                }
                StreamFormat::Audio(fmt) => {
                    let codec = match fmt.format_tag {
                        WAVE_FMT_PCM if fmt.bits_per_sample == 16 => AudioCodec::Pcm16,
                        WAVE_FMT_ALAW => AudioCodec::Alaw,
                        WAVE_FMT_ULAW => AudioCodec::Ulaw,
                        tag => {
                            debug!(stream = i, tag, "unsupported audio stream");
                            continue;
                        }
                    };
                    let clock_rate = fmt.samples_per_sec;
                    let channels = fmt.channels.max(1);
                    if clock_rate == 0 {
                        debug!(stream = i, "skipping audio stream with zero rate");
                        continue;
                    }
                    let spf = clock_rate * AUDIO_PTIME_MS / 1000 * u32::from(channels);
                    let info = PortInfo::audio(
                        format!("audio-of-{fname}"),
                        AudioFormat::new(clock_rate, channels, spf),
                    );
                    picked.push((
                        i,
                        StreamDetail::Audio {
                            codec,
                            clock_rate,
                            channels,
                        },
                        info,
                    ));
                }
                StreamFormat::Other => {
                    debug!(stream = i, "skipping non-audio/video stream");
                }
            }
        }
        if picked.is_empty() {
            return Err(Error::NotSupported("no usable streams"));
        }

        let (event_tx, events) = unbounded();
        let avsync = (!options.no_sync).then(AvSync::new);
        let shared = Arc::new(SharedStreams {
            num_streams: picked.len(),
            eof_cnt: AtomicUsize::new(0),
            avsync,
            event_tx,
        });

        let mut streams = Vec::with_capacity(shared.num_streams);
        for (index, (container_id, detail, info)) in picked.into_iter().enumerate() {
            let mut stream_file = File::open(path)?;
            stream_file.seek(SeekFrom::Start(layout.movi_start))?;

            let sync_media = shared.avsync.as_ref().map(|avsync| match detail {
                StreamDetail::Audio { clock_rate, .. } => {
                    avsync.add_media(MediaKind::Audio, clock_rate)
                }
                StreamDetail::Video { .. } => {
                    avsync.add_media(MediaKind::Video, VIDEO_CLOCK_RATE as u32)
                }
            });

            streams.push(AviStream {
                file: stream_file,
                index,
                container_id,
                info,
                detail,
                options,
                start_data: layout.movi_start,
                fsize,
                size_left: 0,
                pad: 0,
                frame_cnt: 0,
                next_ts: 0,
                eof: 0,
                slow_down_frames: 0,
                sync_media,
                shared: Arc::clone(&shared),
                eof_cb: None,
                byte_scratch: Vec::new(),
            });
        }

        debug!(file = fname, streams = streams.len(), "AVI reader created");
        Ok(Self {
            streams,
            events,
            data_len: fsize - layout.movi_start,
        })
    }

    /// Number of usable streams.
    pub fn num_streams(&self) -> usize {
        self.streams.len()
    }

    /// Number of usable streams of the given kind.
    pub fn num_streams_by_kind(&self, kind: MediaKind) -> usize {
        self.streams.iter().filter(|s| s.kind() == kind).count()
    }

    /// The usable streams, in container order.
    pub fn streams(&self) -> &[AviStream] {
        &self.streams
    }

    /// Mutable access to one stream, e.g. to register an EOF callback.
    pub fn stream_mut(&mut self, index: usize) -> Option<&mut AviStream> {
        self.streams.get_mut(index)
    }

    /// First usable stream of the given kind, if any.
    pub fn stream_by_kind(&self, kind: MediaKind) -> Option<&AviStream> {
        self.streams.iter().find(|s| s.kind() == kind)
    }

    /// A handle to the shared event channel.
    pub fn events(&self) -> Receiver<AviEvent> {
        self.events.clone()
    }

    /// Length of the movi section in bytes.
    pub fn data_len(&self) -> u64 {
        self.data_len
    }

    /// Splits the reader into its streams and the event channel, so streams
    /// can move into the bridge while the application keeps the events.
    pub fn into_parts(self) -> (Vec<AviStream>, Receiver<AviEvent>) {
        (self.streams, self.events)
    }
}

fn read_fully(file: &mut File, buf: &mut [u8]) -> std::io::Result<usize> {
    let mut filled = 0;
    while filled < buf.len() {
        match file.read(&mut buf[filled..]) {
            Ok(0) => break,
            Ok(n) => filled += n,
            Err(e) if e.kind() == std::io::ErrorKind::Interrupted => {}
            Err(e) => return Err(e),
        }
    }
    Ok(filled)
}

impl AviStream {
    /// The stream's media kind.
    pub fn kind(&self) -> MediaKind {
        self.info.kind
    }

    /// Index of this stream within its reader.
    pub fn index(&self) -> usize {
        self.index
    }

    /// Audio codec, for audio streams.
    pub fn audio_codec(&self) -> Option<AudioCodec> {
        match self.detail {
            StreamDetail::Audio { codec, .. } => Some(codec),
            StreamDetail::Video { .. } => None,
        }
    }

    /// Video codec, for video streams.
    pub fn video_codec(&self) -> Option<VideoCodec> {
        match self.detail {
            StreamDetail::Video { codec, .. } => Some(codec),
            StreamDetail::Audio { .. } => None,
        }
    }

    /// Length of the movi section in bytes.
    pub fn data_len(&self) -> u64 {
        self.fsize - self.start_data
    }

    /// The presentation timestamp of the next frame, in the stream's clock
    /// units (samples for audio, 90 kHz units for video).
    pub fn next_timestamp(&self) -> u64 {
        self.next_ts
    }

    /// True once the stream has hit end of file (until a rewind).
    pub fn at_eof(&self) -> bool {
        self.eof != 0
    }

    /// Registers a callback invoked once per EOF, with the stream index.
    ///
    /// The shared event channel fires regardless; the callback is for
    /// applications that want an immediate notification on the pull thread.
    pub fn set_eof_cb(&mut self, cb: impl FnMut(usize) + Send + 'static) {
        self.eof_cb = Some(Box::new(cb));
    }

    fn is_companded(&self) -> bool {
        matches!(
            self.detail,
            StreamDetail::Audio {
                codec: AudioCodec::Alaw | AudioCodec::Ulaw,
                ..
            }
        )
    }

    fn channels(&self) -> u64 {
        u64::from(self.info.format.channel_count.max(1))
    }

    /// Advances the cursor to the next chunk belonging to this stream.
    /// Returns false on a clean end of the movi data.
    fn advance_to_own_chunk(&mut self) -> Result<bool> {
        loop {
            // Chunk payloads are padded to the nearest WORD boundary.
            if self.pad > 0 {
                self.file.seek(SeekFrom::Current(i64::from(self.pad)))?;
                self.pad = 0;
            }

            let ch = match ChunkHeader::read(&mut self.file) {
                Ok(ch) => ch,
                Err(e) if e.kind() == std::io::ErrorKind::UnexpectedEof => return Ok(false),
                Err(e) => return Err(e.into()),
            };
            self.pad = (ch.len & 1) as u8;

            if ch.id.stream_id() == Some(self.container_id) {
                self.size_left = ch.len;
                trace!(
                    stream = self.index,
                    id = %ch.id,
                    len = ch.len,
                    "movi chunk found"
                );
                return Ok(true);
            }

            if ch.id == FourCc::RIFF {
                warn!("unsupported format: multiple RIFF segments in one file");
                return Err(Error::NotSupported("multiple RIFF segments"));
            }
            if ch.id == FourCc::LIST {
                trace!("unsupported LIST inside movi data, skipping");
            }
            self.file.seek(SeekFrom::Current(i64::from(ch.len)))?;
        }
    }

    /// Marks the epoch's EOF: counts it once and resets the synchronizer
    /// when this was the last sibling to drain.
    fn mark_eof(&mut self) {
        if self.eof != 0 {
            return;
        }
        let cnt = self.shared.eof_cnt.fetch_add(1, Ordering::SeqCst) + 1;
        if let Some(avsync) = &self.shared.avsync {
            if cnt % self.shared.num_streams == 0 {
                avsync.reset();
            }
        }
        self.eof = 1;
        debug!(stream = self.index, name = %self.info.name, "end of file");
    }

    /// Reports EOF exactly once per epoch: posts the event and invokes the
    /// registered callback.
    fn notify_eof(&mut self) {
        self.eof = 2;
        let index = self.index;
        let _ = self.shared.event_tx.send(AviEvent::EndOfFile { stream: index });
        if let Some(cb) = self.eof_cb.as_mut() {
            cb(index);
        }
    }

    fn rewind(&mut self) -> std::io::Result<()> {
        self.file.seek(SeekFrom::Start(self.start_data))?;
        self.eof = 0;
        self.size_left = 0;
        self.pad = 0;
        self.frame_cnt = 0;
        self.next_ts = 0;
        debug!(stream = self.index, name = %self.info.name, "rewinding");
        Ok(())
    }

    /// Skips forward by `frames` (sample frames for audio, frames for
    /// video), walking chunks without reading their payloads.
    fn skip_forward(&mut self, frames: u64) -> Result<()> {
        match self.detail {
            StreamDetail::Audio { .. } => {
                let bytes_per_sample: u64 = if self.is_companded() { 1 } else { 2 };
                let channels = self.channels();
                let mut remaining = frames * channels;

                while remaining > 0 {
                    if self.size_left == 0 && !self.advance_to_own_chunk()? {
                        self.mark_eof();
                        return Err(Error::EndOfFile);
                    }
                    let take_bytes =
                        (remaining * bytes_per_sample).min(u64::from(self.size_left));
                    self.file.seek(SeekFrom::Current(take_bytes as i64))?;
                    self.size_left -= take_bytes as u32;
                    let samples = take_bytes / bytes_per_sample;
                    remaining -= samples;
                    self.frame_cnt += samples / channels;
                }
                self.next_ts = self.frame_cnt;
            }
            StreamDetail::Video {
                fps_num, fps_den, ..
            } => {
                for _ in 0..frames {
                    // Drop whatever is left of the current frame, then one
                    // whole chunk per skipped frame.
                    if self.size_left == 0 && !self.advance_to_own_chunk()? {
                        self.mark_eof();
                        return Err(Error::EndOfFile);
                    }
                    self.file
                        .seek(SeekFrom::Current(i64::from(self.size_left)))?;
                    self.size_left = 0;
                    self.frame_cnt += 1;
                }
                self.next_ts = self.frame_cnt * VIDEO_CLOCK_RATE * u64::from(fps_den)
                    / u64::from(fps_num);
            }
        }
        Ok(())
    }

    /// Applies a synchronizer adjustment. Returns true when the caller
    /// should emit a silence frame instead of reading.
    fn apply_adjustment(&mut self, adjust: i32) -> Result<bool> {
        let detail = self.detail;
        match detail {
            StreamDetail::Audio { clock_rate, .. } => {
                // Audio is never slowed down; only gross drift fast-forwards.
                if adjust < -1000 {
                    let frames = u64::from((-adjust) as u32) * u64::from(clock_rate) / 1000;
                    debug!(
                        stream = self.index,
                        adjust, frames, "audio fast-forwarding"
                    );
                    self.skip_forward(frames)?;
                }
                Ok(false)
            }
            StreamDetail::Video {
                fps_num, fps_den, ..
            } => {
                let ms_to_frames = |ms: u64| ms * u64::from(fps_num) / u64::from(fps_den) / 1000;
                if adjust < -1000 {
                    let frames = ms_to_frames((-adjust) as u64);
                    debug!(stream = self.index, adjust, frames, "video fast-forwarding");
                    self.skip_forward(frames)?;
                    Ok(false)
                } else if adjust > 0 {
                    self.slow_down_frames = ms_to_frames(adjust as u64);
                    debug!(
                        stream = self.index,
                        adjust, frames = self.slow_down_frames, "video slowing down"
                    );
                    Ok(self.slow_down_frames > 0)
                } else {
                    let frames = ms_to_frames((-adjust) as u64).max(1);
                    debug!(stream = self.index, adjust, frames, "video speeding up");
                    self.skip_forward(frames)?;
                    Ok(false)
                }
            }
        }
    }

    fn read_audio_frame(&mut self, frame: &mut Frame) -> Result<()> {
        let StreamDetail::Audio { codec, .. } = self.detail else {
            return Err(Error::InvalidMediaType("not an audio stream"));
        };
        let spf = self.info.format.samples_per_frame as usize;
        let channels = self.channels() as usize;
        let bytes_per_sample = if self.is_companded() { 1 } else { 2 };

        frame.kind = FrameKind::Audio;
        frame.samples.resize(spf, 0);

        let mut filled = 0usize;
        let mut hit_eof = false;
        while filled < spf {
            if self.size_left == 0 {
                match self.advance_to_own_chunk()? {
                    true => {}
                    false => {
                        hit_eof = true;
                        break;
                    }
                }
            }

            let want_bytes = (spf - filled) * bytes_per_sample;
            let take = want_bytes.min(self.size_left as usize);
            self.byte_scratch.resize(take, 0);
            let got = read_fully(&mut self.file, &mut self.byte_scratch)?;
            self.size_left -= got as u32;

            let samples = got / bytes_per_sample;
            match codec {
                AudioCodec::Pcm16 => {
                    for (k, chunk) in self.byte_scratch[..samples * 2].chunks_exact(2).enumerate() {
                        frame.samples[filled + k] = i16::from_le_bytes([chunk[0], chunk[1]]);
                    }
                }
                AudioCodec::Alaw => {
                    for (k, &b) in self.byte_scratch[..samples].iter().enumerate() {
                        frame.samples[filled + k] = alaw_to_linear(b);
                    }
                }
                AudioCodec::Ulaw => {
                    for (k, &b) in self.byte_scratch[..samples].iter().enumerate() {
                        frame.samples[filled + k] = ulaw_to_linear(b);
                    }
                }
            }
            filled += samples;

            if got < take {
                hit_eof = true;
                break;
            }
        }

        if hit_eof {
            self.mark_eof();
            if filled == 0 {
                frame.make_silence();
                frame.timestamp = self.next_ts;
                return Err(Error::EndOfFile);
            }
            // A partial final frame plays out zero-padded.
            frame.samples[filled..].fill(0);
        }

        self.frame_cnt += (filled / channels) as u64;
        self.next_ts = self.frame_cnt;
        Ok(())
    }

    fn read_video_frame(&mut self, frame: &mut Frame) -> Result<()> {
        let StreamDetail::Video {
            fps_num, fps_den, ..
        } = self.detail
        else {
            return Err(Error::InvalidMediaType("not a video stream"));
        };

        if self.size_left == 0 && !self.advance_to_own_chunk()? {
            self.mark_eof();
            frame.make_silence();
            frame.timestamp = self.next_ts;
            return Err(Error::EndOfFile);
        }

        frame.kind = FrameKind::Video;
        let len = self.size_left as usize;
        frame.payload.resize(len, 0);
        let got = read_fully(&mut self.file, &mut frame.payload)?;
        self.size_left = 0;
        if got < len {
            frame.payload.truncate(got);
            self.mark_eof();
            if got == 0 {
                frame.make_silence();
                frame.timestamp = self.next_ts;
                return Err(Error::EndOfFile);
            }
        }

        self.frame_cnt += 1;
        self.next_ts =
            self.frame_cnt * VIDEO_CLOCK_RATE * u64::from(fps_den) / u64::from(fps_num);
        Ok(())
    }
}

impl Port for AviStream {
    fn info(&self) -> &PortInfo {
        &self.info
    }

    fn pull_frame(&mut self, frame: &mut Frame) -> tertulia_bridge::Result<()> {
        // Synchronize against the sibling streams while live.
        if let Some(media) = self.sync_media {
            if self.eof == 0 {
                if self.slow_down_frames > 0 {
                    self.slow_down_frames -= 1;
                    frame.make_silence();
                    frame.timestamp = self.next_ts;
                    return Ok(());
                }

                let adjust = self
                    .shared
                    .avsync
                    .as_ref()
                    .map_or(0, |avsync| avsync.update_pts(media, self.next_ts));
                if adjust != 0 {
                    match self.apply_adjustment(adjust) {
                        Ok(true) => {
                            frame.make_silence();
                            frame.timestamp = self.next_ts;
                            return Ok(());
                        }
                        Ok(false) => {}
                        Err(err) => {
                            frame.make_silence();
                            frame.timestamp = self.next_ts;
                            return Err(err.into());
                        }
                    }
                }
            }
        }

        frame.timestamp = self.next_ts;

        if self.eof != 0 {
            // With synchronization, wait until every sibling has drained
            // before rewinding, so the loop epoch starts together.
            let rewind_now = if self.shared.avsync.is_some() {
                self.shared.eof_cnt.load(Ordering::SeqCst) % self.shared.num_streams == 0
            } else {
                true
            };

            if self.eof == 1 {
                self.notify_eof();
            }

            if self.options.no_loop {
                frame.make_silence();
                return Err(tertulia_bridge::Error::EndOfFile);
            }
            if !rewind_now {
                frame.make_silence();
                return Ok(());
            }

            self.rewind()
                .map_err(|e| tertulia_bridge::Error::Internal(e.to_string()))?;
            frame.timestamp = self.next_ts;
        }

        let result = match self.info.kind {
            MediaKind::Audio => self.read_audio_frame(frame),
            MediaKind::Video => self.read_video_frame(frame),
        };
        result.map_err(tertulia_bridge::Error::from)
    }
}
