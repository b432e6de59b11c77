//! RIFF/AVI on-disk structures.
//!
//! Standard AVI layout, all fields little-endian:
//!
//! ```text
//! RIFF('AVI ')
//!   LIST('hdrl')
//!     avih                        main header
//!     LIST('strl') strh strf ...  one per stream
//!   [JUNK | LIST('INFO') | ...]*
//!   LIST('movi')
//!     ##dc / ##wb ...             sub-chunks, WORD-padded
//! ```
//!
//! Readers here consume exactly the bytes each chunk declares; unknown
//! trailing header bytes are skipped so extended writers still parse.

use byteorder::{LittleEndian, ReadBytesExt};
use std::io::{Read, Seek, SeekFrom};

use crate::{Error, Result};

/// Main-header flag: the file is unplayable without its index.
pub const AVIF_MUSTUSEINDEX: u32 = 0x0000_0020;
/// Stream-header flag: the stream is disabled by default.
pub const AVISF_DISABLED: u32 = 0x0000_0001;
/// Stream-header flag: the video stream carries palette changes.
pub const AVISF_VIDEO_PALCHANGES: u32 = 0x0001_0000;

/// WAVE format tag for linear PCM.
pub const WAVE_FMT_PCM: u16 = 1;
/// WAVE format tag for A-law.
pub const WAVE_FMT_ALAW: u16 = 6;
/// WAVE format tag for µ-law.
pub const WAVE_FMT_ULAW: u16 = 7;

/// A four-character chunk identifier.
#[derive(Clone, Copy, PartialEq, Eq, Hash)]
pub struct FourCc(pub [u8; 4]);

#[allow(missing_docs)] // the well-known container tags are self-describing
impl FourCc {
    pub const RIFF: FourCc = FourCc(*b"RIFF");
    pub const AVI: FourCc = FourCc(*b"AVI ");
    pub const LIST: FourCc = FourCc(*b"LIST");
    pub const HDRL: FourCc = FourCc(*b"hdrl");
    pub const AVIH: FourCc = FourCc(*b"avih");
    pub const STRL: FourCc = FourCc(*b"strl");
    pub const STRH: FourCc = FourCc(*b"strh");
    pub const STRF: FourCc = FourCc(*b"strf");
    pub const MOVI: FourCc = FourCc(*b"movi");
    pub const JUNK: FourCc = FourCc(*b"JUNK");
    pub const VIDS: FourCc = FourCc(*b"vids");
    pub const AUDS: FourCc = FourCc(*b"auds");

    /// Reads one identifier.
    pub fn read(r: &mut impl Read) -> std::io::Result<Self> {
        let mut id = [0u8; 4];
        r.read_exact(&mut id)?;
        Ok(Self(id))
    }

    /// Movi sub-chunk ids start with the two-digit stream number
    /// (`00dc`, `01wb`, ...). Returns it when present.
    pub fn stream_id(&self) -> Option<usize> {
        let [a, b, _, _] = self.0;
        if a.is_ascii_digit() && b.is_ascii_digit() {
            Some(usize::from(a - b'0') * 10 + usize::from(b - b'0'))
        } else {
            None
        }
    }
}

impl std::fmt::Debug for FourCc {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "FourCc({})", self)
    }
}

// Display escapes non-printable bytes so log lines stay readable.
impl std::fmt::Display for FourCc {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        for &b in &self.0 {
            if b.is_ascii_graphic() || b == b' ' {
                write!(f, "{}", b as char)?;
            } else {
                write!(f, "\\x{b:02x}")?;
            }
        }
        Ok(())
    }
}

/// A chunk header: identifier plus payload length (padding excluded).
#[derive(Clone, Copy, Debug)]
pub struct ChunkHeader {
    /// Chunk identifier.
    pub id: FourCc,
    /// Payload length in bytes.
    pub len: u32,
}

impl ChunkHeader {
    /// Reads one chunk header.
    pub fn read(r: &mut impl Read) -> std::io::Result<Self> {
        let id = FourCc::read(r)?;
        let len = r.read_u32::<LittleEndian>()?;
        Ok(Self { id, len })
    }
}

/// The `avih` main header.
#[derive(Clone, Copy, Debug, Default)]
pub struct MainHeader {
    /// Nominal frame interval in microseconds.
    pub usec_per_frame: u32,
    /// Suggested maximum data rate.
    pub max_bytes_per_sec: u32,
    /// Pad-to granularity.
    pub padding_granularity: u32,
    /// AVIF_* flags.
    pub flags: u32,
    /// Total frames in the file.
    pub total_frames: u32,
    /// Frames before the interleaved start.
    pub initial_frames: u32,
    /// Number of streams.
    pub num_streams: u32,
    /// Suggested read buffer size.
    pub suggested_buffer_size: u32,
    /// Video width in pixels.
    pub width: u32,
    /// Video height in pixels.
    pub height: u32,
}

impl MainHeader {
    /// Reads an `avih` payload of `len` bytes.
    pub fn read(r: &mut (impl Read + Seek), len: u32) -> Result<Self> {
        const KNOWN: u32 = 40;
        if len < KNOWN {
            return Err(Error::InvalidMediaType("short avih header"));
        }
        let hdr = Self {
            usec_per_frame: r.read_u32::<LittleEndian>()?,
            max_bytes_per_sec: r.read_u32::<LittleEndian>()?,
            padding_granularity: r.read_u32::<LittleEndian>()?,
            flags: r.read_u32::<LittleEndian>()?,
            total_frames: r.read_u32::<LittleEndian>()?,
            initial_frames: r.read_u32::<LittleEndian>()?,
            num_streams: r.read_u32::<LittleEndian>()?,
            suggested_buffer_size: r.read_u32::<LittleEndian>()?,
            width: r.read_u32::<LittleEndian>()?,
            height: r.read_u32::<LittleEndian>()?,
        };
        r.seek(SeekFrom::Current(i64::from(len - KNOWN)))?;
        Ok(hdr)
    }
}

/// The `strh` stream header.
#[derive(Clone, Copy, Debug)]
pub struct StreamHeader {
    /// Stream type: `vids`, `auds`, ...
    pub stream_type: FourCc,
    /// Codec FourCC.
    pub codec: FourCc,
    /// AVISF_* flags.
    pub flags: u32,
    /// Samples (or frames) per `rate / scale` seconds.
    pub scale: u32,
    /// Rate numerator; `rate / scale` is samples or frames per second.
    pub rate: u32,
    /// Stream length in `scale` units.
    pub length: u32,
    /// Bytes per sample, zero when variable.
    pub sample_size: u32,
}

impl StreamHeader {
    /// Reads a `strh` payload of `len` bytes.
    pub fn read(r: &mut (impl Read + Seek), len: u32) -> Result<Self> {
        const KNOWN: u32 = 48;
        if len < KNOWN {
            return Err(Error::InvalidMediaType("short strh header"));
        }
        let stream_type = FourCc::read(r)?;
        let codec = FourCc::read(r)?;
        let flags = r.read_u32::<LittleEndian>()?;
        let _priority = r.read_u16::<LittleEndian>()?;
        let _language = r.read_u16::<LittleEndian>()?;
        let _initial_frames = r.read_u32::<LittleEndian>()?;
        let scale = r.read_u32::<LittleEndian>()?;
        let rate = r.read_u32::<LittleEndian>()?;
        let _start = r.read_u32::<LittleEndian>()?;
        let length = r.read_u32::<LittleEndian>()?;
        let _suggested_buffer_size = r.read_u32::<LittleEndian>()?;
        let _quality = r.read_u32::<LittleEndian>()?;
        let sample_size = r.read_u32::<LittleEndian>()?;
        r.seek(SeekFrom::Current(i64::from(len - KNOWN)))?;
        Ok(Self {
            stream_type,
            codec,
            flags,
            scale,
            rate,
            length,
            sample_size,
        })
    }
}

/// Audio `strf` payload (WAVEFORMATEX prefix).
#[derive(Clone, Copy, Debug)]
pub struct AudioStreamFormat {
    /// WAVE format tag.
    pub format_tag: u16,
    /// Channel count.
    pub channels: u16,
    /// Sample rate in Hz.
    pub samples_per_sec: u32,
    /// Average byte rate.
    pub avg_bytes_per_sec: u32,
    /// Bytes per sample block.
    pub block_align: u16,
    /// Bits per sample before companding.
    pub bits_per_sample: u16,
}

/// Video `strf` payload (BITMAPINFOHEADER prefix).
#[derive(Clone, Copy, Debug)]
pub struct VideoStreamFormat {
    /// Frame width in pixels.
    pub width: i32,
    /// Frame height in pixels; negative means top-down rows.
    pub height: i32,
    /// Bits per pixel.
    pub bit_count: u16,
    /// Compression FourCC.
    pub compression: FourCc,
}

/// Parsed `strf` payload.
#[derive(Clone, Copy, Debug)]
pub enum StreamFormat {
    /// An `auds` stream.
    Audio(AudioStreamFormat),
    /// A `vids` stream.
    Video(VideoStreamFormat),
    /// Neither audio nor video; kept so stream ids stay aligned.
    Other,
}

impl StreamFormat {
    /// Reads a `strf` payload of `len` bytes for the given stream type.
    pub fn read(r: &mut (impl Read + Seek), stream_type: FourCc, len: u32) -> Result<Self> {
        if stream_type == FourCc::AUDS {
            const KNOWN: u32 = 16;
            if len < KNOWN {
                return Err(Error::InvalidMediaType("short audio strf header"));
            }
            let fmt = AudioStreamFormat {
                format_tag: r.read_u16::<LittleEndian>()?,
                channels: r.read_u16::<LittleEndian>()?,
                samples_per_sec: r.read_u32::<LittleEndian>()?,
                avg_bytes_per_sec: r.read_u32::<LittleEndian>()?,
                block_align: r.read_u16::<LittleEndian>()?,
                bits_per_sample: r.read_u16::<LittleEndian>()?,
            };
            r.seek(SeekFrom::Current(i64::from(len - KNOWN)))?;
            Ok(Self::Audio(fmt))
        } else if stream_type == FourCc::VIDS {
            const KNOWN: u32 = 20;
            if len < KNOWN {
                return Err(Error::InvalidMediaType("short video strf header"));
            }
            let _size = r.read_u32::<LittleEndian>()?;
            let width = r.read_i32::<LittleEndian>()?;
            let height = r.read_i32::<LittleEndian>()?;
            let _planes = r.read_u16::<LittleEndian>()?;
            let bit_count = r.read_u16::<LittleEndian>()?;
            let compression = FourCc::read(r)?;
            r.seek(SeekFrom::Current(i64::from(len - KNOWN)))?;
            Ok(Self::Video(VideoStreamFormat {
                width,
                height,
                bit_count,
                compression,
            }))
        } else {
            r.seek(SeekFrom::Current(i64::from(len)))?;
            Ok(Self::Other)
        }
    }
}

/// One stream's headers.
#[derive(Clone, Copy, Debug)]
pub struct RawStream {
    /// The `strh` header.
    pub header: StreamHeader,
    /// The `strf` payload.
    pub format: StreamFormat,
}

/// Everything learned from the file's header section.
#[derive(Clone, Debug)]
pub struct AviLayout {
    /// The `avih` main header.
    pub main: MainHeader,
    /// Per-stream headers, in container order.
    pub streams: Vec<RawStream>,
    /// Byte offset of the first movi sub-chunk.
    pub movi_start: u64,
}

fn eof_is_invalid(err: std::io::Error) -> Error {
    if err.kind() == std::io::ErrorKind::UnexpectedEof {
        Error::InvalidMediaType("truncated header")
    } else {
        Error::Io(err)
    }
}

/// Validates the container signature and reads the header section, leaving
/// the cursor on the first movi sub-chunk.
pub fn read_layout(r: &mut (impl Read + Seek)) -> Result<AviLayout> {
    // RIFF('AVI ')
    let riff = ChunkHeader::read(r).map_err(eof_is_invalid)?;
    let avi = FourCc::read(r).map_err(eof_is_invalid)?;
    if riff.id != FourCc::RIFF || avi != FourCc::AVI {
        return Err(Error::InvalidMediaType("missing RIFF/AVI signature"));
    }

    // LIST('hdrl') avih
    let hdrl_list = ChunkHeader::read(r).map_err(eof_is_invalid)?;
    let hdrl = FourCc::read(r).map_err(eof_is_invalid)?;
    if hdrl_list.id != FourCc::LIST || hdrl != FourCc::HDRL {
        return Err(Error::InvalidMediaType("missing hdrl list"));
    }
    let hdrl_end = 12 + 8 + u64::from(hdrl_list.len);

    let avih = ChunkHeader::read(r).map_err(eof_is_invalid)?;
    if avih.id != FourCc::AVIH {
        return Err(Error::InvalidMediaType("missing avih header"));
    }
    let main = MainHeader::read(r, avih.len)?;

    // One LIST('strl') per stream: strh + strf + optional extras.
    let mut streams = Vec::with_capacity(main.num_streams as usize);
    for _ in 0..main.num_streams {
        let strl_list = ChunkHeader::read(r).map_err(eof_is_invalid)?;
        let strl_start = r.stream_position()?;
        let strl = FourCc::read(r).map_err(eof_is_invalid)?;
        if strl_list.id != FourCc::LIST || strl != FourCc::STRL {
            return Err(Error::InvalidMediaType("missing strl list"));
        }

        let strh = ChunkHeader::read(r).map_err(eof_is_invalid)?;
        if strh.id != FourCc::STRH {
            return Err(Error::InvalidMediaType("missing strh header"));
        }
        let header = StreamHeader::read(r, strh.len)?;

        let strf = ChunkHeader::read(r).map_err(eof_is_invalid)?;
        if strf.id != FourCc::STRF {
            return Err(Error::InvalidMediaType("missing strf header"));
        }
        let format = StreamFormat::read(r, header.stream_type, strf.len)?;

        streams.push(RawStream { header, format });

        // Skip whatever else the strl list carries (strn, indexes, ...).
        r.seek(SeekFrom::Start(strl_start + u64::from(strl_list.len)))?;
    }

    // Land exactly past the hdrl list, wherever the strl walk left us.
    r.seek(SeekFrom::Start(hdrl_end))?;

    // Skip JUNK / LIST('INFO') / anything else until LIST('movi').
    loop {
        let ch = ChunkHeader::read(r).map_err(eof_is_invalid)?;
        if ch.id == FourCc::LIST {
            let kind = FourCc::read(r).map_err(eof_is_invalid)?;
            if kind == FourCc::MOVI {
                break;
            }
            if ch.len < 4 {
                return Err(Error::InvalidMediaType("bad list length"));
            }
            r.seek(SeekFrom::Current(i64::from(ch.len - 4)))?;
        } else {
            r.seek(SeekFrom::Current(i64::from(ch.len)))?;
        }
    }

    let movi_start = r.stream_position()?;
    Ok(AviLayout {
        main,
        streams,
        movi_start,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;

    #[test]
    fn fourcc_stream_ids() {
        assert_eq!(FourCc(*b"00dc").stream_id(), Some(0));
        assert_eq!(FourCc(*b"01wb").stream_id(), Some(1));
        assert_eq!(FourCc(*b"17dc").stream_id(), Some(17));
        assert_eq!(FourCc::LIST.stream_id(), None);
        assert_eq!(FourCc::RIFF.stream_id(), None);
    }

    #[test]
    fn fourcc_display_escapes() {
        assert_eq!(FourCc(*b"AVI ").to_string(), "AVI ");
        assert_eq!(FourCc([0x00, b'a', b'b', b'c']).to_string(), "\\x00abc");
    }

    #[test]
    fn rejects_non_riff_input() {
        let mut data = Cursor::new(b"not an avi file at all..".to_vec());
        assert!(matches!(
            read_layout(&mut data),
            Err(Error::InvalidMediaType(_))
        ));
    }

    #[test]
    fn rejects_truncated_input() {
        let mut data = Cursor::new(b"RIFF".to_vec());
        assert!(matches!(
            read_layout(&mut data),
            Err(Error::InvalidMediaType(_))
        ));
    }
}
