//! Cross-stream presentation-time synchronization.
//!
//! [`AvSync`] equalizes the presentation time of sibling media streams. The
//! shared clock is the fastest stream's presentation time: on every
//! [`update_pts`](AvSync::update_pts) a stream learns how far it sits from
//! that clock, as a millisecond adjustment. Positive means "slow down by
//! this much", negative means "speed up". How to apply the adjustment is the
//! reader's policy, not the synchronizer's.
//!
//! Keying the clock to stream time instead of host wall time keeps the
//! synchronizer pure: readers driven faster or slower than real time (tests,
//! offline transcodes) still converge.

use parking_lot::Mutex;

use tertulia_bridge::MediaKind;
use tracing::debug;

/// Streams within this distance of the clock are considered in sync.
const TOLERANCE_MS: i64 = 40;

/// Handle for one registered media stream.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct MediaId(usize);

struct MediaState {
    clock_rate: u32,
    last_ms: i64,
}

/// Presentation-time synchronizer shared by the streams of one container.
#[derive(Default)]
pub struct AvSync {
    media: Mutex<Vec<MediaState>>,
}

impl AvSync {
    /// Creates an empty synchronizer.
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a media stream with its timestamp clock rate.
    pub fn add_media(&self, kind: MediaKind, clock_rate: u32) -> MediaId {
        let mut media = self.media.lock();
        media.push(MediaState {
            clock_rate: clock_rate.max(1),
            last_ms: 0,
        });
        let id = MediaId(media.len() - 1);
        debug!(?kind, clock_rate, id = id.0, "avsync media added");
        id
    }

    /// Reports a stream's current presentation timestamp and returns the
    /// adjustment in milliseconds: positive to slow down, negative to speed
    /// up, zero when within tolerance of the sibling clock.
    pub fn update_pts(&self, id: MediaId, timestamp: u64) -> i32 {
        let mut media = self.media.lock();
        let rate = media[id.0].clock_rate;
        let own_ms = (timestamp.saturating_mul(1000) / u64::from(rate)) as i64;
        media[id.0].last_ms = own_ms;

        let Some(clock_ms) = media
            .iter()
            .enumerate()
            .filter(|&(i, _)| i != id.0)
            .map(|(_, m)| m.last_ms)
            .max()
        else {
            return 0;
        };

        let diff = own_ms - clock_ms;
        if diff.abs() <= TOLERANCE_MS {
            0
        } else {
            diff.clamp(i64::from(i32::MIN), i64::from(i32::MAX)) as i32
        }
    }

    /// Starts a new epoch: every stream's presentation time returns to zero.
    pub fn reset(&self) {
        for m in self.media.lock().iter_mut() {
            m.last_ms = 0;
        }
        debug!("avsync reset");
    }
}
