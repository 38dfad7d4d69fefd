
use std::any::Any;
use std::fmt;
use std::sync::atomic::Ordering;

use portable_atomic::AtomicBool;
use smol_str::SmolStr;

use crate::rtp_parameters::MediaKind;

/// MediaStreamTrack is the media source or sink attached to a producer or
/// a consumer. Media itself never flows through this crate; only the
/// enabled/ended switches are driven from here.
pub trait MediaStreamTrack: fmt::Debug + Send + Sync {
    fn id(&self) -> &str;

    /// kind controls if this track is audio or video
    fn kind(&self) -> MediaKind;

    fn enabled(&self) -> bool;

    fn set_enabled(&self, enabled: bool);

    /// is_ended reports whether the track was stopped. An ended track
    /// cannot be produced.
    fn is_ended(&self) -> bool;

    fn stop(&self);

    fn as_any(&self) -> &dyn Any;
}

/// TrackSimple is an in-memory track, enough to drive producers and
/// consumers when the media pipeline lives elsewhere.
#[derive(Debug)]
pub struct TrackSimple {
    kind: MediaKind,
    id: SmolStr,
    enabled: AtomicBool,
    ended: AtomicBool,
}

impl TrackSimple {
    pub fn new(kind: MediaKind, id: impl Into<SmolStr>) -> Self {
        TrackSimple {
            kind,
            id: id.into(),
            enabled: AtomicBool::new(true),
            ended: AtomicBool::new(false),
        }
    }
}

impl MediaStreamTrack for TrackSimple {
    fn id(&self) -> &str {
        self.id.as_str()
    }

    fn kind(&self) -> MediaKind {
        self.kind
    }

    fn enabled(&self) -> bool {
        self.enabled.load(Ordering::SeqCst)
    }

    fn set_enabled(&self, enabled: bool) {
        self.enabled.store(enabled, Ordering::SeqCst);
    }

    fn is_ended(&self) -> bool {
        self.ended.load(Ordering::SeqCst)
    }

    fn stop(&self) {
        if !self.ended.swap(true, Ordering::SeqCst) {
            log::trace!("track stopped [id:{}]", self.id);
        }
    }

    fn as_any(&self) -> &dyn Any {
        self
    }
}
