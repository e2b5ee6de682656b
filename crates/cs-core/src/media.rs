//! Media and variant domain model.
//!
//! A [`Media`] is one uploaded asset. Each requested output codec gets a
//! [`Variant`] whose lifecycle is tracked independently; the media status is
//! derived from the variant set once conversion has started.

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::Path;
use std::str::FromStr;

use crate::error::Error;
use crate::ids::{MediaId, VariantId};

const IMAGE_EXTENSIONS: &[&str] = &["jpg", "jpeg", "png", "gif", "webp", "svg", "bmp", "ico"];
const AUDIO_EXTENSIONS: &[&str] = &["mp3", "wav", "ogg", "flac", "aac", "m4a", "wma", "opus"];

/// Implement `Display` and `FromStr` for a fieldless enum from a table of
/// `Variant => "name"` pairs.
macro_rules! string_enum {
    ($name:ident, $what:literal { $($variant:ident => $s:literal),+ $(,)? }) => {
        impl $name {
            /// Canonical lowercase name as stored in the database.
            pub fn as_str(&self) -> &'static str {
                match self {
                    $(Self::$variant => $s,)+
                }
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str(self.as_str())
            }
        }

        impl FromStr for $name {
            type Err = Error;

            fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
                match s {
                    $($s => Ok(Self::$variant),)+
                    other => Err(Error::Validation(format!(
                        concat!("unknown ", $what, ": {:?}"),
                        other
                    ))),
                }
            }
        }
    };
}

// ---------------------------------------------------------------------------
// MediaType
// ---------------------------------------------------------------------------

/// Broad kind of an uploaded asset.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MediaType {
    Video,
    Audio,
    Image,
}

string_enum!(MediaType, "media type" {
    Video => "video",
    Audio => "audio",
    Image => "image",
});

impl MediaType {
    /// Classify a file by its extension. Anything unrecognised is treated as
    /// video and left for the converter to reject.
    pub fn detect(filename: &str) -> Self {
        let ext = Path::new(filename)
            .extension()
            .map(|e| e.to_string_lossy().to_ascii_lowercase())
            .unwrap_or_default();

        if IMAGE_EXTENSIONS.contains(&ext.as_str()) {
            Self::Image
        } else if AUDIO_EXTENSIONS.contains(&ext.as_str()) {
            Self::Audio
        } else {
            Self::Video
        }
    }
}

// ---------------------------------------------------------------------------
// MediaStatus
// ---------------------------------------------------------------------------

/// Overall lifecycle of an upload.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MediaStatus {
    Pending,
    Processing,
    Done,
    Failed,
}

string_enum!(MediaStatus, "media status" {
    Pending => "pending",
    Processing => "processing",
    Done => "done",
    Failed => "failed",
});

impl MediaStatus {
    /// `done` and `failed` never change again.
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Done | Self::Failed)
    }
}

// ---------------------------------------------------------------------------
// Codec
// ---------------------------------------------------------------------------

/// Target output codec of a conversion.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Codec {
    Av1,
    H264,
    Opus,
}

string_enum!(Codec, "codec" {
    Av1 => "av1",
    H264 => "h264",
    Opus => "opus",
});

impl Codec {
    /// All codecs in preference order.
    pub const ALL: [Codec; 3] = [Codec::Av1, Codec::H264, Codec::Opus];

    /// MIME type of the file this codec produces.
    pub fn mime(&self) -> &'static str {
        match self {
            Self::Av1 => "video/webm",
            Self::H264 => "video/mp4",
            Self::Opus => "audio/ogg",
        }
    }

    /// Tie-break rank when several variants are usable. Lower wins.
    pub fn preference(&self) -> u8 {
        match self {
            Self::Av1 => 0,
            Self::H264 => 1,
            Self::Opus => 2,
        }
    }

    /// Suffix appended to the media id to form the output file name.
    pub fn file_suffix(&self) -> &'static str {
        match self {
            Self::Av1 => "_av1.webm",
            Self::H264 => "_h264.mp4",
            Self::Opus => "_opus.ogg",
        }
    }

    /// Whether the output carries a video stream.
    pub fn is_video(&self) -> bool {
        !matches!(self, Self::Opus)
    }

    /// Output file name for the given media.
    pub fn output_file_name(&self, media_id: &MediaId) -> String {
        format!("{media_id}{}", self.file_suffix())
    }
}

// ---------------------------------------------------------------------------
// VariantStatus
// ---------------------------------------------------------------------------

/// Lifecycle of one codec output.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum VariantStatus {
    Pending,
    Processing,
    Done,
    Failed,
}

string_enum!(VariantStatus, "variant status" {
    Pending => "pending",
    Processing => "processing",
    Done => "done",
    Failed => "failed",
});

impl VariantStatus {
    /// `done` and `failed` never change again.
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Done | Self::Failed)
    }

    /// Whether moving from `self` to `next` is a legal forward transition.
    pub fn can_transition_to(&self, next: VariantStatus) -> bool {
        matches!(
            (self, next),
            (Self::Pending, Self::Processing)
                | (Self::Pending, Self::Done)
                | (Self::Pending, Self::Failed)
                | (Self::Processing, Self::Done)
                | (Self::Processing, Self::Failed)
        )
    }
}

// ---------------------------------------------------------------------------
// Variant
// ---------------------------------------------------------------------------

/// One per-codec conversion outcome of a media.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Variant {
    pub id: VariantId,
    pub media_id: MediaId,
    pub codec: Codec,
    pub path: Option<String>,
    pub file_size: Option<u64>,
    pub width: Option<u32>,
    pub height: Option<u32>,
    pub status: VariantStatus,
    pub error_message: Option<String>,
    pub created_at: DateTime<Utc>,
}

impl Variant {
    pub fn is_done(&self) -> bool {
        self.status == VariantStatus::Done
    }

    pub fn mime(&self) -> &'static str {
        self.codec.mime()
    }
}

/// Output metadata recorded when a variant finishes successfully.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct VariantOutput {
    pub path: String,
    pub file_size: u64,
    pub width: Option<u32>,
    pub height: Option<u32>,
}

// ---------------------------------------------------------------------------
// Aggregate
// ---------------------------------------------------------------------------

/// Media status derived from its variants.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Aggregate<'a> {
    /// No variant has started yet.
    Pending,
    /// At least one variant is still pending or processing.
    Processing,
    /// Every variant is terminal and at least one succeeded. Holds the best.
    Done(&'a Variant),
    /// Every variant failed.
    Failed,
}

// ---------------------------------------------------------------------------
// Media
// ---------------------------------------------------------------------------

/// One uploaded asset and its conversion state.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Media {
    pub id: MediaId,
    pub media_type: MediaType,
    pub original_name: String,
    pub original_path: String,
    pub status: MediaStatus,
    pub error_message: Option<String>,
    pub retention_days: u32,
    /// Legacy single-output fields, mirrored from the best variant once done.
    pub converted_path: Option<String>,
    pub codec: Option<Codec>,
    pub width: Option<u32>,
    pub height: Option<u32>,
    pub file_size: Option<u64>,
    pub thumb_path: Option<String>,
    pub probe_json: Option<String>,
    pub created_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
    pub variants: Vec<Variant>,
}

impl Media {
    /// Create a pending media with a fresh id, expiring `retention_days`
    /// after now.
    pub fn new(
        media_type: MediaType,
        original_name: impl Into<String>,
        original_path: impl Into<String>,
        retention_days: u32,
    ) -> Self {
        let now = Utc::now();
        Self {
            id: MediaId::generate(),
            media_type,
            original_name: original_name.into(),
            original_path: original_path.into(),
            status: MediaStatus::Pending,
            error_message: None,
            retention_days,
            converted_path: None,
            codec: None,
            width: None,
            height: None,
            file_size: None,
            thumb_path: None,
            probe_json: None,
            created_at: now,
            expires_at: now + Duration::days(i64::from(retention_days)),
            variants: Vec::new(),
        }
    }

    pub fn is_expired_at(&self, now: DateTime<Utc>) -> bool {
        now > self.expires_at
    }

    pub fn is_expired(&self) -> bool {
        self.is_expired_at(Utc::now())
    }

    /// Whole days until expiry, rounded up. Zero once expired.
    pub fn days_remaining_at(&self, now: DateTime<Utc>) -> u32 {
        let remaining = self.expires_at - now;
        if remaining <= Duration::zero() {
            return 0;
        }
        let day = Duration::days(1).num_seconds();
        let secs = remaining.num_seconds();
        // ceil for positive values; sub-second remainders count as a day.
        let days = if secs == 0 { 1 } else { (secs + day - 1) / day };
        u32::try_from(days).unwrap_or(u32::MAX)
    }

    pub fn days_remaining(&self) -> u32 {
        self.days_remaining_at(Utc::now())
    }

    pub fn variant(&self, codec: Codec) -> Option<&Variant> {
        self.variants.iter().find(|v| v.codec == codec)
    }

    /// True when every variant is done or failed (vacuously true with none).
    pub fn all_variants_terminal(&self) -> bool {
        self.variants.iter().all(|v| v.status.is_terminal())
    }

    /// The preferred successful output: the `done` variant whose codec ranks
    /// first in preference order, regardless of list order.
    pub fn best_variant(&self) -> Option<&Variant> {
        self.variants
            .iter()
            .filter(|v| v.is_done())
            .min_by_key(|v| v.codec.preference())
    }

    /// Derive the media status from its variants. `None` when the media has
    /// no variants (single-output and image uploads).
    pub fn aggregate(&self) -> Option<Aggregate<'_>> {
        if self.variants.is_empty() {
            return None;
        }
        if !self.all_variants_terminal() {
            let started = self
                .variants
                .iter()
                .any(|v| v.status != VariantStatus::Pending);
            return Some(if started {
                Aggregate::Processing
            } else {
                Aggregate::Pending
            });
        }
        Some(match self.best_variant() {
            Some(best) => Aggregate::Done(best),
            None => Aggregate::Failed,
        })
    }

    /// Mark done and mirror the chosen output into the legacy fields.
    pub fn mark_done(&mut self, codec: Option<Codec>, output: &VariantOutput) {
        self.status = MediaStatus::Done;
        self.converted_path = Some(output.path.clone());
        self.codec = codec;
        self.width = output.width;
        self.height = output.height;
        self.file_size = Some(output.file_size);
        self.error_message = None;
    }

    pub fn mark_failed(&mut self, message: impl Into<String>) {
        self.status = MediaStatus::Failed;
        self.error_message = Some(message.into());
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;

    pub(crate) fn variant(codec: Codec, status: VariantStatus) -> Variant {
        Variant {
            id: VariantId::from(codec.preference() as i64 + 1),
            media_id: "ABCD2345".parse().unwrap(),
            codec,
            path: (status == VariantStatus::Done)
                .then(|| format!("/data/converted/ABCD2345{}", codec.file_suffix())),
            file_size: None,
            width: None,
            height: None,
            status,
            error_message: None,
            created_at: Utc::now(),
        }
    }

    pub(crate) fn media_with(variants: Vec<Variant>) -> Media {
        let mut m = Media::new(MediaType::Video, "clip.mov", "/data/uploads/clip.mov", 7);
        m.variants = variants;
        m
    }

    #[test]
    fn detect_media_type() {
        assert_eq!(MediaType::detect("photo.JPG"), MediaType::Image);
        assert_eq!(MediaType::detect("icon.svg"), MediaType::Image);
        assert_eq!(MediaType::detect("song.flac"), MediaType::Audio);
        assert_eq!(MediaType::detect("voice.opus"), MediaType::Audio);
        assert_eq!(MediaType::detect("clip.mkv"), MediaType::Video);
        assert_eq!(MediaType::detect("no_extension"), MediaType::Video);
    }

    #[test]
    fn codec_tables() {
        assert_eq!(Codec::Av1.mime(), "video/webm");
        assert_eq!(Codec::H264.mime(), "video/mp4");
        assert_eq!(Codec::Opus.mime(), "audio/ogg");
        assert!(Codec::H264.is_video());
        assert!(!Codec::Opus.is_video());
        let id: MediaId = "ABCD2345".parse().unwrap();
        assert_eq!(Codec::Av1.output_file_name(&id), "ABCD2345_av1.webm");
    }

    #[test]
    fn enums_parse_and_display() {
        for codec in Codec::ALL {
            assert_eq!(codec.as_str().parse::<Codec>().unwrap(), codec);
        }
        assert_eq!("processing".parse::<MediaStatus>().unwrap(), MediaStatus::Processing);
        assert_eq!(VariantStatus::Failed.to_string(), "failed");
        assert!("vp9".parse::<Codec>().is_err());
    }

    #[test]
    fn variant_transitions_only_move_forward() {
        use VariantStatus::*;
        assert!(Pending.can_transition_to(Processing));
        assert!(Processing.can_transition_to(Done));
        assert!(Processing.can_transition_to(Failed));
        assert!(!Done.can_transition_to(Failed));
        assert!(!Failed.can_transition_to(Done));
        assert!(!Processing.can_transition_to(Pending));
    }

    #[test]
    fn new_media_expiry() {
        let m = Media::new(MediaType::Video, "a.mp4", "/tmp/a.mp4", 7);
        assert_eq!(m.status, MediaStatus::Pending);
        assert_eq!(m.expires_at - m.created_at, Duration::days(7));
        assert_eq!(m.days_remaining_at(m.created_at), 7);
        assert_eq!(m.days_remaining_at(m.created_at + Duration::hours(1)), 7);
        assert_eq!(m.days_remaining_at(m.created_at + Duration::days(6)), 1);
        assert_eq!(m.days_remaining_at(m.expires_at + Duration::seconds(1)), 0);
        assert!(!m.is_expired_at(m.created_at));
        assert!(m.is_expired_at(m.expires_at + Duration::seconds(1)));
    }

    #[test]
    fn best_variant_uses_preference_not_list_order() {
        let m = media_with(vec![
            variant(Codec::H264, VariantStatus::Done),
            variant(Codec::Av1, VariantStatus::Done),
        ]);
        assert_eq!(m.best_variant().unwrap().codec, Codec::Av1);

        let m = media_with(vec![variant(Codec::Opus, VariantStatus::Done)]);
        assert_eq!(m.best_variant().unwrap().codec, Codec::Opus);

        let m = media_with(vec![
            variant(Codec::Av1, VariantStatus::Failed),
            variant(Codec::H264, VariantStatus::Processing),
        ]);
        assert!(m.best_variant().is_none());
    }

    #[test]
    fn aggregate_rules() {
        let m = media_with(vec![]);
        assert!(m.aggregate().is_none());

        let m = media_with(vec![
            variant(Codec::Av1, VariantStatus::Pending),
            variant(Codec::H264, VariantStatus::Pending),
        ]);
        assert_eq!(m.aggregate(), Some(Aggregate::Pending));

        let m = media_with(vec![
            variant(Codec::Av1, VariantStatus::Failed),
            variant(Codec::H264, VariantStatus::Pending),
        ]);
        assert_eq!(m.aggregate(), Some(Aggregate::Processing));

        let m = media_with(vec![
            variant(Codec::Av1, VariantStatus::Failed),
            variant(Codec::H264, VariantStatus::Done),
        ]);
        match m.aggregate() {
            Some(Aggregate::Done(best)) => assert_eq!(best.codec, Codec::H264),
            other => panic!("unexpected aggregate: {other:?}"),
        }

        let m = media_with(vec![
            variant(Codec::Av1, VariantStatus::Failed),
            variant(Codec::H264, VariantStatus::Failed),
        ]);
        assert_eq!(m.aggregate(), Some(Aggregate::Failed));
    }

    #[test]
    fn mark_done_mirrors_output() {
        let mut m = media_with(vec![]);
        let out = VariantOutput {
            path: "/data/converted/x.webm".into(),
            file_size: 1024,
            width: Some(1280),
            height: Some(720),
        };
        m.mark_done(Some(Codec::Av1), &out);
        assert_eq!(m.status, MediaStatus::Done);
        assert_eq!(m.codec, Some(Codec::Av1));
        assert_eq!(m.width, Some(1280));
        assert_eq!(m.file_size, Some(1024));

        m.mark_failed("boom");
        assert_eq!(m.status, MediaStatus::Failed);
        assert_eq!(m.error_message.as_deref(), Some("boom"));
    }
}
