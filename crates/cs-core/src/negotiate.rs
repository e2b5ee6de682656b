//! `Accept` header negotiation over a media's finished variants.

use crate::media::{Media, Variant};

/// One media-range from an `Accept` header.
#[derive(Debug, Clone, PartialEq)]
pub struct AcceptEntry {
    pub mime: String,
    pub q: f64,
}

impl AcceptEntry {
    /// Whether this range covers `mime` (exact, `*/*`, or `type/*`).
    pub fn matches(&self, mime: &str) -> bool {
        if self.mime == "*/*" || self.mime.eq_ignore_ascii_case(mime) {
            return true;
        }
        match self.mime.strip_suffix("/*") {
            Some(main) => mime
                .split_once('/')
                .is_some_and(|(m, _)| m.eq_ignore_ascii_case(main)),
            None => false,
        }
    }
}

/// Parse an `Accept` header value into its media-ranges.
///
/// The quality defaults to 1.0; a `q` parameter that does not parse as a
/// finite number is ignored. Other parameters are skipped.
pub fn parse_accept(header: &str) -> Vec<AcceptEntry> {
    header
        .split(',')
        .map(str::trim)
        .filter(|part| !part.is_empty())
        .filter_map(|part| {
            let mut params = part.split(';').map(str::trim);
            let mime = params.next().filter(|m| !m.is_empty())?;
            let q = params
                .filter_map(|p| p.strip_prefix("q="))
                .filter_map(|v| v.trim().parse::<f64>().ok())
                .find(|v| v.is_finite())
                .unwrap_or(1.0);
            Some(AcceptEntry {
                mime: mime.to_string(),
                q,
            })
        })
        .collect()
}

/// Highest quality any entry assigns to `mime`, if any entry matches.
fn quality_for(entries: &[AcceptEntry], mime: &str) -> Option<f64> {
    entries
        .iter()
        .filter(|e| e.matches(mime))
        .map(|e| e.q)
        .fold(None, |best, q| match best {
            Some(b) if b >= q => Some(b),
            _ => Some(q),
        })
}

impl Media {
    /// Pick the `done` variant the client prefers.
    ///
    /// Variants whose MIME type no entry matches are ineligible. Among the
    /// rest the highest q wins, ties broken by codec preference. An empty
    /// header (or one with no usable entries) falls back to
    /// [`Media::best_variant`].
    pub fn best_variant_for_accept(&self, accept: &str) -> Option<&Variant> {
        let entries = parse_accept(accept);
        if entries.is_empty() {
            return self.best_variant();
        }

        let mut best: Option<(&Variant, f64)> = None;
        for v in self.variants.iter().filter(|v| v.is_done()) {
            let Some(q) = quality_for(&entries, v.mime()) else {
                continue;
            };
            if q < 0.0 {
                continue;
            }
            best = match best {
                None => Some((v, q)),
                Some((cur, cur_q)) => {
                    let better = q > cur_q
                        || (q == cur_q && v.codec.preference() < cur.codec.preference());
                    if better {
                        Some((v, q))
                    } else {
                        Some((cur, cur_q))
                    }
                }
            };
        }
        best.map(|(v, _)| v)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::media::tests::{media_with, variant};
    use crate::media::{Codec, VariantStatus};

    fn both_done() -> Media {
        media_with(vec![
            variant(Codec::Av1, VariantStatus::Done),
            variant(Codec::H264, VariantStatus::Done),
        ])
    }

    #[test]
    fn parse_defaults_and_params() {
        let entries = parse_accept("video/webm;q=0.5, video/mp4 ; q=0.9,*/*;q=bogus, ,audio/*");
        assert_eq!(
            entries,
            vec![
                AcceptEntry { mime: "video/webm".into(), q: 0.5 },
                AcceptEntry { mime: "video/mp4".into(), q: 0.9 },
                AcceptEntry { mime: "*/*".into(), q: 1.0 },
                AcceptEntry { mime: "audio/*".into(), q: 1.0 },
            ]
        );
    }

    #[test]
    fn parse_skips_extra_params() {
        let entries = parse_accept("video/webm; codecs=av01; q=0.3");
        assert_eq!(entries[0].q, 0.3);
    }

    #[test]
    fn wildcard_matching() {
        let e = AcceptEntry { mime: "video/*".into(), q: 1.0 };
        assert!(e.matches("video/mp4"));
        assert!(!e.matches("audio/ogg"));
        let e = AcceptEntry { mime: "*/*".into(), q: 1.0 };
        assert!(e.matches("audio/ogg"));
    }

    #[test]
    fn exact_type_selects_that_codec() {
        let m = both_done();
        assert_eq!(m.best_variant_for_accept("video/mp4").unwrap().codec, Codec::H264);
        assert_eq!(m.best_variant_for_accept("video/webm").unwrap().codec, Codec::Av1);
    }

    #[test]
    fn empty_header_matches_best_variant() {
        let m = both_done();
        assert_eq!(
            m.best_variant_for_accept("").map(|v| v.codec),
            m.best_variant().map(|v| v.codec)
        );
        assert_eq!(m.best_variant_for_accept(" , ").unwrap().codec, Codec::Av1);
    }

    #[test]
    fn higher_q_beats_preference() {
        let m = both_done();
        let v = m
            .best_variant_for_accept("video/webm;q=0.5, video/mp4;q=0.9")
            .unwrap();
        assert_eq!(v.codec, Codec::H264);
    }

    #[test]
    fn q_tie_uses_preference() {
        let m = media_with(vec![
            variant(Codec::H264, VariantStatus::Done),
            variant(Codec::Av1, VariantStatus::Done),
        ]);
        assert_eq!(m.best_variant_for_accept("video/*").unwrap().codec, Codec::Av1);
        assert_eq!(m.best_variant_for_accept("*/*").unwrap().codec, Codec::Av1);
    }

    #[test]
    fn no_eligible_variant() {
        let m = both_done();
        assert!(m.best_variant_for_accept("audio/ogg").is_none());
        assert!(m.best_variant_for_accept("text/html").is_none());

        let m = media_with(vec![
            variant(Codec::Av1, VariantStatus::Failed),
            variant(Codec::H264, VariantStatus::Processing),
        ]);
        assert!(m.best_variant_for_accept("*/*").is_none());
    }

    #[test]
    fn highest_matching_entry_wins_per_variant() {
        let m = both_done();
        // H264 is listed twice; its 0.7 entry beats AV1's 0.4.
        let v = m
            .best_variant_for_accept("video/webm;q=0.4, video/mp4;q=0.1, video/mp4;q=0.7")
            .unwrap();
        assert_eq!(v.codec, Codec::H264);
    }

    #[test]
    fn zero_quality_remains_eligible() {
        let m = media_with(vec![variant(Codec::H264, VariantStatus::Done)]);
        assert_eq!(m.best_variant_for_accept("video/mp4;q=0").unwrap().codec, Codec::H264);
    }
}
