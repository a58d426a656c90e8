//! `Accept` header negotiation.

use axum::http::{header, HeaderMap};

use crate::responses::ApiError;

pub(crate) const OCTET_STREAM: &str = "application/octet-stream";
pub(crate) const JSON: &str = "application/json";
pub(crate) const CSV: &str = "text/csv";

struct Range<'a> {
    kind: &'a str,
    subtype: &'a str,
    quality: f32,
}

fn parse_ranges(accept: &str) -> Vec<Range<'_>> {
    accept
        .split(',')
        .filter_map(|item| {
            let mut parts = item.split(';');
            let media = parts.next()?.trim();
            let (kind, subtype) = media.split_once('/')?;
            let mut quality = 1.0f32;
            for param in parts {
                if let Some(q) = param.trim().strip_prefix("q=") {
                    quality = q.trim().parse().unwrap_or(0.0);
                }
            }
            Some(Range {
                kind: kind.trim(),
                subtype: subtype.trim(),
                quality,
            })
        })
        .collect()
}

fn quality_of(ranges: &[Range<'_>], offered: &str) -> f32 {
    let Some((kind, subtype)) = offered.split_once('/') else {
        return 0.0;
    };
    // most specific matching range decides
    let mut best: Option<(u8, f32)> = None;
    for range in ranges {
        let specificity = match (range.kind, range.subtype) {
            (k, s) if k.eq_ignore_ascii_case(kind) && s.eq_ignore_ascii_case(subtype) => 2,
            (k, "*") if k.eq_ignore_ascii_case(kind) => 1,
            ("*", "*") => 0,
            _ => continue,
        };
        if best.is_none_or(|(s, _)| specificity > s) {
            best = Some((specificity, range.quality));
        }
    }
    best.map(|(_, q)| q).unwrap_or(0.0)
}

/// The offered type the client prefers, first offer winning ties. A request
/// without `Accept` takes the first offer.
pub(crate) fn best_match(headers: &HeaderMap, offered: &[&'static str]) -> Option<&'static str> {
    let Some(accept) = headers
        .get(header::ACCEPT)
        .and_then(|v| v.to_str().ok())
        .filter(|v| !v.trim().is_empty())
    else {
        return offered.first().copied();
    };
    let ranges = parse_ranges(accept);
    let mut chosen: Option<(&'static str, f32)> = None;
    for &candidate in offered {
        let quality = quality_of(&ranges, candidate);
        if quality > 0.0 && chosen.is_none_or(|(_, q)| quality > q) {
            chosen = Some((candidate, quality));
        }
    }
    chosen.map(|(media, _)| media)
}

/// Require that `media` is acceptable, else `406`.
pub(crate) fn require(headers: &HeaderMap, media: &'static str) -> Result<(), ApiError> {
    match best_match(headers, &[media]) {
        Some(_) => Ok(()),
        None => Err(ApiError::NotAcceptable),
    }
}
