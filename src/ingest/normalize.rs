// src/ingest/normalize.rs
//! Raw feed items → storage-ready posts.

use chrono::{DateTime, NaiveDateTime, Utc};
use time::{format_description::well_known::Rfc2822, OffsetDateTime};
use uuid::Uuid;

use crate::ingest::types::{DateParseFailed, RawItem};
use crate::models::NewPost;

/// Publish-date layouts, tried in order; the first that parses wins.
///
/// Zone abbreviations RFC 2822 defines (`GMT`, `UT`, `EST`, `EDT`, `CST`,
/// `CDT`, `MST`, `MDT`, `PST`, `PDT`) match [`DateLayout::Rfc1123`] and keep
/// their offsets, so `15:04:05 MST` is `22:04:05Z`. Any other abbreviation
/// falls through to [`DateLayout::Rfc1123AnyZone`] and is read as UTC.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DateLayout {
    /// `Mon, 02 Jan 2006 15:04:05 MST` and the other RFC 2822 zone forms.
    Rfc1123,
    /// `Mon, 02 Jan 2006 15:04:05 -0700`
    Rfc1123Z,
    /// RFC 1123 with a zone abbreviation RFC 2822 does not know, read as UTC.
    Rfc1123AnyZone,
    /// `2006-01-02T15:04:05Z07:00`
    Rfc3339,
}

pub const DATE_LAYOUTS: &[DateLayout] = &[
    DateLayout::Rfc1123,
    DateLayout::Rfc1123Z,
    DateLayout::Rfc1123AnyZone,
    DateLayout::Rfc3339,
];

impl DateLayout {
    fn parse(self, s: &str) -> Option<DateTime<Utc>> {
        match self {
            DateLayout::Rfc1123 => OffsetDateTime::parse(s, &Rfc2822)
                .ok()
                .and_then(|dt| DateTime::from_timestamp(dt.unix_timestamp(), dt.nanosecond())),
            DateLayout::Rfc1123Z => DateTime::parse_from_str(s, "%a, %d %b %Y %H:%M:%S %z")
                .ok()
                .map(|dt| dt.with_timezone(&Utc)),
            DateLayout::Rfc1123AnyZone => {
                let (stamp, zone) = s.rsplit_once(' ')?;
                if zone.is_empty() || !zone.chars().all(|c| c.is_ascii_alphabetic()) {
                    return None;
                }
                NaiveDateTime::parse_from_str(stamp, "%a, %d %b %Y %H:%M:%S")
                    .ok()
                    .map(|naive| naive.and_utc())
            }
            DateLayout::Rfc3339 => DateTime::parse_from_rfc3339(s)
                .ok()
                .map(|dt| dt.with_timezone(&Utc)),
        }
    }
}

/// Try every layout in [`DATE_LAYOUTS`] in order.
pub fn parse_published(raw: &str) -> Result<DateTime<Utc>, DateParseFailed> {
    let s = raw.trim();
    DATE_LAYOUTS
        .iter()
        .find_map(|layout| layout.parse(s))
        .ok_or_else(|| DateParseFailed(raw.to_string()))
}

/// Map one parsed item to a [`NewPost`] owned by `source_id`.
///
/// Never fails: an empty description and an empty or unrecognized publish
/// date are stored as absent.
pub fn normalize_item(item: RawItem, source_id: Uuid) -> NewPost {
    let description = if item.description.is_empty() {
        None
    } else {
        Some(item.description)
    };

    let published_at = if item.pub_date.is_empty() {
        None
    } else {
        match parse_published(&item.pub_date) {
            Ok(dt) => Some(dt),
            Err(e) => {
                tracing::debug!(target: "ingest", %source_id, error = %e, "publish date dropped");
                None
            }
        }
    };

    NewPost {
        id: Uuid::new_v4(),
        title: item.title,
        url: item.link,
        description,
        published_at,
        source_id,
    }
}
