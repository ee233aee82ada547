//! Trends response normalizer.
//!
//! The trends endpoint has two shapes: the current `{trends, meta}` envelope
//! and a legacy bare array of partial records. Both are coerced here into
//! one canonical `TrendsPage` with every derived field synthesized.
//!
//! Pure function of its input (the caller supplies the clock) and
//! idempotent: normalizing an already-canonical payload changes nothing.

use chrono::{DateTime, Utc};
use pulse_core::models::{RawTrendRecord, RawTrendsPayload, TrendMetric, TrendsMeta, TrendsPage};

/// Coerces a raw trends payload into the canonical page shape.
///
/// For the bare-array form no true pagination signal exists: `has_more` is
/// a non-emptiness heuristic and `next_offset` is the array length. Callers
/// cannot distinguish this from real metadata; treat it as a hint, not a
/// guarantee.
#[must_use]
pub fn normalize_trends(raw: RawTrendsPayload, now: DateTime<Utc>) -> TrendsPage {
    match raw {
        RawTrendsPayload::List(records) => {
            let trends: Vec<TrendMetric> = records
                .into_iter()
                .enumerate()
                .map(|(i, r)| normalize_record(r, i, now))
                .collect();
            let total_posts = trends.iter().map(|t| t.volume).sum();
            let len = trends.len() as u64;
            TrendsPage {
                meta: TrendsMeta {
                    total_posts: Some(total_posts),
                    window_minutes: Some(60),
                    generated_at: now,
                    active_keywords: None,
                    total_keywords: None,
                    next_offset: Some(len),
                    has_more: Some(len > 0),
                },
                trends,
            }
        }
        RawTrendsPayload::Envelope { trends, meta } => {
            let trends: Vec<TrendMetric> = trends
                .into_iter()
                .enumerate()
                .map(|(i, r)| normalize_record(r, i, now))
                .collect();
            let meta = meta.unwrap_or_default();
            let total_posts = meta
                .total_posts
                .unwrap_or_else(|| trends.iter().map(|t| t.volume).sum());
            TrendsPage {
                meta: TrendsMeta {
                    total_posts: Some(total_posts),
                    window_minutes: Some(meta.window_minutes.unwrap_or(60)),
                    generated_at: meta.generated_at.unwrap_or(now),
                    active_keywords: meta.active_keywords,
                    total_keywords: meta.total_keywords,
                    next_offset: meta.next_offset,
                    has_more: meta.has_more,
                },
                trends,
            }
        }
    }
}

fn normalize_record(record: RawTrendRecord, index: usize, now: DateTime<Utc>) -> TrendMetric {
    let keyword = record
        .keyword
        .unwrap_or_else(|| format!("keyword-{}", index + 1));
    let volume = record.volume.or(record.count).unwrap_or(0);
    let sparkline = match record.sparkline {
        Some(points) if !points.is_empty() => points,
        _ => build_sparkline(volume),
    };
    let score = record.score.unwrap_or(volume as f64);
    let delta = record.delta.unwrap_or_else(|| {
        if sparkline.len() > 1 {
            sparkline[sparkline.len() - 1] as f64 - sparkline[0] as f64
        } else {
            0.0
        }
    });

    TrendMetric {
        keyword,
        score,
        delta,
        volume,
        sparkline,
        trend_window_minutes: record.trend_window_minutes.unwrap_or(60),
        last_seen_at: record.last_seen_at.unwrap_or(now),
        sentiment: record.sentiment,
    }
}

/// Synthesizes a 5-point monotonic ramp ending at `volume`.
///
/// All zeros when there is no volume; otherwise the base is `volume / 5`
/// floored with a minimum of 1.
fn build_sparkline(volume: u64) -> Vec<u64> {
    if volume == 0 {
        return vec![0, 0, 0, 0, 0];
    }
    let base = (volume / 5).max(1);
    vec![
        base,
        base.max(base * 12 / 10),
        base.max(base * 14 / 10),
        base.max(base * 16 / 10),
        volume,
    ]
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use pulse_core::models::RawTrendsMeta;

    fn now() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2025, 6, 1, 12, 0, 0).unwrap()
    }

    fn record(keyword: &str, volume: u64) -> RawTrendRecord {
        RawTrendRecord {
            keyword: Some(keyword.to_string()),
            volume: Some(volume),
            ..RawTrendRecord::default()
        }
    }

    #[test]
    fn synthesizes_score_sparkline_and_delta() {
        let page = normalize_trends(RawTrendsPayload::List(vec![record("ai", 120)]), now());
        let trend = &page.trends[0];
        assert_eq!(trend.score, 120.0);
        assert_eq!(trend.sparkline, vec![24, 28, 33, 38, 120]);
        assert_eq!(trend.delta, 96.0);
        assert_eq!(trend.trend_window_minutes, 60);
        assert_eq!(trend.last_seen_at, now());
    }

    #[test]
    fn zero_volume_yields_flat_sparkline() {
        let page = normalize_trends(RawTrendsPayload::List(vec![record("quiet", 0)]), now());
        assert_eq!(page.trends[0].sparkline, vec![0, 0, 0, 0, 0]);
        assert_eq!(page.trends[0].delta, 0.0);
    }

    #[test]
    fn small_volume_uses_minimum_base() {
        let page = normalize_trends(RawTrendsPayload::List(vec![record("tiny", 3)]), now());
        assert_eq!(page.trends[0].sparkline, vec![1, 1, 1, 1, 3]);
    }

    #[test]
    fn legacy_count_backfills_volume() {
        let raw = RawTrendRecord {
            keyword: Some("legacy".to_string()),
            count: Some(42),
            ..RawTrendRecord::default()
        };
        let page = normalize_trends(RawTrendsPayload::List(vec![raw]), now());
        assert_eq!(page.trends[0].volume, 42);
    }

    #[test]
    fn missing_keyword_gets_positional_name() {
        let raw = RawTrendRecord {
            volume: Some(10),
            ..RawTrendRecord::default()
        };
        let page = normalize_trends(
            RawTrendsPayload::List(vec![record("first", 1), raw]),
            now(),
        );
        assert_eq!(page.trends[1].keyword, "keyword-2");
    }

    #[test]
    fn bare_array_meta_is_a_pagination_heuristic() {
        let page = normalize_trends(
            RawTrendsPayload::List(vec![record("a", 10), record("b", 20)]),
            now(),
        );
        assert_eq!(page.meta.has_more, Some(true));
        assert_eq!(page.meta.next_offset, Some(2));
        assert_eq!(page.meta.total_posts, Some(30));

        let empty = normalize_trends(RawTrendsPayload::List(vec![]), now());
        assert_eq!(empty.meta.has_more, Some(false));
        assert_eq!(empty.meta.next_offset, Some(0));
    }

    #[test]
    fn envelope_meta_is_preserved() {
        let raw = RawTrendsPayload::Envelope {
            trends: vec![record("ai", 100)],
            meta: Some(RawTrendsMeta {
                total_posts: Some(9000),
                window_minutes: Some(15),
                generated_at: Some(now()),
                active_keywords: Some(7),
                total_keywords: Some(300),
                next_offset: Some(60),
                has_more: Some(true),
            }),
        };
        let page = normalize_trends(raw, now());
        assert_eq!(page.meta.total_posts, Some(9000));
        assert_eq!(page.meta.window_minutes, Some(15));
        assert_eq!(page.meta.active_keywords, Some(7));
        assert_eq!(page.meta.next_offset, Some(60));
    }

    #[test]
    fn normalization_is_idempotent() {
        let raw = RawTrendsPayload::List(vec![record("ai", 120), record("btc", 0)]);
        let once = normalize_trends(raw, now());

        // Round-trip the canonical page through the wire shape and normalize
        // again: nothing may change.
        let wire = serde_json::to_value(&once).unwrap();
        let reparsed: RawTrendsPayload = serde_json::from_value(wire).unwrap();
        let later = Utc.with_ymd_and_hms(2025, 6, 2, 0, 0, 0).unwrap();
        let twice = normalize_trends(reparsed, later);

        assert_eq!(once, twice);
    }
}
