//! Timeline summaries: an owner's live memories bucketed by ISO week or calendar month.

use std::collections::BTreeMap;

use anyhow::Result;
use chrono::{DateTime, Datelike, Days, Months, NaiveDate, Weekday};
use rusqlite::Connection;
use serde::Serialize;

use crate::memory::store::list_memories;
use crate::memory::types::MemoryRecord;

/// Bucket size for [`timeline_summary`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Timeframe {
    Weekly,
    Monthly,
}

impl std::str::FromStr for Timeframe {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "weekly" => Ok(Self::Weekly),
            "monthly" => Ok(Self::Monthly),
            _ => Err(format!(
                "Invalid timeframe: {s:?} (expected weekly or monthly)"
            )),
        }
    }
}

impl Timeframe {
    /// Period label and inclusive date range containing `date`.
    fn period_of(self, date: NaiveDate) -> Option<(String, NaiveDate, NaiveDate)> {
        match self {
            Self::Weekly => {
                let week = date.iso_week();
                let start = NaiveDate::from_isoywd_opt(week.year(), week.week(), Weekday::Mon)?;
                let end = start.checked_add_days(Days::new(6))?;
                Some((format!("{}-W{:02}", week.year(), week.week()), start, end))
            }
            Self::Monthly => {
                let start = NaiveDate::from_ymd_opt(date.year(), date.month(), 1)?;
                let end = start.checked_add_months(Months::new(1))?.pred_opt()?;
                Some((format!("{}-{:02}", date.year(), date.month()), start, end))
            }
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct TimelineEntry {
    #[serde(flatten)]
    pub memory: MemoryRecord,
    /// Score of the first sentiment annotation, 0.0 when there is none.
    pub sentiment_score: f64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub image_url: Option<String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct TimelineGroup {
    pub period: String,
    pub start: NaiveDate,
    pub end: NaiveDate,
    pub count: usize,
    pub top_positive: f64,
    pub top_negative: f64,
    /// Newest first.
    pub memories: Vec<TimelineEntry>,
}

#[derive(Debug, Clone, Serialize)]
pub struct TimelineSummary {
    pub timeframe: Timeframe,
    pub total_memories: usize,
    /// Most recent period first.
    pub groups: Vec<TimelineGroup>,
}

/// Group the newest `limit` live memories of `user_id` into periods.
///
/// Memories whose timestamp does not parse are counted but not grouped.
pub fn timeline_summary(
    conn: &Connection,
    user_id: i64,
    timeframe: Timeframe,
    limit: usize,
) -> Result<TimelineSummary> {
    let records = list_memories(conn, user_id, limit, 0, None)?;
    let total_memories = records.len();

    let mut groups: BTreeMap<NaiveDate, TimelineGroup> = BTreeMap::new();
    for memory in records {
        let date = match DateTime::parse_from_rfc3339(&memory.timestamp) {
            Ok(ts) => ts.date_naive(),
            Err(e) => {
                tracing::warn!(id = memory.id, error = %e, "skipping memory with unparseable timestamp");
                continue;
            }
        };
        let Some((period, start, end)) = timeframe.period_of(date) else {
            continue;
        };

        let sentiment_score = memory.sentiments.first().map_or(0.0, |s| s.score);
        let group = groups.entry(start).or_insert_with(|| TimelineGroup {
            period,
            start,
            end,
            count: 0,
            top_positive: sentiment_score,
            top_negative: sentiment_score,
            memories: Vec::new(),
        });
        group.count += 1;
        group.top_positive = group.top_positive.max(sentiment_score);
        group.top_negative = group.top_negative.min(sentiment_score);
        group.memories.push(TimelineEntry {
            memory,
            sentiment_score,
            image_url: None,
        });
    }

    tracing::debug!(user_id, ?timeframe, periods = groups.len(), "timeline built");
    Ok(TimelineSummary {
        timeframe,
        total_memories,
        groups: groups.into_values().rev().collect(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db;
    use crate::memory::store::{store_memory, NewMemory};
    use crate::memory::types::Sentiment;

    fn date(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    fn add(conn: &mut Connection, user: i64, text: &str, ts: &str, score: Option<f64>) -> i64 {
        let mut memory = NewMemory::text(user, text);
        memory.timestamp = Some(ts.into());
        if let Some(score) = score {
            memory.sentiments = vec![Sentiment {
                score,
                label: if score >= 0.0 { "POSITIVE" } else { "NEGATIVE" }.into(),
                confidence: 0.9,
            }];
        }
        store_memory(conn, &memory, None, None).unwrap().id
    }

    #[test]
    fn timeframe_parses_case_insensitively() {
        assert_eq!("Weekly".parse::<Timeframe>().unwrap(), Timeframe::Weekly);
        assert_eq!(" monthly ".parse::<Timeframe>().unwrap(), Timeframe::Monthly);
        assert!("daily".parse::<Timeframe>().is_err());
    }

    #[test]
    fn iso_week_crossing_the_year_boundary() {
        let (period, start, end) = Timeframe::Weekly.period_of(date(2025, 1, 1)).unwrap();
        assert_eq!(period, "2025-W01");
        assert_eq!(start, date(2024, 12, 30));
        assert_eq!(end, date(2025, 1, 5));

        let (period, _, _) = Timeframe::Weekly.period_of(date(2027, 1, 1)).unwrap();
        assert_eq!(period, "2026-W53");
    }

    #[test]
    fn month_ends_on_its_last_day() {
        let (period, start, end) = Timeframe::Monthly.period_of(date(2024, 2, 14)).unwrap();
        assert_eq!(period, "2024-02");
        assert_eq!(start, date(2024, 2, 1));
        assert_eq!(end, date(2024, 2, 29));

        let (_, _, end) = Timeframe::Monthly.period_of(date(2025, 12, 31)).unwrap();
        assert_eq!(end, date(2025, 12, 31));
    }

    #[test]
    fn groups_are_newest_first_with_sentiment_extremes() {
        let mut conn = db::open_memory_database().unwrap();
        let march = add(&mut conn, 1, "spring cleaning", "2025-03-10T09:00:00Z", Some(0.2));
        let may_a = add(&mut conn, 1, "promotion", "2025-05-02T09:00:00Z", Some(0.9));
        let may_b = add(&mut conn, 1, "flat tyre", "2025-05-20T18:00:00Z", Some(-0.7));
        let may_c = add(&mut conn, 1, "plain note", "2025-05-21T08:00:00Z", None);
        add(&mut conn, 2, "not mine", "2025-05-21T08:00:00Z", Some(1.0));

        let summary = timeline_summary(&conn, 1, Timeframe::Monthly, 500).unwrap();
        assert_eq!(summary.total_memories, 4);
        assert_eq!(summary.groups.len(), 2);

        let may = &summary.groups[0];
        assert_eq!(may.period, "2025-05");
        assert_eq!(may.end, date(2025, 5, 31));
        assert_eq!(may.count, 3);
        assert_eq!(may.top_positive, 0.9);
        assert_eq!(may.top_negative, -0.7);
        let ids: Vec<i64> = may.memories.iter().map(|e| e.memory.id).collect();
        assert_eq!(ids, vec![may_c, may_b, may_a]);
        assert_eq!(may.memories[0].sentiment_score, 0.0);

        let earlier = &summary.groups[1];
        assert_eq!(earlier.period, "2025-03");
        assert_eq!(earlier.memories[0].memory.id, march);
    }

    #[test]
    fn limit_keeps_the_newest_memories() {
        let mut conn = db::open_memory_database().unwrap();
        add(&mut conn, 1, "old", "2025-01-06T09:00:00Z", None);
        let recent = add(&mut conn, 1, "recent", "2025-02-03T09:00:00Z", None);

        let summary = timeline_summary(&conn, 1, Timeframe::Weekly, 1).unwrap();
        assert_eq!(summary.total_memories, 1);
        assert_eq!(summary.groups.len(), 1);
        assert_eq!(summary.groups[0].period, "2025-W06");
        assert_eq!(summary.groups[0].start, date(2025, 2, 3));
        assert_eq!(summary.groups[0].memories[0].memory.id, recent);
    }
}
