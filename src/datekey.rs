//! Execution-date discipline.
//!
//! One civil-time value keys both the snapshot artifact path and the loader's
//! delete window. It is captured exactly once per job invocation and threaded
//! through every operation, so a midnight rollover mid-run can never split
//! the artifact path from the delete range.
use anyhow::{Context, Result};
use chrono::{DateTime, Duration, NaiveDate, NaiveDateTime, NaiveTime, TimeZone, Utc};
use chrono_tz::Tz;
use object_store::path::Path as ObjectPath;

/// Civil time zone governing artifact naming and load idempotency. Not UTC.
pub const PIPELINE_TZ: Tz = chrono_tz::Asia::Tokyo;

/// The single date value for one job invocation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ExecutionDate {
    at: DateTime<Tz>,
}

impl ExecutionDate {
    /// Capture the current JST wall clock. Call once, early.
    pub fn now() -> Self {
        Self {
            at: Utc::now().with_timezone(&PIPELINE_TZ),
        }
    }

    /// Parse a `YYYYMMDD` override (loader backfills); keys midnight JST of
    /// that day.
    pub fn from_ymd_str(raw: &str) -> Result<Self> {
        let date = NaiveDate::parse_from_str(raw.trim(), "%Y%m%d")
            .with_context(|| format!("invalid date {raw:?}; expected YYYYMMDD"))?;
        let at = PIPELINE_TZ
            .from_local_datetime(&date.and_time(NaiveTime::MIN))
            .single()
            .with_context(|| format!("date {raw:?} does not map to a JST timestamp"))?;
        Ok(Self { at })
    }

    pub fn year_month(&self) -> String {
        self.at.format("%Y%m").to_string()
    }

    pub fn year_month_day(&self) -> String {
        self.at.format("%Y%m%d").to_string()
    }

    /// Deterministic artifact location shared by collector and loader:
    /// `<prefix>/<yyyymm>/search_items_<yyyymmdd>.jsonl`.
    pub fn artifact_path(&self, prefix: &str) -> ObjectPath {
        ObjectPath::from(format!(
            "{}/{}/search_items_{}.jsonl",
            prefix.trim_matches('/'),
            self.year_month(),
            self.year_month_day()
        ))
    }

    /// Wall-clock timestamp recorded in `loaded_at`.
    pub fn timestamp(&self) -> NaiveDateTime {
        self.at.naive_local()
    }

    /// Inclusive day window `[00:00:00.000000, 23:59:59.999999]` used as the
    /// delete range for idempotent reloads.
    pub fn day_bounds(&self) -> (NaiveDateTime, NaiveDateTime) {
        let start = self.at.date_naive().and_time(NaiveTime::MIN);
        let end = start + Duration::days(1) - Duration::microseconds(1);
        (start, end)
    }
}
