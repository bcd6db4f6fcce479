//! Attendance listings, clearing and daily statistics.

use crate::{Store, StoreError};
use chrono::{NaiveDateTime, TimeDelta};
use rollcall_core::{format_timestamp, start_of_day};
use serde::Serialize;
use std::str::FromStr;

/// Which attendance records a listing or clear applies to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AttendanceScope {
    /// Records with timestamp >= the start of the current day.
    Today,
    All,
}

impl FromStr for AttendanceScope {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "today" => Ok(AttendanceScope::Today),
            "all" => Ok(AttendanceScope::All),
            other => Err(format!("unknown attendance scope: {other} (expected today|all)")),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct AttendanceEntry {
    pub name: String,
    pub roll: String,
    pub timestamp: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DayCount {
    pub date: String,
    pub count: i64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DailyStats {
    pub total: i64,
    pub present: i64,
    pub absent: i64,
    /// Present / total as a percentage, one decimal.
    pub rate: f64,
    #[serde(rename = "last7days")]
    pub last_7_days: Vec<DayCount>,
}

fn lower_bound(scope: AttendanceScope, now: NaiveDateTime) -> String {
    match scope {
        AttendanceScope::Today => format_timestamp(start_of_day(now)),
        // Sorts before every stored timestamp.
        AttendanceScope::All => String::new(),
    }
}

impl Store {
    /// Records in scope, newest first.
    pub fn attendance(
        &self,
        scope: AttendanceScope,
        now: NaiveDateTime,
    ) -> Result<Vec<AttendanceEntry>, StoreError> {
        let conn = self.conn();
        let mut stmt = conn.prepare(
            "SELECT i.name, i.roll_number, a.timestamp
             FROM attendance a
             JOIN identities i ON a.identity_id = i.id
             WHERE a.timestamp >= ?1
             ORDER BY a.timestamp DESC, a.id DESC",
        )?;
        let rows = stmt.query_map([lower_bound(scope, now)], |row| {
            Ok(AttendanceEntry {
                name: row.get(0)?,
                roll: row.get(1)?,
                timestamp: row.get(2)?,
            })
        })?;
        Ok(rows.collect::<Result<Vec<_>, _>>()?)
    }

    /// Delete records in scope. Returns the number removed.
    pub fn clear_attendance(
        &self,
        scope: AttendanceScope,
        now: NaiveDateTime,
    ) -> Result<usize, StoreError> {
        let deleted = match scope {
            AttendanceScope::All => self.conn().execute("DELETE FROM attendance", [])?,
            AttendanceScope::Today => self.conn().execute(
                "DELETE FROM attendance WHERE timestamp >= ?1",
                [lower_bound(scope, now)],
            )?,
        };
        tracing::info!(?scope, deleted, "attendance cleared");
        Ok(deleted)
    }

    /// Distinct identities with at least one record in `[from, to)`.
    fn distinct_present(&self, from: NaiveDateTime, to: NaiveDateTime) -> Result<i64, StoreError> {
        Ok(self.conn().query_row(
            "SELECT COUNT(DISTINCT identity_id) FROM attendance
             WHERE timestamp >= ?1 AND timestamp < ?2",
            [format_timestamp(from), format_timestamp(to)],
            |row| row.get(0),
        )?)
    }

    /// Distinct identities marked since the start of today.
    pub fn present_today(&self, now: NaiveDateTime) -> Result<i64, StoreError> {
        Ok(self.conn().query_row(
            "SELECT COUNT(DISTINCT identity_id) FROM attendance WHERE timestamp >= ?1",
            [lower_bound(AttendanceScope::Today, now)],
            |row| row.get(0),
        )?)
    }

    pub fn daily_stats(&self, now: NaiveDateTime) -> Result<DailyStats, StoreError> {
        let total = self.identity_count()?;
        let present = self.present_today(now)?;
        let rate = if total > 0 {
            (present as f64 / total as f64 * 1000.0).round() / 10.0
        } else {
            0.0
        };

        let today = start_of_day(now);
        let mut last_7_days = Vec::with_capacity(7);
        for back in (0..7).rev() {
            let day = today - TimeDelta::days(back);
            last_7_days.push(DayCount {
                date: day.format("%Y-%m-%d").to_string(),
                count: self.distinct_present(day, day + TimeDelta::days(1))?,
            });
        }

        Ok(DailyStats {
            total,
            present,
            absent: (total - present).max(0),
            rate,
            last_7_days,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rollcall_core::{parse_timestamp, Encoding};

    fn ts(raw: &str) -> NaiveDateTime {
        parse_timestamp(raw).unwrap()
    }

    /// Three identities; R001 seen yesterday and twice today, R002 today.
    fn seeded() -> (Store, NaiveDateTime) {
        let store = Store::open_in_memory().unwrap();
        let created = ts("2026-02-01 08:00:00");
        let a = store.add_identity("Ada", "R001", &Encoding::new(vec![0.0]), created).unwrap();
        let b = store.add_identity("Bo", "R002", &Encoding::new(vec![1.0]), created).unwrap();
        store.add_identity("Cy", "R003", &Encoding::new(vec![2.0]), created).unwrap();

        store.insert_mark(a, ts("2026-03-01 09:00:00")).unwrap();
        store.insert_mark(a, ts("2026-03-02 09:00:00")).unwrap();
        store.insert_mark(a, ts("2026-03-02 10:00:00")).unwrap();
        store.insert_mark(b, ts("2026-03-02 09:30:00")).unwrap();
        (store, ts("2026-03-02 15:00:00"))
    }

    #[test]
    fn test_scope_parse() {
        assert_eq!("today".parse::<AttendanceScope>(), Ok(AttendanceScope::Today));
        assert_eq!("all".parse::<AttendanceScope>(), Ok(AttendanceScope::All));
        assert!("week".parse::<AttendanceScope>().is_err());
    }

    #[test]
    fn test_attendance_today_newest_first() {
        let (store, now) = seeded();
        let today = store.attendance(AttendanceScope::Today, now).unwrap();
        let stamps: Vec<&str> = today.iter().map(|e| e.timestamp.as_str()).collect();
        assert_eq!(
            stamps,
            vec!["2026-03-02 10:00:00", "2026-03-02 09:30:00", "2026-03-02 09:00:00"]
        );
        assert_eq!(today[1].name, "Bo");
        assert_eq!(today[1].roll, "R002");
    }

    #[test]
    fn test_attendance_all() {
        let (store, now) = seeded();
        assert_eq!(store.attendance(AttendanceScope::All, now).unwrap().len(), 4);
    }

    #[test]
    fn test_clear_today_keeps_prior_days() {
        let (store, now) = seeded();
        assert_eq!(store.clear_attendance(AttendanceScope::Today, now).unwrap(), 3);

        let remaining = store.attendance(AttendanceScope::All, now).unwrap();
        assert_eq!(remaining.len(), 1);
        assert_eq!(remaining[0].timestamp, "2026-03-01 09:00:00");
    }

    #[test]
    fn test_clear_all() {
        let (store, now) = seeded();
        assert_eq!(store.clear_attendance(AttendanceScope::All, now).unwrap(), 4);
        assert!(store.attendance(AttendanceScope::All, now).unwrap().is_empty());
    }

    #[test]
    fn test_present_today_counts_distinct() {
        let (store, now) = seeded();
        assert_eq!(store.present_today(now).unwrap(), 2);
    }

    #[test]
    fn test_daily_stats() {
        let (store, now) = seeded();
        let stats = store.daily_stats(now).unwrap();

        assert_eq!(stats.total, 3);
        assert_eq!(stats.present, 2);
        assert_eq!(stats.absent, 1);
        assert_eq!(stats.rate, 66.7);
        assert_eq!(stats.last_7_days.len(), 7);
        assert_eq!(stats.last_7_days[0].date, "2026-02-24");
        assert_eq!(stats.last_7_days[5], DayCount { date: "2026-03-01".into(), count: 1 });
        assert_eq!(stats.last_7_days[6], DayCount { date: "2026-03-02".into(), count: 2 });
    }

    #[test]
    fn test_daily_stats_empty() {
        let store = Store::open_in_memory().unwrap();
        let stats = store.daily_stats(ts("2026-03-02 15:00:00")).unwrap();
        assert_eq!(stats.total, 0);
        assert_eq!(stats.rate, 0.0);
        assert!(stats.last_7_days.iter().all(|d| d.count == 0));
    }
}
