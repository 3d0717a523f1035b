use chrono::{Duration, NaiveDate};

use crate::models::EventContent;

/// Aggregate of same-named events: occurrence count plus first/last log dates.
/// Recomputed from scratch on every statistics refresh, never persisted.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GroupedEvent {
    pub count: u32,
    pub first_log: String,
    pub last_log: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EventStat {
    pub name: String,
    pub count: u32,
    pub frequency: String,
    pub current_month_frequency: String,
    pub last_date: String,
}

pub const MAX_TOP_EVENT_STATS: usize = 15;

/// Parse a YYYY-MM-DD string, normalizing day overflow the way a calendar
/// would (e.g. 2022-02-30 becomes 2022-03-02).
fn parse_date(date: &str) -> Option<NaiveDate> {
    let year: i32 = date.get(0..4)?.parse().ok()?;
    let month: u32 = date.get(5..7)?.parse().ok()?;
    let day: i64 = date.get(8..10)?.parse().ok()?;

    let first_of_month = NaiveDate::from_ymd_opt(year, month, 1)?;

    Some(first_of_month + Duration::days(day - 1))
}

pub fn date_diff_in_days(start_date: &str, end_date: &str) -> i64 {
    match (parse_date(start_date), parse_date(end_date)) {
        (Some(start), Some(end)) => (end - start).num_days(),
        _ => 0,
    }
}

/// Human-readable recurrence estimate over the event's whole lifetime,
/// e.g. "3x / month".
pub fn calculate_frequency_from_grouped_event(grouped_event: &GroupedEvent) -> String {
    let day_difference =
        date_diff_in_days(&grouped_event.first_log, &grouped_event.last_log).unsigned_abs() as f64;
    let month_difference = (day_difference / 30.0).round();

    // This event has only existed for less than 6 months, so we can't know if it'll repeat any more
    if month_difference <= 6.0 && grouped_event.count < 12 {
        return format!("{}x / year", grouped_event.count.max(1));
    }

    // 12+ logs all on a single day: count that as one month instead of dividing by zero
    let month_difference = month_difference.max(1.0);

    let frequency_number_per_month = (grouped_event.count as f64 / month_difference).round();

    // When potentially less than once per month, check frequency per year
    if frequency_number_per_month <= 1.0 {
        let frequency_number_per_year =
            ((grouped_event.count as f64 / month_difference) * 12.0).round();

        if frequency_number_per_year < 12.0 {
            return format!("{}x / year", (frequency_number_per_year as u32).max(1));
        }
    }

    if frequency_number_per_month < 15.0 {
        return format!("{}x / month", frequency_number_per_month as u32);
    }

    let frequency_number_per_week =
        (grouped_event.count as f64 / month_difference / 4.0).round();

    if frequency_number_per_week < 7.0 {
        // TODO: confirm whether this should show the weekly figure instead; the
        // monthly one is kept for parity with historically displayed stats.
        return format!("{}x / week", frequency_number_per_month as u32);
    }

    let frequency_number_per_day =
        (grouped_event.count as f64 / month_difference / 30.0).round();

    format!("{}x / day", frequency_number_per_day as u32)
}

/// Same shape as the lifetime estimate, but laddering from weeks, for the
/// month currently in view. Labels without a unit ("2x") mean "this month".
pub fn calculate_current_month_frequency_from_grouped_event(grouped_event: &GroupedEvent) -> String {
    let day_difference =
        date_diff_in_days(&grouped_event.first_log, &grouped_event.last_log).unsigned_abs() as f64;
    let week_difference = (day_difference / 7.0).round();

    // This event has only existed for less than 2 weeks, so we can't know if it'll repeat any more
    if grouped_event.count < 4 || week_difference <= 2.0 {
        return format!("{}x", grouped_event.count.max(1));
    }

    let frequency_number_per_week = (grouped_event.count as f64 / week_difference).round();

    // When potentially less than once per week, check frequency in the month
    if frequency_number_per_week <= 1.0 {
        let frequency_number_in_month =
            ((grouped_event.count as f64 / week_difference) * 4.0).round();

        if frequency_number_in_month < 4.0 {
            return format!("{}x", (frequency_number_in_month as u32).max(1));
        }
    }

    if frequency_number_per_week < 7.0 {
        return format!("{}x / week", frequency_number_per_week as u32);
    }

    let frequency_number_per_day =
        (grouped_event.count as f64 / week_difference / 7.0).round();

    format!("{}x / day", frequency_number_per_day as u32)
}

/// Group events by name, counting them and tracking first/last log dates.
/// Returns groups in first-seen order.
pub fn group_events_by_name(events: &[EventContent]) -> Vec<(String, GroupedEvent)> {
    let mut groups: Vec<(String, GroupedEvent)> = Vec::new();

    for event in events {
        match groups.iter_mut().find(|(name, _)| *name == event.name) {
            Some((_, group)) => {
                group.count += 1;
                if event.date < group.first_log {
                    group.first_log = event.date.clone();
                }
                if event.date > group.last_log {
                    group.last_log = event.date.clone();
                }
            }
            None => {
                groups.push((
                    event.name.clone(),
                    GroupedEvent {
                        count: 1,
                        first_log: event.date.clone(),
                        last_log: event.date.clone(),
                    },
                ));
            }
        }
    }

    groups
}

/// Compute per-event-name stats across all events, sorted by count descending
/// and capped at the top 15.
/// `month_in_view` (YYYY-MM) selects which logs feed the current-month label;
/// events without a log in that month get "0x".
pub fn compute_event_stats(all_events: &[EventContent], month_in_view: &str) -> Vec<EventStat> {
    let groups = group_events_by_name(all_events);

    let month_events: Vec<EventContent> = all_events
        .iter()
        .filter(|event| event.date.starts_with(month_in_view))
        .cloned()
        .collect();
    let month_groups = group_events_by_name(&month_events);

    let mut stats: Vec<EventStat> = groups
        .iter()
        .map(|(name, group)| EventStat {
            name: name.clone(),
            count: group.count,
            frequency: calculate_frequency_from_grouped_event(group),
            current_month_frequency: month_groups
                .iter()
                .find(|(month_name, _)| month_name == name)
                .map(|(_, month_group)| {
                    calculate_current_month_frequency_from_grouped_event(month_group)
                })
                .unwrap_or_else(|| "0x".to_string()),
            last_date: group.last_log.clone(),
        })
        .collect();

    stats.sort_by(|a, b| b.count.cmp(&a.count));
    stats.truncate(MAX_TOP_EVENT_STATS);

    stats
}

#[cfg(test)]
mod tests {
    use super::*;

    fn event(name: &str, date: &str) -> EventContent {
        EventContent {
            name: name.to_string(),
            date: date.to_string(),
        }
    }

    #[test]
    fn test_date_diff_in_days() {
        let tests = [
            ("2022-01-01", "2022-01-01", 0),
            ("2022-01-01", "2022-01-02", 1),
            ("2022-01-01", "2022-12-02", 335),
        ];

        for (start, end, expected) in tests {
            assert_eq!(date_diff_in_days(start, end), expected);
        }
    }

    #[test]
    fn test_date_diff_normalizes_day_overflow() {
        // A "February 30" reads as March 2
        assert_eq!(date_diff_in_days("2022-01-01", "2022-02-30"), 60);
    }

    #[test]
    fn test_calculate_frequency_from_grouped_event() {
        let tests = [
            (12, "2022-01-01", "2022-12-01", "1x / month"),
            (16, "2022-01-01", "2022-12-01", "1x / month"),
            (18, "2022-01-01", "2022-12-01", "2x / month"),
            (30, "2022-01-01", "2022-12-01", "3x / month"),
            (2, "2022-01-01", "2022-01-06", "2x / year"),
            (30, "2022-01-01", "2022-01-30", "1x / day"),
            (10, "2022-01-01", "2022-01-30", "10x / year"),
            (1, "2022-01-01", "2022-01-30", "1x / year"),
            (1, "2022-01-01", "2022-02-30", "1x / year"),
            (1, "2022-01-01", "2025-01-30", "1x / year"),
            (2, "2022-01-01", "2025-01-30", "1x / year"),
        ];

        for (count, first_log, last_log, expected) in tests {
            let grouped_event = GroupedEvent {
                count,
                first_log: first_log.to_string(),
                last_log: last_log.to_string(),
            };
            assert_eq!(
                calculate_frequency_from_grouped_event(&grouped_event),
                expected,
                "count: {count}, first: {first_log}, last: {last_log}"
            );
        }
    }

    #[test]
    fn test_lifetime_frequency_is_total_on_single_day_bursts() {
        // 12+ logs on the same date used to divide by zero
        let grouped_event = GroupedEvent {
            count: 20,
            first_log: "2022-01-01".to_string(),
            last_log: "2022-01-01".to_string(),
        };
        assert_eq!(calculate_frequency_from_grouped_event(&grouped_event), "20x / week");
    }

    #[test]
    fn test_calculate_current_month_frequency_from_grouped_event() {
        let tests = [
            (12, "2022-01-01", "2022-01-31", "3x / week"),
            (16, "2022-01-01", "2022-01-31", "4x / week"),
            (18, "2022-01-01", "2022-01-31", "5x / week"),
            (30, "2022-01-01", "2022-01-31", "1x / day"),
            (2, "2022-01-01", "2022-01-31", "2x"),
            (4, "2022-01-01", "2022-01-31", "1x / week"),
            (4, "2022-01-01", "2022-01-05", "4x"),
            (1, "2022-01-01", "2022-01-30", "1x"),
            (1, "2022-01-01", "2022-01-01", "1x"),
            (6, "2022-01-01", "2022-01-09", "6x"),
        ];

        for (count, first_log, last_log, expected) in tests {
            let grouped_event = GroupedEvent {
                count,
                first_log: first_log.to_string(),
                last_log: last_log.to_string(),
            };
            assert_eq!(
                calculate_current_month_frequency_from_grouped_event(&grouped_event),
                expected,
                "count: {count}, first: {first_log}, last: {last_log}"
            );
        }
    }

    #[test]
    fn test_lifetime_frequency_label_shape() {
        let inputs = [
            (1, "2022-01-01", "2022-01-01"),
            (7, "2021-03-14", "2023-11-02"),
            (250, "2022-01-01", "2022-06-01"),
            (900, "2022-01-01", "2024-01-01"),
            (12, "2022-05-05", "2022-05-05"),
        ];

        for (count, first_log, last_log) in inputs {
            let grouped_event = GroupedEvent {
                count,
                first_log: first_log.to_string(),
                last_log: last_log.to_string(),
            };
            let label = calculate_frequency_from_grouped_event(&grouped_event);
            let (number, unit) = label.split_once("x / ").expect("label has a unit");
            assert!(number.parse::<u32>().is_ok(), "label: {label}");
            assert!(["year", "month", "week", "day"].contains(&unit), "label: {label}");
        }
    }

    #[test]
    fn test_group_events_by_name() {
        let events = vec![
            event("run", "2022-01-10"),
            event("read", "2022-01-02"),
            event("run", "2022-01-03"),
            event("run", "2022-01-21"),
        ];

        let groups = group_events_by_name(&events);

        assert_eq!(groups.len(), 2);
        assert_eq!(groups[0].0, "run");
        assert_eq!(
            groups[0].1,
            GroupedEvent {
                count: 3,
                first_log: "2022-01-03".to_string(),
                last_log: "2022-01-21".to_string(),
            }
        );
        assert_eq!(groups[1].1.count, 1);
    }

    #[test]
    fn test_compute_event_stats() {
        let events = vec![
            event("read", "2021-12-05"),
            event("run", "2022-01-10"),
            event("run", "2022-01-03"),
            event("run", "2021-11-21"),
            event("read", "2021-11-01"),
            event("swim", "2021-10-09"),
        ];

        let stats = compute_event_stats(&events, "2022-01");

        assert_eq!(stats.len(), 3);
        assert_eq!(stats[0].name, "run");
        assert_eq!(stats[0].count, 3);
        assert_eq!(stats[0].last_date, "2022-01-10");
        assert_eq!(stats[0].current_month_frequency, "2x");
        // No logs in the month in view
        assert_eq!(stats[2].name, "swim");
        assert_eq!(stats[2].current_month_frequency, "0x");
    }

    #[test]
    fn test_compute_event_stats_caps_at_top_15() {
        let events: Vec<EventContent> =
            (0..20).map(|i| event(&format!("event-{i}"), "2022-01-01")).collect();

        let stats = compute_event_stats(&events, "2022-01");

        assert_eq!(stats.len(), MAX_TOP_EVENT_STATS);
    }
}
