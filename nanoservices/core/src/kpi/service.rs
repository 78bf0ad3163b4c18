//! Delivery service-quality measures.

use std::collections::HashMap;

use chrono::{Datelike, Months, Timelike};
use serde::Serialize;

use super::share_pct;
use crate::domain::DeliveryStatus;
use crate::sources::Extract;

#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct StatusShare {
    pub status: DeliveryStatus,
    pub deliveries: u64,
    pub share_pct: f64,
}

/// Share of window deliveries per status, busiest status first. Shares are
/// rounded independently and can miss a flat 100 by a rounding hair.
pub fn delivery_status_mix(extract: &Extract) -> Vec<StatusShare> {
    let total = extract.deliveries().len() as u64;
    let mut counts: HashMap<DeliveryStatus, u64> = HashMap::new();
    for delivery in extract.deliveries() {
        *counts.entry(delivery.status).or_insert(0) += 1;
    }

    let mut rows: Vec<StatusShare> = counts
        .into_iter()
        .map(|(status, deliveries)| StatusShare {
            status,
            deliveries,
            share_pct: share_pct(deliveries, total),
        })
        .collect();
    rows.sort_by(|a, b| {
        b.deliveries
            .cmp(&a.deliveries)
            .then(a.status.as_str().cmp(b.status.as_str()))
    });
    rows
}

#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct MonthlyPunctuality {
    /// Calendar month in `YYYY-MM` form.
    pub month: String,
    pub deliveries: u64,
    pub on_time_pct: f64,
}

/// On-time percentage per calendar month for the twelve months ending at
/// the reference instant, oldest first. Months without a delivered
/// delivery report 0%, never a gap.
pub fn monthly_punctuality(extract: &Extract) -> Vec<MonthlyPunctuality> {
    let anchor = extract.reference_ts().date_naive();

    let mut counts: HashMap<(i32, u32), (u64, u64)> = HashMap::new();
    for delivery in extract.deliveries() {
        let Some(delivered) = delivery.delivered_ts else { continue };
        let key = (delivered.year(), delivered.month());
        let entry = counts.entry(key).or_insert((0, 0));
        entry.0 += 1;
        if delivery.is_on_time() == Some(true) {
            entry.1 += 1;
        }
    }

    (0..12u32)
        .rev()
        .map(|back| {
            let month_start = anchor.checked_sub_months(Months::new(back)).unwrap_or(anchor);
            let key = (month_start.year(), month_start.month());
            let (delivered, on_time) = counts.get(&key).copied().unwrap_or((0, 0));
            MonthlyPunctuality {
                month: format!("{:04}-{:02}", key.0, key.1),
                deliveries: delivered,
                on_time_pct: share_pct(on_time, delivered),
            }
        })
        .collect()
}

#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct HourBucket {
    /// Two-hour slot label, e.g. `08-10`.
    pub bucket: String,
    pub start_hour: u32,
    pub deliveries: u64,
}

/// Delivered volume across the day in two-hour slots. All twelve slots are
/// always present.
pub fn delivery_hour_histogram(extract: &Extract) -> Vec<HourBucket> {
    let mut slots = [0u64; 12];
    for delivery in extract.deliveries() {
        if let Some(delivered) = delivery.delivered_ts {
            slots[(delivered.hour() / 2) as usize] += 1;
        }
    }

    slots
        .iter()
        .enumerate()
        .map(|(slot, &deliveries)| {
            let start_hour = slot as u32 * 2;
            HourBucket {
                bucket: format!("{:02}-{:02}", start_hour, start_hour + 2),
                start_hour,
                deliveries,
            }
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::kpi::fixtures::*;

    #[test]
    fn status_shares_sum_to_one_hundred() {
        let noon = ts(2026, 3, 10, 12, 0);
        let extract = ExtractBuilder::new()
            .delivery(1, 1, noon, Some(noon), 5.0, DeliveryStatus::Delivered)
            .delivery(2, 1, noon, None, 5.0, DeliveryStatus::Pending)
            .delivery(3, 1, noon, None, 5.0, DeliveryStatus::InTransit)
            .build();

        let rows = delivery_status_mix(&extract);
        assert_eq!(rows.len(), 3);
        for row in &rows {
            assert_eq!(row.share_pct, 33.33);
        }
        let sum: f64 = rows.iter().map(|r| r.share_pct).sum();
        assert!((sum - 100.0).abs() < 0.02, "shares summed to {sum}");
    }

    #[test]
    fn status_mix_orders_by_volume_then_name() {
        let noon = ts(2026, 3, 10, 12, 0);
        let extract = ExtractBuilder::new()
            .delivery(1, 1, noon, Some(noon), 5.0, DeliveryStatus::Delivered)
            .delivery(2, 1, noon, Some(noon), 5.0, DeliveryStatus::Delivered)
            .delivery(3, 1, noon, None, 5.0, DeliveryStatus::Failed)
            .delivery(4, 1, noon, None, 5.0, DeliveryStatus::Pending)
            .build();

        let rows = delivery_status_mix(&extract);
        assert_eq!(rows[0].status, DeliveryStatus::Delivered);
        assert_eq!(rows[0].deliveries, 2);
        // tie between failed and pending resolves alphabetically
        assert_eq!(rows[1].status, DeliveryStatus::Failed);
        assert_eq!(rows[2].status, DeliveryStatus::Pending);
    }

    #[test]
    fn empty_window_has_no_status_rows() {
        let extract = ExtractBuilder::new().build();
        assert!(delivery_status_mix(&extract).is_empty());
    }

    #[test]
    fn punctuality_counts_exact_match_as_on_time() {
        let scheduled = ts(2026, 3, 10, 12, 0);
        let extract = ExtractBuilder::new()
            // early
            .delivery(1, 1, scheduled, Some(ts(2026, 3, 10, 11, 30)), 5.0, DeliveryStatus::Delivered)
            // exactly on the promised instant
            .delivery(2, 1, scheduled, Some(scheduled), 5.0, DeliveryStatus::Delivered)
            // late
            .delivery(3, 1, scheduled, Some(ts(2026, 3, 10, 12, 1)), 5.0, DeliveryStatus::Delivered)
            // still open, not part of the denominator
            .delivery(4, 1, scheduled, None, 5.0, DeliveryStatus::Pending)
            .build();

        let rows = monthly_punctuality(&extract);
        assert_eq!(rows.len(), 12);
        let march = rows.iter().find(|r| r.month == "2026-03").unwrap();
        assert_eq!(march.deliveries, 3);
        assert_eq!(march.on_time_pct, 66.67);
    }

    #[test]
    fn months_without_activity_report_zero() {
        let extract = ExtractBuilder::new().build();
        let rows = monthly_punctuality(&extract);
        assert_eq!(rows.len(), 12);
        assert_eq!(rows.first().unwrap().month, "2025-05");
        assert_eq!(rows.last().unwrap().month, "2026-04");
        assert!(rows.iter().all(|r| r.deliveries == 0 && r.on_time_pct == 0.0));
    }

    #[test]
    fn histogram_emits_all_twelve_slots() {
        let extract = ExtractBuilder::new()
            .delivery(1, 1, ts(2026, 3, 10, 8, 0), Some(ts(2026, 3, 10, 8, 5)), 5.0, DeliveryStatus::Delivered)
            .delivery(2, 1, ts(2026, 3, 10, 9, 0), Some(ts(2026, 3, 10, 9, 59)), 5.0, DeliveryStatus::Delivered)
            .delivery(3, 1, ts(2026, 3, 10, 23, 0), Some(ts(2026, 3, 10, 23, 30)), 5.0, DeliveryStatus::Delivered)
            .delivery(4, 1, ts(2026, 3, 10, 10, 0), None, 5.0, DeliveryStatus::Pending)
            .build();

        let rows = delivery_hour_histogram(&extract);
        assert_eq!(rows.len(), 12);
        assert_eq!(rows[4].bucket, "08-10");
        assert_eq!(rows[4].deliveries, 2);
        assert_eq!(rows[11].bucket, "22-24");
        assert_eq!(rows[11].deliveries, 1);
        let counted: u64 = rows.iter().map(|r| r.deliveries).sum();
        assert_eq!(counted, 3);
    }
}
