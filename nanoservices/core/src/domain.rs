//! Typed rows for the six transactional source tables.
//!
//! Natural keys are the source integer ids. Status columns are stored as
//! lowercase text in both the source and the warehouse; the enums here are
//! the only place that encoding lives.

use chrono::{DateTime, NaiveDate, Utc};
use rusqlite::types::{FromSql, FromSqlError, FromSqlResult, ToSql, ToSqlOutput, ValueRef};
use serde::Serialize;

macro_rules! text_status {
    ($name:ident { $($variant:ident => $text:literal),+ $(,)? }) => {
        #[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize)]
        #[serde(rename_all = "snake_case")]
        pub enum $name {
            $($variant,)+
        }

        impl $name {
            pub fn as_str(&self) -> &'static str {
                match self {
                    $($name::$variant => $text,)+
                }
            }

            pub fn parse(s: &str) -> Option<Self> {
                match s {
                    $($text => Some($name::$variant),)+
                    _ => None,
                }
            }
        }

        impl FromSql for $name {
            fn column_result(value: ValueRef<'_>) -> FromSqlResult<Self> {
                let s = value.as_str()?;
                $name::parse(s).ok_or_else(|| {
                    FromSqlError::Other(
                        format!(concat!("unknown ", stringify!($name), " value: {}"), s).into(),
                    )
                })
            }
        }

        impl ToSql for $name {
            fn to_sql(&self) -> rusqlite::Result<ToSqlOutput<'_>> {
                Ok(ToSqlOutput::from(self.as_str()))
            }
        }
    };
}

text_status!(VehicleStatus {
    Active => "active",
    InMaintenance => "in_maintenance",
    Retired => "retired",
});

text_status!(DriverStatus {
    Active => "active",
    Inactive => "inactive",
});

text_status!(TripStatus {
    InProgress => "in_progress",
    Completed => "completed",
    Cancelled => "cancelled",
});

text_status!(DeliveryStatus {
    Pending => "pending",
    InTransit => "in_transit",
    Delivered => "delivered",
    Failed => "failed",
});

impl DeliveryStatus {
    /// Terminal fact rows are never rewritten by later runs.
    pub fn is_terminal(&self) -> bool {
        matches!(self, DeliveryStatus::Delivered | DeliveryStatus::Failed)
    }
}

#[derive(Clone, Debug, PartialEq)]
pub struct Vehicle {
    pub id: i64,
    pub plate: String,
    pub vehicle_type: String,
    pub status: VehicleStatus,
}

#[derive(Clone, Debug, PartialEq)]
pub struct Driver {
    pub id: i64,
    pub name: String,
    pub license_number: String,
    pub license_expiry: NaiveDate,
    pub status: DriverStatus,
}

#[derive(Clone, Debug, PartialEq)]
pub struct Route {
    pub id: i64,
    pub code: String,
    pub origin_city: String,
    pub destination_city: String,
    pub distance_km: f64,
}

#[derive(Clone, Debug, PartialEq)]
pub struct Trip {
    pub id: i64,
    pub vehicle_id: i64,
    pub driver_id: i64,
    pub route_id: i64,
    pub departure_ts: DateTime<Utc>,
    pub arrival_ts: Option<DateTime<Utc>>,
    pub fuel_consumed_l: f64,
    pub status: TripStatus,
}

impl Trip {
    /// Raw wall-clock duration; `None` while the trip is still under way.
    pub fn duration_hours(&self) -> Option<f64> {
        self.arrival_ts
            .map(|arrival| (arrival - self.departure_ts).num_seconds() as f64 / 3600.0)
    }
}

#[derive(Clone, Debug, PartialEq)]
pub struct Delivery {
    pub id: i64,
    pub trip_id: i64,
    pub scheduled_ts: DateTime<Utc>,
    pub delivered_ts: Option<DateTime<Utc>>,
    pub package_weight_kg: f64,
    pub status: DeliveryStatus,
}

impl Delivery {
    /// On-time means delivered at or before the promised instant. `None`
    /// until a delivery timestamp exists.
    pub fn is_on_time(&self) -> Option<bool> {
        self.delivered_ts.map(|ts| ts <= self.scheduled_ts)
    }
}

#[derive(Clone, Debug, PartialEq)]
pub struct Maintenance {
    pub id: i64,
    pub vehicle_id: i64,
    pub maintenance_date: NaiveDate,
    pub cost: f64,
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn status_text_round_trips() {
        assert_eq!(VehicleStatus::parse("in_maintenance"), Some(VehicleStatus::InMaintenance));
        assert_eq!(VehicleStatus::InMaintenance.as_str(), "in_maintenance");
        assert_eq!(DeliveryStatus::parse("in_transit"), Some(DeliveryStatus::InTransit));
        assert_eq!(TripStatus::parse("no_such_state"), None);
    }

    #[test]
    fn only_delivered_and_failed_are_terminal() {
        assert!(DeliveryStatus::Delivered.is_terminal());
        assert!(DeliveryStatus::Failed.is_terminal());
        assert!(!DeliveryStatus::Pending.is_terminal());
        assert!(!DeliveryStatus::InTransit.is_terminal());
    }

    #[test]
    fn exact_match_counts_as_on_time() {
        let scheduled = Utc.with_ymd_and_hms(2026, 3, 15, 10, 0, 0).unwrap();
        let delivery = Delivery {
            id: 1,
            trip_id: 1,
            scheduled_ts: scheduled,
            delivered_ts: Some(scheduled),
            package_weight_kg: 12.0,
            status: DeliveryStatus::Delivered,
        };
        assert_eq!(delivery.is_on_time(), Some(true));

        let late = Delivery {
            delivered_ts: Some(scheduled + chrono::Duration::seconds(1)),
            ..delivery.clone()
        };
        assert_eq!(late.is_on_time(), Some(false));

        let open = Delivery { delivered_ts: None, status: DeliveryStatus::Pending, ..delivery };
        assert_eq!(open.is_on_time(), None);
    }

    #[test]
    fn trip_duration_is_none_until_arrival() {
        let departure = Utc.with_ymd_and_hms(2026, 3, 15, 8, 0, 0).unwrap();
        let mut trip = Trip {
            id: 1,
            vehicle_id: 1,
            driver_id: 1,
            route_id: 1,
            departure_ts: departure,
            arrival_ts: None,
            fuel_consumed_l: 40.0,
            status: TripStatus::InProgress,
        };
        assert_eq!(trip.duration_hours(), None);

        trip.arrival_ts = Some(departure + chrono::Duration::minutes(90));
        trip.status = TripStatus::Completed;
        assert_eq!(trip.duration_hours(), Some(1.5));
    }
}
