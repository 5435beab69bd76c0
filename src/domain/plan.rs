use chrono::{DateTime, Duration, Months, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Gym {
    pub id: Uuid,
    pub owner_id: Uuid,
    pub name: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CreateGymRequest {
    pub owner_id: Uuid,
    pub name: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Plan {
    pub id: Uuid,
    pub gym_id: Uuid,
    pub name: String,
    pub price: i64,
    pub currency: String,
    pub duration_value: u32,
    pub duration_unit: DurationUnit,
    pub is_active: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CreatePlanRequest {
    pub gym_id: Uuid,
    pub name: String,
    pub price: i64,
    pub currency: String,
    pub duration_value: u32,
    pub duration_unit: DurationUnit,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum DurationUnit {
    Day,
    Week,
    Month,
    Year,
}

impl DurationUnit {
    pub fn as_str(&self) -> &'static str {
        match self {
            DurationUnit::Day => "day",
            DurationUnit::Week => "week",
            DurationUnit::Month => "month",
            DurationUnit::Year => "year",
        }
    }

    pub fn from_str(s: &str) -> Option<Self> {
        match s.to_lowercase().as_str() {
            "day" | "days" => Some(DurationUnit::Day),
            "week" | "weeks" => Some(DurationUnit::Week),
            "month" | "months" => Some(DurationUnit::Month),
            "year" | "years" => Some(DurationUnit::Year),
            _ => None,
        }
    }
}

impl Plan {
    /// End of a membership term starting at `start`. Months and years follow
    /// the calendar, clamping to the last day of shorter months.
    pub fn end_date_from(&self, start: DateTime<Utc>) -> Option<DateTime<Utc>> {
        let n = self.duration_value;
        match self.duration_unit {
            DurationUnit::Day => start.checked_add_signed(Duration::days(n as i64)),
            DurationUnit::Week => start.checked_add_signed(Duration::weeks(n as i64)),
            DurationUnit::Month => start.checked_add_months(Months::new(n)),
            DurationUnit::Year => start.checked_add_months(Months::new(n.checked_mul(12)?)),
        }
    }

    /// Human-readable term, e.g. "1 month" or "3 weeks".
    pub fn duration_label(&self) -> String {
        let unit = self.duration_unit.as_str();
        if self.duration_value == 1 {
            format!("1 {}", unit)
        } else {
            format!("{} {}s", self.duration_value, unit)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn plan(value: u32, unit: DurationUnit) -> Plan {
        Plan {
            id: Uuid::new_v4(),
            gym_id: Uuid::new_v4(),
            name: "Test".to_string(),
            price: 1500,
            currency: "INR".to_string(),
            duration_value: value,
            duration_unit: unit,
            is_active: true,
            created_at: Utc::now(),
            updated_at: Utc::now(),
        }
    }

    #[test]
    fn test_end_date_units() {
        let start = Utc.with_ymd_and_hms(2024, 1, 15, 10, 0, 0).unwrap();

        assert_eq!(
            plan(10, DurationUnit::Day).end_date_from(start),
            Some(Utc.with_ymd_and_hms(2024, 1, 25, 10, 0, 0).unwrap())
        );
        assert_eq!(
            plan(2, DurationUnit::Week).end_date_from(start),
            Some(Utc.with_ymd_and_hms(2024, 1, 29, 10, 0, 0).unwrap())
        );
        assert_eq!(
            plan(1, DurationUnit::Month).end_date_from(start),
            Some(Utc.with_ymd_and_hms(2024, 2, 15, 10, 0, 0).unwrap())
        );
        assert_eq!(
            plan(1, DurationUnit::Year).end_date_from(start),
            Some(Utc.with_ymd_and_hms(2025, 1, 15, 10, 0, 0).unwrap())
        );
    }

    #[test]
    fn test_month_end_clamps() {
        let start = Utc.with_ymd_and_hms(2024, 1, 31, 0, 0, 0).unwrap();
        assert_eq!(
            plan(1, DurationUnit::Month).end_date_from(start),
            Some(Utc.with_ymd_and_hms(2024, 2, 29, 0, 0, 0).unwrap())
        );
    }

    #[test]
    fn test_duration_label() {
        assert_eq!(plan(1, DurationUnit::Month).duration_label(), "1 month");
        assert_eq!(plan(3, DurationUnit::Week).duration_label(), "3 weeks");
    }

    #[test]
    fn test_duration_unit_parsing() {
        assert_eq!(DurationUnit::from_str("Months"), Some(DurationUnit::Month));
        assert_eq!(DurationUnit::from_str("year"), Some(DurationUnit::Year));
        assert_eq!(DurationUnit::from_str("fortnight"), None);
    }
}
