use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

/// An amusement park and the coasters it owns.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, sqlx::FromRow)]
pub struct Park {
    pub id: String,
    pub name: String,
    pub country: String,
    /// Filled from the coasters table, in insertion order.
    #[sqlx(skip)]
    #[serde(default)]
    pub coasters: Vec<Coaster>,
}

/// A roller coaster row.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, sqlx::FromRow)]
#[serde(rename_all = "camelCase")]
pub struct Coaster {
    pub id: i64,
    pub park_id: String,
    pub name: String,
    pub ridden: bool,
    pub ridden_date: Option<NaiveDate>,
    pub opened: NaiveDate,
    pub closed: Option<NaiveDate>,
    pub latitude: f64,
    pub longitude: f64,
    pub rcdb: String,
}

/// Validated input for creating a park.
#[derive(Debug, Clone, PartialEq)]
pub struct NewPark {
    pub id: String,
    pub name: String,
    pub country: String,
    pub coasters: Vec<NewCoaster>,
}

/// Validated coaster fields shared by standalone creation and park creation.
#[derive(Debug, Clone, PartialEq)]
pub struct NewCoaster {
    /// Explicit id; the store assigns one when absent.
    pub id: Option<i64>,
    pub name: String,
    pub ridden: bool,
    pub ridden_date: Option<NaiveDate>,
    pub opened: NaiveDate,
    pub closed: Option<NaiveDate>,
    pub latitude: f64,
    pub longitude: f64,
    pub rcdb: String,
}

/// Validated input for creating a coaster in an existing park.
#[derive(Debug, Clone, PartialEq)]
pub struct CreateCoaster {
    pub park_id: String,
    pub coaster: NewCoaster,
}

/// Validated partial update of a coaster.
///
/// `None` leaves the column untouched. For nullable columns the inner
/// `Option` distinguishes "set to null" from "set to a date".
#[derive(Debug, Clone, Default, PartialEq)]
pub struct CoasterPatch {
    pub name: Option<String>,
    pub ridden: Option<bool>,
    pub ridden_date: Option<Option<NaiveDate>>,
    pub opened: Option<NaiveDate>,
    pub closed: Option<Option<NaiveDate>>,
    pub latitude: Option<f64>,
    pub longitude: Option<f64>,
    pub rcdb: Option<String>,
}

impl CoasterPatch {
    /// True when the patch would not change any column.
    pub fn is_empty(&self) -> bool {
        *self == Self::default()
    }

    /// Apply the supplied fields to a copy of `coaster`.
    pub fn apply_to(&self, coaster: &Coaster) -> Coaster {
        let mut merged = coaster.clone();
        if let Some(name) = &self.name {
            merged.name = name.clone();
        }
        if let Some(ridden) = self.ridden {
            merged.ridden = ridden;
        }
        if let Some(ridden_date) = self.ridden_date {
            merged.ridden_date = ridden_date;
        }
        if let Some(opened) = self.opened {
            merged.opened = opened;
        }
        if let Some(closed) = self.closed {
            merged.closed = closed;
        }
        if let Some(latitude) = self.latitude {
            merged.latitude = latitude;
        }
        if let Some(longitude) = self.longitude {
            merged.longitude = longitude;
        }
        if let Some(rcdb) = &self.rcdb {
            merged.rcdb = rcdb.clone();
        }
        merged
    }
}

/// Validated input for the bulk mark-ridden operation.
#[derive(Debug, Clone, PartialEq)]
pub struct MarkRidden {
    /// Target ids, deduplicated, in first-seen order.
    pub coasters: Vec<i64>,
    pub include_date: bool,
}

/// Response for the bulk mark-ridden operation.
#[derive(Debug, Serialize)]
pub struct MarkRiddenResponse {
    pub count: u64,
    pub coasters: Vec<Coaster>,
}

#[derive(Debug, Serialize)]
pub struct HealthResponse {
    pub status: &'static str,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn coaster() -> Coaster {
        Coaster {
            id: 1,
            park_id: "europa-park".to_string(),
            name: "Silver Star".to_string(),
            ridden: false,
            ridden_date: None,
            opened: NaiveDate::from_ymd_opt(2002, 3, 23).unwrap(),
            closed: None,
            latitude: 48.26,
            longitude: 7.72,
            rcdb: "https://rcdb.com/2832.htm".to_string(),
        }
    }

    #[test]
    fn test_empty_patch_is_noop() {
        let patch = CoasterPatch::default();
        assert!(patch.is_empty());
        assert_eq!(patch.apply_to(&coaster()), coaster());
    }

    #[test]
    fn test_patch_touches_only_given_fields() {
        let patch = CoasterPatch {
            name: Some("Blue Fire".to_string()),
            ..Default::default()
        };
        let merged = patch.apply_to(&coaster());

        assert_eq!(merged.name, "Blue Fire");
        assert_eq!(merged.opened, coaster().opened);
        assert_eq!(merged.latitude, coaster().latitude);
        assert_eq!(merged.rcdb, coaster().rcdb);
    }

    #[test]
    fn test_patch_clears_nullable_date() {
        let mut ridden = coaster();
        ridden.ridden_date = NaiveDate::from_ymd_opt(2024, 7, 1);

        let patch = CoasterPatch {
            ridden_date: Some(None),
            ..Default::default()
        };
        assert!(!patch.is_empty());
        assert_eq!(patch.apply_to(&ridden).ridden_date, None);
    }

    #[test]
    fn test_coaster_serializes_camel_case() {
        let json = serde_json::to_value(coaster()).unwrap();
        assert_eq!(json["parkId"], "europa-park");
        assert_eq!(json["opened"], "2002-03-23");
        assert!(json["riddenDate"].is_null());
    }
}
