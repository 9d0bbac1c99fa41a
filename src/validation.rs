//! Parsing of untrusted JSON payloads into typed inputs.
//!
//! Every entry point walks the whole payload and reports all violated
//! constraints at once, each with the field path, the rule and the value
//! that was received.

use std::collections::HashSet;
use std::fmt;

use chrono::NaiveDate;
use serde::Serialize;
use serde_json::{Map, Value};

use crate::models::{CoasterPatch, CreateCoaster, MarkRidden, NewCoaster, NewPark};

/// Constraint that a field failed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Rule {
    Required,
    Type,
    Empty,
    Pattern,
    Date,
    Range,
    DateOrder,
    NotUpdatable,
    Duplicate,
}

/// A single failed field constraint.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FieldViolation {
    pub field: String,
    pub rule: Rule,
    pub message: String,
    pub received: Value,
}

/// Every constraint a payload failed, in the order they were found.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(transparent)]
pub struct ValidationErrors(Vec<FieldViolation>);

impl ValidationErrors {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn single(
        field: impl Into<String>,
        rule: Rule,
        message: impl Into<String>,
        received: Value,
    ) -> Self {
        let mut errors = Self::new();
        errors.push(field, rule, message, received);
        errors
    }

    pub fn push(
        &mut self,
        field: impl Into<String>,
        rule: Rule,
        message: impl Into<String>,
        received: Value,
    ) {
        self.0.push(FieldViolation {
            field: field.into(),
            rule,
            message: message.into(),
            received,
        });
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn violations(&self) -> &[FieldViolation] {
        &self.0
    }

    /// True if some violation was reported for `field`.
    pub fn has(&self, field: &str) -> bool {
        self.0.iter().any(|v| v.field == field)
    }
}

impl fmt::Display for ValidationErrors {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let fields: Vec<&str> = self.0.iter().map(|v| v.field.as_str()).collect();
        write!(f, "{} invalid field(s): {}", self.0.len(), fields.join(", "))
    }
}

impl std::error::Error for ValidationErrors {}

type Check<T> = Result<T, (Rule, String)>;

/// Validator for catalog payloads.
pub struct Validator;

impl Validator {
    /// Validate a create-park payload, including its optional initial coasters.
    pub fn create_park(value: &Value) -> Result<NewPark, ValidationErrors> {
        let mut errors = ValidationErrors::new();
        let Some(object) = root_object(value, &mut errors) else {
            return Err(errors);
        };

        let (id, name, country, coasters) = {
            let mut fields = Fields::new(object, String::new(), &mut errors);
            let id = fields.required("id", park_id);
            let name = fields.required("name", non_empty_string);
            let country = fields.required("country", non_empty_string);
            let coasters = fields.coaster_list("coasters");
            (id, name, country, coasters)
        };

        match (id, name, country) {
            (Some(id), Some(name), Some(country)) if errors.is_empty() => Ok(NewPark {
                id,
                name,
                country,
                coasters: coasters.unwrap_or_default(),
            }),
            _ => Err(errors),
        }
    }

    /// Validate a standalone create-coaster payload.
    pub fn create_coaster(value: &Value) -> Result<CreateCoaster, ValidationErrors> {
        let mut errors = ValidationErrors::new();
        let Some(object) = root_object(value, &mut errors) else {
            return Err(errors);
        };

        let (park_id, coaster) = {
            let mut fields = Fields::new(object, String::new(), &mut errors);
            let park_id = fields.required("parkId", park_id);
            let coaster = fields.new_coaster();
            (park_id, coaster)
        };

        match (park_id, coaster) {
            (Some(park_id), Some(coaster)) if errors.is_empty() => {
                Ok(CreateCoaster { park_id, coaster })
            }
            _ => Err(errors),
        }
    }

    /// Validate a partial coaster update. `parkId` and `id` are refused.
    pub fn update_coaster(value: &Value) -> Result<CoasterPatch, ValidationErrors> {
        let mut errors = ValidationErrors::new();
        let Some(object) = root_object(value, &mut errors) else {
            return Err(errors);
        };

        let patch = {
            let mut fields = Fields::new(object, String::new(), &mut errors);
            fields.forbidden("parkId");
            fields.forbidden("id");

            let patch = CoasterPatch {
                name: fields.optional("name", non_empty_string),
                ridden: fields.optional("ridden", boolean),
                ridden_date: fields.nullable("riddenDate", date),
                opened: fields.optional("opened", date),
                closed: fields.nullable("closed", date),
                latitude: fields.optional("latitude", latitude),
                longitude: fields.optional("longitude", longitude),
                rcdb: fields.optional("rcdb", non_empty_string),
            };
            if let (Some(opened), Some(Some(closed))) = (patch.opened, patch.closed) {
                fields.check_order(opened, closed);
            }
            patch
        };

        if errors.is_empty() {
            Ok(patch)
        } else {
            Err(errors)
        }
    }

    /// Validate a bulk mark-ridden payload. Duplicate ids are collapsed.
    pub fn mark_ridden(value: &Value) -> Result<MarkRidden, ValidationErrors> {
        let mut errors = ValidationErrors::new();
        let Some(object) = root_object(value, &mut errors) else {
            return Err(errors);
        };

        let (coasters, include_date) = {
            let mut fields = Fields::new(object, String::new(), &mut errors);
            let coasters = fields.id_list("coasters");
            let include_date = fields.optional("includeDate", boolean);
            (coasters, include_date)
        };

        match coasters {
            Some(coasters) if errors.is_empty() => {
                let mut seen = HashSet::new();
                let coasters = coasters.into_iter().filter(|id| seen.insert(*id)).collect();
                Ok(MarkRidden {
                    coasters,
                    include_date: include_date.unwrap_or(false),
                })
            }
            _ => Err(errors),
        }
    }
}

/// Largest coaster id a client may choose. Ids above it are left for the
/// store to assign, so `max(id) + 1` always fits in an `i64`.
pub const MAX_COASTER_ID: i64 = (1 << 53) - 1;

/// Park ids are lowercase ASCII letters, digits and hyphens.
pub fn is_park_id(raw: &str) -> bool {
    !raw.is_empty()
        && raw
            .bytes()
            .all(|b| b.is_ascii_lowercase() || b.is_ascii_digit() || b == b'-')
}

/// Parse a coaster id taken from a URL path segment.
pub fn parse_coaster_id(raw: &str) -> Option<i64> {
    raw.parse().ok()
}

/// Parse a strict `YYYY-MM-DD` calendar date.
pub fn parse_date(raw: &str) -> Option<NaiveDate> {
    let bytes = raw.as_bytes();
    let shaped = bytes.len() == 10
        && bytes.iter().enumerate().all(|(i, b)| match i {
            4 | 7 => *b == b'-',
            _ => b.is_ascii_digit(),
        });
    if !shaped {
        return None;
    }
    NaiveDate::parse_from_str(raw, "%Y-%m-%d").ok()
}

fn root_object<'v>(
    value: &'v Value,
    errors: &mut ValidationErrors,
) -> Option<&'v Map<String, Value>> {
    let object = value.as_object();
    if object.is_none() {
        errors.push("body", Rule::Type, "expected a JSON object", value.clone());
    }
    object
}

/// Field accessor over one JSON object that records violations as it goes.
struct Fields<'v, 'e> {
    object: &'v Map<String, Value>,
    prefix: String,
    errors: &'e mut ValidationErrors,
}

impl<'v, 'e> Fields<'v, 'e> {
    fn new(
        object: &'v Map<String, Value>,
        prefix: String,
        errors: &'e mut ValidationErrors,
    ) -> Self {
        Self {
            object,
            prefix,
            errors,
        }
    }

    fn path(&self, name: &str) -> String {
        if self.prefix.is_empty() {
            name.to_string()
        } else {
            format!("{}.{}", self.prefix, name)
        }
    }

    fn report(&mut self, name: &str, rule: Rule, message: String, received: &Value) {
        let field = self.path(name);
        self.errors.push(field, rule, message, received.clone());
    }

    fn checked<T>(
        &mut self,
        name: &str,
        value: &Value,
        check: impl Fn(&Value) -> Check<T>,
    ) -> Option<T> {
        match check(value) {
            Ok(parsed) => Some(parsed),
            Err((rule, message)) => {
                self.report(name, rule, message, value);
                None
            }
        }
    }

    /// Field must be present and non-null.
    fn required<T>(&mut self, name: &str, check: impl Fn(&Value) -> Check<T>) -> Option<T> {
        match self.object.get(name) {
            None | Some(Value::Null) => {
                let received = self.object.get(name).cloned().unwrap_or(Value::Null);
                self.report(name, Rule::Required, format!("{name} is required"), &received);
                None
            }
            Some(value) => self.checked(name, value, check),
        }
    }

    /// Field may be absent, but not null.
    fn optional<T>(&mut self, name: &str, check: impl Fn(&Value) -> Check<T>) -> Option<T> {
        match self.object.get(name) {
            None => None,
            Some(Value::Null) => {
                self.report(name, Rule::Type, format!("{name} cannot be null"), &Value::Null);
                None
            }
            Some(value) => self.checked(name, value, check),
        }
    }

    /// Field may be absent (outer `None`) or null (`Some(None)`).
    fn nullable<T>(
        &mut self,
        name: &str,
        check: impl Fn(&Value) -> Check<T>,
    ) -> Option<Option<T>> {
        match self.object.get(name) {
            None => None,
            Some(Value::Null) => Some(None),
            Some(value) => self.checked(name, value, check).map(Some),
        }
    }

    fn forbidden(&mut self, name: &str) {
        if let Some(value) = self.object.get(name) {
            self.report(
                name,
                Rule::NotUpdatable,
                format!("{name} cannot be changed"),
                value,
            );
        }
    }

    fn check_order(&mut self, opened: NaiveDate, closed: NaiveDate) {
        if closed < opened {
            let received = Value::from(closed.to_string());
            self.report(
                "closed",
                Rule::DateOrder,
                format!("closed must not be before opened ({opened})"),
                &received,
            );
        }
    }

    /// Read the coaster fields shared by standalone and park-embedded creation.
    fn new_coaster(&mut self) -> Option<NewCoaster> {
        let id = self.optional("id", coaster_id);
        let name = self.required("name", non_empty_string);
        let ridden = self.optional("ridden", boolean);
        let ridden_date = self.nullable("riddenDate", date).flatten();
        let opened = self.required("opened", date);
        let closed = self.nullable("closed", date).flatten();
        let latitude = self.required("latitude", latitude);
        let longitude = self.required("longitude", longitude);
        let rcdb = self.required("rcdb", non_empty_string);

        if let (Some(opened), Some(closed)) = (opened, closed) {
            self.check_order(opened, closed);
        }

        Some(NewCoaster {
            id,
            name: name?,
            ridden: ridden.unwrap_or(false),
            ridden_date,
            opened: opened?,
            closed,
            latitude: latitude?,
            longitude: longitude?,
            rcdb: rcdb?,
        })
    }

    /// Optional array of coaster payloads; `parkId` is implied by the parent.
    fn coaster_list(&mut self, name: &str) -> Option<Vec<NewCoaster>> {
        let value = self.object.get(name)?;
        let Some(items) = value.as_array() else {
            self.report(name, Rule::Type, format!("{name} must be an array"), value);
            return None;
        };

        let mut coasters = Vec::with_capacity(items.len());
        let mut seen = HashSet::new();
        for (i, item) in items.iter().enumerate() {
            let entry = format!("{name}[{i}]");
            let Some(object) = item.as_object() else {
                self.report(&entry, Rule::Type, "expected a JSON object".to_string(), item);
                continue;
            };
            let prefix = self.path(&entry);
            let mut nested = Fields::new(object, prefix, &mut *self.errors);
            nested.forbidden("parkId");
            let Some(coaster) = nested.new_coaster() else {
                continue;
            };
            if let Some(id) = coaster.id {
                if !seen.insert(id) {
                    self.report(
                        &format!("{entry}.id"),
                        Rule::Duplicate,
                        format!("coaster id {id} appears more than once"),
                        &Value::from(id),
                    );
                }
            }
            coasters.push(coaster);
        }
        Some(coasters)
    }

    /// Required non-empty array of coaster ids.
    fn id_list(&mut self, name: &str) -> Option<Vec<i64>> {
        let value = self.required(name, |v| {
            v.as_array()
                .cloned()
                .ok_or_else(|| (Rule::Type, "expected an array of coaster ids".to_string()))
        })?;
        if value.is_empty() {
            self.report(
                name,
                Rule::Empty,
                format!("{name} must list at least one coaster id"),
                &Value::Array(Vec::new()),
            );
            return None;
        }

        let mut ids = Vec::with_capacity(value.len());
        for (i, item) in value.iter().enumerate() {
            if let Some(id) = self.checked(&format!("{name}[{i}]"), item, coaster_id) {
                ids.push(id);
            }
        }
        (ids.len() == value.len()).then_some(ids)
    }
}

fn non_empty_string(value: &Value) -> Check<String> {
    let Some(s) = value.as_str() else {
        return Err((Rule::Type, "expected a string".to_string()));
    };
    if s.trim().is_empty() {
        return Err((Rule::Empty, "must not be empty".to_string()));
    }
    Ok(s.to_string())
}

fn park_id(value: &Value) -> Check<String> {
    let Some(s) = value.as_str() else {
        return Err((Rule::Type, "expected a string".to_string()));
    };
    if !is_park_id(s) {
        return Err((
            Rule::Pattern,
            "must match ^[a-z0-9-]+$ (lowercase letters, digits, hyphens)".to_string(),
        ));
    }
    Ok(s.to_string())
}

fn boolean(value: &Value) -> Check<bool> {
    value
        .as_bool()
        .ok_or_else(|| (Rule::Type, "expected a boolean".to_string()))
}

fn date(value: &Value) -> Check<NaiveDate> {
    let Some(s) = value.as_str() else {
        return Err((Rule::Type, "expected a date string".to_string()));
    };
    parse_date(s).ok_or_else(|| {
        (
            Rule::Date,
            format!("`{s}` is not a calendar date in YYYY-MM-DD form"),
        )
    })
}

fn coordinate(value: &Value, limit: f64) -> Check<f64> {
    let Some(n) = value.as_f64() else {
        return Err((Rule::Type, "expected a number".to_string()));
    };
    if !(-limit..=limit).contains(&n) {
        return Err((Rule::Range, format!("must be between -{limit} and {limit}")));
    }
    Ok(n)
}

fn latitude(value: &Value) -> Check<f64> {
    coordinate(value, 90.0)
}

fn longitude(value: &Value) -> Check<f64> {
    coordinate(value, 180.0)
}

fn coaster_id(value: &Value) -> Check<i64> {
    let in_range = match (value.as_i64(), value.as_f64()) {
        (Some(id), _) => (1..=MAX_COASTER_ID).contains(&id).then_some(id),
        (None, Some(n)) if n.fract() == 0.0 => {
            (n >= 1.0 && n <= MAX_COASTER_ID as f64).then_some(n as i64)
        }
        _ => return Err((Rule::Type, "expected an integer coaster id".to_string())),
    };
    in_range.ok_or_else(|| {
        (
            Rule::Range,
            format!("coaster ids must be between 1 and {MAX_COASTER_ID}"),
        )
    })
}
