use chrono::{DateTime, NaiveDateTime};
use serde::{Deserialize, Deserializer, Serialize};

use crate::error::{PredictError, Result};

/// Neutral prior for occupancy history the caller could not supply.
pub const NEUTRAL_OCCUPANCY: f64 = 0.5;
pub const DEFAULT_TEMPERATURE_F: f64 = 70.0;

// ---------- Weather ----------

/// Weather category. Anything outside the closed set lands in `Other` and
/// encodes with every weather indicator at 0.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum Weather {
    #[default]
    Sunny,
    Rainy,
    Cloudy,
    Other(String),
}

impl Weather {
    pub const KNOWN: [Weather; 3] = [Weather::Sunny, Weather::Rainy, Weather::Cloudy];

    pub fn parse(raw: &str) -> Self {
        match raw.trim().to_ascii_lowercase().as_str() {
            "sunny" => Weather::Sunny,
            "rainy" => Weather::Rainy,
            "cloudy" => Weather::Cloudy,
            _ => Weather::Other(raw.trim().to_string()),
        }
    }

    /// Category label as it appears in the event log.
    pub fn label(&self) -> &str {
        match self {
            Weather::Sunny => "sunny",
            Weather::Rainy => "rainy",
            Weather::Cloudy => "cloudy",
            Weather::Other(s) => s,
        }
    }

    /// Label for one-hot purposes; `None` for the implicit "other" bucket.
    pub fn known_label(&self) -> Option<&'static str> {
        match self {
            Weather::Sunny => Some("sunny"),
            Weather::Rainy => Some("rainy"),
            Weather::Cloudy => Some("cloudy"),
            Weather::Other(_) => None,
        }
    }
}

impl From<String> for Weather {
    fn from(s: String) -> Self {
        Weather::parse(&s)
    }
}

impl From<Weather> for String {
    fn from(w: Weather) -> Self {
        w.label().to_string()
    }
}

// ---------- Recent occupancy ----------

/// Recent occupancy observations seeding the lag and rolling features.
/// Each value falls back to the neutral prior independently.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct OccupancyContext {
    #[serde(default = "neutral")]
    pub prev_hour: f64,
    #[serde(default = "neutral")]
    pub prev_2hour: f64,
    #[serde(default = "neutral")]
    pub rolling_avg: f64,
}

fn neutral() -> f64 {
    NEUTRAL_OCCUPANCY
}

impl Default for OccupancyContext {
    fn default() -> Self {
        Self::uniform(NEUTRAL_OCCUPANCY)
    }
}

impl OccupancyContext {
    pub fn new(prev_hour: f64, prev_2hour: f64, rolling_avg: f64) -> Self {
        Self {
            prev_hour,
            prev_2hour,
            rolling_avg,
        }
    }

    /// Single recent observation used for all three inputs.
    pub fn uniform(occupancy: f64) -> Self {
        Self::new(occupancy, occupancy, occupancy)
    }

    fn check(&self) -> Result<()> {
        for (name, v) in [
            ("prev_hour", self.prev_hour),
            ("prev_2hour", self.prev_2hour),
            ("rolling_avg", self.rolling_avg),
        ] {
            if !v.is_finite() || !(0.0..=1.0).contains(&v) {
                return Err(PredictError::InvalidInput(format!(
                    "recent occupancy {name}={v} outside [0, 1]"
                )));
            }
        }
        Ok(())
    }
}

// ---------- Request / input ----------

/// Loosely typed prediction request as handed in by a caller.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct PredictionRequest {
    pub lot_id: Option<i64>,
    pub timestamp: Option<String>,
    pub capacity: Option<i64>,
    pub weather: Option<Weather>,
    pub temperature: Option<f64>,
    pub is_exam_week: Option<bool>,
    pub recent_occupancy: Option<OccupancyContext>,
}

impl PredictionRequest {
    pub fn new(lot_id: i64, capacity: i64) -> Self {
        Self {
            lot_id: Some(lot_id),
            capacity: Some(capacity),
            ..Default::default()
        }
    }

    pub fn timestamp(mut self, ts: impl Into<String>) -> Self {
        self.timestamp = Some(ts.into());
        self
    }

    pub fn weather(mut self, weather: impl Into<String>) -> Self {
        self.weather = Some(Weather::parse(&weather.into()));
        self
    }

    pub fn temperature(mut self, temperature: f64) -> Self {
        self.temperature = Some(temperature);
        self
    }

    pub fn exam_week(mut self, is_exam_week: bool) -> Self {
        self.is_exam_week = Some(is_exam_week);
        self
    }

    pub fn recent_occupancy(mut self, ctx: OccupancyContext) -> Self {
        self.recent_occupancy = Some(ctx);
        self
    }

    /// Reject caller errors before anything reaches the encoder.
    pub fn validate(&self) -> Result<PredictionInput> {
        let lot_id = match self.lot_id {
            None => return Err(PredictError::InvalidInput("lot_id is required".into())),
            Some(id) => u32::try_from(id)
                .ok()
                .filter(|id| *id > 0)
                .ok_or_else(|| PredictError::InvalidInput(format!("lot_id must be positive, got {id}")))?,
        };
        let capacity = match self.capacity {
            None => return Err(PredictError::InvalidInput("capacity is required".into())),
            Some(c) => u32::try_from(c)
                .ok()
                .filter(|c| *c > 0)
                .ok_or_else(|| PredictError::InvalidInput(format!("capacity must be positive, got {c}")))?,
        };
        let timestamp = self.timestamp.as_deref().map(parse_timestamp).transpose()?;

        let input = PredictionInput {
            lot_id,
            timestamp,
            capacity,
            weather: self.weather.clone().unwrap_or_default(),
            temperature: self.temperature.unwrap_or(DEFAULT_TEMPERATURE_F),
            is_exam_week: self.is_exam_week.unwrap_or(false),
            recent_occupancy: self.recent_occupancy.unwrap_or_default(),
        };
        input.check()?;
        Ok(input)
    }
}

/// Validated, strongly typed prediction input.
#[derive(Debug, Clone, PartialEq)]
pub struct PredictionInput {
    pub lot_id: u32,
    /// `None` resolves to the local wall clock at prediction time.
    pub timestamp: Option<NaiveDateTime>,
    pub capacity: u32,
    pub weather: Weather,
    pub temperature: f64,
    pub is_exam_week: bool,
    pub recent_occupancy: OccupancyContext,
}

impl PredictionInput {
    pub fn new(lot_id: u32, capacity: u32) -> Self {
        Self {
            lot_id,
            timestamp: None,
            capacity,
            weather: Weather::default(),
            temperature: DEFAULT_TEMPERATURE_F,
            is_exam_week: false,
            recent_occupancy: OccupancyContext::default(),
        }
    }

    pub fn at(mut self, ts: NaiveDateTime) -> Self {
        self.timestamp = Some(ts);
        self
    }

    pub fn with_weather(mut self, weather: Weather) -> Self {
        self.weather = weather;
        self
    }

    pub fn with_temperature(mut self, temperature: f64) -> Self {
        self.temperature = temperature;
        self
    }

    pub fn with_exam_week(mut self, is_exam_week: bool) -> Self {
        self.is_exam_week = is_exam_week;
        self
    }

    pub fn with_recent_occupancy(mut self, ctx: OccupancyContext) -> Self {
        self.recent_occupancy = ctx;
        self
    }

    pub fn check(&self) -> Result<()> {
        if self.lot_id == 0 {
            return Err(PredictError::InvalidInput("lot_id must be positive, got 0".into()));
        }
        if self.capacity == 0 {
            return Err(PredictError::InvalidInput("capacity must be positive, got 0".into()));
        }
        if !self.temperature.is_finite() {
            return Err(PredictError::InvalidInput(format!(
                "temperature must be finite, got {}",
                self.temperature
            )));
        }
        self.recent_occupancy.check()
    }
}

// ---------- Output ----------

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PredictionRecord {
    pub lot_id: u32,
    /// The request time, normalised: ISO-8601 wall clock with any UTC offset
    /// dropped, or the resolved current time when none was given.
    pub timestamp: String,
    pub occupancy_rate: f64,
    pub availability: f64,
    pub search_time_minutes: f64,
    pub parking_available: bool,
    pub confidence: f64,
}

// ---------- Historical event log ----------

/// One row of the historical event log the training pipeline consumes.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct TrainingEvent {
    #[serde(deserialize_with = "de_timestamp")]
    pub timestamp: NaiveDateTime,
    pub lot_id: u32,
    pub hour_of_day: u32,
    pub day_of_week: u32,
    #[serde(deserialize_with = "de_flag")]
    pub is_weekend: bool,
    #[serde(deserialize_with = "de_flag")]
    pub is_exam_week: bool,
    pub weather: String,
    pub temperature: f64,
    pub capacity: u32,
    #[serde(default)]
    pub current_count: Option<u32>,
    pub occupancy_rate: f64,
    #[serde(default)]
    pub availability: Option<f64>,
    pub search_time_minutes: f64,
    #[serde(deserialize_with = "de_flag")]
    pub found_parking: bool,
}

// ---------- Parsing helpers ----------

/// Accepts ISO-8601 with `T` or space separator, optional fractional
/// seconds, optional UTC offset (kept as wall-clock time of that offset).
pub fn parse_timestamp(raw: &str) -> Result<NaiveDateTime> {
    let s = raw.trim();
    if let Ok(dt) = DateTime::parse_from_rfc3339(s) {
        return Ok(dt.naive_local());
    }
    for fmt in ["%Y-%m-%dT%H:%M:%S%.f", "%Y-%m-%d %H:%M:%S%.f", "%Y-%m-%dT%H:%M", "%Y-%m-%d %H:%M"] {
        if let Ok(dt) = NaiveDateTime::parse_from_str(s, fmt) {
            return Ok(dt);
        }
    }
    Err(PredictError::InvalidInput(format!("malformed timestamp {raw:?}")))
}

/// ISO-8601 without offset; fractional seconds only when non-zero.
pub fn format_timestamp(ts: &NaiveDateTime) -> String {
    ts.format("%Y-%m-%dT%H:%M:%S%.f").to_string()
}

fn de_timestamp<'de, D>(d: D) -> std::result::Result<NaiveDateTime, D::Error>
where
    D: Deserializer<'de>,
{
    let raw = String::deserialize(d)?;
    parse_timestamp(&raw).map_err(serde::de::Error::custom)
}

fn de_flag<'de, D>(d: D) -> std::result::Result<bool, D::Error>
where
    D: Deserializer<'de>,
{
    let raw = String::deserialize(d)?;
    match raw.trim() {
        "True" | "true" | "TRUE" | "1" => Ok(true),
        "False" | "false" | "FALSE" | "0" => Ok(false),
        other => Err(serde::de::Error::custom(format!("not a boolean: {other:?}"))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Datelike, Timelike};

    #[test]
    fn test_weather_parse_is_lenient() {
        assert_eq!(Weather::parse("rainy"), Weather::Rainy);
        assert_eq!(Weather::parse(" Cloudy "), Weather::Cloudy);
        assert_eq!(Weather::parse("snowy"), Weather::Other("snowy".into()));
        assert_eq!(Weather::parse("snowy").known_label(), None);
    }

    #[test]
    fn test_request_defaults() {
        let input = PredictionRequest::new(3, 100).validate().unwrap();
        assert_eq!(input.weather, Weather::Sunny);
        assert_eq!(input.temperature, 70.0);
        assert!(!input.is_exam_week);
        assert_eq!(input.recent_occupancy, OccupancyContext::uniform(0.5));
        assert!(input.timestamp.is_none());
    }

    #[test]
    fn test_request_rejects_missing_fields() {
        let missing_lot = PredictionRequest {
            capacity: Some(100),
            ..Default::default()
        };
        assert!(matches!(missing_lot.validate(), Err(PredictError::InvalidInput(_))));

        let missing_capacity = PredictionRequest {
            lot_id: Some(1),
            ..Default::default()
        };
        assert!(matches!(missing_capacity.validate(), Err(PredictError::InvalidInput(_))));

        assert!(PredictionRequest::new(-1, 100).validate().is_err());
        assert!(PredictionRequest::new(1, 0).validate().is_err());
    }

    #[test]
    fn test_request_rejects_malformed_timestamp() {
        let req = PredictionRequest::new(1, 150).timestamp("yesterday-ish");
        let err = req.validate().unwrap_err();
        assert_eq!(err.kind(), "invalid_input");
    }

    #[test]
    fn test_request_rejects_out_of_range_history() {
        let req = PredictionRequest::new(1, 150).recent_occupancy(OccupancyContext::new(1.4, 0.5, 0.5));
        assert!(matches!(req.validate(), Err(PredictError::InvalidInput(_))));
    }

    #[test]
    fn test_partial_occupancy_context_json() {
        let ctx: OccupancyContext = serde_json::from_str(r#"{"prev_hour": 0.9}"#).unwrap();
        assert_eq!(ctx.prev_hour, 0.9);
        assert_eq!(ctx.prev_2hour, 0.5);
        assert_eq!(ctx.rolling_avg, 0.5);
    }

    #[test]
    fn test_parse_timestamp_forms() {
        let a = parse_timestamp("2024-03-11T09:30:00").unwrap();
        assert_eq!((a.hour(), a.minute()), (9, 30));
        assert_eq!(a.weekday().num_days_from_monday(), 0);

        let b = parse_timestamp("2024-03-11 09:30:00.482913").unwrap();
        assert_eq!(b.hour(), 9);

        let c = parse_timestamp("2024-03-11T09:30:00+02:00").unwrap();
        assert_eq!(c.hour(), 9);
    }

    #[test]
    fn test_format_timestamp_is_isoformat() {
        let ts = parse_timestamp("2024-03-11T09:30:00").unwrap();
        assert_eq!(format_timestamp(&ts), "2024-03-11T09:30:00");
    }

    #[test]
    fn test_weather_json_roundtrip_as_string() {
        let req: PredictionRequest =
            serde_json::from_str(r#"{"lot_id": 2, "capacity": 200, "weather": "foggy"}"#).unwrap();
        assert_eq!(req.weather, Some(Weather::Other("foggy".into())));
        assert_eq!(serde_json::to_string(&Weather::Rainy).unwrap(), "\"rainy\"");
    }
}
