//! Feature encoder: raw context -> ordered numeric vector.
//!
//! `FeatureRow` holds every computed feature by name and is built the same
//! way for historical events (training) and live requests (inference).
//! `FeatureVector` is that row laid out in schema order.

use chrono::{Datelike, Local, NaiveDateTime, Timelike};
use std::f64::consts::PI;

use crate::schema::{FeatureSchema, WEATHER_PREFIX};
use crate::types::{PredictionInput, TrainingEvent};

/// (sin, cos) of `value` on a cycle of length `period`.
pub fn cyclical(value: f64, period: f64) -> (f64, f64) {
    let angle = 2.0 * PI * value / period;
    (angle.sin(), angle.cos())
}

/// Monday = 0 .. Sunday = 6.
pub fn day_of_week(ts: &NaiveDateTime) -> u32 {
    ts.weekday().num_days_from_monday()
}

pub fn now() -> NaiveDateTime {
    Local::now().naive_local()
}

#[derive(Debug, Clone, PartialEq)]
pub struct FeatureRow {
    pub lot_id: u32,
    pub hour_of_day: u32,
    pub day_of_week: u32,
    pub is_weekend: bool,
    pub is_exam_week: bool,
    pub temperature: f64,
    pub capacity: u32,
    pub prev_hour_occupancy: f64,
    pub prev_2hour_occupancy: f64,
    pub rolling_avg_occupancy: f64,
    /// One-hot category; `None` sets every weather indicator to 0.
    pub weather: Option<String>,
}

impl FeatureRow {
    /// Row for a live request at an already resolved timestamp.
    pub fn from_input(input: &PredictionInput, ts: NaiveDateTime) -> Self {
        let day = day_of_week(&ts);
        let ctx = input.recent_occupancy;
        Self {
            lot_id: input.lot_id,
            hour_of_day: ts.hour(),
            day_of_week: day,
            is_weekend: day >= 5,
            is_exam_week: input.is_exam_week,
            temperature: input.temperature,
            capacity: input.capacity,
            prev_hour_occupancy: ctx.prev_hour,
            prev_2hour_occupancy: ctx.prev_2hour,
            rolling_avg_occupancy: ctx.rolling_avg,
            weather: input.weather.known_label().map(str::to_string),
        }
    }

    /// Row for a logged event; calendar fields come from the log itself.
    pub fn from_event(event: &TrainingEvent, prev_hour: f64, prev_2hour: f64, rolling_avg: f64) -> Self {
        Self {
            lot_id: event.lot_id,
            hour_of_day: event.hour_of_day,
            day_of_week: event.day_of_week,
            is_weekend: event.is_weekend,
            is_exam_week: event.is_exam_week,
            temperature: event.temperature,
            capacity: event.capacity,
            prev_hour_occupancy: prev_hour,
            prev_2hour_occupancy: prev_2hour,
            rolling_avg_occupancy: rolling_avg,
            weather: Some(event.weather.trim())
                .filter(|w| !w.is_empty())
                .map(str::to_string),
        }
    }

    fn cycles(&self) -> Cycles {
        Cycles {
            hour: cyclical(self.hour_of_day as f64, 24.0),
            day: cyclical(self.day_of_week as f64, 7.0),
        }
    }

    /// Value of a named column; `None` if the encoder has no such column.
    pub fn value(&self, column: &str) -> Option<f64> {
        self.lookup(column, &self.cycles())
    }

    fn lookup(&self, column: &str, cycles: &Cycles) -> Option<f64> {
        let Cycles {
            hour: (hour_sin, hour_cos),
            day: (day_sin, day_cos),
        } = *cycles;
        let v = match column {
            "lot_id" => self.lot_id as f64,
            "hour_of_day" => self.hour_of_day as f64,
            "day_of_week" => self.day_of_week as f64,
            "is_weekend" => flag(self.is_weekend),
            "is_exam_week" => flag(self.is_exam_week),
            "temperature" => self.temperature,
            "capacity" => self.capacity as f64,
            "hour_sin" => hour_sin,
            "hour_cos" => hour_cos,
            "day_sin" => day_sin,
            "day_cos" => day_cos,
            "prev_hour_occupancy" => self.prev_hour_occupancy,
            "prev_2hour_occupancy" => self.prev_2hour_occupancy,
            "rolling_avg_occupancy" => self.rolling_avg_occupancy,
            other => {
                let cat = other.strip_prefix(WEATHER_PREFIX)?;
                flag(self.weather.as_deref() == Some(cat))
            }
        };
        Some(v)
    }

    /// Lay the row out in schema order; columns without a value are 0.
    pub fn encode<'s>(&self, schema: &'s FeatureSchema) -> FeatureVector<'s> {
        let cycles = self.cycles();
        let values = schema
            .columns()
            .iter()
            .map(|c| self.lookup(c, &cycles).unwrap_or(0.0))
            .collect();
        FeatureVector { schema, values }
    }
}

/// (sin, cos) pairs for hour of day and day of week.
#[derive(Debug, Clone, Copy)]
struct Cycles {
    hour: (f64, f64),
    day: (f64, f64),
}

fn flag(b: bool) -> f64 {
    if b {
        1.0
    } else {
        0.0
    }
}

/// Encode a request. A missing timestamp resolves to now.
pub fn encode<'s>(schema: &'s FeatureSchema, input: &PredictionInput) -> FeatureVector<'s> {
    let ts = input.timestamp.unwrap_or_else(now);
    FeatureRow::from_input(input, ts).encode(schema)
}

/// Values in schema order, with the schema kept alongside for lookups.
#[derive(Debug, Clone, PartialEq)]
pub struct FeatureVector<'s> {
    schema: &'s FeatureSchema,
    values: Vec<f64>,
}

impl<'s> FeatureVector<'s> {
    pub fn get(&self, column: &str) -> Option<f64> {
        self.schema.position(column).map(|i| self.values[i])
    }

    pub fn values(&self) -> &[f64] {
        &self.values
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, f64)> + '_ {
        self.schema
            .columns()
            .iter()
            .map(String::as_str)
            .zip(self.values.iter().copied())
    }

    pub fn into_values(self) -> Vec<f64> {
        self.values
    }

    /// One-line digest for debugging encoder output.
    pub fn summary(&self) -> String {
        let v = &self.values;
        let nz = v.iter().filter(|x| **x != 0.0).count();
        let mean = if v.is_empty() { 0.0 } else { v.iter().sum::<f64>() / v.len() as f64 };
        let std = if v.len() < 2 {
            0.0
        } else {
            (v.iter().map(|x| (x - mean) * (x - mean)).sum::<f64>() / v.len() as f64).sqrt()
        };
        let sample: Vec<String> = self
            .iter()
            .take(6)
            .map(|(name, x)| format!("{}={:.3}", name, x))
            .collect();
        format!(
            "in_dim={} nonzero={} mean={:.3} std={:.3} sample=[{}]",
            v.len(),
            nz,
            mean,
            std,
            sample.join(", ")
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{parse_timestamp, OccupancyContext, Weather};
    use approx::assert_abs_diff_eq;

    fn monday_0930() -> NaiveDateTime {
        parse_timestamp("2024-03-11T09:30:00").unwrap()
    }

    #[test]
    fn test_cyclical_endpoints() {
        let (s, c) = cyclical(0.0, 24.0);
        assert_eq!(s, 0.0);
        assert_eq!(c, 1.0);

        let (s, c) = cyclical(12.0, 24.0);
        assert_abs_diff_eq!(s, PI.sin(), epsilon = 1e-12);
        assert_abs_diff_eq!(c, PI.cos(), epsilon = 1e-12);
    }

    #[test]
    fn test_row_from_input() {
        let input = PredictionInput::new(1, 150)
            .with_weather(Weather::Rainy)
            .with_temperature(45.0);
        let row = FeatureRow::from_input(&input, monday_0930());

        assert_eq!(row.hour_of_day, 9);
        assert_eq!(row.day_of_week, 0);
        assert!(!row.is_weekend);
        assert_eq!(row.value("weather_rainy"), Some(1.0));
        assert_eq!(row.value("weather_sunny"), Some(0.0));
        assert_eq!(row.value("temperature"), Some(45.0));
        assert_eq!(row.value("wind_speed"), None);
    }

    #[test]
    fn test_weekend_flag() {
        // 2024-03-16 is a Saturday.
        for (offset, expected) in [(0, false), (4, false), (5, true), (6, true)] {
            let ts = parse_timestamp("2024-03-11T12:00:00").unwrap() + chrono::Duration::days(offset);
            let row = FeatureRow::from_input(&PredictionInput::new(1, 10), ts);
            assert_eq!(row.day_of_week, offset as u32);
            assert_eq!(row.is_weekend, expected, "day {offset}");
        }
    }

    #[test]
    fn test_unknown_weather_zeroes_all_indicators() {
        let schema = FeatureSchema::canonical();
        let input = PredictionInput::new(1, 150)
            .at(monday_0930())
            .with_weather(Weather::parse("hail"));
        let v = encode(&schema, &input);
        for col in ["weather_sunny", "weather_rainy", "weather_cloudy"] {
            assert_eq!(v.get(col), Some(0.0), "{col}");
        }
    }

    #[test]
    fn test_missing_history_is_neutral() {
        let schema = FeatureSchema::canonical();
        let v = encode(&schema, &PredictionInput::new(4, 50).at(monday_0930()));
        for col in ["prev_hour_occupancy", "prev_2hour_occupancy", "rolling_avg_occupancy"] {
            assert_eq!(v.get(col), Some(0.5));
        }
    }

    #[test]
    fn test_history_values_are_independent() {
        let schema = FeatureSchema::canonical();
        let input = PredictionInput::new(4, 50)
            .at(monday_0930())
            .with_recent_occupancy(OccupancyContext::new(0.9, 0.7, 0.8));
        let v = encode(&schema, &input);
        assert_eq!(v.get("prev_hour_occupancy"), Some(0.9));
        assert_eq!(v.get("prev_2hour_occupancy"), Some(0.7));
        assert_eq!(v.get("rolling_avg_occupancy"), Some(0.8));
    }

    #[test]
    fn test_vector_follows_schema_order() {
        let schema = FeatureSchema::new(vec![
            "capacity".into(),
            "weather_snowy".into(),
            "lot_id".into(),
        ])
        .unwrap();
        let v = encode(&schema, &PredictionInput::new(7, 30).at(monday_0930()));
        assert_eq!(v.values(), &[30.0, 0.0, 7.0]);
        assert_eq!(v.len(), schema.len());
    }

    #[test]
    fn test_encoding_is_deterministic() {
        let schema = FeatureSchema::canonical();
        let input = PredictionInput::new(2, 200)
            .at(monday_0930())
            .with_weather(Weather::Cloudy)
            .with_exam_week(true);
        assert_eq!(encode(&schema, &input), encode(&schema, &input));
    }

    #[test]
    fn test_encoded_cycles_match_single_column_lookup() {
        let schema = FeatureSchema::canonical();
        let row = FeatureRow::from_input(&PredictionInput::new(3, 80), parse_timestamp("2024-03-16T21:00:00").unwrap());
        let v = row.encode(&schema);
        for (name, x) in v.iter() {
            assert_eq!(Some(x), row.value(name), "{name}");
        }
        let (day_sin, _) = cyclical(5.0, 7.0);
        assert_eq!(v.get("day_sin"), Some(day_sin));
    }

    #[test]
    fn test_summary_mentions_width() {
        let schema = FeatureSchema::canonical();
        let v = encode(&schema, &PredictionInput::new(1, 150).at(monday_0930()));
        let s = v.summary();
        assert!(s.starts_with("in_dim=17"));
        assert!(s.contains("lot_id=1.000"));
    }
}
