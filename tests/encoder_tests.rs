//! Feature encoder properties against the persisted schema contract.

use parking_predictor::features::cyclical;
use parking_predictor::types::parse_timestamp;
use parking_predictor::{encode, FeatureSchema, OccupancyContext, PredictionInput, Weather};
use std::f64::consts::PI;

fn at(ts: &str) -> PredictionInput {
    PredictionInput::new(1, 150).at(parse_timestamp(ts).unwrap())
}

#[test]
fn test_vector_width_matches_schema() {
    let schema = FeatureSchema::canonical();
    let v = encode(&schema, &at("2024-03-11T09:30:00"));
    assert_eq!(v.len(), schema.len());
    let names: Vec<&str> = v.iter().map(|(n, _)| n).collect();
    let expected: Vec<&str> = schema.columns().iter().map(String::as_str).collect();
    assert_eq!(names, expected);
}

#[test]
fn test_cyclical_hour_encoding() {
    let schema = FeatureSchema::canonical();

    let midnight = encode(&schema, &at("2024-03-11T00:00:00"));
    assert_eq!(midnight.get("hour_sin"), Some(0.0));
    assert_eq!(midnight.get("hour_cos"), Some(1.0));

    let noon = encode(&schema, &at("2024-03-11T12:00:00"));
    let (s, c) = cyclical(12.0, 24.0);
    assert_eq!(noon.get("hour_sin"), Some(s));
    assert!((s - PI.sin()).abs() < 1e-12);
    assert!((c - PI.cos()).abs() < 1e-12);
}

#[test]
fn test_weekend_flag_over_a_week() {
    let schema = FeatureSchema::canonical();
    // 2024-03-11 .. 2024-03-17, Monday through Sunday
    for day in 0..7 {
        let v = encode(&schema, &at(&format!("2024-03-{:02}T10:00:00", 11 + day)));
        assert_eq!(v.get("day_of_week"), Some(day as f64));
        let expected = if day >= 5 { 1.0 } else { 0.0 };
        assert_eq!(v.get("is_weekend"), Some(expected), "day {}", day);
    }
}

#[test]
fn test_weather_one_hot() {
    let schema = FeatureSchema::canonical();
    for (weather, hot) in [
        (Weather::Sunny, Some("weather_sunny")),
        (Weather::Rainy, Some("weather_rainy")),
        (Weather::Cloudy, Some("weather_cloudy")),
        (Weather::parse("tornado"), None),
    ] {
        let v = encode(&schema, &at("2024-03-11T09:30:00").with_weather(weather.clone()));
        for col in ["weather_sunny", "weather_rainy", "weather_cloudy"] {
            let expected = if Some(col) == hot { 1.0 } else { 0.0 };
            assert_eq!(v.get(col), Some(expected), "{:?} {}", weather, col);
        }
    }
}

#[test]
fn test_defaults_are_neutral() {
    let schema = FeatureSchema::canonical();
    let v = encode(&schema, &at("2024-03-11T09:30:00"));
    assert_eq!(v.get("temperature"), Some(70.0));
    assert_eq!(v.get("is_exam_week"), Some(0.0));
    for col in ["prev_hour_occupancy", "prev_2hour_occupancy", "rolling_avg_occupancy"] {
        assert_eq!(v.get(col), Some(0.5), "{}", col);
    }
}

#[test]
fn test_superset_schema_pads_with_zero() {
    let schema = FeatureSchema::with_weather_categories(["cloudy", "rainy", "snowy", "sunny"]).unwrap();
    let v = encode(
        &schema,
        &at("2024-03-11T09:30:00").with_recent_occupancy(OccupancyContext::uniform(0.9)),
    );
    assert_eq!(v.len(), 18);
    assert_eq!(v.get("weather_snowy"), Some(0.0));
    assert_eq!(v.get("weather_sunny"), Some(1.0));
    assert_eq!(v.get("rolling_avg_occupancy"), Some(0.9));
}

#[test]
fn test_same_inputs_same_vector() {
    let schema = FeatureSchema::canonical();
    let input = at("2024-12-02T17:45:00")
        .with_weather(Weather::Cloudy)
        .with_temperature(28.5)
        .with_exam_week(true);
    let a = encode(&schema, &input).into_values();
    let b = encode(&schema, &input).into_values();
    assert_eq!(a, b);
}
