// Copyright (c) 2026 Pegasus Heavy Industries LLC
// Licensed under the MIT License

//! Translation of a scheduled value into service calls.
//!
//! Each supported domain has its own unit conversion and on/off rules.
//! [`plan`] is pure; the caller issues the returned calls in order.

use crate::host::ServiceCall;
use serde::{Deserialize, Serialize};
use serde_json::json;
use std::fmt;

/// Transition time in seconds sent with light commands.
pub const LIGHT_TRANSITION_SECS: u32 = 5;

/// Device category of a scheduler target.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum Domain {
    Light,
    Climate,
    Number,
    InputNumber,
    Fan,
    Cover,
    Humidifier,
    MediaPlayer,
    Unknown(String),
}

impl Domain {
    pub fn as_str(&self) -> &str {
        match self {
            Domain::Light => "light",
            Domain::Climate => "climate",
            Domain::Number => "number",
            Domain::InputNumber => "input_number",
            Domain::Fan => "fan",
            Domain::Cover => "cover",
            Domain::Humidifier => "humidifier",
            Domain::MediaPlayer => "media_player",
            Domain::Unknown(name) => name,
        }
    }

    /// Domain implied by an entity id's prefix, `light` when it has none.
    pub fn of_entity(entity_id: &str) -> Domain {
        match entity_id.split_once('.') {
            Some((prefix, _)) => Domain::from(prefix),
            None => Domain::Light,
        }
    }
}

impl From<&str> for Domain {
    fn from(s: &str) -> Self {
        match s {
            "light" => Domain::Light,
            "climate" => Domain::Climate,
            "number" => Domain::Number,
            "input_number" => Domain::InputNumber,
            "fan" => Domain::Fan,
            "cover" => Domain::Cover,
            "humidifier" => Domain::Humidifier,
            "media_player" => Domain::MediaPlayer,
            other => Domain::Unknown(other.to_string()),
        }
    }
}

impl From<String> for Domain {
    fn from(s: String) -> Self {
        Domain::from(s.as_str())
    }
}

impl From<Domain> for String {
    fn from(d: Domain) -> Self {
        d.as_str().to_string()
    }
}

impl fmt::Display for Domain {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Build the calls that drive `target` to `value`.
///
/// Returns `None` for an unknown domain.
pub fn plan(
    domain: &Domain,
    attribute: Option<&str>,
    target: &str,
    value: f64,
) -> Option<Vec<ServiceCall>> {
    let calls = match domain {
        Domain::Light => light(attribute, target, value),
        Domain::Climate => vec![ServiceCall::new(
            "climate",
            "set_temperature",
            json!({ "entity_id": target, "temperature": round_to(value, 1) }),
        )],
        Domain::Number | Domain::InputNumber => {
            // Service domain follows the entity (number.x vs input_number.x).
            let service_domain = match target.split_once('.') {
                Some((prefix, _)) if !prefix.is_empty() => prefix,
                _ => domain.as_str(),
            };
            vec![ServiceCall::new(
                service_domain,
                "set_value",
                json!({ "entity_id": target, "value": round_to(value, 2) }),
            )]
        }
        Domain::Fan => {
            let pct = percent(value);
            if pct > 0 {
                vec![
                    ServiceCall::new("fan", "turn_on", json!({ "entity_id": target })),
                    ServiceCall::new(
                        "fan",
                        "set_percentage",
                        json!({ "entity_id": target, "percentage": pct }),
                    ),
                ]
            } else {
                vec![ServiceCall::new("fan", "turn_off", json!({ "entity_id": target }))]
            }
        }
        Domain::Cover => {
            let position = percent(value);
            let mut calls = Vec::with_capacity(2);
            if position > 0 {
                calls.push(ServiceCall::new(
                    "cover",
                    "open_cover",
                    json!({ "entity_id": target }),
                ));
            }
            calls.push(ServiceCall::new(
                "cover",
                "set_cover_position",
                json!({ "entity_id": target, "position": position }),
            ));
            calls
        }
        Domain::Humidifier => {
            let humidity = percent(value);
            let mut calls = Vec::with_capacity(2);
            if humidity > 0 {
                calls.push(ServiceCall::new(
                    "humidifier",
                    "turn_on",
                    json!({ "entity_id": target }),
                ));
            }
            calls.push(ServiceCall::new(
                "humidifier",
                "set_humidity",
                json!({ "entity_id": target, "humidity": humidity }),
            ));
            calls
        }
        Domain::MediaPlayer => {
            let volume = (value / 100.0).clamp(0.0, 1.0);
            let mut calls = Vec::with_capacity(2);
            if volume > 0.0 {
                calls.push(ServiceCall::new(
                    "media_player",
                    "turn_on",
                    json!({ "entity_id": target }),
                ));
            }
            calls.push(ServiceCall::new(
                "media_player",
                "volume_set",
                json!({ "entity_id": target, "volume_level": round_to(volume, 2) }),
            ));
            calls
        }
        Domain::Unknown(_) => return None,
    };
    Some(calls)
}

fn light(attribute: Option<&str>, target: &str, value: f64) -> Vec<ServiceCall> {
    let brightness = match attribute {
        Some(attr @ ("color_temp" | "color_temp_kelvin")) => {
            let mut data = json!({ "entity_id": target, "transition": LIGHT_TRANSITION_SECS });
            data[attr] = json!(value.trunc() as i64);
            return vec![ServiceCall::new("light", "turn_on", data)];
        }
        Some("brightness") => value.trunc().clamp(0.0, 255.0) as u8,
        _ => (value / 100.0 * 255.0).trunc().clamp(0.0, 255.0) as u8,
    };

    if brightness > 0 {
        vec![ServiceCall::new(
            "light",
            "turn_on",
            json!({
                "entity_id": target,
                "brightness": brightness,
                "transition": LIGHT_TRANSITION_SECS,
            }),
        )]
    } else {
        vec![ServiceCall::new(
            "light",
            "turn_off",
            json!({ "entity_id": target, "transition": LIGHT_TRANSITION_SECS }),
        )]
    }
}

/// Truncate into 0-100.
fn percent(value: f64) -> u8 {
    value.trunc().clamp(0.0, 100.0) as u8
}

fn round_to(value: f64, decimals: i32) -> f64 {
    let factor = 10f64.powi(decimals);
    (value * factor).round() / factor
}

#[cfg(test)]
mod tests {
    use super::*;

    fn services(calls: &[ServiceCall]) -> Vec<String> {
        calls
            .iter()
            .map(|c| format!("{}.{}", c.domain, c.service))
            .collect()
    }

    #[test]
    fn test_domain_round_trips_as_string() {
        assert_eq!(Domain::from("media_player"), Domain::MediaPlayer);
        assert_eq!(Domain::from("switch"), Domain::Unknown("switch".to_string()));
        assert_eq!(String::from(Domain::InputNumber), "input_number");
        let d: Domain = serde_json::from_str(r#""vacuum""#).unwrap();
        assert_eq!(serde_json::to_string(&d).unwrap(), r#""vacuum""#);
    }

    #[test]
    fn test_domain_of_entity() {
        assert_eq!(Domain::of_entity("cover.blinds"), Domain::Cover);
        assert_eq!(Domain::of_entity("kitchen"), Domain::Light);
    }

    #[test]
    fn test_light_percentage_brightness() {
        let calls = plan(&Domain::Light, None, "light.desk", 50.0).unwrap();
        assert_eq!(services(&calls), ["light.turn_on"]);
        assert_eq!(calls[0].data["brightness"], 127);
        assert_eq!(calls[0].data["transition"], 5);
        assert_eq!(calls[0].data["entity_id"], "light.desk");
    }

    #[test]
    fn test_light_zero_turns_off() {
        let calls = plan(&Domain::Light, None, "light.desk", 0.3).unwrap();
        assert_eq!(services(&calls), ["light.turn_off"]);
        assert!(calls[0].data.get("brightness").is_none());
    }

    #[test]
    fn test_light_direct_brightness_is_clamped() {
        let calls = plan(&Domain::Light, Some("brightness"), "light.desk", 200.7).unwrap();
        assert_eq!(calls[0].data["brightness"], 200);
        let calls = plan(&Domain::Light, Some("brightness"), "light.desk", 400.0).unwrap();
        assert_eq!(calls[0].data["brightness"], 255);
    }

    #[test]
    fn test_light_color_temp_always_turns_on() {
        let calls = plan(&Domain::Light, Some("color_temp_kelvin"), "light.desk", 2700.9).unwrap();
        assert_eq!(services(&calls), ["light.turn_on"]);
        assert_eq!(calls[0].data["color_temp_kelvin"], 2700);
        let calls = plan(&Domain::Light, Some("color_temp"), "light.desk", 0.0).unwrap();
        assert_eq!(services(&calls), ["light.turn_on"]);
        assert_eq!(calls[0].data["color_temp"], 0);
    }

    #[test]
    fn test_climate_rounds_to_tenth() {
        let calls = plan(&Domain::Climate, None, "climate.living", 21.46).unwrap();
        assert_eq!(services(&calls), ["climate.set_temperature"]);
        assert_eq!(calls[0].data["temperature"], 21.5);
    }

    #[test]
    fn test_number_uses_entity_prefix() {
        let calls = plan(&Domain::Number, None, "input_number.level", 3.14159).unwrap();
        assert_eq!(services(&calls), ["input_number.set_value"]);
        assert_eq!(calls[0].data["value"], 3.14);
    }

    #[test]
    fn test_fan_on_and_off() {
        let calls = plan(&Domain::Fan, None, "fan.bath", 42.9).unwrap();
        assert_eq!(services(&calls), ["fan.turn_on", "fan.set_percentage"]);
        assert_eq!(calls[1].data["percentage"], 42);
        let calls = plan(&Domain::Fan, None, "fan.bath", 0.0).unwrap();
        assert_eq!(services(&calls), ["fan.turn_off"]);
    }

    #[test]
    fn test_cover_opens_before_positioning() {
        let calls = plan(&Domain::Cover, None, "cover.blinds", 60.0).unwrap();
        assert_eq!(services(&calls), ["cover.open_cover", "cover.set_cover_position"]);
        assert_eq!(calls[1].data["position"], 60);
        let calls = plan(&Domain::Cover, None, "cover.blinds", 0.0).unwrap();
        assert_eq!(services(&calls), ["cover.set_cover_position"]);
        assert_eq!(calls[0].data["position"], 0);
    }

    #[test]
    fn test_humidifier() {
        let calls = plan(&Domain::Humidifier, None, "humidifier.bed", 45.0).unwrap();
        assert_eq!(services(&calls), ["humidifier.turn_on", "humidifier.set_humidity"]);
        let calls = plan(&Domain::Humidifier, None, "humidifier.bed", 0.0).unwrap();
        assert_eq!(services(&calls), ["humidifier.set_humidity"]);
    }

    #[test]
    fn test_media_player_volume() {
        let calls = plan(&Domain::MediaPlayer, None, "media_player.radio", 33.3).unwrap();
        assert_eq!(services(&calls), ["media_player.turn_on", "media_player.volume_set"]);
        assert_eq!(calls[1].data["volume_level"], 0.33);
        let calls = plan(&Domain::MediaPlayer, None, "media_player.radio", 150.0).unwrap();
        assert_eq!(calls[1].data["volume_level"], 1.0);
    }

    #[test]
    fn test_unknown_domain_plans_nothing() {
        assert!(plan(&Domain::from("switch"), None, "switch.x", 1.0).is_none());
    }
}
