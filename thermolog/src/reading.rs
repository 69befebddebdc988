//! Sensor reading schema for the thermolog telemetry store.
//!
//! Defines the reading vocabulary (sensor types, sensor identifiers, units),
//! the fixed whitelist of legal `(sensor_type, sensor_id)` pairs, and the
//! [`SensorReading`] record itself with its validity rules. The vocabulary is
//! closed: the hardware fleet is a known, fixed set of sensors, and anything
//! outside it is rejected at merge boundaries rather than stored.

use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::{Result, SchemaError};

/// The fixed whitelist of legal `(sensor_type, sensor_id)` pairs.
///
/// A reading whose pair is not listed here is invalid regardless of its
/// other fields. The DHT11 is the only sensor in the fleet that reports
/// both temperature and humidity.
pub const SENSOR_COMBINATIONS: [(SensorType, SensorId); 4] = [
    (SensorType::Temperature, SensorId::Dht11),
    (SensorType::Temperature, SensorId::Ds18b20),
    (SensorType::Temperature, SensorId::PiCpu),
    (SensorType::Humidity, SensorId::Dht11),
];

/// The physical quantity a reading measures.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum SensorType {
    /// A temperature measurement, always in degrees Celsius.
    #[serde(rename = "temperature")]
    Temperature,

    /// A relative-humidity measurement, always in percent.
    #[serde(rename = "humidity")]
    Humidity,
}

impl SensorType {
    /// Returns the canonical wire token for this sensor type.
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Temperature => "temperature",
            Self::Humidity => "humidity",
        }
    }

    /// Parses a wire token back into a sensor type.
    ///
    /// # Errors
    ///
    /// Returns [`SchemaError::UnknownToken`] if the token is outside the
    /// vocabulary.
    pub fn parse(token: &str) -> Result<Self> {
        match token {
            "temperature" => Ok(Self::Temperature),
            "humidity" => Ok(Self::Humidity),
            other => Err(SchemaError::UnknownToken {
                field: "sensor_type",
                token: other.to_string(),
            }
            .into()),
        }
    }

    /// Returns the unit this sensor type reports in.
    ///
    /// The unit is fully determined by the type: temperature is Celsius,
    /// humidity is percent.
    pub fn unit(self) -> Unit {
        match self {
            Self::Temperature => Unit::Celsius,
            Self::Humidity => Unit::RelativeHumidity,
        }
    }
}

impl fmt::Display for SensorType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// The hardware device a reading came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum SensorId {
    /// DHT11 combined temperature/humidity sensor.
    #[serde(rename = "DHT11")]
    Dht11,

    /// DS18B20 one-wire temperature probe.
    #[serde(rename = "DS18B20")]
    Ds18b20,

    /// The Pi's own CPU temperature sensor.
    #[serde(rename = "PI_CPU")]
    PiCpu,
}

impl SensorId {
    /// Returns the canonical wire token for this sensor.
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Dht11 => "DHT11",
            Self::Ds18b20 => "DS18B20",
            Self::PiCpu => "PI_CPU",
        }
    }

    /// Parses a wire token back into a sensor identifier.
    ///
    /// # Errors
    ///
    /// Returns [`SchemaError::UnknownToken`] if the token is outside the
    /// vocabulary.
    pub fn parse(token: &str) -> Result<Self> {
        match token {
            "DHT11" => Ok(Self::Dht11),
            "DS18B20" => Ok(Self::Ds18b20),
            "PI_CPU" => Ok(Self::PiCpu),
            other => Err(SchemaError::UnknownToken {
                field: "sensor_id",
                token: other.to_string(),
            }
            .into()),
        }
    }
}

impl fmt::Display for SensorId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// The unit a reading's value is expressed in.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum Unit {
    /// Degrees Celsius.
    #[serde(rename = "C")]
    Celsius,

    /// Relative humidity, percent.
    #[serde(rename = "%")]
    RelativeHumidity,
}

impl Unit {
    /// Returns the canonical wire token for this unit.
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Celsius => "C",
            Self::RelativeHumidity => "%",
        }
    }

    /// Parses a wire token back into a unit.
    ///
    /// # Errors
    ///
    /// Returns [`SchemaError::UnknownToken`] if the token is outside the
    /// vocabulary.
    pub fn parse(token: &str) -> Result<Self> {
        match token {
            "C" => Ok(Self::Celsius),
            "%" => Ok(Self::RelativeHumidity),
            other => Err(SchemaError::UnknownToken {
                field: "unit",
                token: other.to_string(),
            }
            .into()),
        }
    }
}

impl fmt::Display for Unit {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Why a reading failed schema validation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Violation {
    /// The `(sensor_type, sensor_id)` pair is not in [`SENSOR_COMBINATIONS`].
    UnsupportedPair {
        /// The reading's sensor type.
        sensor_type: SensorType,
        /// The reading's sensor identifier.
        sensor_id: SensorId,
    },

    /// The unit does not match the one determined by the sensor type.
    UnitMismatch {
        /// The reading's sensor type.
        sensor_type: SensorType,
        /// The unit the reading carried.
        unit: Unit,
    },
}

impl fmt::Display for Violation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::UnsupportedPair {
                sensor_type,
                sensor_id,
            } => write!(f, "({sensor_type}, {sensor_id}) is not a supported sensor pair"),
            Self::UnitMismatch { sensor_type, unit } => {
                write!(f, "unit '{unit}' does not match sensor type '{sensor_type}'")
            }
        }
    }
}

/// A single sensor reading.
///
/// Readings are keyed by the triple `(sensor_type, sensor_id, timestamp)`;
/// two readings with the same key are considered the same observation.
/// Timestamps carry sub-second precision (microseconds on the wire).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SensorReading {
    /// The quantity measured.
    pub sensor_type: SensorType,

    /// The device that measured it.
    pub sensor_id: SensorId,

    /// When the measurement was taken.
    pub timestamp: DateTime<Utc>,

    /// The measured value.
    pub reading: f64,

    /// The unit of the measured value.
    pub unit: Unit,
}

impl SensorReading {
    /// Creates a reading with the unit derived from the sensor type.
    ///
    /// Readings built this way can still fail [`validate`](Self::validate)
    /// if the `(sensor_type, sensor_id)` pair is unsupported.
    pub fn new(
        sensor_type: SensorType,
        sensor_id: SensorId,
        timestamp: DateTime<Utc>,
        reading: f64,
    ) -> Self {
        Self {
            sensor_type,
            sensor_id,
            timestamp,
            reading,
            unit: sensor_type.unit(),
        }
    }

    /// Returns the key triple that identifies this observation.
    pub fn key(&self) -> (SensorType, SensorId, DateTime<Utc>) {
        (self.sensor_type, self.sensor_id, self.timestamp)
    }

    /// Checks this reading against the schema validity rules.
    ///
    /// Returns the first violation found: an unsupported sensor pair, or a
    /// unit inconsistent with the sensor type. Value range is deliberately
    /// unchecked; a miscalibrated sensor is still a real observation.
    pub fn validate(&self) -> std::result::Result<(), Violation> {
        if !SENSOR_COMBINATIONS.contains(&(self.sensor_type, self.sensor_id)) {
            return Err(Violation::UnsupportedPair {
                sensor_type: self.sensor_type,
                sensor_id: self.sensor_id,
            });
        }
        if self.unit != self.sensor_type.unit() {
            return Err(Violation::UnitMismatch {
                sensor_type: self.sensor_type,
                unit: self.unit,
            });
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use chrono::TimeZone;

    use super::*;

    fn ts() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2023, 11, 15, 12, 0, 0).unwrap()
    }

    #[test]
    fn test_unit_follows_sensor_type() {
        assert_eq!(SensorType::Temperature.unit(), Unit::Celsius);
        assert_eq!(SensorType::Humidity.unit(), Unit::RelativeHumidity);

        let reading = SensorReading::new(SensorType::Humidity, SensorId::Dht11, ts(), 55.0);
        assert_eq!(reading.unit, Unit::RelativeHumidity);
    }

    #[test]
    fn test_whitelisted_pairs_validate() {
        for (sensor_type, sensor_id) in SENSOR_COMBINATIONS {
            let reading = SensorReading::new(sensor_type, sensor_id, ts(), 21.5);
            assert!(reading.validate().is_ok(), "{sensor_type}/{sensor_id} should be valid");
        }
    }

    #[test]
    fn test_unsupported_pair_rejected() {
        // The DS18B20 and the CPU sensor do not report humidity.
        let reading = SensorReading::new(SensorType::Humidity, SensorId::Ds18b20, ts(), 40.0);
        assert_eq!(
            reading.validate(),
            Err(Violation::UnsupportedPair {
                sensor_type: SensorType::Humidity,
                sensor_id: SensorId::Ds18b20,
            })
        );

        let reading = SensorReading::new(SensorType::Humidity, SensorId::PiCpu, ts(), 40.0);
        assert!(reading.validate().is_err());
    }

    #[test]
    fn test_unit_mismatch_rejected() {
        let mut reading = SensorReading::new(SensorType::Temperature, SensorId::Dht11, ts(), 21.5);
        reading.unit = Unit::RelativeHumidity;
        assert_eq!(
            reading.validate(),
            Err(Violation::UnitMismatch {
                sensor_type: SensorType::Temperature,
                unit: Unit::RelativeHumidity,
            })
        );
    }

    #[test]
    fn test_token_round_trips() {
        for sensor_type in [SensorType::Temperature, SensorType::Humidity] {
            assert_eq!(SensorType::parse(sensor_type.as_str()).unwrap(), sensor_type);
        }
        for sensor_id in [SensorId::Dht11, SensorId::Ds18b20, SensorId::PiCpu] {
            assert_eq!(SensorId::parse(sensor_id.as_str()).unwrap(), sensor_id);
        }
        for unit in [Unit::Celsius, Unit::RelativeHumidity] {
            assert_eq!(Unit::parse(unit.as_str()).unwrap(), unit);
        }
    }

    #[test]
    fn test_unknown_token_rejected() {
        assert!(SensorType::parse("pressure").is_err());
        assert!(SensorId::parse("BME280").is_err());
        assert!(Unit::parse("F").is_err());
    }

    #[test]
    fn test_serde_uses_wire_tokens() {
        let reading = SensorReading::new(SensorType::Temperature, SensorId::PiCpu, ts(), 48.2);
        let json = serde_json::to_string(&reading).unwrap();
        assert!(json.contains("\"temperature\""));
        assert!(json.contains("\"PI_CPU\""));
        assert!(json.contains("\"C\""));

        let back: SensorReading = serde_json::from_str(&json).unwrap();
        assert_eq!(back, reading);
    }
}
