//! Emergency Monitor
//!
//! Stateless safety check consulted before anything else in every cycle.

use tutor_core::MotionCommand;
use tutor_core::events::SensorReading;

pub const SAFETY_UTTERANCE: &str = "Emergency situation detected. Stopping all movement.";

/// An obstacle inside the stop distance or an overheating body.
pub fn is_emergency(reading: &SensorReading) -> bool {
    reading.obstacle_too_close || reading.temperature_high
}

/// Returns the first emergency reading in drain order, if any.
pub fn first_emergency(readings: &[SensorReading]) -> Option<&SensorReading> {
    readings.iter().find(|r| is_emergency(r))
}

/// The fixed response to an emergency: stop every actuator, then warn.
pub fn emergency_response() -> (MotionCommand, &'static str) {
    (MotionCommand::EmergencyStop, SAFETY_UTTERANCE)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn reading(obstacle_too_close: bool, temperature_high: bool) -> SensorReading {
        SensorReading {
            distance: if obstacle_too_close { 10.0 } else { 120.0 },
            temperature: if temperature_high { 45.0 } else { 30.0 },
            motion_detected: false,
            obstacle_too_close,
            temperature_high,
        }
    }

    #[test]
    fn test_predicate() {
        assert!(!is_emergency(&reading(false, false)));
        assert!(is_emergency(&reading(true, false)));
        assert!(is_emergency(&reading(false, true)));
        assert!(is_emergency(&reading(true, true)));
    }

    #[test]
    fn test_raw_values_do_not_trigger_without_flags() {
        // Thresholds are the sensor collaborator's concern.
        let raw = SensorReading {
            distance: 1.0,
            temperature: 90.0,
            ..SensorReading::default()
        };
        assert!(!is_emergency(&raw));
    }

    #[test]
    fn test_first_emergency_in_drain_order() {
        let readings = [reading(false, false), reading(false, true), reading(true, false)];
        let found = first_emergency(&readings).unwrap();
        assert!(found.temperature_high);
        assert!(first_emergency(&readings[..1]).is_none());
    }

    #[test]
    fn test_response_is_stop_then_warning() {
        let (motion, utterance) = emergency_response();
        assert_eq!(motion, MotionCommand::EmergencyStop);
        assert_eq!(utterance, SAFETY_UTTERANCE);
    }
}
