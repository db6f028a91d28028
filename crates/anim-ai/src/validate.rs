use serde_json::Value;

use crate::AttemptError;

pub const MAX_TOTAL_PARTICLES: u64 = 10_000;

const GATE_FIELDS: [&str; 3] = ["duration", "fps", "resolution"];

pub fn parse_config(raw: &str) -> Result<Value, AttemptError> {
    serde_json::from_str(raw).map_err(|error| AttemptError::Parse(error.to_string()))
}

/// Gate-field check only; everything beyond the three required fields is
/// trusted to the provider.
pub fn validate_config(config: &Value) -> Result<(), AttemptError> {
    if GATE_FIELDS
        .iter()
        .any(|field| !field_is_present(config, field))
    {
        return Err(AttemptError::Validation(
            "missing required fields: duration, fps, or resolution".to_string(),
        ));
    }
    Ok(())
}

// Loose truthiness on purpose: 0, null, "", and false all count as absent,
// not just a missing key.
fn field_is_present(config: &Value, field: &str) -> bool {
    match config.get(field) {
        None | Some(Value::Null) => false,
        Some(Value::Bool(flag)) => *flag,
        Some(Value::Number(number)) => number.as_f64().is_some_and(|value| value != 0.0),
        Some(Value::String(text)) => !text.is_empty(),
        Some(_) => true,
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ClampReport {
    pub single_system_capped: bool,
    pub groups_total_before: Option<u64>,
}

impl ClampReport {
    pub fn is_untouched(&self) -> bool {
        !self.single_system_capped && self.groups_total_before.is_none()
    }
}

/// Enforces the particle ceiling by correction, never rejection: a single
/// `particles.count` is truncated, `particleGroups` counts are floor-scaled
/// so their proportions survive. Both corrections apply independently.
pub fn clamp_particle_counts(config: &mut Value) -> ClampReport {
    let mut report = ClampReport::default();

    if let Some(count) = config.pointer("/particles/count").and_then(Value::as_f64)
        && count > MAX_TOTAL_PARTICLES as f64
        && let Some(slot) = config.pointer_mut("/particles/count")
    {
        *slot = Value::from(MAX_TOTAL_PARTICLES);
        report.single_system_capped = true;
        tracing::warn!(count, "particle count capped at {MAX_TOTAL_PARTICLES}");
    }

    if let Some(groups) = config
        .get_mut("particleGroups")
        .and_then(Value::as_array_mut)
    {
        let total: f64 = groups
            .iter()
            .filter_map(|group| group.get("count").and_then(Value::as_f64))
            .sum();
        if total > MAX_TOTAL_PARTICLES as f64 {
            let scale = MAX_TOTAL_PARTICLES as f64 / total;
            for group in groups.iter_mut() {
                if let Some(fields) = group.as_object_mut()
                    && let Some(count) = fields.get("count").and_then(Value::as_f64)
                {
                    fields.insert("count".to_string(), Value::from((count * scale).floor() as u64));
                }
            }
            report.groups_total_before = Some(total as u64);
            tracing::warn!(total, "total particle count scaled down to {MAX_TOTAL_PARTICLES}");
        }
    }

    report
}

#[cfg(test)]
mod tests {
    use serde_json::{Value, json};

    use super::{
        MAX_TOTAL_PARTICLES, clamp_particle_counts, parse_config, validate_config,
    };
    use crate::AttemptError;

    fn group_counts(config: &Value) -> Vec<u64> {
        config["particleGroups"]
            .as_array()
            .expect("groups should be present")
            .iter()
            .map(|group| group["count"].as_u64().expect("count should be a number"))
            .collect()
    }

    #[test]
    fn parse_rejects_text_that_is_not_json() {
        let error = parse_config("here is your config: {\"duration\": 10}")
            .expect_err("prose around JSON should not parse");
        assert!(matches!(error, AttemptError::Parse(_)));
    }

    #[test]
    fn validation_passes_with_all_gate_fields() {
        let config = json!({"duration": 10, "fps": 60, "resolution": [1920, 1080]});
        validate_config(&config).expect("gate fields are present");
    }

    #[test]
    fn validation_fails_when_any_gate_field_is_absent() {
        for field in ["duration", "fps", "resolution"] {
            let mut config = json!({"duration": 10, "fps": 60, "resolution": [1920, 1080]});
            config.as_object_mut().expect("object").remove(field);
            assert!(
                validate_config(&config).is_err(),
                "missing {field} should fail validation"
            );
        }
    }

    #[test]
    fn validation_treats_zero_and_null_as_missing() {
        let zero_fps = json!({"duration": 10, "fps": 0, "resolution": [1920, 1080]});
        assert!(validate_config(&zero_fps).is_err());

        let null_duration = json!({"duration": null, "fps": 60, "resolution": [1920, 1080]});
        assert!(validate_config(&null_duration).is_err());
    }

    #[test]
    fn validation_ignores_other_valid_looking_fields() {
        let config = json!({
            "fps": 60,
            "resolution": [1920, 1080],
            "camera": {"type": "orbit", "distance": 30, "speed": 0.1},
            "particleGroups": [{"name": "iron-core", "count": 800}]
        });
        assert!(validate_config(&config).is_err());
    }

    #[test]
    fn single_particle_system_is_truncated_to_the_ceiling() {
        let mut config = json!({"particles": {"count": 25_000, "color": "#ffffff"}});
        let report = clamp_particle_counts(&mut config);

        assert_eq!(config["particles"]["count"], MAX_TOTAL_PARTICLES);
        assert_eq!(config["particles"]["color"], "#ffffff");
        assert!(report.single_system_capped);
    }

    #[test]
    fn compliant_single_particle_system_is_untouched() {
        let mut config = json!({"particles": {"count": 9_999}});
        let report = clamp_particle_counts(&mut config);

        assert_eq!(config["particles"]["count"], 9_999);
        assert!(report.is_untouched());
    }

    #[test]
    fn oversized_groups_are_scaled_preserving_proportions() {
        let mut config = json!({
            "particleGroups": [
                {"name": "iron-core", "count": 3_000, "mass": 3.0},
                {"name": "silicate-mantle", "count": 4_500, "mass": 1.5},
                {"name": "outer-shell", "count": 4_500, "mass": 0.8},
                {"name": "ice-volatiles", "count": 3_000, "mass": 0.5}
            ]
        });
        let report = clamp_particle_counts(&mut config);

        let counts = group_counts(&config);
        assert_eq!(counts, vec![2_000, 3_000, 3_000, 2_000]);
        assert!(counts.iter().sum::<u64>() <= MAX_TOTAL_PARTICLES);
        assert_eq!(report.groups_total_before, Some(15_000));

        // Non-count fields and ordering survive the rewrite.
        let groups = config["particleGroups"].as_array().expect("groups");
        assert_eq!(groups[0]["name"], "iron-core");
        assert_eq!(groups[0]["mass"], 3.0);
        assert_eq!(groups[3]["name"], "ice-volatiles");
    }

    #[test]
    fn scaled_totals_stay_at_or_below_the_ceiling_with_flooring() {
        let mut config = json!({
            "particleGroups": [
                {"name": "a", "count": 4_000},
                {"name": "b", "count": 6_000},
                {"name": "c", "count": 2_000}
            ]
        });
        clamp_particle_counts(&mut config);

        let counts = group_counts(&config);
        assert_eq!(counts, vec![3_333, 5_000, 1_666]);
        assert!(counts.iter().sum::<u64>() <= MAX_TOTAL_PARTICLES);
    }

    #[test]
    fn clamping_a_compliant_group_config_is_a_no_op() {
        let original = json!({
            "particleGroups": [
                {"name": "a", "count": 4_000},
                {"name": "b", "count": 5_000}
            ]
        });
        let mut config = original.clone();
        let report = clamp_particle_counts(&mut config);

        assert_eq!(config, original);
        assert!(report.is_untouched());
    }

    #[test]
    fn clamping_is_idempotent() {
        let mut config = json!({
            "particleGroups": [
                {"name": "a", "count": 8_000},
                {"name": "b", "count": 8_000}
            ]
        });
        clamp_particle_counts(&mut config);
        let after_first = config.clone();
        let report = clamp_particle_counts(&mut config);

        assert_eq!(config, after_first);
        assert!(report.is_untouched());
    }

    #[test]
    fn both_particle_fields_are_clamped_independently() {
        let mut config = json!({
            "particles": {"count": 12_000},
            "particleGroups": [
                {"name": "a", "count": 11_000},
                {"name": "b", "count": 11_000}
            ]
        });
        let report = clamp_particle_counts(&mut config);

        assert_eq!(config["particles"]["count"], MAX_TOTAL_PARTICLES);
        assert_eq!(group_counts(&config), vec![5_000, 5_000]);
        assert!(report.single_system_capped);
        assert_eq!(report.groups_total_before, Some(22_000));
    }

    #[test]
    fn groups_without_a_count_are_left_alone_during_scaling() {
        let mut config = json!({
            "particleGroups": [
                {"name": "a", "count": 20_000},
                {"name": "marker"}
            ]
        });
        clamp_particle_counts(&mut config);

        let groups = config["particleGroups"].as_array().expect("groups");
        assert_eq!(groups[0]["count"], 10_000);
        assert!(groups[1].get("count").is_none());
    }
}
