//! Health metric catalogue

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use super::UnknownVariant;

/// Kind of daily health metric read from the device platform
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MetricType {
    HeartRates,
    Sleep,
    Stress,
    Respiration,
    Spo2,
    IntensityMinutes,
    TrainingReadiness,
    TrainingStatus,
    MaxMetrics,
    Hrv,
    LactateThreshold,
    EnduranceScore,
    HillScore,
    RacePredictions,
    BloodPressure,
    BodyBattery,
    MenstrualData,
    Floors,
    FitnessAge,
    BodyComposition,
}

impl MetricType {
    pub const ALL: [MetricType; 20] = [
        MetricType::HeartRates,
        MetricType::Sleep,
        MetricType::Stress,
        MetricType::Respiration,
        MetricType::Spo2,
        MetricType::IntensityMinutes,
        MetricType::TrainingReadiness,
        MetricType::TrainingStatus,
        MetricType::MaxMetrics,
        MetricType::Hrv,
        MetricType::LactateThreshold,
        MetricType::EnduranceScore,
        MetricType::HillScore,
        MetricType::RacePredictions,
        MetricType::BloodPressure,
        MetricType::BodyBattery,
        MetricType::MenstrualData,
        MetricType::Floors,
        MetricType::FitnessAge,
        MetricType::BodyComposition,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            MetricType::HeartRates => "heart_rates",
            MetricType::Sleep => "sleep",
            MetricType::Stress => "stress",
            MetricType::Respiration => "respiration",
            MetricType::Spo2 => "spo2",
            MetricType::IntensityMinutes => "intensity_minutes",
            MetricType::TrainingReadiness => "training_readiness",
            MetricType::TrainingStatus => "training_status",
            MetricType::MaxMetrics => "max_metrics",
            MetricType::Hrv => "hrv",
            MetricType::LactateThreshold => "lactate_threshold",
            MetricType::EnduranceScore => "endurance_score",
            MetricType::HillScore => "hill_score",
            MetricType::RacePredictions => "race_predictions",
            MetricType::BloodPressure => "blood_pressure",
            MetricType::BodyBattery => "body_battery",
            MetricType::MenstrualData => "menstrual_data",
            MetricType::Floors => "floors",
            MetricType::FitnessAge => "fitness_age",
            MetricType::BodyComposition => "body_composition",
        }
    }

    /// Expand a user selection; an empty selection means every metric
    pub fn resolve(selection: &[MetricType]) -> Vec<MetricType> {
        if selection.is_empty() {
            return Self::ALL.to_vec();
        }
        let mut metrics = selection.to_vec();
        metrics.sort();
        metrics.dedup();
        metrics
    }
}

impl fmt::Display for MetricType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for MetricType {
    type Err = UnknownVariant;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        MetricType::ALL
            .into_iter()
            .find(|m| m.as_str() == s)
            .ok_or_else(|| UnknownVariant::new("metric type", s))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_empty_selection_means_all() {
        assert_eq!(MetricType::resolve(&[]).len(), 20);
    }

    #[test]
    fn test_selection_is_deduplicated() {
        let metrics = MetricType::resolve(&[MetricType::Sleep, MetricType::HeartRates, MetricType::Sleep]);
        assert_eq!(metrics, vec![MetricType::HeartRates, MetricType::Sleep]);
    }

    #[test]
    fn test_parse_matches_serde_names() {
        for metric in MetricType::ALL {
            let json = serde_json::to_string(&metric).unwrap();
            assert_eq!(json, format!("\"{}\"", metric.as_str()));
            assert_eq!(metric.as_str().parse::<MetricType>().unwrap(), metric);
        }
        assert!("steps".parse::<MetricType>().is_err());
    }
}
