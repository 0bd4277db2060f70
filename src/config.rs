use crate::record::{IqBand, SchoolType, Sex, SocioEconomicStatus, STUDY_HABITS};
use crate::stats::{self, ScoreBand, StatsError};
use serde::{Deserialize, Serialize};

pub const SETTINGS_KEY: &str = "dashboard.config";
pub const MAX_DENSITY_BINS: usize = 100;

/// Process-level settings read once from the environment.
#[derive(Debug, Clone)]
pub struct RuntimeConfig {
    pub log_filter: String,
    pub workspace: Option<std::path::PathBuf>,
}

impl RuntimeConfig {
    pub fn from_env() -> Self {
        let log_filter = std::env::var("NATD_LOG")
            .ok()
            .filter(|s| !s.trim().is_empty())
            .unwrap_or_else(|| "warn".to_string());
        let workspace = std::env::var("NATD_WORKSPACE")
            .ok()
            .map(|s| s.trim().to_string())
            .filter(|s| !s.is_empty())
            .map(std::path::PathBuf::from);
        Self {
            log_filter,
            workspace,
        }
    }
}

/// Shared option lists and binning parameters for every chart.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct DashboardConfig {
    pub sex_options: Vec<String>,
    pub iq_options: Vec<String>,
    pub school_type_options: Vec<String>,
    pub socio_economic_options: Vec<String>,
    pub study_habit_options: Vec<String>,
    pub histogram_edges: Vec<f64>,
    pub density_bins: usize,
    pub performance_bands: Vec<ScoreBand>,
}

impl Default for DashboardConfig {
    fn default() -> Self {
        Self {
            sex_options: Sex::labels(),
            iq_options: IqBand::labels(),
            school_type_options: SchoolType::labels(),
            socio_economic_options: SocioEconomicStatus::labels(),
            study_habit_options: STUDY_HABITS.iter().map(|s| s.to_string()).collect(),
            histogram_edges: vec![20.0, 40.0, 60.0, 80.0, 100.0],
            density_bins: 10,
            performance_bands: vec![
                ScoreBand::new("Low Performance (0-74)", None, Some(74.0)),
                ScoreBand::new("Average Performance (75-89)", Some(75.0), Some(89.0)),
                ScoreBand::new("High Performance (90-100)", Some(90.0), None),
            ],
        }
    }
}

impl DashboardConfig {
    pub fn validate(&self) -> Result<(), StatsError> {
        for (name, list) in [
            ("sexOptions", &self.sex_options),
            ("iqOptions", &self.iq_options),
            ("schoolTypeOptions", &self.school_type_options),
            ("socioEconomicOptions", &self.socio_economic_options),
            ("studyHabitOptions", &self.study_habit_options),
        ] {
            if list.is_empty() || list.iter().any(|s| s.trim().is_empty()) {
                return Err(StatsError::new(
                    "bad_params",
                    format!("{} must be a non-empty list of non-empty labels", name),
                ));
            }
        }
        stats::validate_edges(&self.histogram_edges)?;
        if self.density_bins == 0 || self.density_bins > MAX_DENSITY_BINS {
            return Err(StatsError::new(
                "bad_params",
                format!("densityBins must be in range 1..={}", MAX_DENSITY_BINS),
            ));
        }
        stats::validate_bands(&self.performance_bands)
    }

    /// Overlay the keys present in `patch` onto this config and validate.
    pub fn merged(&self, patch: &serde_json::Value) -> Result<Self, StatsError> {
        let Some(patch_obj) = patch.as_object() else {
            return Err(StatsError::new("bad_params", "patch must be an object"));
        };
        let mut base = serde_json::to_value(self)
            .map_err(|e| StatsError::new("internal", e.to_string()))?;
        let Some(base_obj) = base.as_object_mut() else {
            return Err(StatsError::new("internal", "config did not serialize to an object"));
        };
        for (k, v) in patch_obj {
            if !base_obj.contains_key(k) {
                return Err(StatsError::new(
                    "bad_params",
                    format!("unknown settings key: {}", k),
                ));
            }
            base_obj.insert(k.clone(), v.clone());
        }
        let merged: DashboardConfig = serde_json::from_value(base)
            .map_err(|e| StatsError::new("bad_params", e.to_string()))?;
        merged.validate()?;
        Ok(merged)
    }
}
