use crate::config::{DashboardConfig, MAX_DENSITY_BINS};
use crate::db;
use crate::ipc::error::{respond, HandlerErr};
use crate::ipc::types::{AppState, Request};
use crate::record::{CategoryField, NumericField, Record};
use crate::stats::{self, ScoreBand};
use serde::Serialize;

/// Everything an analytics request works from: the full record set and the
/// stored dashboard config. Reloaded per request.
struct Snapshot {
    records: Vec<Record>,
    cfg: DashboardConfig,
}

fn snapshot(state: &AppState) -> Result<Snapshot, HandlerErr> {
    let conn = state.conn()?;
    let records =
        db::load_records(conn).map_err(|e| HandlerErr::new("db_query_failed", e.to_string()))?;
    let cfg = db::load_dashboard_config(conn)
        .map_err(|e| HandlerErr::new("db_query_failed", format!("{e:#}")))?;
    Ok(Snapshot { records, cfg })
}

fn to_result<T: Serialize>(v: &T) -> Result<serde_json::Value, HandlerErr> {
    serde_json::to_value(v).map_err(|e| HandlerErr::new("internal", e.to_string()))
}

fn numeric_field(req: &Request, key: &str) -> Result<NumericField, HandlerErr> {
    let Some(raw) = req.params.get(key).and_then(|v| v.as_str()) else {
        return Err(HandlerErr::bad_params(format!("missing {}", key)));
    };
    NumericField::parse(raw).ok_or_else(|| {
        HandlerErr::bad_params(format!(
            "{} must be one of: age, academicPerformance, testResult",
            key
        ))
    })
}

fn category_field(req: &Request, key: &str) -> Result<CategoryField, HandlerErr> {
    let Some(raw) = req.params.get(key).and_then(|v| v.as_str()) else {
        return Err(HandlerErr::bad_params(format!("missing {}", key)));
    };
    CategoryField::parse(raw)
        .ok_or_else(|| HandlerErr::bad_params(format!("{} is not a categorical field", key)))
}

fn string_list(req: &Request, key: &str) -> Result<Option<Vec<String>>, HandlerErr> {
    let Some(v) = req.params.get(key) else {
        return Ok(None);
    };
    if v.is_null() {
        return Ok(None);
    }
    let Some(arr) = v.as_array() else {
        return Err(HandlerErr::bad_params(format!("{} must be an array", key)));
    };
    let mut out = Vec::with_capacity(arr.len());
    for item in arr {
        let Some(s) = item.as_str() else {
            return Err(HandlerErr::bad_params(format!(
                "{} must contain only strings",
                key
            )));
        };
        out.push(s.to_string());
    }
    Ok(Some(out))
}

fn number_list(req: &Request, key: &str) -> Result<Option<Vec<f64>>, HandlerErr> {
    let Some(v) = req.params.get(key) else {
        return Ok(None);
    };
    if v.is_null() {
        return Ok(None);
    }
    let Some(arr) = v.as_array() else {
        return Err(HandlerErr::bad_params(format!("{} must be an array", key)));
    };
    arr.iter()
        .map(|item| {
            item.as_f64().ok_or_else(|| {
                HandlerErr::bad_params(format!("{} must contain only numbers", key))
            })
        })
        .collect::<Result<Vec<_>, _>>()
        .map(Some)
}

/// The configured option list for a categorical field, if it has one.
fn default_categories(cfg: &DashboardConfig, field: CategoryField) -> Option<&[String]> {
    match field {
        CategoryField::Sex => Some(cfg.sex_options.as_slice()),
        CategoryField::IqBand => Some(cfg.iq_options.as_slice()),
        CategoryField::SchoolType => Some(cfg.school_type_options.as_slice()),
        CategoryField::SocioEconomicStatus => Some(cfg.socio_economic_options.as_slice()),
        CategoryField::StudyHabit => Some(cfg.study_habit_options.as_slice()),
        CategoryField::Respondent
        | CategoryField::EthnicGroup
        | CategoryField::AcademicDescription => None,
    }
}

fn categories_for(
    req: &Request,
    key: &str,
    cfg: &DashboardConfig,
    field: CategoryField,
) -> Result<Vec<String>, HandlerErr> {
    if let Some(list) = string_list(req, key)? {
        return Ok(list);
    }
    default_categories(cfg, field)
        .map(|l| l.to_vec())
        .ok_or_else(|| {
            HandlerErr::bad_params(format!(
                "{} is required for field {}",
                key,
                field.as_str()
            ))
        })
}

fn analytics_summary(state: &mut AppState, req: &Request) -> Result<serde_json::Value, HandlerErr> {
    let field = numeric_field(req, "field")?;
    let snap = snapshot(state)?;
    to_result(&stats::summary_statistics(&snap.records, field))
}

fn analytics_counts(state: &mut AppState, req: &Request) -> Result<serde_json::Value, HandlerErr> {
    let field = category_field(req, "field")?;
    let snap = snapshot(state)?;
    let categories = categories_for(req, "categories", &snap.cfg, field)?;
    to_result(&stats::categorical_counts(&snap.records, field, &categories))
}

fn analytics_group_average(
    state: &mut AppState,
    req: &Request,
) -> Result<serde_json::Value, HandlerErr> {
    let group = category_field(req, "groupField")?;
    let value = numeric_field(req, "valueField")?;
    let snap = snapshot(state)?;
    let categories = categories_for(req, "categories", &snap.cfg, group)?;
    to_result(&stats::group_average(
        &snap.records,
        group,
        value,
        &categories,
    ))
}

fn analytics_histogram(
    state: &mut AppState,
    req: &Request,
) -> Result<serde_json::Value, HandlerErr> {
    let value = numeric_field(req, "valueField")?;
    let group = category_field(req, "groupField")?;
    let snap = snapshot(state)?;
    let group_values = categories_for(req, "groupValues", &snap.cfg, group)?;
    let edges = number_list(req, "edges")?.unwrap_or_else(|| snap.cfg.histogram_edges.clone());
    let h = stats::histogram(&snap.records, value, group, &group_values, &edges)?;
    to_result(&h)
}

fn analytics_density(state: &mut AppState, req: &Request) -> Result<serde_json::Value, HandlerErr> {
    let field_a = numeric_field(req, "fieldA")?;
    let field_b = numeric_field(req, "fieldB")?;
    let snap = snapshot(state)?;
    let num_bins = match req.params.get("numBins") {
        None => snap.cfg.density_bins,
        Some(v) if v.is_null() => snap.cfg.density_bins,
        Some(v) => match v.as_u64() {
            Some(n) if n as usize <= MAX_DENSITY_BINS => n as usize,
            _ => {
                return Err(HandlerErr::bad_params(format!(
                    "numBins must be an integer in range 1..={}",
                    MAX_DENSITY_BINS
                )))
            }
        },
    };
    let d = stats::density_estimate(&snap.records, field_a, field_b, num_bins)?;
    to_result(&d)
}

fn analytics_bands(state: &mut AppState, req: &Request) -> Result<serde_json::Value, HandlerErr> {
    let field = if req.params.get("field").is_some() {
        numeric_field(req, "field")?
    } else {
        NumericField::AcademicPerformance
    };
    let snap = snapshot(state)?;
    let bands: Vec<ScoreBand> = match req.params.get("bands") {
        None => snap.cfg.performance_bands.clone(),
        Some(v) if v.is_null() => snap.cfg.performance_bands.clone(),
        Some(v) => serde_json::from_value(v.clone())
            .map_err(|e| HandlerErr::bad_params(format!("bands: {}", e)))?,
    };
    let counts = stats::score_bands(&snap.records, field, &bands)?;
    to_result(&counts)
}

fn analytics_group_distribution(
    state: &mut AppState,
    req: &Request,
) -> Result<serde_json::Value, HandlerErr> {
    let group = category_field(req, "groupField")?;
    let value = numeric_field(req, "valueField")?;
    let snap = snapshot(state)?;
    let categories = categories_for(req, "categories", &snap.cfg, group)?;
    to_result(&stats::group_distribution(
        &snap.records,
        group,
        value,
        &categories,
    ))
}

fn analytics_dashboard_open(
    state: &mut AppState,
    _req: &Request,
) -> Result<serde_json::Value, HandlerErr> {
    let snap = snapshot(state)?;
    let model = stats::dashboard(&snap.records, &snap.cfg)?;
    log::debug!("dashboard model over {} records", model.total_records);
    to_result(&model)
}

pub fn try_handle(state: &mut AppState, req: &Request) -> Option<serde_json::Value> {
    let res = match req.method.as_str() {
        "analytics.summary" => analytics_summary(state, req),
        "analytics.counts" => analytics_counts(state, req),
        "analytics.groupAverage" => analytics_group_average(state, req),
        "analytics.histogram" => analytics_histogram(state, req),
        "analytics.density" => analytics_density(state, req),
        "analytics.bands" => analytics_bands(state, req),
        "analytics.groupDistribution" => analytics_group_distribution(state, req),
        "analytics.dashboard.open" => analytics_dashboard_open(state, req),
        _ => return None,
    };
    Some(respond(&req.id, res))
}
