use crate::db;
use crate::ipc::error::{respond, HandlerErr};
use crate::ipc::types::{AppState, Request};
use crate::listing;
use crate::record::{
    coerce_age, coerce_number, IqBand, Record, RecordDraft, SchoolType, Sex, SocioEconomicStatus,
};
use serde_json::json;
use uuid::Uuid;

/// Fields the form path must supply on create.
const REQUIRED_ON_CREATE: &[&str] = &[
    "respondent",
    "age",
    "sex",
    "academicPerformance",
    "iqBand",
    "schoolType",
    "socioEconomicStatus",
    "testResult",
];

fn field_err(key: &str, message: impl Into<String>) -> HandlerErr {
    HandlerErr::bad_params(message).with_details(json!({ "field": key }))
}

fn str_value<'a>(key: &str, v: &'a serde_json::Value) -> Result<&'a str, HandlerErr> {
    v.as_str()
        .map(str::trim)
        .ok_or_else(|| field_err(key, format!("{} must be a string", key)))
}

fn enum_value(
    key: &str,
    v: &serde_json::Value,
    parse: fn(&str) -> Option<&'static str>,
    options: Vec<String>,
) -> Result<String, HandlerErr> {
    let raw = str_value(key, v)?;
    parse(raw).map(str::to_string).ok_or_else(|| {
        field_err(
            key,
            format!("{} must be one of: {}", key, options.join(", ")),
        )
    })
}

fn score_value(key: &str, v: &serde_json::Value) -> Result<f64, HandlerErr> {
    let Some(n) = coerce_number(v) else {
        return Err(field_err(key, format!("{} must be a number", key)));
    };
    if !(0.0..=100.0).contains(&n) {
        return Err(field_err(key, format!("{} must be between 0 and 100", key)));
    }
    Ok(n)
}

/// Validate one wire field and store it on `r`.
fn apply_field(r: &mut Record, key: &str, v: &serde_json::Value) -> Result<(), HandlerErr> {
    match key {
        "respondent" => {
            let s = str_value(key, v)?;
            if s.is_empty() {
                return Err(field_err(key, "respondent must not be empty"));
            }
            r.respondent = s.to_string();
        }
        "age" => {
            let age = coerce_number(v).and_then(coerce_age);
            let Some(age) = age else {
                return Err(field_err(key, "age must be a non-negative whole number"));
            };
            r.age = Some(age);
        }
        "sex" => {
            r.sex = enum_value(key, v, |s| Sex::parse(s).map(Sex::as_str), Sex::labels())?;
        }
        "ethnicGroup" => r.ethnic_group = str_value(key, v)?.to_string(),
        "academicPerformance" => r.academic_performance = Some(score_value(key, v)?),
        "academicDescription" => r.academic_description = str_value(key, v)?.to_string(),
        "iqBand" => {
            r.iq_band = enum_value(
                key,
                v,
                |s| IqBand::parse(s).map(IqBand::as_str),
                IqBand::labels(),
            )?;
        }
        "schoolType" => {
            r.school_type = enum_value(
                key,
                v,
                |s| SchoolType::parse(s).map(SchoolType::as_str),
                SchoolType::labels(),
            )?;
        }
        "socioEconomicStatus" => {
            r.socio_economic_status = enum_value(
                key,
                v,
                |s| SocioEconomicStatus::parse(s).map(SocioEconomicStatus::as_str),
                SocioEconomicStatus::labels(),
            )?;
        }
        "studyHabit" => r.study_habit = str_value(key, v)?.to_string(),
        "testResult" => r.test_result = Some(score_value(key, v)?),
        _ => return Err(field_err(key, format!("unknown record field: {}", key))),
    }
    Ok(())
}

fn object_param<'a>(
    req: &'a Request,
    key: &str,
) -> Result<&'a serde_json::Map<String, serde_json::Value>, HandlerErr> {
    req.params
        .get(key)
        .and_then(|v| v.as_object())
        .ok_or_else(|| HandlerErr::bad_params(format!("missing {} object", key)))
}

fn id_param(req: &Request) -> Result<String, HandlerErr> {
    match req.params.get("id").and_then(|v| v.as_str()) {
        Some(v) if !v.trim().is_empty() => Ok(v.trim().to_string()),
        _ => Err(HandlerErr::bad_params("missing id")),
    }
}

fn load_one(state: &AppState, id: &str) -> Result<Record, HandlerErr> {
    let conn = state.conn()?;
    db::get_record(conn, id)
        .map_err(|e| HandlerErr::new("db_query_failed", e.to_string()))?
        .ok_or_else(|| {
            HandlerErr::new("not_found", "record not found").with_details(json!({ "id": id }))
        })
}

fn records_list(state: &mut AppState, req: &Request) -> Result<serde_json::Value, HandlerErr> {
    let conn = state.conn()?;
    let query =
        listing::parse_record_query(req.params.get("query")).map_err(HandlerErr::bad_params)?;
    let records =
        db::load_records(conn).map_err(|e| HandlerErr::new("db_query_failed", e.to_string()))?;
    let page = listing::apply_query(records, &query);
    serde_json::to_value(page).map_err(|e| HandlerErr::new("internal", e.to_string()))
}

fn records_get(state: &mut AppState, req: &Request) -> Result<serde_json::Value, HandlerErr> {
    let id = id_param(req)?;
    let record = load_one(state, &id)?;
    Ok(json!({ "record": record }))
}

fn records_create(state: &mut AppState, req: &Request) -> Result<serde_json::Value, HandlerErr> {
    let conn = state.conn()?;
    let fields = object_param(req, "record")?;
    for key in REQUIRED_ON_CREATE {
        if !fields.contains_key(*key) {
            return Err(field_err(key, format!("missing record.{}", key)));
        }
    }

    let now = db::now_rfc3339();
    let mut record = RecordDraft::default().into_record(Uuid::new_v4().to_string(), &now);
    for (key, v) in fields {
        apply_field(&mut record, key, v)?;
    }

    db::insert_record(conn, &record, None)
        .map_err(|e| HandlerErr::new("db_insert_failed", e.to_string()))?;
    log::info!("record created: {}", record.id);
    Ok(json!({ "recordId": record.id, "record": record }))
}

fn records_update(state: &mut AppState, req: &Request) -> Result<serde_json::Value, HandlerErr> {
    let id = id_param(req)?;
    let patch = object_param(req, "patch")?;
    let mut record = load_one(state, &id)?;
    for (key, v) in patch {
        apply_field(&mut record, key, v)?;
    }
    record.updated_at = db::now_rfc3339();

    let conn = state.conn()?;
    db::update_record(conn, &record)
        .map_err(|e| HandlerErr::new("db_update_failed", e.to_string()))?;
    Ok(json!({ "record": record }))
}

fn records_delete(state: &mut AppState, req: &Request) -> Result<serde_json::Value, HandlerErr> {
    let id = id_param(req)?;
    let conn = state.conn()?;
    let changed = db::delete_record(conn, &id)
        .map_err(|e| HandlerErr::new("db_delete_failed", e.to_string()))?;
    if changed == 0 {
        return Err(
            HandlerErr::new("not_found", "record not found").with_details(json!({ "id": id }))
        );
    }
    log::info!("record deleted: {}", id);
    Ok(json!({ "ok": true }))
}

pub fn try_handle(state: &mut AppState, req: &Request) -> Option<serde_json::Value> {
    let res = match req.method.as_str() {
        "records.list" => records_list(state, req),
        "records.get" => records_get(state, req),
        "records.create" => records_create(state, req),
        "records.update" => records_update(state, req),
        "records.delete" => records_delete(state, req),
        _ => return None,
    };
    Some(respond(&req.id, res))
}
