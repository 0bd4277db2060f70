use crate::record::{NumericField, Record};
use serde::Serialize;
use std::cmp::Ordering;

pub const DEFAULT_PAGE_SIZE: usize = 5;
pub const MAX_PAGE_SIZE: usize = 500;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SortKey {
    CreatedAt,
    Respondent,
    Age,
    AcademicPerformance,
    TestResult,
}

#[derive(Debug, Clone, PartialEq)]
pub struct RecordQuery {
    pub search: Option<String>,
    pub sex: Option<String>,
    pub school_type: Option<String>,
    pub socio_economic_status: Option<String>,
    pub study_habit: Option<String>,
    pub sort_by: SortKey,
    pub descending: bool,
    pub page: usize,
    pub page_size: usize,
}

impl Default for RecordQuery {
    fn default() -> Self {
        Self {
            search: None,
            sex: None,
            school_type: None,
            socio_economic_status: None,
            study_habit: None,
            sort_by: SortKey::CreatedAt,
            descending: false,
            page: 1,
            page_size: DEFAULT_PAGE_SIZE,
        }
    }
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RecordPage {
    pub rows: Vec<Record>,
    pub total_count: usize,
    pub filtered_count: usize,
    pub page: usize,
    pub page_size: usize,
    pub total_pages: usize,
}

fn parse_search(v: Option<&serde_json::Value>) -> Result<Option<String>, String> {
    let Some(value) = v else {
        return Ok(None);
    };
    if value.is_null() {
        return Ok(None);
    }
    let Some(raw) = value.as_str() else {
        return Err("query.search must be string or null".to_string());
    };
    let trimmed = raw.trim();
    if trimmed.is_empty() {
        return Ok(None);
    }
    Ok(Some(trimmed.to_lowercase()))
}

fn parse_filter(obj: &serde_json::Map<String, serde_json::Value>, key: &str) -> Result<Option<String>, String> {
    match obj.get(key) {
        None => Ok(None),
        Some(v) if v.is_null() => Ok(None),
        Some(v) => {
            let Some(s) = v.as_str() else {
                return Err(format!("query.filters.{} must be string or null", key));
            };
            if s.is_empty() || s.eq_ignore_ascii_case("ALL") {
                Ok(None)
            } else {
                Ok(Some(s.to_string()))
            }
        }
    }
}

fn parse_sort_by(v: Option<&serde_json::Value>) -> Result<SortKey, String> {
    let Some(value) = v else {
        return Ok(SortKey::CreatedAt);
    };
    match value.as_str() {
        Some("createdAt") => Ok(SortKey::CreatedAt),
        Some("respondent") => Ok(SortKey::Respondent),
        Some("age") => Ok(SortKey::Age),
        Some("academicPerformance") => Ok(SortKey::AcademicPerformance),
        Some("testResult") => Ok(SortKey::TestResult),
        _ => Err(
            "query.sortBy must be one of: createdAt, respondent, age, academicPerformance, testResult"
                .to_string(),
        ),
    }
}

fn parse_sort_dir(v: Option<&serde_json::Value>) -> Result<bool, String> {
    let Some(value) = v else {
        return Ok(false);
    };
    let Some(raw) = value.as_str() else {
        return Err("query.sortDir must be a string".to_string());
    };
    if raw.eq_ignore_ascii_case("asc") {
        Ok(false)
    } else if raw.eq_ignore_ascii_case("desc") {
        Ok(true)
    } else {
        Err("query.sortDir must be one of: asc, desc".to_string())
    }
}

fn parse_page(v: Option<&serde_json::Value>) -> Result<usize, String> {
    let Some(value) = v else {
        return Ok(1);
    };
    let Some(page) = value.as_u64() else {
        return Err("query.page must be a positive integer".to_string());
    };
    if page == 0 {
        return Err("query.page must be >= 1".to_string());
    }
    Ok(page as usize)
}

fn parse_page_size(v: Option<&serde_json::Value>) -> Result<usize, String> {
    let Some(value) = v else {
        return Ok(DEFAULT_PAGE_SIZE);
    };
    let Some(size) = value.as_u64() else {
        return Err("query.pageSize must be a positive integer".to_string());
    };
    if size == 0 || size as usize > MAX_PAGE_SIZE {
        return Err(format!("query.pageSize must be in range 1..={}", MAX_PAGE_SIZE));
    }
    Ok(size as usize)
}

pub fn parse_record_query(raw: Option<&serde_json::Value>) -> Result<RecordQuery, String> {
    let query = raw.and_then(|v| v.as_object()).cloned().unwrap_or_default();
    let filters = query
        .get("filters")
        .and_then(|v| v.as_object())
        .cloned()
        .unwrap_or_default();

    Ok(RecordQuery {
        search: parse_search(query.get("search"))?,
        sex: parse_filter(&filters, "sex")?,
        school_type: parse_filter(&filters, "schoolType")?,
        socio_economic_status: parse_filter(&filters, "socioEconomicStatus")?,
        study_habit: parse_filter(&filters, "studyHabit")?,
        sort_by: parse_sort_by(query.get("sortBy"))?,
        descending: parse_sort_dir(query.get("sortDir"))?,
        page: parse_page(query.get("page"))?,
        page_size: parse_page_size(query.get("pageSize"))?,
    })
}

fn filter_ok(filter: &Option<String>, value: &str) -> bool {
    filter.as_deref().map(|f| f == value).unwrap_or(true)
}

impl RecordQuery {
    pub fn matches(&self, r: &Record) -> bool {
        let search_ok = self
            .search
            .as_ref()
            .map(|s| r.respondent.to_lowercase().contains(s.as_str()))
            .unwrap_or(true);
        search_ok
            && filter_ok(&self.sex, &r.sex)
            && filter_ok(&self.school_type, &r.school_type)
            && filter_ok(&self.socio_economic_status, &r.socio_economic_status)
            && filter_ok(&self.study_habit, &r.study_habit)
    }
}

/// Absent numbers sort after present ones in either direction.
fn cmp_numeric(a: Option<f64>, b: Option<f64>, descending: bool) -> Ordering {
    match (a, b) {
        (Some(x), Some(y)) => {
            let o = x.partial_cmp(&y).unwrap_or(Ordering::Equal);
            if descending {
                o.reverse()
            } else {
                o
            }
        }
        (Some(_), None) => Ordering::Less,
        (None, Some(_)) => Ordering::Greater,
        (None, None) => Ordering::Equal,
    }
}

/// `records` must already be in store (creation) order.
pub fn apply_query(records: Vec<Record>, q: &RecordQuery) -> RecordPage {
    let total_count = records.len();
    let mut filtered: Vec<Record> = records.into_iter().filter(|r| q.matches(r)).collect();

    match q.sort_by {
        SortKey::CreatedAt => {
            if q.descending {
                filtered.reverse();
            }
        }
        SortKey::Respondent => {
            filtered.sort_by(|a, b| {
                let o = a.respondent.to_lowercase().cmp(&b.respondent.to_lowercase());
                if q.descending {
                    o.reverse()
                } else {
                    o
                }
            });
        }
        SortKey::Age => {
            filtered.sort_by(|a, b| cmp_numeric(NumericField::Age.value(a), NumericField::Age.value(b), q.descending));
        }
        SortKey::AcademicPerformance => {
            let f = NumericField::AcademicPerformance;
            filtered.sort_by(|a, b| cmp_numeric(f.value(a), f.value(b), q.descending));
        }
        SortKey::TestResult => {
            let f = NumericField::TestResult;
            filtered.sort_by(|a, b| cmp_numeric(f.value(a), f.value(b), q.descending));
        }
    }

    let filtered_count = filtered.len();
    let total_pages = filtered_count.div_ceil(q.page_size);
    let start = (q.page.saturating_sub(1)) * q.page_size;
    let rows = if start >= filtered_count {
        Vec::new()
    } else {
        let end = std::cmp::min(start + q.page_size, filtered_count);
        filtered.drain(start..end).collect()
    };

    RecordPage {
        rows,
        total_count,
        filtered_count,
        page: q.page,
        page_size: q.page_size,
        total_pages,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::record::RecordDraft;
    use serde_json::json;

    fn rec(i: usize, name: &str, sex: &str, test: Option<f64>) -> Record {
        RecordDraft {
            respondent: name.to_string(),
            sex: sex.to_string(),
            study_habit: if i % 2 == 0 { "Good" } else { "Poor" }.to_string(),
            test_result: test,
            ..RecordDraft::default()
        }
        .into_record(format!("id-{}", i), "2024-01-01T00:00:00Z")
    }

    fn sample() -> Vec<Record> {
        vec![
            rec(0, "Ana Cruz", "Female", Some(71.0)),
            rec(1, "Ben Diaz", "Male", None),
            rec(2, "Carla Reyes", "Female", Some(88.0)),
            rec(3, "dan cruz", "Male", Some(64.0)),
            rec(4, "Eve Santos", "Other", Some(92.0)),
            rec(5, "Fay Lim", "Female", Some(55.0)),
        ]
    }

    #[test]
    fn search_is_case_insensitive_substring() {
        let q = parse_record_query(Some(&json!({ "search": "  CRUZ " }))).expect("query");
        let page = apply_query(sample(), &q);
        assert_eq!(page.filtered_count, 2);
        assert_eq!(page.total_count, 6);
        assert_eq!(page.rows[0].respondent, "Ana Cruz");
    }

    #[test]
    fn filters_combine_and_all_means_no_filter() {
        let q = parse_record_query(Some(&json!({
            "filters": { "sex": "Female", "studyHabit": "Good", "schoolType": "ALL" }
        })))
        .expect("query");
        let page = apply_query(sample(), &q);
        let names: Vec<&str> = page.rows.iter().map(|r| r.respondent.as_str()).collect();
        assert_eq!(names, vec!["Ana Cruz", "Carla Reyes"]);
    }

    #[test]
    fn pagination_reports_total_pages() {
        let q = parse_record_query(Some(&json!({ "page": 2, "pageSize": 4 }))).expect("query");
        let page = apply_query(sample(), &q);
        assert_eq!(page.total_pages, 2);
        assert_eq!(page.rows.len(), 2);
        assert_eq!(page.rows[0].id, "id-4");

        let q = parse_record_query(Some(&json!({ "page": 9 }))).expect("query");
        assert!(apply_query(sample(), &q).rows.is_empty());
    }

    #[test]
    fn numeric_sort_puts_absent_last() {
        let q = parse_record_query(Some(&json!({
            "sortBy": "testResult", "sortDir": "desc", "pageSize": 10
        })))
        .expect("query");
        let page = apply_query(sample(), &q);
        let ids: Vec<&str> = page.rows.iter().map(|r| r.id.as_str()).collect();
        assert_eq!(ids, vec!["id-4", "id-2", "id-0", "id-3", "id-5", "id-1"]);
    }

    #[test]
    fn rejects_bad_paging_and_sort() {
        assert!(parse_record_query(Some(&json!({ "page": 0 }))).is_err());
        assert!(parse_record_query(Some(&json!({ "pageSize": 501 }))).is_err());
        assert!(parse_record_query(Some(&json!({ "sortBy": "sex" }))).is_err());
        assert!(parse_record_query(Some(&json!({ "sortDir": "up" }))).is_err());
        assert!(parse_record_query(Some(&json!({ "filters": { "sex": 1 } }))).is_err());
        assert_eq!(parse_record_query(None).expect("defaults"), RecordQuery::default());
    }
}
