use crate::record::{
    coerce_age, coerce_number_str, IqBand, RecordDraft, SchoolType, Sex, SocioEconomicStatus,
};
use serde_json::json;
use std::collections::HashMap;

pub const COL_RESPONDENT: &str = "Respondents";
pub const COL_AGE: &str = "Age";
pub const COL_SEX: &str = "sex";
pub const COL_ETHNIC: &str = "Ethnic";
// Header spellings below match the survey export as-is.
pub const COL_ACADEMIC_PERFORMANCE: &str = "academic_perfromance";
pub const COL_ACADEMIC_DESCRIPTION: &str = "adamemic_description";
pub const COL_IQ: &str = "IQ";
pub const COL_SCHOOL_TYPE: &str = "type_school";
pub const COL_SES: &str = "socio_economic_status";
pub const COL_STUDY_HABIT: &str = "Study_Habit";
pub const COL_NAT_RESULTS: &str = "NAT_Results";

pub const MAPPED_COLUMNS: &[&str] = &[
    COL_RESPONDENT,
    COL_AGE,
    COL_SEX,
    COL_ETHNIC,
    COL_ACADEMIC_PERFORMANCE,
    COL_ACADEMIC_DESCRIPTION,
    COL_IQ,
    COL_SCHOOL_TYPE,
    COL_SES,
    COL_STUDY_HABIT,
    COL_NAT_RESULTS,
];

pub const EMPTY_IMPORT_MESSAGE: &str = "No valid data found to upload.";

#[derive(Debug, Clone, Default)]
pub struct ParsedCsv {
    pub rows: Vec<RecordDraft>,
    pub warnings: Vec<serde_json::Value>,
    pub total_lines: usize,
}

/// One CSV record and the 1-based line it starts on.
#[derive(Debug, Clone, PartialEq)]
pub struct CsvRow {
    pub line: usize,
    pub fields: Vec<String>,
    /// Input ended inside a quoted field.
    pub unterminated: bool,
}

impl CsvRow {
    fn is_blank(&self) -> bool {
        self.fields.iter().all(|f| f.trim().is_empty())
    }
}

/// Split CSV text into records. Quoted fields may span line breaks and use
/// `""` for a literal quote; CRLF and LF both end a record.
pub fn read_csv_rows(text: &str) -> Vec<CsvRow> {
    let text = text.strip_prefix('\u{feff}').unwrap_or(text);
    let mut rows = Vec::new();
    let mut fields: Vec<String> = Vec::new();
    let mut buf = String::new();
    let mut in_quotes = false;
    let mut line = 1usize;
    let mut row_start = 1usize;
    let mut chars = text.chars().peekable();

    while let Some(ch) = chars.next() {
        match ch {
            '"' if in_quotes && chars.peek() == Some(&'"') => {
                chars.next();
                buf.push('"');
            }
            '"' => in_quotes = !in_quotes,
            '\r' if chars.peek() == Some(&'\n') => {}
            '\n' if in_quotes => {
                buf.push('\n');
                line += 1;
            }
            '\n' => {
                fields.push(std::mem::take(&mut buf));
                rows.push(CsvRow {
                    line: row_start,
                    fields: std::mem::take(&mut fields),
                    unterminated: false,
                });
                line += 1;
                row_start = line;
            }
            ',' if !in_quotes => fields.push(std::mem::take(&mut buf)),
            _ => buf.push(ch),
        }
    }
    if !buf.is_empty() || !fields.is_empty() || in_quotes {
        fields.push(buf);
        rows.push(CsvRow {
            line: row_start,
            fields,
            unterminated: in_quotes,
        });
    }
    rows
}

struct RowReader<'a> {
    fields: Vec<String>,
    idx: &'a HashMap<&'static str, usize>,
    line: usize,
    warnings: &'a mut Vec<serde_json::Value>,
}

impl RowReader<'_> {
    fn text(&self, col: &str) -> String {
        self.idx
            .get(col)
            .and_then(|i| self.fields.get(*i))
            .map(|s| s.trim().to_string())
            .unwrap_or_default()
    }

    fn number(&mut self, col: &str) -> Option<f64> {
        let raw = self.text(col);
        if raw.is_empty() {
            return None;
        }
        let v = coerce_number_str(&raw);
        if v.is_none() {
            self.warnings.push(json!({
                "line": self.line,
                "code": "bad_number",
                "message": format!("{} is not a number", col),
                "value": raw,
            }));
        }
        v
    }

    fn age(&mut self) -> Option<i64> {
        let v = self.number(COL_AGE)?;
        let age = coerce_age(v);
        if age.is_none() {
            self.warnings.push(json!({
                "line": self.line,
                "code": "bad_number",
                "message": "Age must be a whole non-negative number",
                "value": v,
            }));
        }
        age
    }

    fn category(&mut self, col: &str, parse: fn(&str) -> Option<&'static str>) -> String {
        let raw = self.text(col);
        if raw.is_empty() {
            return raw;
        }
        match parse(&raw) {
            Some(canonical) => canonical.to_string(),
            None => {
                self.warnings.push(json!({
                    "line": self.line,
                    "code": "unknown_category",
                    "message": format!("{} value is not a known option; kept as-is", col),
                    "value": raw,
                }));
                raw
            }
        }
    }
}

/// Translate CSV text with a header row into record drafts.
pub fn parse_nat_csv(text: &str) -> ParsedCsv {
    let mut out = ParsedCsv::default();
    let mut rows = read_csv_rows(text).into_iter().filter(|r| !r.is_blank());
    let Some(header) = rows.next() else {
        return out;
    };

    let header_fields: Vec<String> = header.fields.iter().map(|s| s.trim().to_string()).collect();
    let mut idx: HashMap<&'static str, usize> = HashMap::new();
    for &col in MAPPED_COLUMNS {
        match header_fields.iter().position(|h| h == col) {
            Some(i) => {
                idx.insert(col, i);
            }
            None => out.warnings.push(json!({
                "line": header.line,
                "code": "missing_column",
                "message": format!("header has no {} column", col),
            })),
        }
    }

    for row in rows {
        out.total_lines += 1;
        if row.unterminated {
            out.warnings.push(json!({
                "line": row.line,
                "code": "unterminated_quote",
                "message": "quoted field is not closed before end of input",
            }));
        }
        let mut reader = RowReader {
            fields: row.fields,
            idx: &idx,
            line: row.line,
            warnings: &mut out.warnings,
        };

        let draft = RecordDraft {
            respondent: reader.text(COL_RESPONDENT),
            age: reader.age(),
            sex: reader.category(COL_SEX, |s| Sex::parse(s).map(Sex::as_str)),
            ethnic_group: reader.text(COL_ETHNIC),
            academic_performance: reader.number(COL_ACADEMIC_PERFORMANCE),
            academic_description: reader.text(COL_ACADEMIC_DESCRIPTION),
            iq_band: reader.category(COL_IQ, |s| IqBand::parse(s).map(IqBand::as_str)),
            school_type: reader.category(COL_SCHOOL_TYPE, |s| {
                SchoolType::parse(s).map(SchoolType::as_str)
            }),
            socio_economic_status: reader.category(COL_SES, |s| {
                SocioEconomicStatus::parse(s).map(SocioEconomicStatus::as_str)
            }),
            study_habit: reader.text(COL_STUDY_HABIT),
            test_result: reader.number(COL_NAT_RESULTS),
        };
        out.rows.push(draft);
    }

    out
}

#[cfg(test)]
mod tests {
    use super::*;

    const HEADER: &str = "Respondents,Age,sex,Ethnic,academic_perfromance,adamemic_description,IQ,type_school,socio_economic_status,Study_Habit,NAT_Results";

    #[test]
    fn maps_columns_and_coerces_numbers() {
        let text = format!(
            "{}\nStudent 1,14,Male,Tagalog,85,Very Satisfactory,High,Public,Below poverty line,Good,72\n",
            HEADER
        );
        let parsed = parse_nat_csv(&text);
        assert_eq!(parsed.total_lines, 1);
        assert!(parsed.warnings.is_empty(), "{:?}", parsed.warnings);
        let r = &parsed.rows[0];
        assert_eq!(r.respondent, "Student 1");
        assert_eq!(r.age, Some(14));
        assert_eq!(r.academic_performance, Some(85.0));
        assert_eq!(r.academic_description, "Very Satisfactory");
        assert_eq!(r.socio_economic_status, "Below poverty line");
        assert_eq!(r.test_result, Some(72.0));
    }

    #[test]
    fn quoted_fields_and_reordered_columns() {
        let text = "NAT_Results,Respondents,adamemic_description,Age,sex,Ethnic,academic_perfromance,IQ,type_school,socio_economic_status,Study_Habit\r\n\
                    66,\"Cruz, Ana\",\"Says \"\"fair\"\"\",15,female,Ilocano,79,low,HomeSchooling,OnPovertyLine,Poor\r\n";
        let parsed = parse_nat_csv(text);
        let r = &parsed.rows[0];
        assert_eq!(r.respondent, "Cruz, Ana");
        assert_eq!(r.academic_description, "Says \"fair\"");
        assert_eq!(r.sex, "Female");
        assert_eq!(r.iq_band, "Low");
        assert_eq!(r.school_type, "Home Schooling");
        assert_eq!(r.socio_economic_status, "On poverty line");
        assert_eq!(r.test_result, Some(66.0));
    }

    #[test]
    fn bad_values_become_absent_with_warnings() {
        let text = format!(
            "{}\nStudent 2,abc,Unknown,X,,Fair,High,Public,Rich,Good,n/a\n\nStudent 3,12.5,Male,X,90,Good,High,Public,On poverty line,Good,91\n",
            HEADER
        );
        let parsed = parse_nat_csv(&text);
        assert_eq!(parsed.total_lines, 2);
        assert_eq!(parsed.rows.len(), 2);
        let r = &parsed.rows[0];
        assert_eq!(r.age, None);
        assert_eq!(r.academic_performance, None);
        assert_eq!(r.test_result, None);
        assert_eq!(r.sex, "Unknown");
        assert_eq!(r.socio_economic_status, "Rich");
        assert_eq!(parsed.rows[1].age, None);

        let codes: Vec<&str> = parsed
            .warnings
            .iter()
            .filter_map(|w| w.get("code").and_then(|v| v.as_str()))
            .collect();
        assert_eq!(
            codes,
            vec![
                "bad_number",
                "unknown_category",
                "unknown_category",
                "bad_number",
                "bad_number"
            ]
        );
        assert_eq!(parsed.warnings[4].get("line").and_then(|v| v.as_u64()), Some(4));
    }

    #[test]
    fn header_only_or_empty_text_yields_no_rows() {
        assert!(parse_nat_csv("").rows.is_empty());
        assert!(parse_nat_csv(&format!("{}\n\n", HEADER)).rows.is_empty());
    }

    #[test]
    fn missing_columns_are_reported_once() {
        let parsed = parse_nat_csv("Respondents,NAT_Results\nA,50\n");
        assert_eq!(parsed.rows[0].test_result, Some(50.0));
        assert_eq!(parsed.rows[0].age, None);
        let missing = parsed
            .warnings
            .iter()
            .filter(|w| w.get("code").and_then(|v| v.as_str()) == Some("missing_column"))
            .count();
        assert_eq!(missing, MAPPED_COLUMNS.len() - 2);
    }

    #[test]
    fn quoted_newline_stays_in_one_row() {
        let text = format!(
            "{}\r\nStudent 1,14,Male,Tagalog,85,\"line one\r\nline two\",High,Public,Below poverty line,Good,72\r\nStudent 2,15,Female,X,90,Good,Low,Private,On poverty line,Poor,88\r\n",
            HEADER
        );
        let parsed = parse_nat_csv(&text);
        assert_eq!(parsed.total_lines, 2);
        assert_eq!(parsed.rows.len(), 2);
        assert!(parsed.warnings.is_empty(), "{:?}", parsed.warnings);
        assert_eq!(parsed.rows[0].academic_description, "line one\nline two");
        assert_eq!(parsed.rows[0].test_result, Some(72.0));
        assert_eq!(parsed.rows[1].respondent, "Student 2");
    }

    #[test]
    fn rows_report_their_starting_line() {
        let rows = read_csv_rows("a,b\n\"x\ny\",1\nz,2");
        let lines: Vec<usize> = rows.iter().map(|r| r.line).collect();
        assert_eq!(lines, vec![1, 2, 4]);
        assert_eq!(rows[2].fields, vec!["z", "2"]);
    }

    #[test]
    fn unclosed_quote_is_flagged() {
        let text = format!(
            "{}\nStudent 1,14,Male,X,85,\"never closed,High,Public,Below poverty line,Good,72\n",
            HEADER
        );
        let parsed = parse_nat_csv(&text);
        assert_eq!(parsed.rows.len(), 1);
        assert_eq!(
            parsed.warnings[0].get("code").and_then(|v| v.as_str()),
            Some("unterminated_quote")
        );
        assert_eq!(parsed.warnings[0].get("line").and_then(|v| v.as_u64()), Some(2));
    }
}
