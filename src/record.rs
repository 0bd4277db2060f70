use serde::{Deserialize, Serialize};

/// One respondent's NAT survey row as held by the store.
///
/// Categorical fields are kept as strings: values that arrive through CSV
/// import may fall outside the known options and are stored verbatim.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Record {
    pub id: String,
    pub respondent: String,
    pub age: Option<i64>,
    pub sex: String,
    pub ethnic_group: String,
    pub academic_performance: Option<f64>,
    pub academic_description: String,
    pub iq_band: String,
    pub school_type: String,
    pub socio_economic_status: String,
    pub study_habit: String,
    pub test_result: Option<f64>,
    #[serde(default)]
    pub created_at: String,
    #[serde(default)]
    pub updated_at: String,
}

/// Record contents before the store has assigned an id.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RecordDraft {
    pub respondent: String,
    pub age: Option<i64>,
    pub sex: String,
    pub ethnic_group: String,
    pub academic_performance: Option<f64>,
    pub academic_description: String,
    pub iq_band: String,
    pub school_type: String,
    pub socio_economic_status: String,
    pub study_habit: String,
    pub test_result: Option<f64>,
}

impl RecordDraft {
    pub fn into_record(self, id: String, timestamp: &str) -> Record {
        Record {
            id,
            respondent: self.respondent,
            age: self.age,
            sex: self.sex,
            ethnic_group: self.ethnic_group,
            academic_performance: self.academic_performance,
            academic_description: self.academic_description,
            iq_band: self.iq_band,
            school_type: self.school_type,
            socio_economic_status: self.socio_economic_status,
            study_habit: self.study_habit,
            test_result: self.test_result,
            created_at: timestamp.to_string(),
            updated_at: timestamp.to_string(),
        }
    }
}

/// Lowercase and drop separators so `Below poverty line`, `BelowPovertyLine`
/// and `below_poverty_line` compare equal.
fn compact_key(s: &str) -> String {
    s.chars()
        .filter(|c| !c.is_whitespace() && *c != '_' && *c != '-')
        .flat_map(|c| c.to_lowercase())
        .collect()
}

macro_rules! label_enum {
    ($name:ident { $($variant:ident => $label:expr),+ $(,)? }) => {
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
        pub enum $name {
            $($variant),+
        }

        impl $name {
            pub const ALL: &'static [$name] = &[$($name::$variant),+];

            pub fn as_str(self) -> &'static str {
                match self {
                    $($name::$variant => $label),+
                }
            }

            pub fn parse(raw: &str) -> Option<Self> {
                let key = compact_key(raw);
                if key.is_empty() {
                    return None;
                }
                Self::ALL
                    .iter()
                    .copied()
                    .find(|v| compact_key(v.as_str()) == key)
            }

            pub fn labels() -> Vec<String> {
                Self::ALL.iter().map(|v| v.as_str().to_string()).collect()
            }
        }
    };
}

label_enum!(Sex {
    Male => "Male",
    Female => "Female",
    Other => "Other",
});

label_enum!(IqBand {
    High => "High",
    Low => "Low",
});

label_enum!(SchoolType {
    Public => "Public",
    Private => "Private",
    Charter => "Charter",
    HomeSchooling => "Home Schooling",
});

label_enum!(SocioEconomicStatus {
    BelowPovertyLine => "Below poverty line",
    OnPovertyLine => "On poverty line",
    AbovePovertyLine => "Above poverty line",
});

pub const STUDY_HABITS: &[&str] = &["Good", "Poor", "Excellent"];

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NumericField {
    Age,
    AcademicPerformance,
    TestResult,
}

impl NumericField {
    pub fn parse(raw: &str) -> Option<Self> {
        match raw.trim() {
            "age" => Some(NumericField::Age),
            "academicPerformance" => Some(NumericField::AcademicPerformance),
            "testResult" | "natResults" => Some(NumericField::TestResult),
            _ => None,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            NumericField::Age => "age",
            NumericField::AcademicPerformance => "academicPerformance",
            NumericField::TestResult => "testResult",
        }
    }

    /// The field's value when present and finite.
    pub fn value(self, r: &Record) -> Option<f64> {
        let v = match self {
            NumericField::Age => r.age.map(|a| a as f64),
            NumericField::AcademicPerformance => r.academic_performance,
            NumericField::TestResult => r.test_result,
        };
        v.filter(|x| x.is_finite())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CategoryField {
    Respondent,
    Sex,
    EthnicGroup,
    AcademicDescription,
    IqBand,
    SchoolType,
    SocioEconomicStatus,
    StudyHabit,
}

impl CategoryField {
    pub fn parse(raw: &str) -> Option<Self> {
        match raw.trim() {
            "respondent" => Some(CategoryField::Respondent),
            "sex" => Some(CategoryField::Sex),
            "ethnicGroup" => Some(CategoryField::EthnicGroup),
            "academicDescription" => Some(CategoryField::AcademicDescription),
            "iqBand" => Some(CategoryField::IqBand),
            "schoolType" => Some(CategoryField::SchoolType),
            "socioEconomicStatus" => Some(CategoryField::SocioEconomicStatus),
            "studyHabit" => Some(CategoryField::StudyHabit),
            _ => None,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            CategoryField::Respondent => "respondent",
            CategoryField::Sex => "sex",
            CategoryField::EthnicGroup => "ethnicGroup",
            CategoryField::AcademicDescription => "academicDescription",
            CategoryField::IqBand => "iqBand",
            CategoryField::SchoolType => "schoolType",
            CategoryField::SocioEconomicStatus => "socioEconomicStatus",
            CategoryField::StudyHabit => "studyHabit",
        }
    }

    pub fn value(self, r: &Record) -> &str {
        match self {
            CategoryField::Respondent => &r.respondent,
            CategoryField::Sex => &r.sex,
            CategoryField::EthnicGroup => &r.ethnic_group,
            CategoryField::AcademicDescription => &r.academic_description,
            CategoryField::IqBand => &r.iq_band,
            CategoryField::SchoolType => &r.school_type,
            CategoryField::SocioEconomicStatus => &r.socio_economic_status,
            CategoryField::StudyHabit => &r.study_habit,
        }
    }
}

/// Numeric coercion shared by the form and CSV paths.
/// Empty strings, text, null and non-finite numbers are treated as absent.
pub fn coerce_number(v: &serde_json::Value) -> Option<f64> {
    match v {
        serde_json::Value::Number(n) => n.as_f64().filter(|x| x.is_finite()),
        serde_json::Value::String(s) => coerce_number_str(s),
        _ => None,
    }
}

pub fn coerce_number_str(s: &str) -> Option<f64> {
    let t = s.trim();
    if t.is_empty() {
        return None;
    }
    t.parse::<f64>().ok().filter(|x| x.is_finite())
}

/// Ages must be whole and non-negative; `12.0` is accepted, `12.5` is not.
pub fn coerce_age(v: f64) -> Option<i64> {
    if v < 0.0 || v.fract() != 0.0 || v > i64::MAX as f64 {
        return None;
    }
    Some(v as i64)
}
