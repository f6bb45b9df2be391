use serde::Serialize;
use std::cmp::Ordering;

#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum GradeError {
    #[error("student has no scored assignments in this marking period")]
    NoScoredAssignments,

    #[error("unknown marking period: {0} (expected 1..6)")]
    UnknownMarkingPeriod(i64),

    #[error("write to {target} affected no rows")]
    PersistenceWriteFailure { target: String },

    #[error("student has no course grades carrying credit hours")]
    ZeroCreditHourTotal,

    #[error("storage error: {0}")]
    Storage(String),
}

impl GradeError {
    pub fn code(&self) -> &'static str {
        match self {
            GradeError::NoScoredAssignments => "no_scored_assignments",
            GradeError::UnknownMarkingPeriod(_) => "unknown_marking_period",
            GradeError::PersistenceWriteFailure { .. } => "persistence_write_failed",
            GradeError::ZeroCreditHourTotal => "zero_credit_hour_total",
            GradeError::Storage(_) => "db_query_failed",
        }
    }

    pub fn write_failure(target: impl Into<String>) -> Self {
        GradeError::PersistenceWriteFailure {
            target: target.into(),
        }
    }
}

impl From<rusqlite::Error> for GradeError {
    fn from(e: rusqlite::Error) -> Self {
        GradeError::Storage(e.to_string())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "camelCase")]
pub enum MarkingPeriod {
    Mp1,
    Mp2,
    Mp3,
    Mp4,
    Midterm,
    Final,
}

impl MarkingPeriod {
    pub const ALL: [MarkingPeriod; 6] = [
        MarkingPeriod::Mp1,
        MarkingPeriod::Mp2,
        MarkingPeriod::Mp3,
        MarkingPeriod::Mp4,
        MarkingPeriod::Midterm,
        MarkingPeriod::Final,
    ];

    /// 1..4 are the quarters, 5 is the midterm exam and 6 the final exam.
    pub fn from_index(n: i64) -> Result<Self, GradeError> {
        match n {
            1 => Ok(MarkingPeriod::Mp1),
            2 => Ok(MarkingPeriod::Mp2),
            3 => Ok(MarkingPeriod::Mp3),
            4 => Ok(MarkingPeriod::Mp4),
            5 => Ok(MarkingPeriod::Midterm),
            6 => Ok(MarkingPeriod::Final),
            other => Err(GradeError::UnknownMarkingPeriod(other)),
        }
    }

    pub fn index(self) -> i64 {
        match self {
            MarkingPeriod::Mp1 => 1,
            MarkingPeriod::Mp2 => 2,
            MarkingPeriod::Mp3 => 3,
            MarkingPeriod::Mp4 => 4,
            MarkingPeriod::Midterm => 5,
            MarkingPeriod::Final => 6,
        }
    }

    /// Column of `course_grades` holding this slot.
    pub fn column(self) -> &'static str {
        match self {
            MarkingPeriod::Mp1 => "mp1",
            MarkingPeriod::Mp2 => "mp2",
            MarkingPeriod::Mp3 => "mp3",
            MarkingPeriod::Mp4 => "mp4",
            MarkingPeriod::Midterm => "midterm_exam",
            MarkingPeriod::Final => "final_exam",
        }
    }

    pub fn is_midterm(self) -> bool {
        self == MarkingPeriod::Midterm
    }

    pub fn is_final(self) -> bool {
        self == MarkingPeriod::Final
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ScoreRatio {
    pub points_earned: f64,
    pub points_possible: f64,
}

/// Rounds `numer / denom` tenths half-up at the 0.01 unit.
///
/// Works on the exact integer ratio so decimal midpoints such as 2.425 never
/// slip below the rounding boundary.
fn hundredths_half_up(numer: i64, denom: i64) -> f64 {
    ((20 * numer + denom).div_euclid(2 * denom)) as f64 / 100.0
}

/// Mean of `earned / possible * 100` over every scored assignment.
///
/// Rows with a non-positive `points_possible` carry no ratio and are skipped.
pub fn marking_period_average<I>(scores: I) -> Result<f64, GradeError>
where
    I: IntoIterator<Item = ScoreRatio>,
{
    let mut total = 0.0_f64;
    let mut count: usize = 0;
    for s in scores {
        if s.points_possible <= 0.0 {
            continue;
        }
        total += 100.0 * s.points_earned / s.points_possible;
        count += 1;
    }
    if count == 0 {
        return Err(GradeError::NoScoredAssignments);
    }
    Ok(total / (count as f64))
}

/// Average of the set slots; `None` when every slot is unset.
pub fn overall_course_grade(slots: &[Option<f64>]) -> Option<f64> {
    let set: Vec<f64> = slots.iter().flatten().copied().collect();
    if set.is_empty() {
        return None;
    }
    Some(set.iter().sum::<f64>() / (set.len() as f64))
}

// Points are held in tenths so GPA sums stay exact.
const FOUR_POINT_SCALE: [(f64, i64); 10] = [
    (93.0, 40),
    (90.0, 37),
    (87.0, 33),
    (83.0, 30),
    (80.0, 27),
    (77.0, 23),
    (73.0, 20),
    (70.0, 17),
    (67.0, 13),
    (65.0, 10),
];

fn scale_tenths(percent: f64) -> i64 {
    FOUR_POINT_SCALE
        .iter()
        .find(|(floor, _)| percent >= *floor)
        .map(|(_, tenths)| *tenths)
        .unwrap_or(0)
}

/// Maps a course percentage onto the 4.0 scale (inclusive lower bounds).
pub fn four_point_scale(percent: f64) -> f64 {
    scale_tenths(percent) as f64 / 10.0
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CourseStanding {
    pub course_id: String,
    pub overall_grade: Option<f64>,
    pub credit_hours: i64,
}

/// Credit-hour-weighted mean of 4.0-scale points, rounded to 2 decimals.
///
/// Courses without an overall grade are excluded from both sums.
pub fn compute_gpa(standings: &[CourseStanding]) -> Result<f64, GradeError> {
    let mut weighted_tenths: i64 = 0;
    let mut hours: i64 = 0;
    for s in standings {
        let Some(grade) = s.overall_grade else {
            continue;
        };
        weighted_tenths += scale_tenths(grade) * s.credit_hours;
        hours += s.credit_hours;
    }
    if hours <= 0 {
        return Err(GradeError::ZeroCreditHourTotal);
    }
    Ok(hundredths_half_up(weighted_tenths, hours))
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RankedStudent {
    pub student_id: String,
    pub first_name: String,
    pub last_name: String,
    pub grade_level: i64,
    pub gpa: Option<f64>,
    pub class_rank: i64,
}

impl RankedStudent {
    pub fn display_name(&self) -> String {
        format!("{}, {}", self.last_name, self.first_name)
    }
}

/// Orders the cohort by GPA descending and hands out 1-based ranks.
///
/// The sort is stable, so equal GPAs keep their input order and still each
/// take the next rank. Students without a GPA sort last with rank 0 and do
/// not advance the counter.
pub fn assign_class_ranks(mut students: Vec<RankedStudent>) -> Vec<RankedStudent> {
    students.sort_by(|a, b| b.gpa.partial_cmp(&a.gpa).unwrap_or(Ordering::Equal));

    let mut rank = 1_i64;
    for s in students.iter_mut() {
        if s.gpa.is_some() {
            s.class_rank = rank;
            rank += 1;
        } else {
            s.class_rank = 0;
        }
    }
    students
}

/// Console rendering of a GPA: two decimals, or `--` when unset.
pub fn gpa_display(gpa: Option<f64>) -> String {
    match gpa {
        Some(v) => format!("{:.2}", v),
        None => "--".to_string(),
    }
}
