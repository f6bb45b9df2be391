use crate::calc::{self, CourseStanding, GradeError, MarkingPeriod, RankedStudent};
use crate::store::{AssignmentScore, GradeStore};
use serde::Serialize;

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PipelineOutcome {
    pub course_id: String,
    pub student_id: String,
    pub marking_period: i64,
    pub period_average: Option<f64>,
    pub course_grade: Option<f64>,
    pub gpa: Option<f64>,
}

/// Mean percentage of the student's scored assignments in one period.
pub fn aggregate_period<S: GradeStore + ?Sized>(
    store: &S,
    course_id: &str,
    student_id: &str,
    period: MarkingPeriod,
) -> Result<f64, GradeError> {
    let mut scores = Vec::new();
    for assignment_id in store.fetch_assignment_ids_for_period(course_id, period)? {
        scores.extend(store.fetch_assignment_scores(course_id, &assignment_id, student_id)?);
    }
    calc::marking_period_average(scores)
}

/// Writes the slot, then recomputes the overall course grade from all six slots.
pub fn update_course_grade<S: GradeStore + ?Sized>(
    store: &S,
    course_id: &str,
    student_id: &str,
    period: MarkingPeriod,
    value: Option<f64>,
) -> Result<Option<f64>, GradeError> {
    store.write_marking_period_value(course_id, student_id, period, value)?;
    recompute_overall_grade(store, course_id, student_id)
}

pub fn recompute_overall_grade<S: GradeStore + ?Sized>(
    store: &S,
    course_id: &str,
    student_id: &str,
) -> Result<Option<f64>, GradeError> {
    let mut slots = Vec::with_capacity(MarkingPeriod::ALL.len());
    for p in MarkingPeriod::ALL {
        slots.push(store.read_marking_period_value(course_id, student_id, p)?);
    }
    let overall = calc::overall_course_grade(&slots);
    store.write_overall_course_grade(course_id, student_id, overall)?;
    Ok(overall)
}

pub fn course_standings<S: GradeStore + ?Sized>(
    store: &S,
    student_id: &str,
) -> Result<Vec<CourseStanding>, GradeError> {
    let course_ids = store.fetch_course_ids_for_student(student_id)?;
    let credits = store.fetch_credit_hours(&course_ids)?;
    let mut standings = Vec::with_capacity(credits.len());
    for c in credits {
        let overall_grade = store.read_overall_course_grade(&c.course_id, student_id)?;
        standings.push(CourseStanding {
            course_id: c.course_id,
            overall_grade,
            credit_hours: c.credit_hours,
        });
    }
    Ok(standings)
}

/// Recomputes and persists the student's GPA.
///
/// With no contributing courses the GPA is stored as unset and `None` is
/// returned.
pub fn recompute_gpa<S: GradeStore + ?Sized>(
    store: &S,
    student_id: &str,
) -> Result<Option<f64>, GradeError> {
    let standings = course_standings(store, student_id)?;
    let gpa = match calc::compute_gpa(&standings) {
        Ok(v) => Some(v),
        Err(GradeError::ZeroCreditHourTotal) => {
            tracing::debug!(student_id, "no graded credit hours; gpa left unset");
            None
        }
        Err(e) => return Err(e),
    };
    store.write_gpa(student_id, gpa)?;
    Ok(gpa)
}

pub fn record_score<S: GradeStore + ?Sized>(
    store: &S,
    score: &AssignmentScore,
) -> Result<(), GradeError> {
    store.replace_assignment_score(score)
}

/// Runs aggregation, slot update, course grade and GPA for one entry, in order.
pub fn recompute_for_entry<S: GradeStore + ?Sized>(
    store: &S,
    course_id: &str,
    student_id: &str,
    period: MarkingPeriod,
) -> Result<PipelineOutcome, GradeError> {
    let average = aggregate_period(store, course_id, student_id, period)?;
    tracing::debug!(course_id, student_id, period = period.index(), average, "period aggregated");
    run_from_slot(store, course_id, student_id, period, Some(average))
}

/// Like [`recompute_for_entry`], but a period with nothing left to average is
/// cleared instead of aborting.
pub fn refresh_after_removal<S: GradeStore + ?Sized>(
    store: &S,
    course_id: &str,
    student_id: &str,
    period: MarkingPeriod,
) -> Result<PipelineOutcome, GradeError> {
    let average = match aggregate_period(store, course_id, student_id, period) {
        Ok(v) => Some(v),
        Err(GradeError::NoScoredAssignments) => None,
        Err(e) => return Err(e),
    };
    run_from_slot(store, course_id, student_id, period, average)
}

fn run_from_slot<S: GradeStore + ?Sized>(
    store: &S,
    course_id: &str,
    student_id: &str,
    period: MarkingPeriod,
    average: Option<f64>,
) -> Result<PipelineOutcome, GradeError> {
    let course_grade = update_course_grade(store, course_id, student_id, period, average)?;
    tracing::debug!(course_id, student_id, ?course_grade, "course grade updated");
    let gpa = recompute_gpa(store, student_id)?;
    tracing::debug!(student_id, ?gpa, "gpa updated");
    Ok(PipelineOutcome {
        course_id: course_id.to_string(),
        student_id: student_id.to_string(),
        marking_period: period.index(),
        period_average: average,
        course_grade,
        gpa,
    })
}

/// Ranks a grade-level cohort and persists each student's rank.
pub fn rank_cohort<S: GradeStore + ?Sized>(
    store: &S,
    grade_level: i64,
) -> Result<Vec<RankedStudent>, GradeError> {
    let ranked = calc::assign_class_ranks(store.fetch_cohort(grade_level)?);
    for s in &ranked {
        store.write_class_rank(&s.student_id, s.class_rank)?;
    }
    Ok(ranked)
}
