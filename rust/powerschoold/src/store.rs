use crate::calc::{GradeError, MarkingPeriod, RankedStudent, ScoreRatio};
use chrono::Utc;
use rusqlite::{Connection, OptionalExtension};

#[derive(Debug, Clone, PartialEq)]
pub struct AssignmentScore {
    pub course_id: String,
    pub assignment_id: String,
    pub student_id: String,
    pub points_earned: f64,
    pub points_possible: f64,
    pub is_graded: bool,
}

#[derive(Debug, Clone, PartialEq)]
pub struct CourseCredit {
    pub course_id: String,
    pub credit_hours: i64,
}

/// Data access used by the grade pipeline.
///
/// `None` stands for an unset grade or GPA everywhere.
pub trait GradeStore {
    fn fetch_assignment_scores(
        &self,
        course_id: &str,
        assignment_id: &str,
        student_id: &str,
    ) -> Result<Vec<ScoreRatio>, GradeError>;

    fn fetch_assignment_ids_for_period(
        &self,
        course_id: &str,
        period: MarkingPeriod,
    ) -> Result<Vec<String>, GradeError>;

    /// Deletes any existing score for (assignment, student) and inserts this one.
    fn replace_assignment_score(&self, score: &AssignmentScore) -> Result<(), GradeError>;

    fn write_marking_period_value(
        &self,
        course_id: &str,
        student_id: &str,
        period: MarkingPeriod,
        value: Option<f64>,
    ) -> Result<(), GradeError>;

    fn read_marking_period_value(
        &self,
        course_id: &str,
        student_id: &str,
        period: MarkingPeriod,
    ) -> Result<Option<f64>, GradeError>;

    fn write_overall_course_grade(
        &self,
        course_id: &str,
        student_id: &str,
        value: Option<f64>,
    ) -> Result<(), GradeError>;

    fn read_overall_course_grade(
        &self,
        course_id: &str,
        student_id: &str,
    ) -> Result<Option<f64>, GradeError>;

    fn fetch_course_ids_for_student(&self, student_id: &str) -> Result<Vec<String>, GradeError>;

    /// One record per requested course, in request order.
    fn fetch_credit_hours(&self, course_ids: &[String]) -> Result<Vec<CourseCredit>, GradeError>;

    fn write_gpa(&self, student_id: &str, value: Option<f64>) -> Result<(), GradeError>;

    fn fetch_cohort(&self, grade_level: i64) -> Result<Vec<RankedStudent>, GradeError>;

    fn write_class_rank(&self, student_id: &str, rank: i64) -> Result<(), GradeError>;
}

pub struct SqliteGradeStore<'a> {
    conn: &'a Connection,
}

impl<'a> SqliteGradeStore<'a> {
    pub fn new(conn: &'a Connection) -> Self {
        Self { conn }
    }
}

fn expect_rows(changed: usize, target: &str) -> Result<(), GradeError> {
    if changed == 0 {
        tracing::warn!(target_table = target, "write affected no rows");
        return Err(GradeError::write_failure(target));
    }
    Ok(())
}

impl GradeStore for SqliteGradeStore<'_> {
    fn fetch_assignment_scores(
        &self,
        course_id: &str,
        assignment_id: &str,
        student_id: &str,
    ) -> Result<Vec<ScoreRatio>, GradeError> {
        let mut stmt = self.conn.prepare(
            "SELECT points_earned, points_possible
             FROM assignment_grades
             WHERE course_id = ? AND assignment_id = ? AND student_id = ? AND is_graded = 1",
        )?;
        let rows = stmt
            .query_map((course_id, assignment_id, student_id), |r| {
                Ok(ScoreRatio {
                    points_earned: r.get(0)?,
                    points_possible: r.get(1)?,
                })
            })?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(rows)
    }

    fn fetch_assignment_ids_for_period(
        &self,
        course_id: &str,
        period: MarkingPeriod,
    ) -> Result<Vec<String>, GradeError> {
        let mut stmt = self.conn.prepare(
            "SELECT id FROM assignments
             WHERE course_id = ? AND marking_period = ?
             ORDER BY rowid",
        )?;
        let ids = stmt
            .query_map((course_id, period.index()), |r| r.get::<_, String>(0))?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(ids)
    }

    fn replace_assignment_score(&self, score: &AssignmentScore) -> Result<(), GradeError> {
        self.conn.execute(
            "DELETE FROM assignment_grades WHERE assignment_id = ? AND student_id = ?",
            (&score.assignment_id, &score.student_id),
        )?;
        let inserted = self.conn.execute(
            "INSERT INTO assignment_grades(
               course_id, assignment_id, student_id, points_earned, points_possible, is_graded, entered_at
             ) VALUES(?, ?, ?, ?, ?, ?, ?)",
            (
                &score.course_id,
                &score.assignment_id,
                &score.student_id,
                score.points_earned,
                score.points_possible,
                score.is_graded as i64,
                Utc::now().to_rfc3339(),
            ),
        )?;
        expect_rows(inserted, "assignment_grades")
    }

    fn write_marking_period_value(
        &self,
        course_id: &str,
        student_id: &str,
        period: MarkingPeriod,
        value: Option<f64>,
    ) -> Result<(), GradeError> {
        let sql = format!(
            "UPDATE course_grades SET {} = ?, updated_at = ? WHERE course_id = ? AND student_id = ?",
            period.column()
        );
        let changed = self.conn.execute(
            &sql,
            (value, Utc::now().to_rfc3339(), course_id, student_id),
        )?;
        expect_rows(changed, "course_grades")
    }

    fn read_marking_period_value(
        &self,
        course_id: &str,
        student_id: &str,
        period: MarkingPeriod,
    ) -> Result<Option<f64>, GradeError> {
        let sql = format!(
            "SELECT {} FROM course_grades WHERE course_id = ? AND student_id = ?",
            period.column()
        );
        let value: Option<Option<f64>> = self
            .conn
            .query_row(&sql, (course_id, student_id), |r| r.get(0))
            .optional()?;
        Ok(value.flatten())
    }

    fn write_overall_course_grade(
        &self,
        course_id: &str,
        student_id: &str,
        value: Option<f64>,
    ) -> Result<(), GradeError> {
        let changed = self.conn.execute(
            "UPDATE course_grades SET grade = ?, updated_at = ? WHERE course_id = ? AND student_id = ?",
            (value, Utc::now().to_rfc3339(), course_id, student_id),
        )?;
        expect_rows(changed, "course_grades")
    }

    fn read_overall_course_grade(
        &self,
        course_id: &str,
        student_id: &str,
    ) -> Result<Option<f64>, GradeError> {
        let value: Option<Option<f64>> = self
            .conn
            .query_row(
                "SELECT grade FROM course_grades WHERE course_id = ? AND student_id = ?",
                (course_id, student_id),
                |r| r.get(0),
            )
            .optional()?;
        Ok(value.flatten())
    }

    fn fetch_course_ids_for_student(&self, student_id: &str) -> Result<Vec<String>, GradeError> {
        let mut stmt = self.conn.prepare(
            "SELECT course_id FROM course_grades WHERE student_id = ? ORDER BY rowid",
        )?;
        let ids = stmt
            .query_map([student_id], |r| r.get::<_, String>(0))?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(ids)
    }

    fn fetch_credit_hours(&self, course_ids: &[String]) -> Result<Vec<CourseCredit>, GradeError> {
        let mut stmt = self
            .conn
            .prepare("SELECT credit_hours FROM courses WHERE id = ?")?;
        let mut out = Vec::with_capacity(course_ids.len());
        for id in course_ids {
            let hours: Option<i64> = stmt.query_row([id], |r| r.get(0)).optional()?;
            out.push(CourseCredit {
                course_id: id.clone(),
                credit_hours: hours.unwrap_or(0),
            });
        }
        Ok(out)
    }

    fn write_gpa(&self, student_id: &str, value: Option<f64>) -> Result<(), GradeError> {
        let changed = self
            .conn
            .execute("UPDATE students SET gpa = ? WHERE id = ?", (value, student_id))?;
        expect_rows(changed, "students")
    }

    fn fetch_cohort(&self, grade_level: i64) -> Result<Vec<RankedStudent>, GradeError> {
        let mut stmt = self.conn.prepare(
            "SELECT id, first_name, last_name, grade_level, gpa, class_rank
             FROM students
             WHERE grade_level = ?
             ORDER BY last_name, first_name",
        )?;
        let rows = stmt
            .query_map([grade_level], |r| {
                Ok(RankedStudent {
                    student_id: r.get(0)?,
                    first_name: r.get(1)?,
                    last_name: r.get(2)?,
                    grade_level: r.get(3)?,
                    gpa: r.get(4)?,
                    class_rank: r.get(5)?,
                })
            })?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(rows)
    }

    fn write_class_rank(&self, student_id: &str, rank: i64) -> Result<(), GradeError> {
        let changed = self.conn.execute(
            "UPDATE students SET class_rank = ? WHERE id = ?",
            (rank, student_id),
        )?;
        expect_rows(changed, "students")
    }
}
