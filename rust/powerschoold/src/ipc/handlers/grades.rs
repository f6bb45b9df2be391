use crate::calc::MarkingPeriod;
use crate::ipc::error::{err, grade_err, ok};
use crate::ipc::helpers::{db_conn, required_str};
use crate::ipc::types::{AppState, Request};
use crate::pipeline;
use crate::store::{AssignmentScore, SqliteGradeStore};
use rusqlite::OptionalExtension;
use serde_json::json;

struct AssignmentRow {
    course_id: String,
    marking_period: i64,
    point_value: i64,
}

fn handle_grades_get(state: &mut AppState, req: &Request) -> serde_json::Value {
    let conn = match db_conn(state, req) {
        Ok(c) => c,
        Err(resp) => return resp,
    };
    let assignment_id = match required_str(req, "assignmentId") {
        Ok(v) => v,
        Err(resp) => return resp,
    };
    let student_id = match required_str(req, "studentId") {
        Ok(v) => v,
        Err(resp) => return resp,
    };

    let row: Option<(f64, f64)> = match conn
        .query_row(
            "SELECT points_earned, points_possible FROM assignment_grades
             WHERE assignment_id = ? AND student_id = ?",
            (&assignment_id, &student_id),
            |r| Ok((r.get(0)?, r.get(1)?)),
        )
        .optional()
    {
        Ok(v) => v,
        Err(e) => return err(&req.id, "db_query_failed", e.to_string(), None),
    };

    let grade = row.map(|(earned, possible)| {
        json!({
            "pointsEarned": earned,
            "pointsPossible": possible
        })
    });
    ok(
        &req.id,
        json!({
            "assignmentId": assignment_id,
            "studentId": student_id,
            "grade": grade
        }),
    )
}

fn handle_grades_enter(state: &mut AppState, req: &Request) -> serde_json::Value {
    let conn = match db_conn(state, req) {
        Ok(c) => c,
        Err(resp) => return resp,
    };
    let course_id = match required_str(req, "courseId") {
        Ok(v) => v,
        Err(resp) => return resp,
    };
    let assignment_id = match required_str(req, "assignmentId") {
        Ok(v) => v,
        Err(resp) => return resp,
    };
    let student_id = match required_str(req, "studentId") {
        Ok(v) => v,
        Err(resp) => return resp,
    };
    let Some(points_earned) = req.params.get("pointsEarned").and_then(|v| v.as_f64()) else {
        return err(&req.id, "bad_params", "missing/invalid pointsEarned", None);
    };

    let assignment: Option<AssignmentRow> = match conn
        .query_row(
            "SELECT course_id, marking_period, point_value FROM assignments WHERE id = ?",
            [&assignment_id],
            |r| {
                Ok(AssignmentRow {
                    course_id: r.get(0)?,
                    marking_period: r.get(1)?,
                    point_value: r.get(2)?,
                })
            },
        )
        .optional()
    {
        Ok(v) => v,
        Err(e) => return err(&req.id, "db_query_failed", e.to_string(), None),
    };
    let Some(assignment) = assignment else {
        return err(&req.id, "not_found", "assignment not found", None);
    };
    if assignment.course_id != course_id {
        return err(
            &req.id,
            "bad_params",
            "assignment does not belong to course",
            Some(json!({ "assignmentId": assignment_id, "courseId": course_id })),
        );
    }
    let period = match MarkingPeriod::from_index(assignment.marking_period) {
        Ok(p) => p,
        Err(e) => {
            tracing::warn!(%assignment_id, marking_period = assignment.marking_period, "stored assignment has unknown marking period");
            return grade_err(&req.id, &e);
        }
    };

    let points_possible = assignment.point_value as f64;
    if !(0.0..=points_possible).contains(&points_earned) {
        return err(
            &req.id,
            "bad_params",
            "pointsEarned must be between 0 and the assignment's point value",
            Some(json!({
                "pointsEarned": points_earned,
                "pointValue": assignment.point_value
            })),
        );
    }

    let enrolled: Option<i64> = match conn
        .query_row(
            "SELECT 1 FROM course_grades WHERE course_id = ? AND student_id = ?",
            (&course_id, &student_id),
            |r| r.get(0),
        )
        .optional()
    {
        Ok(v) => v,
        Err(e) => return err(&req.id, "db_query_failed", e.to_string(), None),
    };
    if enrolled.is_none() {
        return err(
            &req.id,
            "not_found",
            "student is not enrolled in course",
            Some(json!({ "courseId": course_id, "studentId": student_id })),
        );
    }

    let score = AssignmentScore {
        course_id: course_id.clone(),
        assignment_id: assignment_id.clone(),
        student_id: student_id.clone(),
        points_earned,
        points_possible,
        is_graded: true,
    };

    // Score write and every recomputation commit together or not at all.
    let tx = match conn.unchecked_transaction() {
        Ok(t) => t,
        Err(e) => return err(&req.id, "db_tx_failed", e.to_string(), None),
    };
    let outcome = {
        let store = SqliteGradeStore::new(&tx);
        pipeline::record_score(&store, &score)
            .and_then(|_| pipeline::recompute_for_entry(&store, &course_id, &student_id, period))
    };
    let outcome = match outcome {
        Ok(v) => v,
        Err(e) => {
            tracing::warn!(%course_id, %student_id, error = %e, "grade entry rolled back");
            let _ = tx.rollback();
            return grade_err(&req.id, &e);
        }
    };
    if let Err(e) = tx.commit() {
        return err(&req.id, "db_tx_failed", e.to_string(), None);
    }

    tracing::info!(
        %course_id,
        %student_id,
        marking_period = period.index(),
        gpa = ?outcome.gpa,
        "grade entered"
    );
    ok(&req.id, json!(outcome))
}

fn handle_gpa_recompute(state: &mut AppState, req: &Request) -> serde_json::Value {
    let conn = match db_conn(state, req) {
        Ok(c) => c,
        Err(resp) => return resp,
    };
    let student_id = match required_str(req, "studentId") {
        Ok(v) => v,
        Err(resp) => return resp,
    };

    let tx = match conn.unchecked_transaction() {
        Ok(t) => t,
        Err(e) => return err(&req.id, "db_tx_failed", e.to_string(), None),
    };
    let gpa = {
        let store = SqliteGradeStore::new(&tx);
        pipeline::recompute_gpa(&store, &student_id)
    };
    let gpa = match gpa {
        Ok(v) => v,
        Err(e) => {
            let _ = tx.rollback();
            return grade_err(&req.id, &e);
        }
    };
    if let Err(e) = tx.commit() {
        return err(&req.id, "db_tx_failed", e.to_string(), None);
    }

    ok(&req.id, json!({ "studentId": student_id, "gpa": gpa }))
}

pub fn try_handle(state: &mut AppState, req: &Request) -> Option<serde_json::Value> {
    match req.method.as_str() {
        "grades.get" => Some(handle_grades_get(state, req)),
        "grades.enter" => Some(handle_grades_enter(state, req)),
        "gpa.recompute" => Some(handle_gpa_recompute(state, req)),
        _ => None,
    }
}
