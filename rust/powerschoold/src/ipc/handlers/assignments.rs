use crate::calc::MarkingPeriod;
use crate::ipc::error::{err, grade_err, ok};
use crate::ipc::helpers::{db_conn, marking_period, required_i64, required_str};
use crate::ipc::types::{AppState, Request};
use crate::pipeline;
use crate::store::SqliteGradeStore;
use rusqlite::OptionalExtension;
use serde_json::json;
use uuid::Uuid;

fn handle_assignments_create(state: &mut AppState, req: &Request) -> serde_json::Value {
    let conn = match db_conn(state, req) {
        Ok(c) => c,
        Err(resp) => return resp,
    };
    let course_id = match required_str(req, "courseId") {
        Ok(v) => v,
        Err(resp) => return resp,
    };
    let period = match marking_period(req) {
        Ok(v) => v,
        Err(resp) => return resp,
    };
    let title = match required_str(req, "title") {
        Ok(v) => v,
        Err(resp) => return resp,
    };
    let point_value = match required_i64(req, "pointValue") {
        Ok(v) if v > 0 => v,
        Ok(v) => {
            return err(
                &req.id,
                "bad_params",
                "pointValue must be > 0",
                Some(json!({ "pointValue": v })),
            )
        }
        Err(resp) => return resp,
    };

    let course_exists: Option<i64> = match conn
        .query_row("SELECT 1 FROM courses WHERE id = ?", [&course_id], |r| {
            r.get(0)
        })
        .optional()
    {
        Ok(v) => v,
        Err(e) => return err(&req.id, "db_query_failed", e.to_string(), None),
    };
    if course_exists.is_none() {
        return err(&req.id, "not_found", "course not found", None);
    }

    let duplicate: Option<String> = match conn
        .query_row(
            "SELECT id FROM assignments WHERE course_id = ? AND marking_period = ? AND title = ?",
            (&course_id, period.index(), &title),
            |r| r.get(0),
        )
        .optional()
    {
        Ok(v) => v,
        Err(e) => return err(&req.id, "db_query_failed", e.to_string(), None),
    };
    if duplicate.is_some() {
        return err(
            &req.id,
            "bad_params",
            "an assignment with this title already exists in the marking period",
            Some(json!({ "title": title, "markingPeriod": period.index() })),
        );
    }

    let assignment_id = Uuid::new_v4().to_string();
    if let Err(e) = conn.execute(
        "INSERT INTO assignments(id, course_id, marking_period, is_midterm, is_final, title, point_value)
         VALUES(?, ?, ?, ?, ?, ?, ?)",
        (
            &assignment_id,
            &course_id,
            period.index(),
            period.is_midterm() as i64,
            period.is_final() as i64,
            &title,
            point_value,
        ),
    ) {
        return err(
            &req.id,
            "db_insert_failed",
            e.to_string(),
            Some(json!({ "table": "assignments" })),
        );
    }

    ok(&req.id, json!({ "assignmentId": assignment_id }))
}

fn handle_assignments_list(state: &mut AppState, req: &Request) -> serde_json::Value {
    let conn = match db_conn(state, req) {
        Ok(c) => c,
        Err(resp) => return resp,
    };
    let course_id = match required_str(req, "courseId") {
        Ok(v) => v,
        Err(resp) => return resp,
    };
    let period = match marking_period(req) {
        Ok(v) => v,
        Err(resp) => return resp,
    };

    let mut stmt = match conn.prepare(
        "SELECT a.id, a.title, a.point_value,
                (SELECT COUNT(*) FROM assignment_grades ag WHERE ag.assignment_id = a.id)
         FROM assignments a
         WHERE a.course_id = ? AND a.marking_period = ?
         ORDER BY a.rowid",
    ) {
        Ok(s) => s,
        Err(e) => return err(&req.id, "db_query_failed", e.to_string(), None),
    };
    let rows = stmt
        .query_map((&course_id, period.index()), |row| {
            let id: String = row.get(0)?;
            let title: String = row.get(1)?;
            let point_value: i64 = row.get(2)?;
            let graded_count: i64 = row.get(3)?;
            Ok(json!({
                "id": id,
                "title": title,
                "pointValue": point_value,
                "gradedCount": graded_count
            }))
        })
        .and_then(|it| it.collect::<Result<Vec<_>, _>>());

    match rows {
        Ok(assignments) => ok(
            &req.id,
            json!({
                "courseId": course_id,
                "markingPeriod": period.index(),
                "assignments": assignments
            }),
        ),
        Err(e) => err(&req.id, "db_query_failed", e.to_string(), None),
    }
}

fn handle_assignments_delete(state: &mut AppState, req: &Request) -> serde_json::Value {
    let conn = match db_conn(state, req) {
        Ok(c) => c,
        Err(resp) => return resp,
    };
    let assignment_id = match required_str(req, "assignmentId") {
        Ok(v) => v,
        Err(resp) => return resp,
    };

    let row: Option<(String, i64)> = match conn
        .query_row(
            "SELECT course_id, marking_period FROM assignments WHERE id = ?",
            [&assignment_id],
            |r| Ok((r.get(0)?, r.get(1)?)),
        )
        .optional()
    {
        Ok(v) => v,
        Err(e) => return err(&req.id, "db_query_failed", e.to_string(), None),
    };
    let Some((course_id, period_index)) = row else {
        return err(&req.id, "not_found", "assignment not found", None);
    };
    let period = match MarkingPeriod::from_index(period_index) {
        Ok(p) => p,
        Err(e) => return grade_err(&req.id, &e),
    };

    let student_ids: Vec<String> = match conn
        .prepare("SELECT student_id FROM assignment_grades WHERE assignment_id = ? ORDER BY rowid")
        .and_then(|mut stmt| {
            let ids = stmt
                .query_map([&assignment_id], |r| r.get::<_, String>(0))?
                .collect::<Result<Vec<_>, _>>()?;
            Ok(ids)
        }) {
        Ok(v) => v,
        Err(e) => return err(&req.id, "db_query_failed", e.to_string(), None),
    };

    let tx = match conn.unchecked_transaction() {
        Ok(t) => t,
        Err(e) => return err(&req.id, "db_tx_failed", e.to_string(), None),
    };

    if let Err(e) = tx.execute(
        "DELETE FROM assignment_grades WHERE assignment_id = ?",
        [&assignment_id],
    ) {
        let _ = tx.rollback();
        return err(
            &req.id,
            "db_delete_failed",
            e.to_string(),
            Some(json!({ "table": "assignment_grades" })),
        );
    }
    if let Err(e) = tx.execute("DELETE FROM assignments WHERE id = ?", [&assignment_id]) {
        let _ = tx.rollback();
        return err(
            &req.id,
            "db_delete_failed",
            e.to_string(),
            Some(json!({ "table": "assignments" })),
        );
    }

    let refreshed = {
        let store = SqliteGradeStore::new(&tx);
        student_ids
            .iter()
            .map(|student_id| {
                pipeline::refresh_after_removal(&store, &course_id, student_id, period)
            })
            .collect::<Result<Vec<_>, _>>()
    };
    let refreshed = match refreshed {
        Ok(v) => v,
        Err(e) => {
            tracing::warn!(%assignment_id, error = %e, "grade refresh failed; rolling back");
            let _ = tx.rollback();
            return grade_err(&req.id, &e);
        }
    };

    if let Err(e) = tx.commit() {
        return err(&req.id, "db_tx_failed", e.to_string(), None);
    }

    ok(
        &req.id,
        json!({
            "assignmentId": assignment_id,
            "refreshed": refreshed
        }),
    )
}

pub fn try_handle(state: &mut AppState, req: &Request) -> Option<serde_json::Value> {
    match req.method.as_str() {
        "assignments.create" => Some(handle_assignments_create(state, req)),
        "assignments.list" => Some(handle_assignments_list(state, req)),
        "assignments.delete" => Some(handle_assignments_delete(state, req)),
        _ => None,
    }
}
