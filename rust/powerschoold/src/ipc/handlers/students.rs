use crate::calc::{self, MarkingPeriod};
use crate::ipc::error::{err, ok};
use crate::ipc::helpers::{
    db_conn, marking_period, optional_i64, optional_str, required_i64, required_str,
};
use crate::ipc::types::{AppState, Request};
use rusqlite::{Connection, OptionalExtension};
use serde_json::json;
use uuid::Uuid;

fn student_exists(conn: &Connection, student_id: &str) -> rusqlite::Result<bool> {
    conn.query_row("SELECT 1 FROM students WHERE id = ?", [student_id], |r| {
        r.get::<_, i64>(0)
    })
    .optional()
    .map(|v| v.is_some())
}

fn handle_students_create(state: &mut AppState, req: &Request) -> serde_json::Value {
    let conn = match db_conn(state, req) {
        Ok(c) => c,
        Err(resp) => return resp,
    };
    let first_name = match required_str(req, "firstName") {
        Ok(v) => v,
        Err(resp) => return resp,
    };
    let last_name = match required_str(req, "lastName") {
        Ok(v) => v,
        Err(resp) => return resp,
    };
    let grade_level = match required_i64(req, "gradeLevel") {
        Ok(v) => v,
        Err(resp) => return resp,
    };
    let graduation = match optional_i64(req, "graduation") {
        Ok(v) => v,
        Err(resp) => return resp,
    };

    let student_id = Uuid::new_v4().to_string();
    if let Err(e) = conn.execute(
        "INSERT INTO students(id, first_name, last_name, grade_level, graduation, gpa, class_rank)
         VALUES(?, ?, ?, ?, ?, NULL, 0)",
        (&student_id, &first_name, &last_name, grade_level, graduation),
    ) {
        return err(
            &req.id,
            "db_insert_failed",
            e.to_string(),
            Some(json!({ "table": "students" })),
        );
    }

    ok(&req.id, json!({ "studentId": student_id }))
}

fn handle_students_list(state: &mut AppState, req: &Request) -> serde_json::Value {
    let Some(conn) = state.db.as_ref() else {
        return ok(&req.id, json!({ "students": [] }));
    };
    let grade_level = match optional_i64(req, "gradeLevel") {
        Ok(v) => v,
        Err(resp) => return resp,
    };
    let course_id = match optional_str(req, "courseId") {
        Ok(v) => v,
        Err(resp) => return resp,
    };

    // NULL filters match everything.
    let mut stmt = match conn.prepare(
        "SELECT s.id, s.first_name, s.last_name, s.grade_level, s.graduation, s.gpa, s.class_rank
         FROM students s
         WHERE (?1 IS NULL OR s.grade_level = ?1)
           AND (?2 IS NULL OR EXISTS (
                 SELECT 1 FROM course_grades cg
                 WHERE cg.student_id = s.id AND cg.course_id = ?2))
         ORDER BY s.last_name, s.first_name",
    ) {
        Ok(s) => s,
        Err(e) => return err(&req.id, "db_query_failed", e.to_string(), None),
    };

    let rows = stmt
        .query_map((grade_level, course_id.as_deref()), |row| {
            let id: String = row.get(0)?;
            let first: String = row.get(1)?;
            let last: String = row.get(2)?;
            let grade_level: i64 = row.get(3)?;
            let graduation: Option<i64> = row.get(4)?;
            let gpa: Option<f64> = row.get(5)?;
            let class_rank: i64 = row.get(6)?;
            Ok(json!({
                "id": id,
                "firstName": first,
                "lastName": last,
                "displayName": format!("{}, {}", last, first),
                "gradeLevel": grade_level,
                "graduation": graduation,
                "gpa": gpa,
                "gpaDisplay": calc::gpa_display(gpa),
                "classRank": class_rank
            }))
        })
        .and_then(|it| it.collect::<Result<Vec<_>, _>>());

    match rows {
        Ok(students) => ok(&req.id, json!({ "students": students })),
        Err(e) => err(&req.id, "db_query_failed", e.to_string(), None),
    }
}

fn handle_students_course_grades(state: &mut AppState, req: &Request) -> serde_json::Value {
    let conn = match db_conn(state, req) {
        Ok(c) => c,
        Err(resp) => return resp,
    };
    let student_id = match required_str(req, "studentId") {
        Ok(v) => v,
        Err(resp) => return resp,
    };
    match student_exists(conn, &student_id) {
        Ok(true) => {}
        Ok(false) => return err(&req.id, "not_found", "student not found", None),
        Err(e) => return err(&req.id, "db_query_failed", e.to_string(), None),
    }

    let mut stmt = match conn.prepare(
        "SELECT c.id, c.course_no, c.title, c.credit_hours,
                cg.mp1, cg.mp2, cg.mp3, cg.mp4, cg.midterm_exam, cg.final_exam, cg.grade
         FROM course_grades cg
         JOIN courses c ON c.id = cg.course_id
         WHERE cg.student_id = ?
         ORDER BY c.course_no",
    ) {
        Ok(s) => s,
        Err(e) => return err(&req.id, "db_query_failed", e.to_string(), None),
    };

    let rows = stmt
        .query_map([&student_id], |row| {
            let course_id: String = row.get(0)?;
            let course_no: String = row.get(1)?;
            let title: String = row.get(2)?;
            let credit_hours: i64 = row.get(3)?;
            let mut slots = serde_json::Map::new();
            for (i, p) in MarkingPeriod::ALL.iter().enumerate() {
                let v: Option<f64> = row.get(4 + i)?;
                slots.insert(p.column().to_string(), json!(v));
            }
            let grade: Option<f64> = row.get(10)?;
            Ok(json!({
                "courseId": course_id,
                "courseNo": course_no,
                "title": title,
                "creditHours": credit_hours,
                "markingPeriods": slots,
                "grade": grade,
                "points": grade.map(calc::four_point_scale)
            }))
        })
        .and_then(|it| it.collect::<Result<Vec<_>, _>>());

    let gpa: Option<f64> = match conn.query_row(
        "SELECT gpa FROM students WHERE id = ?",
        [&student_id],
        |r| r.get(0),
    ) {
        Ok(v) => v,
        Err(e) => return err(&req.id, "db_query_failed", e.to_string(), None),
    };

    match rows {
        Ok(courses) => ok(
            &req.id,
            json!({
                "studentId": student_id,
                "gpa": gpa,
                "courses": courses
            }),
        ),
        Err(e) => err(&req.id, "db_query_failed", e.to_string(), None),
    }
}

fn handle_students_assignment_grades(state: &mut AppState, req: &Request) -> serde_json::Value {
    let conn = match db_conn(state, req) {
        Ok(c) => c,
        Err(resp) => return resp,
    };
    let student_id = match required_str(req, "studentId") {
        Ok(v) => v,
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
        "SELECT a.id, a.title, a.point_value, ag.points_earned
         FROM assignments a
         LEFT JOIN assignment_grades ag
           ON ag.assignment_id = a.id AND ag.student_id = ?
         WHERE a.course_id = ? AND a.marking_period = ?
         ORDER BY a.rowid",
    ) {
        Ok(s) => s,
        Err(e) => return err(&req.id, "db_query_failed", e.to_string(), None),
    };

    let rows = stmt
        .query_map((&student_id, &course_id, period.index()), |row| {
            let id: String = row.get(0)?;
            let title: String = row.get(1)?;
            let point_value: i64 = row.get(2)?;
            let earned: Option<f64> = row.get(3)?;
            Ok(json!({
                "assignmentId": id,
                "title": title,
                "pointValue": point_value,
                "pointsEarned": earned
            }))
        })
        .and_then(|it| it.collect::<Result<Vec<_>, _>>());

    match rows {
        Ok(assignments) => ok(
            &req.id,
            json!({
                "markingPeriod": period.index(),
                "assignments": assignments
            }),
        ),
        Err(e) => err(&req.id, "db_query_failed", e.to_string(), None),
    }
}

pub fn try_handle(state: &mut AppState, req: &Request) -> Option<serde_json::Value> {
    match req.method.as_str() {
        "students.create" => Some(handle_students_create(state, req)),
        "students.list" => Some(handle_students_list(state, req)),
        "students.courseGrades" => Some(handle_students_course_grades(state, req)),
        "students.assignmentGrades" => Some(handle_students_assignment_grades(state, req)),
        _ => None,
    }
}
