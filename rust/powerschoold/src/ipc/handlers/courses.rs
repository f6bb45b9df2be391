use crate::calc;
use crate::ipc::error::{err, ok};
use crate::ipc::helpers::{db_conn, optional_str, required_i64, required_str};
use crate::ipc::types::{AppState, Request};
use rusqlite::OptionalExtension;
use serde_json::json;
use uuid::Uuid;

fn handle_courses_list(state: &mut AppState, req: &Request) -> serde_json::Value {
    let Some(conn) = state.db.as_ref() else {
        return ok(&req.id, json!({ "courses": [] }));
    };
    let department_id = match optional_str(req, "departmentId") {
        Ok(v) => v,
        Err(resp) => return resp,
    };

    let mut stmt = match conn.prepare(
        "SELECT
           c.id,
           c.course_no,
           c.title,
           c.credit_hours,
           c.department_id,
           (SELECT COUNT(*) FROM course_grades cg WHERE cg.course_id = c.id) AS student_count
         FROM courses c
         WHERE (?1 IS NULL OR c.department_id = ?1)
         ORDER BY c.course_no",
    ) {
        Ok(s) => s,
        Err(e) => return err(&req.id, "db_query_failed", e.to_string(), None),
    };

    let rows = stmt
        .query_map([department_id.as_deref()], |row| {
            let id: String = row.get(0)?;
            let course_no: String = row.get(1)?;
            let title: String = row.get(2)?;
            let credit_hours: i64 = row.get(3)?;
            let department_id: Option<String> = row.get(4)?;
            let student_count: i64 = row.get(5)?;
            Ok(json!({
                "id": id,
                "courseNo": course_no,
                "title": title,
                "creditHours": credit_hours,
                "departmentId": department_id,
                "studentCount": student_count
            }))
        })
        .and_then(|it| it.collect::<Result<Vec<_>, _>>());

    match rows {
        Ok(courses) => ok(&req.id, json!({ "courses": courses })),
        Err(e) => err(&req.id, "db_query_failed", e.to_string(), None),
    }
}

fn handle_courses_create(state: &mut AppState, req: &Request) -> serde_json::Value {
    let conn = match db_conn(state, req) {
        Ok(c) => c,
        Err(resp) => return resp,
    };
    let course_no = match required_str(req, "courseNo") {
        Ok(v) => v,
        Err(resp) => return resp,
    };
    let title = match required_str(req, "title") {
        Ok(v) => v,
        Err(resp) => return resp,
    };
    let credit_hours = match required_i64(req, "creditHours") {
        Ok(v) if v >= 0 => v,
        Ok(v) => {
            return err(
                &req.id,
                "bad_params",
                "creditHours must be >= 0",
                Some(json!({ "creditHours": v })),
            )
        }
        Err(resp) => return resp,
    };
    let department_id = match optional_str(req, "departmentId") {
        Ok(v) => v,
        Err(resp) => return resp,
    };
    if let Some(id) = department_id.as_deref() {
        let found: Option<i64> = match conn
            .query_row("SELECT 1 FROM departments WHERE id = ?", [id], |r| r.get(0))
            .optional()
        {
            Ok(v) => v,
            Err(e) => return err(&req.id, "db_query_failed", e.to_string(), None),
        };
        if found.is_none() {
            return err(&req.id, "not_found", "department not found", None);
        }
    }

    let existing: Option<String> = match conn
        .query_row(
            "SELECT id FROM courses WHERE course_no = ?",
            [&course_no],
            |r| r.get(0),
        )
        .optional()
    {
        Ok(v) => v,
        Err(e) => return err(&req.id, "db_query_failed", e.to_string(), None),
    };
    if existing.is_some() {
        return err(
            &req.id,
            "bad_params",
            "courseNo already exists",
            Some(json!({ "courseNo": course_no })),
        );
    }

    let course_id = Uuid::new_v4().to_string();
    if let Err(e) = conn.execute(
        "INSERT INTO courses(id, course_no, title, credit_hours, department_id) VALUES(?, ?, ?, ?, ?)",
        (&course_id, &course_no, &title, credit_hours, department_id.as_deref()),
    ) {
        return err(
            &req.id,
            "db_insert_failed",
            e.to_string(),
            Some(json!({ "table": "courses" })),
        );
    }

    ok(
        &req.id,
        json!({
            "courseId": course_id,
            "courseNo": course_no,
            "title": title,
            "creditHours": credit_hours,
            "departmentId": department_id
        }),
    )
}

/// Enrolled students with their grade in this course, in name order.
fn handle_courses_roster(state: &mut AppState, req: &Request) -> serde_json::Value {
    let conn = match db_conn(state, req) {
        Ok(c) => c,
        Err(resp) => return resp,
    };
    let course_id = match required_str(req, "courseId") {
        Ok(v) => v,
        Err(resp) => return resp,
    };
    let course_no: Option<String> = match conn
        .query_row(
            "SELECT course_no FROM courses WHERE id = ?",
            [&course_id],
            |r| r.get(0),
        )
        .optional()
    {
        Ok(v) => v,
        Err(e) => return err(&req.id, "db_query_failed", e.to_string(), None),
    };
    let Some(course_no) = course_no else {
        return err(&req.id, "not_found", "course not found", None);
    };

    let mut stmt = match conn.prepare(
        "SELECT s.id, s.first_name, s.last_name, s.grade_level, cg.grade, s.gpa
         FROM course_grades cg
         JOIN students s ON s.id = cg.student_id
         WHERE cg.course_id = ?
         ORDER BY s.last_name, s.first_name",
    ) {
        Ok(s) => s,
        Err(e) => return err(&req.id, "db_query_failed", e.to_string(), None),
    };
    let rows = stmt
        .query_map([&course_id], |row| {
            let id: String = row.get(0)?;
            let first: String = row.get(1)?;
            let last: String = row.get(2)?;
            let grade_level: i64 = row.get(3)?;
            let grade: Option<f64> = row.get(4)?;
            let gpa: Option<f64> = row.get(5)?;
            Ok(json!({
                "studentId": id,
                "displayName": format!("{}, {}", last, first),
                "gradeLevel": grade_level,
                "grade": grade,
                "points": grade.map(calc::four_point_scale),
                "gpa": gpa,
                "gpaDisplay": calc::gpa_display(gpa)
            }))
        })
        .and_then(|it| it.collect::<Result<Vec<_>, _>>());

    match rows {
        Ok(students) => ok(
            &req.id,
            json!({
                "courseId": course_id,
                "courseNo": course_no,
                "students": students
            }),
        ),
        Err(e) => err(&req.id, "db_query_failed", e.to_string(), None),
    }
}

fn handle_enrollments_create(state: &mut AppState, req: &Request) -> serde_json::Value {
    let conn = match db_conn(state, req) {
        Ok(c) => c,
        Err(resp) => return resp,
    };
    let course_id = match required_str(req, "courseId") {
        Ok(v) => v,
        Err(resp) => return resp,
    };
    let student_id = match required_str(req, "studentId") {
        Ok(v) => v,
        Err(resp) => return resp,
    };

    for (table, id) in [("courses", &course_id), ("students", &student_id)] {
        let sql = format!("SELECT 1 FROM {} WHERE id = ?", table);
        match conn.query_row(&sql, [id], |r| r.get::<_, i64>(0)).optional() {
            Ok(Some(_)) => {}
            Ok(None) => {
                return err(
                    &req.id,
                    "not_found",
                    format!("{} row not found", table),
                    Some(json!({ "id": id })),
                )
            }
            Err(e) => return err(&req.id, "db_query_failed", e.to_string(), None),
        }
    }

    // An existing enrollment keeps its grades.
    let created = match conn.execute(
        "INSERT OR IGNORE INTO course_grades(course_id, student_id) VALUES(?, ?)",
        (&course_id, &student_id),
    ) {
        Ok(n) => n > 0,
        Err(e) => {
            return err(
                &req.id,
                "db_insert_failed",
                e.to_string(),
                Some(json!({ "table": "course_grades" })),
            )
        }
    };

    ok(
        &req.id,
        json!({
            "courseId": course_id,
            "studentId": student_id,
            "created": created
        }),
    )
}

pub fn try_handle(state: &mut AppState, req: &Request) -> Option<serde_json::Value> {
    match req.method.as_str() {
        "courses.list" => Some(handle_courses_list(state, req)),
        "courses.create" => Some(handle_courses_create(state, req)),
        "courses.roster" => Some(handle_courses_roster(state, req)),
        "enrollments.create" => Some(handle_enrollments_create(state, req)),
        _ => None,
    }
}
