use crate::ipc::error::{err, ok};
use crate::ipc::helpers::{db_conn, optional_str, required_str};
use crate::ipc::types::{AppState, Request};
use rusqlite::{Connection, OptionalExtension};
use serde_json::json;
use uuid::Uuid;

fn department_exists(conn: &Connection, department_id: &str) -> rusqlite::Result<bool> {
    conn.query_row(
        "SELECT 1 FROM departments WHERE id = ?",
        [department_id],
        |r| r.get::<_, i64>(0),
    )
    .optional()
    .map(|v| v.is_some())
}

fn handle_departments_create(state: &mut AppState, req: &Request) -> serde_json::Value {
    let conn = match db_conn(state, req) {
        Ok(c) => c,
        Err(resp) => return resp,
    };
    let title = match required_str(req, "title") {
        Ok(v) => v,
        Err(resp) => return resp,
    };

    let existing: Option<String> = match conn
        .query_row("SELECT id FROM departments WHERE title = ?", [&title], |r| {
            r.get(0)
        })
        .optional()
    {
        Ok(v) => v,
        Err(e) => return err(&req.id, "db_query_failed", e.to_string(), None),
    };
    if existing.is_some() {
        return err(
            &req.id,
            "bad_params",
            "department already exists",
            Some(json!({ "title": title })),
        );
    }

    let department_id = Uuid::new_v4().to_string();
    if let Err(e) = conn.execute(
        "INSERT INTO departments(id, title) VALUES(?, ?)",
        (&department_id, &title),
    ) {
        return err(
            &req.id,
            "db_insert_failed",
            e.to_string(),
            Some(json!({ "table": "departments" })),
        );
    }

    ok(
        &req.id,
        json!({ "departmentId": department_id, "title": title }),
    )
}

fn handle_departments_list(state: &mut AppState, req: &Request) -> serde_json::Value {
    let Some(conn) = state.db.as_ref() else {
        return ok(&req.id, json!({ "departments": [] }));
    };

    let mut stmt = match conn.prepare(
        "SELECT
           d.id,
           d.title,
           (SELECT COUNT(*) FROM teachers t WHERE t.department_id = d.id),
           (SELECT COUNT(*) FROM courses c WHERE c.department_id = d.id)
         FROM departments d
         ORDER BY d.title",
    ) {
        Ok(s) => s,
        Err(e) => return err(&req.id, "db_query_failed", e.to_string(), None),
    };
    let rows = stmt
        .query_map([], |row| {
            let id: String = row.get(0)?;
            let title: String = row.get(1)?;
            let teacher_count: i64 = row.get(2)?;
            let course_count: i64 = row.get(3)?;
            Ok(json!({
                "id": id,
                "title": title,
                "teacherCount": teacher_count,
                "courseCount": course_count
            }))
        })
        .and_then(|it| it.collect::<Result<Vec<_>, _>>());

    match rows {
        Ok(departments) => ok(&req.id, json!({ "departments": departments })),
        Err(e) => err(&req.id, "db_query_failed", e.to_string(), None),
    }
}

fn handle_faculty_create(state: &mut AppState, req: &Request) -> serde_json::Value {
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
    let department_id = match required_str(req, "departmentId") {
        Ok(v) => v,
        Err(resp) => return resp,
    };
    match department_exists(conn, &department_id) {
        Ok(true) => {}
        Ok(false) => return err(&req.id, "not_found", "department not found", None),
        Err(e) => return err(&req.id, "db_query_failed", e.to_string(), None),
    }

    let teacher_id = Uuid::new_v4().to_string();
    if let Err(e) = conn.execute(
        "INSERT INTO teachers(id, first_name, last_name, department_id) VALUES(?, ?, ?, ?)",
        (&teacher_id, &first_name, &last_name, &department_id),
    ) {
        return err(
            &req.id,
            "db_insert_failed",
            e.to_string(),
            Some(json!({ "table": "teachers" })),
        );
    }

    ok(&req.id, json!({ "teacherId": teacher_id }))
}

fn handle_faculty_list(state: &mut AppState, req: &Request) -> serde_json::Value {
    let conn = match db_conn(state, req) {
        Ok(c) => c,
        Err(resp) => return resp,
    };
    let department_id = match optional_str(req, "departmentId") {
        Ok(v) => v,
        Err(resp) => return resp,
    };
    if let Some(id) = department_id.as_deref() {
        match department_exists(conn, id) {
            Ok(true) => {}
            Ok(false) => return err(&req.id, "not_found", "department not found", None),
            Err(e) => return err(&req.id, "db_query_failed", e.to_string(), None),
        }
    }

    let mut stmt = match conn.prepare(
        "SELECT t.id, t.first_name, t.last_name, d.id, d.title
         FROM teachers t
         JOIN departments d ON d.id = t.department_id
         WHERE (?1 IS NULL OR t.department_id = ?1)
         ORDER BY t.last_name, t.first_name",
    ) {
        Ok(s) => s,
        Err(e) => return err(&req.id, "db_query_failed", e.to_string(), None),
    };
    let rows = stmt
        .query_map([department_id.as_deref()], |row| {
            let id: String = row.get(0)?;
            let first: String = row.get(1)?;
            let last: String = row.get(2)?;
            let department_id: String = row.get(3)?;
            let department: String = row.get(4)?;
            Ok(json!({
                "id": id,
                "firstName": first,
                "lastName": last,
                "displayName": format!("{}, {}", last, first),
                "departmentId": department_id,
                "department": department
            }))
        })
        .and_then(|it| it.collect::<Result<Vec<_>, _>>());

    match rows {
        Ok(teachers) => ok(&req.id, json!({ "teachers": teachers })),
        Err(e) => err(&req.id, "db_query_failed", e.to_string(), None),
    }
}

/// Courses a teacher may pick from: everything in their department.
fn handle_faculty_courses(state: &mut AppState, req: &Request) -> serde_json::Value {
    let conn = match db_conn(state, req) {
        Ok(c) => c,
        Err(resp) => return resp,
    };
    let teacher_id = match required_str(req, "teacherId") {
        Ok(v) => v,
        Err(resp) => return resp,
    };
    let department_id: Option<String> = match conn
        .query_row(
            "SELECT department_id FROM teachers WHERE id = ?",
            [&teacher_id],
            |r| r.get(0),
        )
        .optional()
    {
        Ok(v) => v,
        Err(e) => return err(&req.id, "db_query_failed", e.to_string(), None),
    };
    let Some(department_id) = department_id else {
        return err(&req.id, "not_found", "teacher not found", None);
    };

    let mut stmt = match conn.prepare(
        "SELECT id, course_no, title, credit_hours
         FROM courses
         WHERE department_id = ?
         ORDER BY course_no",
    ) {
        Ok(s) => s,
        Err(e) => return err(&req.id, "db_query_failed", e.to_string(), None),
    };
    let rows = stmt
        .query_map([&department_id], |row| {
            let id: String = row.get(0)?;
            let course_no: String = row.get(1)?;
            let title: String = row.get(2)?;
            let credit_hours: i64 = row.get(3)?;
            Ok(json!({
                "id": id,
                "courseNo": course_no,
                "title": title,
                "creditHours": credit_hours
            }))
        })
        .and_then(|it| it.collect::<Result<Vec<_>, _>>());

    match rows {
        Ok(courses) => ok(
            &req.id,
            json!({
                "teacherId": teacher_id,
                "departmentId": department_id,
                "courses": courses
            }),
        ),
        Err(e) => err(&req.id, "db_query_failed", e.to_string(), None),
    }
}

pub fn try_handle(state: &mut AppState, req: &Request) -> Option<serde_json::Value> {
    match req.method.as_str() {
        "departments.create" => Some(handle_departments_create(state, req)),
        "departments.list" => Some(handle_departments_list(state, req)),
        "faculty.create" => Some(handle_faculty_create(state, req)),
        "faculty.list" => Some(handle_faculty_list(state, req)),
        "faculty.courses" => Some(handle_faculty_courses(state, req)),
        _ => None,
    }
}
