#![allow(dead_code)]

use serde_json::json;
use std::io::{BufRead, BufReader, Write};
use std::path::PathBuf;
use std::process::{Child, ChildStdin, ChildStdout, Command, Stdio};
use std::time::{SystemTime, UNIX_EPOCH};

pub fn temp_dir(prefix: &str) -> PathBuf {
    let p = std::env::temp_dir().join(format!(
        "{}-{}",
        prefix,
        SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .expect("clock")
            .as_nanos()
    ));
    std::fs::create_dir_all(&p).expect("create temp dir");
    p
}

pub fn spawn_sidecar() -> (Child, ChildStdin, BufReader<ChildStdout>) {
    spawn_sidecar_with_env(&[])
}

pub fn spawn_sidecar_with_env(envs: &[(&str, &str)]) -> (Child, ChildStdin, BufReader<ChildStdout>) {
    let exe = env!("CARGO_BIN_EXE_powerschoold");
    let mut cmd = Command::new(exe);
    cmd.stdin(Stdio::piped())
        .stdout(Stdio::piped())
        .stderr(Stdio::null())
        .env_remove("POWERSCHOOLD_WORKSPACE");
    for (k, v) in envs {
        cmd.env(k, v);
    }
    let mut child = cmd.spawn().expect("spawn powerschoold");
    let stdin = child.stdin.take().expect("child stdin");
    let stdout = child.stdout.take().expect("child stdout");
    (child, stdin, BufReader::new(stdout))
}

pub fn request(
    stdin: &mut ChildStdin,
    reader: &mut BufReader<ChildStdout>,
    id: &str,
    method: &str,
    params: serde_json::Value,
) -> serde_json::Value {
    let payload = json!({
        "id": id,
        "method": method,
        "params": params,
    });
    writeln!(stdin, "{}", payload).expect("write request");
    stdin.flush().expect("flush request");

    let mut line = String::new();
    reader.read_line(&mut line).expect("read response line");
    assert!(!line.trim().is_empty(), "empty response for {}", method);
    let value: serde_json::Value = serde_json::from_str(line.trim()).expect("parse response json");
    assert_eq!(value.get("id").and_then(|v| v.as_str()), Some(id));
    value
}

pub fn request_ok(
    stdin: &mut ChildStdin,
    reader: &mut BufReader<ChildStdout>,
    id: &str,
    method: &str,
    params: serde_json::Value,
) -> serde_json::Value {
    let value = request(stdin, reader, id, method, params);
    assert!(
        value.get("ok").and_then(|v| v.as_bool()).unwrap_or(false),
        "{} failed: {}",
        method,
        value
    );
    value.get("result").cloned().unwrap_or_else(|| json!({}))
}

/// Sends a request expected to fail and returns its error code.
pub fn request_err_code(
    stdin: &mut ChildStdin,
    reader: &mut BufReader<ChildStdout>,
    id: &str,
    method: &str,
    params: serde_json::Value,
) -> String {
    let value = request(stdin, reader, id, method, params);
    assert_eq!(
        value.get("ok").and_then(|v| v.as_bool()),
        Some(false),
        "{} unexpectedly succeeded: {}",
        method,
        value
    );
    value
        .pointer("/error/code")
        .and_then(|v| v.as_str())
        .expect("error code")
        .to_string()
}

pub fn str_field(v: &serde_json::Value, key: &str) -> String {
    v.get(key)
        .and_then(|x| x.as_str())
        .unwrap_or_else(|| panic!("missing {} in {}", key, v))
        .to_string()
}

pub fn f64_field(v: &serde_json::Value, key: &str) -> Option<f64> {
    v.get(key).and_then(|x| x.as_f64())
}

pub fn assert_close(actual: Option<f64>, expected: f64) {
    let actual = actual.unwrap_or_else(|| panic!("expected {}, got null", expected));
    assert!(
        (actual - expected).abs() < 1e-9,
        "expected {}, got {}",
        expected,
        actual
    );
}

/// A running sidecar with builders for the common school fixtures.
pub struct Session {
    _child: Child,
    stdin: ChildStdin,
    reader: BufReader<ChildStdout>,
    next_id: u64,
}

impl Session {
    pub fn start() -> Self {
        let (child, stdin, reader) = spawn_sidecar();
        Session {
            _child: child,
            stdin,
            reader,
            next_id: 0,
        }
    }

    /// Starts a sidecar with a fresh workspace already selected.
    pub fn with_workspace(prefix: &str) -> Self {
        let mut session = Session::start();
        let workspace = temp_dir(prefix);
        let _ = session.ok(
            "workspace.select",
            json!({ "path": workspace.to_string_lossy() }),
        );
        session
    }

    fn id(&mut self) -> String {
        self.next_id += 1;
        self.next_id.to_string()
    }

    pub fn ok(&mut self, method: &str, params: serde_json::Value) -> serde_json::Value {
        let id = self.id();
        request_ok(&mut self.stdin, &mut self.reader, &id, method, params)
    }

    pub fn err_code(&mut self, method: &str, params: serde_json::Value) -> String {
        let id = self.id();
        request_err_code(&mut self.stdin, &mut self.reader, &id, method, params)
    }

    pub fn create_department(&mut self, title: &str) -> String {
        let res = self.ok("departments.create", json!({ "title": title }));
        str_field(&res, "departmentId")
    }

    pub fn create_teacher(&mut self, first_name: &str, last_name: &str, department_id: &str) -> String {
        let res = self.ok(
            "faculty.create",
            json!({ "firstName": first_name, "lastName": last_name, "departmentId": department_id }),
        );
        str_field(&res, "teacherId")
    }

    pub fn create_course(&mut self, course_no: &str, credit_hours: i64) -> String {
        let res = self.ok(
            "courses.create",
            json!({ "courseNo": course_no, "title": course_no, "creditHours": credit_hours }),
        );
        str_field(&res, "courseId")
    }

    pub fn create_student(&mut self, first_name: &str, last_name: &str, grade_level: i64) -> String {
        let res = self.ok(
            "students.create",
            json!({ "firstName": first_name, "lastName": last_name, "gradeLevel": grade_level }),
        );
        str_field(&res, "studentId")
    }

    pub fn enroll(&mut self, course_id: &str, student_id: &str) {
        let _ = self.ok(
            "enrollments.create",
            json!({ "courseId": course_id, "studentId": student_id }),
        );
    }

    pub fn create_assignment(
        &mut self,
        course_id: &str,
        marking_period: i64,
        title: &str,
        point_value: i64,
    ) -> String {
        let res = self.ok(
            "assignments.create",
            json!({
                "courseId": course_id,
                "markingPeriod": marking_period,
                "title": title,
                "pointValue": point_value
            }),
        );
        str_field(&res, "assignmentId")
    }

    pub fn enter(
        &mut self,
        course_id: &str,
        assignment_id: &str,
        student_id: &str,
        points_earned: f64,
    ) -> serde_json::Value {
        self.ok(
            "grades.enter",
            json!({
                "courseId": course_id,
                "assignmentId": assignment_id,
                "studentId": student_id,
                "pointsEarned": points_earned
            }),
        )
    }
}
