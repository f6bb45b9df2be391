mod test_support;

use serde_json::json;
use std::io::{BufRead, Write};
use test_support::{
    request_err_code, request_ok, spawn_sidecar, spawn_sidecar_with_env, str_field, temp_dir,
};

#[test]
fn health_and_workspace_select() {
    let workspace = temp_dir("powerschool-smoke");
    let (_child, mut stdin, mut reader) = spawn_sidecar();

    let health = request_ok(&mut stdin, &mut reader, "1", "health", json!({}));
    assert!(health.get("version").and_then(|v| v.as_str()).is_some());
    assert!(health.get("workspacePath").map(|v| v.is_null()).unwrap_or(false));

    let selected = request_ok(
        &mut stdin,
        &mut reader,
        "2",
        "workspace.select",
        json!({ "path": workspace.to_string_lossy() }),
    );
    assert_eq!(str_field(&selected, "workspacePath"), workspace.to_string_lossy());
    assert!(workspace.join("powerschool.sqlite3").is_file());
}

#[test]
fn errors_before_workspace_and_for_unknown_methods() {
    let (_child, mut stdin, mut reader) = spawn_sidecar();

    let code = request_err_code(
        &mut stdin,
        &mut reader,
        "1",
        "grades.enter",
        json!({ "courseId": "c", "assignmentId": "a", "studentId": "s", "pointsEarned": 1 }),
    );
    assert_eq!(code, "no_workspace");

    let code = request_err_code(&mut stdin, &mut reader, "2", "menu.logout", json!({}));
    assert_eq!(code, "not_implemented");

    let code = request_err_code(&mut stdin, &mut reader, "3", "workspace.select", json!({}));
    assert_eq!(code, "bad_params");
}

#[test]
fn malformed_lines_get_bad_json_and_session_continues() {
    let (_child, mut stdin, mut reader) = spawn_sidecar();

    writeln!(stdin, "{{not json").expect("write");
    stdin.flush().expect("flush");
    let mut line = String::new();
    reader.read_line(&mut line).expect("read");
    let value: serde_json::Value = serde_json::from_str(line.trim()).expect("json");
    assert_eq!(value.pointer("/error/code").and_then(|v| v.as_str()), Some("bad_json"));

    let _ = request_ok(&mut stdin, &mut reader, "after", "health", json!({}));
}

#[test]
fn workspace_from_environment_opens_at_startup() {
    let workspace = temp_dir("powerschool-env-workspace");
    let ws = workspace.to_string_lossy().to_string();
    let (_child, mut stdin, mut reader) =
        spawn_sidecar_with_env(&[("POWERSCHOOLD_WORKSPACE", ws.as_str())]);

    let health = request_ok(&mut stdin, &mut reader, "1", "health", json!({}));
    assert_eq!(str_field(&health, "workspacePath"), ws);
    let courses = request_ok(&mut stdin, &mut reader, "2", "courses.list", json!({}));
    assert_eq!(courses["courses"].as_array().map(|a| a.len()), Some(0));
}
