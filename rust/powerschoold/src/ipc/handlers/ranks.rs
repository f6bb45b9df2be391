use crate::calc;
use crate::ipc::error::{err, grade_err, ok};
use crate::ipc::helpers::{db_conn, required_i64};
use crate::ipc::types::{AppState, Request};
use crate::pipeline;
use crate::store::SqliteGradeStore;
use serde_json::json;

fn handle_ranks_compute(state: &mut AppState, req: &Request) -> serde_json::Value {
    let conn = match db_conn(state, req) {
        Ok(c) => c,
        Err(resp) => return resp,
    };
    let grade_level = match required_i64(req, "gradeLevel") {
        Ok(v) => v,
        Err(resp) => return resp,
    };

    let tx = match conn.unchecked_transaction() {
        Ok(t) => t,
        Err(e) => return err(&req.id, "db_tx_failed", e.to_string(), None),
    };
    let ranked = {
        let store = SqliteGradeStore::new(&tx);
        pipeline::rank_cohort(&store, grade_level)
    };
    let ranked = match ranked {
        Ok(v) => v,
        Err(e) => {
            let _ = tx.rollback();
            return grade_err(&req.id, &e);
        }
    };
    if let Err(e) = tx.commit() {
        return err(&req.id, "db_tx_failed", e.to_string(), None);
    }

    let students: Vec<serde_json::Value> = ranked
        .iter()
        .map(|s| {
            json!({
                "studentId": s.student_id,
                "displayName": s.display_name(),
                "gpa": s.gpa,
                "gpaDisplay": calc::gpa_display(s.gpa),
                "classRank": s.class_rank
            })
        })
        .collect();
    tracing::info!(grade_level, cohort = students.len(), "class ranks assigned");

    ok(
        &req.id,
        json!({
            "gradeLevel": grade_level,
            "students": students
        }),
    )
}

pub fn try_handle(state: &mut AppState, req: &Request) -> Option<serde_json::Value> {
    match req.method.as_str() {
        "ranks.compute" => Some(handle_ranks_compute(state, req)),
        _ => None,
    }
}
