use rusqlite::Connection;
use std::path::Path;

pub const DB_FILE_NAME: &str = "powerschool.sqlite3";

pub fn open_db(workspace: &Path) -> anyhow::Result<Connection> {
    std::fs::create_dir_all(workspace)?;
    let db_path = workspace.join(DB_FILE_NAME);
    let conn = Connection::open(db_path)?;
    conn.execute("PRAGMA foreign_keys = ON", [])?;

    conn.execute(
        "CREATE TABLE IF NOT EXISTS departments(
            id TEXT PRIMARY KEY,
            title TEXT NOT NULL UNIQUE
        )",
        [],
    )?;

    conn.execute(
        "CREATE TABLE IF NOT EXISTS teachers(
            id TEXT PRIMARY KEY,
            first_name TEXT NOT NULL,
            last_name TEXT NOT NULL,
            department_id TEXT NOT NULL,
            FOREIGN KEY(department_id) REFERENCES departments(id)
        )",
        [],
    )?;
    conn.execute(
        "CREATE INDEX IF NOT EXISTS idx_teachers_department ON teachers(department_id)",
        [],
    )?;

    conn.execute(
        "CREATE TABLE IF NOT EXISTS courses(
            id TEXT PRIMARY KEY,
            course_no TEXT NOT NULL UNIQUE,
            title TEXT NOT NULL,
            credit_hours INTEGER NOT NULL CHECK(credit_hours >= 0),
            department_id TEXT,
            FOREIGN KEY(department_id) REFERENCES departments(id)
        )",
        [],
    )?;
    conn.execute(
        "CREATE INDEX IF NOT EXISTS idx_courses_department ON courses(department_id)",
        [],
    )?;

    conn.execute(
        "CREATE TABLE IF NOT EXISTS students(
            id TEXT PRIMARY KEY,
            first_name TEXT NOT NULL,
            last_name TEXT NOT NULL,
            grade_level INTEGER NOT NULL,
            graduation INTEGER,
            gpa REAL,
            class_rank INTEGER NOT NULL DEFAULT 0
        )",
        [],
    )?;
    conn.execute(
        "CREATE INDEX IF NOT EXISTS idx_students_grade_level ON students(grade_level)",
        [],
    )?;

    conn.execute(
        "CREATE TABLE IF NOT EXISTS course_grades(
            course_id TEXT NOT NULL,
            student_id TEXT NOT NULL,
            mp1 REAL,
            mp2 REAL,
            mp3 REAL,
            mp4 REAL,
            midterm_exam REAL,
            final_exam REAL,
            grade REAL,
            updated_at TEXT,
            PRIMARY KEY(course_id, student_id),
            FOREIGN KEY(course_id) REFERENCES courses(id),
            FOREIGN KEY(student_id) REFERENCES students(id)
        )",
        [],
    )?;
    conn.execute(
        "CREATE INDEX IF NOT EXISTS idx_course_grades_student ON course_grades(student_id)",
        [],
    )?;

    conn.execute(
        "CREATE TABLE IF NOT EXISTS assignments(
            id TEXT PRIMARY KEY,
            course_id TEXT NOT NULL,
            marking_period INTEGER NOT NULL CHECK(marking_period BETWEEN 1 AND 6),
            is_midterm INTEGER NOT NULL,
            is_final INTEGER NOT NULL,
            title TEXT NOT NULL,
            point_value INTEGER NOT NULL CHECK(point_value > 0),
            UNIQUE(course_id, marking_period, title),
            FOREIGN KEY(course_id) REFERENCES courses(id)
        )",
        [],
    )?;
    conn.execute(
        "CREATE INDEX IF NOT EXISTS idx_assignments_course_period ON assignments(course_id, marking_period)",
        [],
    )?;

    conn.execute(
        "CREATE TABLE IF NOT EXISTS assignment_grades(
            course_id TEXT NOT NULL,
            assignment_id TEXT NOT NULL,
            student_id TEXT NOT NULL,
            points_earned REAL NOT NULL,
            points_possible REAL NOT NULL,
            is_graded INTEGER NOT NULL,
            entered_at TEXT,
            PRIMARY KEY(assignment_id, student_id),
            FOREIGN KEY(course_id) REFERENCES courses(id),
            FOREIGN KEY(assignment_id) REFERENCES assignments(id),
            FOREIGN KEY(student_id) REFERENCES students(id)
        )",
        [],
    )?;
    conn.execute(
        "CREATE INDEX IF NOT EXISTS idx_assignment_grades_student ON assignment_grades(student_id)",
        [],
    )?;

    Ok(conn)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::{SystemTime, UNIX_EPOCH};

    fn temp_dir(prefix: &str) -> std::path::PathBuf {
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

    fn table_names(conn: &Connection) -> Vec<String> {
        let mut stmt = conn
            .prepare("SELECT name FROM sqlite_master WHERE type = 'table' ORDER BY name")
            .expect("prepare");
        let names = stmt
            .query_map([], |r| r.get::<_, String>(0))
            .expect("query")
            .collect::<Result<Vec<_>, _>>()
            .expect("collect");
        names
    }

    #[test]
    fn open_db_is_idempotent() {
        let ws = temp_dir("powerschool-open-db");
        drop(open_db(&ws).expect("first open"));
        let conn = open_db(&ws).expect("second open");
        assert!(ws.join(DB_FILE_NAME).is_file());
        assert_eq!(
            table_names(&conn),
            vec![
                "assignment_grades",
                "assignments",
                "course_grades",
                "courses",
                "departments",
                "students",
                "teachers",
            ]
        );
    }

    #[test]
    fn new_students_start_unranked_without_gpa() {
        let ws = temp_dir("powerschool-student-defaults");
        let conn = open_db(&ws).expect("open");
        conn.execute(
            "INSERT INTO students(id, first_name, last_name, grade_level) VALUES('s1', 'Ada', 'Byron', 11)",
            [],
        )
        .expect("insert");
        let (gpa, rank): (Option<f64>, i64) = conn
            .query_row("SELECT gpa, class_rank FROM students WHERE id = 's1'", [], |r| {
                Ok((r.get(0)?, r.get(1)?))
            })
            .expect("row");
        assert_eq!(gpa, None);
        assert_eq!(rank, 0);
    }

    #[test]
    fn teachers_require_an_existing_department() {
        let ws = temp_dir("powerschool-teacher-fk");
        let conn = open_db(&ws).expect("open");
        let res = conn.execute(
            "INSERT INTO teachers(id, first_name, last_name, department_id) VALUES('t1', 'Alan', 'Turing', 'nope')",
            [],
        );
        assert!(res.is_err());
    }
}
