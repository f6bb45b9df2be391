mod test_support;

use serde_json::json;
use test_support::{assert_close, f64_field, str_field, Session};

struct School {
    session: Session,
    course_id: String,
    student_id: String,
    quiz_a: String,
    quiz_b: String,
}

fn setup(prefix: &str) -> School {
    let mut session = Session::with_workspace(prefix);
    let course = session.ok(
        "courses.create",
        json!({ "courseNo": "MAT101", "title": "Algebra I", "creditHours": 3 }),
    );
    let course_id = str_field(&course, "courseId");
    let student = session.ok(
        "students.create",
        json!({ "firstName": "Ada", "lastName": "Byron", "gradeLevel": 11, "graduation": 2027 }),
    );
    let student_id = str_field(&student, "studentId");
    session.enroll(&course_id, &student_id);

    let quiz_a = session.create_assignment(&course_id, 1, "Quiz A", 50);
    let quiz_b = session.create_assignment(&course_id, 1, "Quiz B", 50);

    School {
        session,
        course_id,
        student_id,
        quiz_a,
        quiz_b,
    }
}

#[test]
fn two_quizzes_average_into_course_grade_and_gpa() {
    let mut s = setup("powerschool-entry");

    let first = s.session.enter(&s.course_id, &s.quiz_a, &s.student_id, 45.0);
    assert_close(f64_field(&first, "periodAverage"), 90.0);
    assert_close(f64_field(&first, "courseGrade"), 90.0);
    assert_close(f64_field(&first, "gpa"), 3.7);

    let second = s.session.enter(&s.course_id, &s.quiz_b, &s.student_id, 40.0);
    assert_eq!(second["markingPeriod"], json!(1));
    assert_close(f64_field(&second, "periodAverage"), 85.0);
    assert_close(f64_field(&second, "courseGrade"), 85.0);
    assert_close(f64_field(&second, "gpa"), 3.0);

    let view = s
        .session
        .ok("students.courseGrades", json!({ "studentId": s.student_id }));
    assert_close(f64_field(&view, "gpa"), 3.0);
    let course = &view["courses"][0];
    assert_eq!(str_field(course, "courseNo"), "MAT101");
    assert_close(course["markingPeriods"]["mp1"].as_f64(), 85.0);
    assert!(course["markingPeriods"]["mp2"].is_null());
    assert!(course["markingPeriods"]["final_exam"].is_null());
    assert_close(f64_field(course, "points"), 3.0);
}

#[test]
fn reentering_a_grade_replaces_the_previous_score() {
    let mut s = setup("powerschool-reentry");

    for points in [10.0, 50.0] {
        let _ = s.session.enter(&s.course_id, &s.quiz_a, &s.student_id, points);
    }

    let current = s.session.ok(
        "grades.get",
        json!({ "assignmentId": s.quiz_a, "studentId": s.student_id }),
    );
    assert_close(current["grade"]["pointsEarned"].as_f64(), 50.0);

    let listing = s.session.ok(
        "students.assignmentGrades",
        json!({ "studentId": s.student_id, "courseId": s.course_id, "markingPeriod": 1 }),
    );
    let rows = listing["assignments"].as_array().expect("assignments");
    assert_eq!(rows.len(), 2);
    assert_close(rows[0]["pointsEarned"].as_f64(), 50.0);
    assert!(rows[1]["pointsEarned"].is_null());

    let view = s
        .session
        .ok("students.courseGrades", json!({ "studentId": s.student_id }));
    assert_close(view["courses"][0]["grade"].as_f64(), 100.0);
    assert_close(f64_field(&view, "gpa"), 4.0);
}

#[test]
fn invalid_entries_are_rejected_without_side_effects() {
    let mut s = setup("powerschool-invalid-entry");

    let entry = |course_id: &str, student_id: &str, points: i64| {
        json!({
            "courseId": course_id,
            "assignmentId": s.quiz_a,
            "studentId": student_id,
            "pointsEarned": points
        })
    };

    let too_many = entry(&s.course_id, &s.student_id, 51);
    let negative = entry(&s.course_id, &s.student_id, -1);
    let wrong_course = entry("no-such-course", &s.student_id, 20);
    assert_eq!(s.session.err_code("grades.enter", too_many), "bad_params");
    assert_eq!(s.session.err_code("grades.enter", negative), "bad_params");
    assert_eq!(s.session.err_code("grades.enter", wrong_course), "bad_params");

    let other = s.session.create_student("Grace", "Hopper", 11);
    let unenrolled = json!({
        "courseId": s.course_id,
        "assignmentId": s.quiz_a,
        "studentId": other,
        "pointsEarned": 20
    });
    assert_eq!(s.session.err_code("grades.enter", unenrolled), "not_found");

    let current = s.session.ok(
        "grades.get",
        json!({ "assignmentId": s.quiz_a, "studentId": s.student_id }),
    );
    assert!(current["grade"].is_null());

    let code = s.session.err_code(
        "assignments.create",
        json!({ "courseId": s.course_id, "markingPeriod": 7, "title": "Bonus", "pointValue": 10 }),
    );
    assert_eq!(code, "unknown_marking_period");
}

#[test]
fn periods_and_exams_average_into_one_course_grade() {
    let mut s = setup("powerschool-exams");

    let midterm = s.session.create_assignment(&s.course_id, 5, "Midterm", 100);
    let _ = s.session.enter(&s.course_id, &s.quiz_a, &s.student_id, 50.0);
    let out = s.session.enter(&s.course_id, &midterm, &s.student_id, 70.0);
    assert_eq!(out["markingPeriod"], json!(5));
    assert_close(f64_field(&out, "periodAverage"), 70.0);
    // (100 + 70) / 2
    assert_close(f64_field(&out, "courseGrade"), 85.0);
    assert_close(f64_field(&out, "gpa"), 3.0);
}
