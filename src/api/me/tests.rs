use std::sync::Arc;
use std::time::Duration as StdDuration;

use axum::http::{Method, StatusCode};
use serde_json::json;
use time::Duration;
use tokio::task::JoinSet;
use tower::ServiceExt;

use crate::core::time::primitive_now_utc;
use crate::db::models::Submission;
use crate::db::types::AssignmentStatus;
use crate::repositories;
use crate::schemas::submission::SubmitRequest;
use crate::services::assignment_lifecycle;
use crate::services::notifications::{self, DisabledNotifier, OutgoingEmail};
use crate::test_support::{self, RecordingNotifier, ScriptedRunner};

fn full_marks_payload() -> serde_json::Value {
    json!({
        "quiz_answers": [
            { "question_id": "q1", "selected_option": "A" },
            { "question_id": "q2", "selected_option": "B" }
        ],
        "coding": [
            {
                "problem_id": "sum",
                "language": "python",
                "source_code": "a, b = map(int, input().split())\nprint(a + b)\n"
            },
            {
                "problem_id": "reverse",
                "language": "javascript",
                "source_code": "console.log(require('fs').readFileSync(0, 'utf8').trim().split('').reverse().join(''))"
            }
        ]
    })
}

async fn call(
    app: &axum::Router,
    method: Method,
    uri: &str,
    token: Option<&str>,
    body: Option<serde_json::Value>,
) -> (StatusCode, serde_json::Value) {
    let response = app
        .clone()
        .oneshot(test_support::json_request(method, uri, token, body))
        .await
        .expect("response");
    let status = response.status();
    (status, test_support::read_json(response).await)
}

async fn wait_for_mail(notifier: &RecordingNotifier, count: usize) -> Vec<OutgoingEmail> {
    for _ in 0..100 {
        let sent = notifier.sent();
        if sent.len() >= count {
            return sent;
        }
        tokio::time::sleep(StdDuration::from_millis(20)).await;
    }
    notifier.sent()
}

async fn load_submission(pool: &sqlx::PgPool, assignment_id: &str) -> Submission {
    repositories::submissions::find_by_assignment(pool, assignment_id)
        .await
        .expect("load submission")
        .expect("submission exists")
}

#[tokio::test]
async fn start_then_submit_grades_the_attempt() {
    let ctx = test_support::setup_test_context().await;
    let pool = ctx.state.db();
    let admin = test_support::insert_admin(pool, "admin@example.com").await;
    let student = test_support::insert_student(pool, "student@example.com").await;
    let test = test_support::insert_fixture_test(pool, "mix").await;
    let assignment = test_support::insert_assignment(
        pool,
        &test.id,
        &student.id,
        &admin.id,
        AssignmentStatus::Assigned,
        primitive_now_utc() + Duration::days(1),
    )
    .await;
    let token = test_support::bearer_token(&student.id, ctx.state.settings());
    let base = format!("/api/v1/me/assignments/{}", assignment.id);

    let (status, started) =
        call(&ctx.app, Method::POST, &format!("{base}/start"), Some(&token), None).await;
    assert_eq!(status, StatusCode::OK, "response: {started}");
    assert_eq!(started["assignment"]["status"], "in_progress");
    assert!(started["assignment"]["started_at"].is_string());

    let (status, submitted) = call(
        &ctx.app,
        Method::POST,
        &format!("{base}/submit"),
        Some(&token),
        Some(full_marks_payload()),
    )
    .await;
    assert_eq!(status, StatusCode::OK, "response: {submitted}");
    let submission = &submitted["submission"];
    assert_eq!(submission["score"], 82.0);
    assert_eq!(submission["max_score"], 82.0);
    assert_eq!(submission["section_scores"]["quiz"], 2.0);
    assert_eq!(submission["section_scores"]["coding"], 80.0);
    assert_eq!(submission["breakdown"]["coding_passed_hidden"], 4);
    assert_eq!(submission["coding"][0]["hidden_summary"]["total"], 2);
    assert!(!submitted.to_string().contains("olleh"), "hidden case leaked: {submitted}");

    assert_eq!(
        test_support::assignment_status(pool, &assignment.id).await,
        AssignmentStatus::Submitted
    );

    let sent = wait_for_mail(&ctx.notifier, 2).await;
    let recipients: Vec<&str> = sent.iter().map(|email| email.to_email.as_str()).collect();
    assert!(recipients.contains(&"student@example.com"), "sent: {recipients:?}");
    assert!(recipients.contains(&"admin@example.com"), "sent: {recipients:?}");

    let (status, history) =
        call(&ctx.app, Method::GET, "/api/v1/me/submissions", Some(&token), None).await;
    assert_eq!(status, StatusCode::OK);
    let items = history.as_array().expect("list");
    assert_eq!(items.len(), 1);
    assert_eq!(items[0]["test_title"], "Mixed Fundamentals");
    assert!(items[0].get("user_email").is_none());
}

#[tokio::test]
async fn second_submit_is_rejected() {
    let ctx = test_support::setup_test_context().await;
    let pool = ctx.state.db();
    let admin = test_support::insert_admin(pool, "admin@example.com").await;
    let student = test_support::insert_student(pool, "student@example.com").await;
    let test = test_support::insert_fixture_test(pool, "mix").await;
    let assignment = test_support::insert_assignment(
        pool,
        &test.id,
        &student.id,
        &admin.id,
        AssignmentStatus::InProgress,
        primitive_now_utc() + Duration::days(1),
    )
    .await;
    let token = test_support::bearer_token(&student.id, ctx.state.settings());
    let uri = format!("/api/v1/me/assignments/{}/submit", assignment.id);

    let (status, _) =
        call(&ctx.app, Method::POST, &uri, Some(&token), Some(full_marks_payload())).await;
    assert_eq!(status, StatusCode::OK);

    let (status, body) =
        call(&ctx.app, Method::POST, &uri, Some(&token), Some(full_marks_payload())).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["detail"], "Assignment already submitted");

    let (status, _) = call(
        &ctx.app,
        Method::POST,
        &format!("/api/v1/me/assignments/{}/start", assignment.id),
        Some(&token),
        None,
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn overdue_assignment_is_expired_on_access() {
    let ctx = test_support::setup_test_context().await;
    let pool = ctx.state.db();
    let admin = test_support::insert_admin(pool, "admin@example.com").await;
    let student = test_support::insert_student(pool, "student@example.com").await;
    let test = test_support::insert_fixture_test(pool, "mix").await;
    let assignment = test_support::insert_assignment(
        pool,
        &test.id,
        &student.id,
        &admin.id,
        AssignmentStatus::InProgress,
        primitive_now_utc() + Duration::days(1),
    )
    .await;
    test_support::set_expires_at(pool, &assignment.id, primitive_now_utc() - Duration::minutes(1))
        .await;
    let token = test_support::bearer_token(&student.id, ctx.state.settings());

    let (status, body) = call(
        &ctx.app,
        Method::GET,
        &format!("/api/v1/me/assignments/{}", assignment.id),
        Some(&token),
        None,
    )
    .await;
    assert_eq!(status, StatusCode::FORBIDDEN, "response: {body}");
    assert_eq!(
        test_support::assignment_status(pool, &assignment.id).await,
        AssignmentStatus::Expired
    );

    let (status, _) = call(
        &ctx.app,
        Method::POST,
        &format!("/api/v1/me/assignments/{}/submit", assignment.id),
        Some(&token),
        Some(full_marks_payload()),
    )
    .await;
    assert_eq!(status, StatusCode::FORBIDDEN);
    assert_eq!(ctx.runner.calls(), 0);
}

#[tokio::test]
async fn detail_hides_answers_and_hidden_cases() {
    let ctx = test_support::setup_test_context().await;
    let pool = ctx.state.db();
    let admin = test_support::insert_admin(pool, "admin@example.com").await;
    let student = test_support::insert_student(pool, "student@example.com").await;
    let test = test_support::insert_fixture_test(pool, "mix").await;
    let assignment = test_support::insert_assignment(
        pool,
        &test.id,
        &student.id,
        &admin.id,
        AssignmentStatus::Assigned,
        primitive_now_utc() + Duration::days(1),
    )
    .await;
    let token = test_support::bearer_token(&student.id, ctx.state.settings());

    let (status, body) = call(
        &ctx.app,
        Method::GET,
        &format!("/api/v1/me/assignments/{}", assignment.id),
        Some(&token),
        None,
    )
    .await;
    assert_eq!(status, StatusCode::OK, "response: {body}");
    assert_eq!(body["effective_config"]["duration_minutes"], 30);
    let text = body.to_string();
    assert!(!text.contains("correct_answer"), "answers leaked: {text}");
    assert!(!text.contains("olleh"), "hidden case leaked: {text}");
    assert!(text.contains("cba"));

    let (status, listed) =
        call(&ctx.app, Method::GET, "/api/v1/me/assignments", Some(&token), None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(listed.as_array().map(Vec::len), Some(1));
    assert_eq!(listed[0]["test"]["metadata"]["title"], "Mixed Fundamentals");
}

#[tokio::test]
async fn other_students_assignment_is_not_found() {
    let ctx = test_support::setup_test_context().await;
    let pool = ctx.state.db();
    let admin = test_support::insert_admin(pool, "admin@example.com").await;
    let owner = test_support::insert_student(pool, "owner@example.com").await;
    let other = test_support::insert_student(pool, "other@example.com").await;
    let test = test_support::insert_fixture_test(pool, "mix").await;
    let assignment = test_support::insert_assignment(
        pool,
        &test.id,
        &owner.id,
        &admin.id,
        AssignmentStatus::Assigned,
        primitive_now_utc() + Duration::days(1),
    )
    .await;
    let token = test_support::bearer_token(&other.id, ctx.state.settings());

    let (status, _) = call(
        &ctx.app,
        Method::POST,
        &format!("/api/v1/me/assignments/{}/start", assignment.id),
        Some(&token),
        None,
    )
    .await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(
        test_support::assignment_status(pool, &assignment.id).await,
        AssignmentStatus::Assigned
    );
}

#[tokio::test]
async fn run_uses_only_sample_cases() {
    let ctx = test_support::setup_test_context_with(ScriptedRunner::echo()).await;
    let pool = ctx.state.db();
    let admin = test_support::insert_admin(pool, "admin@example.com").await;
    let student = test_support::insert_student(pool, "student@example.com").await;
    let test = test_support::insert_fixture_test(pool, "mix").await;
    let assignment = test_support::insert_assignment(
        pool,
        &test.id,
        &student.id,
        &admin.id,
        AssignmentStatus::InProgress,
        primitive_now_utc() + Duration::days(1),
    )
    .await;
    let token = test_support::bearer_token(&student.id, ctx.state.settings());

    let (status, body) = call(
        &ctx.app,
        Method::POST,
        &format!("/api/v1/me/assignments/{}/run", assignment.id),
        Some(&token),
        Some(json!({ "problem_id": "reverse", "language": "javascript", "source_code": "x" })),
    )
    .await;
    assert_eq!(status, StatusCode::OK, "response: {body}");
    assert_eq!(body["problem_id"], "reverse");
    assert_eq!(body["results"].as_array().map(Vec::len), Some(2));
    assert_eq!(ctx.runner.sent_inputs(), vec!["abc".to_string(), "xy".to_string()]);

    let (status, body) = call(
        &ctx.app,
        Method::POST,
        &format!("/api/v1/me/assignments/{}/run-custom", assignment.id),
        Some(&token),
        Some(json!({ "language": "python", "source_code": "x", "custom_input": "ping" })),
    )
    .await;
    assert_eq!(status, StatusCode::OK, "response: {body}");
    assert_eq!(body["actual_output"], "ping");
}

#[tokio::test]
async fn run_requires_started_assignment() {
    let ctx = test_support::setup_test_context().await;
    let pool = ctx.state.db();
    let admin = test_support::insert_admin(pool, "admin@example.com").await;
    let student = test_support::insert_student(pool, "student@example.com").await;
    let test = test_support::insert_fixture_test(pool, "mix").await;
    let assignment = test_support::insert_assignment(
        pool,
        &test.id,
        &student.id,
        &admin.id,
        AssignmentStatus::Assigned,
        primitive_now_utc() + Duration::days(1),
    )
    .await;
    let token = test_support::bearer_token(&student.id, ctx.state.settings());

    let (status, body) = call(
        &ctx.app,
        Method::POST,
        &format!("/api/v1/me/assignments/{}/run", assignment.id),
        Some(&token),
        Some(json!({ "problem_id": "sum", "language": "python", "source_code": "x" })),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["detail"], "Assignment is not in progress");
    assert_eq!(ctx.runner.calls(), 0);
}

#[tokio::test]
async fn practice_attempt_is_self_assigned() {
    let ctx = test_support::setup_test_context().await;
    let pool = ctx.state.db();
    let student = test_support::insert_student(pool, "student@example.com").await;
    test_support::insert_fixture_test(pool, "graded").await;
    let practice = test_support::insert_practice_test(pool, "practice").await;
    let token = test_support::bearer_token(&student.id, ctx.state.settings());

    let (status, listed) =
        call(&ctx.app, Method::GET, "/api/v1/me/practice-tests", Some(&token), None).await;
    assert_eq!(status, StatusCode::OK);
    let listed = listed.as_array().expect("list");
    assert_eq!(listed.len(), 1);
    assert_eq!(listed[0]["id"], practice.id.as_str());

    let (status, started) = call(
        &ctx.app,
        Method::POST,
        "/api/v1/me/practice/start",
        Some(&token),
        Some(json!({ "test_id": practice.id })),
    )
    .await;
    assert_eq!(status, StatusCode::CREATED, "response: {started}");
    assert_eq!(started["assignment"]["status"], "in_progress");
    assert_eq!(started["assignment"]["is_practice"], true);
    assert_eq!(started["assignment"]["override_config"]["duration_minutes"], 30);
    let assignment_id = started["assignment_id"].as_str().expect("id").to_string();

    let (status, _) = call(
        &ctx.app,
        Method::POST,
        &format!("/api/v1/me/assignments/{assignment_id}/submit"),
        Some(&token),
        Some(full_marks_payload()),
    )
    .await;
    assert_eq!(status, StatusCode::OK);

    let sent = wait_for_mail(&ctx.notifier, 1).await;
    assert_eq!(sent.len(), 1);
    assert_eq!(sent[0].to_email, "student@example.com");

    let (status, assigned) =
        call(&ctx.app, Method::GET, "/api/v1/me/assignments", Some(&token), None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(assigned.as_array().map(Vec::len), Some(0));

    let (status, dashboard) =
        call(&ctx.app, Method::GET, "/api/v1/me/dashboard", Some(&token), None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(dashboard["practice_taken_this_month"], 1);
    assert_eq!(dashboard["assigned_taken_this_month"], 0);
}

#[tokio::test]
async fn non_practice_test_cannot_be_started_as_practice() {
    let ctx = test_support::setup_test_context().await;
    let pool = ctx.state.db();
    let student = test_support::insert_student(pool, "student@example.com").await;
    let test = test_support::insert_fixture_test(pool, "graded").await;
    let token = test_support::bearer_token(&student.id, ctx.state.settings());

    let (status, _) = call(
        &ctx.app,
        Method::POST,
        "/api/v1/me/practice/start",
        Some(&token),
        Some(json!({ "test_id": test.id })),
    )
    .await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn monthly_report_can_be_emailed() {
    let ctx = test_support::setup_test_context().await;
    let pool = ctx.state.db();
    let student = test_support::insert_student(pool, "student@example.com").await;
    let token = test_support::bearer_token(&student.id, ctx.state.settings());

    let (status, report) =
        call(&ctx.app, Method::GET, "/api/v1/me/reports/monthly", Some(&token), None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(report["assigned_total"], 0);
    assert_eq!(report["avg_score"], 0);

    let (status, body) =
        call(&ctx.app, Method::POST, "/api/v1/me/reports/monthly/email", Some(&token), None)
            .await;
    assert_eq!(status, StatusCode::OK, "response: {body}");
    assert_eq!(body["report"]["month"], report["month"]);
    let sent = ctx.notifier.sent();
    assert_eq!(sent.len(), 1);
    assert_eq!(sent[0].to_email, "student@example.com");
}

#[tokio::test]
async fn requests_without_token_are_unauthorized() {
    let ctx = test_support::setup_test_context().await;

    let response = ctx
        .app
        .clone()
        .oneshot(test_support::json_request(Method::GET, "/api/v1/me/dashboard", None, None))
        .await
        .expect("response");
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn failed_grading_write_is_finished_by_recovery() {
    let ctx = test_support::setup_test_context().await;
    let pool = ctx.state.db();
    let admin = test_support::insert_admin(pool, "admin@example.com").await;
    let student = test_support::insert_student(pool, "student@example.com").await;
    let test = test_support::insert_fixture_test(pool, "mix").await;
    let assignment = test_support::insert_assignment(
        pool,
        &test.id,
        &student.id,
        &admin.id,
        AssignmentStatus::InProgress,
        primitive_now_utc() + Duration::days(1),
    )
    .await;
    let token = test_support::bearer_token(&student.id, ctx.state.settings());
    let submit_uri = format!("/api/v1/me/assignments/{}/submit", assignment.id);

    sqlx::query(
        "CREATE FUNCTION reject_graded_write() RETURNS trigger AS $$
         BEGIN
             IF NEW.score IS NOT NULL THEN
                 RAISE EXCEPTION 'graded write rejected';
             END IF;
             RETURN NEW;
         END $$ LANGUAGE plpgsql",
    )
    .execute(pool)
    .await
    .expect("create function");
    sqlx::query(
        "CREATE TRIGGER reject_graded_write BEFORE UPDATE ON submissions
         FOR EACH ROW EXECUTE FUNCTION reject_graded_write()",
    )
    .execute(pool)
    .await
    .expect("create trigger");

    let (status, body) =
        call(&ctx.app, Method::POST, &submit_uri, Some(&token), Some(full_marks_payload())).await;
    assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR, "response: {body}");
    assert_eq!(
        test_support::assignment_status(pool, &assignment.id).await,
        AssignmentStatus::Submitted
    );
    let staged = load_submission(pool, &assignment.id).await;
    assert_eq!(staged.score, None);
    let staged_answers = staged.pending_answers.as_ref().expect("answers kept for grading");
    assert_eq!(staged_answers.0.quiz_answers.len(), 2);
    assert_eq!(staged_answers.0.coding.len(), 2);

    let (status, body) =
        call(&ctx.app, Method::POST, &submit_uri, Some(&token), Some(full_marks_payload())).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["detail"], "Assignment already submitted");

    sqlx::query("DROP TRIGGER reject_graded_write ON submissions")
        .execute(pool)
        .await
        .expect("drop trigger");

    let stale_before = primitive_now_utc() + Duration::seconds(1);
    let graded = assignment_lifecycle::recover_ungraded(&ctx.state, stale_before)
        .await
        .expect("recover");
    assert_eq!(graded, 1);

    let submission = load_submission(pool, &assignment.id).await;
    assert_eq!(submission.score, Some(82.0));
    assert_eq!(submission.max_score, Some(82.0));
    assert!(submission.pending_answers.is_none());
    assert_eq!(test_support::submission_count(pool, &assignment.id).await, 1);

    let sent = wait_for_mail(&ctx.notifier, 2).await;
    assert_eq!(sent.len(), 2);

    let graded = assignment_lifecycle::recover_ungraded(&ctx.state, stale_before)
        .await
        .expect("recover again");
    assert_eq!(graded, 0);
}

#[tokio::test]
async fn recovery_leaves_fresh_submissions_to_their_request() {
    let ctx = test_support::setup_test_context().await;
    let pool = ctx.state.db();
    let admin = test_support::insert_admin(pool, "admin@example.com").await;
    let student = test_support::insert_student(pool, "student@example.com").await;
    let test = test_support::insert_fixture_test(pool, "mix").await;
    let assignment = test_support::insert_assignment(
        pool,
        &test.id,
        &student.id,
        &admin.id,
        AssignmentStatus::Submitted,
        primitive_now_utc() + Duration::days(1),
    )
    .await;
    let answers: SubmitRequest =
        serde_json::from_value(full_marks_payload()).expect("submit payload");
    let now = primitive_now_utc();
    repositories::submissions::stage_answers(
        pool,
        "staged-submission",
        &assignment.id,
        &student.id,
        now,
        &answers,
        now,
    )
    .await
    .expect("stage answers");

    let graded = assignment_lifecycle::recover_ungraded(&ctx.state, now - Duration::minutes(2))
        .await
        .expect("recover");
    assert_eq!(graded, 0);
    assert_eq!(ctx.runner.calls(), 0);
    assert_eq!(load_submission(pool, &assignment.id).await.score, None);
}

#[tokio::test]
async fn runner_outage_still_grades_the_quiz() {
    let ctx = test_support::setup_test_context_with(ScriptedRunner::failing("connection refused"))
        .await;
    let pool = ctx.state.db();
    let admin = test_support::insert_admin(pool, "admin@example.com").await;
    let student = test_support::insert_student(pool, "student@example.com").await;
    let test = test_support::insert_fixture_test(pool, "mix").await;
    let assignment = test_support::insert_assignment(
        pool,
        &test.id,
        &student.id,
        &admin.id,
        AssignmentStatus::InProgress,
        primitive_now_utc() + Duration::days(1),
    )
    .await;
    let token = test_support::bearer_token(&student.id, ctx.state.settings());

    let (status, body) = call(
        &ctx.app,
        Method::POST,
        &format!("/api/v1/me/assignments/{}/submit", assignment.id),
        Some(&token),
        Some(full_marks_payload()),
    )
    .await;
    assert_eq!(status, StatusCode::OK, "response: {body}");
    let submission = &body["submission"];
    assert_eq!(submission["section_scores"]["quiz"], 2.0);
    assert_eq!(submission["section_scores"]["coding"], 0.0);
    assert_eq!(submission["score"], 2.0);
    assert_eq!(submission["max_score"], 82.0);
    assert_eq!(submission["breakdown"]["coding_passed_hidden"], 0);
    assert_eq!(ctx.runner.calls(), 4);
    assert_eq!(test_support::submission_count(pool, &assignment.id).await, 1);
}

#[tokio::test]
async fn concurrent_submits_grade_exactly_once() {
    let ctx = test_support::setup_test_context().await;
    let pool = ctx.state.db();
    let admin = test_support::insert_admin(pool, "admin@example.com").await;
    let student = test_support::insert_student(pool, "student@example.com").await;
    let test = test_support::insert_fixture_test(pool, "mix").await;
    let assignment = test_support::insert_assignment(
        pool,
        &test.id,
        &student.id,
        &admin.id,
        AssignmentStatus::InProgress,
        primitive_now_utc() + Duration::days(1),
    )
    .await;
    let token = test_support::bearer_token(&student.id, ctx.state.settings());
    let uri = format!("/api/v1/me/assignments/{}/submit", assignment.id);

    let mut requests = JoinSet::new();
    for _ in 0..8 {
        let app = ctx.app.clone();
        let uri = uri.clone();
        let token = token.clone();
        requests.spawn(async move {
            app.oneshot(test_support::json_request(
                Method::POST,
                &uri,
                Some(&token),
                Some(full_marks_payload()),
            ))
            .await
            .expect("response")
            .status()
        });
    }

    let mut statuses = Vec::new();
    while let Some(status) = requests.join_next().await {
        statuses.push(status.expect("request task"));
    }
    let accepted = statuses.iter().filter(|status| **status == StatusCode::OK).count();
    let rejected = statuses.iter().filter(|status| **status == StatusCode::BAD_REQUEST).count();
    assert_eq!((accepted, rejected), (1, 7), "statuses: {statuses:?}");

    assert_eq!(test_support::submission_count(pool, &assignment.id).await, 1);
    assert_eq!(ctx.runner.calls(), 4);
    assert_eq!(load_submission(pool, &assignment.id).await.score, Some(82.0));
}

#[tokio::test]
async fn restarting_an_attempt_keeps_one_submission() {
    let ctx = test_support::setup_test_context().await;
    let pool = ctx.state.db();
    let admin = test_support::insert_admin(pool, "admin@example.com").await;
    let student = test_support::insert_student(pool, "student@example.com").await;
    let test = test_support::insert_fixture_test(pool, "mix").await;
    let assignment = test_support::insert_assignment(
        pool,
        &test.id,
        &student.id,
        &admin.id,
        AssignmentStatus::Assigned,
        primitive_now_utc() + Duration::days(1),
    )
    .await;
    let token = test_support::bearer_token(&student.id, ctx.state.settings());
    let start_uri = format!("/api/v1/me/assignments/{}/start", assignment.id);

    let (status, first) = call(&ctx.app, Method::POST, &start_uri, Some(&token), None).await;
    assert_eq!(status, StatusCode::OK, "response: {first}");
    let (status, second) = call(&ctx.app, Method::POST, &start_uri, Some(&token), None).await;
    assert_eq!(status, StatusCode::OK, "response: {second}");

    assert_eq!(second["assignment"]["status"], "in_progress");
    assert_eq!(second["assignment"]["started_at"], first["assignment"]["started_at"]);
    assert_eq!(test_support::submission_count(pool, &assignment.id).await, 1);
}

#[tokio::test]
async fn repeated_lazy_expiry_changes_nothing() {
    let ctx = test_support::setup_test_context().await;
    let pool = ctx.state.db();
    let admin = test_support::insert_admin(pool, "admin@example.com").await;
    let student = test_support::insert_student(pool, "student@example.com").await;
    let test = test_support::insert_fixture_test(pool, "mix").await;
    let assignment = test_support::insert_assignment(
        pool,
        &test.id,
        &student.id,
        &admin.id,
        AssignmentStatus::Assigned,
        primitive_now_utc() + Duration::days(1),
    )
    .await;
    test_support::set_expires_at(pool, &assignment.id, primitive_now_utc() - Duration::minutes(1))
        .await;
    let stale = repositories::assignments::find_by_id(pool, &assignment.id)
        .await
        .expect("load")
        .expect("assignment");

    let expired = assignment_lifecycle::check_expiry(pool, stale.clone(), primitive_now_utc())
        .await
        .expect("first check");
    assert_eq!(expired.status, AssignmentStatus::Expired);

    let again = assignment_lifecycle::check_expiry(pool, expired.clone(), primitive_now_utc())
        .await
        .expect("second check");
    assert_eq!(again.status, AssignmentStatus::Expired);
    assert_eq!(again.updated_at, expired.updated_at);

    // A caller still holding the pre-expiry row gets the stored state back.
    let from_stale = assignment_lifecycle::check_expiry(pool, stale, primitive_now_utc())
        .await
        .expect("stale check");
    assert_eq!(from_stale.status, AssignmentStatus::Expired);
    assert_eq!(from_stale.updated_at, expired.updated_at);
}

#[tokio::test]
async fn undeliverable_result_mail_is_recorded_on_the_submission() {
    let ctx = test_support::setup_test_context().await;
    let pool = ctx.state.db();
    let admin = test_support::insert_admin(pool, "admin@example.com").await;
    let student = test_support::insert_student(pool, "student@example.com").await;
    let test = test_support::insert_fixture_test(pool, "mix").await;
    let assignment = test_support::insert_assignment(
        pool,
        &test.id,
        &student.id,
        &admin.id,
        AssignmentStatus::InProgress,
        primitive_now_utc() + Duration::days(1),
    )
    .await;
    let state = ctx.state_with_notifier(Arc::new(DisabledNotifier));
    let answers: SubmitRequest =
        serde_json::from_value(full_marks_payload()).expect("submit payload");

    let submission = assignment_lifecycle::submit(&state, &assignment.id, &student, &answers)
        .await
        .expect("submit succeeds without mail");
    assert_eq!(submission.score, Some(82.0));

    let mut recorded = load_submission(pool, &assignment.id).await;
    for _ in 0..100 {
        if recorded.email_last_error.is_some() {
            break;
        }
        tokio::time::sleep(StdDuration::from_millis(20)).await;
        recorded = load_submission(pool, &assignment.id).await;
    }
    assert_eq!(recorded.email_last_error.as_deref(), Some("email delivery disabled"));
    assert!(!recorded.email_student_sent);
    assert!(!recorded.email_admin_sent);
    assert_eq!(recorded.score, Some(82.0));
}

#[tokio::test]
async fn result_mail_lookup_failure_is_recorded_on_the_submission() {
    let ctx = test_support::setup_test_context().await;
    let pool = ctx.state.db();
    let admin = test_support::insert_admin(pool, "admin@example.com").await;
    let student = test_support::insert_student(pool, "student@example.com").await;
    let test = test_support::insert_fixture_test(pool, "mix").await;
    let assignment = test_support::insert_assignment(
        pool,
        &test.id,
        &student.id,
        &admin.id,
        AssignmentStatus::InProgress,
        primitive_now_utc() + Duration::days(1),
    )
    .await;
    let token = test_support::bearer_token(&student.id, ctx.state.settings());

    let (status, _) = call(
        &ctx.app,
        Method::POST,
        &format!("/api/v1/me/assignments/{}/submit", assignment.id),
        Some(&token),
        Some(full_marks_payload()),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    wait_for_mail(&ctx.notifier, 2).await;
    let submission = load_submission(pool, &assignment.id).await;

    sqlx::query("UPDATE tests SET metadata = '{}'::jsonb WHERE id = $1")
        .bind(&test.id)
        .execute(pool)
        .await
        .expect("break test metadata");

    let result = notifications::send_result_emails(&ctx.state, &submission.id).await;
    assert!(result.is_err());

    let recorded = load_submission(pool, &assignment.id).await;
    let last_error = recorded.email_last_error.expect("error recorded");
    assert!(last_error.contains("Failed to load test"), "recorded: {last_error}");
}
