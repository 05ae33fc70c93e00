//! Outbound e-mail. Delivery is best effort: callers record the outcome and move on.

use std::sync::Arc;

use anyhow::Context;
use async_trait::async_trait;
use lettre::{
    message::Mailbox, transport::smtp::authentication::Credentials, Address, AsyncSmtpTransport,
    AsyncTransport, Message, Tokio1Executor,
};
use thiserror::Error;

use crate::core::config::MailSettings;
use crate::core::state::AppState;
use crate::core::time::{format_primitive, primitive_now_utc};
use crate::db::models::{Submission, User};
use crate::repositories;
use crate::schemas::report::MonthlyReportResponse;
use crate::schemas::test::TestMetadata;

#[derive(Debug, Clone, PartialEq)]
pub(crate) struct OutgoingEmail {
    pub(crate) to_email: String,
    pub(crate) to_name: String,
    pub(crate) subject: String,
    pub(crate) body: String,
}

#[derive(Debug, Error)]
pub(crate) enum NotificationError {
    #[error("email delivery disabled")]
    Disabled,
    #[error("invalid email address: {0}")]
    InvalidAddress(String),
    #[error("failed to build email: {0}")]
    Build(String),
    #[error("smtp delivery failed: {0}")]
    Delivery(String),
}

#[async_trait]
pub(crate) trait Notifier: Send + Sync {
    async fn send(&self, email: OutgoingEmail) -> Result<(), NotificationError>;
}

pub(crate) struct SmtpNotifier {
    mailer: AsyncSmtpTransport<Tokio1Executor>,
    from: Mailbox,
}

impl SmtpNotifier {
    pub(crate) fn from_settings(settings: &MailSettings) -> anyhow::Result<Self> {
        let from_address: Address =
            settings.from_email.parse().context("Invalid MAIL_FROM_EMAIL address")?;
        let from = Mailbox::new(Some(settings.from_name.clone()), from_address);

        let mut builder = if settings.smtp_tls {
            AsyncSmtpTransport::<Tokio1Executor>::relay(&settings.smtp_host)
                .context("Invalid SMTP server for TLS")?
        } else {
            AsyncSmtpTransport::<Tokio1Executor>::builder_dangerous(&settings.smtp_host)
        }
        .port(settings.smtp_port);

        if !settings.smtp_username.is_empty() {
            builder = builder.credentials(Credentials::new(
                settings.smtp_username.clone(),
                settings.smtp_password.clone(),
            ));
        }

        Ok(Self { mailer: builder.build(), from })
    }
}

#[async_trait]
impl Notifier for SmtpNotifier {
    async fn send(&self, email: OutgoingEmail) -> Result<(), NotificationError> {
        let to_address: Address = email
            .to_email
            .parse()
            .map_err(|_| NotificationError::InvalidAddress(email.to_email.clone()))?;
        let to_name = (!email.to_name.is_empty()).then(|| email.to_name.clone());

        let message = Message::builder()
            .from(self.from.clone())
            .to(Mailbox::new(to_name, to_address))
            .subject(email.subject)
            .body(email.body)
            .map_err(|err| NotificationError::Build(err.to_string()))?;

        self.mailer
            .send(message)
            .await
            .map_err(|err| NotificationError::Delivery(err.to_string()))?;

        Ok(())
    }
}

/// Used when SMTP is not configured or sending is switched off.
pub(crate) struct DisabledNotifier;

#[async_trait]
impl Notifier for DisabledNotifier {
    async fn send(&self, _email: OutgoingEmail) -> Result<(), NotificationError> {
        Err(NotificationError::Disabled)
    }
}

pub(crate) fn notifier_from_settings(settings: &MailSettings) -> Arc<dyn Notifier> {
    if !settings.is_configured() {
        tracing::info!("Email delivery disabled");
        return Arc::new(DisabledNotifier);
    }

    match SmtpNotifier::from_settings(settings) {
        Ok(notifier) => Arc::new(notifier),
        Err(err) => {
            tracing::error!(error = %err, "Failed to configure SMTP; email delivery disabled");
            Arc::new(DisabledNotifier)
        }
    }
}

/// Fire-and-forget wrapper around [`send_result_emails`].
pub(crate) fn dispatch_result_emails(state: AppState, submission_id: String) {
    tokio::spawn(async move {
        if let Err(err) = send_result_emails(&state, &submission_id).await {
            tracing::error!(submission_id = %submission_id, error = %err, "Failed to send result emails");
        }
    });
}

/// Sends the student mail and, for admin-assigned work, the admin mail. Recipients
/// already marked as sent are skipped. Any failure ends up in the submission's
/// `email_last_error`.
pub(crate) async fn send_result_emails(state: &AppState, submission_id: &str) -> anyhow::Result<()> {
    let Err(err) = deliver_result_emails(state, submission_id).await else {
        return Ok(());
    };

    let message = format!("{err:#}");
    if let Err(record_err) = repositories::submissions::record_email_status(
        state.db(),
        submission_id,
        false,
        false,
        Some(&message),
        primitive_now_utc(),
    )
    .await
    {
        tracing::warn!(submission_id, error = %record_err, "Failed to record email error");
    }
    Err(err)
}

async fn deliver_result_emails(state: &AppState, submission_id: &str) -> anyhow::Result<()> {
    let db = state.db();
    let submission = repositories::submissions::find_by_id(db, submission_id)
        .await
        .context("Failed to load submission")?
        .context("Submission not found")?;
    let assignment = repositories::assignments::find_by_id(db, &submission.assignment_id)
        .await
        .context("Failed to load assignment")?
        .context("Assignment not found")?;
    let test = repositories::catalog::find_by_id(db, &assignment.test_id)
        .await
        .context("Failed to load test")?
        .context("Test not found")?;
    let student = repositories::users::find_by_id(db, &assignment.assigned_to)
        .await
        .context("Failed to load student")?
        .context("Student not found")?;

    let mut student_sent = false;
    let mut admin_sent = false;
    let mut last_error: Option<String> = None;

    if !submission.email_student_sent {
        let email = student_result_email(&student, &test.metadata, &submission);
        match state.notifier().send(email).await {
            Ok(()) => student_sent = true,
            Err(err) => {
                record_failure(submission_id, "student", &err);
                last_error = Some(err.to_string());
            }
        }
    }

    if !assignment.is_practice() && !submission.email_admin_sent {
        let admin = repositories::users::find_by_id(db, &assignment.assigned_by)
            .await
            .context("Failed to load assigning admin")?;
        if let Some(admin) = admin {
            let email = admin_result_email(&admin, &student, &test.metadata, &submission);
            match state.notifier().send(email).await {
                Ok(()) => admin_sent = true,
                Err(err) => {
                    record_failure(submission_id, "admin", &err);
                    last_error = Some(err.to_string());
                }
            }
        }
    }

    repositories::submissions::record_email_status(
        db,
        submission_id,
        student_sent,
        admin_sent,
        last_error.as_deref(),
        primitive_now_utc(),
    )
    .await
    .context("Failed to record email status")?;

    tracing::info!(submission_id, student_sent, admin_sent, "Result emails processed");
    Ok(())
}

fn record_failure(submission_id: &str, recipient: &'static str, err: &NotificationError) {
    metrics::counter!("result_emails_failed_total", "recipient" => recipient).increment(1);
    tracing::warn!(submission_id, recipient, error = %err, "Result email not delivered");
}

/// Notifies each newly assigned student. Failures are logged only.
pub(crate) fn dispatch_assignment_emails(
    state: AppState,
    students: Vec<User>,
    metadata: TestMetadata,
    expires_at: time::PrimitiveDateTime,
) {
    tokio::spawn(async move {
        for student in students {
            let email = assignment_email(&student, &metadata, expires_at);
            if let Err(err) = state.notifier().send(email).await {
                tracing::warn!(user_id = %student.id, error = %err, "Assignment email not delivered");
            }
        }
    });
}

pub(crate) async fn send_monthly_report(
    notifier: &dyn Notifier,
    student: &User,
    report: &MonthlyReportResponse,
) -> Result<(), NotificationError> {
    notifier.send(monthly_report_email(student, report)).await
}

fn score_line(value: Option<f64>, max: Option<f64>) -> String {
    match (value, max) {
        (Some(value), Some(max)) => format!("{value}/{max}"),
        (Some(value), None) => value.to_string(),
        _ => "-".to_string(),
    }
}

pub(crate) fn student_result_email(
    student: &User,
    metadata: &TestMetadata,
    submission: &Submission,
) -> OutgoingEmail {
    let body = format!(
        "Hello {name},\n\n\
         Your submission for \"{title}\" has been graded.\n\n\
         Test: {title}\n\
         Category: {category}\n\
         Total score: {total}\n\
         Quiz score: {quiz}\n\
         Coding score: {coding}\n",
        name = display_name(student),
        title = metadata.title,
        category = metadata.category,
        total = score_line(submission.score, submission.max_score),
        quiz = score_line(submission.quiz_score, None),
        coding = score_line(submission.coding_score, None),
    );

    OutgoingEmail {
        to_email: student.email.clone(),
        to_name: student.name.clone(),
        subject: format!("TalentTrack: Results for \"{}\"", metadata.title),
        body,
    }
}

pub(crate) fn admin_result_email(
    admin: &User,
    student: &User,
    metadata: &TestMetadata,
    submission: &Submission,
) -> OutgoingEmail {
    let submitted_at =
        submission.submitted_at.map(format_primitive).unwrap_or_else(|| "-".to_string());
    let body = format!(
        "Student: {name} <{email}>\n\
         Test: {title}\n\
         Category: {category}\n\
         Submitted at: {submitted_at}\n\
         Total score: {total}\n\
         Quiz score: {quiz}\n\
         Coding score: {coding}\n",
        name = display_name(student),
        email = student.email,
        title = metadata.title,
        category = metadata.category,
        total = score_line(submission.score, submission.max_score),
        quiz = score_line(submission.quiz_score, None),
        coding = score_line(submission.coding_score, None),
    );

    OutgoingEmail {
        to_email: admin.email.clone(),
        to_name: admin.name.clone(),
        subject: format!(
            "TalentTrack: Student Result — {} — \"{}\"",
            student.email, metadata.title
        ),
        body,
    }
}

pub(crate) fn assignment_email(
    student: &User,
    metadata: &TestMetadata,
    expires_at: time::PrimitiveDateTime,
) -> OutgoingEmail {
    let body = format!(
        "Hello {name},\n\n\
         A new test has been assigned to you.\n\n\
         Test: {title}\n\
         Category: {category}\n\
         Duration: {duration} minutes\n\
         Due: {due}\n",
        name = display_name(student),
        title = metadata.title,
        category = metadata.category,
        duration = metadata.duration_minutes,
        due = format_primitive(expires_at),
    );

    OutgoingEmail {
        to_email: student.email.clone(),
        to_name: student.name.clone(),
        subject: "TalentTrack: New Test Assigned".to_string(),
        body,
    }
}

pub(crate) fn monthly_report_email(student: &User, report: &MonthlyReportResponse) -> OutgoingEmail {
    let body = format!(
        "Hello {name},\n\n\
         Here is your summary for {month}.\n\n\
         Assigned tests: {assigned}\n\
         Completed: {completed}\n\
         Submissions: {submissions}\n\
         Average score: {avg}\n\
         Practice tests taken: {practice}\n",
        name = display_name(student),
        month = report.month_name,
        assigned = report.assigned_total,
        completed = report.assigned_completed,
        submissions = report.submissions,
        avg = report.avg_score,
        practice = report.practice_taken,
    );

    OutgoingEmail {
        to_email: student.email.clone(),
        to_name: student.name.clone(),
        subject: format!("TalentTrack: Monthly Report — {}", report.month_name),
        body,
    }
}

fn display_name(user: &User) -> &str {
    if user.name.trim().is_empty() {
        &user.email
    } else {
        &user.name
    }
}
