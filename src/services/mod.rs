pub(crate) mod assignment_lifecycle;
pub(crate) mod catalog;
pub(crate) mod code_execution;
pub(crate) mod code_runner;
pub(crate) mod expiry;
pub(crate) mod notifications;
pub(crate) mod reporting;
pub(crate) mod scoring;
pub(crate) mod submission_views;
