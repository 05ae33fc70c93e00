pub(crate) mod assignments;
pub(crate) mod catalog;
pub(crate) mod health;
pub(crate) mod reports;
pub(crate) mod submissions;
pub(crate) mod users;
