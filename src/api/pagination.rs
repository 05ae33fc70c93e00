use serde::Deserialize;

pub(crate) const fn default_limit() -> i64 {
    100
}

#[derive(Debug, Clone, Copy, Deserialize)]
pub(crate) struct PageQuery {
    #[serde(default)]
    pub(crate) skip: i64,
    #[serde(default = "default_limit")]
    pub(crate) limit: i64,
}
