use serde::Deserialize;

use super::query::StringMatcher;

/// Request body for creating or replacing a user.
#[derive(Debug, Deserialize)]
pub struct UserRequest {
    pub name: String,
    pub email: String,
}

/// `?page=&size=&sort=` on the list route.
#[derive(Debug, Deserialize)]
pub struct Pagination {
    #[serde(default)]
    pub page: u32,
    #[serde(default = "default_size")]
    pub size: u32,
    #[serde(default)]
    pub sort: Option<String>,
}
fn default_size() -> u32 { 20 }

#[derive(Debug, Deserialize)]
pub struct EmailQuery {
    pub email: String,
}

#[derive(Debug, Deserialize)]
pub struct NameQuery {
    pub name: String,
    pub limit: Option<u32>,
}

/// Query-by-example parameters; an absent field is not matched at all.
#[derive(Debug, Deserialize)]
pub struct ExampleQuery {
    pub name: Option<String>,
    pub email: Option<String>,
    #[serde(default)]
    pub name_match: StringMatcher,
    #[serde(default)]
    pub email_match: StringMatcher,
    #[serde(default)]
    pub ignore_case: bool,
}
