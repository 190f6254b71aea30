//! Value types that drive sorted, paged and example-matched lookups.
//!
//! None of these carry SQL: each backend translates them itself, and only
//! the fixed column names from [`UserField::column`] ever reach a query.

use std::cmp::Ordering;
use std::collections::{HashMap, HashSet};
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use time::OffsetDateTime;

use super::repo_types::User;
use crate::error::RepoError;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum UserField {
    Id,
    Name,
    Email,
    CreatedAt,
    UpdatedAt,
}

impl UserField {
    pub fn column(self) -> &'static str {
        match self {
            UserField::Id => "id",
            UserField::Name => "name",
            UserField::Email => "email",
            UserField::CreatedAt => "created_at",
            UserField::UpdatedAt => "updated_at",
        }
    }

    fn compare(self, a: &User, b: &User) -> Ordering {
        match self {
            UserField::Id => a.id.cmp(&b.id),
            UserField::Name => a.name.cmp(&b.name),
            UserField::Email => a.email.cmp(&b.email),
            UserField::CreatedAt => a.created_at.cmp(&b.created_at),
            UserField::UpdatedAt => a.updated_at.cmp(&b.updated_at),
        }
    }
}

impl FromStr for UserField {
    type Err = RepoError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim() {
            "id" => Ok(UserField::Id),
            "name" => Ok(UserField::Name),
            "email" => Ok(UserField::Email),
            "created_at" | "createdAt" => Ok(UserField::CreatedAt),
            "updated_at" | "updatedAt" => Ok(UserField::UpdatedAt),
            other => Err(RepoError::validation(format!("unknown field: {other}"))),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Direction {
    #[default]
    Asc,
    Desc,
}

impl Direction {
    pub fn keyword(self) -> &'static str {
        match self {
            Direction::Asc => "ASC",
            Direction::Desc => "DESC",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Order {
    pub field: UserField,
    pub direction: Direction,
}

/// Ordered list of sort keys. An unsorted `Sort` means ascending id.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Sort {
    pub orders: Vec<Order>,
}

impl Sort {
    pub fn unsorted() -> Self {
        Self::default()
    }

    pub fn by(direction: Direction, field: UserField) -> Self {
        Self::unsorted().and(direction, field)
    }

    pub fn and(mut self, direction: Direction, field: UserField) -> Self {
        self.orders.push(Order { field, direction });
        self
    }

    pub fn is_unsorted(&self) -> bool {
        self.orders.is_empty()
    }

    /// Sort keys with an ascending id appended as the final tie-breaker.
    pub(crate) fn with_tiebreak(&self) -> Vec<Order> {
        let mut orders = self.orders.clone();
        if !orders.iter().any(|o| o.field == UserField::Id) {
            orders.push(Order {
                field: UserField::Id,
                direction: Direction::Asc,
            });
        }
        orders
    }

    pub(crate) fn compare(&self, a: &User, b: &User) -> Ordering {
        for order in self.with_tiebreak() {
            let ord = order.field.compare(a, b);
            let ord = match order.direction {
                Direction::Asc => ord,
                Direction::Desc => ord.reverse(),
            };
            if ord != Ordering::Equal {
                return ord;
            }
        }
        Ordering::Equal
    }
}

/// Parses `"name,desc;id"`: keys separated by `;`, each `field[,asc|desc]`.
impl FromStr for Sort {
    type Err = RepoError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let mut sort = Sort::unsorted();
        for key in s.split(';').map(str::trim).filter(|k| !k.is_empty()) {
            let (field, direction) = match key.split_once(',') {
                Some((field, dir)) => {
                    let direction = match dir.trim().to_ascii_lowercase().as_str() {
                        "asc" => Direction::Asc,
                        "desc" => Direction::Desc,
                        other => {
                            return Err(RepoError::validation(format!(
                                "unknown sort direction: {other}"
                            )))
                        }
                    };
                    (field, direction)
                }
                None => (key, Direction::Asc),
            };
            sort = sort.and(direction, field.parse()?);
        }
        Ok(sort)
    }
}

/// Zero-based page request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PageRequest {
    page: u32,
    size: u32,
    sort: Sort,
}

impl PageRequest {
    pub fn of(page: u32, size: u32) -> Result<Self, RepoError> {
        if size == 0 {
            return Err(RepoError::validation("page size must be at least 1"));
        }
        Ok(Self {
            page,
            size,
            sort: Sort::unsorted(),
        })
    }

    pub fn with_sort(mut self, sort: Sort) -> Self {
        self.sort = sort;
        self
    }

    pub fn page(&self) -> u32 {
        self.page
    }

    pub fn size(&self) -> u32 {
        self.size
    }

    pub fn sort(&self) -> &Sort {
        &self.sort
    }

    pub fn offset(&self) -> u64 {
        u64::from(self.page) * u64::from(self.size)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Page<T> {
    pub content: Vec<T>,
    pub number: u32,
    pub size: u32,
    pub number_of_elements: usize,
    pub total_elements: u64,
    pub total_pages: u64,
    pub sort: Sort,
}

impl<T> Page<T> {
    pub fn new(content: Vec<T>, request: &PageRequest, total_elements: u64) -> Self {
        let size = u64::from(request.size());
        Self {
            number_of_elements: content.len(),
            content,
            number: request.page(),
            size: request.size(),
            total_elements,
            total_pages: total_elements.div_ceil(size),
            sort: request.sort().clone(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StringMatcher {
    #[default]
    Exact,
    StartsWith,
    EndsWith,
    Contains,
}

impl StringMatcher {
    fn matches(self, candidate: &str, value: &str) -> bool {
        match self {
            StringMatcher::Exact => candidate == value,
            StringMatcher::StartsWith => candidate.starts_with(value),
            StringMatcher::EndsWith => candidate.ends_with(value),
            StringMatcher::Contains => candidate.contains(value),
        }
    }

    /// LIKE pattern for `value`, with `%`, `_` and `\` escaped.
    pub(crate) fn like_pattern(self, value: &str) -> String {
        let escaped = value
            .replace('\\', "\\\\")
            .replace('%', "\\%")
            .replace('_', "\\_");
        match self {
            StringMatcher::Exact => escaped,
            StringMatcher::StartsWith => format!("{escaped}%"),
            StringMatcher::EndsWith => format!("%{escaped}"),
            StringMatcher::Contains => format!("%{escaped}%"),
        }
    }
}

/// Per-field rules applied to an [`Example`] template.
#[derive(Debug, Clone, Default)]
pub struct ExampleMatcher {
    ignored: HashSet<UserField>,
    matchers: HashMap<UserField, StringMatcher>,
    ignore_case: bool,
}

impl ExampleMatcher {
    pub fn matching() -> Self {
        Self::default()
    }

    pub fn with_ignore_paths(mut self, fields: impl IntoIterator<Item = UserField>) -> Self {
        self.ignored.extend(fields);
        self
    }

    pub fn with_matcher(mut self, field: UserField, matcher: StringMatcher) -> Self {
        self.matchers.insert(field, matcher);
        self
    }

    pub fn with_ignore_case(mut self) -> Self {
        self.ignore_case = true;
        self
    }

    fn is_ignored(&self, field: UserField) -> bool {
        self.ignored.contains(&field)
    }

    fn matcher_for(&self, field: UserField) -> StringMatcher {
        self.matchers.get(&field).copied().unwrap_or_default()
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) enum Predicate {
    Id(i64),
    Text {
        field: UserField,
        value: String,
        matcher: StringMatcher,
        ignore_case: bool,
    },
    Timestamp {
        field: UserField,
        value: OffsetDateTime,
    },
}

impl Predicate {
    fn matches(&self, user: &User) -> bool {
        match self {
            Predicate::Id(id) => user.id == Some(*id),
            Predicate::Text {
                field,
                value,
                matcher,
                ignore_case,
            } => {
                let candidate = match field {
                    UserField::Name => user.name.as_str(),
                    _ => user.email.as_str(),
                };
                if *ignore_case {
                    matcher.matches(&candidate.to_lowercase(), &value.to_lowercase())
                } else {
                    matcher.matches(candidate, value)
                }
            }
            Predicate::Timestamp { field, value } => {
                let candidate = match field {
                    UserField::CreatedAt => user.created_at,
                    _ => user.updated_at,
                };
                candidate == Some(*value)
            }
        }
    }
}

/// A partial user plus matching rules. Absent optional fields never constrain.
#[derive(Debug, Clone)]
pub struct Example {
    template: User,
    matcher: ExampleMatcher,
}

impl Example {
    pub fn of(template: User, matcher: ExampleMatcher) -> Self {
        Self { template, matcher }
    }

    /// Conjunction of every active field constraint.
    pub(crate) fn predicates(&self) -> Vec<Predicate> {
        let m = &self.matcher;
        let mut out = Vec::new();

        if let Some(id) = self.template.id.filter(|_| !m.is_ignored(UserField::Id)) {
            out.push(Predicate::Id(id));
        }
        for (field, value) in [
            (UserField::Name, &self.template.name),
            (UserField::Email, &self.template.email),
        ] {
            if m.is_ignored(field) {
                continue;
            }
            out.push(Predicate::Text {
                field,
                value: value.clone(),
                matcher: m.matcher_for(field),
                ignore_case: m.ignore_case,
            });
        }
        for (field, value) in [
            (UserField::CreatedAt, self.template.created_at),
            (UserField::UpdatedAt, self.template.updated_at),
        ] {
            if let Some(value) = value.filter(|_| !m.is_ignored(field)) {
                out.push(Predicate::Timestamp { field, value });
            }
        }
        out
    }

    pub fn matches(&self, user: &User) -> bool {
        self.predicates().iter().all(|p| p.matches(user))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn user(id: i64, name: &str, email: &str) -> User {
        User::new(name, email).with_id(id)
    }

    #[test]
    fn parses_sort_strings() {
        let sort: Sort = "name,desc; id".parse().unwrap();
        assert_eq!(
            sort,
            Sort::by(Direction::Desc, UserField::Name).and(Direction::Asc, UserField::Id)
        );
        assert!("".parse::<Sort>().unwrap().is_unsorted());
        assert!("nope".parse::<Sort>().is_err());
        assert!("name,sideways".parse::<Sort>().is_err());
    }

    #[test]
    fn sort_compares_with_id_tiebreak() {
        let sort = Sort::by(Direction::Desc, UserField::Name);
        let mut users = vec![
            user(1, "dennis", "d@email.com"),
            user(2, "martin", "m@email.com"),
            user(3, "martin", "m2@email.com"),
        ];
        users.sort_by(|a, b| sort.compare(a, b));
        let ids: Vec<_> = users.iter().map(|u| u.id.unwrap()).collect();
        assert_eq!(ids, vec![2, 3, 1]);
    }

    #[test]
    fn page_request_rejects_zero_size() {
        assert!(matches!(
            PageRequest::of(0, 0),
            Err(RepoError::Validation(_))
        ));
        assert_eq!(PageRequest::of(2, 3).unwrap().offset(), 6);
    }

    #[test]
    fn page_totals() {
        let req = PageRequest::of(1, 3).unwrap();
        let page = Page::new(vec![4, 5], &req, 5);
        assert_eq!(page.total_pages, 2);
        assert_eq!(page.number_of_elements, 2);

        let empty: Page<i32> = Page::new(vec![], &req, 0);
        assert_eq!(empty.total_pages, 0);
    }

    #[test]
    fn like_pattern_escapes_wildcards() {
        assert_eq!(StringMatcher::EndsWith.like_pattern("email.com"), "%email.com");
        assert_eq!(StringMatcher::StartsWith.like_pattern("50%_"), "50\\%\\_%");
        assert_eq!(StringMatcher::Exact.like_pattern("a\\b"), "a\\\\b");
    }

    #[test]
    fn example_ignores_name_and_matches_email_suffix() {
        let matcher = ExampleMatcher::matching()
            .with_ignore_paths([UserField::Name])
            .with_matcher(UserField::Email, StringMatcher::EndsWith);
        let example = Example::of(User::new("ma", "email.com"), matcher);

        assert!(example.matches(&user(1, "martin", "martin@email.com")));
        assert!(example.matches(&user(2, "dennis", "dennis@email.com")));
        assert!(!example.matches(&user(3, "ma", "ma@mail.net")));
    }

    #[test]
    fn example_defaults_to_exact_on_all_strings() {
        let example = Example::of(User::new("jack", "jack@email.com"), ExampleMatcher::matching());
        assert_eq!(example.predicates().len(), 2);
        assert!(example.matches(&user(1, "jack", "jack@email.com")));
        assert!(!example.matches(&user(2, "jack", "jack@email.co")));
    }

    #[test]
    fn example_ignore_case() {
        let matcher = ExampleMatcher::matching()
            .with_ignore_paths([UserField::Email])
            .with_matcher(UserField::Name, StringMatcher::StartsWith)
            .with_ignore_case();
        let example = Example::of(User::new("MA", ""), matcher);
        assert!(example.matches(&user(1, "martin", "m@email.com")));
        assert!(!example.matches(&user(2, "steve", "s@email.com")));
    }

    #[test]
    fn example_template_id_constrains_unless_ignored() {
        let template = User::new("jack", "jack@email.com").with_id(5);
        let by_id = Example::of(template.clone(), ExampleMatcher::matching());
        assert!(!by_id.matches(&user(6, "jack", "jack@email.com")));

        let ignored = Example::of(
            template,
            ExampleMatcher::matching().with_ignore_paths([UserField::Id]),
        );
        assert!(ignored.matches(&user(6, "jack", "jack@email.com")));
    }
}
