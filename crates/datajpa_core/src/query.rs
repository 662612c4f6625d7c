//! Structured member query descriptors.
//!
//! # Responsibility
//! - Describe member lookups as data: filters, ordering, window, fetch plan
//!   and lock mode.
//! - Render descriptors into parameterized SQL for the SQLite repository.
//!
//! # Invariants
//! - Caller values only ever reach SQL as bound parameters.
//! - Sort columns come from `SortField`, never from caller strings.
//! - Ordering always ends with `member_id ASC` so results are deterministic.

use crate::model::member::MemberId;
use crate::model::team::TeamId;
use rusqlite::types::Value;

const MEMBER_COLUMNS_SQL: &str = "SELECT
    m.member_id,
    m.username,
    m.age,
    m.team_id
FROM member m";

const MEMBER_WITH_TEAM_COLUMNS_SQL: &str = "SELECT
    m.member_id,
    m.username,
    m.age,
    m.team_id,
    t.name AS team_name
FROM member m
LEFT JOIN team t ON t.team_id = m.team_id";

/// Sortable member attributes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SortField {
    Id,
    Username,
    Age,
}

impl SortField {
    fn column(self) -> &'static str {
        match self {
            Self::Id => "member_id",
            Self::Username => "username",
            Self::Age => "age",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Direction {
    Asc,
    Desc,
}

impl Direction {
    fn keyword(self) -> &'static str {
        match self {
            Self::Asc => "ASC",
            Self::Desc => "DESC",
        }
    }
}

/// One ordering term.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Order {
    pub field: SortField,
    pub direction: Direction,
}

impl Order {
    pub fn asc(field: SortField) -> Self {
        Self {
            field,
            direction: Direction::Asc,
        }
    }

    pub fn desc(field: SortField) -> Self {
        Self {
            field,
            direction: Direction::Desc,
        }
    }
}

/// Predicate on member columns. All filters of a query are AND-ed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MemberFilter {
    IdEq(MemberId),
    UsernameEq(String),
    /// Empty list matches nothing.
    UsernameIn(Vec<String>),
    AgeEq(i32),
    AgeGreaterThan(i32),
    AgeGreaterOrEqual(i32),
    TeamIdEq(TeamId),
}

/// How the team relation is populated on returned members.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum FetchPlan {
    /// Only the foreign key is read; the team stays `Relation::Unloaded`.
    #[default]
    Lazy,
    /// Team columns are read in the same statement.
    JoinTeam,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum LockMode {
    #[default]
    None,
    /// Take the store's write lock on the matched rows before reading them.
    PessimisticWrite,
}

/// Declarative member query: predicate + ordering + window.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MemberQuery {
    pub filters: Vec<MemberFilter>,
    pub order: Vec<Order>,
    pub offset: u64,
    pub limit: Option<u64>,
    pub fetch: FetchPlan,
    pub lock: LockMode,
}

impl MemberQuery {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn filter(mut self, filter: MemberFilter) -> Self {
        self.filters.push(filter);
        self
    }

    pub fn id_eq(self, id: MemberId) -> Self {
        self.filter(MemberFilter::IdEq(id))
    }

    pub fn username_eq(self, username: impl Into<String>) -> Self {
        self.filter(MemberFilter::UsernameEq(username.into()))
    }

    pub fn username_in<I, S>(self, usernames: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.filter(MemberFilter::UsernameIn(
            usernames.into_iter().map(Into::into).collect(),
        ))
    }

    pub fn age_eq(self, age: i32) -> Self {
        self.filter(MemberFilter::AgeEq(age))
    }

    pub fn age_gt(self, age: i32) -> Self {
        self.filter(MemberFilter::AgeGreaterThan(age))
    }

    pub fn age_gte(self, age: i32) -> Self {
        self.filter(MemberFilter::AgeGreaterOrEqual(age))
    }

    pub fn team_id_eq(self, team_id: TeamId) -> Self {
        self.filter(MemberFilter::TeamIdEq(team_id))
    }

    pub fn order_by(mut self, order: Order) -> Self {
        self.order.push(order);
        self
    }

    pub fn order_by_all(mut self, orders: &[Order]) -> Self {
        self.order.extend_from_slice(orders);
        self
    }

    pub fn offset(mut self, offset: u64) -> Self {
        self.offset = offset;
        self
    }

    pub fn limit(mut self, limit: u64) -> Self {
        self.limit = Some(limit);
        self
    }

    pub fn fetch_team(mut self) -> Self {
        self.fetch = FetchPlan::JoinTeam;
        self
    }

    pub fn lock_for_update(mut self) -> Self {
        self.lock = LockMode::PessimisticWrite;
        self
    }

    /// Renders the content query.
    pub(crate) fn select_sql(&self) -> (String, Vec<Value>) {
        let mut binds = Vec::new();
        let mut sql = match self.fetch {
            FetchPlan::Lazy => MEMBER_COLUMNS_SQL.to_string(),
            FetchPlan::JoinTeam => MEMBER_WITH_TEAM_COLUMNS_SQL.to_string(),
        };

        sql.push_str(&self.where_clause("m.", &mut binds));
        sql.push_str(&self.order_clause());

        if let Some(limit) = self.limit {
            sql.push_str(" LIMIT ?");
            binds.push(Value::Integer(to_sql_int(limit)));
            if self.offset > 0 {
                sql.push_str(" OFFSET ?");
                binds.push(Value::Integer(to_sql_int(self.offset)));
            }
        } else if self.offset > 0 {
            sql.push_str(" LIMIT -1 OFFSET ?");
            binds.push(Value::Integer(to_sql_int(self.offset)));
        }

        (sql, binds)
    }

    /// Renders the total-count query over the same predicate.
    ///
    /// Joins, ordering and the window are dropped: filters only touch member
    /// columns, so the join cannot change the count.
    pub(crate) fn count_sql(&self) -> (String, Vec<Value>) {
        let mut binds = Vec::new();
        let mut sql = "SELECT COUNT(*) FROM member m".to_string();
        sql.push_str(&self.where_clause("m.", &mut binds));
        (sql, binds)
    }

    /// Renders a no-op update over the matched rows. Executing it takes the
    /// write lock for the enclosing transaction.
    pub(crate) fn lock_sql(&self) -> (String, Vec<Value>) {
        let mut binds = Vec::new();
        let mut sql = "UPDATE member SET member_id = member_id".to_string();
        sql.push_str(&self.where_clause("", &mut binds));
        (sql, binds)
    }

    fn where_clause(&self, prefix: &str, binds: &mut Vec<Value>) -> String {
        if self.filters.is_empty() {
            return String::new();
        }

        let mut terms = Vec::with_capacity(self.filters.len());
        for filter in &self.filters {
            let term = match filter {
                MemberFilter::IdEq(id) => {
                    binds.push(Value::Integer(*id));
                    format!("{prefix}member_id = ?")
                }
                MemberFilter::UsernameEq(username) => {
                    binds.push(Value::Text(username.clone()));
                    format!("{prefix}username = ?")
                }
                MemberFilter::UsernameIn(usernames) if usernames.is_empty() => "1 = 0".to_string(),
                MemberFilter::UsernameIn(usernames) => {
                    binds.extend(usernames.iter().cloned().map(Value::Text));
                    let placeholders = vec!["?"; usernames.len()].join(", ");
                    format!("{prefix}username IN ({placeholders})")
                }
                MemberFilter::AgeEq(age) => {
                    binds.push(Value::Integer(i64::from(*age)));
                    format!("{prefix}age = ?")
                }
                MemberFilter::AgeGreaterThan(age) => {
                    binds.push(Value::Integer(i64::from(*age)));
                    format!("{prefix}age > ?")
                }
                MemberFilter::AgeGreaterOrEqual(age) => {
                    binds.push(Value::Integer(i64::from(*age)));
                    format!("{prefix}age >= ?")
                }
                MemberFilter::TeamIdEq(team_id) => {
                    binds.push(Value::Integer(*team_id));
                    format!("{prefix}team_id = ?")
                }
            };
            terms.push(term);
        }

        format!(" WHERE {}", terms.join(" AND "))
    }

    fn order_clause(&self) -> String {
        let mut terms: Vec<String> = self
            .order
            .iter()
            .map(|order| format!("m.{} {}", order.field.column(), order.direction.keyword()))
            .collect();
        if !self.order.iter().any(|order| order.field == SortField::Id) {
            terms.push("m.member_id ASC".to_string());
        }
        format!(" ORDER BY {}", terms.join(", "))
    }
}

fn to_sql_int(value: u64) -> i64 {
    i64::try_from(value).unwrap_or(i64::MAX)
}

#[cfg(test)]
mod tests {
    use super::{MemberQuery, Order, SortField};
    use rusqlite::types::Value;

    #[test]
    fn empty_query_selects_everything_in_id_order() {
        let (sql, binds) = MemberQuery::new().select_sql();
        assert!(!sql.contains("WHERE"));
        assert!(sql.ends_with("ORDER BY m.member_id ASC"));
        assert!(binds.is_empty());
    }

    #[test]
    fn filters_are_bound_not_inlined() {
        let (sql, binds) = MemberQuery::new()
            .username_eq("x' OR 1=1 --")
            .age_gt(15)
            .select_sql();
        assert!(sql.contains("WHERE m.username = ? AND m.age > ?"));
        assert!(!sql.contains("OR 1=1"));
        assert_eq!(
            binds,
            vec![Value::Text("x' OR 1=1 --".to_string()), Value::Integer(15)]
        );
    }

    #[test]
    fn explicit_order_keeps_id_tie_break() {
        let (sql, _) = MemberQuery::new()
            .order_by(Order::desc(SortField::Username))
            .select_sql();
        assert!(sql.contains("ORDER BY m.username DESC, m.member_id ASC"));

        let (sql, _) = MemberQuery::new()
            .order_by(Order::desc(SortField::Id))
            .select_sql();
        assert!(sql.ends_with("ORDER BY m.member_id DESC"));
    }

    #[test]
    fn window_renders_limit_and_offset() {
        let (sql, binds) = MemberQuery::new().age_eq(10).offset(3).limit(3).select_sql();
        assert!(sql.ends_with("LIMIT ? OFFSET ?"));
        assert_eq!(binds.len(), 3);

        let (sql, _) = MemberQuery::new().offset(2).select_sql();
        assert!(sql.ends_with("LIMIT -1 OFFSET ?"));
    }

    #[test]
    fn empty_in_list_matches_nothing() {
        let (sql, binds) = MemberQuery::new()
            .username_in(Vec::<String>::new())
            .select_sql();
        assert!(sql.contains("WHERE 1 = 0"));
        assert!(binds.is_empty());
    }

    #[test]
    fn count_query_drops_join_order_and_window() {
        let (sql, binds) = MemberQuery::new()
            .age_eq(10)
            .fetch_team()
            .order_by(Order::desc(SortField::Username))
            .limit(3)
            .count_sql();
        assert_eq!(sql, "SELECT COUNT(*) FROM member m WHERE m.age = ?");
        assert_eq!(binds, vec![Value::Integer(10)]);
    }

    #[test]
    fn lock_query_touches_matched_rows_without_alias() {
        let (sql, _) = MemberQuery::new().username_eq("member1").lock_sql();
        assert_eq!(
            sql,
            "UPDATE member SET member_id = member_id WHERE username = ?"
        );
    }
}
