use std::collections::BTreeSet;

use anyhow::{Context, Result};
use chrono::{DateTime, SecondsFormat, Utc};
use sqlx::sqlite::SqliteRow;
use sqlx::{Row, SqliteConnection, SqlitePool};
use uuid::Uuid;

use crate::domain::{
    Activity, ActivityAction, ActivityType, Debt, Expense, ExpenseId, Group, GroupId, User,
    UserId,
};

use super::MIGRATION_001_INITIAL;

/// Predicate for [`Repository::fetch_debts`]. Unset fields do not filter.
#[derive(Debug, Clone, Default)]
pub struct DebtFilter {
    /// Debts where this user is creditor or debtor
    pub user: Option<UserId>,
    /// Together with `user`, restricts to debts between the two
    pub counterparty: Option<UserId>,
    pub group: Option<GroupId>,
    pub expenses: Option<Vec<ExpenseId>>,
    pub unpaid_only: bool,
    /// Only debts whose expense is not yet flagged paid
    pub open_expenses_only: bool,
}

impl DebtFilter {
    pub fn for_user(user: UserId) -> Self {
        Self {
            user: Some(user),
            ..Self::default()
        }
    }

    pub fn between(a: UserId, b: UserId) -> Self {
        Self {
            user: Some(a),
            counterparty: Some(b),
            ..Self::default()
        }
    }

    pub fn in_group(group: GroupId) -> Self {
        Self {
            group: Some(group),
            ..Self::default()
        }
    }

    pub fn for_expenses(ids: Vec<ExpenseId>) -> Self {
        Self {
            expenses: Some(ids),
            ..Self::default()
        }
    }

    pub fn unpaid(mut self) -> Self {
        self.unpaid_only = true;
        self
    }

    pub fn in_open_expenses(mut self) -> Self {
        self.open_expenses_only = true;
        self
    }
}

/// Predicate for [`Repository::list_expenses`].
#[derive(Debug, Clone, Default)]
pub struct ExpenseFilter {
    /// Expenses the user paid for or owes a share of
    pub user: Option<UserId>,
    /// Expenses with at least one debt in this group
    pub group: Option<GroupId>,
    pub limit: Option<usize>,
}

/// Repository persisting users, groups, expenses, debts and activities.
pub struct Repository {
    pool: SqlitePool,
}

fn timestamp(dt: &DateTime<Utc>) -> String {
    dt.to_rfc3339_opts(SecondsFormat::Micros, true)
}

fn parse_timestamp(value: &str, what: &str) -> Result<DateTime<Utc>> {
    Ok(DateTime::parse_from_rfc3339(value)
        .with_context(|| format!("Invalid {} timestamp", what))?
        .with_timezone(&Utc))
}

fn parse_id(value: &str, what: &str) -> Result<Uuid> {
    Uuid::parse_str(value).with_context(|| format!("Invalid {} ID", what))
}

fn placeholders(count: usize) -> String {
    vec!["?"; count].join(", ")
}

const DEBT_COLUMNS: &str = "id, amount_cents, creditor_id, debtor_id, expense_id, paid, group_id";
const EXPENSE_COLUMNS: &str =
    "id, description, amount_cents, payer_id, category, date, paid, recorded_at";
const ACTIVITY_COLUMNS: &str =
    "id, actor_id, reference_id, activity_type, action, related_user_id, timestamp";

impl Repository {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    /// Connect to the SQLite database at the given URL.
    pub async fn connect(database_url: &str) -> Result<Self> {
        let pool = SqlitePool::connect(database_url)
            .await
            .context("Failed to connect to database")?;
        Ok(Self::new(pool))
    }

    pub async fn migrate(&self) -> Result<()> {
        sqlx::query(MIGRATION_001_INITIAL)
            .execute(&self.pool)
            .await
            .context("Failed to run migration 001")?;
        Ok(())
    }

    /// Initialize a new database (connect + migrate).
    pub async fn init(database_url: &str) -> Result<Self> {
        let repo = Self::connect(database_url).await?;
        repo.migrate().await?;
        Ok(repo)
    }

    // ========================
    // Users
    // ========================

    pub async fn save_user(&self, user: &User) -> Result<()> {
        sqlx::query("INSERT INTO users (id, name, avatar, created_at) VALUES (?, ?, ?, ?)")
            .bind(user.id.to_string())
            .bind(&user.name)
            .bind(&user.avatar)
            .bind(timestamp(&user.created_at))
            .execute(&self.pool)
            .await
            .context("Failed to save user")?;
        Ok(())
    }

    pub async fn get_user(&self, id: UserId) -> Result<Option<User>> {
        let row = sqlx::query("SELECT id, name, avatar, created_at FROM users WHERE id = ?")
            .bind(id.to_string())
            .fetch_optional(&self.pool)
            .await
            .context("Failed to fetch user")?;

        row.as_ref().map(Self::row_to_user).transpose()
    }

    pub async fn get_user_by_name(&self, name: &str) -> Result<Option<User>> {
        let row = sqlx::query("SELECT id, name, avatar, created_at FROM users WHERE name = ?")
            .bind(name)
            .fetch_optional(&self.pool)
            .await
            .context("Failed to fetch user by name")?;

        row.as_ref().map(Self::row_to_user).transpose()
    }

    pub async fn list_users(&self) -> Result<Vec<User>> {
        let rows = sqlx::query("SELECT id, name, avatar, created_at FROM users ORDER BY name")
            .fetch_all(&self.pool)
            .await
            .context("Failed to list users")?;

        rows.iter().map(Self::row_to_user).collect()
    }

    fn row_to_user(row: &SqliteRow) -> Result<User> {
        let id: String = row.get("id");
        let created_at: String = row.get("created_at");

        Ok(User {
            id: parse_id(&id, "user")?,
            name: row.get("name"),
            avatar: row.get("avatar"),
            created_at: parse_timestamp(&created_at, "created_at")?,
        })
    }

    // ========================
    // Groups
    // ========================

    /// Save a new group together with its initial members.
    pub async fn save_group(&self, group: &Group) -> Result<()> {
        let mut tx = self.pool.begin().await.context("Failed to begin transaction")?;

        sqlx::query("INSERT INTO user_groups (id, name, created_at) VALUES (?, ?, ?)")
            .bind(group.id.to_string())
            .bind(&group.name)
            .bind(timestamp(&group.created_at))
            .execute(&mut *tx)
            .await
            .context("Failed to save group")?;

        for member in &group.members {
            Self::insert_member(&mut *tx, group.id, *member).await?;
        }

        tx.commit().await.context("Failed to commit group")?;
        Ok(())
    }

    pub async fn add_group_member(&self, group: GroupId, user: UserId) -> Result<()> {
        let mut conn = self.pool.acquire().await.context("Failed to acquire connection")?;
        Self::insert_member(&mut *conn, group, user).await
    }

    async fn insert_member(conn: &mut SqliteConnection, group: GroupId, user: UserId) -> Result<()> {
        sqlx::query("INSERT OR IGNORE INTO group_members (group_id, user_id) VALUES (?, ?)")
            .bind(group.to_string())
            .bind(user.to_string())
            .execute(conn)
            .await
            .context("Failed to add group member")?;
        Ok(())
    }

    pub async fn get_group_by_name(&self, name: &str) -> Result<Option<Group>> {
        let row = sqlx::query("SELECT id, name, created_at FROM user_groups WHERE name = ?")
            .bind(name)
            .fetch_optional(&self.pool)
            .await
            .context("Failed to fetch group by name")?;

        match row {
            Some(row) => Ok(Some(self.row_to_group(&row).await?)),
            None => Ok(None),
        }
    }

    pub async fn list_groups(&self) -> Result<Vec<Group>> {
        let rows = sqlx::query("SELECT id, name, created_at FROM user_groups ORDER BY name")
            .fetch_all(&self.pool)
            .await
            .context("Failed to list groups")?;

        let mut groups = Vec::with_capacity(rows.len());
        for row in &rows {
            groups.push(self.row_to_group(row).await?);
        }
        Ok(groups)
    }

    async fn row_to_group(&self, row: &SqliteRow) -> Result<Group> {
        let id_str: String = row.get("id");
        let created_at: String = row.get("created_at");
        let id = parse_id(&id_str, "group")?;

        let member_rows = sqlx::query("SELECT user_id FROM group_members WHERE group_id = ?")
            .bind(&id_str)
            .fetch_all(&self.pool)
            .await
            .context("Failed to load group members")?;

        let members = member_rows
            .iter()
            .map(|row| parse_id(&row.get::<String, _>("user_id"), "member"))
            .collect::<Result<BTreeSet<_>>>()?;

        Ok(Group {
            id,
            name: row.get("name"),
            members,
            created_at: parse_timestamp(&created_at, "created_at")?,
        })
    }

    // ========================
    // Expenses
    // ========================

    /// Store a new expense with its debts and activity in one transaction.
    pub async fn record_expense(
        &self,
        expense: &Expense,
        debts: &[Debt],
        activities: &[Activity],
    ) -> Result<()> {
        let mut tx = self.pool.begin().await.context("Failed to begin transaction")?;

        Self::upsert_expense(&mut *tx, expense).await?;
        for debt in debts {
            Self::upsert_debt(&mut *tx, debt).await?;
        }
        for activity in activities {
            Self::insert_activity(&mut *tx, activity).await?;
        }

        tx.commit().await.context("Failed to commit expense")?;
        Ok(())
    }

    /// Batch upsert. The paid flag never goes back from true to false.
    pub async fn write_expenses(&self, expenses: &[Expense]) -> Result<()> {
        let mut tx = self.pool.begin().await.context("Failed to begin transaction")?;
        for expense in expenses {
            Self::upsert_expense(&mut *tx, expense).await?;
        }
        tx.commit().await.context("Failed to commit expenses")?;
        Ok(())
    }

    async fn upsert_expense(conn: &mut SqliteConnection, expense: &Expense) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO expenses (id, description, amount_cents, payer_id, category, date, paid, recorded_at)
            VALUES (?, ?, ?, ?, ?, ?, ?, ?)
            ON CONFLICT(id) DO UPDATE SET paid = MAX(expenses.paid, excluded.paid)
            "#,
        )
        .bind(expense.id.to_string())
        .bind(&expense.description)
        .bind(expense.amount_cents)
        .bind(expense.payer.to_string())
        .bind(&expense.category)
        .bind(timestamp(&expense.date))
        .bind(expense.paid)
        .bind(timestamp(&expense.recorded_at))
        .execute(conn)
        .await
        .context("Failed to write expense")?;
        Ok(())
    }

    pub async fn get_expense(&self, id: ExpenseId) -> Result<Option<Expense>> {
        let query = format!("SELECT {} FROM expenses WHERE id = ?", EXPENSE_COLUMNS);
        let row = sqlx::query(&query)
            .bind(id.to_string())
            .fetch_optional(&self.pool)
            .await
            .context("Failed to fetch expense")?;

        row.as_ref().map(Self::row_to_expense).transpose()
    }

    pub async fn fetch_expenses_by_ids(&self, ids: &[ExpenseId]) -> Result<Vec<Expense>> {
        if ids.is_empty() {
            return Ok(Vec::new());
        }

        let query = format!(
            "SELECT {} FROM expenses WHERE id IN ({}) ORDER BY date, recorded_at",
            EXPENSE_COLUMNS,
            placeholders(ids.len())
        );
        let mut sql_query = sqlx::query(&query);
        for id in ids {
            sql_query = sql_query.bind(id.to_string());
        }

        let rows = sql_query
            .fetch_all(&self.pool)
            .await
            .context("Failed to fetch expenses by ids")?;

        rows.iter().map(Self::row_to_expense).collect()
    }

    /// Most recent first.
    pub async fn list_expenses(&self, filter: &ExpenseFilter) -> Result<Vec<Expense>> {
        let mut query = format!("SELECT {} FROM expenses WHERE 1=1", EXPENSE_COLUMNS);

        let user_str = filter.user.map(|id| id.to_string());
        let group_str = filter.group.map(|id| id.to_string());

        if user_str.is_some() {
            query.push_str(
                " AND (payer_id = ? OR id IN (SELECT expense_id FROM debts WHERE debtor_id = ?))",
            );
        }
        if group_str.is_some() {
            query.push_str(" AND id IN (SELECT expense_id FROM debts WHERE group_id = ?)");
        }

        query.push_str(" ORDER BY date DESC, recorded_at DESC");

        if let Some(limit) = filter.limit {
            query.push_str(&format!(" LIMIT {}", limit));
        }

        let mut sql_query = sqlx::query(&query);
        if let Some(ref user) = user_str {
            sql_query = sql_query.bind(user).bind(user);
        }
        if let Some(ref group) = group_str {
            sql_query = sql_query.bind(group);
        }

        let rows = sql_query
            .fetch_all(&self.pool)
            .await
            .context("Failed to list expenses")?;

        rows.iter().map(Self::row_to_expense).collect()
    }

    /// Delete an expense and every debt that references it.
    /// Returns the number of debts removed.
    pub async fn delete_expense(&self, id: ExpenseId, activity: &Activity) -> Result<u64> {
        let mut tx = self.pool.begin().await.context("Failed to begin transaction")?;

        let removed = sqlx::query("DELETE FROM debts WHERE expense_id = ?")
            .bind(id.to_string())
            .execute(&mut *tx)
            .await
            .context("Failed to delete expense debts")?
            .rows_affected();

        sqlx::query("DELETE FROM expenses WHERE id = ?")
            .bind(id.to_string())
            .execute(&mut *tx)
            .await
            .context("Failed to delete expense")?;

        Self::insert_activity(&mut *tx, activity).await?;

        tx.commit().await.context("Failed to commit expense deletion")?;
        Ok(removed)
    }

    fn row_to_expense(row: &SqliteRow) -> Result<Expense> {
        let id: String = row.get("id");
        let payer: String = row.get("payer_id");
        let date: String = row.get("date");
        let recorded_at: String = row.get("recorded_at");

        Ok(Expense {
            id: parse_id(&id, "expense")?,
            description: row.get("description"),
            amount_cents: row.get("amount_cents"),
            payer: parse_id(&payer, "payer")?,
            category: row.get("category"),
            date: parse_timestamp(&date, "date")?,
            paid: row.get::<i64, _>("paid") != 0,
            recorded_at: parse_timestamp(&recorded_at, "recorded_at")?,
        })
    }

    // ========================
    // Debts
    // ========================

    /// Batch upsert. The paid flag never goes back from true to false.
    pub async fn write_debts(&self, debts: &[Debt]) -> Result<()> {
        let mut tx = self.pool.begin().await.context("Failed to begin transaction")?;
        for debt in debts {
            Self::upsert_debt(&mut *tx, debt).await?;
        }
        tx.commit().await.context("Failed to commit debts")?;
        Ok(())
    }

    async fn upsert_debt(conn: &mut SqliteConnection, debt: &Debt) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO debts (id, amount_cents, creditor_id, debtor_id, expense_id, paid, group_id)
            VALUES (?, ?, ?, ?, ?, ?, ?)
            ON CONFLICT(id) DO UPDATE SET paid = MAX(debts.paid, excluded.paid)
            "#,
        )
        .bind(debt.id.to_string())
        .bind(debt.amount_cents)
        .bind(debt.creditor.to_string())
        .bind(debt.debtor.to_string())
        .bind(debt.expense.to_string())
        .bind(debt.paid)
        .bind(debt.group.map(|id| id.to_string()))
        .execute(conn)
        .await
        .context("Failed to write debt")?;
        Ok(())
    }

    pub async fn fetch_debts(&self, filter: &DebtFilter) -> Result<Vec<Debt>> {
        if matches!(&filter.expenses, Some(ids) if ids.is_empty()) {
            return Ok(Vec::new());
        }

        let mut query = format!("SELECT {} FROM debts WHERE 1=1", DEBT_COLUMNS);

        let user_str = filter.user.map(|id| id.to_string());
        let counterparty_str = filter.counterparty.map(|id| id.to_string());
        let group_str = filter.group.map(|id| id.to_string());

        match (&user_str, &counterparty_str) {
            (Some(_), Some(_)) => query.push_str(
                " AND ((creditor_id = ? AND debtor_id = ?) OR (creditor_id = ? AND debtor_id = ?))",
            ),
            (Some(_), None) => query.push_str(" AND (creditor_id = ? OR debtor_id = ?)"),
            (None, _) => {}
        }
        if group_str.is_some() {
            query.push_str(" AND group_id = ?");
        }
        if let Some(ids) = &filter.expenses {
            query.push_str(&format!(" AND expense_id IN ({})", placeholders(ids.len())));
        }
        if filter.unpaid_only {
            query.push_str(" AND paid = 0");
        }
        if filter.open_expenses_only {
            query.push_str(" AND expense_id IN (SELECT id FROM expenses WHERE paid = 0)");
        }

        query.push_str(" ORDER BY expense_id, rowid");

        let mut sql_query = sqlx::query(&query);
        match (&user_str, &counterparty_str) {
            (Some(user), Some(other)) => {
                sql_query = sql_query.bind(user).bind(other).bind(other).bind(user);
            }
            (Some(user), None) => {
                sql_query = sql_query.bind(user).bind(user);
            }
            (None, _) => {}
        }
        if let Some(ref group) = group_str {
            sql_query = sql_query.bind(group);
        }
        if let Some(ids) = &filter.expenses {
            for id in ids {
                sql_query = sql_query.bind(id.to_string());
            }
        }

        let rows = sql_query
            .fetch_all(&self.pool)
            .await
            .context("Failed to fetch debts")?;

        rows.iter().map(Self::row_to_debt).collect()
    }

    fn row_to_debt(row: &SqliteRow) -> Result<Debt> {
        let id: String = row.get("id");
        let creditor: String = row.get("creditor_id");
        let debtor: String = row.get("debtor_id");
        let expense: String = row.get("expense_id");
        let group: Option<String> = row.get("group_id");

        Ok(Debt {
            id: parse_id(&id, "debt")?,
            amount_cents: row.get("amount_cents"),
            creditor: parse_id(&creditor, "creditor")?,
            debtor: parse_id(&debtor, "debtor")?,
            expense: parse_id(&expense, "expense")?,
            paid: row.get::<i64, _>("paid") != 0,
            group: group.map(|s| parse_id(&s, "group")).transpose()?,
        })
    }

    // ========================
    // Activities
    // ========================

    /// Insert only; existing activities are never rewritten.
    pub async fn append_activities(&self, activities: &[Activity]) -> Result<()> {
        let mut tx = self.pool.begin().await.context("Failed to begin transaction")?;
        for activity in activities {
            Self::insert_activity(&mut *tx, activity).await?;
        }
        tx.commit().await.context("Failed to commit activities")?;
        Ok(())
    }

    async fn insert_activity(conn: &mut SqliteConnection, activity: &Activity) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO activities (id, actor_id, reference_id, activity_type, action, related_user_id, timestamp)
            VALUES (?, ?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(activity.id.to_string())
        .bind(activity.actor.to_string())
        .bind(activity.reference.to_string())
        .bind(activity.activity_type.as_str())
        .bind(activity.action.as_str())
        .bind(activity.related_user.map(|id| id.to_string()))
        .bind(timestamp(&activity.timestamp))
        .execute(conn)
        .await
        .context("Failed to append activity")?;
        Ok(())
    }

    /// Newest first, optionally limited to activities concerning `user`.
    pub async fn list_activities(
        &self,
        user: Option<UserId>,
        limit: Option<usize>,
    ) -> Result<Vec<Activity>> {
        let mut query = format!("SELECT {} FROM activities WHERE 1=1", ACTIVITY_COLUMNS);
        let user_str = user.map(|id| id.to_string());

        if user_str.is_some() {
            query.push_str(" AND (actor_id = ? OR related_user_id = ?)");
        }
        query.push_str(" ORDER BY timestamp DESC, rowid DESC");
        if let Some(limit) = limit {
            query.push_str(&format!(" LIMIT {}", limit));
        }

        let mut sql_query = sqlx::query(&query);
        if let Some(ref user) = user_str {
            sql_query = sql_query.bind(user).bind(user);
        }

        let rows = sql_query
            .fetch_all(&self.pool)
            .await
            .context("Failed to list activities")?;

        rows.iter().map(Self::row_to_activity).collect()
    }

    fn row_to_activity(row: &SqliteRow) -> Result<Activity> {
        let id: String = row.get("id");
        let actor: String = row.get("actor_id");
        let reference: String = row.get("reference_id");
        let activity_type: String = row.get("activity_type");
        let action: String = row.get("action");
        let related: Option<String> = row.get("related_user_id");
        let ts: String = row.get("timestamp");

        Ok(Activity {
            id: parse_id(&id, "activity")?,
            actor: parse_id(&actor, "actor")?,
            reference: parse_id(&reference, "reference")?,
            activity_type: ActivityType::from_str(&activity_type)
                .ok_or_else(|| anyhow::anyhow!("Invalid activity type: {}", activity_type))?,
            action: ActivityAction::from_str(&action)
                .ok_or_else(|| anyhow::anyhow!("Invalid activity action: {}", action))?,
            related_user: related.map(|s| parse_id(&s, "related user")).transpose()?,
            timestamp: parse_timestamp(&ts, "activity")?,
        })
    }
}
