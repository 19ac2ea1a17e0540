use std::collections::HashMap;
use std::io::Write;

use anyhow::Result;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::application::SplitService;
use crate::domain::{Activity, Debt, Expense, Group, User, UserId, compute_all_balances};

/// Full database snapshot
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DatabaseSnapshot {
    pub version: String,
    pub exported_at: DateTime<Utc>,
    pub users: Vec<User>,
    pub groups: Vec<Group>,
    pub expenses: Vec<Expense>,
    pub debts: Vec<Debt>,
    pub activities: Vec<Activity>,
}

/// Writes ledger data out as CSV or JSON.
pub struct Exporter<'a> {
    service: &'a SplitService,
}

fn name_of(names: &HashMap<UserId, String>, id: UserId) -> String {
    names.get(&id).cloned().unwrap_or_else(|| id.to_string())
}

impl<'a> Exporter<'a> {
    pub fn new(service: &'a SplitService) -> Self {
        Self { service }
    }

    pub async fn export_debts_csv<W: Write>(&self, writer: W) -> Result<usize> {
        let debts = self.service.list_all_debts().await?;
        let names = self.service.user_names().await?;
        let mut csv_writer = csv::Writer::from_writer(writer);

        csv_writer.write_record([
            "id",
            "expense",
            "creditor",
            "debtor",
            "amount_cents",
            "paid",
            "group",
        ])?;

        for debt in &debts {
            csv_writer.write_record([
                debt.id.to_string(),
                debt.expense.to_string(),
                name_of(&names, debt.creditor),
                name_of(&names, debt.debtor),
                debt.amount_cents.to_string(),
                debt.paid.to_string(),
                debt.group.map(|id| id.to_string()).unwrap_or_default(),
            ])?;
        }

        csv_writer.flush()?;
        Ok(debts.len())
    }

    /// Net position of every user over unpaid debts.
    pub async fn export_balances_csv<W: Write>(&self, writer: W) -> Result<usize> {
        let users = self.service.list_users().await?;
        let debts = self.service.list_all_debts().await?;
        let balances = compute_all_balances(&debts);
        let mut csv_writer = csv::Writer::from_writer(writer);

        csv_writer.write_record(["user", "balance_cents"])?;
        for user in &users {
            let balance = balances.get(&user.id).copied().unwrap_or(0);
            csv_writer.write_record([user.name.clone(), balance.to_string()])?;
        }

        csv_writer.flush()?;
        Ok(users.len())
    }

    pub async fn export_activities_csv<W: Write>(&self, writer: W) -> Result<usize> {
        let activities = self.service.list_all_activities().await?;
        let names = self.service.user_names().await?;
        let mut csv_writer = csv::Writer::from_writer(writer);

        csv_writer.write_record([
            "id",
            "timestamp",
            "actor",
            "type",
            "action",
            "reference",
            "related_user",
        ])?;

        for activity in &activities {
            csv_writer.write_record([
                activity.id.to_string(),
                activity.timestamp.to_rfc3339(),
                name_of(&names, activity.actor),
                activity.activity_type.to_string(),
                activity.action.to_string(),
                activity.reference.to_string(),
                activity
                    .related_user
                    .map(|id| name_of(&names, id))
                    .unwrap_or_default(),
            ])?;
        }

        csv_writer.flush()?;
        Ok(activities.len())
    }

    pub async fn export_full_json<W: Write>(&self, writer: W) -> Result<DatabaseSnapshot> {
        let snapshot = DatabaseSnapshot {
            version: env!("CARGO_PKG_VERSION").to_string(),
            exported_at: Utc::now(),
            users: self.service.list_users().await?,
            groups: self.service.list_groups().await?,
            expenses: self.service.list_all_expenses().await?,
            debts: self.service.list_all_debts().await?,
            activities: self.service.list_all_activities().await?,
        };

        serde_json::to_writer_pretty(writer, &snapshot)?;
        Ok(snapshot)
    }
}
