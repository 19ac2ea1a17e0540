use std::collections::HashMap;

use chrono::{DateTime, Utc};
use tracing::{debug, info, warn};

use crate::domain::{
    Activity, ActivityAction, ActivityType, Balance, Cents, Debt, Expense, ExpenseId, Group,
    Settlement, User, UserId, ValidationError, balances_by_counterparty, compute_balance,
    group_balance, group_member_balances, pair_balance, settle_payment, split_evenly,
    split_exact,
};
use crate::storage::{DebtFilter, ExpenseFilter, Repository};

use super::{AppError, IdentityProvider, StaticIdentity};

/// Application service for the splitting ledger.
/// The store and the identity provider are injected; nothing is global.
pub struct SplitService {
    repo: Repository,
    identity: Box<dyn IdentityProvider>,
}

/// How a new expense is shared out.
#[derive(Debug, Clone)]
pub enum SplitMode {
    /// Equal shares between the named users (the payer may be among them)
    Even(Vec<String>),
    /// Explicit share per named user; must add up to the total
    Exact(Vec<(String, Cents)>),
}

/// Input for [`SplitService::add_expense`].
#[derive(Debug, Clone)]
pub struct NewExpense {
    pub description: String,
    pub amount_cents: Cents,
    /// Defaults to the current user
    pub payer: Option<String>,
    pub split: SplitMode,
    pub group: Option<String>,
    pub category: Option<String>,
    pub date: DateTime<Utc>,
}

/// An expense with the debts it created
pub struct ExpenseInfo {
    pub expense: Expense,
    pub debts: Vec<Debt>,
}

/// Filter for listing expenses
#[derive(Debug, Clone, Default)]
pub struct ExpenseQuery {
    pub group: Option<String>,
    /// Restrict to expenses the current user paid or owes on
    pub involving_me: bool,
    pub limit: Option<usize>,
}

pub struct DeletedExpense {
    pub expense: Expense,
    pub removed_debts: u64,
}

/// Balance with one other user
pub struct FriendBalance {
    pub user: User,
    pub balance: Balance,
}

pub struct SettlementResult {
    pub counterparty: User,
    /// What the current user was owed (negative: owed) before settling
    pub net_before: Cents,
    pub settlement: Settlement,
}

impl SplitService {
    pub fn new(repo: Repository, identity: Box<dyn IdentityProvider>) -> Self {
        Self { repo, identity }
    }

    /// Initialize a new database at the given path.
    pub async fn init(database_path: &str) -> Result<Self, AppError> {
        let db_url = format!("sqlite:{}?mode=rwc", database_path);
        let repo = Repository::init(&db_url).await?;
        Ok(Self::new(repo, Box::new(StaticIdentity::anonymous())))
    }

    /// Connect to an existing database.
    pub async fn connect(database_path: &str) -> Result<Self, AppError> {
        let db_url = format!("sqlite:{}", database_path);
        let repo = Repository::connect(&db_url).await?;
        Ok(Self::new(repo, Box::new(StaticIdentity::anonymous())))
    }

    /// Replace the identity provider.
    pub fn with_identity(mut self, identity: impl IdentityProvider + 'static) -> Self {
        self.identity = Box::new(identity);
        self
    }

    /// Resolve `name` and act as that user from now on.
    pub async fn act_as(self, name: &str) -> Result<Self, AppError> {
        let user = self.get_user(name).await?;
        debug!(user = %user.name, id = %user.id, "Acting as user");
        Ok(self.with_identity(StaticIdentity::new(user.id)))
    }

    pub fn current_user_id(&self) -> Result<UserId, AppError> {
        self.identity
            .current_user_id()
            .ok_or(AppError::NoCurrentUser)
    }

    pub async fn current_user(&self) -> Result<User, AppError> {
        let id = self.current_user_id()?;
        self.get_user_by_id(id).await
    }

    // ========================
    // Users
    // ========================

    pub async fn create_user(&self, name: String, avatar: Option<String>) -> Result<User, AppError> {
        if self.repo.get_user_by_name(&name).await?.is_some() {
            return Err(AppError::UserAlreadyExists(name));
        }

        let mut user = User::new(name);
        if let Some(avatar) = avatar {
            user = user.with_avatar(avatar);
        }

        self.repo.save_user(&user).await?;
        info!(user = %user.name, id = %user.id, "Created user");
        Ok(user)
    }

    pub async fn get_user(&self, name: &str) -> Result<User, AppError> {
        self.repo
            .get_user_by_name(name)
            .await?
            .ok_or_else(|| AppError::UserNotFound(name.to_string()))
    }

    pub async fn get_user_by_id(&self, id: UserId) -> Result<User, AppError> {
        self.repo
            .get_user(id)
            .await?
            .ok_or_else(|| AppError::UserNotFound(id.to_string()))
    }

    pub async fn list_users(&self) -> Result<Vec<User>, AppError> {
        Ok(self.repo.list_users().await?)
    }

    /// Map of user ids to names, for display.
    pub async fn user_names(&self) -> Result<HashMap<UserId, String>, AppError> {
        let users = self.repo.list_users().await?;
        Ok(users.into_iter().map(|u| (u.id, u.name)).collect())
    }

    // ========================
    // Groups
    // ========================

    /// Create a group. The current user becomes a member alongside `members`.
    pub async fn create_group(&self, name: String, members: &[String]) -> Result<Group, AppError> {
        let actor = self.current_user_id()?;
        if self.repo.get_group_by_name(&name).await?.is_some() {
            return Err(AppError::GroupAlreadyExists(name));
        }

        let mut group = Group::new(name).with_members([actor]);
        for member in members {
            group.add_member(self.get_user(member).await?.id);
        }

        self.repo.save_group(&group).await?;
        self.repo
            .append_activities(&[Activity::new(
                actor,
                group.id,
                ActivityType::Group,
                ActivityAction::Create,
                Utc::now(),
            )])
            .await?;

        info!(group = %group.name, members = group.members.len(), "Created group");
        Ok(group)
    }

    pub async fn add_group_member(&self, group_name: &str, user_name: &str) -> Result<Group, AppError> {
        let actor = self.current_user_id()?;
        let mut group = self.get_group(group_name).await?;
        let user = self.get_user(user_name).await?;

        if !group.add_member(user.id) {
            debug!(group = %group.name, user = %user.name, "Already a member");
            return Ok(group);
        }

        self.repo.add_group_member(group.id, user.id).await?;
        self.repo
            .append_activities(&[Activity::new(
                actor,
                group.id,
                ActivityType::Group,
                ActivityAction::Update,
                Utc::now(),
            )
            .with_related_user(user.id)])
            .await?;

        info!(group = %group.name, user = %user.name, "Added group member");
        Ok(group)
    }

    pub async fn get_group(&self, name: &str) -> Result<Group, AppError> {
        self.repo
            .get_group_by_name(name)
            .await?
            .ok_or_else(|| AppError::GroupNotFound(name.to_string()))
    }

    pub async fn list_groups(&self) -> Result<Vec<Group>, AppError> {
        Ok(self.repo.list_groups().await?)
    }

    /// Every member's balance inside the group, ordered by name.
    pub async fn group_member_balances(&self, name: &str) -> Result<Vec<FriendBalance>, AppError> {
        let group = self.get_group(name).await?;
        let debts = self
            .repo
            .fetch_debts(&DebtFilter::in_group(group.id).unpaid())
            .await?;

        let mut balances = Vec::with_capacity(group.members.len());
        for (member, balance) in group_member_balances(&debts, &group) {
            let user = self.get_user_by_id(member).await?;
            balances.push(FriendBalance { user, balance });
        }
        balances.sort_by(|a, b| a.user.name.cmp(&b.user.name));
        Ok(balances)
    }

    // ========================
    // Expenses
    // ========================

    /// Record an expense and the debts of its split, all validated up front.
    pub async fn add_expense(&self, new: NewExpense) -> Result<ExpenseInfo, AppError> {
        let actor = self.current_user_id()?;

        let payer = match &new.payer {
            Some(name) => self.get_user(name).await?.id,
            None => actor,
        };
        let group = match &new.group {
            Some(name) => Some(self.get_group(name).await?),
            None => None,
        };

        let mut expense = Expense::new(new.description, new.amount_cents, payer, new.date)?;
        if let Some(category) = new.category {
            expense = expense.with_category(category);
        }

        let group_id = group.as_ref().map(|g| g.id);
        let (participants, debts) = match &new.split {
            SplitMode::Even(names) => {
                let mut ids = Vec::with_capacity(names.len());
                for name in names {
                    ids.push(self.get_user(name).await?.id);
                }
                let debts = split_evenly(&expense, &ids, group_id)?;
                (ids, debts)
            }
            SplitMode::Exact(shares) => {
                let mut resolved = Vec::with_capacity(shares.len());
                for (name, share) in shares {
                    resolved.push((self.get_user(name).await?.id, *share));
                }
                let debts = split_exact(&expense, &resolved, group_id)?;
                (resolved.into_iter().map(|(id, _)| id).collect(), debts)
            }
        };

        if let Some(group) = &group {
            for user in participants.iter().chain(std::iter::once(&payer)) {
                if !group.is_member(*user) {
                    warn!(group = %group.name, user = %user, "Rejected expense for non-member");
                    return Err(ValidationError::NotGroupMember { user: *user }.into());
                }
            }
        }

        // Nobody else owes anything: settled from the start.
        if debts.is_empty() {
            expense.mark_paid();
        }

        let now = Utc::now();
        let activities: Vec<Activity> = if debts.is_empty() {
            vec![Activity::new(
                actor,
                expense.id,
                ActivityType::Expense,
                ActivityAction::Create,
                now,
            )]
        } else {
            debts
                .iter()
                .map(|debt| {
                    Activity::new(
                        actor,
                        expense.id,
                        ActivityType::Expense,
                        ActivityAction::Create,
                        now,
                    )
                    .with_related_user(debt.debtor)
                })
                .collect()
        };

        self.repo.record_expense(&expense, &debts, &activities).await?;

        info!(
            expense_id = %expense.id,
            amount_cents = expense.amount_cents,
            debts = debts.len(),
            group = ?group.as_ref().map(|g| &g.name),
            "Recorded expense"
        );

        Ok(ExpenseInfo { expense, debts })
    }

    pub async fn get_expense_info(&self, id: ExpenseId) -> Result<ExpenseInfo, AppError> {
        let expense = self
            .repo
            .get_expense(id)
            .await?
            .ok_or_else(|| AppError::ExpenseNotFound(id.to_string()))?;
        let debts = self
            .repo
            .fetch_debts(&DebtFilter::for_expenses(vec![id]))
            .await?;

        Ok(ExpenseInfo { expense, debts })
    }

    pub async fn list_expenses(&self, query: ExpenseQuery) -> Result<Vec<Expense>, AppError> {
        let user = if query.involving_me {
            Some(self.current_user_id()?)
        } else {
            None
        };
        let group = match &query.group {
            Some(name) => Some(self.get_group(name).await?.id),
            None => None,
        };

        Ok(self
            .repo
            .list_expenses(&ExpenseFilter {
                user,
                group,
                limit: query.limit,
            })
            .await?)
    }

    /// Delete an expense together with its debts. Only a party to the
    /// expense (payer or a debtor) may delete it.
    pub async fn delete_expense(&self, id: ExpenseId) -> Result<DeletedExpense, AppError> {
        let actor = self.current_user_id()?;
        let info = self.get_expense_info(id).await?;

        let is_party =
            info.expense.payer == actor || info.debts.iter().any(|debt| debt.debtor == actor);
        if !is_party {
            warn!(expense_id = %id, actor = %actor, "Refused expense deletion");
            return Err(ValidationError::ActorNotParty { actor }.into());
        }

        let activity = Activity::new(
            actor,
            id,
            ActivityType::Expense,
            ActivityAction::Delete,
            Utc::now(),
        );
        let removed_debts = self.repo.delete_expense(id, &activity).await?;

        info!(expense_id = %id, removed_debts, "Deleted expense");
        Ok(DeletedExpense {
            expense: info.expense,
            removed_debts,
        })
    }

    // ========================
    // Balances
    // ========================

    /// The current user's overall balance across everyone.
    pub async fn balance(&self) -> Result<Balance, AppError> {
        let me = self.current_user_id()?;
        let debts = self
            .repo
            .fetch_debts(&DebtFilter::for_user(me).unpaid())
            .await?;
        debug!(debts = debts.len(), "Fetched debts for balance");
        Ok(compute_balance(&debts, me))
    }

    /// The current user's balance with one other user.
    pub async fn balance_with(&self, name: &str) -> Result<Balance, AppError> {
        let me = self.current_user_id()?;
        let other = self.get_user(name).await?;
        let debts = self
            .repo
            .fetch_debts(&DebtFilter::between(me, other.id).unpaid())
            .await?;
        Ok(compute_balance(&debts, me))
    }

    /// The current user's balance inside a group.
    pub async fn group_balance(&self, name: &str) -> Result<Balance, AppError> {
        let me = self.current_user_id()?;
        let group = self.get_group(name).await?;
        let debts = self
            .repo
            .fetch_debts(&DebtFilter::in_group(group.id).unpaid())
            .await?;
        Ok(group_balance(&debts, group.id, me))
    }

    /// One entry per user the current user has open debts with, ordered by name.
    pub async fn friend_balances(&self) -> Result<Vec<FriendBalance>, AppError> {
        let me = self.current_user_id()?;
        let debts = self
            .repo
            .fetch_debts(&DebtFilter::for_user(me).unpaid())
            .await?;

        let mut friends = Vec::new();
        for (other, balance) in balances_by_counterparty(&debts, me) {
            let user = self.get_user_by_id(other).await?;
            friends.push(FriendBalance { user, balance });
        }
        friends.sort_by(|a, b| a.user.name.cmp(&b.user.name));
        Ok(friends)
    }

    // ========================
    // Settlement
    // ========================

    /// Settle everything between the current user and `name`.
    ///
    /// Writes go debts, then expenses, then activities, without rollback. If
    /// a write fails the call can simply be repeated: paid debts are skipped
    /// and expenses left unflagged by the failed attempt are picked up again.
    pub async fn settle_with(&self, name: &str) -> Result<SettlementResult, AppError> {
        let me = self.current_user_id()?;
        let counterparty = self.get_user(name).await?;

        // Paid debts of still-open expenses are kept so a retry can flag them.
        let pair_debts = self
            .repo
            .fetch_debts(&DebtFilter::between(me, counterparty.id).in_open_expenses())
            .await?;
        let net_before = pair_balance(&pair_debts, me, counterparty.id);

        let mut expense_ids: Vec<ExpenseId> = Vec::new();
        for debt in &pair_debts {
            if !expense_ids.contains(&debt.expense) {
                expense_ids.push(debt.expense);
            }
        }

        let expenses: Vec<Expense> = self
            .repo
            .fetch_expenses_by_ids(&expense_ids)
            .await?
            .into_iter()
            .filter(|expense| !expense.paid)
            .collect();
        let open_ids: Vec<ExpenseId> = expenses.iter().map(|expense| expense.id).collect();

        // Complete debt set of every open expense, not just the pair's share.
        let debts = self
            .repo
            .fetch_debts(&DebtFilter::for_expenses(open_ids))
            .await?;
        debug!(
            pair_debts = pair_debts.len(),
            open_expenses = expenses.len(),
            debts = debts.len(),
            "Loaded settlement input"
        );

        let (debtor, creditor) = if net_before > 0 {
            (counterparty.id, me)
        } else {
            (me, counterparty.id)
        };
        let settlement = settle_payment(me, debtor, creditor, &debts, &expenses, Utc::now())?;

        if settlement.is_empty() {
            info!(counterparty = %counterparty.name, "Nothing to settle");
            return Ok(SettlementResult {
                counterparty,
                net_before,
                settlement,
            });
        }

        self.repo.write_debts(&settlement.debts).await?;
        self.repo.write_expenses(&settlement.expenses).await?;
        self.repo.append_activities(&settlement.activities).await?;

        info!(
            counterparty = %counterparty.name,
            net_before,
            debts = settlement.debts.len(),
            expenses = settlement.expenses.len(),
            "Settled debts"
        );

        Ok(SettlementResult {
            counterparty,
            net_before,
            settlement,
        })
    }

    // ========================
    // Activity & export access
    // ========================

    /// Activity concerning the current user, or everyone when acting anonymously.
    pub async fn list_activities(&self, limit: Option<usize>) -> Result<Vec<Activity>, AppError> {
        let user = self.identity.current_user_id();
        Ok(self.repo.list_activities(user, limit).await?)
    }

    pub async fn list_all_activities(&self) -> Result<Vec<Activity>, AppError> {
        Ok(self.repo.list_activities(None, None).await?)
    }

    pub async fn list_all_debts(&self) -> Result<Vec<Debt>, AppError> {
        Ok(self.repo.fetch_debts(&DebtFilter::default()).await?)
    }

    pub async fn list_all_expenses(&self) -> Result<Vec<Expense>, AppError> {
        Ok(self.repo.list_expenses(&ExpenseFilter::default()).await?)
    }
}
