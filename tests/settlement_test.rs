mod common;

use anyhow::Result;
use celery::application::AppError;
use celery::domain::{ActivityAction, ActivityType, Balance, ValidationError};
use common::{Friends, even_expense, test_service};

#[tokio::test]
async fn test_settle_single_expense() -> Result<()> {
    let (service, _temp) = test_service().await?;
    let service = Friends::acting_as(service, "alice").await?;

    let info = service
        .add_expense(even_expense("Dinner", 6000, &["alice", "bob"]))
        .await?;
    let debt_id = info.debts[0].id;

    assert_eq!(
        service.balance().await?,
        Balance {
            owed: 3000,
            owe: 0,
            total: 3000
        }
    );

    let service = service.act_as("bob").await?;
    assert_eq!(
        service.balance().await?,
        Balance {
            owed: 0,
            owe: 3000,
            total: -3000
        }
    );

    let result = service.settle_with("alice").await?;
    assert_eq!(result.net_before, -3000);
    assert_eq!(result.settlement.debts.len(), 1);
    assert_eq!(result.settlement.expenses.len(), 1);
    assert_eq!(result.settlement.settled_amount(), 3000);
    assert!(
        result
            .settlement
            .activities
            .iter()
            .any(|a| a.reference == debt_id)
    );

    assert!(service.balance().await?.is_settled());
    let stored = service.get_expense_info(info.expense.id).await?;
    assert!(stored.expense.paid);
    assert!(stored.debts.iter().all(|d| d.paid));

    let service = service.act_as("alice").await?;
    assert!(service.balance().await?.is_settled());

    Ok(())
}

#[tokio::test]
async fn test_settlement_is_idempotent() -> Result<()> {
    let (service, _temp) = test_service().await?;
    let service = Friends::acting_as(service, "alice").await?;

    service
        .add_expense(even_expense("Dinner", 6000, &["alice", "bob"]))
        .await?;

    let service = service.act_as("bob").await?;
    service.settle_with("alice").await?;
    let activities_after_first = service.list_all_activities().await?.len();

    let again = service.settle_with("alice").await?;
    assert!(again.settlement.is_empty());
    assert_eq!(again.net_before, 0);
    assert_eq!(
        service.list_all_activities().await?.len(),
        activities_after_first
    );
    assert!(service.balance().await?.is_settled());

    Ok(())
}

#[tokio::test]
async fn test_expense_paid_only_when_every_debt_is_paid() -> Result<()> {
    let (service, _temp) = test_service().await?;
    let service = Friends::acting_as(service, "alice").await?;

    let info = service
        .add_expense(even_expense("Cabin", 9000, &["alice", "bob", "carol"]))
        .await?;

    let service = service.act_as("bob").await?;
    let first = service.settle_with("alice").await?;
    assert_eq!(first.settlement.debts.len(), 1);
    assert!(first.settlement.expenses.is_empty());
    assert!(!service.get_expense_info(info.expense.id).await?.expense.paid);

    // carol still owes alice
    let service = service.act_as("alice").await?;
    assert_eq!(service.balance_with("carol").await?.total, 3000);

    let service = service.act_as("carol").await?;
    let second = service.settle_with("alice").await?;
    assert_eq!(second.settlement.debts.len(), 1);
    assert_eq!(second.settlement.expenses.len(), 1);
    assert!(service.get_expense_info(info.expense.id).await?.expense.paid);

    Ok(())
}

#[tokio::test]
async fn test_settle_covers_both_directions() -> Result<()> {
    let (service, _temp) = test_service().await?;
    let service = Friends::acting_as(service, "alice").await?;

    let lunch = service
        .add_expense(even_expense("Lunch", 4000, &["alice", "bob"]))
        .await?;

    let service = service.act_as("bob").await?;
    let coffee = service
        .add_expense(even_expense("Coffee", 1000, &["alice", "bob"]))
        .await?;

    let service = service.act_as("alice").await?;
    assert_eq!(service.balance_with("bob").await?.total, 1500);

    let result = service.settle_with("bob").await?;
    assert_eq!(result.net_before, 1500);
    assert_eq!(result.settlement.debts.len(), 2);
    assert_eq!(result.settlement.expenses.len(), 2);

    assert!(service.balance_with("bob").await?.is_settled());
    assert!(service.get_expense_info(lunch.expense.id).await?.expense.paid);
    assert!(service.get_expense_info(coffee.expense.id).await?.expense.paid);

    Ok(())
}

#[tokio::test]
async fn test_settle_leaves_other_pairs_alone() -> Result<()> {
    let (service, _temp) = test_service().await?;
    let service = Friends::acting_as(service, "alice").await?;

    service
        .add_expense(even_expense("Groceries", 9000, &["alice", "bob", "carol"]))
        .await?;
    service
        .add_expense(even_expense("Tickets", 2000, &["alice", "carol"]))
        .await?;

    service.settle_with("bob").await?;

    assert!(service.balance_with("bob").await?.is_settled());
    assert_eq!(service.balance_with("carol").await?.total, 4000);
    assert_eq!(service.balance().await?.total, 4000);

    Ok(())
}

#[tokio::test]
async fn test_settlement_activity_action_depends_on_actor() -> Result<()> {
    let (service, _temp) = test_service().await?;
    let service = Friends::acting_as(service, "alice").await?;

    service
        .add_expense(even_expense("Dinner", 6000, &["alice", "bob"]))
        .await?;
    service
        .add_expense(even_expense("Drinks", 2000, &["alice", "carol"]))
        .await?;

    // Creditor records the payment
    let by_creditor = service.settle_with("carol").await?;
    let debt_activity = by_creditor
        .settlement
        .activities
        .iter()
        .find(|a| a.activity_type == ActivityType::Debt)
        .expect("debt activity");
    assert_eq!(debt_activity.action, ActivityAction::Pay);

    let carol = service.get_user("carol").await?;
    assert_eq!(debt_activity.related_user, Some(carol.id));

    // Debtor settles up
    let service = service.act_as("bob").await?;
    let by_debtor = service.settle_with("alice").await?;
    let debt_activity = by_debtor
        .settlement
        .activities
        .iter()
        .find(|a| a.activity_type == ActivityType::Debt)
        .expect("debt activity");
    assert_eq!(debt_activity.action, ActivityAction::Settle);

    let expense_activity = by_debtor
        .settlement
        .activities
        .iter()
        .find(|a| a.activity_type == ActivityType::Expense)
        .expect("expense activity");
    assert_eq!(expense_activity.action, ActivityAction::Pay);

    Ok(())
}

#[tokio::test]
async fn test_settlement_activities_are_persisted() -> Result<()> {
    let (service, _temp) = test_service().await?;
    let service = Friends::acting_as(service, "alice").await?;

    service
        .add_expense(even_expense("Dinner", 6000, &["alice", "bob"]))
        .await?;

    let service = service.act_as("bob").await?;
    let result = service.settle_with("alice").await?;

    let recent = service.list_activities(Some(10)).await?;
    for activity in &result.settlement.activities {
        assert!(recent.iter().any(|a| a.id == activity.id));
    }

    Ok(())
}

#[tokio::test]
async fn test_settle_with_self_is_rejected() -> Result<()> {
    let (service, _temp) = test_service().await?;
    let service = Friends::acting_as(service, "alice").await?;

    let result = service.settle_with("alice").await;
    assert!(matches!(
        result,
        Err(AppError::Validation(ValidationError::SelfReferentialDebt(_)))
    ));

    Ok(())
}

#[tokio::test]
async fn test_settle_with_unknown_user() -> Result<()> {
    let (service, _temp) = test_service().await?;
    let service = Friends::acting_as(service, "alice").await?;

    let result = service.settle_with("mallory").await;
    assert!(matches!(result, Err(AppError::UserNotFound(_))));
    assert!(result.is_err_and(|e| e.is_not_found()));

    Ok(())
}

#[tokio::test]
async fn test_friend_balances_overview() -> Result<()> {
    let (service, _temp) = test_service().await?;
    let service = Friends::acting_as(service, "alice").await?;

    service
        .add_expense(even_expense("Groceries", 9000, &["alice", "bob", "carol"]))
        .await?;

    let service = service.act_as("carol").await?;
    service
        .add_expense(even_expense("Fuel", 1000, &["alice", "carol"]))
        .await?;

    let service = service.act_as("alice").await?;
    let friends = service.friend_balances().await?;
    let summary: Vec<(&str, i64)> = friends
        .iter()
        .map(|f| (f.user.name.as_str(), f.balance.total))
        .collect();
    assert_eq!(summary, vec![("bob", 3000), ("carol", 2500)]);

    service.settle_with("bob").await?;
    let friends = service.friend_balances().await?;
    assert_eq!(friends.len(), 1);
    assert_eq!(friends[0].user.name, "carol");

    Ok(())
}
