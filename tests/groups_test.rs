mod common;

use anyhow::Result;
use celery::application::{AppError, ExpenseQuery, NewExpense};
use celery::domain::ValidationError;
use common::{Friends, even_expense, test_service};

fn in_group(group: &str, new: NewExpense) -> NewExpense {
    NewExpense {
        group: Some(group.to_string()),
        ..new
    }
}

#[tokio::test]
async fn test_create_group_includes_creator() -> Result<()> {
    let (service, _temp) = test_service().await?;
    let service = Friends::acting_as(service, "alice").await?;

    let group = service
        .create_group("trip".to_string(), &["bob".to_string()])
        .await?;

    let alice = service.current_user().await?;
    let bob = service.get_user("bob").await?;
    assert_eq!(group.members.len(), 2);
    assert!(group.is_member(alice.id));
    assert!(group.is_member(bob.id));

    let stored = service.get_group("trip").await?;
    assert_eq!(stored.id, group.id);
    assert_eq!(stored.members, group.members);
    assert_eq!(service.list_groups().await?.len(), 1);

    let duplicate = service.create_group("trip".to_string(), &[]).await;
    assert!(matches!(duplicate, Err(AppError::GroupAlreadyExists(_))));

    Ok(())
}

#[tokio::test]
async fn test_create_group_requires_current_user() -> Result<()> {
    let (service, _temp) = test_service().await?;
    Friends::create(&service).await?;

    let result = service.create_group("trip".to_string(), &[]).await;
    assert!(matches!(result, Err(AppError::NoCurrentUser)));

    Ok(())
}

#[tokio::test]
async fn test_add_group_member() -> Result<()> {
    let (service, _temp) = test_service().await?;
    let service = Friends::acting_as(service, "alice").await?;

    service.create_group("flat".to_string(), &[]).await?;
    let group = service.add_group_member("flat", "carol").await?;
    assert_eq!(group.members.len(), 2);

    // Adding twice changes nothing
    let again = service.add_group_member("flat", "carol").await?;
    assert_eq!(again.members, group.members);
    assert_eq!(service.get_group("flat").await?.members.len(), 2);

    let missing = service.add_group_member("nowhere", "carol").await;
    assert!(matches!(missing, Err(AppError::GroupNotFound(_))));

    Ok(())
}

#[tokio::test]
async fn test_group_balance_only_counts_group_debts() -> Result<()> {
    let (service, _temp) = test_service().await?;
    let service = Friends::acting_as(service, "alice").await?;
    service
        .create_group("trip".to_string(), &["bob".to_string()])
        .await?;

    service
        .add_expense(in_group(
            "trip",
            even_expense("Hotel", 5000, &["alice", "bob"]),
        ))
        .await?;
    service
        .add_expense(even_expense("Books", 1000, &["alice", "bob"]))
        .await?;

    assert_eq!(service.group_balance("trip").await?.total, 2500);
    assert_eq!(service.balance_with("bob").await?.total, 3000);

    let grouped = service
        .list_expenses(ExpenseQuery {
            group: Some("trip".to_string()),
            ..ExpenseQuery::default()
        })
        .await?;
    assert_eq!(grouped.len(), 1);
    assert_eq!(grouped[0].description, "Hotel");

    Ok(())
}

#[tokio::test]
async fn test_group_expense_rejects_non_members() -> Result<()> {
    let (service, _temp) = test_service().await?;
    let service = Friends::acting_as(service, "alice").await?;
    service
        .create_group("trip".to_string(), &["bob".to_string()])
        .await?;

    let result = service
        .add_expense(in_group(
            "trip",
            even_expense("Hotel", 6000, &["alice", "bob", "carol"]),
        ))
        .await;

    assert!(matches!(
        result,
        Err(AppError::Validation(ValidationError::NotGroupMember { .. }))
    ));
    assert!(service.list_all_expenses().await?.is_empty());
    assert!(service.list_all_debts().await?.is_empty());

    Ok(())
}

#[tokio::test]
async fn test_group_member_balances_sum_to_zero() -> Result<()> {
    let (service, _temp) = test_service().await?;
    let service = Friends::acting_as(service, "alice").await?;
    service
        .create_group(
            "trip".to_string(),
            &["bob".to_string(), "carol".to_string()],
        )
        .await?;

    service
        .add_expense(in_group(
            "trip",
            even_expense("Hotel", 9000, &["alice", "bob", "carol"]),
        ))
        .await?;

    let service = service.act_as("bob").await?;
    service
        .add_expense(in_group(
            "trip",
            even_expense("Dinner", 3000, &["alice", "bob", "carol"]),
        ))
        .await?;

    let balances = service.group_member_balances("trip").await?;
    let summary: Vec<(&str, i64)> = balances
        .iter()
        .map(|b| (b.user.name.as_str(), b.balance.total))
        .collect();
    assert_eq!(summary, vec![("alice", 5000), ("bob", -1000), ("carol", -4000)]);
    assert_eq!(summary.iter().map(|(_, total)| total).sum::<i64>(), 0);

    Ok(())
}
