// Allow dead_code because these helpers are used across different test files
// which are compiled separately
#![allow(dead_code)]

use anyhow::Result;
use chrono::{DateTime, NaiveDate, Utc};
use celery::Repository;
use celery::application::{NewExpense, SplitMode, SplitService};
use tempfile::TempDir;

/// Helper to create a test service with a temporary database
pub async fn test_service() -> Result<(SplitService, TempDir)> {
    let temp_dir = TempDir::new()?;
    let db_path = temp_dir.path().join("test.db");
    let service = SplitService::init(db_path.to_str().unwrap()).await?;
    Ok((service, temp_dir))
}

/// A second handle on the database behind [`test_service`]
pub async fn test_repository(temp_dir: &TempDir) -> Result<Repository> {
    let db_path = temp_dir.path().join("test.db");
    Repository::connect(&format!("sqlite:{}", db_path.display())).await
}

/// Helper to parse a date string into DateTime<Utc>
pub fn parse_date(date_str: &str) -> DateTime<Utc> {
    NaiveDate::parse_from_str(date_str, "%Y-%m-%d")
        .unwrap()
        .and_hms_opt(0, 0, 0)
        .unwrap()
        .and_utc()
}

/// Test fixture: alice, bob and carol
pub struct Friends;

impl Friends {
    pub async fn create(service: &SplitService) -> Result<()> {
        for name in ["alice", "bob", "carol"] {
            service.create_user(name.to_string(), None).await?;
        }
        Ok(())
    }

    /// Create the users and return a service acting as `name`.
    pub async fn acting_as(service: SplitService, name: &str) -> Result<SplitService> {
        Self::create(&service).await?;
        Ok(service.act_as(name).await?)
    }
}

/// An even split between `names`, paid by the current user.
pub fn even_expense(description: &str, amount_cents: i64, names: &[&str]) -> NewExpense {
    NewExpense {
        description: description.to_string(),
        amount_cents,
        payer: None,
        split: SplitMode::Even(names.iter().map(|n| n.to_string()).collect()),
        group: None,
        category: None,
        date: Utc::now(),
    }
}
