//! Subscription record queries.

use linky_core::db::unix_timestamp;
use tracing::warn;

use super::models::{SubscriptionRecord, SubscriptionRow};
use super::{DatabaseError, NotifierDatabase};

impl NotifierDatabase {
    /// Insert or replace the record for `record.npub`.
    pub async fn put_subscription(&self, record: &SubscriptionRecord) -> Result<(), DatabaseError> {
        let subscription = serde_json::to_string(&record.push)
            .map_err(|e| DatabaseError::Query(e.to_string()))?;
        let relays = serde_json::to_string(&record.relays)
            .map_err(|e| DatabaseError::Query(e.to_string()))?;

        sqlx::query(
            "INSERT INTO subscriptions (npub, subscription, relays, last_check, updated_at) \
             VALUES (?, ?, ?, ?, ?) \
             ON CONFLICT(npub) DO UPDATE SET \
               subscription = excluded.subscription, \
               relays = excluded.relays, \
               last_check = excluded.last_check, \
               updated_at = excluded.updated_at",
        )
        .bind(&record.npub)
        .bind(subscription)
        .bind(relays)
        .bind(record.last_check)
        .bind(record.updated_at)
        .execute(self.pool())
        .await?;

        Ok(())
    }

    /// Get the record for a user, if registered.
    pub async fn get_subscription(
        &self,
        npub: &str,
    ) -> Result<Option<SubscriptionRecord>, DatabaseError> {
        let row =
            sqlx::query_as::<_, SubscriptionRow>("SELECT * FROM subscriptions WHERE npub = ?")
                .bind(npub)
                .fetch_optional(self.pool())
                .await?;

        row.map(SubscriptionRecord::try_from).transpose()
    }

    /// Delete a user's record.
    ///
    /// Returns `true` if a row was deleted, `false` if the user was unknown.
    pub async fn delete_subscription(&self, npub: &str) -> Result<bool, DatabaseError> {
        let result = sqlx::query("DELETE FROM subscriptions WHERE npub = ?")
            .bind(npub)
            .execute(self.pool())
            .await?;

        Ok(result.rows_affected() > 0)
    }

    /// List every stored record, oldest registration first.
    ///
    /// Rows that cannot be decoded are logged and skipped so one bad record
    /// does not prevent the rest from being restored.
    pub async fn list_subscriptions(&self) -> Result<Vec<SubscriptionRecord>, DatabaseError> {
        let rows = sqlx::query_as::<_, SubscriptionRow>(
            "SELECT * FROM subscriptions ORDER BY updated_at ASC, npub ASC",
        )
        .fetch_all(self.pool())
        .await?;

        Ok(rows
            .into_iter()
            .filter_map(|row| {
                SubscriptionRecord::try_from(row)
                    .map_err(|e| warn!(error = %e, "Skipping unreadable subscription row"))
                    .ok()
            })
            .collect())
    }

    /// Advance the `last_check` watermark for a user.
    ///
    /// The stored value never decreases. Returns `false` if the user is
    /// not registered.
    pub async fn update_last_check(&self, npub: &str, timestamp: i64) -> Result<bool, DatabaseError> {
        let result = sqlx::query(
            "UPDATE subscriptions SET last_check = MAX(last_check, ?), updated_at = ? \
             WHERE npub = ?",
        )
        .bind(timestamp)
        .bind(unix_timestamp())
        .bind(npub)
        .execute(self.pool())
        .await?;

        Ok(result.rows_affected() > 0)
    }
}
