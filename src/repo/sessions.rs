use aws_sdk_dynamodb::types::AttributeValue;
use aws_sdk_dynamodb::Client as DynamoDbClient;

use super::{from_item, string_value, to_item, StoreError};
use energy_monitor::shared::domain::Session;

/// Persist a login session keyed by token hash.
///
/// A numeric `ttl` attribute mirrors `expires_at` so DynamoDB TTL can reap
/// stale sessions; reads still check expiry themselves.
pub async fn put_session(
    client: &DynamoDbClient,
    table_name: &str,
    session: &Session,
) -> Result<(), StoreError> {
    let mut item = to_item(session)?;
    item.insert(
        "ttl".to_string(),
        AttributeValue::N(session.expires_at.timestamp().to_string()),
    );

    client
        .put_item()
        .table_name(table_name)
        .set_item(Some(item))
        .send()
        .await?;

    Ok(())
}

pub async fn get_session(
    client: &DynamoDbClient,
    table_name: &str,
    token_hash: &str,
) -> Result<Option<Session>, StoreError> {
    let result = client
        .get_item()
        .table_name(table_name)
        .key("token_hash", string_value(token_hash))
        .send()
        .await?;

    match result.item {
        Some(mut item) => {
            item.remove("ttl");
            Ok(Some(from_item(item)?))
        }
        None => Ok(None),
    }
}

pub async fn delete_session(
    client: &DynamoDbClient,
    table_name: &str,
    token_hash: &str,
) -> Result<(), StoreError> {
    client
        .delete_item()
        .table_name(table_name)
        .key("token_hash", string_value(token_hash))
        .send()
        .await?;

    Ok(())
}
