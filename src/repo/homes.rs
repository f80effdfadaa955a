use aws_sdk_dynamodb::Client as DynamoDbClient;

use super::{from_item, query_all, string_value, to_item, StoreError};
use energy_monitor::shared::domain::Home;

const OWNER_INDEX: &str = "owner_index";

pub async fn get_home(
    client: &DynamoDbClient,
    table_name: &str,
    home_id: &str,
) -> Result<Option<Home>, StoreError> {
    let result = client
        .get_item()
        .table_name(table_name)
        .key("home_id", string_value(home_id))
        .send()
        .await?;

    result.item.map(from_item).transpose()
}

/// Homes owned by `owner_id`, oldest first
pub async fn list_homes_for_owner(
    client: &DynamoDbClient,
    table_name: &str,
    owner_id: &str,
) -> Result<Vec<Home>, StoreError> {
    let mut homes: Vec<Home> =
        query_all(client, table_name, Some(OWNER_INDEX), "owner_id", owner_id).await?;
    homes.sort_by(|a, b| a.created_at.cmp(&b.created_at));
    Ok(homes)
}

/// Create or replace a home record
pub async fn put_home(
    client: &DynamoDbClient,
    table_name: &str,
    home: &Home,
) -> Result<(), StoreError> {
    client
        .put_item()
        .table_name(table_name)
        .set_item(Some(to_item(home)?))
        .send()
        .await?;

    Ok(())
}

pub async fn delete_home(
    client: &DynamoDbClient,
    table_name: &str,
    home_id: &str,
) -> Result<(), StoreError> {
    client
        .delete_item()
        .table_name(table_name)
        .key("home_id", string_value(home_id))
        .send()
        .await?;

    Ok(())
}
