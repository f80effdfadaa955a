use aws_sdk_dynamodb::Client as DynamoDbClient;

use super::{from_item, query_all, string_value, to_item, StoreError};
use energy_monitor::shared::domain::AlertRule;

const HOME_INDEX: &str = "home_index";
const OWNER_INDEX: &str = "owner_index";

pub async fn get_rule(
    client: &DynamoDbClient,
    table_name: &str,
    rule_id: &str,
) -> Result<Option<AlertRule>, StoreError> {
    let result = client
        .get_item()
        .table_name(table_name)
        .key("rule_id", string_value(rule_id))
        .send()
        .await?;

    result.item.map(from_item).transpose()
}

pub async fn list_rules_for_owner(
    client: &DynamoDbClient,
    table_name: &str,
    owner_id: &str,
) -> Result<Vec<AlertRule>, StoreError> {
    let mut rules: Vec<AlertRule> =
        query_all(client, table_name, Some(OWNER_INDEX), "owner_id", owner_id).await?;
    rules.sort_by(|a, b| a.created_at.cmp(&b.created_at));
    Ok(rules)
}

/// All rules attached to a home, including device-scoped ones
pub async fn list_rules_for_home(
    client: &DynamoDbClient,
    table_name: &str,
    home_id: &str,
) -> Result<Vec<AlertRule>, StoreError> {
    query_all(client, table_name, Some(HOME_INDEX), "home_id", home_id).await
}

pub async fn put_rule(
    client: &DynamoDbClient,
    table_name: &str,
    rule: &AlertRule,
) -> Result<(), StoreError> {
    client
        .put_item()
        .table_name(table_name)
        .set_item(Some(to_item(rule)?))
        .send()
        .await?;

    Ok(())
}

pub async fn delete_rule(
    client: &DynamoDbClient,
    table_name: &str,
    rule_id: &str,
) -> Result<(), StoreError> {
    client
        .delete_item()
        .table_name(table_name)
        .key("rule_id", string_value(rule_id))
        .send()
        .await?;

    Ok(())
}
