use aws_sdk_dynamodb::Client as DynamoDbClient;

use super::{from_item, query_all, scan_all, string_value, to_item, StoreError};
use energy_monitor::shared::domain::User;

const EMAIL_INDEX: &str = "email_index";

pub async fn get_user(
    client: &DynamoDbClient,
    table_name: &str,
    user_id: &str,
) -> Result<Option<User>, StoreError> {
    let result = client
        .get_item()
        .table_name(table_name)
        .key("user_id", string_value(user_id))
        .send()
        .await?;

    result.item.map(from_item).transpose()
}

/// Look up a user by normalized (lowercase) email via the email GSI
pub async fn find_user_by_email(
    client: &DynamoDbClient,
    table_name: &str,
    email: &str,
) -> Result<Option<User>, StoreError> {
    let users: Vec<User> =
        query_all(client, table_name, Some(EMAIL_INDEX), "email", email).await?;
    Ok(users.into_iter().next())
}

/// Insert a new user. Fails with `ConditionalCheckFailed` if the id exists.
pub async fn create_user(
    client: &DynamoDbClient,
    table_name: &str,
    user: &User,
) -> Result<(), StoreError> {
    let item = to_item(user)?;

    client
        .put_item()
        .table_name(table_name)
        .set_item(Some(item))
        .condition_expression("attribute_not_exists(user_id)")
        .send()
        .await
        .map_err(|e| {
            let service_error = e.into_service_error();
            if service_error.is_conditional_check_failed_exception() {
                StoreError::ConditionalCheckFailed
            } else {
                StoreError::DynamoDb(format!("{:?}", service_error))
            }
        })?;

    Ok(())
}

pub async fn list_users(client: &DynamoDbClient, table_name: &str) -> Result<Vec<User>, StoreError> {
    let mut users: Vec<User> = scan_all(client, table_name).await?;
    users.sort_by(|a, b| a.created_at.cmp(&b.created_at));
    Ok(users)
}
