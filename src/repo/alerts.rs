use aws_sdk_dynamodb::types::AttributeValue;
use aws_sdk_dynamodb::Client as DynamoDbClient;
use chrono::SecondsFormat;

use super::{
    decode_cursor, encode_cursor, from_item, from_items, page_limit, string_value, to_item, Page,
    StoreError,
};
use energy_monitor::shared::domain::TriggeredAlert;

const OWNER_INDEX: &str = "owner_index";

pub const DEFAULT_PAGE_SIZE: i32 = 50;
pub const MAX_PAGE_SIZE: i32 = 200;

pub async fn get_alert(
    client: &DynamoDbClient,
    table_name: &str,
    alert_id: &str,
) -> Result<Option<TriggeredAlert>, StoreError> {
    let result = client
        .get_item()
        .table_name(table_name)
        .key("alert_id", string_value(alert_id))
        .send()
        .await?;

    result.item.map(from_item).transpose()
}

/// Record a newly triggered alert
pub async fn put_alert(
    client: &DynamoDbClient,
    table_name: &str,
    alert: &TriggeredAlert,
) -> Result<(), StoreError> {
    client
        .put_item()
        .table_name(table_name)
        .set_item(Some(to_item(alert)?))
        .send()
        .await?;

    Ok(())
}

/// One page of a user's alerts, newest first, optionally filtered by
/// acknowledgement state
pub async fn list_alerts_for_owner(
    client: &DynamoDbClient,
    table_name: &str,
    owner_id: &str,
    acknowledged: Option<bool>,
    limit: Option<i32>,
    cursor: Option<&str>,
) -> Result<Page<TriggeredAlert>, StoreError> {
    let start_key = cursor
        .map(|c| decode_cursor(c, &["alert_id", "owner_id", "triggered_at"]))
        .transpose()?;

    let mut query = client
        .query()
        .table_name(table_name)
        .index_name(OWNER_INDEX)
        .key_condition_expression("owner_id = :owner_id")
        .expression_attribute_values(":owner_id", string_value(owner_id))
        .scan_index_forward(false)
        .limit(page_limit(limit, DEFAULT_PAGE_SIZE, MAX_PAGE_SIZE))
        .set_exclusive_start_key(start_key);

    if let Some(acknowledged) = acknowledged {
        query = query
            .filter_expression("acknowledged = :ack")
            .expression_attribute_values(":ack", AttributeValue::Bool(acknowledged));
    }

    let result = query.send().await?;

    Ok(Page {
        items: from_items(result.items)?,
        next_cursor: encode_cursor(result.last_evaluated_key),
    })
}

/// `acknowledged_at` attribute for an alert marked acknowledged in memory
fn acknowledged_at_value(alert: &TriggeredAlert) -> Option<AttributeValue> {
    alert
        .acknowledged
        .then_some(alert.acknowledged_at)
        .flatten()
        .map(|at| AttributeValue::S(at.to_rfc3339_opts(SecondsFormat::AutoSi, true)))
}

/// Persist an acknowledgement made with `alerts::acknowledge`.
///
/// Only the first acknowledgement writes; when another request got there first
/// the stored alert is returned unchanged. Returns `None` if the alert does not
/// exist.
pub async fn save_acknowledgement(
    client: &DynamoDbClient,
    table_name: &str,
    alert: &TriggeredAlert,
) -> Result<Option<TriggeredAlert>, StoreError> {
    let acknowledged_at = acknowledged_at_value(alert).ok_or_else(|| {
        StoreError::Serialization(format!("alert {} is not acknowledged", alert.alert_id))
    })?;

    let result = client
        .update_item()
        .table_name(table_name)
        .key("alert_id", string_value(&alert.alert_id))
        .update_expression("SET acknowledged = :t, acknowledged_at = :at")
        .condition_expression("attribute_exists(alert_id) AND acknowledged = :f")
        .expression_attribute_values(":t", AttributeValue::Bool(true))
        .expression_attribute_values(":f", AttributeValue::Bool(false))
        .expression_attribute_values(":at", acknowledged_at)
        .return_values(aws_sdk_dynamodb::types::ReturnValue::AllNew)
        .send()
        .await;

    match result {
        Ok(output) => output.attributes.map(from_item).transpose(),
        Err(e) => {
            let service_error = e.into_service_error();
            if service_error.is_conditional_check_failed_exception() {
                // Missing, or already acknowledged
                get_alert(client, table_name, &alert.alert_id).await
            } else {
                Err(StoreError::DynamoDb(format!("{:?}", service_error)))
            }
        }
    }
}
