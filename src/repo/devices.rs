use aws_sdk_dynamodb::operation::transact_write_items::TransactWriteItemsError;
use aws_sdk_dynamodb::types::{AttributeValue, Delete, Put, TransactWriteItem};
use aws_sdk_dynamodb::Client as DynamoDbClient;

use super::readings::reading_item;
use super::{from_item, query_all, string_value, to_item, StoreError};
use energy_monitor::shared::domain::{Device, Reading};

const SESSION_UNCHANGED: &str = "attribute_exists(device_id) AND last_turned_on = :since";

const HOME_INDEX: &str = "home_index";
const OWNER_INDEX: &str = "owner_index";

/// Get a device by id
///
/// # Returns
/// * `Ok(Some(Device))` - Device found
/// * `Ok(None)` - Device not found
/// * `Err(StoreError)` - DynamoDB or deserialization error
pub async fn get_device(
    client: &DynamoDbClient,
    table_name: &str,
    device_id: &str,
) -> Result<Option<Device>, StoreError> {
    let result = client
        .get_item()
        .table_name(table_name)
        .key("device_id", string_value(device_id))
        .send()
        .await?;

    result.item.map(from_item).transpose()
}

/// Devices registered to a home, sorted by name
pub async fn list_devices_for_home(
    client: &DynamoDbClient,
    table_name: &str,
    home_id: &str,
) -> Result<Vec<Device>, StoreError> {
    let mut devices: Vec<Device> =
        query_all(client, table_name, Some(HOME_INDEX), "home_id", home_id).await?;
    devices.sort_by(|a, b| a.name.cmp(&b.name));
    Ok(devices)
}

/// Every device owned by a user, across homes
pub async fn list_devices_for_owner(
    client: &DynamoDbClient,
    table_name: &str,
    owner_id: &str,
) -> Result<Vec<Device>, StoreError> {
    let mut devices: Vec<Device> =
        query_all(client, table_name, Some(OWNER_INDEX), "owner_id", owner_id).await?;
    devices.sort_by(|a, b| (&a.home_id, &a.name).cmp(&(&b.home_id, &b.name)));
    Ok(devices)
}

/// Create or replace a device record.
///
/// The whole record is written so `is_active` and `last_turned_on` always
/// change together.
pub async fn put_device(
    client: &DynamoDbClient,
    table_name: &str,
    device: &Device,
) -> Result<(), StoreError> {
    client
        .put_item()
        .table_name(table_name)
        .set_item(Some(to_item(device)?))
        .send()
        .await?;

    Ok(())
}

pub async fn delete_device(
    client: &DynamoDbClient,
    table_name: &str,
    device_id: &str,
) -> Result<(), StoreError> {
    client
        .delete_item()
        .table_name(table_name)
        .key("device_id", string_value(device_id))
        .send()
        .await?;

    Ok(())
}

/// Stored `last_turned_on` of the record a session was closed from
fn session_start(before: &Device) -> Result<AttributeValue, StoreError> {
    to_item(before)?
        .remove("last_turned_on")
        .ok_or_else(|| {
            StoreError::Serialization(format!("device {} has no running session", before.device_id))
        })
}

/// Writes that close the session `before` was running: the device update (or
/// its deletion when `after` is `None`) guarded on the session start, and the
/// finished readings.
fn close_session_items(
    devices_table: &str,
    readings_table: &str,
    before: &Device,
    after: Option<&Device>,
    readings: &[Reading],
) -> Result<Vec<TransactWriteItem>, StoreError> {
    let since = session_start(before)?;

    let device_write = match after {
        Some(device) => TransactWriteItem::builder()
            .put(
                Put::builder()
                    .table_name(devices_table)
                    .set_item(Some(to_item(device)?))
                    .condition_expression(SESSION_UNCHANGED)
                    .expression_attribute_values(":since", since)
                    .build()?,
            )
            .build(),
        None => TransactWriteItem::builder()
            .delete(
                Delete::builder()
                    .table_name(devices_table)
                    .key("device_id", string_value(&before.device_id))
                    .condition_expression(SESSION_UNCHANGED)
                    .expression_attribute_values(":since", since)
                    .build()?,
            )
            .build(),
    };

    let mut items = vec![device_write];
    for reading in readings {
        items.push(
            TransactWriteItem::builder()
                .put(
                    Put::builder()
                        .table_name(readings_table)
                        .set_item(Some(reading_item(reading)?))
                        .build()?,
                )
                .build(),
        );
    }
    Ok(items)
}

fn is_condition_failure(err: &TransactWriteItemsError) -> bool {
    match err {
        TransactWriteItemsError::TransactionCanceledException(e) => e
            .cancellation_reasons()
            .iter()
            .any(|reason| reason.code() == Some("ConditionalCheckFailed")),
        _ => false,
    }
}

/// Record the sessions a device change closed, together with the change.
///
/// The device and its readings are written in one transaction, so a session
/// is never stored while the device still shows it running. Fails with
/// `ConditionalCheckFailed` when the stored device no longer has the session
/// `before` was read with.
pub async fn close_session(
    client: &DynamoDbClient,
    devices_table: &str,
    readings_table: &str,
    before: &Device,
    after: Option<&Device>,
    readings: &[Reading],
) -> Result<(), StoreError> {
    let items = close_session_items(devices_table, readings_table, before, after, readings)?;

    client
        .transact_write_items()
        .set_transact_items(Some(items))
        .send()
        .await
        .map_err(|e| {
            let service_error = e.into_service_error();
            if is_condition_failure(&service_error) {
                StoreError::ConditionalCheckFailed
            } else {
                StoreError::DynamoDb(format!("{:?}", service_error))
            }
        })?;

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, TimeZone, Utc};
    use energy_monitor::shared::domain::Tariff;
    use energy_monitor::test_utils::fixtures;

    fn running_device() -> Device {
        let at = Utc.with_ymd_and_hms(2024, 1, 15, 10, 0, 0).unwrap();
        let home = fixtures::home("home_1", "user_1", Tariff::flat(6.0), at);
        let mut device = fixtures::device("dev_1", &home, 1000.0, at);
        device.is_active = true;
        device.last_turned_on = Some(at);
        device
    }

    fn finished(device: &Device) -> Reading {
        let start = device.last_turned_on.unwrap();
        fixtures::reading(device, start, start + Duration::hours(2), 2.0, 12.0)
    }

    #[test]
    fn test_turn_off_writes_device_and_reading_together() {
        let before = running_device();
        let mut after = before.clone();
        after.is_active = false;
        after.last_turned_on = None;
        let reading = finished(&before);

        let items = close_session_items("devices", "readings", &before, Some(&after), &[reading])
            .unwrap();
        assert_eq!(items.len(), 2);

        let device_put = items[0].put().unwrap();
        assert_eq!(device_put.table_name(), "devices");
        assert_eq!(device_put.condition_expression(), Some(SESSION_UNCHANGED));
        assert_eq!(
            device_put.expression_attribute_values().and_then(|v| v.get(":since")),
            to_item(&before).unwrap().get("last_turned_on")
        );
        assert_eq!(device_put.item().get("is_active"), Some(&AttributeValue::Bool(false)));

        let reading_put = items[1].put().unwrap();
        assert_eq!(reading_put.table_name(), "readings");
        assert!(reading_put.item().contains_key("ts_reading"));
        assert!(reading_put.condition_expression().is_none());
    }

    #[test]
    fn test_delete_is_guarded_on_session_start() {
        let before = running_device();
        let reading = finished(&before);

        let items = close_session_items("devices", "readings", &before, None, &[reading]).unwrap();
        let delete = items[0].delete().unwrap();
        assert_eq!(delete.key().get("device_id"), Some(&string_value("dev_1")));
        assert_eq!(delete.condition_expression(), Some(SESSION_UNCHANGED));
    }

    #[test]
    fn test_device_without_session_cannot_close_one() {
        let mut idle = running_device();
        idle.is_active = false;
        idle.last_turned_on = None;
        assert!(close_session_items("devices", "readings", &idle, None, &[]).is_err());
    }
}
