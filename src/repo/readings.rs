use aws_sdk_dynamodb::types::AttributeValue;
use aws_sdk_dynamodb::Client as DynamoDbClient;
use chrono::{DateTime, Utc};

use super::{
    decode_cursor, encode_cursor, from_items, page_limit, string_value, to_item, Item, Page,
    StoreError,
};
use energy_monitor::shared::domain::Reading;

const HOME_INDEX: &str = "home_index";
const SORT_KEY: &str = "ts_reading";

pub const DEFAULT_PAGE_SIZE: i32 = 50;
pub const MAX_PAGE_SIZE: i32 = 1000;

/// Inclusive sort-key bounds covering readings that ended within `[from, to]`
fn sort_key_range(from: DateTime<Utc>, to: DateTime<Utc>) -> (String, String) {
    let from_ms = from.timestamp_millis().max(0);
    let to_ms = to.timestamp_millis().max(0);
    (format!("{:013}#", from_ms), format!("{:013}#\u{ffff}", to_ms))
}

/// Item for a reading, with the sort key derived from its end time
pub(crate) fn reading_item(reading: &Reading) -> Result<Item, StoreError> {
    let mut item = to_item(reading)?;
    item.insert(SORT_KEY.to_string(), string_value(&reading.sort_key()));
    Ok(item)
}

/// Store a reading
pub async fn put_reading(
    client: &DynamoDbClient,
    table_name: &str,
    reading: &Reading,
) -> Result<(), StoreError> {
    let item = reading_item(reading)?;

    client
        .put_item()
        .table_name(table_name)
        .set_item(Some(item))
        .send()
        .await?;

    Ok(())
}

/// One page of a device's readings in `[from, to]`, newest first
///
/// # Arguments
/// * `limit` - Page size (default 50, max 1000)
/// * `cursor` - Opaque cursor from the previous page
pub async fn list_device_readings(
    client: &DynamoDbClient,
    table_name: &str,
    device_id: &str,
    from: DateTime<Utc>,
    to: DateTime<Utc>,
    limit: Option<i32>,
    cursor: Option<&str>,
) -> Result<Page<Reading>, StoreError> {
    let (lower, upper) = sort_key_range(from, to);

    let start_key = cursor
        .map(|c| decode_cursor(c, &["device_id", SORT_KEY]))
        .transpose()?;

    let result = client
        .query()
        .table_name(table_name)
        .key_condition_expression("device_id = :device_id AND #sk BETWEEN :lower AND :upper")
        .expression_attribute_names("#sk", SORT_KEY)
        .expression_attribute_values(":device_id", string_value(device_id))
        .expression_attribute_values(":lower", AttributeValue::S(lower))
        .expression_attribute_values(":upper", AttributeValue::S(upper))
        .scan_index_forward(false)
        .limit(page_limit(limit, DEFAULT_PAGE_SIZE, MAX_PAGE_SIZE))
        .set_exclusive_start_key(start_key)
        .send()
        .await?;

    Ok(Page {
        items: from_items(result.items)?,
        next_cursor: encode_cursor(result.last_evaluated_key),
    })
}

/// Every reading of a home that ended within `[from, to]`, oldest first.
///
/// Used for reports, summaries and alert evaluation, which need the whole range.
pub async fn list_home_readings(
    client: &DynamoDbClient,
    table_name: &str,
    home_id: &str,
    from: DateTime<Utc>,
    to: DateTime<Utc>,
) -> Result<Vec<Reading>, StoreError> {
    let (lower, upper) = sort_key_range(from, to);
    let mut readings = Vec::new();
    let mut start_key: Option<Item> = None;

    loop {
        let result = client
            .query()
            .table_name(table_name)
            .index_name(HOME_INDEX)
            .key_condition_expression("home_id = :home_id AND #sk BETWEEN :lower AND :upper")
            .expression_attribute_names("#sk", SORT_KEY)
            .expression_attribute_values(":home_id", string_value(home_id))
            .expression_attribute_values(":lower", AttributeValue::S(lower.clone()))
            .expression_attribute_values(":upper", AttributeValue::S(upper.clone()))
            .set_exclusive_start_key(start_key.take())
            .send()
            .await?;

        readings.extend(from_items::<Reading>(result.items)?);

        match result.last_evaluated_key {
            Some(key) if !key.is_empty() => start_key = Some(key),
            _ => break,
        }
    }

    Ok(readings)
}
