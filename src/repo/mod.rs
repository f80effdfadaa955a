//! DynamoDB access, one module per table.
//!
//! Every function takes the client and table name explicitly and returns
//! domain types from the shared library.

pub mod alert_rules;
pub mod alerts;
pub mod devices;
pub mod homes;
pub mod readings;
pub mod sessions;
pub mod templates;
pub mod users;

use std::collections::HashMap;

use aws_sdk_dynamodb::types::AttributeValue;
use aws_sdk_dynamodb::Client as DynamoDbClient;
use serde::de::DeserializeOwned;
use serde::Serialize;
use thiserror::Error;

use energy_monitor::cursor::PageToken;

pub type Item = HashMap<String, AttributeValue>;

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("DynamoDB error: {0}")]
    DynamoDb(String),

    #[error("Serialization error: {0}")]
    Serialization(String),

    #[error("Conditional check failed")]
    ConditionalCheckFailed,

    #[error("Invalid cursor: {0}")]
    InvalidCursor(String),
}

impl<E> From<aws_sdk_dynamodb::error::SdkError<E>> for StoreError
where
    E: std::fmt::Debug,
{
    fn from(err: aws_sdk_dynamodb::error::SdkError<E>) -> Self {
        StoreError::DynamoDb(format!("{:?}", err))
    }
}

impl From<aws_sdk_dynamodb::error::BuildError> for StoreError {
    fn from(err: aws_sdk_dynamodb::error::BuildError) -> Self {
        StoreError::DynamoDb(err.to_string())
    }
}

impl From<serde_dynamo::Error> for StoreError {
    fn from(err: serde_dynamo::Error) -> Self {
        StoreError::Serialization(err.to_string())
    }
}

/// One page of query results
#[derive(Debug, Clone)]
pub struct Page<T> {
    pub items: Vec<T>,
    pub next_cursor: Option<String>,
}

pub(crate) fn to_item<T: Serialize>(value: &T) -> Result<Item, StoreError> {
    Ok(serde_dynamo::to_item(value)?)
}

pub(crate) fn from_item<T: DeserializeOwned>(item: Item) -> Result<T, StoreError> {
    Ok(serde_dynamo::from_item(item)?)
}

pub(crate) fn from_items<T: DeserializeOwned>(items: Option<Vec<Item>>) -> Result<Vec<T>, StoreError> {
    items
        .unwrap_or_default()
        .into_iter()
        .map(from_item)
        .collect()
}

pub(crate) fn string_value(value: &str) -> AttributeValue {
    AttributeValue::S(value.to_string())
}

/// Encode a LastEvaluatedKey as an opaque cursor. All key attributes are strings.
pub(crate) fn encode_cursor(last_evaluated_key: Option<Item>) -> Option<String> {
    let key = last_evaluated_key.filter(|k| !k.is_empty())?;
    let mut token = PageToken::new();
    for (name, value) in key {
        token = token.with_key(name, value.as_s().ok()?.clone());
    }
    token.encode().ok()
}

/// Decode a cursor produced by [`encode_cursor`] into an ExclusiveStartKey
pub(crate) fn decode_cursor(cursor: &str, expected_keys: &[&str]) -> Result<Item, StoreError> {
    let token = PageToken::decode_with_keys(cursor, expected_keys)
        .map_err(|e| StoreError::InvalidCursor(e.message))?;
    Ok(token
        .keys
        .into_iter()
        .map(|(name, value)| (name, AttributeValue::S(value)))
        .collect())
}

/// Fetch every item whose `key_name` equals `key_value`, following pagination
pub(crate) async fn query_all<T: DeserializeOwned>(
    client: &DynamoDbClient,
    table_name: &str,
    index_name: Option<&str>,
    key_name: &str,
    key_value: &str,
) -> Result<Vec<T>, StoreError> {
    let mut results = Vec::new();
    let mut start_key: Option<Item> = None;

    loop {
        let output = client
            .query()
            .table_name(table_name)
            .set_index_name(index_name.map(str::to_string))
            .key_condition_expression("#pk = :pk")
            .expression_attribute_names("#pk", key_name)
            .expression_attribute_values(":pk", string_value(key_value))
            .set_exclusive_start_key(start_key.take())
            .send()
            .await?;

        results.extend(from_items::<T>(output.items)?);

        match output.last_evaluated_key {
            Some(key) if !key.is_empty() => start_key = Some(key),
            _ => break,
        }
    }

    Ok(results)
}

/// Fetch a whole table, following pagination
pub(crate) async fn scan_all<T: DeserializeOwned>(
    client: &DynamoDbClient,
    table_name: &str,
) -> Result<Vec<T>, StoreError> {
    let mut results = Vec::new();
    let mut start_key: Option<Item> = None;

    loop {
        let output = client
            .scan()
            .table_name(table_name)
            .set_exclusive_start_key(start_key.take())
            .send()
            .await?;

        results.extend(from_items::<T>(output.items)?);

        match output.last_evaluated_key {
            Some(key) if !key.is_empty() => start_key = Some(key),
            _ => break,
        }
    }

    Ok(results)
}

/// Clamp a requested page size, defaulting when absent
pub(crate) fn page_limit(limit: Option<i32>, default: i32, max: i32) -> i32 {
    limit.unwrap_or(default).clamp(1, max)
}
