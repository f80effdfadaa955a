use aws_sdk_dynamodb::Client as DynamoDbClient;

use super::{from_item, scan_all, string_value, to_item, StoreError};
use energy_monitor::shared::domain::DeviceTemplate;

pub async fn get_template(
    client: &DynamoDbClient,
    table_name: &str,
    template_id: &str,
) -> Result<Option<DeviceTemplate>, StoreError> {
    let result = client
        .get_item()
        .table_name(table_name)
        .key("template_id", string_value(template_id))
        .send()
        .await?;

    result.item.map(from_item).transpose()
}

/// Full catalog, grouped by category then name. The catalog is small enough to scan.
pub async fn list_templates(
    client: &DynamoDbClient,
    table_name: &str,
) -> Result<Vec<DeviceTemplate>, StoreError> {
    let mut templates: Vec<DeviceTemplate> = scan_all(client, table_name).await?;
    templates.sort_by(|a, b| (&a.category, &a.name).cmp(&(&b.category, &b.name)));
    Ok(templates)
}

pub async fn put_template(
    client: &DynamoDbClient,
    table_name: &str,
    template: &DeviceTemplate,
) -> Result<(), StoreError> {
    client
        .put_item()
        .table_name(table_name)
        .set_item(Some(to_item(template)?))
        .send()
        .await?;

    Ok(())
}

pub async fn delete_template(
    client: &DynamoDbClient,
    table_name: &str,
    template_id: &str,
) -> Result<(), StoreError> {
    client
        .delete_item()
        .table_name(table_name)
        .key("template_id", string_value(template_id))
        .send()
        .await?;

    Ok(())
}
