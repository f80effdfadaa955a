#[allow(dead_code)]
mod config;
#[allow(dead_code)]
mod repo;

use aws_lambda_events::event::dynamodb::{Event as DynamoDbEvent, EventRecord};
use chrono::{DateTime, Utc};
use lambda_runtime::{run, service_fn, Error, LambdaEvent};
use tracing::{debug, error, info, warn};
use tracing_subscriber::EnvFilter;

use config::Config;
use energy_monitor::shared::alerts::{
    evaluate_rule, new_triggered_alert, record_trigger, summarize_usage, Evaluation, LiveUsage,
};
use energy_monitor::shared::consumption::live_consumption;
use energy_monitor::shared::domain::{AlertRule, Device, Reading, Tariff, TriggeredAlert};
use energy_monitor::shared::id_generator::{IdGenerator, IdPrefix, RandomIdGenerator};
use energy_monitor::shared::reports::month_to_date_kwh;
use energy_monitor::shared::time::{Clock, SystemClock};

#[tokio::main]
async fn main() -> Result<(), Error> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| "info".into()))
        .with_target(false)
        .without_time()
        .init();

    let config = Config::from_env().await.map_err(|e| {
        error!("Failed to load configuration: {}", e);
        Error::from(format!("Configuration error: {}", e))
    })?;
    let clock = SystemClock::new();
    let ids = RandomIdGenerator::new();

    run(service_fn(|event: LambdaEvent<DynamoDbEvent>| {
        function_handler(event, &config, &clock, &ids)
    }))
    .await
}

async fn function_handler(
    event: LambdaEvent<DynamoDbEvent>,
    config: &Config,
    clock: &dyn Clock,
    ids: &dyn IdGenerator,
) -> Result<(), Error> {
    info!(
        records = event.payload.records.len(),
        "Processing readings stream batch"
    );

    let mut processed_count = 0;
    let mut skipped_count = 0;
    let mut error_count = 0;
    let mut triggered_count = 0;

    for record in &event.payload.records {
        match process_record(record, config, clock, ids).await {
            Ok(Some(triggered)) => {
                processed_count += 1;
                triggered_count += triggered;
            }
            Ok(None) => skipped_count += 1,
            Err(e) => {
                error_count += 1;
                error!(error = %e, "Error processing record");
            }
        }
    }

    info!(
        processed = processed_count,
        skipped = skipped_count,
        errors = error_count,
        triggered = triggered_count,
        "Batch processing complete"
    );

    Ok(())
}

/// Evaluate the rules touched by one stream record. Returns the number of
/// alerts raised, or `None` when the record is not a new reading.
async fn process_record(
    record: &EventRecord,
    config: &Config,
    clock: &dyn Clock,
    ids: &dyn IdGenerator,
) -> Result<Option<usize>, Error> {
    if record.event_name != "INSERT" {
        return Ok(None);
    }

    let reading: Reading = serde_dynamo::from_item(record.change.new_image.clone())
        .map_err(|e| format!("Failed to deserialize reading: {}", e))?;

    let client = &config.dynamodb_client;
    let tables = &config.tables;

    let Some(home) = repo::homes::get_home(client, &tables.homes, &reading.home_id).await? else {
        warn!(
            home_id = %reading.home_id,
            reading_id = %reading.reading_id,
            "Reading refers to a missing home"
        );
        return Ok(None);
    };

    let rules: Vec<AlertRule> =
        repo::alert_rules::list_rules_for_home(client, &tables.alert_rules, &home.home_id)
            .await?
            .into_iter()
            .filter(|rule| applies_to(rule, &reading))
            .collect();

    if rules.is_empty() {
        debug!(home_id = %home.home_id, "No enabled rules for reading");
        return Ok(Some(0));
    }

    let now = clock.now();
    let history_start = rules
        .iter()
        .map(|rule| rule.period.history_start(now))
        .min()
        .unwrap_or(now);

    let devices =
        repo::devices::list_devices_for_home(client, &tables.devices, &home.home_id).await?;
    let readings = repo::readings::list_home_readings(
        client,
        &tables.device_readings,
        &home.home_id,
        history_start,
        now,
    )
    .await?;

    let triggered = plan_alerts(rules, &readings, &devices, &home.tariff, now, ids);

    for (rule, alert) in &triggered {
        repo::alerts::put_alert(client, &tables.alerts, alert).await?;
        repo::alert_rules::put_rule(client, &tables.alert_rules, rule).await?;

        info!(
            rule_id = %rule.rule_id,
            alert_id = %alert.alert_id,
            alert_type = alert.alert_type.as_str(),
            observed = alert.observed_value,
            limit = alert.limit_value,
            "Alert triggered"
        );
    }

    Ok(Some(triggered.len()))
}

/// Enabled rules of the reading's home; device rules only for their device
fn applies_to(rule: &AlertRule, reading: &Reading) -> bool {
    rule.is_enabled
        && rule.home_id == reading.home_id
        && rule
            .device_id
            .as_ref()
            .map_or(true, |device_id| *device_id == reading.device_id)
}

/// Energy and cost of sessions still running on devices in the rule's scope.
/// Every live session in the home is priced together so slab headroom is
/// shared before the rule's scope is applied.
fn live_usage(
    rule: &AlertRule,
    devices: &[Device],
    tariff: &Tariff,
    month_kwh: f64,
    now: DateTime<Utc>,
) -> LiveUsage {
    let home_devices = devices.iter().filter(|d| d.home_id == rule.home_id);
    live_consumption(home_devices, tariff, month_kwh, now)
        .into_iter()
        .filter(|c| rule.device_id.as_ref().map_or(true, |id| *id == c.device_id))
        .fold(LiveUsage::default(), |acc, c| LiveUsage {
            energy_kwh: acc.energy_kwh + c.energy_kwh,
            cost: acc.cost + c.cost,
        })
}

/// Evaluate `rules` against the home's readings and live sessions, returning
/// each triggered rule (already updated) with its new alert
fn plan_alerts(
    rules: Vec<AlertRule>,
    readings: &[Reading],
    devices: &[Device],
    tariff: &Tariff,
    now: DateTime<Utc>,
    ids: &dyn IdGenerator,
) -> Vec<(AlertRule, TriggeredAlert)> {
    let month_kwh = month_to_date_kwh(readings, now);
    let mut triggered = Vec::new();

    for mut rule in rules {
        let live = live_usage(&rule, devices, tariff, month_kwh, now);
        let usage = summarize_usage(&rule, readings, live, now);
        let evaluation = evaluate_rule(&rule, &usage, now);

        debug!(
            rule_id = %rule.rule_id,
            evaluation = ?evaluation,
            "Evaluated rule"
        );

        if !matches!(evaluation, Evaluation::Triggered { .. }) {
            continue;
        }

        if let Some(alert) =
            new_triggered_alert(&rule, &evaluation, ids.prefixed(IdPrefix::Alert), now)
        {
            record_trigger(&mut rule, now);
            triggered.push((rule, alert));
        }
    }

    triggered
}
