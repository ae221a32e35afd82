use anyhow::{bail, Context};
use fanout::config::{MemcachedOverrides, RedisOverrides};
use fanout::{
    deliver, Collapse, Destination, DestinationType, DispatchReport, Limits, MemcachedOptions,
    MemcachedSender, Record, RedisOptions, RedisSender, Target,
};
use tokio::io::{AsyncBufReadExt, BufReader};
use tracing::{error, info};

// echo "user:1 hello" | fanout redis 127.0.0.1:7000 '{"parallel":4}'

const USAGE: &str = "usage: fanout <redis|memcached> <endpoint> [options-json] < records";

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Logging, INFO unless RUST_LOG says otherwise
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive(tracing::Level::INFO.into()),
        )
        .init();

    let args: Vec<String> = std::env::args().skip(1).collect();
    let (kind, endpoint, overrides) = match args.as_slice() {
        [kind, endpoint] => (kind.as_str(), endpoint.as_str(), "{}"),
        [kind, endpoint, overrides] => (kind.as_str(), endpoint.as_str(), overrides.as_str()),
        _ => bail!(USAGE),
    };

    let records = read_records().await?;
    if records.is_empty() {
        info!("No records on stdin, nothing to do");
        return Ok(());
    }
    info!("Read {} records", records.len());

    let report = match kind {
        "redis" => {
            let overrides: RedisOverrides =
                serde_json::from_str(overrides).context("invalid Redis options")?;
            let options = RedisOptions::default().merge(&overrides);
            let target = cache_target(DestinationType::Redis, endpoint);
            let sender = RedisSender::create(&target, options)?;
            run(&target, records, &sender).await?
        }
        "memcached" => {
            let overrides: MemcachedOverrides =
                serde_json::from_str(overrides).context("invalid Memcached options")?;
            let options = MemcachedOptions::default().merge(&overrides)?;
            let target = cache_target(DestinationType::Memcached, endpoint);
            let sender = MemcachedSender::create(&target, options)?;
            run(&target, records, &sender).await?
        }
        other => bail!("unknown destination type '{}'\n{}", other, USAGE),
    };

    match report.into_result() {
        Ok(outcomes) => {
            info!("All {} records written", outcomes.len());
            Ok(())
        }
        Err(e) => {
            for outcome in e.outcomes().unwrap_or_default() {
                if let Some(reason) = &outcome.error {
                    error!("{}: {}", outcome.key, reason);
                }
            }
            Err(e.into())
        }
    }
}

fn cache_target(kind: DestinationType, endpoint: &str) -> Target {
    let mut target = Target::new("cli", kind, endpoint);
    target.collapse = Collapse::Multiple;
    target
}

async fn run<S: Destination>(
    target: &Target,
    records: Vec<Record>,
    sender: &S,
) -> anyhow::Result<DispatchReport> {
    let limits = Limits::for_destination(target.kind).for_collapse(target.collapse);
    Ok(deliver(target, &limits, records, sender).await?)
}

/// One `key value` pair per line
async fn read_records() -> anyhow::Result<Vec<Record>> {
    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    let mut records = Vec::new();

    while let Some(line) = lines.next_line().await.context("failed to read stdin")? {
        let line = line.trim();
        if line.is_empty() {
            continue;
        }
        match line.split_once(char::is_whitespace) {
            Some((key, value)) => records.push(Record::new(key, value.trim_start().to_string())),
            None => bail!("line '{}' is not a 'key value' pair", line),
        }
    }

    Ok(records)
}
