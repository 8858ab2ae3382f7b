use anyhow::Result;
use clap::Parser;
use colored::*;
use serde_json::json;
use std::time::Duration;

mod publisher;
mod sse_client;

use publisher::Publisher;
use sse_client::Connection;

const RECORD_TIMEOUT: Duration = Duration::from_secs(5);

#[derive(Parser)]
#[command(name = "stream-test-client")]
#[command(about = "Log Stream Broker Smoke Testing Tool")]
struct Cli {
    /// Base URL of the broker (e.g., http://localhost:4000)
    #[arg(long)]
    base_url: String,

    /// User id presented on the stream request
    #[arg(long, default_value = "user123")]
    user: String,

    /// Workspace memberships presented on the stream request (comma-separated)
    #[arg(long, default_value = "workspace123")]
    workspaces: String,

    /// Channel to subscribe to and publish on
    #[arg(long, default_value = "logs:etl:workspace123:workflow456")]
    channel: String,

    /// Service name declared on publishes
    #[arg(long, default_value = "etl")]
    service: String,

    /// Service token presented on publishes
    #[arg(long, default_value = "l5-etl-token")]
    token: String,

    /// Test scenario to run
    #[arg(long, value_enum)]
    scenario: ScenarioChoice,

    /// Enable verbose output
    #[arg(long, short)]
    verbose: bool,
}

#[derive(clap::ValueEnum, Clone)]
enum ScenarioChoice {
    /// Establish a stream and verify the handshake record
    ConnectionTest,
    /// Publish one record and verify it arrives on the stream
    PublishTest,
    /// Two subscribers, one publish, both receive the same record
    FanoutTest,
    /// Run all scenarios
    All,
}

struct TestResult {
    name: &'static str,
    passed: bool,
    details: String,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    if cli.verbose {
        env_logger::Builder::from_default_env()
            .filter_level(log::LevelFilter::Debug)
            .init();
    }

    println!("{}", "=== SETUP PHASE ===".bright_white().bold());

    let publisher = Publisher::new(
        reqwest::Client::new(),
        cli.base_url.clone(),
        cli.token.clone(),
        cli.service.clone(),
    );

    println!("{} Checking broker health...", "→".blue());
    let health = publisher.health_check().await?;
    println!(
        "{} Broker healthy ({} connection(s) currently open)",
        "✓".green(),
        health["connections"]
    );

    println!("\n{}", "=== TEST PHASE ===".bright_white().bold());

    let mut results = Vec::new();
    match cli.scenario {
        ScenarioChoice::ConnectionTest => {
            results.push(connection_test(&cli).await?);
        }
        ScenarioChoice::PublishTest => {
            results.push(publish_test(&cli, &publisher).await?);
        }
        ScenarioChoice::FanoutTest => {
            results.push(fanout_test(&cli, &publisher).await?);
        }
        ScenarioChoice::All => {
            results.push(connection_test(&cli).await?);
            results.push(publish_test(&cli, &publisher).await?);
            results.push(fanout_test(&cli, &publisher).await?);
        }
    }

    println!("\n{}", "=== RESULTS ===".bright_white().bold());
    for result in &results {
        let marker = if result.passed {
            "✓".green()
        } else {
            "✗".red()
        };
        println!("{} {} - {}", marker, result.name, result.details);
    }

    let all_passed = results.iter().all(|r| r.passed);
    if all_passed {
        println!("\n{}", "All tests passed! ✓".bright_green().bold());
    } else {
        println!("\n{}", "Some tests failed! ✗".bright_red().bold());
    }

    std::process::exit(if all_passed { 0 } else { 1 });
}

/// Pull the workspace and optional workflow components out of the channel the
/// client was pointed at.
fn channel_components(channel: &str) -> (&str, Option<&str>) {
    let mut parts = channel.splitn(4, ':').skip(2);
    (parts.next().unwrap_or_default(), parts.next())
}

async fn connection_test(cli: &Cli) -> Result<TestResult> {
    println!("{} Establishing stream connection...", "→".blue());
    let mut connection = Connection::establish(
        &cli.base_url,
        &cli.user,
        &cli.workspaces,
        &cli.channel,
        "connection-test".to_string(),
    )
    .await?;

    let handshake = connection.wait_for_handshake(RECORD_TIMEOUT).await?;
    let announced = handshake.data["channels"]
        .as_array()
        .map(|channels| channels.iter().any(|c| c == cli.channel.as_str()))
        .unwrap_or(false);

    Ok(TestResult {
        name: "connection_test",
        passed: announced && handshake.data["userId"] == cli.user.as_str(),
        details: format!("handshake channels: {}", handshake.data["channels"]),
    })
}

async fn publish_test(cli: &Cli, publisher: &Publisher) -> Result<TestResult> {
    println!("{} Publishing one record...", "→".blue());
    let mut connection = Connection::establish(
        &cli.base_url,
        &cli.user,
        &cli.workspaces,
        &cli.channel,
        "publish-test".to_string(),
    )
    .await?;
    connection.wait_for_handshake(RECORD_TIMEOUT).await?;

    let (workspace_id, workflow_id) = channel_components(&cli.channel);
    let outcome = publisher
        .publish_log(
            workspace_id,
            workflow_id,
            json!({"level": "INFO", "message": "smoke-test record"}),
        )
        .await?;

    if !outcome.success || outcome.delivered < 1 {
        return Ok(TestResult {
            name: "publish_test",
            passed: false,
            details: format!("publish delivered {} subscriber(s)", outcome.delivered),
        });
    }

    let record = connection
        .wait_for(
            |data| data["data"]["message"] == "smoke-test record",
            RECORD_TIMEOUT,
        )
        .await?;

    Ok(TestResult {
        name: "publish_test",
        passed: record.data["channel"] == outcome.channel.as_str(),
        details: format!("record id {}", record.data["id"]),
    })
}

async fn fanout_test(cli: &Cli, publisher: &Publisher) -> Result<TestResult> {
    println!("{} Establishing two subscriber connections...", "→".blue());
    let mut first = Connection::establish(
        &cli.base_url,
        &cli.user,
        &cli.workspaces,
        &cli.channel,
        "fanout-test-1".to_string(),
    )
    .await?;
    let mut second = Connection::establish(
        &cli.base_url,
        &cli.user,
        &cli.workspaces,
        &cli.channel,
        "fanout-test-2".to_string(),
    )
    .await?;
    first.wait_for_handshake(RECORD_TIMEOUT).await?;
    second.wait_for_handshake(RECORD_TIMEOUT).await?;

    let (workspace_id, workflow_id) = channel_components(&cli.channel);
    let outcome = publisher
        .publish_log(
            workspace_id,
            workflow_id,
            json!({"level": "INFO", "message": "fanout record"}),
        )
        .await?;

    let matcher = |data: &serde_json::Value| data["data"]["message"] == "fanout record";
    let to_first = first.wait_for(matcher, RECORD_TIMEOUT).await?;
    let to_second = second.wait_for(matcher, RECORD_TIMEOUT).await?;

    let same_record = to_first.data["id"] == to_second.data["id"];
    Ok(TestResult {
        name: "fanout_test",
        passed: outcome.delivered == 2 && same_record,
        details: format!(
            "delivered={} first_id={} second_id={}",
            outcome.delivered, to_first.data["id"], to_second.data["id"]
        ),
    })
}
