use anyhow::Context;
use bytes::Bytes;
use clap::Parser;
use pubsub_load::client::BrokerConnector;
use pubsub_load::host::{
    sample_channel, MetricsRegistry, RunContext, RunState, SampleSummary, VuHandle,
};
use pubsub_load::kafka::KafkaConnector;
use pubsub_load::memory::MemoryBroker;
use pubsub_load::metrics::{PUBLISH_BYTES, PUBLISH_ERRORS, PUBLISH_MESSAGES};
use pubsub_load::{LoadConfig, PubSub};
use std::path::PathBuf;
use std::sync::Arc;
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, instrument, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter, Layer};

#[derive(Parser, Debug)]
#[command(name = "pubsub-load")]
#[command(
    about = "Publish load against a message broker and summarize publish samples",
    long_about = None
)]
struct Args {
    #[arg(short, long, value_name = "FILE", default_value = "pubsub-load.toml")]
    config: PathBuf,

    #[arg(short, long, help = "Enable JSON output for logs")]
    json_logs: bool,

    #[arg(short, long, help = "Verbose logging")]
    verbose: bool,

    #[arg(long, help = "Publish to an in-process broker instead of Kafka")]
    dry_run: bool,

    #[arg(long, help = "Print the run summary as JSON")]
    json_summary: bool,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();

    init_logging(args.json_logs, args.verbose);

    info!("Loading configuration from {:?}", args.config);
    let config = LoadConfig::from_file(&args.config)
        .with_context(|| format!("failed to load configuration from {:?}", args.config))?;

    info!(
        url = %config.client.url,
        topic = %config.producer.topic,
        vus = config.workload.vus,
        iterations = config.workload.iterations,
        payload_size = config.workload.payload_size,
        async_send = config.workload.async_send,
        dry_run = args.dry_run,
        "Configuration summary"
    );

    let connector: Arc<dyn BrokerConnector> = if args.dry_run {
        Arc::new(MemoryBroker::new().connector())
    } else {
        Arc::new(KafkaConnector::new())
    };

    let registry = MetricsRegistry::new();
    let pubsub = PubSub::new(connector, &registry)?;

    let (samples, rx) = sample_channel(1024);
    let collector = tokio::spawn(SampleSummary::collect(rx));
    let done = CancellationToken::new();

    if let Some(limit) = config.workload.duration {
        let done = done.clone();
        tokio::spawn(async move {
            tokio::time::sleep(limit).await;
            info!("Run duration reached, stopping");
            done.cancel();
        });
    }

    let config = Arc::new(config);
    let mut vus = JoinSet::new();
    for id in 0..config.workload.vus {
        let ctx = RunContext::new(VuHandle::active(RunState::new(samples.clone())), done.clone());
        vus.spawn(run_vu(id, pubsub.clone(), Arc::clone(&config), ctx));
    }
    drop(samples);

    let mut failed_vus = 0;
    while let Some(joined) = vus.join_next().await {
        match joined {
            Ok(Ok(())) => {}
            Ok(Err(e)) => {
                failed_vus += 1;
                error!(error = %e, "Virtual user could not run");
            }
            Err(e) => {
                failed_vus += 1;
                error!(error = %e, "Virtual user task panicked");
            }
        }
    }

    let summary = collector.await.context("sample collector stopped")?;
    print_summary(&summary, args.json_summary)?;

    if failed_vus > 0 {
        warn!(failed_vus, "Some virtual users failed during setup");
    }
    Ok(())
}

/// One virtual user: owns its connection and producer for the whole run.
#[instrument(name = "vu", skip_all, fields(vu = id))]
async fn run_vu(
    id: usize,
    pubsub: PubSub,
    config: Arc<LoadConfig>,
    ctx: RunContext,
) -> pubsub_load::Result<()> {
    let connection = match pubsub.create_client(&config.client).await {
        Ok(connection) => connection,
        Err(e) => {
            ctx.vu().deactivate();
            return Err(e);
        }
    };
    let producer = match pubsub.create_producer(&connection, &config.producer).await {
        Ok(producer) => producer,
        Err(e) => {
            pubsub.close_client(connection).await;
            ctx.vu().deactivate();
            return Err(e);
        }
    };

    let workload = &config.workload;
    let payload = Bytes::from(vec![b'x'; workload.payload_size]);
    for iteration in 0..workload.iterations {
        if ctx.is_done() {
            break;
        }
        if let Err(e) = pubsub
            .publish(
                &ctx,
                &producer,
                payload.clone(),
                workload.properties.clone(),
                workload.async_send,
            )
            .await
        {
            debug!(vu = id, iteration, error = %e, "Publish failed");
        }
    }

    // Closing the producer waits for outstanding async completions.
    pubsub.close_producer(producer).await;
    pubsub.close_client(connection).await;
    ctx.vu().deactivate();
    Ok(())
}

fn print_summary(summary: &SampleSummary, json: bool) -> pubsub_load::Result<()> {
    if json {
        println!("{}", serde_json::to_string_pretty(summary)?);
        return Ok(());
    }

    println!("messages: {}", summary.total(PUBLISH_MESSAGES));
    println!("bytes:    {}", summary.total(PUBLISH_BYTES));
    println!("errors:   {}", summary.total(PUBLISH_ERRORS));
    for series in summary.series_for(PUBLISH_MESSAGES) {
        let producer = series.tags.get("producer_name").map(String::as_str).unwrap_or("-");
        let topic = series.tags.get("topic").map(String::as_str).unwrap_or("-");
        println!("  {producer} -> {topic}: {} messages", series.value);
    }
    Ok(())
}

/// Directives used when `RUST_LOG` is unset. librdkafka's own log lines stay
/// at error level; `--verbose` also shows samples dropped after a run ends.
fn default_log_directives(verbose: bool) -> &'static str {
    if verbose {
        "pubsub_load=trace,rdkafka=error,info"
    } else {
        "pubsub_load=info,rdkafka=error,warn"
    }
}

fn init_logging(json: bool, verbose: bool) {
    let env_filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(default_log_directives(verbose)));

    // Every VU logs inside its `vu` span, so keep the span on each event.
    let fmt_layer = if json {
        tracing_subscriber::fmt::layer()
            .json()
            .flatten_event(true)
            .with_current_span(true)
            .with_span_list(false)
            .boxed()
    } else {
        tracing_subscriber::fmt::layer()
            .with_timer(tracing_subscriber::fmt::time::uptime())
            .with_target(false)
            .boxed()
    };

    tracing_subscriber::registry()
        .with(env_filter)
        .with(fmt_layer)
        .init();
}
