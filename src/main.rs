use clap::Parser;
use std::process::ExitCode;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use spatialprobe::{Session, config::Config};

/// Conformance checks for WMS, WMTS and OGC API EDR endpoints
#[derive(Parser, Debug)]
#[command(name = "spatialprobe", version)]
struct Cli {
    /// Run only the tests of one category
    #[arg(short, long, conflicts_with = "test")]
    category: Option<String>,

    /// Run a single test
    #[arg(short, long)]
    test: Option<String>,

    /// Print the report as JSON
    #[arg(long)]
    json: bool,

    /// List the catalog and exit
    #[arg(short, long)]
    list: bool,
}

fn print_catalog(session: &Session) {
    for category in session.catalog().categories() {
        println!("{} ({})", category.id, category.title);
        for case in &category.tests {
            println!("  {:<36} {} [{}]", case.id, case.description, case.spec_reference);
        }
    }
}

#[tokio::main]
async fn main() -> ExitCode {
    // Initialize tracing; logs go to stderr so reports on stdout stay parseable
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "spatialprobe=info".into()),
        )
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    // Usage errors exit with status 2
    let cli = Cli::parse();

    // Load configuration
    let session = match Config::load().and_then(Session::new) {
        Ok(session) => session,
        Err(e) => {
            eprintln!("{}", e);
            return ExitCode::from(2);
        }
    };

    if cli.list {
        print_catalog(&session);
        return ExitCode::SUCCESS;
    }

    match run(&session, &cli).await {
        Ok(code) => code,
        Err(e) => {
            eprintln!("{:#}", e);
            ExitCode::from(2)
        }
    }
}

async fn run(session: &Session, cli: &Cli) -> anyhow::Result<ExitCode> {
    tracing::info!(endpoint = %session.config().base_url, "Loading capabilities");
    session.reload_capabilities().await?;

    let selected = async {
        match (&cli.category, &cli.test) {
            (_, Some(id)) => session.run_test(id).await.map(|_| ()),
            (Some(id), None) => session.run_category(id).await.map(|_| ()),
            (None, None) => session.run_all().await.map(|_| ()),
        }
    };

    let interrupted = tokio::select! {
        result = selected => {
            result?;
            false
        }
        _ = tokio::signal::ctrl_c() => {
            tracing::warn!("Interrupted, reporting partial results");
            true
        }
    };

    let report = session.report();
    if cli.json {
        println!("{}", report.to_json()?);
    } else {
        println!("{}", report);
    }

    Ok(if interrupted {
        ExitCode::from(130)
    } else if report.has_failures() {
        ExitCode::FAILURE
    } else {
        ExitCode::SUCCESS
    })
}
