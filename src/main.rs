use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use std::sync::Arc;
use std::time::Duration;

use testforge::backend::{extract, BackendClient};
use testforge::config::Config;
use testforge::history::{ExecutionSummary, HistoryStore};
use testforge::model::{ExecutionRecord, ExecutionStatus, TestProvenance, TestType};
use testforge::store::ResultStore;
use testforge::tracker::{self, TrackerRegistry};

#[derive(Parser)]
#[command(
    name = "testforge",
    about = "CLI companion for an automated API test generation and execution backend",
    version,
    long_about = None
)]
struct Cli {
    /// Path to a TOML config file (defaults to ./testforge.toml if present)
    #[arg(long, global = true)]
    config: Option<String>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Generate a test for an API source file
    Generate {
        /// Test type: unit or restassured
        #[arg(long, default_value = "unit")]
        test_type: String,

        /// Path to the API source file
        #[arg(long)]
        input: String,

        /// Write the generated test here instead of stdout
        #[arg(long)]
        output: Option<String>,

        /// Skip recording this generation in the local history
        #[arg(long)]
        no_history: bool,
    },

    /// Submit a test run and track it to completion
    Execute {
        /// Path to the test code file
        #[arg(long, conflicts_with = "from_history")]
        test: Option<String>,

        /// Path to the API source file
        #[arg(long, conflicts_with = "from_history")]
        source: Option<String>,

        /// Test type: unit or restassured
        #[arg(long, default_value = "unit")]
        test_type: String,

        /// Execute a stored history entry instead of files
        #[arg(long)]
        from_history: Option<String>,
    },

    /// Inspect the local archive of execution results
    Results {
        #[command(subcommand)]
        action: ResultsAction,
    },

    /// Manage the generation history
    History {
        #[command(subcommand)]
        action: HistoryAction,
    },

    /// Persist a generated test case in the backend's database
    SaveCase {
        /// Test type: unit or restassured
        #[arg(long, default_value = "unit")]
        test_type: String,

        /// Path to the API source file
        #[arg(long)]
        source: String,

        /// Path to the test code file
        #[arg(long)]
        test: String,
    },
}

#[derive(Subcommand)]
enum ResultsAction {
    /// List all archived results
    List,

    /// Show one result in full
    Show {
        /// Execution id
        id: String,
    },

    /// Re-fetch a result from the backend, bypassing the archive
    Refresh {
        /// Execution id
        id: String,
    },

    /// Delete one result
    Delete {
        /// Execution id
        id: String,
    },

    /// Delete every archived result
    Clear,

    /// Aggregate statistics over the archive
    Stats,

    /// Search the archive
    Search {
        /// Case-insensitive substring over id, logs, and code
        #[arg(long, default_value = "")]
        term: String,

        /// Exact status filter (starting, running, completed, ...) or "all"
        #[arg(long, default_value = "all")]
        status: String,
    },
}

#[derive(Subcommand)]
enum HistoryAction {
    /// List all generated tests
    List,

    /// Show one history entry in full
    Show {
        /// Entry id
        id: String,
    },

    /// Delete one entry
    Delete {
        /// Entry id
        id: String,
    },

    /// Delete every entry
    Clear,
}

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize tracing
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    let cli = Cli::parse();
    let config = Config::load(cli.config.as_deref())?;

    match cli.command {
        Commands::Generate {
            test_type,
            input,
            output,
            no_history,
        } => {
            let test_type: TestType = test_type.parse().map_err(anyhow::Error::msg)?;
            let api_code = read_file(&input)?;
            let client = BackendClient::new(&config.backend_url)?;

            tracing::info!(%test_type, input, "Requesting test generation");
            let raw = client.generate_test(test_type, &api_code).await?;
            let code = extract::best_test_code(&raw);

            if !no_history {
                let pool = testforge::store::open_pool(&config.db_path)?;
                let history = HistoryStore::new(pool);
                let id = history.add(&api_code, &code, &test_type.to_string(), None)?;
                eprintln!("Recorded in history as {}", id);
            }

            match output {
                Some(path) => {
                    std::fs::write(&path, &code)
                        .with_context(|| format!("Failed to write '{}'", path))?;
                    println!("Generated test written to {}", path);
                }
                None => println!("{}", code),
            }
        }

        Commands::Execute {
            test,
            source,
            test_type,
            from_history,
        } => {
            let pool = testforge::store::open_pool(&config.db_path)?;
            let store = ResultStore::new(pool.clone());
            let history = HistoryStore::new(pool);
            let client = Arc::new(BackendClient::new(&config.backend_url)?);

            let (test_code, api_code, test_type, history_id) = match from_history {
                Some(id) => {
                    let entry = history
                        .get(&id)?
                        .with_context(|| format!("No history entry '{}'", id))?;
                    (entry.generated_test, entry.source_code, entry.test_type, Some(id))
                }
                None => {
                    let test = test.context("--test is required unless --from-history is used")?;
                    let source =
                        source.context("--source is required unless --from-history is used")?;
                    let _valid: TestType = test_type.parse().map_err(anyhow::Error::msg)?;
                    (read_file(&test)?, read_file(&source)?, test_type, None)
                }
            };

            tracing::info!("Submitting test execution");
            let execution_id = client.execute_tests(&test_code, &api_code).await?;
            println!("Execution started: {}", execution_id);

            let provenance = TestProvenance {
                history_id: history_id.clone(),
                source_code: Some(api_code),
                generated_test: Some(test_code),
                test_type: Some(test_type),
            };

            let registry = TrackerRegistry::new();
            let record = tracker::track_execution(
                client,
                &store,
                &registry,
                &execution_id,
                Some(provenance),
                Duration::from_secs(config.poll_interval_secs),
                Duration::from_secs(config.poll_timeout_secs),
            )
            .await?;

            if let Some(history_id) = history_id {
                let summary = execution_summary(&record);
                if let Err(e) = history.update_execution(&history_id, &summary) {
                    tracing::warn!("Failed to update history entry: {}", e);
                }
            }

            print_record(&record);
        }

        Commands::Results { action } => {
            let pool = testforge::store::open_pool(&config.db_path)?;
            let store = ResultStore::new(pool);

            match action {
                ResultsAction::List => {
                    let records = store.list()?;
                    print_record_table(&records);
                }
                ResultsAction::Show { id } => match store.get(&id)? {
                    Some(record) => print_record(&record),
                    None => anyhow::bail!("No archived result for '{}'", id),
                },
                ResultsAction::Refresh { id } => {
                    let client = BackendClient::new(&config.backend_url)?;
                    let record = tracker::refresh_result(&client, &store, &id).await?;
                    print_record(&record);
                }
                ResultsAction::Delete { id } => {
                    if store.delete(&id)? {
                        println!("Result '{}' deleted.", id);
                    } else {
                        anyhow::bail!("No archived result for '{}'", id);
                    }
                }
                ResultsAction::Clear => {
                    let removed = store.clear()?;
                    println!("Removed {} result(s).", removed);
                }
                ResultsAction::Stats => {
                    let stats = store.global_stats()?;
                    println!("\n=== Execution Archive Stats ===");
                    println!("Total executions:     {}", stats.total_executions);
                    println!("Completed:            {}", stats.completed_executions);
                    println!("Failed:               {}", stats.failed_executions);
                    println!("Success rate:         {:.1}%", stats.success_rate);
                    println!("Avg test success:     {:.1}%", stats.avg_test_success_rate);
                    println!("Avg line coverage:    {:.1}%", stats.avg_coverage);
                    println!("===============================\n");
                }
                ResultsAction::Search { term, status } => {
                    let status_filter = match status.as_str() {
                        "all" => None,
                        other => Some(other.parse::<ExecutionStatus>().map_err(anyhow::Error::msg)?),
                    };
                    let records = store.search(&term, status_filter)?;
                    print_record_table(&records);
                }
            }
        }

        Commands::History { action } => {
            let pool = testforge::store::open_pool(&config.db_path)?;
            let history = HistoryStore::new(pool);

            match action {
                HistoryAction::List => {
                    let entries = history.list()?;
                    if entries.is_empty() {
                        println!("No generated tests in history.");
                    } else {
                        println!(
                            "{:<36} | {:<12} | {:<20} | Execution",
                            "Id", "Type", "Generated at"
                        );
                        println!("{:-<36}-|-{:-<12}-|-{:-<20}-|-{:-<20}", "", "", "", "");
                        for entry in entries {
                            let exec = match &entry.execution {
                                Some(e) => format!("{} ({})", e.execution_id, e.status),
                                None => "-".to_string(),
                            };
                            println!(
                                "{:<36} | {:<12} | {:<20} | {}",
                                entry.id,
                                entry.test_type,
                                entry.timestamp.format("%Y-%m-%d %H:%M:%S"),
                                exec
                            );
                        }
                    }
                }
                HistoryAction::Show { id } => match history.get(&id)? {
                    Some(entry) => {
                        println!("Id:        {}", entry.id);
                        println!("Type:      {}", entry.test_type);
                        println!("Generated: {}", entry.timestamp.to_rfc3339());
                        if let Some(desc) = &entry.description {
                            println!("Note:      {}", desc);
                        }
                        if let Some(exec) = &entry.execution {
                            println!("Execution: {} ({})", exec.execution_id, exec.status);
                        }
                        println!("\n--- Source ---\n{}", entry.source_code);
                        println!("\n--- Generated test ---\n{}", entry.generated_test);
                    }
                    None => anyhow::bail!("No history entry '{}'", id),
                },
                HistoryAction::Delete { id } => {
                    if history.delete(&id)? {
                        println!("History entry '{}' deleted.", id);
                    } else {
                        anyhow::bail!("No history entry '{}'", id);
                    }
                }
                HistoryAction::Clear => {
                    let removed = history.clear()?;
                    println!("Removed {} entr(ies).", removed);
                }
            }
        }

        Commands::SaveCase {
            test_type,
            source,
            test,
        } => {
            let test_type: TestType = test_type.parse().map_err(anyhow::Error::msg)?;
            let source_code = read_file(&source)?;
            let test_case = read_file(&test)?;
            let client = BackendClient::new(&config.backend_url)?;

            client
                .save_test_case(test_type, &source_code, &test_case)
                .await?;
            println!("Test case saved.");
        }
    }

    Ok(())
}

fn read_file(path: &str) -> Result<String> {
    std::fs::read_to_string(path).with_context(|| format!("Failed to read '{}'", path))
}

fn execution_summary(record: &ExecutionRecord) -> ExecutionSummary {
    let metrics = record.metrics.as_ref();
    ExecutionSummary {
        execution_id: record.execution_id.clone(),
        status: record.status,
        success_rate: metrics.and_then(|m| m.success_rate),
        tests_run: metrics.and_then(|m| m.tests_run),
        failures: metrics.and_then(|m| m.failures),
        errors: metrics.and_then(|m| m.errors),
    }
}

fn print_record_table(records: &[ExecutionRecord]) {
    if records.is_empty() {
        println!("No results.");
        return;
    }
    println!(
        "{:<24} | {:<10} | {:<8} | {:<9} | Coverage",
        "Execution", "Status", "Tests", "Success"
    );
    println!("{:-<24}-|-{:-<10}-|-{:-<8}-|-{:-<9}-|-{:-<8}", "", "", "", "", "");
    for record in records {
        let m = record.metrics.as_ref();
        let fmt_pct = |v: Option<f64>| match v {
            Some(v) => format!("{:.1}%", v),
            None => "-".to_string(),
        };
        println!(
            "{:<24} | {:<10} | {:<8} | {:<9} | {}",
            record.execution_id,
            record.status.to_string(),
            m.and_then(|m| m.tests_run)
                .map(|v| v.to_string())
                .unwrap_or_else(|| "-".to_string()),
            fmt_pct(m.and_then(|m| m.success_rate)),
            fmt_pct(m.and_then(|m| m.line_coverage)),
        );
    }
}

fn print_record(record: &ExecutionRecord) {
    println!("\n=== Execution {} ===", record.execution_id);
    println!("Status:     {}", record.status);
    println!("Tracked at: {}", record.timestamp.to_rfc3339());
    if let (Some(start), Some(end)) = (&record.start_time, &record.end_time) {
        println!("Ran:        {} -> {}", start, end);
    }

    if let Some(m) = &record.metrics {
        println!("\nMetrics:");
        if let Some(v) = m.tests_run {
            println!("  Tests run:        {}", v);
        }
        if let Some(v) = m.success_rate {
            println!("  Success rate:     {:.1}%", v);
        }
        if let (Some(f), Some(e)) = (m.failures, m.errors) {
            println!("  Failures/errors:  {}/{}", f, e);
        }
        if let Some(v) = m.execution_time {
            println!("  Execution time:   {:.1}s", v);
        }
        if let Some(v) = m.line_coverage {
            let detail = match (m.lines_covered, m.lines_total) {
                (Some(c), Some(t)) => format!(" ({}/{})", c, t),
                _ => String::new(),
            };
            println!("  Line coverage:    {:.1}%{}", v, detail);
        }
        if let Some(v) = m.branch_coverage {
            println!("  Branch coverage:  {:.1}%", v);
        }
        if let Some(v) = m.tests_per_endpoint {
            println!("  Tests/endpoint:   {:.1}", v);
        }
    }

    if let Some(q) = &record.quality_analysis {
        println!("\nQuality analysis:");
        println!("  Overall score:    {:.0}/100", q.overall_score);
        println!("  Coverage quality: {}", q.coverage_quality);
        println!("  Completeness:     {}", q.test_completeness);
    }

    if let Some(recs) = &record.recommendations {
        if !recs.is_empty() {
            println!("\nRecommendations:");
            for r in recs {
                println!("  - {}", r);
            }
        }
    }

    if let Some(logs) = &record.logs {
        if !logs.is_empty() {
            println!("\n--- Logs ---\n{}", logs);
        }
    }
    println!();
}
