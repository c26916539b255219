use chrono::{Datelike, NaiveDate, Utc};
use clap::{Parser, Subcommand, ValueEnum};
use serde::Serialize;
use std::sync::Arc;
use tracing::{error, info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use stockcast::application::services::{
    DailyPredictionRequest, PredictionService, PredictionTracker,
};
use stockcast::config::{parse_symbol_list, AppConfig};
use stockcast::domain::entities::prediction::PredictionModel;
use stockcast::domain::entities::tracking::{ExecutionType, OrderBy, OrderDir, PredictionHistoryQuery};
use stockcast::domain::services::{PredictionCache, TradingCalendar};
use stockcast::infrastructure::{FetchClient, SubprocessPredictor, YahooClient};
use stockcast::persistence::{init_database_with, CalendarRepository};

#[derive(Parser)]
#[command(name = "stockcast")]
#[command(about = "Daily stock predictions with accuracy tracking")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run the daily prediction batch
    Run {
        /// Comma separated symbols (defaults to the configured roster)
        #[arg(long)]
        symbols: Option<String>,
        /// Prediction date, YYYY-MM-DD (defaults to today)
        #[arg(long)]
        date: Option<NaiveDate>,
        /// Run even if the market was closed the day before
        #[arg(long)]
        force: bool,
        /// Record the run as scheduled rather than manual
        #[arg(long)]
        auto: bool,
        /// Model family to run (simple, enhanced, advanced)
        #[arg(long)]
        model: Option<PredictionModel>,
    },
    /// Record the realized close of a prediction
    Reconcile {
        symbol: String,
        date: NaiveDate,
        close: f64,
    },
    /// Accuracy summary of one symbol, or of everything
    Summary { symbol: Option<String> },
    /// Best performing symbols
    Top {
        #[arg(short, long, default_value = "10")]
        limit: u32,
    },
    /// Stored predictions
    History {
        #[arg(long)]
        symbol: Option<String>,
        #[arg(long)]
        start: Option<NaiveDate>,
        #[arg(long)]
        end: Option<NaiveDate>,
        #[arg(short, long, default_value = "50")]
        limit: u32,
        #[arg(long, default_value = "0")]
        offset: u32,
        #[arg(long, value_enum, default_value = "date")]
        order_by: HistoryOrder,
        #[arg(long)]
        asc: bool,
    },
    /// Daily accuracy over the last N days
    Trends {
        #[arg(long)]
        symbol: Option<String>,
        #[arg(short, long, default_value = "30")]
        days: u32,
    },
    /// Reconciled predictions between two dates
    Range {
        start: NaiveDate,
        end: NaiveDate,
        /// Comma separated symbols (defaults to all)
        #[arg(long)]
        symbols: Option<String>,
    },
    /// Outcome of the latest batch run
    Status,
    /// Describe the prediction model, optionally after selecting another one
    Model { name: Option<PredictionModel> },
    /// Daily closes covering the last N days
    Prices {
        symbol: String,
        #[arg(short, long, default_value = "30")]
        days: u32,
    },
    /// Store the market holidays of a year and list them
    Holidays { year: Option<i32> },
    /// Check the market data API and the model
    Health,
}

#[derive(Clone, Copy, ValueEnum)]
enum HistoryOrder {
    Date,
    Accuracy,
    Confidence,
}

impl From<HistoryOrder> for OrderBy {
    fn from(order: HistoryOrder) -> Self {
        match order {
            HistoryOrder::Date => OrderBy::Date,
            HistoryOrder::Accuracy => OrderBy::Accuracy,
            HistoryOrder::Confidence => OrderBy::Confidence,
        }
    }
}

struct App {
    tracker: PredictionTracker,
    predictions: Arc<PredictionService>,
    fetcher: Arc<FetchClient>,
    predictor: Arc<SubprocessPredictor>,
    cache: Arc<PredictionCache>,
    config: AppConfig,
}

async fn build_app(config: AppConfig) -> Result<App, Box<dyn std::error::Error>> {
    let pool = init_database_with(&config.database).await?;

    let calendar = Arc::new(TradingCalendar::new(Arc::new(CalendarRepository::new(pool.clone()))));
    let year = Utc::now().year();
    for y in [year, year + 1] {
        if let Err(e) = calendar.initialize_year(y).await {
            warn!(year = y, error = %e, "Failed to initialize market calendar");
        }
    }

    let source = Arc::new(YahooClient::new(config.yahoo.clone())?);
    let fetcher = Arc::new(FetchClient::new(source, config.fetch.clone()));
    let predictor = Arc::new(SubprocessPredictor::new(config.predictor.clone()));
    let cache = Arc::new(PredictionCache::new(config.cache.ttl));
    let predictions = Arc::new(PredictionService::new(
        predictor.clone(),
        cache.clone(),
        config.prediction.clone(),
    ));

    let tracker = PredictionTracker::new(
        pool,
        calendar,
        fetcher.clone(),
        predictions.clone(),
        config.tracker.clone(),
    );

    Ok(App {
        tracker,
        predictions,
        fetcher,
        predictor,
        cache,
        config,
    })
}

fn print_json<T: Serialize>(value: &T) -> Result<(), Box<dyn std::error::Error>> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    if let Err(e) = dotenvy::dotenv() {
        // a missing .env file is the normal case
        if !e.not_found() {
            eprintln!("Failed to load .env: {}", e);
        }
    }

    // Initialize logging
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "stockcast=info".into()),
        )
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    let cli = Cli::parse();
    let app = build_app(AppConfig::from_env()).await?;

    match cli.command {
        Commands::Run {
            symbols,
            date,
            force,
            auto,
            model,
        } => {
            if let Some(model) = model {
                app.predictions.switch_model(model).await?;
            }
            let _sweeper = app.cache.spawn_sweeper(app.config.cache.sweep_interval);
            let request = DailyPredictionRequest {
                symbols: symbols.as_deref().map(parse_symbol_list),
                date,
                force_execute: force,
                execution_type: if auto {
                    ExecutionType::Auto
                } else {
                    ExecutionType::Manual
                },
            };
            let log = app.tracker.execute_daily_predictions(request).await?;
            print_json(&log)?;
        }
        Commands::Reconcile {
            symbol,
            date,
            close,
        } => {
            let record = app
                .tracker
                .update_actual_price(&symbol.to_ascii_uppercase(), date, close)
                .await?;
            print_json(&record)?;
        }
        Commands::Summary { symbol: Some(symbol) } => {
            let summary = app.tracker.accuracy_summary(&symbol.to_ascii_uppercase()).await?;
            print_json(&summary)?;
        }
        Commands::Summary { symbol: None } => {
            print_json(&app.tracker.overall_performance_metrics().await?)?;
        }
        Commands::Top { limit } => {
            print_json(&app.tracker.top_performers(limit).await?)?;
        }
        Commands::History {
            symbol,
            start,
            end,
            limit,
            offset,
            order_by,
            asc,
        } => {
            let query = PredictionHistoryQuery {
                symbol: symbol.map(|s| s.to_ascii_uppercase()),
                start_date: start,
                end_date: end,
                limit,
                offset,
                order_by: order_by.into(),
                order_dir: if asc { OrderDir::Asc } else { OrderDir::Desc },
            };
            print_json(&app.tracker.prediction_history(&query).await?)?;
        }
        Commands::Trends { symbol, days } => {
            let symbol = symbol.map(|s| s.to_ascii_uppercase());
            print_json(&app.tracker.accuracy_trends(symbol.as_deref(), days).await?)?;
        }
        Commands::Range { start, end, symbols } => {
            let symbols = symbols.as_deref().map(parse_symbol_list).unwrap_or_default();
            print_json(&app.tracker.accuracy_in_range(&symbols, start, end).await?)?;
        }
        Commands::Status => {
            print_json(&app.tracker.daily_execution_status().await?)?;
        }
        Commands::Model { name } => {
            let info = match name {
                Some(model) => app.predictions.switch_model(model).await?,
                None => app.predictions.model_info(),
            };
            print_json(&info)?;
        }
        Commands::Prices { symbol, days } => {
            let series = app
                .fetcher
                .fetch_historical(&symbol.to_ascii_uppercase(), days)
                .await?;
            print_json(&series.as_slice())?;
        }
        Commands::Holidays { year } => {
            let year = year.unwrap_or_else(|| Utc::now().year());
            let calendar = app.tracker.calendar();
            calendar.initialize_year(year).await?;
            let (start, end) = match (
                NaiveDate::from_ymd_opt(year, 1, 1),
                NaiveDate::from_ymd_opt(year, 12, 31),
            ) {
                (Some(start), Some(end)) => (start, end),
                _ => return Err(format!("invalid year: {}", year).into()),
            };
            print_json(&calendar.calendar_range(start, end).await?)?;
        }
        Commands::Health => {
            let mut healthy = true;
            match app.fetcher.health_check().await {
                Ok(()) => info!("Market data API is reachable"),
                Err(e) => {
                    error!(error = %e, "Market data API check failed");
                    healthy = false;
                }
            }
            match app.predictor.health_check().await {
                Ok(price) => info!(price, "Prediction model answered"),
                Err(e) => {
                    error!(error = %e, "Prediction model check failed");
                    healthy = false;
                }
            }
            let stats = app.cache.stats().await;
            info!(entries = stats.size, hit_rate = stats.hit_rate(), "Prediction cache");

            if !healthy {
                return Err("health check failed".into());
            }
            println!("ok");
        }
    }

    Ok(())
}
