use std::{process::exit, sync::Arc, time::Duration};

use anyhow::{Context, Result};
use canteen_advisor::{
    context::{
        calendar::FestivalCalendar, weather::AmapWeather, Clock, FixedClock,
        SituationalContextProvider, SystemClock,
    },
    database::{Database, Seed},
    llm::{transport::ChatTransport, ModelAdvisor},
    settings::{Args, Command, RecommendArgs, Settings},
    RecommendationOrchestrator,
};
use clap::Parser;
use tracing::info;

#[tokio::main]
async fn main() {
    tracing_subscriber::fmt().with_writer(std::io::stderr).init();

    let args = Args::parse();
    let settings = match Settings::from_file(args.config.as_deref()) {
        Ok(settings) => settings,
        Err(error) => {
            eprintln!("Problem while loading settings. {error}");
            exit(1);
        }
    };

    if let Err(error) = run(args.command, settings).await {
        eprintln!("{error:#}");
        exit(1);
    }
}

async fn run(command: Command, settings: Settings) -> Result<()> {
    let database = Database::connect(&settings.database.path)?;
    match command {
        Command::Seed { file } => {
            let text = std::fs::read_to_string(&file)
                .with_context(|| format!("cannot read {}", file.display()))?;
            database.apply_seed(&Seed::from_toml(&text)?)
        }
        Command::Recommend(request) => recommend(request, settings, database).await,
    }
}

async fn recommend(args: RecommendArgs, settings: Settings, database: Database) -> Result<()> {
    let clock: Arc<dyn Clock> = match args.at {
        Some(at) => Arc::new(FixedClock(at)),
        None => Arc::new(SystemClock),
    };
    let store = Arc::new(database);
    let context = SituationalContextProvider::new(
        FestivalCalendar::new(settings.calendar.holidays.clone()),
        Arc::new(AmapWeather::new(&settings.weather)?),
        store.clone(),
        store.clone(),
        clock,
    )
    .with_city(settings.weather.city.clone())
    .with_deadlines(
        Duration::from_secs(settings.weather.timeout_secs),
        Duration::from_millis(settings.context.store_timeout_ms),
    );
    let advisor = ModelAdvisor::new(Arc::new(ChatTransport::new(&settings.model)?))?
        .with_deadline(Duration::from_secs(settings.model.timeout_secs));

    let orchestrator = RecommendationOrchestrator::new(store, Arc::new(context), advisor);
    info!(user_id = ?args.user_id, "Recommending");
    let result = orchestrator
        .recommend(&args.query, args.user_id, args.merge_preference)
        .await;
    println!("{}", serde_json::to_string_pretty(&result)?);
    Ok(())
}
