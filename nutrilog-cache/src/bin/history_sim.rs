//! Meal history screen simulation.
//!
//! Wires the cache the way the app does: one store, a sweeper, a coordinator
//! for the meal list and a lifecycle binder fed by screen events. The meal
//! API is in memory and starts with two injected transient failures, so the
//! first load goes through the retry path.
//!
//! ```text
//! RUST_LOG=nutrilog_cache=debug cargo run -p nutrilog-cache --bin history_sim
//! ```

use std::error::Error;
use std::sync::Arc;

use nutrilog_cache::{keys, CacheStore, FetchCoordinator, LifecycleBinder, LifecycleEvent};
use nutrilog_cache::{spawn_sweeper, FetchSnapshot};
use nutrilog_core::{
    CancellationToken, InMemoryMealApi, Meal, MealApi, NutrilogConfig, TracingErrorSink,
};
use tokio::sync::mpsc;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

/// Payloads as the backend has sent them over time.
const SEED_MEALS: &str = r#"[
    {"id": 1, "title": "Oatmeal", "calories_kcal": 320, "protein": 12, "carbs": 54, "fat": 6,
     "createdAt": "2024-01-01T08:00:00Z"},
    {"id": "2", "name": "Chicken salad", "calories": 450, "protein_g": 38, "carbs_g": 12,
     "fat_g": 24, "image_url": "https://cdn.example/salad.jpg",
     "created_at": "2024-01-01T12:30:00Z"},
    {"id": 3, "name": "Burrito", "calories": 710, "protein": 31, "carbohydrates": 80, "fat": 24,
     "imageUrl": "https://cdn.example/burrito.jpg", "isFavorite": true,
     "logged_at": "2024-01-01T19:00:00Z"}
]"#;

fn init_tracing() -> Result<(), Box<dyn Error>> {
    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::registry()
        .with(env_filter)
        .with(tracing_subscriber::fmt::layer())
        .try_init()?;
    Ok(())
}

fn log_snapshot(label: &str, snapshot: &FetchSnapshot<Vec<Meal>>) {
    tracing::info!(
        label,
        status = %snapshot.status,
        meals = snapshot.data.as_ref().map(Vec::len).unwrap_or(0),
        retry_count = snapshot.retry_count,
        error = ?snapshot.error,
        "Coordinator state"
    );
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn Error>> {
    init_tracing()?;

    let config = NutrilogConfig::from_env();
    config.validate()?;

    let store = Arc::new(CacheStore::new(config.store.clone()));
    let sweeper = spawn_sweeper(Arc::clone(&store), config.store.sweep_interval);

    let seed: Vec<Meal> = serde_json::from_str(SEED_MEALS)?;
    let api = Arc::new(InMemoryMealApi::with_meals(seed));
    api.fail_next(2);

    let fetch_api = Arc::clone(&api);
    let fetcher = move |_cancel: CancellationToken| {
        let api = Arc::clone(&fetch_api);
        async move { api.list_meals().await }
    };
    let coordinator: FetchCoordinator<Vec<Meal>> =
        FetchCoordinator::builder(keys::meal_list(), Arc::clone(&store), fetcher)
            .options(config.fetch.clone())
            .build();

    let binder = LifecycleBinder::new(coordinator.clone(), Arc::new(TracingErrorSink), "history");
    let (events, rx) = mpsc::channel(16);
    let screen = tokio::spawn(binder.run(rx));

    // Screen opens; a second widget asks for the same list and joins the load.
    events.send(LifecycleEvent::Attach).await?;
    tokio::task::yield_now().await;
    let meals = coordinator.request(false).await?;
    log_snapshot("after first load", &coordinator.snapshot());
    println!("{}", serde_json::to_string_pretty(&meals)?);

    // Backgrounding and returning with fresh data costs nothing.
    events.send(LifecycleEvent::Blur).await?;
    events.send(LifecycleEvent::Focus).await?;

    // A mutation drops every meal key; the next focus reloads.
    if let Some(first) = meals.first() {
        let updated = api.toggle_favorite(&first.id).await?;
        tracing::info!(meal = %updated.id, is_favorite = updated.is_favorite, "Toggled favorite");
    }
    let dropped = store.invalidate_prefix(keys::MEALS_PREFIX);
    tracing::info!(dropped, "Invalidated meal cache");

    // Also clears this screen's rate-limit window.
    coordinator.invalidate();
    events.send(LifecycleEvent::Focus).await?;
    tokio::task::yield_now().await;
    let meals = coordinator.request(false).await?;
    log_snapshot("after mutation", &coordinator.snapshot());

    let favorites = meals.iter().filter(|m| m.is_favorite).count();
    tracing::info!(favorites, api_calls = api.calls(), "Reloaded meal history");

    events.send(LifecycleEvent::Detach).await?;
    drop(events);
    screen.await?;

    let sweep = sweeper.shutdown().await;
    let stats = store.stats();
    tracing::info!(
        hits = stats.hits,
        misses = stats.misses,
        hit_rate = stats.hit_rate(),
        sweep_cycles = sweep.sweep_cycles,
        "Simulation finished"
    );

    Ok(())
}
