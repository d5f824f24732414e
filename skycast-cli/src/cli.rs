use anyhow::{Context, Result, bail};
use clap::{Parser, Subcommand};
use inquire::{Password, PasswordDisplayMode, Select, Text};
use std::{fmt, sync::Arc};

use skycast_core::{
    CitySuggestion, Config, IdentityProvider, PreferenceStore, ProviderId, Scope, SessionOptions,
    UnitSystem, WeatherError, WeatherProfile, WeatherSession, adapter_from_config,
    display::ThemeState,
    location::locator_from_config,
    preferences::{FavoriteInput, Saved},
    storage::{FileStorage, KeyValueStorage},
};

use crate::render;

/// Top-level CLI struct.
#[derive(Debug, Parser)]
#[command(name = "skycast", version, about = "Weather dashboard for the terminal")]
pub struct Cli {
    #[command(subcommand)]
    pub command: Command,
}

#[derive(Debug, Subcommand)]
pub enum Command {
    /// Store the OpenWeather API key.
    Configure {
        /// Key to store; prompted for when absent.
        #[arg(long)]
        api_key: Option<String>,
    },

    /// Show current conditions and the forecast for a city.
    Show {
        /// City name, e.g. "Paris" or "Springfield,IL,US".
        city: Vec<String>,

        /// Switch the saved unit system before loading.
        #[arg(long)]
        unit: Option<UnitSystem>,

        /// Add the loaded city to favorites.
        #[arg(long)]
        favorite: bool,
    },

    /// Show weather for the current location.
    Here,

    /// Suggest cities matching a partial name.
    Suggest {
        query: Vec<String>,

        /// Pick one of the suggestions and show its weather.
        #[arg(long)]
        pick: bool,

        /// Add the picked city to favorites.
        #[arg(long, requires = "pick")]
        favorite: bool,
    },

    /// Manage favorite cities.
    Favorites {
        #[command(subcommand)]
        action: FavoritesAction,
    },

    /// Manage recent searches.
    History {
        #[command(subcommand)]
        action: HistoryAction,
    },

    /// Show or change preferences.
    Prefs {
        #[command(subcommand)]
        action: PrefsAction,
    },

    /// Create a local account.
    Signup {
        #[arg(long)]
        email: Option<String>,
    },

    /// Sign in to a local account.
    Login {
        #[arg(long)]
        email: Option<String>,
    },

    /// Sign out; saved accounts and preferences are kept.
    Logout,

    /// Show who preferences are saved for.
    Whoami,
}

#[derive(Debug, Subcommand)]
pub enum FavoritesAction {
    List,
    Add {
        name: String,
        #[arg(long)]
        state: Option<String>,
        #[arg(long)]
        country: Option<String>,
    },
    /// Remove by id as printed by `favorites list`.
    Remove { id: String },
    Clear,
}

#[derive(Debug, Subcommand)]
pub enum HistoryAction {
    List,
    Clear,
}

#[derive(Debug, Subcommand)]
pub enum PrefsAction {
    Show,
    /// Set one preference, e.g. `prefs set unit imperial`.
    Set { key: String, value: String },
    Reset,
}

/// Everything a command may need, opened lazily from config.
struct App {
    config: Config,
    store: Arc<PreferenceStore>,
    accounts: IdentityProvider,
}

impl App {
    fn open() -> Result<Self> {
        let config = Config::load()?;
        for problem in config.validate() {
            tracing::warn!("config: {problem}");
        }

        let dir = config.storage_dir()?;
        tracing::debug!(dir = %dir.display(), "using storage directory");
        let storage: Arc<dyn KeyValueStorage> = Arc::new(FileStorage::new(dir));

        Ok(Self {
            store: Arc::new(PreferenceStore::new(storage.clone())),
            accounts: IdentityProvider::new(storage),
            config,
        })
    }

    fn session(&self) -> Result<WeatherSession> {
        let adapter = adapter_from_config(&self.config)?;
        let locator = locator_from_config(&self.config.geolocation);

        Ok(WeatherSession::new(
            Arc::new(adapter),
            Arc::from(locator),
            self.store.clone(),
            self.accounts.current(),
            SessionOptions::from(&self.config),
        ))
    }
}

impl fmt::Debug for App {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("App").finish_non_exhaustive()
    }
}

struct Choice(CitySuggestion);

impl fmt::Display for Choice {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0.label())
    }
}

impl Cli {
    pub async fn run(self) -> Result<()> {
        match self.command {
            Command::Configure { api_key } => configure(api_key),
            Command::Show {
                city,
                unit,
                favorite,
            } => show(&city.join(" "), unit, favorite).await,
            Command::Here => here().await,
            Command::Suggest {
                query,
                pick,
                favorite,
            } => suggest(&query.join(" "), pick, favorite).await,
            Command::Favorites { action } => favorites(action),
            Command::History { action } => history(action),
            Command::Prefs { action } => prefs(action),
            Command::Signup { email } => signup(email),
            Command::Login { email } => login(email),
            Command::Logout => {
                let app = App::open()?;
                app.accounts.sign_out()?;
                println!("Signed out. Preferences now apply to the guest profile.");
                Ok(())
            }
            Command::Whoami => {
                let app = App::open()?;
                let identity = app.accounts.current();
                println!("{identity}");
                Ok(())
            }
        }
    }
}

fn configure(api_key: Option<String>) -> Result<()> {
    let mut config = Config::load()?;
    let id = ProviderId::OpenWeather;

    let key = match api_key {
        Some(key) => key,
        None => Password::new(&format!("{id} API key:"))
            .with_display_mode(PasswordDisplayMode::Masked)
            .without_confirmation()
            .prompt()
            .context("Failed to read API key")?,
    };
    let key = key.trim().to_string();
    if key.is_empty() {
        bail!("API key must not be empty");
    }

    config.upsert_provider_api_key(id, key);
    config.save()?;
    println!(
        "Saved API key for {id} to {}",
        Config::config_file_path()?.display()
    );
    Ok(())
}

async fn show(city: &str, unit: Option<UnitSystem>, favorite: bool) -> Result<()> {
    let app = App::open()?;
    let mut session = app.session()?;

    if let Some(unit) = unit {
        session.change_unit(unit).await?;
    }

    let result = if city.trim().is_empty() {
        match session.load_default().await {
            Ok(true) => Ok(()),
            Ok(false) => bail!(
                "No city given and no default city set. \
                 Try `skycast prefs set default_city <city>`."
            ),
            Err(e) => Err(e),
        }
    } else {
        session.search(city).await
    };
    finish(&mut session, result)?;

    if let Some(snapshot) = session.snapshot().filter(|_| favorite) {
        save_favorite(&app, &session.scope(), &FavoriteInput::from(snapshot));
    }
    Ok(())
}

async fn here() -> Result<()> {
    let app = App::open()?;
    let mut session = app.session()?;
    let result = session.use_current_location().await;
    let guidance = session.location_guidance().map(str::to_string);
    for line in with_guidance(session.take_notices(), guidance.as_deref()) {
        eprintln!("! {line}");
    }
    finish(&mut session, result)
}

/// Notices followed by the location guidance, unless a notice already says it.
fn with_guidance(mut notices: Vec<String>, guidance: Option<&str>) -> Vec<String> {
    if let Some(guidance) = guidance.filter(|g| !notices.iter().any(|n| n == g)) {
        notices.push(guidance.to_string());
    }
    notices
}

async fn suggest(query: &str, pick: bool, favorite: bool) -> Result<()> {
    let app = App::open()?;
    let mut session = app.session()?;

    let found = session.suggester().suggest(query).await?.unwrap_or_default();
    if found.is_empty() {
        println!("No matching cities.");
        return Ok(());
    }

    if !pick {
        for s in &found {
            println!("{}", s.label());
        }
        return Ok(());
    }

    let choices: Vec<Choice> = found.into_iter().map(Choice).collect();
    let Choice(selected) = Select::new("Pick a city:", choices)
        .prompt()
        .context("No city selected")?;
    let result = session.select_suggestion(&selected).await;
    finish(&mut session, result)?;

    if favorite {
        save_favorite(&app, &session.scope(), &FavoriteInput::from(&selected));
    }
    Ok(())
}

/// Print the loaded data and any notices; a lookup error becomes the exit error.
fn finish(session: &mut WeatherSession, result: Result<(), WeatherError>) -> Result<()> {
    for notice in session.take_notices() {
        eprintln!("! {notice}");
    }
    match result {
        Ok(()) => {
            print!("{}", render::session(session));
            Ok(())
        }
        Err(e) => Err(anyhow::Error::new(e).context("Could not load weather")),
    }
}

/// Storage failures are not fatal; say once that changes are session-only.
fn report<T>(app: &App, saved: &Saved<T>) {
    let notice = saved
        .is_session_only()
        .then(|| app.store.take_degraded_notice())
        .flatten();
    if let Some(notice) = notice {
        eprintln!("! {notice}");
    }
}

fn save_favorite(app: &App, scope: &Scope, input: &FavoriteInput) {
    let saved = app.store.add_favorite(scope, input);
    report(app, &saved);
    if saved.value {
        println!("Saved {} to favorites", input.name.trim());
    } else {
        println!("{} is already in favorites", input.name.trim());
    }
}

fn favorites(action: FavoritesAction) -> Result<()> {
    let app = App::open()?;
    let scope = app.accounts.current().scope();

    match action {
        FavoritesAction::List => print!("{}", render::favorites(&app.store.favorites(&scope))),
        FavoritesAction::Add {
            name,
            state,
            country,
        } => {
            let input = FavoriteInput {
                name,
                state,
                country,
            };
            save_favorite(&app, &scope, &input);
        }
        FavoritesAction::Remove { id } => {
            let saved = app.store.remove_favorite(&scope, &id);
            report(&app, &saved);
            if !saved.value {
                bail!("No favorite with id '{id}'");
            }
            println!("Removed {id} from favorites");
        }
        FavoritesAction::Clear => {
            let persistence = app.store.clear_favorites(&scope);
            report(&app, &Saved { value: (), persistence });
            println!("Cleared favorite cities");
        }
    }
    Ok(())
}

fn history(action: HistoryAction) -> Result<()> {
    let app = App::open()?;
    let scope = app.accounts.current().scope();

    match action {
        HistoryAction::List => print!("{}", render::history(&app.store.history(&scope))),
        HistoryAction::Clear => {
            let persistence = app.store.clear_history(&scope);
            report(&app, &Saved { value: (), persistence });
            println!("Cleared search history");
        }
    }
    Ok(())
}

fn prefs(action: PrefsAction) -> Result<()> {
    let app = App::open()?;
    let scope = app.accounts.current().scope();

    match action {
        PrefsAction::Show => {
            let profile = app.store.profile(&scope);
            let theme = ThemeState::resolve(profile.theme, false, None);
            print!("{}", render::profile(&profile, &theme));
        }
        PrefsAction::Set { key, value } => {
            // Reject bad input before anything is written.
            WeatherProfile::default()
                .set_field(&key, &value)
                .map_err(anyhow::Error::msg)?;
            let saved = app.store.update_profile(&scope, |p| {
                if let Err(e) = p.set_field(&key, &value) {
                    tracing::warn!(error = %e, "preference change rejected");
                }
            });
            report(&app, &saved);
            println!("{key} updated");
        }
        PrefsAction::Reset => {
            let persistence = app.store.reset_profile(&scope);
            report(&app, &Saved { value: (), persistence });
            println!("Preferences reset to defaults");
        }
    }
    Ok(())
}

fn prompt_email(email: Option<String>) -> Result<String> {
    match email {
        Some(email) => Ok(email),
        None => Text::new("Email:").prompt().context("Failed to read email"),
    }
}

fn signup(email: Option<String>) -> Result<()> {
    let app = App::open()?;
    let email = prompt_email(email)?;
    let password = Password::new("Password:")
        .with_display_mode(PasswordDisplayMode::Masked)
        .with_custom_confirmation_message("Repeat password:")
        .prompt()
        .context("Failed to read password")?;

    let identity = app
        .accounts
        .sign_up(&email, &password)
        .map_err(|e| anyhow::anyhow!(e.user_message()))?;
    println!("Account created. Signed in as {identity}.");
    Ok(())
}

fn login(email: Option<String>) -> Result<()> {
    let app = App::open()?;
    let email = prompt_email(email)?;
    let password = Password::new("Password:")
        .with_display_mode(PasswordDisplayMode::Masked)
        .without_confirmation()
        .prompt()
        .context("Failed to read password")?;

    let identity = app
        .accounts
        .sign_in(&email, &password)
        .map_err(|e| anyhow::anyhow!(e.user_message()))?;
    println!("Signed in as {identity}.");
    Ok(())
}
