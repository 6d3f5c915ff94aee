use std::collections::HashMap;
use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::{Arc, Mutex};

use anyhow::{Context, Result, bail};
use clap::{Args as ClapArgs, Parser, Subcommand};
use colored::Colorize;
use console::Emoji;
use indicatif::{MultiProgress, ProgressBar, ProgressStyle};
use tracing_subscriber::EnvFilter;

use podshelf::feed::try_fetch_episodes;
use podshelf::player::LATEST_EPISODE_INDEX;
use podshelf::{
    AppConfig, CacheOutcome, DiskCacheStore, EpisodeCache, FeedRegistry, FeedSource,
    JsonFileStore, LoadOutcome, NoopReporter, PlayerController, PlayerRoute, PlayerState,
    ProgressEvent, ProgressReporter, ReqwestClient, SharedHttpClient, SharedProgressReporter,
    SharedStore, fetch_feed_metadata, is_url,
};

// Emoji with fallback for terminals without Unicode support
static RADIO: Emoji<'_, '_> = Emoji("📻 ", "");
static SEARCH: Emoji<'_, '_> = Emoji("🔍 ", "[~] ");
static HEADPHONES: Emoji<'_, '_> = Emoji("🎧 ", "[i] ");
static DOWNLOAD: Emoji<'_, '_> = Emoji("📥 ", "[v] ");
static SUCCESS: Emoji<'_, '_> = Emoji("✅ ", "[+] ");
static FAILURE: Emoji<'_, '_> = Emoji("❌ ", "[!] ");
static PLAY: Emoji<'_, '_> = Emoji("▶️  ", "[>] ");
static DISK: Emoji<'_, '_> = Emoji("💾 ", "[=] ");

/// Subscribe to podcast feeds, play episodes and keep them offline
#[derive(Parser, Debug)]
#[command(name = "podshelf")]
#[command(about = "Subscribe to podcast feeds, play episodes and keep them offline")]
#[command(version)]
struct Args {
    /// TOML config file
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Directory for subscriptions, history and cached audio
    #[arg(long, global = true)]
    data_dir: Option<PathBuf>,

    /// Fetch feeds through a feed proxy at this base URL
    #[arg(long, global = true)]
    proxy: Option<String>,

    /// Quiet mode - suppress progress output
    #[arg(short, long, global = true)]
    quiet: bool,

    /// Increase log verbosity (-v, -vv, -vvv)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    verbose: u8,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Run the feed proxy server
    Serve {
        /// Listen address, e.g. 127.0.0.1:3000
        #[arg(long)]
        bind: Option<SocketAddr>,
    },
    /// Subscribe to a feed
    Add { url: String },
    /// Remove every subscription with this URL
    Remove { url: String },
    /// List subscribed feeds
    List,
    /// List recently viewed feeds, newest first
    Recent,
    /// Print a feed's episodes, oldest first
    Episodes { url: String },
    /// Open a feed in the player and show the selected episode
    Play(EpisodeArgs),
    /// Cache an episode for offline playback
    Download(EpisodeArgs),
    /// List episodes cached for offline playback
    Cached,
}

#[derive(ClapArgs, Debug)]
struct EpisodeArgs {
    /// Feed URL
    url: String,

    /// Episode index, oldest first
    #[arg(short, long, default_value_t = 0, conflicts_with = "latest")]
    index: usize,

    /// Select the newest episode
    #[arg(long)]
    latest: bool,
}

impl EpisodeArgs {
    fn route(&self) -> PlayerRoute {
        PlayerRoute {
            feed_url: Some(self.url.clone()),
            index: if self.latest {
                LATEST_EPISODE_INDEX
            } else {
                self.index
            },
        }
    }
}

/// Progress reporter using indicatif for terminal output
struct IndicatifReporter {
    multi: MultiProgress,
    bars: Mutex<HashMap<String, ProgressBar>>,
    main_bar: ProgressBar,
}

impl IndicatifReporter {
    fn new() -> Self {
        let multi = MultiProgress::new();

        let main_bar = multi.add(ProgressBar::new_spinner());
        if let Ok(style) = ProgressStyle::default_bar().template("{spinner:.green} {wide_msg}") {
            main_bar.set_style(style);
        }
        main_bar.enable_steady_tick(std::time::Duration::from_millis(100));

        Self {
            multi,
            bars: Mutex::new(HashMap::new()),
            main_bar,
        }
    }

    fn get_or_create_bar(&self, url: &str) -> ProgressBar {
        let Ok(mut bars) = self.bars.lock() else {
            return ProgressBar::hidden();
        };

        if let Some(bar) = bars.get(url) {
            return bar.clone();
        }

        let bar = self.multi.add(ProgressBar::new(0));
        if let Ok(style) = ProgressStyle::default_bar().template(&format!(
            "  {DOWNLOAD}[{{bar:30.cyan/blue}}] {{bytes}}/{{total_bytes}} {{wide_msg}}"
        )) {
            bar.set_style(style.progress_chars("█▓░"));
        }
        bars.insert(url.to_string(), bar.clone());
        bar
    }

    fn finish_bar(&self, url: &str) {
        if let Ok(mut bars) = self.bars.lock()
            && let Some(bar) = bars.remove(url)
        {
            bar.finish_and_clear();
        }
    }

    fn finish(&self) {
        self.main_bar.finish_and_clear();
    }
}

impl ProgressReporter for IndicatifReporter {
    fn report(&self, event: ProgressEvent) {
        match event {
            ProgressEvent::FetchingFeed { url } => {
                self.main_bar
                    .set_message(format!("{SEARCH}Fetching feed: {}", url.cyan()));
            }

            ProgressEvent::FeedParsed {
                url,
                total_episodes,
            } => {
                self.main_bar.set_message(format!(
                    "{HEADPHONES}{} • {} episodes",
                    url.bold().green(),
                    total_episodes.to_string().cyan()
                ));
            }

            ProgressEvent::DownloadStarting {
                url,
                content_length,
            } => {
                let bar = self.get_or_create_bar(&url);
                bar.set_length(content_length.unwrap_or(0));
                bar.set_position(0);
                bar.set_message(truncate_title(&url, 40));
            }

            ProgressEvent::DownloadProgress {
                url,
                bytes_downloaded,
                total_bytes,
            } => {
                let bar = self.get_or_create_bar(&url);
                if let Some(total) = total_bytes {
                    bar.set_length(total);
                }
                bar.set_position(bytes_downloaded);
            }

            ProgressEvent::DownloadCompleted {
                url,
                bytes_downloaded,
                ..
            } => {
                let bar = self.get_or_create_bar(&url);
                bar.set_position(bytes_downloaded);
                self.finish_bar(&url);
            }

            ProgressEvent::DownloadFailed { url, error } => {
                let bar = self.get_or_create_bar(&url);
                bar.abandon_with_message(format!(
                    "{FAILURE}{} - {}",
                    truncate_title(&url, 30).red(),
                    error.red()
                ));
                self.finish_bar(&url);
            }

            ProgressEvent::AlreadyCached { url } => {
                self.main_bar
                    .set_message(format!("{DISK}Already cached: {}", url.cyan()));
            }
        }
    }
}

fn truncate_title(title: &str, max_len: usize) -> String {
    if title.chars().count() <= max_len {
        title.to_string()
    } else {
        let head: String = title.chars().take(max_len.saturating_sub(3)).collect();
        format!("{head}...")
    }
}

fn init_tracing(verbose: u8, quiet: bool) {
    let level = match (quiet, verbose) {
        (true, _) => "error",
        (false, 0) => "warn",
        (false, 1) => "info",
        (false, 2) => "debug",
        _ => "trace",
    };

    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(format!("podshelf={level},hyper=warn,reqwest=warn")));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

/// Config file values with command line flags applied on top
fn load_config(args: &Args) -> Result<AppConfig> {
    let mut config = match &args.config {
        Some(path) => AppConfig::load(path).context("Failed to load config")?,
        None => AppConfig::default(),
    };

    if let Some(dir) = &args.data_dir {
        config.data_dir = Some(dir.clone());
    }
    if let Some(proxy) = &args.proxy {
        config.proxy_base = Some(proxy.clone());
    }
    if let Command::Serve { bind: Some(bind) } = &args.command {
        config.bind = *bind;
    }

    Ok(config)
}

/// Everything the commands operate on, wired from the config
struct App {
    client: SharedHttpClient,
    source: FeedSource,
    registry: FeedRegistry,
    cache: Arc<EpisodeCache>,
    reporter: SharedProgressReporter,
    indicatif: Option<Arc<IndicatifReporter>>,
}

impl App {
    fn build(config: &AppConfig, client: SharedHttpClient, quiet: bool) -> Result<Self> {
        let data_dir = config.resolve_data_dir()?;
        std::fs::create_dir_all(&data_dir).with_context(|| {
            format!("Failed to create data directory {}", data_dir.display())
        })?;

        let store: SharedStore = Arc::new(JsonFileStore::new(&data_dir));
        let indicatif = (!quiet).then(|| Arc::new(IndicatifReporter::new()));
        let reporter: SharedProgressReporter = match &indicatif {
            Some(reporter) => reporter.clone(),
            None => NoopReporter::shared(),
        };

        let cache = Arc::new(EpisodeCache::new(
            client.clone(),
            Arc::new(DiskCacheStore::new(&data_dir)),
            store.clone(),
            reporter.clone(),
        ));

        Ok(Self {
            client,
            source: config.feed_source()?,
            registry: FeedRegistry::load(store, config.duplicate_policy),
            cache,
            reporter,
            indicatif,
        })
    }

    fn player(&self) -> PlayerController {
        PlayerController::new(
            self.client.clone(),
            self.source.clone(),
            self.cache.clone(),
            self.reporter.clone(),
        )
    }

    fn finish_progress(&self) {
        if let Some(reporter) = &self.indicatif {
            reporter.finish();
        }
    }

    /// Open the player on a route, failing when nothing can be played
    async fn open_player(&self, route: &PlayerRoute) -> Result<PlayerController> {
        let player = self.player();
        let outcome = player.open(route).await;
        self.finish_progress();

        match outcome {
            LoadOutcome::Ready { .. } => Ok(player),
            LoadOutcome::Empty => bail!("Feed has no episodes (or could not be loaded)"),
            LoadOutcome::NoFeed => bail!("No feed URL given"),
            LoadOutcome::Superseded => bail!("Feed load was superseded"),
        }
    }

    async fn record_view(&self, url: &str) -> Result<()> {
        let feed = match self.registry.find(url).await {
            Some(feed) => feed,
            None => {
                let metadata = fetch_feed_metadata(self.client.as_ref(), &self.source, url).await;
                if !metadata.is_valid() {
                    return Ok(());
                }
                metadata.into_feed()
            }
        };

        self.registry
            .record_view(feed)
            .await
            .context("Failed to record recently viewed feed")
    }
}

fn require_url(url: &str) -> Result<()> {
    if !is_url(url) {
        bail!("'{url}' is not an http(s) URL");
    }
    Ok(())
}

fn feed_label(name: Option<&str>) -> String {
    name.unwrap_or(podshelf::feed::UNKNOWN_PODCAST).to_string()
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();
    init_tracing(args.verbose, args.quiet);

    let config = load_config(&args)?;
    let client: SharedHttpClient = Arc::new(
        ReqwestClient::with_options(config.request_timeout(), config.user_agent.as_deref())
            .context("Failed to build HTTP client")?,
    );

    if let Command::Serve { .. } = args.command {
        if !args.quiet {
            println!(
                "\n{}{} {}\n",
                RADIO,
                "podshelf".bold().magenta(),
                format!("- feed proxy on http://{}", config.bind).dimmed()
            );
        }
        return podshelf::proxy::serve(config.bind, client)
            .await
            .context("Feed proxy failed");
    }

    let app = App::build(&config, client, args.quiet)?;

    match &args.command {
        Command::Serve { .. } => {}

        Command::Add { url } => {
            let feed = app
                .registry
                .add_feed(app.client.as_ref(), &app.source, url)
                .await
                .context("Failed to add feed")?;
            println!(
                "{SUCCESS}Subscribed to {} ({})",
                feed_label(feed.name.as_deref()).bold().green(),
                feed.url.cyan()
            );
        }

        Command::Remove { url } => {
            let removed = app
                .registry
                .remove_feed(url)
                .await
                .context("Failed to remove feed")?;
            if removed == 0 {
                println!("{FAILURE}Not subscribed to {}", url.yellow());
            } else {
                println!("{SUCCESS}Removed {} ({removed} entries)", url.cyan());
            }
        }

        Command::List => {
            let feeds = app.registry.feeds().await;
            if feeds.is_empty() {
                println!("{}", "No subscriptions yet".dimmed());
            }
            for feed in feeds {
                println!(
                    "{HEADPHONES}{} {}",
                    feed_label(feed.name.as_deref()).bold(),
                    feed.url.dimmed()
                );
            }
        }

        Command::Recent => {
            for feed in app.registry.recently_viewed().await {
                println!(
                    "{HEADPHONES}{} {}",
                    feed_label(feed.name.as_deref()).bold(),
                    PlayerRoute::latest(&feed.url).to_query().dimmed()
                );
            }
        }

        Command::Episodes { url } => {
            require_url(url)?;
            let episodes = try_fetch_episodes(app.client.as_ref(), &app.source, url)
                .await
                .context("Failed to load episodes")?;
            app.finish_progress();

            for (index, episode) in episodes.iter().enumerate() {
                let date = episode
                    .pub_date
                    .map(|d| d.format("%Y-%m-%d").to_string())
                    .unwrap_or_default();
                println!(
                    "{:>4}  {}  {}",
                    index.to_string().cyan(),
                    date.dimmed(),
                    episode.title
                );
            }
        }

        Command::Play(episode) => {
            require_url(&episode.url)?;
            let player = app.open_player(&episode.route()).await?;
            app.record_view(&episode.url).await?;

            if let PlayerState::Ready(ready) = player.snapshot().await {
                println!(
                    "{PLAY}[{}/{}] {}",
                    (ready.index + 1).to_string().cyan(),
                    ready.episodes.len().to_string().cyan(),
                    player.status_line().await.bold()
                );
                match &ready.playable {
                    Some(playable) if playable.is_cached() => {
                        println!("  {DISK}{}", playable.url().green())
                    }
                    Some(playable) => println!("  {}", playable.url().cyan()),
                    None => println!("  {}", "Episode has no audio".yellow()),
                }
            }
        }

        Command::Download(episode) => {
            require_url(&episode.url)?;
            let player = app.open_player(&episode.route()).await?;
            let title = player.status_line().await;

            let outcome = player
                .download_current()
                .await
                .with_context(|| format!("Failed to download '{title}'"))?;
            app.finish_progress();

            match outcome {
                CacheOutcome::AlreadyCached => {
                    println!("{DISK}{} is already available offline", title.bold())
                }
                CacheOutcome::Downloaded { bytes, hash } => println!(
                    "{SUCCESS}Cached {} ({} bytes, {})",
                    title.bold().green(),
                    bytes.to_string().cyan(),
                    hash.dimmed()
                ),
            }
        }

        Command::Cached => {
            let inventory = app.cache.inventory().await;
            if inventory.is_empty() {
                println!("{}", "Nothing cached yet".dimmed());
            }
            for url in inventory {
                println!("{DISK}{url}");
            }
        }
    }

    Ok(())
}
