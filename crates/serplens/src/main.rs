use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use serplens_core::serp::user_rank;
use serplens_core::{KeywordParams, KeywordScorer, SearchProvider, SearchQuery, TextExtractor};
use serplens_local::export::{write_csv_file, ExportRow};
use serplens_local::extract::PageExtractor;
use serplens_local::keywords::{load_stopwords_file, YakeScorer};
use serplens_local::pipeline::{analyze, AnalysisRequest};
use serplens_local::search::{
    valueserp_api_key_from_env, valueserp_endpoint_from_env, ValueSerpProvider,
    DEFAULT_NUM_RESULTS,
};
use serplens_local::{default_client, FetchOptions, LocalFetcher};
use std::path::PathBuf;

mod config;
mod render;

#[derive(Parser, Debug)]
#[command(name = "serplens")]
#[command(about = "Keyword research: SERP lookup, keyword extraction, competitor aggregation", long_about = None)]
struct Cli {
    /// More logging on stderr (-v info, -vv debug). `RUST_LOG` takes precedence.
    #[arg(short, long, global = true, action = clap::ArgAction::Count)]
    verbose: u8,
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Look up provider locations matching a query.
    Locations(LocationsCmd),
    /// Show the top organic results for a keyword, and where your URL ranks.
    Search(SearchCmd),
    /// Extract keyword candidates from text, a text file, or a URL.
    Keywords(KeywordsCmd),
    /// Aggregate keyword usage across the top results (and your URL).
    ///
    /// Fetches the top 10 organic results, extracts keywords from each page, and folds them into
    /// one table sorted by total occurrence.
    Analyze(AnalyzeCmd),
    /// Diagnose configuration issues (json; no secrets).
    Doctor(DoctorCmd),
    /// Print version info.
    Version(VersionCmd),
}

#[derive(clap::Args, Debug, Clone)]
struct ApiArgs {
    /// ValueSERP API key (falls back to VALUESERP_API_KEY).
    #[arg(long, env = "SERPLENS_VALUESERP_API_KEY", hide_env_values = true)]
    api_key: Option<String>,
    /// ValueSERP base URL override.
    #[arg(long, env = "SERPLENS_VALUESERP_ENDPOINT")]
    endpoint: Option<String>,
}

impl ApiArgs {
    fn provider(&self, client: reqwest::Client) -> serplens_core::Result<ValueSerpProvider> {
        let key = self
            .api_key
            .clone()
            .filter(|k| !k.trim().is_empty())
            .or_else(valueserp_api_key_from_env)
            .unwrap_or_default();
        let endpoint = self.endpoint.clone().or_else(valueserp_endpoint_from_env);
        ValueSerpProvider::new(client, &key, endpoint)
    }
}

#[derive(clap::Args, Debug, Clone)]
struct KeywordArgs {
    /// Language of the predefined stopword list.
    #[arg(long, default_value = "en")]
    language: String,
    /// Custom stopwords file (one per line, `#` comments). Replaces the language list.
    #[arg(long)]
    stopwords_file: Option<PathBuf>,
    #[arg(long, default_value_t = 3)]
    max_ngram_size: usize,
    #[arg(long, default_value_t = 0.9)]
    dedup_threshold: f64,
    /// Keyword candidates kept per document.
    #[arg(long, default_value_t = 20)]
    top_n: usize,
}

impl KeywordArgs {
    fn params(&self) -> Result<KeywordParams> {
        let stopwords = match &self.stopwords_file {
            Some(p) => load_stopwords_file(p)?,
            None => Vec::new(),
        };
        Ok(KeywordParams {
            language: self.language.clone(),
            stopwords,
            max_ngram_size: self.max_ngram_size,
            dedup_threshold: self.dedup_threshold,
            top_n: self.top_n,
        })
    }
}

#[derive(clap::Args, Debug, Clone)]
struct FetchArgs {
    /// Per-request timeout for page fetches and search calls.
    #[arg(long, default_value_t = 20_000)]
    timeout_ms: u64,
    /// Max bytes read per page.
    #[arg(long, default_value_t = 5_000_000)]
    max_bytes: u64,
}

impl FetchArgs {
    fn options(&self) -> FetchOptions {
        FetchOptions {
            timeout_ms: Some(self.timeout_ms),
            max_bytes: Some(self.max_bytes),
        }
    }
}

#[derive(clap::Args, Debug)]
struct LocationsCmd {
    /// Free-text location query (e.g. "paris").
    #[arg(long)]
    query: String,
    #[command(flatten)]
    api: ApiArgs,
    /// Output format: text|json
    #[arg(long = "output", alias = "format", default_value = "text")]
    output: String,
}

#[derive(clap::Args, Debug)]
struct SearchCmd {
    #[arg(long)]
    keyword: String,
    /// Location name as returned by `locations` (full name).
    #[arg(long)]
    location: Option<String>,
    /// Your page; its rank among the fetched results is reported.
    #[arg(long)]
    user_url: Option<String>,
    /// Results requested from the provider.
    #[arg(long, default_value_t = DEFAULT_NUM_RESULTS)]
    num: usize,
    /// Results printed.
    #[arg(long, default_value_t = 20)]
    show: usize,
    #[arg(long, default_value_t = 20_000)]
    timeout_ms: u64,
    #[command(flatten)]
    api: ApiArgs,
    /// Output format: text|json
    #[arg(long = "output", alias = "format", default_value = "text")]
    output: String,
}

#[derive(clap::Args, Debug)]
#[command(group(
    clap::ArgGroup::new("source")
        .required(true)
        .args(["text", "text_file", "url"])
))]
struct KeywordsCmd {
    /// Inline text.
    #[arg(long)]
    text: Option<String>,
    /// Read text from a file.
    #[arg(long)]
    text_file: Option<PathBuf>,
    /// Fetch a page and extract its main text.
    #[arg(long)]
    url: Option<String>,
    #[command(flatten)]
    kw: KeywordArgs,
    #[command(flatten)]
    fetch: FetchArgs,
    /// Output format: text|json
    #[arg(long = "output", alias = "format", default_value = "text")]
    output: String,
}

#[derive(clap::Args, Debug)]
struct AnalyzeCmd {
    #[arg(long)]
    keyword: String,
    /// Location name as returned by `locations` (full name).
    #[arg(long)]
    location: Option<String>,
    /// Your page; analyzed alongside the competitors in its own column.
    #[arg(long)]
    user_url: Option<String>,
    /// Competitor pages analyzed (max 10).
    #[arg(long, default_value_t = 10)]
    competitors: usize,
    /// Results requested from the provider (your URL's rank is looked up among these).
    #[arg(long, default_value_t = DEFAULT_NUM_RESULTS)]
    num: usize,
    /// Max pages fetched and scored at once.
    #[arg(long, default_value_t = 4)]
    concurrency: usize,
    /// Also write the table as CSV (UTF-8 with BOM).
    #[arg(long)]
    csv: Option<PathBuf>,
    #[command(flatten)]
    kw: KeywordArgs,
    #[command(flatten)]
    fetch: FetchArgs,
    #[command(flatten)]
    api: ApiArgs,
    /// Output format: text|json
    #[arg(long = "output", alias = "format", default_value = "text")]
    output: String,
}

#[derive(clap::Args, Debug)]
struct DoctorCmd {
    /// Output format: json|text
    #[arg(long = "output", alias = "format", default_value = "json")]
    output: String,
}

#[derive(clap::Args, Debug)]
struct VersionCmd {
    /// Output format: json|text
    #[arg(long = "output", alias = "format", default_value = "json")]
    output: String,
}

fn is_text(output: &str) -> bool {
    output.eq_ignore_ascii_case("text")
}

impl Commands {
    fn output(&self) -> &str {
        match self {
            Commands::Locations(c) => &c.output,
            Commands::Search(c) => &c.output,
            Commands::Keywords(c) => &c.output,
            Commands::Analyze(c) => &c.output,
            Commands::Doctor(c) => &c.output,
            Commands::Version(c) => &c.output,
        }
    }

    fn kind(&self) -> &'static str {
        match self {
            Commands::Locations(_) => "locations",
            Commands::Search(_) => "search",
            Commands::Keywords(_) => "keywords",
            Commands::Analyze(_) => "analyze",
            Commands::Doctor(_) => "doctor",
            Commands::Version(_) => "version",
        }
    }
}

fn error_code(e: &anyhow::Error) -> &'static str {
    e.chain()
        .find_map(|c| c.downcast_ref::<serplens_core::Error>())
        .map(|e| e.code())
        .unwrap_or("error")
}

fn envelope(kind: &str, body: serde_json::Value) -> serde_json::Value {
    let mut v = serde_json::json!({
        "schema_version": 1,
        "kind": kind,
        "ok": true,
    });
    if let (Some(obj), serde_json::Value::Object(extra)) = (v.as_object_mut(), body) {
        obj.extend(extra);
    }
    v
}

async fn run_locations(args: LocationsCmd) -> Result<()> {
    let provider = args.api.provider(default_client()?)?;
    let locs = provider.locations(args.query.trim()).await?;
    if is_text(&args.output) {
        print!("{}", render::locations(&locs));
        return Ok(());
    }
    let mut warnings = Vec::new();
    if locs.is_empty() {
        warnings.push("no_locations");
    }
    let v = envelope(
        "locations",
        serde_json::json!({
            "query": args.query,
            "locations": locs,
            "warnings": warnings,
        }),
    );
    println!("{v}");
    Ok(())
}

async fn run_search(args: SearchCmd) -> Result<()> {
    let provider = args.api.provider(default_client()?)?;
    let q = SearchQuery {
        keyword: args.keyword.trim().to_string(),
        location: args.location.clone(),
        max_results: Some(args.num),
        timeout_ms: Some(args.timeout_ms),
    };
    if q.keyword.is_empty() {
        return Err(
            serplens_core::Error::InvalidInput("keyword must not be empty".to_string()).into(),
        );
    }
    let resp = provider.search(&q).await?;
    let rank = args
        .user_url
        .as_deref()
        .filter(|u| !u.trim().is_empty())
        .map(|u| user_rank(&resp.results, u));

    if is_text(&args.output) {
        print!("{}", render::search(&resp.results, args.show, rank.as_ref()));
        return Ok(());
    }
    let mut warnings = Vec::new();
    if resp.results.is_empty() {
        warnings.push("no_results");
    }
    let shown: Vec<_> = resp.results.iter().take(args.show).collect();
    let v = envelope(
        "search",
        serde_json::json!({
            "keyword": q.keyword,
            "location": q.location,
            "provider": resp.provider,
            "total_results": resp.results.len(),
            "results": shown,
            "user_url": args.user_url,
            "user_rank": rank,
            "timings_ms": resp.timings_ms,
            "warnings": warnings,
        }),
    );
    println!("{v}");
    Ok(())
}

async fn run_keywords(args: KeywordsCmd) -> Result<()> {
    let params = args.kw.params()?;
    let (source, text) = if let Some(t) = args.text.clone() {
        ("text".to_string(), t)
    } else if let Some(p) = &args.text_file {
        let t = std::fs::read_to_string(p)
            .with_context(|| format!("read text file {}", p.display()))?;
        (p.display().to_string(), t)
    } else if let Some(u) = &args.url {
        let ex = PageExtractor::new(LocalFetcher::new()?, args.fetch.options());
        (u.clone(), ex.extract(u).await?.text)
    } else {
        // Unreachable: clap requires one source.
        anyhow::bail!("one of --text, --text-file, --url is required");
    };

    let scorer = YakeScorer::new();
    let cands = scorer.extract_keywords(&text, &params)?;
    if is_text(&args.output) {
        print!("{}", render::keywords(&cands));
        return Ok(());
    }
    let v = envelope(
        "keywords",
        serde_json::json!({
            "source": source,
            "scorer": scorer.name(),
            "params": params,
            "keywords": cands,
        }),
    );
    println!("{v}");
    Ok(())
}

async fn run_analyze(args: AnalyzeCmd) -> Result<()> {
    let params = args.kw.params()?;
    let client = default_client()?;
    let provider = args.api.provider(client.clone())?;
    let extractor = PageExtractor::new(LocalFetcher::with_client(client), args.fetch.options());
    let scorer = YakeScorer::new();

    let mut req = AnalysisRequest::new(args.keyword.clone());
    req.location = args.location.clone();
    req.user_url = args.user_url.clone();
    req.search_results = Some(args.num);
    req.competitors = args.competitors;
    req.keyword_params = params;
    req.concurrency = args.concurrency;
    req.search_timeout_ms = Some(args.fetch.timeout_ms);

    let t0 = std::time::Instant::now();
    let run = analyze(&provider, &extractor, &scorer, &req).await?;
    tracing::info!(
        rows = run.rows.len(),
        elapsed_ms = t0.elapsed().as_millis() as u64,
        "analysis finished"
    );

    if let Some(p) = &args.csv {
        write_csv_file(p, &run.rows)?;
    }

    if is_text(&args.output) {
        print!("{}", render::analysis(&run));
        if let Some(p) = &args.csv {
            println!("\nWrote {}", p.display());
        }
        return Ok(());
    }
    let table: Vec<ExportRow> = run.rows.iter().map(ExportRow::from).collect();
    let v = envelope(
        "analyze",
        serde_json::json!({
            "elapsed_ms": t0.elapsed().as_millis() as u64,
            "csv": args.csv.as_ref().map(|p| p.display().to_string()),
            "table": table,
            "run": run,
        }),
    );
    println!("{v}");
    Ok(())
}

fn run_doctor(args: DoctorCmd) -> Result<()> {
    let t0 = std::time::Instant::now();

    let mut checks = Vec::new();
    let c0 = std::time::Instant::now();
    let smoke = YakeScorer::new().extract_keywords(
        "Neapolitan pizza in Paris: the best Neapolitan pizza restaurants in Paris.",
        &KeywordParams::default(),
    );
    checks.push(serde_json::json!({
        "name": "keyword_scorer",
        "ok": smoke.as_ref().map(|c| !c.is_empty()).unwrap_or(false),
        "elapsed_ms": c0.elapsed().as_millis() as u64,
        "error": smoke.err().map(|e| e.to_string()),
    }));
    let c0 = std::time::Instant::now();
    let client = default_client();
    checks.push(serde_json::json!({
        "name": "http_client",
        "ok": client.is_ok(),
        "elapsed_ms": c0.elapsed().as_millis() as u64,
        "error": client.err().map(|e| e.to_string()),
    }));

    let endpoint = valueserp_endpoint_from_env();
    let v = serde_json::json!({
        "schema_version": 1,
        "kind": "doctor",
        "ok": checks.iter().all(|c| c["ok"].as_bool() == Some(true)),
        "name": "serplens",
        "version": env!("CARGO_PKG_VERSION"),
        "elapsed_ms": t0.elapsed().as_millis() as u64,
        "configured": {
            "valueserp": valueserp_api_key_from_env().is_some(),
            "valueserp_endpoint_override": endpoint.is_some(),
            "env_file": std::env::var_os("SERPLENS_ENV_FILE").is_some(),
        },
        "checks": checks,
    });
    if is_text(&args.output) {
        println!("serplens {}", env!("CARGO_PKG_VERSION"));
        let key = if v["configured"]["valueserp"] == true {
            "configured"
        } else {
            "missing"
        };
        println!("valueserp api key: {key}");
        for c in v["checks"].as_array().into_iter().flatten() {
            let status = if c["ok"].as_bool() == Some(true) {
                "ok"
            } else {
                "FAILED"
            };
            println!("{}: {status}", c["name"].as_str().unwrap_or(""));
        }
    } else {
        println!("{v}");
    }
    Ok(())
}

fn run_version(args: VersionCmd) {
    let v = serde_json::json!({
        "schema_version": 1,
        "kind": "version",
        "ok": true,
        "name": "serplens",
        "version": env!("CARGO_PKG_VERSION"),
    });
    if is_text(&args.output) {
        println!("serplens {}", env!("CARGO_PKG_VERSION"));
    } else {
        println!("{v}");
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    config::load_env_file_from_env();
    let cli = Cli::parse();
    config::init_tracing(cli.verbose);

    let json_errors = !is_text(cli.command.output());
    let kind = cli.command.kind();
    let res = match cli.command {
        Commands::Locations(args) => run_locations(args).await,
        Commands::Search(args) => run_search(args).await,
        Commands::Keywords(args) => run_keywords(args).await,
        Commands::Analyze(args) => run_analyze(args).await,
        Commands::Doctor(args) => run_doctor(args),
        Commands::Version(args) => {
            run_version(args);
            Ok(())
        }
    };
    if let Err(e) = &res {
        tracing::debug!(error = ?e, "command failed");
        if json_errors {
            let v = serde_json::json!({
                "schema_version": 1,
                "kind": kind,
                "ok": false,
                "error": { "code": error_code(e), "message": e.to_string() },
            });
            println!("{v}");
        }
    }
    res
}
