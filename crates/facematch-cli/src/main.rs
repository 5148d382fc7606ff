use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use facematch_core::quality;
use facematch_core::{BoundingBox, Embedding, Frame};
use facematch_session::{Config, RecognitionSession, SessionError};
use facematch_store::{IdentityStore, SqliteStore, StoreError};
use std::path::{Path, PathBuf};

#[derive(Parser)]
#[command(name = "facematch", about = "Face identity matching and name search")]
struct Cli {
    /// Identity database (overrides FACEMATCH_DB_PATH)
    #[arg(long, global = true)]
    db: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Register a name from one or more embedding files (averaged)
    Enroll {
        name: String,
        /// JSON file holding an array of numbers
        #[arg(short, long = "embedding", required = true)]
        embeddings: Vec<PathBuf>,
    },
    /// List registered names
    List,
    /// Remove a registered name
    Remove { name: String },
    /// Autocomplete registered names by prefix
    Search {
        #[arg(default_value = "")]
        prefix: String,
    },
    /// Find the registered identity closest to an embedding
    Match {
        #[arg(short, long)]
        embedding: PathBuf,
        /// Maximum distance for a match (overrides FACEMATCH_MATCH_THRESHOLD)
        #[arg(short, long)]
        threshold: Option<f32>,
    },
    /// Score capture quality of a face region in an image
    Quality {
        image: PathBuf,
        /// Face region as x,y,width,height in pixels
        #[arg(long, value_delimiter = ',', required = true)]
        face: Vec<f32>,
    },
    /// Show store and configuration status
    Status,
}

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    let cli = Cli::parse();
    let mut config = Config::from_env();
    if let Some(db) = cli.db {
        config.db_path = db;
    }

    match cli.command {
        Commands::Enroll { name, embeddings } => enroll(&config, &name, &embeddings),
        Commands::List => {
            let session = open_session(&config)?.0;
            for name in session.names() {
                println!("{name}");
            }
            Ok(())
        }
        Commands::Remove { name } => {
            let (mut session, store) = open_session(&config)?;
            if session.remove(&store, &name)? {
                println!("Removed {name}");
            } else {
                println!("No identity named {name}");
            }
            Ok(())
        }
        Commands::Search { prefix } => {
            let session = open_session(&config)?.0;
            for name in session.search(&prefix) {
                println!("{name}");
            }
            Ok(())
        }
        Commands::Match {
            embedding,
            threshold,
        } => {
            let session = open_session(&config)?.0;
            let query = read_embedding(&embedding)?;
            let threshold = threshold.unwrap_or(config.match_threshold);
            match session.find_match_within(&query, threshold) {
                Some(m) => println!(
                    "{} (confidence {:.2}, distance {:.3})",
                    m.name, m.confidence, m.distance
                ),
                None => println!("No match"),
            }
            Ok(())
        }
        Commands::Quality { image, face } => check_quality(&config, &image, &face),
        Commands::Status => {
            let (session, _) = open_session(&config)?;
            println!(
                "{}",
                serde_json::json!({
                    "version": env!("CARGO_PKG_VERSION"),
                    "db_path": config.db_path.display().to_string(),
                    "identities": session.len(),
                    "match_threshold": config.match_threshold,
                    "samples_per_enroll": config.samples_per_enroll,
                    "quality": config.quality,
                })
            );
            Ok(())
        }
    }
}

fn open_session(config: &Config) -> Result<(RecognitionSession, SqliteStore)> {
    let store = SqliteStore::open(&config.db_path)
        .with_context(|| format!("opening {}", config.db_path.display()))?;
    let records = store.load_all().context("loading identities")?;
    let mut session = RecognitionSession::new(config.session_settings());
    session.rebuild(&records)?;
    Ok((session, store))
}

fn enroll(config: &Config, name: &str, files: &[PathBuf]) -> Result<()> {
    let samples = files
        .iter()
        .map(|path| read_embedding(path))
        .collect::<Result<Vec<_>>>()?;
    let embedding = Embedding::mean(&samples)?;

    let (mut session, store) = open_session(config)?;
    match session.enroll_embedding(&store, name, embedding) {
        Ok(record) => {
            println!("Enrolled {} ({} samples, id {})", record.name, samples.len(), record.id);
            Ok(())
        }
        Err(SessionError::Store(StoreError::DuplicateName(existing))) => {
            bail!("{existing:?} is already registered; remove it first or choose another name")
        }
        Err(e) => Err(e.into()),
    }
}

fn read_embedding(path: &Path) -> Result<Embedding> {
    let text = std::fs::read_to_string(path)
        .with_context(|| format!("reading {}", path.display()))?;
    let embedding: Embedding = serde_json::from_str(&text)
        .with_context(|| format!("{} is not a JSON array of numbers", path.display()))?;
    if embedding.dim() == 0 {
        bail!("{} holds an empty embedding", path.display());
    }
    Ok(embedding)
}

fn check_quality(config: &Config, path: &Path, face: &[f32]) -> Result<()> {
    let [x, y, width, height] = face else {
        bail!("--face expects x,y,width,height");
    };
    let image = image::open(path).with_context(|| format!("decoding {}", path.display()))?;
    let frame = Frame::from_image(&image);
    let bbox = BoundingBox {
        x: *x,
        y: *y,
        width: *width,
        height: *height,
        confidence: 1.0,
        landmarks: None,
    };

    let brightness = frame.region_brightness(&bbox);
    let report = quality::assess(&bbox, frame.width, frame.height, brightness, &config.quality);
    println!("{}", serde_json::to_string_pretty(&report)?);
    if !report.is_acceptable(&config.quality) {
        println!("Below the registration threshold ({})", config.quality.min_overall_score);
    }
    Ok(())
}
