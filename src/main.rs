use attendance_engine::service::{AttendanceEngine, CallerIdentity, HttpEmbeddingClient};
use attendance_engine::storage::{ClassConfig, FileStore, ShiftConfig, StudentProfile};
use attendance_engine::{Config, EnrollOutcome, LiveMatchOutcome, RedeemOutcome, SystemClock};
use clap::{Parser, Subcommand};
use anyhow::Result;
use std::path::PathBuf;
use std::sync::Arc;

#[derive(Parser)]
#[command(name = "attendance-engine")]
#[command(about = "School attendance verification and token redemption engine")]
struct Cli {
    /// Enable development mode (verbose logging, local data directory)
    #[arg(long, global = true)]
    dev: bool,

    /// Path to the TOML config file
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Data directory for the document store
    #[arg(long, global = true)]
    data_dir: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Enroll a captured image for a student's account
    Enroll {
        /// Owning account id of the student
        #[arg(short, long)]
        auth_uid: String,
        /// Path to the captured image
        #[arg(short, long)]
        image: PathBuf,
    },
    /// Issue a short-lived attendance passcode for a student
    Passcode {
        #[arg(short, long)]
        auth_uid: String,
    },
    /// Redeem a scanned passcode and mark attendance
    Redeem {
        #[arg(short, long)]
        code: String,
    },
    /// Match a live image against enrolled students and mark attendance
    Match {
        #[arg(short, long)]
        image: PathBuf,
    },
    /// Import or replace a student profile from a JSON document
    ImportStudent {
        #[arg(short, long)]
        file: PathBuf,
    },
    /// Set the start time for a class shift
    SetShift {
        /// Class key, e.g. "12B"
        #[arg(long)]
        class: String,
        #[arg(long)]
        shift: String,
        /// Wall-clock start in the operational timezone, e.g. "08:00"
        #[arg(long)]
        start_time: String,
    },
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    setup_logging(cli.dev);

    let config = Config::load_or_default(cli.config.as_deref())?;
    let store = Arc::new(match (&cli.data_dir, cli.dev) {
        (Some(dir), _) => FileStore::new_with_path(dir.clone())?,
        (None, true) => FileStore::new_with_path(std::env::temp_dir().join("attendance-engine-dev"))?,
        (None, false) => FileStore::new()?,
    });

    // Seeding commands talk to the store directly; everything else goes
    // through the engine so authorization and logging stay uniform.
    match &cli.command {
        Commands::ImportStudent { file } => {
            let data = std::fs::read_to_string(file)?;
            let profile: StudentProfile = serde_json::from_str(&data)?;
            println!("Importing student {} ({})", profile.full_name, profile.student_id);
            store.upsert_student(&profile)?;
            return Ok(());
        }
        Commands::SetShift {
            class,
            shift,
            start_time,
        } => {
            let mut class_config = ClassConfig::default();
            class_config.shifts.insert(
                shift.clone(),
                ShiftConfig {
                    start_time: start_time.clone(),
                },
            );
            store.upsert_class(class, &class_config)?;
            println!("Set {} {} start time to {}", class, shift, start_time);
            return Ok(());
        }
        _ => {}
    }

    let engine = AttendanceEngine::new(
        &config,
        store,
        Arc::new(HttpEmbeddingClient::new(&config.embedding)),
        Arc::new(SystemClock),
    )?;
    let operator = CallerIdentity::operator("cli-operator");

    match cli.command {
        Commands::Enroll { auth_uid, image } => {
            let bytes = std::fs::read(&image)?;
            match engine.enroll(&operator, &auth_uid, &bytes)? {
                EnrollOutcome::Enrolled { embedding_count } => {
                    println!(
                        "Enrolled image for {} ({} embeddings in history)",
                        auth_uid, embedding_count
                    );
                }
                EnrollOutcome::NoFaceDetected => {
                    println!("No face detected in {:?}; nothing stored", image);
                }
            }
        }
        Commands::Passcode { auth_uid } => {
            let issued = engine.generate_passcode(&CallerIdentity::student(&auth_uid))?;
            println!(
                "Passcode {} (valid for {} seconds)",
                issued.code, issued.valid_for_seconds
            );
        }
        Commands::Redeem { code } => match engine.redeem_passcode(&operator, &code)? {
            RedeemOutcome::Marked {
                student_name,
                status,
            } => {
                println!("{} marked {}", student_name, status);
            }
            RedeemOutcome::AlreadyMarked {
                student_name,
                status,
            } => {
                println!("{} already marked {} today", student_name, status);
            }
        },
        Commands::Match { image } => {
            let bytes = std::fs::read(&image)?;
            match engine.live_match(&operator, &bytes)? {
                LiveMatchOutcome::Success {
                    student_name,
                    status,
                } => {
                    println!("{} marked {}", student_name, status);
                }
                LiveMatchOutcome::AlreadyMarked {
                    student_name,
                    status,
                } => {
                    println!("{} already marked {} today", student_name, status);
                }
                LiveMatchOutcome::Unknown { similarity } => {
                    println!("No confident match (best similarity {:.3})", similarity);
                }
                LiveMatchOutcome::NoFaceDetected => {
                    println!("No face detected in {:?}", image);
                }
            }
        }
        Commands::ImportStudent { .. } | Commands::SetShift { .. } => unreachable!(),
    }

    Ok(())
}

fn setup_logging(dev_mode: bool) {
    if dev_mode {
        tracing_subscriber::fmt()
            .with_max_level(tracing::Level::DEBUG)
            .with_file(true)
            .with_line_number(true)
            .init();
    } else {
        tracing_subscriber::fmt::init();
    }
}
