use attendance_engine::service::protocol::{
    Envelope, Request, Response, DEV_SOCKET_PATH, MAX_FRAME_BYTES, SOCKET_PATH,
};
use attendance_engine::service::{AttendanceEngine, HttpEmbeddingClient};
use attendance_engine::storage::FileStore;
use attendance_engine::{Config, EnrollOutcome, LiveMatchOutcome, RedeemOutcome, SystemClock};
use anyhow::Context as _;
use clap::Parser;
use std::fs;
use std::io::{Read, Write};
use std::os::unix::net::{UnixListener, UnixStream};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

#[derive(Parser)]
#[command(name = "attendance-service")]
#[command(about = "Attendance verification and token redemption daemon")]
struct Cli {
    /// Run against a local socket and verbose logging
    #[arg(long)]
    dev: bool,

    /// Path to the TOML config file
    #[arg(long)]
    config: Option<PathBuf>,

    /// Data directory for the document store (defaults to the system path)
    #[arg(long)]
    data_dir: Option<PathBuf>,
}

fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    if cli.dev {
        tracing_subscriber::fmt()
            .with_max_level(tracing::Level::DEBUG)
            .with_writer(std::io::stderr)
            .init();
    } else {
        tracing_subscriber::fmt()
            .with_writer(std::io::stderr)
            .init();
    }

    tracing::info!("Starting attendance service");

    let config = Config::load_or_default(cli.config.as_deref())?;
    let store = match cli.data_dir {
        Some(dir) => FileStore::new_with_path(dir)?,
        None => FileStore::new()?,
    };
    let engine = Arc::new(AttendanceEngine::new(
        &config,
        Arc::new(store),
        Arc::new(HttpEmbeddingClient::new(&config.embedding)),
        Arc::new(SystemClock),
    )?);

    let socket_path = if cli.dev { DEV_SOCKET_PATH } else { SOCKET_PATH };

    // Clean up old socket if exists
    if Path::new(socket_path).exists() {
        fs::remove_file(socket_path)?;
    }
    if let Some(parent) = Path::new(socket_path).parent() {
        fs::create_dir_all(parent)?;
    }

    let listener = UnixListener::bind(socket_path).context("Failed to bind Unix socket")?;
    tracing::info!("Listening on {}", socket_path);

    for stream in listener.incoming() {
        match stream {
            Ok(stream) => {
                let engine = Arc::clone(&engine);
                std::thread::spawn(move || {
                    if let Err(e) = handle_client(stream, &engine) {
                        tracing::error!("Client error: {}", e);
                    }
                });
            }
            Err(e) => {
                tracing::error!("Connection error: {}", e);
            }
        }
    }

    Ok(())
}

fn handle_client(mut stream: UnixStream, engine: &AttendanceEngine) -> anyhow::Result<()> {
    stream.set_read_timeout(Some(Duration::from_secs(30)))?;
    stream.set_write_timeout(Some(Duration::from_secs(5)))?;

    let envelope = read_envelope(&mut stream)?;
    let response = dispatch(engine, envelope);
    write_response(&mut stream, &response)?;
    Ok(())
}

fn dispatch(engine: &AttendanceEngine, envelope: Envelope) -> Response {
    use attendance_engine::service::protocol::{
        EnrollResponse, LiveMatchResponse, PasscodeResponse, RedeemResponse,
    };

    let caller = envelope.caller;
    let result = match envelope.request {
        Request::Enroll(req) => engine
            .enroll(&caller, &req.auth_uid, &req.image)
            .map(|outcome| match outcome {
                EnrollOutcome::Enrolled { embedding_count } => Response::Enroll(EnrollResponse {
                    face_detected: true,
                    embedding_count: Some(embedding_count),
                }),
                EnrollOutcome::NoFaceDetected => Response::Enroll(EnrollResponse {
                    face_detected: false,
                    embedding_count: None,
                }),
            }),
        Request::GeneratePasscode => engine.generate_passcode(&caller).map(|issued| {
            Response::Passcode(PasscodeResponse {
                code: issued.code,
                valid_for_seconds: issued.valid_for_seconds,
            })
        }),
        Request::RedeemPasscode(req) => {
            engine
                .redeem_passcode(&caller, &req.code)
                .map(|outcome| match outcome {
                    RedeemOutcome::Marked {
                        student_name,
                        status,
                    } => Response::Redeem(RedeemResponse {
                        status: "success".to_string(),
                        student_name,
                        attendance_status: status.to_string(),
                    }),
                    RedeemOutcome::AlreadyMarked {
                        student_name,
                        status,
                    } => Response::Redeem(RedeemResponse {
                        status: "already_marked".to_string(),
                        student_name,
                        attendance_status: status.to_string(),
                    }),
                })
        }
        Request::LiveMatch(req) => engine.live_match(&caller, &req.image).map(|outcome| {
            let response = match outcome {
                LiveMatchOutcome::Success {
                    student_name,
                    status,
                } => LiveMatchResponse {
                    status: "success".to_string(),
                    student_name: Some(student_name),
                    attendance_status: Some(status.to_string()),
                    similarity: None,
                },
                LiveMatchOutcome::AlreadyMarked {
                    student_name,
                    status,
                } => LiveMatchResponse {
                    status: "already_marked".to_string(),
                    student_name: Some(student_name),
                    attendance_status: Some(status.to_string()),
                    similarity: None,
                },
                LiveMatchOutcome::Unknown { similarity } => LiveMatchResponse {
                    status: "unknown".to_string(),
                    student_name: None,
                    attendance_status: None,
                    similarity: Some(similarity),
                },
                LiveMatchOutcome::NoFaceDetected => LiveMatchResponse {
                    status: "no_face_detected".to_string(),
                    student_name: None,
                    attendance_status: None,
                    similarity: None,
                },
            };
            Response::LiveMatch(response)
        }),
    };

    match result {
        Ok(response) => response,
        Err(e) => {
            tracing::warn!("Request failed: {}", e);
            Response::from_error(&e)
        }
    }
}

fn read_envelope(stream: &mut UnixStream) -> anyhow::Result<Envelope> {
    let mut len_buf = [0u8; 4];
    stream.read_exact(&mut len_buf)?;
    let request_len = u32::from_le_bytes(len_buf) as usize;

    if request_len > MAX_FRAME_BYTES {
        anyhow::bail!("Request too large: {} bytes", request_len);
    }

    let mut request_buf = vec![0u8; request_len];
    stream.read_exact(&mut request_buf)?;

    bincode::deserialize(&request_buf)
        .map_err(|e| anyhow::anyhow!("Failed to deserialize request: {}", e))
}

fn write_response(stream: &mut UnixStream, response: &Response) -> anyhow::Result<()> {
    let response_data = bincode::serialize(response)
        .map_err(|e| anyhow::anyhow!("Failed to serialize response: {}", e))?;
    let response_len = (response_data.len() as u32).to_le_bytes();

    stream.write_all(&response_len)?;
    stream.write_all(&response_data)?;
    stream.flush()?;
    Ok(())
}
