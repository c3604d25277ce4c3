use clap::Parser;
use log::{info, warn};
use rand::Rng;
use shared::{Action, Command, Update, RECORD_SIZE, WORLD_RADIUS};
use std::time::Duration;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpStream;
use tokio::sync::watch;
use tokio::time::{sleep, timeout};

/// Fighter positions from one broadcast tick.
type Frame = Vec<(i32, f32, f32)>;

/// Headless client that joins the arena and wanders around
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Server address to connect to
    #[arg(short, long, default_value = "127.0.0.1:8080")]
    server: String,

    /// Number of commands to send before disconnecting
    #[arg(short, long, default_value = "10")]
    commands: u32,

    /// Delay between commands in milliseconds
    #[arg(short, long, default_value = "1000")]
    interval_ms: u64,
}

async fn read_update<R: AsyncRead + Unpin>(
    reader: &mut R,
) -> Result<Update, Box<dyn std::error::Error>> {
    let mut record = [0u8; RECORD_SIZE];
    reader.read_exact(&mut record).await?;
    Ok(Update::decode(&record)?)
}

/// Reads records until the server tells us which player we are.
async fn learn_identity<R: AsyncRead + Unpin>(
    reader: &mut R,
) -> Result<i32, Box<dyn std::error::Error>> {
    loop {
        if let Update::SendId { id } = read_update(reader).await? {
            return Ok(id);
        }
    }
}

/// Consumes every update the server sends, publishing each complete frame.
///
/// Only the newest frame is kept, so a slow printer never falls behind.
async fn watch_frames<R: AsyncRead + Unpin>(mut reader: R, frames: watch::Sender<Frame>) {
    let mut fighters = Frame::new();
    loop {
        let update = read_update(&mut reader).await;
        match update {
            Ok(Update::Fighter { id, x, y }) => fighters.push((id, x, y)),
            Ok(Update::Spell { id, x, y }) => {
                println!("  Spell from {} at ({:.3}, {:.3})", id, x, y)
            }
            Ok(Update::SendId { .. }) => {
                if frames.send(std::mem::take(&mut fighters)).is_err() {
                    return;
                }
            }
            Err(e) => {
                warn!("Stopped reading updates: {}", e);
                return;
            }
        }
    }
}

fn random_point_in_disk(rng: &mut impl Rng) -> (f32, f32) {
    let angle = rng.gen_range(0.0..std::f32::consts::TAU);
    let radius = WORLD_RADIUS * rng.gen::<f32>().sqrt();
    (radius * angle.cos(), radius * angle.sin())
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();
    let args = Args::parse();

    let stream = TcpStream::connect(&args.server).await?;
    stream.set_nodelay(true)?;
    println!("Connected to {} from {}", args.server, stream.local_addr()?);

    let (mut reader, mut writer) = stream.into_split();

    let player_id = timeout(Duration::from_secs(5), learn_identity(&mut reader)).await??;
    println!("Server assigned player id {}", player_id);

    let (frames_tx, mut frames_rx) = watch::channel(Frame::new());
    tokio::spawn(watch_frames(reader, frames_tx));

    let mut rng = rand::thread_rng();

    for i in 0..args.commands {
        let (x, y) = random_point_in_disk(&mut rng);
        let action = if i % 4 == 3 {
            Action::Spell { x, y }
        } else {
            Action::Move { x, y }
        };

        let command = Command::new(player_id, action);
        info!("Sending {:?}", command);
        writer.write_all(&command.encode()?).await?;

        sleep(Duration::from_millis(args.interval_ms)).await;

        if frames_rx.has_changed().is_err() {
            warn!("Server closed the connection");
            break;
        }

        let fighters = frames_rx.borrow_and_update().clone();
        println!("Latest frame with {} fighters", fighters.len());
        for (id, x, y) in fighters {
            println!("  Fighter {}: ({:.3}, {:.3})", id, x, y);
        }
    }

    println!("Test client finished, disconnecting");
    if let Err(e) = writer.shutdown().await {
        warn!("Shutdown failed: {}", e);
    }

    Ok(())
}
