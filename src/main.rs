use anyhow::{anyhow, Result};
use clap::Parser;
use lab_board::api::LabApiClient;
use lab_board::board::LabBoard;
use lab_board::config;
use lab_board::dispatcher::Dispatcher;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tracing::{error, info, warn};

#[derive(Debug, Parser)]
#[command(author, version, about)]
struct Args {
    /// Path to YAML config file
    #[arg(long, default_value = "config.yaml")]
    config: PathBuf,
    /// Board date (YYYY-MM-DD); defaults to today
    #[arg(long)]
    date: Option<String>,
    /// Time slot id; auto-picked from the clock when omitted
    #[arg(long)]
    slot: Option<String>,
    /// Book a PC for a student before rendering; the booking purpose comes
    /// from board.default_purpose in the config
    #[arg(long, value_name = "PC_ID:STUDENT_ID")]
    book: Option<String>,
    /// Keep running and re-render on live updates
    #[arg(long)]
    watch: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_target(false)
        .compact()
        .init();

    let args = Args::parse();
    let cfg = config::load(Some(&args.config))?;

    let client = Arc::new(LabApiClient::new(cfg.backend_url()?));
    let mut board = LabBoard::new(client.clone(), client.clone());

    if let Some(slot) = &args.slot {
        // pin before init so auto-pick does not override the user's choice
        board.set_time_slot(slot).await?;
    }
    if let Some(date) = &args.date {
        board.set_date(date).await?;
    }
    board.init().await?;

    if let Some(pair) = &args.book {
        let (pc_id, student_id) = pair
            .split_once(':')
            .ok_or_else(|| anyhow!("--book expects PC_ID:STUDENT_ID"))?;
        let pc = board
            .catalog()
            .snapshot()
            .find_pc(pc_id)
            .cloned()
            .ok_or_else(|| anyhow!("unknown PC id: {pc_id}"))?;
        board
            .create_booking(&pc, student_id, &cfg.board.default_purpose)
            .await?;
        info!(pc = pc_id, student = student_id, "booking created");
    }

    render(&board);

    if !args.watch {
        return Ok(());
    }

    let (mut dispatcher, mut invalidations) = Dispatcher::new();
    if cfg.board.auto_refresh {
        dispatcher.enable_auto_refresh(Duration::from_secs(cfg.board.auto_refresh_seconds));
        info!(
            seconds = cfg.board.auto_refresh_seconds,
            "auto-refresh enabled"
        );
    }
    if cfg.board.real_time {
        let (events_tx, events_rx) = tokio::sync::mpsc::unbounded_channel();
        dispatcher.enable_real_time(events_rx);
        let stream_client = client.clone();
        tokio::spawn(async move {
            loop {
                if let Err(err) = stream_client.stream_events(&events_tx).await {
                    warn!(?err, "notification stream dropped; reconnecting");
                }
                if events_tx.is_closed() {
                    break;
                }
                tokio::time::sleep(Duration::from_secs(5)).await;
            }
        });
        info!("real-time updates enabled");
    }
    if !cfg.board.auto_refresh && !cfg.board.real_time {
        error!("--watch requires auto_refresh or real_time in the config");
        return Ok(());
    }

    info!("watching for updates (ctrl-c to stop)");
    while invalidations.recv().await.is_some() {
        board.handle_invalidate().await;
        render(&board);
    }

    Ok(())
}

fn render(board: &LabBoard) {
    let selection = board.selection();
    match selection.time_slot() {
        Some(slot) => println!("{} {}", selection.date(), slot),
        None => println!("{} (no slot selected)", selection.date()),
    }
    let mut total = 0;
    for (row, cells) in board.grid() {
        let line: Vec<String> = cells
            .iter()
            .map(|(pc, token)| format!("PC{:02} {}", pc.pc_number, token.as_str()))
            .collect();
        total += cells.len();
        println!("  row {row}: {}", line.join(" | "));
    }
    println!(
        "  booked {}/{} in slot",
        board.index().count_booked_in_slot(),
        total
    );
    for (slice, err) in board.catalog().errors() {
        println!("  warning: {slice} catalog is stale ({err})");
    }
}
