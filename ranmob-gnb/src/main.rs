//! ranmob gNB
//!
//! Runs the mobility task of one gNB. Outbound N2 and Uu traffic is logged
//! rather than sent, which makes the binary a replay harness for scenario
//! files.
//!
//! # Usage
//!
//! ```bash
//! ranmob-gnb -c config/gnb.yaml -s scenarios/intra.yaml
//! ```

use std::process::ExitCode;
use std::time::Duration;

use anyhow::{bail, Context, Result};
use clap::Parser;
use tokio::signal;
use tokio::sync::mpsc;
use tracing::{error, info, warn};

use ranmob_common::{init_logging, log_ngap_message, log_rrc_message, Direction, GnbConfig, LogLevel, UeId};
use ranmob_gnb::{
    load_and_validate_gnb_config, load_scenario, spawn_task, ChannelNgapGateway, ChannelUeLink, Gateways,
    LocalBearerPlane, LocalScheduler, MobilityManager, MobilityMessage, MobilityTask, NgapOutbound, Scenario,
    TaskHandle, TransitionReport, UeDelivery, DEFAULT_CHANNEL_CAPACITY,
};

/// Delay between the last scenario step and shutdown
const SETTLE_MS: u64 = 100;

/// ranmob gNB - handover orchestration
#[derive(Parser, Debug)]
#[command(name = "ranmob-gnb")]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Path to the gNB configuration file (YAML)
    #[arg(short = 'c', long = "config", value_name = "FILE")]
    config_file: String,

    /// Scenario to replay; without one the gNB idles until Ctrl+C
    #[arg(short = 's', long = "scenario", value_name = "FILE")]
    scenario_file: Option<String>,

    /// Log level (trace, debug, info, warn, error)
    #[arg(short = 'l', long = "log-level", default_value = "info")]
    log_level: LogLevel,
}

fn spawn_drains(
    mut ngap_rx: mpsc::Receiver<NgapOutbound>,
    mut ue_rx: mpsc::Receiver<UeDelivery>,
    mut obs_rx: mpsc::Receiver<TransitionReport>,
) {
    tokio::spawn(async move {
        while let Some(msg) = ngap_rx.recv().await {
            let container: &[u8] = match &msg {
                NgapOutbound::HandoverRequired { container, .. } => &container[..],
                NgapOutbound::HandoverRequestAck(ack) => &ack.container[..],
                _ => &[],
            };
            log_ngap_message(Direction::Tx, msg.name(), container);
            info!("N2 >> {:?}", msg);
        }
    });

    tokio::spawn(async move {
        while let Some(delivery) = ue_rx.recv().await {
            log_rrc_message(Direction::Tx, "DL-DCCH", &delivery.pdu);
            info!("Uu >> UE[{}] DL-DCCH ({} bytes)", delivery.ue_id, delivery.pdu.len());
        }
    });

    tokio::spawn(async move {
        while let Some(report) = obs_rx.recv().await {
            info!(
                "UE[{}] {}: {} -> {} ({:?})",
                report.ue_id, report.event, report.transition.from, report.transition.to, report.transition.outcome
            );
        }
    });
}

async fn replay(handle: &TaskHandle<MobilityMessage>, scenario: Scenario, config: &GnbConfig) -> Result<()> {
    let mut ue_ids: Vec<UeId> = Vec::with_capacity(scenario.ues.len());
    for (idx, ue) in scenario.ues.iter().enumerate() {
        let registration = ue.to_registration(config).with_context(|| format!("scenario UE {idx}"))?;
        let ue_id = handle
            .request(|reply| MobilityMessage::RegisterUe { registration, reply: Some(reply) })
            .await?
            .with_context(|| format!("registering scenario UE {idx}"))?;
        info!("Scenario UE {} registered as UE[{}]", idx, ue_id);
        ue_ids.push(ue_id);
    }

    for (idx, step) in scenario.steps.iter().enumerate() {
        if let Some(delay) = step.delay() {
            tokio::time::sleep(delay).await;
            continue;
        }
        let Some((ue, event)) = step.to_event().with_context(|| format!("scenario step {idx}"))? else {
            continue;
        };
        let Some(&ue_id) = ue_ids.get(ue) else {
            bail!("scenario step {idx} refers to unknown UE {ue}");
        };
        handle.send(MobilityMessage::Event { ue_id, event }).await?;
    }

    tokio::time::sleep(Duration::from_millis(SETTLE_MS)).await;
    Ok(())
}

async fn run_gnb(args: Args) -> Result<()> {
    info!("Loading configuration from: {}", args.config_file);
    let config = load_and_validate_gnb_config(&args.config_file)
        .with_context(|| format!("Failed to load configuration from {}", args.config_file))?;
    info!(
        "Configuration loaded: gNB={:#x}, PLMN={}, TAC={}, {} cell(s)",
        config.gnb_id,
        config.plmn,
        config.tac,
        config.cells.len()
    );

    let scenario = match &args.scenario_file {
        Some(path) => Some(load_scenario(path).with_context(|| format!("Failed to load scenario from {path}"))?),
        None => None,
    };

    let (ngap_tx, ngap_rx) = mpsc::channel(DEFAULT_CHANNEL_CAPACITY);
    let (ue_tx, ue_rx) = mpsc::channel(DEFAULT_CHANNEL_CAPACITY);
    let (obs_tx, obs_rx) = mpsc::channel(DEFAULT_CHANNEL_CAPACITY);
    spawn_drains(ngap_rx, ue_rx, obs_rx);

    let gateways = Gateways::new(
        ChannelNgapGateway::new(ngap_tx),
        ChannelUeLink::new(ue_tx),
        LocalScheduler::new(),
        LocalBearerPlane::new(),
    );
    let manager = MobilityManager::from_config(config.clone(), gateways);
    let (handle, join) = spawn_task(MobilityTask::new(manager).with_observer(obs_tx), DEFAULT_CHANNEL_CAPACITY);
    info!("Mobility task spawned");

    match scenario {
        Some(scenario) => {
            info!("Replaying {} step(s) for {} UE(s)", scenario.steps.len(), scenario.ues.len());
            if let Err(e) = replay(&handle, scenario, &config).await {
                warn!("Scenario aborted: {:#}", e);
            }
        }
        None => {
            info!("gNB started, waiting for shutdown signal...");
            signal::ctrl_c().await.context("failed to listen for Ctrl+C")?;
            info!("Received Ctrl+C, initiating shutdown...");
        }
    }

    if handle.shutdown().await.is_err() {
        warn!("Mobility task already stopped");
    }
    let task = join.await.context("mobility task panicked")?;
    info!("Shutdown complete, {} UE context(s) left", task.manager().ue_count());
    Ok(())
}

#[tokio::main]
async fn main() -> ExitCode {
    let args = Args::parse();
    init_logging(args.log_level);

    match run_gnb(args).await {
        Ok(()) => {
            info!("gNB exited successfully");
            ExitCode::SUCCESS
        }
        Err(e) => {
            error!("gNB failed: {:#}", e);
            ExitCode::FAILURE
        }
    }
}
