use anyhow::{anyhow, bail, Context};
use async_trait::async_trait;
use bytes::Bytes;
use chrono::Local;
use crabscan::config::CrabScanConfig;
use crabscan::platform::{CameraBackend, StreamSink};
use crabscan::types::Constraint;
use crabscan::{
    CameraError, DispatchReport, HttpDispatcher, LogDispatcher, NotificationDispatcher,
    NotificationRequest, RqrrDecoder, ScanConfig, ScanController, StaticScanOutcome,
};
use std::env;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::broadcast;

const USAGE: &str = "Usage: crabscan-cli [--config <path>] <command> [args]

Commands:
  list-devices [--json]
  scan-image <path> [--json] [--dry-run]
  scan [device_id] [--timeout <ms>] [--dry-run]
  send-test [--to <addr>]";

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    crabscan::init_logging();

    let mut args: Vec<String> = env::args().skip(1).collect();
    let config_path = take_option(&mut args, "--config")?
        .map(PathBuf::from)
        .unwrap_or_else(CrabScanConfig::default_path);
    let config = CrabScanConfig::load_layered(&config_path)
        .with_context(|| format!("loading {}", config_path.display()))?;

    if args.is_empty() {
        eprintln!("{}", USAGE);
        std::process::exit(1);
    }

    let command = args.remove(0);
    match command.as_str() {
        "list-devices" => cmd_list_devices(&args).await,
        "scan-image" => cmd_scan_image(&config, &mut args).await,
        "scan" => cmd_scan(&config, &mut args).await,
        "send-test" => cmd_send_test(&config, &mut args).await,
        _ => {
            eprintln!("Unknown command: {}\n\n{}", command, USAGE);
            std::process::exit(1);
        }
    }
}

/// Remove `name <value>` from `args`, returning the value.
fn take_option(args: &mut Vec<String>, name: &str) -> anyhow::Result<Option<String>> {
    let Some(pos) = args.iter().position(|a| a == name) else {
        return Ok(None);
    };
    if pos + 1 >= args.len() {
        bail!("{} requires a value", name);
    }
    let value = args.remove(pos + 1);
    args.remove(pos);
    Ok(Some(value))
}

fn take_flag(args: &mut Vec<String>, name: &str) -> bool {
    match args.iter().position(|a| a == name) {
        Some(pos) => {
            args.remove(pos);
            true
        }
        None => false,
    }
}

fn dispatcher(config: &CrabScanConfig, dry_run: bool) -> anyhow::Result<Arc<dyn NotificationDispatcher>> {
    if dry_run {
        return Ok(Arc::new(LogDispatcher));
    }
    Ok(Arc::new(HttpDispatcher::from_config(&config.notification)?))
}

/// Wait for the single dispatch report of a scan and print it.
async fn report_dispatch(reports: &mut broadcast::Receiver<DispatchReport>, timeout: Duration) {
    match tokio::time::timeout(timeout, reports.recv()).await {
        Ok(Ok(report)) => match report.outcome {
            Ok(_) => println!("Notification sent to {}", report.request.recipient),
            Err(e) => eprintln!("Notification failed: {}", e),
        },
        Ok(Err(e)) => eprintln!("Notification outcome lost: {}", e),
        Err(_) => eprintln!("Notification still pending after {:?}", timeout),
    }
}

#[cfg(feature = "native")]
async fn cmd_list_devices(args: &[String]) -> anyhow::Result<()> {
    let camera = crabscan::NativeCamera::new(Arc::new(RqrrDecoder::new()));
    let devices = crabscan::list_devices(&camera).await;
    if args.contains(&"--json".to_string()) {
        println!("{}", serde_json::to_string(&devices)?);
    } else {
        for d in devices {
            println!("{}: {}", d.id, d.label);
        }
    }
    Ok(())
}

#[cfg(not(feature = "native"))]
async fn cmd_list_devices(_args: &[String]) -> anyhow::Result<()> {
    bail!("crabscan-cli was built without the `native` feature; no camera backend available")
}

/// Backend for builds without camera support; only static scans work.
struct NoCamera;

#[async_trait]
impl CameraBackend for NoCamera {
    async fn start(&self, _device_id: &str, _config: &ScanConfig, _sink: StreamSink) -> Result<(), CameraError> {
        Err(CameraError::UnsupportedOperation("no camera backend".to_string()))
    }

    async fn stop(&self) -> Result<(), CameraError> {
        Ok(())
    }

    async fn apply_constraint(&self, _constraint: Constraint) -> Result<bool, CameraError> {
        Ok(false)
    }
}

async fn cmd_scan_image(config: &CrabScanConfig, args: &mut Vec<String>) -> anyhow::Result<()> {
    let json = take_flag(args, "--json");
    let dry_run = take_flag(args, "--dry-run");
    let path = args
        .first()
        .ok_or_else(|| anyhow!("Usage: crabscan-cli scan-image <path> [--json] [--dry-run]"))?;
    let image = tokio::fs::read(path)
        .await
        .with_context(|| format!("reading {}", path))?;

    let controller = ScanController::from_config(
        config,
        Arc::new(NoCamera),
        Arc::new(RqrrDecoder::new()),
        dispatcher(config, dry_run)?,
    );
    let mut reports = controller.dispatch_reports();

    let outcome = controller.scan_static_image(Bytes::from(image)).await;
    if json {
        println!("{}", serde_json::to_string(&outcome)?);
    } else {
        match &outcome {
            StaticScanOutcome::Decoded(text) => println!("Decoded: {}", text),
            StaticScanOutcome::NoMatch => println!("No QR code found"),
        }
    }

    if matches!(outcome, StaticScanOutcome::Decoded(_)) {
        let timeout = Duration::from_millis(config.notification.timeout_ms + 1000);
        report_dispatch(&mut reports, timeout).await;
    }
    Ok(())
}

#[cfg(feature = "native")]
async fn cmd_scan(config: &CrabScanConfig, args: &mut Vec<String>) -> anyhow::Result<()> {
    let timeout_ms: u64 = take_option(args, "--timeout")?
        .map(|v| v.parse())
        .transpose()
        .context("--timeout expects milliseconds")?
        .unwrap_or(30_000);
    let dry_run = take_flag(args, "--dry-run");

    let decoder = Arc::new(RqrrDecoder::new());
    let camera = Arc::new(crabscan::NativeCamera::new(decoder.clone()));
    let controller =
        ScanController::from_config(config, camera.clone(), decoder, dispatcher(config, dry_run)?);
    let mut reports = controller.dispatch_reports();
    let mut snapshots = controller.subscribe();

    match args.first() {
        Some(device_id) => controller.select_device(device_id).await?,
        None => {
            let devices = crabscan::list_devices(camera.as_ref()).await;
            match controller.start_default(&devices).await? {
                Some(device) => println!("Scanning with {} ({})", device.label, device.id),
                None => bail!("No cameras found"),
            }
        }
    }

    let decoded = tokio::time::timeout(
        Duration::from_millis(timeout_ms),
        snapshots.wait_for(|s| s.last_result.is_some() || s.last_error.is_some()),
    )
    .await;

    let snapshot = match decoded {
        Ok(Ok(snapshot)) => snapshot.clone(),
        Ok(Err(_)) => bail!("scan session closed"),
        Err(_) => {
            controller.stop().await;
            bail!("No QR code decoded within {} ms", timeout_ms);
        }
    };

    if let Some(error) = snapshot.last_error {
        controller.stop().await;
        bail!("Camera failed: {}", error);
    }
    if let Some(text) = snapshot.last_result {
        println!("Decoded: {}", text);
        let timeout = Duration::from_millis(config.notification.timeout_ms + 1000);
        report_dispatch(&mut reports, timeout).await;
    }
    controller.stop().await;
    Ok(())
}

#[cfg(not(feature = "native"))]
async fn cmd_scan(_config: &CrabScanConfig, _args: &mut Vec<String>) -> anyhow::Result<()> {
    bail!("crabscan-cli was built without the `native` feature; use scan-image instead")
}

async fn cmd_send_test(config: &CrabScanConfig, args: &mut Vec<String>) -> anyhow::Result<()> {
    let to = take_option(args, "--to")?;
    let mut request = NotificationRequest::compose(&config.notification, "send-test", Local::now());
    if let Some(to) = to {
        request.recipient = to;
    }
    let dispatcher = HttpDispatcher::from_config(&config.notification)?;

    println!("Sending test notification to {} via {}", request.recipient, dispatcher.endpoint());
    let receipt = dispatcher.dispatch(&request).await?;
    match receipt.info {
        Some(info) => println!("Sent: {}", info),
        None => println!("Sent"),
    }
    Ok(())
}
