use anyhow::Result;
use babble_d::dispatcher::ParameterDispatcher;
use babble_d::osc::{OscReceiver, OscSender, OscTarget};
use babble_d::setup::{build_pipeline, load_config};
use common::{BabbleConfig, CalibrationManager};
use log::{debug, error, info, trace};
use std::path::Path;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

const CALIBRATION_SAVE_INTERVAL: Duration = Duration::from_secs(30);

fn main() -> Result<()> {
    if std::env::var("RUST_LOG").is_err() {
        unsafe {
            std::env::set_var("RUST_LOG", "info");
        }
    }
    env_logger::init();

    info!("Starting...");
    debug!("Debug logging is active");
    trace!("Trace logging is active");

    let running = Arc::new(AtomicBool::new(true));
    let r = running.clone();

    if let Err(e) = ctrlc::set_handler(move || {
        info!("Received Ctrl-C, shutting down...");
        r.store(false, Ordering::SeqCst);
    }) {
        error!("Error setting Ctrl-C handler: {}", e);
    }

    let config_path = Path::new("config.json");
    let config = load_config(config_path).unwrap_or_else(|e| {
        error!("Failed to load config: {:#}. Using defaults.", e);
        BabbleConfig::default()
    });
    info!("Loaded Config: {:?}", config);

    let calibration =
        Arc::new(CalibrationManager::default().with_storage(&config.calibration_path));
    if let Err(e) = calibration.load() {
        error!("Failed to load calibration: {:#}", e);
    }

    let target = Arc::new(OscTarget::new());
    target.set_in_port(config.osc.in_port);
    target.resolve(&config.osc.address, config.osc.out_port);
    let mut sender = OscSender::new(target.clone());
    if let Err(e) = sender.connect() {
        error!("OSC sender not connected: {:#}", e);
    }
    let dispatcher = Arc::new(ParameterDispatcher::new(
        calibration.clone(),
        sender,
        &config.osc.prefix,
    ));

    let received = Arc::new(AtomicU64::new(0));
    let received_counter = received.clone();
    let mut receiver = match OscReceiver::listen(target.clone(), move |msg| {
        received_counter.fetch_add(1, Ordering::Relaxed);
        trace!("OSC in: {} {:?}", msg.addr, msg.args);
    }) {
        Ok(receiver) => Some(receiver),
        Err(e) => {
            error!("OSC receiver disabled: {:#}", e);
            None
        }
    };

    let dispatch_interval = Duration::from_millis(config.dispatch_interval_ms.max(1));
    let running_consumer = running.clone();
    let dispatcher_consumer = dispatcher.clone();
    let consumer = thread::spawn(move || {
        info!("Dispatcher Thread Started");
        let mut last_save = Instant::now();
        while running_consumer.load(Ordering::SeqCst) {
            let started = Instant::now();
            dispatcher_consumer.flush();

            if last_save.elapsed() >= CALIBRATION_SAVE_INTERVAL {
                last_save = Instant::now();
                if let Err(e) = dispatcher_consumer.calibration().save() {
                    error!("Failed to auto-save calibration: {:#}", e);
                } else {
                    #[cfg(feature = "xtralog")]
                    info!("Auto-saved calibration.");
                }
            }

            let elapsed = started.elapsed();
            if elapsed < dispatch_interval {
                thread::sleep(dispatch_interval - elapsed);
            }
        }
        // Last batch still goes out.
        dispatcher_consumer.flush();
        info!("Dispatcher Thread Exiting");
    });

    let mut pipeline = build_pipeline(&config);
    pipeline.on_error(|modality, err| {
        error!("{:?} pipeline error: {}", modality, err);
    });

    info!("Entering Main Loop (Producer)...");

    let tick_interval = Duration::from_millis(config.tick_interval_ms.max(1));
    let mut tick_count: u64 = 0;
    let mut log_interval: u64 = 1000;
    let mut last_log = Instant::now();

    while running.load(Ordering::SeqCst) {
        let tick_started = Instant::now();
        let output = pipeline.tick();
        let any_updated = output.face.is_some() || output.eye.is_some();

        if let Some(face) = &output.face {
            dispatcher.enqueue_face(face);
        }
        if let Some(eye) = &output.eye {
            dispatcher.enqueue_eye(eye);
        }

        if any_updated {
            tick_count += 1;
            if tick_count % log_interval == 0 {
                let elapsed = last_log.elapsed().as_secs_f32();
                let rate = log_interval as f32 / elapsed;
                info!(
                    "Tracking Active: Processed {} ticks (approx {:.1}/s), sent {}, dropped {}, received {}",
                    tick_count,
                    rate,
                    dispatcher.sent_count(),
                    dispatcher.dropped_count(),
                    received.load(Ordering::Relaxed)
                );
                last_log = Instant::now();

                if tick_count >= 1_000_000 {
                    log_interval = 1_000_000;
                } else if tick_count >= 100_000 {
                    log_interval = 100_000;
                } else if tick_count >= 10_000 {
                    log_interval = 10_000;
                }
            }
        }

        let elapsed = tick_started.elapsed();
        if elapsed < tick_interval {
            thread::sleep(tick_interval - elapsed);
        }
    }

    info!("Shutting down...");
    pipeline.stop();
    if consumer.join().is_err() {
        error!("Dispatcher thread panicked");
    }
    if let Some(receiver) = receiver.as_mut() {
        receiver.stop();
    }
    info!(
        "Sent {} parameters, dropped {}, received {} messages",
        dispatcher.sent_count(),
        dispatcher.dropped_count(),
        received.load(Ordering::Relaxed)
    );
    if let Err(e) = calibration.save() {
        error!("Failed to save calibration: {:#}", e);
    }
    Ok(())
}
