//! CLI driver for the streaming transcription client.
//!
//! Runs one session against the configured backend: Enter toggles
//! recording, Ctrl-C exits. The accumulated transcript is reprinted as
//! fragments arrive.

use tokio::io::{AsyncBufReadExt, BufReader};

use voxstream::session::Session;
use voxstream::settings;
use voxstream::streaming::StreamEvent;

#[tokio::main]
async fn main() {
    // A .env file is optional in development.
    let _ = dotenvy::dotenv();
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    // Required before the first wss:// connection when more than one
    // rustls provider is linked in.
    let _ = rustls::crypto::ring::default_provider().install_default();

    let mut settings = settings::load_settings(settings::default_settings_path().as_deref());
    settings.apply_env_overrides();

    let mut session = Session::start(settings);

    println!("Press Enter to start/stop recording, Ctrl-C to exit.");

    let mut lines = BufReader::new(tokio::io::stdin()).lines();

    loop {
        tokio::select! {
            _ = tokio::signal::ctrl_c() => {
                println!();
                break;
            }
            line = lines.next_line() => match line {
                Ok(Some(_)) => toggle_recording(&mut session),
                Ok(None) => break,
                Err(e) => {
                    log::warn!("stdin error: {}", e);
                    break;
                }
            },
            update = session.next_update() => match update {
                Some(StreamEvent::Transcript(_)) => {
                    println!("transcript:{}", session.transcript());
                }
                Some(_) => {}
                None => {
                    log::error!("Streaming client terminated unexpectedly");
                    break;
                }
            },
        }
    }

    session.shutdown().await;
}

fn toggle_recording(session: &mut Session) {
    if session.is_recording() {
        session.stop_recording();
        println!("-- stopped ({}) --", session.connection_state().as_str());
    } else {
        match session.start_recording() {
            Ok(()) => println!("-- recording ({}) --", session.connection_state().as_str()),
            Err(_) => {
                if let Some(message) = session.last_error() {
                    eprintln!("{}", message);
                }
            }
        }
    }
}
