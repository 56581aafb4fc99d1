//! Speech capture adapter around an external speech-to-text command.
//!
//! The command is expected to record one utterance, print the finalized
//! transcript to stdout, and exit. It receives the configured language in
//! the `VOICECART_LANG` environment variable. No interim results, no
//! retry: after Ended or Error a new `start` call is required.

use std::process::Stdio;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use tokio::process::Command;
use tokio::sync::mpsc::UnboundedSender;
use tracing::{error, info, warn};

/// Lifecycle events of one capture: a finalized transcript, normal end
/// of listening, or a recognition error.
#[derive(Debug, Clone)]
pub enum SpeechEvent {
    Transcript(String),
    Ended,
    Error(String),
}

/// Capability-checked capture adapter. Constructed once at startup; when
/// no usable command is configured the Unavailable variant disables every
/// speech entry point without failing the application.
pub enum SpeechCapture {
    Available(CommandCapture),
    Unavailable,
}

impl SpeechCapture {
    pub fn new(command: Option<&str>, language: &str) -> Self {
        let Some(line) = command.map(str::trim).filter(|line| !line.is_empty()) else {
            error!("no speech-to-text command configured; speech capture disabled");
            return SpeechCapture::Unavailable;
        };

        match shell_words::split(line) {
            Ok(mut parts) if !parts.is_empty() => {
                let program = parts.remove(0);
                info!(%program, language, "speech capture ready");
                SpeechCapture::Available(CommandCapture {
                    program,
                    args: parts,
                    language: language.to_string(),
                    in_flight: Arc::new(AtomicBool::new(false)),
                })
            }
            _ => {
                error!(command = line, "speech command could not be parsed; speech capture disabled");
                SpeechCapture::Unavailable
            }
        }
    }

    pub fn is_available(&self) -> bool {
        matches!(self, SpeechCapture::Available(_))
    }

    /// Begins listening for one utterance. A no-op while a capture is
    /// already in flight, and when the capability is unavailable.
    pub fn start(&self, events: UnboundedSender<SpeechEvent>) {
        match self {
            SpeechCapture::Available(capture) => capture.start(events),
            SpeechCapture::Unavailable => {
                warn!("speech capture requested but unavailable");
            }
        }
    }
}

pub struct CommandCapture {
    program: String,
    args: Vec<String>,
    language: String,
    in_flight: Arc<AtomicBool>,
}

impl CommandCapture {
    fn start(&self, events: UnboundedSender<SpeechEvent>) {
        if self.in_flight.swap(true, Ordering::SeqCst) {
            // Non-continuous: one utterance at a time.
            return;
        }

        let program = self.program.clone();
        let args = self.args.clone();
        let language = self.language.clone();
        let in_flight = Arc::clone(&self.in_flight);

        tokio::spawn(async move {
            let output = Command::new(&program)
                .args(&args)
                .env("VOICECART_LANG", &language)
                .stdin(Stdio::null())
                .output()
                .await;
            in_flight.store(false, Ordering::SeqCst);

            match output {
                Ok(out) if out.status.success() => {
                    let transcript = String::from_utf8_lossy(&out.stdout).trim().to_string();
                    if transcript.is_empty() {
                        warn!("speech capture produced no transcript");
                    } else {
                        let _ = events.send(SpeechEvent::Transcript(transcript));
                    }
                    let _ = events.send(SpeechEvent::Ended);
                }
                Ok(out) => {
                    let stderr = String::from_utf8_lossy(&out.stderr).trim().to_string();
                    error!(status = %out.status, stderr, "speech capture command failed");
                    let _ = events.send(SpeechEvent::Error(format!(
                        "capture command exited with {}",
                        out.status
                    )));
                }
                Err(err) => {
                    error!(%err, %program, "failed to run speech capture command");
                    let _ = events.send(SpeechEvent::Error(err.to_string()));
                }
            }
        });
    }
}
