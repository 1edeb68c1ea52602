use std::{
    process::{Child, Command, Stdio},
    time::Instant,
};

use lamp_show_core::{ClockReading, ClockSource};

/// Follows an external media player process.
///
/// The player is launched on the first poll so that the bus is already open
/// when the track starts. The position is the time since launch minus the
/// configured output latency, and the clock stops advancing once the player
/// exits.
pub struct PlayerClock {
    program: String,
    args: Vec<String>,
    latency_ms: i64,
    child: Option<Child>,
    started: Option<Instant>,
    finished: bool,
}

impl PlayerClock {
    pub fn new(command: &[String], latency_ms: i64) -> Option<Self> {
        let (program, args) = command.split_first()?;
        Some(Self {
            program: program.clone(),
            args: args.to_vec(),
            latency_ms,
            child: None,
            started: None,
            finished: false,
        })
    }

    fn position_ms(&self) -> i64 {
        let elapsed = self
            .started
            .map(|started| started.elapsed().as_millis() as i64)
            .unwrap_or(0);
        elapsed - self.latency_ms
    }

    fn launch(&mut self) {
        match Command::new(&self.program)
            .args(&self.args)
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .spawn()
        {
            Ok(child) => {
                tracing::info!(program = %self.program, pid = child.id(), "player started");
                self.child = Some(child);
                self.started = Some(Instant::now());
            }
            Err(err) => {
                tracing::error!(program = %self.program, %err, "failed to start player");
                self.finished = true;
            }
        }
    }
}

impl ClockSource for PlayerClock {
    fn poll(&mut self) -> ClockReading {
        if self.finished {
            return ClockReading::stopped(self.position_ms());
        }

        let Some(child) = self.child.as_mut() else {
            self.launch();
            return ClockReading::stopped(0);
        };

        match child.try_wait() {
            Ok(None) => ClockReading::advancing(self.position_ms()),
            Ok(Some(status)) => {
                tracing::info!(%status, "player exited");
                self.finished = true;
                ClockReading::stopped(self.position_ms())
            }
            Err(err) => {
                tracing::warn!(%err, "lost track of player process");
                self.finished = true;
                ClockReading::stopped(self.position_ms())
            }
        }
    }
}

impl Drop for PlayerClock {
    fn drop(&mut self) {
        if let Some(child) = self.child.as_mut() {
            if matches!(child.try_wait(), Ok(None)) {
                let _ = child.kill();
                let _ = child.wait();
            }
        }
    }
}
